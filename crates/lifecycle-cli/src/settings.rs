use anyhow::Context;
use clap::Args;
use lifecycle_core::config::Settings;
use std::path::{Path, PathBuf};

/// Flag / environment overlays applied on top of the settings file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// GitHub API token
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub API base URL
    #[arg(long, global = true, env = "GITHUB_API_URL")]
    pub github_api_url: Option<String>,

    /// Account that owns the workflow repos
    #[arg(long, global = true, env = "REPO_OWNER_NAME")]
    pub repo_owner: Option<String>,

    /// redb database file
    #[arg(long, global = true, env = "LIFECYCLE_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Container holding pending operation records
    #[arg(long, global = true, env = "OPERATION_CONTAINER_NAME")]
    pub operation_container: Option<String>,

    /// Container holding the repo directory snapshot
    #[arg(long, global = true, env = "REPO_MAP_CONTAINER_NAME")]
    pub repo_map_container: Option<String>,

    /// Hours before a pending operation is timed out
    #[arg(
        long,
        global = true,
        env = "OPERATION_EXPIRATION_HOURS",
        allow_negative_numbers = true
    )]
    pub expiration_hours: Option<i64>,

    /// Lifecycle event endpoint
    #[arg(long, global = true, env = "EVENT_SINK_ENDPOINT")]
    pub event_endpoint: Option<String>,

    /// Lifecycle event endpoint access key
    #[arg(long, global = true, env = "EVENT_SINK_KEY", hide_env_values = true)]
    pub event_key: Option<String>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut Settings) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        if self.github_token.is_some() {
            settings.github.token = self.github_token.clone();
        }
        set(&mut settings.github.api_url, &self.github_api_url);
        set(&mut settings.github.owner, &self.repo_owner);
        set(&mut settings.store.path, &self.store_path);
        set(&mut settings.store.operation_container, &self.operation_container);
        set(&mut settings.store.repo_map_container, &self.repo_map_container);
        set(&mut settings.expiration_hours, &self.expiration_hours);
        if self.event_endpoint.is_some() {
            settings.events.endpoint = self.event_endpoint.clone();
        }
        if self.event_key.is_some() {
            settings.events.key = self.event_key.clone();
        }
    }
}

/// Load the settings file (or defaults) and apply the overlays.
pub fn resolve(config: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Settings> {
    let mut settings = Settings::load_or_default(config).context("failed to load settings")?;
    overrides.apply(&mut settings);
    Ok(settings)
}
