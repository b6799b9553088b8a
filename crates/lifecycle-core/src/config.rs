use crate::error::{LifecycleError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound applied to the expiration threshold (100 years).
const MAX_EXPIRATION_HOURS: u64 = 876_000;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// GitHubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Bearer token. Usually supplied through `GITHUB_TOKEN` rather than the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Account whose repositories form the directory.
    #[serde(default)]
    pub owner: String,
    /// Topic a repository must carry to be considered at all.
    #[serde(default = "default_opt_in_topic")]
    pub opt_in_topic: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_opt_in_topic() -> String {
    "saas-lifecycle".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            owner: String::new(),
            opt_in_topic: default_opt_in_topic(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_operation_container")]
    pub operation_container: String,
    #[serde(default = "default_repo_map_container")]
    pub repo_map_container: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("lifecycle.redb")
}

fn default_operation_container() -> String {
    "operations".to_string()
}

fn default_repo_map_container() -> String {
    "repo-map".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            operation_container: default_operation_container(),
            repo_map_container: default_repo_map_container(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Topic endpoint. Without one, events are written to the log only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

// ---------------------------------------------------------------------------
// ScheduleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_reconcile_secs")]
    pub reconcile_secs: u64,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
    /// Repos reconciled at once. 1 keeps the sweep sequential.
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,
}

fn default_refresh_secs() -> u64 {
    300
}

fn default_reconcile_secs() -> u64 {
    300
}

fn default_expire_secs() -> u64 {
    86_400
}

fn default_reconcile_concurrency() -> usize {
    1
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
            reconcile_secs: default_reconcile_secs(),
            expire_secs: default_expire_secs(),
            reconcile_concurrency: default_reconcile_concurrency(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Process-wide configuration, built once at startup and passed down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Age in hours after which a pending operation times out. Sign is ignored.
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: i64,
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_expiration_hours() -> i64 {
    48
}

fn default_listen() -> String {
    "0.0.0.0:7071".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            store: StoreConfig::default(),
            events: EventsConfig::default(),
            schedule: ScheduleConfig::default(),
            expiration_hours: default_expiration_hours(),
            listen: default_listen(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LifecycleError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&data)?;
        Ok(settings)
    }

    /// Load `path` when given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Expiration threshold as a duration. Negative hours count as positive.
    pub fn expiration_ttl(&self) -> Duration {
        let hours = self.expiration_hours.unsigned_abs().min(MAX_EXPIRATION_HOURS);
        Duration::hours(hours as i64)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.github.token.as_deref().map_or(true, str::is_empty) {
            error("github.token is not set (GITHUB_TOKEN)".to_string());
        }
        if self.github.owner.trim().is_empty() {
            error("github.owner is not set (REPO_OWNER_NAME)".to_string());
        }
        if self.github.opt_in_topic.trim().is_empty() {
            error("github.opt_in_topic must not be empty".to_string());
        }
        if self.store.operation_container == self.store.repo_map_container {
            error(format!(
                "store.operation_container and store.repo_map_container are both '{}'",
                self.store.operation_container
            ));
        }
        for (name, secs) in [
            ("refresh_secs", self.schedule.refresh_secs),
            ("reconcile_secs", self.schedule.reconcile_secs),
            ("expire_secs", self.schedule.expire_secs),
        ] {
            if secs == 0 {
                error(format!("schedule.{name} must be greater than zero"));
            }
        }
        if self.schedule.reconcile_concurrency == 0 {
            error("schedule.reconcile_concurrency must be at least 1".to_string());
        }

        if self.events.endpoint.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "events.endpoint is not set; lifecycle events will only be logged"
                    .to_string(),
            });
        } else if self.events.key.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "events.endpoint is set without events.key".to_string(),
            });
        }
        if self.expiration_hours < 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "expiration_hours is negative ({}); using {}",
                    self.expiration_hours,
                    self.expiration_ttl().num_hours()
                ),
            });
        }
        if self.expiration_hours.unsigned_abs() > MAX_EXPIRATION_HOURS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "expiration_hours {} is capped at {MAX_EXPIRATION_HOURS}",
                    self.expiration_hours
                ),
            });
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
