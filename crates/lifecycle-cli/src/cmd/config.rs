use crate::output::print_json;
use clap::Subcommand;
use lifecycle_core::config::{Settings, WarnLevel};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the effective settings for common mistakes
    Check,

    /// Print the effective settings as YAML (secrets redacted)
    Show,
}

pub fn run(settings: &Settings, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(settings, json),
        ConfigSubcommand::Show => show(settings, json),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let warnings = settings.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Settings are valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if Settings::has_errors(&warnings) {
        anyhow::bail!("settings validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let redacted = redact(settings);
    if json {
        return print_json(&redacted);
    }
    print!("{}", redacted.to_yaml()?);
    Ok(())
}

fn redact(settings: &Settings) -> Settings {
    let mut s = settings.clone();
    if s.github.token.is_some() {
        s.github.token = Some("***".into());
    }
    if s.events.key.is_some() {
        s.events.key = Some("***".into());
    }
    s
}
