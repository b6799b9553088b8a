use crate::output::{format_age, print_json, print_table};
use crate::wiring::Wiring;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use lifecycle_core::config::Settings;
use lifecycle_core::operation::OperationKey;
use serde::Serialize;

#[derive(Subcommand)]
pub enum OperationsSubcommand {
    /// List pending operation records, oldest first
    List,
}

pub fn run(settings: &Settings, subcmd: OperationsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        OperationsSubcommand::List => list(settings, json),
    }
}

#[derive(Serialize)]
struct PendingRow {
    key: String,
    repo_name: Option<String>,
    operation_id: Option<String>,
    created_at: DateTime<Utc>,
    age_secs: i64,
}

fn list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let wiring = Wiring::open(settings.clone())?;
    let mut entries = wiring.operations()?.list_entries()?;
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));

    let now = Utc::now();
    let rows: Vec<PendingRow> = entries
        .into_iter()
        .map(|e| {
            let parsed = OperationKey::parse(&e.key);
            PendingRow {
                repo_name: parsed.as_ref().map(|k| k.repo_name.clone()),
                operation_id: parsed.map(|k| k.operation_id),
                age_secs: (now - e.created_at).num_seconds(),
                created_at: e.created_at,
                key: e.key,
            }
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No pending operations.");
        return Ok(());
    }
    let table = rows
        .iter()
        .map(|r| {
            vec![
                r.repo_name.clone().unwrap_or_else(|| "?".into()),
                r.operation_id.clone().unwrap_or_else(|| r.key.clone()),
                r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                format_age(now - r.created_at),
            ]
        })
        .collect();
    print_table(&["REPO", "OPERATION", "CREATED", "AGE"], table);
    Ok(())
}
