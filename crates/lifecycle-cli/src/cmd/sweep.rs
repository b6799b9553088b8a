use crate::output::{print_json, print_table};
use crate::wiring::Wiring;
use anyhow::Context;
use lifecycle_core::config::Settings;
use lifecycle_core::expire::{ExpireOutcome, ExpireReport};
use lifecycle_core::reconcile::{ReconcileOutcome, ReconcileReport, RepoBatch};
use lifecycle_core::refresh::RefreshOutcome;

// ---------------------------------------------------------------------------
// refresh
// ---------------------------------------------------------------------------

pub fn refresh(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let wiring = Wiring::open(settings.clone())?;
    let refresher = wiring.refresher()?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt
        .block_on(refresher.refresh())
        .context("repo directory refresh failed")?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        RefreshOutcome::NotModified => println!("Repo directory unchanged."),
        RefreshOutcome::Replaced {
            repos,
            validation_tag,
        } => println!(
            "Repo directory replaced: {repos} opted-in repo(s), tag {}",
            validation_tag.as_deref().unwrap_or("-")
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

pub fn reconcile(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let wiring = Wiring::open(settings.clone())?;
    let reconciler = wiring.reconciler()?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt
        .block_on(reconciler.reconcile())
        .context("reconcile cycle aborted")?;

    if json {
        return print_json(&report);
    }
    print_reconcile(&report);
    Ok(())
}

fn print_reconcile(report: &ReconcileReport) {
    if report.repos.is_empty() && report.skipped_keys.is_empty() {
        println!("No pending operations.");
        return;
    }

    let mut rows = Vec::new();
    for repo in &report.repos {
        match &repo.batch {
            RepoBatch::Failed(e) => {
                rows.push(vec![repo.repo.clone(), "*".into(), format!("error: {e}")])
            }
            RepoBatch::Processed(items) => {
                for item in items {
                    let outcome = match &item.result {
                        Ok(ReconcileOutcome::Resolved(t)) => format!("resolved ({t})"),
                        Ok(ReconcileOutcome::AwaitingRun) => "awaiting run".to_string(),
                        Ok(ReconcileOutcome::Unmapped(c)) => format!("unmapped conclusion {c}"),
                        Ok(ReconcileOutcome::AlreadyResolved) => "already resolved".to_string(),
                        Err(e) => format!("error: {e}"),
                    };
                    rows.push(vec![repo.repo.clone(), item.operation_id.clone(), outcome]);
                }
            }
        }
    }
    print_table(&["REPO", "OPERATION", "OUTCOME"], rows);
    println!(
        "\n{} resolved, {} item error(s), {} repo(s) failed, {} malformed key(s) skipped",
        report.resolved(),
        report.item_errors(),
        report.failed_repos(),
        report.skipped_keys.len()
    );
}

// ---------------------------------------------------------------------------
// expire
// ---------------------------------------------------------------------------

pub fn expire(settings: &Settings, ttl_hours: Option<i64>, json: bool) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(hours) = ttl_hours {
        settings.expiration_hours = hours;
    }
    let ttl = settings.expiration_ttl();
    let wiring = Wiring::open(settings)?;
    let expirer = wiring.expirer(ttl)?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(expirer.sweep());

    if json {
        print_json(&report)?;
    } else {
        print_expire(&report);
    }
    if let Some(e) = &report.listing_error {
        anyhow::bail!("expiration sweep could not list operations: {e}");
    }
    Ok(())
}

fn print_expire(report: &ExpireReport) {
    println!("Cutoff: {}", report.cutoff.to_rfc3339());
    if !report.items.is_empty() {
        let rows = report
            .items
            .iter()
            .map(|item| {
                let outcome = match &item.result {
                    Ok(ExpireOutcome::Expired) => "expired".to_string(),
                    Ok(ExpireOutcome::AlreadyResolved) => "already resolved".to_string(),
                    Err(e) => format!("error: {e}"),
                };
                vec![item.key.clone(), item.created_at.to_rfc3339(), outcome]
            })
            .collect();
        print_table(&["KEY", "CREATED", "OUTCOME"], rows);
    }
    println!(
        "{} expired, {} item error(s), {} retained, {} malformed key(s) skipped",
        report.expired(),
        report.item_errors(),
        report.retained,
        report.skipped_keys.len()
    );
}
