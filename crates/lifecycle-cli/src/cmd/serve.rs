use crate::wiring::Wiring;
use anyhow::Context;
use lifecycle_core::config::Settings;
use lifecycle_server::scheduler::{Cadence, Scheduler};
use lifecycle_server::state::AppState;
use std::sync::Arc;

pub fn run(settings: Settings, listen: Option<String>) -> anyhow::Result<()> {
    let warnings = settings.validate();
    for w in &warnings {
        tracing::warn!("config: {}", w.message);
    }
    if Settings::has_errors(&warnings) {
        anyhow::bail!("settings have errors; run `lifecycle config check` for details");
    }

    let addr = listen.unwrap_or_else(|| settings.listen.clone());
    let wiring = Wiring::open(settings)?;

    let state = AppState::new(Arc::new(wiring.dispatcher()?));
    let scheduler = Scheduler::new(
        Arc::new(wiring.refresher()?),
        Arc::new(wiring.reconciler()?),
        Arc::new(wiring.expirer(wiring.settings.expiration_ttl())?),
        Cadence::from_config(&wiring.settings.schedule),
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        let loops = scheduler.spawn();
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        };
        let result = lifecycle_server::serve_on(listener, state, shutdown).await;

        for handle in loops {
            handle.abort();
        }
        result
    })
}
