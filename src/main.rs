//! GeoClock server.
//!
//! Wires the core to the real environment: env configuration, the project
//! databases, the Telegram transport, and process signals.

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use geoclock::config::Config;
use geoclock::context::Context;
use geoclock::events::EventType;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let r = main_impl().await;
    if let Err(error) = &r {
        log::error!("Fatal error: {error:#}.");
    }
    std::process::exit(if r.is_ok() { 0 } else { 1 });
}

async fn main_impl() -> Result<()> {
    // Install signal handlers early so that the shutdown is graceful
    // starting from here.
    #[cfg(target_family = "unix")]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Core events are drained into `tracing`; configurable with `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("configuration")?;
    log::info!(
        "Starting with database directory `{}`.",
        config.db_dir.display()
    );

    let context = Context::new(config).await?;
    for db in context.dbs.all() {
        log::info!("Serving project `{}`.", db.project_name);
    }

    let emitter = context.get_event_emitter();
    let drain = tokio::spawn(async move {
        while let Some(event) = emitter.recv().await {
            match event {
                EventType::Info(msg) => log::info!("{msg}"),
                EventType::Warning(msg) => log::warn!("{msg}"),
                EventType::Error(msg) => log::error!("{msg}"),
                other => log::debug!("{other:?}"),
            }
        }
    });

    context.start_io().await;

    #[cfg(target_family = "unix")]
    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("got ctrl-c event"),
        _ = sigterm.recv() => log::info!("got SIGTERM"),
    }
    #[cfg(not(target_family = "unix"))]
    tokio::signal::ctrl_c().await?;

    context.stop_io().await;
    drop(context);
    drain.abort();

    Ok(())
}
