// Path: crates/sdo-api/src/logging.rs
//! Global `tracing` subscriber initialization for host binaries embedding
//! this core. Not used by the core itself, which only emits `tracing`
//! events; gated behind the `tracing-init` feature so a library consumer
//! that already owns its own subscriber setup does not pull this in.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Installs the global `tracing` subscriber: JSON output on stderr, level
/// controlled by `RUST_LOG` (defaulting to `info`).
pub fn init_tracing() -> Result<(), anyhow::Error> {
    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
