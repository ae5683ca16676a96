//! NetFlow Exporter
//!
//! Collects NetFlow v5/v9 over UDP and serves the counters for Prometheus.
//! Configuration is read from `NETFLOW_*` environment variables and an
//! optional TOML file named by `NETFLOW_CONFIG`.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use netflow_exporter::observability::init_tracing;
use netflow_exporter::production::shutdown_signal;
use netflow_exporter::{ExporterConfig, ExporterError, ExporterServer};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("netflow-exporter: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ExporterError> {
    let config = ExporterConfig::load()?;
    init_tracing(&config.log_level, config.log_format)?;

    info!("Starting NetFlow Exporter v{}", env!("CARGO_PKG_VERSION"));

    let running = ExporterServer::start(config).await?;
    running.serve(shutdown_signal()).await
}
