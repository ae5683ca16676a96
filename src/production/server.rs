use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ingest::IngestPipeline;
use super::listener::FlowListener;
use super::ttl_manager::ExpirySweeper;
use crate::config::ExporterConfig;
use crate::error::ExporterError;
use crate::metrics::{FlowCollector, IngestMetrics, SampleStore, SnapshotExporter};

#[derive(Clone)]
struct AppState {
    registry: Registry,
    metric_path: String,
}

pub struct ExporterServer;

impl ExporterServer {
    /// Bind both sockets and spawn the background tasks. Nothing is
    /// served over HTTP until [`RunningExporter::serve`] is awaited.
    pub async fn start(config: ExporterConfig) -> Result<RunningExporter, ExporterError> {
        let classifier = config.validate()?;

        let store = Arc::new(SampleStore::new());
        let ingest_metrics = IngestMetrics::new()?;

        let registry = Registry::new();
        let exporter = SnapshotExporter::new(store.clone(), config.sample_expire);
        registry.register(Box::new(FlowCollector::new(exporter, ingest_metrics.clone())))?;

        let udp = UdpSocket::bind(config.listen_socket_addr()?).await?;
        let http = TcpListener::bind(config.metric_socket_addr()?).await?;
        let udp_addr = udp.local_addr()?;
        let http_addr = http.local_addr()?;

        let (pipeline, handle) = IngestPipeline::new(
            store.clone(),
            config.ingest_queue_capacity,
            config.backpressure,
            ingest_metrics,
        );
        let sweeper = ExpirySweeper::new(store.clone(), config.sample_expire, config.sweep_interval);
        let listener = FlowListener::new(udp, classifier, handle);

        let tasks = vec![
            tokio::spawn(pipeline.run()),
            tokio::spawn(sweeper.run()),
            tokio::spawn(listener.run()),
        ];

        info!(
            include = %config.include,
            exclude = %config.exclude,
            sample_expire = %humantime::format_duration(config.sample_expire),
            "Flow classification configured"
        );
        info!("Listening for flows on udp://{}", udp_addr);
        info!("Serving metrics on http://{}{}", http_addr, config.metric_path);

        let state = AppState {
            registry,
            metric_path: config.metric_path.clone(),
        };

        Ok(RunningExporter {
            udp_addr,
            http_addr,
            http: Some(http),
            router: create_router(state),
            store,
            tasks,
        })
    }
}

/// A started exporter. Dropping it stops the background tasks.
pub struct RunningExporter {
    udp_addr: SocketAddr,
    http_addr: SocketAddr,
    http: Option<TcpListener>,
    router: Router,
    store: Arc<SampleStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningExporter {
    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn store(&self) -> Arc<SampleStore> {
        self.store.clone()
    }

    /// Serve scrapes until `shutdown` resolves, then stop the flow side
    pub async fn serve<F>(mut self, shutdown: F) -> Result<(), ExporterError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(http) = self.http.take() {
            axum::serve(http, self.router.clone())
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        self.abort_tasks();
        info!("Shutdown complete");
        Ok(())
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RunningExporter {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

fn create_router(state: AppState) -> Router {
    let metric_path = state.metric_path.clone();
    let mut router = Router::new().route(&metric_path, get(metrics_handler));
    if metric_path != "/" {
        router = router.route("/", get(index_handler));
    }
    router.with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match encode_metrics(&state.registry) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>NetFlow Exporter</title></head>\n<body>\n\
         <h1>NetFlow Exporter</h1>\n<p><a href=\"{0}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        state.metric_path
    ))
}

/// Prometheus text exposition of everything in `registry`
pub fn encode_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{LabelSet, Sample, unix_now_ms};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn registry_with(store: Arc<SampleStore>) -> Registry {
        let registry = Registry::new();
        let exporter = SnapshotExporter::new(store, Duration::from_secs(300));
        registry
            .register(Box::new(FlowCollector::new(exporter, IngestMetrics::new().unwrap())))
            .unwrap();
        registry
    }

    #[test]
    fn test_encode_includes_timestamp() {
        let store = Arc::new(SampleStore::new());
        let observed_at_ms = unix_now_ms();
        let labels = LabelSet::from_pairs(&[("From", "10.0.0.1"), ("protocolIdentifier", "6")]);
        store.upsert(
            Sample::new(labels, BTreeMap::new(), observed_at_ms).with_count("packetDeltaCount", 7.0),
        );

        let text = encode_metrics(&registry_with(store)).unwrap();
        let line = text
            .lines()
            .find(|l| l.starts_with("netflow_10001_packetDeltaCount{"))
            .unwrap();
        assert!(line.contains("protocolIdentifier=\"6\""));
        assert!(line.ends_with(&format!(" 7 {}", observed_at_ms)));
        assert!(text.contains("# TYPE netflow_10001_packetDeltaCount gauge"));
        assert!(text.contains("netflow_last_processed 0"));
    }

    #[test]
    fn test_encode_empty_store() {
        let text = encode_metrics(&registry_with(Arc::new(SampleStore::new()))).unwrap();
        assert!(text.contains("netflow_last_processed"));
        assert!(text.contains("netflow_ingest_dropped_total 0"));
        assert!(!text.contains("netflow_10"));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_pattern() {
        let config = ExporterConfig {
            include: "Count(".to_string(),
            listen_address: "127.0.0.1:0".to_string(),
            metric_address: "127.0.0.1:0".to_string(),
            ..ExporterConfig::default()
        };
        assert!(matches!(
            ExporterServer::start(config).await,
            Err(ExporterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_ports() {
        let config = ExporterConfig {
            listen_address: "127.0.0.1:0".to_string(),
            metric_address: "127.0.0.1:0".to_string(),
            ..ExporterConfig::default()
        };
        let running = ExporterServer::start(config).await.unwrap();
        assert_ne!(running.udp_addr().port(), 0);
        assert_ne!(running.http_addr().port(), 0);
        assert!(running.store().is_empty());
    }
}
