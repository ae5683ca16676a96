use crate::config::ConfigError;

/// Startup and serving failures of the exporter
#[derive(Debug)]
pub enum ExporterError {
    Config(ConfigError),
    Metrics(prometheus::Error),
    Io(std::io::Error),
    Tracing(String),
}

impl std::fmt::Display for ExporterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExporterError::Config(e) => write!(f, "Configuration error: {}", e),
            ExporterError::Metrics(e) => write!(f, "Metrics registry error: {}", e),
            ExporterError::Io(e) => write!(f, "IO error: {}", e),
            ExporterError::Tracing(msg) => write!(f, "Failed to install log subscriber: {}", msg),
        }
    }
}

impl std::error::Error for ExporterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExporterError::Config(e) => Some(e),
            ExporterError::Metrics(e) => Some(e),
            ExporterError::Io(e) => Some(e),
            ExporterError::Tracing(_) => None,
        }
    }
}

impl From<ConfigError> for ExporterError {
    fn from(e: ConfigError) -> Self {
        ExporterError::Config(e)
    }
}

impl From<prometheus::Error> for ExporterError {
    fn from(e: prometheus::Error) -> Self {
        ExporterError::Metrics(e)
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(e: std::io::Error) -> Self {
        ExporterError::Io(e)
    }
}
