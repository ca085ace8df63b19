//! Tracing initialization with configurable logging formats.

use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level and filter directives.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), TracingError> {
    let filter = build_env_filter(logging);

    tracing_subscriber::registry()
        .with(build_fmt_layer(logging))
        .with(filter)
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))
}

fn build_fmt_layer(logging: &LoggingConfig) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match (logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => layer.pretty().with_target(true).boxed(),
        (LogFormat::Pretty, false) => layer.pretty().with_target(true).without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().with_target(true).boxed(),
        (LogFormat::Compact, false) => layer.compact().with_target(true).without_time().boxed(),
        (LogFormat::Json, true) => layer.json().with_current_span(true).boxed(),
        (LogFormat::Json, false) => layer
            .json()
            .with_current_span(true)
            .without_time()
            .boxed(),
    }
}

/// Build the environment filter from logging config.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let base_level = config.level.as_str();

    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{base_level},{filter}");
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        // Quiet the HTTP stack unless explicitly asked for
        EnvFilter::new(format!("{base_level},hyper=warn,h2=warn,reqwest=warn"))
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}
