use std::path::{Path, PathBuf};

use clap::Parser;
use cursor_admin_exporter::{
    AppState, build_app,
    client::build_data_source,
    config::ExporterConfig,
    exporter::{Exporter, ExporterError},
    observability::init_tracing,
};
use prometheus::Registry;

/// CLI arguments for the exporter
#[derive(Parser, Debug)]
#[command(version, about = "Prometheus exporter for the Cursor Admin API", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to a TOML config file. Without one, everything is read from
    /// environment variables (CURSOR_API_TOKEN, CURSOR_API_URL, LISTEN_ADDRESS, ...)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the exporter (default)
    Serve,
    /// Load and validate the configuration, print a summary and exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::CheckConfig => run_check_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> ExporterConfig {
    match ExporterConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_check_config(config: &ExporterConfig) {
    println!("Configuration is valid");
    println!("  listen address: {}", config.server.bind_addr());
    println!("  metrics path:   {}", config.server.metrics_path);
    println!("  namespace:      {}", config.metrics.namespace);
    println!("  api:            {:?}", config.api);
    println!("  log level:      {}", config.observability.logging.level.as_str());
}

fn build_exporter(config: &ExporterConfig, registry: &Registry) -> Result<Exporter, ExporterError> {
    let source = build_data_source(&config.api)?;
    Exporter::with_source(source, &config.metrics, registry)
}

async fn run_server(config: ExporterConfig) {
    if let Err(e) = init_tracing(&config.observability.logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let registry = Registry::new();
    let exporter = match build_exporter(&config, &registry) {
        Ok(exporter) => exporter,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build exporter");
            std::process::exit(1);
        }
    };

    let app = build_app(&config, AppState::new(exporter, &config));

    let bind_addr = config.server.bind_addr();
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        api_url = %config.api.base_url,
        api_variant = ?config.api.variant,
        metrics_path = %config.server.metrics_path,
        "Server listening on http://{}",
        bind_addr
    );

    // Graceful shutdown: in-flight scrapes finish before the process exits.
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
}
