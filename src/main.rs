//! myaei HTTP server
//!
//! Starts an Axum web server exposing the analysis API.

use clap::Parser;
use myaei::cli::{Cli, Command, generate_config_template};
use myaei::config::Config;
use myaei::handlers::{AppState, build_router};
use myaei::telemetry;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Credentials may live in .env; a missing file is fine
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        return write_template(output.as_deref());
    }

    let mut config = Config::from_file(&cli.config)?;
    config.apply_env_overrides()?;

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        config_path = %cli.config,
        dotenv_loaded = dotenv_loaded,
        "Starting myaei server on {}:{}",
        config.server.host,
        config.server.port
    );
    if config.llm.api_key().is_none() {
        tracing::warn!(
            "No LLM credential configured; analysis requests will fail until GROQ_API_KEY is set"
        );
    }

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(config).await?;
    let app = build_router(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn write_template(output: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let template = generate_config_template();
    match output {
        Some(path) => {
            std::fs::write(path, template)?;
            eprintln!("Wrote configuration template to {}", path);
        }
        None => print!("{}", template),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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

    tracing::info!("Shutdown signal received, draining connections");
}
