//! http-request-recorder CLI

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use http_request_recorder::config::RecorderConfig;
use http_request_recorder::{RecorderServer, TracingLog};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("http-request-recorder v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: http-request-recorder <command> <config.toml>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  serve     Answer requests from the configured expectations until Ctrl-C");
        eprintln!("  check     Validate a configuration file");
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let command = &args[1];
    let config_path = PathBuf::from(&args[2]);

    let result = match command.as_str() {
        "serve" => serve(config_path).await,
        "check" => check(config_path),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'http-request-recorder' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load(path: &Path) -> anyhow::Result<RecorderConfig> {
    RecorderConfig::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))
}

fn check(path: PathBuf) -> anyhow::Result<()> {
    let config = load(&path)?;
    config
        .build_recorder(Arc::new(TracingLog))
        .context("Invalid expectation")?;

    println!(
        "{}: {} expectation(s), listening on {}",
        path.display(),
        config.expectations.len(),
        config.socket_addr()?
    );
    Ok(())
}

async fn serve(path: PathBuf) -> anyhow::Result<()> {
    let config = load(&path)?;
    let recorder = Arc::new(
        config
            .build_recorder(Arc::new(TracingLog))
            .context("Invalid expectation")?,
    );

    let server = RecorderServer::start_with_limit(
        Arc::clone(&recorder),
        config.socket_addr()?,
        config.limits.max_request_size,
    )
    .await?;

    info!("Serving {} on {}", recorder, server.url());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received SIGINT, shutting down");

    let unexpected = recorder.unexpected_requests().len();
    server.shutdown().await?;

    if unexpected > 0 {
        info!("{} request(s) matched no expectation", unexpected);
    }
    Ok(())
}
