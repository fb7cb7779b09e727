use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::net::TcpListener;

use zasr::{server, state::AppState, toolkit::OnnxToolkit, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments: an optional config file path.
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args();
    let _ = args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("Usage: zasr [--config <file.yaml>]");
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown option '{other}'. Use --config <file.yaml>");
            }
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::from_env()?,
    };

    // Initialize tracing, optionally into the configured log file
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt::init(),
    }

    let address = config.address();
    println!("Starting server on {address}");

    // Create application state and the idle-connection sweeper
    let app_state = AppState::new(config, Arc::new(OnnxToolkit::new()))?;
    let timeout = std::time::Duration::from_secs(app_state.config.connection_timeout_seconds);
    let sweeper = app_state.registry.spawn_sweeper(timeout);

    let app = server::create_ws_router().with_state(app_state.clone());
    let listener = TcpListener::bind(&address).await?;
    println!("Server listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Orderly shutdown: stop the sweep, close live sessions
    sweeper.abort();
    server::shutdown(&app_state.registry).await;

    Ok(())
}
