//! atomspace-hub: serve named atomspaces over per-space WebSockets.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use atomspace_hub::config::ServerConfig;
use atomspace_hub::ingest;
use atomspace_hub::server;
use atomspace_hub::space::SpaceRegistry;

#[derive(Parser)]
#[command(
    name = "atomspace-hub",
    version,
    about = "Serve named atomspaces for pattern-matching queries over WebSockets"
)]
struct Cli {
    /// Path to the settings JSON file listing the atomspaces to load.
    #[arg(short = 'C', long)]
    config: PathBuf,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "9001")]
    port: u16,

    /// Runtime worker threads (defaults to the number of cores).
    #[arg(long)]
    workers: Option<usize>,

    /// Largest accepted query message, in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_payload: usize,

    /// Close connections idle for this many seconds (0 disables).
    #[arg(long, default_value = "0")]
    idle_timeout: u64,

    /// Pause result streaming once this many bytes are queued for a client.
    #[arg(long, default_value_t = 1024 * 1024)]
    max_backpressure: usize,

    /// Close a paused connection that does not drain within this many seconds.
    #[arg(long, default_value = "10")]
    drain_timeout: u64,

    /// Give up on a streamed query after this many seconds (0 waits forever).
    #[arg(long, default_value = "0")]
    query_timeout: u64,

    /// Request per-message compression.
    #[arg(long)]
    compression: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_payload: self.max_payload,
            idle_timeout: ServerConfig::secs_or_none(self.idle_timeout),
            max_backpressure: self.max_backpressure,
            drain_timeout: Duration::from_secs(self.drain_timeout.max(1)),
            query_timeout: ServerConfig::secs_or_none(self.query_timeout),
            compression: self.compression,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn")),
        )
        .init();

    let registry = Arc::new(SpaceRegistry::new());
    let start = Instant::now();
    let reports = ingest::load_settings_file(&registry, &cli.config)?;
    tracing::info!(
        spaces = reports.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "all atomspaces loaded"
    );

    let workers = cli.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.max(1))
        .thread_name("atomspace-hub-worker")
        .enable_all()
        .build()
        .into_diagnostic()?;

    let addr = format!("{}:{}", cli.bind, cli.port);
    let app = server::router(registry, cli.server_config());

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .into_diagnostic()?;
        server::serve(listener, app, shutdown_signal()).await?;
        Ok(())
    })
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
    tracing::info!("atomspace-hub shutting down");
}
