use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tinyclaw_config::ConfigStore;
use tinyclaw_core::Dispatcher;
use tinyclaw_invoker::SubprocessInvoker;
use tinyclaw_memory::SqliteMemoryStore;
use tinyclaw_queue::FileQueue;

#[derive(Parser)]
#[command(name = "tinyclaw", version, about = "tinyclaw queue processor daemon")]
struct Cli {
    /// Workspace root, containing incoming/ processing/ outgoing/ events/ files/.
    #[arg(long, env = "TINYCLAW_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Settings document path. Defaults to `<workspace>/config/main.yaml`.
    #[arg(long, env = "TINYCLAW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// HTTP port for the admin/dev event stream and metrics surface.
    #[arg(long, default_value = "4173")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.workspace)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.workspace.join("config/main.yaml"));
    let config_store = ConfigStore::new(&config_path);

    // Fail fast on a missing/malformed settings document rather than
    // starting a dispatcher that will error on every tick.
    config_store
        .load()
        .await
        .with_context(|| format!("failed to load settings from {}", config_path.display()))?;

    let queue = FileQueue::open(&cli.workspace)
        .with_context(|| format!("failed to open queue directories under {}", cli.workspace.display()))?;

    let memory_db_path = cli.workspace.join("data/memory.db");
    if let Some(parent) = memory_db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let memory_store = Arc::new(
        SqliteMemoryStore::open(&memory_db_path).context("failed to open embedded memory store")?,
    );

    let dispatcher = Dispatcher::new(
        queue,
        config_store.clone(),
        vec![],
        Arc::new(SubprocessInvoker::default()),
        memory_store,
        None,
    );

    let recovered = dispatcher
        .recover()
        .await
        .context("failed to recover stranded messages from processing/")?;
    if recovered > 0 {
        tracing::warn!(recovered, "redelivered stranded messages after restart");
    }

    let http_state = tinyclaw_server::state::AppState {
        config_store,
        bus: dispatcher.bus(),
    };
    let http_addr = format!("0.0.0.0:{}", cli.port);
    tokio::spawn(async move {
        if let Err(err) = tinyclaw_server::serve(http_state, &http_addr).await {
            tracing::error!(error = %err, "admin/dev HTTP server exited with error");
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown_rx));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping dispatch loop");
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_handle.await;

    Ok(())
}

fn init_logging(workspace: &std::path::Path) -> Result<()> {
    let log_dir = workspace.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tinyclaw.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked deliberately: the guard must outlive `main`, and this process
    // never tears the logger back down before exit.
    Box::leak(Box::new(guard));

    let env_filter = tracing_subscriber::EnvFilter::try_from_env("TINYCLAW_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received SIGINT");
    }
}
