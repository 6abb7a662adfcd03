//! cloudperfd — the cloudperf stack daemon.
//!
//! One binary that assembles the whole stack:
//! - State store (redb)
//! - Edge listener with the priority rule table
//! - Health monitor
//! - Object-ingestion pipeline behind the control API
//!
//! # Usage
//!
//! ```text
//! cloudperfd --config config/cloudperf.toml deploy
//! cloudperfd --config config/cloudperf.toml serve
//! cloudperfd route --path /api/status
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use cloudperf_core::{ObjectWriteEvent, RequestDescriptor, StackConfig};
use cloudperf_edge::{EdgeListener, HttpAdminInvoker, HttpForwarder};
use cloudperf_health::HealthMonitor;
use cloudperf_router::HealthBoard;
use cloudperf_stack::Stack;
use cloudperf_state::StateStore;
use cloudperfd::{ControlState, build_router};

#[derive(Parser)]
#[command(name = "cloudperfd", about = "cloudperf stack daemon")]
struct Cli {
    /// Stack configuration file. Defaults to the built-in reference stack.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state.
    #[arg(long, global = true, default_value = ".cloudperf")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the stack, run the init invocation and record the deployment.
    Deploy,

    /// Run the edge listener, health monitor and control API.
    Serve {
        /// Override the edge bind address.
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Override the control API bind address.
        #[arg(long)]
        control_bind: Option<SocketAddr>,
    },

    /// Show which rule would handle a request, without invoking anything.
    Route {
        #[arg(long)]
        path: String,

        /// Query parameter as `key=value`; repeatable.
        #[arg(long = "query")]
        query: Vec<String>,

        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Feed a single object-created event through the ingestion pipeline.
    Ingest {
        #[arg(long)]
        bucket: Option<String>,

        #[arg(long)]
        key: String,

        #[arg(long, default_value = "0")]
        size: u64,
    },

    /// Print the deployment outputs.
    Outputs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref())?;
    let state = open_state(&cli.data_dir)?;
    let stack = Stack::build(config, state).context("invalid stack configuration")?;

    match cli.command {
        Command::Deploy => deploy(&stack).await,
        Command::Serve { bind, control_bind } => serve(stack, bind, control_bind).await,
        Command::Route {
            path,
            query,
            method,
        } => route(&stack, &method, &path, &query),
        Command::Ingest { bucket, key, size } => ingest(&stack, bucket, &key, size).await,
        Command::Outputs => print_json(&stack.outputs()),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,cloudperfd=debug,cloudperf=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StackConfig> {
    match path {
        Some(path) => StackConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            info!("no --config given, using the reference stack");
            Ok(StackConfig::reference())
        }
    }
}

fn open_state(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("cloudperf.redb");
    let state = StateStore::open(&db_path)
        .with_context(|| format!("failed to open state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");
    Ok(state)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn deploy(stack: &Stack) -> anyhow::Result<()> {
    let report = stack
        .deploy(Arc::new(HttpAdminInvoker::new()))
        .await
        .context("deployment failed")?;
    print_json(&report)
}

async fn serve(
    stack: Stack,
    bind: Option<SocketAddr>,
    control_bind: Option<SocketAddr>,
) -> anyhow::Result<()> {
    stack
        .ensure_deployed()
        .context("refusing to serve; run `cloudperfd deploy` with this config first")?;

    let edge_addr = match bind {
        Some(addr) => addr,
        None => stack.config().edge.bind.parse().context("invalid edge bind address")?,
    };
    let control_addr = match control_bind {
        Some(addr) => addr,
        None => stack
            .config()
            .edge
            .control_bind
            .parse()
            .context("invalid control bind address")?,
    };

    let board = HealthBoard::new();
    let monitor = HealthMonitor::new(board.clone());
    let monitored = monitor.start_all(stack.registry(), stack.table()).await;
    info!(targets = monitored, "health monitor started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = stack.dispatcher(board.clone(), Arc::new(HttpForwarder::new()));
    let edge = EdgeListener::bind(edge_addr, dispatcher).await?;
    let edge_handle = tokio::spawn(edge.serve(shutdown_rx.clone()));

    let control = ControlState {
        pipeline: stack.pipeline(Arc::new(HttpAdminInvoker::new())),
        outputs: stack.outputs(),
        state: stack.state().clone(),
        health: board,
    };
    let router = build_router(control);
    let listener = tokio::net::TcpListener::bind(control_addr)
        .await
        .with_context(|| format!("failed to bind control API on {control_addr}"))?;
    info!(addr = %control_addr, "control API starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    monitor.stop_all().await;
    edge_handle.await??;

    info!("cloudperf daemon stopped");
    Ok(())
}

fn route(stack: &Stack, method: &str, path: &str, query: &[String]) -> anyhow::Result<()> {
    let mut req = RequestDescriptor::new(&method.to_uppercase(), path);
    for pair in query {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("query parameter `{pair}` is not key=value"))?;
        req = req.with_query(key, value);
    }

    let dispatcher = stack.dispatcher(HealthBoard::new(), Arc::new(HttpForwarder::new()));
    match dispatcher.dispatch(&req) {
        Ok(decision) => print_json(&json!({
            "priority": decision.priority,
            "action": decision.action,
        })),
        Err(e) => print_json(&json!({
            "status": e.status(),
            "error": e.to_string(),
        })),
    }
}

async fn ingest(stack: &Stack, bucket: Option<String>, key: &str, size: u64) -> anyhow::Result<()> {
    let bucket = bucket.unwrap_or_else(|| stack.config().object_store.bucket.clone());
    let event = ObjectWriteEvent::created(&bucket, key, size);
    let pipeline = stack.pipeline(Arc::new(HttpAdminInvoker::new()));
    let records = pipeline.handle(&event).await.context("ingestion failed")?;
    if records.is_empty() {
        info!(%bucket, %key, "no event rule matched");
    }
    print_json(&records)
}
