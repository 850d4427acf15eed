mod app;
mod config;
mod control;
mod domain;
mod forward;
mod http;
mod ingest;
mod logbook;
mod metrics;
mod sink;
mod supervisor;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::app::{ControlState, ReceiverState};
use crate::config::RelayCfg;
use crate::forward::Forwarder;
use crate::logbook::{LogBook, LogKind};
use crate::sink::HttpSink;
use crate::supervisor::{PidFile, ReceiverCommand, Supervisor};

#[derive(Parser)]
#[command(name = "relay", version, about = "RFID reader webhook relay")]
struct Cli {
    /// Configuration file (in addition to ./relay.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept reader webhooks and forward tag reads
    Receive(ServeArgs),
    /// Run the control API that starts and stops the receiver
    Control(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address, overriding config and environment
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Print the resolved listen address and exit
    #[arg(long)]
    print_bind: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = RelayCfg::load(cli.config.as_deref()).context("failed to load configuration")?;

    let (args, bind) = match &cli.command {
        Command::Receive(args) => (args, &mut cfg.receiver.bind),
        Command::Control(args) => (args, &mut cfg.control.bind),
    };
    if let Some(addr) = args.bind {
        *bind = addr;
    }
    if args.print_bind {
        println!("{bind}");
        return Ok(());
    }
    cfg.validate()?;

    init_tracing(&cfg.logs.level);

    match cli.command {
        Command::Receive(_) => run_receiver(cfg).await,
        Command::Control(_) => run_control(cfg, cli.config.as_deref()).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_receiver(cfg: RelayCfg) -> anyhow::Result<()> {
    let logs = LogBook::open(&cfg.logs.dir)
        .with_context(|| format!("cannot create log dir {}", cfg.logs.dir.display()))?;
    let sink = HttpSink::new(&cfg.forward).context("failed to build forward client")?;
    let forwarder = Forwarder::new(Arc::new(sink), cfg.forward.source.clone(), logs.clone());

    let app = http::receiver_router(ReceiverState {
        logs,
        forwarder: Arc::new(forwarder),
    });

    let listener = TcpListener::bind(cfg.receiver.bind)
        .await
        .with_context(|| format!("cannot bind receiver on {}", cfg.receiver.bind))?;
    tracing::info!(forward_url = %cfg.forward.url, "receiver ready");
    http::serve(listener, app).await
}

async fn run_control(cfg: RelayCfg, config_path: Option<&str>) -> anyhow::Result<()> {
    let logs = LogBook::open(&cfg.logs.dir)
        .with_context(|| format!("cannot create log dir {}", cfg.logs.dir.display()))?;
    let command = ReceiverCommand::resolve(&cfg.supervisor, config_path)
        .context("cannot resolve receiver command")?;
    let supervisor = Supervisor::new(
        PidFile::new(&cfg.supervisor.pid_file),
        command,
        logs.path(LogKind::Startup),
        cfg.receiver.bind.port(),
    );

    let app = http::control_router(ControlState {
        supervisor: Arc::new(supervisor),
        logs,
        tail_lines: cfg.logs.tail_lines,
    });

    let listener = TcpListener::bind(cfg.control.bind)
        .await
        .with_context(|| format!("cannot bind control API on {}", cfg.control.bind))?;
    tracing::info!(
        receiver_port = cfg.receiver.bind.port(),
        pid_file = %cfg.supervisor.pid_file.display(),
        "control panel ready"
    );
    http::serve(listener, app).await
}
