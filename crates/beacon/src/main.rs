use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use tokio::net::TcpListener;

use beacon::api::{AppState, create_router};
use beacon::settings::Settings;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common)?;

    match cli.command {
        Command::Serve(cmd) => async_main(cli.common, cmd),
    }
}

#[tokio::main]
async fn async_main(common: CommonOpts, cmd: ServeCommand) -> Result<()> {
    handle_serve(&common, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Beacon - real-time SSE push broker.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the push broker server
    Serve(ServeCommand),
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,
    /// Bind port (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging(common: &CommonOpts) -> Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if common.quiet {
        log::set_max_level(LevelFilter::Off);
        return Ok(());
    }

    let level = match common.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("beacon={level},tower_http={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    // Also init env_logger for compatibility with log crate users
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.try_init().ok();

    Ok(())
}

async fn handle_serve(common: &CommonOpts, cmd: ServeCommand) -> Result<()> {
    let mut settings = Settings::load(common.config.as_deref())?;
    if let Some(host) = cmd.host {
        settings.host = host;
    }
    if let Some(port) = cmd.port {
        settings.port = port;
    }

    let state = AppState::new(settings.clone());
    let hub = state.hub.clone();
    let router = create_router(state);

    let listener = TcpListener::bind(settings.bind_addr())
        .await
        .with_context(|| format!("binding {}", settings.bind_addr()))?;
    let addr = listener.local_addr().context("reading bound address")?;
    info!("beacon listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    hub.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => log::error!("failed to listen for shutdown signal: {err}"),
    }
}
