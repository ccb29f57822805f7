//! 15-minute up/down trading engine - entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use updown_bot::{app, AppConfig, Application, EnvConfig};
use updown_safety::{kill_process, KillSwitchConfig};
use updown_telemetry::redact;

/// 15-minute binary up/down trading engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (also via UPDOWN_CONFIG).
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading engine (default).
    Run,
    /// Stop a running engine: SIGTERM, then SIGKILL after the
    /// graceful timeout.
    Kill {
        /// Pidfile of the running engine.
        #[arg(long)]
        pidfile: Option<PathBuf>,
    },
    /// Deployment checks: env, database, migrations, manifest.
    Preflight,
}

fn config_path(args: &Args) -> String {
    args.config
        .clone()
        .or_else(|| std::env::var("UPDOWN_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    updown_telemetry::init_logging()?;

    let result = match args.command.as_ref().unwrap_or(&Command::Run) {
        Command::Run => run(&args).await,
        Command::Kill { pidfile } => kill(&args, pidfile.clone()),
        Command::Preflight => preflight(&args).await,
    };

    if let Err(e) = result {
        // Exit code 1 for any failure, secrets scrubbed.
        eprintln!("error: {}", redact(&e.to_string()));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    info!("Starting updown-bot v{}", env!("CARGO_PKG_VERSION"));

    let env = EnvConfig::from_env()?;
    let config = AppConfig::load(&config_path(args))?;

    let application = Application::init(env, config).await?;
    application.run().await?;
    Ok(())
}

fn kill(args: &Args, pidfile: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(&config_path(args))?;
    let kill_config = KillSwitchConfig {
        pidfile: pidfile.unwrap_or_else(|| PathBuf::from(&config.pidfile_path)),
        graceful_timeout_ms: config.timing.graceful_timeout_ms,
        forceful_ceiling_ms: 5_000,
    };
    let outcome = kill_process(&kill_config)?;
    info!(?outcome, "Kill sequence finished");
    Ok(())
}

async fn preflight(args: &Args) -> Result<()> {
    let env = EnvConfig::from_env()?;
    let config = AppConfig::load(&config_path(args))?;
    app::preflight(&env, &config).await?;
    println!("preflight: ok");
    Ok(())
}
