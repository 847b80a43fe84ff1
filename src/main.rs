#![deny(unsafe_code)]

mod common;
mod config;
mod daemon;
mod launcher;
mod poller;
mod progress;
mod rpc;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, Overrides};

#[derive(Parser, Debug)]
#[command(name = "transmission-launcher")]
#[command(version)]
#[command(
    about = "Show Transmission download progress on a desktop launcher icon",
    long_about = None
)]
struct Cli {
    /// Transmission RPC host
    #[arg(long)]
    host: Option<String>,

    /// Transmission RPC port
    #[arg(short, long)]
    port: Option<u16>,

    /// URL path of the RPC endpoint
    #[arg(long)]
    rpc_path: Option<String>,

    /// RPC username
    #[arg(short, long)]
    user: Option<String>,

    /// RPC password
    #[arg(long, env = "TRANSMISSION_RPC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds between progress updates
    #[arg(short, long)]
    interval: Option<u64>,

    /// Desktop entry id of the launcher icon to decorate
    #[arg(short, long)]
    launcher: Option<String>,

    /// Add a "Turtle Mode" toggle to the launcher quicklist
    #[arg(long)]
    turtle: bool,

    /// Seconds to wait for a spawned daemon to accept RPC connections
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Config file (defaults to the XDG config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug mode with verbose logging
    #[arg(long)]
    debug: bool,

    /// Start this command as the torrent daemon and exit when it exits
    /// (e.g. `--spawn transmission-daemon -f`)
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    spawn: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            rpc_path: self.rpc_path.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            interval: self.interval,
            launcher: self.launcher.clone(),
            turtle: self.turtle,
            connect_timeout: self.connect_timeout,
            spawn: self.spawn.clone(),
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(Config::default_path);
    let mut config = match &path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply(cli.overrides());
    config.validate().context("Invalid configuration")?;
    debug!(config_path = ?path, host = %config.host, port = config.port, "Configuration loaded");
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter_directives = if cli.debug {
        // Debug mode: detailed logs for our app, keep HTTP and D-Bus libraries at info
        "info,transmission_launcher=debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter_directives));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = load_config(&cli)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let code = rt.block_on(poller::run_poller(config))?;
    Ok(ExitCode::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_spawn_takes_trailing_arguments() {
        let cli = Cli::try_parse_from([
            "transmission-launcher",
            "--turtle",
            "-i",
            "5",
            "--spawn",
            "transmission-daemon",
            "-f",
            "--log-level=error",
        ])
        .unwrap();

        assert!(cli.turtle);
        assert_eq!(cli.interval, Some(5));
        assert_eq!(
            cli.spawn,
            vec!["transmission-daemon", "-f", "--log-level=error"]
        );
    }

    #[test]
    fn test_overrides_reach_config() {
        let cli = Cli::try_parse_from([
            "transmission-launcher",
            "--host",
            "nas.local",
            "-p",
            "9092",
            "-l",
            "transmission-qt.desktop",
        ])
        .unwrap();

        let mut config = Config::default();
        config.apply(cli.overrides());
        assert_eq!(config.rpc_url(), "http://nas.local:9092/transmission/rpc");
        assert_eq!(config.launcher, "transmission-qt.desktop");
    }
}
