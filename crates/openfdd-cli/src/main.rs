#![deny(unsafe_code)]

//! OpenFDD CLI: browse and drive the daemon's devices from a shell.

mod render;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use openfdd_config::ClientConfig;
use openfdd_core::{Session, catalog};

use render::{ActionTree, DeviceTree, OutputFormat};

/// OpenFDD: control devices exposed by the OpenFDD daemon.
#[derive(Parser)]
#[command(name = "openfdd", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "openfdd.toml")]
    config: PathBuf,

    /// Daemon socket path (overrides the configuration file).
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices.
    Devices,

    /// List a device's actions.
    Actions {
        /// Device id.
        device: String,
    },

    /// Describe an action's parameters.
    Params {
        /// Device id.
        device: String,
        /// Action id.
        action: String,
    },

    /// Run an action.
    Run {
        /// Device id.
        device: String,
        /// Action id.
        action: String,
        /// Parameter values in descriptor order.
        #[arg(conflicts_with = "named")]
        values: Vec<String>,
        /// Parameter values by name, ordered using the action's descriptors.
        #[arg(long, value_name = "NAME=VALUE", value_parser = parse_named)]
        named: Vec<(String, String)>,
    },

    /// Walk every device, action, and parameter.
    Tree,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, from_file) = resolve_config(&cli).await?;

    // Logs go to stderr so stdout only carries results
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !from_file {
        debug!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        command => {
            let mut session = connect(&config).await?;
            let output = run_command(&mut session, command, format).await;
            session.close();
            print!("{}", output?);
        }
    }

    Ok(())
}

async fn connect(config: &ClientConfig) -> Result<Session> {
    let session = Session::open(config)
        .await
        .with_context(|| format!("cannot open session on {}", config.connection.socket_path))?;

    // Ctrl-C aborts whatever exchange is pending instead of hanging
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling");
            cancel.cancel();
        }
    });

    Ok(session)
}

async fn run_command(
    session: &mut Session,
    command: Commands,
    format: OutputFormat,
) -> Result<String> {
    match command {
        Commands::Devices => {
            let devices = catalog::list_devices(session).await?;
            render::devices(&devices, format)
        }
        Commands::Actions { device } => {
            let actions = catalog::list_actions(session, &device).await?;
            render::actions(&actions, format)
        }
        Commands::Params { device, action } => {
            let params = catalog::list_action_params(session, &device, &action).await?;
            render::params(&params, format)
        }
        Commands::Run {
            device,
            action,
            values,
            named,
        } => {
            let values = if named.is_empty() {
                values
            } else {
                let params = catalog::list_action_params(session, &device, &action).await?;
                let named: HashMap<String, String> = named.into_iter().collect();
                catalog::order_values(&params, &named)?
            };
            catalog::run_action(session, &device, &action, &values).await?;
            info!(%device, %action, "action ran");
            render::ran(&device, &action, &values, format)
        }
        Commands::Tree => {
            let tree = walk_tree(session).await?;
            render::tree(&tree, format)
        }
        Commands::Config { .. } => anyhow::bail!("config is handled without a session"),
    }
}

async fn walk_tree(session: &mut Session) -> Result<Vec<DeviceTree>> {
    let mut tree = Vec::new();
    for device in catalog::list_devices(session).await? {
        let mut actions = Vec::new();
        for action in device.actions(session).await? {
            let params = action.params(session).await?;
            actions.push(ActionTree { action, params });
        }
        tree.push(DeviceTree { device, actions });
    }
    Ok(tree)
}

fn cmd_config(config_path: &Path, config: &ClientConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load the config file and apply command-line overrides.
async fn resolve_config(cli: &Cli) -> Result<(ClientConfig, bool)> {
    let (mut config, from_file) = load_config(&cli.config).await?;
    if let Some(socket) = &cli.socket {
        config.connection.socket_path = socket.display().to_string();
    }
    Ok((config, from_file))
}

/// Load the config file, or defaults when it does not exist. The flag tells
/// whether the file was read.
async fn load_config(path: &Path) -> Result<(ClientConfig, bool)> {
    if path.exists() {
        let config = ClientConfig::load(path)
            .await
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((ClientConfig::default(), false))
    }
}

fn parse_named(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))
}
