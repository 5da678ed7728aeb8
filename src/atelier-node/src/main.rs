// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use atelier_app::{init_logging, ConfigFile};
use atelier_core::{DynResult, State, Step};
use atelier_node::console::{spawn_console, Console};
use atelier_node::sim::SimBoard;
use atelier_node::workshops::lost::{self, LostSettings};
use atelier_node::workshops::stranger::{self, StrangerSettings};
use atelier_node::{Controller, NodeConfig, WorkshopKind};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - workshop node controller");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Coordinator WebSocket URL (ws://host:port/path)
    #[arg(short = 'u', long = "url")]
    url: Option<String>,
    /// Workshop to run (stranger, lost)
    #[arg(short = 'w', long = "workshop")]
    workshop: Option<WorkshopKind>,
    /// Device identifier used in logs
    #[arg(long = "device-id")]
    device_id: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", NodeConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = NodeConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        cfg.general.log_level = Some(level);
    }
    init_logging(cfg.general.log_level.as_deref());

    if let Some(path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    if let Some(kind) = cli.workshop {
        cfg.workshop.kind = kind;
    }
    if let Some(device_id) = cli.device_id {
        cfg.general.device_id = Some(device_id);
    }

    // CLI > config [session] section > error
    let url = cli
        .url
        .or_else(|| cfg.session.url.clone())
        .ok_or("Coordinator URL not specified. Use --url or set [session].url in config.")?;
    cfg.validate()?;

    info!(
        "Starting atelier-node (workshop: {}, coordinator: {})",
        cfg.workshop.kind, url
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(cfg, url))
}

async fn run(cfg: NodeConfig, url: String) -> DynResult<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    match cfg.workshop.kind {
        WorkshopKind::Stranger => {
            let initial = stranger::initial(StrangerSettings::from_config(&cfg.workshop));
            run_workshop(&cfg, url, initial, shutdown_rx).await
        }
        WorkshopKind::Lost => {
            let initial = lost::initial(LostSettings::from_config(&cfg.workshop));
            run_workshop(&cfg, url, initial, shutdown_rx).await
        }
    }
}

async fn run_workshop<S: Step>(
    cfg: &NodeConfig,
    url: String,
    initial: Box<dyn State<S>>,
    shutdown_rx: watch::Receiver<bool>,
) -> DynResult<()> {
    let board = SimBoard::new();
    let mut controller = Controller::from_config(cfg, url, &board, initial)?;

    if cfg.runtime.console {
        let console = Console::new(board, controller.event_sender(), tap_hold(cfg));
        spawn_console(console)?;
    }

    controller.run(shutdown_rx).await?;
    info!("atelier-node stopped");
    Ok(())
}

/// Long enough for a console tap to survive debounce and be sampled.
fn tap_hold(cfg: &NodeConfig) -> Duration {
    let debounce = cfg
        .peripherals
        .buttons
        .iter()
        .map(|b| b.debounce_ms)
        .max()
        .unwrap_or(0);
    Duration::from_millis(debounce + 3 * cfg.runtime.sample_interval_ms)
}
