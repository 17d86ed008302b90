//! acmemesh - drive Acme Systems board GPIOs from a Scratch mesh.

use std::path::PathBuf;
use std::sync::Arc;

use acmemesh_bridge::{Bridge, Config, Exit, HostSystem};
use acmemesh_gpio::{MemoryPins, PinAccess, SysfsPins, sysfs::DEFAULT_SYSFS_ROOT};
use acmemesh_mesh::TcpConnector;
use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod logging;

/// Connects to a Scratch remote-sensor mesh and maps its broadcasts onto
/// the board's GPIO pins.
///
/// Broadcasts understood: pin<NAME>on, pin<NAME>off, allon, alloff,
/// pinpattern<bits>, sghdebugon, sghdebugoff, gettime, getip, getversion,
/// shutdown, stophandler.
#[derive(Parser, Debug)]
#[command(name = "acmemesh")]
#[command(version)]
pub struct Cli {
    /// Config file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address of the host running the mesh (Scratch)
    #[arg(short = 'm', long = "mesh")]
    pub mesh: Option<String>,

    /// Board name
    #[arg(short = 'b', long)]
    pub board: Option<String>,

    /// Debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Log to stdout instead of the log file
    #[arg(short = 'p', long)]
    pub stdout: bool,

    /// Log file
    #[arg(long, default_value = "/tmp/acmemesh.log")]
    pub log_file: PathBuf,

    /// Use in-memory pins instead of the GPIO hardware
    #[arg(short = 'o', long)]
    pub offline: bool,

    /// Connect attempts before giving up (0 = forever)
    #[arg(long)]
    pub retry_limit: Option<u32>,

    /// Input poll interval in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Root of the sysfs GPIO interface
    #[arg(long, default_value = DEFAULT_SYSFS_ROOT)]
    pub gpio_root: PathBuf,
}

impl Cli {
    /// Loads the config file, if any, and applies flag overrides.
    fn config(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(mesh) = &self.mesh {
            cfg.remote_address = mesh.clone();
        }
        if let Some(board) = &self.board {
            cfg.board = board.clone();
        }
        if let Some(limit) = self.retry_limit {
            cfg.retry_limit = limit;
        }
        if let Some(ms) = self.poll_interval {
            cfg.poll_interval_ms = ms;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log = logging::init(cli.debug, cli.stdout, &cli.log_file)?;
    let config = cli.config()?;

    info!(
        "acmemesh {} board {} mesh {}",
        acmemesh_bridge::system::VERSION,
        config.board,
        config.remote_address
    );

    let access: Arc<dyn PinAccess> = if cli.offline {
        Arc::new(MemoryPins::new())
    } else {
        Arc::new(SysfsPins::new(&cli.gpio_root))
    };
    let connector = TcpConnector::new(&config.remote_address)
        .with_connect_timeout(config.connect_timeout());
    let system = HostSystem::new().with_debug_hook(move |on| log.set_debug(on));

    let bridge = Bridge::new(config, access, Arc::new(connector), Arc::new(system))
        .await
        .context("startup")?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupted");
                    shutdown.cancel();
                }
                Err(e) => error!("ctrl-c handler: {}", e),
            }
        });
    }

    match bridge.run(shutdown).await {
        Ok(Exit::Stopped) => info!("stopped by stophandler"),
        Ok(Exit::Interrupted) => info!("stopped by interrupt"),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    }
    Ok(())
}
