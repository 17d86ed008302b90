//! Startup assembly.

use std::sync::Arc;

use acmemesh_gpio::{Board, PinAccess};
use acmemesh_mesh::Connector;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result, SupervisorError};
use crate::handle::{RegistryHandle, spawn_registry};
use crate::registry::PinRegistry;
use crate::supervisor::{ConnectionState, Exit, Supervisor, SupervisorEvent, SupervisorOptions};
use crate::system::SystemControl;

/// A fully assembled bridge, ready to run.
pub struct Bridge {
    board: Board,
    registry: RegistryHandle,
    supervisor: Supervisor,
}

impl Bridge {
    /// Resolves the board, probes the GPIO driver, loads the pin catalog,
    /// checks the configured pin names and starts the registry task. Any
    /// failure here is fatal.
    pub async fn new(
        config: Config,
        access: Arc<dyn PinAccess>,
        connector: Arc<dyn Connector>,
        system: Arc<dyn SystemControl>,
    ) -> Result<Self> {
        config.validate()?;
        let board = Board::from_name(&config.board)?;
        access.probe().await?;
        let catalog = access.catalog(board)?;
        info!(
            "board {} via {} driver, {} pins",
            board,
            access.name(),
            catalog.len()
        );

        let registry = PinRegistry::new(access, catalog);
        for (field, names) in [("inputs", &config.inputs), ("inverted", &config.inverted)] {
            if let Some(bad) = names.iter().find(|n| !registry.contains(n)) {
                return Err(Error::Config(format!(
                    "{}: unknown pin {} on board {}",
                    field, bad, board
                )));
            }
        }

        let registry = spawn_registry(registry);
        let supervisor = Supervisor::new(
            connector,
            registry.clone(),
            system,
            SupervisorOptions::from(&config),
        );
        Ok(Self {
            board,
            registry,
            supervisor,
        })
    }

    pub fn board(&self) -> Board {
        self.board
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn state(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.supervisor.state()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SupervisorEvent> {
        self.supervisor.subscribe()
    }

    /// Runs the connection loop. See [`Supervisor::run`].
    pub async fn run(&self, shutdown: CancellationToken) -> std::result::Result<Exit, SupervisorError> {
        self.supervisor.run(shutdown).await
    }
}
