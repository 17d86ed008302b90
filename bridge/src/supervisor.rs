//! Connection supervisor.
//!
//! Owns the connect/serve/teardown cycle:
//!
//! ```text
//! Start --connect ok--> Running --worker fails--> Disconnected --cool-down--> Start
//!   ^  |                   |                          |
//!   +--+ connect failed    +-- stophandler / cancel --+--> exit (pins reset)
//! ```
//!
//! While `Running`, a [`Listener`] and a [`Notifier`] share the session. When
//! either one ends, the other is cancelled and both are joined before the
//! pins are reset.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use acmemesh_mesh::{Connector, Session, SessionError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::SupervisorError;
use crate::handle::RegistryHandle;
use crate::listener::{Listener, ListenerExit};
use crate::logger::{Logger, default_logger};
use crate::notifier::Notifier;
use crate::pin::PinMode;
use crate::system::SystemControl;
use crate::{log_debug, log_error, log_info, log_warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; connecting.
    Start,
    /// Session open, both workers alive.
    Running,
    /// Session broken; workers being torn down.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Start => "start",
            ConnectionState::Running => "running",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Observable supervisor events, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    State(ConnectionState),
    ConnectFailed { attempt: u32 },
    WorkersJoined,
    PinsReset,
}

/// How [`Supervisor::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// A `stophandler` command arrived.
    Stopped,
    /// The shutdown token fired.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Failed connect attempts before giving up; 0 retries forever.
    pub retry_limit: u32,
    /// Clear the failure count whenever a session starts.
    pub reset_retries_on_connect: bool,
    pub connect_delay: Duration,
    pub cooldown: Duration,
    pub poll_interval: Duration,
    pub settle: Duration,
    /// Pins put in input mode whenever a session starts.
    pub inputs: Vec<String>,
    /// Pins inverted whenever a session starts.
    pub inverted: Vec<String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SupervisorOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            retry_limit: cfg.retry_limit,
            reset_retries_on_connect: cfg.reset_retries_on_connect,
            connect_delay: cfg.connect_delay(),
            cooldown: cfg.cooldown(),
            poll_interval: cfg.poll_interval(),
            settle: cfg.settle(),
            inputs: cfg.inputs.clone(),
            inverted: cfg.inverted.clone(),
        }
    }
}

enum Ending {
    Stop,
    Interrupted,
    Disconnected(String),
}

pub struct Supervisor {
    connector: Arc<dyn Connector>,
    registry: RegistryHandle,
    system: Arc<dyn SystemControl>,
    logger: Arc<dyn Logger>,
    options: SupervisorOptions,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn Connector>,
        registry: RegistryHandle,
        system: Arc<dyn SystemControl>,
        options: SupervisorOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Start);
        let (events, _) = broadcast::channel(64);
        Self {
            connector,
            registry,
            system,
            logger: default_logger(),
            options,
            state_tx,
            events,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Watches the current state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribes to events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SupervisorEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|cur| {
            if *cur == state {
                false
            } else {
                *cur = state;
                true
            }
        });
        if changed {
            log_info!(self.logger, "state {}", state);
            self.emit(SupervisorEvent::State(state));
        }
    }

    /// Runs the connection loop until a stop command, `shutdown`, or the
    /// retry limit. Pins are reset on every exit path.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<Exit, SupervisorError> {
        let mut failures: u32 = 0;
        self.state_tx.send_replace(ConnectionState::Start);
        self.emit(SupervisorEvent::State(ConnectionState::Start));
        log_info!(self.logger, "connecting to {}", self.connector.target());

        loop {
            self.set_state(ConnectionState::Start);

            if !sleep_unless(self.options.connect_delay, &shutdown).await {
                self.reset_pins().await;
                return Ok(Exit::Interrupted);
            }

            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                r = self.connector.connect() => Some(r),
            };
            let session = match connected {
                None => {
                    self.reset_pins().await;
                    return Ok(Exit::Interrupted);
                }
                Some(Ok(session)) => session,
                Some(Err(e)) => {
                    failures += 1;
                    self.emit(SupervisorEvent::ConnectFailed { attempt: failures });
                    log_warn!(
                        self.logger,
                        "connect to {} failed (attempt {}): {}",
                        self.connector.target(),
                        failures,
                        e
                    );
                    if self.options.retry_limit != 0 && failures >= self.options.retry_limit {
                        log_error!(self.logger, "giving up after {} attempts", failures);
                        self.reset_pins().await;
                        return Err(SupervisorError::RetriesExhausted {
                            attempts: failures,
                            last: e,
                        });
                    }
                    continue;
                }
            };

            if self.options.reset_retries_on_connect {
                failures = 0;
            }
            self.prepare_pins().await;
            self.set_state(ConnectionState::Running);

            let ending = self.serve(session.clone(), &shutdown).await;
            if let Err(e) = session.close().await {
                log_debug!(self.logger, "close: {}", e);
            }
            self.reset_pins().await;

            match ending {
                Ending::Stop => return Ok(Exit::Stopped),
                Ending::Interrupted => return Ok(Exit::Interrupted),
                Ending::Disconnected(_) => {
                    if !sleep_unless(self.options.cooldown, &shutdown).await {
                        return Ok(Exit::Interrupted);
                    }
                }
            }
        }
    }

    /// Applies the configured input and inverted pins.
    async fn prepare_pins(&self) {
        for name in &self.options.inputs {
            if let Err(e) = self.registry.set_mode(name, PinMode::Input).await {
                log_error!(self.logger, "input pin {}: {}", name, e);
            }
        }
        for name in &self.options.inverted {
            if let Err(e) = self.registry.set_invert(name, true).await {
                log_error!(self.logger, "inverted pin {}: {}", name, e);
            }
        }
    }

    async fn reset_pins(&self) {
        match self.registry.reset_all().await {
            Ok(()) => {
                log_debug!(self.logger, "pins reset");
                self.emit(SupervisorEvent::PinsReset);
            }
            Err(e) => log_error!(self.logger, "reset pins: {}", e),
        }
    }

    /// Runs both workers until one of them ends or `shutdown` fires, then
    /// stops and joins the other.
    async fn serve(&self, session: Arc<dyn Session>, shutdown: &CancellationToken) -> Ending {
        let worker_cancel = shutdown.child_token();

        let listener = Listener::new(
            session.clone(),
            self.registry.clone(),
            self.system.clone(),
            self.logger.clone(),
        );
        let notifier = Notifier::new(session, self.registry.clone(), self.logger.clone())
            .with_period(self.options.poll_interval)
            .with_settle(self.options.settle);

        let mut listener_task = tokio::spawn(listener.run(worker_cancel.clone()));
        let mut notifier_task = tokio::spawn(notifier.run(worker_cancel.clone()));

        let mut listener_done = None;
        let mut notifier_done = None;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            r = &mut listener_task => listener_done = Some(listener_ending(r)),
            r = &mut notifier_task => notifier_done = Some(notifier_ending(r)),
        }

        if let Some(Ending::Disconnected(reason)) = listener_done.as_ref().or(notifier_done.as_ref()) {
            log_warn!(self.logger, "connection lost: {}", reason);
            self.set_state(ConnectionState::Disconnected);
        }

        worker_cancel.cancel();
        let from_listener = match listener_done {
            Some(e) => e,
            None => listener_ending(listener_task.await),
        };
        let from_notifier = match notifier_done {
            Some(e) => e,
            None => notifier_ending(notifier_task.await),
        };
        log_debug!(self.logger, "workers joined");
        self.emit(SupervisorEvent::WorkersJoined);

        // A stop command wins over a failure seen while tearing down.
        match (from_listener, from_notifier) {
            (Ending::Stop, _) => Ending::Stop,
            (Ending::Disconnected(r), _) | (_, Ending::Disconnected(r)) => {
                if shutdown.is_cancelled() {
                    Ending::Interrupted
                } else {
                    Ending::Disconnected(r)
                }
            }
            _ => Ending::Interrupted,
        }
    }
}

fn listener_ending(r: Result<Result<ListenerExit, SessionError>, JoinError>) -> Ending {
    match r {
        Ok(Ok(ListenerExit::StopRequested)) => Ending::Stop,
        Ok(Ok(ListenerExit::Cancelled)) => Ending::Interrupted,
        Ok(Err(e)) => Ending::Disconnected(format!("listener: {}", e)),
        Err(e) => Ending::Disconnected(format!("listener task: {}", e)),
    }
}

fn notifier_ending(r: Result<Result<(), SessionError>, JoinError>) -> Ending {
    match r {
        Ok(Ok(())) => Ending::Interrupted,
        Ok(Err(e)) => Ending::Disconnected(format!("notifier: {}", e)),
        Err(e) => Ending::Disconnected(format!("notifier task: {}", e)),
    }
}

/// Sleeps for `d`. Returns false if `cancel` fired first.
async fn sleep_unless(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}
