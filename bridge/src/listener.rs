//! Listener worker: applies inbound commands.

use std::sync::Arc;

use acmemesh_mesh::{Message, SensorReport, Session, SessionError};
use tokio_util::sync::CancellationToken;

use crate::command::{self, Command};
use crate::handle::RegistryHandle;
use crate::logger::Logger;
use crate::system::{self, SystemControl};
use crate::{log_debug, log_error, log_info, log_warn};

/// Why the listener returned without a session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// The cancel token fired.
    Cancelled,
    /// A `stophandler` command arrived.
    StopRequested,
}

pub struct Listener {
    session: Arc<dyn Session>,
    registry: RegistryHandle,
    system: Arc<dyn SystemControl>,
    logger: Arc<dyn Logger>,
}

impl Listener {
    pub fn new(
        session: Arc<dyn Session>,
        registry: RegistryHandle,
        system: Arc<dyn SystemControl>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            session,
            registry,
            system,
            logger,
        }
    }

    /// Receives and applies messages until cancelled, stopped by command, or
    /// the session fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<ListenerExit, SessionError> {
        log_debug!(self.logger, "listener started");
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log_debug!(self.logger, "listener cancelled");
                    return Ok(ListenerExit::Cancelled);
                }
                msg = self.session.recv() => msg,
            };

            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    log_warn!(self.logger, "listener: {}", e);
                    return Err(e);
                }
            };
            if let Some(exit) = self.handle_message(msg).await? {
                return Ok(exit);
            }
        }
    }

    /// Applies one message. Returns `Some` when the listener should stop.
    pub async fn handle_message(&self, msg: Message) -> Result<Option<ListenerExit>, SessionError> {
        log_debug!(self.logger, "recv {}", msg.kind());
        match msg {
            Message::Broadcast(tokens) => {
                for (i, token) in tokens.iter().enumerate() {
                    let cmd = match command::parse_broadcast(token) {
                        Ok(cmd) => cmd,
                        Err(e) => {
                            log_error!(self.logger, "broadcast: {}", e);
                            continue;
                        }
                    };
                    if let Some(exit) = self.apply(cmd).await? {
                        if i + 1 < tokens.len() {
                            log_warn!(
                                self.logger,
                                "stopping, {} tokens left unprocessed",
                                tokens.len() - i - 1
                            );
                        }
                        return Ok(Some(exit));
                    }
                }
            }
            Message::SensorUpdate(pairs) => {
                for (key, value) in &pairs {
                    self.echo(key, value);
                }
            }
            Message::Unknown(kind) => {
                log_error!(self.logger, "unsupported message kind {:?}", kind);
            }
        }
        Ok(None)
    }

    /// Sensor-update echoes of pin values are recognised but not acted on.
    fn echo(&self, key: &str, value: &str) {
        let Some(name) = command::parse_sensor_key(key) else {
            log_debug!(self.logger, "sensor-update {}={}", key, value);
            return;
        };
        match command::parse_value(value) {
            Ok(v) => match v.as_binary() {
                Some(level) => log_debug!(self.logger, "echo of pin {}: {}", name, level),
                None => log_warn!(self.logger, "echo of pin {}: {:?} is not a level", name, v),
            },
            Err(e) => log_error!(self.logger, "sensor-update {}: {}", key, e),
        }
    }

    /// Applies one command. Registry failures are logged; only session
    /// failures are returned.
    pub async fn apply(&self, cmd: Command) -> Result<Option<ListenerExit>, SessionError> {
        log_debug!(self.logger, "command {:?}", cmd);
        match cmd {
            Command::SetPin { name, on } => {
                if let Err(e) = self.registry.update(&name, on as i64).await {
                    log_error!(self.logger, "pin{}: {}", name, e);
                }
            }
            Command::SetAll { on } => {
                if let Err(e) = self.registry.update_all(on as i64).await {
                    log_error!(self.logger, "all pins: {}", e);
                }
            }
            Command::SetPattern { bits } => {
                if let Err(e) = self.registry.apply_pattern(&bits).await {
                    log_error!(self.logger, "pinpattern: {}", e);
                }
            }
            Command::SetDebug { on } => {
                log_info!(self.logger, "debug {}", if on { "on" } else { "off" });
                self.system.set_debug(on);
            }
            Command::GetTime => {
                self.reply(system::time_report(self.system.now())).await?;
            }
            Command::GetIp => {
                let addr = self.system.ip_address().await;
                if addr.is_none() {
                    log_warn!(self.logger, "no ip address found");
                }
                self.reply(system::ip_report(addr.as_deref())).await?;
            }
            Command::GetVersion => {
                self.reply(system::version_report()).await?;
            }
            Command::Shutdown => {
                log_info!(self.logger, "shutting down the host");
                if let Err(e) = self.system.shutdown().await {
                    log_error!(self.logger, "shutdown: {}", e);
                }
            }
            Command::StopHandler => {
                log_info!(self.logger, "stop requested");
                return Ok(Some(ListenerExit::StopRequested));
            }
        }
        Ok(None)
    }

    async fn reply(&self, report: SensorReport) -> Result<(), SessionError> {
        log_debug!(self.logger, "reply {}", report);
        self.session.send(&report).await
    }
}
