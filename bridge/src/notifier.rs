//! Notifier worker: reports input pin changes.

use std::sync::Arc;
use std::time::Duration;

use acmemesh_mesh::{SensorReport, Session, SessionError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::handle::RegistryHandle;
use crate::logger::Logger;
use crate::{log_debug, log_error};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(50);

pub struct Notifier {
    session: Arc<dyn Session>,
    registry: RegistryHandle,
    logger: Arc<dyn Logger>,
    period: Duration,
    settle: Duration,
}

impl Notifier {
    pub fn new(session: Arc<dyn Session>, registry: RegistryHandle, logger: Arc<dyn Logger>) -> Self {
        Self {
            session,
            registry,
            logger,
            period: DEFAULT_POLL_INTERVAL,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets the pause after each detected change.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Polls until cancelled or a report cannot be sent. A cycle in progress
    /// is finished before the cancel is observed.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SessionError> {
        log_debug!(self.logger, "notifier started, period {:?}", self.period);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log_debug!(self.logger, "notifier cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            self.poll_once().await?;
        }
    }

    /// Runs one poll cycle. Returns the number of changed pins reported.
    pub async fn poll_once(&self) -> Result<usize, SessionError> {
        let names = match self.registry.input_pins().await {
            Ok(names) => names,
            Err(e) => {
                log_error!(self.logger, "notifier: {}", e);
                return Ok(0);
            }
        };

        let mut report = SensorReport::new();
        for name in names {
            match self.registry.poll_input(&name).await {
                Ok(Some(level)) => {
                    report.push(format!("pin{}", name), level);
                    if !self.settle.is_zero() {
                        tokio::time::sleep(self.settle).await;
                    }
                }
                Ok(None) => {}
                Err(e) => log_error!(self.logger, "poll {}: {}", name, e),
            }
        }

        if report.is_empty() {
            return Ok(0);
        }
        log_debug!(self.logger, "changes {}", report);
        self.session.send(&report).await?;
        Ok(report.len())
    }
}
