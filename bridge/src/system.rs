//! Host side effects reachable from broadcast commands.

use std::io;
use std::sync::Arc;

use acmemesh_mesh::SensorReport;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tokio::process::Command;
use tracing::{debug, warn};

/// Version reported by `getversion`.
pub const VERSION: &str = concat!(
    "v",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// Host operations the listener may trigger.
#[async_trait]
pub trait SystemControl: Send + Sync {
    /// Returns the local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Returns the host's source address for its default route.
    async fn ip_address(&self) -> Option<String>;

    /// Powers the host off.
    async fn shutdown(&self) -> io::Result<()>;

    /// Switches debug logging on or off.
    fn set_debug(&self, on: bool);
}

type DebugHook = Arc<dyn Fn(bool) + Send + Sync>;

/// [`SystemControl`] for the machine the bridge runs on.
#[derive(Clone, Default)]
pub struct HostSystem {
    debug_hook: Option<DebugHook>,
}

impl HostSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the function that applies `sghdebugon`/`sghdebugoff`.
    pub fn with_debug_hook(mut self, hook: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.debug_hook = Some(Arc::new(hook));
        self
    }
}

#[async_trait]
impl SystemControl for HostSystem {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn ip_address(&self) -> Option<String> {
        let output = match Command::new("ip").args(["route", "list"]).output().await {
            Ok(out) => out,
            Err(e) => {
                warn!("ip route list: {}", e);
                return None;
            }
        };
        parse_ip_route(&String::from_utf8_lossy(&output.stdout))
    }

    async fn shutdown(&self) -> io::Result<()> {
        let status = Command::new("sudo")
            .args(["shutdown", "-h", "now"])
            .status()
            .await?;
        if !status.success() {
            return Err(io::Error::other(format!("shutdown exited with {}", status)));
        }
        Ok(())
    }

    fn set_debug(&self, on: bool) {
        match &self.debug_hook {
            Some(hook) => hook(on),
            None => debug!("no debug hook installed"),
        }
    }
}

/// Returns the word after the first `src` in `ip route list` output.
pub fn parse_ip_route(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word == "src" {
            return words.next().map(str::to_string);
        }
    }
    None
}

/// Builds the `gettime` report.
pub fn time_report(now: NaiveDateTime) -> SensorReport {
    SensorReport::new()
        .with("fulldatetime", now.format("%Y%m%d%H%M%S"))
        .with("hours", now.format("%H"))
        .with("minutes", now.format("%M"))
        .with("seconds", now.format("%S"))
}

/// Builds the `getip` report. An unknown address is reported empty.
pub fn ip_report(addr: Option<&str>) -> SensorReport {
    SensorReport::new().with("ipaddress", addr.unwrap_or(""))
}

/// Builds the `getversion` report.
pub fn version_report() -> SensorReport {
    SensorReport::new().with("version", VERSION)
}
