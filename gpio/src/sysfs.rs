//! Sysfs GPIO driver (`/sys/class/gpio`).
//!
//! Lines are exported on first use by writing their kernel id to `export`.
//! The AT91 kernels used on Acme boards name the exported directory after the
//! MCU line (`pioA23`) rather than `gpio55`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::access::{Direction, PinAccess};
use crate::board::{self, Board, KernelId, PinInfo};
use crate::error::{Error, Result};

/// Default sysfs GPIO root.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// How long to wait for the kernel to create an exported line's directory.
const EXPORT_WAIT: Duration = Duration::from_millis(100);
const EXPORT_POLLS: u32 = 10;

/// Sysfs-backed [`PinAccess`].
pub struct SysfsPins {
    root: PathBuf,
    exported: Mutex<HashSet<KernelId>>,
}

impl SysfsPins {
    /// Creates a driver rooted at `root` (normally [`DEFAULT_SYSFS_ROOT`]).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exported: Mutex::new(HashSet::new()),
        }
    }

    fn line_dir(&self, id: KernelId) -> PathBuf {
        self.root.join(id.sysfs_dir())
    }

    async fn ensure_exported(&self, id: KernelId) -> Result<()> {
        if self.exported.lock().contains(&id) {
            return Ok(());
        }

        let dir = self.line_dir(id);
        if !line_present(&dir).await? {
            let export = self.root.join("export");
            tokio::fs::write(&export, id.to_string())
                .await
                .map_err(|e| Error::io(&export, e))?;
            debug!("exported gpio {} ({})", id, id.sysfs_dir());

            let mut polls = 0;
            while !line_present(&dir).await? {
                polls += 1;
                if polls > EXPORT_POLLS {
                    return Err(Error::Unavailable(format!(
                        "{} did not appear after export",
                        dir.display()
                    )));
                }
                tokio::time::sleep(EXPORT_WAIT).await;
            }
        }

        self.exported.lock().insert(id);
        Ok(())
    }
}

async fn line_present(dir: &Path) -> Result<bool> {
    tokio::fs::try_exists(dir)
        .await
        .map_err(|e| Error::io(dir, e))
}

impl Default for SysfsPins {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

#[async_trait]
impl PinAccess for SysfsPins {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    async fn probe(&self) -> Result<()> {
        let export = self.root.join("export");
        match tokio::fs::metadata(&export).await {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::Unavailable(format!("{}: {}", export.display(), e))),
        }
    }

    fn catalog(&self, board: Board) -> Result<Vec<PinInfo>> {
        board::catalog(board)
    }

    async fn set_direction(&self, id: KernelId, direction: Direction) -> Result<()> {
        self.ensure_exported(id).await?;
        let path = self.line_dir(id).join("direction");
        tokio::fs::write(&path, direction.as_str())
            .await
            .map_err(|e| Error::io(&path, e))
    }

    async fn read(&self, id: KernelId) -> Result<u8> {
        self.ensure_exported(id).await?;
        let path = self.line_dir(id).join("value");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        match raw.trim() {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(Error::InvalidValue(other.to_string())),
        }
    }

    async fn write(&self, id: KernelId, value: u8) -> Result<()> {
        if value > 1 {
            return Err(Error::InvalidValue(value.to_string()));
        }
        self.ensure_exported(id).await?;
        let path = self.line_dir(id).join("value");
        tokio::fs::write(&path, value.to_string())
            .await
            .map_err(|e| Error::io(&path, e))
    }
}
