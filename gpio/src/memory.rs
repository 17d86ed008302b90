//! In-memory GPIO driver.
//!
//! Keeps line directions and levels in a table instead of touching hardware.
//! Used for offline runs and for tests, which can inject input levels and
//! access failures and inspect the operations the driver saw.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::access::{Direction, PinAccess};
use crate::board::{self, Board, KernelId, PinInfo};
use crate::error::{Error, Result};

/// An operation recorded by [`MemoryPins`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    Direction(KernelId, Direction),
    Read(KernelId),
    Write(KernelId, u8),
}

#[derive(Debug, Clone, Copy)]
struct Line {
    direction: Direction,
    level: u8,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            direction: Direction::Input,
            level: 0,
        }
    }
}

#[derive(Default)]
struct Inner {
    lines: HashMap<KernelId, Line>,
    ops: Vec<PinOp>,
    fail_writes: bool,
    fail_reads: bool,
}

/// In-memory [`PinAccess`].
pub struct MemoryPins {
    catalog: Option<Vec<PinInfo>>,
    inner: Mutex<Inner>,
}

impl MemoryPins {
    /// Creates a driver that serves the built-in board catalogs.
    pub fn new() -> Self {
        Self {
            catalog: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Creates a driver that serves `pins` as the catalog of every board.
    pub fn with_catalog(pins: Vec<PinInfo>) -> Self {
        Self {
            catalog: Some(pins),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Sets the level seen by reads of `id`, as an external signal would.
    pub fn set_level(&self, id: KernelId, level: u8) {
        self.inner.lock().lines.entry(id).or_default().level = level;
    }

    /// Returns the current level of `id`.
    pub fn level(&self, id: KernelId) -> u8 {
        self.inner.lock().lines.get(&id).map(|l| l.level).unwrap_or(0)
    }

    /// Returns the current direction of `id`.
    pub fn direction(&self, id: KernelId) -> Direction {
        self.inner
            .lock()
            .lines
            .get(&id)
            .map(|l| l.direction)
            .unwrap_or(Direction::Input)
    }

    /// Makes subsequent writes and direction changes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Makes subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    /// Returns every operation seen so far.
    pub fn ops(&self) -> Vec<PinOp> {
        self.inner.lock().ops.clone()
    }

    /// Returns the number of value writes seen so far.
    pub fn write_count(&self) -> usize {
        self.inner
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, PinOp::Write(..)))
            .count()
    }

    /// Forgets recorded operations.
    pub fn clear_ops(&self) {
        self.inner.lock().ops.clear();
    }
}

impl Default for MemoryPins {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PinAccess for MemoryPins {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn catalog(&self, board: Board) -> Result<Vec<PinInfo>> {
        match &self.catalog {
            Some(pins) => Ok(pins.clone()),
            None => board::catalog(board),
        }
    }

    async fn set_direction(&self, id: KernelId, direction: Direction) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ops.push(PinOp::Direction(id, direction));
        if inner.fail_writes {
            return Err(Error::Unavailable(format!("direction {} injected failure", id)));
        }
        inner.lines.entry(id).or_default().direction = direction;
        Ok(())
    }

    async fn read(&self, id: KernelId) -> Result<u8> {
        let mut inner = self.inner.lock();
        inner.ops.push(PinOp::Read(id));
        if inner.fail_reads {
            return Err(Error::Unavailable(format!("read {} injected failure", id)));
        }
        Ok(inner.lines.get(&id).map(|l| l.level).unwrap_or(0))
    }

    async fn write(&self, id: KernelId, value: u8) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ops.push(PinOp::Write(id, value));
        if inner.fail_writes {
            return Err(Error::Unavailable(format!("write {} injected failure", id)));
        }
        if value > 1 {
            return Err(Error::InvalidValue(value.to_string()));
        }
        inner.lines.entry(id).or_default().level = value;
        Ok(())
    }
}
