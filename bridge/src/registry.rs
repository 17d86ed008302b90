//! Pin registry: the in-memory model of every pin of the board.
//!
//! [`PinRegistry`] pairs each catalog pin with its [`PinState`] and keeps the
//! two in step with the hardware through a [`PinAccess`]. It is owned by a
//! single task (see [`crate::handle`]), so its methods take `&mut self` and
//! need no locking.
//!
//! Per-item failures (unknown pin, bad value, bad pattern) come back as
//! [`RegistryError`]. Hardware failures are logged and swallowed; the
//! in-memory state keeps the value that was requested.

use std::collections::HashMap;
use std::sync::Arc;

use acmemesh_gpio::{Direction, PinAccess, PinInfo};
use tracing::{debug, error, warn};

use crate::error::RegistryError;
use crate::pin::{PinMode, PinState};

/// What [`PinRegistry::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The pin already held the value; nothing was written.
    Unchanged,
    /// The output pin was driven to the new value.
    Written,
    /// The pin was claimed as an output and driven to the new value.
    Promoted,
}

pub struct PinRegistry {
    access: Arc<dyn PinAccess>,
    pins: Vec<PinState>,
    /// Connector names and MCU aliases, uppercase, to positions in `pins`.
    index: HashMap<String, usize>,
}

impl PinRegistry {
    /// Creates a registry with every catalog pin unused. No hardware is
    /// touched.
    pub fn new(access: Arc<dyn PinAccess>, catalog: Vec<PinInfo>) -> Self {
        let mut index = HashMap::with_capacity(catalog.len() * 2);
        for (i, info) in catalog.iter().enumerate() {
            index.insert(info.name.clone(), i);
            index.entry(info.mcu.clone()).or_insert(i);
        }
        let pins = catalog.into_iter().map(PinState::new).collect();
        Self { access, pins, index }
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Resolves a connector name or MCU alias, case-insensitively.
    fn position(&self, name: &str) -> Result<usize, RegistryError> {
        let key = name.trim().to_ascii_uppercase();
        self.index
            .get(&key)
            .copied()
            .ok_or(RegistryError::UnknownPin(key))
    }

    /// Returns true if `name` resolves to a pin.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    /// Returns the state of one pin.
    pub fn get(&self, name: &str) -> Result<&PinState, RegistryError> {
        let i = self.position(name)?;
        Ok(&self.pins[i])
    }

    /// Returns a copy of every pin state, in catalog order.
    pub fn snapshot(&self) -> Vec<PinState> {
        self.pins.clone()
    }

    /// Returns the names of the pins in input mode, in catalog order.
    pub fn input_pins(&self) -> Vec<String> {
        self.pins
            .iter()
            .filter(|p| p.mode == PinMode::Input)
            .map(|p| p.name.clone())
            .collect()
    }

    async fn drive_direction(&self, i: usize, direction: Direction) {
        let pin = &self.pins[i];
        if let Err(e) = self.access.set_direction(pin.kernel_id, direction).await {
            error!("pin {}: set direction {}: {}", pin.name, direction, e);
        }
    }

    async fn drive_value(&self, i: usize, value: u8) {
        let pin = &self.pins[i];
        if let Err(e) = self.access.write(pin.kernel_id, value).await {
            error!("pin {}: write {}: {}", pin.name, value, e);
        }
    }

    /// Changes the mode of a pin. Returns false if the pin was already in
    /// `mode`.
    ///
    /// Input and unused pins are configured as hardware inputs. Their stored
    /// value is cleared, so the next poll of an input reports its level. A
    /// new output starts low.
    pub async fn set_mode(&mut self, name: &str, mode: PinMode) -> Result<bool, RegistryError> {
        let i = self.position(name)?;
        if self.pins[i].mode == mode {
            return Ok(false);
        }

        let direction = match mode {
            PinMode::Output => Direction::Output,
            PinMode::Input | PinMode::Unused => Direction::Input,
        };
        let pin = &mut self.pins[i];
        debug!("pin {}: mode {} -> {}", pin.name, pin.mode, mode);
        pin.mode = mode;
        pin.value = (mode == PinMode::Output).then_some(0);
        self.drive_direction(i, direction).await;
        if mode == PinMode::Output {
            self.drive_value(i, 0).await;
        }
        Ok(true)
    }

    /// Sets a pin to `value` (0 or 1).
    ///
    /// The invert flag is applied first. If the resulting level is already
    /// stored, nothing happens. A pin that is not an output is claimed as one.
    pub async fn update(&mut self, name: &str, value: i64) -> Result<WriteOutcome, RegistryError> {
        let i = self.position(name)?;
        let value = binary(value)?;
        self.update_at(i, value).await
    }

    async fn update_at(&mut self, i: usize, value: u8) -> Result<WriteOutcome, RegistryError> {
        let pin = &mut self.pins[i];
        let level = pin.effective(value);
        if pin.value == Some(level) {
            debug!("pin {}: already {}", pin.name, level);
            return Ok(WriteOutcome::Unchanged);
        }

        // State is recorded before the hardware call and kept on failure.
        pin.value = Some(level);
        let outcome = if pin.mode == PinMode::Output {
            WriteOutcome::Written
        } else {
            debug!("pin {}: {} -> output", pin.name, pin.mode);
            pin.mode = PinMode::Output;
            WriteOutcome::Promoted
        };

        if outcome == WriteOutcome::Promoted {
            self.drive_direction(i, Direction::Output).await;
        }
        self.drive_value(i, level).await;
        Ok(outcome)
    }

    /// Reads the hardware level of a pin. Access failures read as 0.
    pub async fn read(&self, name: &str) -> Result<u8, RegistryError> {
        let i = self.position(name)?;
        let pin = &self.pins[i];
        match self.access.read(pin.kernel_id).await {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("pin {}: read: {}", pin.name, e);
                Ok(0)
            }
        }
    }

    /// Sets every pin to `value`. Anything but 0 or 1 is rejected before any
    /// pin is touched. Returns the number of pins that changed.
    pub async fn update_all(&mut self, value: i64) -> Result<usize, RegistryError> {
        let value = binary(value)?;
        let mut changed = 0;
        for i in 0..self.pins.len() {
            if self.update_at(i, value).await? != WriteOutcome::Unchanged {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Applies a bit pattern to the unused and output pins.
    ///
    /// The pattern is left-padded with `0` to the pin count and consumed from
    /// its rightmost bit: the first eligible pin in catalog order takes the
    /// last bit, the next eligible pin the one before, and so on. Input pins
    /// take no bit. A `1` bit drives the pin to 0 and a `0` bit drives it to
    /// 1. An empty pattern is all zeros. Returns the number of pins that
    /// changed.
    pub async fn apply_pattern(&mut self, bits: &str) -> Result<usize, RegistryError> {
        let bits = bits.trim();
        if !bits.chars().all(|c| c == '0' || c == '1') {
            return Err(RegistryError::InvalidPattern(bits.to_string()));
        }

        let pad = self.pins.len().saturating_sub(bits.len());
        let pattern: Vec<u8> = std::iter::repeat_n(b'0', pad)
            .chain(bits.bytes())
            .collect();

        let eligible: Vec<usize> = (0..self.pins.len())
            .filter(|&i| matches!(self.pins[i].mode, PinMode::Unused | PinMode::Output))
            .collect();

        let mut changed = 0;
        for (j, i) in eligible.into_iter().enumerate() {
            let bit = pattern[pattern.len() - 1 - j];
            let value = if bit == b'1' { 0 } else { 1 };
            if self.update_at(i, value).await? != WriteOutcome::Unchanged {
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn set_invert(&mut self, name: &str, on: bool) -> Result<(), RegistryError> {
        let i = self.position(name)?;
        self.pins[i].invert = on;
        Ok(())
    }

    pub fn set_all_invert(&mut self, on: bool) {
        for pin in &mut self.pins {
            pin.invert = on;
        }
    }

    /// Returns a pin to its unused state.
    pub async fn reset(&mut self, name: &str) -> Result<(), RegistryError> {
        let i = self.position(name)?;
        self.reset_at(i).await;
        Ok(())
    }

    async fn reset_at(&mut self, i: usize) {
        let pin = &mut self.pins[i];
        let was_used = pin.mode != PinMode::Unused;
        pin.mode = PinMode::Unused;
        pin.value = None;
        pin.invert = false;
        if was_used {
            debug!("pin {}: reset", pin.name);
            self.drive_direction(i, Direction::Input).await;
        }
    }

    /// Returns every pin to its unused state.
    pub async fn reset_all(&mut self) {
        for i in 0..self.pins.len() {
            self.reset_at(i).await;
        }
    }

    /// Reads an input pin and stores the level. Returns the level if it
    /// differs from the stored one. Pins not in input mode are skipped.
    pub async fn poll_input(&mut self, name: &str) -> Result<Option<u8>, RegistryError> {
        let i = self.position(name)?;
        if self.pins[i].mode != PinMode::Input {
            return Ok(None);
        }

        let pin = &self.pins[i];
        let level = match self.access.read(pin.kernel_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!("pin {}: poll: {}", pin.name, e);
                0
            }
        };

        let pin = &mut self.pins[i];
        if pin.value == Some(level) {
            return Ok(None);
        }
        debug!("pin {}: input {:?} -> {}", pin.name, pin.value, level);
        pin.value = Some(level);
        Ok(Some(level))
    }
}

fn binary(value: i64) -> Result<u8, RegistryError> {
    match value {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(RegistryError::InvalidValue(other)),
    }
}
