//! Pin state types.

use std::fmt;

use acmemesh_gpio::{KernelId, PinInfo};

/// How a pin is currently used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinMode {
    #[default]
    Unused,
    Input,
    Output,
}

impl PinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinMode::Unused => "unused",
            PinMode::Input => "input",
            PinMode::Output => "output",
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one physical pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinState {
    /// Connector label, uppercase (e.g. `J4.13`).
    pub name: String,
    /// MCU line name, uppercase (e.g. `PA25`).
    pub mcu: String,
    pub kernel_id: KernelId,
    pub mode: PinMode,
    /// Last level driven or observed; `None` while the pin is not in use.
    pub value: Option<u8>,
    /// When set, every write is complemented before it reaches the pin.
    pub invert: bool,
}

impl PinState {
    /// Creates an unused pin from a catalog entry.
    pub fn new(info: PinInfo) -> Self {
        Self {
            name: info.name,
            mcu: info.mcu,
            kernel_id: info.kernel_id,
            mode: PinMode::Unused,
            value: None,
            invert: false,
        }
    }

    /// Applies the invert flag to a requested level.
    pub fn effective(&self, value: u8) -> u8 {
        if self.invert { 1 - value } else { value }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin {} ({}) mode {} value ", self.name, self.mcu, self.mode)?;
        match self.value {
            Some(v) => write!(f, "{}", v),
            None => f.write_str("none"),
        }
    }
}
