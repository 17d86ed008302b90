//! Board definitions and pin catalogs.
//!
//! Each Acme Systems board exposes its GPIOs on one or more connectors. A pin
//! is known by its connector label (e.g. `J4.13`) and by the name of the MCU
//! line behind it (e.g. `PA25`). The kernel addresses the line by a numeric
//! id derived from the MCU name.

use std::fmt;

use crate::error::{Error, Result};

/// Numeric GPIO id used by the kernel's sysfs interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u32);

/// First kernel id of bank A on AT91 SoCs.
const BANK_BASE: u32 = 32;
const BANK_SIZE: u32 = 32;

impl KernelId {
    /// Derives the kernel id from an MCU line name like `PA23` or `pc1`.
    pub fn from_mcu(mcu: &str) -> Result<Self> {
        let upper = mcu.trim().to_ascii_uppercase();
        let rest = upper
            .strip_prefix('P')
            .ok_or_else(|| Error::InvalidMcuName(mcu.to_string()))?;
        let mut chars = rest.chars();
        let bank = match chars.next() {
            Some(c @ 'A'..='E') => c as u32 - 'A' as u32,
            _ => return Err(Error::InvalidMcuName(mcu.to_string())),
        };
        let offset: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidMcuName(mcu.to_string()))?;
        if offset >= BANK_SIZE {
            return Err(Error::InvalidMcuName(mcu.to_string()));
        }
        Ok(KernelId(BANK_BASE + bank * BANK_SIZE + offset))
    }

    /// Name of the directory the kernel creates under the sysfs root once the
    /// line is exported (`pioA23` for id 55).
    pub fn sysfs_dir(&self) -> String {
        let rel = self.0.saturating_sub(BANK_BASE);
        let bank = (b'A' + (rel / BANK_SIZE) as u8) as char;
        format!("pio{}{}", bank, rel % BANK_SIZE)
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported board families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Board {
    AriettaG25,
    AriaG25,
    FoxBoardG20,
    Daisy,
    AcquaA5,
}

impl Board {
    pub const ALL: [Board; 5] = [
        Board::AriettaG25,
        Board::AriaG25,
        Board::FoxBoardG20,
        Board::Daisy,
        Board::AcquaA5,
    ];

    /// Parses a board from its canonical name (`Arietta_G25`, `Daisy`, ...).
    /// Matching ignores case.
    pub fn from_name(name: &str) -> Result<Self> {
        Board::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::UnsupportedBoard(name.to_string()))
    }

    /// Returns the canonical board name.
    pub fn name(&self) -> &'static str {
        match self {
            Board::AriettaG25 => "Arietta_G25",
            Board::AriaG25 => "Aria_G25",
            Board::FoxBoardG20 => "FOX_Board_G20",
            Board::Daisy => "Daisy",
            Board::AcquaA5 => "Acqua_A5",
        }
    }

    /// Connector prefixes whose pins are exposed on this board.
    pub fn connectors(&self) -> &'static [&'static str] {
        match self {
            Board::AriettaG25 => &["J4."],
            Board::AriaG25 => &["N", "E", "S", "W"],
            Board::FoxBoardG20 => &["J7.", "J6."],
            Board::Daisy => &[
                "D1.", "D2.", "D3.", "D4.", "D5.", "D6.", "D7.", "D8.", "D10.", "D11.", "D12.",
                "D13.", "D14.", "D15.", "D16.", "D17.",
            ],
            Board::AcquaA5 => &["J1.", "J2.", "J3."],
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a board's pin table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinDef {
    /// Connector label.
    pub name: &'static str,
    /// MCU line name.
    pub mcu: &'static str,
}

/// Catalog entry handed to the pin registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinInfo {
    pub name: String,
    pub mcu: String,
    pub kernel_id: KernelId,
}

impl PinInfo {
    /// Builds a catalog entry, deriving the kernel id from the MCU name.
    pub fn new(name: impl Into<String>, mcu: impl Into<String>) -> Result<Self> {
        let mcu = mcu.into().to_ascii_uppercase();
        let kernel_id = KernelId::from_mcu(&mcu)?;
        Ok(Self {
            name: name.into().to_ascii_uppercase(),
            mcu,
            kernel_id,
        })
    }
}

// Arietta G25, connector J4 (pins 1-6, 9, 16, 18, 20, 22 are power/ground).
const ARIETTA_G25: &[PinDef] = &[
    PinDef { name: "J4.7", mcu: "PA23" },
    PinDef { name: "J4.8", mcu: "PA22" },
    PinDef { name: "J4.10", mcu: "PA21" },
    PinDef { name: "J4.11", mcu: "PA24" },
    PinDef { name: "J4.12", mcu: "PA31" },
    PinDef { name: "J4.13", mcu: "PA25" },
    PinDef { name: "J4.14", mcu: "PA30" },
    PinDef { name: "J4.15", mcu: "PA26" },
    PinDef { name: "J4.17", mcu: "PA27" },
    PinDef { name: "J4.19", mcu: "PA28" },
    PinDef { name: "J4.21", mcu: "PA29" },
    PinDef { name: "J4.23", mcu: "PA0" },
    PinDef { name: "J4.24", mcu: "PA1" },
    PinDef { name: "J4.25", mcu: "PA8" },
    PinDef { name: "J4.26", mcu: "PA7" },
    PinDef { name: "J4.27", mcu: "PA6" },
    PinDef { name: "J4.28", mcu: "PA5" },
    PinDef { name: "J4.29", mcu: "PC1" },
    PinDef { name: "J4.30", mcu: "PC0" },
    PinDef { name: "J4.31", mcu: "PC4" },
    PinDef { name: "J4.32", mcu: "PC3" },
    PinDef { name: "J4.33", mcu: "PB11" },
    PinDef { name: "J4.34", mcu: "PB12" },
    PinDef { name: "J4.35", mcu: "PB13" },
    PinDef { name: "J4.36", mcu: "PB14" },
];

/// Returns the raw pin table of a board. Boards without a table return an
/// empty slice.
pub fn board_pins(board: Board) -> &'static [PinDef] {
    match board {
        Board::AriettaG25 => ARIETTA_G25,
        _ => &[],
    }
}

/// Builds the pin catalog of a board: its pin table filtered to the board's
/// connectors, in table order.
pub fn catalog(board: Board) -> Result<Vec<PinInfo>> {
    let pins = board_pins(board)
        .iter()
        .filter(|def| board.connectors().iter().any(|c| def.name.starts_with(c)))
        .map(|def| PinInfo::new(def.name, def.mcu))
        .collect::<Result<Vec<_>>>()?;

    if pins.is_empty() {
        return Err(Error::UnsupportedBoard(board.name().to_string()));
    }
    Ok(pins)
}

#[cfg(test)]
mod board_tests {
    use super::*;

    #[test]
    fn test_kernel_id_from_mcu() {
        assert_eq!(KernelId::from_mcu("PA0").unwrap(), KernelId(32));
        assert_eq!(KernelId::from_mcu("PA23").unwrap(), KernelId(55));
        assert_eq!(KernelId::from_mcu("pb11").unwrap(), KernelId(75));
        assert_eq!(KernelId::from_mcu("PC1").unwrap(), KernelId(97));
    }

    #[test]
    fn test_kernel_id_rejects_bad_names() {
        assert!(KernelId::from_mcu("J4.7").is_err());
        assert!(KernelId::from_mcu("PZ1").is_err());
        assert!(KernelId::from_mcu("PA").is_err());
        assert!(KernelId::from_mcu("PA32").is_err());
    }

    #[test]
    fn test_sysfs_dir() {
        assert_eq!(KernelId(55).sysfs_dir(), "pioA23");
        assert_eq!(KernelId(97).sysfs_dir(), "pioC1");
        assert_eq!(KernelId::from_mcu("PB14").unwrap().sysfs_dir(), "pioB14");
    }

    #[test]
    fn test_board_from_name() {
        assert_eq!(Board::from_name("Arietta_G25").unwrap(), Board::AriettaG25);
        assert_eq!(Board::from_name("daisy").unwrap(), Board::Daisy);
        assert!(matches!(
            Board::from_name("RaspberryPi"),
            Err(Error::UnsupportedBoard(_))
        ));
    }

    #[test]
    fn test_arietta_catalog() {
        let pins = catalog(Board::AriettaG25).unwrap();
        assert_eq!(pins.len(), 25);
        assert_eq!(pins[0].name, "J4.7");
        assert_eq!(pins[0].kernel_id, KernelId(55));

        let pa25 = pins.iter().find(|p| p.mcu == "PA25").unwrap();
        assert_eq!(pa25.name, "J4.13");
    }

    #[test]
    fn test_catalog_names_unique() {
        let pins = catalog(Board::AriettaG25).unwrap();
        let mut names: Vec<_> = pins.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), pins.len());
    }

    #[test]
    fn test_board_without_table_is_unsupported() {
        assert!(matches!(
            catalog(Board::Daisy),
            Err(Error::UnsupportedBoard(name)) if name == "Daisy"
        ));
    }
}
