//! Chipset configuration and model presets.

use drive_amiga_floppy::DriveConfig;

use crate::agnus::AgnusRevision;
use crate::beam::Region;

/// One drive bay.
#[derive(Debug, Clone, Copy)]
pub struct DriveSlot {
    pub connected: bool,
    pub mechanics: DriveConfig,
}

impl DriveSlot {
    #[must_use]
    pub fn connected() -> Self {
        Self {
            connected: true,
            mechanics: DriveConfig::default(),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            connected: false,
            mechanics: DriveConfig::default(),
        }
    }
}

/// Full chipset configuration.
#[derive(Debug, Clone, Copy)]
pub struct ChipsetConfig {
    pub region: Region,
    pub revision: AgnusRevision,
    /// Chip RAM size in bytes (power of two).
    pub chip_ram_size: usize,
    /// DF0..DF3. DF0 is always treated as connected.
    pub drives: [DriveSlot; 4],
}

impl ChipsetConfig {
    /// A500-style preset: PAL, OCS Agnus, 512K chip RAM, internal drive
    /// only.
    #[must_use]
    pub fn a500() -> Self {
        Self {
            region: Region::Pal,
            revision: AgnusRevision::Ocs8367,
            chip_ram_size: 512 * 1024,
            drives: [
                DriveSlot::connected(),
                DriveSlot::empty(),
                DriveSlot::empty(),
                DriveSlot::empty(),
            ],
        }
    }

    /// A500 plus one external drive on DF1.
    #[must_use]
    pub fn a500_with_external_drive() -> Self {
        let mut config = Self::a500();
        config.drives[1] = DriveSlot::connected();
        config
    }
}

impl Default for ChipsetConfig {
    fn default() -> Self {
        Self::a500()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a500_preset() {
        let config = ChipsetConfig::a500();
        assert_eq!(config.region, Region::Pal);
        assert_eq!(config.chip_ram_size, 512 * 1024);
        assert!(config.drives[0].connected);
        assert!(!config.drives[1].connected);
    }
}
