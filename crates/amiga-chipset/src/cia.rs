//! Parallel interface bridge: the CIA port lines the drives hang off.
//!
//! Only the port plumbing is modelled here; CIA timers, TOD clocks and the
//! keyboard serial port belong to an external CIA emulation. CIA-B port B
//! carries the drive control signals, CIA-A port A returns the composed
//! drive status flags, and the CIA-B FLAG pin receives a falling edge for
//! every index pulse of the selected drive.
//!
//! Port B bit layout (all active-low):
//! `| /MTR | /SEL3 | /SEL2 | /SEL1 | /SEL0 | /SIDE | DIR | /STEP |`

use drive_amiga_floppy::{Cycle, Drive};

use crate::disk_controller::DiskController;

/// The adapter-port surface between CPU-visible CIAs and the drives.
pub struct CiaBridge {
    /// CIA-B port B output register.
    prb: u8,
    /// Falling-edge latch on the CIA-B FLAG pin (index pulse seen).
    flag_edge: bool,
    /// Index pulses seen since power-on.
    index_count: u64,
}

impl CiaBridge {
    #[must_use]
    pub fn new() -> Self {
        Self {
            // All lines deasserted (high) after reset.
            prb: 0xFF,
            flag_edge: false,
            index_count: 0,
        }
    }

    #[must_use]
    pub fn prb(&self) -> u8 {
        self.prb
    }

    /// A CPU write to CIA-B PRB: decode select/motor/step/side edges across
    /// all drives.
    pub fn poke_prb(
        &mut self,
        value: u8,
        dc: &mut DiskController,
        drives: &mut [Drive; 4],
        clock: Cycle,
    ) {
        let old = self.prb;
        self.prb = value;
        if old != value {
            log::trace!("PRB {old:02X} -> {value:02X}");
            dc.prb_did_change(old, value, drives, clock);
        }
    }

    /// A CPU read of CIA-A PRA: the drive status flags, AND-composed over
    /// all connected drives.
    #[must_use]
    pub fn peek_pra(&self, dc: &DiskController, drives: &[Drive; 4], clock: Cycle) -> u8 {
        dc.drive_status_flags(drives, clock)
    }

    /// Record a falling edge on the CIA-B FLAG pin (index pulse).
    pub fn record_index_pulse(&mut self) {
        self.flag_edge = true;
        self.index_count += 1;
    }

    /// Drain the FLAG edge latch (the external CIA emulation polls this).
    pub fn take_flag_edge(&mut self) -> bool {
        std::mem::take(&mut self.flag_edge)
    }

    #[must_use]
    pub fn index_count(&self) -> u64 {
        self.index_count
    }

    /// Rebuild port state from a snapshot.
    pub fn restore(&mut self, prb: u8, index_count: u64) {
        self.prb = prb;
        self.index_count = index_count;
        self.flag_edge = false;
    }
}

impl Default for CiaBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_amiga_floppy::DriveConfig;

    fn make_drives() -> [Drive; 4] {
        [
            Drive::new(0, DriveConfig::default()),
            Drive::new(1, DriveConfig::default()),
            Drive::new(2, DriveConfig::default()),
            Drive::new(3, DriveConfig::default()),
        ]
    }

    #[test]
    fn select_edge_reaches_drive_and_controller() {
        let mut bridge = CiaBridge::new();
        let mut dc = DiskController::new();
        let mut drives = make_drives();

        // Select DF0 (SEL0 low), motor line low (on).
        bridge.poke_prb(0x7F & !0b1000, &mut dc, &mut drives, 0);
        assert_eq!(dc.selected, Some(0));
        assert!(drives[0].motor());
    }

    #[test]
    fn deselect_clears_selection() {
        let mut bridge = CiaBridge::new();
        let mut dc = DiskController::new();
        let mut drives = make_drives();

        bridge.poke_prb(0xFF & !0b1000, &mut dc, &mut drives, 0);
        assert_eq!(dc.selected, Some(0));
        bridge.poke_prb(0xFF, &mut dc, &mut drives, 0);
        assert_eq!(dc.selected, None);
    }

    #[test]
    fn unconnected_drives_are_invisible() {
        let mut bridge = CiaBridge::new();
        let mut dc = DiskController::new();
        let mut drives = make_drives();

        // DF1 is not connected by default.
        bridge.poke_prb(0xFF & !0b10000, &mut dc, &mut drives, 0);
        assert_eq!(dc.selected, None);
    }

    #[test]
    fn status_read_composes_track0() {
        let bridge = CiaBridge::new();
        let mut dc = DiskController::new();
        let mut drives = make_drives();

        // Select DF0: its head starts at cylinder 0, so /DSKTRACK0 is low.
        dc.prb_did_change(0xFF, 0xFF & !0b1000, &mut drives, 0);
        let pra = bridge.peek_pra(&dc, &drives, 0);
        assert_eq!(pra & 0b1_0000, 0);
    }

    #[test]
    fn flag_edge_latch_drains() {
        let mut bridge = CiaBridge::new();
        bridge.record_index_pulse();
        assert!(bridge.take_flag_edge());
        assert!(!bridge.take_flag_edge());
        assert_eq!(bridge.index_count(), 1);
    }
}
