//! Paula interrupt controller and audio/disk control registers.
//!
//! Maps the 14 interrupt sources onto the 68000's six interrupt levels and
//! holds the ADKCON audio/disk control bits the disk controller consults.
//! Sample synthesis is not Paula's business here; audio DMA ends at the
//! AUDxDAT latch.
//!
//! | IPL | INTREQ bits | Sources              |
//! |-----|-------------|----------------------|
//! | 6   | 13          | EXTER (CIA-B)        |
//! | 5   | 11-12       | RBF, DSKSYN          |
//! | 4   | 7-10        | AUD0-3               |
//! | 3   | 4-6         | COPER, VERTB, BLIT   |
//! | 2   | 3           | PORTS (CIA-A)        |
//! | 1   | 0-2         | TBE, DSKBLK, SOFT    |
//!
//! Master enable: INTENA bit 14.

use crate::custom_regs;
use crate::scheduler::{Cycle, NEVER};

// Interrupt sources (INTREQ/INTENA bit numbers).
pub const INT_TBE: u16 = 0;
pub const INT_DSKBLK: u16 = 1;
pub const INT_SOFT: u16 = 2;
pub const INT_PORTS: u16 = 3;
pub const INT_COPER: u16 = 4;
pub const INT_VERTB: u16 = 5;
pub const INT_BLIT: u16 = 6;
pub const INT_AUD0: u16 = 7;
pub const INT_AUD1: u16 = 8;
pub const INT_AUD2: u16 = 9;
pub const INT_AUD3: u16 = 10;
pub const INT_RBF: u16 = 11;
pub const INT_DSKSYN: u16 = 12;
pub const INT_EXTER: u16 = 13;

/// Paula register state.
pub struct Paula {
    /// Interrupt enable (bit 14 = master).
    pub intena: u16,
    /// Interrupt requests.
    pub intreq: u16,
    /// Audio/disk control (bit 10 = WORDSYNC).
    pub adkcon: u16,
    /// AUDxDAT latches, fed by audio DMA slots.
    pub aud_dat: [u16; 4],
    /// Delivery cycle per pending delayed interrupt source.
    irq_due: [Cycle; 16],
}

impl Paula {
    #[must_use]
    pub fn new() -> Self {
        Self {
            intena: 0,
            intreq: 0,
            adkcon: 0,
            aud_dat: [0; 4],
            irq_due: [NEVER; 16],
        }
    }

    pub fn poke_intena(&mut self, value: u16) {
        custom_regs::set_clr_write(&mut self.intena, value);
    }

    pub fn poke_intreq(&mut self, value: u16) {
        custom_regs::set_clr_write(&mut self.intreq, value);
    }

    pub fn poke_adkcon(&mut self, value: u16) {
        custom_regs::set_clr_write(&mut self.adkcon, value);
    }

    /// Raise an interrupt request immediately.
    pub fn raise_irq(&mut self, source: u16) {
        self.intreq |= 1 << source;
    }

    /// Arm an interrupt to be delivered at `due`. The owning chipset keeps
    /// the IRQ slot scheduled at [`next_irq_due`](Self::next_irq_due).
    pub fn raise_irq_at(&mut self, source: u16, due: Cycle) {
        let entry = &mut self.irq_due[source as usize];
        if due < *entry {
            *entry = due;
        }
    }

    /// Earliest pending delayed delivery, `NEVER` when none.
    #[must_use]
    pub fn next_irq_due(&self) -> Cycle {
        self.irq_due.iter().copied().min().unwrap_or(NEVER)
    }

    /// Pending delivery cycle of one source (persistence path).
    #[must_use]
    pub fn irq_due_for(&self, source: u16) -> Cycle {
        self.irq_due[source as usize]
    }

    /// Deliver every delayed interrupt due at `clock`. Returns the next
    /// pending delivery cycle.
    pub fn service_irq_check(&mut self, clock: Cycle) -> Cycle {
        for source in 0..16 {
            if self.irq_due[source] <= clock {
                self.intreq |= 1 << source;
                self.irq_due[source] = NEVER;
            }
        }
        self.next_irq_due()
    }

    /// Active interrupt level presented to the CPU (0-6).
    #[must_use]
    pub fn compute_ipl(&self) -> u8 {
        if self.intena & (1 << 14) == 0 {
            return 0;
        }

        let active = self.intena & self.intreq & 0x3FFF;
        if active == 0 {
            return 0;
        }

        if active & 0x2000 != 0 {
            return 6; // EXTER
        }
        if active & 0x1800 != 0 {
            return 5; // RBF, DSKSYN
        }
        if active & 0x0780 != 0 {
            return 4; // AUD0-3
        }
        if active & 0x0070 != 0 {
            return 3; // COPER, VERTB, BLIT
        }
        if active & 0x0008 != 0 {
            return 2; // PORTS
        }
        if active & 0x0007 != 0 {
            return 1; // TBE, DSKBLK, SOFT
        }

        0
    }
}

impl Default for Paula {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipl_zero_without_master_enable() {
        let mut paula = Paula::new();
        paula.intreq = 0x3FFF;
        paula.intena = 0x3FFF;
        assert_eq!(paula.compute_ipl(), 0);
    }

    #[test]
    fn dsksyn_maps_to_level_5() {
        let mut paula = Paula::new();
        paula.intena = (1 << 14) | (1 << INT_DSKSYN);
        paula.raise_irq(INT_DSKSYN);
        assert_eq!(paula.compute_ipl(), 5);
    }

    #[test]
    fn highest_level_wins() {
        let mut paula = Paula::new();
        paula.intena = (1 << 14) | (1 << INT_DSKBLK) | (1 << INT_EXTER);
        paula.raise_irq(INT_DSKBLK);
        paula.raise_irq(INT_EXTER);
        assert_eq!(paula.compute_ipl(), 6);
    }

    #[test]
    fn delayed_irq_delivers_at_due_cycle() {
        let mut paula = Paula::new();
        paula.raise_irq_at(INT_DSKBLK, 512);
        assert_eq!(paula.next_irq_due(), 512);

        assert_eq!(paula.service_irq_check(511), 512);
        assert_eq!(paula.intreq & (1 << INT_DSKBLK), 0);

        assert_eq!(paula.service_irq_check(512), NEVER);
        assert_ne!(paula.intreq & (1 << INT_DSKBLK), 0);
    }

    #[test]
    fn earlier_delayed_request_wins() {
        let mut paula = Paula::new();
        paula.raise_irq_at(INT_VERTB, 100);
        paula.raise_irq_at(INT_VERTB, 200);
        assert_eq!(paula.next_irq_due(), 100);
    }

    #[test]
    fn adkcon_set_clr() {
        let mut paula = Paula::new();
        paula.poke_adkcon(0x8000 | custom_regs::ADKF_WORDSYNC);
        assert_ne!(paula.adkcon & custom_regs::ADKF_WORDSYNC, 0);
        paula.poke_adkcon(custom_regs::ADKF_WORDSYNC);
        assert_eq!(paula.adkcon & custom_regs::ADKF_WORDSYNC, 0);
    }
}
