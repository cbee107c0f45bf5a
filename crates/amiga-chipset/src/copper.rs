//! Copper: the display-list co-processor.
//!
//! A two-word instruction machine with exactly three instructions:
//!
//! - MOVE (ins1 bit 0 = 0): write ins2 to the custom register in ins1
//! - WAIT (ins1 bit 0 = 1, ins2 bit 0 = 0): sleep until the beam comparator
//!   triggers
//! - SKIP (ins1 bit 0 = 1, ins2 bit 0 = 1): latch a skip of the next MOVE if
//!   the comparator already triggers
//!
//! The copper fetches through the bus arbiter and silently loses cycles to
//! fixed DMA; the state machine itself lives in the scheduler's COP slot,
//! serviced by the chipset. This module holds the architectural state and
//! the comparator circuit.

use crate::beam::Beam;

/// Copper state. The scheduled COP event id mirrors this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopperState {
    /// Waiting for a free bus cycle before the first fetch.
    #[default]
    RequestDma,
    /// About to fetch the first instruction word.
    Fetch,
    /// About to fetch the second word of a MOVE.
    Move,
    /// About to fetch the second word of a WAIT or SKIP.
    WaitOrSkip,
    /// Sleeping on the beam comparator.
    Wait,
    /// About to load the program counter from COP1LC.
    Jmp1,
    /// About to load the program counter from COP2LC.
    Jmp2,
}

/// Inspection record.
#[derive(Debug, Clone, Copy)]
pub struct CopperInfo {
    pub state: CopperState,
    pub pc: u32,
    pub loc: [u32; 2],
    pub danger: bool,
}

/// Copper architectural state.
pub struct Copper {
    pub state: CopperState,
    /// Program counter, masked to chip RAM on every access.
    pub pc: u32,
    /// Restart pointers COP1LC/COP2LC.
    pub loc: [u32; 2],
    /// First instruction word.
    pub ins1: u16,
    /// Second instruction word.
    pub ins2: u16,
    /// Latched by SKIP, consumed by the next MOVE.
    pub skip: bool,
    /// COPCON danger bit: opens registers $040-$07E to MOVE.
    pub danger: bool,
}

impl Copper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CopperState::RequestDma,
            pc: 0,
            loc: [0; 2],
            ins1: 0,
            ins2: 0,
            skip: false,
            danger: false,
        }
    }

    /// "This is a 1-bit register that when set true, allows the Copper to
    /// access the blitter hardware. This bit is cleared by power-on reset."
    /// [HRM]
    pub fn poke_copcon(&mut self, value: u16) {
        self.danger = value & crate::custom_regs::COPF_CDANG != 0;
        log::trace!("COPCON danger = {}", self.danger);
    }

    pub fn poke_loc_high(&mut self, x: usize, value: u16) {
        self.loc[x] = (self.loc[x] & 0x0000_FFFF) | (u32::from(value) << 16);
    }

    pub fn poke_loc_low(&mut self, x: usize, value: u16) {
        self.loc[x] = (self.loc[x] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
    }

    /// COPINS is a dummy address writing whichever instruction register the
    /// current state would load next.
    pub fn poke_copins(&mut self, value: u16) {
        if matches!(self.state, CopperState::Move | CopperState::WaitOrSkip) {
            self.ins2 = value;
        } else {
            self.ins1 = value;
        }
    }

    /// A MOVE target the copper may not reach: below $40 always, below $80
    /// without the danger bit.
    #[must_use]
    pub fn illegal_address(&self, reg: u16) -> bool {
        let reg = reg & 0x1FE;
        reg < if self.danger { 0x40 } else { 0x80 }
    }

    #[must_use]
    pub fn is_move(&self) -> bool {
        self.ins1 & 1 == 0
    }

    #[must_use]
    pub fn is_wait(&self) -> bool {
        self.ins1 & 1 == 1 && self.ins2 & 1 == 0
    }

    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.ins1 & 1 == 1 && self.ins2 & 1 == 1
    }

    /// Comparison value of a WAIT/SKIP (VP in bits 8-15, HP in 1-7).
    #[must_use]
    pub fn wait_position(&self) -> u32 {
        u32::from(self.ins1 & 0xFFFE)
    }

    /// Comparison mask of a WAIT/SKIP.
    #[must_use]
    pub fn wait_mask(&self) -> u32 {
        u32::from(self.ins2 & 0x7FFE)
    }

    /// The comparator circuit. Only the low 16 bits of the beam take part;
    /// VP8 is invisible to the copper.
    #[must_use]
    pub fn comparator(beam: u32, waitpos: u32, mask: u32) -> bool {
        (beam & 0xFFFF & mask) >= (waitpos & mask)
    }

    /// Whether the currently latched WAIT/SKIP condition holds at `beam`.
    #[must_use]
    pub fn condition_met(&self, beam: Beam) -> bool {
        Self::comparator(beam.packed(), self.wait_position(), self.wait_mask())
    }

    /// The smallest beam position `>= beam` at which the latched condition
    /// triggers.
    ///
    /// Starting from the all-ones position, each bit is cleared from the
    /// top down whenever the result still satisfies both constraints; the
    /// remaining lower bits stand in for the largest possible completion. A
    /// result whose vertical part lies beyond the frame means the condition
    /// cannot trigger this frame.
    ///
    /// The packed descent can produce a horizontal part no real line
    /// reaches (h > $E3); such a position is unreachable on its line, so
    /// the search resumes from the start of the next one.
    #[must_use]
    pub fn next_trigger_position(&self, beam: Beam) -> Beam {
        let mut from = beam.packed();

        loop {
            let mut pos: u32 = 0x1FFFF;
            for i in (0..=16).rev() {
                let candidate = pos & !(1 << i);
                if candidate >= from
                    && Self::comparator(candidate, self.wait_position(), self.wait_mask())
                {
                    pos = candidate;
                }
            }

            let result = Beam::from_packed(pos);
            if result.h <= crate::beam::HPOS_MAX || result.v >= 0x1FF {
                return result;
            }
            from = Beam::new(result.v + 1, 0).packed();
        }
    }
}

impl Default for Copper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copper_with_wait(ins1: u16, ins2: u16) -> Copper {
        let mut copper = Copper::new();
        copper.ins1 = ins1;
        copper.ins2 = ins2;
        copper
    }

    #[test]
    fn instruction_decode() {
        let mut copper = Copper::new();
        copper.ins1 = 0x0180;
        assert!(copper.is_move());
        copper.ins1 = 0x3001;
        copper.ins2 = 0xFFFE;
        assert!(copper.is_wait());
        copper.ins2 = 0xFFFF;
        assert!(copper.is_skip());
    }

    #[test]
    fn danger_bit_gates_low_registers() {
        let mut copper = Copper::new();
        assert!(copper.illegal_address(0x07E));
        assert!(!copper.illegal_address(0x080));

        copper.poke_copcon(crate::custom_regs::COPF_CDANG);
        assert!(!copper.illegal_address(0x07E));
        assert!(copper.illegal_address(0x03E));
    }

    #[test]
    fn loc_low_masks_bit_zero() {
        let mut copper = Copper::new();
        copper.poke_loc_high(0, 0x0001);
        copper.poke_loc_low(0, 0x2345);
        assert_eq!(copper.loc[0], 0x0001_2344);
    }

    #[test]
    fn comparator_masks_both_sides() {
        // Wait for v >= 0x30, any h.
        assert!(!Copper::comparator(0x2FFF, 0x3000, 0xFF00));
        assert!(Copper::comparator(0x3000, 0x3000, 0xFF00));
        assert!(Copper::comparator(0x3101, 0x3000, 0xFF00));
    }

    #[test]
    fn comparator_ignores_beam_bit_16() {
        // VP8 is not seen by the copper.
        assert!(Copper::comparator(0x1_0000 | 0x3000, 0x3000, 0xFFFE));
    }

    #[test]
    fn next_trigger_is_exact_position_for_full_mask() {
        // WAIT $3001,$FFFE: wake at v=$30, h=0.
        let copper = copper_with_wait(0x3001, 0xFFFE);
        let wake = copper.next_trigger_position(Beam::new(0x10, 0x50));
        assert_eq!(wake, Beam::new(0x30, 0x00));
    }

    #[test]
    fn next_trigger_in_past_returns_current_beam() {
        let copper = copper_with_wait(0x3001, 0xFFFE);
        let now = Beam::new(0x40, 0x12);
        assert_eq!(copper.next_trigger_position(now), now);
    }

    #[test]
    fn next_trigger_beyond_frame_when_unreachable() {
        // WAIT $FFFF,$FFFE never triggers within a PAL frame.
        let copper = copper_with_wait(0xFFFF, 0xFFFE);
        let wake = copper.next_trigger_position(Beam::new(0x10, 0x00));
        assert!(wake.v >= 0xFF, "wake line {:#x} should be end-of-frame", wake.v);
    }

    #[test]
    fn copins_targets_instruction_register_by_state() {
        let mut copper = Copper::new();
        copper.state = CopperState::Fetch;
        copper.poke_copins(0x1111);
        assert_eq!(copper.ins1, 0x1111);

        copper.state = CopperState::Move;
        copper.poke_copins(0x2222);
        assert_eq!(copper.ins2, 0x2222);
    }
}
