//! Blitter bus client.
//!
//! Only the bus behaviour is modelled: a started blit copies words from the
//! A pointer to the D pointer, one word per granted cycle, losing
//! arbitration to fixed DMA and to the copper, and backing off while the
//! CPU asserts BLS without the blit-priority bit set. Minterms, shifts and
//! fills are not part of this core.

/// Blitter state.
pub struct Blitter {
    pub bltapt: u32,
    pub bltdpt: u32,
    /// Words left in the running blit.
    pub remaining: u32,
    /// BBUSY status bit.
    pub busy: bool,
    /// BZERO status bit: set while every word written so far was zero.
    pub bzero: bool,
}

impl Blitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bltapt: 0,
            bltdpt: 0,
            remaining: 0,
            busy: false,
            bzero: false,
        }
    }

    /// Start a copy blit of `words` words. Mirrors a BLTSIZE write.
    pub fn start(&mut self, words: u32) {
        self.remaining = words;
        self.busy = words > 0;
        self.bzero = true;
        log::debug!("blit started: {words} words");
    }

    /// Account one transferred word. Returns true when the blit finished.
    pub fn advance(&mut self, value: u16) -> bool {
        if value != 0 {
            self.bzero = false;
        }
        self.bltapt = self.bltapt.wrapping_add(2);
        self.bltdpt = self.bltdpt.wrapping_add(2);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.busy = false;
            return true;
        }
        false
    }
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_runs_to_completion() {
        let mut blitter = Blitter::new();
        blitter.start(2);
        assert!(blitter.busy);
        assert!(!blitter.advance(0x0000));
        assert!(blitter.advance(0x1234));
        assert!(!blitter.busy);
        assert!(!blitter.bzero);
    }

    #[test]
    fn bzero_survives_all_zero_blit() {
        let mut blitter = Blitter::new();
        blitter.start(3);
        blitter.advance(0);
        blitter.advance(0);
        blitter.advance(0);
        assert!(blitter.bzero);
    }
}
