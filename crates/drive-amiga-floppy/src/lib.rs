//! Amiga floppy drive mechanism.
//!
//! Models the physical drive as the chipset sees it: motor spin-up and
//! spin-down ramps, head stepping with settle time, the 32-bit
//! identification shift register clocked by the select line, disk-change
//! latching, and head rotation over MFM track data. Control arrives as CIA-B
//! port B edges; status is read back through CIA-A port A.
//!
//! The drive holds no reference to the scheduler. Every time-dependent
//! operation takes the current chip-cycle count as an argument, so the
//! owning chipset remains the single time authority.

pub mod disk;
pub mod mfm;

pub use disk::{Disk, DiskGeometryError, DiskType, NUM_CYLINDERS, NUM_SIDES};

/// Chip-cycle count (one unit per DMA cycle, 3.546895 MHz on PAL).
pub type Cycle = i64;

/// Chip cycles per second on a PAL machine (312 lines x 228 cycles x 50 Hz,
/// nominally 3.546895 MHz).
pub const CHIP_HZ: Cycle = 3_546_895;

/// Milliseconds in chip cycles.
#[must_use]
pub const fn msec(ms: Cycle) -> Cycle {
    ms * CHIP_HZ / 1000
}

/// Microseconds in chip cycles.
#[must_use]
pub const fn usec(us: Cycle) -> Cycle {
    us * CHIP_HZ / 1_000_000
}

/// Seconds in chip cycles.
#[must_use]
pub const fn sec(s: Cycle) -> Cycle {
    s * CHIP_HZ
}

/// Minimum spacing between two effective head steps (head settle time).
pub const STEP_SETTLE_CYCLES: Cycle = 1060;

/// Mechanical drive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    /// 3.5" double density (the only type currently modelled).
    Dd35,
}

/// Words transferred per disk DMA slot, or the turbo fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceleration {
    X1,
    X2,
    X4,
    X8,
    /// Bypass FIFO and slot pacing entirely; whole blocks move at once.
    Turbo,
}

impl Acceleration {
    /// Words per disk DMA slot on the modelled path.
    #[must_use]
    pub fn factor(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::Turbo => 1,
        }
    }

    #[must_use]
    pub fn is_turbo(self) -> bool {
        self == Self::Turbo
    }
}

/// Mechanical timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct DriveConfig {
    pub drive_type: DriveType,
    /// Motor spin-up time from stop to full speed.
    pub start_delay: Cycle,
    /// Motor spin-down time from full speed to stop.
    pub stop_delay: Cycle,
    /// Time the head needs to settle after a step before data is readable.
    pub step_delay: Cycle,
    pub acceleration: Acceleration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            drive_type: DriveType::Dd35,
            start_delay: msec(380),
            stop_delay: msec(80),
            step_delay: usec(2000),
            acceleration: Acceleration::X1,
        }
    }
}

/// Head position over the media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveHead {
    /// 0 = lower, 1 = upper.
    pub side: u8,
    /// 0..=83.
    pub cylinder: u8,
    /// Byte offset into the current track, wraps at the track size.
    pub offset: usize,
}

/// Inspection record.
#[derive(Debug, Clone, Copy)]
pub struct DriveInfo {
    pub head: DriveHead,
    pub has_disk: bool,
    pub motor: bool,
    pub motor_speed: f64,
}

/// The persistable mechanism state (media is handled separately).
#[derive(Debug, Clone, Copy)]
pub struct DriveState {
    pub head: DriveHead,
    pub motor: bool,
    pub switch_cycle: Cycle,
    pub switch_speed: f64,
    pub id_count: u8,
    pub id_bit: bool,
    pub cylinder_history: u64,
    pub dskchange: bool,
    pub step_cycle: Cycle,
    pub prb: u8,
}

/// One floppy drive (DF0..DF3).
pub struct Drive {
    nr: u8,
    config: DriveConfig,
    pub head: DriveHead,

    /// Commanded motor state (the ramp lags behind it).
    motor: bool,
    /// Cycle of the last motor on/off edge.
    switch_cycle: Cycle,
    /// Ramp position (0..=100) at the last motor edge.
    switch_speed: f64,

    /// Identification shift counter, advanced on SEL falling edges.
    id_count: u8,
    id_bit: bool,

    /// Last 8 visited cylinders, newest in the low byte.
    cylinder_history: u64,
    /// Disk-change latch: false once a disk is removed, true again only
    /// after a disk is present and a step pulse arrives.
    dskchange: bool,
    /// Cycle of the last effective head step.
    step_cycle: Cycle,
    /// Last port value seen by this drive.
    prb: u8,

    /// Falling-edge latch for the CIA-B FLAG pin (index pulse).
    index_pulse: bool,

    disk: Option<Disk>,
}

impl Drive {
    #[must_use]
    pub fn new(nr: u8, config: DriveConfig) -> Self {
        assert!(nr < 4);
        Self {
            nr,
            config,
            head: DriveHead::default(),
            motor: false,
            switch_cycle: 0,
            switch_speed: 0.0,
            id_count: 0,
            id_bit: false,
            cylinder_history: 0,
            dskchange: false,
            step_cycle: 0,
            prb: 0xFF,
            index_pulse: false,
            disk: None,
        }
    }

    #[must_use]
    pub fn nr(&self) -> u8 {
        self.nr
    }

    #[must_use]
    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn set_acceleration(&mut self, acceleration: Acceleration) {
        self.config.acceleration = acceleration;
    }

    #[must_use]
    pub fn info(&self, clock: Cycle) -> DriveInfo {
        DriveInfo {
            head: self.head,
            has_disk: self.has_disk(),
            motor: self.motor,
            motor_speed: self.motor_speed(clock),
        }
    }

    //
    // Selection and identification
    //

    /// SEL is active-low; bit 3 + nr of the port value.
    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.prb & (0b1000 << self.nr) == 0
    }

    /// External drives identify as 3.5" DD; the internal drive has no
    /// identification shift register and reads all zeros.
    #[must_use]
    pub fn drive_id(&self) -> u32 {
        if self.nr == 0 {
            0x0000_0000
        } else {
            0xFFFF_FFFF
        }
    }

    /// The status register reports the identification bit while the motor is
    /// stopped or still spinning up.
    #[must_use]
    pub fn id_mode(&self, clock: Cycle) -> bool {
        self.motor_stopped(clock) || self.motor_speeding_up(clock)
    }

    #[must_use]
    pub fn id_bit(&self) -> bool {
        self.id_bit
    }

    //
    // Motor
    //

    /// Current ramp position: 0.0 = stopped, 100.0 = full speed.
    #[must_use]
    pub fn motor_speed(&self, clock: Cycle) -> f64 {
        if self.config.start_delay == 0 && self.motor {
            return 100.0;
        }
        if self.config.stop_delay == 0 && !self.motor {
            return 0.0;
        }

        let elapsed = (clock - self.switch_cycle) as f64;
        if self.motor {
            (self.switch_speed + 100.0 * elapsed / self.config.start_delay as f64).min(100.0)
        } else {
            (self.switch_speed - 100.0 * elapsed / self.config.stop_delay as f64).max(0.0)
        }
    }

    pub fn set_motor(&mut self, value: bool, clock: Cycle) {
        if self.motor == value {
            return;
        }

        self.switch_speed = self.motor_speed(clock);
        self.switch_cycle = clock;
        self.motor = value;

        // Turning the motor off resets the identification shift register.
        self.id_count = 0;

        log::debug!("df{}: motor {}", self.nr, if value { "on" } else { "off" });
    }

    #[must_use]
    pub fn motor(&self) -> bool {
        self.motor
    }

    #[must_use]
    pub fn motor_speeding_up(&self, clock: Cycle) -> bool {
        self.motor && self.motor_speed(clock) < 100.0
    }

    #[must_use]
    pub fn motor_at_full_speed(&self, clock: Cycle) -> bool {
        self.motor_speed(clock) == 100.0
    }

    #[must_use]
    pub fn motor_slowing_down(&self, clock: Cycle) -> bool {
        !self.motor && self.motor_speed(clock) > 0.0
    }

    #[must_use]
    pub fn motor_stopped(&self, clock: Cycle) -> bool {
        self.motor_speed(clock) == 0.0
    }

    //
    // Status flags (CIA-A port A, all active-low)
    //

    /// Compose this drive's contribution to the PA status byte:
    /// bit 5 /DSKRDY, bit 4 /DSKTRACK0, bit 3 /DSKPROT, bit 2 /DSKCHANGE.
    /// An unselected drive contributes all ones.
    #[must_use]
    pub fn status_flags(&self, clock: Cycle) -> u8 {
        let mut result = 0xFF;

        if self.is_selected() {
            // PA5: /DSKRDY doubles as the identification bit output.
            if self.id_mode(clock) {
                if self.id_bit {
                    result &= 0b1101_1111;
                }
            } else if self.has_disk()
                && (self.motor_at_full_speed(clock) || self.motor_slowing_down(clock))
            {
                result &= 0b1101_1111;
            }

            // PA4: /DSKTRACK0
            if self.head.cylinder == 0 {
                result &= 0b1110_1111;
            }

            // PA3: /DSKPROT
            if self.disk.as_ref().is_some_and(Disk::is_write_protected) {
                result &= 0b1111_0111;
            }

            // PA2: /DSKCHANGE. "The signal goes low whenever a disk is
            // removed. It remains low until a disk is inserted AND a step
            // pulse is received." [HRM]
            if !self.dskchange {
                result &= 0b1111_1011;
            }
        }

        result
    }

    //
    // Head movement
    //

    #[must_use]
    pub fn ready_to_step(&self, clock: Cycle) -> bool {
        if self.config.step_delay == 0 {
            return true;
        }
        clock - self.step_cycle > STEP_SETTLE_CYCLES
    }

    /// Move the head one cylinder. `outwards` follows the DIR line: high
    /// moves towards cylinder 0. Steps arriving inside the settle window are
    /// rejected.
    pub fn step(&mut self, outwards: bool, clock: Cycle) {
        // A step pulse re-arms the disk-change latch when media is present.
        if self.has_disk() {
            self.dskchange = true;
        }

        if !self.ready_to_step(clock) {
            return;
        }

        if outwards {
            if self.head.cylinder > 0 {
                self.head.cylinder -= 1;
                self.record_cylinder(self.head.cylinder);
            }
        } else if self.head.cylinder < (NUM_CYLINDERS - 1) as u8 {
            self.head.cylinder += 1;
            self.record_cylinder(self.head.cylinder);
        }

        log::trace!("df{}: head at cylinder {}", self.nr, self.head.cylinder);
        self.step_cycle = clock;
    }

    fn record_cylinder(&mut self, cylinder: u8) {
        self.cylinder_history = (self.cylinder_history << 8) | u64::from(cylinder);
    }

    /// Recognise the cylinder dance Kickstart performs while waiting for a
    /// disk, so hosts can tell polling from real seeks.
    ///
    /// Kickstart 1.2/1.3 alternate 0-1-0-1; Kickstart 2.0 walks 0-1-2-3-2-1.
    #[must_use]
    pub fn polls_for_disk(&self) -> bool {
        if self.has_disk() {
            return false;
        }

        const SIGNATURES: [u64; 4] = [
            // Kickstart 1.2 and 1.3
            0x0100_0100_0100,
            0x0001_0001_0001,
            // Kickstart 2.0
            0x0203_0203_0203,
            0x0302_0302_0302,
        ];

        let mask = 0xFFFF_FFFF;
        SIGNATURES
            .iter()
            .any(|sig| self.cylinder_history & mask == sig & mask)
    }

    //
    // Rotation and data transfer
    //

    /// Read one byte under the head and advance the disk. Returns $FF while
    /// no disk is present or the head is still settling after a step.
    pub fn read_head(&mut self, clock: Cycle) -> u8 {
        let settling = self.config.step_delay != 0 && clock - self.step_cycle < self.config.step_delay;

        let result = match &self.disk {
            Some(disk) if !settling => disk.read_byte(
                self.head.cylinder as usize,
                self.head.side as usize,
                self.head.offset,
            ),
            _ => 0xFF,
        };

        self.rotate();
        result
    }

    /// Read two consecutive bytes as a big-endian word.
    pub fn read_head16(&mut self, clock: Cycle) -> u16 {
        let hi = self.read_head(clock);
        let lo = self.read_head(clock);
        (u16::from(hi) << 8) | u16::from(lo)
    }

    /// Write one byte under the head and advance the disk. Writing a
    /// protected disk drops the byte.
    pub fn write_head(&mut self, value: u8) {
        if let Some(disk) = &mut self.disk {
            disk.write_byte(
                value,
                self.head.cylinder as usize,
                self.head.side as usize,
                self.head.offset,
            );
        }
        self.rotate();
    }

    pub fn write_head16(&mut self, value: u16) {
        self.write_head((value >> 8) as u8);
        self.write_head(value as u8);
    }

    fn rotate(&mut self) {
        let track_size = self.disk.as_ref().map_or(mfm::MFM_TRACK_BYTES, Disk::track_size);

        self.head.offset += 1;
        if self.head.offset >= track_size {
            self.head.offset = 0;

            // A full revolution produces an index pulse. The bridge forwards
            // it as a falling edge on the CIA-B FLAG pin when this drive is
            // selected.
            if self.is_selected() {
                self.index_pulse = true;
            }
        }
    }

    /// Keep the disk spinning without latching a byte (DMA off, motor on).
    pub fn spin(&mut self) {
        self.rotate();
    }

    /// Drain the index-pulse latch set by [`rotate`](Self::read_head).
    pub fn take_index_pulse(&mut self) -> bool {
        std::mem::take(&mut self.index_pulse)
    }

    /// Advance the head to just past the next $4489 sync mark (turbo path).
    pub fn find_sync_mark(&mut self, clock: Cycle) {
        let track_size = self.disk.as_ref().map_or(0, Disk::track_size);
        for _ in 0..track_size {
            if self.read_head(clock) != 0x44 {
                continue;
            }
            if self.read_head(clock) != 0x89 {
                continue;
            }
            break;
        }
        log::trace!("df{}: sync mark at offset {}", self.nr, self.head.offset);
    }

    //
    // Media
    //

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&Disk> {
        self.disk.as_ref()
    }

    #[must_use]
    pub fn disk_mut(&mut self) -> Option<&mut Disk> {
        self.disk.as_mut()
    }

    /// Place a disk in the drive. The caller is responsible for the
    /// mechanical delay between eject and insert.
    pub fn insert_disk(&mut self, disk: Disk) {
        assert!(self.disk.is_none(), "drive df{} already holds a disk", self.nr);
        log::debug!("df{}: disk inserted", self.nr);
        self.disk = Some(disk);
    }

    pub fn eject_disk(&mut self) -> Option<Disk> {
        if self.disk.is_some() {
            log::debug!("df{}: disk ejected", self.nr);
            // Drop the change latch; it re-arms on the next step pulse.
            self.dskchange = false;
        }
        self.disk.take()
    }

    //
    // Persistence
    //

    #[must_use]
    pub fn state(&self) -> DriveState {
        DriveState {
            head: self.head,
            motor: self.motor,
            switch_cycle: self.switch_cycle,
            switch_speed: self.switch_speed,
            id_count: self.id_count,
            id_bit: self.id_bit,
            cylinder_history: self.cylinder_history,
            dskchange: self.dskchange,
            step_cycle: self.step_cycle,
            prb: self.prb,
        }
    }

    pub fn restore_state(&mut self, state: DriveState) {
        self.head = state.head;
        self.motor = state.motor;
        self.switch_cycle = state.switch_cycle;
        self.switch_speed = state.switch_speed;
        self.id_count = state.id_count;
        self.id_bit = state.id_bit;
        self.cylinder_history = state.cylinder_history;
        self.dskchange = state.dskchange;
        self.step_cycle = state.step_cycle;
        self.prb = state.prb;
        self.index_pulse = false;
    }

    /// Replace the media without the insertion protocol (snapshot restore).
    pub fn set_disk(&mut self, disk: Option<Disk>) {
        self.disk = disk;
    }

    //
    // Port interface
    //

    /// React to a change of the CIA-B port B value.
    ///
    /// Bit layout (all active-low):
    /// `| /MTR | /SEL3 | /SEL2 | /SEL1 | /SEL0 | /SIDE | DIR | /STEP |`
    ///
    /// On a falling edge of this drive's SEL bit the identification shift
    /// register advances and the motor latches the MTR line. A rising STEP
    /// edge while SEL was asserted before the change moves the head. SIDE is
    /// sampled unconditionally.
    pub fn prb_did_change(&mut self, old_value: u8, new_value: u8, clock: Cycle) {
        let sel_mask = 0b1000 << self.nr;

        let old_mtr = old_value & 0x80 != 0;
        let new_mtr = new_value & 0x80 != 0;
        let old_sel = old_value & sel_mask != 0;
        let new_sel = new_value & sel_mask != 0;
        let old_step = old_value & 0x01 != 0;
        let new_step = new_value & 0x01 != 0;
        let new_dir = new_value & 0x02 != 0;

        self.prb = new_value;

        // Falling edge on SEL: advance identification, latch the motor.
        if old_sel && !new_sel {
            self.id_count = (self.id_count + 1) % 32;
            self.id_bit = (self.drive_id() >> (31 - self.id_count)) & 1 != 0;

            // Motor latch logic as in SAE/UAE: the motor turns on when MTR
            // is low on either side of the edge, off when it was high.
            if !old_mtr || !new_mtr {
                self.set_motor(true, clock);
            } else {
                self.set_motor(false, clock);
            }
        }

        // Rising edge on STEP while the drive was selected before the change.
        if !old_step && new_step && !old_sel {
            self.step(new_dir, clock);
        }

        self.head.side = u8::from(new_value & 0b100 == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected_prb(nr: u8) -> u8 {
        0xFF & !(0b1000 << nr)
    }

    fn make_drive(nr: u8) -> Drive {
        Drive::new(nr, DriveConfig::default())
    }

    #[test]
    fn motor_ramps_to_full_speed() {
        let mut drive = make_drive(0);
        drive.set_motor(true, 0);
        assert!(drive.motor_speeding_up(1));

        let start = DriveConfig::default().start_delay;
        assert_eq!(drive.motor_speed(start), 100.0);
        assert!(drive.motor_at_full_speed(start + 1));
    }

    #[test]
    fn motor_ramp_is_monotonic_and_clamped() {
        let mut drive = make_drive(0);
        drive.set_motor(true, 0);

        let start = DriveConfig::default().start_delay;
        let mut last = 0.0;
        for t in (0..=2 * start).step_by((start / 16) as usize) {
            let speed = drive.motor_speed(t);
            assert!(speed >= last, "ramp went backwards at {t}");
            last = speed;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn motor_off_ramps_down_from_switch_speed() {
        let mut drive = make_drive(0);
        drive.set_motor(true, 0);
        let start = DriveConfig::default().start_delay;
        drive.set_motor(false, start / 2);

        assert!(drive.motor_slowing_down(start / 2 + 1));
        let stop = DriveConfig::default().stop_delay;
        assert!(drive.motor_stopped(start / 2 + stop + 1));
    }

    #[test]
    fn external_drive_identifies_as_dd() {
        let mut drive = make_drive(1);
        let idle = 0xFF;
        let selected = selected_prb(1);

        // Four falling SEL edges with MTR high: the top four id bits.
        for _ in 0..4 {
            drive.prb_did_change(idle, selected, 0);
            assert!(drive.id_bit(), "external DD id bits must read 1");
            drive.prb_did_change(selected, idle, 0);
        }
    }

    #[test]
    fn internal_drive_has_no_identification() {
        let mut drive = make_drive(0);
        for _ in 0..32 {
            drive.prb_did_change(0xFF, selected_prb(0), 0);
            assert!(!drive.id_bit());
            drive.prb_did_change(selected_prb(0), 0xFF, 0);
        }
    }

    #[test]
    fn id_sequence_repeats_after_32_edges() {
        let mut drive = make_drive(1);
        let idle = 0xFF;
        let selected = selected_prb(1);

        let mut first_pass = Vec::new();
        for _ in 0..32 {
            drive.prb_did_change(idle, selected, 0);
            first_pass.push(drive.id_bit());
            drive.prb_did_change(selected, idle, 0);
        }
        for i in 0..32 {
            drive.prb_did_change(idle, selected, 0);
            assert_eq!(drive.id_bit(), first_pass[i], "bit {i} differs on repeat");
            drive.prb_did_change(selected, idle, 0);
        }
    }

    #[test]
    fn step_rate_limit_rejects_fast_pulses() {
        let mut drive = make_drive(0);
        drive.step_cycle = -10_000; // allow the first step

        drive.step(false, 0);
        assert_eq!(drive.head.cylinder, 1);

        // Second pulse inside the settle window: exactly one change total.
        drive.step(false, STEP_SETTLE_CYCLES - 1);
        assert_eq!(drive.head.cylinder, 1);

        drive.step(false, STEP_SETTLE_CYCLES + 1);
        assert_eq!(drive.head.cylinder, 2);
    }

    #[test]
    fn step_clamps_at_cylinder_bounds() {
        let mut drive = make_drive(0);
        drive.step_cycle = -10_000;

        drive.step(true, 0);
        assert_eq!(drive.head.cylinder, 0);

        drive.head.cylinder = (NUM_CYLINDERS - 1) as u8;
        drive.step(false, 10_000);
        assert_eq!(drive.head.cylinder, (NUM_CYLINDERS - 1) as u8);
    }

    #[test]
    fn polling_signature_recognised() {
        let mut drive = make_drive(0);
        drive.config.step_delay = 0;

        // Kickstart 1.3 pattern: 0-1-0-1-...
        let mut clock = 0;
        for _ in 0..4 {
            drive.step(false, clock); // to 1
            clock += 10_000;
            drive.step(true, clock); // to 0
            clock += 10_000;
        }
        assert!(drive.polls_for_disk());

        drive.insert_disk(Disk::blank(DiskType::Dd35));
        assert!(!drive.polls_for_disk(), "polling only reported without a disk");
    }

    #[test]
    fn disk_change_latch_follows_eject_and_step() {
        let mut drive = make_drive(0);
        drive.config.step_delay = 0;
        drive.insert_disk(Disk::blank(DiskType::Dd35));

        drive.step(false, 0);
        assert!(drive.status_flags(0) & 0b100 != 0, "change flag clear after step");

        drive.eject_disk();
        // Selected drive reports /DSKCHANGE low after removal.
        drive.prb_did_change(0xFF, selected_prb(0), 0);
        assert_eq!(drive.status_flags(0) & 0b100, 0);

        // Inserting alone is not enough; a step pulse must arrive.
        drive.insert_disk(Disk::blank(DiskType::Dd35));
        assert_eq!(drive.status_flags(0) & 0b100, 0);
        drive.step(false, 20_000);
        assert!(drive.status_flags(0) & 0b100 != 0);
    }

    #[test]
    fn read_head_without_disk_returns_gap() {
        let mut drive = make_drive(0);
        assert_eq!(drive.read_head(0), 0xFF);
    }

    #[test]
    fn rotation_wraps_and_raises_index_pulse() {
        let mut drive = make_drive(0);
        drive.config.step_delay = 0;
        drive.insert_disk(Disk::blank(DiskType::Dd35));
        drive.prb_did_change(0xFF, selected_prb(0), 0);

        let track_size = drive.disk().expect("disk").track_size();
        for _ in 0..track_size {
            drive.read_head(0);
        }
        assert_eq!(drive.head.offset, 0);
        assert!(drive.take_index_pulse());
        assert!(!drive.take_index_pulse(), "latch drains on read");
    }

    #[test]
    fn find_sync_mark_stops_after_sync() {
        let mut drive = make_drive(0);
        drive.config.step_delay = 0;
        drive.insert_disk(Disk::blank(DiskType::Dd35));

        drive.find_sync_mark(0);
        let offset = drive.head.offset;
        // The byte just before the head is the $89 of a sync word.
        let disk = drive.disk().expect("disk");
        assert_eq!(disk.read_byte(0, 0, offset - 1), 0x89);
        assert_eq!(disk.read_byte(0, 0, offset - 2), 0x44);
    }

    #[test]
    fn side_select_follows_port() {
        let mut drive = make_drive(0);
        // SIDE low selects the upper head.
        drive.prb_did_change(0xFF, 0xFF & !0b100, 0);
        assert_eq!(drive.head.side, 1);
        drive.prb_did_change(0xFF & !0b100, 0xFF, 0);
        assert_eq!(drive.head.side, 0);
    }
}
