//! Persisted chipset state.
//!
//! A flat byte stream, ordered by component then by attribute, prefixed
//! with a version tag. All multi-byte integers are big-endian, matching
//! on-disk tradition. Each drive writes a disk-presence flag followed by
//! the media image when present.
//!
//! The stream captures a machine configured identically to the one that
//! saved it: chip RAM size and slot layout must match, or loading fails.

use drive_amiga_floppy::{Disk, DiskType, DriveHead, DriveState, NUM_CYLINDERS, NUM_SIDES};

use crate::agnus::{BusOwner, RegChange, SprDmaState};
use crate::chipset::Chipset;
use crate::copper::CopperState;
use crate::disk_controller::DiskControllerState;
use crate::scheduler::{EventId, SlotId, NEVER};

/// Format version of the stream.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Reasons a stream is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),
    #[error("snapshot stream truncated")]
    Truncated,
    #[error("snapshot does not match the configured machine: {0}")]
    ConfigMismatch(&'static str),
    #[error("snapshot stream is corrupt: {0}")]
    BadEncoding(&'static str),
}

struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.bytes.push(u8::from(v));
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.bytes.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    fn slice(&mut self, v: &[u8]) {
        self.bytes.extend_from_slice(v);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.pos + n > self.bytes.len() {
            return Err(SnapshotError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, SnapshotError> {
        Ok(self.u8()? != 0)
    }

    fn u16(&mut self) -> Result<u16, SnapshotError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn i64(&mut self) -> Result<i64, SnapshotError> {
        Ok(self.u64()? as i64)
    }

    fn f64(&mut self) -> Result<f64, SnapshotError> {
        Ok(f64::from_bits(self.u64()?))
    }
}

/// Serialise the complete chipset state.
#[must_use]
pub fn save(chipset: &Chipset) -> Vec<u8> {
    let mut w = Writer::new();
    w.u16(SNAPSHOT_VERSION);

    // Memory
    w.u32(chipset.mem.size() as u32);
    w.slice(chipset.mem.as_bytes());

    // Scheduler
    w.i64(chipset.sched.clock);
    for slot in SlotId::ALL {
        let entry = chipset.sched.slot(slot);
        w.i64(entry.trigger);
        w.u16(entry.id.code());
        w.i64(entry.data);
    }

    // Deferred register changes
    let changes = chipset.changes.entries();
    w.u16(changes.len() as u16);
    for change in changes {
        w.i64(change.cycle);
        w.u16(change.reg);
        w.u16(change.value);
    }

    // Agnus
    let agnus = &chipset.agnus;
    w.u16(agnus.pos.v);
    w.u16(agnus.pos.h);
    w.u64(agnus.frame.nr);
    w.bool(agnus.frame.long_frame);
    w.bool(agnus.frame.prev_long_frame);
    w.bool(agnus.frame.interlaced);
    w.u16(agnus.dmacon);
    w.u16(agnus.bplcon0);
    w.u16(agnus.bplcon1);
    w.u16(agnus.diwstrt);
    w.u16(agnus.diwstop);
    w.u16(agnus.ddfstrt);
    w.u16(agnus.ddfstop);
    w.u16(agnus.bpl1mod);
    w.u16(agnus.bpl2mod);
    w.u32(agnus.dskpt);
    for pt in agnus.audpt {
        w.u32(pt);
    }
    for pt in agnus.bplpt {
        w.u32(pt);
    }
    for pt in agnus.sprpt {
        w.u32(pt);
    }
    for dat in agnus.bpl_dat {
        w.u16(dat);
    }
    for pair in agnus.spr_dat {
        w.u16(pair[0]);
        w.u16(pair[1]);
    }
    for v in agnus.spr_vstrt {
        w.u16(v);
    }
    for v in agnus.spr_vstop {
        w.u16(v);
    }
    for state in agnus.spr_dma_state {
        w.u8(match state {
            SprDmaState::Idle => 0,
            SprDmaState::Active => 1,
        });
    }
    w.u16(agnus.das_mask());
    w.bool(agnus.bpl_dma_line());
    w.bool(agnus.bls);
    for owner in agnus.bus_owner {
        w.u8(bus_owner_code(owner));
    }
    for value in agnus.bus_value {
        w.u16(value);
    }

    // Copper
    let copper = &chipset.copper;
    w.u8(copper_state_code(copper.state));
    w.u32(copper.pc);
    w.u32(copper.loc[0]);
    w.u32(copper.loc[1]);
    w.u16(copper.ins1);
    w.u16(copper.ins2);
    w.bool(copper.skip);
    w.bool(copper.danger);

    // Blitter
    w.u32(chipset.blitter.bltapt);
    w.u32(chipset.blitter.bltdpt);
    w.u32(chipset.blitter.remaining);
    w.bool(chipset.blitter.busy);
    w.bool(chipset.blitter.bzero);

    // Paula
    w.u16(chipset.paula.intena);
    w.u16(chipset.paula.intreq);
    w.u16(chipset.paula.adkcon);
    for dat in chipset.paula.aud_dat {
        w.u16(dat);
    }
    // Delayed deliveries survive a snapshot.
    for source in 0..16u16 {
        w.i64(chipset.paula.irq_due_for(source));
    }

    // Disk controller
    let dc = &chipset.disk;
    w.u8(disk_state_code(dc.state));
    let info = dc.info();
    w.slice(&info.fifo);
    w.u8(info.fifo_count);
    w.u16(dc.dsklen);
    w.u16(dc.dsksync);
    w.u8(dc.incoming);
    w.i64(dc.incoming_cycle);
    w.u8(dc.selected.map_or(0xFF, |nr| nr as u8));
    for connected in dc.connected {
        w.bool(connected);
    }
    w.bool(dc.sync_flag);
    w.u8(dc.prb);

    // Bridge
    w.u8(chipset.bridge.prb());
    w.u64(chipset.bridge.index_count());

    // Colour latches
    for value in chipset.color {
        w.u16(value);
    }

    // Drives
    for drive in &chipset.drives {
        let state = drive.state();
        w.u8(state.head.side);
        w.u8(state.head.cylinder);
        w.u32(state.head.offset as u32);
        w.bool(state.motor);
        w.i64(state.switch_cycle);
        w.f64(state.switch_speed);
        w.u8(state.id_count);
        w.bool(state.id_bit);
        w.u64(state.cylinder_history);
        w.bool(state.dskchange);
        w.i64(state.step_cycle);
        w.u8(state.prb);

        w.bool(drive.has_disk());
        if let Some(disk) = drive.disk() {
            w.bool(disk.is_write_protected());
            w.u32(disk.track_size() as u32);
            for cylinder in 0..NUM_CYLINDERS {
                for side in 0..NUM_SIDES {
                    w.slice(disk.raw_track(cylinder, side));
                }
            }
        }
    }

    w.bytes
}

/// Restore a previously saved state into an identically configured chipset.
pub fn load(chipset: &mut Chipset, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut r = Reader::new(bytes);

    let version = r.u16()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    // Memory
    let ram_size = r.u32()? as usize;
    if ram_size != chipset.mem.size() {
        return Err(SnapshotError::ConfigMismatch("chip RAM size differs"));
    }
    let ram = r.take(ram_size)?;
    chipset.mem.load_bytes(ram);

    // Scheduler
    chipset.sched.clock = r.i64()?;
    for slot in SlotId::ALL {
        let trigger = r.i64()?;
        let id = EventId::from_code(r.u16()?)
            .ok_or(SnapshotError::BadEncoding("unknown event id"))?;
        let data = r.i64()?;
        chipset.sched.schedule_abs_data(slot, trigger, id, data);
    }

    // Deferred register changes
    chipset.changes.clear();
    let count = r.u16()?;
    for _ in 0..count {
        let cycle = r.i64()?;
        let reg = r.u16()?;
        let value = r.u16()?;
        chipset.changes.insert(RegChange { cycle, reg, value });
    }

    // Agnus
    let agnus = &mut chipset.agnus;
    agnus.pos.v = r.u16()?;
    agnus.pos.h = r.u16()?;
    agnus.frame.nr = r.u64()?;
    agnus.frame.long_frame = r.bool()?;
    agnus.frame.prev_long_frame = r.bool()?;
    agnus.frame.interlaced = r.bool()?;
    agnus.dmacon = r.u16()?;
    agnus.bplcon0 = r.u16()?;
    agnus.bplcon1 = r.u16()?;
    agnus.diwstrt = r.u16()?;
    agnus.diwstop = r.u16()?;
    agnus.ddfstrt = r.u16()?;
    agnus.ddfstop = r.u16()?;
    agnus.bpl1mod = r.u16()?;
    agnus.bpl2mod = r.u16()?;
    agnus.dskpt = r.u32()?;
    for pt in &mut agnus.audpt {
        *pt = r.u32()?;
    }
    for pt in &mut agnus.bplpt {
        *pt = r.u32()?;
    }
    for pt in &mut agnus.sprpt {
        *pt = r.u32()?;
    }
    for dat in &mut agnus.bpl_dat {
        *dat = r.u16()?;
    }
    for pair in &mut agnus.spr_dat {
        pair[0] = r.u16()?;
        pair[1] = r.u16()?;
    }
    for v in &mut agnus.spr_vstrt {
        *v = r.u16()?;
    }
    for v in &mut agnus.spr_vstop {
        *v = r.u16()?;
    }
    for state in &mut agnus.spr_dma_state {
        *state = match r.u8()? {
            0 => SprDmaState::Idle,
            1 => SprDmaState::Active,
            _ => return Err(SnapshotError::BadEncoding("sprite DMA state")),
        };
    }
    let das_mask = r.u16()?;
    let bpl_dma_line = r.bool()?;
    agnus.bls = r.bool()?;
    for owner in &mut agnus.bus_owner {
        *owner = bus_owner_from(r.u8()?)?;
    }
    for value in &mut agnus.bus_value {
        *value = r.u16()?;
    }

    // The slot tables are derived state; rebuild them.
    agnus.set_bpl_dma_line(bpl_dma_line);
    agnus.update_bpl_events(0);
    agnus.update_das_events(das_mask);

    // Copper
    let copper = &mut chipset.copper;
    copper.state = copper_state_from(r.u8()?)?;
    copper.pc = r.u32()?;
    copper.loc[0] = r.u32()?;
    copper.loc[1] = r.u32()?;
    copper.ins1 = r.u16()?;
    copper.ins2 = r.u16()?;
    copper.skip = r.bool()?;
    copper.danger = r.bool()?;

    // Blitter
    chipset.blitter.bltapt = r.u32()?;
    chipset.blitter.bltdpt = r.u32()?;
    chipset.blitter.remaining = r.u32()?;
    chipset.blitter.busy = r.bool()?;
    chipset.blitter.bzero = r.bool()?;

    // Paula
    chipset.paula.intena = r.u16()?;
    chipset.paula.intreq = r.u16()?;
    chipset.paula.adkcon = r.u16()?;
    for dat in &mut chipset.paula.aud_dat {
        *dat = r.u16()?;
    }
    for source in 0..16u16 {
        let due = r.i64()?;
        if due != NEVER {
            chipset.paula.raise_irq_at(source, due);
        }
    }

    // Disk controller
    let dc = &mut chipset.disk;
    dc.state = disk_state_from(r.u8()?)?;
    let mut fifo = [0u8; 6];
    fifo.copy_from_slice(r.take(6)?);
    let fifo_count = r.u8()?;
    if fifo_count > 6 {
        return Err(SnapshotError::BadEncoding("FIFO count"));
    }
    dc.restore_fifo(fifo, fifo_count);
    dc.dsklen = r.u16()?;
    dc.dsksync = r.u16()?;
    dc.incoming = r.u8()?;
    dc.incoming_cycle = r.i64()?;
    dc.selected = match r.u8()? {
        0xFF => None,
        nr if nr < 4 => Some(nr as usize),
        _ => return Err(SnapshotError::BadEncoding("selected drive")),
    };
    for connected in &mut dc.connected {
        *connected = r.bool()?;
    }
    dc.sync_flag = r.bool()?;
    dc.prb = r.u8()?;

    // Bridge
    let bridge_prb = r.u8()?;
    let index_count = r.u64()?;
    chipset.bridge.restore(bridge_prb, index_count);

    // Colour latches
    for value in &mut chipset.color {
        *value = r.u16()?;
    }

    // Drives
    for drive in &mut chipset.drives {
        let state = DriveState {
            head: DriveHead {
                side: r.u8()?,
                cylinder: r.u8()?,
                offset: r.u32()? as usize,
            },
            motor: r.bool()?,
            switch_cycle: r.i64()?,
            switch_speed: r.f64()?,
            id_count: r.u8()?,
            id_bit: r.bool()?,
            cylinder_history: r.u64()?,
            dskchange: r.bool()?,
            step_cycle: r.i64()?,
            prb: r.u8()?,
        };
        drive.restore_state(state);

        if r.bool()? {
            let write_protected = r.bool()?;
            let track_size = r.u32()? as usize;
            let mut tracks = Vec::with_capacity(NUM_CYLINDERS * NUM_SIDES);
            for _ in 0..NUM_CYLINDERS * NUM_SIDES {
                tracks.push(r.take(track_size)?.to_vec());
            }
            let disk = Disk::from_raw_tracks(DiskType::Dd35, tracks, write_protected)
                .map_err(|_| SnapshotError::BadEncoding("disk geometry"))?;
            drive.set_disk(Some(disk));
        } else {
            drive.set_disk(None);
        }
    }

    Ok(())
}

fn bus_owner_code(owner: BusOwner) -> u8 {
    match owner {
        BusOwner::None => 0,
        BusOwner::Bitplane => 1,
        BusOwner::Audio => 2,
        BusOwner::Sprite => 3,
        BusOwner::Disk => 4,
        BusOwner::Refresh => 5,
        BusOwner::Copper => 6,
        BusOwner::Blitter => 7,
        BusOwner::Cpu => 8,
    }
}

fn bus_owner_from(code: u8) -> Result<BusOwner, SnapshotError> {
    Ok(match code {
        0 => BusOwner::None,
        1 => BusOwner::Bitplane,
        2 => BusOwner::Audio,
        3 => BusOwner::Sprite,
        4 => BusOwner::Disk,
        5 => BusOwner::Refresh,
        6 => BusOwner::Copper,
        7 => BusOwner::Blitter,
        8 => BusOwner::Cpu,
        _ => return Err(SnapshotError::BadEncoding("bus owner")),
    })
}

fn copper_state_code(state: CopperState) -> u8 {
    match state {
        CopperState::RequestDma => 0,
        CopperState::Fetch => 1,
        CopperState::Move => 2,
        CopperState::WaitOrSkip => 3,
        CopperState::Wait => 4,
        CopperState::Jmp1 => 5,
        CopperState::Jmp2 => 6,
    }
}

fn copper_state_from(code: u8) -> Result<CopperState, SnapshotError> {
    Ok(match code {
        0 => CopperState::RequestDma,
        1 => CopperState::Fetch,
        2 => CopperState::Move,
        3 => CopperState::WaitOrSkip,
        4 => CopperState::Wait,
        5 => CopperState::Jmp1,
        6 => CopperState::Jmp2,
        _ => return Err(SnapshotError::BadEncoding("copper state")),
    })
}

fn disk_state_code(state: DiskControllerState) -> u8 {
    match state {
        DiskControllerState::Off => 0,
        DiskControllerState::WaitSync => 1,
        DiskControllerState::Read => 2,
        DiskControllerState::Write => 3,
        DiskControllerState::Flush => 4,
    }
}

fn disk_state_from(code: u8) -> Result<DiskControllerState, SnapshotError> {
    Ok(match code {
        0 => DiskControllerState::Off,
        1 => DiskControllerState::WaitSync,
        2 => DiskControllerState::Read,
        3 => DiskControllerState::Write,
        4 => DiskControllerState::Flush,
        _ => return Err(SnapshotError::BadEncoding("disk controller state")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChipsetConfig;

    #[test]
    fn snapshot_round_trips() {
        let mut chipset = Chipset::new(&ChipsetConfig::default());
        chipset.execute_until(12_345);
        chipset.poke_custom16(crate::custom_regs::DSKSYNC, 0x4489);
        chipset.mem.poke16(0x2000, 0xBEEF);

        let snapshot = chipset.suspend().save_snapshot();

        let mut restored = Chipset::new(&ChipsetConfig::default());
        restored
            .suspend()
            .load_snapshot(&snapshot)
            .expect("snapshot loads into identical machine");

        assert_eq!(restored.clock(), 12_345);
        assert_eq!(restored.beam(), chipset.beam());
        assert_eq!(restored.disk.dsksync, 0x4489);
        assert_eq!(restored.mem.peek16(0x2000), 0xBEEF);
    }

    #[test]
    fn snapshot_preserves_inserted_disk() {
        let mut chipset = Chipset::new(&ChipsetConfig::default());
        let mut disk = Disk::blank(DiskType::Dd35);
        disk.write_byte(0x42, 3, 1, 100);
        chipset.suspend().insert_disk(0, disk, 0).expect("df0");
        chipset.execute_until(10);

        let snapshot = chipset.suspend().save_snapshot();

        let mut restored = Chipset::new(&ChipsetConfig::default());
        restored.suspend().load_snapshot(&snapshot).expect("loads");
        let disk = restored.drives[0].disk().expect("disk restored");
        assert_eq!(disk.read_byte(3, 1, 100), 0x42);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut chipset = Chipset::new(&ChipsetConfig::default());
        let mut snapshot = chipset.suspend().save_snapshot();
        snapshot[0] = 0xFF;
        let err = chipset.suspend().load_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedVersion(_)));
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut chipset = Chipset::new(&ChipsetConfig::default());
        let snapshot = chipset.suspend().save_snapshot();
        let err = chipset
            .suspend()
            .load_snapshot(&snapshot[..snapshot.len() / 2])
            .unwrap_err();
        assert_eq!(err, SnapshotError::Truncated);
    }

    #[test]
    fn execution_resumes_identically_after_restore() {
        let mut chipset = Chipset::new(&ChipsetConfig::default());
        chipset.execute_until(5_000);
        let snapshot = chipset.suspend().save_snapshot();

        let mut restored = Chipset::new(&ChipsetConfig::default());
        restored.suspend().load_snapshot(&snapshot).expect("loads");

        chipset.execute_until(10_000);
        restored.execute_until(10_000);
        assert_eq!(chipset.beam(), restored.beam());
        assert_eq!(chipset.paula.intreq, restored.paula.intreq);
    }
}
