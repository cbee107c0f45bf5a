//! The owning container: one clock, one scheduler, one arbiter, one copper,
//! one disk controller, four drives.
//!
//! All cross-component work happens here. Components hold no references to
//! each other; every operation that spans two of them is a method on
//! [`Chipset`] that borrows the fields it needs, with the clock threaded
//! through explicitly. Event dispatch is synchronous and single-threaded:
//! the only suspension point is [`execute_until`](Chipset::execute_until).
//!
//! Host-side observation goes through [`suspend`](Chipset::suspend), which
//! hands out a guard; configuration changes and consistent inspection reads
//! are only possible through that guard.

use drive_amiga_floppy::{Acceleration, Disk, Drive};

use crate::agnus::{Agnus, BplEvent, BusOwner, ChangeRecorder, DasEvent, RegChange};
use crate::beam::{Beam, HPOS_CNT};
use crate::blitter::Blitter;
use crate::cia::CiaBridge;
use crate::config::ChipsetConfig;
use crate::copper::{Copper, CopperState};
use crate::custom_regs::{self as regs};
use crate::disk_controller::{DiskController, DISK_BYTE_CYCLES};
use crate::memory::Memory;
use crate::paula::{Paula, INT_VERTB};
use crate::scheduler::{Cycle, EventId, Scheduler, SlotId, NEVER};

/// Delay between the vertical strobe and the copper's jump to COP1LC.
const COPPER_VSTROBE_DELAY: Cycle = 2;

/// Result of a CPU chip-memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipAccess {
    pub data: u16,
    /// DMA cycles the CPU was held off the bus.
    pub wait_cycles: u32,
}

/// Errors surfaced to the host at the insertion boundary.
#[derive(Debug, thiserror::Error)]
pub enum InsertionError {
    #[error("drive df{0} is not connected")]
    NotConnected(usize),
}

/// The chipset core.
pub struct Chipset {
    pub mem: Memory,
    pub sched: Scheduler,
    pub agnus: Agnus,
    pub copper: Copper,
    pub blitter: Blitter,
    pub paula: Paula,
    pub disk: DiskController,
    pub bridge: CiaBridge,
    pub drives: [Drive; 4],

    /// Colour register latches (the Denise-facing end of COLORxx MOVEs).
    pub color: [u16; 32],

    pub(crate) changes: ChangeRecorder,
    disk_to_insert: Option<Disk>,
}

impl Chipset {
    #[must_use]
    pub fn new(config: &ChipsetConfig) -> Self {
        let mut chipset = Self {
            mem: Memory::new(config.chip_ram_size),
            sched: Scheduler::new(),
            agnus: Agnus::new(config.revision, config.region),
            copper: Copper::new(),
            blitter: Blitter::new(),
            paula: Paula::new(),
            disk: DiskController::new(),
            bridge: CiaBridge::new(),
            drives: [
                Drive::new(0, config.drives[0].mechanics),
                Drive::new(1, config.drives[1].mechanics),
                Drive::new(2, config.drives[2].mechanics),
                Drive::new(3, config.drives[3].mechanics),
            ],
            color: [0; 32],
            changes: ChangeRecorder::default(),
            disk_to_insert: None,
        };

        for nr in 0..4 {
            chipset.disk.connected[nr] = config.drives[nr].connected;
        }
        // The internal drive cannot be unplugged.
        chipset.disk.connected[0] = true;

        chipset.agnus.update_bpl_events(0);
        chipset.agnus.update_das_events(0);

        // Initial slot setup.
        chipset
            .sched
            .schedule_abs(SlotId::Ras, Cycle::from(HPOS_CNT), EventId::RasHsync);
        chipset.sched.schedule_abs(SlotId::Vbl, 1, EventId::VblStrobe);
        chipset.sched.schedule_abs(SlotId::Irq, NEVER, EventId::IrqCheck);
        chipset.sched.schedule_abs(SlotId::Sec, NEVER, EventId::SecTrigger);
        chipset.agnus.schedule_next_bpl_event(&mut chipset.sched);
        chipset.agnus.schedule_next_das_event(&mut chipset.sched);

        chipset
    }

    #[must_use]
    pub fn clock(&self) -> Cycle {
        self.sched.clock
    }

    #[must_use]
    pub fn beam(&self) -> Beam {
        self.agnus.pos
    }

    //
    // Time
    //

    /// Run the chipset until every event with a trigger at or before
    /// `target` has been dispatched and the clock reads `target`.
    pub fn execute_until(&mut self, target: Cycle) {
        loop {
            while self.sched.next_trigger() <= self.sched.clock {
                self.execute_events();
            }
            if self.sched.clock >= target {
                break;
            }

            // Fast-forward to the next piece of work. The RAS slot fires
            // every line, so the jump never crosses a line boundary.
            let stop = target.min(self.sched.next_trigger());
            let delta = stop - self.sched.clock;
            self.sched.clock = stop;
            self.agnus.pos.h += delta as u16;
            debug_assert!(self.agnus.pos.h <= HPOS_CNT);
        }
    }

    /// Advance exactly one DMA cycle.
    pub fn execute_cycle(&mut self) {
        self.execute_until(self.sched.clock + 1);
    }

    /// Run until the start of the next frame.
    pub fn run_frame(&mut self) {
        let start = self.agnus.start_of_frame(self.sched.clock);
        self.execute_until(start + self.agnus.cycles_in_frame());
    }

    /// Service every slot due at the current clock, in slot-id order. A
    /// handler rescheduling a slot to the current cycle is serviced again
    /// in the same pass.
    fn execute_events(&mut self) {
        let now = self.sched.clock;
        loop {
            for slot in SlotId::ALL {
                if self.sched.is_due(slot, now) {
                    self.service_slot(slot);
                }
            }
            if self.sched.next_trigger() > now {
                break;
            }
        }
    }

    fn service_slot(&mut self, slot: SlotId) {
        let id = self.sched.slot(slot).id;
        let data = self.sched.slot(slot).data;

        match slot {
            SlotId::Reg => self.service_reg_event(),
            SlotId::Ras => self.service_ras_event(),
            SlotId::Bpl => self.service_bpl_event(),
            SlotId::Das => self.service_das_event(),
            SlotId::Cop => self.service_copper_event(id),
            SlotId::Blt => self.service_blitter_event(),
            SlotId::Dsk => self.service_disk_event(),
            SlotId::Vbl => self.service_vbl_event(),
            SlotId::Irq => self.service_irq_event(),
            SlotId::Ins => self.service_ins_event(),
            SlotId::Sec => self.service_sec_event(id, data),
            // External hooks; nothing to run inside the core.
            SlotId::CiaA | SlotId::CiaB | SlotId::Kbd => self.sched.cancel(slot),
        }
    }

    //
    // Slot services
    //

    fn service_reg_event(&mut self) {
        let now = self.sched.clock;
        while let Some(change) = self.changes.pop_due(now) {
            self.apply_register_change(change.reg, change.value);
        }
        match self.changes.next_trigger() {
            Some(trigger) => self.sched.schedule_abs(SlotId::Reg, trigger, EventId::RegChange),
            None => self.sched.cancel(SlotId::Reg),
        }
    }

    fn service_ras_event(&mut self) {
        let vsync = self.agnus.hsync(&mut self.sched);
        if vsync {
            self.vsync_actions();
        }
    }

    fn vsync_actions(&mut self) {
        // "No matter what the Copper is doing, when the end of vertical
        // blanking occurs, the Copper is automatically forced to restart
        // its operations at the address contained in COP1LC." [HRM]
        self.copper.state = CopperState::Jmp1;
        self.sched
            .schedule_rel(SlotId::Cop, COPPER_VSTROBE_DELAY, EventId::CopJmp1);
    }

    fn service_vbl_event(&mut self) {
        self.paula.raise_irq(INT_VERTB);
        self.sched
            .reschedule_rel(SlotId::Vbl, self.agnus.cycles_in_frame());
    }

    fn service_irq_event(&mut self) {
        let next = self.paula.service_irq_check(self.sched.clock);
        self.sched.schedule_abs(SlotId::Irq, next, EventId::IrqCheck);
    }

    fn service_ins_event(&mut self) {
        // Periodic inspection wakes the host; the payload is the interval.
        let interval = self.sched.slot(SlotId::Ins).data;
        log::trace!("inspection at beam {:?}", self.agnus.pos);
        if interval > 0 {
            self.sched.reschedule_rel(SlotId::Ins, interval);
        } else {
            self.sched.cancel(SlotId::Ins);
        }
    }

    fn service_sec_event(&mut self, id: EventId, data: i64) {
        match id {
            EventId::DchInsert => {
                let nr = data as usize;
                if let Some(disk) = self.disk_to_insert.take() {
                    self.drives[nr].insert_disk(disk);
                }
            }
            EventId::DchEject => {
                let nr = data as usize;
                self.drives[nr].eject_disk();
            }
            _ => {}
        }
        self.sched.cancel(SlotId::Sec);
    }

    fn service_bpl_event(&mut self) {
        let h = self.agnus.pos.h as usize;
        let event = self.agnus.bpl_event[h];

        if let Some(plane) = event.channel() {
            let value = self.agnus.do_bitplane_dma(&self.mem, plane);
            self.agnus.bpl_dat[plane] = value;
        } else if event.base() == BplEvent::EOL && self.agnus.bpl_dma_line() {
            self.agnus.add_bpl_modulos();
        }

        self.agnus.schedule_next_bpl_event(&mut self.sched);
    }

    fn service_das_event(&mut self) {
        let h = self.agnus.pos.h as usize;
        let event = self.agnus.das_event[h];

        match event {
            DasEvent::None => {}
            DasEvent::Refresh => self.agnus.do_refresh(),
            DasEvent::D0 | DasEvent::D1 | DasEvent::D2 => {
                self.disk.perform_dma(
                    &mut self.drives,
                    &mut self.agnus,
                    &mut self.mem,
                    &mut self.paula,
                    self.sched.clock,
                );
                self.sync_irq_slot();
                self.forward_index_pulse();
            }
            DasEvent::Sdma => self.agnus.update_sprite_dma(),
            _ => {
                if let Some(channel) = event.audio() {
                    let value = self.agnus.do_audio_dma(&self.mem, channel);
                    self.paula.aud_dat[channel] = value;
                } else if let Some((nr, word)) = event.sprite() {
                    self.service_sprite_slot(nr, word);
                }
            }
        }

        self.agnus.schedule_next_das_event(&mut self.sched);
    }

    fn service_sprite_slot(&mut self, nr: usize, word: usize) {
        use crate::agnus::SprDmaState;

        let v = self.agnus.pos.v;
        if v == self.agnus.spr_vstop[nr] {
            // Fetch the next control words and go idle.
            self.agnus.spr_dma_state[nr] = SprDmaState::Idle;
            let value = self.agnus.do_sprite_dma(&self.mem, nr);
            if word == 0 {
                self.agnus.poke_sprpos(nr, value);
            } else {
                self.agnus.poke_sprctl(nr, value);
            }
        } else if self.agnus.spr_dma_state[nr] == SprDmaState::Active {
            let value = self.agnus.do_sprite_dma(&self.mem, nr);
            self.agnus.spr_dat[nr][word] = value;
        }
    }

    fn service_disk_event(&mut self) {
        self.disk
            .execute_fifo(&mut self.drives, &mut self.paula, self.sched.clock);
        self.forward_index_pulse();

        if self.disk.spinning(&self.drives) {
            self.sched
                .reschedule_rel(SlotId::Dsk, DISK_BYTE_CYCLES);
        } else {
            self.sched.cancel(SlotId::Dsk);
        }
    }

    fn service_blitter_event(&mut self) {
        if !self.blitter.busy {
            self.sched.cancel(SlotId::Blt);
            return;
        }

        if self.agnus.blitter_can_have_bus() {
            let value = self
                .agnus
                .do_blitter_dma_read(&self.mem, self.blitter.bltapt);
            let dest = self.blitter.bltdpt;
            self.mem.poke16(dest, value);
            if self.blitter.advance(value) {
                self.paula.raise_irq(crate::paula::INT_BLIT);
                self.sched.cancel(SlotId::Blt);
                return;
            }
        } else if !self.agnus.bltdma() {
            // Sleep until BLTEN returns.
            self.sched.cancel(SlotId::Blt);
            return;
        }

        self.sched.reschedule_rel(SlotId::Blt, 1);
    }

    fn service_copper_event(&mut self, id: EventId) {
        match id {
            EventId::CopRequestDma => {
                if self.agnus.copper_can_have_bus() {
                    self.copper.state = CopperState::Fetch;
                    self.sched.schedule_rel(SlotId::Cop, 2, EventId::CopFetch);
                } else {
                    self.copper_retry();
                }
            }

            EventId::CopFetch => {
                if self.agnus.copper_can_have_bus() {
                    let pc = self.copper.pc & self.mem.chip_mask();
                    self.copper.ins1 = self.agnus.do_copper_dma(&self.mem, pc);
                    self.copper.pc = self.copper.pc.wrapping_add(2);

                    if self.copper.is_move() {
                        self.copper.state = CopperState::Move;
                        self.sched.schedule_rel(SlotId::Cop, 2, EventId::CopMove);
                    } else {
                        self.copper.state = CopperState::WaitOrSkip;
                        self.sched
                            .schedule_rel(SlotId::Cop, 2, EventId::CopWaitOrSkip);
                    }
                } else {
                    self.copper_retry();
                }
            }

            EventId::CopMove => {
                if self.agnus.copper_can_have_bus() {
                    let pc = self.copper.pc & self.mem.chip_mask();
                    self.copper.ins2 = self.agnus.do_copper_dma(&self.mem, pc);
                    self.copper.pc = self.copper.pc.wrapping_add(2);

                    let reg = self.copper.ins1 & 0x1FE;
                    let value = self.copper.ins2;
                    let skipped = std::mem::take(&mut self.copper.skip);

                    if skipped {
                        log::trace!("copper MOVE to {reg:03X} skipped");
                    } else if self.copper.illegal_address(reg) {
                        // Unreachable without the danger bit; the write is
                        // quietly dropped.
                        log::trace!("copper MOVE to {reg:03X} dropped");
                    } else {
                        self.poke_custom16(reg, value);
                    }

                    self.copper.state = CopperState::Fetch;
                    self.sched.schedule_rel(SlotId::Cop, 2, EventId::CopFetch);
                } else {
                    self.copper_retry();
                }
            }

            EventId::CopWaitOrSkip => {
                if self.agnus.copper_can_have_bus() {
                    let pc = self.copper.pc & self.mem.chip_mask();
                    self.copper.ins2 = self.agnus.do_copper_dma(&self.mem, pc);
                    self.copper.pc = self.copper.pc.wrapping_add(2);

                    if self.copper.is_wait() {
                        self.copper_enter_wait();
                    } else {
                        self.copper.skip = self.copper.condition_met(self.agnus.pos);
                        self.copper.state = CopperState::Fetch;
                        self.sched.schedule_rel(SlotId::Cop, 2, EventId::CopFetch);
                    }
                } else {
                    self.copper_retry();
                }
            }

            EventId::CopJmp1 => {
                self.copper.pc = self.copper.loc[0];
                self.copper.state = CopperState::RequestDma;
                self.sched.schedule_rel(SlotId::Cop, 2, EventId::CopRequestDma);
            }

            EventId::CopJmp2 => {
                self.copper.pc = self.copper.loc[1];
                self.copper.state = CopperState::RequestDma;
                self.sched.schedule_rel(SlotId::Cop, 2, EventId::CopRequestDma);
            }

            _ => {}
        }
    }

    /// Bus denied: hold the state and try again next cycle, or go to sleep
    /// when copper DMA is off entirely (a DMACON write re-arms the slot).
    fn copper_retry(&mut self) {
        if self.agnus.copdma() {
            self.sched.reschedule_rel(SlotId::Cop, 1);
        } else {
            self.sched.cancel(SlotId::Cop);
        }
    }

    /// WAIT decoded: wake at the smallest beam position satisfying the
    /// comparator, or sleep to the next vertical strobe when none exists in
    /// this frame.
    fn copper_enter_wait(&mut self) {
        self.copper.state = CopperState::Wait;

        let wake = self.copper.next_trigger_position(self.agnus.pos);
        if wake.v < self.agnus.frame.num_lines(self.agnus.region) {
            let trigger = self.agnus.beam_to_cycle(self.sched.clock, wake);
            let trigger = trigger.max(self.sched.clock + 2);
            self.sched.schedule_abs(SlotId::Cop, trigger, EventId::CopFetch);
        } else {
            log::trace!(
                "copper sleeping to vertical strobe (wait {:04X},{:04X})",
                self.copper.ins1,
                self.copper.ins2
            );
            self.sched.cancel(SlotId::Cop);
        }
    }

    //
    // Delayed interrupts
    //

    /// Keep the IRQ slot aligned with Paula's earliest pending delivery.
    fn sync_irq_slot(&mut self) {
        let due = self.paula.next_irq_due();
        if due < self.sched.slot(SlotId::Irq).trigger {
            self.sched.schedule_abs(SlotId::Irq, due, EventId::IrqCheck);
        }
    }

    fn forward_index_pulse(&mut self) {
        if let Some(nr) = self.disk.selected {
            if self.drives[nr].take_index_pulse() {
                self.bridge.record_index_pulse();
            }
        }
    }

    //
    // CPU bus interface
    //

    /// Read a chip-memory word as the CPU: blocks until the arbiter has a
    /// free cycle, then stamps it as a CPU cycle.
    pub fn cpu_read_chip16(&mut self, addr: u32) -> ChipAccess {
        let wait_cycles = self.allocate_cpu_cycle();
        let data = self.mem.peek16(addr);
        self.agnus.bus_value[self.agnus.pos.h as usize] = data;
        ChipAccess { data, wait_cycles }
    }

    /// Write a chip-memory word as the CPU. Returns the waitstates taken.
    pub fn cpu_write_chip16(&mut self, addr: u32, value: u16) -> u32 {
        let wait_cycles = self.allocate_cpu_cycle();
        self.mem.poke16(addr, value);
        self.agnus.bus_value[self.agnus.pos.h as usize] = value;
        wait_cycles
    }

    /// Advance until the current cycle's bus is free, claim it for the CPU.
    /// Raises BLS after two denied cycles; a scan across a full line is a
    /// fatal arbitration failure.
    fn allocate_cpu_cycle(&mut self) -> u32 {
        let mut denied: u32 = 0;
        loop {
            // Let the DMA owners of this cycle claim it first.
            while self.sched.next_trigger() <= self.sched.clock {
                self.execute_events();
            }

            let h = self.agnus.pos.h as usize;
            if self.agnus.bus_owner[h] == BusOwner::None {
                self.agnus.bus_owner[h] = BusOwner::Cpu;
                self.agnus.bls = false;
                return denied;
            }

            denied += 1;
            if denied == 2 {
                self.agnus.bls = true;
            }
            if denied > u32::from(HPOS_CNT) {
                panic!(
                    "bus contention underflow: no free cycle within a full line at beam \
                     ({}, {}); slot table corrupt?\n{}",
                    self.agnus.pos.v,
                    self.agnus.pos.h,
                    self.sched.dump_slots()
                );
            }

            self.sched.clock += 1;
            self.agnus.pos.h += 1;
        }
    }

    //
    // Register file
    //

    /// Read a custom register by its 9-bit offset.
    #[must_use]
    pub fn peek_custom16(&self, reg: u16) -> u16 {
        match reg & 0x1FE {
            regs::DMACONR => {
                let mut value = self.agnus.dmacon & 0x07FF;
                if self.blitter.busy {
                    value |= regs::DMAF_BBUSY;
                }
                if self.blitter.bzero {
                    value |= regs::DMAF_BZERO;
                }
                value
            }
            regs::VPOSR => self.agnus.peek_vposr(),
            regs::VHPOSR => self.agnus.peek_vhposr(),
            regs::DSKDATR => self.disk.peek_dskdatr(),
            regs::DSKBYTR => self.disk.peek_dskbytr(self.sched.clock, self.agnus.dskdma()),
            regs::ADKCONR => self.paula.adkcon,
            regs::INTENAR => self.paula.intena,
            regs::INTREQR => self.paula.intreq,
            _ => 0,
        }
    }

    /// Write a custom register by its 9-bit offset. Used for both CPU and
    /// copper writes; the copper's danger filtering happens before this.
    pub fn poke_custom16(&mut self, reg: u16, value: u16) {
        let reg = reg & 0x1FE;
        log::trace!("custom {reg:03X} <- {value:04X}");

        match reg {
            regs::DSKPTH => {
                self.agnus.dskpt = (self.agnus.dskpt & 0x0000_FFFF) | (u32::from(value) << 16);
            }
            regs::DSKPTL => {
                self.agnus.dskpt = (self.agnus.dskpt & 0xFFFF_0000) | u32::from(value & 0xFFFE);
            }
            regs::DSKLEN => {
                let committed = self.disk.poke_dsklen(value, self.paula.adkcon);
                let turbo = self
                    .disk
                    .selected
                    .is_some_and(|nr| self.drives[nr].config().acceleration.is_turbo());
                if committed && turbo {
                    self.disk.perform_turbo_dma(
                        &mut self.drives,
                        &mut self.agnus,
                        &mut self.mem,
                        &mut self.paula,
                        self.sched.clock,
                    );
                    self.sync_irq_slot();
                    self.forward_index_pulse();
                }
            }
            regs::DSKDAT => {
                // Strobe register; the value never reaches anything.
            }
            regs::DSKSYNC => self.disk.poke_dsksync(value),
            regs::DMACON => self.poke_dmacon(value),
            regs::INTENA => self.paula.poke_intena(value),
            regs::INTREQ => self.paula.poke_intreq(value),
            regs::ADKCON => self.paula.poke_adkcon(value),
            regs::COPCON => self.copper.poke_copcon(value),
            regs::COP1LCH => self.copper.poke_loc_high(0, value),
            regs::COP1LCL => self.copper.poke_loc_low(0, value),
            regs::COP2LCH => self.copper.poke_loc_high(1, value),
            regs::COP2LCL => self.copper.poke_loc_low(1, value),
            regs::COPJMP1 => {
                // The strobe only takes while copper DMA is on; a disabled
                // copper starts at the next vertical strobe instead.
                if self.agnus.copdma() {
                    self.copper.state = CopperState::Jmp1;
                    self.sched.schedule_rel(SlotId::Cop, 1, EventId::CopJmp1);
                }
            }
            regs::COPJMP2 => {
                if self.agnus.copdma() {
                    self.copper.state = CopperState::Jmp2;
                    self.sched.schedule_rel(SlotId::Cop, 1, EventId::CopJmp2);
                }
            }
            regs::COPINS => self.copper.poke_copins(value),
            regs::DIWSTRT | regs::DIWSTOP | regs::DDFSTRT | regs::DDFSTOP => {
                self.record_register_change(2, reg, value);
            }
            regs::BPLCON0 => self.record_register_change(4, reg, value),
            regs::BPLCON1 => self.record_register_change(1, reg, value),
            regs::BPL1MOD => self.agnus.bpl1mod = value & 0xFFFE,
            regs::BPL2MOD => self.agnus.bpl2mod = value & 0xFFFE,
            _ => {
                if self.poke_pointer_register(reg, value).is_none() {
                    log::trace!("unhandled custom register {reg:03X}");
                }
            }
        }
    }

    fn poke_pointer_register(&mut self, reg: u16, value: u16) -> Option<()> {
        match reg {
            // Audio location registers AUDxLCH/AUDxLCL.
            0x0A0..=0x0D6 => {
                let rel = reg - regs::AUD0LCH;
                let channel = usize::from(rel / 0x10);
                match rel % 0x10 {
                    0x0 => {
                        self.agnus.audpt[channel] =
                            (self.agnus.audpt[channel] & 0x0000_FFFF) | (u32::from(value) << 16);
                    }
                    0x2 => {
                        self.agnus.audpt[channel] =
                            (self.agnus.audpt[channel] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
                    }
                    _ => return None,
                }
                Some(())
            }
            // Bitplane pointers BPLxPTH/BPLxPTL.
            0x0E0..=0x0F6 => {
                let rel = reg - regs::BPL1PTH;
                let plane = usize::from(rel / 4);
                if rel % 4 == 0 {
                    self.agnus.bplpt[plane] =
                        (self.agnus.bplpt[plane] & 0x0000_FFFF) | (u32::from(value) << 16);
                } else {
                    self.agnus.bplpt[plane] =
                        (self.agnus.bplpt[plane] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
                }
                Some(())
            }
            // Sprite pointers SPRxPTH/SPRxPTL.
            0x120..=0x13E => {
                let rel = reg - regs::SPR0PTH;
                let nr = usize::from(rel / 4);
                if rel % 4 == 0 {
                    self.agnus.sprpt[nr] =
                        (self.agnus.sprpt[nr] & 0x0000_FFFF) | (u32::from(value) << 16);
                } else {
                    self.agnus.sprpt[nr] =
                        (self.agnus.sprpt[nr] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
                }
                Some(())
            }
            // Sprite position/control SPRxPOS/SPRxCTL.
            0x140..=0x17E => {
                let rel = reg - 0x140;
                let nr = usize::from(rel / 8);
                match rel % 8 {
                    0 => self.agnus.poke_sprpos(nr, value),
                    2 => self.agnus.poke_sprctl(nr, value),
                    _ => return None,
                }
                Some(())
            }
            // Colour registers COLOR00-COLOR31 (12-bit on OCS).
            0x180..=0x1BE => {
                let nr = usize::from((reg - regs::COLOR00) / 2);
                self.color[nr] = value & 0x0FFF;
                Some(())
            }
            _ => None,
        }
    }

    fn poke_dmacon(&mut self, value: u16) {
        let old = self.agnus.dmacon;
        crate::custom_regs::set_clr_write(&mut self.agnus.dmacon, value);
        let new = self.agnus.dmacon;
        if old == new {
            return;
        }
        log::debug!("DMACON {old:04X} -> {new:04X}");

        // Bitplane DMA changes take effect from the current position.
        self.agnus.set_bpl_dma_line(self.agnus.in_bpl_dma_line());
        self.agnus.update_bpl_events(self.agnus.pos.h);
        self.agnus.schedule_next_bpl_event(&mut self.sched);

        // Disk/audio/sprite table for the rest of this line.
        let das = self.agnus.compute_das_mask();
        if das != self.agnus.das_mask() {
            self.agnus.update_das_events(das);
            self.agnus.schedule_next_das_event(&mut self.sched);
        }

        // A copper parked while COPEN was off stays parked; the vertical
        // strobe restarts it from COP1LC.

        // Wake the blitter when BLTEN returns with a blit in flight.
        if self.agnus.bltdma() && self.blitter.busy && !self.sched.has_event(SlotId::Blt) {
            self.sched.schedule_rel(SlotId::Blt, 1, EventId::BltExecute);
        }
    }

    /// Queue a register write that takes effect exactly `delay` cycles from
    /// now (the REG slot applies it).
    pub fn record_register_change(&mut self, delay: Cycle, reg: u16, value: u16) {
        self.changes.insert(RegChange {
            cycle: self.sched.clock + delay,
            reg,
            value,
        });
        if let Some(trigger) = self.changes.next_trigger() {
            if trigger < self.sched.slot(SlotId::Reg).trigger {
                self.sched.schedule_abs(SlotId::Reg, trigger, EventId::RegChange);
            }
        }
    }

    fn apply_register_change(&mut self, reg: u16, value: u16) {
        match reg {
            regs::DIWSTRT => {
                self.agnus.diwstrt = value;
                self.agnus.set_bpl_dma_line(self.agnus.in_bpl_dma_line());
            }
            regs::DIWSTOP => {
                self.agnus.diwstop = value;
                self.agnus.set_bpl_dma_line(self.agnus.in_bpl_dma_line());
            }
            regs::DDFSTRT => {
                self.agnus.ddfstrt = value;
                self.agnus.update_bpl_events(self.agnus.pos.h);
                self.agnus.schedule_next_bpl_event(&mut self.sched);
            }
            regs::DDFSTOP => {
                self.agnus.ddfstop = value;
                self.agnus.update_bpl_events(self.agnus.pos.h);
                self.agnus.schedule_next_bpl_event(&mut self.sched);
            }
            regs::BPLCON0 => {
                self.agnus.bplcon0 = value;
                self.agnus.set_bpl_dma_line(self.agnus.in_bpl_dma_line());
                self.agnus.update_bpl_events(self.agnus.pos.h);
                self.agnus.schedule_next_bpl_event(&mut self.sched);
            }
            regs::BPLCON1 => {
                self.agnus.bplcon1 = value & 0xFF;
                self.agnus.update_bpl_events(self.agnus.pos.h);
                self.agnus.schedule_next_bpl_event(&mut self.sched);
            }
            _ => log::warn!("recorded change to unexpected register {reg:03X}"),
        }
    }

    /// Program and start a copy blit. The blitter then competes for the bus
    /// one word per cycle until done.
    pub fn start_blit(&mut self, src: u32, dst: u32, words: u32) {
        self.blitter.bltapt = src;
        self.blitter.bltdpt = dst;
        self.blitter.start(words);
        if self.blitter.busy && self.agnus.bltdma() {
            self.sched.schedule_rel(SlotId::Blt, 1, EventId::BltExecute);
        }
    }

    //
    // CIA port surface
    //

    /// CPU write to CIA-B port B: drive control lines.
    pub fn poke_ciab_prb(&mut self, value: u8) {
        self.bridge
            .poke_prb(value, &mut self.disk, &mut self.drives, self.sched.clock);

        // The byte clock runs while any motor spins.
        if !self.disk.spinning(&self.drives) {
            self.sched.cancel(SlotId::Dsk);
        } else if !self.sched.has_event(SlotId::Dsk) {
            self.sched
                .schedule_rel(SlotId::Dsk, DISK_BYTE_CYCLES, EventId::DskRotate);
        }
    }

    /// CPU read of CIA-A port A: composed drive status flags.
    #[must_use]
    pub fn peek_ciaa_pra(&self) -> u8 {
        self.bridge
            .peek_pra(&self.disk, &self.drives, self.sched.clock)
    }

    //
    // Suspension protocol
    //

    /// Pause the core for inspection and configuration. All mutation of
    /// chipset layout goes through the returned guard; the core cannot run
    /// while it lives.
    pub fn suspend(&mut self) -> Suspended<'_> {
        Suspended { chipset: self }
    }
}

/// The suspended window: configuration changes and consistent inspection.
pub struct Suspended<'a> {
    chipset: &'a mut Chipset,
}

impl Suspended<'_> {
    #[must_use]
    pub fn chipset(&self) -> &Chipset {
        self.chipset
    }

    #[must_use]
    pub fn info_agnus(&self) -> crate::agnus::AgnusInfo {
        self.chipset.agnus.info()
    }

    #[must_use]
    pub fn info_disk_controller(&self) -> crate::disk_controller::DiskControllerInfo {
        self.chipset.disk.info()
    }

    #[must_use]
    pub fn info_drive(&self, nr: usize) -> drive_amiga_floppy::DriveInfo {
        self.chipset.drives[nr].info(self.chipset.sched.clock)
    }

    #[must_use]
    pub fn info_copper(&self) -> crate::copper::CopperInfo {
        let copper = &self.chipset.copper;
        crate::copper::CopperInfo {
            state: copper.state,
            pc: copper.pc & self.chipset.mem.chip_mask(),
            loc: copper.loc,
            danger: copper.danger,
        }
    }

    /// Change a drive's acceleration factor. Chipset layout changes are
    /// only legal while suspended.
    pub fn set_drive_acceleration(&mut self, nr: usize, acceleration: Acceleration) {
        self.chipset.drives[nr].set_acceleration(acceleration);
    }

    pub fn set_write_protection(&mut self, nr: usize, value: bool) {
        if let Some(disk) = self.chipset.drives[nr].disk_mut() {
            disk.set_write_protection(value);
        }
    }

    /// Queue a disk for insertion after `delay` cycles. A disk already in
    /// the drive is ejected first, and the insertion is pushed out to at
    /// least 1.5 s so the machine observes the change.
    pub fn insert_disk(&mut self, nr: usize, disk: Disk, delay: Cycle) -> Result<(), InsertionError> {
        let chipset = &mut *self.chipset;
        if !chipset.disk.connected[nr] {
            return Err(InsertionError::NotConnected(nr));
        }

        let mut delay = delay;
        if chipset.drives[nr].has_disk() {
            chipset.drives[nr].eject_disk();
            delay = delay.max(chipset.agnus.region.cycles_per_sec() * 3 / 2);
        }

        chipset.disk_to_insert = Some(disk);
        chipset.sched.schedule_rel_data(
            SlotId::Sec,
            delay,
            EventId::DchInsert,
            nr as i64,
        );
        Ok(())
    }

    /// Queue an ejection after `delay` cycles.
    pub fn eject_disk(&mut self, nr: usize, delay: Cycle) -> Result<(), InsertionError> {
        if !self.chipset.disk.connected[nr] {
            return Err(InsertionError::NotConnected(nr));
        }
        self.chipset
            .sched
            .schedule_rel_data(SlotId::Sec, delay, EventId::DchEject, nr as i64);
        Ok(())
    }

    /// Serialise the complete chipset state.
    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        crate::snapshot::save(self.chipset)
    }

    /// Restore a previously saved state.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::snapshot::SnapshotError`] on version mismatch or a
    /// truncated stream.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> Result<(), crate::snapshot::SnapshotError> {
        crate::snapshot::load(self.chipset, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChipsetConfig;

    fn make_chipset() -> Chipset {
        Chipset::new(&ChipsetConfig::default())
    }

    #[test]
    fn clock_advances_to_target() {
        let mut chipset = make_chipset();
        chipset.execute_until(1000);
        assert_eq!(chipset.clock(), 1000);
    }

    #[test]
    fn beam_tracks_clock() {
        let mut chipset = make_chipset();
        chipset.execute_until(Cycle::from(HPOS_CNT) * 3 + 17);
        assert_eq!(chipset.beam(), Beam::new(3, 17));
    }

    #[test]
    fn frame_wraps_at_line_count() {
        let mut chipset = make_chipset();
        let frame_cycles = chipset.agnus.cycles_in_frame();
        chipset.execute_until(frame_cycles + 5);
        assert_eq!(chipset.beam().v, 0);
        assert_eq!(chipset.beam().h, 5);
        assert_eq!(chipset.agnus.frame.nr, 1);
    }

    #[test]
    fn vertical_blank_raises_vertb() {
        let mut chipset = make_chipset();
        chipset.execute_until(2);
        assert_ne!(chipset.paula.intreq & (1 << INT_VERTB), 0);
    }

    #[test]
    fn refresh_slot_owns_cycle_one() {
        let mut chipset = make_chipset();
        chipset.execute_until(10);
        assert_eq!(chipset.agnus.bus_owner[0x01], BusOwner::Refresh);
    }

    #[test]
    fn cpu_gets_free_cycle_without_wait() {
        let mut chipset = make_chipset();
        chipset.execute_until(20);
        // Cycle 20 carries no DMA in the default state.
        let access = chipset.cpu_read_chip16(0x100);
        assert_eq!(access.wait_cycles, 0);
        assert_eq!(chipset.agnus.bus_owner[20], BusOwner::Cpu);
    }

    #[test]
    fn cpu_waits_behind_refresh() {
        let mut chipset = make_chipset();
        // Land exactly on the refresh slot of line 1.
        chipset.execute_until(Cycle::from(HPOS_CNT) + 1);
        let access = chipset.cpu_read_chip16(0x100);
        assert!(access.wait_cycles > 0, "refresh owns cycle 1");
    }

    #[test]
    fn dsklen_double_write_via_register_file() {
        let mut chipset = make_chipset();
        chipset.poke_custom16(regs::DSKLEN, 0x8000 | 4);
        chipset.poke_custom16(regs::DSKLEN, 0x8000 | 4);
        assert_eq!(
            chipset.disk.state,
            crate::disk_controller::DiskControllerState::Read
        );
    }

    #[test]
    fn deferred_register_change_lands_after_delay() {
        let mut chipset = make_chipset();
        chipset.execute_until(100);
        chipset.poke_custom16(regs::BPLCON0, 0x4200);
        assert_eq!(chipset.agnus.bplcon0, 0, "BPLCON0 must not change early");

        chipset.execute_until(103);
        assert_eq!(chipset.agnus.bplcon0, 0, "BPLCON0 changes after 4 cycles");
        chipset.execute_until(104);
        assert_eq!(chipset.agnus.bplcon0, 0x4200);
    }

    #[test]
    fn insertion_requires_connected_drive() {
        let mut chipset = make_chipset();
        let disk = Disk::blank(drive_amiga_floppy::DiskType::Dd35);
        let result = chipset.suspend().insert_disk(1, disk, 0);
        assert!(result.is_err());
    }

    #[test]
    fn insert_disk_lands_after_delay() {
        let mut chipset = make_chipset();
        let disk = Disk::blank(drive_amiga_floppy::DiskType::Dd35);
        chipset.suspend().insert_disk(0, disk, 500).expect("df0 connected");

        chipset.execute_until(499);
        assert!(!chipset.drives[0].has_disk());
        chipset.execute_until(501);
        assert!(chipset.drives[0].has_disk());
    }

    #[test]
    fn reinsertion_enforces_mechanical_gap() {
        let mut chipset = make_chipset();
        let blank = || Disk::blank(drive_amiga_floppy::DiskType::Dd35);
        chipset.suspend().insert_disk(0, blank(), 0).expect("df0");
        chipset.execute_until(10);
        assert!(chipset.drives[0].has_disk());

        // Swapping ejects now and inserts no sooner than 1.5 s later.
        chipset.suspend().insert_disk(0, blank(), 0).expect("df0");
        assert!(!chipset.drives[0].has_disk());
        let gap = chipset.agnus.region.cycles_per_sec() * 3 / 2;
        chipset.execute_until(gap - 100);
        assert!(!chipset.drives[0].has_disk());
        chipset.execute_until(gap + 100);
        assert!(chipset.drives[0].has_disk());
    }

    #[test]
    fn motor_on_arms_disk_byte_clock() {
        let mut chipset = make_chipset();
        // Select DF0 with the motor line low.
        chipset.poke_ciab_prb(0x7F & !0b1000);
        assert!(chipset.sched.has_event(SlotId::Dsk));

        // Deselect and stop the motor: the slot is cancelled.
        chipset.poke_ciab_prb(0xFF);
        chipset.poke_ciab_prb(0xFF & !0b1000);
        chipset.poke_ciab_prb(0xFF);
        assert!(!chipset.sched.has_event(SlotId::Dsk));
    }
}
