//! The event scheduler: one slot per chipset client, dispatched in cycle
//! order.
//!
//! Each slot holds a trigger cycle, an event id, and an optional payload.
//! `NEVER` disables a slot. The scheduler itself never calls handlers; the
//! owning chipset walks the due slots in ascending slot-id order, which
//! makes same-cycle dependencies deterministic (register changes land
//! first, the line wrap next, fixed DMA before the copper, the copper
//! before the blitter).

/// Chip-cycle count from power-on. One unit per DMA cycle; 228 per line.
pub type Cycle = i64;

/// Trigger value of a disabled slot.
pub const NEVER: Cycle = Cycle::MAX;

/// The closed set of scheduler slots, in service order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SlotId {
    /// Deferred register changes.
    Reg,
    /// Line boundary (horizontal sync).
    Ras,
    /// CIA A wake-up (driven by external CIA emulation).
    CiaA,
    /// CIA B wake-up (driven by external CIA emulation).
    CiaB,
    /// Bitplane DMA (slot table driven).
    Bpl,
    /// Disk/audio/sprite/refresh DMA (slot table driven).
    Das,
    /// Copper.
    Cop,
    /// Blitter.
    Blt,
    /// Disk controller byte clock.
    Dsk,
    /// Vertical-blank interrupt strobe.
    Vbl,
    /// Delayed interrupt delivery.
    Irq,
    /// Periodic state inspection.
    Ins,
    /// Secondary fan-out (disk-change events).
    Sec,
    /// Keyboard (driven by external keyboard emulation).
    Kbd,
}

/// Number of slots.
pub const SLOT_COUNT: usize = 14;

impl SlotId {
    /// All slots in service order.
    pub const ALL: [SlotId; SLOT_COUNT] = [
        SlotId::Reg,
        SlotId::Ras,
        SlotId::CiaA,
        SlotId::CiaB,
        SlotId::Bpl,
        SlotId::Das,
        SlotId::Cop,
        SlotId::Blt,
        SlotId::Dsk,
        SlotId::Vbl,
        SlotId::Irq,
        SlotId::Ins,
        SlotId::Sec,
        SlotId::Kbd,
    ];
}

/// What a slot does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventId {
    #[default]
    None,
    /// Apply the next recorded register change.
    RegChange,
    /// Conclude the current raster line.
    RasHsync,
    /// External CIA hook; the core never schedules it.
    CiaExecute,
    /// Execute the bitplane slot-table entry at the current position.
    BplFetch,
    /// Execute the disk/audio/sprite slot-table entry at the current
    /// position.
    DasFetch,
    // Copper: the scheduled id doubles as the state machine state.
    CopRequestDma,
    CopFetch,
    CopMove,
    CopWaitOrSkip,
    CopJmp1,
    CopJmp2,
    /// Blitter bus request.
    BltExecute,
    /// Shift the next MFM byte through the disk FIFO.
    DskRotate,
    /// Vertical-blank interrupt.
    VblStrobe,
    /// Deliver due delayed interrupts.
    IrqCheck,
    /// Record an inspection snapshot.
    InsInspect,
    /// Secondary fan-out trigger.
    SecTrigger,
    /// Disk-change: insert the pending disk into drive `data`.
    DchInsert,
    /// Disk-change: eject the disk from drive `data`.
    DchEject,
    /// External keyboard hook; the core never schedules it.
    KbdExecute,
}

impl EventId {
    /// Wire code for the persisted state stream.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Decode a wire code; `None` for unknown values.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        const ALL: [EventId; 21] = [
            EventId::None,
            EventId::RegChange,
            EventId::RasHsync,
            EventId::CiaExecute,
            EventId::BplFetch,
            EventId::DasFetch,
            EventId::CopRequestDma,
            EventId::CopFetch,
            EventId::CopMove,
            EventId::CopWaitOrSkip,
            EventId::CopJmp1,
            EventId::CopJmp2,
            EventId::BltExecute,
            EventId::DskRotate,
            EventId::VblStrobe,
            EventId::IrqCheck,
            EventId::InsInspect,
            EventId::SecTrigger,
            EventId::DchInsert,
            EventId::DchEject,
            EventId::KbdExecute,
        ];
        ALL.iter().copied().find(|id| id.code() == code)
    }
}

/// One scheduler slot.
#[derive(Debug, Clone, Copy)]
pub struct EventSlot {
    pub trigger: Cycle,
    pub id: EventId,
    pub data: i64,
}

impl Default for EventSlot {
    fn default() -> Self {
        Self {
            trigger: NEVER,
            id: EventId::None,
            data: 0,
        }
    }
}

/// Master time base plus the event slot array.
pub struct Scheduler {
    /// The chipset has been emulated up to this cycle.
    pub clock: Cycle,
    slots: [EventSlot; SLOT_COUNT],
    next_trigger: Cycle,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: 0,
            slots: [EventSlot::default(); SLOT_COUNT],
            next_trigger: NEVER,
        }
    }

    /// Earliest trigger over all slots; `NEVER` when nothing is scheduled.
    #[must_use]
    pub fn next_trigger(&self) -> Cycle {
        self.next_trigger
    }

    #[must_use]
    pub fn slot(&self, slot: SlotId) -> &EventSlot {
        &self.slots[slot as usize]
    }

    #[must_use]
    pub fn has_event(&self, slot: SlotId) -> bool {
        self.slots[slot as usize].trigger != NEVER
    }

    /// Whether the slot fires at or before `cycle`.
    #[must_use]
    pub fn is_due(&self, slot: SlotId, cycle: Cycle) -> bool {
        self.slots[slot as usize].trigger <= cycle
    }

    /// Set a slot to fire at an absolute cycle. `NEVER` disables it.
    pub fn schedule_abs(&mut self, slot: SlotId, trigger: Cycle, id: EventId) {
        self.schedule_abs_data(slot, trigger, id, 0);
    }

    pub fn schedule_abs_data(&mut self, slot: SlotId, trigger: Cycle, id: EventId, data: i64) {
        let entry = &mut self.slots[slot as usize];
        entry.trigger = trigger;
        entry.id = id;
        entry.data = data;
        self.recompute_next_trigger();
    }

    /// Set a slot to fire `delta` cycles from now.
    ///
    /// Scheduling is infallible for valid inputs; a negative delta is a
    /// fatal scheduling invariant violation.
    pub fn schedule_rel(&mut self, slot: SlotId, delta: Cycle, id: EventId) {
        self.schedule_rel_data(slot, delta, id, 0);
    }

    pub fn schedule_rel_data(&mut self, slot: SlotId, delta: Cycle, id: EventId, data: i64) {
        assert!(
            delta >= 0,
            "schedule invariant violated: {slot:?} scheduled {delta} cycles in the past \
             (clock = {})",
            self.clock
        );
        self.schedule_abs_data(slot, self.clock + delta, id, data);
    }

    /// Move a slot's trigger, keeping its id and payload.
    pub fn reschedule_abs(&mut self, slot: SlotId, trigger: Cycle) {
        self.slots[slot as usize].trigger = trigger;
        self.recompute_next_trigger();
    }

    /// Move a slot's trigger relative to now, keeping its id and payload.
    pub fn reschedule_rel(&mut self, slot: SlotId, delta: Cycle) {
        assert!(
            delta >= 0,
            "schedule invariant violated: {slot:?} rescheduled {delta} cycles in the past \
             (clock = {})",
            self.clock
        );
        self.reschedule_abs(slot, self.clock + delta);
    }

    /// Disable a slot. O(1), never fails, carries no resource ownership.
    pub fn cancel(&mut self, slot: SlotId) {
        self.slots[slot as usize].trigger = NEVER;
        self.recompute_next_trigger();
    }

    fn recompute_next_trigger(&mut self) {
        let mut min = NEVER;
        for slot in &self.slots {
            if slot.trigger < min {
                min = slot.trigger;
            }
        }
        self.next_trigger = min;
    }

    /// Diagnostic dump of the slot table, used by fatal error reports.
    #[must_use]
    pub fn dump_slots(&self) -> String {
        let mut out = String::new();
        for (i, slot) in SlotId::ALL.iter().enumerate() {
            let entry = &self.slots[i];
            if entry.trigger == NEVER {
                out.push_str(&format!("{slot:?}: never\n"));
            } else {
                out.push_str(&format!(
                    "{slot:?}: trigger={} id={:?} data={}\n",
                    entry.trigger, entry.id, entry.data
                ));
            }
        }
        out
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
