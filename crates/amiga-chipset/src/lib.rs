//! Cycle-accurate Amiga chipset core.
//!
//! Reproduces, at the granularity of a single chip-bus cycle, the
//! interaction between the custom chipset and the CPU: the event scheduler
//! and bus arbiter, the copper, the disk controller with its floppy
//! drives, and the parallel-interface bridge they are sampled through.
//!
//! The CPU, pixel generation, audio synthesis and file formats are external
//! collaborators; this crate exposes the bus, the register file and the
//! adapter ports they attach to.
//!
//! ```
//! use amiga_chipset::{Chipset, ChipsetConfig};
//!
//! let mut chipset = Chipset::new(&ChipsetConfig::default());
//! chipset.run_frame();
//! assert_eq!(chipset.beam().v, 0);
//! ```

pub mod agnus;
pub mod beam;
pub mod blitter;
pub mod cia;
pub mod config;
pub mod copper;
pub mod custom_regs;
pub mod disk_controller;
pub mod memory;
pub mod paula;
pub mod scheduler;
pub mod snapshot;

mod chipset;

pub use agnus::{Agnus, AgnusInfo, AgnusRevision, BplEvent, BusOwner, DasEvent};
pub use beam::{Beam, Frame, Region, HPOS_CNT, HPOS_MAX};
pub use chipset::{ChipAccess, Chipset, InsertionError, Suspended};
pub use config::{ChipsetConfig, DriveSlot};
pub use copper::{Copper, CopperInfo, CopperState};
pub use disk_controller::{DiskController, DiskControllerInfo, DiskControllerState};
pub use paula::Paula;
pub use scheduler::{Cycle, EventId, Scheduler, SlotId, NEVER};
pub use snapshot::{SnapshotError, SNAPSHOT_VERSION};

// The drive crate is part of the public surface: disks are built there.
pub use drive_amiga_floppy::{Acceleration, Disk, DiskType, Drive, DriveConfig, DriveType};
