//! Disk media: the magnetised surface a drive head reads and writes.
//!
//! A disk stores raw MFM-encoded track bytes for 84 cylinders x 2 sides.
//! Geometry is validated at construction; a drive never sees a malformed
//! disk. Write protection is enforced here: writing a protected disk drops
//! the byte, matching the hardware (no diagnostic, no error).

use crate::mfm;

/// Supported media types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskType {
    /// 3.5" double density, 11 sectors per track.
    Dd35,
}

/// Cylinders a 3.5" mechanism can reach (0..=83).
pub const NUM_CYLINDERS: usize = 84;

/// Sides per disk.
pub const NUM_SIDES: usize = 2;

/// Reasons a byte image is rejected at insertion.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiskGeometryError {
    #[error("sector image is {got} bytes, expected {expected}")]
    BadImageSize { got: usize, expected: usize },
    #[error("track {track} out of range for media type")]
    BadTrack { track: usize },
}

/// A floppy disk: MFM track data plus protection state.
#[derive(Clone, Debug)]
pub struct Disk {
    disk_type: DiskType,
    /// Raw MFM bytes, `NUM_CYLINDERS * NUM_SIDES` tracks.
    tracks: Vec<Vec<u8>>,
    write_protected: bool,
    modified: bool,
}

impl Disk {
    /// A blank formatted disk: every sector zeroed, every track carrying
    /// valid sync marks and checksums.
    #[must_use]
    pub fn blank(disk_type: DiskType) -> Self {
        let sectors = vec![0u8; mfm::DD_SECTORS_PER_TRACK * mfm::SECTOR_BYTES];
        let tracks = (0..NUM_CYLINDERS * NUM_SIDES)
            .map(|t| mfm::encode_track(&sectors, t as u8))
            .collect();
        Self {
            disk_type,
            tracks,
            write_protected: false,
            modified: false,
        }
    }

    /// Build a disk from a flat sector image (880 KiB for DD), encoding each
    /// track to MFM.
    ///
    /// # Errors
    ///
    /// Returns [`DiskGeometryError::BadImageSize`] if the image does not
    /// match the media geometry.
    pub fn from_sectors(disk_type: DiskType, image: &[u8]) -> Result<Self, DiskGeometryError> {
        // Sector images describe the 80 formatted cylinders; the remaining
        // reachable cylinders stay blank.
        let formatted_tracks = 80 * NUM_SIDES;
        let track_bytes = mfm::DD_SECTORS_PER_TRACK * mfm::SECTOR_BYTES;
        let expected = formatted_tracks * track_bytes;
        if image.len() != expected {
            return Err(DiskGeometryError::BadImageSize {
                got: image.len(),
                expected,
            });
        }

        let blank_sectors = vec![0u8; track_bytes];
        let tracks = (0..NUM_CYLINDERS * NUM_SIDES)
            .map(|t| {
                if t < formatted_tracks {
                    mfm::encode_track(&image[t * track_bytes..(t + 1) * track_bytes], t as u8)
                } else {
                    mfm::encode_track(&blank_sectors, t as u8)
                }
            })
            .collect();

        Ok(Self {
            disk_type,
            tracks,
            write_protected: false,
            modified: false,
        })
    }

    /// Rebuild a disk from raw MFM track blobs (snapshot restore path).
    ///
    /// # Errors
    ///
    /// Returns [`DiskGeometryError::BadTrack`] if the track count is wrong.
    pub fn from_raw_tracks(
        disk_type: DiskType,
        tracks: Vec<Vec<u8>>,
        write_protected: bool,
    ) -> Result<Self, DiskGeometryError> {
        if tracks.len() != NUM_CYLINDERS * NUM_SIDES {
            return Err(DiskGeometryError::BadTrack {
                track: tracks.len(),
            });
        }
        Ok(Self {
            disk_type,
            tracks,
            write_protected,
            modified: false,
        })
    }

    #[must_use]
    pub fn disk_type(&self) -> DiskType {
        self.disk_type
    }

    /// Length of one track in bytes; `head.offset` wraps at this value.
    #[must_use]
    pub fn track_size(&self) -> usize {
        self.tracks[0].len()
    }

    #[must_use]
    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protection(&mut self, value: bool) {
        self.write_protected = value;
    }

    /// Whether any byte has been written since insertion or the last save.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, value: bool) {
        self.modified = value;
    }

    /// Raw track bytes (snapshot save path).
    #[must_use]
    pub fn raw_track(&self, cylinder: usize, side: usize) -> &[u8] {
        &self.tracks[cylinder * NUM_SIDES + side]
    }

    #[must_use]
    pub fn read_byte(&self, cylinder: usize, side: usize, offset: usize) -> u8 {
        self.tracks[cylinder * NUM_SIDES + side][offset]
    }

    /// Write one byte at the given head position. Dropped silently if the
    /// disk is write protected.
    pub fn write_byte(&mut self, value: u8, cylinder: usize, side: usize, offset: usize) {
        if self.write_protected {
            log::trace!("write to protected disk dropped (cyl {cylinder} side {side})");
            return;
        }
        self.tracks[cylinder * NUM_SIDES + side][offset] = value;
        self.modified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_disk_has_full_geometry() {
        let disk = Disk::blank(DiskType::Dd35);
        assert_eq!(disk.track_size(), mfm::MFM_TRACK_BYTES);
        assert_eq!(disk.raw_track(83, 1).len(), mfm::MFM_TRACK_BYTES);
    }

    #[test]
    fn bad_image_size_is_rejected() {
        let err = Disk::from_sectors(DiskType::Dd35, &[0u8; 100]).unwrap_err();
        assert_eq!(
            err,
            DiskGeometryError::BadImageSize {
                got: 100,
                expected: 80 * 2 * 11 * 512,
            }
        );
    }

    #[test]
    fn sector_image_round_trips_through_tracks() {
        let image = vec![0x5Au8; 80 * 2 * 11 * 512];
        let disk = Disk::from_sectors(DiskType::Dd35, &image).expect("valid image");
        // The encoded track contains sync marks for every sector.
        let track = disk.raw_track(0, 0);
        let syncs = track.windows(2).filter(|w| *w == [0x44, 0x89]).count();
        assert!(syncs >= mfm::DD_SECTORS_PER_TRACK);
    }

    #[test]
    fn write_protection_drops_bytes() {
        let mut disk = Disk::blank(DiskType::Dd35);
        let before = disk.read_byte(0, 0, 10);
        disk.set_write_protection(true);
        disk.write_byte(before.wrapping_add(1), 0, 0, 10);
        assert_eq!(disk.read_byte(0, 0, 10), before);
        assert!(!disk.is_modified());
    }

    #[test]
    fn write_sets_modified() {
        let mut disk = Disk::blank(DiskType::Dd35);
        disk.write_byte(0x42, 1, 1, 0);
        assert!(disk.is_modified());
        assert_eq!(disk.read_byte(1, 1, 0), 0x42);
    }
}
