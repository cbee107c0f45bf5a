//! MFM track encoding for the Amiga raw disk format.
//!
//! Each DD track carries 11 sectors in the Amiga-specific MFM layout. The
//! encoding uses an odd/even bit split: for each longword, odd-position bits
//! are transmitted first, then even-position bits, and each half is
//! MFM-encoded separately.
//!
//! Sector layout (per HRM Appendix C):
//! 1. Gap: 2 words $AAAA
//! 2. Sync: 2 words $4489 (MFM-encoded $A1 with a missing clock bit)
//! 3. Header info: format=$FF, track number, sector number, sectors-to-gap
//! 4. Sector label: 16 zero bytes
//! 5. Header checksum: XOR of the MFM header + label longs
//! 6. Data checksum: XOR of the MFM data longs
//! 7. Data: 512 bytes (odd/even split, MFM-encoded)

/// The word-sync pattern separating MFM sectors.
pub const SYNC_WORD: u16 = 0x4489;

/// Sectors per track on a 3.5" DD disk.
pub const DD_SECTORS_PER_TRACK: usize = 11;

/// Bytes of user data per sector.
pub const SECTOR_BYTES: usize = 512;

/// Encoded bytes per sector: gap (4) + sync (4) + info (8) + label (32)
/// + header checksum (8) + data checksum (8) + data (1024).
pub const MFM_SECTOR_BYTES: usize = 1088;

/// Size of one MFM-encoded DD track in bytes, including the track gap.
pub const MFM_TRACK_BYTES: usize = 12_668;

/// Encode a full track of sector data into Amiga raw MFM format.
///
/// `sectors` must be exactly `DD_SECTORS_PER_TRACK * SECTOR_BYTES` bytes.
/// `track` is `cylinder * 2 + side`. The remainder of the track is filled
/// with $AA gap bytes up to [`MFM_TRACK_BYTES`].
///
/// # Panics
///
/// Panics if `sectors` has the wrong length.
#[must_use]
pub fn encode_track(sectors: &[u8], track: u8) -> Vec<u8> {
    assert_eq!(sectors.len(), DD_SECTORS_PER_TRACK * SECTOR_BYTES);

    let mut buf = Vec::with_capacity(MFM_TRACK_BYTES);
    for sector in 0..DD_SECTORS_PER_TRACK {
        let data = &sectors[sector * SECTOR_BYTES..(sector + 1) * SECTOR_BYTES];
        encode_sector(&mut buf, track, sector as u8, data);
    }

    // Track gap: clock bits only.
    buf.resize(MFM_TRACK_BYTES, 0xAA);
    buf
}

fn encode_sector(buf: &mut Vec<u8>, track: u8, sector: u8, data: &[u8]) {
    // Gap + sync.
    buf.extend_from_slice(&[0xAA, 0xAA, 0xAA, 0xAA]);
    buf.extend_from_slice(&SYNC_WORD.to_be_bytes());
    buf.extend_from_slice(&SYNC_WORD.to_be_bytes());

    // Header info long: [format, track, sector, sectors-to-gap].
    let to_gap = DD_SECTORS_PER_TRACK as u8 - sector;
    let info = u32::from_be_bytes([0xFF, track, sector, to_gap]);
    let info_odd = mfm_encode(odd_bits(info));
    let info_even = mfm_encode(even_bits(info));
    buf.extend_from_slice(&info_odd.to_be_bytes());
    buf.extend_from_slice(&info_even.to_be_bytes());

    // Sector label: 16 zero bytes, odd halves first.
    let label_mfm = mfm_encode(0);
    for _ in 0..8 {
        buf.extend_from_slice(&label_mfm.to_be_bytes());
    }

    // Header checksum over the MFM info + label longs.
    let hdr_cksum = info_odd ^ info_even; // label longs XOR to zero pairwise
    buf.extend_from_slice(&mfm_encode(odd_bits(hdr_cksum)).to_be_bytes());
    buf.extend_from_slice(&mfm_encode(even_bits(hdr_cksum)).to_be_bytes());

    // Data: 128 longs, odd halves first, checksum over all MFM data longs.
    let mut data_odd = [0u32; 128];
    let mut data_even = [0u32; 128];
    let mut data_cksum = 0u32;
    for (i, chunk) in data.chunks_exact(4).enumerate() {
        let long = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        data_odd[i] = mfm_encode(odd_bits(long));
        data_even[i] = mfm_encode(even_bits(long));
        data_cksum ^= data_odd[i] ^ data_even[i];
    }
    buf.extend_from_slice(&mfm_encode(odd_bits(data_cksum)).to_be_bytes());
    buf.extend_from_slice(&mfm_encode(even_bits(data_cksum)).to_be_bytes());
    for &long in &data_odd {
        buf.extend_from_slice(&long.to_be_bytes());
    }
    for &long in &data_even {
        buf.extend_from_slice(&long.to_be_bytes());
    }
}

/// Odd-position bits of a longword (31, 29, ..., 1), packed into the low 16.
fn odd_bits(val: u32) -> u32 {
    let mut result = 0;
    for i in 0..16 {
        result |= ((val >> (1 + i * 2)) & 1) << i;
    }
    result
}

/// Even-position bits of a longword (30, 28, ..., 0), packed into the low 16.
fn even_bits(val: u32) -> u32 {
    let mut result = 0;
    for i in 0..16 {
        result |= ((val >> (i * 2)) & 1) << i;
    }
    result
}

/// MFM-encode 16 data bits into a 32-bit longword. Each data bit is
/// preceded by a clock bit that is 1 only when both the previous and the
/// current data bit are 0.
fn mfm_encode(data: u32) -> u32 {
    let data = data & 0xFFFF;
    let mut mfm = 0u32;
    for i in (0..16).rev() {
        let data_bit = (data >> i) & 1;
        let prev_bit = if i < 15 { (data >> (i + 1)) & 1 } else { 0 };
        let clock = u32::from(prev_bit == 0 && data_bit == 0);
        let pos = (15 - i) * 2;
        mfm |= clock << (31 - pos);
        mfm |= data_bit << (30 - pos);
    }
    mfm
}

#[cfg(test)]
fn mfm_decode(mfm: u32) -> u32 {
    let mut data = 0u32;
    for i in 0..16 {
        data |= ((mfm >> (30 - i * 2)) & 1) << (15 - i);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfm_zero_is_all_clocks() {
        assert_eq!(mfm_encode(0x0000), 0xAAAA_AAAA);
    }

    #[test]
    fn mfm_ones_has_no_clocks() {
        assert_eq!(mfm_encode(0xFFFF), 0x5555_5555);
    }

    #[test]
    fn mfm_round_trip() {
        for data in [0x0000u32, 0xFFFF, 0xAAAA, 0x5555, 0x4489, 0x1234] {
            assert_eq!(mfm_decode(mfm_encode(data)), data, "${data:04X}");
        }
    }

    #[test]
    fn odd_even_split_reconstructs() {
        let val = 0xDEAD_BEEFu32;
        let mut rebuilt = 0u32;
        for i in 0..16 {
            rebuilt |= ((even_bits(val) >> i) & 1) << (i * 2);
            rebuilt |= ((odd_bits(val) >> i) & 1) << (i * 2 + 1);
        }
        assert_eq!(rebuilt, val);
    }

    #[test]
    fn encoded_track_has_one_sync_pair_per_sector() {
        let sectors = vec![0u8; DD_SECTORS_PER_TRACK * SECTOR_BYTES];
        let track = encode_track(&sectors, 0);

        let pattern = [0x44u8, 0x89, 0x44, 0x89];
        let count = track.windows(4).filter(|w| *w == pattern).count();
        assert_eq!(count, DD_SECTORS_PER_TRACK);
    }

    #[test]
    fn encoded_track_length() {
        let sectors = vec![0u8; DD_SECTORS_PER_TRACK * SECTOR_BYTES];
        assert_eq!(encode_track(&sectors, 0).len(), MFM_TRACK_BYTES);
    }
}
