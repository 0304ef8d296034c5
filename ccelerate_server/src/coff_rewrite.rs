#![deny(clippy::unwrap_used)]

//! Rewrites the embedded build timestamp in COFF object files so that two
//! builds of unchanged source produce byte-identical output (§4.1's key
//! policy). A plain COFF header stores a little-endian Unix timestamp at
//! offset 4; the "bigobj" variant (object files with more than the
//! classic section-count limit) is recognised by the sentinel `0x0000
//! 0xffff` at offset 0 and stores its timestamp at offset 8.

/// Current Unix time truncated to 32 bits, the same width the COFF/bigobj
/// timestamp fields hold.
pub fn current_unix_timestamp() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Rewrites the embedded timestamp to `timestamp` (the caller passes
/// `current_unix_timestamp()` in production and a fixed value in tests, so
/// the rewrite itself stays deterministic and testable). Returns `true` if a
/// timestamp field was found and rewritten.
pub fn rewrite_timestamp(data: &mut [u8], timestamp: u32) -> bool {
    if is_bigobj(data) {
        rewrite_at(data, 8, timestamp)
    } else if data.len() >= 20 {
        rewrite_at(data, 4, timestamp)
    } else {
        false
    }
}

fn is_bigobj(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0x00 && data[1] == 0x00 && data[2] == 0xff && data[3] == 0xff
}

fn rewrite_at(data: &mut [u8], offset: usize, timestamp: u32) -> bool {
    if data.len() < offset + 4 {
        return false;
    }
    data[offset..offset + 4].copy_from_slice(&timestamp.to_le_bytes());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_plain_coff_timestamp_to_the_given_time() {
        let mut data = vec![0u8; 20];
        data[0] = 0x4c;
        data[1] = 0x01;
        data[4..8].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        assert!(rewrite_timestamp(&mut data, 0xcafe_babe));
        assert_eq!(&data[4..8], &0xcafe_babeu32.to_le_bytes());
    }

    #[test]
    fn rewrites_bigobj_timestamp_at_its_own_offset() {
        let mut data = vec![0u8; 44];
        data[0..4].copy_from_slice(&[0x00, 0x00, 0xff, 0xff]);
        data[8..12].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        assert!(rewrite_timestamp(&mut data, 0xcafe_babe));
        assert_eq!(&data[8..12], &0xcafe_babeu32.to_le_bytes());
    }

    #[test]
    fn too_short_buffer_is_left_untouched() {
        let mut data = vec![0u8; 2];
        assert!(!rewrite_timestamp(&mut data, 0xcafe_babe));
    }

    #[test]
    fn current_unix_timestamp_is_after_the_unix_epoch() {
        assert!(current_unix_timestamp() > 0);
    }
}
