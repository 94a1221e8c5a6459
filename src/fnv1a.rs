//! Streaming 32-bit FNV-1a checksum, used to detect corruption at the tail
//! of every frame.

const OFFSET_BASIS: u32 = 0x811C_9DC5;
const PRIME: u32 = 0x0100_0193;

/// Number of trailing bytes a checksum occupies on the wire.
pub const CHECKSUM_LEN: usize = 4;

/// Reasons a checksum operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChecksumError {
    /// The frame is shorter than [`CHECKSUM_LEN`], so there's no room for a
    /// checksum field.
    TooShort,
}

/// Folds `bytes` into a running FNV-1a hash.
pub fn feed(mut h: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        h = (h ^ b as u32).wrapping_mul(PRIME);
    }
    h
}

/// Computes the FNV-1a checksum of `bytes` from the offset basis.
pub fn checksum(bytes: &[u8]) -> u32 {
    feed(OFFSET_BASIS, bytes)
}

/// Computes the checksum of `frame[..len-4]` and writes it into the last
/// four bytes of `frame`, byte 0 = LSB .. byte 3 = MSB.
pub fn put_at_end(frame: &mut [u8]) -> Result<(), ChecksumError> {
    let len = frame.len();
    if len < CHECKSUM_LEN {
        return Err(ChecksumError::TooShort);
    }
    let body_len = len - CHECKSUM_LEN;
    let sum = checksum(&frame[..body_len]);
    frame[body_len..].copy_from_slice(&sum.to_le_bytes());
    Ok(())
}

/// Recomputes the checksum over `frame[..len-4]` and compares it against the
/// trailing four bytes.
pub fn check_at_end(frame: &[u8]) -> Result<bool, ChecksumError> {
    let len = frame.len();
    if len < CHECKSUM_LEN {
        return Err(ChecksumError::TooShort);
    }
    let body_len = len - CHECKSUM_LEN;
    let expected = checksum(&frame[..body_len]);
    let actual = u32::from_le_bytes(frame[body_len..].try_into().unwrap());
    Ok(expected == actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_is_offset_basis() {
        assert_eq!(checksum(&[]), OFFSET_BASIS);
    }

    #[test]
    fn put_then_check_round_trips() {
        let mut frame = [0x11, 0x22, 0x33, 0, 0, 0, 0];
        put_at_end(&mut frame).unwrap();
        assert!(check_at_end(&frame).unwrap());
    }

    #[test]
    fn bit_flip_breaks_checksum() {
        let mut frame = [0x11, 0x22, 0x33, 0, 0, 0, 0];
        put_at_end(&mut frame).unwrap();
        frame[0] ^= 0x01;
        assert!(!check_at_end(&frame).unwrap());
    }

    #[test]
    fn too_short_is_rejected() {
        let mut frame = [0u8; 3];
        assert_eq!(put_at_end(&mut frame), Err(ChecksumError::TooShort));
        assert_eq!(check_at_end(&frame), Err(ChecksumError::TooShort));
    }
}
