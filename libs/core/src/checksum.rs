use lazy_static::lazy_static;

/// An algorithm for validating the integrity of a run of bytes.
///
/// # Examples
///
/// ```
/// use roadlink_core::{Additive16, Checksum, Crc8};
///
/// assert_eq!(0x0106, Additive16.compute(&[0xFF, 0x07]));
/// assert_eq!(0x00, Crc8.compute(&[]));
/// ```
pub trait Checksum {
    /// The type of checksum value produced.
    type Output;

    /// Computes the checksum of `bytes`.
    fn compute(&self, bytes: &[u8]) -> Self::Output;
}

/// Wrapping 16-bit sum of all bytes, used by G4 sensors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Additive16;

impl Checksum for Additive16 {
    type Output = u16;

    fn compute(&self, bytes: &[u8]) -> u16 {
        bytes.iter().fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
    }
}

/// Table-driven CRC-8 with polynomial 0x1C and zero initial value, used by SS125 sensors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Crc8;

const CRC8_POLYNOMIAL: u8 = 0x1C;

lazy_static! {
    static ref CRC8_TABLE: [u8; 256] = {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u8;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ CRC8_POLYNOMIAL
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        table
    };
}

impl Checksum for Crc8 {
    type Output = u8;

    fn compute(&self, bytes: &[u8]) -> u8 {
        bytes.iter().fold(0u8, |crc, &b| CRC8_TABLE[usize::from(crc ^ b)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Bitwise reference to check the table against.
    fn crc8_slow(bytes: &[u8]) -> u8 {
        let mut crc = 0u8;
        for &b in bytes {
            crc ^= b;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ CRC8_POLYNOMIAL
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn additive_wraps() {
        assert_eq!(0, Additive16.compute(&[]));
        assert_eq!(0xFF + 0xAA + 0x53, Additive16.compute(&[0xFF, 0xAA, 0x53]));
        let ones = vec![0xFF; 258];
        assert_eq!((258u32 * 0xFF % 65536) as u16, Additive16.compute(&ones));
    }

    #[test]
    fn crc8_table_matches_bitwise() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(crc8_slow(&data), Crc8.compute(&data));
        assert_eq!(crc8_slow(b"Z1"), Crc8.compute(b"Z1"));
        assert_eq!(CRC8_POLYNOMIAL, Crc8.compute(&[0x01]));
    }

    #[test]
    fn crc8_detects_every_single_bit_flip() {
        let frame = b"Z1\x00\x00\x01\x00\x00\x00\x05\x03";
        let good = Crc8.compute(frame);
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupt = frame.to_vec();
                corrupt[byte] ^= 1 << bit;
                assert_ne!(good, Crc8.compute(&corrupt), "flip of byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn additive_detects_every_single_bit_flip() {
        let frame = [0x00, 0x03, 0x05, 0x10, 0x00, 0x40];
        let good = Additive16.compute(&frame);
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupt = frame;
                corrupt[byte] ^= 1 << bit;
                assert_ne!(good, Additive16.compute(&corrupt));
            }
        }
    }
}
