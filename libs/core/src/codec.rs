//! Packing and unpacking of fixed-width fields in binary message bodies.
//!
//! All multi-byte integers are big-endian. Every function checks that the field fits
//! in the provided buffer and reports a [`CodecError`] rather than panicking.
//!
//! # Examples
//!
//! ```
//! use roadlink_core::codec;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! let mut body = [0u8; 5];
//! codec::format16(&mut body, 0, 0x1234)?;
//! codec::format24_fixed(&mut body, 2, Some(-3.25))?;
//! assert_eq!(0x1234, codec::parse16(&body, 0)?);
//! assert_eq!(Some(-3.25), codec::parse24_fixed(&body, 2)?);
//! #
//! # Ok(()) }
//! ```
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Errors related to encoding or decoding message fields.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CodecError {
    /// The field extends past the end of the buffer.
    #[error("Field of {} bytes at offset {} doesn't fit in a buffer of {} bytes", width, pos, len)]
    OutOfBounds {
        /// Offset of the field.
        pos: usize,

        /// Width of the field.
        width: usize,

        /// Length of the buffer.
        len: usize,
    },

    /// A boolean field held something other than 0 or 1.
    #[error("Invalid boolean value 0x{:02X}", value)]
    InvalidBoolean {
        /// The value found.
        value: u8,
    },

    /// A BCD field held a non-decimal nibble, or a value was too large to encode.
    #[error("Invalid BCD value 0x{:02X}", value)]
    InvalidBcd {
        /// The value found.
        value: u8,
    },

    /// A string field contained non-ASCII bytes.
    #[error("Non-ASCII string data {:?}", bytes)]
    NonAscii {
        /// The raw field contents.
        bytes: Vec<u8>,
    },

    /// A packed date/time didn't describe a real instant.
    #[error("Invalid date/time: date 0x{:08X}, time 0x{:08X}", date, time)]
    InvalidDateTime {
        /// Packed date word.
        date: u32,

        /// Packed time word.
        time: u32,
    },

    /// A fixed-point value was outside the representable range.
    #[error("Value {} out of range for a {}-bit fixed-point field", value, bits)]
    OutOfRange {
        /// The value to encode.
        value: f32,

        /// Width of the field in bits.
        bits: u8,
    },
}

fn field<'a>(buf: &'a [u8], pos: usize, width: usize) -> Result<&'a [u8], CodecError> {
    buf.get(pos..pos + width).ok_or(CodecError::OutOfBounds {
        pos,
        width,
        len: buf.len(),
    })
}

fn field_mut<'a>(buf: &'a mut [u8], pos: usize, width: usize) -> Result<&'a mut [u8], CodecError> {
    let len = buf.len();
    buf.get_mut(pos..pos + width)
        .ok_or(CodecError::OutOfBounds { pos, width, len })
}

/// Writes an 8-bit value.
pub fn format8(buf: &mut [u8], pos: usize, value: u8) -> Result<(), CodecError> {
    field_mut(buf, pos, 1)?[0] = value;
    Ok(())
}

/// Writes a 16-bit value.
pub fn format16(buf: &mut [u8], pos: usize, value: u16) -> Result<(), CodecError> {
    field_mut(buf, pos, 2)?.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Writes the low 24 bits of `value`.
pub fn format24(buf: &mut [u8], pos: usize, value: u32) -> Result<(), CodecError> {
    field_mut(buf, pos, 3)?.copy_from_slice(&value.to_be_bytes()[1..]);
    Ok(())
}

/// Writes a 32-bit value.
pub fn format32(buf: &mut [u8], pos: usize, value: u32) -> Result<(), CodecError> {
    field_mut(buf, pos, 4)?.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Reads an 8-bit value.
pub fn parse8(buf: &[u8], pos: usize) -> Result<u8, CodecError> {
    Ok(field(buf, pos, 1)?[0])
}

/// Reads a 16-bit value.
pub fn parse16(buf: &[u8], pos: usize) -> Result<u16, CodecError> {
    let f = field(buf, pos, 2)?;
    Ok(u16::from_be_bytes([f[0], f[1]]))
}

/// Reads a 24-bit value.
pub fn parse24(buf: &[u8], pos: usize) -> Result<u32, CodecError> {
    let f = field(buf, pos, 3)?;
    Ok(u32::from_be_bytes([0, f[0], f[1], f[2]]))
}

/// Reads a 32-bit value.
pub fn parse32(buf: &[u8], pos: usize) -> Result<u32, CodecError> {
    let f = field(buf, pos, 4)?;
    Ok(u32::from_be_bytes([f[0], f[1], f[2], f[3]]))
}

/// Writes a 16-bit fixed-point value: one integer byte followed by 1/256ths.
///
/// # Errors
///
/// Returns [`CodecError::OutOfRange`] unless `0 <= value < 256`.
pub fn format16_fixed(buf: &mut [u8], pos: usize, value: f32) -> Result<(), CodecError> {
    if !(0.0..256.0).contains(&value) {
        return Err(CodecError::OutOfRange { value, bits: 16 });
    }
    let intg = value.trunc();
    let frac = ((value - intg) * 256.0) as u8;
    let f = field_mut(buf, pos, 2)?;
    f[0] = intg as u8;
    f[1] = frac;
    Ok(())
}

/// Reads a 16-bit fixed-point value.
pub fn parse16_fixed(buf: &[u8], pos: usize) -> Result<f32, CodecError> {
    let f = field(buf, pos, 2)?;
    Ok(f32::from(f[0]) + f32::from(f[1]) / 256.0)
}

/// Writes a 24-bit fixed-point value with a "value present" flag.
///
/// The top bit of the first byte is set when a value is present. The remaining 15 bits
/// hold the two's complement integer part and the last byte holds the magnitude of the
/// fraction in 1/256ths. `None` is written as all zeros.
///
/// Negative values with a zero integer part can't be represented since the sign
/// lives in the integer part; they encode as their magnitude.
///
/// # Errors
///
/// Returns [`CodecError::OutOfRange`] if the integer part doesn't fit in 15 bits.
pub fn format24_fixed(buf: &mut [u8], pos: usize, value: Option<f32>) -> Result<(), CodecError> {
    let f = field_mut(buf, pos, 3)?;
    let value = match value {
        Some(value) => value,
        None => {
            f.copy_from_slice(&[0, 0, 0]);
            return Ok(());
        }
    };
    let intg = value.trunc();
    if !(-16384.0..16384.0).contains(&intg) {
        return Err(CodecError::OutOfRange { value, bits: 24 });
    }
    let bits = (intg as i16 as u16) & 0x7FFF;
    let frac = ((value - intg).abs() * 256.0) as u8;
    f[0] = 0x80 | (bits >> 8) as u8;
    f[1] = (bits & 0xFF) as u8;
    f[2] = frac;
    Ok(())
}

/// Reads a 24-bit fixed-point value, returning `None` if the "value present" flag is clear.
pub fn parse24_fixed(buf: &[u8], pos: usize) -> Result<Option<f32>, CodecError> {
    let f = field(buf, pos, 3)?;
    if f[0] & 0x80 == 0 {
        return Ok(None);
    }
    let raw = u16::from_be_bytes([f[0] & 0x7F, f[1]]);
    // Shift the 15-bit value up and back down to extend the sign.
    let intg = ((raw << 1) as i16) >> 1;
    let frac = f32::from(f[2]) / 256.0;
    let frac = if intg >= 0 { frac } else { -frac };
    Ok(Some(f32::from(intg) + frac))
}

/// Writes an ASCII string into a fixed-width field, truncating or space-padding to `max_len`.
///
/// # Errors
///
/// Returns [`CodecError::NonAscii`] if `value` isn't ASCII.
pub fn format_string(buf: &mut [u8], pos: usize, value: &str, max_len: usize) -> Result<(), CodecError> {
    if !value.is_ascii() {
        return Err(CodecError::NonAscii {
            bytes: value.as_bytes().to_vec(),
        });
    }
    let f = field_mut(buf, pos, max_len)?;
    let bytes = value.as_bytes();
    let len = bytes.len().min(max_len);
    f[..len].copy_from_slice(&bytes[..len]);
    for b in &mut f[len..] {
        *b = b' ';
    }
    Ok(())
}

/// Reads an ASCII string from a fixed-width field, trimming padding spaces and NULs.
pub fn parse_string(buf: &[u8], pos: usize, len: usize) -> Result<String, CodecError> {
    let f = field(buf, pos, len)?;
    if !f.is_ascii() {
        return Err(CodecError::NonAscii { bytes: f.to_vec() });
    }
    let s: String = f.iter().map(|&b| char::from(b)).collect();
    Ok(s.trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace()).to_owned())
}

/// Writes a boolean as 0 or 1.
pub fn format_bool(buf: &mut [u8], pos: usize, value: bool) -> Result<(), CodecError> {
    format8(buf, pos, u8::from(value))
}

/// Reads a boolean that must be exactly 0 or 1.
pub fn parse_bool(buf: &[u8], pos: usize) -> Result<bool, CodecError> {
    match parse8(buf, pos)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(CodecError::InvalidBoolean { value }),
    }
}

/// Converts a value from 0 to 99 into two-digit BCD.
pub fn to_bcd(value: u8) -> Result<u8, CodecError> {
    if value > 99 {
        return Err(CodecError::InvalidBcd { value });
    }
    Ok(((value / 10) << 4) | (value % 10))
}

/// Converts two-digit BCD into its value.
pub fn from_bcd(value: u8) -> Result<u8, CodecError> {
    let (hi, lo) = (value >> 4, value & 0x0F);
    if hi > 9 || lo > 9 {
        return Err(CodecError::InvalidBcd { value });
    }
    Ok(hi * 10 + lo)
}

/// Writes a packed date/time stamp as two 32-bit words (8 bytes).
///
/// The date word holds `year << 9 | month << 5 | day`; the time word holds
/// `hour << 22 | minute << 16 | second << 10 | millisecond`. Times are UTC.
pub fn format_date_time(buf: &mut [u8], pos: usize, stamp: DateTime<Utc>) -> Result<(), CodecError> {
    let date = ((stamp.year() as u32 & 0x0FFF) << 9) | (stamp.month() << 5) | stamp.day();
    // Leap seconds report a nanosecond count over one second; clamp them.
    let ms = (stamp.timestamp_subsec_millis()).min(999);
    let time = (stamp.hour() << 22) | (stamp.minute() << 16) | (stamp.second() << 10) | ms;
    format32(buf, pos, date)?;
    format32(buf, pos + 4, time)
}

/// Reads a packed date/time stamp written by [`format_date_time`].
pub fn parse_date_time(buf: &[u8], pos: usize) -> Result<DateTime<Utc>, CodecError> {
    let date = parse32(buf, pos)?;
    let time = parse32(buf, pos + 4)?;
    let year = ((date >> 9) & 0x0FFF) as i32;
    let month = (date >> 5) & 0x0F;
    let day = date & 0x1F;
    let hour = (time >> 22) & 0x1F;
    let minute = (time >> 16) & 0x3F;
    let second = (time >> 10) & 0x3F;
    let ms = time & 0x3FF;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, second, ms))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or(CodecError::InvalidDateTime { date, time })
}
