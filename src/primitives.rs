// nrbf-graph - A .NET Remoting Binary Format (NRBF) object-graph codec.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Variable-width encoding primitives (C1) and the primitive value
//! taxonomy (C2).

use crate::error::{Error, Result};
use crate::records::PrimitiveType;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Decodes a 7-bit-continuation variable-width unsigned integer.
///
/// Returns `(bytes_consumed, value)`. Valid encodings are 1-5 bytes and
/// cover `0..=2^31-1`; the fifth byte's top 5 bits must be zero.
pub fn decode_multi_byte_int(bytes: &[u8]) -> Result<(usize, u32)> {
    let mut value: u32 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if i == 4 && (b & 0xF8) != 0 {
            return Err(Error::MalformedVarInt);
        }
        value |= ((b & 0x7F) as u32) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((i + 1, value));
        }
        if i == 4 {
            return Err(Error::MalformedVarInt);
        }
    }
    Err(Error::MalformedVarInt)
}

/// Reads a variable-width length prefix directly from a stream.
pub fn read_multi_byte_int<R: Read>(reader: &mut R) -> Result<u32> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    for i in 0..5 {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let b = byte[0];
        if i == 4 && (b & 0xF8) != 0 {
            return Err(Error::MalformedVarInt);
        }
        value |= ((b & 0x7F) as u32) << shift;
        if b & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(Error::MalformedVarInt)
}

/// Produces the minimal variable-width encoding of `value`.
pub fn encode_multi_byte_int(mut value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    loop {
        let mut b = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            b |= 0x80;
            out.push(b);
        } else {
            out.push(b);
            break;
        }
    }
    out
}

pub fn write_multi_byte_int<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&encode_multi_byte_int(value))?;
    Ok(())
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_length_prefixed_string<R: Read>(reader: &mut R) -> Result<String> {
    let length = read_multi_byte_int(reader)? as usize;
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

pub fn write_length_prefixed_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    write_multi_byte_int(writer, bytes.len() as u32)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Reads one UTF-8 codepoint, 1-4 bytes wide depending on the lead byte.
pub fn read_utf8_char<R: Read>(reader: &mut R) -> Result<char> {
    let mut lead = [0u8; 1];
    reader.read_exact(&mut lead)?;
    let extra = if lead[0] < 0x80 {
        0
    } else if lead[0] >= 0xF0 {
        3
    } else if lead[0] >= 0xE0 {
        2
    } else if lead[0] >= 0xC0 {
        1
    } else {
        return Err(Error::TruncatedRecord(
            "lead byte is a UTF-8 continuation byte".into(),
        ));
    };
    let mut bytes = vec![lead[0]];
    if extra > 0 {
        let mut rest = vec![0u8; extra];
        reader.read_exact(&mut rest)?;
        bytes.extend_from_slice(&rest);
    }
    let s = String::from_utf8(bytes)?;
    let mut chars = s.chars();
    let c = chars
        .next()
        .ok_or_else(|| Error::TruncatedRecord("empty char".into()))?;
    if chars.next().is_some() {
        return Err(Error::TruncatedRecord(
            "char record decoded more than one codepoint".into(),
        ));
    }
    Ok(c)
}

pub fn write_utf8_char<W: Write>(writer: &mut W, c: char) -> Result<()> {
    let mut buf = [0u8; 4];
    let s = c.encode_utf8(&mut buf);
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// `DateTime.Kind`: whether the ticks are unspecified, UTC, or local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateTimeKind {
    Unspecified = 0,
    Utc = 1,
    Local = 2,
}

impl DateTimeKind {
    fn from_bits(bits: u64) -> Self {
        match bits {
            1 => DateTimeKind::Utc,
            2 => DateTimeKind::Local,
            _ => DateTimeKind::Unspecified,
        }
    }
}

/// A .NET `DateTime`: 62 bits of ticks plus a 2-bit `Kind` tag, packed into
/// a little-endian `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTime {
    pub ticks: i64,
    pub kind: DateTimeKind,
}

const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

impl DateTime {
    pub fn from_wire(raw: i64) -> Self {
        let bits = raw as u64;
        let kind = DateTimeKind::from_bits((bits & !TICKS_MASK) >> 62);
        let ticks = Self::adjust_ticks((bits & TICKS_MASK) as i64);
        DateTime { ticks, kind }
    }

    /// Wraps a raw tick count into the 62-bit two's-complement range, as
    /// the source clamps out-of-range inputs rather than rejecting them.
    fn adjust_ticks(ticks: i64) -> i64 {
        const LOWER: i64 = -0x2000_0000_0000_0000;
        const UPPER: i64 = 0x1FFF_FFFF_FFFF_FFFF;
        if ticks < LOWER {
            !((!ticks) & UPPER)
        } else if ticks > UPPER {
            ticks & UPPER
        } else {
            ticks
        }
    }

    pub fn new(ticks: i64, kind: DateTimeKind) -> Self {
        DateTime {
            ticks: Self::adjust_ticks(ticks),
            kind,
        }
    }

    pub fn to_wire(self) -> i64 {
        let kind_bits = (self.kind as u64) << 62;
        let ticks_bits = (self.ticks as u64) & TICKS_MASK;
        (kind_bits | ticks_bits) as i64
    }
}

/// A .NET `Decimal`: a textual, sign-and-digits representation constrained
/// to the closed interval `±79228162514264337593543950334`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decimal(String);

const DECIMAL_MAX: &str = "79228162514264337593543950334";
const DECIMAL_MIN: &str = "-79228162514264337593543950334";

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates the canonical grammar: optional leading `-`, a run of
    /// digits, optionally `.` followed by another run of digits.
    fn verify(value: &str) -> bool {
        let bytes = value.as_bytes();
        let len = bytes.len();
        if len == 0 {
            return false;
        }
        let mut idx = 0;
        let mut digits = 0usize;
        if bytes[0] == b'-' {
            idx += 1;
            if len == 1 {
                return false;
            }
        }
        while idx < len && bytes[idx].is_ascii_digit() {
            idx += 1;
            digits += 1;
        }
        if idx >= len {
            return digits > 0;
        }
        if bytes[idx] != b'.' {
            return false;
        }
        if digits == 0 || idx == len - 1 {
            return false;
        }
        idx += 1;
        while idx < len && bytes[idx].is_ascii_digit() {
            idx += 1;
            digits += 1;
        }
        idx >= len && digits > 0
    }

    /// Saturates a numeric magnitude comparison against the Decimal bound
    /// using plain string comparisons on the digit run (the string is
    /// already verified to hold only `[-][0-9]+[.][0-9]+`).
    fn exceeds_bound(value: &str) -> Option<&'static str> {
        let negative = value.starts_with('-');
        let magnitude = value.strip_prefix('-').unwrap_or(value);
        let bound_magnitude = DECIMAL_MAX;
        let integer_part = magnitude.split('.').next().unwrap_or(magnitude);
        let exceeds = integer_part.len() > bound_magnitude.len()
            || (integer_part.len() == bound_magnitude.len() && integer_part > bound_magnitude);
        if exceeds {
            Some(if negative { DECIMAL_MIN } else { DECIMAL_MAX })
        } else {
            None
        }
    }

    /// Rounds half-up at the 29th significant digit, matching the source's
    /// banker-free policy: truncate digits past the first 29, propagating
    /// a carry when the 30th digit is `>= 5`.
    fn round(value: &str) -> String {
        let negative = value.starts_with('-');
        let first_digit = if negative { 1 } else { 0 };
        let mut chars: Vec<char> = value.chars().collect();
        let decimal_idx = chars.iter().position(|&c| c == '.');

        let mut digits = 0usize;
        let mut last_idx = None;
        for (i, &c) in chars.iter().enumerate() {
            if c.is_ascii_digit() {
                digits += 1;
            }
            if digits == 29 {
                last_idx = Some(i);
                break;
            }
        }
        let last_idx = match last_idx {
            Some(i) if i + 1 < chars.len() => i,
            _ => return value.to_string(),
        };

        let decimal_idx = match decimal_idx {
            Some(i) => i,
            None => {
                return if negative {
                    DECIMAL_MIN.to_string()
                } else {
                    DECIMAL_MAX.to_string()
                };
            }
        };

        let next_digit = chars[last_idx + 1].to_digit(10).unwrap_or(0);
        if next_digit < 5 {
            chars.truncate(last_idx + 1);
            return chars.into_iter().collect();
        }

        let mut idx = last_idx as isize;
        let mut round_past_decimal = false;
        loop {
            if idx < first_digit as isize {
                break;
            }
            let i = idx as usize;
            if i == decimal_idx {
                idx -= 1;
                continue;
            }
            let d = chars[i].to_digit(10).unwrap() + 1;
            if d >= 10 {
                chars[i] = '0';
                if i as isize - 1 == decimal_idx as isize {
                    idx = decimal_idx as isize - 1;
                    round_past_decimal = true;
                } else {
                    idx -= 1;
                }
            } else {
                chars[i] = std::char::from_digit(d, 10).unwrap();
                chars.truncate(last_idx + 2.min(chars.len() - i));
                return chars.into_iter().collect();
            }
        }
        chars.insert(first_digit, '1');
        if round_past_decimal {
            chars.into_iter().take(decimal_idx + 1).collect()
        } else {
            chars.into_iter().take(last_idx + 2).collect()
        }
    }

    pub fn from_str_value(value: &str) -> Result<Self> {
        if !Self::verify(value) {
            return Err(Error::InvalidPrimitive {
                kind: "Decimal",
                detail: format!("malformed decimal literal {value:?}"),
            });
        }
        let rounded = Self::round(value);
        let text = match Self::exceeds_bound(&rounded) {
            Some(bound) => bound.to_string(),
            None => rounded,
        };
        Ok(Decimal(text))
    }

    pub fn from_i128(value: i128) -> Self {
        let text = value.to_string();
        match Self::exceeds_bound(&text) {
            Some(bound) => Decimal(bound.to_string()),
            None => Decimal(text),
        }
    }
}

/// The seventeen primitive value kinds, each with its own byte width and
/// range/overflow policy (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    Char(char),
    Decimal(Decimal),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    TimeSpan(i64),
    DateTime(DateTime),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Null,
    String(String),
}

impl PrimitiveValue {
    pub fn kind(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveType::Byte,
            PrimitiveValue::Char(_) => PrimitiveType::Char,
            PrimitiveValue::Decimal(_) => PrimitiveType::Decimal,
            PrimitiveValue::Double(_) => PrimitiveType::Double,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::SByte(_) => PrimitiveType::SByte,
            PrimitiveValue::Single(_) => PrimitiveType::Single,
            PrimitiveValue::TimeSpan(_) => PrimitiveType::TimeSpan,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveValue::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveValue::UInt64(_) => PrimitiveType::UInt64,
            PrimitiveValue::Null => PrimitiveType::Null,
            PrimitiveValue::String(_) => PrimitiveType::String,
        }
    }
}

pub fn read_primitive<R: Read>(reader: &mut R, kind: PrimitiveType) -> Result<PrimitiveValue> {
    Ok(match kind {
        PrimitiveType::Boolean => {
            let mut b = [0u8; 1];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Boolean(b[0] != 0)
        }
        PrimitiveType::Byte => {
            let mut b = [0u8; 1];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Byte(b[0])
        }
        PrimitiveType::SByte => {
            let mut b = [0u8; 1];
            reader.read_exact(&mut b)?;
            PrimitiveValue::SByte(b[0] as i8)
        }
        PrimitiveType::Char => PrimitiveValue::Char(read_utf8_char(reader)?),
        PrimitiveType::Int16 => {
            let mut b = [0u8; 2];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Int16(i16::from_le_bytes(b))
        }
        PrimitiveType::UInt16 => {
            let mut b = [0u8; 2];
            reader.read_exact(&mut b)?;
            PrimitiveValue::UInt16(u16::from_le_bytes(b))
        }
        PrimitiveType::Int32 => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Int32(i32::from_le_bytes(b))
        }
        PrimitiveType::UInt32 => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            PrimitiveValue::UInt32(u32::from_le_bytes(b))
        }
        PrimitiveType::Int64 => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Int64(i64::from_le_bytes(b))
        }
        PrimitiveType::UInt64 => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            PrimitiveValue::UInt64(u64::from_le_bytes(b))
        }
        PrimitiveType::Single => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Single(f32::from_le_bytes(b))
        }
        PrimitiveType::Double => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            PrimitiveValue::Double(f64::from_le_bytes(b))
        }
        PrimitiveType::TimeSpan => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            PrimitiveValue::TimeSpan(i64::from_le_bytes(b))
        }
        PrimitiveType::DateTime => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            PrimitiveValue::DateTime(DateTime::from_wire(i64::from_le_bytes(b)))
        }
        PrimitiveType::Decimal => {
            let text = read_length_prefixed_string(reader)?;
            PrimitiveValue::Decimal(Decimal::from_str_value(&text)?)
        }
        PrimitiveType::String => PrimitiveValue::String(read_length_prefixed_string(reader)?),
        PrimitiveType::Null => PrimitiveValue::Null,
    })
}

pub fn write_primitive<W: Write>(writer: &mut W, value: &PrimitiveValue) -> Result<()> {
    match value {
        PrimitiveValue::Boolean(b) => writer.write_all(&[if *b { 1 } else { 0 }])?,
        PrimitiveValue::Byte(b) => writer.write_all(&[*b])?,
        PrimitiveValue::SByte(b) => writer.write_all(&[*b as u8])?,
        PrimitiveValue::Char(c) => write_utf8_char(writer, *c)?,
        PrimitiveValue::Int16(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::UInt16(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::Int32(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::UInt32(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::Int64(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::UInt64(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::Single(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::Double(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::TimeSpan(v) => writer.write_all(&v.to_le_bytes())?,
        PrimitiveValue::DateTime(dt) => writer.write_all(&dt.to_wire().to_le_bytes())?,
        PrimitiveValue::Decimal(d) => write_length_prefixed_string(writer, d.as_str())?,
        PrimitiveValue::String(s) => write_length_prefixed_string(writer, s)?,
        PrimitiveValue::Null => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip_minimal_length() {
        for n in [0u32, 1, 127, 128, 16384, 2_097_151, 536_778_039] {
            let encoded = encode_multi_byte_int(n);
            let (consumed, decoded) = decode_multi_byte_int(&encoded).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn varint_known_five_byte_encoding() {
        let bytes = [0xB7, 0xAA, 0xFA, 0xFF, 0x01];
        let (consumed, value) = decode_multi_byte_int(&bytes).unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(value, 536_778_039);
    }

    #[test]
    fn varint_overlong_is_malformed() {
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(decode_multi_byte_int(&bytes).is_err());
    }

    #[test]
    fn utf8_char_three_byte_sequence() {
        let mut buf = Vec::new();
        write_utf8_char(&mut buf, '\u{FF5F}').unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[0], 0xEF);
        let mut cursor = &buf[..];
        let c = read_utf8_char(&mut cursor).unwrap();
        assert_eq!(c, '\u{FF5F}');
    }

    #[test]
    fn utf8_char_truncated_lead_fails() {
        let bytes = [0xF0u8];
        let mut cursor = &bytes[..];
        assert!(read_utf8_char(&mut cursor).is_err());
    }

    #[test]
    fn datetime_round_trips_through_wire_encoding() {
        let dt = DateTime::new(123_456_789, DateTimeKind::Utc);
        let wire = dt.to_wire();
        let back = DateTime::from_wire(wire);
        assert_eq!(dt, back);
    }

    #[test]
    fn decimal_saturates_at_positive_bound() {
        let d = Decimal::from_i128(999_999_999_999_999_999_999_999_999_999_999i128);
        assert_eq!(d.as_str(), DECIMAL_MAX);
    }

    #[test]
    fn decimal_saturates_at_negative_bound() {
        let d = Decimal::from_str_value("-999999999999999999999999999999999").unwrap();
        assert_eq!(d.as_str(), DECIMAL_MIN);
    }

    #[test]
    fn decimal_rejects_malformed_literal() {
        assert!(Decimal::from_str_value("12.34.56").is_err());
        assert!(Decimal::from_str_value("-").is_err());
        assert!(Decimal::from_str_value("").is_err());
    }

    #[test]
    fn decimal_accepts_plain_integer_and_fraction() {
        assert_eq!(Decimal::from_str_value("42").unwrap().as_str(), "42");
        assert_eq!(Decimal::from_str_value("-3.5").unwrap().as_str(), "-3.5");
    }

    #[test]
    fn string_length_prefix_round_trips() {
        let mut buf = Vec::new();
        write_length_prefixed_string(&mut buf, "Hello World").unwrap();
        let mut cursor = &buf[..];
        assert_eq!(
            read_length_prefixed_string(&mut cursor).unwrap(),
            "Hello World"
        );
    }
}
