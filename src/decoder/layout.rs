//! # Field Table Decoder
//!
//! Extracts axis values from arbitrary bit fields of a report.
//!
//! Each [`AxisField`] names the byte where the field starts, the bit within
//! that byte, the field width and its byte order. Fields may share bytes,
//! which is how bit-packed layouts are expressed.
//!
//! ## Bit numbering
//!
//! - `Little`: bytes are assembled least-significant first and `bit_offset`
//!   counts from bit 0 (LSB) of the first byte, so a field continues into
//!   the low bits of the following bytes.
//! - `Big`: bytes are assembled most-significant first and `bit_offset`
//!   counts from bit 7 (MSB) of the first byte.
//!
//! ## Usage
//!
//! ```
//! use flight_hid::decoder::{FieldDecoder, ReportDecoder};
//! use flight_hid::hid::RawReport;
//!
//! let decoder = FieldDecoder::le16(1, 4);
//! let report = RawReport::from_slice(&[0x00, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08]);
//! assert_eq!(decoder.decode(&report).unwrap(), vec![2048.0; 4]);
//! ```

use serde::{Deserialize, Serialize};

use super::{RawAxisVector, ReportDecoder};
use crate::error::DecodeError;
use crate::hid::RawReport;

/// Widest supported field.
pub const MAX_FIELD_BITS: u8 = 32;

/// Width of one channel in the packed layout.
pub const PACKED_CHANNEL_BITS: u8 = 11;

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Location of one axis inside a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisField {
    /// Byte index where the field starts (report id byte included).
    pub byte_offset: usize,

    /// First bit of the field inside `byte_offset` (0..=7).
    #[serde(default)]
    pub bit_offset: u8,

    /// Field width in bits (1..=32).
    pub bit_width: u8,

    #[serde(default)]
    pub endianness: Endianness,

    /// Two's complement field.
    #[serde(default)]
    pub signed: bool,
}

impl AxisField {
    /// Byte-aligned 16-bit little-endian unsigned field.
    #[must_use]
    pub fn le16(byte_offset: usize) -> Self {
        Self {
            byte_offset,
            bit_offset: 0,
            bit_width: 16,
            endianness: Endianness::Little,
            signed: false,
        }
    }

    /// Number of bytes the field touches.
    #[must_use]
    pub fn span_bytes(&self) -> usize {
        (usize::from(self.bit_offset) + usize::from(self.bit_width)).div_ceil(8)
    }

    /// One past the last byte the field touches.
    #[must_use]
    pub fn end(&self) -> usize {
        self.byte_offset + self.span_bytes()
    }

    /// Extracts the field from `data`. The caller guarantees `data.len() >= self.end()`.
    fn extract(&self, data: &[u8]) -> f64 {
        let bytes = &data[self.byte_offset..self.end()];
        let width = u32::from(self.bit_width);
        let span_bits = (bytes.len() * 8) as u32;

        let (word, shift) = match self.endianness {
            Endianness::Little => {
                let word = bytes
                    .iter()
                    .rev()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                (word, u32::from(self.bit_offset))
            }
            Endianness::Big => {
                let word = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                (word, span_bits - u32::from(self.bit_offset) - width)
            }
        };

        let mask = (1u64 << width) - 1;
        let value = (word >> shift) & mask;

        if self.signed && value & (1u64 << (width - 1)) != 0 {
            (value as i64 - (1i64 << width)) as f64
        } else {
            value as f64
        }
    }

    /// Clamps offset and width into the supported range.
    fn sanitized(mut self) -> Self {
        self.bit_offset = self.bit_offset.min(7);
        self.bit_width = self.bit_width.clamp(1, MAX_FIELD_BITS);
        self
    }
}

/// Data-driven [`ReportDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecoder {
    fields: Vec<AxisField>,
    min_len: usize,
}

impl FieldDecoder {
    /// Builds a decoder from a field table, one field per output axis.
    ///
    /// Out-of-range bit offsets and widths are clamped
    /// (offset to 7, width to 1..=32).
    #[must_use]
    pub fn from_fields(fields: Vec<AxisField>) -> Self {
        let fields: Vec<AxisField> = fields.into_iter().map(AxisField::sanitized).collect();
        let min_len = fields.iter().map(AxisField::end).max().unwrap_or(0);
        Self { fields, min_len }
    }

    /// `axis_count` consecutive 16-bit little-endian fields starting at `first_byte`.
    ///
    /// # Examples
    ///
    /// ```
    /// use flight_hid::decoder::{FieldDecoder, ReportDecoder};
    ///
    /// let decoder = FieldDecoder::le16(1, 4);
    /// assert_eq!(decoder.min_report_len(), 9);
    /// ```
    #[must_use]
    pub fn le16(first_byte: usize, axis_count: usize) -> Self {
        Self::from_fields(
            (0..axis_count)
                .map(|i| AxisField::le16(first_byte + i * 2))
                .collect(),
        )
    }

    /// `axis_count` 11-bit channels packed LSB-first starting at `first_byte`.
    ///
    /// ```text
    /// Byte 0: Ch1[0:7]
    /// Byte 1: Ch1[8:10] | Ch2[0:4]
    /// Byte 2: Ch2[5:10] | Ch3[0:1]
    /// ...
    /// ```
    #[must_use]
    pub fn packed11(first_byte: usize, axis_count: usize) -> Self {
        let width = usize::from(PACKED_CHANNEL_BITS);
        Self::from_fields(
            (0..axis_count)
                .map(|i| {
                    let bit = i * width;
                    AxisField {
                        byte_offset: first_byte + bit / 8,
                        bit_offset: (bit % 8) as u8,
                        bit_width: PACKED_CHANNEL_BITS,
                        endianness: Endianness::Little,
                        signed: false,
                    }
                })
                .collect(),
        )
    }

    /// The field table.
    #[must_use]
    pub fn fields(&self) -> &[AxisField] {
        &self.fields
    }
}

impl ReportDecoder for FieldDecoder {
    fn decode(&self, report: &RawReport) -> Result<RawAxisVector, DecodeError> {
        let data = report.bytes();
        if data.len() < self.min_len {
            return Err(DecodeError::TooShort {
                needed: self.min_len,
                got: data.len(),
            });
        }

        Ok(self.fields.iter().map(|field| field.extract(data)).collect())
    }

    fn min_report_len(&self) -> usize {
        self.min_len
    }

    fn axis_count(&self) -> usize {
        self.fields.len()
    }
}
