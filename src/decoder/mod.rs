//! # Report Decoder Module
//!
//! Turns one [`RawReport`] into a [`RawAxisVector`].
//!
//! The byte layout of the transmitter's input report is data, not code: a
//! [`FieldDecoder`] is built from a table of [`AxisField`]s, so retargeting
//! to a different transmitter only needs a new table in the configuration.
//!
//! Two built-in tables cover the layouts seen in the field:
//!
//! | Layout | Fields |
//! |--------|--------|
//! | `le16` | consecutive 16-bit little-endian words, byte aligned |
//! | `packed11` | 11-bit channels packed LSB-first as one continuous bitstream |

pub mod layout;

use crate::error::DecodeError;
use crate::hid::RawReport;

pub use layout::{AxisField, Endianness, FieldDecoder};

/// Raw axis values of one report, in physical axis order.
pub type RawAxisVector = Vec<f64>;

/// Decoding contract between the reader loop and a report layout.
pub trait ReportDecoder: Send + Sync {
    /// Decodes one report.
    ///
    /// # Errors
    ///
    /// Returns `TooShort` when the report carries fewer bytes than
    /// [`ReportDecoder::min_report_len`].
    fn decode(&self, report: &RawReport) -> Result<RawAxisVector, DecodeError>;

    /// Minimum number of bytes a report needs to be decodable.
    fn min_report_len(&self) -> usize;

    /// Number of values produced per report.
    fn axis_count(&self) -> usize;
}
