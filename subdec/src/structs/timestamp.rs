//! 90 kHz presentation timestamps.
//!
//! Subtitle records, PES headers and PGS segments all carry MPEG system
//! clock values; this module holds the conversions between those and
//! wall-clock time.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::utils::errors::TimestampError;
use anyhow::{Result, bail, ensure};
use log::trace;

pub const PTS_HZ: u64 = 90_000;

/// A 90 kHz presentation timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub u64);

impl Pts {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 90)
    }

    pub const fn as_millis(self) -> u64 {
        self.0 / 90
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0 * 100 / 9)
    }

    pub fn saturating_add(self, ticks: u64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// Decodes the 5-byte PTS field of a PES header.
    pub fn from_pes_bytes(buffer: &[u8]) -> Result<Self> {
        ensure!(buffer.len() >= 5, "Insufficient data for parsing PES PTS");

        if buffer[0] & 1 != 1 || buffer[2] & 1 != 1 || buffer[4] & 1 != 1 {
            bail!(TimestampError::InvalidMarkerBits);
        }

        let pts = ((buffer[0] as u64 & 0x0E) << 29)
            | ((buffer[1] as u64) << 22)
            | ((buffer[2] as u64 & 0xFE) << 14)
            | ((buffer[3] as u64) << 7)
            | ((buffer[4] as u64 & 0xFE) >> 1);

        trace!("PES PTS: {pts} ({})", Pts(pts));

        Ok(Pts(pts))
    }
}

impl Display for Pts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ms = self.as_millis();
        let hours = ms / 3_600_000;
        write!(
            f,
            "{:0width$}:{:02}:{:02}.{:03}",
            hours,
            (ms / 60_000) % 60,
            (ms / 1000) % 60,
            ms % 1000,
            width = if hours >= 100 { 0 } else { 2 }
        )
    }
}

/// Decodes a packed BCD value (up to four digits).
pub fn bcd2dec(value: u16) -> Result<u16> {
    let a = value >> 12;
    let b = (value >> 8) & 0xF;
    let c = (value >> 4) & 0xF;
    let d = value & 0xF;

    if a > 9 || b > 9 || c > 9 || d > 9 {
        bail!(TimestampError::InvalidBcdDigit);
    }

    Ok(1000 * a + 100 * b + 10 * c + d)
}

/// Encodes a decimal value (0..=9999) as packed BCD.
pub fn dec2bcd(value: u16) -> u16 {
    let value = value % 10_000;
    ((value / 1000) << 12) | (((value / 100) % 10) << 8) | (((value / 10) % 10) << 4) | (value % 10)
}

/// Returns true when every nibble of `value` is a decimal digit.
pub fn is_bcd(value: u16) -> bool {
    (0..4).all(|i| (value >> (i * 4)) & 0xF <= 9)
}

#[test]
fn pes_pts_decode() -> Result<()> {
    // PTS = 0x1_2345_6789 split over the 5-byte PES layout
    let pts: u64 = 0x1_2345_6789;
    let bytes = [
        0x21 | (((pts >> 30) & 0x07) << 1) as u8,
        (pts >> 22) as u8,
        ((((pts >> 15) & 0x7F) << 1) | 1) as u8,
        (pts >> 7) as u8,
        (((pts & 0x7F) << 1) | 1) as u8,
    ];
    assert_eq!(Pts::from_pes_bytes(&bytes)?, Pts(pts));
    assert!(Pts::from_pes_bytes(&[0x20, 0, 0, 0, 0]).is_err());
    Ok(())
}

#[test]
fn bcd_conversions() -> Result<()> {
    assert_eq!(bcd2dec(0x0899)?, 899);
    assert_eq!(dec2bcd(899), 0x0899);
    assert!(bcd2dec(0x01A0).is_err());
    assert!(is_bcd(0x0100));
    assert!(!is_bcd(0x010F));
    assert_eq!(Pts::from_millis(3_723_004).to_string(), "01:02:03.004");
    Ok(())
}
