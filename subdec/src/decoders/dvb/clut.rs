//! Colour look-up tables for 2-, 4- and 8-bit regions.

use anyhow::Result;
use log::{debug, trace};

use crate::utils::bitstream_io::ByteCursor;
use crate::utils::yuv::{rgba, ycbcr_to_rgb};

const DEPTH_2_FLAG: u8 = 0x80;
const DEPTH_4_FLAG: u8 = 0x40;
const DEPTH_8_FLAG: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clut {
    pub id: u8,
    pub version: u8,
    pub clut4: [u32; 4],
    pub clut16: [u32; 16],
    pub clut256: [u32; 256],
}

impl Clut {
    /// The table used when a region references a CLUT that was never sent.
    pub fn default_table() -> Self {
        let mut clut16 = [0u32; 16];
        for (i, entry) in clut16.iter_mut().enumerate().skip(1) {
            let level = if i < 8 { 255 } else { 127 };
            *entry = rgba(
                if i & 1 != 0 { level } else { 0 },
                if i & 2 != 0 { level } else { 0 },
                if i & 4 != 0 { level } else { 0 },
                255,
            );
        }

        let mut clut256 = [0u32; 256];
        for (i, entry) in clut256.iter_mut().enumerate().skip(1) {
            let bit = |mask: usize, value: u8| if i & mask != 0 { value } else { 0 };
            *entry = if i < 8 {
                rgba(bit(1, 255), bit(2, 255), bit(4, 255), 63)
            } else {
                match i & 0x88 {
                    0x00 => rgba(
                        bit(1, 85) + bit(0x10, 170),
                        bit(2, 85) + bit(0x20, 170),
                        bit(4, 85) + bit(0x40, 170),
                        255,
                    ),
                    0x08 => rgba(
                        bit(1, 85) + bit(0x10, 170),
                        bit(2, 85) + bit(0x20, 170),
                        bit(4, 85) + bit(0x40, 170),
                        127,
                    ),
                    0x80 => rgba(
                        127 + bit(1, 43) + bit(0x10, 85),
                        127 + bit(2, 43) + bit(0x20, 85),
                        127 + bit(4, 43) + bit(0x40, 85),
                        255,
                    ),
                    _ => rgba(
                        bit(1, 43) + bit(0x10, 85),
                        bit(2, 43) + bit(0x20, 85),
                        bit(4, 43) + bit(0x40, 85),
                        255,
                    ),
                }
            };
        }

        Self {
            id: 0,
            version: 0,
            clut4: [
                rgba(0, 0, 0, 0),
                rgba(255, 255, 255, 255),
                rgba(0, 0, 0, 255),
                rgba(127, 127, 127, 255),
            ],
            clut16,
            clut256,
        }
    }

    /// Table matching a region depth; unknown depths use the 16-entry table.
    pub fn table(&self, depth: u8) -> &[u32] {
        match depth {
            2 => &self.clut4,
            8 => &self.clut256,
            _ => &self.clut16,
        }
    }

    /// Applies the entries of a CLUT definition segment body (after the id
    /// and version bytes).
    pub fn apply_entries(&mut self, cursor: &mut ByteCursor) -> Result<()> {
        while cursor.remaining() > 4 {
            let entry_id = cursor.u8()? as usize;
            let flags = cursor.u8()?;
            let depth = flags & 0xE0;
            if depth == 0 {
                debug!("CLUT {} entry {entry_id}: no target depth", self.id);
                return Ok(());
            }

            let (y, mut cr, mut cb, mut t) = if flags & 1 != 0 {
                (cursor.u8()?, cursor.u8()?, cursor.u8()?, cursor.u8()?)
            } else {
                let b = cursor.take(2)?;
                (
                    b[0] & 0xFC,
                    (((b[0] & 3) << 2) | ((b[1] >> 6) & 3)) << 4,
                    (b[1] << 2) & 0xF0,
                    (b[1] << 6) & 0xC0,
                )
            };

            // Y = 0 marks a fully transparent entry.
            if y == 0 {
                cr = 0;
                cb = 0;
                t = 0xFF;
            }

            let (r, g, b) = ycbcr_to_rgb(y, cb, cr);
            let colour = rgba(r, g, b, 255 - t);
            trace!("CLUT {} entry {entry_id} = {colour:#010X}", self.id);

            if depth & DEPTH_2_FLAG != 0 && entry_id < self.clut4.len() {
                self.clut4[entry_id] = colour;
            }
            if depth & DEPTH_4_FLAG != 0 && entry_id < self.clut16.len() {
                self.clut16[entry_id] = colour;
            }
            if depth & DEPTH_8_FLAG != 0 {
                self.clut256[entry_id] = colour;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_palette() {
        let clut = Clut::default_table();
        assert_eq!(clut.clut4[1], 0xFFFF_FFFF);
        assert_eq!(clut.clut16[9], rgba(127, 0, 0, 255));
        assert_eq!(clut.clut256[3], rgba(255, 255, 0, 63));
        assert_eq!(clut.table(8).len(), 256);
    }

    #[test]
    fn full_range_entry_to_every_depth() -> anyhow::Result<()> {
        let mut clut = Clut::default_table();
        // entry 3, all depths, full range white at half transparency
        let body = [0x03, 0xE1, 0xEB, 0x80, 0x80, 0x80];
        clut.apply_entries(&mut ByteCursor::new(&body))?;

        let expected = rgba(255, 255, 255, 0x7F);
        assert_eq!(clut.clut4[3], expected);
        assert_eq!(clut.clut16[3], expected);
        assert_eq!(clut.clut256[3], expected);
        Ok(())
    }

    #[test]
    fn zero_luma_is_transparent() -> anyhow::Result<()> {
        let mut clut = Clut::default_table();
        let body = [0x20, 0x21, 0x00, 0x55, 0x55, 0x00];
        clut.apply_entries(&mut ByteCursor::new(&body))?;

        assert_eq!(clut.clut256[0x20] >> 24, 0);
        Ok(())
    }
}
