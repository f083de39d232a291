//! SPU display control sequences (`SP_DCSQ`).

use anyhow::{Result, bail, ensure};
use log::{debug, trace};

use crate::utils::bitstream_io::ByteCursor;
use crate::utils::errors::VobError;

pub const FSTA_DSP: u8 = 0x00;
pub const STA_DSP: u8 = 0x01;
pub const STP_DSP: u8 = 0x02;
pub const SET_COLOR: u8 = 0x03;
pub const SET_CONTR: u8 = 0x04;
pub const SET_DAREA: u8 = 0x05;
pub const SET_DSPXA: u8 = 0x06;
pub const CHG_COLCON: u8 = 0x07;
pub const CMD_END: u8 = 0xFF;

/// Largest display area kept; larger areas are clipped.
pub const MAX_SPU_WIDTH: usize = 720;
pub const MAX_SPU_HEIGHT: usize = 576;

/// Bound on chained control sequences in one packet.
const MAX_SEQUENCES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayArea {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Everything the control sequences of one SPU packet establish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpuControl {
    pub forced: bool,
    /// Dates in 1024/90000 s units relative to the packet PTS.
    pub start_date: Option<u16>,
    pub stop_date: Option<u16>,
    /// Four CLUT nibbles: emphasis 2, emphasis 1, pattern, background.
    pub colour: u16,
    /// Four alpha nibbles in the same order as `colour`.
    pub contrast: u16,
    pub area: Option<DisplayArea>,
    /// Byte offsets of the top and bottom pixel fields.
    pub field_offsets: Option<(usize, usize)>,
}

impl SpuControl {
    /// Display time in 90 kHz ticks, from the stop date.
    pub fn delay(&self) -> u64 {
        let start = self.start_date.unwrap_or(0);
        let stop = self.stop_date.unwrap_or(0);
        stop.saturating_sub(start) as u64 * 1024
    }
}

fn display_area(b: &[u8]) -> Result<DisplayArea> {
    let x1 = ((b[0] as usize) << 4) | (b[1] as usize >> 4);
    let x2 = ((b[1] as usize & 0x0F) << 8) | b[2] as usize;
    let y1 = ((b[3] as usize) << 4) | (b[4] as usize >> 4);
    let y2 = ((b[4] as usize & 0x0F) << 8) | b[5] as usize;

    if x2 < x1 || y2 < y1 {
        bail!(VobError::InvertedArea { x1, y1, x2, y2 });
    }

    let (width, height) = (x2 - x1 + 1, y2 - y1 + 1);
    if width > MAX_SPU_WIDTH || height > MAX_SPU_HEIGHT {
        debug!("Clipping display area {width}x{height} to {MAX_SPU_WIDTH}x{MAX_SPU_HEIGHT}");
    }

    Ok(DisplayArea {
        x: x1,
        y: y1,
        width: width.min(MAX_SPU_WIDTH),
        height: height.min(MAX_SPU_HEIGHT),
    })
}

fn parse_commands(cursor: &mut ByteCursor, date: u16, control: &mut SpuControl) -> Result<()> {
    loop {
        let opcode = cursor.u8()?;
        trace!("SPU command {opcode:#04X} at date {date}");
        match opcode {
            FSTA_DSP => {
                control.forced = true;
                control.start_date.get_or_insert(date);
            }
            STA_DSP => {
                control.start_date.get_or_insert(date);
            }
            STP_DSP => {
                control.stop_date.get_or_insert(date);
            }
            SET_COLOR => control.colour = cursor.be16()?,
            SET_CONTR => control.contrast = cursor.be16()?,
            SET_DAREA => control.area = Some(display_area(cursor.take(6)?)?),
            SET_DSPXA => {
                let top = cursor.be16()? as usize;
                let bottom = cursor.be16()? as usize;
                control.field_offsets = Some((top, bottom));
            }
            CHG_COLCON => {
                // size includes its own two bytes
                let size = cursor.be16()? as usize;
                cursor.skip(size.saturating_sub(2))?;
            }
            CMD_END => return Ok(()),
            other => bail!(VobError::UnknownOpcode(other)),
        }
    }
}

/// Runs every control sequence of `packet`, starting at `offset`.
///
/// Sequences are chained through their `next` field; a sequence pointing
/// at itself, or backwards, is the last one.
pub fn parse_control(packet: &[u8], offset: usize) -> Result<SpuControl> {
    ensure!(
        offset + 4 <= packet.len(),
        VobError::ControlOffset {
            offset,
            size: packet.len()
        }
    );

    let mut control = SpuControl::default();
    let mut offset = offset;

    for _ in 0..MAX_SEQUENCES {
        let mut cursor = ByteCursor::new(&packet[offset..]);
        let date = cursor.be16()?;
        let next = cursor.be16()? as usize;
        parse_commands(&mut cursor, date, &mut control)?;

        if next <= offset || next + 4 > packet.len() {
            break;
        }
        offset = next;
    }

    Ok(control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_coordinates() -> Result<()> {
        // x 0x29b..0x4e6, y 0x3c5..0x400
        let area = display_area(&[0x29, 0xb4, 0xe6, 0x3c, 0x54, 0x00])?;
        assert_eq!(area.x, 0x29b);
        assert_eq!(area.width, 0x4e6 - 0x29b + 1);
        assert_eq!(area.y, 0x3c5);
        assert_eq!(area.height, 0x400 - 0x3c5 + 1);
        assert!(display_area(&[0x00, 0x50, 0x01, 0x00, 0x00, 0x01]).is_err());
        Ok(())
    }

    #[test]
    fn chained_sequences() -> Result<()> {
        let mut packet = vec![0u8; 4];
        packet.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x18, // date 0, next 24
            STA_DSP,
            SET_COLOR, 0x03, 0x10,
            SET_CONTR, 0xFF, 0xF0,
            SET_DSPXA, 0x00, 0x04, 0x00, 0x06,
            CMD_END,
            0x00, 0x00, 0x00,
            0x00, 0x64, 0x00, 0x18, // date 100, next self
            STP_DSP,
            CMD_END,
        ]);

        let control = parse_control(&packet, 4)?;
        assert_eq!(control.start_date, Some(0));
        assert_eq!(control.stop_date, Some(100));
        assert_eq!(control.colour, 0x0310);
        assert_eq!(control.contrast, 0xFFF0);
        assert_eq!(control.field_offsets, Some((4, 6)));
        assert_eq!(control.delay(), 102_400);
        assert!(!control.forced);
        Ok(())
    }

    #[test]
    fn unknown_opcode() {
        let packet = [0, 0, 0, 0, 0x00, 0x00, 0x00, 0x04, 0x42, CMD_END];
        assert!(parse_control(&packet, 4).is_err());
    }
}
