//! DVD sub-picture run-length coding.
//!
//! A code is 4, 8, 12 or 16 bits wide and holds a run length followed by a
//! 2-bit colour index. The width is found from the leading zero nibbles: a
//! run of zero fills the rest of the line, and every line starts on a byte
//! boundary.

use std::io;

use crate::utils::bitstream_io::BsIoSliceReader;

/// Reads one code, returning `(run, index)`.
fn read_code(reader: &mut BsIoSliceReader) -> io::Result<(usize, u8)> {
    let mut value: u16 = reader.get_n(4)?;
    let mut threshold = 0x4;
    while value < threshold && threshold <= 0x40 {
        value = (value << 4) | reader.get_n::<u16>(4)?;
        threshold <<= 2;
    }
    Ok(((value >> 2) as usize, (value & 3) as u8))
}

/// Decodes `rows` lines of one interlaced field.
pub fn decode_field(data: &[u8], width: usize, rows: usize) -> io::Result<Vec<u8>> {
    if width == 0 || rows == 0 {
        return Ok(Vec::new());
    }

    let mut out = vec![0u8; width * rows];
    let mut reader = BsIoSliceReader::from_slice(data);

    for line in out.chunks_exact_mut(width) {
        let mut x = 0;
        while x < width {
            let (run, index) = read_code(&mut reader)?;
            let end = if run == 0 { width } else { (x + run).min(width) };
            line[x..end].fill(index);
            x = end;
        }
        reader.byte_align();
    }
    Ok(out)
}

/// Merges the top (even rows) and bottom (odd rows) fields into one frame.
pub fn interleave(top: &[u8], bottom: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut frame = vec![0u8; width * height];
    if width == 0 {
        return frame;
    }

    for (row, line) in frame.chunks_exact_mut(width).enumerate() {
        let field = if row % 2 == 0 { top } else { bottom };
        let field_row = row / 2;
        if let Some(src) = field.get(field_row * width..(field_row + 1) * width) {
            line.copy_from_slice(src);
        }
    }
    frame
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Packs a field the way a DVD authoring tool would.
    pub(crate) fn encode_field(indices: &[u8], width: usize) -> Vec<u8> {
        let mut nibbles: Vec<u8> = Vec::new();

        for line in indices.chunks(width) {
            let mut x = 0;
            while x < line.len() {
                let index = line[x];
                let run = line[x..].iter().take_while(|&&i| i == index).count();
                let run = if x + run == line.len() && run > 255 {
                    0
                } else {
                    run.min(255)
                };

                let value = (run << 2) | index as usize;
                let width_nibbles = match run {
                    1..=3 => 1,
                    4..=15 => 2,
                    16..=63 => 3,
                    _ => 4,
                };
                for shift in (0..width_nibbles).rev() {
                    nibbles.push(((value >> (shift * 4)) & 0xF) as u8);
                }
                x = if run == 0 { line.len() } else { x + run };
            }
            if nibbles.len() % 2 != 0 {
                nibbles.push(0);
            }
        }

        nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect()
    }

    #[test]
    fn code_widths() -> anyhow::Result<()> {
        // 4-bit: run 2 of colour 1; 8-bit: run 5 of colour 2
        let data = [0x91, 0x60];
        let mut reader = BsIoSliceReader::from_slice(&data);
        assert_eq!(read_code(&mut reader)?, (2, 1));
        assert_eq!(read_code(&mut reader)?, (5, 2));

        // 16-bit: zero run, fill to end of line
        let mut reader = BsIoSliceReader::from_slice(&[0x00, 0x03]);
        assert_eq!(read_code(&mut reader)?, (0, 3));
        Ok(())
    }

    #[test]
    fn field_round_trip() -> anyhow::Result<()> {
        let width = 70;
        let mut indices = vec![0u8; width * 3];
        indices[..2].fill(1);
        indices[2..20].fill(2);
        indices[width + 5..width + 69].fill(3);
        indices[2 * width..].fill(1);

        let encoded = encode_field(&indices, width);
        assert_eq!(decode_field(&encoded, width, 3)?, indices);
        Ok(())
    }

    #[test]
    fn truncated_field_fails() {
        assert!(decode_field(&[0x90], 8, 2).is_err());
    }

    #[test]
    fn fields_interleave() {
        let frame = interleave(&[1, 1, 3, 3], &[2, 2], 2, 3);
        assert_eq!(frame, vec![1, 1, 2, 2, 3, 3]);
    }
}
