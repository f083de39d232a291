//! Run-length coded pixel strings of DVB object data.
//!
//! Each function fills one line of region indices and returns the number of
//! pixels advanced together with the source bytes used, rounded up to a
//! whole byte.

use std::io;

use crate::utils::bitstream_io::BsIoSliceReader;

pub const MAP_2_TO_4: [u8; 4] = [0x0, 0x7, 0x8, 0xF];
pub const MAP_2_TO_8: [u8; 4] = [0x00, 0x77, 0x88, 0xFF];
pub const MAP_4_TO_8: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
];

/// Destination line with the non-modifying colour rule applied.
struct Line<'a> {
    pixels: &'a mut [u8],
    x: usize,
    non_modifying: bool,
    map: Option<&'a [u8]>,
}

impl Line<'_> {
    fn full(&self) -> bool {
        self.x >= self.pixels.len()
    }

    /// Writes `run` pixels of `index`. Index 1 only advances when the
    /// object uses the non-modifying colour flag.
    fn put(&mut self, run: usize, index: u8) {
        let end = (self.x + run).min(self.pixels.len());
        if !(self.non_modifying && index == 1) {
            let value = match self.map {
                Some(map) => map.get(index as usize).copied().unwrap_or(index),
                None => index,
            };
            self.pixels[self.x..end].fill(value);
        }
        self.x = end;
    }
}

fn finish(reader: &mut BsIoSliceReader, data: &[u8], line: &Line) -> (usize, usize) {
    let consumed = reader.bytes_consumed().unwrap_or(data.len()).min(data.len());
    (line.x, consumed)
}

pub fn read_2bit_string(
    pixels: &mut [u8],
    data: &[u8],
    non_modifying: bool,
    map: Option<&[u8]>,
) -> (usize, usize) {
    let mut reader = BsIoSliceReader::from_slice(data);
    let mut line = Line {
        pixels,
        x: 0,
        non_modifying,
        map,
    };

    match two_bit_codes(&mut reader, &mut line) {
        // line filled before the end code; swallow it
        Ok(false) => {
            if reader.get_n::<u8>(6).is_ok_and(|v| v != 0) {
                log::trace!("2-bit pixel string overflows the region line");
            }
        }
        Ok(true) | Err(_) => {}
    }
    finish(&mut reader, data, &line)
}

/// Returns `Ok(true)` when the end-of-string code was read.
fn two_bit_codes(reader: &mut BsIoSliceReader, line: &mut Line) -> io::Result<bool> {
    while !line.full() && reader.available()? > 0 {
        let bits: u8 = reader.get_n(2)?;
        if bits != 0 {
            line.put(1, bits);
        } else if reader.get()? {
            let run = reader.get_n::<u8>(3)? as usize + 3;
            let index = reader.get_n(2)?;
            line.put(run, index);
        } else if reader.get()? {
            line.put(1, 0);
        } else {
            match reader.get_n::<u8>(2)? {
                0 => return Ok(true),
                1 => line.put(2, 0),
                2 => {
                    let run = reader.get_n::<u8>(4)? as usize + 12;
                    let index = reader.get_n(2)?;
                    line.put(run, index);
                }
                _ => {
                    let run = reader.get_n::<u8>(8)? as usize + 29;
                    let index = reader.get_n(2)?;
                    line.put(run, index);
                }
            }
        }
    }
    Ok(false)
}

pub fn read_4bit_string(
    pixels: &mut [u8],
    data: &[u8],
    non_modifying: bool,
    map: Option<&[u8]>,
) -> (usize, usize) {
    let mut reader = BsIoSliceReader::from_slice(data);
    let mut line = Line {
        pixels,
        x: 0,
        non_modifying,
        map,
    };

    match four_bit_codes(&mut reader, &mut line) {
        Ok(false) => {
            if reader.get_n::<u8>(8).is_ok_and(|v| v != 0) {
                log::trace!("4-bit pixel string overflows the region line");
            }
        }
        Ok(true) | Err(_) => {}
    }
    finish(&mut reader, data, &line)
}

fn four_bit_codes(reader: &mut BsIoSliceReader, line: &mut Line) -> io::Result<bool> {
    while !line.full() && reader.available()? > 0 {
        let bits: u8 = reader.get_n(4)?;
        if bits != 0 {
            line.put(1, bits);
        } else if !reader.get()? {
            let run = reader.get_n::<u8>(3)? as usize;
            if run == 0 {
                return Ok(true);
            }
            line.put(run + 2, 0);
        } else if !reader.get()? {
            let run = reader.get_n::<u8>(2)? as usize + 4;
            let index = reader.get_n(4)?;
            line.put(run, index);
        } else {
            match reader.get_n::<u8>(2)? {
                0 => line.put(1, 0),
                1 => line.put(2, 0),
                2 => {
                    let run = reader.get_n::<u8>(4)? as usize + 9;
                    let index = reader.get_n(4)?;
                    line.put(run, index);
                }
                _ => {
                    let run = reader.get_n::<u8>(8)? as usize + 25;
                    let index = reader.get_n(4)?;
                    line.put(run, index);
                }
            }
        }
    }
    Ok(false)
}

pub fn read_8bit_string(pixels: &mut [u8], data: &[u8], non_modifying: bool) -> (usize, usize) {
    let mut line = Line {
        pixels,
        x: 0,
        non_modifying,
        map: None,
    };
    let mut pos = 0;

    while !line.full() && pos < data.len() {
        let bits = data[pos];
        pos += 1;
        if bits != 0 {
            line.put(1, bits);
            continue;
        }

        let Some(&code) = data.get(pos) else {
            break;
        };
        pos += 1;
        let run = (code & 0x7F) as usize;
        if code & 0x80 == 0 {
            if run == 0 {
                return (line.x, pos);
            }
            line.put(run, 0);
        } else {
            let Some(&index) = data.get(pos) else {
                break;
            };
            pos += 1;
            line.put(run, index);
        }
    }

    // end code after a full line
    if line.full() && pos + 1 < data.len() && data[pos] == 0 && data[pos + 1] == 0 {
        pos += 2;
    }
    (line.x, pos.min(data.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_bit_singles_and_end() {
        let mut line = [0u8; 8];
        // 01 01 01 01 | 00 0 0 00
        let (pixels, used) = read_2bit_string(&mut line, &[0x55, 0x00], false, None);
        assert_eq!(pixels, 4);
        assert_eq!(used, 2);
        assert_eq!(&line[..4], &[1, 1, 1, 1]);
    }

    #[test]
    fn two_bit_run_with_map() {
        let mut line = [0u8; 8];
        // 00 1 010 11 -> 5 pixels of colour 3, then end code
        let (pixels, _) = read_2bit_string(&mut line, &[0x2B, 0x00], false, Some(&MAP_2_TO_8));
        assert_eq!(pixels, 5);
        assert_eq!(&line[..5], &[0xFF; 5]);
    }

    #[test]
    fn non_modifying_colour_skips() {
        let mut line = [9u8; 4];
        // 01 10 01 10
        read_2bit_string(&mut line, &[0x66, 0x00], true, None);
        assert_eq!(line, [9, 2, 9, 2]);
    }

    #[test]
    fn four_bit_short_run() {
        let mut line = [7u8; 6];
        // 0011 | 0000 0 011 (5 x colour 0) | 0000 0000 end
        let (pixels, used) = read_4bit_string(&mut line, &[0x30, 0x30, 0x00], false, None);
        assert_eq!(pixels, 6);
        assert_eq!(line, [3, 0, 0, 0, 0, 0]);
        assert_eq!(used, 3);
    }

    #[test]
    fn eight_bit_runs() {
        let mut line = [0xAAu8; 6];
        let data = [0x05, 0x00, 0x83, 0x42, 0x00, 0x02, 0x00, 0x00];
        let (pixels, used) = read_8bit_string(&mut line, &data, false);
        assert_eq!(pixels, 6);
        assert_eq!(line, [0x05, 0x42, 0x42, 0x42, 0x00, 0x00]);
        assert_eq!(used, 8);
    }
}
