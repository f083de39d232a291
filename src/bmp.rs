//! 32-bit BGRA bitmap files for decoded subtitle items.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Result, ensure};
use subdecd_macros::ToBytes;

use crate::byteorder::WriteBytesLe;

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;

#[derive(ToBytes)]
struct FileHeader {
    magic: [u8; 2],
    file_size: u32,
    reserved: u32,
    data_offset: u32,
}

/// `BITMAPINFOHEADER`; a negative height stores rows top-down.
#[derive(ToBytes)]
struct InfoHeader {
    header_size: u32,
    width: i32,
    height: i32,
    planes: u16,
    bit_count: u16,
    compression: u32,
    image_size: u32,
    x_pixels_per_meter: i32,
    y_pixels_per_meter: i32,
    colors_used: u32,
    colors_important: u32,
}

/// Serialises `[b, g, r, a]` pixels, top row first.
pub fn encode(width: usize, height: usize, pixels: &[u8]) -> Result<Vec<u8>> {
    let image_size = width * height * 4;
    ensure!(
        pixels.len() == image_size,
        "Bitmap {width}x{height} needs {image_size} bytes, got {}",
        pixels.len()
    );
    let image_size = u32::try_from(image_size)?;

    let file = FileHeader {
        magic: *b"BM",
        file_size: FILE_HEADER_LEN + INFO_HEADER_LEN + image_size,
        reserved: 0,
        data_offset: FILE_HEADER_LEN + INFO_HEADER_LEN,
    };
    let info = InfoHeader {
        header_size: INFO_HEADER_LEN,
        width: i32::try_from(width)?,
        height: -i32::try_from(height)?,
        planes: 1,
        bit_count: 32,
        compression: 0,
        image_size,
        x_pixels_per_meter: 2835,
        y_pixels_per_meter: 2835,
        colors_used: 0,
        colors_important: 0,
    };

    let mut out = Vec::with_capacity(file.file_size as usize);
    file.write_le(&mut out);
    info.write_le(&mut out);
    out.extend_from_slice(pixels);
    Ok(out)
}

pub fn write(path: &Path, width: usize, height: usize, pixels: &[u8]) -> Result<()> {
    let data = encode(width, height, pixels)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

#[test]
fn header_layout() -> Result<()> {
    let pixels = [0x10, 0x20, 0x30, 0xFF, 0, 0, 0, 0];
    let data = encode(2, 1, &pixels)?;

    assert_eq!(data.len(), 54 + 8);
    assert_eq!(&data[..2], b"BM");
    assert_eq!(u32::from_le_bytes([data[2], data[3], data[4], data[5]]), 62);
    assert_eq!(u32::from_le_bytes([data[10], data[11], data[12], data[13]]), 54);
    assert_eq!(i32::from_le_bytes([data[22], data[23], data[24], data[25]]), -1);
    assert_eq!(u16::from_le_bytes([data[28], data[29]]), 32);
    assert_eq!(&data[54..], &pixels);

    assert!(encode(2, 2, &pixels).is_err());
    Ok(())
}
