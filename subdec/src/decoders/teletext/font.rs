//! Character glyphs and the English G0 set.

/// Column-major 5x8 glyphs for 0x20..=0x7F, bit 0 at the top.
#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 96] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], [0x00, 0x00, 0x5F, 0x00, 0x00],
    [0x00, 0x07, 0x00, 0x07, 0x00], [0x48, 0x7E, 0x49, 0x41, 0x42], // £
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], [0x23, 0x13, 0x08, 0x64, 0x62],
    [0x36, 0x49, 0x56, 0x20, 0x50], [0x00, 0x08, 0x07, 0x03, 0x00],
    [0x00, 0x1C, 0x22, 0x41, 0x00], [0x00, 0x41, 0x22, 0x1C, 0x00],
    [0x2A, 0x1C, 0x7F, 0x1C, 0x2A], [0x08, 0x08, 0x3E, 0x08, 0x08],
    [0x00, 0x80, 0x70, 0x30, 0x00], [0x08, 0x08, 0x08, 0x08, 0x08],
    [0x00, 0x00, 0x60, 0x60, 0x00], [0x20, 0x10, 0x08, 0x04, 0x02],
    [0x3E, 0x51, 0x49, 0x45, 0x3E], [0x00, 0x42, 0x7F, 0x40, 0x00],
    [0x72, 0x49, 0x49, 0x49, 0x46], [0x21, 0x41, 0x49, 0x4D, 0x33],
    [0x18, 0x14, 0x12, 0x7F, 0x10], [0x27, 0x45, 0x45, 0x45, 0x39],
    [0x3C, 0x4A, 0x49, 0x49, 0x31], [0x41, 0x21, 0x11, 0x09, 0x07],
    [0x36, 0x49, 0x49, 0x49, 0x36], [0x46, 0x49, 0x49, 0x29, 0x1E],
    [0x00, 0x00, 0x14, 0x00, 0x00], [0x00, 0x40, 0x34, 0x00, 0x00],
    [0x00, 0x08, 0x14, 0x22, 0x41], [0x14, 0x14, 0x14, 0x14, 0x14],
    [0x00, 0x41, 0x22, 0x14, 0x08], [0x02, 0x01, 0x59, 0x09, 0x06],
    [0x3E, 0x41, 0x5D, 0x59, 0x4E], [0x7C, 0x12, 0x11, 0x12, 0x7C],
    [0x7F, 0x49, 0x49, 0x49, 0x36], [0x3E, 0x41, 0x41, 0x41, 0x22],
    [0x7F, 0x41, 0x41, 0x41, 0x3E], [0x7F, 0x49, 0x49, 0x49, 0x41],
    [0x7F, 0x09, 0x09, 0x09, 0x01], [0x3E, 0x41, 0x41, 0x51, 0x73],
    [0x7F, 0x08, 0x08, 0x08, 0x7F], [0x00, 0x41, 0x7F, 0x41, 0x00],
    [0x20, 0x40, 0x41, 0x3F, 0x01], [0x7F, 0x08, 0x14, 0x22, 0x41],
    [0x7F, 0x40, 0x40, 0x40, 0x40], [0x7F, 0x02, 0x1C, 0x02, 0x7F],
    [0x7F, 0x04, 0x08, 0x10, 0x7F], [0x3E, 0x41, 0x41, 0x41, 0x3E],
    [0x7F, 0x09, 0x09, 0x09, 0x06], [0x3E, 0x41, 0x51, 0x21, 0x5E],
    [0x7F, 0x09, 0x19, 0x29, 0x46], [0x26, 0x49, 0x49, 0x49, 0x32],
    [0x03, 0x01, 0x7F, 0x01, 0x03], [0x3F, 0x40, 0x40, 0x40, 0x3F],
    [0x1F, 0x20, 0x40, 0x20, 0x1F], [0x3F, 0x40, 0x38, 0x40, 0x3F],
    [0x63, 0x14, 0x08, 0x14, 0x63], [0x03, 0x04, 0x78, 0x04, 0x03],
    [0x61, 0x59, 0x49, 0x4D, 0x43], [0x08, 0x1C, 0x2A, 0x08, 0x08], // ←
    [0x2F, 0x10, 0xC8, 0xAC, 0xBA], [0x08, 0x08, 0x2A, 0x1C, 0x08], // ½ →
    [0x04, 0x02, 0x7F, 0x02, 0x04], [0x14, 0x7F, 0x14, 0x7F, 0x14], // ↑ #
    [0x08, 0x08, 0x08, 0x08, 0x08], [0x20, 0x54, 0x54, 0x78, 0x40], // — a
    [0x7F, 0x28, 0x44, 0x44, 0x38], [0x38, 0x44, 0x44, 0x44, 0x28],
    [0x38, 0x44, 0x44, 0x28, 0x7F], [0x38, 0x54, 0x54, 0x54, 0x18],
    [0x00, 0x08, 0x7E, 0x09, 0x02], [0x18, 0xA4, 0xA4, 0x9C, 0x78],
    [0x7F, 0x08, 0x04, 0x04, 0x78], [0x00, 0x44, 0x7D, 0x40, 0x00],
    [0x20, 0x40, 0x40, 0x3D, 0x00], [0x7F, 0x10, 0x28, 0x44, 0x00],
    [0x00, 0x41, 0x7F, 0x40, 0x00], [0x7C, 0x04, 0x78, 0x04, 0x78],
    [0x7C, 0x08, 0x04, 0x04, 0x78], [0x38, 0x44, 0x44, 0x44, 0x38],
    [0xFC, 0x18, 0x24, 0x24, 0x18], [0x18, 0x24, 0x24, 0x18, 0xFC],
    [0x7C, 0x08, 0x04, 0x04, 0x08], [0x48, 0x54, 0x54, 0x54, 0x24],
    [0x04, 0x04, 0x3F, 0x44, 0x24], [0x3C, 0x40, 0x40, 0x20, 0x7C],
    [0x1C, 0x20, 0x40, 0x20, 0x1C], [0x3C, 0x40, 0x30, 0x40, 0x3C],
    [0x44, 0x28, 0x10, 0x28, 0x44], [0x4C, 0x90, 0x90, 0x90, 0x7C],
    [0x44, 0x64, 0x54, 0x4C, 0x44], [0x2F, 0x10, 0x28, 0x34, 0xFA], // ¼
    [0x00, 0x7F, 0x00, 0x7F, 0x00], [0x25, 0x1F, 0xC8, 0xAC, 0xBA], // ‖ ¾
    [0x08, 0x08, 0x6B, 0x08, 0x08], [0x7F, 0x7F, 0x7F, 0x7F, 0x7F], // ÷ ■
];

pub const GLYPH_WIDTH: usize = 5;
pub const GLYPH_HEIGHT: usize = 8;

/// Glyph columns for a parity-stripped G0 code; controls render blank.
pub fn glyph(code: u8) -> &'static [u8; 5] {
    match code {
        0x20..=0x7F => &GLYPHS[(code - 0x20) as usize],
        _ => &GLYPHS[0],
    }
}

/// Whether glyph pixel `(col, row)` of `code` is set.
pub fn glyph_pixel(code: u8, col: usize, row: usize) -> bool {
    col < GLYPH_WIDTH && row < GLYPH_HEIGHT && glyph(code)[col] & (1 << row) != 0
}

/// Maps an English G0 code to Unicode.
pub fn to_unicode(code: u8) -> char {
    match code {
        0x23 => '£',
        0x5B => '←',
        0x5C => '½',
        0x5D => '→',
        0x5E => '↑',
        0x5F => '#',
        0x60 => '—',
        0x7B => '¼',
        0x7C => '‖',
        0x7D => '¾',
        0x7E => '÷',
        0x7F => '■',
        0x20..=0x7E => code as char,
        _ => ' ',
    }
}

/// Sextant bits of a mosaic code: 0x01 top left, 0x02 top right,
/// 0x04/0x08 middle, 0x10 bottom left, 0x40 bottom right.
pub fn is_mosaic(code: u8) -> bool {
    matches!(code, 0x20..=0x3F | 0x60..=0x7F)
}

/// Whether sextant `(col, row)` (`col` 0..2, `row` 0..3) of a mosaic code
/// is lit.
pub fn sextant(code: u8, col: usize, row: usize) -> bool {
    let bit = match (col, row) {
        (0, 0) => 0x01,
        (1, 0) => 0x02,
        (0, 1) => 0x04,
        (1, 1) => 0x08,
        (0, _) => 0x10,
        _ => 0x40,
    };
    code & bit != 0
}

#[test]
fn english_set() {
    assert_eq!(to_unicode(b'A'), 'A');
    assert_eq!(to_unicode(0x23), '£');
    assert_eq!(to_unicode(0x7F), '■');
    assert!(glyph_pixel(b'!', 2, 0));
    assert!(!glyph_pixel(b' ', 2, 0));
    assert!(sextant(0x7F, 1, 2));
    assert!(!sextant(0x20, 0, 0));
}
