//! Fixed-point ITU-R BT.601 (CCIR) YCbCr to RGB conversion.
//!
//! Colours are packed as `a << 24 | r << 16 | g << 8 | b`.

const SCALEBITS: u32 = 10;
const ONE_HALF: i32 = 1 << (SCALEBITS - 1);

const fn fix(x: f64) -> i32 {
    (x * (1 << SCALEBITS) as f64 + 0.5) as i32
}

const FIX_Y: i32 = fix(255.0 / 219.0);
const FIX_CR_R: i32 = fix(1.40200 * 255.0 / 224.0);
const FIX_CB_G: i32 = fix(0.34414 * 255.0 / 224.0);
const FIX_CR_G: i32 = fix(0.71414 * 255.0 / 224.0);
const FIX_CB_B: i32 = fix(1.77200 * 255.0 / 224.0);

#[inline(always)]
pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[inline(always)]
fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Converts one studio-range YCbCr sample to RGB.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;

    let r_add = FIX_CR_R * cr + ONE_HALF;
    let g_add = -FIX_CB_G * cb - FIX_CR_G * cr + ONE_HALF;
    let b_add = FIX_CB_B * cb + ONE_HALF;

    let y = (y as i32 - 16) * FIX_Y;

    (
        clamp((y + r_add) >> SCALEBITS),
        clamp((y + g_add) >> SCALEBITS),
        clamp((y + b_add) >> SCALEBITS),
    )
}

/// Converts a YCbCr sample with opacity to a packed ARGB word.
pub fn ycbcr_to_argb(y: u8, cb: u8, cr: u8, alpha: u8) -> u32 {
    let (r, g, b) = ycbcr_to_rgb(y, cb, cr);
    rgba(r, g, b, alpha)
}

/// Appends a packed ARGB word as `[b, g, r, a]`.
#[inline(always)]
pub fn push_argb(dst: &mut Vec<u8>, argb: u32) {
    dst.extend_from_slice(&argb.to_le_bytes());
}

#[test]
fn studio_range_extremes() {
    assert_eq!(ycbcr_to_rgb(16, 128, 128), (0, 0, 0));
    assert_eq!(ycbcr_to_rgb(235, 128, 128), (255, 255, 255));
    assert_eq!(ycbcr_to_argb(235, 128, 128, 0x80), 0x80FF_FFFF);
}

#[test]
fn saturated_red() {
    // 100% red in BT.601 studio range
    let (r, g, b) = ycbcr_to_rgb(81, 90, 240);
    assert!(r >= 254);
    assert!(g <= 1);
    assert!(b <= 1);
}
