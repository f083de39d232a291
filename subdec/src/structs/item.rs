//! Decoded subtitle items.

use std::fmt::{Display, Formatter};

use crate::structs::timestamp::Pts;

/// Payload of a decoded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPayload {
    /// Packed 32-bit pixels, 4 bytes per pixel in `[b, g, r, a]` order.
    Bitmap(Vec<u8>),
    Text(String),
}

impl ItemPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            ItemPayload::Bitmap(pixels) => pixels.is_empty(),
            ItemPayload::Text(text) => text.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ItemPayload::Bitmap(pixels) => pixels.len(),
            ItemPayload::Text(text) => text.len(),
        }
    }
}

/// One presentable subtitle unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleItem {
    pub payload: ItemPayload,
    pub width: usize,
    pub height: usize,
    /// Display origin on the reference canvas.
    pub x: i32,
    pub y: i32,
    pub pts: Pts,
    /// End of presentation, when known.
    pub end: Option<Pts>,
    pub immediate_present: bool,
    /// Stay on screen until replaced (no auto-fade).
    pub keep_showing: bool,
    /// Reference video size the origin is relative to.
    pub video_width: usize,
    pub video_height: usize,
}

impl SubtitleItem {
    pub fn bitmap(width: usize, height: usize, pixels: Vec<u8>, pts: Pts) -> Self {
        Self {
            payload: ItemPayload::Bitmap(pixels),
            width,
            height,
            x: 0,
            y: 0,
            pts,
            end: None,
            immediate_present: false,
            keep_showing: false,
            video_width: 0,
            video_height: 0,
        }
    }

    pub fn text(text: impl Into<String>, pts: Pts) -> Self {
        Self {
            payload: ItemPayload::Text(text.into()),
            ..Self::bitmap(0, 0, Vec::new(), pts)
        }
    }

    pub fn with_origin(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_end(mut self, end: Pts) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_video_size(mut self, width: usize, height: usize) -> Self {
        self.video_width = width;
        self.video_height = height;
        self
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self.payload, ItemPayload::Bitmap(_))
    }

    pub fn pixels(&self) -> Option<&[u8]> {
        match &self.payload {
            ItemPayload::Bitmap(pixels) => Some(pixels),
            ItemPayload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            ItemPayload::Text(text) => Some(text),
            ItemPayload::Bitmap(_) => None,
        }
    }

    /// Returns the pixel at `(x, y)` as `a << 24 | r << 16 | g << 8 | b`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y * self.width + x) * 4;
        let bytes = self.pixels()?.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn duration(&self) -> Option<u64> {
        self.end.map(|end| end.0.saturating_sub(self.pts.0))
    }
}

impl Display for SubtitleItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.payload {
            ItemPayload::Bitmap(_) => write!(
                f,
                "bitmap {}x{} @ ({}, {}) pts {}",
                self.width, self.height, self.x, self.y, self.pts
            )?,
            ItemPayload::Text(text) => write!(f, "text {:?} pts {}", text, self.pts)?,
        }
        if let Some(end) = self.end {
            write!(f, " end {end}")?;
        }
        Ok(())
    }
}

#[test]
fn pixel_lookup() {
    let pixels = vec![
        0x00, 0x00, 0x00, 0xFF, // black
        0xFF, 0xFF, 0xFF, 0xFF, // white
    ];
    let item = SubtitleItem::bitmap(2, 1, pixels, Pts(0));

    assert_eq!(item.pixel(0, 0), Some(0xFF00_0000));
    assert_eq!(item.pixel(1, 0), Some(0xFFFF_FFFF));
    assert_eq!(item.pixel(2, 0), None);
}
