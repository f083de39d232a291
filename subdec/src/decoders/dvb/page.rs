//! Page graph: regions, objects, colour tables and the page display list.
//!
//! Entries are stored in id-keyed maps; an object lives as long as at
//! least one region places it.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::decoders::dvb::clut::Clut;
use crate::decoders::dvb::pixel::{
    MAP_2_TO_4, MAP_2_TO_8, MAP_4_TO_8, read_2bit_string, read_4bit_string, read_8bit_string,
};
use crate::utils::errors::DvbError;

/// Canvas assumed when no display definition was received.
pub const DEFAULT_DISPLAY_WIDTH: usize = 720;
pub const DEFAULT_DISPLAY_HEIGHT: usize = 576;

pub const MAX_REGION_WIDTH: usize = 1920;
pub const MAX_REGION_HEIGHT: usize = 1080;

/// Largest composed page, in RGBA bytes.
pub const MAX_PAGE_BYTES: usize = MAX_REGION_WIDTH * MAX_REGION_HEIGHT * 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: u8,
    pub width: usize,
    pub height: usize,
    /// Bits per pixel: 2, 4 or 8.
    pub depth: u8,
    pub clut: u8,
    pub background: u8,
    /// CLUT indices, always `width * height` long.
    pub pixels: Vec<u8>,
}

impl Region {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            width: 0,
            height: 0,
            depth: 4,
            clut: 0,
            background: 0,
            pixels: Vec::new(),
        }
    }

    /// Resizes the pixel buffer. Returns true when it was reallocated.
    pub fn resize(&mut self, width: usize, height: usize) -> bool {
        self.width = width;
        self.height = height;
        if self.pixels.len() == width * height {
            return false;
        }
        self.pixels = vec![0; width * height];
        true
    }

    /// Decodes one field of object pixel data placed at `placement`.
    ///
    /// `field` is 0 for the top field and 1 for the bottom field; rows of
    /// the other parity are left untouched.
    pub fn decode_pixel_block(
        &mut self,
        placement: &ObjectPlacement,
        data: &[u8],
        field: usize,
        non_modifying: bool,
    ) -> Result<(), DvbError> {
        let mut map_2_to_4 = MAP_2_TO_4;
        let mut map_2_to_8 = MAP_2_TO_8;
        let mut map_4_to_8 = MAP_4_TO_8;

        let mut x = placement.x;
        let mut y = placement.y;
        if y & 1 != field {
            y += 1;
        }

        let mut pos = 0;
        while pos < data.len() {
            if x > self.width || y > self.height {
                return Err(DvbError::ObjectPlacement {
                    x,
                    y,
                    width: self.width,
                    height: self.height,
                });
            }

            let code = data[pos];
            pos += 1;
            let src = &data[pos..];

            match code {
                0x10 | 0x11 | 0x12 => {
                    if y >= self.height {
                        return Err(DvbError::ObjectPlacement {
                            x,
                            y,
                            width: self.width,
                            height: self.height,
                        });
                    }
                    let line = &mut self.pixels[y * self.width + x..(y + 1) * self.width];
                    let (advanced, used) = match code {
                        0x10 => {
                            let map: Option<&[u8]> = match self.depth {
                                8 => Some(&map_2_to_8[..]),
                                4 => Some(&map_2_to_4[..]),
                                _ => None,
                            };
                            read_2bit_string(line, src, non_modifying, map)
                        }
                        0x11 => {
                            if self.depth < 4 {
                                debug!("4-bit pixel string in {}-bit region", self.depth);
                                return Ok(());
                            }
                            let map: Option<&[u8]> =
                                (self.depth == 8).then_some(&map_4_to_8[..]);
                            read_4bit_string(line, src, non_modifying, map)
                        }
                        _ => {
                            if self.depth < 8 {
                                debug!("8-bit pixel string in {}-bit region", self.depth);
                                return Ok(());
                            }
                            read_8bit_string(line, src, non_modifying)
                        }
                    };
                    x += advanced;
                    pos += used;
                }
                0x20 => {
                    let Some(b) = src.get(..2) else { break };
                    map_2_to_4 = [b[0] >> 4, b[0] & 0xF, b[1] >> 4, b[1] & 0xF];
                    pos += 2;
                }
                0x21 => {
                    let Some(b) = src.get(..4) else { break };
                    map_2_to_8.copy_from_slice(b);
                    pos += 4;
                }
                0x22 => {
                    let Some(b) = src.get(..16) else { break };
                    map_4_to_8.copy_from_slice(b);
                    pos += 16;
                }
                0xF0 => {
                    x = placement.x;
                    y += 2;
                }
                other => trace!("Ignoring pixel data type {other:#04X}"),
            }
        }
        Ok(())
    }
}

/// Where a region places one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPlacement {
    pub region_id: u8,
    pub x: usize,
    pub y: usize,
    pub foreground: u8,
    pub background: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    pub id: u16,
    /// 0 bitmap, 1 character, 2 string of characters.
    pub kind: u8,
    pub placements: Vec<ObjectPlacement>,
}

/// Position of a region on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDisplay {
    pub region_id: u8,
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayDefinition {
    pub version: u8,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Composed page bitmap ready to become an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPage {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    pub display_width: usize,
    pub display_height: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PageGraph {
    pub regions: BTreeMap<u8, Region>,
    pub objects: BTreeMap<u16, Object>,
    pub cluts: BTreeMap<u8, Clut>,
    pub displays: Vec<RegionDisplay>,
    pub display_definition: Option<DisplayDefinition>,
    /// Page time-out in seconds.
    pub timeout: u8,
}

impl PageGraph {
    /// Drops every region, object and CLUT.
    pub fn clear_content(&mut self) {
        self.regions.clear();
        self.objects.clear();
        self.cluts.clear();
    }

    pub fn clear(&mut self) {
        self.clear_content();
        self.displays.clear();
        self.display_definition = None;
    }

    /// Detaches every object placed in `region_id`; objects left without
    /// any placement are deleted.
    pub fn delete_region_display_list(&mut self, region_id: u8) {
        self.objects.retain(|_, object| {
            let before = object.placements.len();
            object.placements.retain(|p| p.region_id != region_id);
            let detached = before != object.placements.len();
            !(detached && object.placements.is_empty())
        });
    }

    pub fn place_object(&mut self, object_id: u16, kind: u8, placement: ObjectPlacement) {
        let object = self.objects.entry(object_id).or_insert_with(|| Object {
            id: object_id,
            ..Default::default()
        });
        object.kind = kind;
        object.placements.push(placement);
    }

    pub fn display_size(&self) -> (usize, usize) {
        match self.display_definition {
            Some(def) if def.width != 0 && def.height != 0 => (def.width, def.height),
            _ => (DEFAULT_DISPLAY_WIDTH, DEFAULT_DISPLAY_HEIGHT),
        }
    }

    /// Composes every displayed region into one bitmap covering their
    /// bounding box. `Ok(None)` when nothing is displayed or a displayed
    /// region is missing.
    pub fn compose(&mut self, default_clut: &Clut) -> Result<Option<ComposedPage>, DvbError> {
        let mut bbox: Option<(usize, usize, usize, usize)> = None;

        for display in self.displays.iter_mut() {
            let Some(region) = self.regions.get(&display.region_id) else {
                debug!("Display list references missing region {}", display.region_id);
                return Ok(None);
            };
            if region.width > MAX_REGION_WIDTH || region.height > MAX_REGION_HEIGHT {
                return Err(DvbError::RegionTooLarge {
                    id: region.id,
                    width: region.width,
                    height: region.height,
                });
            }

            if bbox.is_none() {
                bbox = Some((display.x, display.y, region.width, region.height));
                continue;
            }
            let Some((x, y, width, height)) = bbox.as_mut() else {
                continue;
            };

            if display.x < *x {
                *width += *x - display.x;
                *x = display.x;
            }
            if display.y < *y {
                if *y - display.y < region.height {
                    // Regions stacked closer than their height: place this
                    // one directly above instead of overlapping.
                    *height += region.height;
                    *y = y.saturating_sub(region.height);
                    display.y = *y;
                } else {
                    *height += *y - display.y;
                    *y = display.y;
                }
            }
            if display.x + region.width > *x + *width {
                *width = display.x + region.width - *x;
            }
            if display.y + region.height > *y + *height {
                *height = display.y + region.height - *y;
            }
        }

        let Some((x, y, width, height)) = bbox else {
            return Ok(None);
        };
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let size = width.checked_mul(height).and_then(|n| n.checked_mul(4));
        if size.is_none_or(|bytes| bytes > MAX_PAGE_BYTES) {
            return Err(DvbError::PageTooLarge { width, height });
        }

        let mut pixels = vec![0u8; width * height * 4];
        for display in &self.displays {
            let Some(region) = self.regions.get(&display.region_id) else {
                return Ok(None);
            };

            let clut = self.cluts.get(&region.clut).unwrap_or_else(|| {
                trace!("Region {} uses default CLUT", region.id);
                default_clut
            });
            let table = clut.table(region.depth);

            let x_off = display.x.saturating_sub(x);
            let y_off = display.y.saturating_sub(y);
            for (row, line) in region.pixels.chunks_exact(region.width.max(1)).enumerate() {
                let dst_y = row + y_off;
                if dst_y >= height {
                    break;
                }
                for (col, &index) in line.iter().enumerate() {
                    let dst_x = col + x_off;
                    if dst_x >= width {
                        break;
                    }
                    let colour = table.get(index as usize).copied().unwrap_or(0);
                    let offset = (dst_y * width + dst_x) * 4;
                    pixels[offset..offset + 4].copy_from_slice(&colour.to_le_bytes());
                }
            }
        }

        let (display_width, display_height) = self.display_size();
        Ok(Some(ComposedPage {
            x,
            y,
            width,
            height,
            pixels,
            display_width,
            display_height,
        }))
    }
}
