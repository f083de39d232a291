use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{Result, bail, ensure};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::extract::{Framing, Record};
use crate::process::parse::{Decoder, ParserContext};
use crate::structs::item::SubtitleItem;
use crate::structs::params::SubtitleType;
use crate::structs::timestamp::Pts;
use crate::utils::bitstream_io::ByteCursor;
use crate::utils::errors::PgsError;
use crate::utils::yuv::ycbcr_to_argb;

pub const SEGMENT_PALETTE: u8 = 0x14;
pub const SEGMENT_OBJECT: u8 = 0x15;
pub const SEGMENT_PRESENTATION: u8 = 0x16;
pub const SEGMENT_WINDOW: u8 = 0x17;
pub const SEGMENT_END: u8 = 0x80;

const FRAGMENT_FIRST: u8 = 0x80;
const FRAGMENT_LAST: u8 = 0x40;

const COMPOSITION_CROPPED: u8 = 0x80;
const COMPOSITION_FORCED: u8 = 0x40;

const QUIRK_WIDTH: usize = 1920;
const QUIRK_HEIGHT: usize = 1080;

/// Largest object the format allows in either direction.
pub const MAX_OBJECT_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionObject {
    pub object_id: u16,
    pub window_id: u8,
    pub forced: bool,
    pub x: usize,
    pub y: usize,
    pub crop: Option<Rect>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    pub video_width: usize,
    pub video_height: usize,
    pub composition_number: u16,
    pub composition_state: u8,
    pub palette_id: u8,
    pub objects: Vec<CompositionObject>,
}

impl Presentation {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(body);
        let video_width = cursor.be16()? as usize;
        let video_height = cursor.be16()? as usize;
        let _frame_rate = cursor.u8()?;
        let composition_number = cursor.be16()?;
        let composition_state = cursor.u8()?;
        let _palette_update = cursor.u8()?;
        let palette_id = cursor.u8()?;
        let count = cursor.u8()?;

        let mut objects = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let object_id = cursor.be16()?;
            let window_id = cursor.u8()?;
            let flags = cursor.u8()?;
            let x = cursor.be16()? as usize;
            let y = cursor.be16()? as usize;
            let crop = if flags & COMPOSITION_CROPPED != 0 {
                Some(Rect {
                    x: cursor.be16()? as usize,
                    y: cursor.be16()? as usize,
                    width: cursor.be16()? as usize,
                    height: cursor.be16()? as usize,
                })
            } else {
                None
            };
            objects.push(CompositionObject {
                object_id,
                window_id,
                forced: flags & COMPOSITION_FORCED != 0,
                x,
                y,
                crop,
            });
        }

        Ok(Self {
            video_width,
            video_height,
            composition_number,
            composition_state,
            palette_id,
            objects,
        })
    }
}

/// Object data collected across fragments.
#[derive(Debug, Clone, Default)]
struct PendingObject {
    id: u16,
    width: usize,
    height: usize,
    expected: usize,
    rle: Vec<u8>,
}

/// Decodes one PGS object bitmap into palette indices.
///
/// Codes are: a non-zero byte for one pixel, `00 00` for end of line,
/// then `00` followed by two flag bits selecting a 6 or 14 bit run length
/// and whether an explicit colour byte follows (colour 0 otherwise).
pub fn decode_rle(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>, PgsError> {
    if width > MAX_OBJECT_SIZE || height > MAX_OBJECT_SIZE {
        return Err(PgsError::ObjectTooLarge {
            width,
            height,
            max_width: MAX_OBJECT_SIZE,
            max_height: MAX_OBJECT_SIZE,
        });
    }
    let overflow = PgsError::RleOverflow { width, height };
    let mut out = vec![0u8; width * height];
    let (mut x, mut y) = (0usize, 0usize);
    let mut bytes = data.iter().copied();

    while let Some(b) = bytes.next() {
        let (run, colour) = if b != 0 {
            (1, b)
        } else {
            let Some(flags) = bytes.next() else { break };
            if flags == 0 {
                x = 0;
                y += 1;
                continue;
            }
            let mut run = (flags & 0x3F) as usize;
            if flags & 0x40 != 0 {
                let Some(low) = bytes.next() else { break };
                run = (run << 8) | low as usize;
            }
            let colour = if flags & 0x80 != 0 {
                let Some(c) = bytes.next() else { break };
                c
            } else {
                0
            };
            (run, colour)
        };

        if y >= height || x + run > width {
            return Err(overflow);
        }
        out[y * width + x..y * width + x + run].fill(colour);
        x += run;
    }
    Ok(out)
}

/// Copies the `rect` part of a `width`-wide index buffer.
fn crop_indices(indices: &[u8], width: usize, rect: Rect) -> Vec<u8> {
    let mut out = Vec::with_capacity(rect.width * rect.height);
    for row in rect.y..rect.y + rect.height {
        let start = row * width + rect.x;
        out.extend_from_slice(&indices[start..start + rect.width]);
    }
    out
}

/// Clamps `rect` to a `width` x `height` canvas.
fn clamp_rect(rect: Rect, width: usize, height: usize) -> Rect {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    Rect {
        x,
        y,
        width: rect.width.min(width - x),
        height: rect.height.min(height - y),
    }
}

/// Blu-ray presentation graphics decoder.
///
/// Expects records framed from `PG` segments. A bitmap is rendered with
/// the current palette once its last object fragment arrives.
#[derive(Debug)]
pub struct PgsDecoder {
    crop_quirk: bool,
    palette: [u32; 256],
    palette_version: Option<u8>,
    presentation: Option<Presentation>,
    windows: BTreeMap<u8, Rect>,
    pending: Option<PendingObject>,
    items_decoded: usize,
}

impl PgsDecoder {
    /// `crop_quirk` cuts full-HD bitmaps down to their lower centre quarter.
    pub fn new(crop_quirk: bool) -> Self {
        Self {
            crop_quirk,
            palette: [0; 256],
            palette_version: None,
            presentation: None,
            windows: BTreeMap::new(),
            pending: None,
            items_decoded: 0,
        }
    }

    pub fn palette(&self) -> &[u32; 256] {
        &self.palette
    }

    /// Objects may not exceed the presented video size.
    fn object_limit(&self) -> (usize, usize) {
        match &self.presentation {
            Some(p) if p.video_width != 0 && p.video_height != 0 => (
                p.video_width.min(MAX_OBJECT_SIZE),
                p.video_height.min(MAX_OBJECT_SIZE),
            ),
            _ => (MAX_OBJECT_SIZE, MAX_OBJECT_SIZE),
        }
    }

    fn parse_palette(&mut self, body: &[u8]) -> Result<()> {
        ensure!(
            body.len() >= 2,
            PgsError::SegmentTooShort {
                kind: SEGMENT_PALETTE,
                length: body.len()
            }
        );
        let (id, version) = (body[0], body[1]);
        trace!("Palette {id} version {version}");
        self.palette_version = Some(version);

        for entry in body[2..].chunks_exact(5) {
            let &[index, y, cr, cb, alpha] = entry else {
                continue;
            };
            self.palette[index as usize] = ycbcr_to_argb(y, cb, cr, alpha);
        }
        Ok(())
    }

    fn parse_window(&mut self, body: &[u8]) -> Result<()> {
        let mut cursor = ByteCursor::new(body);
        let count = cursor.u8()?;
        for _ in 0..count {
            let id = cursor.u8()?;
            let rect = Rect {
                x: cursor.be16()? as usize,
                y: cursor.be16()? as usize,
                width: cursor.be16()? as usize,
                height: cursor.be16()? as usize,
            };
            trace!("Window {id}: {rect:?}");
            self.windows.insert(id, rect);
        }
        Ok(())
    }

    /// Accumulates one object fragment. Returns the object once complete.
    fn parse_object(&mut self, body: &[u8], ctx: &ParserContext) -> Result<Option<PendingObject>> {
        let mut cursor = ByteCursor::new(body);
        let id = cursor.be16()?;
        let _version = cursor.u8()?;
        let sequence = cursor.u8()?;

        if sequence & FRAGMENT_FIRST != 0 {
            // data length counts the width and height fields
            let expected = (cursor.be24()? as usize).saturating_sub(4);
            let width = cursor.be16()? as usize;
            let height = cursor.be16()? as usize;
            if width == 0 || height == 0 {
                self.pending = None;
                bail!(PgsError::EmptyObject { width, height });
            }
            let (max_width, max_height) = self.object_limit();
            if width > max_width || height > max_height {
                self.pending = None;
                bail!(PgsError::ObjectTooLarge {
                    width,
                    height,
                    max_width,
                    max_height,
                });
            }
            if self.pending.is_some() {
                debug!("Object {id} replaces an unfinished object");
            }
            self.pending = Some(PendingObject {
                id,
                width,
                height,
                expected,
                rle: Vec::with_capacity(expected),
            });
        }

        let Some(pending) = self.pending.as_mut() else {
            log_or_err!(ctx, Warn, PgsError::OrphanFragment);
            return Ok(None);
        };
        if pending.id != id {
            self.pending = None;
            log_or_err!(ctx, Warn, PgsError::OrphanFragment);
            return Ok(None);
        }
        pending.rle.extend_from_slice(cursor.rest());

        if sequence & FRAGMENT_LAST != 0 || pending.rle.len() >= pending.expected {
            return Ok(self.pending.take());
        }
        Ok(None)
    }

    fn render_object(&mut self, object: PendingObject, record: &Record, ctx: &ParserContext) -> Result<()> {
        let mut indices = decode_rle(&object.rle, object.width, object.height)?;
        let (mut width, mut height) = (object.width, object.height);

        let composition = self
            .presentation
            .as_ref()
            .and_then(|p| p.objects.iter().find(|o| o.object_id == object.id))
            .copied();
        let (mut x, mut y) = composition.map_or((0, 0), |c| (c.x, c.y));

        if let Some(crop) = composition.and_then(|c| c.crop) {
            let rect = clamp_rect(crop, width, height);
            indices = crop_indices(&indices, width, rect);
            (width, height) = (rect.width, rect.height);
            trace!("Object {} cropped to {rect:?}", object.id);
        }

        if self.crop_quirk && width == QUIRK_WIDTH && height == QUIRK_HEIGHT {
            let rect = Rect {
                x: width / 4,
                y: height / 2,
                width: width / 2,
                height: height / 2,
            };
            indices = crop_indices(&indices, width, rect);
            (width, height) = (rect.width, rect.height);
            x += rect.x;
            y += rect.y;
        }

        if width == 0 || height == 0 {
            debug!("Object {} cropped away", object.id);
            return Ok(());
        }

        let mut pixels = Vec::with_capacity(width * height * 4);
        for &index in &indices {
            pixels.extend_from_slice(&self.palette[index as usize].to_le_bytes());
        }

        let (video_width, video_height) = self
            .presentation
            .as_ref()
            .map_or((QUIRK_WIDTH, QUIRK_HEIGHT), |p| (p.video_width, p.video_height));

        let mut item = SubtitleItem::bitmap(width, height, pixels, record.pts)
            .with_origin(x as i32, y as i32)
            .with_video_size(video_width, video_height);
        item.immediate_present = composition.is_some_and(|c| c.forced);
        // the second header time is a decode stamp unless it lies after the pts
        if u64::from(record.aux) > record.pts.0 {
            item = item.with_end(Pts(u64::from(record.aux)));
        }

        debug!("PGS object {} {width}x{height} at ({x}, {y}), pts {}", object.id, record.pts);
        ctx.add_decoded_item(item)?;
        self.items_decoded += 1;
        ctx.notifier().on_dimension(video_width, video_height);
        Ok(())
    }
}

impl Decoder for PgsDecoder {
    fn subtitle_type(&self) -> SubtitleType {
        SubtitleType::Pgs
    }

    fn framing(&self) -> Framing {
        Framing::Sup
    }

    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
        let body = &record.payload[..];
        let kind = record.type_code as u8;

        match kind {
            SEGMENT_PRESENTATION => {
                let presentation = Presentation::parse(body)?;
                trace!(
                    "Presentation {} with {} objects",
                    presentation.composition_number,
                    presentation.objects.len()
                );
                self.presentation = Some(presentation);
            }
            SEGMENT_WINDOW => self.parse_window(body)?,
            SEGMENT_PALETTE => self.parse_palette(body)?,
            SEGMENT_OBJECT => {
                if let Some(object) = self.parse_object(body, ctx)? {
                    self.render_object(object, record, ctx)?;
                }
            }
            SEGMENT_END => {
                if self.presentation.as_ref().is_some_and(|p| p.objects.is_empty()) {
                    debug!("Display set at {} clears the screen", record.pts);
                }
            }
            other => debug!("Ignoring segment type {other:#04X}"),
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pending = None;
        self.presentation = None;
        self.windows.clear();
    }

    fn dump(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "  PGS: palette version {:?}, {} windows, {} items{}",
            self.palette_version,
            self.windows.len(),
            self.items_decoded,
            if self.pending.is_some() { ", object pending" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::parse::ParserConfig;
    use crate::process::queue::INTERNAL_MAX_NUMBER_SPU_ITEM;
    use std::sync::Arc;

    fn context() -> ParserContext {
        ParserContext::new(INTERNAL_MAX_NUMBER_SPU_ITEM, &ParserConfig::default())
    }

    fn segment(kind: u8, pts: u64, body: &[u8]) -> Record {
        Record {
            type_code: kind as u32,
            pts: Pts(pts),
            aux: 0,
            payload: Arc::from(body),
        }
    }

    /// Encodes rows with explicit-colour runs only.
    fn encode(indices: &[u8], width: usize) -> Vec<u8> {
        let mut out = vec![];
        for line in indices.chunks(width) {
            let mut x = 0;
            while x < line.len() {
                let colour = line[x];
                let run = line[x..].iter().take_while(|&&c| c == colour).count().min(0x3FFF);
                out.extend_from_slice(&[0x00, 0xC0 | (run >> 8) as u8, run as u8, colour]);
                x += run;
            }
            out.extend_from_slice(&[0x00, 0x00]);
        }
        out
    }

    fn presentation(width: u16, height: u16, x: u16, y: u16) -> Vec<u8> {
        let mut body = vec![];
        body.extend_from_slice(&width.to_be_bytes());
        body.extend_from_slice(&height.to_be_bytes());
        body.extend_from_slice(&[0x10, 0x00, 0x01, 0x80, 0x00, 0x00, 0x01]);
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        body.extend_from_slice(&x.to_be_bytes());
        body.extend_from_slice(&y.to_be_bytes());
        body
    }

    fn object_first(width: u16, height: u16, rle_len: usize, last: bool) -> Vec<u8> {
        let flags = FRAGMENT_FIRST | if last { FRAGMENT_LAST } else { 0 };
        let mut body = vec![0x00, 0x00, 0x00, flags];
        body.extend_from_slice(&((rle_len + 4) as u32).to_be_bytes()[1..]);
        body.extend_from_slice(&width.to_be_bytes());
        body.extend_from_slice(&height.to_be_bytes());
        body
    }

    #[test]
    fn palette_entries_convert_exactly() -> Result<()> {
        let ctx = context();
        let mut decoder = PgsDecoder::new(false);
        let body = [0x00, 0x00, 1, 81, 240, 90, 0xFF, 2, 235, 128, 128, 0x80];
        decoder.decode(&segment(SEGMENT_PALETTE, 0, &body), &ctx)?;

        assert_eq!(decoder.palette()[1], 0xFFFE_0000);
        assert_eq!(decoder.palette()[2], 0x80FF_FFFF);
        assert_eq!(decoder.palette()[3], 0);
        Ok(())
    }

    #[test]
    fn rle_codes() -> Result<()> {
        let data = [0x01, 0x00, 0x83, 0x02, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00];
        assert_eq!(decode_rle(&data, 4, 2)?, vec![1, 2, 2, 2, 0, 0, 0, 0]);

        let long = [0x00, 0xC1, 0x00, 0x05, 0x00, 0x00];
        let out = decode_rle(&long, 256, 1)?;
        assert!(out.iter().all(|&c| c == 5));

        let short_run = [0x00, 0x42, 0x00, 0x00, 0x00];
        assert_eq!(decode_rle(&short_run, 512, 1)?, vec![0; 512]);

        assert!(matches!(
            decode_rle(&[0x00, 0x85, 0x01], 4, 1),
            Err(PgsError::RleOverflow { .. })
        ));
        Ok(())
    }

    #[test]
    fn fragments_assemble_into_one_item() -> Result<()> {
        let ctx = context();
        let mut decoder = PgsDecoder::new(false);
        decoder.decode(&segment(SEGMENT_PALETTE, 0, &[0, 0, 1, 235, 128, 128, 0xFF]), &ctx)?;
        decoder.decode(
            &segment(SEGMENT_PRESENTATION, 90_000, &presentation(1920, 1080, 100, 900)),
            &ctx,
        )?;

        let indices: Vec<u8> = (0..24).map(|i| (i % 2) as u8).collect();
        let rle = encode(&indices, 6);
        let (head, tail) = rle.split_at(rle.len() / 2);

        let mut first = object_first(6, 4, rle.len(), false);
        first.extend_from_slice(head);
        decoder.decode(&segment(SEGMENT_OBJECT, 90_000, &first), &ctx)?;
        assert!(ctx.queue().is_empty());

        let mut last = vec![0x00, 0x00, 0x00, FRAGMENT_LAST];
        last.extend_from_slice(tail);
        decoder.decode(&segment(SEGMENT_OBJECT, 90_000, &last), &ctx)?;
        decoder.decode(&segment(SEGMENT_END, 90_000, &[]), &ctx)?;

        let item = ctx.queue().try_pop().unwrap();
        assert_eq!((item.x, item.y), (100, 900));
        assert_eq!((item.width, item.height), (6, 4));
        assert_eq!((item.video_width, item.video_height), (1920, 1080));
        assert_eq!(item.pts, Pts(90_000));
        assert_eq!(item.pixel(0, 0), Some(0));
        assert_eq!(item.pixel(1, 0), Some(0xFFFF_FFFF));
        assert!(ctx.queue().is_empty());
        Ok(())
    }

    #[test]
    fn orphan_fragment_is_dropped() -> Result<()> {
        let ctx = context();
        let mut decoder = PgsDecoder::new(false);
        let orphan = [0x00, 0x00, 0x00, FRAGMENT_LAST, 0x01, 0x00, 0x00];
        decoder.decode(&segment(SEGMENT_OBJECT, 0, &orphan), &ctx)?;
        assert!(ctx.queue().is_empty());

        let strict = ParserContext::new(
            INTERNAL_MAX_NUMBER_SPU_ITEM,
            &ParserConfig {
                fail_level: log::Level::Warn,
                ..Default::default()
            },
        );
        assert!(decoder.decode(&segment(SEGMENT_OBJECT, 0, &orphan), &strict).is_err());
        Ok(())
    }

    #[test]
    fn full_hd_quirk_keeps_lower_centre() -> Result<()> {
        let ctx = context();
        let mut decoder = PgsDecoder::new(true);
        decoder.decode(&segment(SEGMENT_PALETTE, 0, &[0, 0, 1, 235, 128, 128, 0xFF]), &ctx)?;
        decoder.decode(
            &segment(SEGMENT_PRESENTATION, 0, &presentation(1920, 1080, 0, 0)),
            &ctx,
        )?;

        let mut indices = vec![0u8; QUIRK_WIDTH * QUIRK_HEIGHT];
        indices[1000 * QUIRK_WIDTH + 960] = 1;
        let rle = encode(&indices, QUIRK_WIDTH);
        let mut body = object_first(1920, 1080, rle.len(), true);
        body.extend_from_slice(&rle);
        decoder.decode(&segment(SEGMENT_OBJECT, 0, &body), &ctx)?;

        let item = ctx.queue().try_pop().unwrap();
        assert_eq!((item.width, item.height), (960, 540));
        assert_eq!((item.x, item.y), (480, 540));
        assert_eq!(item.pixel(480, 460), Some(0xFFFF_FFFF));
        Ok(())
    }

    #[test]
    fn empty_object_rejected() {
        let ctx = context();
        let mut decoder = PgsDecoder::new(false);
        let body = object_first(0, 4, 0, true);
        assert!(decoder.decode(&segment(SEGMENT_OBJECT, 0, &body), &ctx).is_err());
    }

    #[test]
    fn oversized_object_rejected() -> Result<()> {
        let ctx = context();
        let mut decoder = PgsDecoder::new(false);
        decoder.decode(
            &segment(SEGMENT_PRESENTATION, 0, &presentation(720, 480, 0, 0)),
            &ctx,
        )?;

        let mut object = object_first(0xFFFF, 0xFFFF, 2, true);
        object.extend_from_slice(&[0x00, 0x00]);
        let err = decoder.decode(&segment(SEGMENT_OBJECT, 0, &object), &ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PgsError>(),
            Some(PgsError::ObjectTooLarge { max_width: 720, max_height: 480, .. })
        ));
        assert!(ctx.queue().is_empty());

        assert!(matches!(
            decode_rle(&[], MAX_OBJECT_SIZE + 1, 1),
            Err(PgsError::ObjectTooLarge { .. })
        ));
        Ok(())
    }

    #[test]
    fn header_end_time_sets_item_end() -> Result<()> {
        let ctx = context();
        let mut decoder = PgsDecoder::new(false);
        decoder.decode(&segment(SEGMENT_PALETTE, 0, &[0, 0, 1, 235, 128, 128, 0xFF]), &ctx)?;

        let rle = encode(&[1, 1], 2);
        let mut object = object_first(2, 1, rle.len(), true);
        object.extend_from_slice(&rle);

        let mut timed = segment(SEGMENT_OBJECT, 90_000, &object);
        timed.aux = 180_000;
        decoder.decode(&timed, &ctx)?;
        assert_eq!(ctx.queue().try_pop().unwrap().end, Some(Pts(180_000)));

        // a decode stamp ahead of the pts is not an end time
        timed.aux = 89_000;
        decoder.decode(&timed, &ctx)?;
        assert_eq!(ctx.queue().try_pop().unwrap().end, None);
        Ok(())
    }
}
