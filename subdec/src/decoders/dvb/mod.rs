pub mod clut;
pub mod page;
pub mod pixel;

use std::fmt::Write as _;

use anyhow::{Result, bail};
use log::Level::Warn;
use log::{debug, info, trace};

use crate::decoders::dvb::clut::Clut;
use crate::decoders::dvb::page::{DisplayDefinition, ObjectPlacement, PageGraph, RegionDisplay};
use crate::log_or_err;
use crate::process::RECORD_TYPE_DVB;
use crate::process::extract::{Framing, Record};
use crate::process::parse::{Decoder, ParserContext};
use crate::structs::item::SubtitleItem;
use crate::structs::params::{DvbParam, ParserParameter, SubtitleType};
use crate::structs::timestamp::Pts;
use crate::utils::bitstream_io::ByteCursor;
use crate::utils::errors::DvbError;

pub const SEGMENT_SYNC_BYTE: u8 = 0x0F;
pub const SEGMENT_HEADER_LEN: usize = 6;

pub const PAGE_SEGMENT: u8 = 0x10;
pub const REGION_SEGMENT: u8 = 0x11;
pub const CLUT_SEGMENT: u8 = 0x12;
pub const OBJECT_SEGMENT: u8 = 0x13;
pub const DISPLAY_DEFINITION_SEGMENT: u8 = 0x14;
pub const END_OF_DISPLAY_SEGMENT: u8 = 0x80;

/// Page time-outs at or above this are treated as bogus.
const TIMEOUT_LONG_DURATION: u8 = 30;
const TIMEOUT_ADJUSTED: u8 = 5;

/// Data identifier and stream id preceding the segments of a PES payload.
const PES_DATA_HEADER_LEN: usize = 2;

/// DVB subtitle decoder.
///
/// Segments update the page graph in place; an end-of-display-set segment
/// composes the displayed regions into one item. A malformed segment is
/// skipped; a broken segment header aborts the whole record.
#[derive(Debug)]
pub struct DvbDecoder {
    param: DvbParam,
    page: PageGraph,
    default_clut: Clut,
    items_decoded: usize,
}

impl DvbDecoder {
    pub fn new(param: DvbParam) -> Self {
        Self {
            param,
            page: PageGraph::default(),
            default_clut: Clut::default_table(),
            items_decoded: 0,
        }
    }

    fn accepts_page(&self, page_id: u16) -> bool {
        match (self.param.composition_id, self.param.ancillary_id) {
            (Some(composition), Some(ancillary)) => page_id == composition || page_id == ancillary,
            _ => true,
        }
    }

    /// Walks the segments of one PES payload and returns the number of
    /// bytes consumed. An item composed by an end-of-display segment is
    /// queued after the last segment.
    pub fn decode_subtitle(&mut self, data: &[u8], pts: Pts, ctx: &ParserContext) -> Result<usize> {
        if data.len() <= SEGMENT_HEADER_LEN || data[0] != SEGMENT_SYNC_BYTE {
            bail!(DvbError::StreamMarker(data.first().copied().unwrap_or(0)));
        }

        let mut cursor = ByteCursor::new(data);
        let mut composed = None;

        while cursor.remaining() >= SEGMENT_HEADER_LEN && cursor.rest()[0] == SEGMENT_SYNC_BYTE {
            if ctx.is_stopped() {
                bail!(crate::utils::errors::ParserError::NotRunning);
            }

            cursor.skip(1)?;
            let segment_type = cursor.u8()?;
            let page_id = cursor.be16()?;
            let length = cursor.be16()? as usize;
            if length > cursor.remaining() {
                bail!(DvbError::SegmentTooLong {
                    length,
                    remaining: cursor.remaining(),
                });
            }
            let body = cursor.take(length)?;

            if !self.accepts_page(page_id) {
                trace!("Skipping segment {segment_type:#04X} of page {page_id}");
                continue;
            }

            debug!("Segment {segment_type:#04X}, page {page_id}, {length} bytes");
            let parsed = match segment_type {
                PAGE_SEGMENT => self.parse_page(body),
                REGION_SEGMENT => self.parse_region(body, ctx),
                CLUT_SEGMENT => self.parse_clut(body),
                OBJECT_SEGMENT => self.parse_object(body, ctx),
                DISPLAY_DEFINITION_SEGMENT => self.parse_display_definition(body, ctx),
                END_OF_DISPLAY_SEGMENT => self.end_of_display(pts).map(|item| composed = item),
                other => {
                    debug!("Unhandled segment type {other:#04X}");
                    Ok(())
                }
            };
            // a malformed segment is dropped, the rest of the page still decodes
            if let Err(e) = parsed {
                log_or_err!(
                    ctx,
                    Warn,
                    DvbError::Segment {
                        segment: segment_type,
                        reason: format!("{e:#}"),
                    }
                );
            }
        }

        if let Some(item) = composed {
            let (width, height) = (item.video_width, item.video_height);
            ctx.add_decoded_item(item)?;
            self.items_decoded += 1;
            ctx.notifier().on_dimension(width, height);
        }

        Ok(cursor.position())
    }

    fn parse_page(&mut self, body: &[u8]) -> Result<()> {
        if body.is_empty() {
            return Ok(());
        }

        let mut cursor = ByteCursor::new(body);
        let mut timeout = cursor.u8()?;
        if timeout >= TIMEOUT_LONG_DURATION {
            timeout = TIMEOUT_ADJUSTED;
        }
        self.page.timeout = timeout;

        let state = (cursor.u8()? >> 2) & 3;
        debug!("Page time-out {timeout}s, state {state}");
        // acquisition point or mode change
        if state == 1 || state == 2 {
            self.page.clear_content();
        }

        let mut displays = Vec::new();
        while cursor.remaining() > 5 {
            let region_id = cursor.u8()?;
            cursor.skip(1)?;
            let x = cursor.be16()? as usize;
            let y = cursor.be16()? as usize;
            trace!("Region {region_id} at ({x}, {y})");
            displays.push(RegionDisplay { region_id, x, y });
        }
        self.page.displays = displays;
        Ok(())
    }

    fn parse_region(&mut self, body: &[u8], ctx: &ParserContext) -> Result<()> {
        if body.len() < 10 {
            log_or_err!(ctx, Warn, DvbError::RegionTooShort(body.len()));
            return Ok(());
        }

        let mut cursor = ByteCursor::new(body);
        let region_id = cursor.u8()?;
        let mut fill = (cursor.u8()? >> 3) & 1 == 1;
        let width = cursor.be16()? as usize;
        let height = cursor.be16()? as usize;
        if width > page::MAX_REGION_WIDTH || height > page::MAX_REGION_HEIGHT {
            log_or_err!(
                ctx,
                Warn,
                DvbError::RegionTooLarge {
                    id: region_id,
                    width,
                    height,
                }
            );
            return Ok(());
        }
        let depth_code = cursor.u8()?;
        let clut = cursor.u8()?;
        let depth = match 1u32 << ((depth_code >> 2) & 7) {
            d @ (2 | 4 | 8) => d as u8,
            other => {
                debug!("Region {region_id} depth {other} is invalid");
                4
            }
        };
        let background = if depth == 8 {
            let code = cursor.u8()?;
            cursor.skip(1)?;
            code
        } else {
            cursor.skip(1)?;
            let code = cursor.u8()?;
            if depth == 4 { code >> 4 } else { (code >> 2) & 3 }
        };

        let region = self
            .page
            .regions
            .entry(region_id)
            .or_insert_with(|| page::Region::new(region_id));
        if region.resize(width, height) {
            fill = true;
        }
        region.depth = depth;
        region.clut = clut;
        region.background = background;
        debug!("Region {region_id}: {width}x{height}, {depth}-bit, CLUT {clut}");
        if fill {
            region.pixels.fill(background);
        }

        self.page.delete_region_display_list(region_id);
        while cursor.remaining() > 5 {
            let object_id = cursor.be16()?;
            let word = cursor.be16()?;
            let kind = (word >> 14) as u8;
            let x = (word & 0xFFF) as usize;
            let y = (cursor.be16()? & 0xFFF) as usize;
            let (foreground, background) = if (kind == 1 || kind == 2) && cursor.remaining() > 1 {
                (cursor.u8()?, cursor.u8()?)
            } else {
                (0, 0)
            };
            self.page.place_object(
                object_id,
                kind,
                ObjectPlacement {
                    region_id,
                    x,
                    y,
                    foreground,
                    background,
                },
            );
        }
        Ok(())
    }

    fn parse_clut(&mut self, body: &[u8]) -> Result<()> {
        let mut cursor = ByteCursor::new(body);
        let id = cursor.u8()?;
        let version = cursor.u8()? >> 4;

        let default_clut = &self.default_clut;
        let clut = self.page.cluts.entry(id).or_insert_with(|| Clut {
            id,
            ..default_clut.clone()
        });
        clut.version = version;
        clut.apply_entries(&mut cursor)
    }

    fn parse_object(&mut self, body: &[u8], ctx: &ParserContext) -> Result<()> {
        let mut cursor = ByteCursor::new(body);
        let object_id = cursor.be16()?;
        let Some(object) = self.page.objects.get(&object_id) else {
            debug!("Object {object_id} is not placed in any region");
            return Ok(());
        };
        let placements = object.placements.clone();

        let flags = cursor.u8()?;
        let coding = (flags >> 2) & 3;
        let non_modifying = (flags >> 1) & 1 == 1;
        if coding != 0 {
            log_or_err!(ctx, Warn, DvbError::ObjectCoding(coding));
            return Ok(());
        }

        let top_len = cursor.be16()? as usize;
        let bottom_len = cursor.be16()? as usize;
        if top_len + bottom_len > cursor.remaining() {
            log_or_err!(
                ctx,
                Warn,
                DvbError::ObjectFieldsTooLong {
                    top: top_len,
                    bottom: bottom_len,
                    available: cursor.remaining(),
                }
            );
            return Ok(());
        }
        let top = cursor.take(top_len)?;
        // no bottom field: the top field data is used for both
        let bottom = if bottom_len > 0 {
            cursor.take(bottom_len)?
        } else {
            top
        };

        for placement in &placements {
            let Some(region) = self.page.regions.get_mut(&placement.region_id) else {
                continue;
            };
            for (field, block) in [(0, top), (1, bottom)] {
                if let Err(e) = region.decode_pixel_block(placement, block, field, non_modifying) {
                    log_or_err!(ctx, Warn, e);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn parse_display_definition(&mut self, body: &[u8], ctx: &ParserContext) -> Result<()> {
        if body.len() < 5 {
            log_or_err!(ctx, Warn, DvbError::DisplayDefinitionTooShort(body.len()));
            return Ok(());
        }

        let mut cursor = ByteCursor::new(body);
        let info = cursor.u8()?;
        let version = info >> 4;
        match self.page.display_definition {
            Some(def) if def.version == version => return Ok(()),
            Some(def) => {
                info!("Display definition version {} -> {version}", def.version);
                self.page.clear_content();
            }
            None => {}
        }

        let mut def = DisplayDefinition {
            version,
            x: 0,
            y: 0,
            width: cursor.be16()? as usize + 1,
            height: cursor.be16()? as usize + 1,
        };
        // display window
        if info & 0x08 != 0 && body.len() >= 13 {
            def.x = cursor.be16()? as usize;
            def.y = cursor.be16()? as usize;
            def.width = (cursor.be16()? as usize + 1).saturating_sub(def.x);
            def.height = (cursor.be16()? as usize + 1).saturating_sub(def.y);
        }
        debug!("Display definition {}x{} at ({}, {})", def.width, def.height, def.x, def.y);
        self.page.display_definition = Some(def);
        Ok(())
    }

    fn end_of_display(&mut self, pts: Pts) -> Result<Option<SubtitleItem>> {
        let end = pts.saturating_add(self.page.timeout as u64 * 1000 * 90);
        let Some(composed) = self.page.compose(&self.default_clut)? else {
            debug!("End of display set at {pts} with nothing to show");
            return Ok(None);
        };

        debug!(
            "Composed {}x{} at ({}, {}), shown until {end}",
            composed.width, composed.height, composed.x, composed.y
        );
        Ok(Some(
            SubtitleItem::bitmap(composed.width, composed.height, composed.pixels, pts)
                .with_origin(composed.x as i32, composed.y as i32)
                .with_end(end)
                .with_video_size(composed.display_width, composed.display_height),
        ))
    }
}

impl Decoder for DvbDecoder {
    fn subtitle_type(&self) -> SubtitleType {
        SubtitleType::Dvb
    }

    fn framing(&self) -> Framing {
        Framing::Record
    }

    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
        let data = if record.is_pes() {
            if record.pts.0 == 0 {
                debug!("Dropping PES packet without PTS");
                return Ok(());
            }
            record.payload.get(PES_DATA_HEADER_LEN..).unwrap_or_default()
        } else if record.type_code == RECORD_TYPE_DVB {
            &record.payload[..]
        } else {
            debug!("Ignoring record type {:#07X}", record.type_code);
            return Ok(());
        };

        self.decode_subtitle(data, record.pts, ctx).map(|_| ())
    }

    fn update_parameter(&mut self, param: &ParserParameter, _ctx: &ParserContext) -> Result<()> {
        if let ParserParameter::Dvb(param) = param {
            info!(
                "DVB page filter: composition {:?}, ancillary {:?}",
                param.composition_id, param.ancillary_id
            );
            self.param = *param;
            self.page.clear();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.page.clear();
    }

    fn dump(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "  DVB: {} regions, {} objects, {} CLUTs, {} displayed, {} items",
            self.page.regions.len(),
            self.page.objects.len(),
            self.page.cluts.len(),
            self.page.displays.len(),
            self.items_decoded
        );
        for region in self.page.regions.values() {
            let _ = writeln!(
                out,
                "    region {}: {}x{} {}-bit CLUT {}",
                region.id, region.width, region.height, region.depth, region.clut
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{EXAMPLE_DATA, RECORD_HEADER_LEN};
    use crate::process::extract::Extractor;
    use crate::process::parse::ParserConfig;
    use crate::process::queue::INTERNAL_MAX_NUMBER_SPU_ITEM;

    fn context() -> ParserContext {
        ParserContext::new(INTERNAL_MAX_NUMBER_SPU_ITEM, &ParserConfig::default())
    }

    fn segment(kind: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![SEGMENT_SYNC_BYTE, kind, 0x00, 0x01];
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn region_segment(id: u8, width: u16, height: u16, depth_code: u8, clut: u8) -> Vec<u8> {
        let mut body = vec![id, 0x08];
        body.extend_from_slice(&width.to_be_bytes());
        body.extend_from_slice(&height.to_be_bytes());
        body.extend_from_slice(&[depth_code << 2, clut, 0x00, 0x00]);
        // object 0 at (0, 0)
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        segment(REGION_SEGMENT, &body)
    }

    #[test]
    fn example_page_end_to_end() -> Result<()> {
        let ctx = context();
        let mut extractor = Extractor::new(Framing::Record);
        extractor.push_bytes(EXAMPLE_DATA);
        let record = extractor.next().unwrap()?;

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode(&record, &ctx)?;

        let item = ctx.queue().try_pop().unwrap();
        assert!(ctx.queue().try_pop().is_none());
        assert_eq!((item.width, item.height), (2, 2));
        assert_eq!(item.pixel(0, 0), Some(0xFFFF_FFFF));
        assert_eq!(item.pixel(1, 0), Some(0xFF00_0000));
        assert_eq!(item.pixel(0, 1), Some(0xFF00_0000));
        assert_eq!(item.pixel(1, 1), Some(0xFFFF_FFFF));
        assert_eq!(item.pts, Pts(90_000));
        assert_eq!(item.end, Some(Pts(90_000 + 5 * 90_000)));
        assert_eq!((item.video_width, item.video_height), (720, 576));
        Ok(())
    }

    #[test]
    fn truncated_segment_is_rejected() {
        let ctx = context();
        // the complete example page, then a segment declaring 32 bytes
        let mut data = EXAMPLE_DATA[RECORD_HEADER_LEN + 4..].to_vec();
        data.extend_from_slice(&[SEGMENT_SYNC_BYTE, REGION_SEGMENT, 0x00, 0x01, 0x00, 0x20, 0x00]);

        let mut decoder = DvbDecoder::new(DvbParam::default());
        let result = decoder.decode_subtitle(&data, Pts(0), &ctx);
        assert!(result.is_err());
        assert!(ctx.queue().is_empty());
    }

    #[test]
    fn broken_stream_marker() {
        let ctx = context();
        let mut decoder = DvbDecoder::new(DvbParam::default());
        assert!(decoder.decode_subtitle(&[0x20, 0, 0, 0, 0, 0, 0], Pts(0), &ctx).is_err());
        assert!(decoder.decode_subtitle(&[0x0F, 0x80], Pts(0), &ctx).is_err());
    }

    #[test]
    fn two_bit_object_string() -> Result<()> {
        let ctx = context();
        let mut data = region_segment(0, 4, 2, 1, 0);
        let object = [0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x10, 0x55, 0x00, 0xF0];
        data.extend_from_slice(&segment(OBJECT_SEGMENT, &object));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        // both fields share the top field data
        assert_eq!(decoder.page.regions[&0].pixels, vec![1; 8]);
        Ok(())
    }

    #[test]
    fn depth_8_clut_mapping() -> Result<()> {
        let ctx = context();
        let mut data = segment(PAGE_SEGMENT, &[0x05, 0x08, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&region_segment(0, 4, 2, 3, 7));
        // CLUT 7: entry 200 full-range white, 8-bit table only
        data.extend_from_slice(&segment(
            CLUT_SEGMENT,
            &[0x07, 0x00, 200, 0x21, 0xEB, 0x80, 0x80, 0x00],
        ));
        // 8-bit string: 200, 3, 3, 3 then end
        let object = [0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x12, 200, 0x00, 0x83, 0x03, 0x00, 0x00, 0xF0];
        data.extend_from_slice(&segment(OBJECT_SEGMENT, &object));
        data.extend_from_slice(&segment(END_OF_DISPLAY_SEGMENT, &[]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        let item = ctx.queue().try_pop().unwrap();

        let clut = decoder.page.cluts[&7].clone();
        assert_eq!(item.pixel(0, 0), Some(0xFFFF_FFFF));
        for x in 1..4 {
            assert_eq!(item.pixel(x, 0), Some(clut.clut256[3]));
        }
        assert_eq!(clut.clut256[3], Clut::default_table().clut256[3]);
        Ok(())
    }

    #[test]
    fn region_reallocated_on_size_change() -> Result<()> {
        let ctx = context();
        let mut decoder = DvbDecoder::new(DvbParam::default());

        decoder.decode_subtitle(&region_segment(3, 2, 2, 2, 0), Pts(0), &ctx)?;
        assert_eq!(decoder.page.regions[&3].pixels.len(), 4);

        decoder.decode_subtitle(&region_segment(3, 5, 3, 2, 0), Pts(0), &ctx)?;
        let region = &decoder.page.regions[&3];
        assert_eq!(region.pixels.len(), 15);
        assert_eq!((region.width, region.height), (5, 3));
        Ok(())
    }

    #[test]
    fn page_filter_skips_other_pages() -> Result<()> {
        let ctx = context();
        let mut decoder = DvbDecoder::new(DvbParam {
            composition_id: Some(2),
            ancillary_id: Some(3),
        });
        // region segments carry page id 1
        decoder.decode_subtitle(&region_segment(0, 2, 2, 1, 0), Pts(0), &ctx)?;
        assert!(decoder.page.regions.is_empty());
        Ok(())
    }

    #[test]
    fn stacked_regions_do_not_overlap() -> Result<()> {
        let ctx = context();
        let mut data = segment(
            PAGE_SEGMENT,
            &[0x05, 0x08, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x0A, 0x01, 0xFF, 0x00, 0x00, 0x00, 0x08],
        );
        data.extend_from_slice(&region_segment(0, 2, 4, 1, 0));
        data.extend_from_slice(&region_segment(1, 2, 4, 1, 0));
        data.extend_from_slice(&segment(END_OF_DISPLAY_SEGMENT, &[]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!((item.y, item.height), (6, 8));
        Ok(())
    }

    /// Example page segments with `extra` inserted before end of display.
    fn example_page_with(extra: &[u8]) -> Vec<u8> {
        let segments = &EXAMPLE_DATA[RECORD_HEADER_LEN + 4..];
        let (page, end) = segments.split_at(segments.len() - SEGMENT_HEADER_LEN);
        [page, extra, end].concat()
    }

    #[test]
    fn malformed_clut_keeps_page() -> Result<()> {
        let ctx = context();
        // CLUT 5: full-range entry missing its transparency byte
        let data = example_page_with(&segment(CLUT_SEGMENT, &[0x05, 0x00, 0x03, 0x81, 0xEB, 0x80, 0x80]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!((item.width, item.height), (2, 2));
        assert_eq!(item.pixel(0, 0), Some(0xFFFF_FFFF));
        assert!(ctx.queue().is_empty());
        Ok(())
    }

    #[test]
    fn malformed_object_keeps_page() -> Result<()> {
        let ctx = context();
        // object 0 is placed by region 0 but the segment stops after its id
        let data = example_page_with(&segment(OBJECT_SEGMENT, &[0x00, 0x00]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!(item.pixel(1, 0), Some(0xFF00_0000));
        assert!(ctx.queue().is_empty());
        Ok(())
    }

    #[test]
    fn strict_mode_aborts_on_malformed_segment() {
        let config = ParserConfig {
            fail_level: log::Level::Warn,
            ..Default::default()
        };
        let ctx = ParserContext::new(INTERNAL_MAX_NUMBER_SPU_ITEM, &config);
        let data = example_page_with(&segment(OBJECT_SEGMENT, &[0x00, 0x00]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        assert!(decoder.decode_subtitle(&data, Pts(0), &ctx).is_err());
        assert!(ctx.queue().is_empty());
    }

    #[test]
    fn oversized_region_rejected_before_allocation() -> Result<()> {
        let ctx = context();
        let mut data = segment(PAGE_SEGMENT, &[0x05, 0x08, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&region_segment(0, 0xFFFF, 2, 1, 0));
        data.extend_from_slice(&segment(END_OF_DISPLAY_SEGMENT, &[]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        assert!(decoder.page.regions.is_empty());
        assert!(ctx.queue().is_empty());
        Ok(())
    }

    #[test]
    fn oversized_page_rejected_before_allocation() -> Result<()> {
        let ctx = context();
        // region 0 at (0, 0), region 1 at (60000, 60000)
        let mut data = segment(
            PAGE_SEGMENT,
            &[0x05, 0x08, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xEA, 0x60, 0xEA, 0x60],
        );
        data.extend_from_slice(&region_segment(0, 1, 1, 1, 0));
        data.extend_from_slice(&region_segment(1, 1, 1, 1, 0));
        data.extend_from_slice(&segment(END_OF_DISPLAY_SEGMENT, &[]));

        let mut decoder = DvbDecoder::new(DvbParam::default());
        decoder.decode_subtitle(&data, Pts(0), &ctx)?;
        assert!(ctx.queue().is_empty());

        let err = decoder.page.compose(&Clut::default_table()).unwrap_err();
        assert!(matches!(err, DvbError::PageTooLarge { width: 60001, height: 60001 }));
        Ok(())
    }
}
