pub mod font;
pub mod navigation;
pub mod render;
pub mod vbi;

use std::collections::VecDeque;
use std::fmt::Write as _;

use anyhow::Result;
use log::{debug, info, trace};

use crate::decoders::teletext::navigation::{
    DisplayMode, HeightMode, NavAction, Navigator, PageRef, PageState,
};
use crate::decoders::teletext::render::{
    BAR_HEIGHT, CANVAS_HEIGHT, CANVAS_ROWS, CANVAS_WIDTH, CELL_HEIGHT, CELL_WIDTH, Canvas,
    FormattedPage, HEAD_HEIGHT, TEXT_HEIGHT, TRANSPARENT_BLACK, Transparency, draw_rows,
    fix_transparency, format_page, palette,
};
use crate::decoders::teletext::vbi::{ANY_SUBPAGE, PacketDecoder, ROWS, RawPage, VbiEvent};
use crate::process::RECORD_TYPE_TELETEXT;
use crate::process::extract::{Framing, Record};
use crate::process::parse::{Decoder, ParserContext};
use crate::structs::item::SubtitleItem;
use crate::structs::params::{ParserParameter, SubtitleType, TeletextLoadState};
use crate::structs::timestamp::Pts;
use crate::utils::errors::TeletextError;

/// Rendered pages waiting for the queue.
pub const MAX_BUFFERED_PAGES: usize = 25;

/// Page types of engineering test pages, never shown.
const WARNING_PAGE_TYPES: [u32; 3] = [0x54_8080, 0x54_8000, 0xB1_8081];

/// Header columns holding the clock.
const CLOCK_COLUMNS: std::ops::Range<usize> = 32..40;

/// Zoomed views show half the canvas.
const ZOOM_LINES: usize = CANVAS_HEIGHT / 2;
const ZOOM_STEP: usize = 2 * CELL_HEIGHT;

/// DVB teletext decoder.
///
/// Packets are assembled into a raw page cache; the page handler decides
/// from the navigation state which completed pages are rendered. Subtitle
/// pages become cropped bitmaps (or text), graphics pages full 480x260
/// frames. Navigation commands arrive through
/// [`update_parameter`](Decoder::update_parameter), serialized with
/// decoding by the parser's decoder lock.
#[derive(Debug)]
pub struct TeletextDecoder {
    text_mode: bool,
    packets: PacketDecoder,
    nav: Navigator,
    rendered: VecDeque<SubtitleItem>,
    /// Text area and navigation bar of the last graphics page shown.
    saved_text: Option<Canvas>,
    saved_bar: Option<Canvas>,
    /// Header of the last page received, shown while searching.
    last_header: Option<FormattedPage>,
    clock: Option<[u8; 8]>,
    last_pts: Pts,
    pages_shown: usize,
    items_decoded: usize,
}

impl TeletextDecoder {
    pub fn new(text_mode: bool) -> Self {
        Self {
            text_mode,
            packets: PacketDecoder::new(),
            nav: Navigator::new(),
            rendered: VecDeque::new(),
            saved_text: None,
            saved_bar: None,
            last_header: None,
            clock: None,
            last_pts: Pts(0),
            pages_shown: 0,
            items_decoded: 0,
        }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.nav
    }

    pub fn packets(&self) -> &PacketDecoder {
        &self.packets
    }

    fn buffer(&mut self, item: SubtitleItem) {
        if self.rendered.len() == MAX_BUFFERED_PAGES {
            debug!("Rendered page buffer full, dropping oldest");
            self.rendered.pop_front();
        }
        self.rendered.push_back(item);
    }

    fn drain(&mut self, ctx: &ParserContext) -> Result<()> {
        while let Some(item) = self.rendered.pop_front() {
            ctx.add_decoded_item(item)?;
            self.items_decoded += 1;
        }
        Ok(())
    }

    fn transparency(&self) -> Transparency {
        Transparency {
            opacity: self.nav.opacity,
            transparent_background: self.nav.transparent_background,
        }
    }

    fn item(&self, width: usize, height: usize, pixels: Vec<u8>, y: usize) -> SubtitleItem {
        let mut item = SubtitleItem::bitmap(width, height, pixels, self.last_pts)
            .with_origin(0, y as i32)
            .with_video_size(CANVAS_WIDTH, CANVAS_HEIGHT);
        item.immediate_present = true;
        item.keep_showing = true;
        item
    }

    fn render_subtitle(&self, page: &FormattedPage) -> Option<SubtitleItem> {
        let content = page.content_rows();

        if self.text_mode {
            let (first, last) = content?;
            let mut item = SubtitleItem::text(page.text(first..last + 1), self.last_pts);
            item.immediate_present = true;
            item.keep_showing = true;
            return Some(item);
        }

        // an empty page clears the screen with one transparent row
        let (first, last) = content.unwrap_or((1, 1));
        let mut canvas = draw_rows(page, first..last + 1);
        if content.is_none() {
            canvas.indices.fill(TRANSPARENT_BLACK);
        } else {
            fix_transparency(&mut canvas, page, first, self.transparency());
        }
        let pixels = canvas.to_pixels(&palette(self.nav.opacity));
        Some(self.item(canvas.width, canvas.height, pixels, first * CELL_HEIGHT))
    }

    fn with_clock(&self, mut page: FormattedPage) -> FormattedPage {
        if let Some(clock) = self.clock {
            for (cell, c) in page.rows[0][CLOCK_COLUMNS].iter_mut().zip(clock) {
                cell.code = c;
            }
        }
        page
    }

    fn clear_lines(canvas: &mut Canvas, lines: std::ops::Range<usize>) {
        let width = canvas.width;
        canvas.indices[lines.start * width..lines.end * width].fill(TRANSPARENT_BLACK);
    }

    fn render_graphics(&mut self, page: &FormattedPage) -> Option<SubtitleItem> {
        if self.text_mode {
            let text = page.text(0..CANVAS_ROWS);
            let mut item = SubtitleItem::text(text, self.last_pts);
            item.immediate_present = true;
            item.keep_showing = true;
            return (!item.payload.is_empty()).then_some(item);
        }

        let mut canvas = draw_rows(page, 0..CANVAS_ROWS);
        fix_transparency(&mut canvas, page, 0, self.transparency());

        let mut text = Canvas::new(CANVAS_WIDTH, TEXT_HEIGHT, TRANSPARENT_BLACK);
        text.copy_lines(&canvas, HEAD_HEIGHT, 0, TEXT_HEIGHT);
        let mut bar = Canvas::new(CANVAS_WIDTH, BAR_HEIGHT, TRANSPARENT_BLACK);
        bar.copy_lines(&canvas, HEAD_HEIGHT + TEXT_HEIGHT, 0, BAR_HEIGHT);
        self.saved_text = Some(text);
        self.saved_bar = Some(bar);

        match self.nav.display_mode {
            DisplayMode::Normal => {}
            DisplayMode::Clear => Self::clear_lines(&mut canvas, HEAD_HEIGHT..CANVAS_HEIGHT),
            DisplayMode::Clock => {
                Self::clear_lines(&mut canvas, HEAD_HEIGHT..CANVAS_HEIGHT);
                for y in 0..HEAD_HEIGHT {
                    let line = &mut canvas.indices[y * CANVAS_WIDTH..(y + 1) * CANVAS_WIDTH];
                    line[..CLOCK_COLUMNS.start * CELL_WIDTH].fill(TRANSPARENT_BLACK);
                }
            }
        }

        if self.nav.height_mode != HeightMode::Normal {
            let first = (self.nav.height_index * ZOOM_STEP).min(CANVAS_HEIGHT - ZOOM_LINES);
            canvas = canvas.zoom(first, ZOOM_LINES);
        }

        let pixels = canvas.to_pixels(&palette(self.nav.opacity));
        Some(self.item(canvas.width, canvas.height, pixels, 0))
    }

    /// Header of the page being received over the saved text and bar.
    fn render_transient(&self, label: Option<String>) -> Option<SubtitleItem> {
        if self.text_mode {
            return None;
        }
        let mut header = self.last_header.clone()?;
        if let Some(label) = label {
            for (cell, c) in header.rows[0][1..].iter_mut().zip(label.bytes()) {
                cell.code = c;
            }
        }

        let mut canvas = draw_rows(&header, 0..CANVAS_ROWS);
        fix_transparency(&mut canvas, &header, 0, self.transparency());
        Self::clear_lines(&mut canvas, HEAD_HEIGHT..CANVAS_HEIGHT);
        if self.nav.state == PageState::Input {
            if let Some(text) = &self.saved_text {
                canvas.copy_lines(text, 0, HEAD_HEIGHT, TEXT_HEIGHT);
            }
        }
        if let Some(bar) = &self.saved_bar {
            canvas.copy_lines(bar, 0, HEAD_HEIGHT + TEXT_HEIGHT, BAR_HEIGHT);
        }

        let pixels = canvas.to_pixels(&palette(self.nav.opacity));
        Some(self.item(canvas.width, canvas.height, pixels, 0))
    }

    /// Renders `raw` and makes it the displayed page.
    fn show(&mut self, raw: &RawPage) {
        self.nav.displayed(
            PageRef {
                page: raw.page,
                subpage: raw.subpage,
            },
            raw.links,
        );
        let page = self.with_clock(format_page(raw));

        let item = if raw.is_subtitle() {
            // subtitle pages keep only the rows with content
            self.render_subtitle(&page)
        } else {
            self.render_graphics(&page)
        };
        match item {
            Some(item) => {
                trace!("Rendered page {:03X}/{:04X}: {item}", raw.page, raw.subpage);
                self.pages_shown += 1;
                self.buffer(item);
            }
            None => debug!("Page {:03X} has nothing to show", raw.page),
        }
    }

    fn found(&mut self, ctx: &ParserContext) {
        if self.nav.state != PageState::Display {
            self.nav.state = PageState::Display;
            ctx.notifier().on_teletext_load_state(TeletextLoadState::Found);
        }
    }

    /// Shows `target` from the cache, or starts waiting for it.
    fn fetch(&mut self, target: PageRef, ctx: &ParserContext) {
        let cached = self.packets.cache().get(target.page, target.subpage).cloned();
        match cached {
            Some(raw) if !self.nav.subtitle_mode || raw.is_subtitle() => {
                self.found(ctx);
                self.show(&raw);
            }
            _ => {
                debug!("Waiting for page {:03X}", target.page);
                self.nav.state = PageState::Search;
                ctx.notifier().on_teletext_load_state(TeletextLoadState::Searching);
                if let Some(item) = self.render_transient(None) {
                    self.buffer(item);
                }
            }
        }
    }

    fn redraw(&mut self, ctx: &ParserContext) {
        if self.nav.state == PageState::Input {
            if let Some(item) = self.render_transient(Some(self.nav.input_label())) {
                self.buffer(item);
            }
            return;
        }
        let current = self.nav.current;
        if self.packets.cache().get(current.page, current.subpage).is_some() {
            self.fetch(current, ctx);
        }
    }

    fn on_page(&mut self, page: u16, subpage: u16, ctx: &ParserContext) {
        let Some(raw) = self.packets.cache().get(page, subpage).cloned() else {
            return;
        };
        if WARNING_PAGE_TYPES.contains(&raw.page_type()) {
            debug!("Dropping warning page {page:03X}");
            return;
        }
        let target = PageRef { page, subpage };

        if self.nav.subtitle_mode {
            if raw.is_subtitle() && page == self.nav.goto_page {
                self.found(ctx);
                self.show(&raw);
            }
            return;
        }
        if raw.is_subtitle() {
            return;
        }

        self.last_header = Some(format_page(&raw));
        match self.nav.state {
            PageState::Search | PageState::Input if page == self.nav.goto_page => {
                self.found(ctx);
                self.show(&raw);
            }
            PageState::Search => {
                if let Some(item) = self.render_transient(None) {
                    self.buffer(item);
                }
            }
            PageState::Input => {}
            PageState::Display => {
                if self.nav.disp_update && self.nav.accepts(target) {
                    self.show(&raw);
                }
            }
        }
    }

    fn on_time(&mut self, clock: [u8; 8], ctx: &ParserContext) {
        self.clock = Some(clock);
        if !self.nav.subtitle_mode && self.nav.disp_update && self.nav.state == PageState::Display {
            let current = self.nav.current;
            self.fetch(current, ctx);
        }
    }

    /// Decodes one PES payload.
    pub fn decode_payload(&mut self, payload: &[u8], ctx: &ParserContext) -> Result<()> {
        let lines = vbi::slice_lines(payload)?;
        trace!("{} teletext lines", lines.len());

        for event in self.packets.decode(&lines) {
            match event {
                VbiEvent::Page { page, subpage } => self.on_page(page, subpage, ctx),
                VbiEvent::Time(clock) => self.on_time(clock, ctx),
            }
        }
        self.drain(ctx)
    }
}

impl Decoder for TeletextDecoder {
    fn subtitle_type(&self) -> SubtitleType {
        SubtitleType::DvbTeletext
    }

    fn framing(&self) -> Framing {
        Framing::Record
    }

    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
        if record.type_code != RECORD_TYPE_TELETEXT && !record.is_pes() {
            debug!("Ignoring record type {:#07X}", record.type_code);
            return Ok(());
        }
        if record.pts.0 != 0 {
            self.last_pts = record.pts;
        }
        self.decode_payload(&record.payload, ctx)
    }

    fn update_parameter(&mut self, param: &ParserParameter, ctx: &ParserContext) -> Result<()> {
        let ParserParameter::Teletext(param) = param else {
            return Ok(());
        };
        info!("Teletext command {:?} (magazine {}, page {:02X})", param.event, param.magazine, param.page);

        let action = match self.nav.handle(param, self.packets.cache()) {
            Ok(action) => action,
            Err(e) => {
                if matches!(e, TeletextError::NoValidPage(_)) {
                    ctx.notifier().on_teletext_load_state(TeletextLoadState::NotFound);
                }
                return Err(e.into());
            }
        };

        match action {
            NavAction::None => {}
            NavAction::Fetch(target) => self.fetch(target, ctx),
            NavAction::Redraw => self.redraw(ctx),
            NavAction::Mix(state) => {
                ctx.notifier().on_mix_video_state(state);
                self.redraw(ctx);
            }
        }
        self.drain(ctx)
    }

    fn reset(&mut self) {
        self.packets.reset();
        self.rendered.clear();
    }

    fn dump(&self, out: &mut String) {
        let nav = &self.nav;
        let _ = writeln!(
            out,
            "  Teletext: page {:03X}/{:04X} {:?}, {} cached pages, {} shown, {} items, {} hamming errors",
            nav.current.page,
            if nav.current.subpage == ANY_SUBPAGE { 0 } else { nav.current.subpage },
            nav.state,
            self.packets.cache().len(),
            self.pages_shown,
            self.items_decoded,
            self.packets.hamming_errors()
        );
        let _ = writeln!(
            out,
            "    mode {}, display {:?}, height {:?}/{}, mix {:?}, locked {}, rows {}",
            if nav.subtitle_mode { "subtitle" } else { "graphics" },
            nav.display_mode,
            nav.height_mode,
            nav.height_index,
            nav.mix,
            nav.locked,
            ROWS
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::teletext::vbi::tests::{header, pes_payload, row};
    use crate::process::notify::Notifier;
    use crate::process::parse::ParserConfig;
    use crate::process::queue::INTERNAL_MAX_NUMBER_SPU_ITEM;
    use crate::structs::params::{MixVideoState, TeletextEvent, TeletextParam};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Notifier for Recorder {
        fn on_mix_video_state(&self, state: MixVideoState) {
            self.0.lock().unwrap().push(format!("mix {state:?}"));
        }

        fn on_teletext_load_state(&self, state: TeletextLoadState) {
            self.0.lock().unwrap().push(format!("load {state:?}"));
        }
    }

    fn context() -> ParserContext {
        ParserContext::new(INTERNAL_MAX_NUMBER_SPU_ITEM, &ParserConfig::default())
    }

    fn subtitle_param(page: u8) -> ParserParameter {
        ParserParameter::Teletext(TeletextParam {
            event: None,
            magazine: 8,
            page,
        })
    }

    fn command(event: TeletextEvent) -> ParserParameter {
        ParserParameter::Teletext(TeletextParam {
            event: Some(event),
            ..Default::default()
        })
    }

    fn subtitle_stream() -> Vec<u8> {
        pes_payload(&[
            header(0x888, true, b"                        10:00:00"),
            row(8, 20, b"\x0b\x0bHello\x0a\x0a"),
            header(0x8FF, false, b"                        10:00:00"),
        ])
    }

    #[test]
    fn subtitle_page_is_cropped() -> Result<()> {
        let ctx = context();
        let mut decoder = TeletextDecoder::new(false);
        decoder.update_parameter(&subtitle_param(0x88), &ctx)?;
        decoder.decode_payload(&subtitle_stream(), &ctx)?;

        let item = ctx.queue().try_pop().unwrap();
        assert_eq!((item.width, item.height), (CANVAS_WIDTH, CELL_HEIGHT));
        assert_eq!((item.x, item.y), (0, 200));
        assert_eq!((item.video_width, item.video_height), (480, 260));
        assert!(item.immediate_present && item.keep_showing);
        // outside the box is transparent, inside semi-transparent black
        assert_eq!(item.pixel(0, 0), Some(0));
        assert_eq!(item.pixel(CELL_WIDTH * 2, 0), Some(0xFF00_0000));
        assert_eq!(decoder.navigator().state, PageState::Display);
        Ok(())
    }

    #[test]
    fn text_mode_subtitle() -> Result<()> {
        let ctx = context();
        let mut decoder = TeletextDecoder::new(true);
        decoder.update_parameter(&subtitle_param(0x88), &ctx)?;
        decoder.decode_payload(&subtitle_stream(), &ctx)?;
        assert_eq!(ctx.queue().try_pop().unwrap().as_text(), Some("Hello"));
        Ok(())
    }

    #[test]
    fn other_subtitle_pages_ignored() -> Result<()> {
        let ctx = context();
        let mut decoder = TeletextDecoder::new(false);
        decoder.update_parameter(&subtitle_param(0x77), &ctx)?;
        decoder.decode_payload(&subtitle_stream(), &ctx)?;
        assert!(ctx.queue().try_pop().is_none());
        assert_eq!(decoder.packets().cache().len(), 1);
        Ok(())
    }

    #[test]
    fn graphics_navigation() -> Result<()> {
        let ctx = context();
        let recorder = Arc::new(Recorder::default());
        ctx.set_notifier(recorder.clone());

        let mut decoder = TeletextDecoder::new(false);
        decoder.decode_payload(
            &pes_payload(&[
                header(0x100, false, b"INDEX                   10:00:00"),
                row(1, 1, b"News 200"),
                header(0x1FF, false, b"                        10:00:00"),
                header(0x200, false, b"NEWS                    10:00:00"),
                row(2, 1, b"Top story"),
                header(0x2FF, false, b"                        10:00:00"),
            ]),
            &ctx,
        )?;
        assert_eq!(decoder.packets().cache().len(), 2);
        assert!(ctx.queue().try_pop().is_none());

        decoder.update_parameter(&command(TeletextEvent::IndexPage), &ctx)?;
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!((item.width, item.height), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(decoder.navigator().current.page, 0x100);

        decoder.update_parameter(&command(TeletextEvent::NextPage), &ctx)?;
        assert!(ctx.queue().try_pop().is_some());
        assert_eq!(decoder.navigator().current.page, 0x200);

        decoder.update_parameter(&command(TeletextEvent::MixVideo), &ctx)?;
        assert!(ctx.queue().try_pop().is_some());

        decoder.update_parameter(&command(TeletextEvent::DoubleHeight), &ctx)?;
        let zoomed = ctx.queue().try_pop().unwrap();
        assert_eq!(zoomed.height, CANVAS_HEIGHT);

        assert!(decoder.update_parameter(&command(TeletextEvent::BackPage), &ctx).is_ok());
        assert!(decoder.update_parameter(&command(TeletextEvent::BackPage), &ctx).is_err());

        let log = recorder.0.lock().unwrap().clone();
        assert_eq!(log, vec!["load Found", "mix Transparent"]);
        Ok(())
    }

    #[test]
    fn goto_uncached_page_searches() -> Result<()> {
        let ctx = context();
        let recorder = Arc::new(Recorder::default());
        ctx.set_notifier(recorder.clone());

        let mut decoder = TeletextDecoder::new(false);
        decoder.update_parameter(
            &ParserParameter::Teletext(TeletextParam {
                event: Some(TeletextEvent::GoToPage),
                magazine: 4,
                page: 0x56,
            }),
            &ctx,
        )?;
        assert_eq!(decoder.navigator().state, PageState::Search);

        decoder.decode_payload(
            &pes_payload(&[
                header(0x456, false, b"                        10:00:00"),
                row(4, 2, b"Weather"),
                header(0x4FF, false, b"                        10:00:00"),
            ]),
            &ctx,
        )?;
        assert_eq!(decoder.navigator().state, PageState::Display);
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!(item.height, CANVAS_HEIGHT);

        let log = recorder.0.lock().unwrap().clone();
        assert_eq!(log, vec!["load Searching", "load Found"]);

        assert!(decoder.update_parameter(&command(TeletextEvent::NextPage), &ctx).is_ok());
        Ok(())
    }

    #[test]
    fn rendered_buffer_is_bounded() {
        let mut decoder = TeletextDecoder::new(true);
        for i in 0..MAX_BUFFERED_PAGES + 5 {
            decoder.buffer(SubtitleItem::text(i.to_string(), Pts(0)));
        }
        assert_eq!(decoder.rendered.len(), MAX_BUFFERED_PAGES);
        assert_eq!(decoder.rendered.front().unwrap().as_text(), Some("5"));
    }
}
