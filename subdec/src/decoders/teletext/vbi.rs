//! Teletext packet layer: DVB data units (EN 300 472) carrying
//! EN 300 706 packets.
//!
//! Lines are sliced out of the PES payload, their bytes restored to
//! transmission order, and fed to a [`PacketDecoder`] which assembles
//! pages per magazine and keeps every completed page in a [`PageCache`].

use std::collections::VecDeque;

use log::{debug, trace};

use crate::utils::errors::TeletextError;

pub const DATA_UNIT_TELETEXT: u8 = 0x02;
pub const DATA_UNIT_SUBTITLE: u8 = 0x03;
const DATA_UNIT_LINE_LEN: usize = 0x2C;

/// Bytes of one teletext line after the clock run-in: address + 40.
pub const LINE_BYTES: usize = 42;

/// A PES header is 45 bytes ahead of the payload; the whole packet must
/// fit the DVB size limits.
const PES_HEADER_LEN: usize = 45;
const MIN_PES_SIZE: usize = 184;
const MAX_PES_SIZE: usize = 65504;

const MAX_SLICES: usize = 64;

pub const ROWS: usize = 25;
pub const COLUMNS: usize = 40;

/// Sub-page wildcard.
pub const ANY_SUBPAGE: u16 = 0x3F7F;

/// Raw pages kept for navigation.
pub const MAX_CACHED_PAGES: usize = 512;

/// Header columns holding the broadcast clock.
const CLOCK_COLUMNS: std::ops::Range<usize> = 32..40;

pub fn is_teletext_identifier(id: u8) -> bool {
    matches!(id, 0x10..=0x1F | 0x99..=0x9B)
}

const fn ham84_encode(d: u8) -> u8 {
    let (d1, d2, d3, d4) = (d & 1, (d >> 1) & 1, (d >> 2) & 1, (d >> 3) & 1);
    let p1 = 1 ^ d1 ^ d3 ^ d4;
    let p2 = 1 ^ d1 ^ d2 ^ d4;
    let p3 = 1 ^ d1 ^ d2 ^ d3;
    let partial = p1 | d1 << 1 | p2 << 2 | d2 << 3 | p3 << 4 | d3 << 5 | d4 << 7;
    let p4 = 1 ^ (partial.count_ones() as u8 & 1);
    partial | p4 << 6
}

const HAMMING_8_4: [u8; 16] = {
    let mut table = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        table[i] = ham84_encode(i as u8);
        i += 1;
    }
    table
};

/// Hamming 8/4 decode with single-bit correction.
pub fn unham84(byte: u8) -> Option<u8> {
    HAMMING_8_4
        .iter()
        .position(|&code| (code ^ byte).count_ones() <= 1)
        .map(|d| d as u8)
}

/// Strips odd parity; `None` on a parity error.
pub fn odd_parity(byte: u8) -> Option<u8> {
    (byte.count_ones() % 2 == 1).then_some(byte & 0x7F)
}

fn magazine_number(bits: u8) -> u8 {
    match bits & 7 {
        0 => 8,
        m => m,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbiLine {
    /// Field line number, 0 when unknown.
    pub line: u16,
    pub data: [u8; LINE_BYTES],
}

/// Splits one PES payload into teletext lines.
pub fn slice_lines(payload: &[u8]) -> Result<Vec<VbiLine>, TeletextError> {
    let full = payload.len() + PES_HEADER_LEN;
    if !(MIN_PES_SIZE..=MAX_PES_SIZE).contains(&full) {
        return Err(TeletextError::PayloadLength(payload.len()));
    }
    if !is_teletext_identifier(payload[0]) {
        return Err(TeletextError::DataIdentifier(payload[0]));
    }

    let mut lines = Vec::new();
    let mut rest = &payload[1..];
    while rest.len() >= 2 && lines.len() < MAX_SLICES {
        let (id, length) = (rest[0], rest[1] as usize);
        if length + 2 > rest.len() {
            break;
        }

        if matches!(id, DATA_UNIT_TELETEXT | DATA_UNIT_SUBTITLE) {
            if length != DATA_UNIT_LINE_LEN {
                return Err(TeletextError::DataUnit { id, length });
            }
            let offset = (rest[2] & 0x1F) as u16;
            let first_field = rest[2] & 0x20 != 0;
            let line = match offset {
                0 => 0,
                o if first_field => o,
                o => o + 313,
            };
            let mut data = [0u8; LINE_BYTES];
            for (dst, src) in data.iter_mut().zip(&rest[4..4 + LINE_BYTES]) {
                *dst = src.reverse_bits();
            }
            lines.push(VbiLine { line, data });
        }
        rest = &rest[length + 2..];
    }

    if !rest.is_empty() {
        trace!("{} bytes left after slicing", rest.len());
    }
    Ok(lines)
}

/// Header control bits C4..C14.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageControl {
    pub erase: bool,
    pub newsflash: bool,
    pub subtitle: bool,
    pub suppress_header: bool,
    pub update: bool,
    pub interrupted: bool,
    pub inhibit_display: bool,
    pub serial: bool,
    pub charset: u8,
}

impl PageControl {
    fn from_nibbles(s2: u8, s4: u8, c7_10: u8, c11_14: u8) -> Self {
        Self {
            erase: s2 & 8 != 0,
            newsflash: s4 & 4 != 0,
            subtitle: s4 & 8 != 0,
            suppress_header: c7_10 & 1 != 0,
            update: c7_10 & 2 != 0,
            interrupted: c7_10 & 4 != 0,
            inhibit_display: c7_10 & 8 != 0,
            serial: c11_14 & 1 != 0,
            charset: c11_14 >> 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageLink {
    /// Hex page number (`0x100`..`0x8FF`), 0 when absent.
    pub page: u16,
    pub subpage: u16,
}

/// One received page, parity-stripped but otherwise as transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub page: u16,
    pub subpage: u16,
    pub control: PageControl,
    pub rows: Vec<[u8; COLUMNS]>,
    /// Editorial links from packet X/27/0: red, green, yellow, cyan,
    /// next and index.
    pub links: Option<[PageLink; 6]>,
}

/// Page type flags; subtitle pages have [`PAGE_TYPE_SUBTITLE`] set.
pub const PAGE_TYPE_ERASE: u32 = 0x0080;
pub const PAGE_TYPE_NEWSFLASH: u32 = 0x4000;
pub const PAGE_TYPE_SUBTITLE: u32 = 0x8000;

impl RawPage {
    pub fn new(page: u16, subpage: u16, control: PageControl) -> Self {
        Self {
            page,
            subpage,
            control,
            rows: vec![[b' '; COLUMNS]; ROWS],
            links: None,
        }
    }

    pub fn magazine(&self) -> u8 {
        (self.page >> 8) as u8
    }

    pub fn is_subtitle(&self) -> bool {
        self.control.subtitle
    }

    /// Packs the control bits: C4 at bit 7, C5/C6 at bits 14/15 and
    /// C7..C14 from bit 16 upwards.
    pub fn page_type(&self) -> u32 {
        let c = &self.control;
        let mut value = 0;
        if c.erase {
            value |= PAGE_TYPE_ERASE;
        }
        if c.newsflash {
            value |= PAGE_TYPE_NEWSFLASH;
        }
        if c.subtitle {
            value |= PAGE_TYPE_SUBTITLE;
        }
        let high = [
            c.suppress_header,
            c.update,
            c.interrupted,
            c.inhibit_display,
            c.serial,
        ];
        for (bit, set) in high.iter().enumerate() {
            if *set {
                value |= 1 << (16 + bit);
            }
        }
        value | (c.charset as u32) << 21
    }

    pub fn clock(&self) -> [u8; 8] {
        let mut clock = [b' '; 8];
        clock.copy_from_slice(&self.rows[0][CLOCK_COLUMNS]);
        clock
    }
}

/// Completed pages in arrival order, oldest evicted first.
#[derive(Debug, Clone)]
pub struct PageCache {
    pages: VecDeque<RawPage>,
    capacity: usize,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(MAX_CACHED_PAGES)
    }
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            pages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Stores `page`, replacing an older copy of the same sub-page.
    pub fn insert(&mut self, page: RawPage) {
        self.pages
            .retain(|p| !(p.page == page.page && p.subpage == page.subpage));
        if self.pages.len() == self.capacity {
            if let Some(old) = self.pages.pop_front() {
                trace!("Page cache full, evicting {:03X}/{:04X}", old.page, old.subpage);
            }
        }
        self.pages.push_back(page);
    }

    /// Looks up a sub-page; [`ANY_SUBPAGE`] returns the most recent one.
    pub fn get(&self, page: u16, subpage: u16) -> Option<&RawPage> {
        self.pages
            .iter()
            .rev()
            .find(|p| p.page == page && (subpage == ANY_SUBPAGE || p.subpage == subpage))
    }

    /// Sorted sub-page codes received for `page`.
    pub fn subpages(&self, page: u16) -> Vec<u16> {
        let mut subs: Vec<u16> = self
            .pages
            .iter()
            .filter(|p| p.page == page)
            .map(|p| p.subpage)
            .collect();
        subs.sort_unstable();
        subs.dedup();
        subs
    }

    /// Next cached page number after `from` in hex order, wrapping around.
    pub fn next_page(&self, from: u16, dir: i32) -> Option<u16> {
        let mut numbers: Vec<u16> = self.pages.iter().map(|p| p.page).collect();
        numbers.sort_unstable();
        numbers.dedup();

        if dir >= 0 {
            numbers
                .iter()
                .find(|&&n| n > from)
                .or_else(|| numbers.first())
                .copied()
        } else {
            numbers
                .iter()
                .rev()
                .find(|&&n| n < from)
                .or_else(|| numbers.last())
                .copied()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VbiEvent {
    /// A page was completed and stored in the cache.
    Page { page: u16, subpage: u16 },
    /// The header clock changed.
    Time([u8; 8]),
}

/// Assembles pages from packets, one page in progress per magazine.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    pending: [Option<RawPage>; 8],
    last_clock: Option<[u8; 8]>,
    cache: PageCache,
    hamming_errors: usize,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn hamming_errors(&self) -> usize {
        self.hamming_errors
    }

    pub fn reset(&mut self) {
        self.pending = Default::default();
        self.last_clock = None;
    }

    pub fn decode(&mut self, lines: &[VbiLine]) -> Vec<VbiEvent> {
        let mut events = Vec::new();
        for line in lines {
            self.decode_packet(&line.data, &mut events);
        }
        events
    }

    /// Completes every page in progress.
    pub fn flush(&mut self) -> Vec<VbiEvent> {
        let mut events = Vec::new();
        for slot in 0..self.pending.len() {
            self.complete(slot, &mut events);
        }
        events
    }

    fn complete(&mut self, slot: usize, events: &mut Vec<VbiEvent>) {
        if let Some(page) = self.pending[slot].take() {
            debug!("Page {:03X}/{:04X} complete", page.page, page.subpage);
            events.push(VbiEvent::Page {
                page: page.page,
                subpage: page.subpage,
            });
            self.cache.insert(page);
        }
    }

    fn ham(&mut self, byte: u8) -> Option<u8> {
        let value = unham84(byte);
        if value.is_none() {
            self.hamming_errors += 1;
        }
        value
    }

    fn decode_packet(&mut self, data: &[u8; LINE_BYTES], events: &mut Vec<VbiEvent>) {
        let (Some(a), Some(b)) = (self.ham(data[0]), self.ham(data[1])) else {
            trace!("Uncorrectable packet address");
            return;
        };
        let magazine = magazine_number(a);
        let row = (a >> 3) | (b << 1);
        let slot = (magazine - 1) as usize;
        let body = &data[2..];

        match row {
            0 => self.decode_header(magazine, body, events),
            1..=24 => {
                if let Some(page) = self.pending[slot].as_mut() {
                    let dst = &mut page.rows[row as usize];
                    for (d, &s) in dst.iter_mut().zip(body) {
                        *d = odd_parity(s).unwrap_or(b' ');
                    }
                }
            }
            27 => self.decode_links(slot, magazine, body),
            other => trace!("Ignoring packet {magazine}/{other}"),
        }
    }

    fn decode_header(&mut self, magazine: u8, body: &[u8], events: &mut Vec<VbiEvent>) {
        let mut nibbles = [0u8; 8];
        for (n, &byte) in nibbles.iter_mut().zip(&body[..8]) {
            let Some(value) = self.ham(byte) else {
                trace!("Uncorrectable page header in magazine {magazine}");
                return;
            };
            *n = value;
        }
        let [units, tens, s1, s2, s3, s4, c7_10, c11_14] = nibbles;
        let control = PageControl::from_nibbles(s2, s4, c7_10, c11_14);

        let slot = (magazine - 1) as usize;
        self.complete(slot, events);
        if control.serial {
            for other in 0..self.pending.len() {
                self.complete(other, events);
            }
        }

        let mut header = [b' '; COLUMNS];
        for (d, &s) in header[8..].iter_mut().zip(&body[8..]) {
            *d = odd_parity(s).unwrap_or(b' ');
        }
        let clock: [u8; 8] = std::array::from_fn(|i| header[CLOCK_COLUMNS.start + i]);
        if self.last_clock != Some(clock) {
            self.last_clock = Some(clock);
            events.push(VbiEvent::Time(clock));
        }

        if units == 0xF && tens == 0xF {
            // time filling header, no page follows
            return;
        }

        let page = (magazine as u16) << 8 | (tens as u16) << 4 | units as u16;
        let subpage = s1 as u16 | ((s2 & 7) as u16) << 4 | (s3 as u16) << 8 | ((s4 & 3) as u16) << 12;
        trace!("Header {page:03X}/{subpage:04X} {control:?}");

        let mut raw = RawPage::new(page, subpage, control);
        raw.rows[0] = header;
        self.pending[slot] = Some(raw);
    }

    fn decode_links(&mut self, slot: usize, magazine: u8, body: &[u8]) {
        if self.ham(body[0]) != Some(0) {
            return;
        }

        let mut links = [PageLink::default(); 6];
        for (i, link) in links.iter_mut().enumerate() {
            let field = &body[1 + 6 * i..7 + 6 * i];
            let mut n = [0u8; 6];
            for (dst, &src) in n.iter_mut().zip(field) {
                let Some(value) = self.ham(src) else {
                    return;
                };
                *dst = value;
            }
            let relative = (n[3] >> 3) | ((n[5] >> 2) << 1);
            let mag = magazine_number((magazine & 7) ^ relative);
            link.page = (mag as u16) << 8 | (n[1] as u16) << 4 | n[0] as u16;
            link.subpage =
                n[2] as u16 | ((n[3] & 7) as u16) << 4 | (n[4] as u16) << 8 | ((n[5] & 3) as u16) << 12;
        }

        if let Some(page) = self.pending[slot].as_mut() {
            trace!("Page {:03X} links {links:?}", page.page);
            page.links = Some(links);
        }
    }
}
