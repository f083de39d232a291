//! Built-in CEA-608 (line 21) caption engine.
//!
//! Assembles pop-on, roll-up and paint-on captions on a 32x15 character
//! grid. Records carry one field of byte pairs, so CC3/CC4 select their
//! data channel the same way CC1/CC2 do.

use std::sync::Arc;

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::decoders::caption::{CaptionEngine, CaptionEvent, CaptionSink};
use crate::structs::params::{CaptionChannel, ParserParameter};
use crate::structs::timestamp::Pts;
use crate::utils::errors::CaptionError;

pub const ROWS: usize = 15;
pub const COLUMNS: usize = 32;

type Screen = [[char; COLUMNS]; ROWS];

const BLANK: Screen = [[' '; COLUMNS]; ROWS];

/// Row for each PAC code: `(b1 & 7) << 1 | (b2 >> 5 & 1)`.
const PAC_ROWS: [usize; 16] = [10, 10, 0, 1, 2, 3, 11, 12, 13, 14, 4, 5, 6, 7, 8, 9];

#[rustfmt::skip]
const SPECIAL: [char; 16] = [
    '®', '°', '½', '¿', '™', '¢', '£', '♪',
    'à', ' ', 'è', 'â', 'ê', 'î', 'ô', 'û',
];

#[rustfmt::skip]
const EXTENDED_SPANISH_FRENCH: [char; 32] = [
    'Á', 'É', 'Ó', 'Ú', 'Ü', 'ü', '‘', '¡',
    '*', '\'', '—', '©', '℠', '•', '“', '”',
    'À', 'Â', 'Ç', 'È', 'Ê', 'Ë', 'ë', 'Î',
    'Ï', 'ï', 'Ô', 'Ù', 'ù', 'Û', '«', '»',
];

#[rustfmt::skip]
const EXTENDED_PORTUGUESE_GERMAN: [char; 32] = [
    'Ã', 'ã', 'Í', 'Ì', 'ì', 'Ò', 'ò', 'Õ',
    'õ', '{', '}', '\\', '^', '_', '|', '~',
    'Ä', 'ä', 'Ö', 'ö', 'ß', '¥', '¤', '¦',
    'Å', 'å', 'Ø', 'ø', '┌', '┐', '└', '┘',
];

fn basic_char(byte: u8) -> char {
    match byte {
        0x2A => 'á',
        0x5C => 'é',
        0x5E => 'í',
        0x5F => 'ó',
        0x60 => 'ú',
        0x7B => 'ç',
        0x7C => '÷',
        0x7D => 'Ñ',
        0x7E => 'ñ',
        0x7F => '█',
        _ => byte as char,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionMode {
    PopOn,
    PaintOn,
    RollUp(usize),
    /// Text service; characters are discarded.
    Text,
}

pub struct Cea608Engine {
    selected: u8,
    data_channel: u8,
    mode: CaptionMode,
    displayed: Screen,
    non_displayed: Screen,
    row: usize,
    col: usize,
    last_control: Option<(u8, u8)>,
    dirty: bool,
    pairs: usize,
}

impl Default for Cea608Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Cea608Engine {
    pub fn new() -> Self {
        Self {
            selected: 1,
            data_channel: 1,
            mode: CaptionMode::PopOn,
            displayed: BLANK,
            non_displayed: BLANK,
            row: ROWS - 1,
            col: 0,
            last_control: None,
            dirty: false,
            pairs: 0,
        }
    }

    pub fn set_channel(&mut self, channel: CaptionChannel) {
        self.selected = match channel {
            CaptionChannel::Cc1 | CaptionChannel::Cc3 => 1,
            CaptionChannel::Cc2 | CaptionChannel::Cc4 => 2,
        };
    }

    pub fn mode(&self) -> CaptionMode {
        self.mode
    }

    pub fn clear(&mut self) {
        let selected = self.selected;
        *self = Self::new();
        self.selected = selected;
    }

    /// Visible caption text, one line per non-blank row.
    pub fn displayed_text(&self) -> String {
        self.displayed
            .iter()
            .map(|row| row.iter().collect::<String>())
            .filter_map(|line| {
                let line = line.trim();
                (!line.is_empty()).then(|| line.to_string())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Processes byte pairs; returns whether the visible caption changed.
    pub fn process(&mut self, data: &[u8]) -> Result<bool> {
        if data.len() % 2 != 0 {
            bail!(CaptionError::OddLength(data.len()));
        }

        for pair in data.chunks_exact(2) {
            let (b1, b2) = (pair[0] & 0x7F, pair[1] & 0x7F);
            self.pairs += 1;
            match b1 {
                0x00 if b2 == 0x00 => {}
                0x10..=0x1F => {
                    if self.last_control == Some((b1, b2)) {
                        // control codes are transmitted twice
                        self.last_control = None;
                        continue;
                    }
                    self.last_control = Some((b1, b2));
                    self.data_channel = if b1 & 0x08 != 0 { 2 } else { 1 };
                    if self.data_channel == self.selected {
                        self.control(b1 & 0xF7, b2);
                    }
                }
                0x20..=0x7F => {
                    self.last_control = None;
                    if self.data_channel == self.selected {
                        self.put(basic_char(b1));
                        if b2 >= 0x20 {
                            self.put(basic_char(b2));
                        }
                    }
                }
                _ => {
                    // extended data services
                    self.last_control = None;
                }
            }
        }

        Ok(std::mem::take(&mut self.dirty))
    }

    fn control(&mut self, b1: u8, b2: u8) {
        match (b1, b2) {
            (0x11, 0x30..=0x3F) => self.put(SPECIAL[(b2 - 0x30) as usize]),
            // mid-row style change, shown as a space
            (0x11, 0x20..=0x2F) => self.put(' '),
            (0x12, 0x20..=0x3F) => {
                self.backspace();
                self.put(EXTENDED_SPANISH_FRENCH[(b2 - 0x20) as usize]);
            }
            (0x13, 0x20..=0x3F) => {
                self.backspace();
                self.put(EXTENDED_PORTUGUESE_GERMAN[(b2 - 0x20) as usize]);
            }
            (0x14 | 0x15, 0x20..=0x2F) => self.command(b2),
            (0x17, 0x21..=0x23) => self.col = (self.col + (b2 - 0x20) as usize).min(COLUMNS - 1),
            (0x10..=0x17, 0x40..=0x7F) => self.preamble(b1, b2),
            _ => trace!("Ignoring control {b1:#04X} {b2:#04X}"),
        }
    }

    fn command(&mut self, code: u8) {
        match code {
            0x20 => self.mode = CaptionMode::PopOn,
            0x21 => self.backspace(),
            0x24 => {
                let row = self.row;
                let col = self.col;
                self.target()[row][col..].fill(' ');
            }
            0x25..=0x27 => {
                let rows = (code - 0x23) as usize;
                if !matches!(self.mode, CaptionMode::RollUp(_)) {
                    self.displayed = BLANK;
                    self.non_displayed = BLANK;
                    self.row = ROWS - 1;
                    self.col = 0;
                    self.dirty = true;
                }
                self.mode = CaptionMode::RollUp(rows);
                self.row = self.row.max(rows - 1);
            }
            0x29 => self.mode = CaptionMode::PaintOn,
            0x2A | 0x2B => self.mode = CaptionMode::Text,
            0x2C => {
                self.displayed = BLANK;
                self.dirty = true;
            }
            0x2D => self.carriage_return(),
            0x2E => self.non_displayed = BLANK,
            0x2F => {
                std::mem::swap(&mut self.displayed, &mut self.non_displayed);
                self.dirty = true;
            }
            _ => trace!("Ignoring command {code:#04X}"),
        }
    }

    fn preamble(&mut self, b1: u8, b2: u8) {
        let index = ((b1 & 0x07) as usize) << 1 | ((b2 >> 5) & 1) as usize;
        self.row = PAC_ROWS[index];
        if let CaptionMode::RollUp(rows) = self.mode {
            self.row = self.row.max(rows - 1);
        }
        self.col = if b2 & 0x10 != 0 {
            ((b2 & 0x0E) >> 1) as usize * 4
        } else {
            0
        };
    }

    fn carriage_return(&mut self) {
        let CaptionMode::RollUp(rows) = self.mode else {
            return;
        };
        let top = self.row + 1 - rows;
        for row in top..self.row {
            self.displayed[row] = self.displayed[row + 1];
        }
        self.displayed[self.row] = [' '; COLUMNS];
        // rows above the window roll off
        for row in self.displayed.iter_mut().take(top) {
            *row = [' '; COLUMNS];
        }
        self.col = 0;
        self.dirty = true;
    }

    fn target(&mut self) -> &mut Screen {
        match self.mode {
            CaptionMode::PopOn => &mut self.non_displayed,
            _ => {
                self.dirty = true;
                &mut self.displayed
            }
        }
    }

    fn put(&mut self, c: char) {
        if self.mode == CaptionMode::Text {
            return;
        }
        let (row, col) = (self.row, self.col);
        self.target()[row][col] = c;
        self.col = (col + 1).min(COLUMNS - 1);
    }

    fn backspace(&mut self) {
        if self.mode == CaptionMode::Text || self.col == 0 {
            return;
        }
        self.col -= 1;
        let (row, col) = (self.row, self.col);
        self.target()[row][col] = ' ';
    }
}

impl CaptionEngine for Cea608Engine {
    fn name(&self) -> &str {
        "cea608"
    }

    fn start(&mut self, _sink: Arc<dyn CaptionSink>) -> Result<()> {
        debug!("CEA-608 engine started on data channel {}", self.selected);
        Ok(())
    }

    fn configure(&mut self, param: &ParserParameter) -> Result<()> {
        if let ParserParameter::Caption(caption) = param {
            self.set_channel(caption.channel);
            self.clear();
        }
        Ok(())
    }

    fn feed(&mut self, data: &[u8], pts: Pts, sink: &dyn CaptionSink) -> Result<()> {
        if self.process(data)? {
            sink.emit(CaptionEvent::Text {
                text: self.displayed_text(),
                pts,
            });
        }
        Ok(())
    }

    fn stop(&mut self) {
        debug!("CEA-608 engine stopped after {} pairs", self.pairs);
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Vec<u8> {
        let mut bytes = s.as_bytes().to_vec();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        bytes
    }

    #[test]
    fn pop_on() -> Result<()> {
        let mut cc = Cea608Engine::new();
        // RCL twice, PAC row 15 col 0
        assert!(!cc.process(&[0x94, 0x20, 0x94, 0x20, 0x94, 0x70])?);
        assert!(!cc.process(&text("HELLO"))?);
        assert_eq!(cc.displayed_text(), "");

        // EOC
        assert!(cc.process(&[0x94, 0x2F])?);
        assert_eq!(cc.displayed_text(), "HELLO");

        // EDM
        assert!(cc.process(&[0x94, 0x2C])?);
        assert_eq!(cc.displayed_text(), "");
        Ok(())
    }

    #[test]
    fn roll_up() -> Result<()> {
        let mut cc = Cea608Engine::new();
        // RU2
        cc.process(&[0x94, 0x25])?;
        assert_eq!(cc.mode(), CaptionMode::RollUp(2));
        cc.process(&text("ONE"))?;
        cc.process(&[0x94, 0x2D])?;
        cc.process(&text("TWO"))?;
        assert_eq!(cc.displayed_text(), "ONE\nTWO");

        cc.process(&[0x94, 0x2D])?;
        cc.process(&text("THREE"))?;
        assert_eq!(cc.displayed_text(), "TWO\nTHREE");
        Ok(())
    }

    #[test]
    fn paint_on_and_indent() -> Result<()> {
        let mut cc = Cea608Engine::new();
        // RDC, PAC row 1 indent 8
        cc.process(&[0x14, 0x29, 0x11, 0x54])?;
        assert!(cc.process(&text("AB"))?);
        assert_eq!(cc.displayed[0][8], 'A');
        assert_eq!(cc.displayed_text(), "AB");

        // BS
        cc.process(&[0x14, 0x21])?;
        assert_eq!(cc.displayed_text(), "A");
        Ok(())
    }

    #[test]
    fn duplicate_control_skipped() -> Result<()> {
        let mut cc = Cea608Engine::new();
        cc.process(&[0x14, 0x29])?;
        cc.process(&text("AB"))?;
        // BS repeated is one backspace, a third one is new
        cc.process(&[0x14, 0x21, 0x14, 0x21])?;
        assert_eq!(cc.displayed_text(), "A");
        cc.process(&[0x14, 0x21])?;
        assert_eq!(cc.displayed_text(), "");
        Ok(())
    }

    #[test]
    fn other_channel_ignored() -> Result<()> {
        let mut cc = Cea608Engine::new();
        // RDC on CC2
        cc.process(&[0x1C, 0x29])?;
        assert!(!cc.process(&text("XY"))?);

        cc.set_channel(CaptionChannel::Cc2);
        cc.process(&[0x1C, 0x29])?;
        assert!(cc.process(&text("ZW"))?);
        assert_eq!(cc.displayed_text(), "ZW");
        Ok(())
    }

    #[test]
    fn special_and_extended() -> Result<()> {
        let mut cc = Cea608Engine::new();
        cc.process(&[0x14, 0x29])?;
        // music note, then "e" replaced by É
        cc.process(&[0x11, 0x37, b'e', 0x00, 0x12, 0x21])?;
        cc.process(&[b'*', 0x00])?;
        assert_eq!(cc.displayed_text(), "♪Éá");
        Ok(())
    }

    #[test]
    fn odd_length() {
        let mut cc = Cea608Engine::new();
        let err = cc.process(&[0x14]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptionError>(),
            Some(CaptionError::OddLength(1))
        ));
    }
}
