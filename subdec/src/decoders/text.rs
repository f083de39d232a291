use std::fmt::Write as _;

use anyhow::{Result, ensure};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::extract::Record;
use crate::process::parse::{Decoder, ParserContext};
use crate::process::{
    RECORD_TYPE_SSA, RECORD_TYPE_TEXT, RECORD_TYPE_TEXT_DURATION, RECORD_TYPE_TEXT_DURATION_ALT,
    RECORD_TYPE_TIMED_TEXT,
};
use crate::structs::item::SubtitleItem;
use crate::structs::params::SubtitleType;
use crate::structs::timestamp::Pts;
use crate::utils::errors::TextError;

const DIALOGUE_PREFIX: &str = "Dialogue:";
/// Shortest dialogue line that can hold both times.
const MIN_DIALOGUE_LEN: usize = 34;

/// Zero margins followed by an empty, karaoke or effect field; the event
/// text starts right after.
const FIELD_MARKERS: [&str; 3] = [
    "0000,0000,0000,,",
    "0000,0000,0000,karaoke,",
    "0000,0000,0000,!Effect,",
];

/// Timed-text samples start with a 2-byte text length.
const TIMED_TEXT_SKIP: usize = 2;

fn digits(b: &[u8]) -> Option<u64> {
    b.iter().try_fold(0u64, |acc, &c| {
        c.is_ascii_digit().then(|| acc * 10 + (c - b'0') as u64)
    })
}

/// Parses `H:MM:SS.cc` into milliseconds.
fn parse_clock(b: &[u8]) -> Option<u64> {
    if b.len() < 10 || b[1] != b':' || b[4] != b':' {
        return None;
    }
    let hours = digits(&b[0..1])?;
    let minutes = digits(&b[2..4])?;
    let seconds = digits(&b[5..7])?;
    let centis = digits(&b[8..10])?;
    Some((hours * 3600 + minutes * 60 + seconds) * 1000 + centis * 10)
}

/// Start and end of an ASS `Dialogue:` line, in 90 kHz ticks.
///
/// The first `:MM:` pattern after the prefix locates the start time; the
/// end time follows it after a comma.
pub fn dialogue_times(line: &str) -> Option<(Pts, Pts)> {
    let b = line.as_bytes();
    if b.len() < MIN_DIALOGUE_LEN || !line.starts_with(DIALOGUE_PREFIX) {
        return None;
    }

    let colon = (DIALOGUE_PREFIX.len()..b.len() - 3).find(|&i| b[i] == b':' && b[i + 3] == b':')?;
    let start = colon.checked_sub(1)?;
    let begin = parse_clock(b.get(start..start + 10)?)?;
    let end = parse_clock(b.get(start + 11..start + 21)?)?;
    Some((Pts::from_millis(begin), Pts::from_millis(end)))
}

/// Drops the leading event fields, keeping only the text.
pub fn strip_event_fields(line: &str) -> &str {
    FIELD_MARKERS
        .iter()
        .find_map(|marker| line.find(marker).map(|at| &line[at + marker.len()..]))
        .unwrap_or(line)
}

/// Removes `{...}` override blocks and turns `\N` and `\n` into line breaks.
pub fn clean_overrides(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if depth > 0 => {}
            '\\' if matches!(chars.peek(), Some('N' | 'n')) => {
                chars.next();
                out.push('\n');
            }
            '\\' if chars.peek() == Some(&'h') => {
                chars.next();
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Text subtitles: plain UTF-8, SSA/ASS events and timed text.
///
/// The record's duration word sets the end time; ASS dialogue lines carry
/// their own start and end and override it.
#[derive(Debug)]
pub struct TextDecoder {
    subtitle_type: SubtitleType,
    items_decoded: usize,
}

impl TextDecoder {
    pub fn new(subtitle_type: SubtitleType) -> Self {
        Self {
            subtitle_type,
            items_decoded: 0,
        }
    }

    /// Builds the item for one record's text, `None` when nothing is left
    /// to show.
    pub fn decode_text(&self, record: &Record, ctx: &ParserContext) -> Result<Option<SubtitleItem>> {
        let mut body = &record.payload[..];
        if record.type_code == RECORD_TYPE_TIMED_TEXT {
            ensure!(body.len() > TIMED_TEXT_SKIP, TextError::EmptyTimedText);
            body = &body[TIMED_TEXT_SKIP..];
        }
        ensure!(!body.is_empty(), TextError::TooShort(body.len()));

        let raw = String::from_utf8_lossy(body);
        let raw = raw.trim_end_matches('\0');

        let mut pts = record.pts;
        let mut end = (record.aux != 0).then(|| record.pts.saturating_add(record.aux as u64));

        if raw.starts_with(DIALOGUE_PREFIX) {
            match dialogue_times(raw) {
                Some((start, stop)) => {
                    trace!("Dialogue {start} -> {stop}");
                    pts = start;
                    end = Some(stop);
                }
                None => log_or_err!(ctx, Warn, TextError::DialogueTime),
            }
        }

        let text = clean_overrides(strip_event_fields(raw));
        let text = text.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let mut item = SubtitleItem::text(text, pts);
        item.end = end;
        Ok(Some(item))
    }
}

impl Decoder for TextDecoder {
    fn subtitle_type(&self) -> SubtitleType {
        self.subtitle_type
    }

    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
        match record.type_code {
            RECORD_TYPE_TEXT
            | RECORD_TYPE_SSA
            | RECORD_TYPE_TIMED_TEXT
            | RECORD_TYPE_TEXT_DURATION
            | RECORD_TYPE_TEXT_DURATION_ALT => {}
            _ if record.is_pes() => {}
            other => {
                debug!("Ignoring record type {other:#07X}");
                return Ok(());
            }
        }

        let Some(item) = self.decode_text(record, ctx)? else {
            debug!("Empty text at {}", record.pts);
            return Ok(());
        };
        debug!("Text at {}: {:?}", item.pts, item.as_text().unwrap_or_default());
        ctx.add_decoded_item(item)?;
        self.items_decoded += 1;
        Ok(())
    }

    fn dump(&self, out: &mut String) {
        let _ = writeln!(out, "  Text ({}): {} items", self.subtitle_type, self.items_decoded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::parse::ParserConfig;
    use crate::process::queue::INTERNAL_MAX_NUMBER_SPU_ITEM;
    use std::sync::Arc;

    const LINE: &str =
        "Dialogue: 0,0:01:02.50,0:01:04.00,Default,,0000,0000,0000,,{\\i1}Hello\\Nworld{\\i0}";

    fn context() -> ParserContext {
        ParserContext::new(INTERNAL_MAX_NUMBER_SPU_ITEM, &ParserConfig::default())
    }

    fn record(type_code: u32, pts: u64, aux: u32, payload: &[u8]) -> Record {
        Record {
            type_code,
            pts: Pts(pts),
            aux,
            payload: Arc::from(payload),
        }
    }

    #[test]
    fn dialogue_line() -> Result<()> {
        let (start, end) = dialogue_times(LINE).unwrap();
        assert_eq!(start, Pts(62_500 * 90));
        assert_eq!(end, Pts(64_000 * 90));

        let ctx = context();
        let mut decoder = TextDecoder::new(SubtitleType::Ssa);
        decoder.decode(&record(RECORD_TYPE_SSA, 1, 900, LINE.as_bytes()), &ctx)?;

        let item = ctx.queue().try_pop().unwrap();
        assert_eq!(item.as_text(), Some("Hello\nworld"));
        assert_eq!(item.pts, Pts(5_625_000));
        assert_eq!(item.end, Some(Pts(5_760_000)));
        Ok(())
    }

    #[test]
    fn duration_word_sets_end() -> Result<()> {
        let ctx = context();
        let mut decoder = TextDecoder::new(SubtitleType::MkvStr);
        decoder.decode(&record(RECORD_TYPE_TEXT, 9000, 4500, b"plain line\0"), &ctx)?;
        decoder.decode(&record(RECORD_TYPE_TEXT_DURATION, 9000, 0, b"open ended"), &ctx)?;

        let first = ctx.queue().try_pop().unwrap();
        assert_eq!(first.as_text(), Some("plain line"));
        assert_eq!(first.end, Some(Pts(13_500)));
        assert_eq!(ctx.queue().try_pop().unwrap().end, None);
        Ok(())
    }

    #[test]
    fn timed_text_skips_length() -> Result<()> {
        let ctx = context();
        let mut decoder = TextDecoder::new(SubtitleType::TimedText);
        decoder.decode(&record(RECORD_TYPE_TIMED_TEXT, 0, 0, b"\x00\x02hi"), &ctx)?;
        assert_eq!(ctx.queue().try_pop().unwrap().as_text(), Some("hi"));

        assert!(decoder.decode(&record(RECORD_TYPE_TIMED_TEXT, 0, 0, b"\x00\x00"), &ctx).is_err());
        Ok(())
    }

    #[test]
    fn markers_and_overrides() {
        assert_eq!(strip_event_fields("a,b,0000,0000,0000,karaoke,sing"), "sing");
        assert_eq!(strip_event_fields("0000,0000,0000,!Effect,x"), "x");
        assert_eq!(strip_event_fields("no fields"), "no fields");
        assert_eq!(clean_overrides("{\\pos(1,2)}a\\hb"), "a b");
        assert_eq!(clean_overrides("x\\ny"), "x\ny");
    }

    #[test]
    fn malformed_dialogue_time() -> Result<()> {
        let line = "Dialogue: 0,x:yy:zz.ww,0:00:01.00,Default,,0000,0000,0000,,oops";
        assert_eq!(dialogue_times(line), None);

        let ctx = context();
        let mut decoder = TextDecoder::new(SubtitleType::Ssa);
        decoder.decode(&record(RECORD_TYPE_SSA, 90, 0, line.as_bytes()), &ctx)?;
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!(item.pts, Pts(90));
        assert_eq!(item.as_text(), Some("oops"));
        Ok(())
    }
}
