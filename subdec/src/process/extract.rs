use crate::process::{
    PES_START_CODE, RECORD_HEADER_LEN, RECORD_SYNC_WORD, RECORD_TYPE_PES, SUP_HEADER_LEN,
    SUP_MAGIC, record_has_aux_word,
};
use crate::structs::timestamp::Pts;
use crate::utils::errors::ExtractError;
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::sync::Arc;

/// Largest payload accepted for one record.
pub const MAX_RECORD_LEN: usize = 4 * 1024 * 1024;

/// Wire framing of the byte stream handed to an [`Extractor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Soft-demux records (`"AMLU"` + marker) or raw private-stream-1 PES
    /// packets. Record types listed by [`record_has_aux_word`] carry an
    /// extra be32 word between the header and the payload.
    #[default]
    Record,
    /// PGS segments, each with a 13-byte `'P''G'` header.
    Sup,
}

/// Extracts framed subtitle records from a continuous byte stream.
///
/// Bytes may be pushed in chunks of any size; the iterator yields every
/// complete record and returns `None` once more data is needed. Garbage and
/// `0xFF` stuffing between records are skipped.
///
/// # Example
///
/// ```rust
/// use subdec::process::EXAMPLE_DATA;
/// use subdec::process::extract::{Extractor, Framing};
///
/// let mut extractor = Extractor::new(Framing::Record);
/// extractor.push_bytes(EXAMPLE_DATA);
///
/// let record = extractor.next().unwrap().unwrap();
/// assert_eq!(record.type_code, subdec::process::RECORD_TYPE_DVB);
/// ```
#[derive(Debug)]
pub struct Extractor {
    buffer: VecDeque<u8>,
    framing: Framing,
    io_counter: usize,
    error_count: usize,
    records_extracted: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Framing::default())
    }
}

impl Extractor {
    pub fn new(framing: Framing) -> Self {
        Self {
            buffer: VecDeque::with_capacity(64 * 1024),
            framing,
            io_counter: 0,
            error_count: 0,
            records_extracted: 0,
        }
    }

    /// Adds raw bytes to the internal buffer.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
        self.io_counter += 1;
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn records_extracted(&self) -> usize {
        self.records_extracted
    }

    /// Drops all buffered bytes, e.g. after a seek.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Moves the front of the buffer to the next candidate sync.
    /// Returns false if no candidate is buffered.
    fn resync(&mut self) -> bool {
        let data = self.buffer.make_contiguous();
        let found = match self.framing {
            Framing::Record => data.windows(4).position(|w| {
                w == RECORD_SYNC_WORD.to_be_bytes() || w == PES_START_CODE.to_be_bytes()
            }),
            Framing::Sup => data.windows(2).position(|w| w == SUP_MAGIC.to_be_bytes()),
        };

        match found {
            Some(offset) => {
                if offset > 0 {
                    trace!("Skipping {offset} bytes before sync");
                }
                self.consume_front(offset);
                true
            }
            None => {
                // Keep a possible partial sync word at the tail
                let keep = match self.framing {
                    Framing::Record => 3,
                    Framing::Sup => 1,
                };
                let drop = self.buffer.len().saturating_sub(keep);
                self.consume_front(drop);
                false
            }
        }
    }

    fn consume_front(&mut self, cnt: usize) {
        self.buffer.drain(..cnt);
    }

    fn byte(&self, i: usize) -> Option<u8> {
        self.buffer.get(i).copied()
    }

    fn be16(&self, i: usize) -> Option<u16> {
        Some(u16::from_be_bytes([self.byte(i)?, self.byte(i + 1)?]))
    }

    fn be24(&self, i: usize) -> Option<u32> {
        Some(u32::from_be_bytes([
            0,
            self.byte(i)?,
            self.byte(i + 1)?,
            self.byte(i + 2)?,
        ]))
    }

    fn be32(&self, i: usize) -> Option<u32> {
        Some(u32::from_be_bytes([
            self.byte(i)?,
            self.byte(i + 1)?,
            self.byte(i + 2)?,
            self.byte(i + 3)?,
        ]))
    }

    fn take_payload(&mut self, start: usize, len: usize, total: usize) -> Arc<[u8]> {
        let payload: Arc<[u8]> = self
            .buffer
            .range(start..start + len)
            .copied()
            .collect::<Vec<_>>()
            .into();
        self.consume_front(total);
        payload
    }

    fn extract_soft_record(&mut self) -> Result<Option<Record>, ExtractError> {
        let Some(marker) = self.byte(4) else {
            return Ok(None);
        };
        if marker != 0xAA && marker != 0x77 {
            self.consume_front(4);
            return Err(ExtractError::InvalidSyncMarker(marker));
        }

        let (Some(type_code), Some(len), Some(pts)) = (self.be24(5), self.be32(8), self.be32(12))
        else {
            return Ok(None);
        };
        let has_aux = record_has_aux_word(type_code);
        let header_len = RECORD_HEADER_LEN + if has_aux { 4 } else { 0 };
        let len = len as usize;
        if len > MAX_RECORD_LEN {
            self.consume_front(4);
            return Err(ExtractError::RecordTooLong(len, MAX_RECORD_LEN));
        }
        let aux = if has_aux { self.be32(16).unwrap_or(0) } else { 0 };

        if self.buffer.len() < header_len + len {
            return Ok(None);
        }

        let payload = self.take_payload(header_len, len, header_len + len);
        Ok(Some(Record {
            type_code,
            pts: Pts(pts as u64),
            aux,
            payload,
        }))
    }

    fn extract_pes(&mut self) -> Result<Option<Record>, ExtractError> {
        let (Some(pes_len), Some(flags), Some(header_len)) =
            (self.be16(4), self.byte(7), self.byte(8))
        else {
            return Ok(None);
        };
        let packet = pes_len as usize;
        let header_len = header_len as usize;

        if packet < 3 + header_len {
            self.consume_front(4);
            return Err(ExtractError::InvalidPesHeader {
                header: header_len,
                packet,
            });
        }
        if self.buffer.len() < 6 + packet {
            return Ok(None);
        }

        let pts = if flags & 0x80 != 0 && header_len >= 5 {
            let bytes = self.buffer.range(9..14).copied().collect::<Vec<_>>();
            Pts::from_pes_bytes(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring PES timestamp: {e}");
                Pts(0)
            })
        } else {
            Pts(0)
        };

        let start = 9 + header_len;
        let payload = self.take_payload(start, 6 + packet - start, 6 + packet);
        Ok(Some(Record {
            type_code: RECORD_TYPE_PES,
            pts,
            aux: 0,
            payload,
        }))
    }

    fn extract_sup(&mut self) -> Result<Option<Record>, ExtractError> {
        if self.buffer.len() < SUP_HEADER_LEN {
            return Ok(None);
        }
        let (Some(pts), Some(dts), Some(kind), Some(size)) =
            (self.be32(2), self.be32(6), self.byte(10), self.be16(11))
        else {
            return Ok(None);
        };
        let size = size as usize;
        if self.buffer.len() < SUP_HEADER_LEN + size {
            return Ok(None);
        }

        let payload = self.take_payload(SUP_HEADER_LEN, size, SUP_HEADER_LEN + size);
        Ok(Some(Record {
            type_code: kind as u32,
            pts: Pts(pts as u64),
            aux: dts,
            payload,
        }))
    }
}

impl Iterator for Extractor {
    type Item = Result<Record, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.io_counter == 0 {
            return None;
        }

        loop {
            if !self.resync() {
                return None;
            }

            let result = match self.framing {
                Framing::Record => {
                    if self.be32(0) == Some(PES_START_CODE) {
                        self.extract_pes()
                    } else {
                        self.extract_soft_record()
                    }
                }
                Framing::Sup => self.extract_sup(),
            };

            match result {
                Ok(Some(record)) => {
                    self.records_extracted += 1;
                    trace!(
                        "Record {:#07X}: {} bytes @ {}",
                        record.type_code,
                        record.payload.len(),
                        record.pts
                    );
                    return Some(Ok(record));
                }
                Ok(None) => {
                    if self.buffer.len() > MAX_RECORD_LEN + RECORD_HEADER_LEN + 4 {
                        debug!("Dropping stale partial record");
                        self.consume_front(1);
                        continue;
                    }
                    return None;
                }
                Err(e) => {
                    self.error_count += 1;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// A single framed record.
#[derive(Debug, Clone)]
pub struct Record {
    /// 24-bit record type, PES marker, or PGS segment type.
    pub type_code: u32,
    pub pts: Pts,
    /// PTS difference, or the PGS decode timestamp.
    pub aux: u32,
    pub payload: Arc<[u8]>,
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl Record {
    pub fn is_pes(&self) -> bool {
        self.type_code == RECORD_TYPE_PES
    }
}

/// Builds a soft-demux record, the inverse of extraction. `aux` is written
/// only for record types that carry the extra word.
pub fn frame_record(type_code: u32, pts: u32, aux: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + 4 + payload.len());
    out.extend_from_slice(&RECORD_SYNC_WORD.to_be_bytes());
    out.push(0x77);
    out.extend_from_slice(&type_code.to_be_bytes()[1..]);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&pts.to_be_bytes());
    if record_has_aux_word(type_code) {
        out.extend_from_slice(&aux.to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{EXAMPLE_DATA, RECORD_TYPE_DVB, RECORD_TYPE_TEXT};

    #[test]
    fn buf_extract() -> anyhow::Result<()> {
        let mut extractor = Extractor::new(Framing::Record);

        let mut noise = vec![0u8; 4096];
        for (i, byte) in noise.iter_mut().enumerate() {
            *byte = ((i * 37 + 123) % 256) as u8;
        }
        extractor.push_bytes(&noise);
        assert!(extractor.next().is_none());

        extractor.push_bytes(&EXAMPLE_DATA[..10]);
        assert!(extractor.next().is_none());

        extractor.push_bytes(&EXAMPLE_DATA[10..]);
        let record = extractor.next().unwrap()?;
        assert_eq!(record.type_code, RECORD_TYPE_DVB);
        assert_eq!(record.payload.len(), EXAMPLE_DATA.len() - 20);
        assert!(extractor.next().is_none());
        Ok(())
    }

    #[test]
    fn skip_invalid_data() -> anyhow::Result<()> {
        let mut extractor = Extractor::default();
        let record = frame_record(RECORD_TYPE_TEXT, 900, 0, b"hello");

        let mut data = Vec::new();
        data.extend_from_slice(&[0xFF; 7]);
        data.extend_from_slice(&record);
        data.extend_from_slice(b"AMLU\x01garbage");
        data.extend_from_slice(&record);

        extractor.push_bytes(&data);

        let mut records = 0;
        let mut errors = 0;
        for result in &mut extractor {
            match result {
                Ok(record) => {
                    assert_eq!(&record.payload[..], b"hello");
                    assert_eq!(record.pts, Pts(900));
                    records += 1;
                }
                Err(ExtractError::InvalidSyncMarker(0x01)) => errors += 1,
                Err(e) => return Err(e.into()),
            }
        }
        assert_eq!(records, 2);
        assert_eq!(errors, 1);
        Ok(())
    }

    #[test]
    fn pes_packet_with_pts() -> anyhow::Result<()> {
        let mut extractor = Extractor::default();
        // PTS 90000 with marker bits
        let pts_bytes = [0x21, 0x00, 0x05, 0xBF, 0x21];
        let payload = [0x20, 0x00, 0x0F, 0xFF];
        let mut pes = vec![0x00, 0x00, 0x01, 0xBD];
        pes.extend_from_slice(&((3 + 5 + payload.len()) as u16).to_be_bytes());
        pes.extend_from_slice(&[0x80, 0x80, 0x05]);
        pes.extend_from_slice(&pts_bytes);
        pes.extend_from_slice(&payload);

        extractor.push_bytes(&pes);
        let record = extractor.next().unwrap()?;
        assert!(record.is_pes());
        assert_eq!(record.pts, Pts(90_000));
        assert_eq!(&record.payload[..], &payload);
        Ok(())
    }

    #[test]
    fn sup_segments() -> anyhow::Result<()> {
        let mut extractor = Extractor::new(Framing::Sup);
        let mut data = vec![b'P', b'G'];
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.push(0x80);
        data.extend_from_slice(&0u16.to_be_bytes());

        extractor.push_bytes(&data[..5]);
        assert!(extractor.next().is_none());
        extractor.push_bytes(&data[5..]);

        let record = extractor.next().unwrap()?;
        assert_eq!(record.type_code, 0x80);
        assert_eq!(record.pts, Pts(1000));
        assert!(record.payload.is_empty());
        Ok(())
    }
}
