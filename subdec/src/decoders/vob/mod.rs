pub mod control;
pub mod rle;

use std::fmt::Write as _;

use anyhow::{Result, bail, ensure};
use log::{debug, trace};

use crate::decoders::vob::control::{MAX_SPU_HEIGHT, MAX_SPU_WIDTH, SpuControl, parse_control};
use crate::process::extract::Record;
use crate::process::parse::{Decoder, ParserContext};
use crate::process::{RECORD_TYPE_MKV_VOB, RECORD_TYPE_VOB};
use crate::structs::item::SubtitleItem;
use crate::structs::params::SubtitleType;
use crate::structs::timestamp::Pts;
use crate::utils::errors::VobError;
use crate::utils::yuv::rgba;

/// Packet size and control offset.
const SPU_HEADER_LEN: usize = 4;

/// Colour look-up used when the host supplies no palette: a grey ramp.
pub fn default_palette() -> [u32; 16] {
    std::array::from_fn(|i| {
        let level = (i * 17) as u8;
        rgba(level, level, level, 0xFF)
    })
}

fn nibble(word: u16, index: usize) -> u8 {
    ((word >> (index * 4)) & 0xF) as u8
}

/// Makes index 0 the background when the stream's background is visible.
///
/// The first colour with zero contrast swaps places with index 0, together
/// with its CLUT and contrast nibbles, so index 0 is always the transparent
/// one when a transparent colour exists. Returns the index remap and the
/// adjusted colour and contrast words.
pub fn background_remap(colour: u16, contrast: u16) -> ([u8; 4], u16, u16) {
    let mut map = [0, 1, 2, 3];
    if contrast & 0xF == 0 {
        return (map, colour, contrast);
    }
    let Some(k) = (1..4).find(|&i| nibble(contrast, i) == 0) else {
        return (map, colour, contrast);
    };

    map[0] = k as u8;
    map[k] = 0;
    let swap = |word: u16| {
        let low = word & 0xF;
        let high = (word >> (k * 4)) & 0xF;
        let cleared = word & !(0xF << (k * 4)) & !0xF;
        cleared | (low << (k * 4)) | high
    };
    (map, swap(colour), swap(contrast))
}

/// Bounding box `(x, y, width, height)` of every non-zero index.
fn bounding_box(indices: &[u8], width: usize) -> Option<(usize, usize, usize, usize)> {
    let mut bbox: Option<(usize, usize, usize, usize)> = None;
    for (y, line) in indices.chunks_exact(width.max(1)).enumerate() {
        let Some(first) = line.iter().position(|&i| i != 0) else {
            continue;
        };
        let last = line.iter().rposition(|&i| i != 0).unwrap_or(first);
        bbox = Some(match bbox {
            None => (first, y, last, y),
            Some((x0, y0, x1, _)) => (x0.min(first), y0, x1.max(last), y),
        });
    }
    bbox.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// One decoded sub-picture before it becomes an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpuFrame {
    pub control: SpuControl,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// 2-bit colour indices, background already remapped to 0.
    pub indices: Vec<u8>,
}

impl SpuFrame {
    /// Decodes one complete SPU packet.
    pub fn decode(packet: &[u8]) -> Result<Self> {
        ensure!(packet.len() >= SPU_HEADER_LEN, VobError::PacketTooShort(packet.len()));
        let size = u16::from_be_bytes([packet[0], packet[1]]) as usize;
        let offset = u16::from_be_bytes([packet[2], packet[3]]) as usize;
        if offset >= size || size > packet.len() {
            bail!(VobError::ControlOffset { offset, size });
        }
        let packet = &packet[..size];

        let control = parse_control(packet, offset)?;
        let area = control.area.ok_or(VobError::MissingDisplayArea)?;
        let (top, bottom) = control.field_offsets.ok_or(VobError::MissingFieldOffsets)?;
        for field in [top, bottom] {
            ensure!(field >= SPU_HEADER_LEN && field < size, VobError::FieldOffset(field));
        }

        let top_field = rle::decode_field(&packet[top..], area.width, area.height.div_ceil(2))?;
        let bottom_field = rle::decode_field(&packet[bottom..], area.width, area.height / 2)?;
        let mut indices = rle::interleave(&top_field, &bottom_field, area.width, area.height);

        let (map, colour, contrast) = background_remap(control.colour, control.contrast);
        if map != [0, 1, 2, 3] {
            trace!("Background remap {map:?}");
            indices.iter_mut().for_each(|i| *i = map[*i as usize & 3]);
        }

        Ok(Self {
            control: SpuControl {
                colour,
                contrast,
                ..control
            },
            x: area.x,
            y: area.y,
            width: area.width,
            height: area.height,
            indices,
        })
    }

    /// Crops to the non-background pixels and maps them through `palette`.
    /// `None` when every pixel is background.
    pub fn render(&self, palette: &[u32; 16]) -> Option<(usize, usize, usize, usize, Vec<u8>)> {
        let (bx, by, width, height) = bounding_box(&self.indices, self.width)?;

        let colours: [u32; 4] = std::array::from_fn(|i| {
            let base = palette[nibble(self.control.colour, i) as usize] & 0x00FF_FFFF;
            let alpha = nibble(self.control.contrast, i) * 17;
            base | (alpha as u32) << 24
        });

        let mut pixels = Vec::with_capacity(width * height * 4);
        for row in by..by + height {
            let line = &self.indices[row * self.width + bx..row * self.width + bx + width];
            for &index in line {
                pixels.extend_from_slice(&colours[index as usize & 3].to_le_bytes());
            }
        }
        Some((self.x + bx, self.y + by, width, height, pixels))
    }
}

/// DVD sub-picture decoder for VOB and Matroska VobSub tracks.
///
/// A packet may span several records; bytes are collected until the size
/// in the packet header is reached.
#[derive(Debug)]
pub struct VobDecoder {
    mkv: bool,
    palette: [u32; 16],
    pending: Vec<u8>,
    pending_pts: Pts,
    pending_duration: u32,
    items_decoded: usize,
}

impl VobDecoder {
    pub fn new(mkv: bool) -> Self {
        Self {
            mkv,
            palette: default_palette(),
            pending: Vec::new(),
            pending_pts: Pts(0),
            pending_duration: 0,
            items_decoded: 0,
        }
    }

    /// Uses a 16-entry colour table from the IFO/IDX file.
    pub fn with_palette(mut self, palette: [u32; 16]) -> Self {
        self.palette = palette;
        self
    }

    fn packet_size(&self) -> Option<usize> {
        match self.pending[..] {
            [hi, lo, ..] => Some(u16::from_be_bytes([hi, lo]) as usize),
            _ => None,
        }
    }

    fn decode_packet(&mut self, packet: &[u8], ctx: &ParserContext) -> Result<()> {
        let frame = SpuFrame::decode(packet)?;
        let Some((x, y, width, height, pixels)) = frame.render(&self.palette) else {
            debug!("SPU at {} has no visible pixels", self.pending_pts);
            return Ok(());
        };

        let start = frame.control.start_date.unwrap_or(0) as u64 * 1024;
        let pts = self.pending_pts.saturating_add(start);
        let duration = match self.pending_duration {
            0 => frame.control.delay(),
            d => d as u64,
        };

        let mut item = SubtitleItem::bitmap(width, height, pixels, pts)
            .with_origin(x as i32, y as i32)
            .with_video_size(MAX_SPU_WIDTH, MAX_SPU_HEIGHT);
        if duration > 0 {
            item = item.with_end(self.pending_pts.saturating_add(duration));
        }
        item.immediate_present = frame.control.forced;

        debug!("SPU {width}x{height} at ({x}, {y}), pts {pts}");
        ctx.add_decoded_item(item)?;
        self.items_decoded += 1;
        ctx.notifier().on_dimension(MAX_SPU_WIDTH, MAX_SPU_HEIGHT);
        Ok(())
    }
}

impl Decoder for VobDecoder {
    fn subtitle_type(&self) -> SubtitleType {
        if self.mkv {
            SubtitleType::MkvVob
        } else {
            SubtitleType::Vob
        }
    }

    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
        match record.type_code {
            RECORD_TYPE_VOB | RECORD_TYPE_MKV_VOB => {}
            _ if record.is_pes() => {}
            other => {
                debug!("Ignoring record type {other:#07X}");
                return Ok(());
            }
        }

        if self.pending.is_empty() {
            self.pending_pts = record.pts;
            self.pending_duration = if record.type_code == RECORD_TYPE_MKV_VOB {
                record.aux
            } else {
                0
            };
        }
        self.pending.extend_from_slice(&record.payload);

        while let Some(size) = self.packet_size() {
            if size < SPU_HEADER_LEN {
                let len = self.pending.len();
                self.pending.clear();
                bail!(VobError::PacketTooShort(size.min(len)));
            }
            if self.pending.len() < size {
                trace!("SPU incomplete: {} of {size} bytes", self.pending.len());
                break;
            }

            let packet: Vec<u8> = self.pending.drain(..size).collect();
            let result = self.decode_packet(&packet, ctx);
            if self.pending.len() < SPU_HEADER_LEN {
                // trailing padding, not the start of another packet
                self.pending.clear();
            }
            result?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pending.clear();
    }

    fn dump(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "  VOB: {} bytes pending, {} items",
            self.pending.len(),
            self.items_decoded
        );
    }
}
