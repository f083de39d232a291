/// Record extraction from subtitle byte streams.
///
/// Provides the [`Extractor`](extract::Extractor) for locating soft-demux
/// records, PES packets and PGS segments in a continuous stream.
pub mod extract;

/// Parser lifecycle: parsing task, state machine and decoded-item queue.
///
/// Provides the [`Parser`](parse::Parser) which drives one
/// [`Decoder`](parse::Decoder) against a [`DataSource`](source::DataSource).
pub mod parse;

/// Bounded FIFO of decoded items.
pub mod queue;

/// Decoder selection by negotiated subtitle type.
pub mod factory;

/// Byte-supplier interface.
pub mod source;

/// Host notification interfaces.
pub mod notify;

/// `"AMLU"`, the soft-demux record sync word.
pub const RECORD_SYNC_WORD: u32 = 0x414D_4C55;

/// Sync word, marker, type, length and PTS.
pub const RECORD_HEADER_LEN: usize = 16;

/// Private stream 1 PES start code.
pub const PES_START_CODE: u32 = 0x0000_01BD;

/// `'P''G'`
pub const SUP_MAGIC: u16 = 0x5047;

pub const SUP_HEADER_LEN: usize = 13;

pub const RECORD_TYPE_VOB: u32 = 0x17000;
pub const RECORD_TYPE_PGS: u32 = 0x17001;
pub const RECORD_TYPE_TEXT: u32 = 0x17002;
pub const RECORD_TYPE_SSA: u32 = 0x17004;
pub const RECORD_TYPE_TIMED_TEXT: u32 = 0x17005;
pub const RECORD_TYPE_MKV_VOB: u32 = 0x1700A;
pub const RECORD_TYPE_DVB: u32 = 0x17010;
pub const RECORD_TYPE_TELETEXT: u32 = 0x17011;
pub const RECORD_TYPE_CC: u32 = 0x17012;
pub const RECORD_TYPE_TEXT_DURATION: u32 = 0x17808;
pub const RECORD_TYPE_TEXT_DURATION_ALT: u32 = 0x1780D;

/// Type code reported for records taken from raw PES packets.
pub const RECORD_TYPE_PES: u32 = 0xBD;

/// Record types whose header is followed by a be32 word (PTS difference
/// or duration) not counted in the record length.
pub fn record_has_aux_word(type_code: u32) -> bool {
    matches!(
        type_code,
        RECORD_TYPE_DVB
            | RECORD_TYPE_TELETEXT
            | RECORD_TYPE_TEXT
            | RECORD_TYPE_SSA
            | RECORD_TYPE_TIMED_TEXT
            | RECORD_TYPE_TEXT_DURATION
            | RECORD_TYPE_TEXT_DURATION_ALT
            | RECORD_TYPE_MKV_VOB
    )
}

/// One DVB soft-demux record at 1 s holding a complete 2x2 page:
/// page, region, CLUT, object and end-of-display segments.
pub const EXAMPLE_DATA: &[u8] = &[
    // AMLU, marker, type 0x017010, length 83, pts 90000, pts diff 0
    0x41, 0x4D, 0x4C, 0x55, 0x77, 0x01, 0x70, 0x10, 0x00, 0x00, 0x00, 0x53, 0x00, 0x01, 0x5F, 0x90,
    0x00, 0x00, 0x00, 0x00,
    // page composition: timeout 5, mode change, region 0 at (0, 0)
    0x0F, 0x10, 0x00, 0x01, 0x00, 0x08, 0x05, 0x08, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00,
    // region composition: 2x2, 2-bit, fill, object 0 at (0, 0)
    0x0F, 0x11, 0x00, 0x01, 0x00, 0x10, 0x00, 0x08, 0x00, 0x02, 0x00, 0x02, 0x04, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // CLUT 0: entry 1 white, entry 2 black (full range, 2-bit table)
    0x0F, 0x12, 0x00, 0x01, 0x00, 0x0E, 0x00, 0x00, 0x01, 0x81, 0xEB, 0x80, 0x80, 0x00, 0x02, 0x81,
    0x10, 0x80, 0x80, 0x00,
    // object 0: top field [1, 2], bottom field [2, 1]
    0x0F, 0x13, 0x00, 0x01, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x04, 0x10, 0x60, 0x00,
    0xF0, 0x10, 0x90, 0x00, 0xF0,
    // end of display set
    0x0F, 0x80, 0x00, 0x01, 0x00, 0x00,
];

#[test]
fn example_data_is_consistent() {
    let payload_len = u32::from_be_bytes([
        EXAMPLE_DATA[8],
        EXAMPLE_DATA[9],
        EXAMPLE_DATA[10],
        EXAMPLE_DATA[11],
    ]) as usize;
    assert_eq!(EXAMPLE_DATA.len(), RECORD_HEADER_LEN + 4 + payload_len);
}
