#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Invalid sync marker: {0:#04X}")]
    InvalidSyncMarker(u8),

    #[error("Record length {0} exceeds the maximum of {1}")]
    RecordTooLong(usize, usize),

    #[error("PES header length {header} exceeds packet length {packet}")]
    InvalidPesHeader { header: usize, packet: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ParserError {
    #[error("Parser is not running")]
    NotRunning,

    #[error("Parser is already running")]
    AlreadyRunning,

    #[error("Data source failed to start")]
    SourceStartFailed,

    #[error("Parsing task panicked")]
    TaskPanicked,

    #[error("Item rejected: {0}")]
    ItemRejected(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum DvbError {
    #[error("Segment length {length} exceeds remaining {remaining} bytes")]
    SegmentTooLong { length: usize, remaining: usize },

    #[error("Record does not start with the subtitle stream marker: {0:#04X}")]
    StreamMarker(u8),

    #[error("Region segment too short: {0} bytes")]
    RegionTooShort(usize),

    #[error("Region {id} size {width}x{height} exceeds 1920x1080")]
    RegionTooLarge { id: u8, width: usize, height: usize },

    #[error("Composed page {width}x{height} exceeds the page buffer")]
    PageTooLarge { width: usize, height: usize },

    #[error("Segment {segment:#04X} skipped: {reason}")]
    Segment { segment: u8, reason: String },

    #[error("Unsupported object coding method {0}")]
    ObjectCoding(u8),

    #[error("Object field lengths {top}+{bottom} exceed {available} bytes")]
    ObjectFieldsTooLong {
        top: usize,
        bottom: usize,
        available: usize,
    },

    #[error("Object placement ({x}, {y}) outside region {width}x{height}")]
    ObjectPlacement {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("Display definition segment too short: {0} bytes")]
    DisplayDefinitionTooShort(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum PgsError {
    #[error("Segment {kind:#04X} too short: {length} bytes")]
    SegmentTooShort { kind: u8, length: usize },

    #[error("Object size {width}x{height} is empty")]
    EmptyObject { width: usize, height: usize },

    #[error("Object size {width}x{height} exceeds {max_width}x{max_height}")]
    ObjectTooLarge {
        width: usize,
        height: usize,
        max_width: usize,
        max_height: usize,
    },

    #[error("RLE data overflows the {width}x{height} canvas")]
    RleOverflow { width: usize, height: usize },

    #[error("Object data continued without a first fragment")]
    OrphanFragment,
}

#[derive(thiserror::Error, Debug)]
pub enum VobError {
    #[error("Control offset {offset} beyond packet size {size}")]
    ControlOffset { offset: usize, size: usize },

    #[error("Unknown control opcode {0:#04X}")]
    UnknownOpcode(u8),

    #[error("Display area ({x1}, {y1})-({x2}, {y2}) is inverted")]
    InvertedArea {
        x1: usize,
        y1: usize,
        x2: usize,
        y2: usize,
    },

    #[error("Pixel field offset {0} beyond packet")]
    FieldOffset(usize),

    #[error("No display area set in the control sequence")]
    MissingDisplayArea,

    #[error("No pixel field offsets set in the control sequence")]
    MissingFieldOffsets,

    #[error("Packet size {0} smaller than its header")]
    PacketTooShort(usize),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TeletextError {
    #[error("Invalid data identifier {0:#04X}")]
    DataIdentifier(u8),

    #[error("PES payload length {0} out of range")]
    PayloadLength(usize),

    #[error("Invalid data unit {id:#04X} with length {length}")]
    DataUnit { id: u8, length: usize },

    #[error("Page {0} is out of range 100-899")]
    PageOutOfRange(i32),

    #[error("Page {0:03X} not in cache")]
    PageNotCached(u16),

    #[error("Navigation history is empty")]
    EmptyHistory,

    #[error("Operation requires a locked sub-page")]
    SubPageNotLocked,

    #[error("Operation not valid in normal height mode")]
    NormalHeight,

    #[error("No valid page found in direction {0}")]
    NoValidPage(i32),
}

#[derive(thiserror::Error, Debug)]
pub enum TextError {
    #[error("Text record too short: {0} bytes")]
    TooShort(usize),

    #[error("Timed text record has zero length")]
    EmptyTimedText,

    #[error("Malformed dialogue timestamp")]
    DialogueTime,
}

#[derive(thiserror::Error, Debug)]
pub enum CaptionError {
    #[error("No {0} engine available from the data source")]
    NoEngine(&'static str),

    #[error("Engine failed to start: {0}")]
    EngineStart(String),

    #[error("Caption data length {0} is not a multiple of 2")]
    OddLength(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum TimestampError {
    #[error("Invalid PES timestamp marker bits")]
    InvalidMarkerBits,

    #[error("Invalid BCD digit")]
    InvalidBcdDigit,
}
