//! Negotiated subtitle type and per-format parameter blocks.

use std::fmt::{Display, Formatter};

/// Subtitle stream type as negotiated with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubtitleType {
    Vob = 1,
    Pgs = 2,
    MkvStr = 3,
    Ssa = 4,
    MkvVob = 5,
    Dvb = 6,
    TimedText = 7,
    IdxSub = 8,
    DvbTeletext = 9,
    ClosedCaption = 10,
    Scte27 = 11,
    External = 12,
    Unknown = 0xFF,
}

impl From<u8> for SubtitleType {
    fn from(value: u8) -> Self {
        match value {
            1 => SubtitleType::Vob,
            2 => SubtitleType::Pgs,
            3 => SubtitleType::MkvStr,
            4 => SubtitleType::Ssa,
            5 => SubtitleType::MkvVob,
            6 => SubtitleType::Dvb,
            7 => SubtitleType::TimedText,
            8 => SubtitleType::IdxSub,
            9 => SubtitleType::DvbTeletext,
            10 => SubtitleType::ClosedCaption,
            11 => SubtitleType::Scte27,
            12 => SubtitleType::External,
            _ => SubtitleType::Unknown,
        }
    }
}

impl Display for SubtitleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubtitleType::Vob => "VOB",
            SubtitleType::Pgs => "PGS",
            SubtitleType::MkvStr => "MKV text",
            SubtitleType::Ssa => "SSA/ASS",
            SubtitleType::MkvVob => "MKV VOB",
            SubtitleType::Dvb => "DVB",
            SubtitleType::TimedText => "timed text",
            SubtitleType::IdxSub => "IDX/SUB",
            SubtitleType::DvbTeletext => "DVB teletext",
            SubtitleType::ClosedCaption => "closed caption",
            SubtitleType::Scte27 => "SCTE-27",
            SubtitleType::External => "external",
            SubtitleType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How the presentation layer should lay out a type's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCategory {
    Bitmap,
    Text,
}

impl SubtitleType {
    pub fn category(self) -> DisplayCategory {
        match self {
            SubtitleType::Vob
            | SubtitleType::Pgs
            | SubtitleType::MkvVob
            | SubtitleType::Dvb
            | SubtitleType::IdxSub
            | SubtitleType::DvbTeletext
            | SubtitleType::Scte27 => DisplayCategory::Bitmap,
            SubtitleType::MkvStr
            | SubtitleType::Ssa
            | SubtitleType::TimedText
            | SubtitleType::ClosedCaption
            | SubtitleType::External
            | SubtitleType::Unknown => DisplayCategory::Text,
        }
    }
}

/// DVB page selection; `None` accepts any page id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DvbParam {
    pub composition_id: Option<u16>,
    pub ancillary_id: Option<u16>,
}

/// Interactive teletext command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeletextEvent {
    /// Colour-key navigation, 1 (red) to 4 (blue).
    QuickNavigate(u8),
    NextPage,
    PreviousPage,
    MixVideo,
    BackPage,
    ForwardPage,
    Clear,
    Hold,
    DoubleHeight,
    NextSubPage,
    PreviousSubPage,
    DoubleScrollUp,
    DoubleScrollDown,
    IndexPage,
    GoToPage,
    GoToSubtitle,
    Digit(u8),
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeletextParam {
    pub event: Option<TeletextEvent>,
    /// Magazine number for `GoToPage`/`GoToSubtitle`; 0 selects magazine 8.
    pub magazine: u8,
    /// Page within the magazine, hex-coded (`0x88` for page x88).
    pub page: u8,
}

impl Default for TeletextParam {
    fn default() -> Self {
        Self {
            event: None,
            magazine: 1,
            page: 0x00,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionChannel {
    Cc1,
    Cc2,
    Cc3,
    Cc4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionParam {
    pub channel: CaptionChannel,
    pub vfmt: i32,
}

impl Default for CaptionParam {
    fn default() -> Self {
        Self {
            channel: CaptionChannel::Cc1,
            vfmt: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scte27Param {
    pub pid: u16,
}

/// Live parameter change forwarded through `update_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserParameter {
    Dvb(DvbParam),
    Teletext(TeletextParam),
    Caption(CaptionParam),
    Scte27(Scte27Param),
}

/// Type/parameter selection record handed to the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitleParams {
    pub subtitle_type: SubtitleType,
    pub dvb: DvbParam,
    pub teletext: TeletextParam,
    pub caption: CaptionParam,
    pub scte27: Scte27Param,
    /// Subtitle file loaded by the host rather than demuxed from the stream.
    pub external: bool,
}

impl SubtitleParams {
    pub fn new(subtitle_type: SubtitleType) -> Self {
        Self {
            subtitle_type,
            dvb: DvbParam::default(),
            teletext: TeletextParam::default(),
            caption: CaptionParam::default(),
            scte27: Scte27Param::default(),
            external: subtitle_type == SubtitleType::External,
        }
    }
}

/// Background mixing of teletext pages over video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixVideoState {
    Black,
    Transparent,
    HalfScreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeletextLoadState {
    Searching,
    Found,
    NotFound,
}

#[test]
fn type_ids_and_categories() {
    assert_eq!(SubtitleType::from(6), SubtitleType::Dvb);
    assert_eq!(SubtitleType::from(42), SubtitleType::Unknown);
    assert_eq!(SubtitleType::Pgs.category(), DisplayCategory::Bitmap);
    assert_eq!(SubtitleType::Ssa.category(), DisplayCategory::Text);
    assert!(SubtitleParams::new(SubtitleType::External).external);
}
