/// Closed caption and SCTE-27 adapters over external decode engines.
pub mod caption;

/// Built-in EIA/CEA-608 caption engine.
pub mod cea608;

/// DVB bitmap subtitles (ETSI EN 300 743).
///
/// Keeps a per-page graph of regions, objects and colour tables and
/// composes a bitmap at each end-of-display-set segment.
pub mod dvb;

/// Blu-ray presentation graphics (PGS / SUP).
pub mod pgs;

/// DVB teletext with page navigation.
pub mod teletext;

/// Plain text, SSA/ASS and timed-text subtitles.
pub mod text;

/// DVD sub-picture units (VobSub).
pub mod vob;
