#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Subtitle decoding pipeline for broadcast and disc streams: DVB bitmap
//! subtitles, Blu-ray PGS, DVD sub-pictures, DVB teletext, closed captions
//! (CEA-608, SCTE-27) and text formats.
//!
//! ### Stream Organization
//!
//! **Framing**: Soft-demux `AMLU` records, private stream 1 PES packets or
//! self-framing PGS segments.
//! **Decoding**: One [`process::parse::Decoder`] per negotiated subtitle type,
//! turning records into [`structs::item::SubtitleItem`]s.
//!
//! ### Item Delivery
//!
//! A parsing task reads the [`process::source::DataSource`], decodes records
//! and pushes items into a bounded queue that drops the oldest entry when
//! full. Hosts consume items and receive [`process::notify::Notifier`]
//! callbacks for availability, dimensions and teletext state.
//!
//! ## Quick Start
//!
//! 1. Pick the decoder with [`process::factory::ParserFactory`]
//! 2. Start the [`process::parse::Parser`] against a data source
//! 3. Consume decoded items from the queue
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subdec::process::{EXAMPLE_DATA, factory::ParserFactory, notify::NullNotifier};
//! use subdec::process::{parse::ParserConfig, source::MemorySource};
//! use subdec::structs::params::{SubtitleParams, SubtitleType};
//!
//! let source = Arc::new(MemorySource::with_data(EXAMPLE_DATA));
//! source.finish();
//!
//! let params = SubtitleParams::new(SubtitleType::Dvb);
//! let config = ParserConfig {
//!     exit_at_end: true,
//!     ..Default::default()
//! };
//! let parser = ParserFactory::create(&params, source, config)?;
//! parser.start_parse(Arc::new(NullNotifier), None)?;
//!
//! while let Some(item) = parser.consume_decoded_item() {
//!     println!("{item}");
//! }
//! parser.stop_parse();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Processing pipeline for subtitle streams.
///
/// 1. **Record Extraction** ([`process::extract`]): Locates records, PES
///    packets and PGS segments in the byte stream.
///
/// 2. **Parsing** ([`process::parse`]): Runs the parsing task and owns the
///    decoded-item queue.
///
/// 3. **Selection** ([`process::factory`]): Maps a subtitle type to its
///    decoder.
pub mod process;

/// Subtitle format decoders.
pub mod decoders;

/// Data structures shared across decoders.
///
/// - **Items** ([`structs::item`]): Decoded bitmaps and text
/// - **Parameters** ([`structs::params`]): Negotiated types and live parameters
/// - **Timestamps** ([`structs::timestamp`]): 90 kHz presentation times
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Colour** ([`utils::yuv`]): YCbCr conversion and pixel packing
pub mod utils;
