use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::decoders::caption::CaptionDecoder;
use crate::decoders::dvb::DvbDecoder;
use crate::decoders::pgs::PgsDecoder;
use crate::decoders::teletext::TeletextDecoder;
use crate::decoders::text::TextDecoder;
use crate::decoders::vob::VobDecoder;
use crate::process::parse::{Decoder, Parser, ParserConfig};
use crate::process::source::DataSource;
use crate::structs::params::{DisplayCategory, ParserParameter, SubtitleParams, SubtitleType};

/// Builds the decoder matching a negotiated subtitle type.
pub struct ParserFactory;

impl ParserFactory {
    /// Creates the decoder for `params` alone, without a parser around it.
    pub fn create_decoder(params: &SubtitleParams, config: &ParserConfig) -> Box<dyn Decoder> {
        match params.subtitle_type {
            SubtitleType::Dvb => Box::new(DvbDecoder::new(params.dvb)),
            SubtitleType::Pgs => Box::new(PgsDecoder::new(config.pgs_crop_quirk)),
            SubtitleType::Vob | SubtitleType::IdxSub => Box::new(VobDecoder::new(false)),
            SubtitleType::MkvVob => Box::new(VobDecoder::new(true)),
            SubtitleType::DvbTeletext => Box::new(TeletextDecoder::new(config.teletext_text_mode)),
            SubtitleType::ClosedCaption => Box::new(CaptionDecoder::closed_caption(params.caption)),
            SubtitleType::Scte27 => Box::new(CaptionDecoder::scte27(params.scte27)),
            SubtitleType::MkvStr
            | SubtitleType::Ssa
            | SubtitleType::TimedText
            | SubtitleType::External => Box::new(TextDecoder::new(params.subtitle_type)),
            SubtitleType::Unknown => {
                warn!("Unknown subtitle type, falling back to text decoder");
                Box::new(TextDecoder::new(SubtitleType::Unknown))
            }
        }
    }

    /// Creates a parser for `params`, forwarding the type's parameter
    /// block before parsing starts.
    pub fn create(
        params: &SubtitleParams,
        source: Arc<dyn DataSource>,
        config: ParserConfig,
    ) -> Result<Parser> {
        let decoder = Self::create_decoder(params, &config);
        info!(
            "Creating {} parser for type {}",
            decoder.subtitle_type(),
            params.subtitle_type
        );

        let parser = Parser::new(decoder, source, config, params.external);

        match params.subtitle_type {
            SubtitleType::DvbTeletext => {
                parser.update_parameter(&ParserParameter::Teletext(params.teletext))?
            }
            SubtitleType::ClosedCaption => {
                parser.update_parameter(&ParserParameter::Caption(params.caption))?
            }
            SubtitleType::Scte27 => {
                parser.update_parameter(&ParserParameter::Scte27(params.scte27))?
            }
            _ => {}
        }

        Ok(parser)
    }

    pub fn display_category(subtitle_type: SubtitleType) -> DisplayCategory {
        subtitle_type.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::source::MemorySource;

    #[test]
    fn selects_decoder_by_type() {
        let config = ParserConfig::default();
        for (ty, expected) in [
            (SubtitleType::Dvb, SubtitleType::Dvb),
            (SubtitleType::Pgs, SubtitleType::Pgs),
            (SubtitleType::MkvVob, SubtitleType::MkvVob),
            (SubtitleType::IdxSub, SubtitleType::Vob),
            (SubtitleType::DvbTeletext, SubtitleType::DvbTeletext),
            (SubtitleType::ClosedCaption, SubtitleType::ClosedCaption),
            (SubtitleType::Scte27, SubtitleType::Scte27),
            (SubtitleType::Ssa, SubtitleType::Ssa),
        ] {
            let decoder = ParserFactory::create_decoder(&SubtitleParams::new(ty), &config);
            assert_eq!(decoder.subtitle_type(), expected);
        }
    }

    #[test]
    fn unknown_type_falls_back_to_text() -> Result<()> {
        let params = SubtitleParams::new(SubtitleType::from(0x42));
        let parser = ParserFactory::create(
            &params,
            Arc::new(MemorySource::new()),
            ParserConfig::default(),
        )?;
        assert_eq!(parser.subtitle_type(), SubtitleType::Unknown);
        assert_eq!(
            ParserFactory::display_category(parser.subtitle_type()),
            DisplayCategory::Text
        );
        Ok(())
    }
}
