use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::Result;
use indicatif::MultiProgress;
use subdec::process::factory::ParserFactory;
use subdec::process::notify::{DataNotifier, Notifier};
use subdec::process::parse::{ParserConfig, ParserState};
use subdec::structs::item::SubtitleItem;
use subdec::structs::params::{
    CaptionChannel, CaptionParam, DvbParam, MixVideoState, SubtitleParams, TeletextEvent,
    TeletextLoadState, TeletextParam,
};
use subdec::structs::timestamp::dec2bcd;

use super::output::{ItemWriter, output_dir};
use super::progress::create_progress_bar;
use crate::cli::command::{Cli, DecodeArgs};
use crate::input::FileSource;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Host callbacks, logged.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn on_subtitle_available(&self, available: bool) {
        log::info!("Subtitle available: {available}");
    }

    fn on_dimension(&self, width: usize, height: usize) {
        log::info!("Subtitle canvas {width}x{height}");
    }

    fn on_language(&self, language: &str) {
        log::info!("Subtitle language: {language}");
    }

    fn on_channel_state(&self, state: i32, id: i32) {
        log::info!("Caption channel {id:#X} state {state}");
    }

    fn on_mix_video_state(&self, state: MixVideoState) {
        log::debug!("Teletext mix state {state:?}");
    }

    fn on_teletext_load_state(&self, state: TeletextLoadState) {
        log::info!("Teletext page {state:?}");
    }
}

/// Copies every item into a channel before it enters the bounded queue, so
/// that nothing is evicted while the writer catches up.
struct ItemForwarder(mpsc::Sender<SubtitleItem>);

impl DataNotifier for ItemForwarder {
    fn on_item_queued(&self, item: &SubtitleItem) {
        let _ = self.0.send(item.clone());
    }
}

fn subtitle_params(args: &DecodeArgs) -> SubtitleParams {
    let mut params = SubtitleParams::new(args.kind.subtitle_type());
    params.dvb = DvbParam {
        composition_id: args.composition_id,
        ancillary_id: args.ancillary_id,
    };
    params.teletext = TeletextParam {
        event: Some(TeletextEvent::GoToSubtitle),
        magazine: (args.teletext_page / 100) as u8,
        page: dec2bcd(args.teletext_page % 100) as u8,
    };
    params.caption = CaptionParam {
        channel: match args.caption_channel {
            2 => CaptionChannel::Cc2,
            3 => CaptionChannel::Cc3,
            4 => CaptionChannel::Cc4,
            _ => CaptionChannel::Cc1,
        },
        vfmt: 0,
    };
    params
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let subtitle_type = args.kind.subtitle_type();
    log::info!(
        "Decoding {subtitle_type} stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let dir = output_dir(&args.input, args.output_path.as_deref());
    let mut writer = ItemWriter::create(&dir, &args.input, subtitle_type)?;

    let config = ParserConfig {
        fail_level: cli.fail_level(),
        pgs_crop_quirk: args.pgs_crop_quirk,
        teletext_text_mode: args.text_mode,
        exit_at_end: true,
        ..Default::default()
    };

    let source = Arc::new(FileSource::open(&args.input)?);
    let parser = ParserFactory::create(&subtitle_params(args), source.clone(), config)?;

    let (tx, rx) = mpsc::channel();
    parser.start_parse(Arc::new(LogNotifier), Some(Arc::new(ItemForwarder(tx))))?;

    let pb = multi.map(create_progress_bar).transpose()?;
    if let Some(pb) = &pb {
        pb.set_message(format!("decoding {subtitle_type}"));
    }

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => {
                writer.write(&item)?;
                if let Some(pb) = &pb {
                    pb.inc(1);
                    pb.set_message(format!("{} bytes read, last item at {}", source.bytes_read(), item.pts));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if matches!(parser.state(), ParserState::Stop | ParserState::Exit) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    parser.stop_parse();
    while let Ok(item) = rx.try_recv() {
        writer.write(&item)?;
    }

    if let Some(pb) = &pb {
        pb.finish_with_message("done");
    }

    log::debug!("Parser state at exit:\n{}", parser.dump());
    let index = writer.finish()?;
    log::info!(
        "Decoded {} bytes of {subtitle_type}, index at {}",
        source.bytes_read(),
        index.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::command::StreamKind;
    use std::path::PathBuf;

    #[test]
    fn teletext_page_and_caption_channel() {
        let args = DecodeArgs {
            input: PathBuf::from("in.ts"),
            kind: StreamKind::Teletext,
            output_path: None,
            composition_id: Some(2),
            ancillary_id: None,
            teletext_page: 888,
            caption_channel: 3,
            pgs_crop_quirk: false,
            text_mode: false,
        };
        let params = subtitle_params(&args);
        assert_eq!((params.teletext.magazine, params.teletext.page), (8, 0x88));
        assert_eq!(params.teletext.event, Some(TeletextEvent::GoToSubtitle));
        assert_eq!(params.caption.channel, CaptionChannel::Cc3);
        assert_eq!(params.dvb.composition_id, Some(2));
    }
}
