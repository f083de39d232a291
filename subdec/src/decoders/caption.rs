use std::fmt::{Display, Formatter, Write as _};
use std::sync::Arc;

use anyhow::{Result, bail};
use log::{debug, info, warn};

use crate::decoders::cea608::Cea608Engine;
use crate::process::RECORD_TYPE_CC;
use crate::process::extract::{Framing, Record};
use crate::process::parse::{Decoder, ParserContext};
use crate::process::source::DataSource;
use crate::structs::item::SubtitleItem;
use crate::structs::params::{CaptionParam, ParserParameter, Scte27Param, SubtitleType};
use crate::structs::timestamp::Pts;
use crate::utils::errors::CaptionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptionKind {
    ClosedCaption,
    Scte27,
}

impl CaptionKind {
    pub fn name(self) -> &'static str {
        match self {
            CaptionKind::ClosedCaption => "closed caption",
            CaptionKind::Scte27 => "SCTE-27",
        }
    }
}

impl Display for CaptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine status reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionReport {
    Available(bool),
    ChannelState { state: i32, id: i32 },
    /// Engine or hardware failure; the stream is reported unavailable.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionEvent {
    Text {
        text: String,
        pts: Pts,
    },
    /// Packed `[b, g, r, a]` pixels at `(x, y)` on a `video_width` x
    /// `video_height` canvas.
    Bitmap {
        width: usize,
        height: usize,
        pixels: Vec<u8>,
        x: i32,
        y: i32,
        video_width: usize,
        video_height: usize,
        pts: Pts,
    },
    Report(CaptionReport),
}

/// Receives engine output, possibly from an engine-owned thread.
pub trait CaptionSink: Send + Sync {
    fn emit(&self, event: CaptionEvent);
}

/// A caption decode engine.
///
/// Engines attached to a demux read their own data after `start`; engines
/// without one are fed the parser's records through `feed`.
pub trait CaptionEngine: Send {
    fn name(&self) -> &str;

    fn start(&mut self, sink: Arc<dyn CaptionSink>) -> Result<()>;

    fn configure(&mut self, param: &ParserParameter) -> Result<()>;

    fn feed(&mut self, _data: &[u8], _pts: Pts, _sink: &dyn CaptionSink) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self);
}

/// Engine events become immediately presented items and host
/// notifications.
impl CaptionSink for ParserContext {
    fn emit(&self, event: CaptionEvent) {
        let item = match event {
            CaptionEvent::Text { text, pts } => {
                if text.is_empty() {
                    debug!("Caption cleared at {pts}");
                    return;
                }
                SubtitleItem::text(text, pts)
            }
            CaptionEvent::Bitmap {
                width,
                height,
                pixels,
                x,
                y,
                video_width,
                video_height,
                pts,
            } => SubtitleItem::bitmap(width, height, pixels, pts)
                .with_origin(x, y)
                .with_video_size(video_width, video_height),
            CaptionEvent::Report(CaptionReport::Available(available)) => {
                self.notifier().on_subtitle_available(available);
                return;
            }
            CaptionEvent::Report(CaptionReport::ChannelState { state, id }) => {
                self.notifier().on_channel_state(state, id);
                return;
            }
            CaptionEvent::Report(CaptionReport::Error(message)) => {
                warn!("Caption engine error: {message}");
                self.notifier().on_subtitle_available(false);
                return;
            }
        };

        let mut item = item;
        item.immediate_present = true;
        if let Err(e) = self.add_decoded_item(item) {
            debug!("Caption item dropped: {e}");
        }
    }
}

/// Closed-caption and SCTE-27 adapter.
///
/// The engine comes from the data source when it has one. Closed captions
/// fall back to the built-in CEA-608 engine; SCTE-27 cannot start without
/// a source engine.
pub struct CaptionDecoder {
    kind: CaptionKind,
    caption: CaptionParam,
    scte27: Scte27Param,
    engine: Option<Box<dyn CaptionEngine>>,
    started: bool,
    records_fed: usize,
}

impl CaptionDecoder {
    pub fn closed_caption(param: CaptionParam) -> Self {
        let mut engine = Cea608Engine::new();
        engine.set_channel(param.channel);
        Self {
            kind: CaptionKind::ClosedCaption,
            caption: param,
            scte27: Scte27Param::default(),
            engine: Some(Box::new(engine)),
            started: false,
            records_fed: 0,
        }
    }

    pub fn scte27(param: Scte27Param) -> Self {
        Self {
            kind: CaptionKind::Scte27,
            caption: CaptionParam::default(),
            scte27: param,
            engine: None,
            started: false,
            records_fed: 0,
        }
    }

    pub fn kind(&self) -> CaptionKind {
        self.kind
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.engine.as_ref().map(|engine| engine.name())
    }

    fn parameter(&self) -> ParserParameter {
        match self.kind {
            CaptionKind::ClosedCaption => ParserParameter::Caption(self.caption),
            CaptionKind::Scte27 => ParserParameter::Scte27(self.scte27),
        }
    }
}

impl Decoder for CaptionDecoder {
    fn subtitle_type(&self) -> SubtitleType {
        match self.kind {
            CaptionKind::ClosedCaption => SubtitleType::ClosedCaption,
            CaptionKind::Scte27 => SubtitleType::Scte27,
        }
    }

    fn framing(&self) -> Framing {
        Framing::Record
    }

    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
        if record.type_code != RECORD_TYPE_CC && !record.is_pes() {
            debug!("Ignoring record type {:#07X}", record.type_code);
            return Ok(());
        }
        let Some(engine) = self.engine.as_mut() else {
            bail!(CaptionError::NoEngine(self.kind.name()));
        };
        engine.feed(&record.payload, record.pts, ctx)?;
        self.records_fed += 1;
        Ok(())
    }

    fn on_start(&mut self, ctx: &Arc<ParserContext>, source: &Arc<dyn DataSource>) -> Result<()> {
        if let Some(engine) = source.caption_engine(self.kind) {
            info!("Using {} engine {} from the data source", self.kind, engine.name());
            self.engine = Some(engine);
        }

        let param = self.parameter();
        let Some(engine) = self.engine.as_mut() else {
            bail!(CaptionError::NoEngine(self.kind.name()));
        };
        engine.configure(&param)?;

        let sink: Arc<dyn CaptionSink> = ctx.clone();
        engine
            .start(sink)
            .map_err(|e| CaptionError::EngineStart(format!("{e:#}")))?;
        self.started = true;
        Ok(())
    }

    fn on_stop(&mut self) {
        if self.started {
            if let Some(engine) = self.engine.as_mut() {
                engine.stop();
            }
            self.started = false;
        }
    }

    fn update_parameter(&mut self, param: &ParserParameter, _ctx: &ParserContext) -> Result<()> {
        match (self.kind, param) {
            (CaptionKind::ClosedCaption, ParserParameter::Caption(caption)) => {
                info!("Caption channel {:?}, format {}", caption.channel, caption.vfmt);
                self.caption = *caption;
            }
            (CaptionKind::Scte27, ParserParameter::Scte27(scte27)) => {
                info!("SCTE-27 PID {:#06X}", scte27.pid);
                self.scte27 = *scte27;
            }
            _ => return Ok(()),
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.configure(param)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        let param = self.parameter();
        if let Some(engine) = self.engine.as_mut() {
            // reconfiguring drops any partially built caption
            if let Err(e) = engine.configure(&param) {
                warn!("Caption engine reset failed: {e:#}");
            }
        }
    }

    fn dump(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "  {}: engine {}, {}, {} records",
            self.kind,
            self.engine_name().unwrap_or("none"),
            if self.started { "started" } else { "stopped" },
            self.records_fed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::notify::Notifier;
    use crate::process::parse::ParserConfig;
    use crate::process::queue::INTERNAL_MAX_NUMBER_SPU_ITEM;
    use crate::process::source::MemorySource;
    use std::sync::Mutex;

    /// Engine reporting through the sink handed to `start`.
    struct MockEngine {
        log: Arc<Mutex<Vec<String>>>,
        sink: Option<Arc<dyn CaptionSink>>,
    }

    impl CaptionEngine for MockEngine {
        fn name(&self) -> &str {
            "mock"
        }

        fn start(&mut self, sink: Arc<dyn CaptionSink>) -> Result<()> {
            self.log.lock().unwrap().push("start".into());
            sink.emit(CaptionEvent::Report(CaptionReport::ChannelState { state: 1, id: 0x1FF }));
            sink.emit(CaptionEvent::Bitmap {
                width: 1,
                height: 1,
                pixels: vec![0, 0, 0xFF, 0xFF],
                x: 10,
                y: 20,
                video_width: 720,
                video_height: 480,
                pts: Pts(900),
            });
            self.sink = Some(sink);
            Ok(())
        }

        fn configure(&mut self, param: &ParserParameter) -> Result<()> {
            self.log.lock().unwrap().push(format!("{param:?}"));
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().unwrap().push("stop".into());
            if let Some(sink) = self.sink.take() {
                sink.emit(CaptionEvent::Report(CaptionReport::Error("detached".into())));
            }
        }
    }

    struct EngineSource {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DataSource for EngineSource {
        fn read(&self, _buffer: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn available_data_size(&self) -> usize {
            0
        }

        fn caption_engine(&self, kind: CaptionKind) -> Option<Box<dyn CaptionEngine>> {
            (kind == CaptionKind::Scte27).then(|| {
                Box::new(MockEngine {
                    log: self.log.clone(),
                    sink: None,
                }) as Box<dyn CaptionEngine>
            })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Notifier for Recorder {
        fn on_subtitle_available(&self, available: bool) {
            self.0.lock().unwrap().push(format!("available {available}"));
        }

        fn on_channel_state(&self, state: i32, id: i32) {
            self.0.lock().unwrap().push(format!("channel {state} {id:#X}"));
        }
    }

    fn context() -> Arc<ParserContext> {
        Arc::new(ParserContext::new(INTERNAL_MAX_NUMBER_SPU_ITEM, &ParserConfig::default()))
    }

    #[test]
    fn scte27_engine_from_source() -> Result<()> {
        let ctx = context();
        let recorder = Arc::new(Recorder::default());
        ctx.set_notifier(recorder.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        let source: Arc<dyn DataSource> = Arc::new(EngineSource { log: log.clone() });

        let mut decoder = CaptionDecoder::scte27(Scte27Param { pid: 0x1FF });
        decoder.on_start(&ctx, &source)?;
        assert_eq!(decoder.engine_name(), Some("mock"));

        let item = ctx.queue().try_pop().unwrap();
        assert!(item.immediate_present);
        assert_eq!((item.x, item.y, item.video_width), (10, 20, 720));
        assert_eq!(item.pixel(0, 0), Some(0xFFFF_0000));

        decoder.on_stop();
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["Scte27(Scte27Param { pid: 511 })", "start", "stop"]
        );
        assert_eq!(
            recorder.0.lock().unwrap().clone(),
            vec!["channel 1 0x1FF", "available true", "available false"]
        );
        Ok(())
    }

    #[test]
    fn scte27_requires_engine() {
        let ctx = context();
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new());
        let mut decoder = CaptionDecoder::scte27(Scte27Param::default());
        assert!(decoder.on_start(&ctx, &source).is_err());

        let record = Record {
            type_code: RECORD_TYPE_CC,
            pts: Pts(0),
            aux: 0,
            payload: Arc::from(&[0x94u8, 0x2C][..]),
        };
        assert!(decoder.decode(&record, &ctx).is_err());
    }

    #[test]
    fn closed_caption_falls_back_to_builtin() -> Result<()> {
        let ctx = context();
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new());
        let mut decoder = CaptionDecoder::closed_caption(CaptionParam::default());
        decoder.on_start(&ctx, &source)?;
        assert_eq!(decoder.engine_name(), Some("cea608"));

        // RDC, "Hi"
        let record = Record {
            type_code: RECORD_TYPE_CC,
            pts: Pts(4500),
            aux: 0,
            payload: Arc::from(&[0x14u8, 0x29, b'H', b'i'][..]),
        };
        decoder.decode(&record, &ctx)?;
        let item = ctx.queue().try_pop().unwrap();
        assert_eq!(item.as_text(), Some("Hi"));
        assert_eq!(item.pts, Pts(4500));
        assert!(item.immediate_present);

        let odd = Record {
            payload: Arc::from(&[0x14u8][..]),
            ..record
        };
        assert!(decoder.decode(&odd, &ctx).is_err());
        Ok(())
    }

    #[test]
    fn reset_clears_builtin_caption() -> Result<()> {
        let ctx = context();
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new());
        let mut decoder = CaptionDecoder::closed_caption(CaptionParam::default());
        decoder.on_start(&ctx, &source)?;

        let record = Record {
            type_code: RECORD_TYPE_CC,
            pts: Pts(4500),
            aux: 0,
            payload: Arc::from(&[0x14u8, 0x29, b'H', b'i'][..]),
        };
        decoder.decode(&record, &ctx)?;
        assert_eq!(ctx.queue().try_pop().unwrap().as_text(), Some("Hi"));

        decoder.reset();

        // back in pop-on mode, so plain text stays off screen
        let text = Record {
            payload: Arc::from(&b"Yo"[..]),
            ..record.clone()
        };
        decoder.decode(&text, &ctx)?;
        assert!(ctx.queue().try_pop().is_none());

        let paint = Record {
            payload: Arc::from(&[0x14u8, 0x29, b'O', b'k'][..]),
            ..record
        };
        decoder.decode(&paint, &ctx)?;
        assert_eq!(ctx.queue().try_pop().unwrap().as_text(), Some("Ok"));
        Ok(())
    }
}
