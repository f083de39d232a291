use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, bail};
use log::{debug, error, info, trace, warn};

use crate::process::extract::{Extractor, Framing, Record};
use crate::process::notify::{AvailabilityTracker, DataNotifier, Notifier, NullNotifier};
use crate::process::queue::{
    DecodedItemQueue, EXTERNAL_MAX_NUMBER_SPU_ITEM, INTERNAL_MAX_NUMBER_SPU_ITEM,
};
use crate::process::source::DataSource;
use crate::structs::item::SubtitleItem;
use crate::structs::params::{ParserParameter, SubtitleType};
use crate::utils::errors::ParserError;

const READ_CHUNK: usize = 64 * 1024;

/// Lifecycle state shared by a parser and its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParserState {
    Init,
    Playing,
    Stop,
    Exit,
}

impl Display for ParserState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParserState::Init => "init",
            ParserState::Playing => "playing",
            ParserState::Stop => "stop",
            ParserState::Exit => "exit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Validation problems at or above this level abort the record.
    pub fail_level: log::Level,
    /// Wait between polls when the source has no data.
    pub idle_wait: Duration,
    /// Report `subtitle_available(false)` after this long without items.
    pub availability_timeout: Duration,
    /// Quarter exactly 1920x1080 PGS bitmaps.
    pub pgs_crop_quirk: bool,
    /// Emit teletext pages as text instead of bitmaps.
    pub teletext_text_mode: bool,
    /// Stop the task once the source reports end of data.
    pub exit_at_end: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            idle_wait: Duration::from_millis(10),
            availability_timeout: Duration::from_secs(60),
            pgs_crop_quirk: false,
            teletext_text_mode: false,
            exit_at_end: false,
        }
    }
}

/// State shared between a parser, its task and engine callbacks.
///
/// Items enter the queue only through [`add_decoded_item`](Self::add_decoded_item),
/// which refuses them once the parser has stopped.
pub struct ParserContext {
    state: Mutex<ParserState>,
    queue: DecodedItemQueue,
    notifier: Mutex<Arc<dyn Notifier>>,
    data_notifier: Mutex<Option<Arc<dyn DataNotifier>>>,
    availability: AvailabilityTracker,
    pub fail_level: log::Level,
}

impl ParserContext {
    pub fn new(capacity: usize, config: &ParserConfig) -> Self {
        Self {
            state: Mutex::new(ParserState::Init),
            queue: DecodedItemQueue::new(capacity),
            notifier: Mutex::new(Arc::new(NullNotifier)),
            data_notifier: Mutex::new(None),
            availability: AvailabilityTracker::new(config.availability_timeout),
            fail_level: config.fail_level,
        }
    }

    pub fn state(&self) -> ParserState {
        *self.state.lock().unwrap()
    }

    /// Applies a state change. States only move forward, except that a
    /// stopped parser may be restarted into `Init`.
    fn set_state(&self, next: ParserState) -> bool {
        let mut state = self.state.lock().unwrap();
        let allowed = next >= *state || (*state >= ParserState::Stop && next == ParserState::Init);
        if allowed {
            trace!("Parser state {} -> {}", *state, next);
            *state = next;
        }
        allowed
    }

    pub fn is_stopped(&self) -> bool {
        self.state() >= ParserState::Stop
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.lock().unwrap().clone()
    }

    pub fn set_notifier(&self, notifier: Arc<dyn Notifier>) {
        *self.notifier.lock().unwrap() = notifier;
    }

    pub fn queue(&self) -> &DecodedItemQueue {
        &self.queue
    }

    /// Queues an item unless the parser is stopping or the payload is empty.
    pub fn add_decoded_item(&self, item: SubtitleItem) -> Result<()> {
        if self.is_stopped() {
            bail!(ParserError::ItemRejected("parser stopped"));
        }
        if item.payload.is_empty() {
            bail!(ParserError::ItemRejected("empty payload"));
        }

        let data_notifier = self.data_notifier.lock().unwrap().clone();
        if let Some(data_notifier) = data_notifier {
            data_notifier.on_item_queued(&item);
        }

        if !self.queue.push(item) {
            bail!(ParserError::ItemRejected("queue closed"));
        }
        self.availability.item_decoded(self.notifier().as_ref());
        Ok(())
    }

    fn poll_availability(&self) {
        self.availability.poll(self.notifier().as_ref());
    }
}

/// One subtitle format decoder, driven by a [`Parser`].
pub trait Decoder: Send {
    fn subtitle_type(&self) -> SubtitleType;

    fn framing(&self) -> Framing {
        Framing::default()
    }

    /// Decodes one framed record, queueing any finished items on `ctx`.
    fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()>;

    /// Called before the task starts; engine-backed decoders start here.
    fn on_start(&mut self, _ctx: &Arc<ParserContext>, _source: &Arc<dyn DataSource>) -> Result<()> {
        Ok(())
    }

    fn on_stop(&mut self) {}

    /// Live parameter change; decoders without live parameters ignore it.
    fn update_parameter(&mut self, _param: &ParserParameter, _ctx: &ParserContext) -> Result<()> {
        Ok(())
    }

    /// Drops partially assembled state, e.g. after a seek.
    fn reset(&mut self) {}

    fn dump(&self, _out: &mut String) {}
}

pub type SharedDecoder = Arc<Mutex<Box<dyn Decoder>>>;

/// Locks the decoder even if a panicking parsing task poisoned it, so that
/// teardown and diagnostics keep working.
fn lock_decoder(decoder: &SharedDecoder) -> MutexGuard<'_, Box<dyn Decoder>> {
    decoder.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ParseTask {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs one decoder against a data source on a dedicated task.
///
/// ```rust
/// use std::sync::Arc;
/// use subdec::process::{EXAMPLE_DATA, factory::ParserFactory, source::MemorySource};
/// use subdec::process::notify::NullNotifier;
/// use subdec::structs::params::{SubtitleParams, SubtitleType};
///
/// let source = Arc::new(MemorySource::with_data(EXAMPLE_DATA));
/// let parser = ParserFactory::create(&SubtitleParams::new(SubtitleType::Dvb), source, Default::default())?;
///
/// parser.start_parse(Arc::new(NullNotifier), None)?;
/// let item = parser.consume_decoded_item().unwrap();
/// assert_eq!((item.width, item.height), (2, 2));
/// parser.stop_parse();
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Parser {
    decoder: SharedDecoder,
    ctx: Arc<ParserContext>,
    source: Arc<dyn DataSource>,
    config: ParserConfig,
    task: Mutex<Option<ParseTask>>,
    subtitle_type: SubtitleType,
}

impl Parser {
    pub fn new(
        decoder: Box<dyn Decoder>,
        source: Arc<dyn DataSource>,
        config: ParserConfig,
        external: bool,
    ) -> Self {
        let capacity = if external {
            EXTERNAL_MAX_NUMBER_SPU_ITEM
        } else {
            INTERNAL_MAX_NUMBER_SPU_ITEM
        };
        let subtitle_type = decoder.subtitle_type();

        Self {
            decoder: Arc::new(Mutex::new(decoder)),
            ctx: Arc::new(ParserContext::new(capacity, &config)),
            source,
            config,
            task: Mutex::new(None),
            subtitle_type,
        }
    }

    pub fn subtitle_type(&self) -> SubtitleType {
        self.subtitle_type
    }

    pub fn state(&self) -> ParserState {
        self.ctx.state()
    }

    pub fn context(&self) -> &Arc<ParserContext> {
        &self.ctx
    }

    /// Enters `Init` and spawns the parsing task.
    pub fn start_parse(
        &self,
        notifier: Arc<dyn Notifier>,
        data_notifier: Option<Arc<dyn DataNotifier>>,
    ) -> Result<()> {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            bail!(ParserError::AlreadyRunning);
        }

        self.ctx.set_notifier(notifier);
        *self.ctx.data_notifier.lock().unwrap() = data_notifier;
        self.ctx.set_state(ParserState::Init);
        self.ctx.queue.reopen();

        if !self.source.start() {
            bail!(ParserError::SourceStartFailed);
        }
        lock_decoder(&self.decoder).on_start(&self.ctx, &self.source)?;

        let (shutdown, shutdown_rx) = mpsc::channel::<()>();
        let decoder = self.decoder.clone();
        let ctx = self.ctx.clone();
        let source = self.source.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name(format!("subdec-{}", self.subtitle_type))
            .spawn(move || {
                let framing = lock_decoder(&decoder).framing();
                let mut extractor = Extractor::new(framing);
                let mut buffer = vec![0u8; READ_CHUNK];

                loop {
                    if ctx.is_stopped() {
                        break;
                    }

                    let read = match source.read(&mut buffer) {
                        Ok(n) => n,
                        Err(e) => {
                            warn!("Data source read failed: {e:#}");
                            0
                        }
                    };

                    if read > 0 {
                        extractor.push_bytes(&buffer[..read]);
                        Self::parse_step(&mut extractor, &decoder, &ctx);
                    } else if config.exit_at_end && source.at_end() {
                        info!("Data source exhausted");
                        ctx.set_state(ParserState::Exit);
                        ctx.queue.close();
                        break;
                    }

                    ctx.poll_availability();

                    if read == 0 {
                        match shutdown_rx.recv_timeout(config.idle_wait) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                    } else if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                }

                debug!("Parsing task finished in state {}", ctx.state());
            })?;

        *task = Some(ParseTask { shutdown, handle });
        info!("Started {} parser", self.subtitle_type);
        Ok(())
    }

    fn parse_step(extractor: &mut Extractor, decoder: &SharedDecoder, ctx: &ParserContext) {
        for result in extractor.by_ref() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    debug!("Resync: {e}");
                    continue;
                }
            };

            if ctx.state() == ParserState::Init {
                ctx.set_state(ParserState::Playing);
            }

            let mut decoder = lock_decoder(decoder);
            if let Err(e) = decoder.decode(&record, ctx) {
                warn!(
                    "{} record at {} dropped: {e:#}",
                    decoder.subtitle_type(),
                    record.pts
                );
            }
        }
    }

    /// Stops the task and waits for it. Only the first call does anything;
    /// later calls return false.
    pub fn stop_parse(&self) -> bool {
        let Some(task) = self.task.lock().unwrap().take() else {
            debug!("stop_parse: parser not running");
            return false;
        };

        self.ctx.set_state(ParserState::Stop);
        self.ctx.queue.close();
        let _ = task.shutdown.send(());

        if task.handle.join().is_err() {
            error!("{}", ParserError::TaskPanicked);
        }

        // a decoder that panicked mid-record is still told to stop
        lock_decoder(&self.decoder).on_stop();
        self.source.stop();
        info!("Stopped {} parser", self.subtitle_type);
        true
    }

    /// Adds an item produced outside the parsing task.
    pub fn add_decoded_item(&self, item: SubtitleItem) -> Result<()> {
        self.ctx.add_decoded_item(item)
    }

    /// Blocks until an item is available; `None` after the parser stopped
    /// and the queue drained.
    pub fn consume_decoded_item(&self) -> Option<SubtitleItem> {
        self.ctx.queue.pop()
    }

    pub fn consume_decoded_item_timeout(&self, timeout: Duration) -> Option<SubtitleItem> {
        self.ctx.queue.pop_timeout(timeout)
    }

    pub fn try_consume_decoded_item(&self) -> Option<SubtitleItem> {
        self.ctx.queue.try_pop()
    }

    pub fn reset_for_seek(&self) {
        let dropped = self.ctx.queue.clear();
        lock_decoder(&self.decoder).reset();
        debug!("Seek reset dropped {dropped} items");
    }

    /// Forwards a live parameter change to the decoder under its lock.
    pub fn update_parameter(&self, param: &ParserParameter) -> Result<()> {
        lock_decoder(&self.decoder).update_parameter(param, &self.ctx)
    }

    pub fn dump(&self) -> String {
        let mut out = format!(
            "{} parser: state {}, {} queued, {} evicted\n",
            self.subtitle_type,
            self.ctx.state(),
            self.ctx.queue.len(),
            self.ctx.queue.evicted()
        );
        for (pts, len) in self.ctx.queue.snapshot() {
            out.push_str(&format!("  item @ {pts}: {len} bytes\n"));
        }
        lock_decoder(&self.decoder).dump(&mut out);
        out
    }
}

impl Drop for Parser {
    fn drop(&mut self) {
        self.stop_parse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::source::MemorySource;
    use crate::structs::timestamp::Pts;

    struct EchoDecoder;

    impl Decoder for EchoDecoder {
        fn subtitle_type(&self) -> SubtitleType {
            SubtitleType::MkvStr
        }

        fn decode(&mut self, record: &Record, ctx: &ParserContext) -> Result<()> {
            let text = String::from_utf8_lossy(&record.payload).into_owned();
            ctx.add_decoded_item(SubtitleItem::text(text, record.pts))
        }
    }

    fn parser(source: Arc<MemorySource>) -> Parser {
        Parser::new(Box::new(EchoDecoder), source, ParserConfig::default(), false)
    }

    #[test]
    fn lifecycle_and_idempotent_stop() -> Result<()> {
        let source = Arc::new(MemorySource::new());
        let parser = parser(source.clone());
        assert_eq!(parser.state(), ParserState::Init);

        parser.start_parse(Arc::new(NullNotifier), None)?;
        assert!(parser.start_parse(Arc::new(NullNotifier), None).is_err());

        source.push(&crate::process::extract::frame_record(
            crate::process::RECORD_TYPE_TEXT,
            4500,
            0,
            b"hi",
        ));
        let item = parser
            .consume_decoded_item_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(item.as_text(), Some("hi"));
        assert_eq!(item.pts, Pts(4500));
        assert_eq!(parser.state(), ParserState::Playing);

        assert!(parser.stop_parse());
        assert!(!parser.stop_parse());
        assert_eq!(parser.state(), ParserState::Stop);
        assert!(parser.consume_decoded_item().is_none());
        Ok(())
    }

    #[test]
    fn stopped_parser_rejects_items() -> Result<()> {
        let parser = parser(Arc::new(MemorySource::new()));
        parser.start_parse(Arc::new(NullNotifier), None)?;
        parser.stop_parse();

        assert!(parser.add_decoded_item(SubtitleItem::text("late", Pts(0))).is_err());
        assert!(parser.try_consume_decoded_item().is_none());
        Ok(())
    }

    #[test]
    fn empty_items_rejected() {
        let parser = parser(Arc::new(MemorySource::new()));
        assert!(parser.add_decoded_item(SubtitleItem::text("", Pts(0))).is_err());
        assert!(parser.add_decoded_item(SubtitleItem::text("x", Pts(0))).is_ok());
        assert_eq!(parser.try_consume_decoded_item().map(|i| i.pts), Some(Pts(0)));
    }

    #[test]
    fn overflow_keeps_most_recent_items() -> Result<()> {
        let parser = parser(Arc::new(MemorySource::new()));
        let total = INTERNAL_MAX_NUMBER_SPU_ITEM + 5;
        for n in 0..total {
            parser.add_decoded_item(SubtitleItem::text(format!("{n}"), Pts(n as u64)))?;
        }

        let kept: Vec<u64> = std::iter::from_fn(|| parser.try_consume_decoded_item())
            .map(|item| item.pts.0)
            .collect();
        let expected: Vec<u64> = (5..total as u64).collect();
        assert_eq!(kept.len(), INTERNAL_MAX_NUMBER_SPU_ITEM);
        assert_eq!(kept, expected);
        Ok(())
    }

    #[test]
    fn seek_reset_clears_queue() -> Result<()> {
        let parser = parser(Arc::new(MemorySource::new()));
        parser.add_decoded_item(SubtitleItem::text("a", Pts(1)))?;
        parser.reset_for_seek();
        assert!(parser.try_consume_decoded_item().is_none());
        assert!(parser.dump().contains("0 queued"));
        Ok(())
    }

    struct PanickingDecoder;

    impl Decoder for PanickingDecoder {
        fn subtitle_type(&self) -> SubtitleType {
            SubtitleType::MkvStr
        }

        fn decode(&mut self, _record: &Record, _ctx: &ParserContext) -> Result<()> {
            panic!("corrupt decoder state");
        }
    }

    #[test]
    fn stop_after_decoder_panic() -> Result<()> {
        let source = Arc::new(MemorySource::new());
        source.push(&crate::process::extract::frame_record(
            crate::process::RECORD_TYPE_TEXT,
            4500,
            0,
            b"boom",
        ));
        let parser = Parser::new(
            Box::new(PanickingDecoder),
            source,
            ParserConfig::default(),
            false,
        );
        parser.start_parse(Arc::new(NullNotifier), None)?;

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !parser.decoder.is_poisoned() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(parser.decoder.is_poisoned());

        assert!(parser.dump().contains("0 queued"));
        assert!(parser.update_parameter(&ParserParameter::Dvb(Default::default())).is_ok());
        parser.reset_for_seek();
        assert!(parser.stop_parse());
        assert!(!parser.stop_parse());
        Ok(())
    }
}
