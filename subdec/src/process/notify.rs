use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use crate::structs::item::SubtitleItem;
use crate::structs::params::{MixVideoState, TeletextLoadState};

/// Host callbacks. Every method defaults to a no-op.
pub trait Notifier: Send + Sync {
    fn on_subtitle_available(&self, _available: bool) {}

    fn on_dimension(&self, _width: usize, _height: usize) {}

    fn on_language(&self, _language: &str) {}

    fn on_channel_state(&self, _state: i32, _id: i32) {}

    fn on_mix_video_state(&self, _state: MixVideoState) {}

    fn on_teletext_load_state(&self, _state: TeletextLoadState) {}
}

/// Told about every item accepted into the queue.
pub trait DataNotifier: Send + Sync {
    fn on_item_queued(&self, item: &SubtitleItem);
}

/// Notifier that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

#[derive(Debug)]
struct AvailabilityState {
    available: bool,
    last_item: Option<Instant>,
}

/// Reports availability transitions: `true` on the first decoded item,
/// `false` once no item has arrived for `timeout`.
#[derive(Debug)]
pub struct AvailabilityTracker {
    state: Mutex<AvailabilityState>,
    timeout: Duration,
}

impl AvailabilityTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(AvailabilityState {
                available: false,
                last_item: None,
            }),
            timeout,
        }
    }

    pub fn item_decoded(&self, notifier: &dyn Notifier) {
        let mut state = self.state.lock().unwrap();
        state.last_item = Some(Instant::now());
        if !state.available {
            state.available = true;
            debug!("Subtitle data available");
            notifier.on_subtitle_available(true);
        }
    }

    /// Checks the timeout; called from the parsing loop.
    pub fn poll(&self, notifier: &dyn Notifier) {
        let mut state = self.state.lock().unwrap();
        if !state.available {
            return;
        }
        if state.last_item.is_some_and(|t| t.elapsed() >= self.timeout) {
            state.available = false;
            debug!("No subtitle data for {:?}", self.timeout);
            notifier.on_subtitle_available(false);
        }
    }

    pub fn force_unavailable(&self, notifier: &dyn Notifier) {
        let mut state = self.state.lock().unwrap();
        state.available = false;
        state.last_item = None;
        notifier.on_subtitle_available(false);
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().unwrap().available
    }
}
