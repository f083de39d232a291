use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::structs::item::SubtitleItem;

/// Bound for items decoded from an internally demuxed stream.
pub const INTERNAL_MAX_NUMBER_SPU_ITEM: usize = 20;

/// Bound for subtitles loaded from an external file.
pub const EXTERNAL_MAX_NUMBER_SPU_ITEM: usize = 1000;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<SubtitleItem>,
    closed: bool,
    evicted: usize,
}

/// Bounded FIFO of decoded items shared by a parsing task and a consumer.
///
/// Pushing never blocks: when the queue is full the oldest entry is evicted.
#[derive(Debug)]
pub struct DecodedItemQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl Default for DecodedItemQueue {
    fn default() -> Self {
        Self::new(INTERNAL_MAX_NUMBER_SPU_ITEM)
    }
}

impl DecodedItemQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes an item, evicting the oldest entries first if full.
    /// Returns false if the queue has been closed.
    pub fn push(&self, item: SubtitleItem) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return false;
        }

        while state.items.len() >= self.capacity {
            if let Some(old) = state.items.pop_front() {
                state.evicted += 1;
                debug!("Queue full ({}), dropping item at {}", self.capacity, old.pts);
            }
        }

        trace!("Queued {item}");
        state.items.push_back(item);
        drop(state);

        self.available.notify_all();
        true
    }

    /// Blocks until an item is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn pop(&self) -> Option<SubtitleItem> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SubtitleItem> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if state.closed || now >= deadline {
                return None;
            }
            state = self.available.wait_timeout(state, deadline - now).unwrap().0;
        }
    }

    pub fn try_pop(&self) -> Option<SubtitleItem> {
        self.state.lock().unwrap().items.pop_front()
    }

    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    /// Rejects further pushes and wakes every blocked consumer.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.available.notify_all();
    }

    pub fn reopen(&self) {
        self.state.lock().unwrap().closed = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evicted(&self) -> usize {
        self.state.lock().unwrap().evicted
    }

    /// Pixel/text sizes of the queued items, oldest first.
    pub fn snapshot(&self) -> Vec<(crate::structs::timestamp::Pts, usize)> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|item| (item.pts, item.payload.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::timestamp::Pts;
    use std::sync::Arc;
    use std::thread;

    fn item(n: u64) -> SubtitleItem {
        SubtitleItem::text(format!("item {n}"), Pts(n))
    }

    #[test]
    fn fifo_eviction_under_overflow() {
        let queue = DecodedItemQueue::new(4);
        for n in 0..100 {
            queue.push(item(n));
            assert!(queue.len() <= 4);
        }

        let left: Vec<u64> = std::iter::from_fn(|| queue.try_pop()).map(|i| i.pts.0).collect();
        assert_eq!(left, vec![96, 97, 98, 99]);
        assert_eq!(queue.evicted(), 96);
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        let queue = Arc::new(DecodedItemQueue::default());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(item(7));

        let popped = consumer.join().unwrap();
        assert_eq!(popped.map(|i| i.pts), Some(Pts(7)));
    }

    #[test]
    fn close_releases_consumers() {
        let queue = Arc::new(DecodedItemQueue::default());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(consumer.join().unwrap().is_none());
        assert!(!queue.push(item(1)));
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }
}
