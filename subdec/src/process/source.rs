use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;

use crate::decoders::caption::{CaptionEngine, CaptionKind};

/// Byte supplier feeding a parser.
///
/// `read` may block (live demux) and may return fewer bytes than requested;
/// `Ok(0)` means "no data yet", not end of stream.
pub trait DataSource: Send + Sync {
    fn read(&self, buffer: &mut [u8]) -> Result<usize>;

    fn available_data_size(&self) -> usize;

    fn start(&self) -> bool {
        true
    }

    fn stop(&self) -> bool {
        true
    }

    fn update_parameter(&self, _kind: u32, _data: &[u8]) {}

    /// True once the source will never produce more bytes.
    fn at_end(&self) -> bool {
        false
    }

    /// Decode engine reached through the source's demux, if it has one.
    fn caption_engine(&self, _kind: CaptionKind) -> Option<Box<dyn CaptionEngine>> {
        None
    }
}

/// In-memory source, fed by the host with `push`.
#[derive(Debug, Default)]
pub struct MemorySource {
    buffer: Mutex<VecDeque<u8>>,
    finished: Mutex<bool>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: &[u8]) -> Self {
        let source = Self::default();
        source.push(data);
        source
    }

    pub fn push(&self, data: &[u8]) {
        self.buffer.lock().unwrap().extend(data);
    }

    /// Marks the end of input; `at_end` becomes true once drained.
    pub fn finish(&self) {
        *self.finished.lock().unwrap() = true;
    }
}

impl DataSource for MemorySource {
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut data = self.buffer.lock().unwrap();
        let n = buffer.len().min(data.len());
        for (dst, src) in buffer.iter_mut().zip(data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn available_data_size(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    fn at_end(&self) -> bool {
        *self.finished.lock().unwrap() && self.buffer.lock().unwrap().is_empty()
    }
}

#[test]
fn memory_source_partial_reads() -> Result<()> {
    let source = MemorySource::with_data(&[1, 2, 3, 4, 5]);
    let mut buf = [0u8; 3];

    assert_eq!(source.read(&mut buf)?, 3);
    assert_eq!(buf, [1, 2, 3]);
    assert_eq!(source.available_data_size(), 2);
    assert_eq!(source.read(&mut buf)?, 2);
    assert_eq!(source.read(&mut buf)?, 0);
    assert!(!source.at_end());
    source.finish();
    assert!(source.at_end());
    Ok(())
}
