use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use subdec::process::source::DataSource;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    is_pipe: bool,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let is_pipe = input_path.as_ref().to_string_lossy() == "-";

        let reader: Box<dyn Read + Send> = if is_pipe {
            Box::new(io::stdin())
        } else {
            Box::new(BufReader::new(File::open(input_path)?))
        };

        Ok(Self { reader, is_pipe })
    }

    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.reader.read(buffer)?)
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.read_chunk(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            if !callback(&buffer[..bytes_read])? {
                break;
            }
        }

        Ok(())
    }
}

/// Data source over a file or stdin; ends at the first empty read.
pub struct FileSource {
    reader: Mutex<InputReader>,
    eof: AtomicBool,
    bytes_read: AtomicU64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        Ok(Self {
            reader: Mutex::new(InputReader::new(input_path)?),
            eof: AtomicBool::new(false),
            bytes_read: AtomicU64::new(0),
        })
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

impl DataSource for FileSource {
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        if self.eof.load(Ordering::Acquire) {
            return Ok(0);
        }
        let n = self.reader.lock().unwrap().read_chunk(buffer)?;
        if n == 0 {
            self.eof.store(true, Ordering::Release);
        }
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn available_data_size(&self) -> usize {
        0
    }

    fn at_end(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }
}

#[test]
fn file_source_reaches_end() -> Result<()> {
    let path = std::env::temp_dir().join(format!("subdecd-input-{}.bin", std::process::id()));
    std::fs::write(&path, [1u8, 2, 3])?;

    let source = FileSource::open(&path)?;
    let mut buffer = [0u8; 8];
    assert_eq!(source.read(&mut buffer)?, 3);
    assert!(!source.at_end());
    assert_eq!(source.read(&mut buffer)?, 0);
    assert!(source.at_end());
    assert_eq!(source.bytes_read(), 3);

    std::fs::remove_file(&path)?;
    Ok(())
}
