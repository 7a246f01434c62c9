//! Raw PCM byte sources

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// An openable stream of interleaved 16-bit little-endian stereo PCM.
///
/// `open` may block until a producer appears (named pipes do). A read of
/// zero bytes means the producer closed its end.
pub trait PcmSource: Send {
    /// Whether the source currently exists and can be opened
    fn exists(&self) -> bool;

    /// Open a new read connection
    fn open(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// Human-readable location, used in log lines
    fn describe(&self) -> String;
}

/// A named pipe (or any file) on the local filesystem
#[derive(Debug, Clone)]
pub struct FifoSource {
    path: PathBuf,
}

impl FifoSource {
    /// Source reading from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the pipe
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PcmSource for FifoSource {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn open(&mut self) -> io::Result<Box<dyn Read + Send>> {
        // Blocks until the writer opens its end
        let file = File::open(&self.path)?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
