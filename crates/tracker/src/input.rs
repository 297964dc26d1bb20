//! Input — loading raw log text for the extractor.
//!
//! The extractor only ever sees decoded text. Reading, size limits and
//! UTF-8 validation all happen here, and their failures are reported per
//! input without stopping a batch.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;
use thiserror::Error;

/// Why an input never reached the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorType {
    /// File or stdin could not be read
    Io,
    /// Input exceeded the configured size limit
    TooLarge,
    /// Input was not valid UTF-8
    NonUtf8,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: io::Error,
    },

    #[error("Input too large: {0} bytes (max: {1} bytes)")]
    TooLarge(u64, u64),

    #[error("Non-UTF8 content after byte {valid_up_to}")]
    NonUtf8 { valid_up_to: usize },
}

impl LoadError {
    pub fn kind(&self) -> InputErrorType {
        match self {
            LoadError::Io { .. } => InputErrorType::Io,
            LoadError::TooLarge(..) => InputErrorType::TooLarge,
            LoadError::NonUtf8 { .. } => InputErrorType::NonUtf8,
        }
    }
}

/// Input failure counters by type
#[derive(Debug, Default)]
pub struct InputErrorMetrics {
    pub io: AtomicU64,
    pub too_large: AtomicU64,
    pub non_utf8: AtomicU64,
}

impl InputErrorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self, error_type: InputErrorType) {
        match error_type {
            InputErrorType::Io => self.io.fetch_add(1, Ordering::Relaxed),
            InputErrorType::TooLarge => self.too_large.fetch_add(1, Ordering::Relaxed),
            InputErrorType::NonUtf8 => self.non_utf8.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> InputErrorSnapshot {
        InputErrorSnapshot {
            io_errors: self.io.load(Ordering::Relaxed),
            inputs_too_large: self.too_large.load(Ordering::Relaxed),
            non_utf8_inputs: self.non_utf8.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InputErrorSnapshot {
    pub io_errors: u64,
    pub inputs_too_large: u64,
    pub non_utf8_inputs: u64,
}

impl InputErrorSnapshot {
    pub fn total(&self) -> u64 {
        self.io_errors + self.inputs_too_large + self.non_utf8_inputs
    }
}

/// Where a log comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    Stdin,
    File(PathBuf),
}

impl LogSource {
    /// `-` means stdin, anything else is a path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            LogSource::Stdin
        } else {
            LogSource::File(PathBuf::from(arg))
        }
    }

    /// Run id derived from the source: the file stem, or `stdin`
    pub fn default_run_id(&self) -> String {
        match self {
            LogSource::Stdin => "stdin".to_string(),
            LogSource::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .filter(|stem| !stem.is_empty())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    /// Read and decode the whole log
    pub fn read(&self, max_bytes: u64) -> Result<String, LoadError> {
        let bytes = match self {
            LogSource::Stdin => read_limited(io::stdin().lock(), max_bytes, self)?,
            LogSource::File(path) => read_file(path, max_bytes, self)?,
        };
        decode(bytes)
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Stdin => f.write_str("<stdin>"),
            LogSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn read_file(path: &Path, max_bytes: u64, source: &LogSource) -> Result<Vec<u8>, LoadError> {
    let io_error = |error| LoadError::Io {
        source_name: source.to_string(),
        error,
    };

    let file = File::open(path).map_err(io_error)?;
    // Reject early when the size is known up front
    let len = file.metadata().map_err(io_error)?.len();
    if len > max_bytes {
        return Err(LoadError::TooLarge(len, max_bytes));
    }

    read_limited(file, max_bytes, source)
}

/// Read at most `max_bytes`, failing if the reader has more.
fn read_limited<R: Read>(reader: R, max_bytes: u64, source: &LogSource) -> Result<Vec<u8>, LoadError> {
    let mut buf = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|error| LoadError::Io {
            source_name: source.to_string(),
            error,
        })?;

    if buf.len() as u64 > max_bytes {
        return Err(LoadError::TooLarge(buf.len() as u64, max_bytes));
    }
    Ok(buf)
}

/// Strict UTF-8 decode
pub fn decode(bytes: Vec<u8>) -> Result<String, LoadError> {
    String::from_utf8(bytes).map_err(|e| LoadError::NonUtf8 {
        valid_up_to: e.utf8_error().valid_up_to(),
    })
}
