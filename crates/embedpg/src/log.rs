//! Buffers engine process output and forwards it to a configurable sink.
//!
//! Helper commands and the server itself write into a temporary file opened
//! in append mode. [`BufferedLog::flush`] copies everything written since
//! the previous flush into the sink, so repeated flushes never duplicate
//! output.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::info;

/// Target used when engine output is forwarded to `tracing`.
pub const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::postgres");

/// Destination for engine output.
pub type LogSink = Box<dyn Write + Send>;

/// Sink handle shared between an instance and its buffered logs.
#[derive(Clone)]
pub struct SharedSink(Arc<Mutex<LogSink>>);

impl SharedSink {
    /// Wraps a writer.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(sink))))
    }

    /// Forwards each complete line as a `tracing` event.
    #[must_use]
    pub fn tracing() -> Self {
        Self::new(TracingSink::default())
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut sink = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(bytes)?;
        sink.flush()
    }
}

impl Default for SharedSink {
    fn default() -> Self {
        Self::tracing()
    }
}

impl std::fmt::Debug for SharedSink {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("SharedSink")
    }
}

/// Emits engine output line by line on [`ENGINE_TARGET`].
#[derive(Debug, Default)]
pub struct TracingSink {
    pending: Vec<u8>,
}

impl TracingSink {
    fn emit(line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        if !text.is_empty() {
            info!(target: ENGINE_TARGET, "{text}");
        }
    }
}

impl Write for TracingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=position).collect();
            Self::emit(line.strip_suffix(b"\n").unwrap_or(&line));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            Self::emit(&line);
        }
        Ok(())
    }
}

/// Append-only capture file for one instance's engine output.
#[derive(Debug)]
pub struct BufferedLog {
    file: NamedTempFile,
    appender: File,
    flushed: u64,
    sink: SharedSink,
}

impl BufferedLog {
    /// Creates an empty capture file forwarding to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the temporary file cannot be created.
    pub fn new(sink: SharedSink) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("embedpg-log-")
            .tempfile()?;
        let appender = OpenOptions::new().append(true).open(file.path())?;
        Ok(Self {
            file,
            appender,
            flushed: 0,
            sink,
        })
    }

    /// Fresh stdout/stderr handles for a child process.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the handle cannot be duplicated.
    pub fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        let stdout = self.appender.try_clone()?;
        let stderr = self.appender.try_clone()?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// Output captured since the last flush, without consuming it.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the capture file cannot be read.
    pub fn unflushed(&self) -> io::Result<String> {
        let bytes = self.read_from(self.flushed)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copies output captured since the last flush into the sink.
    ///
    /// # Errors
    ///
    /// Returns an IO error when reading the capture or writing the sink fails.
    pub fn flush(&mut self) -> io::Result<()> {
        let bytes = self.read_from(self.flushed)?;
        if bytes.is_empty() {
            return Ok(());
        }
        self.sink.write_all(&bytes)?;
        self.flushed += bytes.len() as u64;
        Ok(())
    }

    fn read_from(&self, offset: u64) -> io::Result<Vec<u8>> {
        let mut reader = self.file.reopen()?;
        reader.seek(SeekFrom::Start(offset))?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    #[cfg(test)]
    pub(crate) fn append(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.appender).write_all(bytes)
    }
}
