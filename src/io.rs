//! Output helpers
use std::io::{self, Write};

/// Error produced by a [`LimitedWriter`] when its limit is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteLimitExceededError {
    /// The limit in bytes
    pub limit: u64,
}

impl std::fmt::Display for WriteLimitExceededError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Write limit of {} bytes exceeded", self.limit)
    }
}

impl std::error::Error for WriteLimitExceededError {}

impl WriteLimitExceededError {
    /// Whether `err` was produced by a [`LimitedWriter`]
    pub fn is_cause_of(err: &io::Error) -> bool {
        err.get_ref()
            .is_some_and(|inner| inner.is::<WriteLimitExceededError>())
    }
}

/// A [`Write`] wrapper which caps the amount of data written
///
/// Data is written up to the limit; any write past it fails with an
/// [`io::Error`] wrapping a [`WriteLimitExceededError`]
pub struct LimitedWriter<W: Write> {
    inner: W,
    limit: u64,
    written: u64,
}

impl<W: Write> LimitedWriter<W> {
    /// Wraps `inner` allowing at most `limit` bytes
    pub fn new(inner: W, limit: u64) -> Self {
        Self {
            inner,
            limit,
            written: 0,
        }
    }

    /// Returns the number of bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let available = self.limit - self.written;
        if available == 0 && !buf.is_empty() {
            return Err(io::Error::other(WriteLimitExceededError { limit: self.limit }));
        }
        let len = usize::try_from(available).map_or(buf.len(), |a| a.min(buf.len()));
        let written = self.inner.write(&buf[0..len])?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
