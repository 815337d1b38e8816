// src/cancel.rs

//! Cooperative cancellation shared by downloads and script execution

use crate::error::{Error, Result};
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable cancellation flag observed at every suspension point
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Reader that errors out once the token fires, so a streaming copy stops
/// mid-transfer
pub struct CancellableReader<'a, R> {
    inner: R,
    token: &'a CancelToken,
}

impl<'a, R: Read> CancellableReader<'a, R> {
    pub fn new(inner: R, token: &'a CancelToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::other(CANCELLED_MARKER));
        }
        self.inner.read(buf)
    }
}

const CANCELLED_MARKER: &str = "operation cancelled";

/// Translate an I/O error raised by [`CancellableReader`] back into
/// [`Error::Cancelled`]
pub fn map_io_error(e: io::Error, token: &CancelToken) -> Error {
    if token.is_cancelled() && e.to_string() == CANCELLED_MARKER {
        Error::Cancelled
    } else {
        Error::Io(e)
    }
}
