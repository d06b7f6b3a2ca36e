//! Scan configuration.
//!
//! [`ScanOptions`] is a builder that threads progress callbacks,
//! cancellation, and loop policy through the [`Pipeline`](crate::Pipeline)
//! without widening its signatures.
//!
//! # Example
//!
//! ```
//! use framewalk::{CancellationToken, ScanOptions};
//!
//! let token = CancellationToken::new();
//! let options = ScanOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_flush_at_end_of_stream(true)
//!     .with_max_read_retries(4);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default number of consecutive transient reads tolerated before a run
/// fails.
pub const DEFAULT_MAX_READ_RETRIES: u32 = 16;

/// Configuration for one pipeline run.
///
/// A default-constructed value reproduces the plain read/decode/report
/// loop: no flush at end of stream, no format dump, no progress.
#[derive(Clone)]
pub struct ScanOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) flush_at_end_of_stream: bool,
    pub(crate) max_read_retries: u32,
    pub(crate) dump_format: bool,
}

impl Debug for ScanOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ScanOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("flush_at_end_of_stream", &self.flush_at_end_of_stream)
            .field("max_read_retries", &self.max_read_retries)
            .field("dump_format", &self.dump_format)
            .finish()
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            flush_at_end_of_stream: false,
            max_read_retries: DEFAULT_MAX_READ_RETRIES,
            dump_format: false,
        }
    }

    /// Attach a progress callback, fired every
    /// [`batch_size`](ScanOptions::with_batch_size) frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token. It is checked before every packet read;
    /// once cancelled the run stops with
    /// [`FramewalkError::Cancelled`](crate::FramewalkError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires, in frames. Clamped to a
    /// minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Flush the decoder at end of stream and report the frames it was still
    /// holding (reordering delay). Off by default, in which case end of file
    /// simply ends the loop.
    #[must_use]
    pub fn with_flush_at_end_of_stream(mut self, flush: bool) -> Self {
        self.flush_at_end_of_stream = flush;
        self
    }

    /// Number of consecutive transient read results tolerated before the run
    /// fails with [`FramewalkError::Read`](crate::FramewalkError::Read).
    #[must_use]
    pub fn with_max_read_retries(mut self, retries: u32) -> Self {
        self.max_read_retries = retries;
        self
    }

    /// Have FFmpeg print the container layout after probing.
    #[must_use]
    pub fn with_dump_format(mut self, dump: bool) -> Self {
        self.dump_format = dump;
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
