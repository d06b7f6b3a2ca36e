//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes a running scan; [`CancellationToken`] stops
//! it cooperatively. The pipeline checks the token once per packet read, so
//! cancellation never interrupts a decode call and never reorders frames.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framewalk::{
//!     CollectingSink, FramewalkError, Pipeline, ProgressCallback, ProgressInfo, ScanOptions,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         eprintln!("{} frames after {} packets", info.frames, info.packets);
//!     }
//! }
//!
//! let options = ScanOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_batch_size(100);
//!
//! let mut sink = CollectingSink::new();
//! Pipeline::new(options).run_file("input.mp4", &mut sink)?;
//! # Ok::<(), FramewalkError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of scan progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames reported so far.
    pub frames: u64,
    /// Packets read from the container so far, all streams included.
    pub packets: u64,
    /// Presentation timestamp of the most recent frame.
    pub last_pts: Option<i64>,
    /// Wall-clock time since the decode loop started.
    pub elapsed: Duration,
    /// Whether this is the final snapshot of the run.
    pub finished: bool,
}

/// Trait for receiving progress updates during a scan.
///
/// Callbacks observe but cannot halt the run. Use [`CancellationToken`] for
/// that.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` frames and once when the run finishes.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Default callback; discards everything.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share the same flag, so a token can be cancelled from another
/// thread while the scan runs.
///
/// # Example
///
/// ```
/// use framewalk::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.clone().cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts frames and packets and fires the callback every `batch_size`
/// frames.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    batch_size: u64,
    start_time: Instant,
    frames: u64,
    packets: u64,
    last_pts: Option<i64>,
    frames_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, batch_size: u64) -> Self {
        Self {
            callback,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            frames: 0,
            packets: 0,
            last_pts: None,
            frames_since_last_report: 0,
        }
    }

    pub(crate) fn packet_read(&mut self) {
        self.packets += 1;
    }

    pub(crate) fn frame_reported(&mut self, pts: Option<i64>) {
        self.frames += 1;
        self.last_pts = pts;
        self.frames_since_last_report += 1;

        if self.frames_since_last_report >= self.batch_size {
            self.report(false);
            self.frames_since_last_report = 0;
        }
    }

    /// Unconditionally emit the final snapshot.
    pub(crate) fn finish(&mut self) {
        self.report(true);
    }

    fn report(&self, finished: bool) {
        let info = ProgressInfo {
            frames: self.frames,
            packets: self.packets,
            last_pts: self.last_pts,
            elapsed: self.start_time.elapsed(),
            finished,
        };
        self.callback.on_progress(&info);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u64, bool)>>,
    }

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.seen.lock().unwrap().push((info.frames, info.finished));
        }
    }

    #[test]
    fn fires_every_batch_and_on_finish() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), 2);
        for pts in 0..5 {
            tracker.packet_read();
            tracker.frame_reported(Some(pts));
        }
        tracker.finish();

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(2, false), (4, false), (5, true)]);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), 0);
        tracker.frame_reported(None);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }
}
