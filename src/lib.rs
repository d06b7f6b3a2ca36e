//! # framewalk
//!
//! Walk the video stream of a media file and report per-frame decode
//! metadata in strict decode order.
//!
//! `framewalk` opens a container with FFmpeg (via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)), selects its first
//! video stream, feeds every packet of that stream to a decoder, and emits
//! one [`FrameReport`] per decoded frame: sequence number, picture type, size
//! of the originating packet, presentation timestamp and key-frame flag.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framewalk::{FramewalkError, LineSink, scan_file};
//!
//! let stdout = std::io::stdout();
//! scan_file("input.mp4", LineSink::new(stdout.lock()))?;
//! # Ok::<(), FramewalkError>(())
//! ```
//!
//! prints
//!
//! ```text
//! Frame   1 (type=I, size=11962 bytes) pts    0 key_frame 1
//! Frame   2 (type=P, size= 2401 bytes) pts  512 key_frame 0
//! ...
//! Done.
//! ```
//!
//! ## Collecting reports
//!
//! ```no_run
//! use framewalk::{CollectingSink, FramewalkError, Pipeline, ScanOptions};
//!
//! let mut sink = CollectingSink::new();
//! let summary = Pipeline::new(ScanOptions::new().with_flush_at_end_of_stream(true))
//!     .run_file("input.mkv", &mut sink)?;
//! assert_eq!(summary.frames_reported as usize, sink.reports.len());
//! # Ok::<(), FramewalkError>(())
//! ```
//!
//! ## Structure
//!
//! - [`ContainerReader`] / [`MediaSource`]: open, probe, read packets.
//! - [`select_video_stream`]: first video stream in index order.
//! - [`DecoderSession`] over a [`FrameDecoder`]: submit / drain state machine.
//! - [`report`] and [`ReportSink`]: frame records and where they go.
//! - [`Pipeline`]: the driver tying them together.
//!
//! The reader and decoder are traits, so the driver can run over any
//! demuxer/decoder pair, including in-memory ones.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod container;
pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod metadata;
pub mod options;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod stream;

pub use container::{ContainerReader, DemuxedPacket, EncodedPacket, MediaSource, ReadOutcome};
pub use decoder::{
    DecodedFrame, DecoderSession, DrainOutcome, FfmpegVideoDecoder, FrameDecoder, PictureType,
    SessionState,
};
pub use error::FramewalkError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use metadata::ContainerMetadata;
pub use options::{DEFAULT_MAX_READ_RETRIES, ScanOptions};
pub use pipeline::{Pipeline, RunSummary, scan_file};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use report::{
    COMPLETION_MARKER, CollectingSink, FrameReport, JsonLinesSink, LineSink, LogSink, ReportSink,
    report,
};
pub use stream::{CodecParameters, MediaKind, StreamInfo, select_video_stream};
