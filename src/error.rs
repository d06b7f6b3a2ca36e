//! Error types for the `framewalk` crate.
//!
//! [`FramewalkError`] is returned by every fallible operation. Variants are
//! grouped by the pipeline step that produced them so a caller can tell which
//! stage aborted the run. Conditions that drive the normal loop (end of
//! stream, "decoder needs more input") are not errors and never appear here;
//! see [`ReadOutcome`](crate::ReadOutcome) and
//! [`DrainOutcome`](crate::DrainOutcome).

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::decoder::SessionState;

/// The unified error type for all `framewalk` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramewalkError {
    /// The media resource could not be opened or is not a recognised
    /// container.
    #[error("Failed to open media file at {path}: {reason}")]
    Open {
        /// Path passed to [`MediaSource::open`](crate::MediaSource::open).
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// Stream headers could not be parsed.
    #[error("Failed to probe streams in {path}: {reason}")]
    Probe {
        /// Path of the opened container.
        path: PathBuf,
        /// Underlying reason probing failed.
        reason: String,
    },

    /// No stream with video content type exists in the container.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// No decoder implementation matches the stream's codec.
    #[error("Unsupported codec {codec} for stream {stream_index}")]
    UnsupportedCodec {
        /// Index of the selected stream.
        stream_index: usize,
        /// Codec identifier reported by the container.
        codec: String,
    },

    /// Applying codec parameters or opening the decoder failed.
    #[error("Failed to initialise decoder for stream {stream_index}: {reason}")]
    DecoderInit {
        /// Index of the selected stream.
        stream_index: usize,
        /// Underlying reason initialisation failed.
        reason: String,
    },

    /// The decoder rejected a packet. Absorbed by the pipeline.
    #[error("Decoder rejected packet {packet_number}: {reason}")]
    Submit {
        /// 1-based number of the packet among the selected stream's packets.
        packet_number: u64,
        /// Underlying reason the packet was rejected.
        reason: String,
    },

    /// The decoder failed while producing a frame. Absorbed by the pipeline.
    #[error("Failed to receive decoded frame: {0}")]
    Drain(String),

    /// Reading from the container failed in a non-recoverable way.
    #[error("Failed to read packet: {0}")]
    Read(String),

    /// A decoder session call was made in a state that does not allow it.
    #[error("Decoder session cannot {operation} while {state:?}")]
    InvalidSessionState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error while writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl From<FfmpegError> for FramewalkError {
    fn from(error: FfmpegError) -> Self {
        FramewalkError::Ffmpeg(error.to_string())
    }
}

impl FramewalkError {
    /// Whether this error is absorbed by the pipeline instead of aborting it.
    pub fn is_per_packet(&self) -> bool {
        matches!(
            self,
            FramewalkError::Submit { .. } | FramewalkError::Drain(_)
        )
    }
}
