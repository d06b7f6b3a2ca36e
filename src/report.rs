//! Frame reports and report sinks.
//!
//! [`report`] turns a drained frame into an immutable [`FrameReport`]. The
//! pipeline hands every report, in decode order, to a [`ReportSink`], and
//! finishes with one call to [`ReportSink::finished`].
//!
//! # Example
//!
//! ```
//! use framewalk::{DecodedFrame, PictureType, report};
//!
//! let frame = DecodedFrame {
//!     picture_type: PictureType::I,
//!     packet_size: 100,
//!     pts: Some(0),
//!     is_key_frame: true,
//! };
//! let record = report(&frame, 1);
//! assert_eq!(
//!     record.to_string(),
//!     "Frame   1 (type=I, size=  100 bytes) pts    0 key_frame 1"
//! );
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Write,
};

use serde_json::{Value, json};

use crate::{
    decoder::{DecodedFrame, PictureType},
    error::FramewalkError,
    pipeline::RunSummary,
};

/// Marker printed after the last frame of a successful run.
pub const COMPLETION_MARKER: &str = "Done.";

/// Metadata of one decoded frame, captured when it was drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// 1-based position of the frame in decode order.
    pub sequence_number: u64,
    /// Picture type.
    pub picture_type: PictureType,
    /// Size in bytes of the packet that produced the frame.
    pub packet_size: usize,
    /// Presentation timestamp in raw stream time base units.
    pub pts: Option<i64>,
    /// Key-frame flag.
    pub is_key_frame: bool,
}

/// Build the report for a drained frame.
pub fn report(frame: &DecodedFrame, sequence_number: u64) -> FrameReport {
    FrameReport {
        sequence_number,
        picture_type: frame.picture_type,
        packet_size: frame.packet_size,
        pts: frame.pts,
        is_key_frame: frame.is_key_frame,
    }
}

impl FrameReport {
    /// Machine-readable form, one object per frame.
    pub fn to_json(&self) -> Value {
        json!({
            "seq": self.sequence_number,
            "type": self.picture_type.code(),
            "size": self.packet_size,
            "pts": self.pts,
            "key": self.is_key_frame,
        })
    }
}

impl Display for FrameReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let pts = match self.pts {
            Some(pts) => pts.to_string(),
            None => "NOPTS".to_string(),
        };
        write!(
            f,
            "Frame {:>3} (type={}, size={:>5} bytes) pts {:>4} key_frame {}",
            self.sequence_number,
            self.picture_type,
            self.packet_size,
            pts,
            u8::from(self.is_key_frame),
        )
    }
}

/// Destination for frame reports.
///
/// Receives every report of a run in decode order, then exactly one
/// [`finished`](ReportSink::finished) call if the run completes. A run that
/// fails never calls `finished`; the error is returned to the caller instead.
pub trait ReportSink {
    /// Called once per decoded frame.
    fn frame(&mut self, report: &FrameReport) -> Result<(), FramewalkError>;

    /// Called once after the last frame of a successful run.
    fn finished(&mut self, summary: &RunSummary) -> Result<(), FramewalkError>;
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn frame(&mut self, report: &FrameReport) -> Result<(), FramewalkError> {
        (**self).frame(report)
    }

    fn finished(&mut self, summary: &RunSummary) -> Result<(), FramewalkError> {
        (**self).finished(summary)
    }
}

/// Writes one text line per frame and [`COMPLETION_MARKER`] at the end.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    /// Write text lines to `writer`. Wrap unbuffered writers in a
    /// [`BufWriter`](std::io::BufWriter); the sink flushes once at the end.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for LineSink<W> {
    fn frame(&mut self, report: &FrameReport) -> Result<(), FramewalkError> {
        writeln!(self.writer, "{report}")?;
        Ok(())
    }

    fn finished(&mut self, _summary: &RunSummary) -> Result<(), FramewalkError> {
        writeln!(self.writer, "{COMPLETION_MARKER}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes one JSON object per line; the last line carries `"done": true`
/// and the run summary.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Write one compact JSON object per line to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn frame(&mut self, report: &FrameReport) -> Result<(), FramewalkError> {
        writeln!(self.writer, "{}", report.to_json())?;
        Ok(())
    }

    fn finished(&mut self, summary: &RunSummary) -> Result<(), FramewalkError> {
        let mut payload = summary.to_json();
        if let Value::Object(map) = &mut payload {
            map.insert("done".to_string(), Value::Bool(true));
        }
        writeln!(self.writer, "{payload}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Reports received so far, in decode order.
    pub reports: Vec<FrameReport>,
    /// Summary of the run, once it completed.
    pub summary: Option<RunSummary>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the completion signal was received.
    pub fn is_finished(&self) -> bool {
        self.summary.is_some()
    }
}

impl ReportSink for CollectingSink {
    fn frame(&mut self, report: &FrameReport) -> Result<(), FramewalkError> {
        self.reports.push(*report);
        Ok(())
    }

    fn finished(&mut self, summary: &RunSummary) -> Result<(), FramewalkError> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

/// Emits each report as an `info` record through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn frame(&mut self, report: &FrameReport) -> Result<(), FramewalkError> {
        log::info!("{report}");
        Ok(())
    }

    fn finished(&mut self, summary: &RunSummary) -> Result<(), FramewalkError> {
        log::info!("{COMPLETION_MARKER} {summary}");
        Ok(())
    }
}
