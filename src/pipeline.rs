//! The demux → decode → report driver.
//!
//! A [`Pipeline`] run opens a container, probes its streams, picks the first
//! video stream, opens a decoder for it and then loops:
//!
//! 1. read the next packet (end of stream ends the loop),
//! 2. drop it if it belongs to another stream,
//! 3. submit it to the decoder (a rejected packet is logged and skipped),
//! 4. drain every frame the decoder can produce and report each one.
//!
//! Everything before the loop is fatal on failure. The run is single
//! threaded: a packet is never read while frames from the previous one are
//! still pending, so reports come out in strict decode order.
//!
//! # Example
//!
//! ```no_run
//! use framewalk::{FramewalkError, LineSink, Pipeline, ScanOptions};
//!
//! let stdout = std::io::stdout();
//! let summary = Pipeline::new(ScanOptions::new())
//!     .run_file("input.mp4", LineSink::new(stdout.lock()))?;
//! eprintln!("{summary}");
//! # Ok::<(), FramewalkError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

use serde_json::{Value, json};

use crate::{
    container::{ContainerReader, EncodedPacket, MediaSource, ReadOutcome},
    decoder::{DecoderSession, DrainOutcome, FrameDecoder},
    error::FramewalkError,
    options::ScanOptions,
    progress::ProgressTracker,
    report::{ReportSink, report},
    stream::select_video_stream,
};

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Index of the stream that was decoded.
    pub stream_index: usize,
    /// Codec of the decoded stream.
    pub codec: String,
    /// Frames reported.
    pub frames_reported: u64,
    /// Packets read from the container, all streams included.
    pub packets_read: u64,
    /// Packets dropped because they belong to another stream.
    pub packets_skipped: u64,
    /// Packets the decoder rejected.
    pub packets_rejected: u64,
    /// Decoder failures while draining frames.
    pub decode_errors: u64,
    /// Transient read results that were retried.
    pub transient_reads: u64,
    /// Whether the decoder was flushed at end of stream and drained to the
    /// end.
    pub flushed: bool,
}

impl RunSummary {
    /// Machine-readable form.
    pub fn to_json(&self) -> Value {
        json!({
            "stream_index": self.stream_index,
            "codec": self.codec,
            "frames_reported": self.frames_reported,
            "packets_read": self.packets_read,
            "packets_skipped": self.packets_skipped,
            "packets_rejected": self.packets_rejected,
            "decode_errors": self.decode_errors,
            "transient_reads": self.transient_reads,
            "flushed": self.flushed,
        })
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} frames from stream {} [{}] ({} packets read, {} skipped, {} rejected)",
            self.frames_reported,
            self.stream_index,
            self.codec,
            self.packets_read,
            self.packets_skipped,
            self.packets_rejected,
        )
    }
}

/// Runs one file through the decode loop.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: ScanOptions,
}

impl Pipeline {
    /// Create a pipeline that runs with `options`.
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Open `path` with FFmpeg and run it.
    ///
    /// # Errors
    ///
    /// See [`run`](Pipeline::run); additionally
    /// [`FramewalkError::Open`] when the file cannot be opened.
    pub fn run_file<P: AsRef<Path>, S: ReportSink>(
        &self,
        path: P,
        sink: S,
    ) -> Result<RunSummary, FramewalkError> {
        let source = MediaSource::open(path)?;
        self.run(source, sink)
    }

    /// Run an already opened container.
    ///
    /// Reports go to `sink` in decode order, followed by one
    /// [`ReportSink::finished`] call. The reader and the decoder are dropped
    /// before this returns, on success and on every error path.
    ///
    /// # Errors
    ///
    /// Fatal: [`FramewalkError::Probe`], [`FramewalkError::NoVideoStream`],
    /// [`FramewalkError::UnsupportedCodec`], [`FramewalkError::DecoderInit`],
    /// [`FramewalkError::Read`], [`FramewalkError::Cancelled`], and any sink
    /// failure. Rejected packets and frame decode failures are counted in
    /// the summary instead; a flush given up after repeated decode failures
    /// leaves [`RunSummary::flushed`] false.
    pub fn run<R: ContainerReader, S: ReportSink>(
        &self,
        mut reader: R,
        mut sink: S,
    ) -> Result<RunSummary, FramewalkError> {
        let streams = reader.probe_streams()?;
        if self.options.dump_format {
            reader.dump_format();
        }

        let metadata = reader.metadata();
        log::debug!(
            "Container format={}, duration={:.2}s, streams={}",
            metadata.format,
            metadata.duration.as_secs_f64(),
            metadata.stream_count,
        );

        let stream = select_video_stream(&streams)?.clone();
        let decoder = reader.open_decoder(&stream)?;
        let mut session = DecoderSession::new(decoder, stream.index);

        let mut tracker =
            ProgressTracker::new(self.options.progress.clone(), self.options.batch_size);
        let mut summary = RunSummary {
            stream_index: stream.index,
            codec: stream.codec.clone(),
            ..RunSummary::default()
        };
        let mut consecutive_transient_reads: u32 = 0;

        loop {
            if self.options.is_cancelled() {
                log::info!("Scan cancelled after {} frames", summary.frames_reported);
                return Err(FramewalkError::Cancelled);
            }

            let packet = match reader.read_packet()? {
                ReadOutcome::Packet(packet) => {
                    consecutive_transient_reads = 0;
                    packet
                }
                ReadOutcome::EndOfStream => break,
                ReadOutcome::Transient(reason) => {
                    summary.transient_reads += 1;
                    consecutive_transient_reads += 1;
                    if consecutive_transient_reads > self.options.max_read_retries {
                        return Err(FramewalkError::Read(format!(
                            "{reason} (gave up after {} consecutive retries)",
                            self.options.max_read_retries
                        )));
                    }
                    log::warn!("Transient read failure, retrying: {reason}");
                    continue;
                }
            };

            summary.packets_read += 1;
            tracker.packet_read();

            if packet.stream_index() != stream.index {
                summary.packets_skipped += 1;
                log::trace!(
                    "Skipping packet from stream {} ({} bytes)",
                    packet.stream_index(),
                    packet.size()
                );
                continue;
            }

            log::trace!(
                "Submitting packet pts={:?} key={} ({} bytes)",
                packet.pts(),
                packet.is_key(),
                packet.size()
            );
            match session.submit(&packet) {
                Ok(()) => {}
                Err(error) if error.is_per_packet() => {
                    summary.packets_rejected += 1;
                    log::warn!("{error}");
                    continue;
                }
                Err(error) => return Err(error),
            }

            drain_frames(&mut session, &mut sink, &mut tracker, &mut summary)?;
        }

        if self.options.flush_at_end_of_stream {
            session.finish()?;
            summary.flushed =
                drain_frames(&mut session, &mut sink, &mut tracker, &mut summary)?;
        }

        session.close();
        drop(reader);

        tracker.finish();
        log::info!("Scan complete: {summary}");
        sink.finished(&summary)?;

        Ok(summary)
    }
}

/// Consecutive decode failures tolerated within one drain before the frames
/// still held by the codec are given up on.
const MAX_CONSECUTIVE_DRAIN_ERRORS: u32 = 8;

/// Drain every frame currently available and report each one.
///
/// Decode failures are counted and draining continues. Returns `false` when
/// the drain was abandoned after [`MAX_CONSECUTIVE_DRAIN_ERRORS`] failures in
/// a row.
fn drain_frames<D: FrameDecoder, S: ReportSink>(
    session: &mut DecoderSession<D>,
    sink: &mut S,
    tracker: &mut ProgressTracker,
    summary: &mut RunSummary,
) -> Result<bool, FramewalkError> {
    let mut consecutive_errors: u32 = 0;
    loop {
        match session.drain_frame() {
            Ok(DrainOutcome::Frame(frame)) => {
                consecutive_errors = 0;
                let record = report(&frame, session.frame_number());
                sink.frame(&record)?;
                summary.frames_reported += 1;
                tracker.frame_reported(frame.pts);
            }
            Ok(DrainOutcome::NoFrameReady | DrainOutcome::Drained) => return Ok(true),
            Err(error) if error.is_per_packet() => {
                summary.decode_errors += 1;
                consecutive_errors += 1;
                log::warn!("{error}");
                if consecutive_errors >= MAX_CONSECUTIVE_DRAIN_ERRORS {
                    log::warn!(
                        "Giving up on buffered frames after {consecutive_errors} consecutive decode failures"
                    );
                    session.abandon_drain()?;
                    return Ok(false);
                }
            }
            Err(error) => return Err(error),
        }
    }
}

/// Run `path` with default options.
///
/// # Errors
///
/// See [`Pipeline::run_file`].
pub fn scan_file<P: AsRef<Path>, S: ReportSink>(
    path: P,
    sink: S,
) -> Result<RunSummary, FramewalkError> {
    Pipeline::default().run_file(path, sink)
}
