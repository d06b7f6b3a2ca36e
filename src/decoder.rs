//! Decoder sessions.
//!
//! A [`DecoderSession`] wraps one codec instance bound to the selected video
//! stream. It accepts compressed packets through
//! [`submit`](DecoderSession::submit) and hands out decoded frame descriptors
//! through [`drain_frame`](DecoderSession::drain_frame), enforcing the
//! push/pull protocol on top of any [`FrameDecoder`]:
//!
//! ```text
//!            submit              drain_frame (first)
//!   Ready ───────────▶ Submitted ─────────────────▶ Draining ──┐ frame
//!     ▲                                                │  ▲    │
//!     └──────────────── NoFrameReady ──────────────────┘  └────┘
//!
//!   Ready ── finish ──▶ Flushing ── Drained ──▶ Drained
//! ```
//!
//! A session value only exists after a successful open, and dropping it
//! closes the codec and releases its reference buffers, so the
//! "uninitialised" and "closed" states are represented by the absence of a
//! session rather than by variants.

use std::collections::VecDeque;
use std::ffi::{c_int, c_void};
use std::fmt::{Display, Formatter, Result as FmtResult};

use ffmpeg_next::{
    Error as FfmpegError, Packet, codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder, frame::Video as VideoFrame, picture,
};

use crate::{
    container::{DemuxedPacket, EncodedPacket},
    error::FramewalkError,
};

/// Compression dependency class of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureType {
    /// Intra-coded.
    I,
    /// Predicted.
    P,
    /// Bi-directionally predicted.
    B,
    /// S(GMC)-VOP (MPEG-4).
    S,
    /// Switching intra.
    SI,
    /// Switching predicted.
    SP,
    /// BI type.
    BI,
    /// Not reported by the codec.
    Unknown,
}

impl PictureType {
    /// Short symbolic code used in reports.
    pub fn code(self) -> &'static str {
        match self {
            PictureType::I => "I",
            PictureType::P => "P",
            PictureType::B => "B",
            PictureType::S => "S",
            PictureType::SI => "SI",
            PictureType::SP => "SP",
            PictureType::BI => "BI",
            PictureType::Unknown => "?",
        }
    }
}

impl Display for PictureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.code())
    }
}

impl From<picture::Type> for PictureType {
    fn from(kind: picture::Type) -> Self {
        match kind {
            picture::Type::I => PictureType::I,
            picture::Type::P => PictureType::P,
            picture::Type::B => PictureType::B,
            picture::Type::S => PictureType::S,
            picture::Type::SI => PictureType::SI,
            picture::Type::SP => PictureType::SP,
            picture::Type::BI => PictureType::BI,
            picture::Type::None => PictureType::Unknown,
        }
    }
}

/// Metadata of one decoded picture.
///
/// A plain copy taken while the codec frame was held. The codec buffer
/// itself is released before the next decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Picture type reported by the codec.
    pub picture_type: PictureType,
    /// Size in bytes of the packet that produced this frame.
    pub packet_size: usize,
    /// Presentation timestamp in stream time base units.
    pub pts: Option<i64>,
    /// Whether the frame decodes without reference to earlier frames.
    pub is_key_frame: bool,
}

/// Result of asking a decoder for its next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A frame was decoded.
    Frame(DecodedFrame),
    /// The decoder needs more input before it can emit another frame.
    NoFrameReady,
    /// The decoder has emitted every frame for its input after a flush.
    Drained,
}

/// Codec-level push/pull interface.
///
/// Implementations only talk to the codec; ordering and state rules are
/// enforced by [`DecoderSession`].
pub trait FrameDecoder {
    /// Packet type accepted by the decoder.
    type Packet;

    /// Feed one compressed packet.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), FramewalkError>;

    /// Signal end of input so buffered frames are released.
    fn send_eof(&mut self) -> Result<(), FramewalkError>;

    /// Pull the next decoded frame, if any.
    fn receive_frame(&mut self) -> Result<DrainOutcome, FramewalkError>;
}

/// State of a [`DecoderSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next packet.
    Ready,
    /// A packet has been submitted and not yet drained.
    Submitted,
    /// Frames are being drained for the last packet.
    Draining,
    /// End of input was signalled; buffered frames are being drained.
    Flushing,
    /// All frames have been drained after end of input.
    Drained,
}

/// A decoder bound to one stream, with its running frame counter.
pub struct DecoderSession<D: FrameDecoder> {
    decoder: D,
    stream_index: usize,
    state: SessionState,
    frame_number: u64,
    packets_submitted: u64,
}

impl<D: FrameDecoder> DecoderSession<D> {
    /// Wrap an opened decoder. The session starts in [`SessionState::Ready`].
    pub fn new(decoder: D, stream_index: usize) -> Self {
        Self {
            decoder,
            stream_index,
            state: SessionState::Ready,
            frame_number: 0,
            packets_submitted: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Index of the stream this session is bound to.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Number of frames drained so far. After a frame is returned this is
    /// its 1-based sequence number.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of packets passed to [`submit`](Self::submit), accepted or not.
    pub fn packets_submitted(&self) -> u64 {
        self.packets_submitted
    }

    /// Feed one packet.
    ///
    /// Only valid in [`SessionState::Ready`]; every frame for the previous
    /// packet must have been drained first. A rejected packet leaves the
    /// session ready for the next one.
    ///
    /// # Errors
    ///
    /// - [`FramewalkError::InvalidSessionState`] outside `Ready`.
    /// - [`FramewalkError::Submit`] when the codec rejects the packet.
    pub fn submit(&mut self, packet: &D::Packet) -> Result<(), FramewalkError> {
        self.expect_state("submit", &[SessionState::Ready])?;
        self.packets_submitted += 1;

        match self.decoder.send_packet(packet) {
            Ok(()) => {
                self.state = SessionState::Submitted;
                Ok(())
            }
            Err(error) => Err(FramewalkError::Submit {
                packet_number: self.packets_submitted,
                reason: error.to_string(),
            }),
        }
    }

    /// Pull the next decoded frame.
    ///
    /// Returns [`DrainOutcome::NoFrameReady`] once the decoder needs more
    /// input, which moves the session back to `Ready`. A codec failure while
    /// draining leaves the session draining, so the caller can keep pulling
    /// the frames the codec still holds or give up with
    /// [`abandon_drain`](Self::abandon_drain).
    ///
    /// [`DrainOutcome::Drained`] is only returned while flushing. A codec
    /// that reports end of output without a flush is treated as needing more
    /// input.
    ///
    /// # Errors
    ///
    /// - [`FramewalkError::InvalidSessionState`] when nothing was submitted.
    /// - [`FramewalkError::Drain`] when the codec fails to produce a frame.
    pub fn drain_frame(&mut self) -> Result<DrainOutcome, FramewalkError> {
        self.expect_state(
            "drain",
            &[
                SessionState::Submitted,
                SessionState::Draining,
                SessionState::Flushing,
            ],
        )?;

        let flushing = self.state == SessionState::Flushing;
        let outcome = match self.decoder.receive_frame() {
            Ok(outcome) => outcome,
            Err(error) => {
                if !flushing {
                    self.state = SessionState::Draining;
                }
                return Err(FramewalkError::Drain(error.to_string()));
            }
        };

        match outcome {
            DrainOutcome::Frame(_) => {
                self.frame_number += 1;
                if !flushing {
                    self.state = SessionState::Draining;
                }
                Ok(outcome)
            }
            DrainOutcome::NoFrameReady => {
                if !flushing {
                    self.state = SessionState::Ready;
                }
                Ok(outcome)
            }
            DrainOutcome::Drained if flushing => {
                self.state = SessionState::Drained;
                Ok(outcome)
            }
            DrainOutcome::Drained => {
                log::debug!(
                    "Decoder for stream {} reported end of output without a flush",
                    self.stream_index
                );
                self.state = SessionState::Ready;
                Ok(DrainOutcome::NoFrameReady)
            }
        }
    }

    /// Stop draining and give up on any frame the codec still holds for the
    /// current packet, or for the whole flush.
    ///
    /// A packet drain returns the session to `Ready`; a flush ends in
    /// `Drained`.
    ///
    /// # Errors
    ///
    /// [`FramewalkError::InvalidSessionState`] when no drain is in progress.
    pub fn abandon_drain(&mut self) -> Result<(), FramewalkError> {
        self.expect_state(
            "abandon drain",
            &[
                SessionState::Submitted,
                SessionState::Draining,
                SessionState::Flushing,
            ],
        )?;
        self.state = match self.state {
            SessionState::Flushing => SessionState::Drained,
            _ => SessionState::Ready,
        };
        Ok(())
    }

    /// Signal end of input. Frames still buffered by the codec become
    /// available through [`drain_frame`](Self::drain_frame) until it returns
    /// [`DrainOutcome::Drained`].
    ///
    /// # Errors
    ///
    /// [`FramewalkError::InvalidSessionState`] outside `Ready`, or the
    /// codec's error if it refuses the flush.
    pub fn finish(&mut self) -> Result<(), FramewalkError> {
        self.expect_state("finish", &[SessionState::Ready])?;
        self.decoder.send_eof()?;
        self.state = SessionState::Flushing;
        Ok(())
    }

    /// Tear the session down, releasing the codec. Returns the number of
    /// frames drained over its lifetime.
    pub fn close(self) -> u64 {
        log::debug!(
            "Closing decoder session for stream {} ({} packets, {} frames)",
            self.stream_index,
            self.packets_submitted,
            self.frame_number,
        );
        self.frame_number
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), FramewalkError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(FramewalkError::InvalidSessionState {
                operation,
                state: self.state,
            })
        }
    }
}

/// Number of in-flight packet sizes remembered for codecs that do not copy
/// the packet's opaque field onto the frame.
const PENDING_PACKET_LIMIT: usize = 64;

/// Ask the codec to copy each packet's opaque field onto the frames it
/// produces. Must be called before the codec is opened.
pub(crate) fn enable_opaque_passthrough(context: &mut CodecContext) {
    unsafe {
        (*context.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_COPY_OPAQUE as c_int;
    }
}

/// Store the packet's own size in its opaque field, offset by one so that a
/// null opaque still means "untagged".
pub(crate) fn tag_packet_size(packet: &mut Packet) {
    let tag = encode_size_tag(packet.size());
    unsafe {
        (*packet.as_mut_ptr()).opaque = tag;
    }
}

fn encode_size_tag(size: usize) -> *mut c_void {
    size.wrapping_add(1) as *mut c_void
}

fn decode_size_tag(opaque: *mut c_void) -> Option<usize> {
    (opaque as usize).checked_sub(1)
}

/// Packets submitted to the codec and not yet matched to a frame, in decode
/// order.
#[derive(Debug, Default)]
struct PendingPackets {
    entries: VecDeque<(Option<i64>, usize)>,
}

impl PendingPackets {
    fn push(&mut self, pts: Option<i64>, size: usize) {
        if self.entries.len() == PENDING_PACKET_LIMIT {
            self.entries.pop_front();
        }
        self.entries.push_back((pts, size));
    }

    /// Size of the packet behind a frame.
    ///
    /// `carried` is the size the codec copied from the packet; when present
    /// it is exact and only retires the matching entry. Otherwise the frame
    /// is matched by pts, then against the oldest pending packet.
    fn resolve(&mut self, carried: Option<usize>, pts: Option<i64>) -> usize {
        if let Some(size) = carried {
            let position = self
                .entries
                .iter()
                .position(|&(packet_pts, packet_size)| packet_size == size && packet_pts == pts)
                .or_else(|| {
                    self.entries
                        .iter()
                        .position(|&(_, packet_size)| packet_size == size)
                });
            if let Some(position) = position {
                self.entries.remove(position);
            }
            return size;
        }

        let position = pts.and_then(|pts| {
            self.entries
                .iter()
                .position(|(packet_pts, _)| *packet_pts == Some(pts))
        });
        let entry = match position {
            Some(position) => self.entries.remove(position),
            None => self.entries.pop_front(),
        };
        entry.map(|(_, size)| size).unwrap_or(0)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// FFmpeg-backed video decoder.
///
/// Created by [`MediaSource`](crate::MediaSource) for the selected stream.
/// The decoded frame buffer is reused across calls and unreferenced as soon
/// as its metadata has been copied out.
pub struct FfmpegVideoDecoder {
    decoder: VideoDecoder,
    frame: VideoFrame,
    pending_packets: PendingPackets,
}

impl FfmpegVideoDecoder {
    pub(crate) fn new(decoder: VideoDecoder) -> Self {
        Self {
            decoder,
            frame: VideoFrame::empty(),
            pending_packets: PendingPackets::default(),
        }
    }
}

/// Holds the decoder's frame buffer for the duration of one drain call and
/// unreferences it on every exit path.
struct FrameLease<'a> {
    frame: &'a mut VideoFrame,
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        unsafe {
            ffmpeg_sys_next::av_frame_unref(self.frame.as_mut_ptr());
        }
    }
}

impl FrameDecoder for FfmpegVideoDecoder {
    type Packet = DemuxedPacket;

    fn send_packet(&mut self, packet: &DemuxedPacket) -> Result<(), FramewalkError> {
        self.decoder.send_packet(packet.inner())?;
        self.pending_packets.push(packet.pts(), packet.size());
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), FramewalkError> {
        self.decoder.send_eof()?;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<DrainOutcome, FramewalkError> {
        match self.decoder.receive_frame(&mut self.frame) {
            Ok(()) => {
                let (picture_type, pts, is_key_frame, carried_size) = {
                    let lease = FrameLease {
                        frame: &mut self.frame,
                    };
                    let opaque = unsafe { (*lease.frame.as_ptr()).opaque };
                    (
                        PictureType::from(lease.frame.kind()),
                        lease.frame.pts(),
                        lease.frame.is_key(),
                        decode_size_tag(opaque),
                    )
                };
                let packet_size = self.pending_packets.resolve(carried_size, pts);

                Ok(DrainOutcome::Frame(DecodedFrame {
                    picture_type,
                    packet_size,
                    pts,
                    is_key_frame,
                }))
            }
            Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(DrainOutcome::NoFrameReady)
            }
            Err(FfmpegError::Eof) => {
                self.pending_packets.clear();
                Ok(DrainOutcome::Drained)
            }
            Err(error) => Err(FramewalkError::from(error)),
        }
    }
}
