//! Container reading.
//!
//! [`ContainerReader`] is the demuxer side of a run: it exposes the stream
//! table, a pull-based packet source, and builds the decoder for a chosen
//! stream. [`MediaSource`] is the FFmpeg-backed implementation.
//!
//! # Example
//!
//! ```no_run
//! use framewalk::{ContainerReader, FramewalkError, MediaSource, ReadOutcome, EncodedPacket};
//!
//! let mut source = MediaSource::open("input.mp4")?;
//! let streams = source.probe_streams()?;
//! println!("{} streams", streams.len());
//!
//! while let ReadOutcome::Packet(packet) = source.read_packet()? {
//!     println!("stream={} size={}", packet.stream_index(), packet.size());
//! }
//! # Ok::<(), FramewalkError>(())
//! ```

use std::{
    ffi::CString,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    ptr,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, codec::context::Context as CodecContext,
    format::{Pixel, context::Input},
};

use crate::{
    decoder::{FfmpegVideoDecoder, FrameDecoder, enable_opaque_passthrough, tag_packet_size},
    error::FramewalkError,
    metadata::ContainerMetadata,
    stream::{CodecParameters, MediaKind, StreamInfo},
};

/// A compressed, stream-tagged unit read from a container.
pub trait EncodedPacket {
    /// Index of the stream the packet belongs to.
    fn stream_index(&self) -> usize;
    /// Payload size in bytes.
    fn size(&self) -> usize;
    /// Presentation timestamp, if the container carries one.
    fn pts(&self) -> Option<i64>;
    /// Whether the container marks the packet as a sync point.
    fn is_key(&self) -> bool;
}

/// Result of one read from a container.
#[derive(Debug)]
pub enum ReadOutcome<P> {
    /// The next packet in container order.
    Packet(P),
    /// No packet is available right now; reading again may succeed.
    Transient(String),
    /// The container has no more packets.
    EndOfStream,
}

/// Demuxer interface driven by the [`Pipeline`](crate::Pipeline).
///
/// The read cursor only moves forward.
pub trait ContainerReader {
    /// Packet type produced by [`read_packet`](Self::read_packet).
    type Packet: EncodedPacket;
    /// Decoder type produced by [`open_decoder`](Self::open_decoder).
    type Decoder: FrameDecoder<Packet = Self::Packet>;

    /// Parse stream headers and return the stream table in container order.
    /// May read and buffer initial data.
    fn probe_streams(&mut self) -> Result<Vec<StreamInfo>, FramewalkError>;

    /// Read the next packet.
    fn read_packet(&mut self) -> Result<ReadOutcome<Self::Packet>, FramewalkError>;

    /// Build and open a decoder for `stream`.
    fn open_decoder(&self, stream: &StreamInfo) -> Result<Self::Decoder, FramewalkError>;

    /// Container-level metadata.
    fn metadata(&self) -> ContainerMetadata;

    /// Print a human-readable description of the container layout. Does
    /// nothing unless the reader has one.
    fn dump_format(&self) {}
}

/// A packet demuxed by FFmpeg. Its payload is released when dropped.
pub struct DemuxedPacket(Packet);

impl DemuxedPacket {
    /// Tags the packet with its own size so the decoder can hand it back on
    /// the frame it produces.
    fn new(mut packet: Packet) -> Self {
        tag_packet_size(&mut packet);
        Self(packet)
    }

    pub(crate) fn inner(&self) -> &Packet {
        &self.0
    }
}

impl Debug for DemuxedPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DemuxedPacket")
            .field("stream_index", &self.stream_index())
            .field("size", &self.size())
            .field("pts", &self.pts())
            .field("is_key", &self.is_key())
            .finish()
    }
}

impl EncodedPacket for DemuxedPacket {
    fn stream_index(&self) -> usize {
        self.0.stream()
    }

    fn size(&self) -> usize {
        self.0.size()
    }

    fn pts(&self) -> Option<i64> {
        self.0.pts()
    }

    fn is_key(&self) -> bool {
        self.0.is_key()
    }
}

/// An opened media container.
///
/// Owns the FFmpeg demuxer context; the underlying file handle is closed when
/// the source is dropped, whichever way the run ends.
pub struct MediaSource {
    input: Input,
    path: PathBuf,
    streams: Vec<StreamInfo>,
}

impl Debug for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSource")
            .field("path", &self.path)
            .field("streams", &self.streams)
            .finish_non_exhaustive()
    }
}

impl MediaSource {
    /// Open a media file.
    ///
    /// Initialises FFmpeg (idempotent) and opens the container. Stream
    /// headers are not parsed until [`probe_streams`](ContainerReader::probe_streams).
    ///
    /// # Errors
    ///
    /// [`FramewalkError::Open`] if the file cannot be read or is not a
    /// recognised container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramewalkError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening media file: {}", path.display());

        ffmpeg_next::init().map_err(|error| FramewalkError::Open {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let c_path = path
            .to_str()
            .and_then(|value| CString::new(value).ok())
            .ok_or_else(|| FramewalkError::Open {
                path: path.clone(),
                reason: "path is not valid UTF-8 or contains a NUL byte".to_string(),
            })?;

        let input = unsafe {
            let mut context = ptr::null_mut();
            let status = ffmpeg_sys_next::avformat_open_input(
                &mut context,
                c_path.as_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
            );
            if status < 0 {
                return Err(FramewalkError::Open {
                    path,
                    reason: FfmpegError::from(status).to_string(),
                });
            }
            Input::wrap(context)
        };

        log::info!(
            "Opened media file: {} (format={})",
            path.display(),
            input.format().name(),
        );

        Ok(Self {
            input,
            path,
            streams: Vec::new(),
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn describe_stream(stream: &ffmpeg_next::Stream) -> StreamInfo {
        let parameters = stream.parameters();
        let kind = MediaKind::from(parameters.medium());
        let codec = parameters.id().name().to_string();
        let time_base = stream.time_base();

        let mut codec_parameters = CodecParameters {
            time_base: (time_base.numerator(), time_base.denominator()),
            ..CodecParameters::default()
        };

        // Applying the parameters to an unopened context types the pixel
        // format without needing a decoder for the codec.
        if kind == MediaKind::Video {
            if let Ok(context) = CodecContext::from_parameters(parameters) {
                let (width, height, format) = unsafe {
                    let raw = context.as_ptr();
                    ((*raw).width, (*raw).height, Pixel::from((*raw).pix_fmt))
                };
                codec_parameters.width = u32::try_from(width).unwrap_or(0);
                codec_parameters.height = u32::try_from(height).unwrap_or(0);
                codec_parameters.pixel_format =
                    (format != Pixel::None).then(|| format!("{format:?}").to_lowercase());
            }
        }

        StreamInfo {
            index: stream.index(),
            kind,
            codec,
            codec_parameters,
        }
    }
}

impl ContainerReader for MediaSource {
    type Packet = DemuxedPacket;
    type Decoder = FfmpegVideoDecoder;

    fn probe_streams(&mut self) -> Result<Vec<StreamInfo>, FramewalkError> {
        let status = unsafe {
            ffmpeg_sys_next::avformat_find_stream_info(self.input.as_mut_ptr(), ptr::null_mut())
        };
        if status < 0 {
            return Err(FramewalkError::Probe {
                path: self.path.clone(),
                reason: FfmpegError::from(status).to_string(),
            });
        }

        self.streams = self
            .input
            .streams()
            .map(|stream| Self::describe_stream(&stream))
            .collect();

        log::debug!(
            "Probed {} streams in {}",
            self.streams.len(),
            self.path.display(),
        );
        for stream in &self.streams {
            log::debug!(
                "  stream {}: {} [{}]",
                stream.index,
                stream.kind,
                stream.codec,
            );
        }

        Ok(self.streams.clone())
    }

    fn read_packet(&mut self) -> Result<ReadOutcome<DemuxedPacket>, FramewalkError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(ReadOutcome::Packet(DemuxedPacket::new(packet))),
            Err(FfmpegError::Eof) => Ok(ReadOutcome::EndOfStream),
            Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(ReadOutcome::Transient(FfmpegError::Other { errno }.to_string()))
            }
            Err(error) => Err(FramewalkError::Read(error.to_string())),
        }
    }

    fn open_decoder(&self, stream: &StreamInfo) -> Result<FfmpegVideoDecoder, FramewalkError> {
        let stream_index = stream.index;
        let ffmpeg_stream = self
            .input
            .stream(stream_index)
            .ok_or(FramewalkError::NoVideoStream)?;
        let parameters = ffmpeg_stream.parameters();

        let codec = ffmpeg_next::decoder::find(parameters.id()).ok_or_else(|| {
            FramewalkError::UnsupportedCodec {
                stream_index,
                codec: stream.codec.clone(),
            }
        })?;
        let codec_name = codec.name().to_string();

        let mut context = CodecContext::from_parameters(parameters).map_err(|error| {
            FramewalkError::DecoderInit {
                stream_index,
                reason: format!("failed to apply codec parameters: {error}"),
            }
        })?;
        enable_opaque_passthrough(&mut context);

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|error| FramewalkError::DecoderInit {
                stream_index,
                reason: error.to_string(),
            })?;

        log::debug!(
            "Opened {} decoder for stream {} ({}x{}, {:?})",
            codec_name,
            stream_index,
            decoder.width(),
            decoder.height(),
            decoder.format(),
        );

        Ok(FfmpegVideoDecoder::new(decoder))
    }

    fn metadata(&self) -> ContainerMetadata {
        ContainerMetadata::from_input(&self.input)
    }

    /// Goes through FFmpeg's own logger, so it only shows at
    /// [`FfmpegLogLevel::Info`](crate::FfmpegLogLevel) and above.
    fn dump_format(&self) {
        ffmpeg_next::format::context::input::dump(&self.input, 0, self.path.to_str());
    }
}
