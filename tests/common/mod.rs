//! In-memory container and decoder used to drive the pipeline
//! deterministically.
//!
//! Each synthetic packet decodes to exactly one frame: key packets become
//! I frames, the rest P frames, and the frame inherits the packet's size and
//! pts. A decoder delay holds frames back the way a reordering codec does.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use framewalk::{
    CodecParameters, ContainerMetadata, ContainerReader, DecodedFrame, DrainOutcome,
    EncodedPacket, FrameDecoder, FramewalkError, MediaKind, PictureType, ReadOutcome, StreamInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticPacket {
    pub stream_index: usize,
    pub size: usize,
    pub pts: Option<i64>,
    pub key: bool,
    pub corrupt: bool,
}

impl EncodedPacket for SyntheticPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn size(&self) -> usize {
        self.size
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn is_key(&self) -> bool {
        self.key
    }
}

enum Step {
    Packet(SyntheticPacket),
    Transient,
    Fail(&'static str),
}

/// Shared view of what the pipeline did to a [`SyntheticContainer`].
#[derive(Clone, Default)]
pub struct Instruments {
    /// Stream index of every packet handed to the decoder, in order.
    pub submitted: Rc<RefCell<Vec<usize>>>,
    /// Number of packets read from the container.
    pub reads: Rc<Cell<usize>>,
    /// Set when the container is dropped.
    pub container_released: Rc<Cell<bool>>,
    /// Set when the decoder is dropped.
    pub decoder_released: Rc<Cell<bool>>,
}

pub struct SyntheticContainer {
    streams: Vec<StreamInfo>,
    steps: VecDeque<Step>,
    decoder_delay: usize,
    fail_probe: bool,
    unsupported_codec: bool,
    fail_decoder_init: bool,
    receive_failures: Option<(usize, usize)>,
    flush_failures: usize,
    instruments: Instruments,
}

impl SyntheticContainer {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            steps: VecDeque::new(),
            decoder_delay: 0,
            fail_probe: false,
            unsupported_codec: false,
            fail_decoder_init: false,
            receive_failures: None,
            flush_failures: 0,
            instruments: Instruments::default(),
        }
    }

    /// Single video stream at index 0.
    pub fn single_video() -> Self {
        Self::new().with_stream(0, MediaKind::Video)
    }

    pub fn with_stream(mut self, index: usize, kind: MediaKind) -> Self {
        self.streams.push(StreamInfo {
            index,
            kind,
            codec: match kind {
                MediaKind::Video => "synthetic-video".to_string(),
                MediaKind::Audio => "synthetic-audio".to_string(),
                _ => "synthetic".to_string(),
            },
            codec_parameters: CodecParameters {
                width: if kind == MediaKind::Video { 320 } else { 0 },
                height: if kind == MediaKind::Video { 240 } else { 0 },
                pixel_format: None,
                time_base: (1, 25),
            },
        });
        self
    }

    pub fn packet(mut self, stream_index: usize, size: usize, pts: i64, key: bool) -> Self {
        self.steps.push_back(Step::Packet(SyntheticPacket {
            stream_index,
            size,
            pts: Some(pts),
            key,
            corrupt: false,
        }));
        self
    }

    pub fn corrupt_packet(mut self, stream_index: usize, size: usize, pts: i64) -> Self {
        self.steps.push_back(Step::Packet(SyntheticPacket {
            stream_index,
            size,
            pts: Some(pts),
            key: false,
            corrupt: true,
        }));
        self
    }

    pub fn transient(mut self) -> Self {
        self.steps.push_back(Step::Transient);
        self
    }

    pub fn read_failure(mut self, reason: &'static str) -> Self {
        self.steps.push_back(Step::Fail(reason));
        self
    }

    pub fn with_decoder_delay(mut self, delay: usize) -> Self {
        self.decoder_delay = delay;
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn unsupported_codec(mut self) -> Self {
        self.unsupported_codec = true;
        self
    }

    pub fn failing_decoder_init(mut self) -> Self {
        self.fail_decoder_init = true;
        self
    }

    /// Once `frames` frames have been emitted, the next `times` receive
    /// calls fail.
    pub fn failing_receive_after(mut self, frames: usize, times: usize) -> Self {
        self.receive_failures = Some((frames, times));
        self
    }

    /// The first `times` receive calls after end of input fail.
    pub fn failing_flush(mut self, times: usize) -> Self {
        self.flush_failures = times;
        self
    }

    pub fn instruments(&self) -> Instruments {
        self.instruments.clone()
    }
}

impl Drop for SyntheticContainer {
    fn drop(&mut self) {
        self.instruments.container_released.set(true);
    }
}

impl ContainerReader for SyntheticContainer {
    type Packet = SyntheticPacket;
    type Decoder = SyntheticDecoder;

    fn probe_streams(&mut self) -> Result<Vec<StreamInfo>, FramewalkError> {
        if self.fail_probe {
            return Err(FramewalkError::Probe {
                path: "synthetic".into(),
                reason: "Invalid data found when processing input".to_string(),
            });
        }
        Ok(self.streams.clone())
    }

    fn read_packet(&mut self) -> Result<ReadOutcome<SyntheticPacket>, FramewalkError> {
        match self.steps.pop_front() {
            Some(Step::Packet(packet)) => {
                self.instruments.reads.set(self.instruments.reads.get() + 1);
                Ok(ReadOutcome::Packet(packet))
            }
            Some(Step::Transient) => Ok(ReadOutcome::Transient(
                "Resource temporarily unavailable".to_string(),
            )),
            Some(Step::Fail(reason)) => Err(FramewalkError::Read(reason.to_string())),
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn open_decoder(&self, stream: &StreamInfo) -> Result<SyntheticDecoder, FramewalkError> {
        if self.unsupported_codec {
            return Err(FramewalkError::UnsupportedCodec {
                stream_index: stream.index,
                codec: stream.codec.clone(),
            });
        }
        if self.fail_decoder_init {
            return Err(FramewalkError::DecoderInit {
                stream_index: stream.index,
                reason: "Invalid argument".to_string(),
            });
        }
        let (fail_after, receive_failures) = match self.receive_failures {
            Some((frames, times)) => (frames, times),
            None => (0, 0),
        };
        Ok(SyntheticDecoder {
            delay: self.decoder_delay,
            pending: VecDeque::new(),
            eof: false,
            emitted: 0,
            fail_after,
            receive_failures,
            flush_failures: self.flush_failures,
            instruments: self.instruments.clone(),
        })
    }

    fn metadata(&self) -> ContainerMetadata {
        ContainerMetadata {
            format: "synthetic".to_string(),
            stream_count: self.streams.len(),
            ..ContainerMetadata::default()
        }
    }
}

pub struct SyntheticDecoder {
    delay: usize,
    pending: VecDeque<DecodedFrame>,
    eof: bool,
    emitted: usize,
    fail_after: usize,
    receive_failures: usize,
    flush_failures: usize,
    instruments: Instruments,
}

impl Drop for SyntheticDecoder {
    fn drop(&mut self) {
        self.instruments.decoder_released.set(true);
    }
}

impl FrameDecoder for SyntheticDecoder {
    type Packet = SyntheticPacket;

    fn send_packet(&mut self, packet: &SyntheticPacket) -> Result<(), FramewalkError> {
        self.instruments
            .submitted
            .borrow_mut()
            .push(packet.stream_index);

        if packet.corrupt {
            return Err(FramewalkError::Ffmpeg(
                "Invalid data found when processing input".to_string(),
            ));
        }

        self.pending.push_back(DecodedFrame {
            picture_type: if packet.key {
                PictureType::I
            } else {
                PictureType::P
            },
            packet_size: packet.size,
            pts: packet.pts,
            is_key_frame: packet.key,
        });
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), FramewalkError> {
        self.eof = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<DrainOutcome, FramewalkError> {
        let failing = if self.eof && self.flush_failures > 0 {
            self.flush_failures -= 1;
            true
        } else if self.emitted >= self.fail_after && self.receive_failures > 0 {
            self.receive_failures -= 1;
            true
        } else {
            false
        };
        if failing {
            return Err(FramewalkError::Ffmpeg(
                "Error while decoding frame".to_string(),
            ));
        }

        if self.pending.len() > self.delay || (self.eof && !self.pending.is_empty()) {
            if let Some(frame) = self.pending.pop_front() {
                self.emitted += 1;
                return Ok(DrainOutcome::Frame(frame));
            }
        }
        if self.eof {
            Ok(DrainOutcome::Drained)
        } else {
            Ok(DrainOutcome::NoFrameReady)
        }
    }
}
