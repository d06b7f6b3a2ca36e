//! Stream table entries and primary video stream selection.

use std::fmt::{Display, Formatter, Result as FmtResult};

use ffmpeg_next::media::Type;

use crate::error::FramewalkError;

/// Content type of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

impl From<Type> for MediaKind {
    fn from(kind: Type) -> Self {
        match kind {
            Type::Video => MediaKind::Video,
            Type::Audio => MediaKind::Audio,
            Type::Subtitle => MediaKind::Subtitle,
            Type::Data => MediaKind::Data,
            Type::Attachment => MediaKind::Attachment,
            Type::Unknown => MediaKind::Unknown,
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Data => "data",
            MediaKind::Attachment => "attachment",
            MediaKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One elementary stream discovered while probing a container.
///
/// Immutable once probed. `codec_parameters` carries what the container
/// reports; dimensions and pixel format are only meaningful for video.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Index of the stream within the container. Packets are tagged with it.
    pub index: usize,
    /// Content type.
    pub kind: MediaKind,
    /// Codec identifier (e.g. `"h264"`, `"hevc"`, `"aac"`).
    pub codec: String,
    /// Codec parameters copied from the container.
    pub codec_parameters: CodecParameters,
}

/// Codec parameters of a stream, as reported by the container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecParameters {
    /// Frame width in pixels (0 when not video or unknown).
    pub width: u32,
    /// Frame height in pixels (0 when not video or unknown).
    pub height: u32,
    /// Pixel format name, if the container reports one.
    pub pixel_format: Option<String>,
    /// Stream time base as `(numerator, denominator)`.
    pub time_base: (i32, i32),
}

/// Select the primary video stream.
///
/// Returns the first stream, in container index order, whose content type is
/// video. This is a deliberate simplification: the containers this crate
/// targets carry at most one meaningful video stream, so no ranking by
/// resolution, bit rate or disposition is attempted.
///
/// # Errors
///
/// [`FramewalkError::NoVideoStream`] if no stream is video.
pub fn select_video_stream(streams: &[StreamInfo]) -> Result<&StreamInfo, FramewalkError> {
    let mut ordered: Vec<&StreamInfo> = streams.iter().collect();
    ordered.sort_by_key(|stream| stream.index);

    let selected = ordered
        .into_iter()
        .find(|stream| stream.kind == MediaKind::Video)
        .ok_or(FramewalkError::NoVideoStream)?;

    log::debug!(
        "Selected video stream: index={}, codec={}, {}x{}",
        selected.index,
        selected.codec,
        selected.codec_parameters.width,
        selected.codec_parameters.height,
    );

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, kind: MediaKind) -> StreamInfo {
        StreamInfo {
            index,
            kind,
            codec: "test".to_string(),
            codec_parameters: CodecParameters::default(),
        }
    }

    #[test]
    fn picks_first_video_in_index_order() {
        let streams = vec![
            stream(2, MediaKind::Video),
            stream(0, MediaKind::Audio),
            stream(1, MediaKind::Video),
        ];
        let selected = select_video_stream(&streams).unwrap();
        assert_eq!(selected.index, 1);
    }

    #[test]
    fn skips_non_video_streams() {
        let streams = vec![
            stream(0, MediaKind::Audio),
            stream(1, MediaKind::Subtitle),
            stream(2, MediaKind::Video),
        ];
        assert_eq!(select_video_stream(&streams).unwrap().index, 2);
    }

    #[test]
    fn audio_only_has_no_video_stream() {
        let streams = vec![stream(0, MediaKind::Audio), stream(1, MediaKind::Data)];
        assert!(matches!(
            select_video_stream(&streams),
            Err(FramewalkError::NoVideoStream)
        ));
    }

    #[test]
    fn empty_table_has_no_video_stream() {
        assert!(matches!(
            select_video_stream(&[]),
            Err(FramewalkError::NoVideoStream)
        ));
    }
}
