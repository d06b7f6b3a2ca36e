//! Container-level metadata.
//!
//! Read from the demuxer once streams have been probed. Only used for
//! diagnostics; the decode loop never consults it.

use std::{collections::HashMap, time::Duration};

use ffmpeg_next::format::context::Input;

/// Container-level metadata of an opened [`MediaSource`](crate::MediaSource).
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct ContainerMetadata {
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`, `"matroska,webm"`).
    pub format: String,
    /// Total duration, or [`Duration::ZERO`] when the container does not say.
    pub duration: Duration,
    /// Number of streams in the container.
    pub stream_count: usize,
    /// Container tags (title, encoder, ...), if any.
    pub tags: Option<HashMap<String, String>>,
}

impl ContainerMetadata {
    pub(crate) fn from_input(input: &Input) -> Self {
        let duration_microseconds = input.duration();
        let duration = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64)
        } else {
            Duration::ZERO
        };

        let tags: HashMap<String, String> = input
            .metadata()
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self {
            format: input.format().name().to_string(),
            duration,
            stream_count: input.nb_streams() as usize,
            tags: if tags.is_empty() { None } else { Some(tags) },
        }
    }
}
