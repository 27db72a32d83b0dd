use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::errors::Result;

/// One video of a playlist, as handed over by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: String,
    pub title: String,
}

/// Snapshot of every downloadable elementary stream of one video.
/// Fetched once per video and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamCatalog {
    pub video_streams: Vec<StreamVariant>,
    pub audio_streams: Vec<StreamVariant>,
}

impl StreamCatalog {
    pub fn is_empty(&self) -> bool {
        self.video_streams.is_empty() && self.audio_streams.is_empty()
    }
}

/// One downloadable encoding of a video-only or audio-only track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamVariant {
    pub quality: Option<VideoQuality>,
    pub framerate: Option<u32>,
    pub audio_encoding: Option<AudioEncoding>,
    pub container_ext: String,
    pub total_size_bytes: u64,
    pub url: Url,
}

/// Video quality tiers, ordered lowest to highest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VideoQuality {
    Low144,
    Low240,
    Medium360,
    Medium480,
    High720,
    High1080,
    High1440,
    High2160,
}

impl VideoQuality {
    pub fn label(&self) -> &'static str {
        match self {
            VideoQuality::Low144 => "144p",
            VideoQuality::Low240 => "240p",
            VideoQuality::Medium360 => "360p",
            VideoQuality::Medium480 => "480p",
            VideoQuality::High720 => "720p",
            VideoQuality::High1080 => "1080p",
            VideoQuality::High1440 => "1440p",
            VideoQuality::High2160 => "2160p",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "144" | "144p" => Some(VideoQuality::Low144),
            "240" | "240p" => Some(VideoQuality::Low240),
            "360" | "360p" => Some(VideoQuality::Medium360),
            "480" | "480p" => Some(VideoQuality::Medium480),
            "720" | "720p" => Some(VideoQuality::High720),
            "1080" | "1080p" => Some(VideoQuality::High1080),
            "1440" | "1440p" => Some(VideoQuality::High1440),
            "2160" | "2160p" | "4k" => Some(VideoQuality::High2160),
            _ => None,
        }
    }
}

impl std::fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Audio codecs ranked by preference; higher variants win the audio pick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AudioEncoding {
    Mp3,
    Vorbis,
    Aac,
    Opus,
}

/// Remote stream-metadata and transfer capability. The real implementation
/// talks to the video service; tests substitute their own.
#[async_trait::async_trait]
pub trait MediaClient: Send + Sync {
    /// Look up the catalog of stream variants for one video id.
    async fn resolve_stream_catalog(&self, video_id: &str) -> Result<StreamCatalog>;

    /// Transfer one stream into the given sink, observing the token.
    async fn download_stream(
        &self,
        variant: &StreamVariant,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        token: &CancellationToken,
    ) -> Result<()>;
}

/// Best-effort post-processing tag writer. Failures are ignored by callers.
#[async_trait::async_trait]
pub trait MetadataTagger: Send + Sync {
    async fn tag(&self, video: &VideoRef, file_path: &Path) -> Result<()>;
}

/// Blocking yes/no confirmation, used only by the shutdown controller.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_are_ordered() {
        assert!(VideoQuality::High1080 > VideoQuality::High720);
        assert!(VideoQuality::Low144 < VideoQuality::Medium480);
    }

    #[test]
    fn quality_parses_common_spellings() {
        assert_eq!(VideoQuality::parse("720p"), Some(VideoQuality::High720));
        assert_eq!(VideoQuality::parse("1080"), Some(VideoQuality::High1080));
        assert_eq!(VideoQuality::parse("4k"), Some(VideoQuality::High2160));
        assert_eq!(VideoQuality::parse("potato"), None);
    }

    #[test]
    fn audio_encodings_rank_opus_highest() {
        assert!(AudioEncoding::Opus > AudioEncoding::Aac);
        assert!(AudioEncoding::Aac > AudioEncoding::Vorbis);
        assert!(AudioEncoding::Vorbis > AudioEncoding::Mp3);
    }
}
