pub mod coordinator;
pub mod http;
pub mod progress;
pub mod selector;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::api::{StreamVariant, VideoQuality, VideoRef};
use crate::config::AudioFormat;

/// Mutable progress state for one active transfer. Owned exclusively by the
/// download coordinator for its lifetime.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub video: VideoRef,
    pub variant: StreamVariant,
    pub destination: PathBuf,
    pub bytes_written: u64,
    pub total_size_bytes: u64,
}

impl DownloadTask {
    pub fn new(video: VideoRef, variant: StreamVariant, destination: PathBuf) -> Self {
        let total_size_bytes = variant.total_size_bytes;
        Self {
            video,
            variant,
            destination,
            bytes_written: 0,
            total_size_bytes,
        }
    }
}

/// What the caller asked for, per video.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub quality: VideoQuality,
    pub prefer_highest_fps: bool,
    pub audio_only: bool,
    pub convert: bool,
    pub format: AudioFormat,
    pub bitrate_kbps: Option<u32>,
}

/// Emitted at most once per second while a transfer is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub speed_mbps: f64,
}

/// Textual phase updates for the caller's display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusEvent {
    Downloading { title: String },
    Converting { title: String },
    StillConverting { count: usize },
    Done,
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusEvent::Downloading { title } => write!(f, "downloading {}", title),
            StatusEvent::Converting { title } => write!(f, "converting {}", title),
            StatusEvent::StillConverting { count } => {
                write!(f, "still converting {} files", count)
            }
            StatusEvent::Done => f.write_str("done"),
        }
    }
}
