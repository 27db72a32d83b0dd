use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use dirs;
use crate::api::VideoQuality;
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub save_directory: PathBuf,
    pub temp_directory: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub preferred_quality: VideoQuality,
    pub prefer_highest_fps: bool,
    pub audio_only: bool,
    pub convert: ConvertConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConvertConfig {
    pub enabled: bool,
    pub format: AudioFormat,
    pub bitrate_kbps: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            save_directory: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            temp_directory: std::env::temp_dir().join("playlist-downloader"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            preferred_quality: VideoQuality::High720,
            prefer_highest_fps: false,
            audio_only: false,
            convert: ConvertConfig::default(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: AudioFormat::Mp3,
            bitrate_kbps: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("playlist-downloader").join("config.json"))
    }
}
