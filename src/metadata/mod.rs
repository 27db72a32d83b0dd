use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::api::{MetadataTagger, VideoRef};
use crate::errors::{AppError, Result};

/// Minimal tag payload written next to a finished file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: String,
    pub title: String,
    pub tagged_at: chrono::DateTime<chrono::Utc>,
}

/// Default tagger: drops a `<file>.info.json` sidecar with the video's
/// identity, the way yt-dlp's `--write-info-json` does. Real tag embedding
/// lives behind the [`MetadataTagger`] seam and can be swapped in by the
/// caller.
pub struct InfoJsonTagger;

#[async_trait::async_trait]
impl MetadataTagger for InfoJsonTagger {
    async fn tag(&self, video: &VideoRef, file_path: &Path) -> Result<()> {
        let info = TagInfo {
            id: video.id.clone(),
            title: video.title.clone(),
            tagged_at: chrono::Utc::now(),
        };

        let mut sidecar = file_path.as_os_str().to_owned();
        sidecar.push(".info.json");

        let content = serde_json::to_string_pretty(&info)?;
        tokio::fs::write(&sidecar, content)
            .await
            .map_err(|e| AppError::Tagging(e.to_string()))?;
        log::debug!("[TAG] wrote sidecar for {}", video.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_an_info_json_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mkv");
        tokio::fs::write(&media, b"x").await.unwrap();

        let video = VideoRef {
            id: "vid42".to_string(),
            title: "A Clip".to_string(),
        };
        InfoJsonTagger.tag(&video, &media).await.unwrap();

        let sidecar = dir.path().join("clip.mkv.info.json");
        let content = tokio::fs::read_to_string(&sidecar).await.unwrap();
        let info: TagInfo = serde_json::from_str(&content).unwrap();
        assert_eq!(info.id, "vid42");
        assert_eq!(info.title, "A Clip");
    }

    #[tokio::test]
    async fn tagging_into_a_missing_directory_fails() {
        let video = VideoRef {
            id: "vid".to_string(),
            title: "t".to_string(),
        };
        let err = InfoJsonTagger
            .tag(&video, Path::new("/nonexistent/dir/clip.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Tagging(_)));
    }
}
