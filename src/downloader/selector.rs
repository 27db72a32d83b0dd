use crate::api::{StreamCatalog, StreamVariant, VideoQuality};
use crate::errors::{AppError, Result};

/// The streams picked for one video. `video` is absent for audio-only
/// catalogs; callers requesting audio-only must tolerate that.
#[derive(Debug, Clone)]
pub struct StreamSelection {
    pub video: Option<StreamVariant>,
    pub audio: Option<StreamVariant>,
}

/// Picks the best video and audio variants out of a catalog.
///
/// Video policy: an exact quality-tier match always wins. Otherwise, with
/// `prefer_highest_fps`, candidates rank by framerate, then whether they
/// meet the desired tier, then tier; without it, by tier-met then tier.
/// Audio policy: the highest audio-encoding rank wins, unconditionally.
pub fn select_streams(
    catalog: &StreamCatalog,
    desired: VideoQuality,
    prefer_highest_fps: bool,
) -> Result<StreamSelection> {
    if catalog.is_empty() {
        return Err(AppError::NoStreamsAvailable);
    }

    let video = catalog
        .video_streams
        .iter()
        .max_by_key(|v| video_rank(v, desired, prefer_highest_fps))
        .cloned();

    let audio = catalog
        .audio_streams
        .iter()
        .max_by_key(|a| a.audio_encoding)
        .cloned();

    Ok(StreamSelection { video, audio })
}

fn video_rank(
    variant: &StreamVariant,
    desired: VideoQuality,
    prefer_highest_fps: bool,
) -> (bool, u32, bool, Option<VideoQuality>) {
    let exact = variant.quality == Some(desired);
    let framerate = if prefer_highest_fps {
        variant.framerate.unwrap_or(0)
    } else {
        0
    };
    let meets_desired = variant.quality.map_or(false, |q| q >= desired);
    (exact, framerate, meets_desired, variant.quality)
}
