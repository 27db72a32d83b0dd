use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use crate::api::{MediaClient, StreamVariant, VideoRef};
use crate::downloader::progress::ProgressWriter;
use crate::downloader::selector::select_streams;
use crate::downloader::{DownloadOptions, DownloadTask, ProgressEvent, StatusEvent};
use crate::errors::{AppError, Result};
use crate::report::FailureReport;
use crate::transcode::{JobKind, TranscodeManager, TranscodeRequest};
use crate::utils::{ensure_dir_exists, sanitize_filename};

/// How one video's pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Drives one or two concurrent stream downloads for a single video and
/// hands the result to the transcode manager.
///
/// Failures other than cancellation are recorded in the batch report and
/// never propagate — the batch always continues with the next video.
pub struct DownloadCoordinator {
    client: Arc<dyn MediaClient>,
    transcoder: Arc<TranscodeManager>,
    report: FailureReport,
    save_directory: PathBuf,
    temp_directory: PathBuf,
}

impl DownloadCoordinator {
    pub fn new(
        client: Arc<dyn MediaClient>,
        transcoder: Arc<TranscodeManager>,
        report: FailureReport,
        save_directory: PathBuf,
        temp_directory: PathBuf,
    ) -> Self {
        Self {
            client,
            transcoder,
            report,
            save_directory,
            temp_directory,
        }
    }

    pub async fn download_video(
        &self,
        video: &VideoRef,
        options: &DownloadOptions,
        token: CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
        status: UnboundedSender<StatusEvent>,
    ) -> VideoOutcome {
        let result = self
            .run(video, options, token, progress, status)
            .await;

        match result {
            Ok(()) => {
                log::info!("🎉 [DOWNLOAD] completed {}", video.title);
                VideoOutcome::Completed
            }
            Err(e) if e.is_cancellation() => {
                // Cancellation is not a failure; partial temp files are
                // left for caller-level cleanup.
                log::info!("[DOWNLOAD] cancelled {}", video.title);
                VideoOutcome::Cancelled
            }
            Err(e) => {
                self.report.record(&video.title, e.to_string()).await;
                VideoOutcome::Failed
            }
        }
    }

    async fn run(
        &self,
        video: &VideoRef,
        options: &DownloadOptions,
        token: CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
        status: UnboundedSender<StatusEvent>,
    ) -> Result<()> {
        let _ = status.send(StatusEvent::Downloading {
            title: video.title.clone(),
        });

        ensure_dir_exists(&self.temp_directory).await?;
        ensure_dir_exists(&self.save_directory).await?;

        let catalog = self.client.resolve_stream_catalog(&video.id).await?;
        let selection = select_streams(&catalog, options.quality, options.prefer_highest_fps)?;

        if options.audio_only {
            let audio = selection
                .audio
                .ok_or_else(|| AppError::Download("no audio stream available".to_string()))?;
            self.run_single_stream(video, options, audio, token, progress, status)
                .await
        } else {
            let video_variant = selection.video.ok_or(AppError::NoStreamsAvailable)?;
            let audio_variant = selection
                .audio
                .ok_or_else(|| AppError::Download("no audio stream available".to_string()))?;
            self.run_dual_stream(video, options, video_variant, audio_variant, token, progress, status)
                .await
        }
    }

    /// Audio-only target: one transfer straight into the final container
    /// name; ffmpeg only runs when the caller asked for re-encoding.
    async fn run_single_stream(
        &self,
        video: &VideoRef,
        options: &DownloadOptions,
        audio: StreamVariant,
        token: CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
        status: UnboundedSender<StatusEvent>,
    ) -> Result<()> {
        let clean_name = sanitize_filename(&video.title);
        let container_ext = audio.container_ext.clone();
        let temp_source = self.temp_directory.join(&clean_name);

        let mut task = DownloadTask::new(video.clone(), audio, temp_source.clone());
        task.bytes_written = self.transfer_with_progress(&task, &token, progress).await?;
        log::debug!(
            "[DOWNLOAD] {} bytes of audio for {}",
            task.bytes_written,
            task.video.title
        );

        if options.convert {
            if token.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let _ = status.send(StatusEvent::Converting {
                title: video.title.clone(),
            });

            let target_name = format!("{}.{}", clean_name, options.format.extension());
            self.transcoder
                .spawn(TranscodeRequest {
                    video: video.clone(),
                    kind: JobKind::ReencodeAudio {
                        input: temp_source,
                        bitrate_kbps: options.bitrate_kbps,
                    },
                    intermediate_output: self.temp_directory.join(&target_name),
                    final_destination: self.save_directory.join(&target_name),
                })
                .await?;
        } else {
            // No conversion wanted: adopt the source container's extension
            // and finalize in place.
            let final_destination = self
                .save_directory
                .join(format!("{}.{}", clean_name, container_ext));
            tokio::fs::copy(&temp_source, &final_destination).await?;
            tokio::fs::remove_file(&temp_source).await?;
            if let Err(e) = self.transcoder.tagger().tag(video, &final_destination).await {
                log::warn!("[TAG] tagging {} failed (ignored): {}", video.title, e);
            }
        }

        Ok(())
    }

    /// Video + audio target: both elementary streams transfer concurrently
    /// into temp files, then ffmpeg stream-copies them into one container.
    /// Progress is reported against the video stream's size only.
    async fn run_dual_stream(
        &self,
        video: &VideoRef,
        options: &DownloadOptions,
        video_variant: StreamVariant,
        audio_variant: StreamVariant,
        token: CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
        status: UnboundedSender<StatusEvent>,
    ) -> Result<()> {
        let clean_name = sanitize_filename(&video.title);
        let video_temp = self.temp_directory.join(&clean_name);
        let audio_temp = self
            .temp_directory
            .join(format!("{}.{}", clean_name, audio_variant.container_ext));

        let mut video_task = DownloadTask::new(video.clone(), video_variant, video_temp.clone());
        let audio_task = DownloadTask::new(video.clone(), audio_variant, audio_temp.clone());

        let video_transfer = self.transfer_with_progress(&video_task, &token, progress);
        let audio_transfer = self.transfer_plain(&audio_task, &token);

        // Both transfers run to completion-or-cancellation before anything
        // else happens; the token is shared so cancellation stops both.
        let (video_result, audio_result) = tokio::join!(video_transfer, audio_transfer);
        video_task.bytes_written = merge_transfer_results(video_result, audio_result)?;
        log::debug!(
            "[DOWNLOAD] {} bytes of video for {}",
            video_task.bytes_written,
            video_task.video.title
        );

        if token.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let _ = status.send(StatusEvent::Converting {
            title: video.title.clone(),
        });

        let output_name = format!("{}.mkv", clean_name);
        self.transcoder
            .spawn(TranscodeRequest {
                video: video.clone(),
                kind: JobKind::MuxStreams {
                    video_in: video_temp,
                    audio_in: audio_temp,
                },
                intermediate_output: self.temp_directory.join(&output_name),
                final_destination: self.save_directory.join(&output_name),
            })
            .await?;

        Ok(())
    }

    /// One transfer through the progress-instrumented writer; returns the
    /// byte count the writer saw.
    async fn transfer_with_progress(
        &self,
        task: &DownloadTask,
        token: &CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<u64> {
        let file = tokio::fs::File::create(&task.destination).await?;
        let mut sink = ProgressWriter::new(
            file,
            task.total_size_bytes,
            progress,
            token.clone(),
        );

        self.client
            .download_stream(&task.variant, &mut sink, token)
            .await?;
        sink.shutdown().await?;
        Ok(sink.bytes_written())
    }

    async fn transfer_plain(&self, task: &DownloadTask, token: &CancellationToken) -> Result<()> {
        let mut file = tokio::fs::File::create(&task.destination).await?;
        self.client
            .download_stream(&task.variant, &mut file, token)
            .await?;
        file.shutdown().await?;
        Ok(())
    }
}

/// Joins the two transfer outcomes of a dual download. A real error on
/// either side outranks cancellation, so the batch report names the actual
/// cause; two clean finishes return the instrumented byte count.
fn merge_transfer_results(
    video: Result<u64>,
    audio: Result<()>,
) -> Result<u64> {
    match (video, audio) {
        (Ok(bytes), Ok(())) => Ok(bytes),
        (Err(e), _) if !e.is_cancellation() => Err(e),
        (_, Err(e)) if !e.is_cancellation() => Err(e),
        (Err(e), _) => Err(e),
        (_, Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_real_errors_over_cancellation() {
        let merged = merge_transfer_results(
            Err(AppError::Cancelled),
            Err(AppError::Network("reset".to_string())),
        );
        assert!(matches!(merged, Err(AppError::Network(_))));

        let merged = merge_transfer_results(Err(AppError::Network("reset".to_string())), Ok(()));
        assert!(matches!(merged, Err(AppError::Network(_))));
    }

    #[test]
    fn merge_keeps_cancellation_when_both_sides_cancelled() {
        let merged = merge_transfer_results(Err(AppError::Cancelled), Err(AppError::Cancelled));
        assert!(matches!(merged, Err(AppError::Cancelled)));
    }

    #[test]
    fn merge_passes_byte_count_through() {
        assert_eq!(merge_transfer_results(Ok(42), Ok(())).unwrap(), 42);
    }
}
