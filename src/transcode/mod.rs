use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use crate::api::{MetadataTagger, VideoRef};
use crate::errors::{AppError, Result};
use crate::utils::generate_job_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Exited,
}

/// What ffmpeg should do with the downloaded temp file(s).
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Stream-copy video + audio into one container, no re-encode.
    MuxStreams { video_in: PathBuf, audio_in: PathBuf },
    /// Strip any video track and re-encode the audio, optionally at a
    /// fixed bitrate.
    ReencodeAudio {
        input: PathBuf,
        bitrate_kbps: Option<u32>,
    },
}

impl JobKind {
    fn inputs(&self) -> Vec<PathBuf> {
        match self {
            JobKind::MuxStreams { video_in, audio_in } => {
                vec![video_in.clone(), audio_in.clone()]
            }
            JobKind::ReencodeAudio { input, .. } => vec![input.clone()],
        }
    }
}

/// One external ffmpeg invocation, from spawn to post-exit cleanup.
#[derive(Debug)]
pub struct ConversionJob {
    pub id: Uuid,
    pub video: VideoRef,
    pub inputs: Vec<PathBuf>,
    pub intermediate_output: PathBuf,
    pub final_destination: PathBuf,
    pub state: JobState,
    kill: CancellationToken,
}

impl ConversionJob {
    /// Signal used by the shutdown controller to force-terminate the
    /// process; the job's waiter task owns the actual kill.
    pub fn kill_signal(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Registry entry without a backing process, for exercising the
    /// registry and shutdown paths in isolation.
    #[cfg(test)]
    pub fn fake(
        id: Uuid,
        video: VideoRef,
        intermediate_output: PathBuf,
        final_destination: PathBuf,
    ) -> Self {
        Self {
            id,
            video,
            inputs: Vec::new(),
            intermediate_output,
            final_destination,
            state: JobState::Running,
            kill: CancellationToken::new(),
        }
    }
}

/// The shared set of currently-running transcode jobs.
///
/// Completion callbacks of independent videos add and remove entries
/// concurrently while the shutdown controller enumerates, so every access
/// goes through one mutex.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, ConversionJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: ConversionJob) {
        let mut jobs = self.jobs.lock().await;
        jobs.insert(job.id, job);
    }

    pub async fn remove(&self, id: Uuid) -> Option<ConversionJob> {
        let mut jobs = self.jobs.lock().await;
        jobs.remove(&id)
    }

    pub async fn active_count(&self) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.active_count().await == 0
    }

    /// Snapshot of every job's kill signal, for force-termination.
    pub async fn kill_signals(&self) -> Vec<CancellationToken> {
        let jobs = self.jobs.lock().await;
        jobs.values().map(|job| job.kill_signal()).collect()
    }
}

/// A finished download waiting for its ffmpeg pass.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub video: VideoRef,
    pub kind: JobKind,
    pub intermediate_output: PathBuf,
    pub final_destination: PathBuf,
}

/// Spawns and tracks one ffmpeg process per completed download.
///
/// Jobs are registered before the process starts so a concurrent shutdown
/// check always sees them; a detached waiter task observes process exit and
/// runs the finalization sequence exactly once.
pub struct TranscodeManager {
    ffmpeg_path: PathBuf,
    registry: JobRegistry,
    tagger: Arc<dyn MetadataTagger>,
}

impl TranscodeManager {
    pub fn new(ffmpeg_path: PathBuf, registry: JobRegistry, tagger: Arc<dyn MetadataTagger>) -> Self {
        Self {
            ffmpeg_path,
            registry,
            tagger,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn tagger(&self) -> &Arc<dyn MetadataTagger> {
        &self.tagger
    }

    /// Start one conversion. The returned id is already registered when
    /// this returns; on spawn failure the placeholder is removed again and
    /// the error is reported like any other per-video failure.
    pub async fn spawn(&self, request: TranscodeRequest) -> Result<Uuid> {
        let id = generate_job_id();
        let kill = CancellationToken::new();
        let job = ConversionJob {
            id,
            video: request.video.clone(),
            inputs: request.kind.inputs(),
            intermediate_output: request.intermediate_output.clone(),
            final_destination: request.final_destination.clone(),
            state: JobState::Running,
            kill: kill.clone(),
        };
        self.registry.insert(job).await;

        let args = build_ffmpeg_args(&request.kind, &request.intermediate_output);
        log::info!(
            "🎬 [FFMPEG] converting {}: {} {}",
            request.video.title,
            self.ffmpeg_path.display(),
            args.join(" ")
        );

        let spawned = tokio::process::Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.registry.remove(id).await;
                return Err(AppError::ProcessSpawn(e.to_string()));
            }
        };

        let registry = self.registry.clone();
        let tagger = Arc::clone(&self.tagger);
        tokio::spawn(async move {
            let exited = tokio::select! {
                biased;
                _ = kill.cancelled() => None,
                status = child.wait() => Some(status),
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            match status {
                Ok(status) => log::debug!("[FFMPEG] job {} exited: {}", id, status),
                Err(e) => log::warn!("[FFMPEG] job {} wait failed: {}", id, e),
            }

            if let Some(mut job) = registry.remove(id).await {
                job.state = JobState::Exited;
                finalize(job, tagger).await;
            }
        });

        Ok(id)
    }
}

/// Post-exit sequence: tag (best effort), copy the intermediate output to
/// its destination, then delete the intermediate and temp source files.
/// Temp sources survive a failed copy so the artifact is never lost.
async fn finalize(job: ConversionJob, tagger: Arc<dyn MetadataTagger>) {
    if let Err(e) = tagger.tag(&job.video, &job.intermediate_output).await {
        log::warn!("[TAG] tagging {} failed (ignored): {}", job.video.title, e);
    }

    match tokio::fs::copy(&job.intermediate_output, &job.final_destination).await {
        Ok(_) => {
            if let Err(e) = tokio::fs::remove_file(&job.intermediate_output).await {
                log::warn!(
                    "[FFMPEG] could not remove {}: {}",
                    job.intermediate_output.display(),
                    e
                );
            }
            for input in &job.inputs {
                if let Err(e) = tokio::fs::remove_file(input).await {
                    log::warn!("[FFMPEG] could not remove {}: {}", input.display(), e);
                }
            }
            log::info!("✅ [FFMPEG] finished {}", job.final_destination.display());
        }
        Err(e) => {
            // The converted file still exists at the intermediate path, so
            // the video is not retroactively marked as failed.
            log::error!(
                "[FFMPEG] copy to {} failed, leaving {} in place: {}",
                job.final_destination.display(),
                job.intermediate_output.display(),
                e
            );
        }
    }
}

fn build_ffmpeg_args(kind: &JobKind, output: &PathBuf) -> Vec<String> {
    match kind {
        JobKind::MuxStreams { video_in, audio_in } => vec![
            "-i".to_string(),
            video_in.to_string_lossy().to_string(),
            "-i".to_string(),
            audio_in.to_string_lossy().to_string(),
            "-y".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ],
        JobKind::ReencodeAudio { input, bitrate_kbps } => {
            let mut args = vec![
                "-i".to_string(),
                input.to_string_lossy().to_string(),
                "-vn".to_string(),
                "-y".to_string(),
            ];
            if let Some(kbps) = bitrate_kbps {
                args.push("-b:a".to_string());
                args.push(format!("{}k", kbps));
            }
            args.push(output.to_string_lossy().to_string());
            args
        }
    }
}
