use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use crate::api::ConfirmPrompt;
use crate::downloader::StatusEvent;
use crate::transcode::JobRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Downloads and transcodes may be running.
    Active,
    /// Cancellation requested; waiting for the job registry to empty.
    Draining,
    Terminated,
}

/// Owns the batch-wide cancellation token and the exit choreography around
/// outstanding transcodes.
pub struct ShutdownController {
    token: CancellationToken,
    registry: JobRegistry,
    state: Arc<Mutex<ShutdownState>>,
}

impl ShutdownController {
    pub fn new(registry: JobRegistry) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
            state: Arc::new(Mutex::new(ShutdownState::Active)),
        }
    }

    /// Token shared by every in-flight transfer of the current video.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.lock().await
    }

    /// User-requested exit. In-flight transfers are cancelled immediately;
    /// if conversions are still running the user must confirm, and
    /// declining leaves them untouched and returns to Active. Returns true
    /// once the controller reached Terminated.
    pub async fn request_exit(&self, prompt: &dyn ConfirmPrompt) -> bool {
        self.token.cancel();

        let count = self.registry.active_count().await;
        if count > 0 {
            let message = format!(
                "Still converting {} files. Are you sure you want to exit?",
                count
            );
            if !prompt.confirm(&message) {
                log::info!("[SHUTDOWN] exit declined, conversions keep running");
                return false;
            }
        }

        *self.state.lock().await = ShutdownState::Draining;

        // Best effort: termination errors are ignored, the waiter tasks
        // clean up after whatever exit the process manages.
        for kill in self.registry.kill_signals().await {
            kill.cancel();
        }
        while !self.registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        *self.state.lock().await = ShutdownState::Terminated;
        log::info!("[SHUTDOWN] all conversions terminated");
        true
    }

    /// Graceful end-of-batch drain: wait for outstanding conversions,
    /// surfacing a "still converting" status once per second.
    pub async fn drain(&self, status: &UnboundedSender<StatusEvent>) {
        *self.state.lock().await = ShutdownState::Draining;

        loop {
            let count = self.registry.active_count().await;
            if count == 0 {
                break;
            }
            let _ = status.send(StatusEvent::StillConverting { count });
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        *self.state.lock().await = ShutdownState::Terminated;
    }

    /// Releases the cancellation handle and the registry reference.
    pub fn teardown(self) {
        self.token.cancel();
        log::debug!("[SHUTDOWN] controller torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::VideoRef;
    use crate::transcode::{ConversionJob, JobState};
    use crate::utils::generate_job_id;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    struct Answer(bool);

    impl ConfirmPrompt for Answer {
        fn confirm(&self, _message: &str) -> bool {
            self.0
        }
    }

    struct MustNotPrompt;

    impl ConfirmPrompt for MustNotPrompt {
        fn confirm(&self, _message: &str) -> bool {
            panic!("no confirmation expected when nothing is converting");
        }
    }

    async fn insert_fake_job(registry: &JobRegistry) -> uuid::Uuid {
        let job = ConversionJob::fake(
            generate_job_id(),
            VideoRef {
                id: "id".to_string(),
                title: "title".to_string(),
            },
            PathBuf::from("/tmp/out"),
            PathBuf::from("/tmp/final"),
        );
        let id = job.id;
        registry.insert(job).await;
        id
    }

    #[tokio::test]
    async fn exit_without_jobs_skips_the_prompt() {
        let registry = JobRegistry::new();
        let controller = ShutdownController::new(registry);
        assert!(controller.request_exit(&MustNotPrompt).await);
        assert_eq!(controller.state().await, ShutdownState::Terminated);
        assert!(controller.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn declining_leaves_conversions_running() {
        let registry = JobRegistry::new();
        insert_fake_job(&registry).await;
        let controller = ShutdownController::new(registry.clone());

        assert!(!controller.request_exit(&Answer(false)).await);
        assert_eq!(registry.active_count().await, 1);
        // The download side is cancelled regardless of the answer.
        assert!(controller.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn accepting_kills_jobs_and_empties_the_registry() {
        let registry = JobRegistry::new();
        let id = insert_fake_job(&registry).await;
        let controller = ShutdownController::new(registry.clone());

        // Stand-in for the job's waiter task: removes the entry once the
        // kill signal fires.
        let kills = registry.kill_signals().await;
        let waiter_registry = registry.clone();
        let kill = kills[0].clone();
        tokio::spawn(async move {
            kill.cancelled().await;
            waiter_registry.remove(id).await;
        });

        assert!(controller.request_exit(&Answer(true)).await);
        assert!(registry.is_empty().await);
        assert_eq!(controller.state().await, ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn drain_reports_progress_until_empty() {
        let registry = JobRegistry::new();
        let id = insert_fake_job(&registry).await;
        let controller = ShutdownController::new(registry.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let drain_registry = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            drain_registry.remove(id).await;
        });

        controller.drain(&tx).await;
        assert_eq!(controller.state().await, ShutdownState::Terminated);

        let status = rx.try_recv().unwrap();
        assert_eq!(status, StatusEvent::StillConverting { count: 1 });
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn drain_with_empty_registry_finishes_immediately() {
        let registry = JobRegistry::new();
        let controller = ShutdownController::new(registry);
        let (tx, mut rx) = mpsc::unbounded_channel();

        controller.drain(&tx).await;
        assert_eq!(controller.state().await, ShutdownState::Terminated);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn teardown_releases_the_token() {
        let controller = ShutdownController::new(JobRegistry::new());
        let token = controller.cancellation_token();
        controller.teardown();
        assert!(token.is_cancelled());
    }

    #[test]
    fn fake_jobs_start_running() {
        let job = ConversionJob::fake(
            generate_job_id(),
            VideoRef {
                id: "id".to_string(),
                title: "t".to_string(),
            },
            PathBuf::from("/tmp/out"),
            PathBuf::from("/tmp/final"),
        );
        assert_eq!(job.state, JobState::Running);
    }
}
