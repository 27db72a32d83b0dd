mod api;
mod config;
mod downloader;
mod errors;
mod metadata;
mod report;
mod shutdown;
mod transcode;
mod utils;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use api::{ConfirmPrompt, VideoQuality, VideoRef};
use config::AppConfig;
use downloader::coordinator::{DownloadCoordinator, VideoOutcome};
use downloader::http::HttpMediaClient;
use downloader::{DownloadOptions, ProgressEvent, StatusEvent};
use metadata::InfoJsonTagger;
use report::FailureReport;
use shutdown::ShutdownController;
use transcode::{JobRegistry, TranscodeManager};

#[derive(Parser, Debug)]
#[command(name = "playlist-downloader", version, about = "Downloads a playlist's videos as video or audio files")]
struct Cli {
    /// Videos to download, each as `<id>` or `<id>=<title>`
    #[arg(required = true)]
    videos: Vec<String>,

    /// Base URL of the stream-metadata service
    #[arg(long)]
    api_base: Url,

    /// Desired video quality tier (e.g. 720p, 1080p)
    #[arg(long)]
    quality: Option<String>,

    /// Rank streams by framerate before quality
    #[arg(long)]
    prefer_highest_fps: bool,

    /// Download the audio track only
    #[arg(long)]
    audio_only: bool,

    /// Re-encode audio into the configured format
    #[arg(long)]
    convert: bool,

    /// Target audio bitrate in kbps (conversion only)
    #[arg(long)]
    bitrate: Option<u32>,

    /// Override the configured save directory
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Asks on the terminal, used when conversions are still running at exit.
struct StdinPrompt;

impl ConfirmPrompt for StdinPrompt {
    fn confirm(&self, message: &str) -> bool {
        print!("{} [y/N] ", message);
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn parse_video(arg: &str) -> VideoRef {
    match arg.split_once('=') {
        Some((id, title)) => VideoRef {
            id: id.to_string(),
            title: title.to_string(),
        },
        None => VideoRef {
            id: arg.to_string(),
            title: arg.to_string(),
        },
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let mut config = match AppConfig::load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            AppConfig::default()
        }
    };

    if let Some(output) = cli.output.clone() {
        config.save_directory = output;
    }
    if let Some(quality) = cli.quality.as_deref() {
        match VideoQuality::parse(quality) {
            Some(q) => config.preferred_quality = q,
            None => {
                log::error!("Unknown quality tier: {}", quality);
                std::process::exit(2);
            }
        }
    }

    let options = DownloadOptions {
        quality: config.preferred_quality,
        prefer_highest_fps: cli.prefer_highest_fps || config.prefer_highest_fps,
        audio_only: cli.audio_only || config.audio_only,
        convert: cli.convert || config.convert.enabled,
        format: config.convert.format.clone(),
        bitrate_kbps: cli.bitrate.or(config.convert.bitrate_kbps),
    };

    let client = match HttpMediaClient::new(cli.api_base.clone(), 300) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let transcoder = Arc::new(TranscodeManager::new(
        config.ffmpeg_path.clone(),
        JobRegistry::new(),
        Arc::new(InfoJsonTagger),
    ));
    let controller = Arc::new(ShutdownController::new(transcoder.registry().clone()));
    let report = FailureReport::new();
    let coordinator = DownloadCoordinator::new(
        client,
        Arc::clone(&transcoder),
        report.clone(),
        config.save_directory.clone(),
        config.temp_directory.clone(),
    );

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let render = tokio::spawn(render_events(progress_rx, status_rx));

    // Ctrl-C maps to the user's exit request, confirmation included.
    let exit_controller = Arc::clone(&controller);
    let exit_listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            exit_controller.request_exit(&StdinPrompt).await;
        }
    });

    let token = controller.cancellation_token();
    let videos: Vec<VideoRef> = cli.videos.iter().map(|v| parse_video(v)).collect();
    let mut downloaded_count = 0usize;

    for video in &videos {
        if token.is_cancelled() {
            break;
        }
        info!("⬇️ [BATCH] downloading {}", video.title);
        let outcome = coordinator
            .download_video(
                video,
                &options,
                token.clone(),
                progress_tx.clone(),
                status_tx.clone(),
            )
            .await;
        if outcome == VideoOutcome::Completed {
            downloaded_count += 1;
        }
    }

    // Fixed epilogue on every path: show the failure report, then wait for
    // outstanding conversions.
    if let Some(summary) = report.summary().await {
        println!("Could not download:\n{}", summary);
    }
    controller.drain(&status_tx).await;
    let _ = status_tx.send(StatusEvent::Done);

    drop(progress_tx);
    drop(status_tx);
    let _ = render.await;

    info!("[BATCH] {} of {} videos downloaded", downloaded_count, videos.len());

    exit_listener.abort();
    let _ = exit_listener.await;
    match Arc::try_unwrap(controller) {
        Ok(controller) => controller.teardown(),
        Err(_) => log::debug!("shutdown listener still holds the controller"),
    }
}

/// Terminal rendering for the core's progress and status events.
async fn render_events(
    mut progress: mpsc::UnboundedReceiver<ProgressEvent>,
    mut status: mpsc::UnboundedReceiver<StatusEvent>,
) {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut progress_open = true;
    let mut status_open = true;
    while progress_open || status_open {
        tokio::select! {
            event = progress.recv(), if progress_open => match event {
                Some(ProgressEvent { percent, speed_mbps }) => {
                    bar.set_position(percent as u64);
                    bar.set_message(format!("{:.3} MB/s", speed_mbps));
                }
                None => progress_open = false,
            },
            event = status.recv(), if status_open => match event {
                Some(event) => {
                    bar.println(event.to_string());
                    if matches!(event, StatusEvent::Downloading { .. }) {
                        bar.set_position(0);
                        bar.set_message("");
                    }
                }
                None => status_open = false,
            },
        }
    }
    bar.finish_and_clear();
}
