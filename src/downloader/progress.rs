use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use crate::downloader::ProgressEvent;

const MEGABYTE: f64 = (1u64 << 20) as f64;

/// Percentage of a transfer, floored and clamped to [0, 100].
/// A zero or unknown total short-circuits to 0 instead of dividing.
pub fn percent(bytes_written: u64, total_size_bytes: u64) -> u8 {
    if total_size_bytes == 0 {
        return 0;
    }
    (bytes_written.saturating_mul(100) / total_size_bytes).min(100) as u8
}

/// Byte sink wrapper that reports download progress.
///
/// Every write lands in the inner sink first; at most once per elapsed
/// sample period (one second in production) the writer computes the current
/// speed and percentage and fires a [`ProgressEvent`]. Emission is
/// fire-and-forget: a dropped receiver is logged and swallowed, and a
/// cancelled transfer suppresses the event silently. The write path itself
/// never fails because of progress reporting.
pub struct ProgressWriter<W> {
    inner: W,
    events: UnboundedSender<ProgressEvent>,
    token: CancellationToken,
    total_size_bytes: u64,
    bytes_written: u64,
    bytes_since_sample: u64,
    last_sample: Instant,
    sample_period: Duration,
}

impl<W: AsyncWrite + Unpin> ProgressWriter<W> {
    pub fn new(
        inner: W,
        total_size_bytes: u64,
        events: UnboundedSender<ProgressEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner,
            events,
            token,
            total_size_bytes,
            bytes_written: 0,
            bytes_since_sample: 0,
            last_sample: Instant::now(),
            sample_period: Duration::from_secs(1),
        }
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn record(&mut self, written: usize) {
        self.bytes_written += written as u64;
        self.bytes_since_sample += written as u64;

        let elapsed = self.last_sample.elapsed();
        if elapsed < self.sample_period {
            return;
        }

        let elapsed_secs = elapsed.as_secs_f64();
        let speed_mbps = if elapsed_secs > 0.0 {
            let raw = self.bytes_since_sample as f64 / elapsed_secs / MEGABYTE;
            (raw * 1000.0).round() / 1000.0
        } else {
            0.0
        };
        self.last_sample = Instant::now();
        self.bytes_since_sample = 0;

        // Cancellation outranks reporting: no event for a dying transfer.
        if self.token.is_cancelled() {
            return;
        }

        let event = ProgressEvent {
            percent: percent(self.bytes_written, self.total_size_bytes),
            speed_mbps,
        };
        if let Err(e) = self.events.send(event) {
            // Losing a progress update must never fail a download.
            log::warn!("[PROGRESS] dropped progress event: {}", e);
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.record(written);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    #[test]
    fn percent_clamps_and_floors() {
        assert_eq!(percent(0, 100), 0);
        assert_eq!(percent(999, 1000), 99);
        assert_eq!(percent(100, 100), 100);
        assert_eq!(percent(150, 100), 100);
    }

    #[test]
    fn percent_short_circuits_on_zero_total() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(12345, 0), 0);
    }

    #[test]
    fn percent_is_monotone_over_growing_writes() {
        let total = 7777u64;
        let mut last = 0u8;
        for bytes in (0..=total).step_by(13) {
            let p = percent(bytes, total);
            assert!(p >= last, "percentage regressed at {} bytes", bytes);
            assert!(p <= 100);
            last = p;
        }
    }

    #[tokio::test]
    async fn writes_pass_through_and_emit_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let mut writer = ProgressWriter::new(Vec::new(), 100, tx, token)
            .with_sample_period(Duration::ZERO);

        writer.write_all(&[0u8; 50]).await.unwrap();
        writer.write_all(&[1u8; 50]).await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(writer.bytes_written(), 100);
        assert_eq!(writer.into_inner().len(), 100);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.percent, 50);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.percent, 100);
    }

    #[tokio::test]
    async fn cancelled_token_suppresses_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        token.cancel();
        let mut writer = ProgressWriter::new(Vec::new(), 100, tx, token)
            .with_sample_period(Duration::ZERO);

        writer.write_all(&[0u8; 100]).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(writer.bytes_written(), 100);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_fail_writes() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let token = CancellationToken::new();
        let mut writer = ProgressWriter::new(Vec::new(), 100, tx, token)
            .with_sample_period(Duration::ZERO);

        writer.write_all(&[0u8; 100]).await.unwrap();
        assert_eq!(writer.bytes_written(), 100);
    }

    #[tokio::test]
    async fn throttles_to_one_event_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let mut writer = ProgressWriter::new(Vec::new(), 1000, tx, token)
            .with_sample_period(Duration::from_secs(3600));

        for _ in 0..10 {
            writer.write_all(&[0u8; 10]).await.unwrap();
        }
        // The period never elapsed, so nothing was sampled.
        assert!(rx.try_recv().is_err());
    }
}
