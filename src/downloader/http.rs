use std::time::Duration;
use futures_util::StreamExt;
use reqwest::{Client, ClientBuilder};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::api::{MediaClient, StreamCatalog, StreamVariant};
use crate::errors::{AppError, Result};

/// HTTP-backed implementation of the remote stream service.
///
/// Stream-catalog lookups hit `{base}/videos/{id}/streams` and deserialize
/// the JSON body; media transfers stream the variant's URL chunk by chunk
/// into the caller's sink.
pub struct HttpMediaClient {
    client: Client,
    metadata_base: Url,
}

impl HttpMediaClient {
    pub fn new(metadata_base: Url, timeout_seconds: u64) -> Result<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(timeout_seconds))
            .connect_timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            metadata_base,
        })
    }

    fn catalog_url(&self, video_id: &str) -> Result<Url> {
        self.metadata_base
            .join(&format!("videos/{}/streams", video_id))
            .map_err(|e| AppError::Network(format!("invalid catalog URL: {}", e)))
    }
}

#[async_trait::async_trait]
impl MediaClient for HttpMediaClient {
    async fn resolve_stream_catalog(&self, video_id: &str) -> Result<StreamCatalog> {
        let url = self.catalog_url(video_id)?;
        log::info!("🔍 [RESOLVE] Fetching stream catalog: {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let catalog: StreamCatalog = response.json().await?;
        log::info!(
            "✅ [RESOLVE] Catalog for {}: {} video / {} audio variants",
            video_id,
            catalog.video_streams.len(),
            catalog.audio_streams.len()
        );
        Ok(catalog)
    }

    async fn download_stream(
        &self,
        variant: &StreamVariant,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        token: &CancellationToken,
    ) -> Result<()> {
        let response = self.client.get(variant.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(AppError::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(chunk) => sink.write_all(&chunk?).await?,
                None => break,
            }
        }
        sink.flush().await?;
        Ok(())
    }
}
