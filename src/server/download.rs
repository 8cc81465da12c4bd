use futures_util::StreamExt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, SentimentError};

/// Fetch `url` into a temporary `.wav` file in `dir`, deleted when the handle drops
pub async fn download_to_temp(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
) -> Result<NamedTempFile> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SentimentError::Load(format!("Failed to download {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SentimentError::Load(format!(
            "Failed to download {}: HTTP {}",
            url, status
        )));
    }

    let mut file = tempfile::Builder::new()
        .prefix("voice-sentiment-")
        .suffix(".wav")
        .tempfile_in(dir)
        .map_err(|e| SentimentError::Load(format!("Failed to create temp file: {}", e)))?;

    let mut stream = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| SentimentError::Load(format!("Failed to download {}: {}", url, e)))?;
        file.write_all(&chunk)
            .map_err(|e| SentimentError::Load(format!("Failed to write download: {}", e)))?;
        written += chunk.len();
    }
    file.flush()
        .map_err(|e| SentimentError::Load(format!("Failed to write download: {}", e)))?;

    debug!("Downloaded {} bytes from {} to {:?}", written, url, file.path());
    Ok(file)
}
