use chrono::Utc;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::{Request, Transport};

use super::install::Platform;
use super::types::{DownloadProgress, DownloadSession, VersionDescriptor};

/// `<dir>/update-<version>.<ext>`, with the version reduced to filename-safe characters.
pub fn installer_path(dir: &Path, version: &str, platform: Platform) -> PathBuf {
    let safe = version
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    dir.join(format!("update-{safe}.{}", platform.installer_extension()))
}

fn progress_of(downloaded: u64, total: Option<u64>, started: Instant) -> DownloadProgress {
    let percent = total.filter(|t| *t > 0).map(|t| {
        let raw = downloaded as f64 * 100.0 / t as f64;
        (raw.min(100.0) * 100.0).round() / 100.0
    });
    let elapsed = started.elapsed().as_secs_f64();
    let bytes_per_second = if elapsed > 0.0 {
        downloaded as f64 / elapsed
    } else {
        0.0
    };
    DownloadProgress {
        percent,
        downloaded_bytes: downloaded,
        total_bytes: total,
        bytes_per_second,
    }
}

async fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Unable to remove partial download {}: {e}", path.display());
        }
    }
}

fn stalled(stall_timeout: Duration) -> Error {
    Error::Network(format!(
        "Download stalled: no data for {}s",
        stall_timeout.as_secs()
    ))
}

/// Streams `descriptor.download_url` into `target`, calling `on_progress` after every chunk.
///
/// Waiting longer than `stall_timeout` for the response or for any chunk fails the
/// transfer. The partial file is removed when the transfer fails or is cancelled.
pub async fn download_installer<F>(
    transport: &dyn Transport,
    descriptor: &VersionDescriptor,
    target: &Path,
    stall_timeout: Duration,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<DownloadSession>
where
    F: FnMut(DownloadProgress),
{
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::fs(parent, e))?;
    }

    let started_at = Utc::now();
    let started = Instant::now();
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        body = timeout(stall_timeout, transport.open_stream(Request::get(&descriptor.download_url))) => {
            body.map_err(|_| stalled(stall_timeout))??
        }
    };
    let total = body.content_length;
    let mut chunks = body.chunks;

    let mut file = fs::File::create(target)
        .await
        .map_err(|e| Error::fs(target, e))?;
    let mut downloaded: u64 = 0;

    let outcome: Result<()> = async {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = timeout(stall_timeout, chunks.next()) => {
                    next.map_err(|_| stalled(stall_timeout))?
                }
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::fs(target, e))?;
            downloaded += chunk.len() as u64;
            on_progress(progress_of(downloaded, total, started));
        }
        file.flush().await.map_err(|e| Error::fs(target, e))?;
        if let Some(expected) = total {
            if downloaded < expected {
                return Err(Error::Network(format!(
                    "Download ended after {downloaded} of {expected} bytes"
                )));
            }
        }
        Ok(())
    }
    .await;

    drop(file);
    if let Err(e) = outcome {
        discard_partial(target).await;
        return Err(e);
    }

    Ok(DownloadSession {
        version: descriptor.version.clone(),
        target_path: target.to_path_buf(),
        total_bytes: total,
        downloaded_bytes: downloaded,
        started_at,
    })
}
