use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::ProvisionerConfig;
use crate::error::{IoResultExt, ProvisionError, ProvisionResult};
use crate::server::types::{DownloadProgress, ProgressReporter};

const DNS_HINT: &str =
    "the host could not be resolved; check the machine's DNS configuration and outbound network access";

/// Resolver failure messages across platforms and hyper versions.
const DNS_MESSAGES: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host is known",
    "nodename nor servname",
    "temporary failure in name resolution",
    "no address associated with hostname",
];

/// WSAHOST_NOT_FOUND, WSATRY_AGAIN, WSANO_DATA
const WINDOWS_DNS_CODES: &[i32] = &[11001, 11002, 11004];

/// Outcome of one completed download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-1 of the received body
    pub sha1: String,
}

/// Failure of a single attempt, tagged with whether another attempt may help.
struct AttemptError {
    error: ProvisionError,
    retryable: bool,
}

impl AttemptError {
    fn fatal(error: ProvisionError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    fn transient(error: ProvisionError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

/// HTTP client shared by every stage: browser-like identity, separate connect and
/// response-header timeouts, unbounded transfer time.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    response_timeout: Duration,
    attempts: u32,
    retry_delay: Duration,
}

impl Downloader {
    pub fn new(config: &ProvisionerConfig) -> ProvisionResult<Self> {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&config.referer) {
            Ok(referer) => {
                headers.insert(header::REFERER, referer);
            }
            Err(_) => log::warn!("Ignoring unusable Referer {:?}", config.referer),
        }
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| {
                ProvisionError::InvalidRequest(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            response_timeout: config.response_timeout(),
            attempts: config.download_attempts.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Fetch and deserialize a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ProvisionResult<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| ProvisionError::Upstream {
            url: url.to_string(),
            message: format!("unexpected response body: {}", e),
        })
    }

    /// Fetch a document as text. Failures are reported as upstream errors.
    pub async fn get_text(&self, url: &str) -> ProvisionResult<String> {
        log::debug!("GET {}", url);
        self.with_retries(url, || async move {
            let response = self.send(url).await?;
            response
                .text()
                .await
                .map_err(|e| classify_request_error(url, &e))
        })
        .await
        .map_err(as_upstream)
    }

    /// Stream `url` into `dest`.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        reporter: &dyn ProgressReporter,
    ) -> ProvisionResult<DownloadReport> {
        self.download_verified(url, dest, None, reporter).await
    }

    /// Stream `url` into `dest`, checking the body against `expected_sha1` when given.
    ///
    /// Bytes land in `<dest>.part` and are renamed into place only after a complete,
    /// length-checked transfer. Progress is cumulative and never moves backwards,
    /// even across retries.
    pub async fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_sha1: Option<&str>,
        reporter: &dyn ProgressReporter,
    ) -> ProvisionResult<DownloadReport> {
        log::info!("Downloading {} -> {:?}", url, dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.at_path(parent)?;
        }

        let part = part_path(dest);
        let high_water = std::sync::atomic::AtomicU64::new(0);
        let (part_ref, high_water_ref) = (part.as_path(), &high_water);
        let result = self
            .with_retries(url, move || {
                self.try_download(url, dest, part_ref, expected_sha1, reporter, high_water_ref)
            })
            .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }

    async fn with_retries<T, F, Fut>(&self, url: &str, mut attempt_fn: F) -> ProvisionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    if !failure.retryable || attempt >= self.attempts {
                        log::error!(
                            "Request to {} failed after {} attempt(s): {}",
                            url,
                            attempt,
                            failure.error
                        );
                        return Err(failure.error);
                    }
                    log::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying...",
                        attempt,
                        self.attempts,
                        failure.error
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }

    async fn send(&self, url: &str) -> Result<Response, AttemptError> {
        let request = self.client.get(url).send();
        let response = match tokio::time::timeout(self.response_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify_request_error(url, &e)),
            Err(_) => {
                return Err(AttemptError::transient(ProvisionError::Download {
                    url: url.to_string(),
                    message: format!(
                        "no response headers within {}s",
                        self.response_timeout.as_secs()
                    ),
                }))
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error = ProvisionError::Download {
            url: url.to_string(),
            message: format!("HTTP {}", status),
        };
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(AttemptError::transient(error))
        } else {
            Err(AttemptError::fatal(error))
        }
    }

    async fn try_download(
        &self,
        url: &str,
        dest: &Path,
        part: &Path,
        expected_sha1: Option<&str>,
        reporter: &dyn ProgressReporter,
        high_water: &std::sync::atomic::AtomicU64,
    ) -> Result<DownloadReport, AttemptError> {
        use std::sync::atomic::Ordering;

        let start = Instant::now();
        let response = self.send(url).await?;
        let total = response.content_length();
        log::debug!("Download size: {:?} bytes", total);

        let io_fatal = |e: std::io::Error| AttemptError::fatal(ProvisionError::io(part, e));
        let mut file = File::create(part).await.map_err(io_fatal)?;
        let mut hasher = Sha1::new();
        let mut downloaded: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_request_error(url, &e))?;
            file.write_all(&chunk).await.map_err(io_fatal)?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if downloaded > high_water.load(Ordering::Relaxed) {
                high_water.store(downloaded, Ordering::Relaxed);
                let progress = DownloadProgress::new(downloaded, total);
                reporter.update_progress(
                    progress.current_bytes,
                    progress.total_bytes,
                    progress.percent,
                );
            }
        }
        file.flush().await.map_err(io_fatal)?;
        file.sync_all().await.map_err(io_fatal)?;
        drop(file);

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(AttemptError::transient(
                    ProvisionError::DownloadIntegrityFailure {
                        path: dest.to_path_buf(),
                        detail: format!("received {} of {} bytes", downloaded, expected),
                    },
                ));
            }
        }

        let computed = format!("{:x}", hasher.finalize());
        if let Some(expected) = expected_sha1 {
            if !computed.eq_ignore_ascii_case(expected) {
                return Err(AttemptError::fatal(
                    ProvisionError::DownloadIntegrityFailure {
                        path: dest.to_path_buf(),
                        detail: format!("SHA-1 mismatch: expected {}, got {}", expected, computed),
                    },
                ));
            }
            log::debug!("SHA1 validated: {}", computed);
        }

        tokio::fs::rename(part, dest)
            .await
            .map_err(|e| AttemptError::fatal(ProvisionError::io(dest, e)))?;

        let secs = start.elapsed().as_secs_f64();
        log::info!(
            "Download stats: url={}, size={} bytes, time={:.2}s, throughput={:.2} MB/s",
            url,
            downloaded,
            secs,
            (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001)
        );

        Ok(DownloadReport {
            path: dest.to_path_buf(),
            bytes: downloaded,
            sha1: computed,
        })
    }
}

/// `<dest>.part`, the staging file a download streams into.
pub fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    dest.with_file_name(format!("{}.part", name))
}

fn as_upstream(error: ProvisionError) -> ProvisionError {
    match error {
        ProvisionError::Download { url, message } => ProvisionError::Upstream { url, message },
        other => other,
    }
}

fn classify_request_error(url: &str, error: &reqwest::Error) -> AttemptError {
    if is_dns_failure(error) {
        return AttemptError::fatal(ProvisionError::NetworkUnreachable {
            host: host_of(url),
            hint: DNS_HINT.to_string(),
        });
    }
    AttemptError::transient(ProvisionError::Download {
        url: url.to_string(),
        message: root_cause(error),
    })
}

/// Walks the source chain looking for a name-resolution failure.
pub fn is_dns_failure(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io
                .raw_os_error()
                .map_or(false, |code| cfg!(windows) && WINDOWS_DNS_CODES.contains(&code))
            {
                return true;
            }
        }
        let message = err.to_string().to_ascii_lowercase();
        if DNS_MESSAGES.iter().any(|m| message.contains(m)) {
            return true;
        }
        current = err.source();
    }
    false
}

fn root_cause(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}
