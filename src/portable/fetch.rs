// src/portable/fetch.rs

//! Fetching distribution artifacts and release metadata

use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for establishing a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Source of archives and metadata files
///
/// [`HttpFetcher`] is the production implementation; tests substitute
/// their own.
pub trait ArchiveFetcher: Send + Sync {
    /// Stream the body at `url` into `dest`, returning the byte count
    ///
    /// Non-2xx responses and transport failures are `DownloadError`s.
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64>;

    /// Fetch a small text document; `Ok(None)` when it does not exist (404)
    fn fetch_text(&self, url: &str) -> Result<Option<String>>;
}

/// Blocking HTTP(S) fetcher with an optional progress bar
pub struct HttpFetcher {
    client: Client,
    show_progress: bool,
}

impl HttpFetcher {
    /// `timeout` bounds each whole request, body included
    pub fn new(timeout: Duration, show_progress: bool) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(concat!("npmkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::DownloadError(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            show_progress,
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        self.client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("request to {} failed: {}", url, e)))
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        info!("Downloading {}", url);
        let mut response = self.get(url)?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let total_size = response.content_length().unwrap_or(0);
        let progress = self.show_progress.then(|| create_progress_bar(total_size, url));

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::DownloadError(format!("failed to read response: {}", e)))?;
            if n == 0 {
                break;
            }
            dest.write_all(&buffer[..n])
                .map_err(|e| Error::IoError(format!("failed to write download: {}", e)))?;
            downloaded += n as u64;
            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        if total_size > 0 && downloaded != total_size {
            return Err(Error::DownloadError(format!(
                "truncated download from {}: got {} of {} bytes",
                url, downloaded, total_size
            )));
        }

        info!("Downloaded {} bytes", downloaded);
        Ok(downloaded)
    }

    fn fetch_text(&self, url: &str) -> Result<Option<String>> {
        debug!("Fetching {}", url);
        let response = self.get(url)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .text()
                .map(Some)
                .map_err(|e| Error::DownloadError(format!("failed to read {}: {}", url, e))),
            status => Err(Error::DownloadError(format!("HTTP {} from {}", status, url))),
        }
    }
}

fn create_progress_bar(size: u64, url: &str) -> ProgressBar {
    let pb = if size > 0 {
        ProgressBar::new(size)
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    let name = url.rsplit('/').next().unwrap_or(url);
    pb.set_message(name.to_string());
    pb
}

/// One entry of the distribution's `index.json`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEntry {
    /// Version with leading `v`, e.g. "v20.11.1"
    pub version: String,
    #[serde(default)]
    pub date: String,
    /// LTS codename, or `false` for current releases
    #[serde(default)]
    pub lts: Value,
}

impl ReleaseEntry {
    pub fn is_lts(&self) -> bool {
        matches!(&self.lts, Value::String(name) if !name.is_empty())
    }

    fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(self.version.trim_start_matches('v')).ok()
    }
}

/// Parse `index.json`
pub fn parse_release_index(content: &str) -> Result<Vec<ReleaseEntry>> {
    serde_json::from_str(content)
        .map_err(|e| Error::DownloadError(format!("malformed release index: {}", e)))
}

/// Pick the release matching `spec`
///
/// `latest` is the newest release, `lts` the newest LTS release, and a
/// partial version such as `20` or `20.11` the newest release with that
/// prefix. The result has no leading `v`.
pub fn select_release(spec: &str, releases: &[ReleaseEntry]) -> Result<String> {
    let spec = spec.trim().trim_start_matches('v').to_ascii_lowercase();
    let prefix: Vec<u64> = match spec.as_str() {
        "latest" | "current" | "lts" => Vec::new(),
        partial => partial
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::InvalidRequest(format!("invalid version: {}", partial)))?,
    };

    releases
        .iter()
        .filter(|r| spec != "lts" || r.is_lts())
        .filter_map(|r| r.semver())
        .filter(|v| {
            let parts = [v.major, v.minor, v.patch];
            prefix.iter().zip(parts).all(|(want, have)| *want == have)
        })
        .max()
        .map(|v| v.to_string())
        .ok_or_else(|| Error::InvalidRequest(format!("no published release matches '{}'", spec)))
}
