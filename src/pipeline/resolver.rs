//! # Asset Resolver
//!
//! Turns a [`SourceReference`] into a local media file. Direct media URLs
//! are streamed straight to disk; platform-hosted URLs go through a stream
//! extractor subprocess first to find the actual media URL, then download
//! the same way. Either path produces exactly one temporary file, owned by
//! the returned [`RawAsset`].

use crate::config::ResolverConfig;
use crate::error::PipelineError;
use crate::pipeline::{MediaKind, RawAsset, SourceKind, SourceReference};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub struct AssetResolver {
    client: reqwest::blocking::Client,
    extractor_binary: String,
    scratch_dir: Option<PathBuf>,
}

impl AssetResolver {
    /// Build a resolver from configuration.
    ///
    /// `scratch_dir` of `None` means temporary files go to the system temp
    /// directory.
    pub fn new(config: &ResolverConfig, scratch_dir: Option<PathBuf>) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::ResolutionFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            extractor_binary: config.extractor_binary.clone(),
            scratch_dir,
        })
    }

    /// Resolve a source reference to a downloaded media file.
    pub fn resolve(&self, source: &SourceReference) -> Result<RawAsset, PipelineError> {
        match source.kind {
            SourceKind::DirectMedia => {
                debug!(url = %source.url, "Downloading direct media URL");
                self.download(&source.url)
            }
            SourceKind::PlatformHosted => {
                debug!(url = %source.url, "Extracting stream URL from platform page");
                let stream_url = self.extract_stream_url(&source.url)?;
                debug!(stream_url = %stream_url, "Stream URL resolved, downloading");
                self.download(&stream_url)
            }
        }
    }

    /// Stream an HTTP GET response body into one scoped temporary file.
    ///
    /// A 2xx status is required, and an empty body is rejected rather than
    /// handed to the normalizer as a zero-byte asset.
    fn download(&self, url: &str) -> Result<RawAsset, PipelineError> {
        let mut response = self.client.get(url).send().map_err(|e| {
            PipelineError::ResolutionFailed(format!("Request to '{}' failed: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ResolutionFailed(format!(
                "Server returned {} for '{}'",
                status, url
            )));
        }

        let mut file = self.scratch_file()?;
        let bytes_written = std::io::copy(&mut response, file.as_file_mut()).map_err(|e| {
            PipelineError::ResolutionFailed(format!("Failed to write download to disk: {}", e))
        })?;

        if bytes_written == 0 {
            return Err(PipelineError::ResolutionFailed(format!(
                "Server returned an empty body for '{}'",
                url
            )));
        }

        debug!(bytes = bytes_written, "Download complete");

        Ok(RawAsset {
            file,
            kind: MediaKind::from_url(url),
        })
    }

    /// Resolve the best audio stream URL for a platform page.
    ///
    /// Asks the extractor to print the stream URL rather than download,
    /// so this stage owns its single temporary file itself.
    fn extract_stream_url(&self, url: &str) -> Result<String, PipelineError> {
        let output = Command::new(&self.extractor_binary)
            .args(["-g", "-f", "bestaudio/best", "--no-playlist", url])
            .output()
            .map_err(|e| {
                PipelineError::ResolutionFailed(format!(
                    "Failed to launch extractor '{}': {}",
                    self.extractor_binary, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = %url, stderr = %stderr.trim(), "Stream extraction failed");
            return Err(PipelineError::ResolutionFailed(format!(
                "Extractor exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stream_url = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                PipelineError::ResolutionFailed(
                    "Extractor produced no stream URL".to_string(),
                )
            })?;

        Ok(stream_url.to_string())
    }

    fn scratch_file(&self) -> Result<NamedTempFile, PipelineError> {
        let result = match &self.scratch_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        };
        result.map_err(|e| {
            PipelineError::ResolutionFailed(format!("Failed to create scratch file: {}", e))
        })
    }
}
