//! # Classification Pipeline
//!
//! The core flow of the service: a source URL is resolved to a local media
//! file, normalized to canonical audio, and handed to a classification
//! backend. Stages run strictly in order and stop at the first failure.
//!
//! ## Resource Guarantees:
//! - At most one raw asset and one canonical audio file exist on disk per
//!   in-flight request.
//! - Temporary files are owned by the stage products ([`RawAsset`],
//!   [`CanonicalAudio`]); dropping a product deletes its file, so cleanup
//!   holds on success and failure alike.
//! - No stage retries on failure and no backend fallback is attempted.

pub mod normalizer;
pub mod resolver;

use crate::backends::ClassificationBackend;
use crate::error::PipelineError;
use normalizer::AudioNormalizer;
use resolver::AssetResolver;
use serde::Serialize;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Canonical sample rate every backend consumes.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Canonical channel count.
pub const CANONICAL_CHANNELS: u16 = 1;

/// Canonical bit depth.
pub const CANONICAL_BIT_DEPTH: u16 = 16;

/// How a source URL is hosted, which decides the resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The URL points directly at a media file; a plain HTTP download works.
    DirectMedia,
    /// The URL points at a hosting platform page; a stream extractor is
    /// needed to find the actual media URL.
    PlatformHosted,
}

/// A validated reference to a remotely hosted media asset.
#[derive(Debug, Clone)]
pub struct SourceReference {
    pub url: String,
    pub kind: SourceKind,
}

/// File extensions treated as directly downloadable media.
const MEDIA_EXTENSIONS: &[&str] = &[
    ".wav", ".mp3", ".mp4", ".m4a", ".webm", ".ogg", ".flac", ".aac",
];

impl SourceReference {
    /// Validate a URL and infer how it is hosted.
    ///
    /// URLs whose path ends in a known media extension are fetched
    /// directly; anything else is assumed to be a platform page that
    /// needs stream extraction.
    pub fn parse(url: &str) -> Result<Self, PipelineError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::ResolutionFailed(
                "URL is empty".to_string(),
            ));
        }

        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(PipelineError::ResolutionFailed(format!(
                "Unsupported URL scheme in '{}'",
                trimmed
            )));
        }

        // Strip query and fragment before looking at the path extension.
        let path_part = trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or(trimmed)
            .to_lowercase();

        let kind = if MEDIA_EXTENSIONS.iter().any(|ext| path_part.ends_with(ext)) {
            SourceKind::DirectMedia
        } else {
            SourceKind::PlatformHosted
        };

        Ok(Self {
            url: trimmed.to_string(),
            kind,
        })
    }
}

/// Container hint for a downloaded asset, taken from the URL extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Mp4,
    WebM,
    Wav,
    Mp3,
    Unknown(String),
}

impl MediaKind {
    pub fn from_url(url: &str) -> Self {
        let path_part = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        if path_part.ends_with(".mp4") || path_part.ends_with(".m4a") {
            MediaKind::Mp4
        } else if path_part.ends_with(".webm") {
            MediaKind::WebM
        } else if path_part.ends_with(".wav") {
            MediaKind::Wav
        } else if path_part.ends_with(".mp3") {
            MediaKind::Mp3
        } else {
            let ext = path_part.rsplit('.').next().unwrap_or("").to_string();
            MediaKind::Unknown(ext)
        }
    }
}

/// A downloaded media file awaiting normalization.
///
/// Owns its temporary file; the file is deleted when the asset is dropped,
/// whichever exit path drops it.
#[derive(Debug)]
pub struct RawAsset {
    pub file: NamedTempFile,
    pub kind: MediaKind,
}

impl RawAsset {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Normalized audio every backend can consume without further conversion:
/// mono, 16 kHz, 16-bit signed PCM.
///
/// Keeps both the WAV file on disk (for subprocess collaborators) and the
/// decoded samples in memory (for in-process inference). Owns its
/// temporary file the same way [`RawAsset`] does.
#[derive(Debug)]
pub struct CanonicalAudio {
    pub file: NamedTempFile,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl CanonicalAudio {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// The uniform result record every backend produces.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub label: String,
    /// Confidence in percent, 0.0 to 100.0.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub backend_name: String,
}

/// Orchestrates the three pipeline stages.
pub struct Pipeline {
    resolver: AssetResolver,
    normalizer: AudioNormalizer,
}

impl Pipeline {
    pub fn new(resolver: AssetResolver, normalizer: AudioNormalizer) -> Self {
        Self {
            resolver,
            normalizer,
        }
    }

    /// Run the full pipeline for one source against one backend.
    ///
    /// Stages run strictly in order. A stage failure stops the run and
    /// surfaces that stage's error; no partial result is produced. The
    /// raw asset is dropped (and its file deleted) as soon as
    /// normalization finishes, and the canonical audio is dropped when
    /// classification returns.
    pub fn run(
        &self,
        source: &SourceReference,
        backend: &dyn ClassificationBackend,
    ) -> Result<ClassificationResult, PipelineError> {
        let start_time = std::time::Instant::now();
        info!(url = %source.url, backend = backend.name(), "Pipeline run started");

        let raw = self.resolver.resolve(source)?;
        debug!(
            path = %raw.path().display(),
            kind = ?raw.kind,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Asset resolved"
        );

        // Takes the asset by value, so its file is gone after this call
        // no matter which way it went.
        let canonical = self.normalizer.normalize(raw)?;
        debug!(
            duration_secs = canonical.duration_secs(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Audio normalized"
        );

        let result = backend.classify(&canonical)?;
        info!(
            label = %result.label,
            confidence = result.confidence,
            backend = %result.backend_name,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Pipeline run completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_empty_url() {
        assert!(SourceReference::parse("").is_err());
        assert!(SourceReference::parse("   ").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_scheme() {
        assert!(SourceReference::parse("ftp://example.com/a.wav").is_err());
        assert!(SourceReference::parse("file:///tmp/a.wav").is_err());
    }

    #[test]
    fn test_parse_direct_media() {
        let source = SourceReference::parse("https://example.com/clip.mp3").unwrap();
        assert_eq!(source.kind, SourceKind::DirectMedia);

        // Query strings do not hide the extension
        let source = SourceReference::parse("https://example.com/clip.WAV?token=abc").unwrap();
        assert_eq!(source.kind, SourceKind::DirectMedia);
    }

    #[test]
    fn test_parse_platform_hosted() {
        let source =
            SourceReference::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(source.kind, SourceKind::PlatformHosted);
    }

    #[test]
    fn test_media_kind_from_url() {
        assert_eq!(MediaKind::from_url("https://x.com/a.mp4"), MediaKind::Mp4);
        assert_eq!(MediaKind::from_url("https://x.com/a.m4a"), MediaKind::Mp4);
        assert_eq!(MediaKind::from_url("https://x.com/a.wav?s=1"), MediaKind::Wav);
        assert_eq!(
            MediaKind::from_url("https://x.com/a.opus"),
            MediaKind::Unknown("opus".to_string())
        );
    }

    #[test]
    fn test_raw_asset_deletes_file_on_drop() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let asset = RawAsset {
            file,
            kind: MediaKind::Wav,
        };
        assert!(path.exists());
        drop(asset);
        assert!(!path.exists());
    }

    #[test]
    fn test_canonical_audio_duration() {
        let audio = CanonicalAudio {
            file: NamedTempFile::new().unwrap(),
            samples: vec![0i16; 32000],
            sample_rate: CANONICAL_SAMPLE_RATE,
        };
        assert!((audio.duration_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_scratch_files_never_collide() {
        use std::collections::HashSet;
        use std::sync::{Arc, Mutex};

        let paths = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let paths = Arc::clone(&paths);
            handles.push(std::thread::spawn(move || {
                let file = NamedTempFile::new().unwrap();
                let fresh = paths
                    .lock()
                    .unwrap()
                    .insert(file.path().to_path_buf());
                assert!(fresh, "temp path collided");
                // Hold briefly so files overlap in time
                std::thread::sleep(std::time::Duration::from_millis(10));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(paths.lock().unwrap().len(), 50);
    }
}
