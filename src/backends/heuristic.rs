//! # Heuristic Backend
//!
//! Transcribes the audio with an external speech-to-text tool and counts
//! accent marker words in the transcript. British and American spelling
//! variants form two disjoint marker sets; the side with strictly more
//! distinct markers wins, and a tie (including zero markers on both sides)
//! yields the label "Unknown" with zero confidence.

use crate::backends::ClassificationBackend;
use crate::config::SttConfig;
use crate::error::PipelineError;
use crate::pipeline::{CanonicalAudio, ClassificationResult};
use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Spelling variants that point at British usage.
const BRITISH_MARKERS: &[&str] = &["colour", "centre", "favour", "theatre"];

/// The American counterparts, pairwise disjoint from the British set.
const AMERICAN_MARKERS: &[&str] = &["color", "center", "favor", "theater"];

/// External speech-to-text collaborator.
///
/// Kept as a trait so the marker logic is testable without spawning a
/// transcriber process.
pub trait SpeechToText: Send + Sync + std::fmt::Debug {
    fn transcribe(&self, audio: &Path) -> Result<String, String>;
}

/// Speech-to-text via the whisper CLI.
///
/// The tool writes its transcript as a text file into an output directory;
/// a scoped temp directory keeps those artifacts per-request and deletes
/// them afterwards.
#[derive(Debug)]
pub struct WhisperCliTranscriber {
    binary: String,
    model: String,
    language: String,
}

impl WhisperCliTranscriber {
    pub fn new(config: &SttConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
        }
    }
}

impl SpeechToText for WhisperCliTranscriber {
    fn transcribe(&self, audio: &Path) -> Result<String, String> {
        let out_dir = tempfile::tempdir()
            .map_err(|e| format!("Failed to create transcript directory: {}", e))?;

        let output = Command::new(&self.binary)
            .arg(audio)
            .args(["--model", &self.model])
            .args(["--language", &self.language])
            .args(["--task", "transcribe"])
            .args(["--output_format", "txt"])
            .args(["--output_dir", &out_dir.path().to_string_lossy()])
            .output()
            .map_err(|e| format!("Failed to launch transcriber '{}': {}", self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr.trim(), "Transcriber failed");
            return Err(format!(
                "Transcriber exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| "Audio path has no file stem".to_string())?;
        let transcript_path = out_dir.path().join(format!("{}.txt", stem));

        std::fs::read_to_string(&transcript_path)
            .map_err(|e| format!("Transcriber produced no transcript file: {}", e))
    }
}

#[derive(Debug)]
pub struct HeuristicBackend {
    stt: Box<dyn SpeechToText>,
}

impl HeuristicBackend {
    pub fn new(stt: Box<dyn SpeechToText>) -> Self {
        Self { stt }
    }

    /// Count how many distinct markers from `markers` occur as words in
    /// the transcript.
    fn count_markers(words: &HashSet<&str>, markers: &[&str]) -> usize {
        markers.iter().filter(|m| words.contains(**m)).count()
    }
}

impl ClassificationBackend for HeuristicBackend {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn classify(&self, audio: &CanonicalAudio) -> Result<ClassificationResult, PipelineError> {
        let transcript = self
            .stt
            .transcribe(audio.path())
            .map_err(PipelineError::InferenceFailed)?;

        if transcript.trim().is_empty() {
            return Err(PipelineError::InferenceFailed(
                "Transcriber produced an empty transcript".to_string(),
            ));
        }

        let lowered = transcript.to_lowercase();
        let words: HashSet<&str> = lowered
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();

        let british = Self::count_markers(&words, BRITISH_MARKERS);
        let american = Self::count_markers(&words, AMERICAN_MARKERS);
        debug!(british, american, "Marker counts");

        let (label, count) = if british > american {
            ("British", british)
        } else if american > british {
            ("American", american)
        } else {
            ("Unknown", 0)
        };

        let confidence = if label == "Unknown" {
            0.0
        } else {
            count as f32 / BRITISH_MARKERS.len() as f32 * 100.0
        };

        Ok(ClassificationResult {
            label: label.to_string(),
            confidence,
            transcript: Some(transcript.trim().to_string()),
            backend_name: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CANONICAL_SAMPLE_RATE;
    use tempfile::NamedTempFile;

    #[derive(Debug)]
    struct StubStt {
        response: Result<String, String>,
    }

    impl SpeechToText for StubStt {
        fn transcribe(&self, _audio: &Path) -> Result<String, String> {
            self.response.clone()
        }
    }

    fn dummy_audio() -> CanonicalAudio {
        CanonicalAudio {
            file: NamedTempFile::new().unwrap(),
            samples: vec![0i16; 16000],
            sample_rate: CANONICAL_SAMPLE_RATE,
        }
    }

    fn backend_with(response: Result<String, String>) -> HeuristicBackend {
        HeuristicBackend::new(Box::new(StubStt { response }))
    }

    #[test]
    fn test_marker_sets_are_disjoint() {
        for marker in BRITISH_MARKERS {
            assert!(!AMERICAN_MARKERS.contains(marker));
        }
        assert_eq!(BRITISH_MARKERS.len(), AMERICAN_MARKERS.len());
    }

    #[test]
    fn test_two_british_markers_give_fifty_percent() {
        let backend = backend_with(Ok(
            "I went to the theatre near the centre of town".to_string()
        ));
        let result = backend.classify(&dummy_audio()).unwrap();
        assert_eq!(result.label, "British");
        assert!((result.confidence - 50.0).abs() < 1e-6);
        assert!(result.transcript.unwrap().contains("theatre"));
    }

    #[test]
    fn test_american_markers_win() {
        let backend = backend_with(Ok("the color of the center line".to_string()));
        let result = backend.classify(&dummy_audio()).unwrap();
        assert_eq!(result.label, "American");
        assert!((result.confidence - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_markers_is_unknown_with_zero_confidence() {
        let backend = backend_with(Ok("hello there, lovely weather today".to_string()));
        let result = backend.classify(&dummy_audio()).unwrap();
        assert_eq!(result.label, "Unknown");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_tie_is_unknown() {
        let backend = backend_with(Ok("the colour and the color".to_string()));
        let result = backend.classify(&dummy_audio()).unwrap();
        assert_eq!(result.label, "Unknown");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_repeated_marker_counts_once() {
        let backend = backend_with(Ok("colour colour colour".to_string()));
        let result = backend.classify(&dummy_audio()).unwrap();
        assert_eq!(result.label, "British");
        assert!((result.confidence - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_transcript_is_inference_failed() {
        let backend = backend_with(Ok("   ".to_string()));
        let err = backend.classify(&dummy_audio()).unwrap_err();
        assert!(matches!(err, PipelineError::InferenceFailed(_)));
    }

    #[test]
    fn test_transcriber_failure_is_inference_failed() {
        let backend = backend_with(Err("whisper crashed".to_string()));
        let err = backend.classify(&dummy_audio()).unwrap_err();
        match err {
            PipelineError::InferenceFailed(msg) => assert!(msg.contains("whisper crashed")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_case_insensitive_matching() {
        let backend = backend_with(Ok("The COLOUR of the Centre".to_string()));
        let result = backend.classify(&dummy_audio()).unwrap();
        assert_eq!(result.label, "British");
        assert!((result.confidence - 50.0).abs() < 1e-6);
    }
}
