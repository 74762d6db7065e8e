//! # Embedding Backend
//!
//! Classifies by comparing a fixed-length audio embedding (mean-pooled
//! Whisper encoder states) against configured per-label prototype vectors.
//! Cosine similarities are softmax-normalized, so confidence is a real
//! probability rather than an arbitrary score.

use crate::audio::pcm;
use crate::backends::whisper::WhisperClassifierModel;
use crate::backends::{softmax, ClassificationBackend};
use crate::error::PipelineError;
use crate::pipeline::{CanonicalAudio, ClassificationResult};
use std::path::Path;
use std::sync::Arc;

/// Load prototype vectors from a JSON file mapping label to vector.
///
/// Missing, unreadable, or structurally invalid files are errors; the
/// registry turns them into an unavailable backend instead of failing
/// the whole service.
pub fn load_prototypes(path: impl AsRef<Path>) -> Result<Vec<(String, Vec<f32>)>, String> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read prototype file '{}': {}", path.display(), e))?;

    let parsed: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| format!("Prototype file '{}' is not valid JSON: {}", path.display(), e))?;

    let object = parsed
        .as_object()
        .ok_or_else(|| format!("Prototype file '{}' must be a JSON object", path.display()))?;

    let mut prototypes = Vec::with_capacity(object.len());
    let mut expected_len: Option<usize> = None;

    for (label, value) in object {
        let array = value
            .as_array()
            .ok_or_else(|| format!("Prototype for '{}' is not an array", label))?;

        let vector: Result<Vec<f32>, String> = array
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| format!("Prototype for '{}' contains a non-number", label))
            })
            .collect();
        let vector = vector?;

        if vector.is_empty() {
            return Err(format!("Prototype for '{}' is empty", label));
        }

        match expected_len {
            Some(len) if len != vector.len() => {
                return Err(format!(
                    "Prototype for '{}' has length {} but earlier prototypes have length {}",
                    label,
                    vector.len(),
                    len
                ));
            }
            None => expected_len = Some(vector.len()),
            _ => {}
        }

        prototypes.push((label.clone(), vector));
    }

    if prototypes.is_empty() {
        return Err(format!("Prototype file '{}' defines no labels", path.display()));
    }

    Ok(prototypes)
}

/// Cosine similarity between two equal-length vectors.
///
/// Zero-norm inputs yield 0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug)]
pub struct EmbeddingBackend {
    model: Arc<WhisperClassifierModel>,
    prototypes: Vec<(String, Vec<f32>)>,
}

impl EmbeddingBackend {
    pub fn new(model: Arc<WhisperClassifierModel>, prototypes: Vec<(String, Vec<f32>)>) -> Self {
        Self { model, prototypes }
    }
}

impl ClassificationBackend for EmbeddingBackend {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn classify(&self, audio: &CanonicalAudio) -> Result<ClassificationResult, PipelineError> {
        pcm::validate_samples(&audio.samples).map_err(PipelineError::InferenceFailed)?;

        let samples = pcm::pcm_to_float(&audio.samples);
        let embedding = self
            .model
            .embed(&samples)
            .map_err(|e| PipelineError::InferenceFailed(e.to_string()))?;

        let similarities: Vec<f32> = self
            .prototypes
            .iter()
            .map(|(_, prototype)| {
                if prototype.len() == embedding.len() {
                    cosine_similarity(&embedding, prototype)
                } else {
                    // Dimension mismatch with this model's encoder width
                    // cannot match anything.
                    -1.0
                }
            })
            .collect();

        let probs = softmax(&similarities);
        let (best_idx, best_prob) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, &p)| (idx, p))
            .ok_or_else(|| {
                PipelineError::InferenceFailed("No prototypes to compare against".to_string())
            })?;

        Ok(ClassificationResult {
            label: self.prototypes[best_idx].0.clone(),
            confidence: best_prob * 100.0,
            transcript: None,
            backend_name: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0f32, 1.0];
        let b = vec![-1.0f32, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        let a = vec![0.0f32, 0.0];
        let b = vec![1.0f32, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_load_prototypes_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"British": [0.1, 0.2, 0.3], "American": [0.3, 0.2, 0.1]}}"#
        )
        .unwrap();

        let prototypes = load_prototypes(file.path()).unwrap();
        assert_eq!(prototypes.len(), 2);
        assert!(prototypes.iter().any(|(label, _)| label == "British"));
        assert!(prototypes.iter().all(|(_, v)| v.len() == 3));
    }

    #[test]
    fn test_load_prototypes_missing_file() {
        let err = load_prototypes("/nonexistent/prototypes.json").unwrap_err();
        assert!(err.contains("Cannot read"));
    }

    #[test]
    fn test_load_prototypes_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_prototypes(file.path()).unwrap_err().contains("not valid JSON"));
    }

    #[test]
    fn test_load_prototypes_rejects_mismatched_lengths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"A": [0.1, 0.2], "B": [0.1]}}"#).unwrap();
        assert!(load_prototypes(file.path()).unwrap_err().contains("length"));
    }

    #[test]
    fn test_load_prototypes_rejects_empty_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        assert!(load_prototypes(file.path()).unwrap_err().contains("no labels"));
    }

    #[test]
    fn test_similarity_softmax_prefers_closest_prototype() {
        let embedding = vec![1.0f32, 0.0, 0.0];
        let prototypes = vec![
            ("near".to_string(), vec![0.9f32, 0.1, 0.0]),
            ("far".to_string(), vec![0.0f32, 0.0, 1.0]),
        ];
        let sims: Vec<f32> = prototypes
            .iter()
            .map(|(_, p)| cosine_similarity(&embedding, p))
            .collect();
        let probs = softmax(&sims);
        assert!(probs[0] > probs[1]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
