//! # Sequence Classifier Backend
//!
//! End-to-end classification via Whisper language identification: one
//! encoder pass, one decoder step, softmax over the language-token logits.
//! The arg-max language becomes the label and its probability the
//! confidence.

use crate::audio::pcm;
use crate::backends::whisper::WhisperClassifierModel;
use crate::backends::{softmax, ClassificationBackend};
use crate::error::PipelineError;
use crate::pipeline::{CanonicalAudio, ClassificationResult, CANONICAL_SAMPLE_RATE};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct SequenceClassifierBackend {
    model: Arc<WhisperClassifierModel>,
}

impl SequenceClassifierBackend {
    pub fn new(model: Arc<WhisperClassifierModel>) -> Self {
        Self { model }
    }
}

impl ClassificationBackend for SequenceClassifierBackend {
    fn name(&self) -> &'static str {
        "sequence-classifier"
    }

    fn classify(&self, audio: &CanonicalAudio) -> Result<ClassificationResult, PipelineError> {
        pcm::validate_samples(&audio.samples).map_err(PipelineError::InferenceFailed)?;

        let mut samples = pcm::pcm_to_float(&audio.samples);
        if audio.sample_rate != CANONICAL_SAMPLE_RATE {
            // Normalizer output is always 16 kHz; re-check anyway so a
            // mis-labeled signal cannot silently skew the features.
            debug!(
                sample_rate = audio.sample_rate,
                "Unexpected sample rate, resampling before inference"
            );
            samples = pcm::resample_linear(&samples, audio.sample_rate, CANONICAL_SAMPLE_RATE);
        }

        let scored = self
            .model
            .language_logits(&samples)
            .map_err(|e| PipelineError::InferenceFailed(e.to_string()))?;

        let logits: Vec<f32> = scored.iter().map(|(_, logit)| *logit).collect();
        let probs = softmax(&logits);

        let (best_idx, best_prob) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, &p)| (idx, p))
            .ok_or_else(|| {
                PipelineError::InferenceFailed("Empty probability distribution".to_string())
            })?;

        Ok(ClassificationResult {
            label: scored[best_idx].0.clone(),
            confidence: best_prob * 100.0,
            transcript: None,
            backend_name: self.name().to_string(),
        })
    }
}
