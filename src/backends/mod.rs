//! # Classification Backends
//!
//! Three interchangeable strategies produce the same result record from the
//! same canonical audio:
//!
//! - **sequence-classifier**: Whisper language identification, end to end
//! - **embedding**: mean-pooled encoder embedding against label prototypes
//! - **heuristic**: transcript-based marker-word counting
//!
//! The [`BackendRegistry`] is built once at startup. Backends whose models
//! fail to load are reported as unavailable rather than failing the whole
//! service; requesting an unavailable backend is a per-request error.

pub mod embedding;
pub mod heuristic;
pub mod sequence;
pub mod whisper;

use crate::config::AppConfig;
use crate::device::create_device_from_string;
use crate::error::PipelineError;
use crate::pipeline::{CanonicalAudio, ClassificationResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// A classification strategy over canonical audio.
///
/// Implementations are synchronous; the HTTP layer dispatches them on the
/// blocking pool. `Send + Sync` lets one instance serve concurrent
/// requests.
pub trait ClassificationBackend: Send + Sync + std::fmt::Debug {
    /// Stable identifier reported in every result.
    fn name(&self) -> &'static str;

    /// Classify one canonical audio signal.
    fn classify(&self, audio: &CanonicalAudio) -> Result<ClassificationResult, PipelineError>;
}

/// The configured set of backend strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    SequenceClassifier,
    Embedding,
    Heuristic,
}

impl BackendKind {
    pub fn all() -> [BackendKind; 3] {
        [
            BackendKind::SequenceClassifier,
            BackendKind::Embedding,
            BackendKind::Heuristic,
        ]
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequence-classifier" | "sequence" => Ok(BackendKind::SequenceClassifier),
            "embedding" => Ok(BackendKind::Embedding),
            "heuristic" => Ok(BackendKind::Heuristic),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::SequenceClassifier => "sequence-classifier",
            BackendKind::Embedding => "embedding",
            BackendKind::Heuristic => "heuristic",
        };
        write!(f, "{}", name)
    }
}

/// Current status of a backend in the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackendStatus {
    /// Backend initialized and ready for inference
    Ready { loaded_at: u64 },

    /// Backend could not be initialized
    Unavailable { message: String },
}

impl BackendStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, BackendStatus::Ready { .. })
    }

    pub fn description(&self) -> String {
        match self {
            BackendStatus::Ready { .. } => "Ready for inference".to_string(),
            BackendStatus::Unavailable { message } => format!("Unavailable: {}", message),
        }
    }
}

struct BackendEntry {
    kind: BackendKind,
    status: BackendStatus,
    backend: Option<Arc<dyn ClassificationBackend>>,
}

/// Status record exposed by the backend listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub available: bool,
    pub status: BackendStatus,
    pub default: bool,
}

/// Startup-initialized registry of classification backends.
///
/// Built once in `main` and read-only afterwards. Model loading happens
/// here, never per request; backends receive long-lived handles to the
/// shared Whisper model.
pub struct BackendRegistry {
    entries: Vec<BackendEntry>,
    default_kind: BackendKind,
}

impl BackendRegistry {
    /// Initialize every configured backend.
    ///
    /// The shared Whisper model is loaded once and handed to both model
    /// backends. A load failure marks those backends unavailable and the
    /// service keeps running with whatever remains.
    pub fn initialize(config: &AppConfig) -> Self {
        let default_kind = config
            .backend
            .default
            .parse::<BackendKind>()
            .unwrap_or(BackendKind::SequenceClassifier);

        let device = create_device_from_string(&config.backend.device);
        let mut entries = Vec::new();

        let shared_model =
            match whisper::WhisperClassifierModel::load(&config.backend.whisper_model, device) {
                Ok(model) => {
                    info!(model = %config.backend.whisper_model, "Whisper model loaded");
                    Some(Arc::new(model))
                }
                Err(e) => {
                    warn!(
                        model = %config.backend.whisper_model,
                        error = %e,
                        "Whisper model failed to load, model backends will be unavailable"
                    );
                    None
                }
            };

        // Sequence classifier needs only the shared model.
        entries.push(match &shared_model {
            Some(model) => BackendEntry {
                kind: BackendKind::SequenceClassifier,
                status: BackendStatus::Ready {
                    loaded_at: current_timestamp(),
                },
                backend: Some(Arc::new(sequence::SequenceClassifierBackend::new(
                    Arc::clone(model),
                ))),
            },
            None => BackendEntry {
                kind: BackendKind::SequenceClassifier,
                status: BackendStatus::Unavailable {
                    message: "Whisper model failed to load".to_string(),
                },
                backend: None,
            },
        });

        // Embedding additionally needs the prototype vectors.
        let embedding_entry = match &shared_model {
            Some(model) => {
                match embedding::load_prototypes(&config.backend.prototype_file) {
                    Ok(prototypes) => BackendEntry {
                        kind: BackendKind::Embedding,
                        status: BackendStatus::Ready {
                            loaded_at: current_timestamp(),
                        },
                        backend: Some(Arc::new(embedding::EmbeddingBackend::new(
                            Arc::clone(model),
                            prototypes,
                        ))),
                    },
                    Err(e) => {
                        warn!(
                            file = %config.backend.prototype_file,
                            error = %e,
                            "Prototype file rejected, embedding backend unavailable"
                        );
                        BackendEntry {
                            kind: BackendKind::Embedding,
                            status: BackendStatus::Unavailable { message: e },
                            backend: None,
                        }
                    }
                }
            }
            None => BackendEntry {
                kind: BackendKind::Embedding,
                status: BackendStatus::Unavailable {
                    message: "Whisper model failed to load".to_string(),
                },
                backend: None,
            },
        };
        entries.push(embedding_entry);

        // Heuristic delegates to an external transcriber at request time.
        entries.push(BackendEntry {
            kind: BackendKind::Heuristic,
            status: BackendStatus::Ready {
                loaded_at: current_timestamp(),
            },
            backend: Some(Arc::new(heuristic::HeuristicBackend::new(Box::new(
                heuristic::WhisperCliTranscriber::new(&config.stt),
            )))),
        });

        Self {
            entries,
            default_kind,
        }
    }

    /// Resolve a request's backend choice to a usable backend.
    ///
    /// `None` selects the configured default. An unknown name or an
    /// unavailable backend is a `BackendUnavailable` error; no fallback to
    /// another backend happens.
    pub fn select(
        &self,
        requested: Option<&str>,
    ) -> Result<Arc<dyn ClassificationBackend>, PipelineError> {
        let kind = match requested {
            Some(name) => name
                .parse::<BackendKind>()
                .map_err(PipelineError::BackendUnavailable)?,
            None => self.default_kind,
        };

        let entry = self
            .entries
            .iter()
            .find(|entry| entry.kind == kind)
            .ok_or_else(|| {
                PipelineError::BackendUnavailable(format!("Backend '{}' is not registered", kind))
            })?;

        match &entry.backend {
            Some(backend) => Ok(Arc::clone(backend)),
            None => Err(PipelineError::BackendUnavailable(format!(
                "Backend '{}' is unavailable: {}",
                kind,
                entry.status.description()
            ))),
        }
    }

    /// Status listing for the backends endpoint.
    pub fn list(&self) -> Vec<BackendSummary> {
        self.entries
            .iter()
            .map(|entry| BackendSummary {
                name: entry.kind.to_string(),
                available: entry.status.is_ready(),
                status: entry.status.clone(),
                default: entry.kind == self.default_kind,
            })
            .collect()
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default_kind
    }

    #[cfg(test)]
    pub(crate) fn with_entries(
        backends: Vec<(BackendKind, Option<Arc<dyn ClassificationBackend>>)>,
        default_kind: BackendKind,
    ) -> Self {
        let entries = backends
            .into_iter()
            .map(|(kind, backend)| BackendEntry {
                kind,
                status: match backend {
                    Some(_) => BackendStatus::Ready {
                        loaded_at: current_timestamp(),
                    },
                    None => BackendStatus::Unavailable {
                        message: "not initialized".to_string(),
                    },
                },
                backend,
            })
            .collect();
        Self {
            entries,
            default_kind,
        }
    }
}

/// Numerically stable softmax over raw scores.
///
/// Shared by the model backends to turn logits or similarities into a
/// probability distribution.
pub(crate) fn softmax(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(
            "sequence-classifier".parse::<BackendKind>().unwrap(),
            BackendKind::SequenceClassifier
        );
        assert_eq!(
            "Embedding".parse::<BackendKind>().unwrap(),
            BackendKind::Embedding
        );
        assert_eq!(
            "heuristic".parse::<BackendKind>().unwrap(),
            BackendKind::Heuristic
        );
        assert!("oracle".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_display_round_trip() {
        for kind in BackendKind::all() {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // Largest logit gets the largest probability
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1001.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_uniform_on_equal_scores() {
        let probs = softmax(&[0.5, 0.5, 0.5, 0.5]);
        for p in probs {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_registry_select_unknown_backend() {
        let registry = BackendRegistry::with_entries(vec![], BackendKind::Heuristic);
        let err = registry.select(Some("oracle")).unwrap_err();
        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }

    #[test]
    fn test_registry_select_unavailable_backend() {
        let registry = BackendRegistry::with_entries(
            vec![(BackendKind::Embedding, None)],
            BackendKind::Embedding,
        );
        let err = registry.select(None).unwrap_err();
        match err {
            PipelineError::BackendUnavailable(msg) => assert!(msg.contains("embedding")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_backend_status_description() {
        let ready = BackendStatus::Ready { loaded_at: 12345 };
        assert!(ready.is_ready());
        let unavailable = BackendStatus::Unavailable {
            message: "model missing".to_string(),
        };
        assert!(!unavailable.is_ready());
        assert!(unavailable.description().contains("model missing"));
    }
}
