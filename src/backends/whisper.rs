//! # Shared Whisper Model
//!
//! One Whisper model instance serves both model-driven backends: the
//! sequence classifier reads language-token logits, the embedding backend
//! reads mean-pooled encoder states. The model is downloaded and loaded
//! once at startup and shared behind `Arc`.
//!
//! ## Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load configuration, tokenizer, and safetensors weights
//! 3. Initialize the model on the selected device

use crate::audio::mel;
use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Languages the classifier distinguishes, as Whisper language-token codes
/// paired with the label reported to clients.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("zh", "Chinese"),
    ("de", "German"),
    ("es", "Spanish"),
    ("ru", "Russian"),
    ("ko", "Korean"),
    ("fr", "French"),
    ("ja", "Japanese"),
    ("pt", "Portuguese"),
    ("tr", "Turkish"),
    ("pl", "Polish"),
    ("nl", "Dutch"),
    ("ar", "Arabic"),
    ("sv", "Swedish"),
    ("it", "Italian"),
    ("hi", "Hindi"),
    ("fi", "Finnish"),
    ("vi", "Vietnamese"),
    ("uk", "Ukrainian"),
    ("el", "Greek"),
];

/// A loaded Whisper model shared by the model backends.
///
/// The decoder keeps an internal KV cache that needs `&mut`, so the model
/// sits behind a `Mutex` and inference calls are serialized per handle.
/// Everything else (tokenizer, filters, config) is read-only after load.
#[derive(Debug)]
pub struct WhisperClassifierModel {
    model: Mutex<m::model::Whisper>,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    mel_filters: Vec<f32>,
    sot_token: u32,
}

impl WhisperClassifierModel {
    /// Download (or reuse the local cache of) a Whisper model and load it.
    pub fn load(model_id: &str, device: Device) -> Result<Self> {
        info!(model = model_id, "Loading Whisper model");
        let start_time = std::time::Instant::now();

        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| anyhow!("Failed to initialize HuggingFace API: {}", e))?;
        let repo = api.model(model_id.to_string());

        let config_filename = repo
            .get("config.json")
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", model_id, e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", model_id, e))?;
        let model_filename = repo
            .get("model.safetensors")
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", model_id, e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        debug!(mel_bins = config.num_mel_bins, "Model config loaded");

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let sot_token = tokenizer
            .token_to_id("<|startoftranscript|>")
            .ok_or_else(|| anyhow!("Tokenizer has no start-of-transcript token"))?;

        let mel_filters = mel::mel_filter_bank(config.num_mel_bins);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        info!(
            model = model_id,
            load_secs = start_time.elapsed().as_secs_f64(),
            "Whisper model ready"
        );

        Ok(Self {
            model: Mutex::new(model),
            config,
            tokenizer,
            device,
            mel_filters,
            sot_token,
        })
    }

    /// Logits over the language-token vocabulary for one audio signal.
    ///
    /// Runs the encoder and a single decoder step from the
    /// start-of-transcript token, then picks out the logits of the known
    /// language tokens. Returned pairs are `(label, logit)`.
    pub fn language_logits(&self, samples: &[f32]) -> Result<Vec<(String, f32)>> {
        let mel = self.features_tensor(samples)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("Model lock poisoned"))?;

        let audio_features = model.encoder.forward(&mel, true)?;
        let tokens = Tensor::new(&[[self.sot_token]], &self.device)?;
        let ys = model.decoder.forward(&tokens, &audio_features, true)?;
        let logits = model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
        let logits_vec = logits.to_vec1::<f32>()?;

        let mut out = Vec::with_capacity(LANGUAGES.len());
        for (code, label) in LANGUAGES {
            if let Some(token_id) = self.tokenizer.token_to_id(&format!("<|{}|>", code)) {
                if let Some(&logit) = logits_vec.get(token_id as usize) {
                    out.push((label.to_string(), logit));
                }
            }
        }

        if out.is_empty() {
            return Err(anyhow!("Tokenizer exposes no known language tokens"));
        }

        Ok(out)
    }

    /// Fixed-length embedding: encoder states mean-pooled over time.
    pub fn embed(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let mel = self.features_tensor(samples)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("Model lock poisoned"))?;

        let audio_features = model.encoder.forward(&mel, true)?;
        let pooled = audio_features.mean(1)?;
        let embedding = pooled.i(0)?.to_vec1::<f32>()?;
        Ok(embedding)
    }

    fn features_tensor(&self, samples: &[f32]) -> Result<Tensor> {
        if samples.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }
        let mel = mel::log_mel_spectrogram(
            samples,
            &self.mel_filters,
            self.config.num_mel_bins,
            &self.device,
        )?;
        Ok(mel.unsqueeze(0)?)
    }
}
