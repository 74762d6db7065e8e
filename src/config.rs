//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub resolver: ResolverConfig,
    pub transcoder: TranscoderConfig,
    pub stt: SttConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Classification backend configuration.
///
/// ## Fields:
/// - `default`: Backend used when a request does not name one
///   ("sequence-classifier", "embedding", "heuristic").
/// - `whisper_model`: Hugging Face model id for the shared Whisper model
///   (e.g. "openai/whisper-tiny"). Smaller models load faster and use less
///   memory; larger models classify more accurately.
/// - `prototype_file`: Path to the JSON file of per-label prototype vectors
///   used by the embedding backend.
/// - `device`: Inference device preference ("auto", "cpu", "cuda", "metal").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub default: String,
    pub whisper_model: String,
    pub prototype_file: String,
    pub device: String,
}

/// Asset resolution configuration.
///
/// ## Fields:
/// - `download_timeout_secs`: Per-request timeout for media downloads.
/// - `extractor_binary`: Platform stream extractor command (yt-dlp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub download_timeout_secs: u64,
    pub extractor_binary: String,
}

/// Audio transcoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    pub binary: String,
}

/// Speech-to-text configuration for the heuristic backend.
///
/// ## Fields:
/// - `binary`: Transcriber command invoked as a subprocess.
/// - `model`: Model name passed to the transcriber.
/// - `language`: Language hint passed to the transcriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub binary: String,
    pub model: String,
    pub language: String,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_requests`: Upper bound on classification requests
///   processed simultaneously on the blocking pool.
/// - `scratch_dir`: Directory for per-request temporary media files. Empty
///   string means the system temp directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_requests: usize,
    pub scratch_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            backend: BackendConfig {
                default: "sequence-classifier".to_string(),
                whisper_model: "openai/whisper-tiny".to_string(),
                prototype_file: "prototypes.json".to_string(),
                device: "auto".to_string(),
            },
            resolver: ResolverConfig {
                download_timeout_secs: 120,
                extractor_binary: "yt-dlp".to_string(),
            },
            transcoder: TranscoderConfig {
                binary: "ffmpeg".to_string(),
            },
            stt: SttConfig {
                binary: "whisper".to_string(),
                model: "tiny".to_string(),
                language: "en".to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_requests: 4,
                scratch_dir: String::new(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `APP_BACKEND_DEFAULT=heuristic`: Override the default backend
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors at startup prevents runtime failures
    /// and produces clear messages about what is wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_requests == 0 {
            return Err(anyhow::anyhow!(
                "Max concurrent requests must be greater than 0"
            ));
        }

        if self.resolver.download_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Download timeout must be greater than 0"));
        }

        match self.backend.default.as_str() {
            "sequence-classifier" | "embedding" | "heuristic" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown default backend '{}' (expected sequence-classifier, embedding, or heuristic)",
                    other
                ));
            }
        }

        if self.backend.whisper_model.is_empty() {
            return Err(anyhow::anyhow!("Whisper model id cannot be empty"));
        }

        if self.transcoder.binary.is_empty() {
            return Err(anyhow::anyhow!("Transcoder binary cannot be empty"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime config updates).
    ///
    /// Partial updates are supported: sending `{"server": {"port": 9000}}`
    /// changes only the port. The updated configuration is re-validated
    /// before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(backend) = partial_config.get("backend") {
            if let Some(default) = backend.get("default").and_then(|v| v.as_str()) {
                self.backend.default = default.to_string();
            }
            if let Some(model) = backend.get("whisper_model").and_then(|v| v.as_str()) {
                self.backend.whisper_model = model.to_string();
            }
            if let Some(proto) = backend.get("prototype_file").and_then(|v| v.as_str()) {
                self.backend.prototype_file = proto.to_string();
            }
            if let Some(device) = backend.get("device").and_then(|v| v.as_str()) {
                self.backend.device = device.to_string();
            }
        }

        if let Some(resolver) = partial_config.get("resolver") {
            if let Some(timeout) = resolver
                .get("download_timeout_secs")
                .and_then(|v| v.as_u64())
            {
                self.resolver.download_timeout_secs = timeout;
            }
            if let Some(binary) = resolver.get("extractor_binary").and_then(|v| v.as_str()) {
                self.resolver.extractor_binary = binary.to_string();
            }
        }

        if let Some(transcoder) = partial_config.get("transcoder") {
            if let Some(binary) = transcoder.get("binary").and_then(|v| v.as_str()) {
                self.transcoder.binary = binary.to_string();
            }
        }

        if let Some(stt) = partial_config.get("stt") {
            if let Some(binary) = stt.get("binary").and_then(|v| v.as_str()) {
                self.stt.binary = binary.to_string();
            }
            if let Some(model) = stt.get("model").and_then(|v| v.as_str()) {
                self.stt.model = model.to_string();
            }
            if let Some(language) = stt.get("language").and_then(|v| v.as_str()) {
                self.stt.language = language.to_string();
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(requests) = performance
                .get("max_concurrent_requests")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_requests = requests as usize;
            }
            if let Some(dir) = performance.get("scratch_dir").and_then(|v| v.as_str()) {
                self.performance.scratch_dir = dir.to_string();
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend.default, "sequence-classifier");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.default = "oracle".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "backend": {"default": "heuristic"}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.backend.default, "heuristic");
        // Untouched fields keep their values
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_update_rejects_invalid_backend() {
        let mut config = AppConfig::default();
        let json = r#"{"backend": {"default": "oracle"}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_toml_section_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [backend]
            default = "embedding"
            whisper_model = "openai/whisper-base"
            prototype_file = "protos.json"
            device = "cpu"

            [resolver]
            download_timeout_secs = 60
            extractor_binary = "yt-dlp"

            [transcoder]
            binary = "ffmpeg"

            [stt]
            binary = "whisper"
            model = "tiny"
            language = "en"

            [performance]
            max_concurrent_requests = 2
            scratch_dir = ""
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.backend.default, "embedding");
        assert_eq!(config.resolver.download_timeout_secs, 60);
        assert!(config.validate().is_ok());
    }
}
