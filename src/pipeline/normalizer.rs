//! # Audio Normalizer
//!
//! Converts a downloaded media file into canonical audio: mono, 16 kHz,
//! 16-bit signed PCM WAV. Conversion is delegated to an external transcoder
//! (ffmpeg); input that is already canonical is passed through byte-for-byte
//! without launching the tool.
//!
//! The input [`RawAsset`] is consumed either way, so its temporary file is
//! deleted on success and failure alike.

use crate::config::TranscoderConfig;
use crate::error::PipelineError;
use crate::pipeline::{
    CanonicalAudio, RawAsset, CANONICAL_BIT_DEPTH, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub struct AudioNormalizer {
    binary: String,
    scratch_dir: Option<PathBuf>,
}

impl AudioNormalizer {
    pub fn new(config: &TranscoderConfig, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            binary: config.binary.clone(),
            scratch_dir,
        }
    }

    /// Normalize a raw asset to canonical audio.
    pub fn normalize(&self, raw: RawAsset) -> Result<CanonicalAudio, PipelineError> {
        let out_file = self.scratch_file()?;

        if Self::is_canonical(raw.path()) {
            debug!(path = %raw.path().display(), "Input already canonical, passing through");
            std::fs::copy(raw.path(), out_file.path()).map_err(|e| {
                PipelineError::TranscodeFailed(format!("Failed to copy canonical input: {}", e))
            })?;
        } else {
            self.transcode(raw.path(), out_file.path())?;
        }

        let samples = Self::read_canonical_samples(out_file.path())?;

        Ok(CanonicalAudio {
            file: out_file,
            samples,
            sample_rate: CANONICAL_SAMPLE_RATE,
        })
    }

    /// True when the file is already a mono 16 kHz 16-bit PCM WAV.
    fn is_canonical(path: &Path) -> bool {
        match hound::WavReader::open(path) {
            Ok(reader) => {
                let spec = reader.spec();
                spec.channels == CANONICAL_CHANNELS
                    && spec.sample_rate == CANONICAL_SAMPLE_RATE
                    && spec.bits_per_sample == CANONICAL_BIT_DEPTH
                    && spec.sample_format == hound::SampleFormat::Int
            }
            Err(_) => false,
        }
    }

    /// Run the external transcoder, capturing stderr for diagnostics.
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let result = Command::new(&self.binary)
            .args([
                "-y",
                "-i",
                &input.to_string_lossy(),
                "-ac",
                "1",
                "-ar",
                "16000",
                "-sample_fmt",
                "s16",
                "-f",
                "wav",
                &output.to_string_lossy(),
            ])
            .output()
            .map_err(|e| {
                PipelineError::TranscodeFailed(format!(
                    "Failed to launch transcoder '{}': {}",
                    self.binary, e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(stderr = %stderr.trim(), "Transcoder failed");
            return Err(PipelineError::TranscodeFailed(format!(
                "Transcoder exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }

    /// Read all samples from a canonical WAV file.
    fn read_canonical_samples(path: &Path) -> Result<Vec<i16>, PipelineError> {
        let mut reader = hound::WavReader::open(path).map_err(|e| {
            PipelineError::TranscodeFailed(format!("Transcoder output is not readable WAV: {}", e))
        })?;

        let spec = reader.spec();
        if spec.channels != CANONICAL_CHANNELS
            || spec.sample_rate != CANONICAL_SAMPLE_RATE
            || spec.bits_per_sample != CANONICAL_BIT_DEPTH
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(PipelineError::TranscodeFailed(format!(
                "Transcoder output has unexpected format: {} ch, {} Hz, {} bit",
                spec.channels, spec.sample_rate, spec.bits_per_sample
            )));
        }

        let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
        samples.map_err(|e| {
            PipelineError::TranscodeFailed(format!("Failed to decode WAV samples: {}", e))
        })
    }

    fn scratch_file(&self) -> Result<NamedTempFile, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.suffix(".wav");
        let result = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        result.map_err(|e| {
            PipelineError::TranscodeFailed(format!("Failed to create scratch file: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MediaKind;

    fn write_wav(spec: hound::WavSpec, samples: &[i16]) -> NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    fn canonical_spec() -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn test_canonical_input_passes_through_byte_for_byte() {
        let samples: Vec<i16> = (0..1600).map(|i| (i % 128) as i16 * 100).collect();
        let file = write_wav(canonical_spec(), &samples);
        let input_bytes = std::fs::read(file.path()).unwrap();

        let normalizer = AudioNormalizer::new(
            &TranscoderConfig {
                // A missing binary proves the transcoder is never launched
                binary: "definitely-not-a-real-binary-xyz".to_string(),
            },
            None,
        );
        let audio = normalizer
            .normalize(RawAsset {
                file,
                kind: MediaKind::Wav,
            })
            .unwrap();

        let output_bytes = std::fs::read(audio.path()).unwrap();
        assert_eq!(input_bytes, output_bytes);
        assert_eq!(audio.samples, samples);
        assert_eq!(audio.sample_rate, 16000);
    }

    #[test]
    fn test_non_canonical_input_with_failing_transcoder() {
        // 8 kHz input forces a transcode; the broken binary must surface
        // as TranscodeFailed and the input file must be gone afterwards.
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples = vec![100i16; 800];
        let file = write_wav(spec, &samples);
        let input_path = file.path().to_path_buf();

        let normalizer = AudioNormalizer::new(
            &TranscoderConfig {
                binary: "definitely-not-a-real-binary-xyz".to_string(),
            },
            None,
        );
        let err = normalizer
            .normalize(RawAsset {
                file,
                kind: MediaKind::Wav,
            })
            .unwrap_err();

        match err {
            PipelineError::TranscodeFailed(msg) => {
                assert!(msg.contains("Failed to launch transcoder"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!input_path.exists(), "raw asset leaked after failure");
    }

    #[test]
    fn test_nonzero_exit_is_transcode_failed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples = vec![100i16; 882];
        let file = write_wav(spec, &samples);
        let input_path = file.path().to_path_buf();

        // `false` ignores its arguments and exits 1
        let normalizer = AudioNormalizer::new(
            &TranscoderConfig {
                binary: "false".to_string(),
            },
            None,
        );
        let err = normalizer
            .normalize(RawAsset {
                file,
                kind: MediaKind::Wav,
            })
            .unwrap_err();

        match err {
            PipelineError::TranscodeFailed(msg) => assert!(msg.contains("exited with")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!input_path.exists(), "raw asset leaked after failure");
    }

    #[test]
    fn test_stereo_wav_is_not_canonical() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let file = write_wav(spec, &[0i16; 64]);
        assert!(!AudioNormalizer::is_canonical(file.path()));
    }

    #[test]
    fn test_garbage_file_is_not_canonical() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a wav at all").unwrap();
        assert!(!AudioNormalizer::is_canonical(file.path()));
    }
}
