//! # PCM Sample Utilities
//!
//! Conversion and validation helpers for the canonical audio format
//! (mono, 16 kHz, 16-bit signed PCM). Backends consume canonical audio
//! directly; these helpers cover the conversions they need on top of it.

/// Convert 16-bit PCM samples to 32-bit float format for ML models.
///
/// Scales from the 16-bit integer range [-32768, 32767] to the float
/// range [-1.0, 1.0] expected by the Whisper encoder.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Convert 32-bit float samples back to 16-bit PCM format.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = sample * 32768.0;
            scaled.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Validate that a sample buffer is usable for inference.
///
/// ## Checks:
/// - Buffer is not empty
/// - Dynamic range suggests actual signal rather than flatline silence
///   (skipped for very short buffers, which may legitimately be quiet)
pub fn validate_samples(samples: &[i16]) -> Result<(), String> {
    if samples.is_empty() {
        return Err("Audio data is empty".to_string());
    }

    let mut min_sample = i16::MAX;
    let mut max_sample = i16::MIN;
    for &sample in samples.iter().take(16000) {
        min_sample = min_sample.min(sample);
        max_sample = max_sample.max(sample);
    }

    let dynamic_range = (max_sample as i32) - (min_sample as i32);
    if samples.len() >= 16000 && dynamic_range < 100 {
        return Err("Audio has very low dynamic range, may be corrupted or silent".to_string());
    }

    Ok(())
}

/// Linear resampling between sample rates.
///
/// Quality is adequate for feature extraction. The normalizer produces
/// 16 kHz output already, so this only runs as a defensive re-check when
/// a backend is handed audio at an unexpected rate.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_conversion() {
        let pcm_samples = vec![0i16, 16384, -16384, 32767, -32768];
        let float_samples = pcm_to_float(&pcm_samples);
        let converted_back = float_to_pcm(&float_samples);

        for (original, converted) in pcm_samples.iter().zip(converted_back.iter()) {
            let diff = (original - converted).abs();
            assert!(
                diff <= 1,
                "Conversion error too large: {} vs {}",
                original,
                converted
            );
        }
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(validate_samples(&[]).is_err());
    }

    #[test]
    fn test_validate_accepts_signal() {
        let samples: Vec<i16> = (0..16000)
            .map(|i| ((i as f32 * 0.05).sin() * 10000.0) as i16)
            .collect();
        assert!(validate_samples(&samples).is_ok());
    }

    #[test]
    fn test_validate_rejects_flatline() {
        let samples = vec![5i16; 32000];
        assert!(validate_samples(&samples).is_err());
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample_linear(&samples, 32000, 16000);
        // Half the rate means roughly half the samples
        assert!((out.len() as i64 - 500).abs() <= 1);
    }

    #[test]
    fn test_resample_preserves_endpoints() {
        let samples = vec![0.0f32, 0.5, 1.0, 0.5, 0.0];
        let out = resample_linear(&samples, 16000, 8000);
        assert!((out[0] - 0.0).abs() < 1e-6);
    }
}
