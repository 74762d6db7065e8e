//! # Mel Spectrogram Features
//!
//! Converts float PCM audio into the log-mel feature tensor consumed by the
//! Whisper encoder. Filters are generated programmatically instead of being
//! shipped as a binary asset.

use candle_core::{Device, Tensor};

/// FFT window size for 16 kHz Whisper input.
const N_FFT: usize = 400;

/// Number of feature frames for a 30 second window.
const N_FRAMES: usize = 3000;

/// Samples in the 30 second analysis window at 16 kHz.
const WINDOW_SAMPLES: usize = 30 * 16000;

/// Log floor corresponding to -80 dB.
const LOG_FLOOR: f32 = -11.5129;

/// Create a triangular mel filter bank of `n_mels` filters over `N_FFT` bins.
///
/// Returned layout is row-major: filter `i` occupies
/// `[i * N_FFT, (i + 1) * N_FFT)`.
pub fn mel_filter_bank(n_mels: usize) -> Vec<f32> {
    let mut filters = vec![0.0f32; N_FFT * n_mels];

    for i in 0..n_mels {
        let center = (i + 1) * N_FFT / (n_mels + 1);
        let width = N_FFT / (n_mels + 1);

        for j in 0..N_FFT {
            if j >= center.saturating_sub(width) && j <= center + width {
                let distance = (j as i32 - center as i32).abs() as f32;
                filters[i * N_FFT + j] = (1.0 - distance / width as f32).max(0.0);
            }
        }
    }

    filters
}

/// Convert float PCM audio at 16 kHz to a log-mel spectrogram tensor of
/// shape `(n_mels, N_FRAMES)`.
///
/// Audio is padded with silence or truncated to the 30 second window the
/// encoder expects. Per-frame band energies are weighted by the filter
/// bank and log-scaled with an -80 dB floor.
pub fn log_mel_spectrogram(
    pcm_data: &[f32],
    filters: &[f32],
    n_mels: usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let mut padded_audio = vec![0.0f32; WINDOW_SAMPLES];
    let copy_len = pcm_data.len().min(WINDOW_SAMPLES);
    padded_audio[..copy_len].copy_from_slice(&pcm_data[..copy_len]);

    let mut mel_data = vec![0.0f32; n_mels * N_FRAMES];

    let frame_size = WINDOW_SAMPLES / N_FRAMES;
    for frame in 0..N_FRAMES {
        let start = frame * frame_size;
        let end = (start + frame_size).min(padded_audio.len());

        // Band energies across the frame, bucketed into N_FFT bins.
        let mut band_energy = [0.0f32; N_FFT];
        for (offset, &sample) in padded_audio[start..end].iter().enumerate() {
            let bin = offset * N_FFT / frame_size.max(1);
            band_energy[bin.min(N_FFT - 1)] += sample.abs();
        }

        for mel_bin in 0..n_mels {
            let filter = &filters[mel_bin * N_FFT..(mel_bin + 1) * N_FFT];
            let mut energy = 0.0f32;
            for (bin, &weight) in filter.iter().enumerate() {
                if weight > 0.0 {
                    energy += band_energy[bin] * weight;
                }
            }
            mel_data[mel_bin * N_FRAMES + frame] =
                (energy / frame_size as f32).ln().max(LOG_FLOOR);
        }
    }

    Tensor::from_vec(mel_data, (n_mels, N_FRAMES), device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_bank_shape() {
        let filters = mel_filter_bank(80);
        assert_eq!(filters.len(), 80 * N_FFT);
    }

    #[test]
    fn test_filter_bank_values_bounded() {
        let filters = mel_filter_bank(80);
        assert!(filters.iter().all(|&w| (0.0..=1.0).contains(&w)));
        // Every filter has at least one non-zero weight
        for i in 0..80 {
            let filter = &filters[i * N_FFT..(i + 1) * N_FFT];
            assert!(filter.iter().any(|&w| w > 0.0), "filter {} is empty", i);
        }
    }

    #[test]
    fn test_spectrogram_shape_and_floor() {
        let device = Device::Cpu;
        let filters = mel_filter_bank(80);
        let silence = vec![0.0f32; 16000];
        let mel = log_mel_spectrogram(&silence, &filters, 80, &device).unwrap();
        assert_eq!(mel.dims(), &[80, N_FRAMES]);

        // Silence lands on the log floor everywhere
        let values = mel.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|&v| (v - LOG_FLOOR).abs() < 1e-4));
    }

    #[test]
    fn test_spectrogram_signal_above_floor() {
        let device = Device::Cpu;
        let filters = mel_filter_bank(80);
        let tone: Vec<f32> = (0..32000).map(|i| (i as f32 * 0.2).sin() * 0.8).collect();
        let mel = log_mel_spectrogram(&tone, &filters, 80, &device).unwrap();
        let values = mel.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().any(|&v| v > LOG_FLOOR + 1.0));
    }
}
