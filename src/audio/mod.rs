//! # Audio Module
//!
//! Sample-level utilities shared by the classification backends.
//!
//! ## Key Components:
//! - **PCM utilities**: i16/f32 conversion, validation, linear resampling
//! - **Mel features**: log-mel spectrogram generation for the Whisper encoder
//!
//! ## Canonical Audio Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod mel;
pub mod pcm;
