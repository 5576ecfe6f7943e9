//! Audio processing module
//!
//! PCM helpers, utterance segmentation, and feedback chimes. The bridge
//! works in 16-bit little-endian mono PCM end to end; WAV encoding exists
//! only for the STT upload.

mod chime;
mod segmenter;

pub use chime::{listening_chime, success_chime, thinking_tone};
pub use segmenter::{SegmenterConfig, Utterance, UtteranceSegmenter};

use crate::{Error, Result};

/// Mean absolute amplitude of a 16-bit little-endian PCM chunk
///
/// Returns 0.0 for chunks too short to hold a sample pair.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_amplitude(pcm: &[u8]) -> f64 {
    if pcm.len() < 4 {
        return 0.0;
    }
    let samples = pcm.chunks_exact(2);
    let count = samples.len();
    let sum: u64 = samples
        .map(|b| u64::from(i16::from_le_bytes([b[0], b[1]]).unsigned_abs()))
        .sum();
    sum as f64 / count as f64
}

/// Check whether a PCM chunk is below the silence threshold
///
/// Chunks too short to measure count as silent.
#[must_use]
pub fn is_silent(pcm: &[u8], threshold: i32) -> bool {
    mean_amplitude(pcm) < f64::from(threshold)
}

/// Encode raw 16-bit PCM as WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_of(value: i16, samples: usize) -> Vec<u8> {
        value
            .to_le_bytes()
            .iter()
            .copied()
            .cycle()
            .take(samples * 2)
            .collect()
    }

    #[test]
    fn silence_is_silent() {
        let silence = pcm_of(0, 160);
        assert!(is_silent(&silence, 500));
        assert!(mean_amplitude(&silence) < f64::EPSILON);
    }

    #[test]
    fn speech_is_not_silent() {
        let speech = pcm_of(3000, 160);
        assert!(!is_silent(&speech, 500));
    }

    #[test]
    fn undersized_chunk_counts_as_silent() {
        assert!(is_silent(&[0x01], 500));
        assert!(is_silent(&[], 500));
    }

    #[test]
    fn wav_header_is_valid() {
        let pcm = pcm_of(1000, 160);
        let wav = pcm_to_wav(&pcm, 16_000, 1).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }
}
