//! Audio ingestion tests over the public API
//!
//! Exercises the utterance segmenter and PCM helpers without any transport.

mod common;

use aegis_bridge::audio::{
    SegmenterConfig, UtteranceSegmenter, listening_chime, mean_amplitude, pcm_to_wav,
};

use common::{frame, frames};

#[test]
fn speech_then_exact_silence_window_fires_once() {
    let mut segmenter = UtteranceSegmenter::new(SegmenterConfig::default());

    for speech in frames(3000, 2000) {
        assert!(segmenter.push_frame(&speech).is_none());
    }

    let mut boundary = None;
    for (i, silence) in frames(0, 700).into_iter().enumerate() {
        if let Some(utterance) = segmenter.push_frame(&silence) {
            boundary = Some((i + 1, utterance));
            break;
        }
    }

    let (frames_of_silence, utterance) = boundary.expect("no boundary fired");
    // Exactly 600ms after speech ended, not earlier and not later
    assert_eq!(frames_of_silence * 10, 600);
    assert_eq!(utterance.pcm.len(), (2000 + 600) * 32);
    assert!(utterance.started_at <= utterance.ended_at);

    // The segmenter is fresh afterwards; leftover silence fires nothing
    for silence in frames(0, 2000) {
        assert!(segmenter.push_frame(&silence).is_none());
    }
}

#[test]
fn interrupted_silence_never_fires() {
    let mut segmenter = UtteranceSegmenter::new(SegmenterConfig::default());

    // 500ms silent runs separated by speech stay below the 600ms window
    for _ in 0..5 {
        for speech in frames(3000, 200) {
            assert!(segmenter.push_frame(&speech).is_none());
        }
        for silence in frames(0, 500) {
            assert!(segmenter.push_frame(&silence).is_none());
        }
    }
}

#[test]
fn explicit_end_of_speech_flushes_accumulated_audio() {
    let mut segmenter = UtteranceSegmenter::new(SegmenterConfig::default());

    for speech in frames(3000, 400) {
        segmenter.push_frame(&speech);
    }
    let utterance = segmenter.end_of_speech().expect("explicit end must flush");
    assert_eq!(utterance.pcm.len(), 400 * 32);
}

#[test]
fn pure_silence_is_never_an_utterance() {
    let mut segmenter = UtteranceSegmenter::new(SegmenterConfig::default());

    for silence in frames(0, 1500) {
        assert!(segmenter.push_frame(&silence).is_none());
    }
    assert!(segmenter.end_of_speech().is_none());
}

#[test]
fn utterance_pcm_encodes_to_wav_for_upload() {
    let mut segmenter = UtteranceSegmenter::new(SegmenterConfig::default());
    for speech in frames(3000, 300) {
        segmenter.push_frame(&speech);
    }
    let utterance = segmenter.end_of_speech().unwrap();

    let wav = pcm_to_wav(&utterance.pcm, 16_000, 1).unwrap();
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    // 44-byte header plus the raw samples
    assert_eq!(wav.len(), 44 + utterance.pcm.len());
}

#[test]
fn frame_amplitude_distinguishes_speech_from_silence() {
    assert!(mean_amplitude(&frame(3000)) > 500.0);
    assert!(mean_amplitude(&frame(0)) < 500.0);
    assert!(mean_amplitude(&listening_chime()) > 500.0);
}
