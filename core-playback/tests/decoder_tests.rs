//! Generic decoder tests over a synthetic packet stream.
//!
//! Every decoded sample carries its own timestamp, so the position the
//! decoder resumes from after a seek can be read straight off the audio.

mod common;

use common::{StreamLayout, SyntheticOpener};
use core_playback::decoder::{DecoderStatus, GenericDecoder};
use core_playback::traits::AudioContext;
use core_playback::{GenericPlaybackContext, PlaybackError, SchedulingConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const SEEK_PRECISION: f64 = 0.01;

fn decoder(layout: StreamLayout) -> (GenericDecoder, SyntheticOpener) {
    decoder_with_config(layout, &SchedulingConfig::default())
}

fn decoder_with_config(layout: StreamLayout, config: &SchedulingConfig) -> (GenericDecoder, SyntheticOpener) {
    let opener = SyntheticOpener::new(layout);
    let decoder = GenericDecoder::new(opener.stream(), Arc::new(DecoderStatus::default()), config);
    (decoder, opener)
}

// ============================================================================
// Seek correction
// ============================================================================

#[test]
fn test_seek_trims_first_packet_to_target() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    decoder.seek(0.9).unwrap();
    let buffer = decoder.decode(10_000);

    let start = buffer.start_timestamp().unwrap();
    assert!((start - 0.9).abs() < SEEK_PRECISION, "resumed at {}", start);

    let first_sample = buffer.frames()[0].samples()[0] as f64;
    assert!((first_sample - 0.9).abs() < SEEK_PRECISION);

    // 0.9..1.0, then the two remaining packets
    assert_eq!(buffer.sample_count(), 1100);
    assert!(decoder.is_eof());
}

#[test]
fn test_seek_primes_codec_from_earlier_keyframe() {
    let layout = StreamLayout::half_second_packets().with_keyframe_interval(2);
    let (mut decoder, opener) = decoder(layout);

    // Lands on the keyframe at 0.0; the packet at 0.5 holds the target
    decoder.seek(0.9).unwrap();

    assert_eq!(opener.primed.load(Ordering::SeqCst), 1);
    let buffer = decoder.decode(10_000);
    let start = buffer.start_timestamp().unwrap();
    assert!((start - 0.9).abs() < SEEK_PRECISION);
}

#[test]
fn test_seek_within_tolerance_keeps_whole_packet() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    decoder.seek(0.505).unwrap();
    let buffer = decoder.decode(10_000);

    let start = buffer.start_timestamp().unwrap();
    assert_eq!(start, 0.5);
    assert!((start - 0.505).abs() < SEEK_PRECISION);
    assert_eq!(buffer.sample_count(), 1500);
}

#[test]
fn test_seek_into_last_packet_skips_leading_samples() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    decoder.seek(1.8).unwrap();
    let buffer = decoder.decode(10_000);

    let start = buffer.start_timestamp().unwrap();
    assert!((start - 1.8).abs() < SEEK_PRECISION);
    assert_eq!(buffer.sample_count(), 200);
    assert!(decoder.is_eof());
}

#[test]
fn test_seek_past_end_sets_eof() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    decoder.seek(2.0).unwrap();

    assert!(decoder.is_eof());
    let buffer = decoder.decode(1_000);
    assert!(buffer.is_empty());
    assert!(buffer.into_pcm_buffer().is_none());
}

#[test]
fn test_seek_back_to_start_after_eof() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());
    assert_eq!(decoder.decode(10_000).sample_count(), 2000);
    assert!(decoder.is_eof());

    decoder.seek(0.0).unwrap();

    assert!(!decoder.is_eof());
    assert!(decoder.is_at_start());
    assert_eq!(decoder.decode(10_000).sample_count(), 2000);
}

// ============================================================================
// Buffer capping
// ============================================================================

#[test]
fn test_decode_caps_buffer_and_keeps_remainder_pending() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    let first = decoder.decode(600);
    assert_eq!(first.sample_count(), 500);
    assert_eq!(decoder.pending_frames(), 1);

    let second = decoder.decode(600);
    assert_eq!(second.start_timestamp(), Some(0.5));
    assert_eq!(second.sample_count(), 500);
}

#[test]
fn test_empty_buffer_accepts_oversized_frame() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    let buffer = decoder.decode(100);

    assert_eq!(buffer.sample_count(), 500);
    assert_eq!(buffer.max_sample_count(), 100);
}

#[test]
fn test_decode_to_end_sets_eof_once() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    let buffer = decoder.decode(10_000);
    assert_eq!(buffer.sample_count(), 2000);
    assert!(decoder.is_eof());

    assert!(decoder.decode(10_000).is_empty());
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_loop_decode_truncates_at_loop_end() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    let buffer = decoder.decode_loop(10_000, 1.2);

    assert_eq!(buffer.sample_count(), 1200);
    assert!(decoder.is_end_of_loop());
    assert!(!decoder.is_eof());

    // Nothing more until the loop is reset
    assert!(decoder.decode_loop(10_000, 1.2).is_empty());
    decoder.reset_loop_state();
    assert!(!decoder.is_end_of_loop());
}

#[test]
fn test_loop_ending_on_packet_boundary() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    let buffer = decoder.decode_loop(10_000, 1.0);

    assert_eq!(buffer.sample_count(), 1000);
    assert!(decoder.is_end_of_loop());
}

#[test]
fn test_loop_iteration_after_seek_to_loop_start() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());
    decoder.decode_loop(10_000, 1.2);

    decoder.reset_loop_state();
    decoder.seek(0.7).unwrap();
    let buffer = decoder.decode_loop(10_000, 1.2);

    let start = buffer.start_timestamp().unwrap();
    assert!((start - 0.7).abs() < SEEK_PRECISION);
    assert_eq!(buffer.sample_count(), 500);
    assert!(decoder.is_end_of_loop());
}

// ============================================================================
// Corrupt streams
// ============================================================================

#[test]
fn test_single_corrupt_packet_is_skipped() {
    let layout = StreamLayout::half_second_packets().with_corrupt_packets(&[1]);
    let (mut decoder, _) = decoder(layout);

    let buffer = decoder.decode(10_000);

    assert_eq!(buffer.sample_count(), 1500);
    assert!(decoder.is_eof());
}

#[test]
fn test_repeated_corruption_stops_decoding() {
    let layout = StreamLayout::half_second_packets().with_corrupt_packets(&[1, 2]);
    let config = SchedulingConfig {
        max_consecutive_decode_errors: 2,
        ..Default::default()
    };
    let (mut decoder, _) = decoder_with_config(layout, &config);

    let buffer = decoder.decode(10_000);

    assert_eq!(buffer.sample_count(), 500);
    assert!(!decoder.is_eof());
}

#[test]
fn test_destroy_is_idempotent() {
    let (mut decoder, _) = decoder(StreamLayout::half_second_packets());

    decoder.destroy();
    decoder.destroy();

    assert!(decoder.is_destroyed());
    assert!(matches!(decoder.next_frame(), Err(PlaybackError::ContextClosed)));
}

// ============================================================================
// Generic playback context
// ============================================================================

#[test]
fn test_generic_context_reopens_after_close() {
    let opener = SyntheticOpener::new(StreamLayout::half_second_packets());
    let opened = Arc::clone(&opener.opened);
    let context =
        GenericPlaybackContext::from_opener("synthetic.bin", Box::new(opener), &SchedulingConfig::default())
            .unwrap();

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(context.duration(), 2.0);
    assert_eq!(context.sample_rate(), 1000);
    assert_eq!(context.frame_count(), 2000);
    assert!(context.is_open());

    context.close();
    context.close();
    assert!(!context.is_open());

    let decoded = context
        .with_decoder(|decoder| decoder.decode(10_000).sample_count())
        .unwrap();
    assert_eq!(decoded, 2000);
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert!(context.is_open());
    assert!(context.decoder_status().is_eof());
}

#[test]
fn test_generic_context_measures_unreported_duration() {
    let opener = SyntheticOpener::new(StreamLayout::half_second_packets().with_unknown_duration());
    let opened = Arc::clone(&opener.opened);
    let context =
        GenericPlaybackContext::from_opener("synthetic.bin", Box::new(opener), &SchedulingConfig::default())
            .unwrap();

    // One stream for the decoder, one to measure the packets
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(context.duration(), 2.0);
    assert_eq!(context.frame_count(), 2000);
}
