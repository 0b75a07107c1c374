use super::*;
use std::f32::consts::PI;

fn sine(rate: u32, seconds: f32, freq: f32) -> Vec<f32> {
    let total = (rate as f32 * seconds) as usize;
    (0..total)
        .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * 0.5)
        .collect()
}

#[test]
fn pcm_decode_then_encode_is_identity_for_16_bit() {
    let bytes: Vec<u8> = [-32768i16, -1, 0, 1, 127, 32767]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let samples = decode_to_f32(&bytes, 2);
    assert_eq!(encode_from_f32(&samples, 2), bytes);
}

#[test]
fn pcm_decode_then_encode_is_identity_for_8_bit() {
    let bytes: Vec<u8> = [-128i8, -5, 0, 3, 127].iter().map(|&s| s as u8).collect();
    let samples = decode_to_f32(&bytes, 1);
    assert_eq!(encode_from_f32(&samples, 1), bytes);
}

#[test]
fn pcm_32_bit_round_trip_is_close() {
    let values = [-2_000_000_000i32, -12345, 0, 67890, 2_000_000_000];
    let bytes: Vec<u8> = values.iter().flat_map(|s| s.to_le_bytes()).collect();
    let samples = decode_to_f32(&bytes, 4);
    let back = decode_to_f32(&encode_from_f32(&samples, 4), 4);
    assert_eq!(back.len(), values.len());
    for (&expected, &actual) in values.iter().zip(back.iter()) {
        let actual = (f64::from(actual) * 2_147_483_648.0) as i64;
        // f32 mantissa limits 32-bit precision; stay within a few hundred LSB.
        assert!(
            (i64::from(expected) - actual).abs() < 512,
            "{expected} vs {actual}"
        );
    }
}

#[test]
fn pcm_encode_clamps_out_of_range_samples() {
    let bytes = encode_from_f32(&[2.0, -2.0], 2);
    assert_eq!(
        bytes,
        [32_767i16, -32_768]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect::<Vec<u8>>()
    );
}

#[test]
fn pcm_drops_trailing_partial_sample() {
    let samples = decode_to_f32(&[0, 0, 7], 2);
    assert_eq!(samples.len(), 1);
}

#[test]
fn downmix_averages_stereo_pairs() {
    let mono = downmix(&[1.0, -1.0, 0.5, 0.5, 0.0, 1.0], 2);
    assert_eq!(mono, vec![0.0, 0.5, 0.5]);
}

#[test]
fn downmix_passes_mono_through() {
    let input = vec![0.1, 0.2, 0.3];
    assert_eq!(downmix(&input, 1), input);
}

#[test]
fn downmix_handles_trailing_partial_frame() {
    let mono = downmix(&[0.2, 0.4, 0.8], 2);
    assert_eq!(mono, vec![0.3, 0.8]);
}

#[test]
fn f32_to_i16_clamps() {
    assert_eq!(f32_to_i16(&[1.5, -1.5]), vec![32_767, -32_768]);
    assert_eq!(f32_to_i16(&[0.0]), vec![0]);
}

#[test]
fn capture_period_is_120_ms() {
    assert_eq!(capture_chunk_frames(16_000), 1_920);
    assert_eq!(capture_chunk_frames(44_100), 5_292);
    assert_eq!(capture_chunk_frames(48_000), 5_760);
}

#[test]
fn vad_rate_passes_supported_rates_through() {
    for rate in VAD_RATES {
        assert_eq!(vad_target_rate(rate), rate);
    }
    assert_eq!(vad_target_rate(44_100), 16_000);
    assert_eq!(vad_target_rate(22_050), 16_000);
}

#[test]
fn rate_converter_is_identity_for_equal_rates() {
    let mut converter = RateConverter::new(16_000, 16_000, 1).expect("converter");
    let input = vec![0.25f32; 1000];
    assert_eq!(converter.process(&input).expect("process"), input);
}

#[test]
fn rate_converter_upsamples_with_state_across_blocks() {
    let input = sine(16_000, 1.0, 440.0);
    let mut converter = RateConverter::new(16_000, 48_000, 1).expect("converter");
    let mut produced = 0usize;
    for block in input.chunks(2048) {
        produced += converter.process(block).expect("process").len();
    }
    // Whole 256-frame filter chunks are consumed; the remainder stays carried.
    let consumed = input.len() - input.len() % 256;
    let expected = consumed * 3;
    let diff = (produced as i64 - expected as i64).abs();
    assert!(diff <= 128, "expected ~{expected} samples, got {produced}");
}

#[test]
fn rate_converter_handles_fractional_ratio() {
    let input = sine(22_050, 1.0, 220.0);
    let mut converter = RateConverter::new(22_050, 48_000, 1).expect("converter");
    let mut produced = 0usize;
    for block in input.chunks(2048) {
        produced += converter.process(block).expect("process").len();
    }
    let consumed = (input.len() - input.len() % 256) as f64;
    let expected = consumed * 48_000.0 / 22_050.0;
    let diff = (produced as f64 - expected).abs();
    assert!(diff <= 256.0, "expected ~{expected} samples, got {produced}");
}

#[test]
fn rate_converter_keeps_channels_interleaved() {
    let frames = 2048;
    let mut stereo = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        stereo.push((i as f32 / frames as f32).sin());
        stereo.push(-(i as f32 / frames as f32).sin());
    }
    let mut converter = RateConverter::new(24_000, 48_000, 2).expect("converter");
    let out = converter.process(&stereo).expect("process");
    assert_eq!(out.len() % 2, 0, "output stays frame-aligned");
    assert!(!out.is_empty());
}

#[test]
fn rate_converter_rejects_bad_parameters() {
    assert!(RateConverter::new(16_000, 48_000, 0).is_err());
    assert!(RateConverter::new(0, 48_000, 1).is_err());
    assert!(RateConverter::new(16_000, 1_000_000, 1).is_err());
}

#[test]
fn detector_reports_silence_for_quiet_input() {
    let mut detector = SpeechDetector::new(2, 16_000);
    let silence = vec![0i16; 480 * 4];
    assert!(detector.is_silence(&silence));
}

#[test]
fn detector_ignores_residual_below_one_frame() {
    let mut detector = SpeechDetector::new(3, 16_000);
    // 479 samples is less than one 30 ms frame at 16 kHz.
    let residual = vec![12_000i16; 479];
    assert!(detector.is_silence(&residual));
    assert!(detector.is_silence(&[]));
}

#[test]
fn detector_supports_every_vad_rate() {
    for rate in VAD_RATES {
        let mut detector = SpeechDetector::new(1, rate);
        let frame_samples = (rate * VAD_CHUNK_MS / 1000) as usize;
        let silence = vec![0i16; frame_samples * 2];
        assert!(detector.is_silence(&silence), "rate {rate}");
        detector.reset();
    }
}

#[test]
fn wav_chunk_round_trips_16_bit_pcm() {
    let pcm: Vec<u8> = (0i16..960).flat_map(|s| s.to_le_bytes()).collect();
    let wav = encode_chunk(&pcm, 16_000, 2, 1).expect("encode");

    let mut reader = hound::WavReader::new(std::io::Cursor::new(&wav)).expect("decode");
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let back: Vec<u8> = reader
        .samples::<i16>()
        .flat_map(|s| s.expect("sample").to_le_bytes())
        .collect();
    assert_eq!(back, pcm);
}

#[test]
fn wav_chunk_supports_stereo_and_wide_samples() {
    let pcm: Vec<u8> = (0i32..256).flat_map(|s| (s * 65_536).to_le_bytes()).collect();
    let wav = encode_chunk(&pcm, 44_100, 4, 2).expect("encode");

    let mut reader = hound::WavReader::new(std::io::Cursor::new(&wav)).expect("decode");
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 32);

    let back: Vec<u8> = reader
        .samples::<i32>()
        .flat_map(|s| s.expect("sample").to_le_bytes())
        .collect();
    assert_eq!(back, pcm);
}

#[test]
fn wav_chunk_header_overhead_is_small() {
    let pcm = vec![0u8; 3_840];
    let wav = encode_chunk(&pcm, 16_000, 2, 1).expect("encode");
    assert_eq!(wav.len(), pcm.len() + 44);
}

#[test]
fn wav_chunk_rejects_unsupported_width() {
    assert!(encode_chunk(&[0, 0, 0], 16_000, 3, 1).is_err());
}
