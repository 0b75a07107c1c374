//! Interleaved little-endian signed PCM at widths 1/2/4 bytes, converted to
//! and from `f32` in [-1, 1].

/// Decode raw PCM bytes into normalized f32 samples. Trailing bytes that do
/// not fill a whole sample are dropped.
pub fn decode_to_f32(bytes: &[u8], sample_width: u16) -> Vec<f32> {
    match sample_width {
        1 => bytes.iter().map(|&b| f32::from(b as i8) / 128.0).collect(),
        2 => bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
            .collect(),
        4 => bytes
            .chunks_exact(4)
            .map(|quad| {
                i32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]) as f32 / 2_147_483_648.0
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Encode normalized f32 samples as raw PCM bytes, clamping out-of-range
/// values instead of wrapping.
pub fn encode_from_f32(samples: &[f32], sample_width: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * usize::from(sample_width));
    // Scaling mirrors `decode_to_f32` exactly, so decode-then-encode is the
    // identity for in-range input.
    match sample_width {
        1 => {
            for &s in samples {
                let v = (s * 128.0).round().clamp(-128.0, 127.0) as i8;
                out.push(v as u8);
            }
        }
        2 => {
            for &s in samples {
                let v = (s * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        4 => {
            for &s in samples {
                let v = (f64::from(s) * 2_147_483_648.0)
                    .round()
                    .clamp(-2_147_483_648.0, 2_147_483_647.0) as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        _ => {}
    }
    out
}

/// Average interleaved channels down to mono at equal gain. A trailing
/// partial frame is averaged over the samples it has.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let mut mono = Vec::with_capacity(interleaved.len() / channels + 1);
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for &sample in interleaved {
        acc += sample;
        count += 1;
        if count == channels {
            mono.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        mono.push(acc / count as f32);
    }
    mono
}

/// i16 view of normalized samples, used to feed the detector.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32_768.0).clamp(-32_768.0, 32_767.0) as i16)
        .collect()
}
