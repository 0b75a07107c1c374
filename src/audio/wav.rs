//! Per-chunk RIFF WAV envelope for published audio frames.
//!
//! Every capture period goes out as a standalone WAV so bus consumers never
//! need out-of-band format state. Header overhead is ~44 bytes per message.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};

/// Wrap raw interleaved PCM bytes in a WAV container carrying the recorder's
/// format description.
pub fn encode_chunk(pcm: &[u8], sample_rate: u32, sample_width: u16, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: sample_width * 8,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).context("failed to start WAV chunk")?;
    match sample_width {
        1 => {
            for &byte in pcm {
                writer.write_sample(byte as i8)?;
            }
        }
        2 => {
            for pair in pcm.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
        }
        4 => {
            for quad in pcm.chunks_exact(4) {
                writer.write_sample(i32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))?;
            }
        }
        other => return Err(anyhow!("unsupported sample width {other}")),
    }
    writer.finalize().context("failed to finalize WAV chunk")?;
    Ok(cursor.into_inner())
}
