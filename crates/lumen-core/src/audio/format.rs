//! Fixed PCM format of the audio source and the WAV framing used to stream it
//!
//! The producer always writes interleaved signed 16-bit little-endian stereo
//! at 44.1 kHz. One analysis frame is 1024 stereo samples (4096 bytes).

/// Sample rate in Hz
pub const SAMPLE_RATE: u32 = 44_100;
/// Interleaved channel count
pub const CHANNELS: u16 = 2;
/// Bits per sample
pub const BITS_PER_SAMPLE: u16 = 16;
/// Bytes per interleaved sample frame (all channels)
pub const BLOCK_ALIGN: usize = (CHANNELS as usize) * (BITS_PER_SAMPLE as usize / 8);
/// Mono samples per analysis frame (also the FFT size)
pub const FRAME_SAMPLES: usize = 1024;
/// Bytes per analysis frame / nominal chunk size
pub const CHUNK_BYTES: usize = FRAME_SAMPLES * BLOCK_ALIGN;

/// Declared RIFF chunk size of the endless stream (fits a signed 32-bit field)
pub const WAV_RIFF_SIZE: u32 = 0x7FFF_FFFF;
/// Declared `data` chunk size: RIFF size minus the 36 header bytes after it
pub const WAV_DATA_SIZE: u32 = WAV_RIFF_SIZE - 36;
/// Length of the canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// Build the WAV header for an effectively infinite PCM stream.
///
/// Both size fields stay below `i32::MAX` so parsers reading them as signed
/// integers accept the header.
pub fn wav_stream_header() -> [u8; WAV_HEADER_LEN] {
    let byte_rate = SAMPLE_RATE * BLOCK_ALIGN as u32;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&WAV_RIFF_SIZE.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt chunk: 16 bytes, PCM
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&SAMPLE_RATE.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&(BLOCK_ALIGN as u16).to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&WAV_DATA_SIZE.to_le_bytes());
    header
}

/// One chunk worth of digital silence
pub fn silence_chunk() -> Vec<u8> {
    vec![0u8; CHUNK_BYTES]
}

/// Down-mix one interleaved stereo frame to mono, normalized to [-1, 1].
///
/// Trailing bytes that do not form a whole stereo sample are ignored.
pub fn downmix_to_mono(pcm: &[u8], out: &mut Vec<f32>) {
    out.clear();
    out.extend(pcm.chunks_exact(BLOCK_ALIGN).map(|frame| {
        let left = i16::from_le_bytes([frame[0], frame[1]]) as f32;
        let right = i16::from_le_bytes([frame[2], frame[3]]) as f32;
        (left + right) * 0.5 / 32768.0
    }));
}
