//! Audio decode/encode helpers.
//!
//! Every segment is decoded to one common internal representation —
//! mono PCM `f32` samples plus a sample rate — before assembly. WAV goes
//! through a dedicated hound path, compressed formats (mp3, aac, flac,
//! ogg) through symphonia. Multi-channel audio is mixed down to mono.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;

use crate::error::{NotecastError, Result};

/// Duration in seconds of a mono sample buffer
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64
}

/// Decode an audio file to mono PCM f32 samples and a sample rate.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" => decode_wav_file(path),
        "mp3" | "m4a" | "aac" | "flac" | "ogg" => {
            let data = std::fs::read(path)?;
            decode_bytes(data, Some(&extension))
        }
        other => Err(NotecastError::AudioProcessing(format!(
            "unsupported audio format: {:?} ({})",
            other,
            path.display()
        ))),
    }
}

/// Decode compressed audio bytes (mp3 etc.) to mono PCM f32 samples.
pub fn decode_bytes(data: Vec<u8>, extension_hint: Option<&str>) -> Result<(Vec<f32>, u32)> {
    let cursor = std::io::Cursor::new(data);
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .map_err(|e| NotecastError::AudioProcessing(format!("failed to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| NotecastError::AudioProcessing("no audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| NotecastError::AudioProcessing(format!("failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);

    let mut pcm = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                buffer.copy_interleaved_ref(decoded);
                mix_to_mono(buffer.samples(), channels, &mut pcm);
            }
            Err(e) => {
                // A corrupt packet loses a few milliseconds, not the run
                log::warn!("skipping undecodable packet: {}", e);
            }
        }
    }

    log::debug!("decoded {} mono samples at {} Hz", pcm.len(), sample_rate);
    Ok((pcm, sample_rate))
}

/// Decode a WAV file to mono PCM f32 samples.
pub fn decode_wav_file<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path.as_ref()).map_err(NotecastError::WavDecoding)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0).map_err(NotecastError::WavDecoding))
            .collect::<Result<_>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0).map_err(NotecastError::WavDecoding))
            .collect::<Result<_>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0).map_err(NotecastError::WavDecoding))
            .collect::<Result<_>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map_err(NotecastError::WavDecoding))
            .collect::<Result<_>>()?,
        (format, bits) => {
            return Err(NotecastError::AudioProcessing(format!(
                "unsupported WAV format: {:?}, {} bits",
                format, bits
            )));
        }
    };

    let mut pcm = Vec::with_capacity(interleaved.len() / spec.channels as usize);
    mix_to_mono(&interleaved, spec.channels as usize, &mut pcm);
    Ok((pcm, spec.sample_rate))
}

/// Encode mono PCM f32 samples into a 32-bit float WAV file.
pub fn encode_wav<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    log::debug!(
        "wrote {} ({} samples, {} Hz)",
        path.as_ref().display(),
        samples.len(),
        sample_rate
    );
    Ok(())
}

// Average interleaved frames down to one channel.
fn mix_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        out.push(frame.iter().sum::<f32>() / channels as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sine(seconds: f64, sample_rate: u32) -> Vec<f32> {
        let count = (seconds * sample_rate as f64) as usize;
        (0..count)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn test_duration_secs() {
        assert_eq!(duration_secs(44100, 44100), 1.0);
        assert_eq!(duration_secs(22050, 44100), 0.5);
        assert_eq!(duration_secs(0, 44100), 0.0);
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples = sine(0.1, 44100);

        encode_wav(&samples, 44100, &path).unwrap();
        let (decoded, rate) = decode_wav_file(&path).unwrap();

        assert_eq!(rate, 44100);
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_decode_file_dispatches_on_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        encode_wav(&sine(0.05, 22050), 22050, &path).unwrap();

        let (decoded, rate) = decode_file(&path).unwrap();
        assert_eq!(rate, 22050);
        assert!(!decoded.is_empty());

        let bad = dir.path().join("notes.txt");
        std::fs::write(&bad, b"not audio").unwrap();
        assert!(matches!(
            decode_file(&bad),
            Err(NotecastError::AudioProcessing(_))
        ));
    }

    #[test]
    fn test_stereo_mixdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(16384i16).unwrap(); // left ~0.5
            writer.write_sample(0i16).unwrap(); // right 0.0
        }
        writer.finalize().unwrap();

        let (decoded, rate) = decode_wav_file(&path).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(decoded.len(), 800);
        // Mono mix of 0.5 and 0.0 is 0.25
        assert!((decoded[0] - 0.25).abs() < 1e-3);
    }
}
