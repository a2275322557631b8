//! WAV file audio source for microphone-free runs.

use crate::audio::recorder::AudioSource;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoxrelayError};
use std::io::Read;
use std::path::Path;

/// Audio source that replays WAV file data through the capture seam.
/// Supports arbitrary sample rates and channels, resampling to 16kHz mono.
pub struct WavAudioSource {
    samples: Vec<i16>,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| VoxrelayError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels;

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoxrelayError::AudioCapture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        // Mix down to mono if stereo
        let mono_samples = if source_channels == 2 {
            raw_samples
                .chunks_exact(2)
                .map(|chunk| {
                    let left = chunk[0] as i32;
                    let right = chunk[1] as i32;
                    ((left + right) / 2) as i16
                })
                .collect()
        } else {
            raw_samples
        };

        let samples = if source_rate != SAMPLE_RATE {
            resample(&mono_samples, source_rate, SAMPLE_RATE)
        } else {
            mono_samples
        };

        Ok(Self {
            samples,
            position: 0,
            chunk_size: defaults_chunk_size(),
        })
    }

    /// Create from a file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_reader(Box::new(std::io::Cursor::new(data)))
    }

    /// Total number of samples this source will replay.
    pub fn len_samples(&self) -> usize {
        self.samples.len()
    }
}

fn defaults_chunk_size() -> usize {
    crate::defaults::frame_samples(SAMPLE_RATE, crate::defaults::FRAME_MS)
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_reads_mono_16khz_unchanged() {
        let samples: Vec<i16> = (0..3200).map(|i| (i % 100) as i16).collect();
        let bytes = wav_bytes(16000, 1, &samples);

        let mut source = WavAudioSource::from_reader(Box::new(Cursor::new(bytes))).unwrap();
        assert_eq!(source.len_samples(), 3200);

        let first = source.read_samples().unwrap();
        assert_eq!(first.len(), 1600);
        assert_eq!(first[..100], samples[..100]);
    }

    #[test]
    fn test_exhaustion_returns_empty() {
        let bytes = wav_bytes(16000, 1, &[0i16; 1600]);
        let mut source = WavAudioSource::from_reader(Box::new(Cursor::new(bytes))).unwrap();

        assert_eq!(source.read_samples().unwrap().len(), 1600);
        assert!(source.read_samples().unwrap().is_empty());
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn test_stereo_is_mixed_to_mono() {
        // Interleaved L/R pairs: (100, 200) → 150
        let interleaved: Vec<i16> = [100i16, 200].repeat(1600);
        let bytes = wav_bytes(16000, 2, &interleaved);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(bytes))).unwrap();
        assert_eq!(source.len_samples(), 1600);
        assert!(source.samples.iter().all(|&s| s == 150));
    }

    #[test]
    fn test_resamples_to_16khz() {
        let samples = vec![1000i16; 32000];
        let bytes = wav_bytes(32000, 1, &samples);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(bytes))).unwrap();
        // 1 second of 32kHz audio → ~1 second of 16kHz audio
        assert!((source.len_samples() as i64 - 16000).abs() <= 1);
    }

    #[test]
    fn test_garbage_data_is_rejected() {
        let result = WavAudioSource::from_reader(Box::new(Cursor::new(vec![0u8; 64])));
        assert!(matches!(result, Err(VoxrelayError::AudioCapture { .. })));
    }

    #[test]
    fn test_is_finite() {
        let bytes = wav_bytes(16000, 1, &[0i16; 16]);
        let source = WavAudioSource::from_reader(Box::new(Cursor::new(bytes))).unwrap();
        assert!(source.is_finite());
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![1i16, 2, 3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_empty() {
        assert_eq!(resample(&[], 48000, 16000), Vec::<i16>::new());
    }
}
