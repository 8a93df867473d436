//! Эталонный `AudioIo` на базе hound
//!
//! Читает WAV (16/24/32-бит целые и 32-бит float), сводя многоканальный
//! звук в моно, и пишет 32-бит float моно. Остальные форматы экспорта
//! отклоняются с `UnsupportedFormat`: их кодеки подключаются отдельной
//! реализацией трейта.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::backend::{AudioBuffer, AudioIo};
use crate::config::ExportFormat;
use crate::error::{Result, StudioError};

#[derive(Debug, Clone, Copy, Default)]
pub struct WavAudioIo;

impl WavAudioIo {
    pub fn new() -> Self {
        Self
    }
}

fn wav_error(path: &Path, err: hound::Error) -> StudioError {
    StudioError::Backend(format!("WAV codec error for {}: {}", path.display(), err))
}

/// Декодировать WAV-файл в моно f32
pub fn decode_wav_file(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(StudioError::NotFound(format!("Input audio file not found: {}", path.display())));
    }

    let mut reader = WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec = reader.spec();

    let pcm_data: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| wav_error(path, e))?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 8388608.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| wav_error(path, e))?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 2147483648.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| wav_error(path, e))?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| wav_error(path, e))?,
        (format, bits) => {
            return Err(StudioError::Backend(format!(
                "Unsupported WAV layout {:?}, {} bits: {}",
                format,
                bits,
                path.display()
            )));
        }
    };

    // Если больше одного канала, сводим к моно
    let channels = spec.channels.max(1) as usize;
    let samples = if channels > 1 {
        pcm_data
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        pcm_data
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Закодировать моно f32 в WAV
pub fn encode_wav(audio: &AudioBuffer, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;
    for &sample in &audio.samples {
        writer.write_sample(sample).map_err(|e| wav_error(path, e))?;
    }
    writer.finalize().map_err(|e| wav_error(path, e))?;

    log::debug!(
        "Wrote WAV file {} ({} samples, {} Hz)",
        path.display(),
        audio.len(),
        audio.sample_rate
    );
    Ok(())
}

impl AudioIo for WavAudioIo {
    fn read(&self, path: &Path) -> Result<AudioBuffer> {
        decode_wav_file(path)
    }

    fn write(&self, audio: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Wav => encode_wav(audio, path),
            other => Err(StudioError::UnsupportedFormat(format!(
                "{} (the WAV codec only writes WAV)",
                other
            ))),
        }
    }
}
