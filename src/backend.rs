//! Контракты внешних бэкендов
//!
//! Нейросетевой инференс (оценка F0, эмбеддер, генератор), TTS-движок,
//! DSP-примитивы эффектов и аудиокодеки находятся вне библиотеки.
//! Здесь описаны узкие трейты, через которые ядро их вызывает, и
//! значения, которыми они обмениваются.

use std::path::Path;
use std::sync::Arc;

use crate::catalog::ModelEntry;
use crate::config::{EmbedderModel, ExportFormat, F0Method};
use crate::effects::{PostEffect, PostEffectKind};
use crate::error::Result;
use crate::job::ConversionParams;

/// Моно-аудио в формате f32
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность в секундах
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Покадровая кривая основного тона (Гц, 0.0 — невокализованный кадр)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct F0Curve {
    pub values: Vec<f32>,
}

impl F0Curve {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Представление характеристик голоса, полученное эмбеддером
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embedding {
    pub features: Vec<f32>,
}

/// Оценщик основного тона
pub trait PitchEstimator: Send + Sync {
    fn estimate(&self, audio: &AudioBuffer, method: F0Method, hop_length: u32) -> Result<F0Curve>;
}

/// Эмбеддер голоса. `EmbedderModel::Custom` несёт путь к пользовательской модели.
pub trait SpeakerEmbedder: Send + Sync {
    fn embed(&self, audio: &AudioBuffer, embedder: &EmbedderModel) -> Result<Embedding>;
}

/// Генератор: преобразует эмбеддинг и кривую F0 в голос выбранной модели
pub trait ConversionBackend: Send + Sync {
    fn run(
        &self,
        embedding: &Embedding,
        f0: &F0Curve,
        model: &ModelEntry,
        params: &ConversionParams,
    ) -> Result<AudioBuffer>;
}

/// TTS-движок. `rate` — смещение скорости речи в процентах (-100..100).
pub trait TtsBackend: Send + Sync {
    fn synthesize(&self, text: &str, voice: &str, rate: i32) -> Result<AudioBuffer>;
}

/// DSP-примитивы ступеней цепочки эффектов
pub trait AudioEffectsBackend: Send + Sync {
    fn split_by_silence(&self, audio: AudioBuffer) -> Result<AudioBuffer>;
    fn pitch_correct(&self, audio: AudioBuffer, strength: f32) -> Result<AudioBuffer>;
    fn denoise(&self, audio: AudioBuffer, strength: f32) -> Result<AudioBuffer>;
    fn formant_shift(&self, audio: AudioBuffer, quefrency: f32, timbre: f32) -> Result<AudioBuffer>;
    /// Эффект постобработки; параметры уже прижаты к диапазонам и заполнены
    fn post_process(
        &self,
        audio: AudioBuffer,
        kind: PostEffectKind,
        effect: &PostEffect,
    ) -> Result<AudioBuffer>;
}

/// Чтение входного аудио и запись результата
pub trait AudioIo: Send + Sync {
    fn read(&self, path: &Path) -> Result<AudioBuffer>;
    fn write(&self, audio: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()>;
}

/// Загрузка и выгрузка весов модели в бэкенде инференса
pub trait ModelBackend: Send + Sync {
    fn load(&self, entry: &ModelEntry) -> Result<()>;
    fn unload(&self, entry: &ModelEntry) -> Result<()>;
}

/// Набор бэкендов, которыми пользуется конвейер задачи
#[derive(Clone)]
pub struct Backends {
    pub pitch: Arc<dyn PitchEstimator>,
    pub embedder: Arc<dyn SpeakerEmbedder>,
    pub converter: Arc<dyn ConversionBackend>,
    pub tts: Option<Arc<dyn TtsBackend>>,
    pub effects: Arc<dyn AudioEffectsBackend>,
    pub audio_io: Arc<dyn AudioIo>,
}
