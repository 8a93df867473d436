use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ModelEntry;
use crate::config::{EmbedderModel, ExportFormat, F0Method};
use crate::effects::{ClampWarning, EffectChain, EffectConfig, ParameterRange};
use crate::error::{Result, StudioError};
use crate::preset::InferenceSettings;

/// Числовые параметры конвертации
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionParams {
    /// Сдвиг высоты тона в полутонах
    pub pitch: i32,
    /// Влияние индекса
    pub index_rate: f32,
    /// Смешивание огибающей громкости
    pub rms_mix_rate: f32,
    /// Защита глухих согласных
    pub protect: f32,
    /// Шаг анализа F0
    pub hop_length: u32,
    pub speaker_id: u32,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            pitch: 0,
            index_rate: 0.75,
            rms_mix_rate: 1.0,
            protect: 0.5,
            hop_length: 128,
            speaker_id: 0,
        }
    }
}

impl ConversionParams {
    pub const PITCH: ParameterRange = ParameterRange::new(-24.0, 24.0);
    pub const INDEX_RATE: ParameterRange = ParameterRange::UNIT;
    pub const RMS_MIX_RATE: ParameterRange = ParameterRange::UNIT;
    pub const PROTECT: ParameterRange = ParameterRange::new(0.0, 0.5);
    pub const HOP_LENGTH: (u32, u32) = (1, 512);

    /// Прижать параметры к допустимым диапазонам
    pub fn normalized(&self) -> (ConversionParams, Vec<ClampWarning>) {
        let defaults = ConversionParams::default();
        let mut params = *self;
        let mut warnings = Vec::new();

        let mut fix = |field: &str, value: &mut f32, range: ParameterRange, fallback: f32| {
            let clamped = range.clamp(*value, fallback);
            if clamped != *value {
                warnings.push(ClampWarning { field: field.to_string(), original: *value, clamped });
                *value = clamped;
            }
        };

        let mut pitch = params.pitch as f32;
        fix("pitch", &mut pitch, Self::PITCH, 0.0);
        params.pitch = pitch as i32;
        fix("index_rate", &mut params.index_rate, Self::INDEX_RATE, defaults.index_rate);
        fix("rms_mix_rate", &mut params.rms_mix_rate, Self::RMS_MIX_RATE, defaults.rms_mix_rate);
        fix("protect", &mut params.protect, Self::PROTECT, defaults.protect);

        let (min_hop, max_hop) = Self::HOP_LENGTH;
        let hop = params.hop_length.clamp(min_hop, max_hop);
        if hop != params.hop_length {
            warnings.push(ClampWarning {
                field: "hop_length".to_string(),
                original: params.hop_length as f32,
                clamped: hop as f32,
            });
            params.hop_length = hop;
        }

        (params, warnings)
    }
}

/// Источник входного сигнала задачи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSource {
    /// Конвертация готового аудиофайла
    Audio { path: PathBuf },
    /// Синтез речи, затем конвертация. `rate` — смещение скорости, -100..100.
    Text { text: String, voice: String, rate: i32 },
    /// Пакетная конвертация всех аудиофайлов папки
    Folder { dir: PathBuf },
}

impl InputSource {
    pub const RATE_RANGE: (i32, i32) = (-100, 100);
}

/// Один файл пакетной задачи
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub input: PathBuf,
    /// `<папка результата>/<имя>_output.<расширение формата>`
    pub output: PathBuf,
    /// Файл F0 с тем же именем из папки F0, если она задана
    pub f0_override: Option<PathBuf>,
}

fn is_audio_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ExportFormat::ALL.iter().any(|f| f.extension().eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Файлы папки пакетной задачи в порядке имён
fn collect_batch(
    dir: &Path,
    output_dir: &Path,
    f0_dir: Option<&Path>,
    format: ExportFormat,
) -> Result<Vec<BatchItem>> {
    if !dir.is_dir() {
        return Err(StudioError::NotFound(format!("Input folder not found: {}", dir.display())));
    }
    if let Some(f0_dir) = f0_dir {
        if f0_dir.is_file() {
            return Err(StudioError::Validation(format!(
                "F0 override for a folder job must be a folder: {}",
                f0_dir.display()
            )));
        }
    }

    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_audio_file(path))
        .collect();
    inputs.sort();
    if inputs.is_empty() {
        return Err(StudioError::Validation(format!(
            "No audio files in folder: {}",
            dir.display()
        )));
    }

    let f0_files: Vec<PathBuf> = match f0_dir {
        Some(f0_dir) if f0_dir.is_dir() => {
            let mut files: Vec<PathBuf> = fs::read_dir(f0_dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .collect();
            files.sort();
            files
        }
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let stem = file_stem(&input);
        if !seen.insert(stem.clone()) {
            return Err(StudioError::Validation(format!(
                "Two input files would both be saved as '{}_output': {}",
                stem,
                input.display()
            )));
        }
        // Несуществующий путь оставляем: конвейер предупредит и оценит F0 сам
        let f0_override = f0_dir.map(|f0_dir| {
            f0_files
                .iter()
                .find(|f| file_stem(f) == stem)
                .cloned()
                .unwrap_or_else(|| f0_dir.join(format!("{}.f0", stem)))
        });
        items.push(BatchItem {
            output: output_dir.join(format!("{}_output.{}", stem, format.extension())),
            input,
            f0_override,
        });
    }
    Ok(items)
}

/// Неизменяемый снимок всего, что нужно одной задаче
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    id: Uuid,
    input: InputSource,
    model: ModelEntry,
    params: ConversionParams,
    f0_method: F0Method,
    embedder: EmbedderModel,
    effects: EffectConfig,
    f0_override: Option<PathBuf>,
    output: PathBuf,
    export_format: ExportFormat,
    batch: Vec<BatchItem>,
}

impl JobRequest {
    pub fn builder() -> JobRequestBuilder {
        JobRequestBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input(&self) -> &InputSource {
        &self.input
    }

    pub fn model(&self) -> &ModelEntry {
        &self.model
    }

    pub fn params(&self) -> &ConversionParams {
        &self.params
    }

    pub fn f0_method(&self) -> F0Method {
        self.f0_method
    }

    pub fn embedder(&self) -> &EmbedderModel {
        &self.embedder
    }

    pub fn effects(&self) -> &EffectConfig {
        &self.effects
    }

    pub fn f0_override(&self) -> Option<&Path> {
        self.f0_override.as_deref()
    }

    /// Путь результата; расширение всегда соответствует формату экспорта.
    /// Для пакетной задачи это папка результатов.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Файлы пакетной задачи; пусто для одиночной
    pub fn batch_items(&self) -> &[BatchItem] {
        &self.batch
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.input, InputSource::Folder { .. })
    }

    /// Последний файл, который запишет задача
    pub fn final_export(&self) -> &Path {
        self.batch.last().map(|item| item.output.as_path()).unwrap_or(&self.output)
    }

    pub fn export_format(&self) -> ExportFormat {
        self.export_format
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobRequestBuilder {
    input: Option<InputSource>,
    model: Option<ModelEntry>,
    params: ConversionParams,
    f0_method: F0Method,
    embedder: EmbedderModel,
    effects: EffectConfig,
    f0_override: Option<PathBuf>,
    output: Option<PathBuf>,
    export_format: ExportFormat,
}

impl JobRequestBuilder {
    pub fn input_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(InputSource::Audio { path: path.into() });
        self
    }

    pub fn input_text(mut self, text: impl Into<String>, voice: impl Into<String>, rate: i32) -> Self {
        self.input = Some(InputSource::Text { text: text.into(), voice: voice.into(), rate });
        self
    }

    /// Пакетная конвертация: `output` тогда задаёт папку результатов
    pub fn input_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input = Some(InputSource::Folder { dir: dir.into() });
        self
    }

    pub fn input(mut self, input: InputSource) -> Self {
        self.input = Some(input);
        self
    }

    pub fn model(mut self, model: ModelEntry) -> Self {
        self.model = Some(model);
        self
    }

    pub fn params(mut self, params: ConversionParams) -> Self {
        self.params = params;
        self
    }

    pub fn f0_method(mut self, method: F0Method) -> Self {
        self.f0_method = method;
        self
    }

    pub fn embedder(mut self, embedder: EmbedderModel) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn effects(mut self, effects: EffectConfig) -> Self {
        self.effects = effects;
        self
    }

    /// Внешняя кривая F0: файл или папка с файлами по сегментам.
    /// Для пакетной задачи — папка с файлами F0 по именам входных файлов.
    pub fn f0_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.f0_override = Some(path.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn export_format(mut self, format: ExportFormat) -> Self {
        self.export_format = format;
        self
    }

    /// Взять параметры, метод F0, эмбеддер, эффекты и формат из живых настроек
    pub fn settings(mut self, settings: &InferenceSettings) -> Self {
        self.params = settings.params;
        self.f0_method = settings.f0_method;
        self.embedder = settings.embedder.clone();
        self.effects = settings.effects.clone();
        self.export_format = settings.export_format;
        self
    }

    /// Проверить ввод и собрать запрос
    pub fn build(self) -> Result<JobRequest> {
        let input = match self.input {
            None => return Err(StudioError::Validation("No input audio or text given".to_string())),
            Some(InputSource::Text { text, voice, rate }) => {
                if text.trim().is_empty() {
                    return Err(StudioError::Validation("Text to synthesize is required".to_string()));
                }
                if voice.trim().is_empty() {
                    return Err(StudioError::Validation("TTS voice is required".to_string()));
                }
                let (min_rate, max_rate) = InputSource::RATE_RANGE;
                let clamped = rate.clamp(min_rate, max_rate);
                if clamped != rate {
                    log::warn!("TTS rate {} clamped to {}", rate, clamped);
                }
                InputSource::Text { text, voice, rate: clamped }
            }
            Some(InputSource::Audio { path }) => {
                if path.as_os_str().is_empty() {
                    return Err(StudioError::Validation("Input audio path is required".to_string()));
                }
                if !path.is_file() {
                    return Err(StudioError::NotFound(format!(
                        "Input audio file not found: {}",
                        path.display()
                    )));
                }
                InputSource::Audio { path }
            }
            Some(InputSource::Folder { dir }) => {
                if dir.as_os_str().is_empty() {
                    return Err(StudioError::Validation("Input folder is required".to_string()));
                }
                InputSource::Folder { dir }
            }
        };

        let model = self
            .model
            .ok_or_else(|| StudioError::Validation("No voice model selected".to_string()))?;
        if !model.weights.is_file() {
            return Err(StudioError::NotFound(format!(
                "Model weights not found: {}",
                model.weights.display()
            )));
        }

        let output = match self.output {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(StudioError::Validation("Output path is required".to_string())),
        };
        let batch = match &input {
            InputSource::Folder { dir } => {
                collect_batch(dir, &output, self.f0_override.as_deref(), self.export_format)?
            }
            _ => Vec::new(),
        };
        let output = if batch.is_empty() {
            output.with_extension(self.export_format.extension())
        } else {
            output
        };

        if let EmbedderModel::Custom(path) = &self.embedder {
            if !path.exists() {
                return Err(StudioError::NotFound(format!(
                    "Custom embedder not found: {}",
                    path.display()
                )));
            }
        }

        let (params, warnings) = self.params.normalized();
        for warning in &warnings {
            log::warn!("Conversion parameter {}", warning);
        }
        let (effects, _) = EffectChain::validate(&self.effects);

        Ok(JobRequest {
            id: Uuid::new_v4(),
            input,
            model,
            params,
            f0_method: self.f0_method,
            embedder: self.embedder,
            effects,
            f0_override: self.f0_override,
            output,
            export_format: self.export_format,
            batch,
        })
    }
}
