use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::{EmbedderModel, ExportFormat, F0Method};
use crate::effects::{
    AutotuneStage, CleanStage, EffectConfig, FormantStage, ParameterRange, PostEffect, PostEffectKind,
};
use crate::error::{Result, StudioError};
use crate::job::ConversionParams;

/// Текущая версия схемы пресета
pub const PRESET_VERSION: u32 = 1;

/// Живые настройки инференса, которые сохраняются в пресет и
/// восстанавливаются из него
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceSettings {
    pub params: ConversionParams,
    pub f0_method: F0Method,
    pub embedder: EmbedderModel,
    pub export_format: ExportFormat,
    pub effects: EffectConfig,
}

/// Сохранённый набор параметров.
///
/// Все поля необязательны: отсутствующие не меняют живые настройки,
/// неизвестные ключи игнорируются при чтении. Поле неверного типа не
/// ломает чтение всего файла, а становится ошибкой `Apply` при применении.
///
/// Эффекты постобработки хранятся плоско: `"<эффект>": bool` и
/// `"<эффект>_<параметр>": число`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Preset {
    pub version: u32,
    pub pitch: Option<f32>,
    pub index_rate: Option<f32>,
    pub rms_mix_rate: Option<f32>,
    pub protect: Option<f32>,
    pub f0_method: Option<String>,
    pub export_format: Option<String>,
    pub embedder_model: Option<String>,
    pub split_audio: Option<bool>,
    pub f0_autotune: Option<bool>,
    pub f0_autotune_strength: Option<f32>,
    pub clean_audio: Option<bool>,
    pub clean_strength: Option<f32>,
    pub formant_shifting: Option<bool>,
    pub formant_qfrency: Option<f32>,
    pub formant_timbre: Option<f32>,
    pub post_process: Option<bool>,
    pub post_effects: BTreeMap<PostEffectKind, PostEffect>,
    /// Поля, которые не удалось прочитать; попадают в отчёт `apply_to`
    pub decode_failures: Vec<StudioError>,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            version: PRESET_VERSION,
            pitch: None,
            index_rate: None,
            rms_mix_rate: None,
            protect: None,
            f0_method: None,
            export_format: None,
            embedder_model: None,
            split_audio: None,
            f0_autotune: None,
            f0_autotune_strength: None,
            clean_audio: None,
            clean_strength: None,
            formant_shifting: None,
            formant_qfrency: None,
            formant_timbre: None,
            post_process: None,
            post_effects: BTreeMap::new(),
            decode_failures: Vec::new(),
        }
    }
}

/// Забрать поле из JSON-объекта. `null` считается отсутствием поля,
/// неверный тип записывается в `invalid`.
fn take<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    key: &str,
    invalid: &mut Vec<StudioError>,
) -> Option<T> {
    let value = map.remove(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Preset field '{}' has the wrong type: {}", key, e);
            invalid.push(StudioError::apply(key, format!("wrong type: {}", e)));
            None
        }
    }
}

impl From<Map<String, Value>> for Preset {
    fn from(mut map: Map<String, Value>) -> Self {
        let mut invalid = Vec::new();
        let map = &mut map;

        macro_rules! fields {
            ($($field:ident),* $(,)?) => {
                Preset {
                    version: take(map, "version", &mut invalid).unwrap_or(PRESET_VERSION),
                    $($field: take(map, stringify!($field), &mut invalid),)*
                    post_effects: BTreeMap::new(),
                    decode_failures: Vec::new(),
                }
            };
        }

        let mut preset = fields!(
            pitch,
            index_rate,
            rms_mix_rate,
            protect,
            f0_method,
            export_format,
            embedder_model,
            split_audio,
            f0_autotune,
            f0_autotune_strength,
            clean_audio,
            clean_strength,
            formant_shifting,
            formant_qfrency,
            formant_timbre,
            post_process,
        );

        for kind in PostEffectKind::ALL {
            let enabled: Option<bool> = take(map, kind.id(), &mut invalid);
            let mut effect = PostEffect { enabled: enabled.unwrap_or(false), ..Default::default() };
            for spec in kind.params() {
                let key = format!("{}_{}", kind.id(), spec.id);
                if let Some(value) = take::<f32>(map, &key, &mut invalid) {
                    effect.params.insert(spec.id.to_string(), value);
                }
            }
            if enabled.is_some() || !effect.params.is_empty() {
                preset.post_effects.insert(kind, effect);
            }
        }

        preset.decode_failures = invalid;
        preset
    }
}

impl Serialize for Preset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let preset = self;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("version", &preset.version)?;

        macro_rules! optional {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = &preset.$field {
                        map.serialize_entry(stringify!($field), value)?;
                    }
                )*
            };
        }
        optional!(
            pitch,
            index_rate,
            rms_mix_rate,
            protect,
            f0_method,
            export_format,
            embedder_model,
            split_audio,
            f0_autotune,
            f0_autotune_strength,
            clean_audio,
            clean_strength,
            formant_shifting,
            formant_qfrency,
            formant_timbre,
            post_process,
        );

        for (kind, effect) in &preset.post_effects {
            map.serialize_entry(kind.id(), &effect.enabled)?;
            for (param, value) in &effect.params {
                map.serialize_entry(&format!("{}_{}", kind.id(), param), value)?;
            }
        }
        map.end()
    }
}

/// Итог применения пресета к живым настройкам
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Поля, применённые успешно
    pub applied: Vec<&'static str>,
    /// Ошибки по отдельным полям (`StudioError::Apply`)
    pub failures: Vec<StudioError>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn checked(field: &str, value: f32, range: ParameterRange) -> Result<f32> {
    if !value.is_finite() {
        return Err(StudioError::apply(field, format!("value {} is not a number", value)));
    }
    if !range.contains(value) {
        return Err(StudioError::apply(
            field,
            format!("value {} is outside [{}, {}]", value, range.min, range.max),
        ));
    }
    Ok(value)
}

impl Preset {
    /// Снимок живых настроек. Путь пользовательского эмбеддера не
    /// сохраняется, только сам выбор `custom`.
    pub fn from_settings(settings: &InferenceSettings) -> Self {
        let effects = &settings.effects;
        Self {
            version: PRESET_VERSION,
            pitch: Some(settings.params.pitch as f32),
            index_rate: Some(settings.params.index_rate),
            rms_mix_rate: Some(settings.params.rms_mix_rate),
            protect: Some(settings.params.protect),
            f0_method: Some(settings.f0_method.as_str().to_string()),
            export_format: Some(settings.export_format.as_str().to_string()),
            embedder_model: Some(settings.embedder.as_str().to_string()),
            split_audio: Some(effects.split.enabled),
            f0_autotune: Some(effects.autotune.enabled),
            f0_autotune_strength: Some(effects.autotune.strength),
            clean_audio: Some(effects.clean.enabled),
            clean_strength: Some(effects.clean.strength),
            formant_shifting: Some(effects.formant.enabled),
            formant_qfrency: Some(effects.formant.quefrency),
            formant_timbre: Some(effects.formant.timbre),
            post_process: Some(effects.post.enabled),
            post_effects: effects.post.effects.clone(),
            decode_failures: Vec::new(),
        }
    }

    /// Применить пресет поле за полем.
    ///
    /// Ошибка в одном поле не откатывает уже применённые и не мешает
    /// применить остальные; все ошибки собираются в отчёт.
    pub fn apply_to(&self, settings: &mut InferenceSettings) -> ApplyReport {
        if self.version > PRESET_VERSION {
            log::warn!(
                "Preset schema version {} is newer than supported {}, applying known fields",
                self.version,
                PRESET_VERSION
            );
        }

        let mut report = ApplyReport::default();
        report.failures.extend(self.decode_failures.iter().cloned());
        let mut record = |field: &'static str, result: Result<()>| match result {
            Ok(()) => report.applied.push(field),
            Err(err) => {
                log::warn!("{}", err);
                report.failures.push(err);
            }
        };

        if let Some(pitch) = self.pitch {
            record(
                "pitch",
                checked("pitch", pitch, ConversionParams::PITCH).map(|v| {
                    settings.params.pitch = v.round() as i32;
                }),
            );
        }
        if let Some(value) = self.index_rate {
            record(
                "index_rate",
                checked("index_rate", value, ConversionParams::INDEX_RATE)
                    .map(|v| settings.params.index_rate = v),
            );
        }
        if let Some(value) = self.rms_mix_rate {
            record(
                "rms_mix_rate",
                checked("rms_mix_rate", value, ConversionParams::RMS_MIX_RATE)
                    .map(|v| settings.params.rms_mix_rate = v),
            );
        }
        if let Some(value) = self.protect {
            record(
                "protect",
                checked("protect", value, ConversionParams::PROTECT).map(|v| settings.params.protect = v),
            );
        }
        if let Some(name) = &self.f0_method {
            record(
                "f0_method",
                name.parse::<F0Method>()
                    .map_err(|e| StudioError::apply("f0_method", e.to_string()))
                    .map(|m| settings.f0_method = m),
            );
        }
        if let Some(name) = &self.export_format {
            record(
                "export_format",
                name.parse::<ExportFormat>()
                    .map_err(|e| StudioError::apply("export_format", e.to_string()))
                    .map(|f| settings.export_format = f),
            );
        }
        if let Some(name) = &self.embedder_model {
            // Путь пользовательского эмбеддера берётся из текущих настроек
            let current_custom = match &settings.embedder {
                EmbedderModel::Custom(path) => Some(path.clone()),
                _ => None,
            };
            record(
                "embedder_model",
                EmbedderModel::parse(name, current_custom.as_deref())
                    .map_err(|e| StudioError::apply("embedder_model", e.to_string()))
                    .map(|m| settings.embedder = m),
            );
        }

        let effects = &mut settings.effects;
        if let Some(enabled) = self.split_audio {
            effects.split.enabled = enabled;
            record("split_audio", Ok(()));
        }
        if let Some(enabled) = self.f0_autotune {
            effects.autotune.enabled = enabled;
            record("f0_autotune", Ok(()));
        }
        if let Some(value) = self.f0_autotune_strength {
            record(
                "f0_autotune_strength",
                checked("f0_autotune_strength", value, AutotuneStage::STRENGTH)
                    .map(|v| effects.autotune.strength = v),
            );
        }
        if let Some(enabled) = self.clean_audio {
            effects.clean.enabled = enabled;
            record("clean_audio", Ok(()));
        }
        if let Some(value) = self.clean_strength {
            record(
                "clean_strength",
                checked("clean_strength", value, CleanStage::STRENGTH).map(|v| effects.clean.strength = v),
            );
        }
        if let Some(enabled) = self.formant_shifting {
            effects.formant.enabled = enabled;
            record("formant_shifting", Ok(()));
        }
        if let Some(value) = self.formant_qfrency {
            record(
                "formant_qfrency",
                checked("formant_qfrency", value, FormantStage::QUEFRENCY)
                    .map(|v| effects.formant.quefrency = v),
            );
        }
        if let Some(value) = self.formant_timbre {
            record(
                "formant_timbre",
                checked("formant_timbre", value, FormantStage::TIMBRE).map(|v| effects.formant.timbre = v),
            );
        }

        if let Some(enabled) = self.post_process {
            effects.post.enabled = enabled;
            record("post_process", Ok(()));
        }
        for (&kind, effect) in &self.post_effects {
            // Эффект применяется целиком или не применяется совсем
            let check = effect.params.iter().try_for_each(|(param, &value)| {
                let field = format!("{}_{}", kind.id(), param);
                let spec = kind
                    .spec(param)
                    .ok_or_else(|| StudioError::apply(field.as_str(), "unknown parameter"))?;
                checked(&field, value, spec.range).map(|_| ())
            });
            record(
                kind.id(),
                check.map(|()| {
                    let target = effects.post.effects.entry(kind).or_default();
                    target.enabled = effect.enabled;
                    target.params.extend(effect.params.clone());
                }),
            );
        }

        report
    }
}
