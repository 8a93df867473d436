//! Эффекты постобработки
//!
//! Каждый эффект описан таблицей параметров с диапазонами и значениями по
//! умолчанию. Цепочка применяет включённые эффекты в порядке
//! `PostEffectKind::ALL` после основных ступеней; DSP выполняет бэкенд.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ClampWarning, ParameterRange};

/// Описание числового параметра эффекта
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub id: &'static str,
    pub range: ParameterRange,
    pub default: f32,
}

const fn spec(id: &'static str, min: f32, max: f32, default: f32) -> ParameterSpec {
    ParameterSpec { id, range: ParameterRange::new(min, max), default }
}

const REVERB_PARAMS: [ParameterSpec; 6] = [
    spec("room_size", 0.0, 1.0, 0.5),
    spec("damping", 0.0, 1.0, 0.5),
    spec("wet_gain", 0.0, 1.0, 0.33),
    spec("dry_gain", 0.0, 1.0, 0.4),
    spec("width", 0.0, 1.0, 1.0),
    spec("freeze_mode", 0.0, 1.0, 0.0),
];
const PITCH_SHIFT_PARAMS: [ParameterSpec; 1] = [spec("semitones", -24.0, 24.0, 0.0)];
const LIMITER_PARAMS: [ParameterSpec; 2] = [
    spec("threshold", -60.0, 0.0, -6.0),
    spec("release_time", 0.01, 1.0, 0.05),
];
const GAIN_PARAMS: [ParameterSpec; 1] = [spec("db", -60.0, 60.0, 0.0)];
const DISTORTION_PARAMS: [ParameterSpec; 1] = [spec("gain", 0.0, 100.0, 25.0)];
const CHORUS_PARAMS: [ParameterSpec; 5] = [
    spec("rate", 0.1, 10.0, 1.0),
    spec("depth", 0.0, 1.0, 0.25),
    spec("center_delay", 1.0, 20.0, 7.0),
    spec("feedback", 0.0, 1.0, 0.0),
    spec("mix", 0.0, 1.0, 0.5),
];
const BITCRUSH_PARAMS: [ParameterSpec; 1] = [spec("bit_depth", 1.0, 16.0, 8.0)];
const CLIPPING_PARAMS: [ParameterSpec; 1] = [spec("threshold", -60.0, 0.0, -6.0)];
const COMPRESSOR_PARAMS: [ParameterSpec; 4] = [
    spec("threshold", -60.0, 0.0, 0.0),
    spec("ratio", 1.0, 20.0, 1.0),
    spec("attack", 0.1, 100.0, 1.0),
    spec("release", 1.0, 1000.0, 100.0),
];
const DELAY_PARAMS: [ParameterSpec; 3] = [
    spec("seconds", 0.01, 5.0, 0.5),
    spec("feedback", 0.0, 1.0, 0.0),
    spec("mix", 0.0, 1.0, 0.5),
];

/// Вид эффекта постобработки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostEffectKind {
    Reverb,
    PitchShift,
    Limiter,
    Gain,
    Distortion,
    Chorus,
    Bitcrush,
    Clipping,
    Compressor,
    Delay,
}

impl PostEffectKind {
    /// Порядок применения
    pub const ALL: [PostEffectKind; 10] = [
        Self::Reverb,
        Self::PitchShift,
        Self::Limiter,
        Self::Gain,
        Self::Distortion,
        Self::Chorus,
        Self::Bitcrush,
        Self::Clipping,
        Self::Compressor,
        Self::Delay,
    ];

    /// Ключ эффекта в пресетах; параметры хранятся как `<ключ>_<параметр>`
    pub fn id(self) -> &'static str {
        match self {
            Self::Reverb => "reverb",
            Self::PitchShift => "pitch_shift",
            Self::Limiter => "limiter",
            Self::Gain => "gain",
            Self::Distortion => "distortion",
            Self::Chorus => "chorus",
            Self::Bitcrush => "bitcrush",
            Self::Clipping => "clipping",
            Self::Compressor => "compressor",
            Self::Delay => "delay",
        }
    }

    pub fn params(self) -> &'static [ParameterSpec] {
        match self {
            Self::Reverb => &REVERB_PARAMS,
            Self::PitchShift => &PITCH_SHIFT_PARAMS,
            Self::Limiter => &LIMITER_PARAMS,
            Self::Gain => &GAIN_PARAMS,
            Self::Distortion => &DISTORTION_PARAMS,
            Self::Chorus => &CHORUS_PARAMS,
            Self::Bitcrush => &BITCRUSH_PARAMS,
            Self::Clipping => &CLIPPING_PARAMS,
            Self::Compressor => &COMPRESSOR_PARAMS,
            Self::Delay => &DELAY_PARAMS,
        }
    }

    pub fn spec(self, param: &str) -> Option<&'static ParameterSpec> {
        self.params().iter().find(|s| s.id == param)
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }
}

impl fmt::Display for PostEffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Настройки одного эффекта. Отсутствующий параметр равен значению по умолчанию.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostEffect {
    pub enabled: bool,
    #[serde(flatten)]
    pub params: BTreeMap<String, f32>,
}

impl PostEffect {
    pub fn enabled() -> Self {
        Self { enabled: true, params: BTreeMap::new() }
    }

    pub fn with(mut self, param: &str, value: f32) -> Self {
        self.params.insert(param.to_string(), value);
        self
    }

    /// Значение параметра с учётом значения по умолчанию
    pub fn value(&self, kind: PostEffectKind, param: &str) -> f32 {
        self.params
            .get(param)
            .copied()
            .or_else(|| kind.spec(param).map(|s| s.default))
            .unwrap_or(0.0)
    }
}

/// Группа постобработки: общий выключатель и эффекты по видам
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcess {
    pub enabled: bool,
    pub effects: BTreeMap<PostEffectKind, PostEffect>,
}

impl PostProcess {
    pub fn effect(&self, kind: PostEffectKind) -> Option<&PostEffect> {
        self.effects.get(&kind)
    }

    pub fn set(&mut self, kind: PostEffectKind, effect: PostEffect) {
        self.effects.insert(kind, effect);
    }

    /// Эффект выполняется, только если включены и он, и вся группа
    pub fn is_enabled(&self, kind: PostEffectKind) -> bool {
        self.enabled && self.effect(kind).map(|e| e.enabled).unwrap_or(false)
    }

    pub fn any_enabled(&self) -> bool {
        PostEffectKind::ALL.into_iter().any(|k| self.is_enabled(k))
    }

    /// Прижать параметры к диапазонам и заполнить недостающие значениями по
    /// умолчанию. Неизвестные параметры отбрасываются.
    pub fn normalized(&self) -> (PostProcess, Vec<ClampWarning>) {
        let mut warnings = Vec::new();
        let mut effects = BTreeMap::new();

        for (&kind, effect) in &self.effects {
            for name in effect.params.keys().filter(|name| kind.spec(name).is_none()) {
                log::warn!("Unknown {} parameter '{}' ignored", kind, name);
            }

            let mut params = BTreeMap::new();
            for spec in kind.params() {
                let value = effect.params.get(spec.id).copied().unwrap_or(spec.default);
                let clamped = spec.range.clamp(value, spec.default);
                if clamped != value {
                    warnings.push(ClampWarning {
                        field: format!("post.{}.{}", kind, spec.id),
                        original: value,
                        clamped,
                    });
                }
                params.insert(spec.id.to_string(), clamped);
            }
            effects.insert(kind, PostEffect { enabled: effect.enabled, params });
        }

        (PostProcess { enabled: self.enabled, effects }, warnings)
    }
}
