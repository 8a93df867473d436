//! Цепочка постобработки
//!
//! Конфигурация ступеней (`EffectConfig`) с ограниченными параметрами и
//! `EffectChain`, которая нормализует параметры и вызывает ступени в
//! фиксированном порядке: split → pitch-correct → clean → formant-shift,
//! затем включённые эффекты постобработки.

mod chain;
mod formant;
mod post;

pub use chain::{EffectChain, EffectStage};
pub use formant::{FormantPreset, FormantPresetStore};
pub use post::{ParameterSpec, PostEffect, PostEffectKind, PostProcess};

use serde::{Deserialize, Serialize};

/// Допустимый диапазон числового параметра
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
}

impl ParameterRange {
    pub const UNIT: ParameterRange = ParameterRange { min: 0.0, max: 1.0 };

    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Прижать значение к диапазону. NaN заменяется на `fallback`.
    pub fn clamp(&self, value: f32, fallback: f32) -> f32 {
        if value.is_nan() {
            fallback.clamp(self.min, self.max)
        } else {
            value.clamp(self.min, self.max)
        }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Предупреждение о поправленном параметре (не фатально)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClampWarning {
    /// Имя поля в виде `stage.parameter`
    pub field: String,
    pub original: f32,
    pub clamped: f32,
}

impl std::fmt::Display for ClampWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} clamped from {} to {}", self.field, self.original, self.clamped)
    }
}

/// Разбиение по тишине
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SplitStage {
    pub enabled: bool,
}

/// Автотюн
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutotuneStage {
    pub enabled: bool,
    pub strength: f32,
}

impl AutotuneStage {
    pub const STRENGTH: ParameterRange = ParameterRange::UNIT;
}

impl Default for AutotuneStage {
    fn default() -> Self {
        Self { enabled: false, strength: 1.0 }
    }
}

/// Шумоподавление
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanStage {
    pub enabled: bool,
    pub strength: f32,
}

impl CleanStage {
    pub const STRENGTH: ParameterRange = ParameterRange::UNIT;
}

impl Default for CleanStage {
    fn default() -> Self {
        Self { enabled: false, strength: 0.5 }
    }
}

/// Сдвиг формант
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormantStage {
    pub enabled: bool,
    pub quefrency: f32,
    pub timbre: f32,
}

impl FormantStage {
    pub const QUEFRENCY: ParameterRange = ParameterRange::UNIT;
    pub const TIMBRE: ParameterRange = ParameterRange::UNIT;
}

impl Default for FormantStage {
    fn default() -> Self {
        Self { enabled: false, quefrency: 1.0, timbre: 1.0 }
    }
}

/// Конфигурация цепочки. Порядок ступеней задан `EffectChain`,
/// а не порядком полей или вводом пользователя.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EffectConfig {
    pub split: SplitStage,
    pub autotune: AutotuneStage,
    pub clean: CleanStage,
    pub formant: FormantStage,
    pub post: PostProcess,
}

impl EffectConfig {
    /// Все ступени выключены
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn any_enabled(&self) -> bool {
        self.split.enabled
            || self.autotune.enabled
            || self.clean.enabled
            || self.formant.enabled
            || self.post.any_enabled()
    }

    /// Прижать все числовые параметры к их диапазонам.
    /// Выключенные ступени тоже проверяются.
    pub fn normalized(&self) -> (EffectConfig, Vec<ClampWarning>) {
        let defaults = EffectConfig::default();
        let (post, mut warnings) = self.post.normalized();
        let mut config = EffectConfig { post, ..self.clone() };

        let mut fix = |field: &str, value: &mut f32, range: ParameterRange, fallback: f32| {
            let clamped = range.clamp(*value, fallback);
            // NaN != NaN, поэтому сравнение ловит и его
            if clamped != *value {
                warnings.push(ClampWarning {
                    field: field.to_string(),
                    original: *value,
                    clamped,
                });
                *value = clamped;
            }
        };

        fix(
            "autotune.strength",
            &mut config.autotune.strength,
            AutotuneStage::STRENGTH,
            defaults.autotune.strength,
        );
        fix(
            "clean.strength",
            &mut config.clean.strength,
            CleanStage::STRENGTH,
            defaults.clean.strength,
        );
        fix(
            "formant.quefrency",
            &mut config.formant.quefrency,
            FormantStage::QUEFRENCY,
            defaults.formant.quefrency,
        );
        fix(
            "formant.timbre",
            &mut config.formant.timbre,
            FormantStage::TIMBRE,
            defaults.formant.timbre,
        );

        (config, warnings)
    }
}
