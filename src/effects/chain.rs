use std::fmt;
use std::sync::Arc;

use crate::backend::{AudioBuffer, AudioEffectsBackend};
use crate::error::Result;

use super::{ClampWarning, EffectConfig, PostEffectKind};

/// Ступени цепочки в порядке выполнения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectStage {
    Split,
    Autotune,
    Clean,
    FormantShift,
    /// Эффект постобработки; выполняется после всех основных ступеней
    Post(PostEffectKind),
}

impl EffectStage {
    pub const ORDER: [EffectStage; 14] = [
        Self::Split,
        Self::Autotune,
        Self::Clean,
        Self::FormantShift,
        Self::Post(PostEffectKind::Reverb),
        Self::Post(PostEffectKind::PitchShift),
        Self::Post(PostEffectKind::Limiter),
        Self::Post(PostEffectKind::Gain),
        Self::Post(PostEffectKind::Distortion),
        Self::Post(PostEffectKind::Chorus),
        Self::Post(PostEffectKind::Bitcrush),
        Self::Post(PostEffectKind::Clipping),
        Self::Post(PostEffectKind::Compressor),
        Self::Post(PostEffectKind::Delay),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Autotune => "autotune",
            Self::Clean => "clean",
            Self::FormantShift => "formant-shift",
            Self::Post(kind) => kind.id(),
        }
    }

    fn is_enabled(&self, config: &EffectConfig) -> bool {
        match self {
            Self::Split => config.split.enabled,
            Self::Autotune => config.autotune.enabled,
            Self::Clean => config.clean.enabled,
            Self::FormantShift => config.formant.enabled,
            Self::Post(kind) => config.post.is_enabled(*kind),
        }
    }
}

impl fmt::Display for EffectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Цепочка постобработки. Сам DSP выполняет бэкенд; цепочка отвечает
/// за порядок, включение ступеней и нормализацию параметров.
#[derive(Clone)]
pub struct EffectChain {
    backend: Arc<dyn AudioEffectsBackend>,
}

impl EffectChain {
    pub fn new(backend: Arc<dyn AudioEffectsBackend>) -> Self {
        Self { backend }
    }

    /// Нормализовать конфигурацию и вернуть предупреждения о поправленных полях
    pub fn validate(config: &EffectConfig) -> (EffectConfig, Vec<ClampWarning>) {
        let (normalized, warnings) = config.normalized();
        for warning in &warnings {
            log::warn!("Effect parameter {}", warning);
        }
        (normalized, warnings)
    }

    /// Выполнить включённые ступени по порядку
    pub fn apply(&self, audio: AudioBuffer, config: &EffectConfig) -> Result<AudioBuffer> {
        self.apply_with(audio, config, |_| Ok(()))
    }

    /// Как `apply`, но перед каждой включённой ступенью вызывает `before_stage`.
    /// Ошибка из `before_stage` прерывает цепочку (так работает отмена задачи).
    pub fn apply_with<F>(
        &self,
        audio: AudioBuffer,
        config: &EffectConfig,
        mut before_stage: F,
    ) -> Result<AudioBuffer>
    where
        F: FnMut(EffectStage) -> Result<()>,
    {
        let (config, _) = Self::validate(config);
        let mut audio = audio;

        for stage in EffectStage::ORDER {
            if !stage.is_enabled(&config) {
                continue;
            }

            before_stage(stage)?;
            log::debug!("Applying effect stage '{}'", stage);

            audio = match stage {
                EffectStage::Split => self.backend.split_by_silence(audio)?,
                EffectStage::Autotune => self.backend.pitch_correct(audio, config.autotune.strength)?,
                EffectStage::Clean => self.backend.denoise(audio, config.clean.strength)?,
                EffectStage::FormantShift => self.backend.formant_shift(
                    audio,
                    config.formant.quefrency,
                    config.formant.timbre,
                )?,
                EffectStage::Post(kind) => match config.post.effect(kind) {
                    Some(effect) => self.backend.post_process(audio, kind, effect)?,
                    None => audio,
                },
            };
        }

        Ok(audio)
    }
}
