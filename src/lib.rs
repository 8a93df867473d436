//! Основной файл библиотеки rvc-studio
//!
//! Ядро оркестрации для конвертации голоса и синтеза речи: пресеты,
//! каталог моделей, цепочка эффектов, задачи конвертации с единственной
//! активной задачей на процесс и пакетная установка моделей.
//! Нейросетевой инференс, TTS-движок и кодеки подключаются через трейты
//! модуля `backend`.

pub mod audio;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod effects;
pub mod error;
pub mod install;
pub mod job;
pub mod notification;
pub mod preset;
pub mod progress;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

pub use crate::backend::{Backends, ModelBackend};
pub use crate::catalog::{ModelCatalog, ModelEntry};
pub use crate::config::{EmbedderModel, ExportFormat, F0Method, StudioConfig};
pub use crate::effects::{ClampWarning, EffectChain, EffectConfig, FormantPresetStore};
pub use crate::error::{Result, StudioError};
pub use crate::install::{DropInstaller, DropReport};
pub use crate::job::{ConversionParams, InputSource, JobRequest, JobState, JobSupervisor};
pub use crate::notification::JobObserver;
pub use crate::preset::{ApplyReport, InferenceSettings, Preset, PresetStore};
pub use crate::progress::{JobEvent, JobEventKind, ProgressInfo};

use crate::notification::LoggingObserver;

/// Основная структура для работы с библиотекой
pub struct Studio {
    /// Конфигурация библиотеки
    config: StudioConfig,
    presets: PresetStore,
    formant_presets: FormantPresetStore,
    catalog: ModelCatalog,
    supervisor: JobSupervisor,
    /// Живые настройки инференса
    settings: InferenceSettings,
}

impl Studio {
    /// Создать экземпляр: создать каталоги, просканировать модели и
    /// подключить супервизор к флагу перехода каталога
    pub fn new(
        config: StudioConfig,
        backends: Backends,
        model_backend: Arc<dyn ModelBackend>,
    ) -> Result<Self> {
        config.ensure_dirs()?;

        let mut catalog = ModelCatalog::new(&config.models_dir, model_backend);
        catalog.refresh()?;

        let supervisor = JobSupervisor::with_config(backends, &config);
        supervisor.guard_catalog(catalog.transition_flag());
        supervisor.add_observer(Box::new(LoggingObserver::new()));

        let mut settings = InferenceSettings {
            f0_method: config.default_f0_method,
            embedder: config.default_embedder.clone(),
            ..Default::default()
        };
        settings.params.hop_length = config.hop_length;

        Ok(Self {
            presets: PresetStore::new(&config.presets_dir),
            formant_presets: FormantPresetStore::new(&config.formant_presets_dir),
            config,
            catalog,
            supervisor,
            settings,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn formant_presets(&self) -> &FormantPresetStore {
        &self.formant_presets
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn supervisor(&self) -> &JobSupervisor {
        &self.supervisor
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut InferenceSettings {
        &mut self.settings
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.supervisor.status().is_active() {
            Err(StudioError::AlreadyRunning)
        } else {
            Ok(())
        }
    }

    pub fn refresh_models(&mut self) -> Result<usize> {
        self.catalog.refresh()
    }

    /// Загрузить модель. Пока задача активна, модель не меняется.
    pub fn load_model(&mut self, id: &str) -> Result<()> {
        self.ensure_idle()?;
        self.catalog.load(id)
    }

    pub fn unload_model(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.catalog.unload()
    }

    /// Установить перетащенные файлы моделей
    pub fn install_dropped<I, P>(&mut self, paths: I) -> DropReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        DropInstaller::install_all(&mut self.catalog, paths)
    }

    /// Сохранить текущие настройки как пресет
    pub fn save_preset(&self, name: &str, overwrite: bool) -> Result<()> {
        self.presets.save(name, &Preset::from_settings(&self.settings), overwrite)
    }

    /// Загрузить пресет и применить его к текущим настройкам
    pub fn load_preset(&mut self, name: &str) -> Result<ApplyReport> {
        let preset = self.presets.load(name)?;
        Ok(preset.apply_to(&mut self.settings))
    }

    /// Применить пресет сдвига формант; пустое имя возвращает значения по
    /// умолчанию. Ступень formant-shift при этом включается.
    pub fn apply_formant_preset(&mut self, name: &str) -> Result<Vec<ClampWarning>> {
        let preset = self.formant_presets.load(name)?;
        let warnings = preset.apply_to(&mut self.settings.effects.formant);
        for warning in &warnings {
            log::warn!("Formant preset '{}': {}", name, warning);
        }
        Ok(warnings)
    }

    /// Запустить задачу с активной моделью и текущими настройками.
    /// Для `InputSource::Folder` `output` — папка результатов, а
    /// `f0_override` — папка с файлами F0 по именам входных файлов.
    pub fn start_job(
        &self,
        input: InputSource,
        output: impl Into<PathBuf>,
        f0_override: Option<PathBuf>,
    ) -> Result<Uuid> {
        let model = self
            .catalog
            .active()
            .cloned()
            .ok_or_else(|| StudioError::Validation("No voice model loaded".to_string()))?;
        self.config.check_format(self.settings.export_format)?;

        let mut builder = JobRequest::builder()
            .input(input)
            .model(model)
            .settings(&self.settings)
            .output(output);
        if let Some(path) = f0_override {
            builder = builder.f0_override(path);
        }

        self.supervisor.start(builder.build()?)
    }

    pub fn cancel_job(&self) -> bool {
        self.supervisor.cancel()
    }
}
