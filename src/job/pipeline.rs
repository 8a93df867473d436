use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::audio::read_f0_override;
use crate::backend::{AudioBuffer, Backends, F0Curve};
use crate::catalog::ModelEntry;
use crate::effects::{EffectChain, EffectStage};
use crate::error::{Result, StudioError};
use crate::progress::{JobPhase, ProgressTracker};

use super::request::{InputSource, JobRequest};

/// Сообщения рабочего потока задаче-ретранслятору
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerMessage {
    Progress { phase: JobPhase, percent: u8, message: String },
    Warning(String),
    Finishing,
}

/// Путь незавершённого экспорта: `<output>.partial`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Одна задача конвертации. Выполняется синхронно в отдельном потоке;
/// отмена проверяется на границах этапов и между ступенями эффектов.
pub struct ConversionJob {
    request: Arc<JobRequest>,
    backends: Backends,
    token: CancellationToken,
    cleanup_partial: bool,
}

impl ConversionJob {
    pub fn new(request: Arc<JobRequest>, backends: Backends, token: CancellationToken) -> Self {
        Self { request, backends, token, cleanup_partial: true }
    }

    pub fn with_partial_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup_partial = cleanup;
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(StudioError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn run(&self, tx: &UnboundedSender<WorkerMessage>) -> Result<PathBuf> {
        let request = &self.request;
        log::info!("Starting conversion job {}", request.id());

        if request.is_batch() {
            return self.run_batch(tx);
        }

        let mut progress = Reporter::new(tx, 1);
        let processed = self.process(request.input(), request.f0_override(), &mut progress)?;
        progress.finish_item();
        let _ = tx.send(WorkerMessage::Finishing);
        self.export(&processed, request.output())
    }

    /// Пакетная задача: файлы по очереди, ошибка одного файла становится
    /// предупреждением. Отмена прерывает пакет; уже записанные файлы остаются.
    fn run_batch(&self, tx: &UnboundedSender<WorkerMessage>) -> Result<PathBuf> {
        let items = self.request.batch_items();
        let output_dir = self.request.output();
        fs::create_dir_all(output_dir)?;

        let mut progress = Reporter::new(tx, items.len());
        let mut finishing = false;
        let mut converted = 0;
        let mut last_error = None;

        for (i, item) in items.iter().enumerate() {
            self.checkpoint()?;
            let name = item
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress.begin_item(i, &name);

            let input = InputSource::Audio { path: item.input.clone() };
            let result = self
                .process(&input, item.f0_override.as_deref(), &mut progress)
                .and_then(|audio| {
                    progress.finish_item();
                    if i + 1 == items.len() {
                        finishing = true;
                        let _ = tx.send(WorkerMessage::Finishing);
                    }
                    self.export(&audio, &item.output)
                });

            match result {
                Ok(_) => converted += 1,
                Err(StudioError::Cancelled) => return Err(StudioError::Cancelled),
                Err(e) => {
                    progress.warn(format!("Failed to convert {}: {}", name, e));
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error.filter(|_| converted == 0) {
            return Err(e);
        }
        if !finishing {
            let _ = tx.send(WorkerMessage::Finishing);
        }
        log::info!(
            "Batch finished: {} of {} file(s) saved to {}",
            converted,
            items.len(),
            output_dir.display()
        );
        Ok(output_dir.to_path_buf())
    }

    /// Все этапы до экспорта для одного входа
    fn process(
        &self,
        input: &InputSource,
        f0_override: Option<&Path>,
        progress: &mut Reporter<'_>,
    ) -> Result<AudioBuffer> {
        let request = &self.request;

        self.checkpoint()?;
        progress.report(JobPhase::PreparingInput, 0.0, "Preparing input");
        let audio = self.prepare_input(input)?;
        progress.report(JobPhase::PreparingInput, 100.0, "Input ready");

        self.checkpoint()?;
        progress.report(JobPhase::PitchExtraction, 0.0, "Extracting pitch");
        let f0 = match f0_override {
            Some(path) => match read_f0_override(path)? {
                Some(curve) => {
                    log::info!("Using F0 override from {}", path.display());
                    curve
                }
                None => {
                    progress.warn(format!(
                        "F0 file not found: {}; estimating pitch instead",
                        path.display()
                    ));
                    self.estimate_pitch(&audio)?
                }
            },
            None => self.estimate_pitch(&audio)?,
        };
        progress.report(JobPhase::PitchExtraction, 100.0, "Pitch ready");

        self.checkpoint()?;
        progress.report(JobPhase::Embedding, 0.0, "Embedding voice");
        let embedding = self.backends.embedder.embed(&audio, request.embedder())?;
        progress.report(JobPhase::Embedding, 100.0, "Embedding ready");

        self.checkpoint()?;
        progress.report(JobPhase::Conversion, 0.0, "Converting voice");
        let mut model: ModelEntry = request.model().clone();
        if let Some(index) = &model.index {
            if !index.exists() {
                progress.warn(format!(
                    "Index file not found: {}; converting without index",
                    index.display()
                ));
                model.index = None;
            }
        }
        let converted = self
            .backends
            .converter
            .run(&embedding, &f0, &model, request.params())?;
        progress.report(JobPhase::Conversion, 100.0, "Conversion done");

        self.checkpoint()?;
        progress.report(JobPhase::Effects, 0.0, "Applying effects");
        let chain = EffectChain::new(self.backends.effects.clone());
        let processed = chain.apply_with(converted, request.effects(), |stage| {
            self.checkpoint()?;
            let position = EffectStage::ORDER.iter().position(|s| *s == stage).unwrap_or(0);
            let share = position as f32 * 100.0 / EffectStage::ORDER.len() as f32;
            progress.report(JobPhase::Effects, share, stage.as_str());
            Ok(())
        })?;

        self.checkpoint()?;
        Ok(processed)
    }

    fn prepare_input(&self, input: &InputSource) -> Result<AudioBuffer> {
        let audio = match input {
            InputSource::Audio { path } => self.backends.audio_io.read(path)?,
            InputSource::Text { text, voice, rate } => {
                let tts = self.backends.tts.as_ref().ok_or_else(|| {
                    StudioError::Configuration("No TTS backend configured".to_string())
                })?;
                log::info!("Synthesizing {} characters with voice '{}'", text.len(), voice);
                tts.synthesize(text, voice, *rate)?
            }
            InputSource::Folder { dir } => {
                return Err(StudioError::Validation(format!(
                    "Folder {} must be expanded into batch items",
                    dir.display()
                )))
            }
        };

        if audio.is_empty() {
            return Err(StudioError::Validation("Input audio is empty".to_string()));
        }
        Ok(audio)
    }

    fn estimate_pitch(&self, audio: &AudioBuffer) -> Result<F0Curve> {
        let params = self.request.params();
        self.backends
            .pitch
            .estimate(audio, self.request.f0_method(), params.hop_length)
    }

    /// Экспорт через `<output>.partial` с переименованием в конце, чтобы
    /// под итоговым именем никогда не лежал недописанный файл
    fn export(&self, audio: &AudioBuffer, output: &Path) -> Result<PathBuf> {
        let output = output.to_path_buf();
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(&output);
        let result = self
            .backends
            .audio_io
            .write(audio, &partial, self.request.export_format())
            .and_then(|_| self.checkpoint())
            .and_then(|_| fs::rename(&partial, &output).map_err(StudioError::from));

        match result {
            Ok(()) => {
                log::info!("Output saved to: {}", output.display());
                Ok(output)
            }
            Err(e) => {
                if self.cleanup_partial {
                    remove_quietly(&partial);
                }
                Err(e)
            }
        }
    }
}

/// Прогресс задачи для наблюдателей. В пакете общий процент считается
/// по файлам: `(номер * 100 + процент файла) / число файлов`.
struct Reporter<'a> {
    tx: &'a UnboundedSender<WorkerMessage>,
    tracker: ProgressTracker,
    item: usize,
    total: usize,
    label: Option<String>,
    last_percent: u8,
}

impl<'a> Reporter<'a> {
    fn new(tx: &'a UnboundedSender<WorkerMessage>, total: usize) -> Self {
        Self {
            tx,
            tracker: ProgressTracker::new(),
            item: 0,
            total: total.max(1),
            label: None,
            last_percent: 0,
        }
    }

    fn begin_item(&mut self, index: usize, name: &str) {
        self.tracker = ProgressTracker::new();
        self.item = index;
        self.label = Some(format!("[{}/{}] {}", index + 1, self.total, name));
    }

    fn overall(&mut self, item_percent: u8) -> u8 {
        let percent = (self.item * 100 + item_percent as usize) / self.total;
        self.last_percent = self.last_percent.max(percent.min(100) as u8);
        self.last_percent
    }

    fn report(&mut self, phase: JobPhase, progress: f32, message: &str) {
        self.tracker.set_phase(phase);
        let item_percent = self.tracker.update_phase_progress(progress);
        let percent = self.overall(item_percent);
        let message = match &self.label {
            Some(label) => format!("Processing... {}% ({}: {})", percent, label, message),
            None => format!("Processing... {}% ({})", percent, message),
        };
        let _ = self.tx.send(WorkerMessage::Progress { phase, percent, message });
    }

    fn finish_item(&mut self) {
        let item_percent = self.tracker.complete();
        let percent = self.overall(item_percent);
        let message = match &self.label {
            Some(label) => format!("Processing... {}% ({})", percent, label),
            None => format!("Processing... {}%", percent),
        };
        let _ = self.tx.send(WorkerMessage::Progress { phase: JobPhase::Effects, percent, message });
    }

    fn warn(&self, message: String) {
        log::warn!("{}", message);
        let _ = self.tx.send(WorkerMessage::Warning(message));
    }
}

/// Удалить результат, который нельзя считать успешным экспортом
pub(crate) fn discard_output(output: &Path) {
    remove_quietly(output);
    remove_quietly(&partial_path(output));
}
