//! Модуль для отслеживания прогресса выполнения задачи
//!
//! Этот модуль описывает этапы задачи конвертации, типизированные события,
//! которые получают наблюдатели, и трекер, превращающий прогресс этапов в
//! монотонный общий процент 0–100.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::error::StudioError;

/// Этапы задачи конвертации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Чтение входного аудио или синтез речи
    PreparingInput,
    /// Извлечение или загрузка кривой F0
    PitchExtraction,
    /// Эмбеддинг голоса
    Embedding,
    /// Конвертация голоса моделью
    Conversion,
    /// Цепочка постобработки
    Effects,
    /// Экспорт и сброс на диск (без процента)
    Finishing,
}

impl JobPhase {
    /// Этапы, для которых считается процент, в порядке выполнения
    pub const WEIGHTED: [JobPhase; 5] = [
        Self::PreparingInput,
        Self::PitchExtraction,
        Self::Embedding,
        Self::Conversion,
        Self::Effects,
    ];

    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreparingInput => "preparing_input",
            Self::PitchExtraction => "pitch_extraction",
            Self::Embedding => "embedding",
            Self::Conversion => "conversion",
            Self::Effects => "effects",
            Self::Finishing => "finishing",
        }
    }

    /// Получить весовой коэффициент этапа (в процентах от общего процесса)
    pub fn weight(&self) -> f32 {
        match self {
            Self::PreparingInput => 5.0,
            Self::PitchExtraction => 15.0,
            Self::Embedding => 15.0,
            Self::Conversion => 45.0,
            Self::Effects => 20.0,
            Self::Finishing => 0.0,
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Содержимое события задачи
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEventKind {
    Started,
    Progress {
        phase: JobPhase,
        percent: u8,
        message: String,
    },
    /// Нефатальное предупреждение, задача продолжается
    Warning { message: String },
    Finishing,
    Completed { output: PathBuf },
    Failed { error: StudioError },
}

/// Событие задачи, адресованное слою представления
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn new(job_id: Uuid, kind: JobEventKind) -> Self {
        Self { job_id, kind }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            JobEventKind::Completed { .. } | JobEventKind::Failed { .. }
        )
    }

    /// Представить событие в плоском виде `{phase, percent?, message}`
    pub fn info(&self) -> ProgressInfo {
        match &self.kind {
            JobEventKind::Started => ProgressInfo::new("started", Some(0), "Job started"),
            JobEventKind::Progress { phase, percent, message } => {
                ProgressInfo::new(phase.as_str(), Some(*percent), message.clone())
            }
            JobEventKind::Warning { message } => {
                ProgressInfo::new("warning", None, format!("Warning: {}", message))
            }
            JobEventKind::Finishing => {
                ProgressInfo::new(JobPhase::Finishing.as_str(), None, "Finishing...")
            }
            JobEventKind::Completed { output } => ProgressInfo::new(
                "completed",
                Some(100),
                format!("Output saved to: {}", output.display()),
            ),
            JobEventKind::Failed { error } => ProgressInfo::new("failed", None, error.to_string()),
        }
    }
}

/// Информация о прогрессе в плоском виде
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressInfo {
    pub phase: String,
    pub percent: Option<u8>,
    pub message: String,
}

impl ProgressInfo {
    pub fn new(phase: impl Into<String>, percent: Option<u8>, message: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            percent: percent.map(|p| p.min(100)),
            message: message.into(),
        }
    }
}

/// Трекер прогресса задачи.
///
/// Общий процент вычисляется по весам этапов и никогда не уменьшается,
/// даже если бэкенд сообщает прогресс этапа не по порядку.
#[derive(Debug)]
pub struct ProgressTracker {
    /// Текущий этап
    current_phase: JobPhase,
    /// Прогресс текущего этапа (0.0 - 100.0)
    phase_progress: f32,
    /// Завершенные этапы
    completed: HashMap<JobPhase, f32>,
    /// Последний отданный общий процент
    last_percent: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            current_phase: JobPhase::PreparingInput,
            phase_progress: 0.0,
            completed: HashMap::new(),
            last_percent: 0,
        }
    }

    pub fn current_phase(&self) -> JobPhase {
        self.current_phase
    }

    pub fn percent(&self) -> u8 {
        self.last_percent
    }

    /// Перейти к этапу; предыдущий этап считается завершённым на 100%
    pub fn set_phase(&mut self, phase: JobPhase) -> u8 {
        if self.current_phase != phase {
            self.completed.insert(self.current_phase, 100.0);
            self.current_phase = phase;
            self.phase_progress = 0.0;
        }
        self.recompute()
    }

    /// Обновить прогресс текущего этапа
    pub fn update_phase_progress(&mut self, progress: f32) -> u8 {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 100.0) };
        self.phase_progress = self.phase_progress.max(progress);
        self.recompute()
    }

    /// Отметить все взвешенные этапы завершёнными
    pub fn complete(&mut self) -> u8 {
        for phase in JobPhase::WEIGHTED {
            self.completed.insert(phase, 100.0);
        }
        self.phase_progress = 100.0;
        self.recompute()
    }

    fn recompute(&mut self) -> u8 {
        let total_weight: f32 = JobPhase::WEIGHTED.iter().map(|p| p.weight()).sum();

        let mut done: f32 = self
            .completed
            .iter()
            .filter(|(phase, _)| **phase != self.current_phase)
            .map(|(phase, progress)| phase.weight() * progress / 100.0)
            .sum();
        done += self.current_phase.weight() * self.phase_progress / 100.0;

        let percent = (done / total_weight * 100.0).round().clamp(0.0, 100.0) as u8;
        self.last_percent = self.last_percent.max(percent);
        self.last_percent
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
