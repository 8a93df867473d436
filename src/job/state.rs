use std::path::PathBuf;

use serde::Serialize;

use crate::error::StudioError;
use crate::progress::JobPhase;

/// Состояние супервизора задач
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Running { progress: u8, phase: JobPhase },
    /// Экспорт и сброс на диск
    Finishing,
    Completed { output: PathBuf },
    Failed { error: StudioError },
}

impl JobState {
    /// Задача выполняется или завершает экспорт
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Finishing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Можно ли запустить новую задачу из этого состояния
    pub fn accepts_start(&self) -> bool {
        !self.is_active()
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::Running { progress, .. } => Some(*progress),
            Self::Completed { .. } => Some(100),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Finishing => "finishing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}
