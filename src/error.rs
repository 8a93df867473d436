//! Модуль обработки ошибок библиотеки rvc-studio
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при работе библиотеки.
//! Ошибки клонируемы и сериализуемы: они хранятся внутри состояния задачи
//! и передаются наблюдателям в событиях.

use serde::Serialize;
use thiserror::Error;

/// Ошибки библиотеки rvc-studio
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum StudioError {
    /// Некорректный пользовательский ввод
    #[error("Validation error: {0}")]
    Validation(String),

    /// Перезапись без подтверждения
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Пресет, модель или файл не найдены
    #[error("Not found: {0}")]
    NotFound(String),

    /// Повреждённые сохранённые данные
    #[error("Decode error: {0}")]
    Decode(String),

    /// Установка из архива не реализована
    #[error("Archive installation is not supported yet: {0}")]
    ArchiveNotSupported(String),

    /// Неподдерживаемый тип файла
    #[error("Invalid file type: {0}")]
    InvalidType(String),

    /// Неподдерживаемый формат экспорта
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// Ошибка внешнего бэкенда (инференс, DSP, кодек)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Задача уже выполняется
    #[error("A conversion job is already running")]
    AlreadyRunning,

    /// Задача отменена пользователем
    #[error("Job cancelled")]
    Cancelled,

    /// Ошибка применения отдельного поля пресета
    #[error("Failed to apply '{field}': {message}")]
    Apply { field: String, message: String },

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl StudioError {
    /// Короткий стабильный тег ошибки для слоя представления
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Decode(_) => "decode",
            Self::ArchiveNotSupported(_) => "archive_not_supported",
            Self::InvalidType(_) => "invalid_type",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Backend(_) => "backend",
            Self::AlreadyRunning => "already_running",
            Self::Cancelled => "cancelled",
            Self::Apply { .. } => "apply",
            Self::Configuration(_) => "configuration",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Ошибка применения поля пресета
    pub fn apply(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// std::io::Error не реализует Clone, поэтому сохраняем только текст
impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        StudioError::Io(err.to_string())
    }
}

impl From<tempfile::PersistError> for StudioError {
    fn from(err: tempfile::PersistError) -> Self {
        StudioError::Io(err.error.to_string())
    }
}

impl From<walkdir::Error> for StudioError {
    fn from(err: walkdir::Error) -> Self {
        StudioError::Io(err.to_string())
    }
}

impl From<&str> for StudioError {
    fn from(s: &str) -> Self {
        StudioError::Other(s.to_string())
    }
}

impl From<String> for StudioError {
    fn from(s: String) -> Self {
        StudioError::Other(s)
    }
}

/// Тип Result для библиотеки rvc-studio
pub type Result<T> = std::result::Result<T, StudioError>;
