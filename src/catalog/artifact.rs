use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, StudioError};

/// Расширения весов модели
pub const WEIGHTS_EXTENSIONS: [&str; 2] = ["pth", "onnx"];
/// Расширение индекса
pub const INDEX_EXTENSION: &str = "index";
/// Расширение архива
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Вид артефакта модели, определяемый по расширению файла
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Weights,
    Index,
    Archive,
}

impl ArtifactKind {
    /// Классифицировать файл по расширению (без учёта регистра).
    /// Неизвестное расширение даёт `InvalidType`.
    pub fn classify(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if WEIGHTS_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::Weights)
        } else if ext == INDEX_EXTENSION {
            Ok(Self::Index)
        } else if ext == ARCHIVE_EXTENSION {
            Ok(Self::Archive)
        } else {
            Err(StudioError::InvalidType(path.display().to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weights => "weights",
            Self::Index => "index",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Чекпоинты обучения (`G_*.pth`, `D_*.pth`) не являются моделями голоса
pub fn is_training_checkpoint(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("G_") || n.starts_with("D_"))
        .unwrap_or(false)
}
