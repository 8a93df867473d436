//! Модуль конфигурации библиотеки rvc-studio
//!
//! Этот модуль содержит структуры и перечисления для настройки библиотеки:
//! методы извлечения F0, модели эмбеддера, форматы экспорта и общую
//! конфигурацию каталогов.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// Метод оценки основного тона (F0)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum F0Method {
    #[default]
    #[serde(rename = "rmvpe")]
    Rmvpe,
    #[serde(rename = "crepe")]
    Crepe,
    #[serde(rename = "crepe-tiny")]
    CrepeTiny,
    #[serde(rename = "fcpe")]
    Fcpe,
    #[serde(rename = "hybrid[rmvpe+fcpe]")]
    HybridRmvpeFcpe,
}

impl F0Method {
    pub const ALL: [F0Method; 5] = [
        Self::Rmvpe,
        Self::Crepe,
        Self::CrepeTiny,
        Self::Fcpe,
        Self::HybridRmvpeFcpe,
    ];

    /// Получить строковое представление метода
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rmvpe => "rmvpe",
            Self::Crepe => "crepe",
            Self::CrepeTiny => "crepe-tiny",
            Self::Fcpe => "fcpe",
            Self::HybridRmvpeFcpe => "hybrid[rmvpe+fcpe]",
        }
    }
}

impl fmt::Display for F0Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for F0Method {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| StudioError::Validation(format!("unknown F0 method '{}'", s)))
    }
}

/// Модель эмбеддера голоса
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderModel {
    #[default]
    Contentvec,
    ChineseHubertBase,
    JapaneseHubertBase,
    KoreanHubertBase,
    /// Пользовательский эмбеддер, заданный путём к папке модели
    Custom(PathBuf),
}

impl EmbedderModel {
    /// Имя эмбеддера в том виде, в котором оно хранится в пресетах
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contentvec => "contentvec",
            Self::ChineseHubertBase => "chinese-hubert-base",
            Self::JapaneseHubertBase => "japanese-hubert-base",
            Self::KoreanHubertBase => "korean-hubert-base",
            Self::Custom(_) => "custom",
        }
    }

    /// Разобрать имя эмбеддера. Для `custom` нужен путь к модели.
    pub fn parse(name: &str, custom_path: Option<&Path>) -> Result<Self> {
        match name.trim() {
            "contentvec" => Ok(Self::Contentvec),
            "chinese-hubert-base" => Ok(Self::ChineseHubertBase),
            "japanese-hubert-base" => Ok(Self::JapaneseHubertBase),
            "korean-hubert-base" => Ok(Self::KoreanHubertBase),
            "custom" => match custom_path {
                Some(path) if !path.as_os_str().is_empty() => Ok(Self::Custom(path.to_path_buf())),
                _ => Err(StudioError::Validation(
                    "custom embedder selected but no embedder path given".to_string(),
                )),
            },
            other => Err(StudioError::Validation(format!("unknown embedder model '{}'", other))),
        }
    }
}

/// Формат экспорта результата
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
    Flac,
    Ogg,
    M4a,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [Self::Wav, Self::Mp3, Self::Flac, Self::Ogg, Self::M4a];

    /// Название формата (как в пресетах)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "WAV",
            Self::Mp3 => "MP3",
            Self::Flac => "FLAC",
            Self::Ogg => "OGG",
            Self::M4a => "M4A",
        }
    }

    /// Расширение выходного файла
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StudioError::UnsupportedFormat(s.to_string()))
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Каталог установленных моделей голоса
    pub models_dir: PathBuf,
    /// Каталог пресетов
    pub presets_dir: PathBuf,
    /// Каталог пресетов сдвига формант
    pub formant_presets_dir: PathBuf,
    /// Метод F0 по умолчанию
    pub default_f0_method: F0Method,
    /// Эмбеддер по умолчанию
    pub default_embedder: EmbedderModel,
    /// Шаг анализа (hop length) по умолчанию
    pub hop_length: u32,
    /// Форматы, которые разрешено выбирать для экспорта
    pub supported_formats: Vec<ExportFormat>,
    /// Размер буфера широковещательного канала событий
    pub event_capacity: usize,
    /// Удалять незавершённые `.partial` файлы после отмены или ошибки
    pub cleanup_partial_files: bool,
}

impl Default for StudioConfig {
    fn default() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rvc-studio");

        Self {
            models_dir: root.join("models"),
            presets_dir: root.join("presets"),
            formant_presets_dir: root.join("formant_shift"),
            default_f0_method: F0Method::default(),
            default_embedder: EmbedderModel::default(),
            hop_length: 128,
            supported_formats: ExportFormat::ALL.to_vec(),
            event_capacity: 100,
            cleanup_partial_files: true,
        }
    }
}

const CONFIG_FILENAME: &str = "config.json";

impl StudioConfig {
    /// Конфигурация с каталогами внутри `root` (удобно для тестов)
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            models_dir: root.join("models"),
            presets_dir: root.join("presets"),
            formant_presets_dir: root.join("formant_shift"),
            ..Self::default()
        }
    }

    /// Путь к файлу конфигурации по умолчанию
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rvc-studio")
            .join(CONFIG_FILENAME)
    }

    /// Загрузить конфигурацию; если файла нет, вернуть значения по умолчанию
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            StudioError::Configuration(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// Сохранить конфигурацию на диск
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_string_pretty(self)
            .map_err(|e| StudioError::Configuration(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, data)?;
        log::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Создать управляемые каталоги, если их ещё нет
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.models_dir)?;
        fs::create_dir_all(&self.presets_dir)?;
        Ok(())
    }

    /// Проверить, что формат разрешён конфигурацией
    pub fn check_format(&self, format: ExportFormat) -> Result<()> {
        if self.supported_formats.contains(&format) {
            Ok(())
        } else {
            Err(StudioError::UnsupportedFormat(format.to_string()))
        }
    }
}
