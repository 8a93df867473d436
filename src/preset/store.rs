use std::fs::{self, ReadDir};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, StudioError};

use super::schema::Preset;

const PRESET_EXTENSION: &str = "json";

/// Проверить имя пресета: непустое, только `[A-Za-z0-9_-]`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StudioError::Validation("Preset name must not be empty".to_string()));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(StudioError::Validation(format!(
            "Preset name '{}' contains invalid character '{}'",
            name, bad
        )));
    }
    Ok(())
}

/// Хранилище пресетов: один JSON-файл на пресет
#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, PRESET_EXTENSION))
    }

    /// Существует ли пресет. Для недопустимого имени всегда `false`.
    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.path_for(name).is_file()
    }

    /// Сохранить пресет.
    ///
    /// Перезапись существующего пресета требует `overwrite = true`
    /// (сначала `exists`, потом подтверждение), иначе `Conflict`.
    /// Запись атомарная: временный файл в каталоге пресетов
    /// переименовывается поверх целевого.
    pub fn save(&self, name: &str, preset: &Preset, overwrite: bool) -> Result<()> {
        validate_name(name)?;

        let path = self.path_for(name);
        if path.exists() && !overwrite {
            return Err(StudioError::Conflict(format!(
                "Preset '{}' already exists, overwrite not confirmed",
                name
            )));
        }

        let data = serde_json::to_vec_pretty(preset)
            .map_err(|e| StudioError::Other(format!("Failed to serialize preset '{}': {}", name, e)))?;

        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;

        log::info!("Saved preset '{}' to {}", name, path.display());
        Ok(())
    }

    /// Прочитать пресет
    pub fn load(&self, name: &str) -> Result<Preset> {
        validate_name(name)?;

        let path = self.path_for(name);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StudioError::NotFound(format!("Preset '{}' not found", name)));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&data).map_err(|e| {
            StudioError::Decode(format!("Preset '{}' is corrupt ({}): {}", name, path.display(), e))
        })
    }

    /// Удалить пресет
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => {
                log::info!("Deleted preset '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StudioError::NotFound(format!("Preset '{}' not found", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Список пресетов. Каталог читается при каждом вызове `iter()`.
    pub fn list(&self) -> PresetList {
        PresetList { dir: self.dir.clone() }
    }
}

/// Перезапускаемый ленивый список имён пресетов
#[derive(Debug, Clone)]
pub struct PresetList {
    dir: PathBuf,
}

impl PresetList {
    /// Начать новый проход по каталогу. Отсутствующий каталог даёт пустой
    /// список, нечитаемый — ошибку.
    pub fn iter(&self) -> Result<PresetNames> {
        match fs::read_dir(&self.dir) {
            Ok(inner) => Ok(PresetNames { inner: Some(inner) }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PresetNames { inner: None }),
            Err(e) => Err(e.into()),
        }
    }

    /// Имена, отсортированные по алфавиту
    pub fn sorted(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.iter()?.collect();
        names.sort();
        Ok(names)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.iter()?.next().is_none())
    }
}

/// Итератор по именам пресетов
#[derive(Debug)]
pub struct PresetNames {
    inner: Option<ReadDir>,
}

impl Iterator for PresetNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let inner = self.inner.as_mut()?;
        for entry in inner.by_ref() {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    log::warn!("Skipping unreadable preset entry: {}", e);
                    continue;
                }
            };

            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(PRESET_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(name).is_ok() {
                    return Some(name.to_string());
                }
            }
        }
        None
    }
}
