//! Готовые настройки сдвига формант
//!
//! Пресеты лежат в отдельной папке как `<имя>.json` с полями
//! `formant_qfrency` и `formant_timbre`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

use super::{ClampWarning, FormantStage, ParameterRange};

/// Значения quefrency/timbre из файла пресета
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormantPreset {
    #[serde(rename = "formant_qfrency")]
    pub quefrency: f32,
    #[serde(rename = "formant_timbre")]
    pub timbre: f32,
}

impl Default for FormantPreset {
    fn default() -> Self {
        let stage = FormantStage::default();
        Self { quefrency: stage.quefrency, timbre: stage.timbre }
    }
}

impl FormantPreset {
    /// Записать значения в ступень и включить её. Значения вне диапазона
    /// прижимаются с предупреждением.
    pub fn apply_to(&self, stage: &mut FormantStage) -> Vec<ClampWarning> {
        let defaults = FormantStage::default();
        let mut warnings = Vec::new();
        let mut fix = |field: &str, value: f32, range: ParameterRange, fallback: f32| {
            let clamped = range.clamp(value, fallback);
            if clamped != value {
                warnings.push(ClampWarning { field: field.to_string(), original: value, clamped });
            }
            clamped
        };

        stage.quefrency = fix(
            "formant.quefrency",
            self.quefrency,
            FormantStage::QUEFRENCY,
            defaults.quefrency,
        );
        stage.timbre = fix("formant.timbre", self.timbre, FormantStage::TIMBRE, defaults.timbre);
        stage.enabled = true;
        warnings
    }
}

pub struct FormantPresetStore {
    dir: PathBuf,
}

impl FormantPresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Имена пресетов по алфавиту. Нет папки — пустой список.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .map(|ext| ext.eq_ignore_ascii_case("json"))
                        .unwrap_or(false)
            })
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Пустое имя означает значения по умолчанию
    pub fn load(&self, name: &str) -> Result<FormantPreset> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(FormantPreset::default());
        }
        if name.contains(|c: char| c == '/' || c == '\\') || name == "." || name == ".." {
            return Err(StudioError::Validation(format!("Invalid formant preset name '{}'", name)));
        }

        let path = self.dir.join(format!("{}.json", name));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StudioError::NotFound(format!("Formant preset '{}' not found", name)))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&text)
            .map_err(|e| StudioError::Decode(format!("Formant preset '{}': {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FormantPresetStore::new(dir.path().join("formant_shift"));
        assert!(store.list().unwrap().is_empty());

        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join("m2f.json"), r#"{"formant_qfrency": 0.8, "formant_timbre": 0.6}"#)
            .unwrap();
        fs::write(store.dir().join("f2m.json"), r#"{"formant_qfrency": 1.0, "formant_timbre": 1.0}"#)
            .unwrap();
        fs::write(store.dir().join("readme.txt"), "x").unwrap();

        assert_eq!(store.list().unwrap(), vec!["f2m", "m2f"]);
        let preset = store.load("m2f").unwrap();
        assert_eq!(preset, FormantPreset { quefrency: 0.8, timbre: 0.6 });
        assert_eq!(store.load("").unwrap(), FormantPreset::default());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FormantPresetStore::new(dir.path());
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        assert_eq!(store.load("missing").unwrap_err().kind(), "not_found");
        assert_eq!(store.load("bad").unwrap_err().kind(), "decode");
        assert_eq!(store.load("../up").unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_apply_clamps_and_enables() {
        let mut stage = FormantStage::default();
        let warnings = FormantPreset { quefrency: 2.5, timbre: 0.4 }.apply_to(&mut stage);
        assert!(stage.enabled);
        assert_eq!(stage.quefrency, 1.0);
        assert_eq!(stage.timbre, 0.4);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "formant.quefrency");
    }
}
