//! Чтение внешней кривой F0
//!
//! Файл кривой — текст, по одному кадру на строку. Строка содержит либо
//! только частоту, либо `время,частота` (разделитель — запятая, точка с
//! запятой или пробел); берётся последнее поле. Пустые строки и строки,
//! начинающиеся с `#`, пропускаются. Папка трактуется как набор файлов
//! по сегментам: файлы читаются в порядке имён и склеиваются.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::F0Curve;
use crate::error::{Result, StudioError};

/// Разобрать содержимое одного файла кривой F0
pub fn parse_f0_text(content: &str, source: &Path) -> Result<Vec<f32>> {
    let mut values = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let field = line
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .last()
            .unwrap_or(line);

        let value: f32 = field.parse().map_err(|_| {
            StudioError::Decode(format!(
                "{}:{}: invalid F0 value '{}'",
                source.display(),
                line_no + 1,
                field
            ))
        })?;

        if !value.is_finite() || value < 0.0 {
            return Err(StudioError::Decode(format!(
                "{}:{}: F0 value out of range: {}",
                source.display(),
                line_no + 1,
                value
            )));
        }

        values.push(value);
    }

    Ok(values)
}

fn segment_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Прочитать внешнюю кривую F0.
///
/// Возвращает `Ok(None)`, если путь не существует: решение о
/// предупреждении принимает вызывающая сторона. Повреждённый файл
/// даёт `Decode`.
pub fn read_f0_override(path: &Path) -> Result<Option<F0Curve>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut values = Vec::new();
    if path.is_dir() {
        for file in segment_files(path)? {
            let content = fs::read_to_string(&file)?;
            values.extend(parse_f0_text(&content, &file)?);
        }
    } else {
        let content = fs::read_to_string(path)?;
        values = parse_f0_text(&content, path)?;
    }

    if values.is_empty() {
        return Err(StudioError::Decode(format!(
            "F0 override contains no frames: {}",
            path.display()
        )));
    }

    log::debug!("Loaded {} F0 frames from {}", values.len(), path.display());
    Ok(Some(F0Curve::new(values)))
}
