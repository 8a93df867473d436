//! Installed voice models
//!
//! Managed storage is laid out as `<models_dir>/<model_id>/<file>`. The
//! catalog keeps an in-memory registry of entries rebuilt by `refresh()`
//! and updated by `install()`, and tracks the single active entry loaded
//! into the inference backend.

mod artifact;

pub use artifact::{is_training_checkpoint, ArtifactKind};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::backend::ModelBackend;
use crate::error::{Result, StudioError};

/// A registered voice model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier, the stem of the weights file
    pub id: String,
    /// Primary weights artifact
    pub weights: PathBuf,
    /// Optional retrieval index paired with the model
    pub index: Option<PathBuf>,
    pub installed_at: DateTime<Utc>,
}

impl ModelEntry {
    pub fn new(id: impl Into<String>, weights: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            weights: weights.into(),
            index: None,
            installed_at: Utc::now(),
        }
    }

    pub fn with_index(mut self, index: impl Into<PathBuf>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// Result of installing a single artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledArtifact {
    pub kind: ArtifactKind,
    /// Final location inside managed storage
    pub path: PathBuf,
    /// Entry the artifact was registered under, if any
    pub model_id: Option<String>,
}

/// Clears the transition flag when a load/unload finishes, even on error
struct TransitionGuard<'a>(&'a AtomicBool);

impl<'a> TransitionGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ModelCatalog {
    models_dir: PathBuf,
    entries: BTreeMap<String, ModelEntry>,
    active: Option<ModelEntry>,
    backend: Arc<dyn ModelBackend>,
    transition: Arc<AtomicBool>,
}

impl ModelCatalog {
    pub fn new(models_dir: impl Into<PathBuf>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            models_dir: models_dir.into(),
            entries: BTreeMap::new(),
            active: None,
            backend,
            transition: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Entries sorted by id
    pub fn entries(&self) -> Vec<ModelEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.entries.get(id)
    }

    pub fn active(&self) -> Option<&ModelEntry> {
        self.active.as_ref()
    }

    /// Shared flag that is set while `load`/`unload` talk to the backend
    pub fn transition_flag(&self) -> Arc<AtomicBool> {
        self.transition.clone()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.load(Ordering::SeqCst)
    }

    /// Install one artifact into managed storage and register it.
    ///
    /// Archives are rejected with `ArchiveNotSupported`; extraction is not
    /// implemented. The file is copied into a temp file next to its final
    /// location and renamed into place, so a failed copy never leaves a
    /// truncated artifact behind. An existing artifact with the same name
    /// is overwritten.
    pub fn install(&mut self, source: &Path) -> Result<InstalledArtifact> {
        let kind = ArtifactKind::classify(source)?;
        if kind == ArtifactKind::Archive {
            return Err(StudioError::ArchiveNotSupported(source.display().to_string()));
        }
        // refresh() would never list a G_/D_ checkpoint, so it is not installable either
        if kind == ArtifactKind::Weights && is_training_checkpoint(source) {
            return Err(StudioError::InvalidType(format!(
                "{} is a training checkpoint, not a voice model",
                source.display()
            )));
        }

        if !source.is_file() {
            return Err(StudioError::NotFound(format!("File not found: {}", source.display())));
        }

        let (file_name, stem) = match (source.file_name(), source.file_stem()) {
            (Some(name), Some(stem)) => (name.to_owned(), stem.to_string_lossy().into_owned()),
            _ => {
                return Err(StudioError::Validation(format!(
                    "Cannot derive a model name from {}",
                    source.display()
                )))
            }
        };

        // An index dropped for an already installed model lands in that model's directory
        let owner = match kind {
            ArtifactKind::Index => self.index_owner(&stem),
            _ => Some(stem.clone()),
        };
        let target_dir = match owner.as_deref().and_then(|id| self.entries.get(id)) {
            Some(entry) => entry
                .weights
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.models_dir.join(&entry.id)),
            None => self.models_dir.join(&stem),
        };
        let target = target_dir.join(&file_name);

        fs::create_dir_all(&target_dir)?;
        copy_atomically(source, &target)?;
        log::info!("Installed {} {} -> {}", kind, source.display(), target.display());

        let model_id = match kind {
            ArtifactKind::Weights => {
                let index = self
                    .entries
                    .get(&stem)
                    .and_then(|e| e.index.clone())
                    .filter(|p| p.exists())
                    .or_else(|| find_index(&target_dir, &stem))
                    .or_else(|| self.adopt_orphan_index(&stem, &target_dir));

                if self.entries.contains_key(&stem) {
                    log::info!("Overwriting existing model entry '{}'", stem);
                }

                let mut entry = ModelEntry::new(stem.clone(), target.clone());
                entry.index = index;
                if self.active.as_ref().map(|a| a.id == stem).unwrap_or(false) {
                    log::info!("Active model '{}' was reinstalled", stem);
                    self.active = Some(entry.clone());
                }
                self.entries.insert(stem.clone(), entry);
                Some(stem)
            }
            ArtifactKind::Index => match owner.and_then(|id| self.entries.get_mut(&id)) {
                Some(entry) => {
                    entry.index = Some(target.clone());
                    if let Some(active) = self.active.as_mut().filter(|a| a.id == entry.id) {
                        active.index = Some(target.clone());
                    }
                    Some(entry.id.clone())
                }
                None => {
                    log::warn!("Index {} has no matching model yet", target.display());
                    None
                }
            },
            ArtifactKind::Archive => None,
        };

        Ok(InstalledArtifact { kind, path: target, model_id })
    }

    /// Rebuild the registry from managed storage. A missing or empty
    /// directory yields an empty catalog.
    pub fn refresh(&mut self) -> Result<usize> {
        let mut weights: Vec<PathBuf> = Vec::new();
        let mut indexes: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();

        if self.models_dir.exists() {
            for entry in WalkDir::new(&self.models_dir).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.into_path();
                match ArtifactKind::classify(&path) {
                    Ok(ArtifactKind::Weights) if !is_training_checkpoint(&path) => weights.push(path),
                    Ok(ArtifactKind::Index) => {
                        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                        indexes.entry(dir).or_default().push(path);
                    }
                    _ => {}
                }
            }
        } else {
            log::debug!("Models directory {} does not exist", self.models_dir.display());
        }

        let weight_dirs: HashSet<PathBuf> = weights
            .iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();

        let mut entries = BTreeMap::new();
        for path in weights {
            let id = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().into_owned(),
                None => continue,
            };
            if entries.contains_key(&id) {
                log::warn!("Duplicate model id '{}', ignoring {}", id, path.display());
                continue;
            }

            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let index = indexes.get(&dir).and_then(|found| pick_index(found, &id));
            let installed_at = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.insert(
                id.clone(),
                ModelEntry { id, weights: path, index, installed_at },
            );
        }

        // An index installed before its weights sits in a directory of its own
        let mut orphans: Vec<&PathBuf> = indexes
            .iter()
            .filter(|(dir, _)| !weight_dirs.contains(*dir))
            .flat_map(|(_, found)| found.iter())
            .collect();
        orphans.sort();
        for index in orphans {
            let stem = index.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let owner = entries
                .values_mut()
                .filter(|e: &&mut ModelEntry| e.index.is_none() && stem.contains(e.id.as_str()))
                .max_by_key(|e| e.id.len());
            if let Some(entry) = owner {
                log::debug!("Pairing index {} with model '{}'", index.display(), entry.id);
                entry.index = Some(index.clone());
            }
        }

        self.entries = entries;
        log::info!("Found {} model(s) in {}", self.entries.len(), self.models_dir.display());

        let stale = self
            .active
            .as_ref()
            .map(|a| !self.entries.contains_key(&a.id))
            .unwrap_or(false);
        if stale {
            log::warn!("Active model is no longer installed, unloading it");
            self.unload()?;
        }

        Ok(self.entries.len())
    }

    /// Make `id` the active model, unloading the previous one first.
    /// Loading the already active model is a no-op.
    pub fn load(&mut self, id: &str) -> Result<()> {
        let entry = self
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| StudioError::NotFound(format!("Model '{}' is not installed", id)))?;

        if self.active.as_ref().map(|a| a.id == id).unwrap_or(false) {
            log::debug!("Model '{}' is already loaded", id);
            return Ok(());
        }

        let transition = self.transition.clone();
        let _guard = TransitionGuard::enter(&transition);

        if let Some(previous) = self.active.take() {
            log::info!("Unloading model '{}'", previous.id);
            if let Err(e) = self.backend.unload(&previous) {
                self.active = Some(previous);
                return Err(e);
            }
        }

        log::info!("Loading model '{}' from {}", entry.id, entry.weights.display());
        self.backend.load(&entry)?;
        self.active = Some(entry);
        Ok(())
    }

    /// Deactivate the current model. Without an active model this is a no-op.
    pub fn unload(&mut self) -> Result<()> {
        let Some(previous) = self.active.take() else {
            return Ok(());
        };

        let transition = self.transition.clone();
        let _guard = TransitionGuard::enter(&transition);

        log::info!("Unloading model '{}'", previous.id);
        if let Err(e) = self.backend.unload(&previous) {
            self.active = Some(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Delete a model and its artifacts from managed storage
    pub fn remove(&mut self, id: &str) -> Result<ModelEntry> {
        if !self.entries.contains_key(id) {
            return Err(StudioError::NotFound(format!("Model '{}' is not installed", id)));
        }
        if self.active.as_ref().map(|a| a.id == id).unwrap_or(false) {
            self.unload()?;
        }

        let entry = match self.entries.remove(id) {
            Some(entry) => entry,
            None => return Err(StudioError::NotFound(format!("Model '{}' is not installed", id))),
        };

        let dir = entry.weights.parent().map(Path::to_path_buf);
        match dir {
            // The model owns its directory only when it sits directly under models_dir
            Some(dir) if dir.parent() == Some(self.models_dir.as_path()) => {
                fs::remove_dir_all(&dir)?;
                if let Some(index) = entry.index.as_deref().filter(|i| !i.starts_with(&dir)) {
                    remove_if_exists(index)?;
                    remove_empty_dir(
                        index.parent().filter(|p| p.parent() == Some(self.models_dir.as_path())),
                    );
                }
            }
            _ => {
                remove_if_exists(&entry.weights)?;
                if let Some(index) = &entry.index {
                    remove_if_exists(index)?;
                }
            }
        }

        log::info!("Removed model '{}'", id);
        Ok(entry)
    }

    /// Move an index left without weights by an earlier install into the
    /// directory of the model `id`. Only top-level directories holding no
    /// weights are considered.
    fn adopt_orphan_index(&self, id: &str, target_dir: &Path) -> Option<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.models_dir)
            .ok()?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir() && p != target_dir && !holds_weights(p))
            .collect();
        dirs.sort();

        let orphan = dirs.iter().find_map(|dir| {
            find_index(dir, id).filter(|p| {
                p.file_stem()
                    .map(|s| s.to_string_lossy().contains(id))
                    .unwrap_or(false)
            })
        })?;
        let file_name = orphan.file_name()?;
        let adopted = target_dir.join(file_name);

        match fs::rename(&orphan, &adopted) {
            Ok(()) => {
                log::info!("Paired index {} with model '{}'", adopted.display(), id);
                remove_empty_dir(orphan.parent());
                Some(adopted)
            }
            Err(e) => {
                log::warn!("Failed to move index {}: {}", orphan.display(), e);
                Some(orphan)
            }
        }
    }

    /// Installed model whose id the index stem mentions, longest id first
    fn index_owner(&self, index_stem: &str) -> Option<String> {
        self.entries
            .keys()
            .filter(|id| index_stem.contains(id.as_str()))
            .max_by_key(|id| id.len())
            .cloned()
    }
}

fn copy_atomically(source: &Path, target: &Path) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut input = File::open(source)?;
    io::copy(&mut input, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)?;
    Ok(())
}

fn holds_weights(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok().map(|e| e.path())).any(|p| {
                p.is_file()
                    && matches!(ArtifactKind::classify(&p), Ok(ArtifactKind::Weights))
                    && !is_training_checkpoint(&p)
            })
        })
        .unwrap_or(false)
}

fn remove_empty_dir(dir: Option<&Path>) {
    if let Some(dir) = dir {
        // remove_dir only succeeds on an empty directory
        if fs::remove_dir(dir).is_ok() {
            log::debug!("Removed empty directory {}", dir.display());
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Pick the index for a model: one mentioning the model id wins,
/// otherwise the first index in the directory.
fn pick_index(candidates: &[PathBuf], id: &str) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().contains(id))
                .unwrap_or(false)
        })
        .or_else(|| candidates.first())
        .cloned()
}

fn find_index(dir: &Path, id: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && matches!(ArtifactKind::classify(p), Ok(ArtifactKind::Index)))
        .collect();
    found.sort();
    pick_index(&found, id)
}
