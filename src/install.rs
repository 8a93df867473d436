//! Batch installation of dropped model files
//!
//! Every dropped path is classified and installed on its own. A bad file
//! is recorded and skipped; the rest of the batch keeps going.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::catalog::{ArtifactKind, InstalledArtifact, ModelCatalog};
use crate::error::StudioError;

/// Why a dropped file was not installed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "error", rename_all = "snake_case")]
pub enum SkipReason {
    InvalidType,
    ArchiveNotSupported,
    Failed(StudioError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidType => f.write_str("Invalid file type"),
            Self::ArchiveNotSupported => f.write_str("ZIP installation not yet implemented"),
            Self::Failed(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DropOutcome {
    Installed { path: PathBuf, artifact: InstalledArtifact },
    Skipped { path: PathBuf, reason: SkipReason },
}

impl DropOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Installed { path, .. } | Self::Skipped { path, .. } => path,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropIssue {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Aggregate result of one drop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DropReport {
    pub installed_count: usize,
    /// One outcome per dropped path, in input order
    pub outcomes: Vec<DropOutcome>,
    pub issues: Vec<DropIssue>,
}

impl DropReport {
    /// True only when every file was installed
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Single notification text for the whole batch
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Finished processing drop. Installed {} file(s).",
            self.installed_count
        );
        if !self.is_clean() {
            text.push_str(&format!(" {} issue(s):", self.issues.len()));
            for issue in &self.issues {
                let name = issue
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| issue.path.display().to_string());
                text.push_str(&format!("\n- {}: {}", name, issue.reason));
            }
        }
        text
    }
}

pub struct DropInstaller;

impl DropInstaller {
    /// Install every path, updating the catalog after each success.
    /// Outcomes and issues follow input order.
    pub fn install_all<I, P>(catalog: &mut ModelCatalog, paths: I) -> DropReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();

        // Weights from the same drop must be registered before an index can attach to them
        let mut order: Vec<usize> = (0..paths.len()).collect();
        order.sort_by_key(|&i| matches!(ArtifactKind::classify(&paths[i]), Ok(ArtifactKind::Index)));

        let mut outcomes: Vec<Option<DropOutcome>> = (0..paths.len()).map(|_| None).collect();
        for i in order {
            outcomes[i] = Some(Self::install_one(catalog, &paths[i]));
        }

        let mut report = DropReport::default();
        for (path, outcome) in paths.iter().zip(outcomes.into_iter().flatten()) {
            match &outcome {
                DropOutcome::Installed { .. } => report.installed_count += 1,
                DropOutcome::Skipped { reason, .. } => {
                    log::warn!("Skipped {}: {}", path.display(), reason);
                    report.issues.push(DropIssue { path: path.clone(), reason: reason.clone() });
                }
            }
            report.outcomes.push(outcome);
        }

        log::info!(
            "Drop finished: {} installed, {} issue(s)",
            report.installed_count,
            report.issues.len()
        );
        report
    }

    fn install_one(catalog: &mut ModelCatalog, path: &Path) -> DropOutcome {
        let skipped = |reason| DropOutcome::Skipped { path: path.to_path_buf(), reason };

        match ArtifactKind::classify(path) {
            Err(_) => return skipped(SkipReason::InvalidType),
            Ok(ArtifactKind::Archive) => return skipped(SkipReason::ArchiveNotSupported),
            Ok(_) => {}
        }

        match catalog.install(path) {
            Ok(artifact) => DropOutcome::Installed { path: path.to_path_buf(), artifact },
            Err(StudioError::InvalidType(_)) => skipped(SkipReason::InvalidType),
            Err(StudioError::ArchiveNotSupported(_)) => skipped(SkipReason::ArchiveNotSupported),
            Err(err) => skipped(SkipReason::Failed(err)),
        }
    }
}
