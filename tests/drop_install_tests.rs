mod common;

use std::fs;
use std::sync::Arc;

use common::RecordingModelBackend;
use rvc_studio::catalog::ModelCatalog;
use rvc_studio::install::{DropInstaller, DropOutcome, SkipReason};

fn catalog(dir: &std::path::Path) -> ModelCatalog {
    ModelCatalog::new(dir.join("models"), Arc::new(RecordingModelBackend::default()))
}

#[test]
fn test_mixed_drop_reports_each_issue() {
    let dir = tempfile::tempdir().unwrap();
    let drop_dir = dir.path().join("drop");
    fs::create_dir_all(&drop_dir).unwrap();
    let a = drop_dir.join("a.pth");
    let b = drop_dir.join("b.exe");
    let c = drop_dir.join("c.zip");
    for path in [&a, &b, &c] {
        fs::write(path, b"payload").unwrap();
    }

    let mut catalog = catalog(dir.path());
    let report = DropInstaller::install_all(&mut catalog, [&a, &b, &c]);

    assert_eq!(report.installed_count, 1);
    assert!(!report.is_clean());
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes[0].is_installed());

    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.issues[0].path, b);
    assert_eq!(report.issues[0].reason, SkipReason::InvalidType);
    assert_eq!(report.issues[1].path, c);
    assert_eq!(report.issues[1].reason, SkipReason::ArchiveNotSupported);

    assert!(catalog.get("a").is_some());
    assert!(dir.path().join("models").join("a").join("a.pth").is_file());
    assert!(!dir.path().join("models").join("c").exists());

    let summary = report.summary();
    assert!(summary.contains("Installed 1 file(s)."));
    assert!(summary.contains("b.exe: Invalid file type"));
    assert!(summary.contains("c.zip: ZIP installation not yet implemented"));
}

#[test]
fn test_failures_do_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.onnx");
    fs::write(&good, b"onnx").unwrap();
    let missing = dir.path().join("missing.pth");

    let mut catalog = catalog(dir.path());
    let report = DropInstaller::install_all(&mut catalog, [&missing, &good]);

    assert_eq!(report.installed_count, 1);
    assert_eq!(report.issues.len(), 1);
    match &report.issues[0].reason {
        SkipReason::Failed(err) => assert_eq!(err.kind(), "not_found"),
        other => panic!("unexpected reason {:?}", other),
    }
    assert!(catalog.get("good").is_some());
}

#[test]
fn test_index_and_weights_in_one_drop() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("singer.pth");
    let index = dir.path().join("added_IVF512_Flat_singer_v2.index");
    fs::write(&weights, b"w").unwrap();
    fs::write(&index, b"i").unwrap();

    let mut catalog = catalog(dir.path());
    let report = DropInstaller::install_all(&mut catalog, [&weights, &index]);

    assert!(report.is_clean());
    assert_eq!(report.installed_count, 2);
    match &report.outcomes[1] {
        DropOutcome::Installed { artifact, .. } => {
            assert_eq!(artifact.model_id.as_deref(), Some("singer"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    // Повторное сканирование находит ту же пару
    catalog.refresh().unwrap();
    let entry = catalog.get("singer").unwrap();
    assert!(entry.index.as_ref().unwrap().ends_with("added_IVF512_Flat_singer_v2.index"));
}

#[test]
fn test_empty_drop_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = catalog(dir.path());
    let report = DropInstaller::install_all(&mut catalog, Vec::<std::path::PathBuf>::new());
    assert!(report.is_clean());
    assert_eq!(report.installed_count, 0);
}

#[test]
fn test_index_dropped_before_weights_is_paired() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("singer.pth");
    let index = dir.path().join("added_IVF512_Flat_singer_v2.index");
    fs::write(&weights, b"w").unwrap();
    fs::write(&index, b"i").unwrap();

    let mut catalog = catalog(dir.path());
    let report = DropInstaller::install_all(&mut catalog, [&index, &weights]);

    assert!(report.is_clean());
    assert_eq!(report.outcomes[0].path(), index.as_path());
    match &report.outcomes[0] {
        DropOutcome::Installed { artifact, .. } => {
            assert_eq!(artifact.model_id.as_deref(), Some("singer"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let paired = dir.path().join("models/singer/added_IVF512_Flat_singer_v2.index");
    assert_eq!(catalog.get("singer").unwrap().index.as_deref(), Some(paired.as_path()));
    catalog.refresh().unwrap();
    assert_eq!(catalog.get("singer").unwrap().index.as_deref(), Some(paired.as_path()));
}

#[test]
fn test_training_checkpoint_is_not_installed() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("D_4000.pth");
    fs::write(&checkpoint, b"d").unwrap();

    let mut catalog = catalog(dir.path());
    let report = DropInstaller::install_all(&mut catalog, [&checkpoint]);

    assert_eq!(report.installed_count, 0);
    assert_eq!(report.issues[0].reason, SkipReason::InvalidType);
    assert!(catalog.is_empty());
    catalog.refresh().unwrap();
    assert!(catalog.is_empty());
}
