mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{collect_until_terminal, write_model, write_wav, FakeConverter, Fakes, Gate};
use rvc_studio::config::ExportFormat;
use rvc_studio::effects::{EffectConfig, PostEffect, PostEffectKind};
use rvc_studio::error::StudioError;
use rvc_studio::job::{partial_path, JobRequest, JobState, JobSupervisor};
use rvc_studio::notification::MemoryObserver;
use rvc_studio::progress::JobEventKind;

fn audio_request(dir: &Path, output: &str) -> JobRequest {
    let input = dir.join("input.wav");
    if !input.exists() {
        write_wav(&input);
    }
    JobRequest::builder()
        .input_audio(input)
        .model(write_model(dir, "voice"))
        .output(dir.join(output))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_job_completes_with_monotonic_progress() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());
    let memory = MemoryObserver::new();
    supervisor.add_observer(Box::new(memory.clone()));
    let mut events = supervisor.subscribe();

    let mut effects = EffectConfig::disabled();
    effects.clean.enabled = true;
    effects.formant.enabled = true;
    let request = JobRequest::builder()
        .input_audio({
            let input = dir.path().join("input.wav");
            write_wav(&input);
            input
        })
        .model(write_model(dir.path(), "voice"))
        .effects(effects)
        .output(dir.path().join("result.mp3"))
        .export_format(ExportFormat::Wav)
        .build()
        .unwrap();
    let expected_output = dir.path().join("result.wav");

    supervisor.start(request).unwrap();
    let events = collect_until_terminal(&mut events).await;

    assert_eq!(events.first().unwrap().kind, JobEventKind::Started);
    assert_eq!(
        events.last().unwrap().kind,
        JobEventKind::Completed { output: expected_output.clone() }
    );

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e.kind {
            JobEventKind::Progress { percent, .. } => Some(percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));

    let finishing = events.iter().position(|e| e.kind == JobEventKind::Finishing).unwrap();
    assert_eq!(finishing, events.len() - 2);
    assert!(events[..finishing]
        .iter()
        .all(|e| !matches!(e.kind, JobEventKind::Completed { .. })));

    assert!(expected_output.is_file());
    assert!(!partial_path(&expected_output).exists());
    assert_eq!(fakes.effects.calls.load(Ordering::SeqCst), 2);
    assert_eq!(supervisor.wait().await, JobState::Completed { output: expected_output });
    assert!(memory.warnings().is_empty());
}

#[tokio::test]
async fn test_enabled_post_effects_run_in_fixed_order() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());

    let mut effects = EffectConfig::disabled();
    effects.post.enabled = true;
    effects.post.set(PostEffectKind::Delay, PostEffect::enabled().with("seconds", 1.0));
    effects.post.set(PostEffectKind::Reverb, PostEffect::enabled());
    effects.post.set(PostEffectKind::Chorus, PostEffect::default());
    let request = JobRequest::builder()
        .input_audio({
            let input = dir.path().join("input.wav");
            write_wav(&input);
            input
        })
        .model(write_model(dir.path(), "voice"))
        .effects(effects)
        .output(dir.path().join("result.wav"))
        .build()
        .unwrap();

    supervisor.start(request).unwrap();
    assert!(matches!(supervisor.wait().await, JobState::Completed { .. }));
    assert_eq!(
        *fakes.effects.post_calls.lock(),
        vec![PostEffectKind::Reverb, PostEffectKind::Delay]
    );
}

#[tokio::test]
async fn test_second_start_is_rejected_until_first_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::closed();
    let fakes = Fakes::gated(gate.clone());
    let supervisor = JobSupervisor::new(fakes.backends());

    supervisor.start(audio_request(dir.path(), "first.wav")).unwrap();
    gate.wait_entered().await;

    let err = supervisor.start(audio_request(dir.path(), "second.wav")).unwrap_err();
    assert_eq!(err, StudioError::AlreadyRunning);
    assert!(supervisor.status().is_active());

    gate.open();
    let state = supervisor.wait().await;
    assert!(matches!(state, JobState::Completed { .. }));

    // Терминальное состояние снова принимает задачи
    supervisor.start(audio_request(dir.path(), "third.wav")).unwrap();
    let state = supervisor.wait().await;
    assert_eq!(state, JobState::Completed { output: dir.path().join("third.wav") });
    assert!(!dir.path().join("second.wav").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_have_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::closed();
    let fakes = Fakes::gated(gate.clone());
    let supervisor = JobSupervisor::new(fakes.backends());

    let mut handles = Vec::new();
    for i in 0..8 {
        let request = audio_request(dir.path(), &format!("out_{}.wav", i));
        let supervisor = supervisor.clone();
        handles.push(tokio::spawn(async move { supervisor.start(request) }));
    }

    let mut winners = 0;
    let mut busy = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(StudioError::AlreadyRunning) => busy += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(busy, 7);

    gate.open();
    assert!(matches!(supervisor.wait().await, JobState::Completed { .. }));
}

#[tokio::test]
async fn test_cancel_running_job_fails_with_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::closed();
    let fakes = Fakes::gated(gate.clone());
    let supervisor = JobSupervisor::new(fakes.backends());
    let mut events = supervisor.subscribe();

    let output = dir.path().join("cancelled.wav");
    supervisor.start(audio_request(dir.path(), "cancelled.wav")).unwrap();
    gate.wait_entered().await;

    assert!(supervisor.cancel());
    gate.open();

    let state = supervisor.wait().await;
    assert_eq!(state, JobState::Failed { error: StudioError::Cancelled });

    let events = collect_until_terminal(&mut events).await;
    assert_eq!(
        events.last().unwrap().kind,
        JobEventKind::Failed { error: StudioError::Cancelled }
    );
    assert!(!events.iter().any(|e| matches!(e.kind, JobEventKind::Completed { .. })));
    assert!(!output.exists());
    assert!(!partial_path(&output).exists());
    assert_eq!(fakes.effects.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_without_active_job_is_rejected() {
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());
    assert!(!supervisor.cancel());
    assert_eq!(supervisor.status(), JobState::Idle);
    assert_eq!(supervisor.wait().await, JobState::Idle);
}

#[tokio::test]
async fn test_missing_f0_override_warns_and_estimates() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());
    let memory = MemoryObserver::new();
    supervisor.add_observer(Box::new(memory.clone()));
    let mut events = supervisor.subscribe();

    let input = dir.path().join("input.wav");
    write_wav(&input);
    let request = JobRequest::builder()
        .input_audio(&input)
        .model(write_model(dir.path(), "voice"))
        .f0_override(dir.path().join("missing_f0.txt"))
        .output(dir.path().join("out.wav"))
        .build()
        .unwrap();

    supervisor.start(request).unwrap();
    let events = collect_until_terminal(&mut events).await;

    assert!(matches!(events.last().unwrap().kind, JobEventKind::Completed { .. }));
    let warnings = memory.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("F0 file not found"));
    assert_eq!(fakes.pitch.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_existing_f0_override_skips_estimation() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());

    let input = dir.path().join("input.wav");
    write_wav(&input);
    let f0 = dir.path().join("f0.txt");
    fs::write(&f0, "0.00,100\n0.01,150\n").unwrap();

    let request = JobRequest::builder()
        .input_audio(&input)
        .model(write_model(dir.path(), "voice"))
        .f0_override(&f0)
        .output(dir.path().join("out.wav"))
        .build()
        .unwrap();

    supervisor.start(request).unwrap();
    assert!(matches!(supervisor.wait().await, JobState::Completed { .. }));

    assert_eq!(fakes.pitch.calls.load(Ordering::SeqCst), 0);
    let used = fakes.converter.last_f0.lock().clone().unwrap();
    assert_eq!(used.values, vec![100.0, 150.0]);
}

#[tokio::test]
async fn test_missing_index_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());
    let memory = MemoryObserver::new();
    supervisor.add_observer(Box::new(memory.clone()));
    let mut events = supervisor.subscribe();

    let input = dir.path().join("input.wav");
    write_wav(&input);
    let model = write_model(dir.path(), "voice").with_index(dir.path().join("gone.index"));
    let request = JobRequest::builder()
        .input_audio(&input)
        .model(model)
        .output(dir.path().join("out.wav"))
        .build()
        .unwrap();

    supervisor.start(request).unwrap();
    let events = collect_until_terminal(&mut events).await;

    assert!(matches!(events.last().unwrap().kind, JobEventKind::Completed { .. }));
    assert!(memory.warnings()[0].contains("Index file not found"));
    assert_eq!(*fakes.converter.last_index.lock(), Some(None));
}

#[tokio::test]
async fn test_backend_error_fails_job_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::failing();
    let supervisor = JobSupervisor::new(fakes.backends());

    let output = dir.path().join("out.wav");
    supervisor.start(audio_request(dir.path(), "out.wav")).unwrap();

    match supervisor.wait().await {
        JobState::Failed { error } => assert_eq!(error.kind(), "backend"),
        other => panic!("unexpected state {:?}", other),
    }
    assert!(!output.exists());
    assert!(!partial_path(&output).exists());
}

#[tokio::test]
async fn test_unsupported_export_format_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());

    let input = dir.path().join("input.wav");
    write_wav(&input);
    let request = JobRequest::builder()
        .input_audio(&input)
        .model(write_model(dir.path(), "voice"))
        .output(dir.path().join("out"))
        .export_format(ExportFormat::Mp3)
        .build()
        .unwrap();

    supervisor.start(request).unwrap();
    match supervisor.wait().await {
        JobState::Failed { error } => assert_eq!(error.kind(), "unsupported_format"),
        other => panic!("unexpected state {:?}", other),
    }
    assert!(!dir.path().join("out.mp3").exists());
    assert!(!dir.path().join("out.mp3.partial").exists());
}

#[tokio::test]
async fn test_text_input_is_synthesized_then_converted() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());

    let request = JobRequest::builder()
        .input_text("Hello there", "en-US-GuyNeural", 10)
        .model(write_model(dir.path(), "voice"))
        .output(dir.path().join("speech.wav"))
        .build()
        .unwrap();

    supervisor.start(request).unwrap();
    let state = supervisor.wait().await;
    assert_eq!(state, JobState::Completed { output: dir.path().join("speech.wav") });
    assert!(dir.path().join("speech.wav").is_file());
    assert_eq!(fakes.pitch.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_start_outside_runtime_leaves_supervisor_idle() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());

    let err = supervisor.start(audio_request(dir.path(), "out.wav")).unwrap_err();
    assert_eq!(err.kind(), "configuration");
    assert_eq!(supervisor.status(), JobState::Idle);
    assert_eq!(supervisor.current_job_id(), None);
    assert!(!supervisor.cancel());

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let state = runtime.block_on(async {
        supervisor.start(audio_request(dir.path(), "out.wav")).unwrap();
        supervisor.wait().await
    });
    assert_eq!(state, JobState::Completed { output: dir.path().join("out.wav") });
}

#[tokio::test]
async fn test_cancel_during_finishing_discards_export() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::closed();
    let fakes = Fakes::gated_export(gate.clone());
    let supervisor = JobSupervisor::new(fakes.backends());
    let mut events = supervisor.subscribe();
    let mut state = supervisor.watch_state();

    let output = dir.path().join("late.wav");
    supervisor.start(audio_request(dir.path(), "late.wav")).unwrap();

    tokio::time::timeout(Duration::from_secs(10), state.wait_for(|s| *s == JobState::Finishing))
        .await
        .expect("job never reached Finishing")
        .unwrap();
    gate.wait_entered().await;
    assert!(partial_path(&output).is_file());

    assert!(supervisor.cancel());
    gate.open();

    assert_eq!(supervisor.wait().await, JobState::Failed { error: StudioError::Cancelled });
    let events = collect_until_terminal(&mut events).await;
    assert!(events.iter().any(|e| e.kind == JobEventKind::Finishing));
    assert_eq!(
        events.last().unwrap().kind,
        JobEventKind::Failed { error: StudioError::Cancelled }
    );
    assert!(!output.exists());
    assert!(!partial_path(&output).exists());
}

fn batch_request(dir: &Path, names: &[&str]) -> (JobRequest, PathBuf) {
    let songs = dir.join("songs");
    fs::create_dir_all(&songs).unwrap();
    for name in names {
        write_wav(&songs.join(name));
    }
    let out = dir.join("converted");
    let request = JobRequest::builder()
        .input_folder(&songs)
        .model(write_model(dir, "voice"))
        .output(&out)
        .build()
        .unwrap();
    (request, out)
}

#[tokio::test]
async fn test_folder_job_converts_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());
    let mut events = supervisor.subscribe();

    let (request, out) = batch_request(dir.path(), &["c.wav", "a.wav", "b.wav"]);
    supervisor.start(request).unwrap();
    let events = collect_until_terminal(&mut events).await;

    assert_eq!(events.last().unwrap().kind, JobEventKind::Completed { output: out.clone() });
    for stem in ["a", "b", "c"] {
        assert!(out.join(format!("{}_output.wav", stem)).is_file());
    }
    assert_eq!(fakes.converter.calls.load(Ordering::SeqCst), 3);

    let progress: Vec<(u8, String)> = events
        .iter()
        .filter_map(|e| match &e.kind {
            JobEventKind::Progress { percent, message, .. } => Some((*percent, message.clone())),
            _ => None,
        })
        .collect();
    let percents: Vec<u8> = progress.iter().map(|(p, _)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
    assert!(progress.iter().any(|(_, m)| m.contains("[2/3] b.wav")));

    let finishing: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == JobEventKind::Finishing)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(finishing, vec![events.len() - 2]);
}

#[tokio::test]
async fn test_folder_job_skips_unreadable_file_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new();
    let supervisor = JobSupervisor::new(fakes.backends());
    let memory = MemoryObserver::new();
    supervisor.add_observer(Box::new(memory.clone()));

    let (request, out) = {
        let songs = dir.path().join("songs");
        fs::create_dir_all(&songs).unwrap();
        fs::write(songs.join("broken.wav"), b"not a wav").unwrap();
        batch_request(dir.path(), &["good.wav"])
    };
    supervisor.start(request).unwrap();

    assert_eq!(supervisor.wait().await, JobState::Completed { output: out.clone() });
    assert!(out.join("good_output.wav").is_file());
    assert!(!out.join("broken_output.wav").exists());
    let warnings = memory.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("broken.wav"));
}

#[tokio::test]
async fn test_folder_job_fails_when_no_file_converts() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::failing();
    let supervisor = JobSupervisor::new(fakes.backends());

    let (request, out) = batch_request(dir.path(), &["a.wav", "b.wav"]);
    supervisor.start(request).unwrap();

    match supervisor.wait().await {
        JobState::Failed { error } => assert_eq!(error.kind(), "backend"),
        other => panic!("unexpected state {:?}", other),
    }
    assert!(!out.join("a_output.wav").exists());
    assert!(!out.join("b_output.wav").exists());
}

#[tokio::test]
async fn test_cancel_between_folder_files_keeps_finished_ones() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::closed();
    let fakes = Fakes::with_converter(FakeConverter {
        gate: Some(gate.clone()),
        gate_after: 1,
        ..Default::default()
    });
    let supervisor = JobSupervisor::new(fakes.backends());

    let (request, out) = batch_request(dir.path(), &["a.wav", "b.wav", "c.wav"]);
    supervisor.start(request).unwrap();
    gate.wait_entered().await;

    assert!(supervisor.cancel());
    gate.open();

    assert_eq!(supervisor.wait().await, JobState::Failed { error: StudioError::Cancelled });
    assert!(out.join("a_output.wav").is_file());
    assert!(!out.join("b_output.wav").exists());
    assert!(!partial_path(&out.join("b_output.wav")).exists());
    assert!(!out.join("c_output.wav").exists());
    assert_eq!(fakes.converter.calls.load(Ordering::SeqCst), 2);
}
