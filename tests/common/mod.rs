//! Фейковые бэкенды и помощники для интеграционных тестов

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::broadcast;

use rvc_studio::audio::wav::encode_wav;
use rvc_studio::audio::WavAudioIo;
use rvc_studio::backend::{
    AudioBuffer, AudioEffectsBackend, AudioIo, Backends, ConversionBackend, Embedding, F0Curve,
    ModelBackend, PitchEstimator, SpeakerEmbedder, TtsBackend,
};
use rvc_studio::catalog::ModelEntry;
use rvc_studio::config::{EmbedderModel, ExportFormat, F0Method};
use rvc_studio::effects::{PostEffect, PostEffectKind};
use rvc_studio::error::{Result, StudioError};
use rvc_studio::job::ConversionParams;
use rvc_studio::progress::JobEvent;

/// Шлюз, на котором конвертер блокируется до `open()`
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
    entered: AtomicBool,
}

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pass(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }

    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !self.entered() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker never reached the gate");
    }
}

#[derive(Default)]
pub struct FakePitch {
    pub calls: AtomicUsize,
}

impl PitchEstimator for FakePitch {
    fn estimate(&self, audio: &AudioBuffer, _method: F0Method, hop_length: u32) -> Result<F0Curve> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let frames = audio.len() / hop_length.max(1) as usize + 1;
        Ok(F0Curve::new(vec![220.0; frames]))
    }
}

pub struct FakeEmbedder;

impl SpeakerEmbedder for FakeEmbedder {
    fn embed(&self, audio: &AudioBuffer, _embedder: &EmbedderModel) -> Result<Embedding> {
        Ok(Embedding { features: vec![audio.len() as f32; 8] })
    }
}

#[derive(Default)]
pub struct FakeConverter {
    pub gate: Option<Arc<Gate>>,
    /// Сколько первых вызовов проходит мимо шлюза
    pub gate_after: usize,
    pub calls: AtomicUsize,
    pub fail: bool,
    pub last_f0: Mutex<Option<F0Curve>>,
    pub last_index: Mutex<Option<Option<PathBuf>>>,
}

impl ConversionBackend for FakeConverter {
    fn run(
        &self,
        _embedding: &Embedding,
        f0: &F0Curve,
        model: &ModelEntry,
        _params: &ConversionParams,
    ) -> Result<AudioBuffer> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.as_ref().filter(|_| call >= self.gate_after) {
            gate.pass();
        }
        *self.last_f0.lock() = Some(f0.clone());
        *self.last_index.lock() = Some(model.index.clone());
        if self.fail {
            return Err(StudioError::Backend("generator exploded".into()));
        }
        Ok(AudioBuffer::new(vec![0.1; 1600], 16000))
    }
}

#[derive(Default)]
pub struct FakeEffects {
    pub calls: AtomicUsize,
    pub post_calls: Mutex<Vec<PostEffectKind>>,
}

impl FakeEffects {
    fn touch(&self, audio: AudioBuffer) -> Result<AudioBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(audio)
    }
}

impl AudioEffectsBackend for FakeEffects {
    fn split_by_silence(&self, audio: AudioBuffer) -> Result<AudioBuffer> {
        self.touch(audio)
    }
    fn pitch_correct(&self, audio: AudioBuffer, _strength: f32) -> Result<AudioBuffer> {
        self.touch(audio)
    }
    fn denoise(&self, audio: AudioBuffer, _strength: f32) -> Result<AudioBuffer> {
        self.touch(audio)
    }
    fn formant_shift(&self, audio: AudioBuffer, _q: f32, _t: f32) -> Result<AudioBuffer> {
        self.touch(audio)
    }
    fn post_process(
        &self,
        audio: AudioBuffer,
        kind: PostEffectKind,
        _effect: &PostEffect,
    ) -> Result<AudioBuffer> {
        self.post_calls.lock().push(kind);
        self.touch(audio)
    }
}

/// Пишет WAV и блокируется на шлюзе уже после записи `.partial`
pub struct GatedAudioIo {
    pub gate: Arc<Gate>,
    inner: WavAudioIo,
}

impl GatedAudioIo {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self { gate, inner: WavAudioIo::new() }
    }
}

impl AudioIo for GatedAudioIo {
    fn read(&self, path: &Path) -> Result<AudioBuffer> {
        self.inner.read(path)
    }

    fn write(&self, audio: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
        self.inner.write(audio, path, format)?;
        self.gate.pass();
        Ok(())
    }
}

pub struct FakeTts;

impl TtsBackend for FakeTts {
    fn synthesize(&self, text: &str, _voice: &str, _rate: i32) -> Result<AudioBuffer> {
        Ok(AudioBuffer::new(vec![0.2; text.len() * 100], 16000))
    }
}

#[derive(Default)]
pub struct RecordingModelBackend {
    pub calls: Mutex<Vec<String>>,
}

impl ModelBackend for RecordingModelBackend {
    fn load(&self, entry: &ModelEntry) -> Result<()> {
        self.calls.lock().push(format!("load:{}", entry.id));
        Ok(())
    }

    fn unload(&self, entry: &ModelEntry) -> Result<()> {
        self.calls.lock().push(format!("unload:{}", entry.id));
        Ok(())
    }
}

/// Набор фейков с доступом к их счётчикам
pub struct Fakes {
    pub pitch: Arc<FakePitch>,
    pub converter: Arc<FakeConverter>,
    pub effects: Arc<FakeEffects>,
    pub audio_io: Arc<dyn AudioIo>,
}

impl Fakes {
    pub fn new() -> Self {
        Self::with_converter(FakeConverter::default())
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self::with_converter(FakeConverter { gate: Some(gate), ..Default::default() })
    }

    /// Шлюз на экспорте: задача стоит в `Finishing` с записанным `.partial`
    pub fn gated_export(gate: Arc<Gate>) -> Self {
        Self { audio_io: Arc::new(GatedAudioIo::new(gate)), ..Self::new() }
    }

    pub fn failing() -> Self {
        Self::with_converter(FakeConverter { fail: true, ..Default::default() })
    }

    pub fn with_converter(converter: FakeConverter) -> Self {
        Self {
            pitch: Arc::new(FakePitch::default()),
            converter: Arc::new(converter),
            effects: Arc::new(FakeEffects::default()),
            audio_io: Arc::new(WavAudioIo::new()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            pitch: self.pitch.clone(),
            embedder: Arc::new(FakeEmbedder),
            converter: self.converter.clone(),
            tts: Some(Arc::new(FakeTts)),
            effects: self.effects.clone(),
            audio_io: self.audio_io.clone(),
        }
    }
}

/// Записать короткий WAV-файл
pub fn write_wav(path: &Path) {
    let audio = AudioBuffer::new(vec![0.05; 3200], 16000);
    encode_wav(&audio, path).unwrap();
}

/// Создать файл весов модели
pub fn write_model(dir: &Path, id: &str) -> ModelEntry {
    let weights = dir.join(format!("{}.pth", id));
    std::fs::write(&weights, b"weights").unwrap();
    ModelEntry::new(id, weights)
}

/// Собрать события до терминального (включительно)
pub async fn collect_until_terminal(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("job did not finish in time");
    events
}
