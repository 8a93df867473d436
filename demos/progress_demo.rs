//! Пример использования системы прогресса и уведомлений
//!
//! Пример устанавливает «модель» через drop, загружает её и запускает
//! задачу синтеза речи с конвертацией. Бэкенды здесь заглушки: вместо
//! нейросетей они генерируют синусоиду и слегка её обрабатывают.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rvc_studio::audio::WavAudioIo;
use rvc_studio::backend::{
    AudioBuffer, AudioEffectsBackend, Backends, ConversionBackend, Embedding, F0Curve,
    ModelBackend, PitchEstimator, SpeakerEmbedder, TtsBackend,
};
use rvc_studio::config::{EmbedderModel, F0Method};
use rvc_studio::effects::{PostEffect, PostEffectKind};
use rvc_studio::job::{ConversionParams, InputSource};
use rvc_studio::notification::{CompositeObserver, MemoryObserver};
use rvc_studio::utils::init_logger;
use rvc_studio::{ModelEntry, Studio, StudioConfig};

const SAMPLE_RATE: u32 = 16000;

struct SinePitch;

impl PitchEstimator for SinePitch {
    fn estimate(&self, audio: &AudioBuffer, _method: F0Method, hop: u32) -> rvc_studio::Result<F0Curve> {
        Ok(F0Curve::new(vec![220.0; audio.len() / hop.max(1) as usize]))
    }
}

struct MeanEmbedder;

impl SpeakerEmbedder for MeanEmbedder {
    fn embed(&self, audio: &AudioBuffer, _model: &EmbedderModel) -> rvc_studio::Result<Embedding> {
        let mean = audio.samples.iter().sum::<f32>() / audio.len().max(1) as f32;
        Ok(Embedding { features: vec![mean; 16] })
    }
}

struct SlowConverter;

impl ConversionBackend for SlowConverter {
    fn run(
        &self,
        _embedding: &Embedding,
        f0: &F0Curve,
        _model: &ModelEntry,
        params: &ConversionParams,
    ) -> rvc_studio::Result<AudioBuffer> {
        std::thread::sleep(Duration::from_millis(300));
        let ratio = 2f32.powf(params.pitch as f32 / 12.0);
        let freq = f0.values.first().copied().unwrap_or(220.0) * ratio;
        Ok(sine(freq, 2.0))
    }
}

struct GainEffects;

impl AudioEffectsBackend for GainEffects {
    fn split_by_silence(&self, audio: AudioBuffer) -> rvc_studio::Result<AudioBuffer> {
        Ok(audio)
    }
    fn pitch_correct(&self, audio: AudioBuffer, _strength: f32) -> rvc_studio::Result<AudioBuffer> {
        Ok(audio)
    }
    fn denoise(&self, mut audio: AudioBuffer, strength: f32) -> rvc_studio::Result<AudioBuffer> {
        audio.samples.iter_mut().for_each(|s| *s *= 1.0 - strength * 0.1);
        Ok(audio)
    }
    fn formant_shift(&self, audio: AudioBuffer, _q: f32, _t: f32) -> rvc_studio::Result<AudioBuffer> {
        Ok(audio)
    }
    fn post_process(
        &self,
        mut audio: AudioBuffer,
        kind: PostEffectKind,
        effect: &PostEffect,
    ) -> rvc_studio::Result<AudioBuffer> {
        if kind == PostEffectKind::Gain {
            let factor = 10f32.powf(effect.value(kind, "db") / 20.0);
            audio.samples.iter_mut().for_each(|s| *s *= factor);
        }
        Ok(audio)
    }
}

struct SineTts;

impl TtsBackend for SineTts {
    fn synthesize(&self, text: &str, _voice: &str, rate: i32) -> rvc_studio::Result<AudioBuffer> {
        let seconds = text.len() as f32 * 0.06 * (1.0 - rate as f32 / 200.0);
        Ok(sine(180.0, seconds.max(0.5)))
    }
}

struct NoopModelBackend;

impl ModelBackend for NoopModelBackend {
    fn load(&self, entry: &ModelEntry) -> rvc_studio::Result<()> {
        log::info!("(demo) loading weights {}", entry.weights.display());
        Ok(())
    }
    fn unload(&self, _entry: &ModelEntry) -> rvc_studio::Result<()> {
        Ok(())
    }
}

fn sine(freq: f32, seconds: f32) -> AudioBuffer {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    let samples = (0..len)
        .map(|i| (i as f32 / SAMPLE_RATE as f32 * freq * 2.0 * std::f32::consts::PI).sin() * 0.4)
        .collect();
    AudioBuffer::new(samples, SAMPLE_RATE)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализируем логирование
    init_logger();

    let root = std::env::temp_dir().join("rvc-studio-demo");
    let config = StudioConfig::with_root(&root);

    let backends = Backends {
        pitch: Arc::new(SinePitch),
        embedder: Arc::new(MeanEmbedder),
        converter: Arc::new(SlowConverter),
        tts: Some(Arc::new(SineTts)),
        effects: Arc::new(GainEffects),
        audio_io: Arc::new(WavAudioIo::new()),
    };

    let mut studio = Studio::new(config, backends, Arc::new(NoopModelBackend))?;

    // Наблюдатели: история в памяти плюс подписка на канал событий
    let memory = MemoryObserver::new();
    let mut composite = CompositeObserver::new();
    composite.add_observer(Box::new(memory.clone()));
    studio.supervisor().add_observer(Box::new(composite));
    let mut events = studio.supervisor().subscribe();

    println!("Пример 1: установка модели через drop");
    let dropped = root.join("demo_voice.pth");
    std::fs::write(&dropped, b"not really weights").context("writing demo model")?;
    let junk = root.join("readme.exe");
    std::fs::write(&junk, b"junk").context("writing junk file")?;
    let report = studio.install_dropped([&dropped, &junk]);
    println!("{}", report.summary());

    studio.load_model("demo_voice")?;

    println!("\nПример 2: синтез речи с конвертацией");
    studio.settings_mut().params.pitch = 5;
    let effects = &mut studio.settings_mut().effects;
    effects.clean.enabled = true;
    effects.post.enabled = true;
    effects.post.set(PostEffectKind::Gain, PostEffect::enabled().with("db", -3.0));
    studio.save_preset("demo", true)?;

    studio.start_job(
        InputSource::Text {
            text: "Hello from the conversion pipeline".to_string(),
            voice: "en-US-AriaNeural".to_string(),
            rate: 10,
        },
        root.join("output").join("demo"),
        None,
    )?;

    loop {
        let event = events.recv().await?;
        let info = event.info();
        match info.percent {
            Some(percent) => println!("[{:>3}%] {}: {}", percent, info.phase, info.message),
            None => println!("[----] {}: {}", info.phase, info.message),
        }
        if event.is_terminal() {
            break;
        }
    }

    println!("\nСостояние: {:?}", studio.supervisor().status());
    println!("Событий получено: {}", memory.history().len());
    Ok(())
}
