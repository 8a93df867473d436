use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::Backends;
use crate::config::StudioConfig;
use crate::error::{Result, StudioError};
use crate::notification::JobObserver;
use crate::progress::{JobEvent, JobEventKind, JobPhase};

use super::pipeline::{discard_output, ConversionJob, WorkerMessage};
use super::request::JobRequest;
use super::state::JobState;

struct ActiveJob {
    id: Uuid,
    token: CancellationToken,
}

struct Inner {
    backends: Backends,
    state: watch::Sender<JobState>,
    events: broadcast::Sender<JobEvent>,
    observers: RwLock<Vec<Arc<dyn JobObserver>>>,
    current: Mutex<Option<ActiveJob>>,
    cleanup_partial: bool,
    catalog_transition: RwLock<Option<Arc<AtomicBool>>>,
}

impl Inner {
    fn emit(&self, event: JobEvent) {
        let observers: Vec<Arc<dyn JobObserver>> = self.observers.read().clone();
        for observer in &observers {
            observer.on_event(&event);
        }
        // Нет подписчиков — не ошибка
        let _ = self.events.send(event);
    }
}

/// Супервизор: не больше одной активной задачи на процесс.
///
/// Состояние хранится в `watch`-канале; переход в `Running` выполняется
/// одной операцией под его блокировкой, поэтому из нескольких
/// одновременных `start` выигрывает ровно один.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
}

impl JobSupervisor {
    pub fn new(backends: Backends) -> Self {
        Self::with_config(backends, &StudioConfig::default())
    }

    pub fn with_config(backends: Backends, config: &StudioConfig) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                backends,
                state,
                events,
                observers: RwLock::new(Vec::new()),
                current: Mutex::new(None),
                cleanup_partial: config.cleanup_partial_files,
                catalog_transition: RwLock::new(None),
            }),
        }
    }

    /// Отклонять `start`, пока каталог загружает или выгружает модель
    pub fn guard_catalog(&self, transition: Arc<AtomicBool>) {
        *self.inner.catalog_transition.write() = Some(transition);
    }

    pub fn add_observer(&self, observer: Box<dyn JobObserver>) {
        self.inner.observers.write().push(Arc::from(observer));
    }

    /// Подписаться на события всех последующих задач
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> JobState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<JobState> {
        self.inner.state.subscribe()
    }

    pub fn current_job_id(&self) -> Option<Uuid> {
        self.inner.current.lock().as_ref().map(|job| job.id)
    }

    /// Запустить задачу. Требует контекста рантайма tokio: без него
    /// возвращает `Configuration`, не меняя состояния.
    ///
    /// Пока другая задача в `Running` или `Finishing`, возвращает
    /// `AlreadyRunning`; запросы не ставятся в очередь.
    pub fn start(&self, request: JobRequest) -> Result<Uuid> {
        let runtime = Handle::try_current().map_err(|e| {
            StudioError::Configuration(format!("Starting a job requires a Tokio runtime: {}", e))
        })?;

        let transitioning = self
            .inner
            .catalog_transition
            .read()
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false);
        if transitioning {
            return Err(StudioError::Conflict(
                "Model catalog is loading or unloading a model".to_string(),
            ));
        }

        let job_id = request.id();
        let token = CancellationToken::new();

        let mut won = false;
        self.inner.state.send_if_modified(|state| {
            if !state.accepts_start() {
                return false;
            }
            *state = JobState::Running { progress: 0, phase: JobPhase::PreparingInput };
            *self.inner.current.lock() = Some(ActiveJob { id: job_id, token: token.clone() });
            won = true;
            true
        });

        if !won {
            log::warn!("Rejected job {}: another job is running", job_id);
            return Err(StudioError::AlreadyRunning);
        }

        log::info!("Job {} started", job_id);

        let request = Arc::new(request);
        let output = request.final_export().to_path_buf();
        let job = ConversionJob::new(request, self.inner.backends.clone(), token.clone())
            .with_partial_cleanup(self.inner.cleanup_partial);

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn_blocking(move || job.run(&tx));
        runtime.spawn(relay(self.inner.clone(), job_id, token, output, rx, worker));

        Ok(job_id)
    }

    /// Запросить отмену активной задачи.
    ///
    /// Возвращает `true`, если отмена принята: такая задача всегда
    /// завершится `Failed(Cancelled)`, даже если экспорт уже закончился.
    pub fn cancel(&self) -> bool {
        let mut accepted = false;
        self.inner.state.send_if_modified(|state| {
            if state.is_active() {
                if let Some(job) = self.inner.current.lock().as_ref() {
                    job.token.cancel();
                    accepted = true;
                }
            }
            false
        });

        if accepted {
            log::info!("Cancellation requested");
        }
        accepted
    }

    /// Дождаться, пока супервизор не окажется вне активного состояния
    pub async fn wait(&self) -> JobState {
        let mut rx = self.inner.state.subscribe();
        let result = rx.wait_for(|state| !state.is_active()).await.map(|state| state.clone());
        match result {
            Ok(state) => state,
            Err(_) => self.status(),
        }
    }
}

async fn relay(
    inner: Arc<Inner>,
    job_id: Uuid,
    token: CancellationToken,
    output: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    worker: JoinHandle<Result<PathBuf>>,
) {
    inner.emit(JobEvent::new(job_id, JobEventKind::Started));

    while let Some(message) = rx.recv().await {
        let kind = match message {
            WorkerMessage::Progress { phase, percent, message } => {
                inner.state.send_if_modified(|state| match state {
                    JobState::Running { .. } => {
                        *state = JobState::Running { progress: percent, phase };
                        true
                    }
                    _ => false,
                });
                JobEventKind::Progress { phase, percent, message }
            }
            WorkerMessage::Warning(message) => JobEventKind::Warning { message },
            WorkerMessage::Finishing => {
                inner.state.send_if_modified(|state| match state {
                    JobState::Running { .. } => {
                        *state = JobState::Finishing;
                        true
                    }
                    _ => false,
                });
                JobEventKind::Finishing
            }
        };
        inner.emit(JobEvent::new(job_id, kind));
    }

    let result = match worker.await {
        Ok(result) => result,
        Err(e) => Err(StudioError::Backend(format!("Conversion worker panicked: {}", e))),
    };

    let mut terminal = JobState::Idle;
    inner.state.send_if_modified(|state| {
        // Отмена принимается под этой же блокировкой, поэтому принятая
        // отмена всегда побеждает успешный экспорт
        let next = if token.is_cancelled() {
            if result.is_ok() {
                discard_output(&output);
            }
            JobState::Failed { error: StudioError::Cancelled }
        } else {
            match &result {
                Ok(path) => JobState::Completed { output: path.clone() },
                Err(error) => JobState::Failed { error: error.clone() },
            }
        };
        *state = next.clone();
        *inner.current.lock() = None;
        terminal = next;
        true
    });

    let kind = match terminal {
        JobState::Completed { output } => {
            log::info!("Job {} completed", job_id);
            JobEventKind::Completed { output }
        }
        JobState::Failed { error } => {
            log::info!("Job {} failed: {}", job_id, error);
            JobEventKind::Failed { error }
        }
        other => {
            log::error!("Job {} ended in unexpected state {}", job_id, other.as_str());
            return;
        }
    };
    inner.emit(JobEvent::new(job_id, kind));
}
