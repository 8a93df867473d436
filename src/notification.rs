//! Модуль для реализации системы уведомлений
//!
//! Этот модуль предоставляет трейт наблюдателя событий задачи и его
//! конкретные реализации. Наблюдатели вызываются задачей-ретранслятором
//! супервизора строго в порядке событий одной задачи.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::progress::{JobEvent, JobEventKind};

/// Наблюдатель событий задачи
pub trait JobObserver: Send + Sync {
    /// Вызывается для каждого события задачи
    fn on_event(&self, event: &JobEvent);
}

/// Наблюдатель, пишущий события в лог
#[derive(Debug, Default)]
pub struct LoggingObserver {
    /// Префикс для вывода (опционально)
    prefix: Option<String>,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }

    /// Строка лога для события. Сообщение прогресса уже содержит процент.
    pub fn format_line(&self, event: &JobEvent) -> String {
        let prefix = self.prefix.as_deref().unwrap_or("");
        format!("{}[job {}] {}", prefix, event.job_id, event.info().message)
    }
}

impl JobObserver for LoggingObserver {
    fn on_event(&self, event: &JobEvent) {
        let line = self.format_line(event);

        match &event.kind {
            JobEventKind::Warning { .. } => log::warn!("{}", line),
            JobEventKind::Failed { error } if !error.is_cancelled() => log::error!("{}", line),
            _ => log::info!("{}", line),
        }
    }
}

/// Наблюдатель, сохраняющий события в памяти
#[derive(Debug, Clone, Default)]
pub struct MemoryObserver {
    /// История событий
    history: Arc<Mutex<Vec<JobEvent>>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить историю событий
    pub fn history(&self) -> Vec<JobEvent> {
        self.history.lock().clone()
    }

    /// Только проценты из событий `Progress`, в порядке поступления
    pub fn percents(&self) -> Vec<u8> {
        self.history
            .lock()
            .iter()
            .filter_map(|e| match e.kind {
                JobEventKind::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }

    /// Тексты предупреждений
    pub fn warnings(&self) -> Vec<String> {
        self.history
            .lock()
            .iter()
            .filter_map(|e| match &e.kind {
                JobEventKind::Warning { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Очистить историю
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl JobObserver for MemoryObserver {
    fn on_event(&self, event: &JobEvent) {
        self.history.lock().push(event.clone());
    }
}

/// Наблюдатель, вызывающий функцию обратного вызова
pub struct CallbackObserver<F>
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> JobObserver for CallbackObserver<F>
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &JobEvent) {
        (self.callback)(event);
    }
}

/// Наблюдатель, отправляющий события через канал
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { sender }
    }
}

impl JobObserver for ChannelObserver {
    fn on_event(&self, event: &JobEvent) {
        if self.sender.send(event.clone()).is_err() {
            log::debug!("Event receiver dropped, event for job {} discarded", event.job_id);
        }
    }
}

/// Комбинированный наблюдатель, объединяющий несколько наблюдателей
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn JobObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn JobObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Удалить всех наблюдателей
    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl JobObserver for CompositeObserver {
    fn on_event(&self, event: &JobEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::JobPhase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn progress(percent: u8) -> JobEvent {
        JobEvent::new(
            Uuid::nil(),
            JobEventKind::Progress {
                phase: JobPhase::Conversion,
                percent,
                message: "Converting".into(),
            },
        )
    }

    #[test]
    fn test_logging_observer() {
        let observer = LoggingObserver::with_prefix("[Test] ");
        observer.on_event(&progress(10));
        observer.on_event(&JobEvent::new(
            Uuid::nil(),
            JobEventKind::Warning { message: "F0 file not found".into() },
        ));
    }

    #[test]
    fn test_logging_observer_keeps_progress_message() {
        let observer = LoggingObserver::with_prefix("[Test] ");
        let event = JobEvent::new(
            Uuid::nil(),
            JobEventKind::Progress {
                phase: JobPhase::Conversion,
                percent: 40,
                message: "Processing... 40% (Converting voice)".into(),
            },
        );

        let line = observer.format_line(&event);
        assert_eq!(line, format!("[Test] [job {}] Processing... 40% (Converting voice)", Uuid::nil()));
        assert_eq!(line.matches("Processing...").count(), 1);
    }

    #[test]
    fn test_memory_observer() {
        let observer = MemoryObserver::new();

        observer.on_event(&JobEvent::new(Uuid::nil(), JobEventKind::Started));
        observer.on_event(&progress(25));
        observer.on_event(&progress(50));

        assert_eq!(observer.history().len(), 3);
        assert_eq!(observer.percents(), vec![25, 50]);

        observer.clear_history();
        assert!(observer.history().is_empty());
    }

    #[test]
    fn test_channel_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        observer.on_event(&progress(5));
        let received = rx.try_recv().unwrap();
        assert_eq!(received, progress(5));

        drop(rx);
        // Закрытый канал не приводит к панике
        observer.on_event(&progress(6));
    }

    #[test]
    fn test_composite_observer() {
        let memory = MemoryObserver::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let mut composite = CompositeObserver::new();
        composite.add_observer(Box::new(memory.clone()));
        composite.add_observer(Box::new(CallbackObserver::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(composite.len(), 2);

        composite.on_event(&progress(30));

        assert_eq!(memory.history().len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
