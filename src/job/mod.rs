//! Задачи конвертации
//!
//! `JobRequest` — неизменяемый снимок входных данных, `ConversionJob` —
//! конвейер F0 → эмбеддинг → конвертация → эффекты → экспорт,
//! `JobSupervisor` — единственная точка запуска и отмены задач.

mod pipeline;
mod request;
mod state;
mod supervisor;

pub use pipeline::partial_path;
pub use request::{BatchItem, ConversionParams, InputSource, JobRequest, JobRequestBuilder};
pub use state::JobState;
pub use supervisor::JobSupervisor;
