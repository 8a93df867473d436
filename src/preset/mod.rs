//! Пресеты параметров инференса
//!
//! `Preset` — версионированная схема с необязательными полями,
//! `PresetStore` — хранилище именованных пресетов на диске.

mod schema;
mod store;

pub use schema::{ApplyReport, InferenceSettings, Preset, PRESET_VERSION};
pub use store::{validate_name, PresetList, PresetNames, PresetStore};
