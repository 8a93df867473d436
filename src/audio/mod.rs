//! Модуль для работы с аудиофайлами
//!
//! Содержит эталонную реализацию чтения/записи WAV и чтение
//! внешних файлов кривой F0.

pub mod f0_file;
pub mod wav;

pub use f0_file::read_f0_override;
pub use wav::WavAudioIo;
