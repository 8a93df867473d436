use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, если `RUST_LOG` не задан
pub const DEFAULT_FILTER: &str = "warn,rvc_studio=info";

/// Инициализировать логгер. Повторный вызов ничего не делает.
pub fn init_logger() {
    init_logger_with(DEFAULT_FILTER);
}

/// Инициализировать логгер с заданным фильтром по умолчанию
pub fn init_logger_with(default_filter: &str) {
    // Установка базового фильтра и переопределение через переменные окружения
    let env = Env::default().filter_or("RUST_LOG", default_filter);

    let mut builder = Builder::from_env(env);

    builder
        // Служебные модули рантайма слишком шумные
        .filter_module("mio", LevelFilter::Error)
        .filter_module("tokio_util", LevelFilter::Error)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
