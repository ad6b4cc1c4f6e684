//! Вспомогательные функции и утилиты

use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Измеряет время выполнения функции
pub fn measure_time<F, T>(f: F) -> (T, std::time::Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}

/// Подключает вывод логов, уровень берется из RUST_LOG (по умолчанию info)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Повторная инициализация в тестах не считается ошибкой
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_time_returns_value() {
        let (value, duration) = measure_time(|| 21 * 2);
        assert_eq!(value, 42);
        assert!(duration.as_secs() < 5);
    }

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
