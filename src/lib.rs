//! Плотные матрицы double с векторными ядрами и многопоточными циклами

pub mod config;
pub mod error;
pub mod matrix;
pub mod utils;

// Реэкспортируем макросы на уровень крейта
#[macro_use]
mod macros {
    /// Макрос для проверки размеров операндов
    #[macro_export]
    macro_rules! ensure_shape {
        ($cond:expr, $op:expr, $($fmt:tt)+) => {
            if !$cond {
                return Err($crate::error::MatrixError::ShapeMismatch {
                    op: $op,
                    detail: format!($($fmt)+),
                });
            }
        };
    }
}

// Реэкспорт основных типов для удобства
pub use config::EngineConfig;
pub use error::{MatrixError, Result};
pub use matrix::{Matrix, MatrixStore, MatrixType};
