//! Ошибки матричного движка

use thiserror::Error;

/// Результат операций над матрицами
pub type Result<T> = std::result::Result<T, MatrixError>;

/// Ошибки, возвращаемые операциями движка
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    /// Неположительное число строк или столбцов при выделении
    #[error("Invalid shape: {rows}x{cols}")]
    InvalidShape { rows: usize, cols: usize },

    /// Аллокатор не смог выделить память
    #[error("Allocation failed: {0}")]
    AllocationFailure(String),

    /// Размеры операндов не соответствуют контракту операции
    #[error("Shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// Операнд не указывает на живой блок
    #[error("Operand of {op} does not refer to a live matrix")]
    NullOperand { op: &'static str },

    /// Возведение в степень неквадратной матрицы или результат не того размера
    #[error("Dimension error: {0}")]
    DimensionError(String),

    /// Пустой или нечисловой диапазон для случайного заполнения
    #[error("Invalid random range: [{low}, {high})")]
    InvalidRange { low: f64, high: f64 },

    /// Не удалось создать пул потоков
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl MatrixError {
    /// Код статуса для слоя привязок
    pub fn code(&self) -> i32 {
        match self {
            MatrixError::InvalidShape { .. } => -1,
            MatrixError::AllocationFailure(_) => -2,
            MatrixError::ShapeMismatch { .. } => -3,
            MatrixError::NullOperand { .. } => -4,
            MatrixError::DimensionError(_) => -5,
            MatrixError::InvalidRange { .. } => -6,
            MatrixError::ThreadPool(_) => -7,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for MatrixError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MatrixError::ThreadPool(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for MatrixError {
    fn from(err: std::collections::TryReserveError) -> Self {
        MatrixError::AllocationFailure(err.to_string())
    }
}
