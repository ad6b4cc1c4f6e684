//! Модуль для работы с матрицами
//!
//! Предоставляет:
//! - Хранилище блоков с учетом владельцев и срезами
//! - Доступ к элементам
//! - Поэлементные операции, умножение и возведение в степень
//! - Векторные ядра с параллельными циклами

mod access;
mod parallel;
mod store;
mod types;
pub mod kernels;
pub mod operations;

pub use kernels::GROUP_WIDTH;
pub use operations::{compare_results, cpu_matrix_multiply, initialize_matrices, Comparison};
pub use store::{BlockAllocator, CountdownAllocator, MatrixStore, SystemAllocator};
pub use types::{BlockId, Matrix, MatrixType, Storage};
