//! Доступ к элементам: чтение, запись, заполнение

use super::kernels;
use super::store::MatrixStore;
use super::types::Matrix;
use crate::error::{MatrixError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

impl MatrixStore {
    /// Элемент (row, col). Индексы проверяет вызывающая сторона.
    pub fn get(&self, matrix: &Matrix, row: usize, col: usize) -> Result<f64> {
        debug_assert!(row < matrix.rows && col < matrix.cols);
        let values = self.view(matrix, "get")?;
        Ok(values[row * matrix.cols + col])
    }

    /// Записывает `value` в элемент (row, col)
    pub fn set(&mut self, matrix: &Matrix, row: usize, col: usize, value: f64) -> Result<()> {
        debug_assert!(row < matrix.rows && col < matrix.cols);
        let cols = matrix.cols;
        self.with_views("set", matrix, &[], |_, out, _| {
            out[row * cols + col] = value;
        })
    }

    /// Заполняет все элементы матрицы значением `value`
    pub fn fill(&mut self, matrix: &Matrix, value: f64) -> Result<()> {
        self.with_views("fill", matrix, &[], |workers, out, _| {
            workers.for_each_chunk(out, |_, chunk| kernels::fill(chunk, value));
        })
    }

    /// Заполняет матрицу равномерно распределенными значениями из [low, high).
    ///
    /// Одинаковый `seed` дает одинаковую последовательность, элементы
    /// заполняются по строкам в одном потоке.
    pub fn random_fill(&mut self, matrix: &Matrix, seed: u64, low: f64, high: f64) -> Result<()> {
        if !(low < high) || !(high - low).is_finite() {
            return Err(MatrixError::InvalidRange { low, high });
        }
        let uniform = Uniform::new(low, high);
        let mut rng = StdRng::seed_from_u64(seed);
        self.with_views("random_fill", matrix, &[], |_, out, _| {
            for x in out.iter_mut() {
                *x = uniform.sample(&mut rng);
            }
        })
    }

    /// Единичная матрица: нули и единицы на диагонали
    pub(crate) fn set_identity(&mut self, matrix: &Matrix) -> Result<()> {
        let cols = matrix.cols;
        self.with_views("identity", matrix, &[], |workers, out, _| {
            workers.for_each_row(out, cols, |row, dst| {
                kernels::fill(dst, 0.0);
                if row < dst.len() {
                    dst[row] = 1.0;
                }
            });
        })
    }
}
