//! Операции над матрицами: поэлементная арифметика, умножение, возведение в степень

use super::kernels;
use super::store::MatrixStore;
use super::types::{Matrix, MatrixType};
use crate::ensure_shape;
use crate::error::{MatrixError, Result};
use tracing::{debug, trace};

impl MatrixStore {
    /// result = a + b
    pub fn add(&mut self, result: &Matrix, a: &Matrix, b: &Matrix) -> Result<()> {
        self.binary("add", result, a, b, kernels::add)
    }

    /// result = a - b
    pub fn sub(&mut self, result: &Matrix, a: &Matrix, b: &Matrix) -> Result<()> {
        self.binary("sub", result, a, b, kernels::sub)
    }

    /// result = -a
    pub fn neg(&mut self, result: &Matrix, a: &Matrix) -> Result<()> {
        self.unary("neg", result, a, kernels::neg)
    }

    /// result = |a|
    pub fn abs(&mut self, result: &Matrix, a: &Matrix) -> Result<()> {
        self.unary("abs", result, a, kernels::abs)
    }

    fn binary(
        &mut self,
        op: &'static str,
        result: &Matrix,
        a: &Matrix,
        b: &Matrix,
        kernel: fn(&mut [f64], &[f64], &[f64]),
    ) -> Result<()> {
        self.ensure_live(op, &[result, a, b])?;
        ensure_shape!(
            a.shape() == b.shape() && result.shape() == a.shape(),
            op,
            "{:?} = {:?} . {:?}",
            result.shape(),
            a.shape(),
            b.shape()
        );
        trace!(op, rows = a.rows, cols = a.cols, "elementwise");
        self.with_views(op, result, &[a, b], |workers, out, views| {
            let (lhs, rhs) = (views[0], views[1]);
            workers.for_each_chunk(out, |start, chunk| {
                let end = start + chunk.len();
                kernel(chunk, &lhs[start..end], &rhs[start..end]);
            });
        })
    }

    fn unary(
        &mut self,
        op: &'static str,
        result: &Matrix,
        a: &Matrix,
        kernel: fn(&mut [f64], &[f64]),
    ) -> Result<()> {
        self.ensure_live(op, &[result, a])?;
        ensure_shape!(result.shape() == a.shape(), op, "{:?} = {:?}", result.shape(), a.shape());
        trace!(op, rows = a.rows, cols = a.cols, "elementwise");
        self.with_views(op, result, &[a], |workers, out, views| {
            let src = views[0];
            workers.for_each_chunk(out, |start, chunk| {
                kernel(chunk, &src[start..start + chunk.len()]);
            });
        })
    }

    /// result = a * b (матричное умножение).
    ///
    /// `b` сначала транспонируется во временный буфер, чтобы оба операнда
    /// скалярного произведения лежали в памяти подряд.
    pub fn multiply(&mut self, result: &Matrix, a: &Matrix, b: &Matrix) -> Result<()> {
        const OP: &str = "multiply";
        self.ensure_live(OP, &[result, a, b])?;
        check_multiply_shapes(OP, result, a, b)?;
        let transposed = self.allocate(b.cols, b.rows)?;
        let outcome = self.multiply_with(result, a, b, &transposed);
        self.release(transposed);
        outcome
    }

    /// Умножение с готовым буфером для транспонированной `b` (размер b.cols x b.rows)
    pub(crate) fn multiply_with(&mut self, result: &Matrix, a: &Matrix, b: &Matrix, transposed: &Matrix) -> Result<()> {
        const OP: &str = "multiply";
        check_multiply_shapes(OP, result, a, b)?;
        ensure_shape!(
            transposed.shape() == (b.cols, b.rows),
            OP,
            "transpose scratch {:?}",
            transposed.shape()
        );
        trace!(m = a.rows, k = a.cols, n = b.cols, "multiply");

        let (inner, b_cols) = (b.rows, b.cols);
        self.with_views(OP, transposed, &[b], |workers, out, views| {
            let src = views[0];
            workers.for_each_row(out, inner, |j, column| {
                for (k, x) in column.iter_mut().enumerate() {
                    *x = src[k * b_cols + j];
                }
            });
        })?;

        self.with_views(OP, result, &[a, transposed], |workers, out, views| {
            let (lhs, bt) = (views[0], views[1]);
            workers.for_each_row(out, b_cols, |i, row| {
                let a_row = &lhs[i * inner..(i + 1) * inner];
                for (j, x) in row.iter_mut().enumerate() {
                    *x = kernels::dot(a_row, &bt[j * inner..(j + 1) * inner]);
                }
            });
        })
    }

    /// result = a^pow для квадратной `a` бинарным возведением в степень.
    ///
    /// Все временные буферы выделяются до первой записи в `result`,
    /// их число не зависит от `pow`.
    pub fn power(&mut self, result: &mut Matrix, a: &Matrix, pow: u32) -> Result<()> {
        const OP: &str = "power";
        self.ensure_live(OP, &[&*result, a])?;
        if a.rows != a.cols || result.shape() != a.shape() {
            return Err(MatrixError::DimensionError(format!(
                "power needs a square matrix and a result of the same shape, got {:?} and {:?}",
                a.shape(),
                result.shape()
            )));
        }
        let n = a.rows;
        debug!(n, pow, "power start");

        let scratch = PowerScratch::allocate(self, n)?;
        let outcome = self.power_steps(result, a, pow, &scratch);
        scratch.release(self);
        debug!(n, pow, ok = outcome.is_ok(), "power done");
        outcome
    }

    fn power_steps(&mut self, result: &mut Matrix, a: &Matrix, pow: u32, scratch: &PowerScratch) -> Result<()> {
        // `a` может лежать в блоке `result`, поэтому копируется до записи единичной матрицы
        self.deep_copy(&scratch.squares[0], a)?;
        self.set_identity(result)?;

        let mut state = PowerState::default();
        let mut bits = pow;
        while bits != 0 {
            let square = &scratch.squares[state.square];
            if bits & 1 == 1 {
                if state.product_in_result {
                    self.multiply_with(&scratch.product, result, square, &scratch.transposed)?;
                } else {
                    self.multiply_with(result, &scratch.product, square, &scratch.transposed)?;
                }
                state.product_in_result = !state.product_in_result;
            }
            bits >>= 1;
            // Последний квадрат никому не нужен
            if bits != 0 {
                let next = &scratch.squares[1 - state.square];
                self.multiply_with(next, square, square, &scratch.transposed)?;
                state.square = 1 - state.square;
            }
        }

        if !state.product_in_result {
            if self.sole_owner(result) {
                self.aliasing_copy(result, &scratch.product)?;
            } else {
                self.deep_copy(result, &scratch.product)?;
            }
        }
        Ok(())
    }
}

/// Какой буфер сейчас держит текущий квадрат и где лежит накопленное произведение
#[derive(Debug, Clone, Copy)]
struct PowerState {
    square: usize,
    product_in_result: bool,
}

impl Default for PowerState {
    fn default() -> Self {
        Self {
            square: 0,
            product_in_result: true,
        }
    }
}

/// Временные буферы возведения в степень
struct PowerScratch {
    product: Matrix,
    squares: [Matrix; 2],
    transposed: Matrix,
}

impl PowerScratch {
    /// Выделяет все буферы или ни одного
    fn allocate(store: &mut MatrixStore, n: usize) -> Result<Self> {
        let mut taken: Vec<Matrix> = Vec::with_capacity(4);
        for _ in 0..4 {
            match store.allocate(n, n) {
                Ok(m) => taken.push(m),
                Err(err) => {
                    for m in taken {
                        store.release(m);
                    }
                    return Err(err);
                }
            }
        }
        match <[Matrix; 4]>::try_from(taken) {
            Ok([product, first, second, transposed]) => Ok(Self {
                product,
                squares: [first, second],
                transposed,
            }),
            Err(rest) => {
                for m in rest {
                    store.release(m);
                }
                Err(MatrixError::AllocationFailure("power scratch".into()))
            }
        }
    }

    fn release(self, store: &mut MatrixStore) {
        let [first, second] = self.squares;
        store.release(self.product);
        store.release(first);
        store.release(second);
        store.release(self.transposed);
    }
}

fn check_multiply_shapes(op: &'static str, result: &Matrix, a: &Matrix, b: &Matrix) -> Result<()> {
    ensure_shape!(
        a.cols == b.rows && result.rows == a.rows && result.cols == b.cols,
        op,
        "{:?} = {:?} x {:?}",
        result.shape(),
        a.shape(),
        b.shape()
    );
    Ok(())
}

/// Заполняет пару входных матриц для демонстраций и замеров
pub fn initialize_matrices(store: &mut MatrixStore, matrix_type: MatrixType, a: &Matrix, b: &Matrix, seed: u64) -> Result<()> {
    match matrix_type {
        MatrixType::OnesAndTwos => {
            store.fill(a, 1.0)?;
            store.fill(b, 2.0)
        }
        MatrixType::ThreesAndFours => {
            store.fill(a, 3.0)?;
            store.fill(b, 4.0)
        }
        MatrixType::Random => {
            store.random_fill(a, seed, 0.0, 1.0)?;
            store.random_fill(b, seed.wrapping_add(1), 0.0, 1.0)
        }
    }
}

/// Наивное умножение i-j-k без транспонирования, эталон для проверки
pub fn cpu_matrix_multiply(a: &[f64], b: &[f64], c: &mut [f64], rows: usize, inner: usize, cols: usize) {
    for i in 0..rows {
        for j in 0..cols {
            let mut sum = 0.0f64;
            for k in 0..inner {
                sum += a[i * inner + k] * b[k * cols + j];
            }
            c[i * cols + j] = sum;
        }
    }
}

/// Итог сравнения двух результатов
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Сколько элементов отличается больше чем на epsilon
    pub mismatches: usize,
    /// Наибольшая абсолютная разница
    pub max_diff: f64,
}

impl Comparison {
    pub fn matches(&self) -> bool {
        self.mismatches == 0
    }
}

/// Сравнивает два результата поэлементно с допуском `epsilon`
pub fn compare_results(left: &[f64], right: &[f64], epsilon: f64) -> Comparison {
    let mut comparison = Comparison {
        mismatches: left.len().abs_diff(right.len()),
        max_diff: 0.0,
    };
    for (x, y) in left.iter().zip(right) {
        let diff = (x - y).abs();
        comparison.max_diff = comparison.max_diff.max(diff);
        if !(diff <= epsilon) {
            comparison.mismatches += 1;
        }
    }
    comparison
}
