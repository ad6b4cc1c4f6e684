//! Параллельные циклы по непересекающимся диапазонам индексов

use rayon::prelude::*;
use rayon::ThreadPool;

/// Пул потоков и размер порции для одного вызова операции
pub(crate) struct Workers<'a> {
    pool: &'a ThreadPool,
    chunk_len: usize,
}

impl<'a> Workers<'a> {
    pub(crate) fn new(pool: &'a ThreadPool, chunk_len: usize) -> Self {
        Self {
            pool,
            chunk_len: chunk_len.max(1),
        }
    }

    /// Делит `out` на порции и обрабатывает их в пуле.
    /// Замыкание получает индекс первого элемента порции.
    pub(crate) fn for_each_chunk<F>(&self, out: &mut [f64], f: F)
    where
        F: Fn(usize, &mut [f64]) + Sync + Send,
    {
        let chunk_len = self.chunk_len;
        if out.len() <= chunk_len {
            f(0, out);
            return;
        }
        self.pool.install(|| {
            out.par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(i, chunk)| f(i * chunk_len, chunk));
        });
    }

    /// Обрабатывает строки длины `row_len` параллельно
    pub(crate) fn for_each_row<F>(&self, out: &mut [f64], row_len: usize, f: F)
    where
        F: Fn(usize, &mut [f64]) + Sync + Send,
    {
        if row_len == 0 {
            return;
        }
        self.pool.install(|| {
            out.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(row, dst)| f(row, dst));
        });
    }
}
