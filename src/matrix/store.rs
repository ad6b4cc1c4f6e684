//! Арена блоков и учет владельцев
//!
//! Каждый блок живет в слоте арены вместе со счетчиком владельцев.
//! Корневая матрица и каждый ее срез считаются владельцами блока;
//! блок освобождается, когда уходит последний из них.

use super::parallel::Workers;
use super::types::{BlockId, Matrix, Storage};
use crate::config::EngineConfig;
use crate::ensure_shape;
use crate::error::{MatrixError, Result};
use rayon::ThreadPool;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Источник памяти для блоков
pub trait BlockAllocator: Send {
    /// Выделяет обнуленный буфер из `len` элементов
    fn allocate(&mut self, len: usize) -> Result<Vec<f64>>;
}

/// Аллокатор поверх глобальной кучи, нехватка памяти возвращается как ошибка
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl BlockAllocator for SystemAllocator {
    fn allocate(&mut self, len: usize) -> Result<Vec<f64>> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0.0);
        Ok(data)
    }
}

/// Аллокатор для тестов: после `successes` удачных выделений все следующие падают
#[derive(Debug, Clone)]
pub struct CountdownAllocator {
    remaining: usize,
}

impl CountdownAllocator {
    pub fn new(successes: usize) -> Self {
        Self { remaining: successes }
    }
}

impl BlockAllocator for CountdownAllocator {
    fn allocate(&mut self, len: usize) -> Result<Vec<f64>> {
        if self.remaining == 0 {
            return Err(MatrixError::AllocationFailure(format!(
                "injected failure for {} elements",
                len
            )));
        }
        self.remaining -= 1;
        SystemAllocator.allocate(len)
    }
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

struct Block {
    data: Vec<f64>,
    owners: usize,
}

struct Slot {
    generation: u64,
    block: Option<Block>,
}

/// Хранилище матриц: арена блоков, аллокатор и пул рабочих потоков
pub struct MatrixStore {
    id: u64,
    slots: Vec<Slot>,
    free: Vec<usize>,
    allocator: Box<dyn BlockAllocator>,
    pool: ThreadPool,
    config: EngineConfig,
    allocations: usize,
}

impl MatrixStore {
    /// Создает хранилище с системным аллокатором
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_allocator(config, SystemAllocator)
    }

    /// Создает хранилище с заданным аллокатором
    pub fn with_allocator(config: EngineConfig, allocator: impl BlockAllocator + 'static) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("simd-matrix-{}", i))
            .build()?;
        debug!(threads = pool.current_num_threads(), chunk_groups = config.chunk_groups, "matrix store ready");
        Ok(Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            allocator: Box::new(allocator),
            pool,
            config,
            allocations: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Число потоков в пуле
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Выделяет корневую матрицу `rows x cols`, заполненную нулями
    pub fn allocate(&mut self, rows: usize, cols: usize) -> Result<Matrix> {
        if rows == 0 || cols == 0 {
            return Err(MatrixError::InvalidShape { rows, cols });
        }
        let len = rows.checked_mul(cols).ok_or_else(|| {
            MatrixError::AllocationFailure(format!("{}x{} overflows the address space", rows, cols))
        })?;
        if self.free.is_empty() {
            self.slots.try_reserve(1)?;
            self.free.try_reserve(self.slots.len() + 1)?;
        }
        let data = match self.allocator.allocate(len) {
            Ok(data) => data,
            Err(err) => {
                warn!(rows, cols, error = %err, "block allocation failed");
                return Err(err);
            }
        };
        let id = self.insert_block(data);
        self.allocations += 1;
        debug!(rows, cols, block = id.index, "allocated root matrix");
        Ok(Matrix {
            rows,
            cols,
            storage: Storage::Owned(id),
        })
    }

    /// Выделяет корневую матрицу и копирует в нее значения по строкам
    pub fn allocate_from(&mut self, rows: usize, cols: usize, values: &[f64]) -> Result<Matrix> {
        if rows.checked_mul(cols) != Some(values.len()) {
            return Err(MatrixError::ShapeMismatch {
                op: "allocate_from",
                detail: format!("{}x{} from {} values", rows, cols, values.len()),
            });
        }
        let matrix = self.allocate(rows, cols)?;
        let range = self.locate(&matrix, "allocate_from")?;
        if let Some(block) = self.block_mut(matrix.block()) {
            block.data[range].copy_from_slice(values);
        }
        Ok(matrix)
    }

    /// Создает срез `rows x cols` в блоке `root`, начиная с элемента `offset`.
    ///
    /// Срез среза ссылается прямо на корневой блок, цепочек не бывает.
    pub fn allocate_slice(&mut self, root: &Matrix, offset: usize, rows: usize, cols: usize) -> Result<Matrix> {
        if rows == 0 || cols == 0 {
            return Err(MatrixError::InvalidShape { rows, cols });
        }
        let parent = self.locate(root, "allocate_slice")?;
        let start = parent
            .start
            .checked_add(offset)
            .ok_or(MatrixError::InvalidShape { rows, cols })?;
        let end = rows
            .checked_mul(cols)
            .and_then(|len| start.checked_add(len))
            .ok_or(MatrixError::InvalidShape { rows, cols })?;
        let block_id = root.block();
        let block = self
            .block_mut(block_id)
            .ok_or(MatrixError::NullOperand { op: "allocate_slice" })?;
        if end > block.data.len() {
            return Err(MatrixError::InvalidShape { rows, cols });
        }
        block.owners += 1;
        debug!(rows, cols, offset = start, block = block_id.index, owners = block.owners, "allocated slice");
        Ok(Matrix {
            rows,
            cols,
            storage: Storage::Borrowed {
                root: block_id,
                offset: start,
            },
        })
    }

    /// Освобождает дескриптор. Блок освобождается вместе с последним владельцем.
    pub fn release(&mut self, matrix: impl Into<Option<Matrix>>) {
        let Some(matrix) = matrix.into() else {
            return;
        };
        let id = matrix.block();
        let Some(block) = self.block_mut(id) else {
            warn!(block = id.index, "release of a handle whose block is already gone");
            return;
        };
        if block.owners == 1 {
            self.free_block(id.index);
            debug!(block = id.index, slice = matrix.is_slice(), "block freed");
        } else {
            block.owners -= 1;
            debug!(block = id.index, owners = block.owners, "owner released");
        }
    }

    /// Число живых владельцев блока, на который смотрит матрица
    pub fn ref_cnt(&self, matrix: &Matrix) -> Result<usize> {
        self.block(matrix.block())
            .map(|block| block.owners)
            .ok_or(MatrixError::NullOperand { op: "ref_cnt" })
    }

    /// Делает `dst` еще одним владельцем данных `src` без копирования элементов.
    ///
    /// Прежний блок `dst` теряет одного владельца, а сам `dst` становится
    /// срезом того же корневого блока, что и `src`.
    pub fn aliasing_copy(&mut self, dst: &mut Matrix, src: &Matrix) -> Result<()> {
        const OP: &str = "aliasing_copy";
        self.ensure_live(OP, &[&*dst, src])?;
        ensure_shape!(dst.shape() == src.shape(), OP, "{:?} <- {:?}", dst.shape(), src.shape());
        let root = src.block();
        if let Some(block) = self.block_mut(root) {
            block.owners += 1;
        }
        let previous = std::mem::replace(
            &mut dst.storage,
            Storage::Borrowed {
                root,
                offset: src.offset(),
            },
        );
        self.release(Matrix {
            rows: dst.rows,
            cols: dst.cols,
            storage: previous,
        });
        Ok(())
    }

    /// Поэлементно копирует `src` в собственный блок `dst`
    pub fn deep_copy(&mut self, dst: &Matrix, src: &Matrix) -> Result<()> {
        const OP: &str = "deep_copy";
        self.ensure_live(OP, &[dst, src])?;
        ensure_shape!(dst.shape() == src.shape(), OP, "{:?} <- {:?}", dst.shape(), src.shape());
        self.with_views(OP, dst, &[src], |workers, out, views| {
            let source = views[0];
            workers.for_each_chunk(out, |start, chunk| {
                chunk.copy_from_slice(&source[start..start + chunk.len()]);
            });
        })
    }

    /// Копия элементов матрицы по строкам
    pub fn to_vec(&self, matrix: &Matrix) -> Result<Vec<f64>> {
        let view = self.view(matrix, "to_vec")?;
        let mut values = Vec::new();
        values.try_reserve_exact(view.len())?;
        values.extend_from_slice(view);
        Ok(values)
    }

    /// Сколько блоков сейчас занято
    pub fn live_blocks(&self) -> usize {
        self.slots.iter().filter(|slot| slot.block.is_some()).count()
    }

    /// Сколько блоков было выделено за все время
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Является ли матрица единственным владельцем своего блока
    pub(crate) fn sole_owner(&self, matrix: &Matrix) -> bool {
        self.ref_cnt(matrix).map_or(false, |owners| owners == 1)
    }

    pub(crate) fn ensure_live(&self, op: &'static str, matrices: &[&Matrix]) -> Result<()> {
        for matrix in matrices {
            self.locate(matrix, op)?;
        }
        Ok(())
    }

    /// Диапазон элементов матрицы внутри ее блока
    pub(crate) fn locate(&self, matrix: &Matrix, op: &'static str) -> Result<Range<usize>> {
        let block = self.block(matrix.block()).ok_or(MatrixError::NullOperand { op })?;
        let start = matrix.offset();
        let end = start + matrix.len();
        if end > block.data.len() {
            return Err(MatrixError::NullOperand { op });
        }
        Ok(start..end)
    }

    /// Окно элементов матрицы только для чтения
    pub(crate) fn view(&self, matrix: &Matrix, op: &'static str) -> Result<&[f64]> {
        let range = self.locate(matrix, op)?;
        let block = self.block(matrix.block()).ok_or(MatrixError::NullOperand { op })?;
        Ok(&block.data[range])
    }

    /// Дает замыканию изменяемое окно результата и окна источников.
    ///
    /// Источники из того же блока, что и результат, читаются из копии,
    /// снятой до записи.
    pub(crate) fn with_views<R, F>(&mut self, op: &'static str, result: &Matrix, sources: &[&Matrix], f: F) -> Result<R>
    where
        F: FnOnce(&Workers<'_>, &mut [f64], &[&[f64]]) -> R,
    {
        let out_range = self.locate(result, op)?;
        let mut ranges = Vec::with_capacity(sources.len());
        for source in sources {
            ranges.push(self.locate(source, op)?);
        }

        let out_id = result.block();
        let mut snapshots: Vec<Option<Vec<f64>>> = Vec::with_capacity(sources.len());
        for (source, range) in sources.iter().zip(&ranges) {
            if source.block() == out_id {
                let block = self.block(out_id).ok_or(MatrixError::NullOperand { op })?;
                let mut copy = Vec::new();
                copy.try_reserve_exact(range.len())?;
                copy.extend_from_slice(&block.data[range.clone()]);
                snapshots.push(Some(copy));
            } else {
                snapshots.push(None);
            }
        }

        let workers = Workers::new(&self.pool, self.config.chunk_len());
        let (before, rest) = self.slots.split_at_mut(out_id.index);
        let (out_slot, after) = rest.split_first_mut().ok_or(MatrixError::NullOperand { op })?;
        let (before, after): (&[Slot], &[Slot]) = (before, after);
        let out = out_slot
            .block
            .as_mut()
            .map(|block| &mut block.data[out_range.clone()])
            .ok_or(MatrixError::NullOperand { op })?;

        let views = sources
            .iter()
            .zip(&ranges)
            .zip(&snapshots)
            .map(|((source, range), copy)| {
                if let Some(copy) = copy {
                    return Ok(copy.as_slice());
                }
                let index = source.block().index;
                let slot = if index < out_id.index {
                    before.get(index)
                } else if index > out_id.index {
                    after.get(index - out_id.index - 1)
                } else {
                    None
                };
                slot.and_then(|slot| slot.block.as_ref())
                    .map(|block| &block.data[range.clone()])
                    .ok_or(MatrixError::NullOperand { op })
            })
            .collect::<Result<Vec<&[f64]>>>()?;
        Ok(f(&workers, out, &views))
    }

    fn block(&self, id: BlockId) -> Option<&Block> {
        if id.store != self.id {
            return None;
        }
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.block.as_ref())
    }

    fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        if id.store != self.id {
            return None;
        }
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.block.as_mut())
    }

    fn insert_block(&mut self, data: Vec<f64>) -> BlockId {
        let block = Block { data, owners: 1 };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.block = Some(block);
            return BlockId {
                store: self.id,
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            block: Some(block),
        });
        BlockId {
            store: self.id,
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    fn free_block(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.block = None;
        slot.generation += 1;
        self.free.push(index);
    }
}
