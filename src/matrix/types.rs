//! Типы матриц и связанные структуры

/// Идентификатор слота арены блоков
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub(crate) store: u64,
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// Кому принадлежит блок, на который смотрит матрица
#[derive(Debug, PartialEq, Eq)]
pub enum Storage {
    /// Корневая матрица, владеющая своим блоком
    Owned(BlockId),
    /// Срез: окно в блок корневой матрицы начиная с `offset`
    Borrowed { root: BlockId, offset: usize },
}

/// Дескриптор матрицы.
///
/// Данные живут в [`MatrixStore`](super::MatrixStore); дескриптор не клонируется
/// и поглощается при освобождении.
#[derive(Debug, PartialEq, Eq)]
pub struct Matrix {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) storage: Storage,
}

impl Matrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Размер в виде (строки, столбцы)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Число элементов
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Смотрит ли матрица в чужой блок (`Storage::Borrowed`).
    ///
    /// Это не значит, что у нее есть живой корень: после `aliasing_copy`
    /// или `power` единственный владелец блока тоже может быть `Borrowed`.
    pub fn is_slice(&self) -> bool {
        matches!(self.storage, Storage::Borrowed { .. })
    }

    pub(crate) fn block(&self) -> BlockId {
        match self.storage {
            Storage::Owned(id) => id,
            Storage::Borrowed { root, .. } => root,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        match self.storage {
            Storage::Owned(_) => 0,
            Storage::Borrowed { offset, .. } => offset,
        }
    }
}

/// Способ заполнения входных матриц для демонстраций и замеров
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixType {
    /// Матрицы заполненные 1 и 2
    OnesAndTwos,
    /// Матрицы заполненные 3 и 4
    ThreesAndFours,
    /// Случайно заполненные матрицы
    Random,
}
