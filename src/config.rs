//! Настройки движка: размер пула потоков и гранулярность параллельных циклов

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Переменная окружения с числом рабочих потоков
pub const THREADS_ENV: &str = "SIMD_MATRIX_THREADS";
/// Переменная окружения с числом групп на одну задачу
pub const CHUNK_GROUPS_ENV: &str = "SIMD_MATRIX_CHUNK_GROUPS";

const DEFAULT_CHUNK_GROUPS: usize = 1024;

/// Конфигурация движка
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Число рабочих потоков, 0 означает все логические ядра
    pub threads: usize,
    /// Сколько групп по 4 элемента получает одна задача пула
    pub chunk_groups: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            chunk_groups: DEFAULT_CHUNK_GROUPS,
        }
    }
}

impl EngineConfig {
    /// Конфигурация с заданным числом потоков
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// Читает настройки из переменных окружения, некорректные значения игнорируются
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(threads) = parse_env(THREADS_ENV) {
            config.threads = threads;
        }
        if let Some(groups) = parse_env(CHUNK_GROUPS_ENV) {
            config.chunk_groups = groups;
        }
        config
    }

    /// Загружает настройки из JSON файла
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Не удалось прочитать {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Разбирает настройки из JSON строки
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Некорректный JSON конфигурации")
    }

    /// Число элементов в одной задаче параллельного цикла
    pub fn chunk_len(&self) -> usize {
        self.chunk_groups.max(1) * crate::matrix::GROUP_WIDTH
    }
}

fn parse_env(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
