//! Пример использования библиотеки

use anyhow::{Context, Result};
use simd_matrix::{
    matrix::{kernels::simd_available, Matrix, MatrixStore},
    utils::init_tracing,
    EngineConfig,
};
use tracing::info;

fn print_matrix(store: &MatrixStore, name: &str, matrix: &Matrix) -> Result<()> {
    let values = store.to_vec(matrix)?;
    println!("{} ({}x{}):", name, matrix.rows(), matrix.cols());
    for row in values.chunks(matrix.cols()) {
        for value in row {
            print!("{:8.1} ", value);
        }
        println!();
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();

    let config = EngineConfig::from_env();
    let mut store = MatrixStore::new(config).context("Не удалось создать хранилище матриц")?;
    info!(threads = store.threads(), simd = simd_available(), "движок готов");

    let a = store.allocate_from(2, 2, &[1.0, 2.0, 3.0, 4.0])?;
    let mut cube = store.allocate(2, 2)?;
    store.power(&mut cube, &a, 3)?;
    print_matrix(&store, "A", &a)?;
    print_matrix(&store, "A^3", &cube)?;

    // Срез второй строки A^3 видит те же данные
    let row = store.allocate_slice(&cube, 2, 1, 2)?;
    let negated = store.allocate(1, 2)?;
    store.neg(&negated, &row)?;
    print_matrix(&store, "-A^3[1]", &negated)?;
    println!("Владельцев блока A^3: {}", store.ref_cnt(&cube)?);

    for m in [a, cube, row, negated] {
        store.release(m);
    }
    println!("Живых блоков после освобождения: {}", store.live_blocks());
    Ok(())
}
