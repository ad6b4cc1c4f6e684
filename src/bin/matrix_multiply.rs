//! Замер производительности умножения и возведения в степень на CPU
use anyhow::{ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use prettytable::{row, Table};
use simd_matrix::{
    matrix::{compare_results, cpu_matrix_multiply, initialize_matrices, kernels::simd_available, MatrixStore, MatrixType},
    utils::{init_tracing, measure_time},
    EngineConfig,
};
use tracing::info;

const MATRIX_SIZE: usize = 512;
const NUM_ITERATIONS: u64 = 10;
const POWER: u32 = 5;
const SEED: u64 = 2024;

fn main() -> Result<()> {
    init_tracing();
    let matrix_type = MatrixType::Random;

    println!("Замер матричных операций на CPU");
    println!("Размер матриц: {}x{}", MATRIX_SIZE, MATRIX_SIZE);

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_file(&path)?,
        None => EngineConfig::from_env(),
    };
    let mut store = MatrixStore::new(config).context("Не удалось создать хранилище матриц")?;
    info!(threads = store.threads(), simd = simd_available(), "движок готов");

    let a = store.allocate(MATRIX_SIZE, MATRIX_SIZE)?;
    let b = store.allocate(MATRIX_SIZE, MATRIX_SIZE)?;
    let c = store.allocate(MATRIX_SIZE, MATRIX_SIZE)?;
    initialize_matrices(&mut store, matrix_type, &a, &b, SEED)?;

    let pb = ProgressBar::new(NUM_ITERATIONS);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
            .context("Некорректный шаблон прогресс-бара")?
            .progress_chars("#>-"),
    );
    let (outcome, engine_duration) = measure_time(|| -> Result<()> {
        for _ in 0..NUM_ITERATIONS {
            store.multiply(&c, &a, &b)?;
            pb.inc(1);
        }
        Ok(())
    });
    outcome?;
    pb.finish_with_message("Умножение завершено");
    let engine_avg = engine_duration.as_secs_f64() / NUM_ITERATIONS as f64;

    // Эталон на ndarray
    let lhs = Array2::from_shape_vec((MATRIX_SIZE, MATRIX_SIZE), store.to_vec(&a)?)?;
    let rhs = Array2::from_shape_vec((MATRIX_SIZE, MATRIX_SIZE), store.to_vec(&b)?)?;
    let (reference, reference_duration) = measure_time(|| lhs.dot(&rhs));
    let multiply_check = compare_results(
        &store.to_vec(&c)?,
        reference.as_slice().context("Эталон не лежит подряд в памяти")?,
        1e-9,
    );

    // Наивное i-j-k умножение как второй эталон
    let (lhs_values, rhs_values) = (store.to_vec(&a)?, store.to_vec(&b)?);
    let mut naive = vec![0.0; MATRIX_SIZE * MATRIX_SIZE];
    let ((), naive_duration) = measure_time(|| {
        cpu_matrix_multiply(&lhs_values, &rhs_values, &mut naive, MATRIX_SIZE, MATRIX_SIZE, MATRIX_SIZE)
    });
    let naive_check = compare_results(&store.to_vec(&c)?, &naive, 1e-9);

    // Степень сверяем с последовательным умножением
    let small = 64;
    let base = store.allocate(small, small)?;
    store.random_fill(&base, SEED, -0.5, 0.5)?;
    let mut powered = store.allocate(small, small)?;
    let (outcome, power_duration) = measure_time(|| store.power(&mut powered, &base, POWER));
    outcome?;
    let base_values = Array2::from_shape_vec((small, small), store.to_vec(&base)?)?;
    let mut expected = Array2::<f64>::eye(small);
    for _ in 0..POWER {
        expected = expected.dot(&base_values);
    }
    let power_check = compare_results(
        &store.to_vec(&powered)?,
        expected.as_slice().context("Эталон не лежит подряд в памяти")?,
        1e-9,
    );

    let mut table = Table::new();
    table.add_row(row!["Операция", "Время", "Совпадает", "Макс. разница"]);
    table.add_row(row![
        format!("multiply {}x{}", MATRIX_SIZE, MATRIX_SIZE),
        format!("{:.3} мс", engine_avg * 1000.0),
        multiply_check.matches(),
        format!("{:e}", multiply_check.max_diff)
    ]);
    table.add_row(row![
        "ndarray dot",
        format!("{:.3} мс", reference_duration.as_secs_f64() * 1000.0),
        "-",
        "-"
    ]);
    table.add_row(row![
        "naive i-j-k",
        format!("{:.3} мс", naive_duration.as_secs_f64() * 1000.0),
        naive_check.matches(),
        format!("{:e}", naive_check.max_diff)
    ]);
    table.add_row(row![
        format!("power {}x{} ^{}", small, small, POWER),
        format!("{:.3} мс", power_duration.as_secs_f64() * 1000.0),
        power_check.matches(),
        format!("{:e}", power_check.max_diff)
    ]);
    table.printstd();

    for m in [a, b, c, base, powered] {
        store.release(m);
    }
    ensure!(store.live_blocks() == 0, "Остались неосвобожденные блоки");
    ensure!(
        multiply_check.matches() && naive_check.matches() && power_check.matches(),
        "Результаты расходятся с эталоном"
    );
    println!("Программа завершена.");
    Ok(())
}
