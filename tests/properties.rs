//! Свойства операций на случайных входах

use proptest::prelude::*;
use simd_matrix::matrix::MatrixStore;
use simd_matrix::{EngineConfig, Matrix};

/// Размер и значения, точно представимые в double, чтобы a + b - b == a
fn matrix_values() -> impl Strategy<Value = (usize, usize, Vec<f64>, Vec<f64>)> {
    (1usize..9, 1usize..9).prop_flat_map(|(rows, cols)| {
        let cell = (-4000i32..4000).prop_map(|x| x as f64 * 0.25);
        (
            Just(rows),
            Just(cols),
            prop::collection::vec(cell.clone(), rows * cols),
            prop::collection::vec(cell, rows * cols),
        )
    })
}

fn run_elementwise(config: EngineConfig, rows: usize, cols: usize, a: &[f64], b: &[f64]) -> Vec<Vec<u64>> {
    let mut store = MatrixStore::new(config).unwrap();
    let ma = store.allocate_from(rows, cols, a).unwrap();
    let mb = store.allocate_from(rows, cols, b).unwrap();
    let r = store.allocate(rows, cols).unwrap();
    let mut outputs = Vec::new();
    let mut capture = |store: &MatrixStore, m: &Matrix| {
        outputs.push(store.to_vec(m).unwrap().iter().map(|x| x.to_bits()).collect::<Vec<u64>>());
    };

    store.add(&r, &ma, &mb).unwrap();
    capture(&store, &r);
    store.sub(&r, &ma, &mb).unwrap();
    capture(&store, &r);
    store.neg(&r, &ma).unwrap();
    capture(&store, &r);
    store.abs(&r, &mb).unwrap();
    capture(&store, &r);

    for m in [ma, mb, r] {
        store.release(m);
    }
    outputs
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn add_then_sub_round_trips((rows, cols, a, b) in matrix_values()) {
        let mut store = MatrixStore::new(EngineConfig::with_threads(2)).unwrap();
        let ma = store.allocate_from(rows, cols, &a).unwrap();
        let mb = store.allocate_from(rows, cols, &b).unwrap();
        let sum = store.allocate(rows, cols).unwrap();
        let back = store.allocate(rows, cols).unwrap();

        store.add(&sum, &ma, &mb).unwrap();
        store.sub(&back, &sum, &mb).unwrap();
        prop_assert_eq!(store.to_vec(&back).unwrap(), a);

        for m in [ma, mb, sum, back] {
            store.release(m);
        }
        prop_assert_eq!(store.live_blocks(), 0);
    }

    #[test]
    fn neg_and_abs_are_elementwise((rows, cols, a, _b) in matrix_values()) {
        let mut store = MatrixStore::new(EngineConfig::with_threads(2)).unwrap();
        let ma = store.allocate_from(rows, cols, &a).unwrap();
        let r = store.allocate(rows, cols).unwrap();

        store.neg(&r, &ma).unwrap();
        let negated: Vec<f64> = a.iter().map(|x| -x).collect();
        prop_assert_eq!(store.to_vec(&r).unwrap(), negated);

        store.abs(&r, &ma).unwrap();
        let absolute: Vec<f64> = a.iter().map(|x| x.abs()).collect();
        prop_assert_eq!(store.to_vec(&r).unwrap(), absolute);

        store.release(ma);
        store.release(r);
    }

    #[test]
    fn thread_count_does_not_change_bits((rows, cols, a, b) in matrix_values(), threads in 2usize..6) {
        let single = run_elementwise(EngineConfig { threads: 1, chunk_groups: 1024 }, rows, cols, &a, &b);
        let many = run_elementwise(EngineConfig { threads, chunk_groups: 1 }, rows, cols, &a, &b);
        prop_assert_eq!(single, many);
    }

    #[test]
    fn multiply_bits_independent_of_threads(n in 1usize..12, seed in any::<u64>()) {
        let mut outputs = Vec::new();
        for threads in [1, 4] {
            let mut store = MatrixStore::new(EngineConfig { threads, chunk_groups: 1 }).unwrap();
            let a = store.allocate(n, n).unwrap();
            store.random_fill(&a, seed, -3.0, 3.0).unwrap();
            let mut r = store.allocate(n, n).unwrap();
            store.power(&mut r, &a, 5).unwrap();
            outputs.push(store.to_vec(&r).unwrap().iter().map(|x| x.to_bits()).collect::<Vec<u64>>());
            store.release(a);
            store.release(r);
        }
        prop_assert_eq!(&outputs[0], &outputs[1]);
    }

    #[test]
    fn power_one_returns_input(n in 1usize..10, seed in any::<u64>()) {
        let mut store = MatrixStore::new(EngineConfig::with_threads(2)).unwrap();
        let a = store.allocate(n, n).unwrap();
        store.random_fill(&a, seed, -2.0, 2.0).unwrap();
        let mut r = store.allocate(n, n).unwrap();
        store.power(&mut r, &a, 1).unwrap();
        prop_assert_eq!(store.to_vec(&r).unwrap(), store.to_vec(&a).unwrap());
        store.release(a);
        store.release(r);
        prop_assert_eq!(store.live_blocks(), 0);
    }
}
