//! Учет владельцев блоков: корни, срезы, разделяемые копии, сбои аллокатора

use simd_matrix::matrix::{CountdownAllocator, MatrixStore};
use simd_matrix::{EngineConfig, Matrix, MatrixError};

fn store() -> MatrixStore {
    MatrixStore::new(EngineConfig::with_threads(2)).unwrap()
}

#[test]
fn two_slices_then_root_free_block_once() {
    let mut store = store();
    let root = store.allocate(4, 4).unwrap();
    let s1 = store.allocate_slice(&root, 0, 2, 4).unwrap();
    let s2 = store.allocate_slice(&root, 8, 2, 4).unwrap();
    assert_eq!(store.ref_cnt(&root).unwrap(), 3);
    assert!(s1.is_slice() && s2.is_slice());

    store.release(s1);
    assert_eq!(store.ref_cnt(&root).unwrap(), 2);
    store.release(s2);
    assert_eq!(store.ref_cnt(&root).unwrap(), 1);
    assert_eq!(store.live_blocks(), 1);
    store.release(root);
    assert_eq!(store.live_blocks(), 0);
}

#[test]
fn root_released_before_its_slices() {
    let mut store = store();
    let root = store.allocate_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let tail = store.allocate_slice(&root, 2, 1, 2).unwrap();
    store.release(root);

    // Срез держит блок живым
    assert_eq!(store.live_blocks(), 1);
    assert_eq!(store.ref_cnt(&tail).unwrap(), 1);
    assert_eq!(store.to_vec(&tail).unwrap(), vec![3.0, 4.0]);

    store.release(tail);
    assert_eq!(store.live_blocks(), 0);
}

#[test]
fn slice_writes_are_visible_through_root() {
    let mut store = store();
    let root = store.allocate(3, 4).unwrap();
    let column_pair = store.allocate_slice(&root, 5, 1, 2).unwrap();
    store.set(&column_pair, 0, 1, 8.0).unwrap();
    assert_eq!(store.get(&root, 1, 2).unwrap(), 8.0);
    store.release(column_pair);
    store.release(root);
}

#[test]
fn slice_shape_is_validated() {
    let mut store = store();
    let root = store.allocate(2, 2).unwrap();
    assert_eq!(
        store.allocate_slice(&root, 0, 0, 2),
        Err(MatrixError::InvalidShape { rows: 0, cols: 2 })
    );
    assert!(store.allocate_slice(&root, 3, 1, 2).is_err());
    assert_eq!(store.ref_cnt(&root).unwrap(), 1);
    store.release(root);
}

#[test]
fn aliasing_copy_registers_destination_as_owner() {
    let mut store = store();
    let src = store.allocate_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let mut dst = store.allocate(2, 2).unwrap();
    assert_eq!(store.live_blocks(), 2);

    store.aliasing_copy(&mut dst, &src).unwrap();
    // Старый блок dst освобожден, dst стал срезом блока src
    assert_eq!(store.live_blocks(), 1);
    assert!(dst.is_slice());
    assert_eq!(store.ref_cnt(&src).unwrap(), 2);
    assert_eq!(store.to_vec(&dst).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

    store.set(&src, 0, 0, 10.0).unwrap();
    assert_eq!(store.get(&dst, 0, 0).unwrap(), 10.0);

    store.release(src);
    assert_eq!(store.live_blocks(), 1);
    store.release(dst);
    assert_eq!(store.live_blocks(), 0);
}

#[test]
fn aliasing_copy_requires_same_shape() {
    let mut store = store();
    let src = store.allocate(2, 3).unwrap();
    let mut dst = store.allocate(3, 2).unwrap();
    assert!(matches!(
        store.aliasing_copy(&mut dst, &src),
        Err(MatrixError::ShapeMismatch { op: "aliasing_copy", .. })
    ));
    assert_eq!(store.ref_cnt(&src).unwrap(), 1);
    assert!(!dst.is_slice());
    store.release(src);
    store.release(dst);
}

#[test]
fn deep_copy_does_not_share() {
    let mut store = store();
    let src = store.allocate_from(1, 3, &[1.0, 2.0, 3.0]).unwrap();
    let dst = store.allocate(1, 3).unwrap();
    store.deep_copy(&dst, &src).unwrap();
    store.fill(&src, 0.0).unwrap();
    assert_eq!(store.to_vec(&dst).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(store.ref_cnt(&src).unwrap(), 1);
    assert_eq!(store.ref_cnt(&dst).unwrap(), 1);
    store.release(src);
    store.release(dst);
}

#[test]
fn handle_from_another_store_is_null_operand() {
    let mut first = store();
    let mut second = store();
    let foreign = first.allocate(2, 2).unwrap();
    let local = second.allocate(2, 2).unwrap();

    let err = second.neg(&local, &foreign).unwrap_err();
    assert_eq!(err, MatrixError::NullOperand { op: "neg" });
    assert_eq!(err.code(), -4);
    assert!(matches!(second.ref_cnt(&foreign), Err(MatrixError::NullOperand { .. })));

    // Чужой дескриптор не трогает блоки этого хранилища
    second.release(foreign);
    assert_eq!(second.live_blocks(), 1);
    assert_eq!(first.live_blocks(), 1);
    second.release(local);
}

#[test]
fn forced_allocation_failure_leaves_nothing_behind() {
    let mut store = MatrixStore::with_allocator(EngineConfig::with_threads(1), CountdownAllocator::new(0)).unwrap();
    let err = store.allocate(3, 3).unwrap_err();
    assert!(matches!(err, MatrixError::AllocationFailure(_)));
    assert_eq!(err.code(), -2);
    assert_eq!(store.live_blocks(), 0);
    assert_eq!(store.allocations(), 0);
}

#[test]
fn multiply_scratch_failure_keeps_result() {
    // a, b, result succeed; the transpose scratch fails
    let mut store = MatrixStore::with_allocator(EngineConfig::with_threads(2), CountdownAllocator::new(3)).unwrap();
    let a = store.allocate_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let b = store.allocate_from(2, 2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
    let result = store.allocate(2, 2).unwrap();
    assert!(matches!(store.multiply(&result, &a, &b), Err(MatrixError::AllocationFailure(_))));
    assert_eq!(store.to_vec(&result).unwrap(), vec![0.0; 4]);
    assert_eq!(store.live_blocks(), 3);
    for m in [a, b, result] {
        store.release(m);
    }
}

#[test]
fn power_scratch_failure_releases_partial_scratch() {
    // a и result, затем только два из четырех буферов степени
    let mut store = MatrixStore::with_allocator(EngineConfig::with_threads(2), CountdownAllocator::new(4)).unwrap();
    let a = store.allocate_from(2, 2, &[1.0, 1.0, 1.0, 0.0]).unwrap();
    let mut result = store.allocate_from(2, 2, &[7.0; 4]).unwrap();
    assert!(matches!(store.power(&mut result, &a, 5), Err(MatrixError::AllocationFailure(_))));
    assert_eq!(store.to_vec(&result).unwrap(), vec![7.0; 4]);
    assert_eq!(store.live_blocks(), 2);
    store.release(a);
    store.release(result);
    assert_eq!(store.live_blocks(), 0);
}

#[test]
fn release_of_absent_handle_is_noop() {
    let mut store = store();
    store.release(Option::<Matrix>::None);
    assert_eq!(store.live_blocks(), 0);
}
