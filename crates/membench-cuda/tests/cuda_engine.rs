//! CUDA engine integration tests.
//!
//! These need CUDA hardware. Without a device they return early via the
//! skip_without_cuda! macro.
//!
//! Run with: cargo test --features cuda -p membench-cuda --test cuda_engine

#![cfg(feature = "cuda")]

use std::sync::Arc;

use membench_core::prelude::*;
use membench_cuda::{cuda_device_count, is_cuda_available, CudaEngine};

fn cuda_is_available_safe() -> bool {
    std::panic::catch_unwind(is_cuda_available).unwrap_or(false)
}

macro_rules! skip_without_cuda {
    () => {
        if !cuda_is_available_safe() {
            eprintln!("Skipping test: CUDA not available");
            return;
        }
    };
}

fn small_config() -> BenchConfig {
    BenchConfig::builder()
        .transfer_mib(1)
        .timed_iterations(10)
        .error_policy(ErrorPolicy::Halt)
        .build()
        .unwrap()
}

// ============================================================================
// Device detection
// ============================================================================

#[test]
fn test_cuda_availability_detection() {
    let available = cuda_is_available_safe();
    let count = std::panic::catch_unwind(cuda_device_count).unwrap_or(0);
    println!("CUDA available: {}, devices: {}", available, count);
    if available {
        assert!(count > 0);
    }
}

#[test]
fn test_engine_identity() {
    skip_without_cuda!();

    let engine = CudaEngine::new(0).expect("Failed to open CUDA device 0");
    assert_eq!(engine.backend(), Backend::Cuda);
    assert_eq!(engine.ordinal(), 0);
    assert!(!engine.device_name().is_empty());
    assert!(engine.compute_capability().0 >= 3);
    engine.reset().unwrap();
}

// ============================================================================
// Copies
// ============================================================================

#[test]
fn test_host_device_round_trip() {
    skip_without_cuda!();

    let engine = CudaEngine::new(0).unwrap();
    let n = 1 << 16;

    let mut src = engine.alloc_pinned(n, "src").unwrap();
    fill_ramp(src.as_mut_slice());
    let mut dst = engine.alloc_pinned(n, "dst").unwrap();

    let mut d_a = engine.alloc_device(n, "d_a").unwrap();
    let mut d_b = engine.alloc_device(n, "d_b").unwrap();
    engine.fill_device(&mut d_b, 0.0).unwrap();

    engine.copy_host_to_device(src.as_slice(), &mut d_a).unwrap();
    engine.copy_device_to_device(&d_a, &mut d_b).unwrap();
    engine.copy_device_to_host(&d_b, dst.as_mut_slice()).unwrap();

    assert!(verify_copy(src.as_slice(), dst.as_slice()).is_match());

    drop((src, dst, d_a, d_b));
    assert_eq!(engine.tracker().outstanding(), 0);
    engine.reset().unwrap();
}

#[test]
fn test_event_timer() {
    skip_without_cuda!();

    let engine = CudaEngine::new(0).unwrap();
    let n = 1 << 20;
    let src = vec![1.0f32; n];
    let mut dev = engine.alloc_device(n, "d_a").unwrap();

    let mut timer = engine.create_timer().unwrap();
    timer.start().unwrap();
    engine.copy_host_to_device(&src, &mut dev).unwrap();
    timer.stop().unwrap();
    let elapsed = timer.elapsed().unwrap();
    assert!(elapsed.as_nanos() > 0);

    drop(timer);
    drop(dev);
    engine.reset().unwrap();
}

// ============================================================================
// Full suite
// ============================================================================

#[test]
fn test_full_suite_on_device() {
    skip_without_cuda!();

    let tracker = Arc::new(AllocationTracker::new());
    let engine = CudaEngine::with_tracker(0, Arc::clone(&tracker)).unwrap();
    let report = run_bandwidth_suite(engine, &small_config(), &NullProfiler).unwrap();

    assert_eq!(report.blocks.len(), 5);
    assert!(report.all_verified());
    for block in &report.blocks {
        for figure in &block.figures {
            assert!(figure.gbps.map(|b| b.gbps() > 0.0).unwrap_or(false));
        }
    }
    assert_eq!(tracker.outstanding(), 0);
}
