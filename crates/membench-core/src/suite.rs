//! The full five-phase bandwidth suite.

use tracing::{debug, info, warn};

use crate::buffer::{fill_ramp, fill_zero, HostBuffer, PageableBuffer};
use crate::config::BenchConfig;
use crate::engine::CopyEngine;
use crate::error::Result;
use crate::profiler::BandwidthProfiler;
use crate::ranges::PhaseProfiler;
use crate::report::{Phase, ReportBlock, SuiteReport};

/// Run every phase against `engine` and tear it down.
///
/// Allocates two pageable, two pinned and two device buffers of
/// `config.transfer_bytes` each, runs the phases in [`Phase::ALL`] order
/// inside named profiler ranges, releases the buffers and resets the engine.
/// On an error the buffers are released before it propagates.
pub fn run_bandwidth_suite<E: CopyEngine>(
    engine: E,
    config: &BenchConfig,
    profiler: &dyn PhaseProfiler,
) -> Result<SuiteReport> {
    config.validate()?;

    let count = config.element_count();
    let tracker = engine.tracker().clone();

    info!(
        backend = engine.backend().label(),
        device = engine.device_name(),
        ordinal = engine.ordinal(),
        bytes = config.transfer_bytes,
        policy = config.error_policy.label(),
        "starting bandwidth suite"
    );

    let mut h_a_pageable = PageableBuffer::new(count, &tracker, "h_aPageable")?;
    let mut h_b_pageable = PageableBuffer::new(count, &tracker, "h_bPageable")?;
    let mut h_a_pinned = engine.alloc_pinned(count, "h_aPinned")?;
    let mut h_b_pinned = engine.alloc_pinned(count, "h_bPinned")?;
    let mut d_a = engine.alloc_device(count, "d_a")?;
    let mut d_b = engine.alloc_device(count, "d_b")?;

    fill_ramp(h_a_pageable.as_mut_slice());
    h_a_pinned
        .as_mut_slice()
        .copy_from_slice(h_a_pageable.as_slice());
    fill_zero(h_b_pageable.as_mut_slice());
    fill_zero(h_b_pinned.as_mut_slice());
    engine.fill_device(&mut d_a, 0.0)?;
    engine.fill_device(&mut d_b, 0.0)?;

    debug!(
        outstanding = tracker.outstanding(),
        current_bytes = tracker.current_usage(),
        "buffers ready"
    );

    let mut bench = BandwidthProfiler::new(&engine, config);
    let mut blocks: Vec<ReportBlock> = Vec::with_capacity(Phase::ALL.len());

    for phase in Phase::ALL {
        let _range = profiler.range(phase.range_label(), phase.color());
        let block = match phase {
            Phase::HostToHostPageable => {
                bench.profile_host_to_host(&mut h_a_pageable, &mut h_b_pageable, "Pageable")?
            }
            Phase::HostToHostPinned => {
                bench.profile_host_to_host(&mut h_a_pinned, &mut h_b_pinned, "Pinned")?
            }
            Phase::TransfersPageable => {
                bench.profile_host_device(&h_a_pageable, &mut h_b_pageable, &mut d_a, "Pageable")?
            }
            Phase::TransfersPinned => {
                bench.profile_host_device(&h_a_pinned, &mut h_b_pinned, &mut d_a, "Pinned")?
            }
            Phase::DeviceToDevice => bench.profile_device_to_device(&mut d_a, &mut d_b)?,
        };
        blocks.push(block);
    }

    let failures = bench.into_failures();

    let report = SuiteReport {
        backend: engine.backend(),
        device_index: engine.ordinal(),
        device_name: engine.device_name().to_string(),
        transfer_bytes: count * crate::buffer::ELEMENT_SIZE,
        error_policy: config.error_policy,
        blocks,
        failures,
    };

    drop(d_b);
    drop(d_a);
    drop(h_b_pinned);
    drop(h_a_pinned);
    drop(h_b_pageable);
    drop(h_a_pageable);

    engine.reset()?;

    if let Some(leaks) = tracker.detect_leaks() {
        for leak in &leaks {
            warn!(
                label = %leak.label,
                size = leak.size,
                kind = leak.kind.label(),
                "allocation still live after reset"
            );
        }
    }

    info!(
        blocks = report.blocks.len(),
        failures = report.failures.len(),
        peak_bytes = tracker.peak_usage(),
        "bandwidth suite complete"
    );

    Ok(report)
}
