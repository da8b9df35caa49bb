//! Report blocks and text rendering.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::buffer::HostAllocation;
use crate::config::MIB;
use crate::engine::Backend;
use crate::error::FailureKind;
use crate::policy::ErrorPolicy;
use crate::ranges::ProfilerColor;
use crate::timing::Bandwidth;
use crate::verify::Verification;

/// Copy direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Host memory to host memory.
    HostToHost,
    /// Host to device (upload).
    HostToDevice,
    /// Device to host (download).
    DeviceToHost,
    /// Within device memory.
    DeviceToDevice,
}

impl Direction {
    /// Label used in bandwidth lines.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::HostToHost => "Host to Host",
            Direction::HostToDevice => "Host to Device",
            Direction::DeviceToHost => "Device to Host",
            Direction::DeviceToDevice => "Device to Device",
        }
    }

    /// Short label.
    pub fn short_label(&self) -> &'static str {
        match self {
            Direction::HostToHost => "H2H",
            Direction::HostToDevice => "H2D",
            Direction::DeviceToHost => "D2H",
            Direction::DeviceToDevice => "D2D",
        }
    }
}

/// One of the five benchmarked phases, in suite order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Host-to-host copies between pageable buffers.
    HostToHostPageable,
    /// Host-to-host copies between pinned buffers.
    HostToHostPinned,
    /// Host/device transfers from pageable buffers.
    TransfersPageable,
    /// Host/device transfers from pinned buffers.
    TransfersPinned,
    /// Device-to-device copies.
    DeviceToDevice,
}

impl Phase {
    /// All phases in the order the suite runs them.
    pub const ALL: [Phase; 5] = [
        Phase::HostToHostPageable,
        Phase::HostToHostPinned,
        Phase::TransfersPageable,
        Phase::TransfersPinned,
        Phase::DeviceToDevice,
    ];

    /// Host-to-host phase for an allocation strategy.
    pub fn host_to_host(allocation: HostAllocation) -> Self {
        match allocation {
            HostAllocation::Pageable => Phase::HostToHostPageable,
            HostAllocation::Pinned => Phase::HostToHostPinned,
        }
    }

    /// Host/device transfer phase for an allocation strategy.
    pub fn transfers(allocation: HostAllocation) -> Self {
        match allocation {
            HostAllocation::Pageable => Phase::TransfersPageable,
            HostAllocation::Pinned => Phase::TransfersPinned,
        }
    }

    /// Block header in the text report.
    pub fn header(&self) -> &'static str {
        match self {
            Phase::HostToHostPageable => "Host to Host Pageable Memcpy",
            Phase::HostToHostPinned => "Host to Host Pinned Memcpy",
            Phase::TransfersPageable => "Pageable transfers",
            Phase::TransfersPinned => "Pinned transfers",
            Phase::DeviceToDevice => "Device to Device Memcpy",
        }
    }

    /// Name of the profiler range that brackets this phase.
    pub fn range_label(&self) -> &'static str {
        match self {
            Phase::HostToHostPageable => "Host to Host Paged Memory Transfer",
            Phase::HostToHostPinned => "Host to Host Pinned Memory Transfer",
            Phase::TransfersPageable => "Paged Memory Transfer",
            Phase::TransfersPinned => "Pinned Memory Transfer",
            Phase::DeviceToDevice => "Device to Device Memory Transfer",
        }
    }

    /// Description used in the failure line.
    pub fn failure_description(&self) -> &'static str {
        match self {
            Phase::HostToHostPageable => "Host to Host Pageable",
            Phase::HostToHostPinned => "Host to Host Pinned",
            Phase::TransfersPageable => "Pageable",
            Phase::TransfersPinned => "Pinned",
            Phase::DeviceToDevice => "Device to device",
        }
    }

    /// Range color.
    pub fn color(&self) -> ProfilerColor {
        match self {
            Phase::HostToHostPageable => ProfilerColor::YELLOW,
            Phase::HostToHostPinned => ProfilerColor::ORANGE,
            Phase::TransfersPageable => ProfilerColor::CYAN,
            Phase::TransfersPinned => ProfilerColor::GREEN,
            Phase::DeviceToDevice => ProfilerColor::MAGENTA,
        }
    }
}

/// A bandwidth line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthFigure {
    /// Direction measured.
    pub direction: Direction,
    /// Measured bandwidth; `None` if timing failed or elapsed time was zero.
    pub gbps: Option<Bandwidth>,
}

impl BandwidthFigure {
    /// Render as a report line (without newline).
    pub fn to_line(&self) -> String {
        match self.gbps {
            Some(bw) => format!("  {} bandwidth (GB/s): {}", self.direction.label(), bw),
            None => format!("  {} bandwidth (GB/s): n/a", self.direction.label()),
        }
    }
}

/// Result of one benchmarked phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBlock {
    /// Phase this block belongs to.
    pub phase: Phase,
    /// One or two bandwidth figures.
    pub figures: Vec<BandwidthFigure>,
    /// Verification outcome.
    pub verification: Verification,
}

impl ReportBlock {
    /// Create a block.
    pub fn new(phase: Phase, figures: Vec<BandwidthFigure>, verification: Verification) -> Self {
        Self {
            phase,
            figures,
            verification,
        }
    }

    /// Block header.
    pub fn header(&self) -> &'static str {
        self.phase.header()
    }

    /// Failure line, if verification failed.
    pub fn failure_line(&self) -> Option<String> {
        if self.verification.is_match() {
            None
        } else {
            Some(format!(
                "*** {} transfers failed ***",
                self.phase.failure_description()
            ))
        }
    }

    /// Figure for a direction.
    pub fn figure(&self, direction: Direction) -> Option<&BandwidthFigure> {
        self.figures.iter().find(|f| f.direction == direction)
    }

    /// Render the block as text, starting with a blank line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.header());
        for figure in &self.figures {
            let _ = writeln!(out, "{}", figure.to_line());
        }
        if let Some(line) = self.failure_line() {
            let _ = writeln!(out, "{}", line);
        }
        out
    }
}

/// A failure recorded under the continue policy, or a content mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedFailure {
    /// Phase in which the failure occurred.
    pub phase: Phase,
    /// Failure category.
    pub kind: FailureKind,
    /// Description.
    pub message: String,
}

/// Full suite output.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Backend that ran the suite.
    pub backend: Backend,
    /// Device ordinal.
    pub device_index: usize,
    /// Device identification string.
    pub device_name: String,
    /// Bytes per buffer.
    pub transfer_bytes: usize,
    /// Error policy in force.
    pub error_policy: ErrorPolicy,
    /// One block per phase, in suite order.
    pub blocks: Vec<ReportBlock>,
    /// Failures recorded during the run.
    pub failures: Vec<RecordedFailure>,
}

impl SuiteReport {
    /// Transfer size in whole mebibytes.
    pub fn transfer_mib(&self) -> usize {
        self.transfer_bytes / MIB
    }

    /// Block for a phase.
    pub fn block(&self, phase: Phase) -> Option<&ReportBlock> {
        self.blocks.iter().find(|b| b.phase == phase)
    }

    /// Whether every phase verified.
    pub fn all_verified(&self) -> bool {
        self.blocks.iter().all(|b| b.verification.is_match())
    }

    /// Header lines: device name and transfer size.
    pub fn render_header(&self) -> String {
        format!(
            "\nDevice: {}\nTransfer size (MB): {}\n",
            self.device_name,
            self.transfer_mib()
        )
    }

    /// Render the whole report as text.
    pub fn render_text(&self) -> String {
        let mut out = self.render_header();
        for block in &self.blocks {
            out.push_str(&block.render());
        }
        out.push('\n');
        out
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure(direction: Direction, gbps: f64) -> BandwidthFigure {
        BandwidthFigure {
            direction,
            gbps: Bandwidth::from_gbps(gbps),
        }
    }

    #[test]
    fn test_phase_order_and_labels() {
        assert_eq!(Phase::ALL[0], Phase::HostToHostPageable);
        assert_eq!(Phase::ALL[4], Phase::DeviceToDevice);
        assert_eq!(
            Phase::host_to_host(HostAllocation::Pinned),
            Phase::HostToHostPinned
        );
        assert_eq!(
            Phase::transfers(HostAllocation::Pageable),
            Phase::TransfersPageable
        );
        assert_eq!(Phase::TransfersPageable.range_label(), "Paged Memory Transfer");
        assert_eq!(Phase::DeviceToDevice.header(), "Device to Device Memcpy");
    }

    #[test]
    fn test_figure_line() {
        assert_eq!(
            figure(Direction::HostToDevice, 12.345).to_line(),
            "  Host to Device bandwidth (GB/s): 12.35"
        );
        let missing = BandwidthFigure {
            direction: Direction::DeviceToHost,
            gbps: None,
        };
        assert_eq!(missing.to_line(), "  Device to Host bandwidth (GB/s): n/a");
    }

    #[test]
    fn test_block_render_match() {
        let block = ReportBlock::new(
            Phase::TransfersPinned,
            vec![
                figure(Direction::HostToDevice, 12.1),
                figure(Direction::DeviceToHost, 13.2),
            ],
            Verification::Match,
        );
        assert_eq!(
            block.render(),
            "\nPinned transfers\n  Host to Device bandwidth (GB/s): 12.10\n  Device to Host bandwidth (GB/s): 13.20\n"
        );
        assert!(block.failure_line().is_none());
        assert!(block.figure(Direction::DeviceToHost).is_some());
        assert!(block.figure(Direction::HostToHost).is_none());
    }

    #[test]
    fn test_block_render_mismatch() {
        let block = ReportBlock::new(
            Phase::DeviceToDevice,
            vec![figure(Direction::DeviceToDevice, 400.0)],
            Verification::Mismatch {
                index: 3,
                expected: Some(3.0),
                actual: Some(0.0),
            },
        );
        assert_eq!(
            block.failure_line().as_deref(),
            Some("*** Device to device transfers failed ***")
        );
        assert!(block.render().ends_with("*** Device to device transfers failed ***\n"));
    }

    #[test]
    fn test_suite_render() {
        let report = SuiteReport {
            backend: Backend::Cpu,
            device_index: 0,
            device_name: "Test Device".to_string(),
            transfer_bytes: 16 * MIB,
            error_policy: ErrorPolicy::Continue,
            blocks: vec![ReportBlock::new(
                Phase::HostToHostPageable,
                vec![figure(Direction::HostToHost, 9.5)],
                Verification::Match,
            )],
            failures: vec![],
        };

        assert_eq!(
            report.render_text(),
            "\nDevice: Test Device\nTransfer size (MB): 16\n\nHost to Host Pageable Memcpy\n  Host to Host bandwidth (GB/s): 9.50\n\n"
        );
        assert!(report.all_verified());

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["device_name"], "Test Device");
        assert_eq!(value["backend"], "cpu");
        assert_eq!(value["blocks"][0]["phase"], "host_to_host_pageable");
        assert_eq!(value["blocks"][0]["figures"][0]["gbps"], 9.5);
        assert_eq!(value["blocks"][0]["verification"]["result"], "match");
    }
}
