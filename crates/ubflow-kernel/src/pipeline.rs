//! Software-pipelined stage scheduling shared by every engine.
//!
//! At step `s` a core issues `CopyIn(s)`, then `Compute(s - 1)`, then
//! `CopyOut(s - 2)`. Each stage runs in strictly increasing iteration order
//! and at most two iterations are in flight per queue, which is exactly what
//! two-slot queues allow.

use std::fmt;

use ubflow_tiling::CoreAssignment;

use crate::{CoreContext, KernelError};

/// One pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// External memory to on-chip slot.
    CopyIn,
    /// Transform one tile.
    Compute,
    /// On-chip slot to external memory.
    CopyOut,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CopyIn => "copy-in",
            Self::Compute => "compute",
            Self::CopyOut => "copy-out",
        };
        f.write_str(s)
    }
}

/// A stage executed for one iteration, as recorded by a traced launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineEvent {
    /// Stage that ran.
    pub stage: Stage,
    /// Iteration index within the core.
    pub iteration: u64,
    /// Elements moved or computed, after clamping to the tensor.
    pub elements: u64,
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) x{}", self.stage, self.iteration, self.elements)
    }
}

/// What one core did during a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreReport {
    /// Index of the core.
    pub core_idx: u64,
    /// First element of the core's range.
    pub offset: u64,
    /// Elements the core read and wrote after clamping to the tensor.
    pub elements: u64,
    /// Pipeline iterations the core ran.
    pub iterations: u64,
    /// Stage events, empty unless tracing was requested.
    pub events: Vec<PipelineEvent>,
}

impl fmt::Display for CoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "core {}: [{}, {}) in {} iterations",
            self.core_idx,
            self.offset,
            self.offset + self.elements,
            self.iterations
        )
    }
}

/// The three stages of one core's engine.
pub(crate) trait Stages {
    /// Whether the engine writes a tile back after every compute.
    const COPY_OUT: bool = true;

    fn copy_in(&mut self, iteration: u64) -> Result<u64, KernelError>;
    fn compute(&mut self, iteration: u64) -> Result<u64, KernelError>;
    fn copy_out(&mut self, iteration: u64) -> Result<u64, KernelError>;
}

/// Drives `stages` through `iterations` tiles with the double-buffered
/// schedule and returns the per-core report.
pub(crate) fn run_pipeline<S: Stages>(
    ctx: CoreContext,
    assignment: &CoreAssignment,
    total: u64,
    stages: &mut S,
    trace: bool,
) -> Result<CoreReport, KernelError> {
    let iterations = assignment.iterations;
    let mut events = Vec::new();
    let mut record = |stage: Stage, iteration: u64, elements: u64| {
        log::trace!("{ctx}: {stage}({iteration}) x{elements}");
        if trace {
            events.push(PipelineEvent {
                stage,
                iteration,
                elements,
            });
        }
    };

    for step in 0..iterations + 2 {
        if step < iterations {
            let n = stages.copy_in(step)?;
            record(Stage::CopyIn, step, n);
        }
        if let Some(i) = step.checked_sub(1).filter(|&i| i < iterations) {
            let n = stages.compute(i)?;
            record(Stage::Compute, i, n);
        }
        if S::COPY_OUT
            && let Some(i) = step.checked_sub(2).filter(|&i| i < iterations)
        {
            let n = stages.copy_out(i)?;
            record(Stage::CopyOut, i, n);
        }
    }

    Ok(CoreReport {
        core_idx: ctx.block_idx(),
        offset: assignment.offset,
        elements: assignment.valid_elements(total),
        iterations,
        events,
    })
}
