//! Operator lookup and the plan-then-launch entry point.

use std::fmt;

use ubflow_ir::TensorDescriptor;
use ubflow_kernel::{LaunchOptions, LaunchReport};
use ubflow_tiling::{HardwareSpec, TilingPlan};

use crate::{Attrs, HostTensor, OpError, Operator, ops};

/// Result of [`run_operator`]: the plan that was launched and what it
/// produced.
#[derive(Debug, Clone, PartialEq)]
pub struct OpRun {
    /// The plan that was serialized and launched.
    pub plan: TilingPlan,
    /// Output tensors.
    pub outputs: Vec<HostTensor>,
    /// Per-core launch report.
    pub report: LaunchReport,
}

impl fmt::Display for OpRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.plan)?;
        writeln!(f, "{}", self.report)?;
        for core in &self.report.cores {
            writeln!(
                f,
                "  core {}: offset {}, {} elements in {} iterations",
                core.core_idx, core.offset, core.elements, core.iterations
            )?;
        }
        for out in &self.outputs {
            writeln!(f, "{out}")?;
        }
        Ok(())
    }
}

/// Infers outputs, plans, serializes the plan and launches `op` on `inputs`.
pub fn run_operator(
    op: &dyn Operator,
    inputs: &[HostTensor],
    attrs: &Attrs,
    hw: &HardwareSpec,
    options: &LaunchOptions,
) -> Result<OpRun, OpError> {
    let descs: Vec<TensorDescriptor> = inputs.iter().map(|t| t.desc().clone()).collect();
    let outputs = op.infer(&descs, attrs)?;
    let plan = op.tiling(&descs, attrs, hw)?;
    log::debug!("{} on {}: {plan}", op.name(), hw.name);
    let blob = plan.to_bytes();
    let execution = op.execute(&blob, inputs, &outputs, attrs, options)?;
    Ok(OpRun {
        plan,
        outputs: execution.outputs,
        report: execution.report,
    })
}

/// Registry of operators, looked up by name.
#[derive(Debug)]
pub struct OperatorRegistry {
    operators: Vec<Box<dyn Operator>>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
        }
    }

    /// Creates a registry holding the built-in catalogue.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for op in ops::builtins() {
            reg.register(op);
        }
        reg
    }

    /// Registers an operator. A later registration shadows an earlier one
    /// with the same name.
    pub fn register(&mut self, op: Box<dyn Operator>) {
        self.operators.push(op);
    }

    /// Finds an operator by name.
    pub fn find(&self, name: &str) -> Option<&dyn Operator> {
        self.operators
            .iter()
            .rev()
            .find(|op| op.name() == name)
            .map(|op| &**op)
    }

    /// Names of all registered operators, in registration order.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for op in &self.operators {
            if !names.contains(&op.name()) {
                names.push(op.name());
            }
        }
        names
    }

    /// Looks up `name` and runs it with [`run_operator`].
    pub fn run(
        &self,
        name: &str,
        inputs: &[HostTensor],
        attrs: &Attrs,
        hw: &HardwareSpec,
        options: &LaunchOptions,
    ) -> Result<OpRun, OpError> {
        let op = self
            .find(name)
            .ok_or_else(|| OpError::UnknownOperator(name.to_string()))?;
        run_operator(op, inputs, attrs, hw, options)
    }
}
