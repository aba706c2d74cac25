use ubflow_kernel::LaunchOptions;
use ubflow_ops::{AttrValue, Attrs, HostTensor, OpError, OpRun, OperatorRegistry};
use ubflow_tiling::HardwareSpec;

/// Plan and launch a registered operator, panicking on failure.
#[allow(dead_code)]
pub fn run_op(name: &str, inputs: &[HostTensor], attrs: &Attrs, hw: &HardwareSpec) -> OpRun {
    try_run_op(name, inputs, attrs, hw)
        .unwrap_or_else(|e| panic!("{name} failed on {}: {e}", hw.name))
}

/// Like `run_op` but returns the error instead of panicking.
#[allow(dead_code)]
pub fn try_run_op(
    name: &str,
    inputs: &[HostTensor],
    attrs: &Attrs,
    hw: &HardwareSpec,
) -> Result<OpRun, OpError> {
    OperatorRegistry::with_builtins().run(name, inputs, attrs, hw, &LaunchOptions::default())
}

/// A deliberately small target so modest tensors spread over many cores
/// and many pipeline iterations.
#[allow(dead_code)]
pub fn small_hw(cores: u64, ub_bytes: u64) -> HardwareSpec {
    HardwareSpec::for_target(HardwareSpec::DEFAULT_TARGET)
        .with_core_count(cores)
        .with_ub_bytes(ub_bytes)
}

/// Attribute set from `(name, float)` pairs.
#[allow(dead_code)]
pub fn float_attrs(pairs: &[(&str, f32)]) -> Attrs {
    pairs
        .iter()
        .fold(Attrs::new(), |a, &(k, v)| a.with(k, AttrValue::Float(v)))
}

/// First output widened to `f32`.
#[allow(dead_code)]
pub fn output_f32(run: &OpRun) -> Vec<f32> {
    run.outputs[0].to_f64_vec().iter().map(|&v| v as f32).collect()
}

/// `n` evenly spaced values over `[lo, hi)`.
#[allow(dead_code)]
pub fn spaced(n: usize, lo: f32, hi: f32) -> Vec<f32> {
    (0..n)
        .map(|i| lo + (hi - lo) * i as f32 / n as f32)
        .collect()
}

/// Relative comparison, absolute near zero.
#[allow(dead_code)]
pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let bound = tol * e.abs().max(1.0);
        assert!(
            (a - e).abs() <= bound,
            "element {i}: got {a}, expected {e} (tolerance {bound})"
        );
    }
}
