#![no_main]

use libfuzzer_sys::fuzz_target;
use ubflow_kernel::{ElementwiseKernel, LaunchOptions, Operand, ScratchBuffer, launch_elementwise};
use ubflow_tiling::TilingPlan;

struct Increment;

impl ElementwiseKernel<u32> for Increment {
    fn arity(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[u32]], output: &mut [u32], _: &mut ScratchBuffer) {
        for (o, &v) in output.iter_mut().zip(inputs[0]) {
            *o = v.wrapping_add(1);
        }
    }
}

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, and any blob that decodes must drive a
    // launch that stays inside its buffers.
    let Ok(plan) = TilingPlan::from_bytes(data) else {
        return;
    };
    if plan.total_elements > 1 << 16 || plan.tile_elements > 1 << 16 || plan.core_count > 64 {
        return;
    }
    let n = plan.total_elements as usize;
    let input: Vec<u32> = (0..n as u32).collect();
    let mut output = vec![0u32; n];
    let report = launch_elementwise(
        data,
        &Increment,
        &[Operand::Tensor(&input)],
        &mut output,
        &LaunchOptions::default(),
    )
    .expect("validated plan failed to launch");
    assert_eq!(report.total_elements(), plan.total_elements);
    assert!(output.iter().zip(&input).all(|(o, i)| *o == i + 1));
});
