//! Planner scenarios and properties, checked both on the plan and on the
//! launch the plan drives.

mod common;

use proptest::prelude::*;
use ubflow_ops::{Attrs, HostTensor};
use ubflow_tiling::{HardwareSpec, TilingError, TilingPlan, TilingRequest, plan};

use common::{output_f32, run_op, small_hw};

#[test]
fn hundred_elements_on_four_cores() {
    let hw = small_hw(4, 256);
    let p = plan(&TilingRequest::new(100, 4, 2), &hw).unwrap();

    assert_eq!(p.tile_elements, 16);
    assert_eq!(p.core_count, 4);
    assert_eq!(p.tail_core_count, 1);
    assert_eq!(p.tiling_key, 1);
    assert_eq!((p.big.elements, p.big.iterations, p.big.tail_elements), (32, 2, 16));
    assert_eq!((p.small.elements, p.small.iterations, p.small.tail_elements), (24, 2, 8));
    assert_eq!(p.covered_elements(), Some(104));

    let offsets: Vec<u64> = p.assignments().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 32, 56, 80]);

    // The last core's padded range ends at 104; its tail moves 4 elements.
    let last = p.assignment(3);
    assert_eq!(last.clamped_iteration_elements(0, 100), 16);
    assert_eq!(last.clamped_iteration_elements(1, 100), 4);
}

#[test]
fn padded_range_stays_inside_tensor() {
    let x: Vec<f32> = (0..100).map(|i| i as f32).collect();
    let run = run_op("neg", &[HostTensor::from_vec(x.clone())], &Attrs::new(), &small_hw(4, 256));

    let per_core: Vec<u64> = run.report.cores.iter().map(|c| c.elements).collect();
    assert_eq!(per_core, vec![32, 24, 24, 20]);
    assert_eq!(run.report.total_elements(), 100);
    assert_eq!(run.outputs[0].desc().element_count(), 100);
    let expected: Vec<f32> = x.iter().map(|v| -v).collect();
    assert_eq!(output_f32(&run), expected);
}

#[test]
fn single_tile_runs_on_one_core() {
    let hw = HardwareSpec::for_target("ascend910b").with_ub_bytes(256);
    let p = plan(&TilingRequest::new(10, 4, 2), &hw).unwrap();
    assert_eq!(p.core_count, 1);
    assert_eq!(p.tail_core_count, 0);
    assert_eq!(p.tiling_key, 0);
    assert_eq!(p.small.iterations, 1);
    assert_eq!(p.small.tail_elements, 16);
    assert_eq!(p.assignment(0).clamped_iteration_elements(0, 10), 10);

    let x: Vec<f32> = (1..=10).map(|i| i as f32).collect();
    let run = run_op("reciprocal", &[HostTensor::from_vec(x)], &Attrs::new(), &hw);
    assert_eq!(run.report.cores.len(), 1);
    assert_eq!(run.report.cores[0].elements, 10);
    assert_eq!(run.report.cores[0].iterations, 1);
}

#[test]
fn empty_tensor_launches_nothing() {
    let run = run_op(
        "sqrt",
        &[HostTensor::from_vec(Vec::<f32>::new())],
        &Attrs::new(),
        &HardwareSpec::default(),
    );
    assert_eq!(run.plan.core_count, 1);
    assert_eq!(run.report.total_iterations(), 0);
    assert!(run.outputs[0].data().is_empty());
}

#[test]
fn trace_follows_three_stage_schedule() {
    use ubflow_kernel::{LaunchOptions, Stage};
    use ubflow_ops::OperatorRegistry;

    let x = HostTensor::from_vec((0..48).map(|i| i as f32).collect::<Vec<_>>());
    let run = OperatorRegistry::with_builtins()
        .run(
            "abs",
            &[x],
            &Attrs::new(),
            &small_hw(1, 256),
            &LaunchOptions::traced(),
        )
        .unwrap();
    let core = &run.report.cores[0];
    assert_eq!(core.iterations, 3);
    // Every stage of every iteration appears exactly once.
    for stage in [Stage::CopyIn, Stage::Compute, Stage::CopyOut] {
        assert_eq!(core.events.iter().filter(|e| e.stage == stage).count(), 3);
    }
}

fn widths() -> impl Strategy<Value = u64> {
    prop_oneof![Just(1u64), Just(2), Just(4), Just(8)]
}

proptest! {
    #[test]
    fn plans_partition_the_tensor(
        total in 0u64..200_000,
        width in widths(),
        live in 1u64..8,
        cores in 1u64..64,
        ub in 256u64..262_144,
    ) {
        let hw = small_hw(cores, ub);
        let req = TilingRequest::new(total, width, live);
        let p = match plan(&req, &hw) {
            Ok(p) => p,
            Err(TilingError::BufferTooSmall { .. }) => {
                prop_assert!(ub / live / 2 < 32);
                return Ok(());
            }
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        };

        prop_assert!(p.core_count >= 1 && p.core_count <= cores);
        prop_assert!(p.tail_core_count < p.core_count);
        prop_assert_eq!(p.tile_elements * width % 32, 0);
        prop_assert!(p.tile_elements * width * live * 2 <= ub);

        // Contiguous and disjoint. The padding stays inside the last core's
        // final iteration, so every iteration starts inside the tensor.
        let mut next = 0;
        let mut clamped = 0;
        for a in p.assignments() {
            prop_assert_eq!(a.offset, next);
            next += a.elements;
            for i in 0..a.iterations {
                clamped += a.clamped_iteration_elements(i, total);
            }
        }
        prop_assert_eq!(clamped, total);
        prop_assert!(next >= total);
        if total > 0 {
            prop_assert!(next - total < p.small.tail_elements);
        }

        // Big and small shares differ by exactly one block.
        if p.has_big_cores() {
            prop_assert_eq!(p.big.elements - p.small.elements, 32 / width);
        }
        prop_assert_eq!(p.tiling_key, u64::from(p.tail_core_count > 0));

        prop_assert_eq!(plan(&req, &hw).unwrap(), p.clone());
        prop_assert_eq!(TilingPlan::from_bytes(&p.to_bytes()).unwrap(), p);
    }

    #[test]
    fn every_element_is_computed_once(
        n in 0usize..5000,
        cores in 1u64..16,
        ub in 256u64..4096,
    ) {
        let x: Vec<f32> = (0..n).map(|i| i as f32 + 0.5).collect();
        let run = run_op("neg", &[HostTensor::from_vec(x.clone())], &Attrs::new(), &small_hw(cores, ub));
        prop_assert_eq!(run.report.total_elements(), n as u64);
        let expected: Vec<f32> = x.iter().map(|v| -v).collect();
        prop_assert_eq!(output_f32(&run), expected);
    }
}
