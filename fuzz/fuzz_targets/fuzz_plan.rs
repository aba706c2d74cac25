#![no_main]

use libfuzzer_sys::fuzz_target;
use ubflow_tiling::{HardwareSpec, TilingPlan, TilingRequest, plan};

fn word(data: &[u8], i: usize) -> u64 {
    let mut buf = [0u8; 8];
    if let Some(chunk) = data.get(i * 8..) {
        let n = chunk.len().min(8);
        buf[..n].copy_from_slice(&chunk[..n]);
    }
    u64::from_le_bytes(buf)
}

fuzz_target!(|data: &[u8]| {
    let hw = HardwareSpec::default()
        .with_core_count(word(data, 0) % 128)
        .with_ub_bytes(word(data, 1))
        .with_alignment(word(data, 2) % 256);
    let request = TilingRequest::new(word(data, 3), word(data, 4) % 16, word(data, 5) % 16);

    // Any inputs either fail cleanly or give a plan that passes validation
    // and survives its own blob.
    if let Ok(p) = plan(&request, &hw) {
        p.validate().expect("fresh plan failed validation");
        let decoded = TilingPlan::from_bytes(&p.to_bytes()).expect("blob did not decode");
        assert_eq!(decoded, p);
    }
});
