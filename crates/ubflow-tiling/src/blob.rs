//! Fixed-layout binary form of a [`TilingPlan`].
//!
//! The host writes the blob once per launch and every core reads it. All
//! integer fields are little-endian `u64`; scalars are little-endian `f32`
//! bit patterns. The record has no padding, so it is read straight out of
//! the byte buffer with `bytemuck`.

use bytemuck::{Pod, Zeroable};

use crate::{CoreClassPlan, SCALAR_SLOTS, TilingError, TilingPlan};

/// Wire layout of a tiling plan.
///
/// Field order is part of the format:
///
/// | offset | field |
/// |-------:|-------|
/// | 0 | `total_elements` |
/// | 8 | `core_count` |
/// | 16 | `tail_core_count` |
/// | 24 | `small_core_elements` |
/// | 32 | `big_core_elements` |
/// | 40 | `tile_elements` |
/// | 48 | `small_core_iterations` |
/// | 56 | `big_core_iterations` |
/// | 64 | `small_core_tail_elements` |
/// | 72 | `big_core_tail_elements` |
/// | 80 | `tiling_key` |
/// | 88 | `scalars[4]` (f32 bits) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TilingData {
    pub total_elements: u64,
    pub core_count: u64,
    pub tail_core_count: u64,
    pub small_core_elements: u64,
    pub big_core_elements: u64,
    pub tile_elements: u64,
    pub small_core_iterations: u64,
    pub big_core_iterations: u64,
    pub small_core_tail_elements: u64,
    pub big_core_tail_elements: u64,
    pub tiling_key: u64,
    pub scalars: [u32; SCALAR_SLOTS],
}

const _: () = assert!(std::mem::size_of::<TilingData>() == TilingData::SIZE);

impl TilingData {
    /// Encoded size in bytes.
    pub const SIZE: usize = 104;

    /// Converts a plan into its wire record (little-endian fields).
    pub fn from_plan(plan: &TilingPlan) -> Self {
        Self {
            total_elements: plan.total_elements.to_le(),
            core_count: plan.core_count.to_le(),
            tail_core_count: plan.tail_core_count.to_le(),
            small_core_elements: plan.small.elements.to_le(),
            big_core_elements: plan.big.elements.to_le(),
            tile_elements: plan.tile_elements.to_le(),
            small_core_iterations: plan.small.iterations.to_le(),
            big_core_iterations: plan.big.iterations.to_le(),
            small_core_tail_elements: plan.small.tail_elements.to_le(),
            big_core_tail_elements: plan.big.tail_elements.to_le(),
            tiling_key: plan.tiling_key.to_le(),
            scalars: plan.scalars.map(|s| s.to_bits().to_le()),
        }
    }

    /// Converts the wire record back into a plan without validating it.
    pub fn to_plan(&self) -> TilingPlan {
        TilingPlan {
            total_elements: u64::from_le(self.total_elements),
            core_count: u64::from_le(self.core_count),
            tail_core_count: u64::from_le(self.tail_core_count),
            tile_elements: u64::from_le(self.tile_elements),
            big: CoreClassPlan {
                elements: u64::from_le(self.big_core_elements),
                iterations: u64::from_le(self.big_core_iterations),
                tail_elements: u64::from_le(self.big_core_tail_elements),
            },
            small: CoreClassPlan {
                elements: u64::from_le(self.small_core_elements),
                iterations: u64::from_le(self.small_core_iterations),
                tail_elements: u64::from_le(self.small_core_tail_elements),
            },
            tiling_key: u64::from_le(self.tiling_key),
            scalars: self.scalars.map(|s| f32::from_bits(u32::from_le(s))),
        }
    }

    /// The record as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a record from a byte buffer of exactly [`Self::SIZE`] bytes.
    pub fn read(bytes: &[u8]) -> Result<Self, TilingError> {
        if bytes.len() != Self::SIZE {
            return Err(TilingError::BlobLength {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(bytes))
    }
}

impl TilingPlan {
    /// Serialize the plan into its blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        TilingData::from_plan(self).as_bytes().to_vec()
    }

    /// Decode and validate a blob.
    ///
    /// A blob that decodes but describes an inconsistent plan is rejected
    /// with [`TilingError::CorruptBlob`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TilingError> {
        let plan = TilingData::read(bytes)?.to_plan();
        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HardwareSpec, TilingRequest, plan};

    fn sample() -> TilingPlan {
        let hw = HardwareSpec::default().with_core_count(4).with_ub_bytes(256);
        let req = TilingRequest::new(100, 4, 2).with_scalars([0.5, -1.0, 0.0, 2.0]);
        plan(&req, &hw).unwrap()
    }

    #[test]
    fn layout_is_little_endian() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), TilingData::SIZE);
        assert_eq!(&bytes[0..8], &100u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &4u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &1u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &24u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &32u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &16u64.to_le_bytes());
        assert_eq!(&bytes[80..88], &1u64.to_le_bytes());
        assert_eq!(&bytes[88..92], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[92..96], &(-1.0f32).to_le_bytes());
    }

    #[test]
    fn decode_restores_plan() {
        let p = sample();
        assert_eq!(TilingPlan::from_bytes(&p.to_bytes()).unwrap(), p);
    }

    #[test]
    fn wrong_length_rejected() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert_eq!(
            TilingPlan::from_bytes(&bytes),
            Err(TilingError::BlobLength {
                expected: 104,
                actual: 105
            })
        );
        assert!(matches!(
            TilingPlan::from_bytes(&[]),
            Err(TilingError::BlobLength { actual: 0, .. })
        ));
    }

    #[test]
    fn unaligned_buffer_decodes() {
        let mut bytes = vec![0u8];
        bytes.extend(sample().to_bytes());
        assert_eq!(TilingPlan::from_bytes(&bytes[1..]).unwrap(), sample());
    }

    #[test]
    fn zeroed_blob_is_corrupt() {
        let zero = [0u8; TilingData::SIZE];
        assert!(matches!(
            TilingPlan::from_bytes(&zero),
            Err(TilingError::CorruptBlob(_))
        ));
    }

    #[test]
    fn tampered_fields_are_corrupt() {
        let good = sample().to_bytes();
        // Each offset names a field whose change breaks an invariant.
        for offset in [8usize, 16, 24, 40, 48, 64, 80] {
            let mut bytes = good.clone();
            bytes[offset] = bytes[offset].wrapping_add(7);
            assert!(
                matches!(TilingPlan::from_bytes(&bytes), Err(TilingError::CorruptBlob(_))),
                "offset {offset}"
            );
        }
    }

    #[test]
    fn cores_past_the_end_are_corrupt() {
        // Four small cores of 8 cover 32 elements of a 17-element tensor;
        // cores 2 and 3 would start at 16 and 24.
        let p = TilingPlan {
            total_elements: 17,
            core_count: 4,
            tail_core_count: 0,
            tile_elements: 16,
            big: CoreClassPlan::default(),
            small: CoreClassPlan {
                elements: 8,
                iterations: 1,
                tail_elements: 8,
            },
            tiling_key: 0,
            scalars: [0.0; SCALAR_SLOTS],
        };
        assert!(matches!(
            TilingPlan::from_bytes(&p.to_bytes()),
            Err(TilingError::CorruptBlob(_))
        ));

        // Empty tensor with cores that still carry elements.
        let empty = TilingPlan {
            total_elements: 0,
            core_count: 2,
            ..p
        };
        assert!(matches!(
            TilingPlan::from_bytes(&empty.to_bytes()),
            Err(TilingError::CorruptBlob(_))
        ));

        // The same shape over 32 elements is a valid plan.
        let full = TilingPlan {
            total_elements: 32,
            ..p
        };
        assert_eq!(TilingPlan::from_bytes(&full.to_bytes()).unwrap(), full);
    }

    #[test]
    fn scalars_are_not_validated() {
        let mut bytes = sample().to_bytes();
        bytes[100..104].copy_from_slice(&f32::NAN.to_le_bytes());
        let p = TilingPlan::from_bytes(&bytes).unwrap();
        assert!(p.scalars[3].is_nan());
    }
}
