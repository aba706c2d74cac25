//! Working-precision arithmetic.
//!
//! Kernels whose native element type lacks the needed vector arithmetic
//! upcast a tile into an `f32` scratch region, compute there, and downcast
//! into the output slot with an explicit [`RoundMode`]. `f32` tiles are
//! computed directly without scratch.

use std::fmt;

use half::{bf16, f16};
use ubflow_ir::DataType;

use crate::ScratchBuffer;

/// Rounding applied when narrowing an `f32` result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RoundMode {
    /// Round to nearest, ties to even.
    #[default]
    Rint,
    /// Round to nearest, ties away from zero.
    Round,
    /// Round toward zero.
    Trunc,
    /// Round toward negative infinity.
    Floor,
    /// Round toward positive infinity.
    Ceil,
}

impl fmt::Display for RoundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rint => "rint",
            Self::Round => "round",
            Self::Trunc => "trunc",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
        };
        f.write_str(s)
    }
}

/// A tensor element with a lossless-or-rounded mapping to `f32`.
pub trait Element: Copy + Default + Send + Sync + PartialEq + fmt::Debug + 'static {
    /// The data type this element stores.
    const DTYPE: DataType;

    /// Widens to `f32`.
    fn to_f32(self) -> f32;

    /// Narrows from `f32` using `mode`.
    fn from_f32(value: f32, mode: RoundMode) -> Self;
}

impl Element for f32 {
    const DTYPE: DataType = DataType::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32, _mode: RoundMode) -> Self {
        value
    }
}

impl Element for f16 {
    const DTYPE: DataType = DataType::F16;

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    fn from_f32(value: f32, mode: RoundMode) -> Self {
        let bits = narrow(
            value,
            mode,
            |v| f16::from_f32(v).to_bits(),
            |b| f16::from_bits(b).to_f32(),
        );
        f16::from_bits(bits)
    }
}

impl Element for bf16 {
    const DTYPE: DataType = DataType::BF16;

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    fn from_f32(value: f32, mode: RoundMode) -> Self {
        let bits = narrow(
            value,
            mode,
            |v| bf16::from_f32(v).to_bits(),
            |b| bf16::from_bits(b).to_f32(),
        );
        bf16::from_bits(bits)
    }
}

/// Rounds an `f32` to an integer value according to `mode`.
fn round_integral(value: f32, mode: RoundMode) -> f32 {
    match mode {
        RoundMode::Rint => value.round_ties_even(),
        RoundMode::Round => value.round(),
        RoundMode::Trunc => value.trunc(),
        RoundMode::Floor => value.floor(),
        RoundMode::Ceil => value.ceil(),
    }
}

macro_rules! integer_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {$(
        impl Element for $ty {
            const DTYPE: DataType = DataType::$dtype;

            fn to_f32(self) -> f32 {
                self as f32
            }

            // `as` saturates out-of-range values and maps NaN to zero.
            fn from_f32(value: f32, mode: RoundMode) -> Self {
                round_integral(value, mode) as $ty
            }
        }
    )*};
}

integer_element!(i8 => I8, i16 => I16, i32 => I32, i64 => I64, u8 => U8);

impl Element for bool {
    const DTYPE: DataType = DataType::Bool;

    fn to_f32(self) -> f32 {
        if self { 1.0 } else { 0.0 }
    }

    fn from_f32(value: f32, _mode: RoundMode) -> Self {
        value != 0.0
    }
}

// ---------------------------------------------------------------------------
// 16-bit narrowing
// ---------------------------------------------------------------------------

const SIGN_16: u16 = 0x8000;

/// Next representable 16-bit float toward positive infinity.
fn step_up(bits: u16) -> u16 {
    if bits & !SIGN_16 == 0 {
        1
    } else if bits & SIGN_16 == 0 {
        bits + 1
    } else {
        bits - 1
    }
}

/// Next representable 16-bit float toward negative infinity.
fn step_down(bits: u16) -> u16 {
    if bits & !SIGN_16 == 0 {
        SIGN_16 | 1
    } else if bits & SIGN_16 == 0 {
        bits - 1
    } else {
        bits + 1
    }
}

/// Narrows `value` to a 16-bit float format given its round-to-nearest-even
/// conversion and widening back to `f32`.
fn narrow(
    value: f32,
    mode: RoundMode,
    to_bits: impl Fn(f32) -> u16,
    widen: impl Fn(u16) -> f32,
) -> u16 {
    let nearest = to_bits(value);
    let back = widen(nearest);
    if mode == RoundMode::Rint || value.is_nan() || back == value {
        return nearest;
    }
    let (lower, upper) = if back > value {
        (step_down(nearest), nearest)
    } else {
        (nearest, step_up(nearest))
    };
    match mode {
        RoundMode::Rint => nearest,
        RoundMode::Floor => lower,
        RoundMode::Ceil => upper,
        RoundMode::Trunc => {
            if value > 0.0 {
                lower
            } else {
                upper
            }
        }
        RoundMode::Round => {
            let v = f64::from(value);
            let below = v - f64::from(widen(lower));
            let above = f64::from(widen(upper)) - v;
            if below < above {
                lower
            } else if above < below {
                upper
            } else if value > 0.0 {
                upper
            } else {
                lower
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WorkingPrecision
// ---------------------------------------------------------------------------

/// Computes tiles in `f32` and narrows results with a fixed rounding mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkingPrecision {
    /// Rounding used on the downcast.
    pub round: RoundMode,
}

impl WorkingPrecision {
    /// Creates a wrapper with the given rounding mode.
    pub const fn new(round: RoundMode) -> Self {
        Self { round }
    }

    /// Widens `src` into `dst` (`Cast` with `CAST_NONE`).
    pub fn upcast<T: Element>(src: &[T], dst: &mut [f32]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = s.to_f32();
        }
    }

    /// Narrows `src` into `dst` with this wrapper's rounding mode.
    pub fn downcast<T: Element>(&self, src: &[f32], dst: &mut [T]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = T::from_f32(s, self.round);
        }
    }

    /// `y[i] = f(x[i])`.
    pub fn map_unary<T: Element>(
        &self,
        x: &[T],
        y: &mut [T],
        scratch: &mut ScratchBuffer,
        f: impl Fn(f32) -> f32,
    ) {
        if T::DTYPE == DataType::F32 {
            for (o, &v) in y.iter_mut().zip(x) {
                *o = T::from_f32(f(v.to_f32()), self.round);
            }
            return;
        }
        let buf = scratch.get(x.len());
        Self::upcast(x, buf);
        buf.iter_mut().for_each(|v| *v = f(*v));
        self.downcast(buf, y);
    }

    /// `y[i] = f(a[i], b[i])`.
    pub fn map_binary<T: Element>(
        &self,
        a: &[T],
        b: &[T],
        y: &mut [T],
        scratch: &mut ScratchBuffer,
        f: impl Fn(f32, f32) -> f32,
    ) {
        if T::DTYPE == DataType::F32 {
            for ((o, &p), &q) in y.iter_mut().zip(a).zip(b) {
                *o = T::from_f32(f(p.to_f32(), q.to_f32()), self.round);
            }
            return;
        }
        let (pa, pb) = scratch.get2(a.len());
        Self::upcast(a, pa);
        Self::upcast(b, pb);
        for (p, &q) in pa.iter_mut().zip(pb.iter()) {
            *p = f(*p, q);
        }
        self.downcast(pa, y);
    }

    /// `y[i] = f(a[i], b[i], c[i])`.
    pub fn map_ternary<T: Element>(
        &self,
        a: &[T],
        b: &[T],
        c: &[T],
        y: &mut [T],
        scratch: &mut ScratchBuffer,
        f: impl Fn(f32, f32, f32) -> f32,
    ) {
        if T::DTYPE == DataType::F32 {
            for (((o, &p), &q), &r) in y.iter_mut().zip(a).zip(b).zip(c) {
                *o = T::from_f32(f(p.to_f32(), q.to_f32(), r.to_f32()), self.round);
            }
            return;
        }
        let (pa, pb, pc) = scratch.get3(a.len());
        Self::upcast(a, pa);
        Self::upcast(b, pb);
        Self::upcast(c, pc);
        for ((p, &q), &r) in pa.iter_mut().zip(pb.iter()).zip(pc.iter()) {
            *p = f(*p, q, r);
        }
        self.downcast(pa, y);
    }
}

impl fmt::Display for WorkingPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f32 working precision ({})", self.round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(value: f32, mode: RoundMode) -> f16 {
        <f16 as Element>::from_f32(value, mode)
    }

    fn b(value: f32, mode: RoundMode) -> bf16 {
        <bf16 as Element>::from_f32(value, mode)
    }

    #[test]
    fn f16_round_modes() {
        // 1 + 2^-11 lies exactly between 1.0 and the next f16 (1 + 2^-10).
        let tie = 1.0 + 2f32.powi(-11);
        let next = 1.0 + 2f32.powi(-10);
        assert_eq!(h(tie, RoundMode::Rint).to_f32(), 1.0);
        assert_eq!(h(tie, RoundMode::Round).to_f32(), next);
        assert_eq!(h(tie, RoundMode::Trunc).to_f32(), 1.0);
        assert_eq!(h(tie, RoundMode::Floor).to_f32(), 1.0);
        assert_eq!(h(tie, RoundMode::Ceil).to_f32(), next);
    }

    #[test]
    fn f16_negative_round_modes() {
        let tie = -(1.0 + 2f32.powi(-11));
        let next = -(1.0 + 2f32.powi(-10));
        assert_eq!(h(tie, RoundMode::Round).to_f32(), next);
        assert_eq!(h(tie, RoundMode::Trunc).to_f32(), -1.0);
        assert_eq!(h(tie, RoundMode::Floor).to_f32(), next);
        assert_eq!(h(tie, RoundMode::Ceil).to_f32(), -1.0);
    }

    #[test]
    fn bf16_round_half_away() {
        // 1 + 2^-8 is the midpoint between 1.0 and 1 + 2^-7 in bf16.
        let tie = 1.0 + 2f32.powi(-8);
        assert_eq!(b(tie, RoundMode::Rint).to_f32(), 1.0);
        assert_eq!(
            b(tie, RoundMode::Round).to_f32(),
            1.0 + 2f32.powi(-7)
        );
    }

    #[test]
    fn exact_values_are_unchanged() {
        for mode in [
            RoundMode::Rint,
            RoundMode::Round,
            RoundMode::Trunc,
            RoundMode::Floor,
            RoundMode::Ceil,
        ] {
            assert_eq!(h(0.5, mode).to_f32(), 0.5);
            assert_eq!(b(-2.0, mode).to_f32(), -2.0);
            assert!(h(f32::NAN, mode).is_nan());
            assert_eq!(h(0.0, mode).to_f32(), 0.0);
        }
    }

    #[test]
    fn tiny_values_round_through_zero() {
        let tiny = 1e-9f32;
        assert_eq!(h(tiny, RoundMode::Floor).to_bits(), 0);
        assert_eq!(h(tiny, RoundMode::Ceil).to_bits(), 1);
        assert_eq!(h(-tiny, RoundMode::Floor).to_bits(), 0x8001);
    }

    #[test]
    fn integer_rounding() {
        assert_eq!(i32::from_f32(2.5, RoundMode::Rint), 2);
        assert_eq!(i32::from_f32(2.5, RoundMode::Round), 3);
        assert_eq!(i32::from_f32(-2.7, RoundMode::Trunc), -2);
        assert_eq!(i8::from_f32(300.0, RoundMode::Rint), 127);
        assert_eq!(u8::from_f32(-1.0, RoundMode::Rint), 0);
        assert!(bool::from_f32(0.25, RoundMode::Rint));
    }

    #[test]
    fn map_unary_through_scratch() {
        let wp = WorkingPrecision::new(RoundMode::Rint);
        let x = [bf16::from_f32(4.0), bf16::from_f32(0.25)];
        let mut y = [bf16::ZERO; 2];
        let mut scratch = ScratchBuffer::default();
        wp.map_unary(&x, &mut y, &mut scratch, |v| 1.0 / v);
        assert_eq!(y.map(|v| v.to_f32()), [0.25, 4.0]);
    }

    #[test]
    fn map_ternary_f32_in_place() {
        let wp = WorkingPrecision::default();
        let mut y = [0f32; 3];
        let mut scratch = ScratchBuffer::default();
        wp.map_ternary(
            &[1.0, 2.0, 3.0],
            &[4.0, 5.0, 6.0],
            &[2.0, 2.0, 2.0],
            &mut y,
            &mut scratch,
            |a, b, c| a + b / c,
        );
        assert_eq!(y, [3.0, 4.5, 6.0]);
    }

    #[test]
    fn display() {
        let wp = WorkingPrecision::new(RoundMode::Round);
        assert_eq!(format!("{wp}"), "f32 working precision (round)");
    }
}
