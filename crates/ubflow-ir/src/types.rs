//! Element data types.

use std::fmt;
use std::str::FromStr;

use crate::IrError;

/// The element type of a tensor.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DataType {
    /// IEEE 754 half precision.
    F16,
    /// IEEE 754 single precision.
    F32,
    /// Brain floating point (8-bit exponent, 7-bit mantissa).
    BF16,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Boolean stored as one byte (`0` or `1`).
    Bool,
    /// Complex number with two half-precision components.
    Complex32,
    /// Complex number with two single-precision components.
    Complex64,
}

impl DataType {
    /// All data types, in declaration order.
    pub const ALL: [DataType; 11] = [
        Self::F16,
        Self::F32,
        Self::BF16,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::Bool,
        Self::Complex32,
        Self::Complex64,
    ];

    /// Width of one element in bytes.
    pub const fn size_in_bytes(self) -> u64 {
        match self {
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::F16 | Self::BF16 | Self::I16 => 2,
            Self::F32 | Self::I32 | Self::Complex32 => 4,
            Self::I64 | Self::Complex64 => 8,
        }
    }

    /// Returns `true` for real floating-point types.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::BF16)
    }

    /// Returns `true` for integer and boolean types.
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::Bool
        )
    }

    /// Returns `true` for complex types.
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex32 | Self::Complex64)
    }

    /// Returns `true` for the 16-bit float types whose arithmetic is usually
    /// routed through an `f32` scratch buffer.
    pub const fn is_reduced_float(self) -> bool {
        matches!(self, Self::F16 | Self::BF16)
    }

    /// Canonical lowercase name, as used by [`fmt::Display`].
    pub const fn name(self) -> &'static str {
        match self {
            Self::F16 => "float16",
            Self::F32 => "float32",
            Self::BF16 => "bfloat16",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::Bool => "bool",
            Self::Complex32 => "complex32",
            Self::Complex64 => "complex64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dtype = match s.to_ascii_lowercase().as_str() {
            "float16" | "f16" | "half" => Self::F16,
            "float32" | "f32" | "float" => Self::F32,
            "bfloat16" | "bf16" => Self::BF16,
            "int8" | "i8" => Self::I8,
            "int16" | "i16" => Self::I16,
            "int32" | "i32" => Self::I32,
            "int64" | "i64" => Self::I64,
            "uint8" | "u8" => Self::U8,
            "bool" => Self::Bool,
            "complex32" | "c32" => Self::Complex32,
            "complex64" | "c64" => Self::Complex64,
            _ => return Err(IrError::UnknownDataType(s.to_string())),
        };
        Ok(dtype)
    }
}

/// A single-precision complex value, the element type of
/// [`DataType::Complex64`] tensors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Complex {
    /// Real part.
    pub re: f32,
    /// Imaginary part.
    pub im: f32,
}

impl Complex {
    /// Creates a complex value from its parts.
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    /// Multiplies both parts by a real scalar.
    pub fn scale(self, k: f32) -> Self {
        Self {
            re: self.re * k,
            im: self.im * k,
        }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im.is_sign_negative() {
            write!(f, "{}-{}i", self.re, -self.im)
        } else {
            write!(f, "{}+{}i", self.re, self.im)
        }
    }
}
