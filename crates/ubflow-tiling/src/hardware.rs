//! Hardware capability records for tiling.

use std::fmt;

/// Capabilities of the accelerator a kernel is planned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareSpec {
    /// Target identifier (e.g. "ascend910b").
    pub name: String,
    /// Maximum number of vector cores a launch may use.
    pub core_count: u64,
    /// On-chip unified buffer capacity per core, in bytes.
    pub ub_bytes: u64,
    /// Data-copy alignment block in bytes.
    pub alignment_bytes: u64,
    /// Whether the vector unit accepts bfloat16 operands.
    pub supports_bf16: bool,
}

impl HardwareSpec {
    /// Default target used when none is given.
    pub const DEFAULT_TARGET: &'static str = "ascend910b";

    /// Return the capability record for a named target.
    ///
    /// Unknown names fall back to a conservative generic profile.
    pub fn for_target(target: &str) -> Self {
        match target {
            "ascend910b" => Self {
                name: target.to_string(),
                core_count: 40,
                ub_bytes: 192 * 1024,
                alignment_bytes: 32,
                supports_bf16: true,
            },
            "ascend910" => Self {
                name: target.to_string(),
                core_count: 32,
                ub_bytes: 256 * 1024,
                alignment_bytes: 32,
                supports_bf16: false,
            },
            "ascend310p" => Self {
                name: target.to_string(),
                core_count: 8,
                ub_bytes: 256 * 1024,
                alignment_bytes: 32,
                supports_bf16: false,
            },
            _ => {
                log::warn!("unknown target '{target}', using generic hardware profile");
                Self {
                    name: "generic".to_string(),
                    core_count: 8,
                    ub_bytes: 192 * 1024,
                    alignment_bytes: 32,
                    supports_bf16: false,
                }
            }
        }
    }

    /// Names of the built-in targets.
    pub fn known_targets() -> &'static [&'static str] {
        &["ascend910b", "ascend910", "ascend310p"]
    }

    /// Override the number of cores.
    pub fn with_core_count(mut self, core_count: u64) -> Self {
        self.core_count = core_count;
        self
    }

    /// Override the unified buffer size.
    pub fn with_ub_bytes(mut self, ub_bytes: u64) -> Self {
        self.ub_bytes = ub_bytes;
        self
    }

    /// Override the alignment block size.
    pub fn with_alignment(mut self, alignment_bytes: u64) -> Self {
        self.alignment_bytes = alignment_bytes;
        self
    }
}

impl Default for HardwareSpec {
    fn default() -> Self {
        Self::for_target(Self::DEFAULT_TARGET)
    }
}

impl fmt::Display for HardwareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} cores, {} KiB UB, {}-byte blocks{}",
            self.name,
            self.core_count,
            self.ub_bytes / 1024,
            self.alignment_bytes,
            if self.supports_bf16 { ", bf16" } else { "" }
        )
    }
}
