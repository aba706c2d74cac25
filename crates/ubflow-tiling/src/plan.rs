//! Big-core/small-core tiling.
//!
//! The element range is rounded up to whole alignment blocks and the blocks
//! are dealt out across cores: every core gets `blocks / cores` blocks and
//! the first `blocks % cores` cores ("big" cores) get one more. Each core
//! then walks its share in tiles sized to the on-chip buffer budget.

use std::fmt;

use crate::{DOUBLE_BUFFER, HardwareSpec, SCALAR_SLOTS, TilingError};

/// Inputs to the planner that come from the operator rather than the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingRequest {
    /// Number of elements in the streamed tensor.
    pub total_elements: u64,
    /// Width of one element in bytes.
    pub element_width: u64,
    /// Same-sized buffers the compute loop keeps live at once
    /// (queued inputs/outputs plus scratch).
    pub live_buffers: u64,
    /// Operator scalar parameters carried alongside the plan.
    pub scalars: [f32; SCALAR_SLOTS],
}

impl TilingRequest {
    /// Creates a request with all scalars zeroed.
    pub fn new(total_elements: u64, element_width: u64, live_buffers: u64) -> Self {
        Self {
            total_elements,
            element_width,
            live_buffers,
            scalars: [0.0; SCALAR_SLOTS],
        }
    }

    /// Attach operator scalars.
    pub fn with_scalars(mut self, scalars: [f32; SCALAR_SLOTS]) -> Self {
        self.scalars = scalars;
        self
    }
}

/// Work assigned to every core of one class (big or small).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CoreClassPlan {
    /// Elements each core of this class covers (padded to whole blocks).
    pub elements: u64,
    /// Pipeline iterations, `ceil(elements / tile_elements)`.
    pub iterations: u64,
    /// Elements processed by the final iteration.
    pub tail_elements: u64,
}

impl CoreClassPlan {
    fn for_elements(elements: u64, tile_elements: u64) -> Self {
        if elements == 0 {
            return Self::default();
        }
        let iterations = elements.div_ceil(tile_elements);
        // Always in (0, tile_elements]: an exact multiple leaves a full tail.
        let tail_elements = elements - tile_elements * (iterations - 1);
        Self {
            elements,
            iterations,
            tail_elements,
        }
    }
}

impl fmt::Display for CoreClassPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} elems in {} iters (tail {})",
            self.elements, self.iterations, self.tail_elements
        )
    }
}

/// The contract between the planner and the compute engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingPlan {
    /// Logical element count of the streamed tensor.
    pub total_elements: u64,
    /// Cores to activate.
    pub core_count: u64,
    /// Cores `[0, tail_core_count)` are big cores.
    pub tail_core_count: u64,
    /// Maximum elements per pipeline iteration.
    pub tile_elements: u64,
    /// Plan for big cores.
    pub big: CoreClassPlan,
    /// Plan for small cores.
    pub small: CoreClassPlan,
    /// Kernel variant selector: `1` when big cores exist, else `0`.
    pub tiling_key: u64,
    /// Operator scalar parameters.
    pub scalars: [f32; SCALAR_SLOTS],
}

/// One core's slice of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAssignment {
    /// Index of the core.
    pub core_idx: u64,
    /// First element of the core's range.
    pub offset: u64,
    /// Elements in the core's padded range.
    pub elements: u64,
    /// Pipeline iterations.
    pub iterations: u64,
    /// Elements per full iteration.
    pub tile_elements: u64,
    /// Elements in the final iteration.
    pub tail_elements: u64,
}

impl CoreAssignment {
    /// Elements of the padded range that lie inside a tensor of `total` elements.
    pub fn valid_elements(&self, total: u64) -> u64 {
        self.elements.min(total.saturating_sub(self.offset))
    }

    /// Elements processed by iteration `i` before clamping to the tensor end.
    pub fn iteration_elements(&self, i: u64) -> u64 {
        if i + 1 == self.iterations {
            self.tail_elements
        } else {
            self.tile_elements
        }
    }

    /// Elements iteration `i` actually moves once the padded range is
    /// clamped to a tensor of `total` elements. Zero once past the end.
    pub fn clamped_iteration_elements(&self, i: u64, total: u64) -> u64 {
        let start = self.offset + i * self.tile_elements;
        self.iteration_elements(i).min(total.saturating_sub(start))
    }
}

impl TilingPlan {
    /// Returns `true` when some cores carry one extra block.
    pub fn has_big_cores(&self) -> bool {
        self.tail_core_count > 0
    }

    /// Plan for the class `core_idx` belongs to.
    pub fn class_of(&self, core_idx: u64) -> &CoreClassPlan {
        if core_idx < self.tail_core_count {
            &self.big
        } else {
            &self.small
        }
    }

    /// The range and loop counts for one core.
    ///
    /// Big cores come first, so the offset is the big share times the number
    /// of preceding big cores plus the small share times the preceding small
    /// cores.
    pub fn assignment(&self, core_idx: u64) -> CoreAssignment {
        let bigs_before = core_idx.min(self.tail_core_count);
        let smalls_before = core_idx - bigs_before;
        let offset = self.big.elements * bigs_before + self.small.elements * smalls_before;
        let class = self.class_of(core_idx);
        CoreAssignment {
            core_idx,
            offset,
            elements: class.elements,
            iterations: class.iterations,
            tile_elements: self.tile_elements,
            tail_elements: class.tail_elements,
        }
    }

    /// Assignments for every active core, in core order.
    pub fn assignments(&self) -> impl Iterator<Item = CoreAssignment> + '_ {
        (0..self.core_count).map(|i| self.assignment(i))
    }

    /// Elements covered by all cores including block padding.
    pub fn covered_elements(&self) -> Option<u64> {
        let big = self.big.elements.checked_mul(self.tail_core_count)?;
        let small_cores = self.core_count.checked_sub(self.tail_core_count)?;
        let small = self.small.elements.checked_mul(small_cores)?;
        big.checked_add(small)
    }

    /// Check the invariants the engine relies on.
    ///
    /// Freshly planned values always pass; this guards decoded blobs.
    pub fn validate(&self) -> Result<(), TilingError> {
        let corrupt = |msg: &str| Err(TilingError::CorruptBlob(msg.to_string()));
        if self.core_count == 0 {
            return corrupt("core count is zero");
        }
        if self.tail_core_count >= self.core_count {
            return corrupt("tail core count must be below core count");
        }
        if self.tiling_key != u64::from(self.has_big_cores()) {
            return corrupt("tiling key disagrees with tail core count");
        }
        if self.total_elements > 0 && self.tile_elements == 0 {
            return corrupt("tile size is zero");
        }
        for (name, class) in [("big", &self.big), ("small", &self.small)] {
            if class.elements == 0 {
                if class.iterations != 0 || class.tail_elements != 0 {
                    return corrupt(&format!("{name} cores have loops but no elements"));
                }
                continue;
            }
            if class.tail_elements == 0 || class.tail_elements > self.tile_elements {
                return corrupt(&format!("{name} core tail outside (0, tile]"));
            }
            let full = class
                .iterations
                .checked_sub(1)
                .and_then(|n| n.checked_mul(self.tile_elements))
                .and_then(|n| n.checked_add(class.tail_elements));
            if full != Some(class.elements) {
                return corrupt(&format!("{name} core iterations do not cover its elements"));
            }
        }
        if self.has_big_cores() && self.big.elements <= self.small.elements {
            return corrupt("big cores must carry more elements than small cores");
        }
        let Some(covered) = self.covered_elements() else {
            return corrupt("covered element count overflows");
        };
        if covered < self.total_elements {
            return corrupt("cores do not cover the tensor");
        }
        // The last core is always small; its final iteration is the last to
        // start, and it must start inside the tensor.
        if self.total_elements == 0 {
            if covered != 0 {
                return corrupt("cores cover elements of an empty tensor");
            }
        } else if covered - self.total_elements >= self.small.tail_elements {
            return corrupt("an iteration starts past the end of the tensor");
        }
        Ok(())
    }
}

impl fmt::Display for TilingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TilingPlan(total={}, cores={}, big_cores={}, tile={}, key={}",
            self.total_elements,
            self.core_count,
            self.tail_core_count,
            self.tile_elements,
            self.tiling_key
        )?;
        if self.has_big_cores() {
            write!(f, ", big: {}", self.big)?;
        }
        write!(f, ", small: {})", self.small)
    }
}

/// Compute a tiling plan.
///
/// Pure function of its inputs. Every denominator is checked before use, so
/// a misconfigured target fails here instead of producing a plan the engine
/// would trust.
pub fn plan(request: &TilingRequest, hw: &HardwareSpec) -> Result<TilingPlan, TilingError> {
    if hw.core_count == 0 {
        return Err(TilingError::ZeroCoreCount);
    }
    let align = hw.alignment_bytes;
    if align == 0 {
        return Err(TilingError::ZeroAlignment);
    }
    let width = request.element_width;
    if width == 0 || align % width != 0 {
        return Err(TilingError::InvalidElementWidth {
            width,
            alignment: align,
        });
    }
    if request.live_buffers == 0 {
        return Err(TilingError::ZeroLiveBuffers);
    }

    let total = request.total_elements;
    let total_bytes = total.checked_mul(width).ok_or(TilingError::Overflow)?;
    let total_blocks = total_bytes.div_ceil(align);

    let tile_budget = hw.ub_bytes / request.live_buffers / DOUBLE_BUFFER;
    let tile_blocks = tile_budget / align;
    let tile_elements = tile_blocks * align / width;
    if tile_elements == 0 {
        return Err(TilingError::BufferTooSmall {
            ub_bytes: hw.ub_bytes,
            live_buffers: request.live_buffers,
        });
    }

    let core_count = if tile_elements >= total {
        1
    } else {
        hw.core_count.min(total_blocks).max(1)
    };

    let blocks_per_core = total_blocks / core_count;
    let tail_core_count = total_blocks % core_count;
    let block_elements = align / width;

    let small = CoreClassPlan::for_elements(blocks_per_core * block_elements, tile_elements);
    let big = CoreClassPlan::for_elements((blocks_per_core + 1) * block_elements, tile_elements);

    let plan = TilingPlan {
        total_elements: total,
        core_count,
        tail_core_count,
        tile_elements,
        big,
        small,
        tiling_key: u64::from(tail_core_count > 0),
        scalars: request.scalars,
    };
    log::debug!("planned {} on {}: {plan}", total, hw.name);
    Ok(plan)
}
