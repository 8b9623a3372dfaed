//! Function secret sharing building blocks: distributed point functions with
//! pluggable full-domain evaluation strategies.

use anyhow::Result;

use crate::errors::ProtocolError;

pub mod dpf;

pub use dpf::{DpfEvaluator, DpfKey, DpfKeyGenerator};

/// Strategy used to materialise the full domain of a DPF.
///
/// Every strategy produces bit-identical output; they trade walk count
/// against working-set size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EvalType {
    /// One independent tree walk per input. Smallest code path, most PRG
    /// calls; fine for tiny domains.
    Iterative,
    /// Expand the tree level by level, keeping the whole frontier dense.
    IterSingleBatch,
    /// Recurse subtrees to completion, emitting leaves in order with O(depth)
    /// working memory.
    IterDepthFirst,
    /// Depth-first over the top of the tree, switching to a dense frontier
    /// for the bottom levels.
    #[default]
    HybridBatched,
}

/// The strategy the higher-level protocols default to.
pub const OPTIMIZED_EVAL_TYPE: EvalType = EvalType::HybridBatched;

/// Output encoding of a DPF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputType {
    /// 128-bit blocks; the two parties' outputs XOR to a one-hot bit mask.
    SingleBitMask,
    /// Ring elements; the two parties' outputs sum to the point value at the
    /// special input and to zero everywhere else.
    ShiftedAdditive,
}

/// Parameters of a DPF instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DpfParameters {
    input_bitsize: u64,
    element_bitsize: u64,
    terminate_bitsize: u64,
    eval_type: EvalType,
    output_type: OutputType,
}

impl DpfParameters {
    /// Default terminate bit-width: one 128-bit leaf block of mask bits.
    pub const DEFAULT_TERMINATE_BITSIZE: u64 = 7;

    /// Build a parameter set; `input_bitsize` is the log of the domain,
    /// `element_bitsize` the ring width of the outputs.
    pub fn new(
        input_bitsize: u64,
        element_bitsize: u64,
        eval_type: EvalType,
        output_type: OutputType,
    ) -> Result<Self> {
        if input_bitsize == 0 || input_bitsize > 30 {
            return Err(ProtocolError::Configuration(format!(
                "input_bitsize must be in [1, 30], got {}",
                input_bitsize
            ))
            .into());
        }
        if element_bitsize == 0 || element_bitsize > 64 {
            return Err(ProtocolError::Configuration(format!(
                "element_bitsize must be in [1, 64], got {}",
                element_bitsize
            ))
            .into());
        }
        Ok(Self {
            input_bitsize,
            element_bitsize,
            terminate_bitsize: Self::DEFAULT_TERMINATE_BITSIZE.min(input_bitsize),
            eval_type,
            output_type,
        })
    }

    /// Log2 of the input domain.
    pub fn input_bitsize(&self) -> u64 {
        self.input_bitsize
    }

    /// Ring width of the outputs.
    pub fn element_bitsize(&self) -> u64 {
        self.element_bitsize
    }

    /// Suffix width materialised inside one leaf (mask mode).
    pub fn terminate_bitsize(&self) -> u64 {
        self.terminate_bitsize
    }

    /// Configured full-domain strategy.
    pub fn eval_type(&self) -> EvalType {
        self.eval_type
    }

    /// Configured output encoding.
    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// Number of inputs, `2^input_bitsize`.
    pub fn domain_size(&self) -> usize {
        1usize << self.input_bitsize
    }

    /// Tree depth walked by the PRG for this output encoding.
    pub fn tree_depth(&self) -> u64 {
        match self.output_type {
            OutputType::ShiftedAdditive => self.input_bitsize,
            OutputType::SingleBitMask => self.input_bitsize - self.terminate_bitsize,
        }
    }

    /// Number of leaf blocks of a full-domain mask expansion.
    pub fn full_domain_blocks(&self) -> usize {
        1usize << self.tree_depth().min(self.input_bitsize)
    }
}
