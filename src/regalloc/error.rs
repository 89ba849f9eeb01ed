//! Internal invariant violations raised by the liveness passes.
//!
//! None of these are user errors: each one means an earlier stage handed
//! the passes malformed input, and compilation of the function must stop.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    #[error("no live-in set recorded for block '{block}'")]
    MissingBlock { block: String },

    #[error("unexpected {instr} in block '{block}' during conflict extraction")]
    UnexpectedPseudo { block: String, instr: String },

    #[error("cyclic SCC with no blocks")]
    EmptyCyclicScc,

    #[error("instruction {index} of block '{block}' has no liveness record")]
    MissingLiveness { block: String, index: usize },

    #[error(
        "SCCs not in reverse dependent order: block '{block}' jumps to unprocessed block '{target}'"
    )]
    NotReverseDependent { block: String, target: String },

    #[error("cyclic SCC did not converge after {rounds} rounds")]
    NoConvergence { rounds: usize },

    #[error("spill slot {slot} in block '{block}' is out of range at frame delta {delta}")]
    SlotOutOfRange { block: String, slot: u32, delta: i32 },
}

pub type LivenessResult<T> = Result<T, LivenessError>;
