use thiserror::Error;

/// Recoverable failures of the arbitration core.
///
/// Programming defects (bit index past capacity, a handle fed back into the
/// wrong pool) are not represented here; they trap via `assert!`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PerfError {
    /// Size mismatch, bad index from a caller, malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No curve intersection, infeasible lookup.
    #[error("out of range: {0}")]
    OutOfRange(&'static str),

    /// Every slot of the active pool is occupied.
    #[error("no free active slot (capacity {capacity})")]
    NoFreeMem { capacity: usize },

    /// A domain or rail lacks a capability it was expected to have.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Catalog lookup miss.
    #[error("invalid {kind} index {index}")]
    InvalidIndex { kind: &'static str, index: usize },
}

pub type Result<T> = std::result::Result<T, PerfError>;
