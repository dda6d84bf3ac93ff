//! perf_arbiter_supervisor
//!
//! Outside-world facing orchestration layer for `perf_arbiter_core`.
//!
//! Responsibilities:
//! - own the catalog, arbitration context, cache and change sequencer
//! - name limits and register them in priority order
//! - convert host limit requests into client inputs via adapters
//! - snapshot and restore active inputs
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no arbitration policy (lives in core)

pub mod adapter;
pub mod supervisor;

pub use adapter::{validate_input, BasicInputBuilder, InputBuilder, LimitRequest, Normalizer, RequestKind};

pub use supervisor::{
    IngestReport, LimitDef, LimitStatus, PerfSupervisor, RestoreStats, SupervisorCfg, SupervisorError,
    SupervisorSnapshot,
};
