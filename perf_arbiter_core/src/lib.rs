pub mod error;
pub mod bitset;
pub mod types;

pub mod catalog;
pub mod vf;
pub mod pool;
pub mod limit;
pub mod cfg;
pub mod context;
pub mod sequencer;
pub mod arbitrate;
pub mod cache;
pub mod export;

pub use error::{PerfError, Result};
pub use bitset::{words_for_bits, BitSet, BitSet1024, BitSet2048, BitSet255, BitSet32, SetBits};
pub use types::{
    ArbTuple, ArbitrationOutput, BoundSources, BoundTuple, ClientInput, ClkDomainIdx, ClkDomainMask,
    LimitIdx, LimitMask, PstateIdx, PstateRange, TupleBounds, ValueRange, VfPoint, VoltRailIdx,
    VoltRailMask, MAX_CLK_DOMAINS, MAX_LIMITS, MAX_VOLT_RAILS,
};

pub use catalog::{
    CatalogDesc, ClkDomainDesc, DomainFreq, DomainRange, PropRelationship, PropTopology, PstateDesc,
    RailDependency, StaticCatalog, TopologyId, VfCatalog, VfCurveDesc, VirtualPstate, VoltRailDesc,
};
pub use vf::VfConverter;
pub use pool::{ActiveHandle, ActivePool, ActiveSlotState, ACTIVE_POOL_CAPACITY};
pub use limit::{Limit, LimitBound, LimitFlags, NormalizeParams, PropagationRegime};
pub use cfg::ArbiterCfg;
pub use context::ArbitrationContext;
pub use sequencer::{ApplyFlags, ChangeSequencer};
pub use arbitrate::{arbitrate, arbitrate_and_apply, no_exclusions};
pub use cache::ArbitrationCache;
pub use export::{ArbOutputV1, ArbOutputVersion, ArbitrationOutputExport, ExportHeader, ExportPayload};
