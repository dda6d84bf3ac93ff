use serde::{Deserialize, Serialize};

use crate::catalog::TopologyId;
use crate::sequencer::ApplyFlags;
use crate::types::ClkDomainIdx;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterCfg {
    /// Reuse the last output while nothing it depends on has changed.
    pub caching_enabled: bool,
    /// Compute but do not hand outputs to the change sequencer.
    pub arbitration_locked: bool,
    /// Domains that honour strict propagation; `None` means all of them.
    pub strict_domains: Option<Vec<ClkDomainIdx>>,
    /// Fall back to a curve's default point when a lookup runs off the curve.
    pub use_default_vf_point: bool,
    /// Topology used by limits that do not name their own.
    pub propagation_topology: Option<TopologyId>,
    pub apply_flags: ApplyFlags,
}

impl Default for ArbiterCfg {
    fn default() -> Self {
        Self {
            caching_enabled: true,
            arbitration_locked: false,
            strict_domains: None,
            use_default_vf_point: true,
            propagation_topology: None,
            apply_flags: ApplyFlags::default(),
        }
    }
}
