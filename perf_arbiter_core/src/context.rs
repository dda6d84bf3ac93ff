//! Process-wide arbitration state: limit table, active pool, defaults and
//! the sequence counter that versions everything arbitration reads.

use tracing::{debug, warn};

use crate::catalog::{TopologyId, VfCatalog};
use crate::cfg::ArbiterCfg;
use crate::error::{PerfError, Result};
use crate::limit::{Limit, LimitFlags, NormalizeParams, PropagationRegime};
use crate::pool::{ActivePool, ActiveSlotState, ACTIVE_POOL_CAPACITY};
use crate::types::{
    BoundTuple, ClientInput, ClkDomainMask, LimitIdx, TupleBounds, VoltRailMask, MAX_CLK_DOMAINS,
    MAX_LIMITS,
};
use crate::vf::VfConverter;

#[derive(Debug)]
pub struct ArbitrationContext {
    cfg: ArbiterCfg,
    limits: Vec<Limit>,
    pool: ActivePool<ActiveSlotState, ACTIVE_POOL_CAPACITY>,
    defaults: TupleBounds,
    domain_mask: ClkDomainMask,
    rail_mask: VoltRailMask,
    strict_mask: ClkDomainMask,
    sequence_id: u64,
}

/// Loosest MIN/MAX tuples the catalog allows.
fn default_bounds<C: VfCatalog + ?Sized>(catalog: &C) -> Result<TupleBounds> {
    let conv = VfConverter::new(catalog);
    let full = conv.full_pstate_range()?;
    let mut min = BoundTuple { pstate_idx: full.min, ..BoundTuple::default() };
    let mut max = BoundTuple { pstate_idx: full.max, ..BoundTuple::default() };
    for d in catalog.clk_domains().iter() {
        let r = conv.pstate_range_to_frequency_range(d, full)?;
        min.freq_khz[d] = r.min;
        max.freq_khz[d] = r.max;
    }
    for rail in catalog.volt_rails().iter() {
        let r = catalog.rail_range(rail)?;
        min.voltage_uv[rail] = r.min;
        max.voltage_uv[rail] = r.max;
    }
    Ok(TupleBounds { min, max })
}

impl ArbitrationContext {
    pub fn new<C: VfCatalog + ?Sized>(cfg: ArbiterCfg, catalog: &C) -> Result<Self> {
        let domain_mask = catalog.clk_domains();
        let mut strict_mask = ClkDomainMask::new(MAX_CLK_DOMAINS);
        match &cfg.strict_domains {
            None => strict_mask.copy(&domain_mask)?,
            Some(list) => {
                for &d in list {
                    if d >= MAX_CLK_DOMAINS || !domain_mask.get(d) {
                        return Err(PerfError::InvalidIndex { kind: "clock domain", index: d });
                    }
                    strict_mask.set(d);
                }
            }
        }

        Ok(Self {
            defaults: default_bounds(catalog)?,
            domain_mask,
            rail_mask: catalog.volt_rails(),
            strict_mask,
            cfg,
            limits: Vec::new(),
            pool: ActivePool::new(),
            sequence_id: 0,
        })
    }

    pub fn cfg(&self) -> &ArbiterCfg {
        &self.cfg
    }

    pub fn default_bounds(&self) -> &TupleBounds {
        &self.defaults
    }

    pub fn domain_mask(&self) -> &ClkDomainMask {
        &self.domain_mask
    }

    pub fn rail_mask(&self) -> &VoltRailMask {
        &self.rail_mask
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn caching_enabled(&self) -> bool {
        self.cfg.caching_enabled
    }

    pub fn arbitration_locked(&self) -> bool {
        self.cfg.arbitration_locked
    }

    fn bump_sequence(&mut self) {
        self.sequence_id = self.sequence_id.wrapping_add(1);
    }

    pub fn set_caching_enabled(&mut self, enabled: bool) {
        self.cfg.caching_enabled = enabled;
    }

    /// Unlocking bumps the sequence so the next arbitration is applied even
    /// if nothing else changed while locked.
    pub fn set_arbitration_locked(&mut self, locked: bool) {
        if self.cfg.arbitration_locked && !locked {
            self.bump_sequence();
        }
        self.cfg.arbitration_locked = locked;
    }

    /// VF curve data changed underneath the catalog.
    pub fn invalidate_vf(&mut self) {
        self.bump_sequence();
        debug!(sequence_id = self.sequence_id, "vf data invalidated");
    }

    /// Append a limit; registration order is priority order, index 0 first.
    pub fn register_limit(
        &mut self,
        id: u32,
        flags: LimitFlags,
        propagation: PropagationRegime,
        policy_id: Option<u32>,
    ) -> Result<LimitIdx> {
        if self.limits.len() >= MAX_LIMITS {
            return Err(PerfError::InvalidArgument("limit table full"));
        }
        if self.limits.iter().any(|l| l.id == id) {
            return Err(PerfError::InvalidArgument("duplicate limit id"));
        }
        self.limits.push(Limit::new(id, flags, propagation, policy_id));
        self.bump_sequence();
        Ok(self.limits.len() - 1)
    }

    pub fn limits(&self) -> &[Limit] {
        &self.limits
    }

    pub fn limit_index(&self, id: u32) -> Option<LimitIdx> {
        self.limits.iter().position(|l| l.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.pool.in_use()
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Current input of limit `idx`; `Disabled` when it holds no slot.
    pub fn limit_input(&self, idx: LimitIdx) -> Result<ClientInput> {
        let limit = self
            .limits
            .get(idx)
            .ok_or(PerfError::InvalidIndex { kind: "limit", index: idx })?;
        Ok(match &limit.active {
            Some(h) => self.pool.get(h).input,
            None => ClientInput::Disabled,
        })
    }

    /// Set or clear a limit's client input.
    ///
    /// Disabled → active acquires a pool slot; active → disabled releases
    /// it. Pool exhaustion leaves the limit disabled and every other limit
    /// untouched.
    pub fn set_limit_input(&mut self, idx: LimitIdx, input: ClientInput) -> Result<()> {
        let limit = self
            .limits
            .get_mut(idx)
            .ok_or(PerfError::InvalidIndex { kind: "limit", index: idx })?;
        let id = limit.id;

        match (input.is_disabled(), limit.active.take()) {
            (true, None) => return Ok(()),
            (true, Some(handle)) => {
                self.pool.release(handle);
                debug!(limit = id, "limit disabled");
            }
            (false, Some(handle)) => {
                let old = self.pool.replace(&handle, ActiveSlotState { input });
                limit.active = Some(handle);
                if old.input == input {
                    return Ok(());
                }
                debug!(limit = id, ?input, "limit input updated");
            }
            (false, None) => match self.pool.acquire(ActiveSlotState { input }) {
                Ok(handle) => {
                    limit.active = Some(handle);
                    debug!(limit = id, ?input, "limit enabled");
                }
                Err(e) => {
                    warn!(limit = id, error = %e, "limit rejected, active pool exhausted");
                    return Err(e);
                }
            },
        }
        self.bump_sequence();
        Ok(())
    }

    /// Resolve the normalization knobs for limit `idx`.
    pub(crate) fn normalize_params(&self, idx: LimitIdx) -> NormalizeParams {
        let limit = &self.limits[idx];
        let topology: Option<TopologyId> = match limit.propagation {
            PropagationRegime::Default => self.cfg.propagation_topology,
            PropagationRegime::Topology(t) => Some(t),
            PropagationRegime::InputOnly => None,
        };
        NormalizeParams {
            strict_domains: if limit.flags.strict_propagation {
                self.strict_mask
            } else {
                ClkDomainMask::new(MAX_CLK_DOMAINS)
            },
            topology,
            use_default_vf_point: self.cfg.use_default_vf_point,
        }
    }
}
