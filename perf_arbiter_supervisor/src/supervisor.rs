//! Arbitration supervisor.
//!
//! This crate is the outside-world facing orchestration layer around `perf_arbiter_core`:
//! - owns the catalog, `ArbitrationContext`, `ArbitrationCache` and change sequencer
//! - names limits and keeps them in registration (priority) order
//! - converts host requests into client inputs via adapters
//! - snapshots and restores active inputs
//!
//! No IO. No async. A supervisor has a single owner; callers serialize input
//! changes with arbitration by holding `&mut`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use perf_arbiter_core::{
    arbitrate, ArbTuple, ArbiterCfg, ArbitrationCache, ArbitrationContext, ArbitrationOutput,
    ArbitrationOutputExport, ArbOutputVersion, ChangeSequencer, ClientInput, LimitFlags, LimitIdx,
    LimitMask, PerfError, PropagationRegime, VfCatalog, MAX_LIMITS,
};

use crate::adapter::{validate_input, InputBuilder, LimitRequest};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("unknown limit `{0}`")]
    UnknownLimit(String),

    #[error("limit `{0}` registered twice")]
    DuplicateLimit(String),

    #[error("limit `{limit}`: {source}")]
    Limit {
        limit: String,
        #[source]
        source: PerfError,
    },

    #[error(transparent)]
    Perf(#[from] PerfError),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Static description of one limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDef {
    pub name: String,
    pub flags: LimitFlags,
    #[serde(default)]
    pub propagation: PropagationRegime,
    #[serde(default)]
    pub policy_id: Option<u32>,
}

impl LimitDef {
    pub fn new(name: impl Into<String>, flags: LimitFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            propagation: PropagationRegime::Default,
            policy_id: None,
        }
    }
}

/// Supervisor configuration: arbiter knobs plus the limit table in priority order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorCfg {
    pub arbiter: ArbiterCfg,
    pub limits: Vec<LimitDef>,
}

/// Per-limit status row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitStatus {
    pub name: String,
    pub index: LimitIdx,
    pub flags: LimitFlags,
    pub policy_id: Option<u32>,
    pub active: bool,
    pub input: ClientInput,
}

/// Snapshot of active limit inputs for storage-agnostic persistence.
///
/// Pure data: callers decide how and where to store it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSnapshot {
    /// `(limit name, input)` pairs, sorted by name.
    pub inputs: Vec<(String, ClientInput)>,
}

/// Counters returned by restore/import operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Inputs applied to a registered limit.
    pub applied: usize,
    /// Inputs naming an unknown limit, failing the catalog check or refused
    /// by the context.
    pub rejected: usize,
}

/// Outcome of one `ingest` batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub applied: usize,
    /// Rejected requests in input order, with the reason.
    pub rejected: Vec<(String, SupervisorError)>,
}

pub struct PerfSupervisor<C, S> {
    catalog: C,
    ctx: ArbitrationContext,
    cache: ArbitrationCache,
    sequencer: S,
    names: HashMap<String, LimitIdx>,
}

impl<C: VfCatalog, S: ChangeSequencer> PerfSupervisor<C, S> {
    /// Build a supervisor and register `cfg.limits` in order.
    pub fn new(catalog: C, sequencer: S, cfg: SupervisorCfg) -> Result<Self> {
        let ctx = ArbitrationContext::new(cfg.arbiter, &catalog)?;
        let mut sup = Self {
            catalog,
            ctx,
            cache: ArbitrationCache::new(),
            sequencer,
            names: HashMap::new(),
        };
        for def in cfg.limits {
            sup.register_limit(def)?;
        }
        Ok(sup)
    }

    /// Append a limit at the lowest priority so far.
    pub fn register_limit(&mut self, def: LimitDef) -> Result<LimitIdx> {
        if self.names.contains_key(&def.name) {
            return Err(SupervisorError::DuplicateLimit(def.name));
        }
        if let PropagationRegime::Topology(topology) = def.propagation {
            self.catalog
                .prop_relationships(topology)
                .map_err(|source| SupervisorError::Limit { limit: def.name.clone(), source })?;
        }
        let id = self.ctx.limits().len() as u32;
        let idx = self
            .ctx
            .register_limit(id, def.flags, def.propagation, def.policy_id)
            .map_err(|source| SupervisorError::Limit { limit: def.name.clone(), source })?;
        debug!(limit = %def.name, idx, "limit registered");
        self.names.insert(def.name, idx);
        Ok(idx)
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn context(&self) -> &ArbitrationContext {
        &self.ctx
    }

    pub fn cache(&self) -> &ArbitrationCache {
        &self.cache
    }

    pub fn sequencer(&self) -> &S {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut S {
        &mut self.sequencer
    }

    pub fn limit_index(&self, name: &str) -> Option<LimitIdx> {
        self.names.get(name).copied()
    }

    fn index_of(&self, name: &str) -> Result<LimitIdx> {
        self.limit_index(name)
            .ok_or_else(|| SupervisorError::UnknownLimit(name.to_string()))
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.ctx.set_arbitration_locked(locked);
    }

    pub fn set_caching(&mut self, enabled: bool) {
        self.ctx.set_caching_enabled(enabled);
    }

    pub fn invalidate_vf(&mut self) {
        self.ctx.invalidate_vf();
    }

    /// Set one limit's input. A `Disabled` input releases its slot.
    ///
    /// The input is checked against the catalog first; a rejected input
    /// leaves the limit as it was.
    pub fn set_input(&mut self, name: &str, input: ClientInput) -> Result<()> {
        let idx = self.index_of(name)?;
        validate_input(&input, &self.catalog)
            .and_then(|()| self.ctx.set_limit_input(idx, input))
            .map_err(|source| SupervisorError::Limit { limit: name.to_string(), source })
    }

    pub fn input(&self, name: &str) -> Result<ClientInput> {
        let idx = self.index_of(name)?;
        Ok(self.ctx.limit_input(idx)?)
    }

    /// Convert and apply a batch of host requests, in order.
    ///
    /// A rejected request leaves its limit untouched and does not stop the
    /// batch; later requests for the same limit override earlier ones.
    pub fn ingest<B: InputBuilder>(&mut self, builder: &B, requests: &[LimitRequest<'_>]) -> IngestReport {
        let mut report = IngestReport::default();
        for req in requests {
            let name = req.limit.as_ref();
            let res = builder
                .build(req, &self.catalog)
                .map_err(|source| SupervisorError::Limit { limit: name.to_string(), source })
                .and_then(|input| self.set_input(name, input));
            match res {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!(limit = %name, source = %req.source, error = %e, "limit request rejected");
                    report.rejected.push((name.to_string(), e));
                }
            }
        }
        report
    }

    /// Arbitrate through the cache and hand fresh outputs to the sequencer.
    pub fn arbitrate(&mut self) -> Result<ArbitrationOutput> {
        Ok(self.cache.get(&self.ctx, &self.catalog, &mut self.sequencer)?)
    }

    /// Arbitrate MIN and MAX with the limits in `exclude` skipped. Nothing
    /// is cached or applied.
    pub fn preview(&self, exclude: &LimitMask) -> Result<(ArbTuple, ArbTuple)> {
        let min = arbitrate(&self.ctx, &self.catalog, exclude, true)?;
        let max = arbitrate(&self.ctx, &self.catalog, exclude, false)?;
        Ok((min, max))
    }

    pub fn preview_excluding(&self, names: &[&str]) -> Result<(ArbTuple, ArbTuple)> {
        let mut exclude = LimitMask::new(MAX_LIMITS);
        for name in names {
            exclude.set(self.index_of(name)?);
        }
        self.preview(&exclude)
    }

    /// Indices of limits currently holding an active slot.
    pub fn active_mask(&self) -> LimitMask {
        let mut mask = LimitMask::new(MAX_LIMITS);
        for (idx, limit) in self.ctx.limits().iter().enumerate() {
            if limit.is_active() {
                mask.set(idx);
            }
        }
        mask
    }

    /// Versioned export of the last computed output, if any.
    pub fn export(&self, version: ArbOutputVersion) -> Result<Option<ArbitrationOutputExport>> {
        match self.cache.last() {
            Some(out) => Ok(Some(ArbitrationOutputExport::new(out, version)?)),
            None => Ok(None),
        }
    }

    /// Status of every limit, in priority order.
    pub fn limit_status(&self) -> Vec<LimitStatus> {
        let mut by_idx: Vec<(&str, LimitIdx)> = self.names.iter().map(|(n, &i)| (n.as_str(), i)).collect();
        by_idx.sort_by_key(|&(_, i)| i);

        by_idx
            .into_iter()
            .map(|(name, idx)| {
                let limit = &self.ctx.limits()[idx];
                LimitStatus {
                    name: name.to_string(),
                    index: idx,
                    flags: limit.flags,
                    policy_id: limit.policy_id,
                    active: limit.is_active(),
                    input: self.ctx.limit_input(idx).unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Export active inputs. Deterministic ordering: sorted by limit name.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot_filtered(|_, _| true)
    }

    /// Export active inputs accepted by `predicate`, sorted by limit name.
    pub fn snapshot_filtered<F>(&self, mut predicate: F) -> SupervisorSnapshot
    where
        F: FnMut(&str, &ClientInput) -> bool,
    {
        let mut inputs: Vec<(String, ClientInput)> = Vec::new();
        for (name, &idx) in &self.names {
            let Ok(input) = self.ctx.limit_input(idx) else {
                continue;
            };
            if !input.is_disabled() && predicate(name, &input) {
                inputs.push((name.clone(), input));
            }
        }
        inputs.sort_by(|a, b| a.0.cmp(&b.0));
        SupervisorSnapshot { inputs }
    }

    /// Replace every limit's input with the snapshot's; limits missing from
    /// the snapshot end up disabled.
    pub fn restore(&mut self, snap: SupervisorSnapshot) -> RestoreStats {
        self.import_inputs(snap.inputs, true)
    }

    /// Apply the snapshot on top of current inputs.
    pub fn restore_merge(&mut self, snap: SupervisorSnapshot) -> RestoreStats {
        self.import_inputs(snap.inputs, false)
    }

    /// Import `(name, input)` pairs, optionally disabling every limit first.
    pub fn import_inputs<I>(&mut self, iter: I, clear: bool) -> RestoreStats
    where
        I: IntoIterator<Item = (String, ClientInput)>,
    {
        if clear {
            for idx in 0..self.ctx.limits().len() {
                // disabling an existing limit cannot fail
                let _ = self.ctx.set_limit_input(idx, ClientInput::Disabled);
            }
        }

        let mut stats = RestoreStats::default();
        for (name, input) in iter {
            match self.set_input(&name, input) {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    warn!(limit = %name, error = %e, "snapshot entry rejected");
                    stats.rejected += 1;
                }
            }
        }
        debug!(applied = stats.applied, rejected = stats.rejected, "inputs imported");
        stats
    }
}
