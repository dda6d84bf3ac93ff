//! Limits and their normalization into bounds.

use serde::{Deserialize, Serialize};

use crate::catalog::{TopologyId, VfCatalog};
use crate::error::{PerfError, Result};
use crate::pool::ActiveHandle;
use crate::types::{
    ClientInput, ClkDomainIdx, ClkDomainMask, PstateRange, ValueRange, VoltRailIdx, VoltRailMask,
    MAX_CLK_DOMAINS, MAX_VOLT_RAILS,
};
use crate::vf::VfConverter;

/// Which sides of the running tuple a limit bounds, and how.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitFlags {
    pub min: bool,
    pub max: bool,
    /// Pin related domains to exact propagated values instead of narrowing.
    pub strict_propagation: bool,
}

impl LimitFlags {
    pub const FLOOR: Self = Self { min: true, max: false, strict_propagation: false };
    pub const CEILING: Self = Self { min: false, max: true, strict_propagation: false };
    pub const PIN: Self = Self { min: true, max: true, strict_propagation: false };
    pub const STRICT_PIN: Self = Self { min: true, max: true, strict_propagation: true };
}

/// Where a limit's frequency is propagated to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationRegime {
    /// Use the context's configured topology.
    #[default]
    Default,
    Topology(TopologyId),
    /// Affect only the domains named by the input.
    InputOnly,
}

#[derive(Debug)]
pub struct Limit {
    pub id: u32,
    pub flags: LimitFlags,
    pub propagation: PropagationRegime,
    pub policy_id: Option<u32>,
    pub(crate) active: Option<ActiveHandle>,
}

impl Limit {
    pub fn new(id: u32, flags: LimitFlags, propagation: PropagationRegime, policy_id: Option<u32>) -> Self {
        Self {
            id,
            flags,
            propagation,
            policy_id,
            active: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

/// Per-limit knobs resolved from the context before normalizing.
#[derive(Clone, Copy, Debug)]
pub struct NormalizeParams {
    /// Domains pinned when the limit is strict; empty when it is not.
    pub strict_domains: ClkDomainMask,
    pub topology: Option<TopologyId>,
    pub use_default_vf_point: bool,
}

/// An active limit's input expressed as ranges over the tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitBound {
    pub pstate: PstateRange,
    pub domain_mask: ClkDomainMask,
    /// Domains set to an exact value regardless of limit direction.
    pub pinned: ClkDomainMask,
    pub freq_khz: [ValueRange; MAX_CLK_DOMAINS],
    pub rail_mask: VoltRailMask,
    pub voltage_uv: [ValueRange; MAX_VOLT_RAILS],
}

impl LimitBound {
    fn empty(pstate: PstateRange) -> Self {
        Self {
            pstate,
            domain_mask: ClkDomainMask::new(MAX_CLK_DOMAINS),
            pinned: ClkDomainMask::new(MAX_CLK_DOMAINS),
            freq_khz: [ValueRange::default(); MAX_CLK_DOMAINS],
            rail_mask: VoltRailMask::new(MAX_VOLT_RAILS),
            voltage_uv: [ValueRange::default(); MAX_VOLT_RAILS],
        }
    }

    /// Every catalog domain bounded by the envelope of `pstate`.
    fn pstate_envelope<C: VfCatalog + ?Sized>(conv: &VfConverter<'_, C>, pstate: PstateRange) -> Result<Self> {
        let mut bound = Self::empty(pstate);
        for d in conv.catalog().clk_domains().iter() {
            bound.freq_khz[d] = conv.pstate_range_to_frequency_range(d, pstate)?;
            bound.domain_mask.set(d);
        }
        Ok(bound)
    }

    fn bound_rail(&mut self, rail: VoltRailIdx, range: ValueRange) {
        if self.rail_mask.get(rail) {
            let cur = &mut self.voltage_uv[rail];
            cur.min = cur.min.max(range.min);
            cur.max = cur.max.min(range.max).max(cur.min);
        } else {
            self.voltage_uv[rail] = range;
            self.rail_mask.set(rail);
        }
    }

    /// Apply explicit domain frequencies, their strict propagation and the
    /// voltage floors they imply.
    fn apply_frequencies<C: VfCatalog + ?Sized>(
        &mut self,
        conv: &VfConverter<'_, C>,
        input_mask: &ClkDomainMask,
        values: &[u32; MAX_CLK_DOMAINS],
        params: &NormalizeParams,
    ) -> Result<()> {
        let catalog = conv.catalog();

        for d in input_mask.iter() {
            self.freq_khz[d] = ValueRange::exact(values[d]);
            self.domain_mask.set(d);
        }

        if !params.strict_domains.is_zero() {
            let mut targets = ClkDomainMask::new(MAX_CLK_DOMAINS);
            match params.topology {
                Some(_) => targets.and(&params.strict_domains, &catalog.clk_domains())?,
                None => targets.and(&params.strict_domains, input_mask)?,
            }
            let exact = match params.topology {
                Some(topology) => conv.propagate(self.pstate, input_mask, values, &targets, topology)?,
                None => {
                    let mut out = [0u32; MAX_CLK_DOMAINS];
                    for d in targets.iter() {
                        out[d] = conv.quantize_frequency(d, values[d], Some(self.pstate), true)?;
                    }
                    out
                }
            };
            for d in targets.iter() {
                self.freq_khz[d] = ValueRange::exact(exact[d]);
                self.domain_mask.set(d);
                self.pinned.set(d);
            }
        }

        for d in input_mask.iter() {
            for rail in catalog.domain_rails(d)?.iter() {
                let floor = conv.frequency_to_voltage(d, values[d], rail, params.use_default_vf_point)?;
                let rail_max = catalog.rail_range(rail)?.max;
                self.bound_rail(rail, ValueRange::new(floor, rail_max.max(floor)));
            }
        }
        Ok(())
    }

    /// Normalize one client input. `Disabled` has no bound.
    pub fn from_input<C: VfCatalog + ?Sized>(
        conv: &VfConverter<'_, C>,
        input: &ClientInput,
        params: &NormalizeParams,
    ) -> Result<Option<Self>> {
        let catalog = conv.catalog();
        let domains = catalog.clk_domains();

        let bound = match *input {
            ClientInput::Disabled => return Ok(None),

            ClientInput::PstateIndex(p) => Self::pstate_envelope(conv, PstateRange::single(p))?,

            ClientInput::VirtualPstate(id) => {
                let vp = catalog.virtual_pstate(id)?;
                let mut bound = Self::pstate_envelope(conv, PstateRange::single(vp.pstate))?;
                let mut input_mask = ClkDomainMask::new(MAX_CLK_DOMAINS);
                let mut values = [0u32; MAX_CLK_DOMAINS];
                for f in &vp.freqs {
                    input_mask.set(f.domain);
                    values[f.domain] = f.freq_khz;
                }
                bound.apply_frequencies(conv, &input_mask, &values, params)?;
                bound
            }

            ClientInput::FrequencyKHz { domain, value } => {
                check_domain(&domains, domain)?;
                let pstate = conv.frequency_to_pstate_range(domain, value)?;
                let mut bound = Self::pstate_envelope(conv, pstate)?;
                let mut input_mask = ClkDomainMask::new(MAX_CLK_DOMAINS);
                input_mask.set(domain);
                let mut values = [0u32; MAX_CLK_DOMAINS];
                values[domain] = value;
                bound.apply_frequencies(conv, &input_mask, &values, params)?;
                bound
            }

            ClientInput::VoltageuV { rail, value } => {
                if rail >= MAX_VOLT_RAILS || !catalog.volt_rails().get(rail) {
                    return Err(PerfError::InvalidArgument("voltage limit on unknown rail"));
                }
                if !catalog.rail_range(rail)?.contains(value) {
                    return Err(PerfError::OutOfRange("voltage outside rail range"));
                }
                let full = conv.full_pstate_range()?;
                let mut bound = Self::empty(full);
                bound.bound_rail(rail, ValueRange::exact(value));

                for dep in catalog.rail_dependents(rail)? {
                    let dep_range = catalog.rail_range(dep.dependent)?;
                    let target = (i64::from(value) + i64::from(dep.offset_uv))
                        .clamp(i64::from(dep_range.min), i64::from(dep_range.max)) as u32;
                    bound.bound_rail(dep.dependent, ValueRange::exact(target));
                }

                for d in domains.iter() {
                    if catalog.primary_rail(d)? != rail {
                        continue;
                    }
                    let f = conv.voltage_to_frequency(
                        rail,
                        value,
                        d,
                        Some(full),
                        params.use_default_vf_point,
                        true,
                    )?;
                    bound.freq_khz[d] = ValueRange::exact(f);
                    bound.domain_mask.set(d);
                }
                bound
            }
        };
        Ok(Some(bound))
    }
}

fn check_domain(domains: &ClkDomainMask, domain: ClkDomainIdx) -> Result<()> {
    if domain >= MAX_CLK_DOMAINS || !domains.get(domain) {
        return Err(PerfError::InvalidArgument("frequency limit on unknown clock domain"));
    }
    Ok(())
}
