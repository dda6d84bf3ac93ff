//! Read-only clock-domain / volt-rail / pstate catalog.
//!
//! The arbiter only ever asks questions through [`VfCatalog`]. A firmware
//! build would back it with the object-group registry; [`StaticCatalog`] is
//! the in-memory table used by the supervisor, the FFI layer and tests.

use serde::{Deserialize, Serialize};

use crate::error::{PerfError, Result};
use crate::types::{
    ClkDomainIdx, ClkDomainMask, PstateIdx, ValueRange, VfPoint, VoltRailIdx, VoltRailMask,
    MAX_CLK_DOMAINS, MAX_VOLT_RAILS,
};

pub type TopologyId = u32;

/// `dependent` must follow its parent rail at `parent + offset_uv`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailDependency {
    pub dependent: VoltRailIdx,
    pub offset_uv: i32,
}

/// `dst` frequency is derived from `src` through their shared rail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropRelationship {
    pub src: ClkDomainIdx,
    pub dst: ClkDomainIdx,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFreq {
    pub domain: ClkDomainIdx,
    pub freq_khz: u32,
}

/// Named operating point: a pstate plus explicit domain frequencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPstate {
    pub id: u32,
    pub pstate: PstateIdx,
    #[serde(default)]
    pub freqs: Vec<DomainFreq>,
}

pub trait VfCatalog {
    fn clk_domains(&self) -> ClkDomainMask;
    fn volt_rails(&self) -> VoltRailMask;
    fn pstate_count(&self) -> u32;

    /// Frequency envelope of `domain` while in `pstate`.
    fn pstate_freq_range(&self, pstate: PstateIdx, domain: ClkDomainIdx) -> Result<ValueRange>;

    fn primary_rail(&self, domain: ClkDomainIdx) -> Result<VoltRailIdx>;

    /// Rails for which `domain` has a VF curve.
    fn domain_rails(&self, domain: ClkDomainIdx) -> Result<VoltRailMask>;

    /// Curve points sorted by ascending frequency and voltage.
    fn vf_curve(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Result<&[VfPoint]>;

    fn default_vf_point(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Option<VfPoint>;

    fn rail_range(&self, rail: VoltRailIdx) -> Result<ValueRange>;

    fn rail_dependents(&self, rail: VoltRailIdx) -> Result<&[RailDependency]>;

    fn prop_relationships(&self, topology: TopologyId) -> Result<&[PropRelationship]>;

    fn virtual_pstate(&self, id: u32) -> Result<&VirtualPstate>;
}

impl<T: VfCatalog + ?Sized> VfCatalog for &T {
    fn clk_domains(&self) -> ClkDomainMask {
        (**self).clk_domains()
    }
    fn volt_rails(&self) -> VoltRailMask {
        (**self).volt_rails()
    }
    fn pstate_count(&self) -> u32 {
        (**self).pstate_count()
    }
    fn pstate_freq_range(&self, pstate: PstateIdx, domain: ClkDomainIdx) -> Result<ValueRange> {
        (**self).pstate_freq_range(pstate, domain)
    }
    fn primary_rail(&self, domain: ClkDomainIdx) -> Result<VoltRailIdx> {
        (**self).primary_rail(domain)
    }
    fn domain_rails(&self, domain: ClkDomainIdx) -> Result<VoltRailMask> {
        (**self).domain_rails(domain)
    }
    fn vf_curve(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Result<&[VfPoint]> {
        (**self).vf_curve(domain, rail)
    }
    fn default_vf_point(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Option<VfPoint> {
        (**self).default_vf_point(domain, rail)
    }
    fn rail_range(&self, rail: VoltRailIdx) -> Result<ValueRange> {
        (**self).rail_range(rail)
    }
    fn rail_dependents(&self, rail: VoltRailIdx) -> Result<&[RailDependency]> {
        (**self).rail_dependents(rail)
    }
    fn prop_relationships(&self, topology: TopologyId) -> Result<&[PropRelationship]> {
        (**self).prop_relationships(topology)
    }
    fn virtual_pstate(&self, id: u32) -> Result<&VirtualPstate> {
        (**self).virtual_pstate(id)
    }
}

// ---------------------------------------------------------------------
// In-memory catalog
// ---------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfCurveDesc {
    pub rail: VoltRailIdx,
    pub points: Vec<VfPoint>,
    #[serde(default)]
    pub default_point: Option<VfPoint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClkDomainDesc {
    pub idx: ClkDomainIdx,
    pub primary_rail: VoltRailIdx,
    pub curves: Vec<VfCurveDesc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoltRailDesc {
    pub idx: VoltRailIdx,
    pub range: ValueRange,
    #[serde(default)]
    pub dependents: Vec<RailDependency>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRange {
    pub domain: ClkDomainIdx,
    pub range: ValueRange,
}

/// Pstates are listed in ascending index order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PstateDesc {
    pub freqs: Vec<DomainRange>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropTopology {
    pub id: TopologyId,
    pub relationships: Vec<PropRelationship>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDesc {
    pub domains: Vec<ClkDomainDesc>,
    pub rails: Vec<VoltRailDesc>,
    pub pstates: Vec<PstateDesc>,
    #[serde(default)]
    pub virtual_pstates: Vec<VirtualPstate>,
    #[serde(default)]
    pub topologies: Vec<PropTopology>,
}

/// Validated, index-addressable catalog built from a [`CatalogDesc`].
#[derive(Clone, Debug)]
pub struct StaticCatalog {
    desc: CatalogDesc,
    domain_mask: ClkDomainMask,
    rail_mask: VoltRailMask,
}

impl StaticCatalog {
    pub fn new(desc: CatalogDesc) -> Result<Self> {
        let mut domain_mask = ClkDomainMask::new(MAX_CLK_DOMAINS);
        let mut rail_mask = VoltRailMask::new(MAX_VOLT_RAILS);

        for rail in &desc.rails {
            if rail.idx >= MAX_VOLT_RAILS || rail_mask.get(rail.idx) {
                return Err(PerfError::InvalidIndex { kind: "volt rail", index: rail.idx });
            }
            if rail.range.is_incoherent() {
                return Err(PerfError::InvalidArgument("volt rail range min above max"));
            }
            rail_mask.set(rail.idx);
        }
        for rail in &desc.rails {
            for dep in &rail.dependents {
                if dep.dependent >= MAX_VOLT_RAILS || !rail_mask.get(dep.dependent) {
                    return Err(PerfError::InvalidIndex { kind: "volt rail", index: dep.dependent });
                }
            }
        }

        for dom in &desc.domains {
            if dom.idx >= MAX_CLK_DOMAINS || domain_mask.get(dom.idx) {
                return Err(PerfError::InvalidIndex { kind: "clock domain", index: dom.idx });
            }
            domain_mask.set(dom.idx);
            for curve in &dom.curves {
                if curve.rail >= MAX_VOLT_RAILS || !rail_mask.get(curve.rail) {
                    return Err(PerfError::InvalidIndex { kind: "volt rail", index: curve.rail });
                }
                if curve.points.is_empty() {
                    return Err(PerfError::InvalidArgument("empty vf curve"));
                }
                let sorted = curve.points.windows(2).all(|w| {
                    w[0].freq_khz < w[1].freq_khz && w[0].voltage_uv <= w[1].voltage_uv
                });
                if !sorted {
                    return Err(PerfError::InvalidArgument("vf curve not monotonic"));
                }
            }
            if !dom.curves.iter().any(|c| c.rail == dom.primary_rail) {
                return Err(PerfError::InvalidState("primary rail has no vf curve"));
            }
        }

        if desc.pstates.is_empty() {
            return Err(PerfError::InvalidArgument("catalog has no pstates"));
        }
        for ps in &desc.pstates {
            for d in domain_mask.iter() {
                match ps.freqs.iter().find(|r| r.domain == d) {
                    Some(r) if !r.range.is_incoherent() => {}
                    Some(_) => return Err(PerfError::InvalidArgument("pstate range min above max")),
                    None => return Err(PerfError::InvalidIndex { kind: "clock domain", index: d }),
                }
            }
        }

        let catalog = Self { desc, domain_mask, rail_mask };

        for d in domain_mask.iter() {
            for p in 1..catalog.pstate_count() {
                let lo = catalog.pstate_freq_range(p - 1, d)?;
                let hi = catalog.pstate_freq_range(p, d)?;
                if hi.min < lo.min || hi.max < lo.max {
                    return Err(PerfError::InvalidArgument("pstate ranges not monotonic"));
                }
            }
        }
        for vp in &catalog.desc.virtual_pstates {
            if vp.pstate >= catalog.pstate_count() {
                return Err(PerfError::InvalidIndex { kind: "pstate", index: vp.pstate as usize });
            }
            for f in &vp.freqs {
                if f.domain >= MAX_CLK_DOMAINS || !domain_mask.get(f.domain) {
                    return Err(PerfError::InvalidIndex { kind: "clock domain", index: f.domain });
                }
            }
        }
        for topo in &catalog.desc.topologies {
            for rel in &topo.relationships {
                for d in [rel.src, rel.dst] {
                    if d >= MAX_CLK_DOMAINS || !domain_mask.get(d) {
                        return Err(PerfError::InvalidIndex { kind: "clock domain", index: d });
                    }
                }
            }
        }

        Ok(catalog)
    }

    pub fn desc(&self) -> &CatalogDesc {
        &self.desc
    }

    fn domain(&self, domain: ClkDomainIdx) -> Result<&ClkDomainDesc> {
        self.desc
            .domains
            .iter()
            .find(|d| d.idx == domain)
            .ok_or(PerfError::InvalidIndex { kind: "clock domain", index: domain })
    }

    fn rail(&self, rail: VoltRailIdx) -> Result<&VoltRailDesc> {
        self.desc
            .rails
            .iter()
            .find(|r| r.idx == rail)
            .ok_or(PerfError::InvalidIndex { kind: "volt rail", index: rail })
    }

    fn curve(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Result<&VfCurveDesc> {
        self.domain(domain)?
            .curves
            .iter()
            .find(|c| c.rail == rail)
            .ok_or(PerfError::InvalidState("clock domain has no vf curve on rail"))
    }
}

impl VfCatalog for StaticCatalog {
    fn clk_domains(&self) -> ClkDomainMask {
        self.domain_mask
    }

    fn volt_rails(&self) -> VoltRailMask {
        self.rail_mask
    }

    fn pstate_count(&self) -> u32 {
        self.desc.pstates.len() as u32
    }

    fn pstate_freq_range(&self, pstate: PstateIdx, domain: ClkDomainIdx) -> Result<ValueRange> {
        let ps = self
            .desc
            .pstates
            .get(pstate as usize)
            .ok_or(PerfError::InvalidIndex { kind: "pstate", index: pstate as usize })?;
        ps.freqs
            .iter()
            .find(|r| r.domain == domain)
            .map(|r| r.range)
            .ok_or(PerfError::InvalidIndex { kind: "clock domain", index: domain })
    }

    fn primary_rail(&self, domain: ClkDomainIdx) -> Result<VoltRailIdx> {
        Ok(self.domain(domain)?.primary_rail)
    }

    fn domain_rails(&self, domain: ClkDomainIdx) -> Result<VoltRailMask> {
        let mut mask = VoltRailMask::new(MAX_VOLT_RAILS);
        for c in &self.domain(domain)?.curves {
            mask.set(c.rail);
        }
        Ok(mask)
    }

    fn vf_curve(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Result<&[VfPoint]> {
        Ok(&self.curve(domain, rail)?.points)
    }

    fn default_vf_point(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Option<VfPoint> {
        self.curve(domain, rail).ok()?.default_point
    }

    fn rail_range(&self, rail: VoltRailIdx) -> Result<ValueRange> {
        Ok(self.rail(rail)?.range)
    }

    fn rail_dependents(&self, rail: VoltRailIdx) -> Result<&[RailDependency]> {
        Ok(&self.rail(rail)?.dependents)
    }

    fn prop_relationships(&self, topology: TopologyId) -> Result<&[PropRelationship]> {
        self.desc
            .topologies
            .iter()
            .find(|t| t.id == topology)
            .map(|t| t.relationships.as_slice())
            .ok_or(PerfError::InvalidIndex { kind: "propagation topology", index: topology as usize })
    }

    fn virtual_pstate(&self, id: u32) -> Result<&VirtualPstate> {
        self.desc
            .virtual_pstates
            .iter()
            .find(|v| v.id == id)
            .ok_or(PerfError::InvalidIndex { kind: "virtual pstate", index: id as usize })
    }
}
