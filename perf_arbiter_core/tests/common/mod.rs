//! Shared catalog fixture.
//!
//! Three clock domains on two rails, three pstates with gaps between the
//! gpc ranges, one virtual pstate and one propagation topology.
//!
//! gpc (0)  rail 0: 100 150 200 300 400 450 500 MHz
//! xbar (1) rail 0:  50 100 150 200 250 MHz
//! sys (2)  rail 1: 100 200 300 MHz

#![allow(dead_code)]

use std::cell::Cell;

use perf_arbiter_core::*;

pub const GPC: ClkDomainIdx = 0;
pub const XBAR: ClkDomainIdx = 1;
pub const SYS: ClkDomainIdx = 2;
pub const LOGIC: VoltRailIdx = 0;
pub const SRAM: VoltRailIdx = 1;

pub const CATALOG_JSON: &str = r#"{
  "rails": [
    { "idx": 0, "range": { "min": 600000, "max": 1100000 },
      "dependents": [ { "dependent": 1, "offset_uv": 50000 } ] },
    { "idx": 1, "range": { "min": 650000, "max": 1150000 } }
  ],
  "domains": [
    { "idx": 0, "primary_rail": 0, "curves": [
      { "rail": 0,
        "default_point": { "freq_khz": 300000, "voltage_uv": 800000 },
        "points": [
          { "freq_khz": 100000, "voltage_uv": 600000 },
          { "freq_khz": 150000, "voltage_uv": 650000 },
          { "freq_khz": 200000, "voltage_uv": 700000 },
          { "freq_khz": 300000, "voltage_uv": 800000 },
          { "freq_khz": 400000, "voltage_uv": 900000 },
          { "freq_khz": 450000, "voltage_uv": 950000 },
          { "freq_khz": 500000, "voltage_uv": 1000000 }
        ] } ] },
    { "idx": 1, "primary_rail": 0, "curves": [
      { "rail": 0, "points": [
          { "freq_khz": 50000, "voltage_uv": 600000 },
          { "freq_khz": 100000, "voltage_uv": 700000 },
          { "freq_khz": 150000, "voltage_uv": 800000 },
          { "freq_khz": 200000, "voltage_uv": 900000 },
          { "freq_khz": 250000, "voltage_uv": 1000000 }
        ] } ] },
    { "idx": 2, "primary_rail": 1, "curves": [
      { "rail": 1, "points": [
          { "freq_khz": 100000, "voltage_uv": 650000 },
          { "freq_khz": 200000, "voltage_uv": 750000 },
          { "freq_khz": 300000, "voltage_uv": 850000 }
        ] } ] }
  ],
  "pstates": [
    { "freqs": [
      { "domain": 0, "range": { "min": 100000, "max": 200000 } },
      { "domain": 1, "range": { "min": 50000, "max": 100000 } },
      { "domain": 2, "range": { "min": 100000, "max": 100000 } } ] },
    { "freqs": [
      { "domain": 0, "range": { "min": 300000, "max": 400000 } },
      { "domain": 1, "range": { "min": 150000, "max": 200000 } },
      { "domain": 2, "range": { "min": 200000, "max": 200000 } } ] },
    { "freqs": [
      { "domain": 0, "range": { "min": 500000, "max": 500000 } },
      { "domain": 1, "range": { "min": 250000, "max": 250000 } },
      { "domain": 2, "range": { "min": 300000, "max": 300000 } } ] }
  ],
  "virtual_pstates": [
    { "id": 7, "pstate": 1, "freqs": [ { "domain": 0, "freq_khz": 400000 } ] }
  ],
  "topologies": [
    { "id": 0, "relationships": [ { "src": 0, "dst": 1 }, { "src": 0, "dst": 2 } ] }
  ]
}"#;

pub fn catalog_desc() -> CatalogDesc {
    serde_json::from_str(CATALOG_JSON).expect("fixture catalog parses")
}

pub fn catalog() -> StaticCatalog {
    StaticCatalog::new(catalog_desc()).expect("fixture catalog validates")
}

pub fn cfg_with_topology() -> ArbiterCfg {
    ArbiterCfg {
        propagation_topology: Some(0),
        ..ArbiterCfg::default()
    }
}

/// Records every output it is handed.
#[derive(Default)]
pub struct RecordingSequencer {
    pub applied: Vec<(ArbitrationOutput, ApplyFlags)>,
}

impl ChangeSequencer for RecordingSequencer {
    fn enqueue(&mut self, output: &ArbitrationOutput, flags: ApplyFlags) -> Result<()> {
        self.applied.push((*output, flags));
        Ok(())
    }
}

/// Catalog wrapper that counts VF curve lookups.
pub struct CountingCatalog<C> {
    pub inner: C,
    pub curve_lookups: Cell<usize>,
}

impl<C> CountingCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, curve_lookups: Cell::new(0) }
    }
}

impl<C: VfCatalog> VfCatalog for CountingCatalog<C> {
    fn clk_domains(&self) -> ClkDomainMask {
        self.inner.clk_domains()
    }
    fn volt_rails(&self) -> VoltRailMask {
        self.inner.volt_rails()
    }
    fn pstate_count(&self) -> u32 {
        self.inner.pstate_count()
    }
    fn pstate_freq_range(&self, pstate: PstateIdx, domain: ClkDomainIdx) -> Result<ValueRange> {
        self.inner.pstate_freq_range(pstate, domain)
    }
    fn primary_rail(&self, domain: ClkDomainIdx) -> Result<VoltRailIdx> {
        self.inner.primary_rail(domain)
    }
    fn domain_rails(&self, domain: ClkDomainIdx) -> Result<VoltRailMask> {
        self.inner.domain_rails(domain)
    }
    fn vf_curve(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Result<&[VfPoint]> {
        self.curve_lookups.set(self.curve_lookups.get() + 1);
        self.inner.vf_curve(domain, rail)
    }
    fn default_vf_point(&self, domain: ClkDomainIdx, rail: VoltRailIdx) -> Option<VfPoint> {
        self.inner.default_vf_point(domain, rail)
    }
    fn rail_range(&self, rail: VoltRailIdx) -> Result<ValueRange> {
        self.inner.rail_range(rail)
    }
    fn rail_dependents(&self, rail: VoltRailIdx) -> Result<&[RailDependency]> {
        self.inner.rail_dependents(rail)
    }
    fn prop_relationships(&self, topology: TopologyId) -> Result<&[PropRelationship]> {
        self.inner.prop_relationships(topology)
    }
    fn virtual_pstate(&self, id: u32) -> Result<&VirtualPstate> {
        self.inner.virtual_pstate(id)
    }
}
