//! Shared data model: indices, ranges, bound tuples, client inputs.

use serde::{Deserialize, Serialize};

use crate::bitset::{BitSet255, BitSet32};

pub const MAX_CLK_DOMAINS: usize = 32;
pub const MAX_VOLT_RAILS: usize = 32;
pub const MAX_LIMITS: usize = 255;

pub type ClkDomainIdx = usize;
pub type VoltRailIdx = usize;
pub type PstateIdx = u32;
pub type LimitIdx = usize;

pub type ClkDomainMask = BitSet32;
pub type VoltRailMask = BitSet32;
pub type LimitMask = BitSet255;

/// Inclusive `[min, max]` interval of kHz or uV.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: u32,
    pub max: u32,
}

impl ValueRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub const fn exact(value: u32) -> Self {
        Self { min: value, max: value }
    }

    #[inline]
    pub fn contains(&self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }

    /// `min > max`.
    #[inline]
    pub fn is_incoherent(&self) -> bool {
        self.min > self.max
    }
}

/// Inclusive range of pstate indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PstateRange {
    pub min: PstateIdx,
    pub max: PstateIdx,
}

impl PstateRange {
    pub const fn new(min: PstateIdx, max: PstateIdx) -> Self {
        Self { min, max }
    }

    pub const fn single(idx: PstateIdx) -> Self {
        Self { min: idx, max: idx }
    }

    pub fn iter(&self) -> impl Iterator<Item = PstateIdx> {
        self.min..=self.max
    }
}

/// One VF curve point: the minimum voltage that supports `freq_khz`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfPoint {
    pub freq_khz: u32,
    pub voltage_uv: u32,
}

/// One side (MIN or MAX) of an arbitration result.
///
/// `freq_khz[d]` is meaningful only where the owning output's domain mask
/// has `d` set; likewise `voltage_uv` against the rail mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundTuple {
    pub pstate_idx: PstateIdx,
    pub freq_khz: [u32; MAX_CLK_DOMAINS],
    pub voltage_uv: [u32; MAX_VOLT_RAILS],
}

impl Default for BoundTuple {
    fn default() -> Self {
        Self {
            pstate_idx: 0,
            freq_khz: [0; MAX_CLK_DOMAINS],
            voltage_uv: [0; MAX_VOLT_RAILS],
        }
    }
}

/// Loosest MIN/MAX pair an arbitration starts from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleBounds {
    pub min: BoundTuple,
    pub max: BoundTuple,
}

/// Which limit last moved a bound. `None` means the default held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundSources {
    pub pstate: Option<LimitIdx>,
    pub freq: [Option<LimitIdx>; MAX_CLK_DOMAINS],
    pub voltage: [Option<LimitIdx>; MAX_VOLT_RAILS],
}

impl Default for BoundSources {
    fn default() -> Self {
        Self {
            pstate: None,
            freq: [None; MAX_CLK_DOMAINS],
            voltage: [None; MAX_VOLT_RAILS],
        }
    }
}

/// Result of one arbitration direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbTuple {
    pub tuple: BoundTuple,
    pub sources: BoundSources,
    pub domain_mask: ClkDomainMask,
    pub rail_mask: VoltRailMask,
}

/// Combined MIN/MAX output handed to the change sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbitrationOutput {
    pub min: BoundTuple,
    pub max: BoundTuple,
    pub min_sources: BoundSources,
    pub max_sources: BoundSources,
    pub domain_mask: ClkDomainMask,
    pub rail_mask: VoltRailMask,
    pub sequence_stamp: u64,
}

/// Client-supplied limit input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientInput {
    #[default]
    Disabled,
    PstateIndex(PstateIdx),
    FrequencyKHz { domain: ClkDomainIdx, value: u32 },
    VirtualPstate(u32),
    VoltageuV { rail: VoltRailIdx, value: u32 },
}

impl ClientInput {
    #[inline]
    pub fn is_disabled(&self) -> bool {
        matches!(self, ClientInput::Disabled)
    }
}
