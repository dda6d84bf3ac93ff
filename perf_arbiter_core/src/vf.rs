//! Frequency / voltage / pstate conversion and quantization.
//!
//! `VfConverter` carries no state of its own; every answer is derived from
//! the catalog it borrows.

use tracing::trace;

use crate::catalog::{TopologyId, VfCatalog};
use crate::error::{PerfError, Result};
use crate::types::{
    ClkDomainIdx, ClkDomainMask, PstateRange, ValueRange, VfPoint, VoltRailIdx, MAX_CLK_DOMAINS,
};

pub struct VfConverter<'c, C: VfCatalog + ?Sized> {
    catalog: &'c C,
}

/// Snap `freq_khz` to a curve point, rounding down when `floor`.
///
/// Values past either end of the curve land on the nearest end point.
fn snap_to_curve(points: &[VfPoint], freq_khz: u32, floor: bool) -> Result<u32> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(PerfError::InvalidState("empty vf curve")),
    };
    let snapped = if floor {
        points
            .iter()
            .rev()
            .find(|p| p.freq_khz <= freq_khz)
            .unwrap_or(first)
    } else {
        points
            .iter()
            .find(|p| p.freq_khz >= freq_khz)
            .unwrap_or(last)
    };
    Ok(snapped.freq_khz)
}

impl<'c, C: VfCatalog + ?Sized> VfConverter<'c, C> {
    pub fn new(catalog: &'c C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'c C {
        self.catalog
    }

    /// The whole pstate table.
    pub fn full_pstate_range(&self) -> Result<PstateRange> {
        match self.catalog.pstate_count() {
            0 => Err(PerfError::InvalidState("catalog has no pstates")),
            n => Ok(PstateRange::new(0, n - 1)),
        }
    }

    fn check_pstate_range(&self, range: PstateRange) -> Result<PstateRange> {
        if range.min > range.max {
            return Err(PerfError::InvalidArgument("pstate range min above max"));
        }
        if range.max >= self.catalog.pstate_count() {
            return Err(PerfError::InvalidArgument("pstate range past pstate table"));
        }
        Ok(range)
    }

    /// Lowest voltage on `rail` that supports `freq_khz` on `domain`.
    pub fn frequency_to_voltage(
        &self,
        domain: ClkDomainIdx,
        freq_khz: u32,
        rail: VoltRailIdx,
        use_default_point: bool,
    ) -> Result<u32> {
        let curve = self.catalog.vf_curve(domain, rail)?;
        if let Some(p) = curve.iter().find(|p| p.freq_khz >= freq_khz) {
            return Ok(p.voltage_uv);
        }
        if use_default_point {
            if let Some(p) = self.catalog.default_vf_point(domain, rail) {
                return Ok(p.voltage_uv);
            }
        }
        Err(PerfError::OutOfRange("frequency above vf curve"))
    }

    /// Highest frequency on `domain` supported by `voltage_uv` on `rail`.
    ///
    /// When the curve has no point at or below the voltage, the curve's
    /// default point is used if requested and present; otherwise the minimum
    /// frequency of the lowest pstate in `pstate_range`.
    pub fn voltage_to_frequency(
        &self,
        rail: VoltRailIdx,
        voltage_uv: u32,
        domain: ClkDomainIdx,
        pstate_range: Option<PstateRange>,
        use_default_point: bool,
        quantize: bool,
    ) -> Result<u32> {
        let curve = self.catalog.vf_curve(domain, rail)?;
        let found = curve
            .iter()
            .rev()
            .find(|p| p.voltage_uv <= voltage_uv)
            .map(|p| p.freq_khz);
        let default = if use_default_point {
            self.catalog.default_vf_point(domain, rail).map(|p| p.freq_khz)
        } else {
            None
        };
        let freq_khz = match found.or(default) {
            Some(f) => f,
            None => {
                let range = pstate_range
                    .ok_or(PerfError::OutOfRange("no vf point at voltage and no pstate fallback"))?;
                let range = self.check_pstate_range(range)?;
                self.catalog.pstate_freq_range(range.min, domain)?.min
            }
        };
        if quantize {
            self.quantize_frequency(domain, freq_khz, pstate_range, true)
        } else {
            Ok(freq_khz)
        }
    }

    /// Snap to a curve step, then bound into some pstate of `pstate_range`.
    ///
    /// Only curve-supported values come back unchanged; a value between two
    /// curve steps moves even when it already lies inside a pstate range.
    ///
    /// Pstates are scanned in ascending order and their ranges are assumed
    /// monotonic. A value inside a pstate range is accepted as is. A value
    /// below a pstate's range settles on that pstate's minimum (ceiling) or
    /// on the best maximum seen so far (floor). A value above keeps the
    /// pstate's maximum as the candidate and scanning continues.
    pub fn quantize_frequency(
        &self,
        domain: ClkDomainIdx,
        freq_khz: u32,
        pstate_range: Option<PstateRange>,
        floor: bool,
    ) -> Result<u32> {
        let range = match pstate_range {
            Some(r) => self.check_pstate_range(r)?,
            None => self.full_pstate_range()?,
        };
        let rail = self.catalog.primary_rail(domain)?;
        let snapped = snap_to_curve(self.catalog.vf_curve(domain, rail)?, freq_khz, floor)?;

        let mut best: Option<u32> = None;
        for p in range.iter() {
            let r = self.catalog.pstate_freq_range(p, domain)?;
            if r.contains(snapped) {
                return Ok(snapped);
            }
            if snapped < r.min {
                return Ok(match (floor, best) {
                    (true, Some(max)) => max,
                    _ => r.min,
                });
            }
            best = Some(r.max);
        }
        best.ok_or(PerfError::InvalidArgument("empty pstate range"))
    }

    /// Union of the per-pstate frequency ranges of `domain`.
    pub fn pstate_range_to_frequency_range(
        &self,
        domain: ClkDomainIdx,
        pstate_range: PstateRange,
    ) -> Result<ValueRange> {
        let range = self.check_pstate_range(pstate_range)?;
        let mut out = ValueRange::new(u32::MAX, 0);
        for p in range.iter() {
            let r = self.catalog.pstate_freq_range(p, domain)?;
            out.min = out.min.min(r.min);
            out.max = out.max.max(r.max);
        }
        Ok(out)
    }

    /// Loosest pstate index range whose ranges contain `freq_khz`.
    pub fn frequency_to_pstate_range(&self, domain: ClkDomainIdx, freq_khz: u32) -> Result<PstateRange> {
        let mut out = PstateRange::new(u32::MAX, 0);
        for p in self.full_pstate_range()?.iter() {
            if self.catalog.pstate_freq_range(p, domain)?.contains(freq_khz) {
                out.min = out.min.min(p);
                out.max = out.max.max(p);
            }
        }
        if out.min > out.max {
            return Err(PerfError::InvalidArgument("no pstate contains frequency"));
        }
        Ok(out)
    }

    /// Derive frequencies for `output_mask` from the frequencies of
    /// `input_mask` along the relationships of `topology`.
    ///
    /// Relationships are followed in catalog order, so a derived domain can
    /// itself feed later relationships. A domain with no reachable source, or
    /// whose curve does not intersect the source voltage, falls back to the
    /// minimum frequency of `pstate_range`. Every output is quantized down.
    pub fn propagate(
        &self,
        pstate_range: PstateRange,
        input_mask: &ClkDomainMask,
        input_values: &[u32; MAX_CLK_DOMAINS],
        output_mask: &ClkDomainMask,
        topology: TopologyId,
    ) -> Result<[u32; MAX_CLK_DOMAINS]> {
        let range = self.check_pstate_range(pstate_range)?;
        let mut resolved = *input_mask;
        let mut values = *input_values;

        for rel in self.catalog.prop_relationships(topology)? {
            if !resolved.get(rel.src) || resolved.get(rel.dst) {
                continue;
            }
            if let Some(f) = self.intersect(rel.src, values[rel.src], rel.dst)? {
                trace!(src = rel.src, dst = rel.dst, freq_khz = f, "propagated frequency");
                values[rel.dst] = f;
                resolved.set(rel.dst);
            }
        }

        let mut out = [0u32; MAX_CLK_DOMAINS];
        for d in output_mask.iter() {
            let target = if resolved.get(d) {
                values[d]
            } else {
                self.pstate_range_to_frequency_range(d, range)?.min
            };
            out[d] = self.quantize_frequency(d, target, Some(range), true)?;
        }
        Ok(out)
    }

    /// Frequency of `dst` at the voltage `src` needs for `src_freq_khz` on
    /// the source's primary rail. `None` when the curves do not meet.
    fn intersect(&self, src: ClkDomainIdx, src_freq_khz: u32, dst: ClkDomainIdx) -> Result<Option<u32>> {
        let rail = self.catalog.primary_rail(src)?;
        if !self.catalog.domain_rails(dst)?.get(rail) {
            return Ok(None);
        }
        let voltage_uv = match self.frequency_to_voltage(src, src_freq_khz, rail, false) {
            Ok(v) => v,
            Err(PerfError::OutOfRange(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(self
            .catalog
            .vf_curve(dst, rail)?
            .iter()
            .rev()
            .find(|p| p.voltage_uv <= voltage_uv)
            .map(|p| p.freq_khz))
    }
}
