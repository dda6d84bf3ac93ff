//! Priority-ordered intersection of active limits into MIN/MAX tuples.

use tracing::{debug, trace, warn};

use crate::catalog::VfCatalog;
use crate::context::ArbitrationContext;
use crate::error::{PerfError, Result};
use crate::limit::{LimitBound, LimitFlags};
use crate::sequencer::{ApplyFlags, ChangeSequencer};
use crate::types::{
    ArbTuple, ArbitrationOutput, BoundSources, BoundTuple, ClkDomainMask, LimitIdx, LimitMask,
    ValueRange, VoltRailMask, MAX_CLK_DOMAINS, MAX_LIMITS, MAX_VOLT_RAILS,
};
use crate::vf::VfConverter;

/// Empty exclusion mask sized for the limit table.
pub fn no_exclusions() -> LimitMask {
    LimitMask::new(MAX_LIMITS)
}

/// Running `[lo, hi]` state of one arbitration walk.
struct Walk {
    lo: BoundTuple,
    hi: BoundTuple,
    lo_src: BoundSources,
    hi_src: BoundSources,
    domains: ClkDomainMask,
    rails: VoltRailMask,
}

/// Narrow `[lo, hi]` toward `bound` on the requested sides. The result
/// never leaves the incoming interval, so earlier limits always win.
fn narrow(lo: &mut u32, hi: &mut u32, bound: ValueRange, flags: LimitFlags) -> (bool, bool) {
    let (cur_lo, cur_hi) = (*lo, *hi);
    if flags.min {
        *lo = bound.min.max(cur_lo).min(cur_hi);
    }
    if flags.max {
        *hi = bound.max.min(cur_hi).max(cur_lo);
    }
    (*lo != cur_lo, *hi != cur_hi)
}

/// Set both sides to `value`, held inside the incoming interval.
fn pin(lo: &mut u32, hi: &mut u32, value: u32) -> (bool, bool) {
    let (cur_lo, cur_hi) = (*lo, *hi);
    let v = value.clamp(cur_lo, cur_hi);
    *lo = v;
    *hi = v;
    (v != cur_lo, v != cur_hi)
}

fn mark(changed: (bool, bool), lo_src: &mut Option<LimitIdx>, hi_src: &mut Option<LimitIdx>, idx: LimitIdx) {
    if changed.0 {
        *lo_src = Some(idx);
    }
    if changed.1 {
        *hi_src = Some(idx);
    }
}

impl Walk {
    fn new(ctx: &ArbitrationContext) -> Self {
        let defaults = ctx.default_bounds();
        Self {
            lo: defaults.min,
            hi: defaults.max,
            lo_src: BoundSources::default(),
            hi_src: BoundSources::default(),
            domains: ClkDomainMask::new(MAX_CLK_DOMAINS),
            rails: VoltRailMask::new(MAX_VOLT_RAILS),
        }
    }

    fn intersect(&mut self, idx: LimitIdx, flags: LimitFlags, bound: &LimitBound) {
        let changed = narrow(&mut self.lo.pstate_idx, &mut self.hi.pstate_idx, pstate_as_range(bound), flags);
        mark(changed, &mut self.lo_src.pstate, &mut self.hi_src.pstate, idx);

        for d in bound.domain_mask.iter() {
            let (lo, hi) = (&mut self.lo.freq_khz[d], &mut self.hi.freq_khz[d]);
            let changed = if bound.pinned.get(d) {
                pin(lo, hi, bound.freq_khz[d].min)
            } else {
                narrow(lo, hi, bound.freq_khz[d], flags)
            };
            mark(changed, &mut self.lo_src.freq[d], &mut self.hi_src.freq[d], idx);
            self.domains.set(d);
        }

        for r in bound.rail_mask.iter() {
            let changed = narrow(&mut self.lo.voltage_uv[r], &mut self.hi.voltage_uv[r], bound.voltage_uv[r], flags);
            mark(changed, &mut self.lo_src.voltage[r], &mut self.hi_src.voltage[r], idx);
            self.rails.set(r);
        }
    }
}

fn pstate_as_range(bound: &LimitBound) -> ValueRange {
    ValueRange::new(bound.pstate.min, bound.pstate.max)
}

fn walk_limits<C: VfCatalog + ?Sized>(
    ctx: &ArbitrationContext,
    catalog: &C,
    exclude: &LimitMask,
) -> Result<Walk> {
    if exclude.bit_count() != MAX_LIMITS {
        return Err(PerfError::InvalidArgument("exclude mask size mismatch"));
    }
    let conv = VfConverter::new(catalog);
    let mut walk = Walk::new(ctx);

    for (idx, limit) in ctx.limits().iter().enumerate() {
        if exclude.get(idx) || !limit.is_active() {
            continue;
        }
        let input = ctx.limit_input(idx)?;
        let params = ctx.normalize_params(idx);
        let Some(bound) = LimitBound::from_input(&conv, &input, &params)? else {
            continue;
        };
        trace!(limit = limit.id, idx, ?input, "intersecting limit");
        walk.intersect(idx, limit.flags, &bound);
    }
    Ok(walk)
}

/// Compute one side of the arbitrated tuple.
///
/// Active limits are visited in registration order, skipping any index set
/// in `exclude`. Any conversion error aborts the whole call.
pub fn arbitrate<C: VfCatalog + ?Sized>(
    ctx: &ArbitrationContext,
    catalog: &C,
    exclude: &LimitMask,
    compute_min: bool,
) -> Result<ArbTuple> {
    let walk = walk_limits(ctx, catalog, exclude)?;
    let (tuple, sources) = if compute_min {
        (walk.lo, walk.lo_src)
    } else {
        (walk.hi, walk.hi_src)
    };
    Ok(ArbTuple {
        tuple,
        sources,
        domain_mask: walk.domains,
        rail_mask: walk.rails,
    })
}

/// Arbitrate both sides, stamp the result and hand it to the sequencer
/// unless the context is locked.
pub fn arbitrate_and_apply<C, S>(
    ctx: &ArbitrationContext,
    catalog: &C,
    exclude: &LimitMask,
    apply_hint: ApplyFlags,
    sequencer: &mut S,
) -> Result<ArbitrationOutput>
where
    C: VfCatalog + ?Sized,
    S: ChangeSequencer + ?Sized,
{
    let min = arbitrate(ctx, catalog, exclude, true)?;
    let max = arbitrate(ctx, catalog, exclude, false)?;

    let mut domain_mask = ClkDomainMask::new(MAX_CLK_DOMAINS);
    domain_mask.or(&min.domain_mask, &max.domain_mask)?;
    let mut rail_mask = VoltRailMask::new(MAX_VOLT_RAILS);
    rail_mask.or(&min.rail_mask, &max.rail_mask)?;

    let output = ArbitrationOutput {
        min: min.tuple,
        max: max.tuple,
        min_sources: min.sources,
        max_sources: max.sources,
        domain_mask,
        rail_mask,
        sequence_stamp: ctx.sequence_id(),
    };
    debug!(
        sequence = output.sequence_stamp,
        pstate_min = output.min.pstate_idx,
        pstate_max = output.max.pstate_idx,
        domains = output.domain_mask.count_set(),
        rails = output.rail_mask.count_set(),
        "arbitration complete"
    );

    if ctx.arbitration_locked() {
        warn!(sequence = output.sequence_stamp, "arbitration locked, apply suppressed");
    } else if let Err(e) = sequencer.enqueue(&output, apply_hint) {
        warn!(sequence = output.sequence_stamp, error = %e, "change sequencer rejected output");
        return Err(e);
    }
    Ok(output)
}
