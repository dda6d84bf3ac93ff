//! Sequence-stamped memoization of arbitration outputs.

use tracing::debug;

use crate::arbitrate::{arbitrate_and_apply, no_exclusions};
use crate::catalog::VfCatalog;
use crate::context::ArbitrationContext;
use crate::error::Result;
use crate::sequencer::ChangeSequencer;
use crate::types::ArbitrationOutput;

#[derive(Clone, Debug, Default)]
pub struct ArbitrationCache {
    cached: Option<ArbitrationOutput>,
    hits: u64,
    misses: u64,
}

impl ArbitrationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully computed output, fresh or not.
    pub fn last(&self) -> Option<&ArbitrationOutput> {
        self.cached.as_ref()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Return the cached output when caching is on and its stamp matches
    /// the context's sequence id; otherwise arbitrate, apply and store.
    ///
    /// A failed arbitration leaves the previous output in place.
    pub fn get<C, S>(
        &mut self,
        ctx: &ArbitrationContext,
        catalog: &C,
        sequencer: &mut S,
    ) -> Result<ArbitrationOutput>
    where
        C: VfCatalog + ?Sized,
        S: ChangeSequencer + ?Sized,
    {
        if ctx.caching_enabled() {
            if let Some(out) = self.cached.filter(|o| o.sequence_stamp == ctx.sequence_id()) {
                self.hits += 1;
                debug!(sequence = out.sequence_stamp, "arbitration cache hit");
                return Ok(out);
            }
        }

        self.misses += 1;
        debug!(sequence = ctx.sequence_id(), "arbitration cache miss");
        let out = arbitrate_and_apply(ctx, catalog, &no_exclusions(), ctx.cfg().apply_flags, sequencer)?;
        self.cached = Some(out);
        Ok(out)
    }
}
