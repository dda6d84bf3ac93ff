//! Hand-off contract towards the hardware change sequencer.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ArbitrationOutput;

/// Hints passed along with an output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFlags {
    /// Program the tuple even if it matches what is already applied.
    pub force: bool,
    /// Ask the sequencer to report completion.
    pub notify: bool,
}

/// Receives arbitration outputs. The core only calls this; programming the
/// clocks and rails happens behind it, and completion (when requested via
/// [`ApplyFlags::notify`]) is reported on the sequencer's own channel.
pub trait ChangeSequencer {
    fn enqueue(&mut self, output: &ArbitrationOutput, flags: ApplyFlags) -> Result<()>;
}

impl<S: ChangeSequencer + ?Sized> ChangeSequencer for &mut S {
    fn enqueue(&mut self, output: &ArbitrationOutput, flags: ApplyFlags) -> Result<()> {
        (**self).enqueue(output, flags)
    }
}
