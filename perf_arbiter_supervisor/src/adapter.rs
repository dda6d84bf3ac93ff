//! Host adapter layer: turn outside-world limit requests into `perf_arbiter_core::ClientInput`.
//!
//! No IO. No async. The adapter only checks a request against the catalog
//! it will be arbitrated over; it holds no limit state of its own.
//!
//! Products provide an `InputBuilder` (or use `BasicInputBuilder`) to map
//! raw `LimitRequest`s onto client inputs.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use perf_arbiter_core::{ClientInput, PerfError, VfCatalog, MAX_CLK_DOMAINS, MAX_VOLT_RAILS};

/// Tag of a host limit request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Disable,
    Pstate,
    Frequency,
    VirtualPstate,
    Voltage,
}

/// A raw limit request from a host client (thermal, power capping, user
/// override, ...).
#[derive(Clone, Debug)]
pub struct LimitRequest<'a> {
    /// Name the limit was registered under.
    pub limit: Cow<'a, str>,
    /// Who asked; only used for logging.
    pub source: Cow<'a, str>,
    pub kind: RequestKind,
    /// Clock domain for `Frequency`, volt rail for `Voltage`; ignored otherwise.
    pub target: usize,
    /// Pstate index, virtual pstate id, kHz or uV depending on `kind`.
    pub value: u32,
}

impl<'a> LimitRequest<'a> {
    pub fn new(limit: impl Into<Cow<'a, str>>, source: impl Into<Cow<'a, str>>, kind: RequestKind) -> Self {
        Self {
            limit: limit.into(),
            source: source.into(),
            kind,
            target: 0,
            value: 0,
        }
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    pub fn disable(limit: impl Into<Cow<'a, str>>, source: impl Into<Cow<'a, str>>) -> Self {
        Self::new(limit, source, RequestKind::Disable)
    }

    pub fn pstate(limit: impl Into<Cow<'a, str>>, source: impl Into<Cow<'a, str>>, pstate: u32) -> Self {
        Self::new(limit, source, RequestKind::Pstate).with_value(pstate)
    }

    pub fn frequency(
        limit: impl Into<Cow<'a, str>>,
        source: impl Into<Cow<'a, str>>,
        domain: usize,
        freq_khz: u32,
    ) -> Self {
        Self::new(limit, source, RequestKind::Frequency).with_target(domain).with_value(freq_khz)
    }

    pub fn voltage(
        limit: impl Into<Cow<'a, str>>,
        source: impl Into<Cow<'a, str>>,
        rail: usize,
        voltage_uv: u32,
    ) -> Self {
        Self::new(limit, source, RequestKind::Voltage).with_target(rail).with_value(voltage_uv)
    }

    pub fn virtual_pstate(limit: impl Into<Cow<'a, str>>, source: impl Into<Cow<'a, str>>, id: u32) -> Self {
        Self::new(limit, source, RequestKind::VirtualPstate).with_value(id)
    }
}

/// Optional clamping of request values into what the catalog supports.
///
/// Both knobs default to off: out-of-catalog values are rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalizer {
    /// Clamp pstate indices to the last catalog pstate.
    pub clamp_pstate: bool,
    /// Clamp voltages into the rail's `[min, max]`.
    pub clamp_voltage: bool,
}

impl Normalizer {
    fn pstate<C: VfCatalog + ?Sized>(&self, catalog: &C, p: u32) -> u32 {
        let count = catalog.pstate_count();
        if self.clamp_pstate && count > 0 {
            p.min(count - 1)
        } else {
            p
        }
    }

    fn voltage<C: VfCatalog + ?Sized>(&self, catalog: &C, rail: usize, v: u32) -> u32 {
        match catalog.rail_range(rail) {
            Ok(range) if self.clamp_voltage => v.clamp(range.min, range.max),
            _ => v,
        }
    }
}

/// Check a client input against `catalog` without arbitrating it.
///
/// Every input the supervisor stores passes through here, whether it came
/// from a request or a snapshot.
pub fn validate_input<C: VfCatalog + ?Sized>(input: &ClientInput, catalog: &C) -> Result<(), PerfError> {
    match *input {
        ClientInput::Disabled => {}
        ClientInput::PstateIndex(p) => {
            if catalog.pstate_count() == 0 {
                return Err(PerfError::InvalidState("catalog has no pstates"));
            }
            if p >= catalog.pstate_count() {
                return Err(PerfError::InvalidArgument("pstate index past catalog"));
            }
        }
        ClientInput::VirtualPstate(id) => {
            catalog.virtual_pstate(id)?;
        }
        ClientInput::FrequencyKHz { domain, value } => {
            if domain >= MAX_CLK_DOMAINS || !catalog.clk_domains().get(domain) {
                return Err(PerfError::InvalidArgument("frequency request on unknown clock domain"));
            }
            if value == 0 {
                return Err(PerfError::InvalidArgument("zero frequency request"));
            }
        }
        ClientInput::VoltageuV { rail, value } => {
            if rail >= MAX_VOLT_RAILS || !catalog.volt_rails().get(rail) {
                return Err(PerfError::InvalidArgument("voltage request on unknown rail"));
            }
            if !catalog.rail_range(rail)?.contains(value) {
                return Err(PerfError::OutOfRange("voltage outside rail range"));
            }
        }
    }
    Ok(())
}

/// Trait: map a `LimitRequest` onto a client input for `catalog`.
pub trait InputBuilder {
    fn build<C: VfCatalog + ?Sized>(&self, req: &LimitRequest<'_>, catalog: &C) -> Result<ClientInput, PerfError>;
}

/// Builder that applies a `Normalizer` and validates the result against the catalog.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicInputBuilder {
    pub normalizer: Normalizer,
}

impl InputBuilder for BasicInputBuilder {
    fn build<C: VfCatalog + ?Sized>(&self, req: &LimitRequest<'_>, catalog: &C) -> Result<ClientInput, PerfError> {
        let input = match req.kind {
            RequestKind::Disable => ClientInput::Disabled,
            RequestKind::Pstate => ClientInput::PstateIndex(self.normalizer.pstate(catalog, req.value)),
            RequestKind::VirtualPstate => ClientInput::VirtualPstate(req.value),
            RequestKind::Frequency => ClientInput::FrequencyKHz { domain: req.target, value: req.value },
            RequestKind::Voltage => ClientInput::VoltageuV {
                rail: req.target,
                value: self.normalizer.voltage(catalog, req.target, req.value),
            },
        };
        validate_input(&input, catalog)?;
        Ok(input)
    }
}
