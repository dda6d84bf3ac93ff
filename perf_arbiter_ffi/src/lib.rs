#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::ptr;

use tracing::warn;

use perf_arbiter_core::{
    ApplyFlags, ArbOutputV1, ArbOutputVersion, ArbitrationOutput, ArbitrationOutputExport, BoundTuple,
    CatalogDesc, ChangeSequencer, ClientInput, ExportHeader, ExportPayload, LimitFlags, LimitMask, PerfError,
    PropagationRegime, StaticCatalog, MAX_CLK_DOMAINS, MAX_LIMITS, MAX_VOLT_RAILS,
};
use perf_arbiter_supervisor::{
    BasicInputBuilder, LimitDef, LimitRequest, PerfSupervisor, SupervisorCfg, SupervisorError,
    SupervisorSnapshot,
};

/// FFI ABI version for perf_arbiter_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const PERF_ARBITER_FFI_VERSION: u32 = 1;

#[no_mangle]
pub extern "C" fn perf_arbiter_ffi_version() -> u32 {
    PERF_ARBITER_FFI_VERSION
}

// Binary format identification.
const EXPORT_MAGIC: u32 = 0x3150_5241; // "ARP1" little-endian
const SNAP_MAGIC: u32 = 0x3153_5241; // "ARS1" little-endian
const SNAP_VERSION: u32 = 1;

// Return codes. Negative values are errors.
pub const PERF_OK: i32 = 0;
pub const PERF_ERR_NULL: i32 = -1;
pub const PERF_ERR_INVALID_ARGUMENT: i32 = -2;
pub const PERF_ERR_OUT_OF_RANGE: i32 = -3;
pub const PERF_ERR_NO_FREE_MEM: i32 = -4;
pub const PERF_ERR_INVALID_STATE: i32 = -5;
pub const PERF_ERR_INVALID_INDEX: i32 = -6;
pub const PERF_ERR_UNKNOWN_LIMIT: i32 = -7;
pub const PERF_ERR_BAD_MAGIC: i32 = -8;
pub const PERF_ERR_BAD_VERSION: i32 = -9;
pub const PERF_ERR_TRUNCATED: i32 = -10;
pub const PERF_ERR_PARSE: i32 = -11;

// Client-input message tags.
pub const PERF_LIMIT_DISABLED: u32 = 0;
pub const PERF_LIMIT_PSTATE: u32 = 1;
pub const PERF_LIMIT_FREQUENCY: u32 = 2;
pub const PERF_LIMIT_VOLTAGE: u32 = 3;
pub const PERF_LIMIT_VIRTUAL_PSTATE: u32 = 4;

// Limit flag bits for `perf_arbiter_register_limit`.
pub const PERF_LIMIT_FLAG_MIN: u32 = 1 << 0;
pub const PERF_LIMIT_FLAG_MAX: u32 = 1 << 1;
pub const PERF_LIMIT_FLAG_STRICT: u32 = 1 << 2;

// Propagation selectors for `perf_arbiter_register_limit`; values >= 0 name a topology.
pub const PERF_PROPAGATION_DEFAULT: i32 = -1;
pub const PERF_PROPAGATION_INPUT_ONLY: i32 = -2;

// Apply flag bits handed to the sequencer callback.
pub const PERF_APPLY_FORCE: u32 = 1 << 0;
pub const PERF_APPLY_NOTIFY: u32 = 1 << 1;

fn perf_rc(e: &PerfError) -> i32 {
    match e {
        PerfError::InvalidArgument(_) => PERF_ERR_INVALID_ARGUMENT,
        PerfError::OutOfRange(_) => PERF_ERR_OUT_OF_RANGE,
        PerfError::NoFreeMem { .. } => PERF_ERR_NO_FREE_MEM,
        PerfError::InvalidState(_) => PERF_ERR_INVALID_STATE,
        PerfError::InvalidIndex { .. } => PERF_ERR_INVALID_INDEX,
    }
}

fn supervisor_rc(e: &SupervisorError) -> i32 {
    match e {
        SupervisorError::UnknownLimit(_) => PERF_ERR_UNKNOWN_LIMIT,
        SupervisorError::DuplicateLimit(_) => PERF_ERR_INVALID_ARGUMENT,
        SupervisorError::Limit { source, .. } => perf_rc(source),
        SupervisorError::Perf(e) => perf_rc(e),
    }
}

/// FFI string view (UTF-8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PerfStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl PerfStr {
    fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }
}

/// Owned byte buffer (export, snapshot). Free with `perf_arbiter_bytes_free`.
#[repr(C)]
pub struct PerfBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl PerfBytes {
    fn null() -> Self {
        PerfBytes { ptr: ptr::null_mut(), len: 0 }
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        let mut boxed = buf.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        PerfBytes { ptr, len }
    }
}

#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_bytes_free(b: PerfBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}

/// 255-bit wire mask over limit indices.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerfWireMask255 {
    pub words: [u32; 8],
}

/// Domain or rail plus its value.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PerfTargetValue {
    pub target: u32,
    pub value: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union PerfLimitData {
    pub pstate: u32,
    pub virtual_pstate: u32,
    pub frequency: PerfTargetValue,
    pub voltage: PerfTargetValue,
}

/// Tagged client-input message; `tag` is one of the `PERF_LIMIT_*` values.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PerfLimitMsg {
    pub tag: u32,
    pub data: PerfLimitData,
}

impl PerfLimitMsg {
    pub fn disabled() -> Self {
        Self { tag: PERF_LIMIT_DISABLED, data: PerfLimitData { pstate: 0 } }
    }

    pub fn pstate(p: u32) -> Self {
        Self { tag: PERF_LIMIT_PSTATE, data: PerfLimitData { pstate: p } }
    }

    pub fn virtual_pstate(id: u32) -> Self {
        Self { tag: PERF_LIMIT_VIRTUAL_PSTATE, data: PerfLimitData { virtual_pstate: id } }
    }

    pub fn frequency(domain: u32, freq_khz: u32) -> Self {
        Self {
            tag: PERF_LIMIT_FREQUENCY,
            data: PerfLimitData { frequency: PerfTargetValue { target: domain, value: freq_khz } },
        }
    }

    pub fn voltage(rail: u32, voltage_uv: u32) -> Self {
        Self {
            tag: PERF_LIMIT_VOLTAGE,
            data: PerfLimitData { voltage: PerfTargetValue { target: rail, value: voltage_uv } },
        }
    }

    fn to_request<'a>(&self, limit: &'a str) -> Result<LimitRequest<'a>, i32> {
        // every union member is plain u32 data, so any bit pattern is valid
        let req = unsafe {
            match self.tag {
                PERF_LIMIT_DISABLED => LimitRequest::disable(limit, "ffi"),
                PERF_LIMIT_PSTATE => LimitRequest::pstate(limit, "ffi", self.data.pstate),
                PERF_LIMIT_VIRTUAL_PSTATE => LimitRequest::virtual_pstate(limit, "ffi", self.data.virtual_pstate),
                PERF_LIMIT_FREQUENCY => {
                    let tv = self.data.frequency;
                    LimitRequest::frequency(limit, "ffi", tv.target as usize, tv.value)
                }
                PERF_LIMIT_VOLTAGE => {
                    let tv = self.data.voltage;
                    LimitRequest::voltage(limit, "ffi", tv.target as usize, tv.value)
                }
                _ => return Err(PERF_ERR_INVALID_ARGUMENT),
            }
        };
        Ok(req)
    }
}

/// `(tag, target, value)` triple used by snapshots and status reports.
fn input_to_wire(input: &ClientInput) -> (u32, u32, u32) {
    match *input {
        ClientInput::Disabled => (PERF_LIMIT_DISABLED, 0, 0),
        ClientInput::PstateIndex(p) => (PERF_LIMIT_PSTATE, 0, p),
        ClientInput::FrequencyKHz { domain, value } => (PERF_LIMIT_FREQUENCY, domain as u32, value),
        ClientInput::VoltageuV { rail, value } => (PERF_LIMIT_VOLTAGE, rail as u32, value),
        ClientInput::VirtualPstate(id) => (PERF_LIMIT_VIRTUAL_PSTATE, 0, id),
    }
}

fn input_from_wire(tag: u32, target: u32, value: u32) -> Result<ClientInput, i32> {
    Ok(match tag {
        PERF_LIMIT_DISABLED => ClientInput::Disabled,
        PERF_LIMIT_PSTATE => ClientInput::PstateIndex(value),
        PERF_LIMIT_FREQUENCY => ClientInput::FrequencyKHz { domain: target as usize, value },
        PERF_LIMIT_VOLTAGE => ClientInput::VoltageuV { rail: target as usize, value },
        PERF_LIMIT_VIRTUAL_PSTATE => ClientInput::VirtualPstate(value),
        _ => return Err(PERF_ERR_INVALID_ARGUMENT),
    })
}

// ---------------------------------------------------------------------
// Versioned output encoding
// ---------------------------------------------------------------------

/// Little-endian cursor shared by the export and snapshot decoders.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], i32> {
        let end = self.pos.checked_add(n).ok_or(PERF_ERR_TRUNCATED)?;
        let out = self.data.get(self.pos..end).ok_or(PERF_ERR_TRUNCATED)?;
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, i32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, i32> {
        let lo = self.u32()? as u64;
        let hi = self.u32()? as u64;
        Ok(lo | (hi << 32))
    }

    fn header(&mut self, magic: u32, version: u32) -> Result<(), i32> {
        if self.u32()? != magic {
            return Err(PERF_ERR_BAD_MAGIC);
        }
        if self.u32()? != version {
            return Err(PERF_ERR_BAD_VERSION);
        }
        Ok(())
    }
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Export format (binary, little-endian):
/// [u32 magic = "ARP1"][u32 version][u32 payload_len][payload]
///
/// V1 payload:
///   [u32 min pstate][u32 max pstate][u32 domain mask][u32 rail mask][u64 sequence]
///   [u32 x 32 min kHz][u32 x 32 max kHz][u32 x 32 min uV][u32 x 32 max uV]
pub fn encode_export(export: &ArbitrationOutputExport) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + export.header.size as usize);
    put_u32(&mut buf, EXPORT_MAGIC);
    put_u32(&mut buf, export.header.version as u32);
    put_u32(&mut buf, export.header.size);

    match &export.payload {
        ExportPayload::V1(p) => {
            put_u32(&mut buf, p.min.pstate_idx);
            put_u32(&mut buf, p.max.pstate_idx);
            put_u32(&mut buf, p.domain_mask);
            put_u32(&mut buf, p.rail_mask);
            buf.extend_from_slice(&p.sequence_stamp.to_le_bytes());
            for v in p.min.freq_khz.iter().chain(&p.max.freq_khz) {
                put_u32(&mut buf, *v);
            }
            for v in p.min.voltage_uv.iter().chain(&p.max.voltage_uv) {
                put_u32(&mut buf, *v);
            }
        }
    }
    buf
}

pub fn decode_export(data: &[u8]) -> Result<ArbitrationOutputExport, i32> {
    let mut r = Reader::new(data);
    if r.u32()? != EXPORT_MAGIC {
        return Err(PERF_ERR_BAD_MAGIC);
    }
    let version = ArbOutputVersion::from_u32(r.u32()?).map_err(|_| PERF_ERR_BAD_VERSION)?;
    let size = r.u32()?;
    if size as usize != version.payload_len() {
        return Err(PERF_ERR_INVALID_ARGUMENT);
    }

    let payload = match version {
        ArbOutputVersion::V1 => {
            let mut min = BoundTuple { pstate_idx: r.u32()?, ..BoundTuple::default() };
            let mut max = BoundTuple { pstate_idx: r.u32()?, ..BoundTuple::default() };
            let domain_mask = r.u32()?;
            let rail_mask = r.u32()?;
            let sequence_stamp = r.u64()?;
            for slot in min.freq_khz.iter_mut().chain(max.freq_khz.iter_mut()) {
                *slot = r.u32()?;
            }
            for slot in min.voltage_uv.iter_mut().chain(max.voltage_uv.iter_mut()) {
                *slot = r.u32()?;
            }
            ExportPayload::V1(ArbOutputV1 { min, max, domain_mask, rail_mask, sequence_stamp })
        }
    };
    Ok(ArbitrationOutputExport {
        header: ExportHeader { version, size },
        payload,
    })
}

// ---------------------------------------------------------------------
// Change sequencer callback
// ---------------------------------------------------------------------

/// Host sequencer entry point. Receives an encoded V1 export and the
/// `PERF_APPLY_*` bits; a nonzero return rejects the output.
pub type PerfApplyFn = Option<unsafe extern "C" fn(user_data: *mut c_void, output: *const u8, len: usize, flags: u32) -> i32>;

pub struct CallbackSequencer {
    apply: PerfApplyFn,
    user_data: *mut c_void,
}

impl ChangeSequencer for CallbackSequencer {
    fn enqueue(&mut self, output: &ArbitrationOutput, flags: ApplyFlags) -> perf_arbiter_core::Result<()> {
        let Some(apply) = self.apply else {
            return Ok(());
        };
        let bytes = encode_export(&ArbitrationOutputExport::new(output, ArbOutputVersion::V1)?);
        let mut bits = 0;
        if flags.force {
            bits |= PERF_APPLY_FORCE;
        }
        if flags.notify {
            bits |= PERF_APPLY_NOTIFY;
        }
        let rc = unsafe { apply(self.user_data, bytes.as_ptr(), bytes.len(), bits) };
        if rc != 0 {
            return Err(PerfError::InvalidState("change sequencer rejected output"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Handle lifecycle
// ---------------------------------------------------------------------

/// Opaque handle exposed over FFI.
pub struct PerfArbiter {
    inner: PerfSupervisor<StaticCatalog, CallbackSequencer>,
    builder: BasicInputBuilder,
}

fn build_arbiter(catalog_json: &str, cfg_json: Option<&str>, sequencer: CallbackSequencer) -> Result<PerfArbiter, String> {
    let desc: CatalogDesc = serde_json::from_str(catalog_json).map_err(|e| e.to_string())?;
    let catalog = StaticCatalog::new(desc).map_err(|e| e.to_string())?;
    let cfg: SupervisorCfg = match cfg_json {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).map_err(|e| e.to_string())?,
        _ => SupervisorCfg::default(),
    };
    let inner = PerfSupervisor::new(catalog, sequencer, cfg).map_err(|e| e.to_string())?;
    Ok(PerfArbiter { inner, builder: BasicInputBuilder::default() })
}

/// Create an arbiter from a JSON catalog and an optional JSON supervisor cfg.
///
/// Returns null if either document fails to parse or validate. `apply` may be
/// null, in which case outputs are computed but go nowhere.
#[no_mangle]
pub extern "C" fn perf_arbiter_new(
    catalog_json: PerfStr,
    cfg_json: PerfStr,
    apply: PerfApplyFn,
    user_data: *mut c_void,
) -> *mut PerfArbiter {
    let Some(catalog_json) = catalog_json.as_str() else {
        return ptr::null_mut();
    };
    let sequencer = CallbackSequencer { apply, user_data };
    match build_arbiter(catalog_json, cfg_json.as_str(), sequencer) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            warn!(error = %e, "arbiter construction failed");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_free(h: *mut PerfArbiter) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Register a limit at the lowest priority so far. Returns its index or a
/// negative error code.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_register_limit(h: *mut PerfArbiter, name: PerfStr, flags: u32, propagation: i32) -> i32 {
    if h.is_null() {
        return PERF_ERR_NULL;
    }
    let Some(name) = name.as_str() else {
        return PERF_ERR_INVALID_ARGUMENT;
    };
    let propagation = match propagation {
        PERF_PROPAGATION_DEFAULT => PropagationRegime::Default,
        PERF_PROPAGATION_INPUT_ONLY => PropagationRegime::InputOnly,
        t if t >= 0 => PropagationRegime::Topology(t as u32),
        _ => return PERF_ERR_INVALID_ARGUMENT,
    };
    let def = LimitDef {
        name: name.to_string(),
        flags: LimitFlags {
            min: flags & PERF_LIMIT_FLAG_MIN != 0,
            max: flags & PERF_LIMIT_FLAG_MAX != 0,
            strict_propagation: flags & PERF_LIMIT_FLAG_STRICT != 0,
        },
        propagation,
        policy_id: None,
    };
    match (*h).inner.register_limit(def) {
        Ok(idx) => idx as i32,
        Err(e) => supervisor_rc(&e),
    }
}

/// Set a limit's input from a tagged message.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_set_limit(h: *mut PerfArbiter, name: PerfStr, msg: *const PerfLimitMsg) -> i32 {
    if h.is_null() || msg.is_null() {
        return PERF_ERR_NULL;
    }
    let Some(name) = name.as_str() else {
        return PERF_ERR_INVALID_ARGUMENT;
    };
    let req = match (*msg).to_request(name) {
        Ok(req) => req,
        Err(rc) => return rc,
    };
    let handle = &mut *h;
    let report = handle.inner.ingest(&handle.builder, std::slice::from_ref(&req));
    match report.rejected.first() {
        Some((_, e)) => supervisor_rc(e),
        None => PERF_OK,
    }
}

#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_set_locked(h: *mut PerfArbiter, locked: u8) -> i32 {
    if h.is_null() {
        return PERF_ERR_NULL;
    }
    (*h).inner.set_locked(locked != 0);
    PERF_OK
}

#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_invalidate_vf(h: *mut PerfArbiter) -> i32 {
    if h.is_null() {
        return PERF_ERR_NULL;
    }
    (*h).inner.invalidate_vf();
    PERF_OK
}

/// Arbitrate and hand a fresh output to the sequencer callback.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_arbitrate(h: *mut PerfArbiter) -> i32 {
    if h.is_null() {
        return PERF_ERR_NULL;
    }
    match (*h).inner.arbitrate() {
        Ok(_) => PERF_OK,
        Err(e) => supervisor_rc(&e),
    }
}

/// Encoded export of the last computed output; empty when none exists yet
/// or `version` is unknown.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_export(h: *mut PerfArbiter, version: u32) -> PerfBytes {
    if h.is_null() {
        return PerfBytes::null();
    }
    let Ok(version) = ArbOutputVersion::from_u32(version) else {
        return PerfBytes::null();
    };
    match (*h).inner.export(version) {
        Ok(Some(export)) => PerfBytes::from_vec(encode_export(&export)),
        _ => PerfBytes::null(),
    }
}

/// Write the mask of limits holding an active slot.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_active_mask(h: *mut PerfArbiter, out: *mut PerfWireMask255) -> i32 {
    if h.is_null() || out.is_null() {
        return PERF_ERR_NULL;
    }
    let mask = (*h).inner.active_mask();
    let mut wire = PerfWireMask255::default();
    if let Err(e) = mask.export_to(&mut wire.words, MAX_LIMITS) {
        return perf_rc(&e);
    }
    *out = wire;
    PERF_OK
}

/// Arbitrate one side with the limits in `exclude` skipped, without caching
/// or applying. Writes `MAX_CLK_DOMAINS` kHz values and `MAX_VOLT_RAILS` uV
/// values; either output pointer may be null.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_preview(
    h: *mut PerfArbiter,
    exclude: *const PerfWireMask255,
    compute_min: u8,
    out_freq_khz: *mut u32,
    out_voltage_uv: *mut u32,
) -> i32 {
    if h.is_null() || exclude.is_null() {
        return PERF_ERR_NULL;
    }
    let mut mask = LimitMask::new(MAX_LIMITS);
    if let Err(e) = mask.import_from(&(*exclude).words, MAX_LIMITS) {
        return perf_rc(&e);
    }
    let (min, max) = match (*h).inner.preview(&mask) {
        Ok(pair) => pair,
        Err(e) => return supervisor_rc(&e),
    };
    let side = if compute_min != 0 { min.tuple } else { max.tuple };
    if !out_freq_khz.is_null() {
        std::slice::from_raw_parts_mut(out_freq_khz, MAX_CLK_DOMAINS).copy_from_slice(&side.freq_khz);
    }
    if !out_voltage_uv.is_null() {
        std::slice::from_raw_parts_mut(out_voltage_uv, MAX_VOLT_RAILS).copy_from_slice(&side.voltage_uv);
    }
    PERF_OK
}

/// Status of one named limit (FFI-safe).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PerfLimitStatus {
    pub index: u32,
    pub active: u8,
    pub tag: u32,
    pub target: u32,
    pub value: u32,
}

#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_limit_status(h: *mut PerfArbiter, name: PerfStr, out: *mut PerfLimitStatus) -> i32 {
    if h.is_null() || out.is_null() {
        return PERF_ERR_NULL;
    }
    let Some(name) = name.as_str() else {
        return PERF_ERR_INVALID_ARGUMENT;
    };
    let handle = &*h;
    let Some(idx) = handle.inner.limit_index(name) else {
        return PERF_ERR_UNKNOWN_LIMIT;
    };
    let input = match handle.inner.input(name) {
        Ok(input) => input,
        Err(e) => return supervisor_rc(&e),
    };
    let (tag, target, value) = input_to_wire(&input);
    *out = PerfLimitStatus {
        index: idx as u32,
        active: u8::from(!input.is_disabled()),
        tag,
        target,
        value,
    };
    PERF_OK
}

// ---------------------------------------------------------------------
// Snapshot / restore
// ---------------------------------------------------------------------

/// Restore result statistics (FFI-safe).
#[repr(C)]
pub struct PerfRestoreStats {
    pub applied: u32,
    pub rejected: u32,
    pub rc: i32,
}

/// Snapshot format (binary):
/// [u32 magic = "ARS1"][u32 version = 1][u32 count]
/// repeated count times:
///   [u32 strlen][bytes...][u32 tag][u32 target][u32 value]
pub fn encode_snapshot(snap: &SupervisorSnapshot) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    put_u32(&mut buf, SNAP_MAGIC);
    put_u32(&mut buf, SNAP_VERSION);
    put_u32(&mut buf, snap.inputs.len() as u32);

    for (name, input) in &snap.inputs {
        let nb = name.as_bytes();
        put_u32(&mut buf, nb.len() as u32);
        buf.extend_from_slice(nb);
        let (tag, target, value) = input_to_wire(input);
        put_u32(&mut buf, tag);
        put_u32(&mut buf, target);
        put_u32(&mut buf, value);
    }
    buf
}

pub fn decode_snapshot(data: &[u8]) -> Result<SupervisorSnapshot, i32> {
    let mut r = Reader::new(data);
    r.header(SNAP_MAGIC, SNAP_VERSION)?;
    let count = r.u32()? as usize;

    let mut inputs = Vec::with_capacity(count.min(MAX_LIMITS));
    for _ in 0..count {
        let len = r.u32()? as usize;
        let name = std::str::from_utf8(r.bytes(len)?).map_err(|_| PERF_ERR_PARSE)?;
        let tag = r.u32()?;
        let target = r.u32()?;
        let value = r.u32()?;
        inputs.push((name.to_string(), input_from_wire(tag, target, value)?));
    }
    Ok(SupervisorSnapshot { inputs })
}

#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_snapshot(h: *mut PerfArbiter) -> PerfBytes {
    if h.is_null() {
        return PerfBytes::null();
    }
    PerfBytes::from_vec(encode_snapshot(&(*h).inner.snapshot()))
}

/// Restore limit inputs from a binary snapshot. `merge != 0` keeps inputs
/// the snapshot does not mention.
#[no_mangle]
pub unsafe extern "C" fn perf_arbiter_restore(h: *mut PerfArbiter, bytes: *const u8, len: usize, merge: u8) -> PerfRestoreStats {
    if h.is_null() || bytes.is_null() {
        return PerfRestoreStats { applied: 0, rejected: 0, rc: PERF_ERR_NULL };
    }
    let data = std::slice::from_raw_parts(bytes, len);
    let snap = match decode_snapshot(data) {
        Ok(snap) => snap,
        Err(rc) => {
            warn!(rc, len, "snapshot decode failed");
            return PerfRestoreStats { applied: 0, rejected: 0, rc };
        }
    };

    let handle = &mut *h;
    let stats = if merge != 0 {
        handle.inner.restore_merge(snap)
    } else {
        handle.inner.restore(snap)
    };
    PerfRestoreStats {
        applied: stats.applied as u32,
        rejected: stats.rejected as u32,
        rc: PERF_OK,
    }
}
