//! FFI smoke tests.
//!
//! These tests call the exported `extern "C"` functions directly (as an external consumer would),
//! to validate:
//! - ABI surface compiles and links
//! - the sequencer callback receives decodable exports
//! - allocation/free symmetry for returned buffers
//! - snapshot/restore round-trip works

use std::ffi::c_void;
use std::ptr;

use perf_arbiter_core::{ArbOutputVersion, ClientInput, ExportPayload, MAX_CLK_DOMAINS};
use perf_arbiter_supervisor::SupervisorSnapshot;
use perf_arbiter_ffi::*;

const CATALOG_JSON: &str = r#"{
  "rails": [ { "idx": 0, "range": { "min": 600000, "max": 1000000 } } ],
  "domains": [
    { "idx": 0, "primary_rail": 0, "curves": [ { "rail": 0, "points": [
      { "freq_khz": 100000, "voltage_uv": 600000 },
      { "freq_khz": 200000, "voltage_uv": 700000 },
      { "freq_khz": 300000, "voltage_uv": 800000 },
      { "freq_khz": 400000, "voltage_uv": 900000 } ] } ] }
  ],
  "pstates": [
    { "freqs": [ { "domain": 0, "range": { "min": 100000, "max": 200000 } } ] },
    { "freqs": [ { "domain": 0, "range": { "min": 300000, "max": 400000 } } ] }
  ]
}"#;

fn s(s: &str) -> PerfStr {
    PerfStr {
        ptr: s.as_ptr(),
        len: s.len(),
    }
}

fn none() -> PerfStr {
    PerfStr {
        ptr: ptr::null(),
        len: 0,
    }
}

#[derive(Default)]
struct Applied {
    outputs: Vec<Vec<u8>>,
    reject: bool,
}

unsafe extern "C" fn record(user_data: *mut c_void, output: *const u8, len: usize, _flags: u32) -> i32 {
    let applied = &mut *(user_data as *mut Applied);
    applied.outputs.push(std::slice::from_raw_parts(output, len).to_vec());
    if applied.reject {
        1
    } else {
        0
    }
}

fn new_arbiter(applied: &mut Applied) -> *mut PerfArbiter {
    let h = perf_arbiter_new(
        s(CATALOG_JSON),
        none(),
        Some(record),
        applied as *mut Applied as *mut c_void,
    );
    assert!(!h.is_null());
    unsafe {
        assert_eq!(perf_arbiter_register_limit(h, s("thermal"), PERF_LIMIT_FLAG_MAX, PERF_PROPAGATION_DEFAULT), 0);
        assert_eq!(perf_arbiter_register_limit(h, s("boost"), PERF_LIMIT_FLAG_MIN, PERF_PROPAGATION_INPUT_ONLY), 1);
    }
    h
}

#[test]
fn ffi_version() {
    assert_eq!(perf_arbiter_ffi_version(), PERF_ARBITER_FFI_VERSION);
}

#[test]
fn ffi_bad_catalog_yields_null() {
    let h = perf_arbiter_new(s("{ not json"), none(), None, ptr::null_mut());
    assert!(h.is_null());
    let h = perf_arbiter_new(none(), none(), None, ptr::null_mut());
    assert!(h.is_null());
}

#[test]
fn ffi_arbitrate_calls_sequencer() {
    let mut applied = Applied::default();
    let h = new_arbiter(&mut applied);

    unsafe {
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &PerfLimitMsg::pstate(0)), PERF_OK);
        assert_eq!(perf_arbiter_set_limit(h, s("boost"), &PerfLimitMsg::frequency(0, 150_000)), PERF_OK);
        assert_eq!(perf_arbiter_arbitrate(h), PERF_OK);
        // cached: no second apply
        assert_eq!(perf_arbiter_arbitrate(h), PERF_OK);
    }
    assert_eq!(applied.outputs.len(), 1);

    let export = decode_export(&applied.outputs[0]).unwrap();
    assert_eq!(export.header.version, ArbOutputVersion::V1);
    let ExportPayload::V1(p) = export.payload;
    assert_eq!(p.min.freq_khz[0], 150_000);
    assert_eq!(p.max.freq_khz[0], 200_000);
    assert_eq!(p.domain_mask, 1);

    let bytes = unsafe { perf_arbiter_export(h, 1) };
    assert!(!bytes.ptr.is_null());
    let copy = unsafe { std::slice::from_raw_parts(bytes.ptr, bytes.len) }.to_vec();
    assert_eq!(copy, applied.outputs[0]);
    unsafe { perf_arbiter_bytes_free(bytes) };

    let unknown = unsafe { perf_arbiter_export(h, 9) };
    assert!(unknown.ptr.is_null());

    unsafe { perf_arbiter_free(h) };
}

#[test]
fn ffi_rejects_bad_messages() {
    let mut applied = Applied::default();
    let h = new_arbiter(&mut applied);

    let bad_tag = PerfLimitMsg { tag: 42, ..PerfLimitMsg::pstate(0) };
    unsafe {
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &bad_tag), PERF_ERR_INVALID_ARGUMENT);
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &PerfLimitMsg::frequency(3, 100_000)), PERF_ERR_INVALID_ARGUMENT);
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &PerfLimitMsg::voltage(0, 2_000_000)), PERF_ERR_OUT_OF_RANGE);
        assert_eq!(perf_arbiter_set_limit(h, s("nobody"), &PerfLimitMsg::pstate(0)), PERF_ERR_UNKNOWN_LIMIT);
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), ptr::null()), PERF_ERR_NULL);
        assert_eq!(
            perf_arbiter_register_limit(h, s("thermal"), PERF_LIMIT_FLAG_MAX, PERF_PROPAGATION_DEFAULT),
            PERF_ERR_INVALID_ARGUMENT
        );
        // the catalog has no propagation topologies
        assert_eq!(
            perf_arbiter_register_limit(h, s("rail"), PERF_LIMIT_FLAG_MAX | PERF_LIMIT_FLAG_STRICT, 3),
            PERF_ERR_INVALID_INDEX
        );

        let mut status = PerfLimitStatus::default();
        assert_eq!(perf_arbiter_limit_status(h, s("thermal"), &mut status), PERF_OK);
        assert_eq!(status.active, 0);
        assert_eq!(status.tag, PERF_LIMIT_DISABLED);
        perf_arbiter_free(h);
    }
}

#[test]
fn ffi_sequencer_rejection_surfaces() {
    let mut applied = Applied { reject: true, ..Applied::default() };
    let h = new_arbiter(&mut applied);
    unsafe {
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &PerfLimitMsg::pstate(1)), PERF_OK);
        assert_eq!(perf_arbiter_arbitrate(h), PERF_ERR_INVALID_STATE);
        // nothing cached: export stays empty
        let bytes = perf_arbiter_export(h, 1);
        assert!(bytes.ptr.is_null());
        perf_arbiter_free(h);
    }
}

#[test]
fn ffi_masks_and_preview() {
    let mut applied = Applied::default();
    let h = new_arbiter(&mut applied);
    unsafe {
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &PerfLimitMsg::pstate(0)), PERF_OK);
        assert_eq!(perf_arbiter_set_limit(h, s("boost"), &PerfLimitMsg::frequency(0, 300_000)), PERF_OK);

        let mut active = PerfWireMask255::default();
        assert_eq!(perf_arbiter_active_mask(h, &mut active), PERF_OK);
        assert_eq!(active.words[0], 0b11);

        let mut exclude = PerfWireMask255::default();
        exclude.words[0] = 0b01;
        let mut freqs = [0u32; MAX_CLK_DOMAINS];
        assert_eq!(perf_arbiter_preview(h, &exclude, 1, freqs.as_mut_ptr(), ptr::null_mut()), PERF_OK);
        assert_eq!(freqs[0], 300_000);

        // bit 255 lies past the mask
        exclude.words[7] = 0x8000_0000;
        assert_eq!(
            perf_arbiter_preview(h, &exclude, 1, freqs.as_mut_ptr(), ptr::null_mut()),
            PERF_OK
        );
        perf_arbiter_free(h);
    }
    assert!(applied.outputs.is_empty());
}

#[test]
fn ffi_snapshot_restore_roundtrip() {
    let mut applied = Applied::default();
    let h = new_arbiter(&mut applied);
    unsafe {
        assert_eq!(perf_arbiter_set_limit(h, s("thermal"), &PerfLimitMsg::pstate(0)), PERF_OK);
        assert_eq!(perf_arbiter_set_limit(h, s("boost"), &PerfLimitMsg::frequency(0, 150_000)), PERF_OK);
    }

    let snap = unsafe { perf_arbiter_snapshot(h) };
    assert!(!snap.ptr.is_null());
    assert!(snap.len >= 12); // magic + version + count

    let mut other_applied = Applied::default();
    let other = new_arbiter(&mut other_applied);
    let stats = unsafe { perf_arbiter_restore(other, snap.ptr as *const u8, snap.len, 0) };
    assert_eq!(stats.rc, PERF_OK);
    assert_eq!((stats.applied, stats.rejected), (2, 0));

    let mut status = PerfLimitStatus::default();
    unsafe {
        assert_eq!(perf_arbiter_limit_status(other, s("boost"), &mut status), PERF_OK);
    }
    assert_eq!((status.index, status.active), (1, 1));
    assert_eq!((status.tag, status.target, status.value), (PERF_LIMIT_FREQUENCY, 0, 150_000));

    let data = unsafe { std::slice::from_raw_parts(snap.ptr, snap.len) }.to_vec();
    let decoded = decode_snapshot(&data).unwrap();
    assert_eq!(decoded.inputs.len(), 2);
    assert_eq!(decoded.inputs[0].0, "boost");

    let mut corrupt = data.clone();
    corrupt[0] ^= 0xff;
    let stats = unsafe { perf_arbiter_restore(other, corrupt.as_ptr(), corrupt.len(), 1) };
    assert_eq!(stats.rc, PERF_ERR_BAD_MAGIC);
    let stats = unsafe { perf_arbiter_restore(other, data.as_ptr(), data.len() - 3, 1) };
    assert_eq!(stats.rc, PERF_ERR_TRUNCATED);

    unsafe { perf_arbiter_bytes_free(snap) };
    unsafe { perf_arbiter_free(h) };
    unsafe { perf_arbiter_free(other) };
}

#[test]
fn ffi_restore_skips_entries_outside_the_catalog() {
    let mut applied = Applied::default();
    let h = new_arbiter(&mut applied);

    let snap = SupervisorSnapshot {
        inputs: vec![
            ("boost".to_string(), ClientInput::FrequencyKHz { domain: 7, value: 100_000 }),
            ("thermal".to_string(), ClientInput::PstateIndex(1)),
        ],
    };
    let data = encode_snapshot(&snap);
    let stats = unsafe { perf_arbiter_restore(h, data.as_ptr(), data.len(), 0) };
    assert_eq!(stats.rc, PERF_OK);
    assert_eq!((stats.applied, stats.rejected), (1, 1));

    let mut status = PerfLimitStatus::default();
    unsafe {
        assert_eq!(perf_arbiter_limit_status(h, s("boost"), &mut status), PERF_OK);
        assert_eq!(status.active, 0);
        assert_eq!(perf_arbiter_arbitrate(h), PERF_OK);
        perf_arbiter_free(h);
    }
    assert_eq!(applied.outputs.len(), 1);
}
