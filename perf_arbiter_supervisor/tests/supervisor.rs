use perf_arbiter_core::{
    ApplyFlags, ArbOutputVersion, ArbitrationOutput, CatalogDesc, ChangeSequencer, ClientInput, ExportPayload,
    LimitFlags, PerfError, PropagationRegime, StaticCatalog,
};
use perf_arbiter_supervisor::*;

const CORE: usize = 0;
const MEM: usize = 1;

// core: 100 200 300 400 MHz, mem: 200 400 MHz, both on rail 0
const CATALOG_JSON: &str = r#"{
  "rails": [ { "idx": 0, "range": { "min": 600000, "max": 1000000 } } ],
  "domains": [
    { "idx": 0, "primary_rail": 0, "curves": [ { "rail": 0, "points": [
      { "freq_khz": 100000, "voltage_uv": 600000 },
      { "freq_khz": 200000, "voltage_uv": 700000 },
      { "freq_khz": 300000, "voltage_uv": 800000 },
      { "freq_khz": 400000, "voltage_uv": 900000 } ] } ] },
    { "idx": 1, "primary_rail": 0, "curves": [ { "rail": 0, "points": [
      { "freq_khz": 200000, "voltage_uv": 600000 },
      { "freq_khz": 400000, "voltage_uv": 800000 } ] } ] }
  ],
  "pstates": [
    { "freqs": [ { "domain": 0, "range": { "min": 100000, "max": 200000 } },
                 { "domain": 1, "range": { "min": 200000, "max": 200000 } } ] },
    { "freqs": [ { "domain": 0, "range": { "min": 300000, "max": 400000 } },
                 { "domain": 1, "range": { "min": 400000, "max": 400000 } } ] }
  ],
  "virtual_pstates": [ { "id": 3, "pstate": 0, "freqs": [ { "domain": 0, "freq_khz": 200000 } ] } ]
}"#;

const CFG_JSON: &str = r#"{
  "arbiter": { "caching_enabled": true },
  "limits": [
    { "name": "thermal", "flags": { "min": false, "max": true, "strict_propagation": false } },
    { "name": "user", "flags": { "min": true, "max": false, "strict_propagation": false }, "policy_id": 4 }
  ]
}"#;

#[derive(Default)]
struct Recorder {
    outputs: Vec<ArbitrationOutput>,
}

impl ChangeSequencer for Recorder {
    fn enqueue(&mut self, output: &ArbitrationOutput, _flags: ApplyFlags) -> perf_arbiter_core::Result<()> {
        self.outputs.push(*output);
        Ok(())
    }
}

fn catalog() -> StaticCatalog {
    let desc: CatalogDesc = serde_json::from_str(CATALOG_JSON).unwrap();
    StaticCatalog::new(desc).unwrap()
}

fn supervisor() -> PerfSupervisor<StaticCatalog, Recorder> {
    let cfg: SupervisorCfg = serde_json::from_str(CFG_JSON).unwrap();
    PerfSupervisor::new(catalog(), Recorder::default(), cfg).unwrap()
}

fn drive(sup: &mut PerfSupervisor<StaticCatalog, Recorder>) {
    let builder = BasicInputBuilder::default();
    let report = sup.ingest(
        &builder,
        &[
            LimitRequest::pstate("thermal", "tsensor", 0),
            LimitRequest::frequency("user", "app", CORE, 400_000),
        ],
    );
    assert_eq!(report.applied, 2);
    assert!(report.rejected.is_empty());
}

#[test]
fn cfg_registers_limits_in_priority_order() {
    let sup = supervisor();
    let status = sup.limit_status();
    assert_eq!(status.len(), 2);
    assert_eq!((status[0].name.as_str(), status[0].index), ("thermal", 0));
    assert_eq!((status[1].name.as_str(), status[1].index), ("user", 1));
    assert_eq!(status[0].flags, LimitFlags::CEILING);
    assert_eq!(status[1].policy_id, Some(4));
    assert!(status.iter().all(|s| !s.active && s.input == ClientInput::Disabled));
}

#[test]
fn duplicate_limit_is_rejected() {
    let mut sup = supervisor();
    let err = sup.register_limit(LimitDef::new("user", LimitFlags::PIN)).unwrap_err();
    assert_eq!(err, SupervisorError::DuplicateLimit("user".into()));
}

#[test]
fn ingest_and_arbitrate() {
    let mut sup = supervisor();
    drive(&mut sup);

    let out = sup.arbitrate().unwrap();
    // earlier ceiling holds the later floor
    assert_eq!(out.max.freq_khz[CORE], 200_000);
    assert_eq!(out.min.freq_khz[CORE], 200_000);
    assert_eq!(out.max.freq_khz[MEM], 200_000);
    assert_eq!(sup.sequencer().outputs.len(), 1);

    // unchanged inputs come from the cache
    sup.arbitrate().unwrap();
    assert_eq!(sup.sequencer().outputs.len(), 1);
    assert_eq!(sup.cache().hits(), 1);

    let status = sup.limit_status();
    assert!(status[0].active);
    assert_eq!(status[1].input, ClientInput::FrequencyKHz { domain: CORE, value: 400_000 });
}

#[test]
fn ingest_reports_rejections_and_keeps_going() {
    let mut sup = supervisor();
    let builder = BasicInputBuilder::default();
    let report = sup.ingest(
        &builder,
        &[
            LimitRequest::frequency("user", "app", 5, 100_000),
            LimitRequest::pstate("nope", "app", 0),
            LimitRequest::voltage("thermal", "pmic", 0, 1_200_000),
            LimitRequest::virtual_pstate("thermal", "app", 3),
        ],
    );
    assert_eq!(report.applied, 1);
    assert_eq!(report.rejected.len(), 3);
    assert!(matches!(
        report.rejected[0].1,
        SupervisorError::Limit { source: PerfError::InvalidArgument(_), .. }
    ));
    assert_eq!(report.rejected[1].1, SupervisorError::UnknownLimit("nope".into()));
    assert!(matches!(
        report.rejected[2].1,
        SupervisorError::Limit { source: PerfError::OutOfRange(_), .. }
    ));
    assert_eq!(sup.input("thermal").unwrap(), ClientInput::VirtualPstate(3));
    assert_eq!(sup.input("user").unwrap(), ClientInput::Disabled);
}

#[test]
fn normalizer_clamps_when_asked() {
    let cat = catalog();
    let strict = BasicInputBuilder::default();
    let lenient = BasicInputBuilder {
        normalizer: Normalizer { clamp_pstate: true, clamp_voltage: true },
    };

    let high_volt = LimitRequest::voltage("thermal", "pmic", 0, 1_200_000);
    assert!(matches!(strict.build(&high_volt, &cat), Err(PerfError::OutOfRange(_))));
    assert_eq!(
        lenient.build(&high_volt, &cat).unwrap(),
        ClientInput::VoltageuV { rail: 0, value: 1_000_000 }
    );

    let high_pstate = LimitRequest::pstate("thermal", "os", 9);
    assert!(matches!(strict.build(&high_pstate, &cat), Err(PerfError::InvalidArgument(_))));
    assert_eq!(lenient.build(&high_pstate, &cat).unwrap(), ClientInput::PstateIndex(1));

    assert!(strict.build(&LimitRequest::virtual_pstate("thermal", "os", 8), &cat).is_err());
    assert!(strict.build(&LimitRequest::frequency("user", "os", CORE, 0), &cat).is_err());
    assert_eq!(
        strict.build(&LimitRequest::disable("user", "os"), &cat).unwrap(),
        ClientInput::Disabled
    );
}

#[test]
fn snapshot_json_roundtrip_restores_same_output() {
    let mut sup = supervisor();
    drive(&mut sup);
    let expected = sup.arbitrate().unwrap();

    let snap = sup.snapshot();
    assert_eq!(
        snap.inputs,
        vec![
            ("thermal".to_string(), ClientInput::PstateIndex(0)),
            ("user".to_string(), ClientInput::FrequencyKHz { domain: CORE, value: 400_000 }),
        ]
    );

    let json = serde_json::to_string(&snap).unwrap();
    let back: SupervisorSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);

    let mut fresh = supervisor();
    let stats = fresh.restore(back);
    assert_eq!(stats, RestoreStats { applied: 2, rejected: 0 });
    let out = fresh.arbitrate().unwrap();
    assert_eq!(out.min, expected.min);
    assert_eq!(out.max, expected.max);
}

#[test]
fn restore_clears_but_merge_keeps() {
    let mut sup = supervisor();
    drive(&mut sup);

    let snap = SupervisorSnapshot {
        inputs: vec![
            ("thermal".to_string(), ClientInput::PstateIndex(1)),
            ("ghost".to_string(), ClientInput::PstateIndex(0)),
        ],
    };

    let stats = sup.restore_merge(snap.clone());
    assert_eq!(stats, RestoreStats { applied: 1, rejected: 1 });
    assert_eq!(sup.input("thermal").unwrap(), ClientInput::PstateIndex(1));
    assert!(!sup.input("user").unwrap().is_disabled());

    let stats = sup.restore(snap);
    assert_eq!(stats, RestoreStats { applied: 1, rejected: 1 });
    assert!(sup.input("user").unwrap().is_disabled());
    assert_eq!(sup.context().active_count(), 1);

    let only_user = sup.snapshot_filtered(|name, _| name == "user");
    assert!(only_user.inputs.is_empty());
}

#[test]
fn restore_rejects_inputs_the_catalog_does_not_know() {
    let mut sup = supervisor();
    drive(&mut sup);

    let snap = SupervisorSnapshot {
        inputs: vec![
            ("thermal".to_string(), ClientInput::FrequencyKHz { domain: 7, value: 100_000 }),
            ("thermal".to_string(), ClientInput::PstateIndex(5)),
            ("thermal".to_string(), ClientInput::VirtualPstate(9)),
            ("user".to_string(), ClientInput::VoltageuV { rail: 3, value: 700_000 }),
            ("user".to_string(), ClientInput::VoltageuV { rail: 0, value: 1_200_000 }),
        ],
    };
    let stats = sup.restore_merge(snap);
    assert_eq!(stats, RestoreStats { applied: 0, rejected: 5 });
    assert_eq!(sup.input("thermal").unwrap(), ClientInput::PstateIndex(0));
    assert_eq!(sup.input("user").unwrap(), ClientInput::FrequencyKHz { domain: CORE, value: 400_000 });
    assert!(sup.arbitrate().is_ok());

    let err = sup
        .set_input("thermal", ClientInput::FrequencyKHz { domain: 7, value: 100_000 })
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Limit { source: PerfError::InvalidArgument(_), .. }));
}

#[test]
fn unknown_topology_is_rejected_at_registration() {
    let mut sup = supervisor();
    let def = LimitDef {
        propagation: PropagationRegime::Topology(0),
        ..LimitDef::new("rail_pin", LimitFlags::STRICT_PIN)
    };
    let err = sup.register_limit(def).unwrap_err();
    assert_eq!(
        err,
        SupervisorError::Limit {
            limit: "rail_pin".into(),
            source: PerfError::InvalidIndex { kind: "propagation topology", index: 0 },
        }
    );
    assert_eq!(sup.limit_index("rail_pin"), None);
    assert_eq!(sup.limit_status().len(), 2);
}

#[test]
fn preview_excluding_does_not_apply() {
    let mut sup = supervisor();
    drive(&mut sup);

    let (min, max) = sup.preview_excluding(&["thermal"]).unwrap();
    assert_eq!(min.tuple.freq_khz[CORE], 400_000);
    assert_eq!(max.tuple.freq_khz[CORE], 400_000);
    assert!(sup.sequencer().outputs.is_empty());

    assert_eq!(
        sup.preview_excluding(&["missing"]).unwrap_err(),
        SupervisorError::UnknownLimit("missing".into())
    );
}

#[test]
fn export_follows_last_output() {
    let mut sup = supervisor();
    assert_eq!(sup.export(ArbOutputVersion::V1).unwrap(), None);

    drive(&mut sup);
    let out = sup.arbitrate().unwrap();
    let export = sup.export(ArbOutputVersion::V1).unwrap().unwrap();
    assert_eq!(export.header.version, ArbOutputVersion::V1);
    assert_eq!(export.header.size as usize, ArbOutputVersion::V1.payload_len());
    let ExportPayload::V1(payload) = export.payload;
    assert_eq!(payload.max, out.max);
    assert_eq!(payload.domain_mask, 0b11);
    assert_eq!(payload.sequence_stamp, out.sequence_stamp);
}

#[test]
fn locked_supervisor_does_not_apply() {
    let mut sup = supervisor();
    sup.set_locked(true);
    drive(&mut sup);
    let locked = sup.arbitrate().unwrap();
    assert!(sup.sequencer().outputs.is_empty());

    sup.set_locked(false);
    let applied = sup.arbitrate().unwrap();
    assert_eq!(sup.sequencer().outputs.len(), 1);
    assert_eq!(applied.max, locked.max);
    assert!(applied.sequence_stamp > locked.sequence_stamp);
}

#[test]
fn pool_exhaustion_names_the_limit() {
    let mut sup = supervisor();
    let capacity = sup.context().pool_capacity();
    for i in 0..=capacity {
        sup.register_limit(LimitDef::new(format!("cap{i}"), LimitFlags::CEILING)).unwrap();
    }
    for i in 0..capacity {
        sup.set_input(&format!("cap{i}"), ClientInput::PstateIndex(1)).unwrap();
    }
    let err = sup.set_input(&format!("cap{capacity}"), ClientInput::PstateIndex(0)).unwrap_err();
    assert_eq!(
        err,
        SupervisorError::Limit {
            limit: format!("cap{capacity}"),
            source: PerfError::NoFreeMem { capacity },
        }
    );
    assert_eq!(err.to_string(), format!("limit `cap{capacity}`: no free active slot (capacity {capacity})"));
}
