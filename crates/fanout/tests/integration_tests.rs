mod fixtures;

use fanout::effects::{CompressorSettings, EffectStage};
use fanout::plan::NodeSettings;
use fanout::{
    ConfigurationError, DiscoveryPredicate, EffectChain, EffectSettings, GenerationState,
    MonitorSampler, NodeKind, OutputChannel, PipelineError, PipelineEvent, PipelineOp,
    PipelineService, Preset, Reconciler, RoutingMode, RoutingTarget, TeardownSequence,
};
use fanoutconf::FanoutConfig;
use fixtures::{FakePactl, FRONT_DEVICE, OTHER_DEVICE, REAR_DEVICE};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn reconciler(fake: &Arc<FakePactl>) -> Reconciler {
    Reconciler::new(FanoutConfig::default(), fake.clone())
}

fn compressor_only() -> EffectChain {
    let mut chain = EffectChain::bypass();
    chain.compressor = EffectStage::on(CompressorSettings {
        ratio: 4.0,
        ..CompressorSettings::default()
    });
    chain
}

fn front_only() -> Vec<RoutingTarget> {
    vec![
        RoutingTarget::new(OutputChannel::Front, FRONT_DEVICE),
        RoutingTarget::disabled(OutputChannel::RearLeft),
        RoutingTarget::disabled(OutputChannel::RearRight),
    ]
}

/// Modules whose arguments name one of our nodes.
fn ours(fake: &FakePactl) -> Vec<String> {
    let names = FanoutConfig::default().names;
    let owned = names.owned_names();
    fake.modules()
        .into_iter()
        .filter(|(_, m)| {
            m.args.iter().any(|a| {
                owned.iter().any(|name| {
                    a == &format!("sink_name={name}")
                        || a == &format!("source_name={name}")
                        || a == &format!("source={name}")
                })
            })
        })
        .map(|(_, m)| m.name)
        .collect()
}

#[test]
fn test_compressor_to_front_creates_six_modules() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();

    let report = r.apply(&plan).unwrap();

    assert_eq!(report.created.len(), 6);
    assert!(report.reused_base.is_none());
    assert_eq!(r.state(), GenerationState::Live);
    assert_eq!(fake.modules_named("module-null-sink").len(), 1);
    assert_eq!(fake.modules_named("module-ladspa-sink").len(), 1);
    assert_eq!(fake.modules_named("module-remap-source").len(), 2);

    let loopbacks = fake.modules_named("module-loopback");
    assert_eq!(loopbacks.len(), 2);
    assert!(loopbacks.iter().all(|m| m.arg("sink") == Some(FRONT_DEVICE)));

    let compressor = &fake.modules_named("module-ladspa-sink")[0];
    assert_eq!(compressor.arg("label"), Some("sc4"));
    assert_eq!(compressor.arg("control"), Some("1,5,100,-20,4,6,0"));
    assert_eq!(compressor.arg("sink_master"), Some("splitter"));
}

#[test]
fn test_apply_is_idempotent() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();

    r.apply(&plan).unwrap();
    let first = fake.topology();
    let second_report = r.apply(&plan).unwrap();

    assert_eq!(fake.topology(), first);
    assert_eq!(second_report.stopped.unloaded_count(), 6);
    assert_eq!(second_report.generation, 2);
}

#[test]
fn test_apply_then_stop_leaves_nothing_of_ours() {
    let fake = FakePactl::new().with_foreign_null_sink();
    let before = fake.topology();
    let mut r = reconciler(&fake);

    let mut chain = EffectChain::default();
    chain.equalizer.enabled = true;
    let targets = vec![
        RoutingTarget::new(OutputChannel::Front, FRONT_DEVICE),
        RoutingTarget::new(OutputChannel::RearLeft, REAR_DEVICE),
        RoutingTarget::new(OutputChannel::RearRight, OTHER_DEVICE),
    ];
    let plan = r.plan(&chain, &targets, RoutingMode::Upmix).unwrap();
    r.apply(&plan).unwrap();
    assert!(!ours(&fake).is_empty());

    let report = r.stop();

    assert!(report.is_clean());
    assert!(ours(&fake).is_empty());
    assert_eq!(fake.topology(), before);
    assert_eq!(r.state(), GenerationState::Stopped);
    assert!(r.current().is_none());
}

#[test]
fn test_stop_unloads_loopbacks_before_sinks() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let mut chain = EffectChain::default();
    chain.equalizer.enabled = true;
    let plan = r.plan(&chain, &front_only(), RoutingMode::Stereo).unwrap();
    r.apply(&plan).unwrap();

    let names: HashMap<String, String> = fake
        .modules()
        .into_iter()
        .map(|(id, m)| (id.0, m.name))
        .collect();
    fake.clear_calls();
    r.stop();

    let order: Vec<&str> = fake
        .calls_to("unload-module")
        .iter()
        .map(|c| names[&c[1]].as_str())
        .collect();
    assert_eq!(
        order,
        vec![
            "module-loopback",
            "module-loopback",
            "module-remap-source",
            "module-remap-source",
            "module-ladspa-sink",
            "module-ladspa-sink",
            "module-ladspa-sink",
            "module-null-sink",
        ]
    );
}

#[test]
fn test_failed_creation_rolls_back() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();

    // base sink and compressor load, the left channel source does not
    fake.fail_load_at(3);
    let err = r.apply(&plan).unwrap_err();

    match err {
        PipelineError::PartialPipeline {
            stage, completed, ..
        } => {
            assert_eq!(stage, "splitter_left");
            assert_eq!(completed.len(), 2);
        }
        other => panic!("expected partial pipeline, got {other:?}"),
    }
    assert_eq!(r.state(), GenerationState::Stopped);
    assert!(r.current().is_none());
    assert!(ours(&fake).is_empty());
    assert!(!fake.has_sink("splitter"));
}

#[test]
fn test_all_targets_disabled_makes_no_calls() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = fanout::BuildPlan {
        nodes: vec![],
        targets: vec![
            RoutingTarget::disabled(OutputChannel::Front),
            RoutingTarget::disabled(OutputChannel::RearLeft),
            RoutingTarget::disabled(OutputChannel::RearRight),
        ],
        mode: RoutingMode::Stereo,
    };
    fake.clear_calls();

    let err = r.apply(&plan).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::NoEnabledTargets)
    ));
    assert!(fake.calls().is_empty());
}

#[test]
fn test_existing_null_sink_is_reused_and_kept() {
    let fake = FakePactl::new().with_foreign_null_sink();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();

    let report = r.apply(&plan).unwrap();

    assert_eq!(report.reused_base.as_deref(), Some("null"));
    assert_eq!(fake.modules_named("module-null-sink").len(), 1);
    assert!(fake
        .calls_to("load-module")
        .iter()
        .all(|c| c[1] != "module-null-sink"));
    let remaps = fake.modules_named("module-remap-source");
    assert!(remaps.iter().all(|m| m.arg("master") == Some("null.monitor")));
    assert_eq!(
        fake.modules_named("module-ladspa-sink")[0].arg("sink_master"),
        Some("null")
    );

    r.stop();
    assert!(fake.has_sink("null"));
    assert_eq!(fake.modules_named("module-null-sink").len(), 1);
}

#[test]
fn test_existing_conventional_base_is_reused_verbatim() {
    let fake = FakePactl::new().with_unmanaged_sink("splitter");
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();

    let report = r.apply(&plan).unwrap();

    assert_eq!(report.reused_base.as_deref(), Some("splitter"));
    assert!(report.created[0].module.is_none());
    assert!(fake.modules_named("module-null-sink").is_empty());
    let remaps = fake.modules_named("module-remap-source");
    assert_eq!(remaps.len(), 2);
    assert!(remaps.iter().all(|m| m.arg("master") == Some("splitter.monitor")));
    assert_eq!(
        fake.modules_named("module-ladspa-sink")[0].arg("sink_master"),
        Some("splitter")
    );

    r.stop();
    assert!(fake.has_sink("splitter"));
    assert!(ours(&fake).is_empty());
}

#[tokio::test]
async fn test_monitor_follows_adopted_fallback_base() {
    let fake = FakePactl::new().with_foreign_null_sink();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    let report = r.apply(&plan).unwrap();
    assert_eq!(report.reused_base.as_deref(), Some("null"));

    let sampler = MonitorSampler::for_base(r.catalog().clone(), &r.config().names)
        .with_interval(Duration::from_millis(5));
    let (mut rx, _handle) = sampler.spawn();

    rx.changed().await.unwrap();
    let sample = rx.borrow().latest().cloned().unwrap();
    assert_eq!(sample.source.as_deref(), Some("null.monitor"));
    assert!(sample.snapshot.is_some());
    assert_eq!(sample.level(), 100.0);
}

#[test]
fn test_non_finite_control_rejected_before_any_call() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let mut plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    for node in &mut plan.nodes {
        if let NodeSettings::Effect {
            settings: EffectSettings::Compressor(c),
            ..
        } = &mut node.settings
        {
            c.ratio = f64::NAN;
        }
    }
    fake.clear_calls();

    let err = r.apply(&plan).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::NonFiniteControl { .. })
    ));
    assert!(fake.calls().is_empty());
}

#[test]
fn test_vocal_preset_builds_per_band_dynamics() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&Preset::Vocal.chain(), &front_only(), RoutingMode::Stereo).unwrap();

    let report = r.apply(&plan).unwrap();

    assert_eq!(report.default_sink.as_deref(), Some("multicomp"));
    let ladspa = fake.modules_named("module-ladspa-sink");
    let labels: Vec<_> = ladspa.iter().filter_map(|m| m.arg("label")).collect();
    assert_eq!(labels, vec!["fastLookaheadLimiter", "mbeq", "ZaMultiCompX2"]);
    let multiband = &ladspa[2];
    assert_eq!(multiband.arg("sink_name"), Some("multicomp"));
    assert_eq!(multiband.arg("sink_master"), Some("eq"));
    assert_eq!(
        multiband.arg("control"),
        Some("25,15,5,125,80,50,2,2,1,2,4,2,-20,-18,-20,0,2,0,200,2000,0,1,1,1,1,0,0,0")
    );

    assert!(r.stop().is_clean());
    assert!(ours(&fake).is_empty());
}

#[test]
fn test_shared_channel_sources_are_not_reported_as_ambiguous() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let targets = vec![
        RoutingTarget::new(OutputChannel::Front, FRONT_DEVICE),
        RoutingTarget::new(OutputChannel::RearLeft, REAR_DEVICE),
        RoutingTarget::new(OutputChannel::RearRight, OTHER_DEVICE),
    ];
    let plan = r.plan(&EffectChain::bypass(), &targets, RoutingMode::Stereo).unwrap();
    r.apply(&plan).unwrap();

    let report = r.stop();

    let shared: Vec<_> = report
        .ambiguities
        .iter()
        .filter(|a| a.matches.len() == 2)
        .collect();
    assert_eq!(shared.len(), 2);
    assert!(report.ambiguities.iter().all(|a| !a.is_unexpected()));
    assert_eq!(report.unloaded_count(), 4 + 2 + 1);
}

#[test]
fn test_stop_with_custom_predicates() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    r.apply(&plan).unwrap();

    let loopbacks_only = TeardownSequence::new(vec![DiscoveryPredicate::from_patterns(
        NodeKind::Loopback,
        vec!["module-loopback".to_string(), "source=splitter_".to_string()],
    )
    .unwrap()
    .allowing(4)]);
    let report = r.stop_with(&loopbacks_only);

    assert_eq!(report.unloaded_count(), 2);
    assert!(report.ambiguities.iter().all(|a| !a.is_unexpected()));
    assert!(fake.modules_named("module-loopback").is_empty());
    assert_eq!(fake.modules_named("module-remap-source").len(), 2);
    assert_eq!(r.state(), GenerationState::Stopped);

    r.stop();
    assert!(ours(&fake).is_empty());
}

#[test]
fn test_default_sink_and_gains_are_applied() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let targets = vec![
        RoutingTarget::new(OutputChannel::Front, FRONT_DEVICE)
            .with_volume(80.0)
            .with_balance(50.0),
        RoutingTarget::new(OutputChannel::RearLeft, REAR_DEVICE).with_volume(120.0),
        RoutingTarget::disabled(OutputChannel::RearRight),
    ];
    let plan = r.plan(&compressor_only(), &targets, RoutingMode::Stereo).unwrap();

    let report = r.apply(&plan).unwrap();

    assert_eq!(report.default_sink.as_deref(), Some("compressor"));
    assert_eq!(fake.default_sink().as_deref(), Some("compressor"));
    assert_eq!(
        fake.volume(FRONT_DEVICE),
        Some(vec!["40%".to_string(), "80%".to_string()])
    );
    assert_eq!(fake.volume(REAR_DEVICE), Some(vec!["120%".to_string()]));
    assert!(report.gains.failed.is_empty());
}

#[test]
fn test_set_gains_without_rebuild() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    r.apply(&plan).unwrap();
    fake.clear_calls();

    let report = r.set_gains(&[RoutingTarget::new(OutputChannel::Front, FRONT_DEVICE).with_volume(200.0)]);

    assert_eq!(report.applied.len(), 1);
    // front is clamped to the configured maximum
    assert_eq!(
        fake.volume(FRONT_DEVICE),
        Some(vec!["150%".to_string(), "150%".to_string()])
    );
    assert!(fake.calls_to("load-module").is_empty());
    assert!(fake.calls_to("unload-module").is_empty());
}

#[test]
fn test_leftovers_from_crashed_run_are_cleaned() {
    let fake = FakePactl::new();
    fake.preload(
        "module-null-sink",
        &["sink_name=splitter", "sink_properties=device.description=AudioSplitter"],
    );
    fake.preload(
        "module-remap-source",
        &["source_name=splitter_left", "master=splitter.monitor", "channels=1"],
    );
    let rear = format!("sink={REAR_DEVICE}");
    fake.preload("module-loopback", &["source=splitter_left", rear.as_str()]);

    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    let report = r.apply(&plan).unwrap();

    assert_eq!(report.stopped.unloaded_count(), 3);
    assert!(report.reused_base.is_none());
    assert_eq!(ours(&fake).len(), 6);
    assert!(fake
        .modules_named("module-loopback")
        .iter()
        .all(|m| m.arg("sink") == Some(FRONT_DEVICE)));
}

#[test]
fn test_stop_with_nothing_running() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);

    let report = r.stop();

    assert_eq!(report.unloaded_count(), 0);
    assert!(report.is_clean());
    assert!(report.ambiguities.iter().all(|a| a.is_missing()));
    assert_eq!(r.state(), GenerationState::Stopped);
}

#[test]
fn test_stop_survives_unload_failures() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    r.apply(&plan).unwrap();

    fake.fail_unloads(true);
    let report = r.stop();

    assert!(!report.is_clean());
    assert_eq!(report.unloaded_count(), 0);
    assert_eq!(r.state(), GenerationState::Stopped);

    fake.fail_unloads(false);
    assert!(r.stop().is_clean());
    assert!(ours(&fake).is_empty());
}

#[test]
fn test_upmix_routes_rear_from_mix() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let targets = vec![
        RoutingTarget::disabled(OutputChannel::Front),
        RoutingTarget::new(OutputChannel::RearLeft, REAR_DEVICE),
        RoutingTarget::new(OutputChannel::RearRight, OTHER_DEVICE),
    ];
    let plan = r.plan(&Preset::Night.chain(), &targets, RoutingMode::Upmix).unwrap();

    r.apply(&plan).unwrap();

    let loopbacks = fake.modules_named("module-loopback");
    assert_eq!(loopbacks.len(), 2);
    assert!(loopbacks.iter().all(|m| m.arg("source") == Some("splitter_mix")));
    assert_eq!(fake.modules_named("module-remap-source").len(), 3);
}

#[test]
fn test_catalog_hides_reserved_sinks() {
    let fake = FakePactl::new().with_foreign_null_sink();
    let mut r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    r.apply(&plan).unwrap();

    let names: Vec<String> = r
        .catalog()
        .list_output_devices()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec![FRONT_DEVICE, REAR_DEVICE, OTHER_DEVICE]);
    assert_eq!(
        r.catalog().resolve_display_name(REAR_DEVICE),
        "Navi 21 HDMI Audio Digital Stereo"
    );
}

#[tokio::test]
async fn test_service_emits_events_in_order() {
    let fake = FakePactl::new();
    let r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    let service = PipelineService::new(r);
    let mut events = service.subscribe();

    let report = service.apply(plan).await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(service.state().await, GenerationState::Live);

    service.cancel().await;
    assert_eq!(service.state().await, GenerationState::Stopped);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            PipelineEvent::Started { op: PipelineOp::Apply },
            PipelineEvent::Succeeded {
                op: PipelineOp::Apply,
                generation: Some(1)
            },
            PipelineEvent::Started { op: PipelineOp::Cancel },
            PipelineEvent::Succeeded {
                op: PipelineOp::Cancel,
                generation: None
            },
        ]
    );

    let json = serde_json::to_value(&seen[1]).unwrap();
    assert_eq!(json["event"], "succeeded");
    assert_eq!(json["op"], "apply");
}

#[tokio::test]
async fn test_service_reports_failures_as_events() {
    let fake = FakePactl::new();
    let r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    let service = PipelineService::new(r);
    let mut events = service.subscribe();

    fake.fail_load_at(1);
    assert!(service.apply(plan).await.is_err());

    let _started = events.recv().await.unwrap();
    match events.recv().await.unwrap() {
        PipelineEvent::Failed { op, error } => {
            assert_eq!(op, PipelineOp::Apply);
            assert!(error.contains("splitter"), "{error}");
        }
        other => panic!("expected failure event, got {other:?}"),
    }
    assert_eq!(service.state().await, GenerationState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_applies_are_serialized() {
    let fake = FakePactl::new();
    let r = reconciler(&fake);
    let plan = r.plan(&compressor_only(), &front_only(), RoutingMode::Stereo).unwrap();
    let service = PipelineService::new(r);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let plan = plan.clone();
            tokio::spawn(async move { service.apply(plan).await })
        })
        .collect();

    let mut generations = Vec::new();
    for handle in handles {
        generations.push(handle.await.unwrap().unwrap().generation);
    }
    generations.sort();

    assert_eq!(generations, vec![1, 2, 3, 4]);
    assert_eq!(ours(&fake).len(), 6);
    assert_eq!(fake.modules_named("module-null-sink").len(), 1);
}

#[tokio::test]
async fn test_service_reads_bypass_the_queue() {
    let fake = FakePactl::new();
    let service = PipelineService::new(reconciler(&fake));

    let devices = service.output_devices().await;
    assert_eq!(devices.len(), 3);
    assert!(service.active_modules().await.is_empty());
    assert_eq!(
        service.set_gains(front_only()).await.unwrap().applied.len(),
        1
    );
}

#[test]
fn test_kinds_cover_every_created_node() {
    let fake = FakePactl::new();
    let mut r = reconciler(&fake);
    let plan = r.plan(&EffectChain::default(), &front_only(), RoutingMode::Stereo).unwrap();
    let report = r.apply(&plan).unwrap();

    let kinds: Vec<NodeKind> = report.created.iter().map(|n| n.spec.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NodeKind::BaseSink,
            NodeKind::EffectSink,
            NodeKind::EffectSink,
            NodeKind::ChannelSource,
            NodeKind::ChannelSource,
            NodeKind::Loopback,
            NodeKind::Loopback,
        ]
    );
    assert!(report.created.iter().all(|n| n.module.is_some()));
}
