// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use common::{entity_with, Log, Scan, Recorder, SCAN};
use stride_kcc::{BeginMove, KccError, KccFeatures, KccSettings, Kcc, KccData, Processor, ProcessorRef, StageKind};

const SCAN_ENTRY: &str = "Custom(scan)";

struct Marker;
impl Processor for Marker {
    fn priority(&self, _kcc: &Kcc) -> f32 {
        1.0
    }

    fn handles_stage(&self, kind: StageKind) -> bool {
        kind == SCAN
    }
}

#[test]
fn test_dispatch_order_is_priority_then_category_then_registration() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 5.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 5.0, &[SCAN], &log);
    let p3 = Recorder::new("P3", 10.0, &[SCAN], &log);
    let l2 = Recorder::new("L2", 5.0, &[SCAN], &log);
    let e1 = Recorder::new("E1", 5.0, &[SCAN], &log);

    // Registered in reverse category order so only the rules decide.
    let external = e1.clone();
    kcc.set_external_processors(Some(Box::new(move |out: &mut Vec<ProcessorRef>| {
        out.push(external.clone());
    })));
    assert!(kcc.add_local_processor(p3.clone(), &mut data));
    assert!(kcc.add_local_processor(l2.clone(), &mut data));

    let (collider_entity, _p2_provider) = entity_with(2, p2.clone());
    assert!(kcc.add_collision(
        &collider_entity,
        collider_entity.interaction_provider(),
        collider_entity.collider(),
        &mut data
    ));

    let (modifier_entity, _p1_provider) = entity_with(1, p1.clone());
    assert!(kcc.add_modifier(&modifier_entity, &mut data, false));

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["P3", "P1", "P2", "L2", "E1"]);

    // Same inputs, same order.
    log.clear();
    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["P3", "P1", "P2", "L2", "E1"]);
}

#[test]
fn test_processor_in_two_categories_runs_once() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let shared = Recorder::new("S", 1.0, &[SCAN], &log);
    let (entity, _provider) = entity_with(1, shared.clone());
    assert!(kcc.add_modifier(&entity, &mut data, false));
    assert!(kcc.add_local_processor(shared.clone(), &mut data));

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["S"]);
}

#[test]
fn test_processors_without_the_stage_are_skipped() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let taking_part = Recorder::new("A", 1.0, &[SCAN], &log);
    let other = Recorder::new("B", 9.0, &[StageKind::Custom("other")], &log);
    kcc.add_local_processor(taking_part, &mut data);
    kcc.add_local_processor(other, &mut data);

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["A"]);
}

#[test]
fn test_suppress_all_pending_except_one() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 5.0, &[SCAN], &log);
    let p3 = Recorder::new("P3", 1.0, &[SCAN], &log);
    let p4 = Recorder::new("P4", 3.0, &[SCAN], &log);

    let keep = p3.clone();
    p1.set_hook(move |_, kcc, _| {
        kcc.suppress_processors_except(&*keep, false).unwrap();
    });

    for p in [&p1, &p2, &p3, &p4] {
        kcc.add_local_processor(p.clone(), &mut data);
    }

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["P1", "P3"]);
}

#[test]
fn test_suppressing_executed_processor_is_a_no_op() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 5.0, &[SCAN], &log);

    let first = p1.clone();
    let hook_log = log.clone();
    p2.set_hook(move |_, kcc, _| {
        let suppressed = kcc.suppress_processor(&*first, false).unwrap();
        hook_log.push(format!("suppressed={suppressed}"));
    });

    kcc.add_local_processor(p1.clone(), &mut data);
    kcc.add_local_processor(p2.clone(), &mut data);

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.entries()[2..], ["P1:Custom(scan)", "P2:Custom(scan)", "suppressed=false"]);
}

#[test]
fn test_suppression_in_future_stages_reaches_nested_stages() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 5.0, &[SCAN], &log);

    let target = p2.clone();
    p1.set_hook(move |_, kcc, data| {
        if kcc.stage_depth() == 1 {
            kcc.suppress_processor(&*target, true).unwrap();
            kcc.execute_stage(&mut Scan, data).unwrap();
        }
    });

    kcc.add_local_processor(p1.clone(), &mut data);
    kcc.add_local_processor(p2.clone(), &mut data);

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["P1", "P1"]);

    // A new explicit stage rebuilds the cache.
    log.clear();
    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.of(SCAN_ENTRY), ["P1", "P1"]);
    assert!(kcc.cached_processors().iter().flatten().count() == 2);
}

#[test]
fn test_nested_stage_completes_before_outer_resumes() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 5.0, &[SCAN], &log);

    let pending = p2.clone();
    p1.set_hook(move |_, kcc, data| {
        if kcc.stage_depth() == 1 {
            kcc.execute_stage(&mut Scan, data).unwrap();
            assert_eq!(kcc.stage_depth(), 1);
            assert!(kcc.has_pending_processor(&*pending).unwrap());
        }
    });

    let executed = p1.clone();
    let hook_log = log.clone();
    p2.set_hook(move |_, kcc, _| {
        assert!(kcc.has_executed_processor(&*executed).unwrap());
        hook_log.push(format!("P2@{}", kcc.stage_depth()));
    });

    kcc.add_local_processor(p1.clone(), &mut data);
    kcc.add_local_processor(p2.clone(), &mut data);
    log.clear();

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(
        log.entries(),
        [
            "P1:Custom(scan)",
            "P1:Custom(scan)",
            "P2:Custom(scan)",
            "P2@2",
            "P2:Custom(scan)",
            "P2@1",
        ]
    );
    assert_eq!(kcc.stage_depth(), 0);
}

#[test]
fn test_builtin_stage_cannot_be_executed_explicitly() {
    let mut kcc = common::kcc();
    let mut data = KccData::default();

    assert_eq!(
        kcc.execute_stage(&mut BeginMove, &mut data),
        Err(KccError::ReservedStage(StageKind::BeginMove))
    );
}

#[test]
fn test_nested_stage_overflow_is_reported() {
    let log = Log::default();
    let mut kcc = common::kcc_with(KccSettings {
        max_nested_stages: 3,
        ..Default::default()
    });
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 1.0, &[SCAN], &log);
    let hook_log = log.clone();
    p1.set_hook(move |_, kcc, data| {
        if let Err(e) = kcc.execute_stage(&mut Scan, data) {
            hook_log.push(format!("error:{e}"));
        }
    });
    kcc.add_local_processor(p1, &mut data);

    kcc.execute_stage(&mut Scan, &mut data).unwrap();

    let errors: Vec<_> = log.entries().into_iter().filter(|e| e.starts_with("error:")).collect();
    assert_eq!(
        errors,
        [format!("error:{}", KccError::NestedStageOverflow { limit: 3 })]
    );
    assert_eq!(log.of(SCAN_ENTRY).len(), 3);
    assert_eq!(kcc.stage_depth(), 0);
}

#[test]
fn test_post_processes_run_after_every_processor() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 5.0, &[SCAN], &log);

    let hook_log = log.clone();
    p1.set_hook(move |_, kcc, _| {
        let outer = hook_log.clone();
        kcc.enqueue_post_process(move |kcc, _| {
            outer.push("post:1");
            let inner = outer.clone();
            kcc.enqueue_post_process(move |_, _| inner.push("post:2")).unwrap();
        })
        .unwrap();
    });

    kcc.add_local_processor(p1.clone(), &mut data);
    kcc.add_local_processor(p2.clone(), &mut data);
    log.clear();

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(log.entries(), ["P1:Custom(scan)", "P2:Custom(scan)", "post:1", "post:2"]);
}

#[test]
fn test_post_process_in_outer_stage_runs_with_outer_stage() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    const OUTER: StageKind = StageKind::Custom("outer");

    struct Outer;
    impl stride_kcc::Stage for Outer {
        fn kind(&self) -> StageKind {
            OUTER
        }

        fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
            processor.custom_stage(self, kcc, data);
        }
    }

    let p1 = Recorder::new("P1", 1.0, &[OUTER, SCAN], &log);
    let hook_log = log.clone();
    p1.set_hook(move |kind, kcc, data| {
        if kind == OUTER {
            kcc.execute_stage(&mut Scan, data).unwrap();
            hook_log.push("outer:done");
        } else {
            let post = hook_log.clone();
            let queued = kcc
                .enqueue_post_process_in_stage(OUTER, move |_, _| post.push("post"))
                .unwrap();
            assert!(queued);
        }
    });
    kcc.add_local_processor(p1, &mut data);
    log.clear();

    kcc.execute_stage(&mut Outer, &mut data).unwrap();
    assert_eq!(
        log.entries(),
        ["P1:Custom(outer)", "P1:Custom(scan)", "outer:done", "post"]
    );
}

#[test]
fn test_stage_queries_require_an_active_stage() {
    let mut kcc = common::kcc();
    let marker = Marker;

    assert_eq!(
        kcc.has_pending_processor(&marker),
        Err(KccError::NoActiveStage {
            operation: "has_pending_processor"
        })
    );
    assert!(kcc.get_executed_processor::<Marker>().is_err());
    assert!(kcc.suppress_processors_of::<Marker>(false).is_err());
    assert!(kcc.enqueue_post_process(|_, _| {}).is_err());
    assert!(kcc.enforce_feature(KccFeatures::CCD).is_err());
}

#[test]
fn test_typed_pending_and_executed_queries() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[SCAN], &log);
    let p2 = Recorder::new("P2", 0.0, &[SCAN], &log);

    let hook_log = log.clone();
    p1.set_hook(move |_, kcc, _| {
        let marker = kcc.get_pending_processor::<Marker>().unwrap();
        hook_log.push(format!("pending_marker={}", marker.is_some()));
        hook_log.push(format!("executed_marker={}", kcc.has_executed_processor_of::<Marker>().unwrap()));
    });
    let hook_log = log.clone();
    p2.set_hook(move |_, kcc, _| {
        let mut executed = Vec::new();
        kcc.get_executed_processors::<Recorder>(&mut executed).unwrap();
        let labels: Vec<_> = executed.iter().map(|r| r.label).collect();
        hook_log.push(format!("executed={labels:?}"));
        hook_log.push(format!("executed_marker={}", kcc.has_executed_processor_of::<Marker>().unwrap()));
    });

    kcc.add_local_processor(p1.clone(), &mut data);
    kcc.add_local_processor(std::sync::Arc::new(Marker), &mut data);
    kcc.add_local_processor(p2.clone(), &mut data);
    log.clear();

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(
        log.entries(),
        [
            "P1:Custom(scan)",
            "pending_marker=true",
            "executed_marker=false",
            "P2:Custom(scan)",
            "executed=[\"P1\"]",
            "executed_marker=true",
        ]
    );
}

#[test]
fn test_features_can_only_change_in_begin_move() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 1.0, &[SCAN, StageKind::BeginMove], &log);
    let hook_log = log.clone();
    p1.set_hook(move |kind, kcc, _| {
        let result = kcc.suppress_feature(KccFeatures::CCD);
        hook_log.push(format!("{kind}={}", result.is_ok()));
    });
    kcc.add_local_processor(p1, &mut data);

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert!(kcc.has_active_feature(KccFeatures::CCD));

    kcc.move_predicted(&mut data).unwrap();
    assert!(!kcc.has_active_feature(KccFeatures::CCD));

    let results: Vec<_> = log.entries().into_iter().filter(|e| e.contains('=')).collect();
    assert_eq!(results, ["Custom(scan)=false", "BeginMove=true", "Stay=false"]);
}

#[test]
fn test_stay_dispatch_supports_frame_queries() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let p1 = Recorder::new("P1", 10.0, &[], &log);
    let p2 = Recorder::new("P2", 1.0, &[], &log);

    let later = p2.clone();
    let hook_log = log.clone();
    p1.set_hook(move |kind, kcc, _| {
        if kind == StageKind::Stay {
            hook_log.push(format!("pending={}", kcc.has_pending_processor(&*later).unwrap()));
        }
    });

    kcc.add_local_processor(p1.clone(), &mut data);
    kcc.add_local_processor(p2.clone(), &mut data);
    log.clear();

    kcc.move_predicted(&mut data).unwrap();
    assert_eq!(log.entries(), ["P1:Stay", "pending=true", "P2:Stay"]);
}

const INNER: StageKind = StageKind::Custom("inner");

/// A second custom stage, for nesting a different kind between two scans.
struct Inner;
impl stride_kcc::Stage for Inner {
    fn kind(&self) -> StageKind {
        INNER
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.custom_stage(self, kcc, data);
    }
}

/// A logging processor of its own type, for the typed stage-scoped calls.
struct Typed {
    log: Log,
}

impl Processor for Typed {
    fn priority(&self, _kcc: &Kcc) -> f32 {
        1.0
    }

    fn handles_stage(&self, kind: StageKind) -> bool {
        kind == SCAN || kind == INNER
    }

    fn custom_stage(&self, stage: &mut dyn stride_kcc::Stage, _kcc: &mut Kcc, _data: &mut KccData) {
        self.log.push(format!("Y:{}", stage.kind()));
    }
}

#[test]
fn test_stage_scoped_queries_and_suppression_skip_other_kinds() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let d = Recorder::new("D", 10.0, &[SCAN, INNER], &log);
    let t = Recorder::new("T", 5.0, &[SCAN, INNER], &log);
    let o = Recorder::new("O", 3.0, &[SCAN], &log);
    let y = std::sync::Arc::new(Typed { log: log.clone() });

    let executed = d.clone();
    let outer_only = o.clone();
    let hook_log = log.clone();
    t.set_hook(move |_, kcc, data| match kcc.stage_depth() {
        1 => kcc.execute_stage(&mut Inner, data).unwrap(),
        2 => kcc.execute_stage(&mut Scan, data).unwrap(),
        _ => {
            assert!(kcc.has_pending_processor_in_stage(SCAN, &*outer_only).unwrap());
            assert!(!kcc.has_pending_processor_in_stage(INNER, &*outer_only).unwrap());
            assert!(kcc.has_pending_processor_of_in_stage::<Typed>(INNER).unwrap());
            assert!(kcc.has_executed_processor_in_stage(INNER, &*executed).unwrap());
            assert!(!kcc.has_executed_processor_of_in_stage::<Typed>(SCAN).unwrap());

            let mut pending = Vec::new();
            kcc.get_pending_processors_in_stage::<Recorder>(SCAN, &mut pending).unwrap();
            assert_eq!(pending.iter().map(|r| r.label).collect::<Vec<_>>(), ["O", "O"]);
            kcc.get_pending_processors_in_stage::<Recorder>(INNER, &mut pending).unwrap();
            assert!(pending.is_empty());

            let mut ran = Vec::new();
            kcc.get_executed_processors_in_stage::<Recorder>(SCAN, &mut ran).unwrap();
            assert_eq!(ran.iter().map(|r| r.label).collect::<Vec<_>>(), ["D", "D"]);

            assert!(kcc.get_pending_processor_in_stage::<Typed>(INNER).unwrap().is_some());
            assert_eq!(
                kcc.get_executed_processor_in_stage::<Recorder>(INNER).unwrap().map(|r| r.label),
                Some("D")
            );

            assert!(kcc.suppress_processor_in_stage(SCAN, &*outer_only).unwrap());
            assert!(kcc.suppress_processors_of_in_stage::<Typed>(SCAN).unwrap());
            assert!(!kcc.has_pending_processor_of_in_stage::<Typed>(SCAN).unwrap());
            assert!(kcc.has_pending_processor_of_in_stage::<Typed>(INNER).unwrap());
            hook_log.push("checked");
        }
    });

    kcc.add_local_processor(d.clone(), &mut data);
    kcc.add_local_processor(t.clone(), &mut data);
    kcc.add_local_processor(o.clone(), &mut data);
    kcc.add_local_processor(y, &mut data);
    log.clear();

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(
        log.entries(),
        [
            "D:Custom(scan)",
            "T:Custom(scan)",
            "D:Custom(inner)",
            "T:Custom(inner)",
            "D:Custom(scan)",
            "T:Custom(scan)",
            "checked",
            "Y:Custom(inner)",
        ]
    );
}

#[test]
fn test_suppress_all_but_one_type_in_outer_stage() {
    let log = Log::default();
    let mut kcc = common::kcc();
    let mut data = common::step_data(1);

    let d = Recorder::new("D", 10.0, &[SCAN, INNER], &log);
    let o = Recorder::new("O", 5.0, &[SCAN, INNER], &log);
    let y = std::sync::Arc::new(Typed { log: log.clone() });

    d.set_hook(|kind, kcc, data| {
        if kind == SCAN {
            kcc.execute_stage(&mut Inner, data).unwrap();
        } else {
            kcc.suppress_processors_except_of_in_stage::<Typed>(SCAN).unwrap();
        }
    });

    kcc.add_local_processor(d.clone(), &mut data);
    kcc.add_local_processor(o.clone(), &mut data);
    kcc.add_local_processor(y, &mut data);
    log.clear();

    kcc.execute_stage(&mut Scan, &mut data).unwrap();
    assert_eq!(
        log.entries(),
        [
            "D:Custom(scan)",
            "D:Custom(inner)",
            "O:Custom(inner)",
            "Y:Custom(inner)",
            "Y:Custom(scan)",
        ]
    );
    assert_eq!(
        kcc.suppress_processors_except_of_in_stage::<Typed>(SCAN),
        Err(KccError::NoActiveStage {
            operation: "suppress_processors_except_of_in_stage"
        })
    );
}
