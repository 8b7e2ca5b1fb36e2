//! End-to-end fingerprint properties over small kernel snapshots.

mod common;

use common::{chain_state, locking_state, point_state};
use vmck_kernel::{
    ArrayStorage, FieldDecl, FieldKind, FrameAttrs, HeapObject, KernelState, NamedStorage, ObjRef,
    RunState, StackFrame, StaticClassData, ThreadInfo,
};
use vmck_serialize::{
    AmendableFilterPolicy, DefaultFilterPolicy, FieldSpec, FilteringSerializer, IgnoreFields,
    IgnoresFromAttributes, InvMapSerializer, SerializerConfig,
};

fn plain_direct() -> FilteringSerializer {
    FilteringSerializer::direct(Box::new(DefaultFilterPolicy), SerializerConfig::default())
        .unwrap()
}

fn plain_invmap() -> InvMapSerializer {
    InvMapSerializer::inverse_map(Box::new(DefaultFilterPolicy), SerializerConfig::default())
        .unwrap()
}

fn exclude_y() -> Box<AmendableFilterPolicy> {
    Box::new(
        AmendableFilterPolicy::new()
            .with_field(IgnoreFields::new(FieldSpec::parse("Point.y").unwrap())),
    )
}

#[test]
fn determinism() {
    let ks = chain_state(1000, 2000, 5, 6);
    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&ks).unwrap();
    let fp2 = s.compute_fingerprint(&ks).unwrap();
    assert_eq!(fp1, fp2);

    let mut s = plain_invmap();
    let fp1 = s.compute_fingerprint(&ks).unwrap();
    let fp2 = s.compute_fingerprint(&ks).unwrap();
    assert_eq!(fp1, fp2);
}

#[test]
fn snapshot_left_untouched() {
    let ks = chain_state(1000, 2000, 5, 6);
    let before = ks.clone();
    let mut s = plain_direct();
    s.compute_fingerprint(&ks).unwrap();
    assert_eq!(ks, before);
}

#[test]
fn filter_blindness() {
    let mut s =
        FilteringSerializer::direct(exclude_y(), SerializerConfig::default()).unwrap();
    let fp1 = s.compute_fingerprint(&point_state(1000, 5, 7)).unwrap();
    let fp2 = s.compute_fingerprint(&point_state(1000, 5, 999)).unwrap();
    assert_eq!(fp1, fp2);
}

#[test]
fn filtered_value_never_emitted() {
    let ks = point_state(1000, 5, 7);
    let point_class_id = ks.classes.class_by_name("Point").unwrap().id.as_i32();

    let mut s =
        FilteringSerializer::direct(exclude_y(), SerializerConfig::default()).unwrap();
    let fp = s.compute_fingerprint(&ks).unwrap();
    assert!(fp.contains(&point_class_id));
    assert!(fp.contains(&5));
    assert!(!fp.contains(&7));
}

#[test]
fn reference_sensitivity() {
    // x is not filtered, so its value must show up in the fingerprint
    let mut s =
        FilteringSerializer::direct(exclude_y(), SerializerConfig::default()).unwrap();
    let fp1 = s.compute_fingerprint(&point_state(1000, 5, 7)).unwrap();
    let fp2 = s.compute_fingerprint(&point_state(1000, 6, 7)).unwrap();
    assert_ne!(fp1, fp2);
}

#[test]
fn symmetry_invariance_inverse_map_only() {
    // same shape and payloads, renamed references
    let ks1 = chain_state(1000, 2000, 5, 6);
    let ks2 = chain_state(5000, 42, 5, 6);

    let mut s = plain_invmap();
    let fp1 = s.compute_fingerprint(&ks1).unwrap();
    let fp2 = s.compute_fingerprint(&ks2).unwrap();
    assert_eq!(fp1, fp2, "inverse-map strategy must survive renaming");

    // the direct strategy bakes raw reference values in, so it is allowed
    // (and here, guaranteed) to differ
    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&ks1).unwrap();
    let fp2 = s.compute_fingerprint(&ks2).unwrap();
    assert_ne!(fp1, fp2);
}

#[test]
fn symmetry_does_not_hide_payload_changes() {
    let ks1 = chain_state(1000, 2000, 5, 6);
    let ks2 = chain_state(5000, 42, 5, 99);
    let mut s = plain_invmap();
    let fp1 = s.compute_fingerprint(&ks1).unwrap();
    let fp2 = s.compute_fingerprint(&ks2).unwrap();
    assert_ne!(fp1, fp2);
}

#[test]
fn lock_set_order_independence() {
    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&locking_state(17, 90)).unwrap();
    let fp2 = s.compute_fingerprint(&locking_state(90, 17)).unwrap();
    assert_eq!(fp1, fp2);
}

#[test]
fn cyclic_heap_terminates_and_is_stable() {
    // a <-> b cycle
    let mut ks = chain_state(1000, 2000, 5, 6);
    if let Some(obj) = ks.heap.get_mut(ObjRef(2000)) {
        match &mut obj.storage {
            vmck_kernel::Storage::Named(fields) => fields.set_ref(1, ObjRef(1000)),
            _ => unreachable!(),
        }
    }
    let mut s = plain_invmap();
    let fp1 = s.compute_fingerprint(&ks).unwrap();
    let fp2 = s.compute_fingerprint(&ks).unwrap();
    assert_eq!(fp1, fp2);

    // both nodes got exactly one index each: 1..=3 with the thread object
    let max_idx = fp1.iter().copied().max().unwrap();
    assert!(max_idx <= ks.heap.len() as i32 + ks.statics.len() as i32 + 6);
}

#[test]
fn null_refs_and_empty_arrays_are_ordinary() {
    let mut ks = KernelState::new();
    let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
    let arr_cls = ks.classes.add_class("Node[]", vec![], vec![]);
    let run = ks.classes.add_method("Main.run", FrameAttrs::default());

    let tobj = ObjRef(1);
    ks.heap
        .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));
    // reference array holding only nulls, and an empty scalar array
    let holes = ObjRef(10);
    ks.heap.insert(
        holes,
        HeapObject::array(arr_cls, ArrayStorage::Refs(vec![ObjRef::NULL, ObjRef::NULL])),
    );
    let empty = ObjRef(11);
    ks.heap
        .insert(empty, HeapObject::array(arr_cls, ArrayStorage::from_ints(vec![])));

    let mut t = ThreadInfo::new(0, RunState::Running, tobj);
    let mut f = StackFrame::new(run, 0, 2);
    f.push_ref_slot(holes);
    f.push_ref_slot(empty);
    t.frames.push(f);
    ks.threads.add(t);

    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&ks).unwrap();
    let fp2 = s.compute_fingerprint(&ks).unwrap();
    assert_eq!(fp1, fp2);

    let mut s = plain_invmap();
    s.compute_fingerprint(&ks).unwrap();
}

#[test]
fn scalar_array_contents_matter() {
    fn with_payload(v: i64) -> KernelState {
        let mut ks = KernelState::new();
        let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
        let arr_cls = ks.classes.add_class("long[]", vec![], vec![]);
        let run = ks.classes.add_method("Main.run", FrameAttrs::default());
        let tobj = ObjRef(1);
        ks.heap
            .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));
        let arr = ObjRef(10);
        ks.heap
            .insert(arr, HeapObject::array(arr_cls, ArrayStorage::from_longs(&[v])));
        let mut t = ThreadInfo::new(0, RunState::Running, tobj);
        let mut f = StackFrame::new(run, 0, 1);
        f.push_ref_slot(arr);
        t.frames.push(f);
        ks.threads.add(t);
        ks
    }

    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&with_payload(1)).unwrap();
    let fp2 = s.compute_fingerprint(&with_payload(2)).unwrap();
    let fp3 = s.compute_fingerprint(&with_payload(1)).unwrap();
    assert_ne!(fp1, fp2);
    assert_eq!(fp1, fp3);
}

#[test]
fn static_fields_reach_the_fingerprint() {
    fn with_counter(v: i32) -> KernelState {
        let mut ks = KernelState::new();
        let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
        let cfg = ks.classes.add_class(
            "Config",
            vec![],
            vec![FieldDecl::new("counter", FieldKind::Int)],
        );
        let tobj = ObjRef(1);
        ks.heap
            .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));
        let mut t = ThreadInfo::new(0, RunState::Running, tobj);
        t.frames.push(StackFrame::new(
            ks.classes.add_method("Main.run", FrameAttrs::default()),
            0,
            0,
        ));
        ks.threads.add(t);

        let mut fields = NamedStorage::new(1);
        fields.set_int(0, v);
        ks.statics.add(StaticClassData {
            class_id: cfg,
            status: 2,
            fields,
        });
        ks
    }

    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&with_counter(1)).unwrap();
    let fp2 = s.compute_fingerprint(&with_counter(2)).unwrap();
    assert_ne!(fp1, fp2);
}

#[test]
fn excluded_class_statics_keep_reachability_without_identity() {
    // Holder is excluded by class name; its static ref points at a Node.
    // The Node's contents must still influence the fingerprint, Holder's
    // identity must not.
    fn state(node_val: i32, holder_status: i32) -> KernelState {
        let mut ks = KernelState::new();
        let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
        let node = ks.classes.add_class(
            "Node",
            vec![
                FieldDecl::new("val", FieldKind::Int),
                FieldDecl::new("next", FieldKind::Ref),
            ],
            vec![],
        );
        let holder = ks.classes.add_class(
            "debug.Holder",
            vec![],
            vec![FieldDecl::new("root", FieldKind::Ref)],
        );
        let run = ks.classes.add_method("Main.run", FrameAttrs::default());

        let tobj = ObjRef(1);
        ks.heap
            .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));
        let n = ObjRef(50);
        let mut nf = NamedStorage::new(2);
        nf.set_int(0, node_val);
        nf.set_ref(1, ObjRef::NULL);
        ks.heap.insert(n, HeapObject::named(node, nf));

        let mut t = ThreadInfo::new(0, RunState::Running, tobj);
        t.frames.push(StackFrame::new(run, 0, 0));
        ks.threads.add(t);

        let mut hf = NamedStorage::new(1);
        hf.set_ref(0, n);
        ks.statics.add(StaticClassData {
            class_id: holder,
            status: holder_status,
            fields: hf,
        });
        ks
    }

    let config = SerializerConfig {
        exclude_classes: vec!["debug.*".into()],
        ..SerializerConfig::default()
    };
    let mut s =
        FilteringSerializer::direct(Box::new(DefaultFilterPolicy), config).unwrap();

    // the node is only reachable through the excluded class's static
    let fp1 = s.compute_fingerprint(&state(5, 2)).unwrap();
    let fp2 = s.compute_fingerprint(&state(6, 2)).unwrap();
    assert_ne!(fp1, fp2, "liveness through excluded statics must be kept");

    // the excluded class's own status word must not leak
    let fp3 = s.compute_fingerprint(&state(5, 3)).unwrap();
    assert_eq!(fp1, fp3, "excluded class identity must not leak");
}

#[test]
fn frame_pc_filter_merges_states() {
    fn state(pc: i32) -> KernelState {
        let mut ks = KernelState::new();
        let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
        let run = ks.classes.add_method(
            "Busy.spin",
            FrameAttrs {
                filter_pc: true,
                ..FrameAttrs::default()
            },
        );
        let tobj = ObjRef(1);
        ks.heap
            .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));
        let mut t = ThreadInfo::new(0, RunState::Running, tobj);
        t.frames.push(StackFrame::new(run, pc, 0));
        ks.threads.add(t);
        ks
    }

    let policy = AmendableFilterPolicy::new().with_frame(IgnoresFromAttributes);
    let mut s =
        FilteringSerializer::direct(Box::new(policy), SerializerConfig::default()).unwrap();
    let fp1 = s.compute_fingerprint(&state(3)).unwrap();
    let fp2 = s.compute_fingerprint(&state(17)).unwrap();
    assert_eq!(fp1, fp2);

    // without the frame amendment the pc is part of the state
    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&state(3)).unwrap();
    let fp2 = s.compute_fingerprint(&state(17)).unwrap();
    assert_ne!(fp1, fp2);
}

#[test]
fn cleared_pc_is_a_valid_frame() {
    let mut ks = point_state(1000, 5, 7);
    if let Some(t) = ks.threads.get_mut(0) {
        t.frames[0].pc = None;
    }
    let mut s = plain_direct();
    let fp = s.compute_fingerprint(&ks).unwrap();
    assert!(fp.contains(&-1));
}

#[test]
fn dead_threads_are_skipped() {
    let mut ks = point_state(1000, 5, 7);
    let extra = ThreadInfo::new(9, RunState::Terminated, ObjRef(1));
    ks.threads.add(extra);

    let mut s = plain_direct();
    let with_dead = s.compute_fingerprint(&ks).unwrap();
    let baseline = s.compute_fingerprint(&point_state(1000, 5, 7)).unwrap();
    assert_eq!(with_dead, baseline);
}

#[test]
fn blocked_thread_lock_object_is_part_of_state() {
    fn state(blocked_on_second: bool) -> KernelState {
        let mut ks = locking_state(17, 90);
        if let Some(t) = ks.threads.get_mut(0) {
            t.state = RunState::Blocked;
            t.lock_object = Some(if blocked_on_second {
                ObjRef(90)
            } else {
                ObjRef(17)
            });
            t.locked_objects.clear();
        }
        ks
    }

    let mut s = plain_direct();
    let fp1 = s.compute_fingerprint(&state(false)).unwrap();
    let fp2 = s.compute_fingerprint(&state(true)).unwrap();
    assert_ne!(fp1, fp2);
}
