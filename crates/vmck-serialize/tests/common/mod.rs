//! Snapshot fixtures shared by the integration suites.

use vmck_kernel::{
    FieldDecl, FieldKind, FrameAttrs, HeapObject, KernelState, NamedStorage, ObjRef, RunState,
    StackFrame, ThreadInfo,
};

/// One worker thread whose only frame holds a reference to a single
/// `Point { x, y }` object living at `at`.
pub fn point_state(at: i32, x: i32, y: i32) -> KernelState {
    let mut ks = KernelState::new();
    let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
    let point = ks.classes.add_class(
        "Point",
        vec![
            FieldDecl::new("x", FieldKind::Int),
            FieldDecl::new("y", FieldKind::Int),
        ],
        vec![],
    );
    let run = ks.classes.add_method("Main.run", FrameAttrs::default());

    let tobj = ObjRef(1);
    ks.heap
        .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));

    let p = ObjRef(at);
    let mut fields = NamedStorage::new(2);
    fields.set_int(0, x);
    fields.set_int(1, y);
    ks.heap.insert(p, HeapObject::named(point, fields));

    let mut t = ThreadInfo::new(0, RunState::Running, tobj);
    let mut f = StackFrame::new(run, 0, 1);
    f.push_ref_slot(p);
    t.frames.push(f);
    ks.threads.add(t);
    ks
}

/// A two-node chain `a -> b` rooted in one frame: `Node { val, next }` at
/// `ra` points to the node at `rb`, whose `next` is null. Payloads `pa`,
/// `pb`. Varying `ra`/`rb` renames the heap without changing its shape.
pub fn chain_state(ra: i32, rb: i32, pa: i32, pb: i32) -> KernelState {
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
    let run = ks.classes.add_method("Main.run", FrameAttrs::default());

    let tobj = ObjRef(1);
    ks.heap
        .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));

    let a = ObjRef(ra);
    let b = ObjRef(rb);
    let mut fa = NamedStorage::new(2);
    fa.set_int(0, pa);
    fa.set_ref(1, b);
    ks.heap.insert(a, HeapObject::named(node, fa));
    let mut fb = NamedStorage::new(2);
    fb.set_int(0, pb);
    fb.set_ref(1, ObjRef::NULL);
    ks.heap.insert(b, HeapObject::named(node, fb));

    let mut t = ThreadInfo::new(0, RunState::Running, tobj);
    let mut f = StackFrame::new(run, 0, 1);
    f.push_ref_slot(a);
    t.frames.push(f);
    ks.threads.add(t);
    ks
}

/// A thread holding monitor locks on two objects, acquired in the given
/// order. Everything else about the state is canonical: the frame holds
/// the two objects in sorted slot order, so two states built with swapped
/// arguments differ only in lock acquisition order.
pub fn locking_state(first: i32, second: i32) -> KernelState {
    let mut ks = KernelState::new();
    let thread_cls = ks.classes.add_class("runtime.Thread", vec![], vec![]);
    let obj_cls = ks.classes.add_class("Resource", vec![], vec![]);
    let run = ks.classes.add_method("Main.run", FrameAttrs::default());

    let tobj = ObjRef(1);
    ks.heap
        .insert(tobj, HeapObject::named(thread_cls, NamedStorage::new(0)));
    let a = ObjRef(first);
    let b = ObjRef(second);
    ks.heap
        .insert(a, HeapObject::named(obj_cls, NamedStorage::new(0)));
    ks.heap
        .insert(b, HeapObject::named(obj_cls, NamedStorage::new(0)));

    let mut t = ThreadInfo::new(0, RunState::Running, tobj);
    let mut f = StackFrame::new(run, 0, 2);
    f.push_ref_slot(ObjRef(first.min(second)));
    f.push_ref_slot(ObjRef(first.max(second)));
    t.frames.push(f);
    t.locked_objects = vec![a, b];
    ks.threads.add(t);
    ks
}
