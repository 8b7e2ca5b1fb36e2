//! The heap traversal engine.
//!
//! One skeleton walks roots (thread objects and stack frames), drains the
//! discovered-object worklist, serializes static areas (which can discover
//! more objects, so the worklist is drained again), and finally appends
//! per-thread scheduling state. Reference encoding is delegated to the
//! injected `Canonicalizer`; field selection to the cached filter policy;
//! value encoding optionally to attached abstractions.
//!
//! The walk itself never fails on a self-consistent snapshot. The only
//! error path is a filter-configuration invariant violation surfacing from
//! the mask caches, which aborts the computation.

use crate::abstraction::{Abstraction, AbstractionRegistry, FieldAbstractionSpec, ScalarValue};
use crate::buffer::IntBuffer;
use crate::cache::PolicyCache;
use crate::canon::{Canonicalizer, DirectCanonicalizer, InvMapCanonicalizer};
use crate::matcher::{matches_set, FieldSpec, NameSetMatcher};
use crate::policy::{FilterPolicy, FramePolicy};
use crate::SerializeResult;
use std::sync::Arc;
use vmck_kernel::{
    ArrayStorage, ClassInfo, FieldInfo, FieldKind, KernelState, NamedStorage, ObjRef, StackFrame,
    Storage,
};

/// Configuration surface of the serializer family.
///
/// Glob lists follow include/exclude semantics: an empty include list means
/// "everything", an empty exclude list means "nothing".
pub struct SerializerConfig {
    pub include_classes: Vec<String>,
    pub exclude_classes: Vec<String>,
    pub include_methods: Vec<String>,
    pub exclude_methods: Vec<String>,
    /// Keep scanning excluded frames for live references.
    pub process_all_objects: bool,
    /// Abstraction-mode field iteration skips inherited fields.
    pub declared_fields_only: bool,
    /// Field glob -> abstraction bindings, attached at class-load time.
    pub field_abstractions: Vec<(String, Arc<dyn Abstraction>)>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            include_classes: Vec::new(),
            exclude_classes: Vec::new(),
            include_methods: Vec::new(),
            exclude_methods: Vec::new(),
            process_all_objects: true,
            declared_fields_only: false,
            field_abstractions: Vec::new(),
        }
    }
}

/// The traversal engine, generic over the reference-encoding strategy.
pub struct StateSerializer<C: Canonicalizer> {
    canon: C,
    cache: PolicyCache,
    buf: IntBuffer,
    include_classes: Option<NameSetMatcher>,
    exclude_classes: Option<NameSetMatcher>,
    include_methods: Option<NameSetMatcher>,
    exclude_methods: Option<NameSetMatcher>,
    process_all_objects: bool,
    declared_fields_only: bool,
    abstractions: Option<AbstractionRegistry>,
}

/// Serializer encoding references by raw value (default strategy).
pub type FilteringSerializer = StateSerializer<DirectCanonicalizer>;

/// Serializer renumbering references in first-encounter order.
pub type InvMapSerializer = StateSerializer<InvMapCanonicalizer>;

impl FilteringSerializer {
    pub fn direct(
        policy: Box<dyn FilterPolicy>,
        config: SerializerConfig,
    ) -> SerializeResult<Self> {
        Self::with_canonicalizer(policy, config, DirectCanonicalizer::new())
    }
}

impl InvMapSerializer {
    pub fn inverse_map(
        policy: Box<dyn FilterPolicy>,
        config: SerializerConfig,
    ) -> SerializeResult<Self> {
        Self::with_canonicalizer(policy, config, InvMapCanonicalizer::new())
    }
}

impl<C: Canonicalizer> StateSerializer<C> {
    pub fn with_canonicalizer(
        policy: Box<dyn FilterPolicy>,
        config: SerializerConfig,
        canon: C,
    ) -> SerializeResult<Self> {
        let abstractions = if config.field_abstractions.is_empty() {
            None
        } else {
            let specs = config
                .field_abstractions
                .iter()
                .map(|(glob, a)| {
                    Ok(FieldAbstractionSpec {
                        field: FieldSpec::parse(glob)?,
                        abstraction: a.clone(),
                    })
                })
                .collect::<SerializeResult<Vec<_>>>()?;
            Some(AbstractionRegistry::new(specs))
        };

        Ok(Self {
            canon,
            cache: PolicyCache::new(policy),
            buf: IntBuffer::with_capacity(4096),
            include_classes: NameSetMatcher::non_empty(&config.include_classes)?,
            exclude_classes: NameSetMatcher::non_empty(&config.exclude_classes)?,
            include_methods: NameSetMatcher::non_empty(&config.include_methods)?,
            exclude_methods: NameSetMatcher::non_empty(&config.exclude_methods)?,
            process_all_objects: config.process_all_objects,
            declared_fields_only: config.declared_fields_only,
            abstractions,
        })
    }

    /// Class-load hook: binds configured field abstractions to the new
    /// class. A no-op when no abstractions are configured.
    pub fn on_class_loaded(&mut self, ci: &ClassInfo) {
        if let Some(reg) = &mut self.abstractions {
            reg.on_class_loaded(ci);
        }
    }

    /// Compute the fingerprint of one program state.
    ///
    /// Idempotent for an unchanged snapshot, and leaves no residual state:
    /// buffer, worklist, and visited bookkeeping are rebuilt on entry.
    pub fn compute_fingerprint(&mut self, ks: &KernelState) -> SerializeResult<Vec<i32>> {
        self.buf.clear();
        self.canon.reset();

        self.serialize_stack_frames(ks)?;
        self.drain_reference_queue(ks)?;
        self.serialize_statics(ks)?;
        self.drain_reference_queue(ks)?;

        // thread states last: their internal references (locked objects
        // etc.) must not establish canonical encodings of their own
        self.serialize_thread_states(ks);

        Ok(self.buf.to_vec())
    }

    #[inline]
    fn class_included(&self, name: &str) -> bool {
        matches_set(
            name,
            self.include_classes.as_ref(),
            self.exclude_classes.as_ref(),
        )
    }

    #[inline]
    fn method_included(&self, full_name: &str) -> bool {
        matches_set(
            full_name,
            self.include_methods.as_ref(),
            self.exclude_methods.as_ref(),
        )
    }

    /// Append the canonical encoding of a reference, scheduling the target
    /// for serialization on first encounter.
    fn process_reference(&mut self, r: ObjRef) {
        let v = if r.is_null() {
            self.canon.encode_null(r)
        } else {
            self.canon.canonicalize(r)
        };
        self.buf.push(v);
    }

    /// Record a reference for reachability without emitting anything.
    fn touch_reference(&mut self, r: ObjRef) {
        if !r.is_null() {
            self.canon.canonicalize(r);
        }
    }

    //--- roots: thread objects and stack frames

    fn serialize_stack_frames(&mut self, ks: &KernelState) -> SerializeResult<()> {
        for ti in ks.threads.iter().filter(|t| t.is_alive()) {
            // the thread object itself is a root
            self.process_reference(ti.thread_object);

            for frame in ti.frames_top_down() {
                let mi = ks.classes.method(frame.method);
                if !self.method_included(&mi.full_name) {
                    // frame identity stays out of the fingerprint, but its
                    // references stay live
                    if self.process_all_objects {
                        for r in frame.reference_slots() {
                            self.touch_reference(r);
                        }
                    }
                    continue;
                }
                let policy = self.cache.frame_policy(mi);
                self.serialize_frame(frame, policy);
                if !policy.recurse {
                    break;
                }
            }
        }
        Ok(())
    }

    fn serialize_frame(&mut self, frame: &StackFrame, policy: FramePolicy) {
        self.buf.push(frame.method.as_i32());

        // a listener can clear the next pc of a frame that is still live
        if policy.include_pc {
            self.buf.push(frame.pc.unwrap_or(-1));
        }

        self.buf.push(frame.operand_depth());

        let locals = frame.local_count as usize;
        for (i, &slot) in frame.slots.iter().enumerate() {
            let included = if i < locals {
                policy.include_locals
            } else {
                policy.include_ops
            };
            if included {
                if frame.is_reference_slot(i) {
                    self.process_reference(ObjRef(slot));
                } else {
                    self.buf.push(slot);
                }
            } else if frame.is_reference_slot(i) {
                self.touch_reference(ObjRef(slot));
            }
        }
    }

    //--- the worklist of discovered heap objects

    fn drain_reference_queue(&mut self, ks: &KernelState) -> SerializeResult<()> {
        while let Some(r) = self.canon.next_pending() {
            let Some(obj) = ks.heap.get(r) else {
                continue;
            };
            let ci = ks.classes.class(obj.class_id);
            if self.class_included(&ci.name) {
                self.buf.push(ci.id.as_i32());
                match &obj.storage {
                    Storage::Array(a) => self.serialize_array(a),
                    Storage::Named(fields) => {
                        if self.abstractions.is_some() {
                            self.serialize_named_fields(ci, fields)?;
                        } else {
                            self.serialize_named_slots(ci, fields)?;
                        }
                    }
                }
            } else {
                // excluded class: nothing emitted, liveness preserved
                match &obj.storage {
                    Storage::Array(ArrayStorage::Refs(refs)) => {
                        for &r in refs {
                            self.touch_reference(r);
                        }
                    }
                    Storage::Array(ArrayStorage::Scalars { .. }) => {}
                    Storage::Named(fields) => {
                        self.scan_named_references(ci, fields, false)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn serialize_array(&mut self, a: &ArrayStorage) {
        self.buf.push(a.length());
        match a {
            ArrayStorage::Refs(refs) => {
                for &r in refs {
                    self.process_reference(r);
                }
            }
            ArrayStorage::Scalars { slots, .. } => {
                self.buf.extend_from_slice(slots);
            }
        }
    }

    /// Slot-wise path: raw slots routed by the class's filter/ref masks.
    fn serialize_named_slots(
        &mut self,
        ci: &ClassInfo,
        fields: &NamedStorage,
    ) -> SerializeResult<()> {
        let filter = self.cache.instance_filter_mask(ci)?;
        let refs = self.cache.instance_ref_mask(ci)?;
        for (i, &v) in fields.slots().iter().enumerate() {
            if filter.get(i) {
                continue;
            }
            if refs.get(i) {
                self.process_reference(ObjRef(v));
            } else {
                self.buf.push(v);
            }
        }
        Ok(())
    }

    /// Field-wise path used in abstraction mode: iterate field metadata so
    /// attached abstractions can substitute values per field kind.
    fn serialize_named_fields(
        &mut self,
        ci: &ClassInfo,
        fields: &NamedStorage,
    ) -> SerializeResult<()> {
        let filter = self.cache.instance_filter_mask(ci)?;
        for (idx, fi) in ci.instance_fields.iter().enumerate() {
            if self.declared_fields_only && fi.inherited {
                continue;
            }
            if filter.get(fi.storage_offset as usize) {
                continue;
            }
            let abstraction = self
                .abstractions
                .as_ref()
                .and_then(|reg| reg.instance_abstraction(ci.id, idx))
                .cloned();
            self.process_field(fields, fi, abstraction);
        }
        Ok(())
    }

    fn process_field(
        &mut self,
        fields: &NamedStorage,
        fi: &FieldInfo,
        abstraction: Option<Arc<dyn Abstraction>>,
    ) {
        let off = fi.storage_offset;
        match abstraction {
            Some(a) => match fi.kind {
                FieldKind::Ref => {
                    let r = fields.get_ref(off);
                    self.buf.push(a.abstract_reference(r));
                    if a.traverse_reference(r) {
                        self.touch_reference(r);
                    }
                }
                FieldKind::Int => {
                    self.buf
                        .push(a.abstract_scalar(ScalarValue::Int(fields.get_int(off))));
                }
                FieldKind::Float => {
                    self.buf
                        .push(a.abstract_scalar(ScalarValue::Float(fields.get_float(off))));
                }
                FieldKind::Long => {
                    self.buf
                        .push(a.abstract_scalar(ScalarValue::Long(fields.get_long(off))));
                }
                FieldKind::Double => {
                    self.buf
                        .push(a.abstract_scalar(ScalarValue::Double(fields.get_double(off))));
                }
            },
            None => match fi.kind {
                FieldKind::Ref => self.process_reference(fields.get_ref(off)),
                FieldKind::Int | FieldKind::Float => self.buf.push(fields.get_int(off)),
                FieldKind::Long | FieldKind::Double => {
                    self.buf.push(fields.get_int(off));
                    self.buf.push(fields.get_int(off + 1));
                }
            },
        }
    }

    /// Reachability-only scan of named storage (excluded classes).
    fn scan_named_references(
        &mut self,
        ci: &ClassInfo,
        fields: &NamedStorage,
        is_static: bool,
    ) -> SerializeResult<()> {
        let (filter, refs) = if is_static {
            (
                self.cache.static_filter_mask(ci)?,
                self.cache.static_ref_mask(ci)?,
            )
        } else {
            (
                self.cache.instance_filter_mask(ci)?,
                self.cache.instance_ref_mask(ci)?,
            )
        };
        for (i, &v) in fields.slots().iter().enumerate() {
            if !filter.get(i) && refs.get(i) {
                self.touch_reference(ObjRef(v));
            }
        }
        Ok(())
    }

    //--- static areas

    fn serialize_statics(&mut self, ks: &KernelState) -> SerializeResult<()> {
        self.buf.push(ks.statics.len() as i32);

        for sc in ks.statics.iter() {
            let ci = ks.classes.class(sc.class_id);
            if self.class_included(&ci.name) {
                self.buf.push(sc.status);
                if self.abstractions.is_some() {
                    let filter = self.cache.static_filter_mask(ci)?;
                    for (idx, fi) in ci.static_fields.iter().enumerate() {
                        if self.declared_fields_only && fi.inherited {
                            continue;
                        }
                        if filter.get(fi.storage_offset as usize) {
                            continue;
                        }
                        let abstraction = self
                            .abstractions
                            .as_ref()
                            .and_then(|reg| reg.static_abstraction(ci.id, idx))
                            .cloned();
                        self.process_field(&sc.fields, fi, abstraction);
                    }
                } else {
                    let filter = self.cache.static_filter_mask(ci)?;
                    let refs = self.cache.static_ref_mask(ci)?;
                    for (i, &v) in sc.fields.slots().iter().enumerate() {
                        if filter.get(i) {
                            continue;
                        }
                        if refs.get(i) {
                            self.process_reference(ObjRef(v));
                        } else {
                            self.buf.push(v);
                        }
                    }
                }
            } else {
                self.scan_named_references(ci, &sc.fields, true)?;
            }
        }
        Ok(())
    }

    //--- thread scheduling state, after the heap pass

    fn serialize_thread_states(&mut self, ks: &KernelState) {
        for ti in ks.threads.iter().filter(|t| t.is_alive()) {
            self.buf.push(ti.id);
            self.buf.push(ti.state.ordinal());
            self.buf.push(ti.stack_depth());

            // the object we are waiting for; live, so already encoded
            if let Some(lock) = ti.lock_object {
                let v = self.canon.existing_encoding(lock);
                self.buf.push(v);
            }

            self.serialize_locked_objects(&ti.locked_objects);
        }
    }

    /// Order-independent lock-set encoding.
    ///
    /// Lock sets have no duplicates but no canonical order either, and
    /// sorting per state would cost allocations for what is almost always
    /// a tiny set. The fold below is commutative: each step XORs a rotation
    /// of the accumulator whose amount depends only on the element, and
    /// such maps commute with each other.
    fn serialize_locked_objects(&mut self, locked: &[ObjRef]) {
        let n = locked.len() as i32;
        self.buf.push(n);

        match locked {
            [] => {}
            [only] => {
                let v = self.canon.existing_encoding(*only);
                self.buf.push(v);
            }
            _ => {
                let mut h = (n << 16) + (n % 3);
                for &r in locked {
                    let rot = self.canon.existing_encoding(r).rem_euclid(31) as u32;
                    h ^= h.rotate_left(rot);
                }
                self.buf.push(h);
            }
        }
    }
}
