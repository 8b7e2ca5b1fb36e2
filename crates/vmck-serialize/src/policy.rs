//! Field and frame filter policies.
//!
//! A policy decides, per field, whether the field participates in the
//! fingerprint, and per method, how that method's stack frames are
//! serialized. Decisions are derived here once; the serializer caches them
//! by dense class/method id and never asks twice.

use crate::matcher::FieldSpec;
use vmck_kernel::{ClassInfo, FieldInfo, MethodInfo};

/// How frames of one method are serialized. Default: everything, and keep
/// walking caller frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePolicy {
    pub include_locals: bool,
    pub include_ops: bool,
    pub include_pc: bool,
    /// Serialize caller frames below this one.
    pub recurse: bool,
}

impl Default for FramePolicy {
    fn default() -> Self {
        Self {
            include_locals: true,
            include_ops: true,
            include_pc: true,
            recurse: true,
        }
    }
}

impl FramePolicy {
    pub fn is_default(self) -> bool {
        self == Self::default()
    }
}

/// Pluggable inclusion/exclusion policy.
///
/// `matched_*_fields` return the fields that ARE serialized; everything
/// else lands in the class's filter mask.
pub trait FilterPolicy {
    fn matched_instance_fields<'a>(&self, ci: &'a ClassInfo) -> Vec<&'a FieldInfo>;

    fn matched_static_fields<'a>(&self, ci: &'a ClassInfo) -> Vec<&'a FieldInfo>;

    fn frame_policy(&self, mi: &MethodInfo) -> FramePolicy;
}

/// Include every field, serialize every frame completely.
#[derive(Debug, Default)]
pub struct DefaultFilterPolicy;

impl FilterPolicy for DefaultFilterPolicy {
    fn matched_instance_fields<'a>(&self, ci: &'a ClassInfo) -> Vec<&'a FieldInfo> {
        ci.instance_fields.iter().collect()
    }

    fn matched_static_fields<'a>(&self, ci: &'a ClassInfo) -> Vec<&'a FieldInfo> {
        ci.static_fields.iter().collect()
    }

    fn frame_policy(&self, _mi: &MethodInfo) -> FramePolicy {
        FramePolicy::default()
    }
}

/// One link in a field-inclusion chain. `so_far` is the decision of the
/// links before it; returning it unchanged delegates.
pub trait FieldAmendment {
    fn amend_field_inclusion(&self, ci: &ClassInfo, fi: &FieldInfo, so_far: bool) -> bool;
}

/// One link in a frame-policy chain.
pub trait FrameAmendment {
    fn amend_frame_policy(&self, mi: &MethodInfo, so_far: FramePolicy) -> FramePolicy;
}

/// Filter policy built from ordered amendment chains.
///
/// Field inclusion starts at "include" and folds through the field chain;
/// static fields additionally fold through the static-only chain. Frame
/// policies fold from the default through the frame chain. Later links win.
#[derive(Default)]
pub struct AmendableFilterPolicy {
    field_amendments: Vec<Box<dyn FieldAmendment>>,
    static_amendments: Vec<Box<dyn FieldAmendment>>,
    frame_amendments: Vec<Box<dyn FrameAmendment>>,
}

impl AmendableFilterPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, a: impl FieldAmendment + 'static) -> Self {
        self.field_amendments.push(Box::new(a));
        self
    }

    pub fn with_static(mut self, a: impl FieldAmendment + 'static) -> Self {
        self.static_amendments.push(Box::new(a));
        self
    }

    pub fn with_frame(mut self, a: impl FrameAmendment + 'static) -> Self {
        self.frame_amendments.push(Box::new(a));
        self
    }

    fn field_included(&self, ci: &ClassInfo, fi: &FieldInfo, is_static: bool) -> bool {
        let mut included = true;
        for a in &self.field_amendments {
            included = a.amend_field_inclusion(ci, fi, included);
        }
        if is_static {
            for a in &self.static_amendments {
                included = a.amend_field_inclusion(ci, fi, included);
            }
        }
        included
    }
}

impl FilterPolicy for AmendableFilterPolicy {
    fn matched_instance_fields<'a>(&self, ci: &'a ClassInfo) -> Vec<&'a FieldInfo> {
        ci.instance_fields
            .iter()
            .filter(|fi| self.field_included(ci, fi, false))
            .collect()
    }

    fn matched_static_fields<'a>(&self, ci: &'a ClassInfo) -> Vec<&'a FieldInfo> {
        ci.static_fields
            .iter()
            .filter(|fi| self.field_included(ci, fi, true))
            .collect()
    }

    fn frame_policy(&self, mi: &MethodInfo) -> FramePolicy {
        let mut p = FramePolicy::default();
        for a in &self.frame_amendments {
            p = a.amend_frame_policy(mi, p);
        }
        p
    }
}

/// Honors the load-time "never serialize" field attribute and the frame
/// attributes on methods.
#[derive(Debug, Default)]
pub struct IgnoresFromAttributes;

impl FieldAmendment for IgnoresFromAttributes {
    fn amend_field_inclusion(&self, _ci: &ClassInfo, fi: &FieldInfo, so_far: bool) -> bool {
        if fi.attrs.filter {
            return false;
        }
        so_far
    }
}

impl FrameAmendment for IgnoresFromAttributes {
    fn amend_frame_policy(&self, mi: &MethodInfo, mut so_far: FramePolicy) -> FramePolicy {
        let attrs = mi.frame_attrs;
        if attrs.filter_data {
            so_far.include_locals = false;
            so_far.include_ops = false;
        }
        if attrs.filter_pc {
            so_far.include_pc = false;
        }
        if attrs.filter_subframes {
            so_far.recurse = false;
        }
        so_far
    }
}

/// Honors the load-time "always serialize" attribute, overriding any ignore
/// earlier in the chain.
#[derive(Debug, Default)]
pub struct IncludesFromAttributes;

impl FieldAmendment for IncludesFromAttributes {
    fn amend_field_inclusion(&self, _ci: &ClassInfo, fi: &FieldInfo, so_far: bool) -> bool {
        if fi.attrs.unfilter {
            return true;
        }
        so_far
    }
}

/// Excludes fields matching a "Class.field" glob. Covers runtime-internal
/// bookkeeping (thread plumbing, collection mod-counters) without touching
/// the class definitions.
#[derive(Debug)]
pub struct IgnoreFields {
    spec: FieldSpec,
}

impl IgnoreFields {
    pub fn new(spec: FieldSpec) -> Self {
        Self { spec }
    }
}

impl FieldAmendment for IgnoreFields {
    fn amend_field_inclusion(&self, ci: &ClassInfo, fi: &FieldInfo, so_far: bool) -> bool {
        if self.spec.matches(&ci.name, &fi.name) {
            return false;
        }
        so_far
    }
}

/// Force-includes fields matching a "Class.field" glob.
#[derive(Debug)]
pub struct UnfilterFields {
    spec: FieldSpec,
}

impl UnfilterFields {
    pub fn new(spec: FieldSpec) -> Self {
        Self { spec }
    }
}

impl FieldAmendment for UnfilterFields {
    fn amend_field_inclusion(&self, ci: &ClassInfo, fi: &FieldInfo, so_far: bool) -> bool {
        if self.spec.matches(&ci.name, &fi.name) {
            return true;
        }
        so_far
    }
}

/// Static-chain amendment: a final scalar static is a constant and can be
/// dropped from the fingerprint. In theory such a field could be critical
/// to state, but that would be highly irregular.
#[derive(Debug, Default)]
pub struct IgnoreFinalScalarStatics;

impl FieldAmendment for IgnoreFinalScalarStatics {
    fn amend_field_inclusion(&self, _ci: &ClassInfo, fi: &FieldInfo, so_far: bool) -> bool {
        if fi.attrs.is_final && !fi.is_reference() {
            return false;
        }
        so_far
    }
}
