//! Per-class and per-method policy caches.
//!
//! Class and method ids are dense and monotonically assigned, so every
//! cache here is an append-only array indexed by id (grow-on-write), not a
//! hash map. Entries are written once and shared read-only afterwards;
//! mask lookups hand out clones of the same `Arc`.

use crate::bitset::{SlotMask, SlotMaskBuilder};
use crate::policy::{FilterPolicy, FramePolicy};
use crate::{SerializeError, SerializeResult};
use std::sync::Arc;
use tracing::error;
use vmck_kernel::{ClassInfo, FieldInfo, MethodInfo};

fn grow_to<T>(v: &mut Vec<Option<T>>, idx: usize) {
    if idx >= v.len() {
        v.resize_with(idx + 1, || None);
    }
}

fn check_range(ci: &ClassInfo, fi: &FieldInfo, storage_size: u32) -> SerializeResult<()> {
    if fi.storage_offset + fi.storage_size() > storage_size {
        error!(
            class = %ci.name,
            field = %fi.name,
            offset = fi.storage_offset,
            storage_size,
            "field storage range exceeds class footprint"
        );
        return Err(SerializeError::FilterConfig {
            class: ci.name.clone(),
            detail: format!(
                "field '{}' spans slots {}..{} but storage has {}",
                fi.name,
                fi.storage_offset,
                fi.storage_offset + fi.storage_size(),
                storage_size
            ),
        });
    }
    Ok(())
}

/// All bits set, then the storage range of every included field cleared:
/// a set bit means "exclude this slot".
fn build_filter_mask(
    ci: &ClassInfo,
    included: &[&FieldInfo],
    storage_size: u32,
) -> SerializeResult<SlotMask> {
    let mut b = SlotMaskBuilder::new(storage_size as usize);
    b.set_all();
    for fi in included {
        check_range(ci, fi, storage_size)?;
        let start = fi.storage_offset as usize;
        let end = start + fi.storage_size() as usize;
        for i in start..end {
            b.clear(i);
        }
    }
    Ok(b.freeze())
}

/// Exactly the offsets of included reference fields set: a set bit means
/// "this slot holds a reference".
fn build_ref_mask(
    ci: &ClassInfo,
    included: &[&FieldInfo],
    storage_size: u32,
) -> SerializeResult<SlotMask> {
    let mut b = SlotMaskBuilder::new(storage_size as usize);
    for fi in included {
        if fi.is_reference() {
            check_range(ci, fi, storage_size)?;
            b.set(fi.storage_offset as usize);
        }
    }
    Ok(b.freeze())
}

/// Caches every decision the filter policy makes, keyed by dense id.
pub struct PolicyCache {
    policy: Box<dyn FilterPolicy>,
    frame_policies: Vec<Option<FramePolicy>>,
    instance_filter: Vec<Option<Arc<SlotMask>>>,
    static_filter: Vec<Option<Arc<SlotMask>>>,
    instance_refs: Vec<Option<Arc<SlotMask>>>,
    static_refs: Vec<Option<Arc<SlotMask>>>,
}

impl PolicyCache {
    pub fn new(policy: Box<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            frame_policies: Vec::new(),
            instance_filter: Vec::new(),
            static_filter: Vec::new(),
            instance_refs: Vec::new(),
            static_refs: Vec::new(),
        }
    }

    pub fn instance_filter_mask(&mut self, ci: &ClassInfo) -> SerializeResult<Arc<SlotMask>> {
        let idx = ci.id.index();
        grow_to(&mut self.instance_filter, idx);
        if let Some(m) = &self.instance_filter[idx] {
            return Ok(m.clone());
        }
        let included = self.policy.matched_instance_fields(ci);
        let mask = Arc::new(build_filter_mask(ci, &included, ci.instance_storage_size)?);
        self.instance_filter[idx] = Some(mask.clone());
        Ok(mask)
    }

    pub fn static_filter_mask(&mut self, ci: &ClassInfo) -> SerializeResult<Arc<SlotMask>> {
        let idx = ci.id.index();
        grow_to(&mut self.static_filter, idx);
        if let Some(m) = &self.static_filter[idx] {
            return Ok(m.clone());
        }
        let included = self.policy.matched_static_fields(ci);
        let mask = Arc::new(build_filter_mask(ci, &included, ci.static_storage_size)?);
        self.static_filter[idx] = Some(mask.clone());
        Ok(mask)
    }

    pub fn instance_ref_mask(&mut self, ci: &ClassInfo) -> SerializeResult<Arc<SlotMask>> {
        let idx = ci.id.index();
        grow_to(&mut self.instance_refs, idx);
        if let Some(m) = &self.instance_refs[idx] {
            return Ok(m.clone());
        }
        let included = self.policy.matched_instance_fields(ci);
        let mask = Arc::new(build_ref_mask(ci, &included, ci.instance_storage_size)?);
        self.instance_refs[idx] = Some(mask.clone());
        Ok(mask)
    }

    pub fn static_ref_mask(&mut self, ci: &ClassInfo) -> SerializeResult<Arc<SlotMask>> {
        let idx = ci.id.index();
        grow_to(&mut self.static_refs, idx);
        if let Some(m) = &self.static_refs[idx] {
            return Ok(m.clone());
        }
        let included = self.policy.matched_static_fields(ci);
        let mask = Arc::new(build_ref_mask(ci, &included, ci.static_storage_size)?);
        self.static_refs[idx] = Some(mask.clone());
        Ok(mask)
    }

    pub fn frame_policy(&mut self, mi: &MethodInfo) -> FramePolicy {
        let idx = mi.id.index();
        grow_to(&mut self.frame_policies, idx);
        if let Some(p) = self.frame_policies[idx] {
            return p;
        }
        let p = self.policy.frame_policy(mi);
        self.frame_policies[idx] = Some(p);
        p
    }
}
