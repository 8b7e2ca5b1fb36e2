//! Reference canonicalization strategies.
//!
//! The traversal engine is strategy-agnostic: it hands every reference it
//! meets to a `Canonicalizer`, which picks the encoding that lands in the
//! fingerprint and tracks which objects still await field serialization.
//! Both strategies guarantee each object is serialized at most once per
//! run, cycles included.

use crate::sparse::SparseIntMap;
use ahash::AHashSet;
use std::collections::VecDeque;
use vmck_kernel::ObjRef;

/// Absent-key marker for the inverse-map strategy's sparse table. Distinct
/// from every assigned index (those start at 1) and from the reserved 0.
const UNSEEN: i32 = -1;

/// Strategy interface shared by one traversal skeleton.
pub trait Canonicalizer {
    /// Drop all per-run state. Called at the start of every fingerprint
    /// computation.
    fn reset(&mut self);

    /// Canonical encoding of a non-null reference. A first encounter is
    /// recorded so the object later surfaces via `next_pending`.
    fn canonicalize(&mut self, r: ObjRef) -> i32;

    /// Encoding already assigned to `r`, without scheduling traversal.
    /// Used after the heap pass, when no new assignment may happen.
    fn existing_encoding(&self, r: ObjRef) -> i32;

    /// Encoding appended for a null/invalid reference.
    fn encode_null(&self, r: ObjRef) -> i32;

    /// Next discovered-but-unserialized object, in strategy order.
    fn next_pending(&mut self) -> Option<ObjRef>;
}

/// Encodes references by their raw value; visited objects are tracked in a
/// per-run set, the frontier in a FIFO queue.
///
/// Cheap, but fingerprints depend on the allocator's absolute reference
/// values: two heaps identical up to renumbering hash differently.
#[derive(Debug, Default)]
pub struct DirectCanonicalizer {
    seen: AHashSet<i32>,
    queue: VecDeque<ObjRef>,
}

impl DirectCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Canonicalizer for DirectCanonicalizer {
    fn reset(&mut self) {
        self.seen.clear();
        self.queue.clear();
    }

    fn canonicalize(&mut self, r: ObjRef) -> i32 {
        if self.seen.insert(r.as_i32()) {
            self.queue.push_back(r);
        }
        r.as_i32()
    }

    fn existing_encoding(&self, r: ObjRef) -> i32 {
        r.as_i32()
    }

    fn encode_null(&self, r: ObjRef) -> i32 {
        r.as_i32()
    }

    fn next_pending(&mut self) -> Option<ObjRef> {
        self.queue.pop_front()
    }
}

/// Renumbers references in first-encounter order: the n-th distinct object
/// met during the traversal is encoded as n, regardless of its raw value.
///
/// Fingerprints survive any bijective renumbering of the heap allocator
/// (symmetry reduction), at the cost of sparse-map bookkeeping. The dense
/// inverse array doubles as the worklist: a cursor walks indices in
/// assignment order, and field serialization may assign further indices
/// ahead of it.
#[derive(Debug)]
pub struct InvMapCanonicalizer {
    /// raw reference value -> assigned dense index
    map: SparseIntMap,
    /// assigned dense index -> raw reference; index 0 is reserved
    inverse: Vec<ObjRef>,
    cursor: usize,
}

impl InvMapCanonicalizer {
    pub fn new() -> Self {
        let mut c = Self {
            map: SparseIntMap::new(UNSEEN),
            inverse: Vec::new(),
            cursor: 0,
        };
        c.reset();
        c
    }
}

impl Default for InvMapCanonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Canonicalizer for InvMapCanonicalizer {
    fn reset(&mut self) {
        self.map.clear();
        self.inverse.clear();
        // reserve index 0 so "never seen" stays expressible
        self.inverse.push(ObjRef::NULL);
        self.cursor = 1;
    }

    fn canonicalize(&mut self, r: ObjRef) -> i32 {
        let idx = self.map.get(r.as_i32());
        if idx != UNSEEN {
            return idx;
        }
        let idx = self.inverse.len() as i32;
        self.inverse.push(r);
        self.map.set(r.as_i32(), idx);
        idx
    }

    fn existing_encoding(&self, r: ObjRef) -> i32 {
        let idx = self.map.get(r.as_i32());
        if idx == UNSEEN {
            0
        } else {
            idx
        }
    }

    fn encode_null(&self, _r: ObjRef) -> i32 {
        -1
    }

    fn next_pending(&mut self) -> Option<ObjRef> {
        if self.cursor < self.inverse.len() {
            let r = self.inverse[self.cursor];
            self.cursor += 1;
            Some(r)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_encodes_raw_values() {
        let mut c = DirectCanonicalizer::new();
        c.reset();
        assert_eq!(c.canonicalize(ObjRef(42)), 42);
        assert_eq!(c.canonicalize(ObjRef(42)), 42);
        assert_eq!(c.canonicalize(ObjRef(7)), 7);
        // each object queued exactly once
        assert_eq!(c.next_pending(), Some(ObjRef(42)));
        assert_eq!(c.next_pending(), Some(ObjRef(7)));
        assert_eq!(c.next_pending(), None);
    }

    #[test]
    fn test_invmap_assigns_encounter_order() {
        let mut c = InvMapCanonicalizer::new();
        assert_eq!(c.canonicalize(ObjRef(100_000_007)), 1);
        assert_eq!(c.canonicalize(ObjRef(3)), 2);
        assert_eq!(c.canonicalize(ObjRef(100_000_007)), 1);
        assert_eq!(c.existing_encoding(ObjRef(3)), 2);
        assert_eq!(c.existing_encoding(ObjRef(999)), 0);
        assert_eq!(c.encode_null(ObjRef::NULL), -1);
    }

    #[test]
    fn test_invmap_worklist_is_inverse_array() {
        let mut c = InvMapCanonicalizer::new();
        c.canonicalize(ObjRef(50));
        c.canonicalize(ObjRef(60));
        assert_eq!(c.next_pending(), Some(ObjRef(50)));
        // discovering mid-drain extends the same pass
        c.canonicalize(ObjRef(70));
        assert_eq!(c.next_pending(), Some(ObjRef(60)));
        assert_eq!(c.next_pending(), Some(ObjRef(70)));
        assert_eq!(c.next_pending(), None);
    }

    #[test]
    fn test_reset_clears_assignments() {
        let mut c = InvMapCanonicalizer::new();
        c.canonicalize(ObjRef(5));
        c.reset();
        assert_eq!(c.existing_encoding(ObjRef(5)), 0);
        assert_eq!(c.canonicalize(ObjRef(9)), 1);
    }
}
