//! Heap objects and their field storage.
//!
//! Storage is a tagged union over array and named-field layouts; named
//! fields live in a flat `i32` slot vector addressed by the offsets in
//! `ClassInfo`. Wide values (long/double) occupy two slots, high half first.

use crate::class::ClassId;
use ahash::AHashMap;

/// A heap reference. Negative values are the null/invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub i32);

impl ObjRef {
    pub const NULL: ObjRef = ObjRef(-1);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

/// Named-field storage: a flat slot vector sized to the class footprint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedStorage {
    slots: Vec<i32>,
}

impl NamedStorage {
    pub fn new(storage_size: u32) -> Self {
        Self {
            slots: vec![0; storage_size as usize],
        }
    }

    #[inline]
    pub fn slots(&self) -> &[i32] {
        &self.slots
    }

    #[inline]
    pub fn get_int(&self, off: u32) -> i32 {
        self.slots[off as usize]
    }

    #[inline]
    pub fn get_float(&self, off: u32) -> f32 {
        f32::from_bits(self.slots[off as usize] as u32)
    }

    #[inline]
    pub fn get_long(&self, off: u32) -> i64 {
        let hi = self.slots[off as usize] as i64;
        let lo = self.slots[off as usize + 1] as u32 as i64;
        (hi << 32) | lo
    }

    #[inline]
    pub fn get_double(&self, off: u32) -> f64 {
        f64::from_bits(self.get_long(off) as u64)
    }

    #[inline]
    pub fn get_ref(&self, off: u32) -> ObjRef {
        ObjRef(self.slots[off as usize])
    }

    pub fn set_int(&mut self, off: u32, v: i32) {
        self.slots[off as usize] = v;
    }

    pub fn set_float(&mut self, off: u32, v: f32) {
        self.slots[off as usize] = v.to_bits() as i32;
    }

    pub fn set_long(&mut self, off: u32, v: i64) {
        self.slots[off as usize] = (v >> 32) as i32;
        self.slots[off as usize + 1] = v as i32;
    }

    pub fn set_double(&mut self, off: u32, v: f64) {
        self.set_long(off, v.to_bits() as i64);
    }

    pub fn set_ref(&mut self, off: u32, r: ObjRef) {
        self.slots[off as usize] = r.as_i32();
    }
}

/// Array storage, split by element kind: reference arrays keep their
/// elements as refs, scalar arrays as a raw slot block (wide elements take
/// two slots each, so the slot count can exceed the element count).
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayStorage {
    Refs(Vec<ObjRef>),
    Scalars { element_count: i32, slots: Vec<i32> },
}

impl ArrayStorage {
    pub fn from_ints(values: Vec<i32>) -> Self {
        ArrayStorage::Scalars {
            element_count: values.len() as i32,
            slots: values,
        }
    }

    pub fn from_longs(values: &[i64]) -> Self {
        let mut slots = Vec::with_capacity(values.len() * 2);
        for v in values {
            slots.push((v >> 32) as i32);
            slots.push(*v as i32);
        }
        ArrayStorage::Scalars {
            element_count: values.len() as i32,
            slots,
        }
    }

    pub fn length(&self) -> i32 {
        match self {
            ArrayStorage::Refs(refs) => refs.len() as i32,
            ArrayStorage::Scalars { element_count, .. } => *element_count,
        }
    }
}

/// Field storage of one heap object.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Array(ArrayStorage),
    Named(NamedStorage),
}

/// A live heap object: its class plus field storage.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    pub class_id: ClassId,
    pub storage: Storage,
}

impl HeapObject {
    pub fn named(class_id: ClassId, fields: NamedStorage) -> Self {
        Self {
            class_id,
            storage: Storage::Named(fields),
        }
    }

    pub fn array(class_id: ClassId, array: ArrayStorage) -> Self {
        Self {
            class_id,
            storage: Storage::Array(array),
        }
    }
}

/// The heap: a sparse map from reference value to object.
///
/// Reference values are interpreter-assigned and may be arbitrarily sparse;
/// nothing here assumes density or any particular allocation order.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    objects: AHashMap<i32, HeapObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, r: ObjRef, obj: HeapObject) {
        self.objects.insert(r.as_i32(), obj);
    }

    #[inline]
    pub fn get(&self, r: ObjRef) -> Option<&HeapObject> {
        self.objects.get(&r.as_i32())
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut HeapObject> {
        self.objects.get_mut(&r.as_i32())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn refs(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.objects.keys().map(|k| ObjRef(*k))
    }
}

impl PartialEq for Heap {
    fn eq(&self, other: &Self) -> bool {
        self.objects == other.objects
    }
}
