//! Class, field, and method metadata.
//!
//! Ids are dense and stable: `ClassTable` assigns them in load order and
//! never reuses them, so downstream caches can be plain arrays indexed by
//! id instead of hash maps.

use ahash::AHashMap;

/// Dense, stable id assigned once per loaded class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

impl ClassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

/// Dense, stable id assigned once per method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

impl MethodId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

/// Value kind of a field, which fixes its storage footprint.
///
/// Reference fields are always one slot wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Long,
    Double,
    Ref,
}

impl FieldKind {
    /// Number of 32-bit storage slots the field occupies.
    #[inline]
    pub fn storage_size(self) -> u32 {
        match self {
            FieldKind::Int | FieldKind::Float | FieldKind::Ref => 1,
            FieldKind::Long | FieldKind::Double => 2,
        }
    }

    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(self, FieldKind::Ref)
    }
}

/// Load-time attribute flags on a field, standing in for source-level
/// annotations. Filter policies may honor them; the field descriptor itself
/// is never mutated after class load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldAttrs {
    /// Field was tagged "never serialize".
    pub filter: bool,
    /// Field was tagged "always serialize", overriding ignore heuristics.
    pub unfilter: bool,
    pub is_final: bool,
}

/// Load-time attribute flags on a method, controlling frame serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameAttrs {
    /// Drop locals and operand stack from frames of this method.
    pub filter_data: bool,
    /// Drop the program counter from frames of this method.
    pub filter_pc: bool,
    /// Do not serialize caller frames below frames of this method.
    pub filter_subframes: bool,
}

/// A field as declared when building a class.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    pub attrs: FieldAttrs,
    /// Inherited from a superclass rather than declared by this class.
    pub inherited: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attrs: FieldAttrs::default(),
            inherited: false,
        }
    }

    pub fn with_attrs(mut self, attrs: FieldAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }
}

/// Resolved field metadata: declaration plus its storage offset.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub kind: FieldKind,
    /// Offset of the first slot in the owning storage vector.
    pub storage_offset: u32,
    pub attrs: FieldAttrs,
    pub inherited: bool,
}

impl FieldInfo {
    #[inline]
    pub fn storage_size(&self) -> u32 {
        self.kind.storage_size()
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.kind.is_reference()
    }

    #[inline]
    pub fn is_one_slot(&self) -> bool {
        self.storage_size() == 1
    }
}

/// Method metadata. `full_name` is "Class.method" and is what name-based
/// frame filters match against.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub id: MethodId,
    pub full_name: String,
    pub frame_attrs: FrameAttrs,
}

/// Resolved class metadata.
///
/// `instance_fields` lists all instance fields, inherited ones included,
/// with offsets into the instance storage vector; `static_fields` likewise
/// for the class's static storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub instance_fields: Vec<FieldInfo>,
    pub static_fields: Vec<FieldInfo>,
    pub instance_storage_size: u32,
    pub static_storage_size: u32,
}

impl ClassInfo {
    /// Fields declared by this class itself (not inherited).
    pub fn declared_instance_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.instance_fields.iter().filter(|f| !f.inherited)
    }

    pub fn declared_static_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.static_fields.iter().filter(|f| !f.inherited)
    }
}

fn resolve_fields(decls: Vec<FieldDecl>) -> (Vec<FieldInfo>, u32) {
    let mut offset = 0u32;
    let mut fields = Vec::with_capacity(decls.len());
    for d in decls {
        let size = d.kind.storage_size();
        fields.push(FieldInfo {
            name: d.name,
            kind: d.kind,
            storage_offset: offset,
            attrs: d.attrs,
            inherited: d.inherited,
        });
        offset += size;
    }
    (fields, offset)
}

/// Registry of loaded classes and methods, assigning dense ids in load order.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: Vec<ClassInfo>,
    by_name: AHashMap<String, ClassId>,
    methods: Vec<MethodInfo>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, computing storage offsets from declaration order.
    /// The returned id is never reused.
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        instance_decls: Vec<FieldDecl>,
        static_decls: Vec<FieldDecl>,
    ) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let name = name.into();
        let (instance_fields, instance_storage_size) = resolve_fields(instance_decls);
        let (static_fields, static_storage_size) = resolve_fields(static_decls);
        self.by_name.insert(name.clone(), id);
        self.classes.push(ClassInfo {
            id,
            name,
            instance_fields,
            static_fields,
            instance_storage_size,
            static_storage_size,
        });
        id
    }

    pub fn add_method(&mut self, full_name: impl Into<String>, frame_attrs: FrameAttrs) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(MethodInfo {
            id,
            full_name: full_name.into(),
            frame_attrs,
        });
        id
    }

    #[inline]
    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.index()]
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.by_name.get(name).map(|id| self.class(*id))
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &MethodInfo {
        &self.methods[id.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

impl PartialEq for ClassTable {
    fn eq(&self, other: &Self) -> bool {
        self.classes == other.classes && self.methods == other.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_offsets() {
        let mut table = ClassTable::new();
        let cid = table.add_class(
            "Mix",
            vec![
                FieldDecl::new("a", FieldKind::Int),
                FieldDecl::new("b", FieldKind::Long),
                FieldDecl::new("c", FieldKind::Ref),
            ],
            vec![],
        );
        let ci = table.class(cid);
        assert_eq!(ci.instance_fields[0].storage_offset, 0);
        assert_eq!(ci.instance_fields[1].storage_offset, 1);
        assert_eq!(ci.instance_fields[2].storage_offset, 3);
        assert_eq!(ci.instance_storage_size, 4);
    }

    #[test]
    fn test_dense_ids() {
        let mut table = ClassTable::new();
        let a = table.add_class("A", vec![], vec![]);
        let b = table.add_class("B", vec![], vec![]);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(table.class_by_name("B").unwrap().id, b);
    }

    #[test]
    fn test_declared_vs_inherited() {
        let mut table = ClassTable::new();
        let cid = table.add_class(
            "Sub",
            vec![
                FieldDecl::new("base", FieldKind::Int).inherited(),
                FieldDecl::new("own", FieldKind::Int),
            ],
            vec![],
        );
        let ci = table.class(cid);
        let declared: Vec<_> = ci.declared_instance_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(declared, vec!["own"]);
    }
}
