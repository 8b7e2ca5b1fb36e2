//! User-supplied value abstractions for intentional state merging.
//!
//! An abstraction replaces a field's concrete value with a coarser integer
//! in the fingerprint, so distinct concrete states can collapse into one
//! matched state. Abstractions are bound to fields by name glob at class
//! load time and kept in an immutable registry keyed by class id and field
//! index; field metadata itself is never touched.

use crate::matcher::FieldSpec;
use std::sync::Arc;
use tracing::info;
use vmck_kernel::{ClassId, ClassInfo, ObjRef};

/// A scalar field value routed through the single-value abstraction hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

/// User-supplied substitute encoding for a field.
pub trait Abstraction {
    /// Abstract integer emitted for a scalar field value.
    fn abstract_scalar(&self, v: ScalarValue) -> i32;

    /// Abstract integer emitted for a reference field value.
    fn abstract_reference(&self, r: ObjRef) -> i32;

    /// Whether the referenced object must still be walked for liveness.
    /// An abstraction may collapse many objects to one fingerprint value
    /// while their sub-graphs still matter, or prune the walk entirely.
    fn traverse_reference(&self, _r: ObjRef) -> bool {
        true
    }
}

/// A field glob bound to an abstraction implementation.
pub struct FieldAbstractionSpec {
    pub field: FieldSpec,
    pub abstraction: Arc<dyn Abstraction>,
}

type FieldSlots = Vec<Option<Arc<dyn Abstraction>>>;

/// Immutable per-class attachment table, populated once per loaded class.
#[derive(Default)]
pub struct AbstractionRegistry {
    specs: Vec<FieldAbstractionSpec>,
    /// Indexed by class id, then by position in `instance_fields`.
    instance: Vec<Option<FieldSlots>>,
    /// Indexed by class id, then by position in `static_fields`.
    statics: Vec<Option<FieldSlots>>,
}

impl AbstractionRegistry {
    pub fn new(specs: Vec<FieldAbstractionSpec>) -> Self {
        Self {
            specs,
            instance: Vec::new(),
            statics: Vec::new(),
        }
    }

    /// Class-load hook: match every spec against the class's declared
    /// fields and record the attachments. Idempotent per class.
    pub fn on_class_loaded(&mut self, ci: &ClassInfo) {
        let idx = ci.id.index();
        if idx >= self.instance.len() {
            self.instance.resize_with(idx + 1, || None);
            self.statics.resize_with(idx + 1, || None);
        }
        if self.instance[idx].is_some() {
            return;
        }

        let mut inst: FieldSlots = vec![None; ci.instance_fields.len()];
        for (i, fi) in ci.instance_fields.iter().enumerate() {
            if fi.inherited {
                continue;
            }
            for spec in &self.specs {
                if spec.field.matches(&ci.name, &fi.name) {
                    info!(class = %ci.name, field = %fi.name, "attached instance field abstraction");
                    inst[i] = Some(spec.abstraction.clone());
                }
            }
        }

        let mut stat: FieldSlots = vec![None; ci.static_fields.len()];
        for (i, fi) in ci.static_fields.iter().enumerate() {
            if fi.inherited {
                continue;
            }
            for spec in &self.specs {
                if spec.field.matches(&ci.name, &fi.name) {
                    info!(class = %ci.name, field = %fi.name, "attached static field abstraction");
                    stat[i] = Some(spec.abstraction.clone());
                }
            }
        }

        self.instance[idx] = Some(inst);
        self.statics[idx] = Some(stat);
    }

    pub fn instance_abstraction(
        &self,
        cid: ClassId,
        field_idx: usize,
    ) -> Option<&Arc<dyn Abstraction>> {
        self.instance
            .get(cid.index())?
            .as_ref()?
            .get(field_idx)?
            .as_ref()
    }

    pub fn static_abstraction(
        &self,
        cid: ClassId,
        field_idx: usize,
    ) -> Option<&Arc<dyn Abstraction>> {
        self.statics
            .get(cid.index())?
            .as_ref()?
            .get(field_idx)?
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmck_kernel::{ClassTable, FieldDecl, FieldKind};

    struct Sign;

    impl Abstraction for Sign {
        fn abstract_scalar(&self, v: ScalarValue) -> i32 {
            match v {
                ScalarValue::Int(n) => n.signum(),
                ScalarValue::Long(n) => n.signum() as i32,
                ScalarValue::Float(f) => (f > 0.0) as i32 - (f < 0.0) as i32,
                ScalarValue::Double(f) => (f > 0.0) as i32 - (f < 0.0) as i32,
            }
        }

        fn abstract_reference(&self, r: ObjRef) -> i32 {
            if r.is_null() {
                0
            } else {
                1
            }
        }
    }

    #[test]
    fn test_attach_by_glob() {
        let mut table = ClassTable::new();
        let cid = table.add_class(
            "Acct",
            vec![
                FieldDecl::new("balance", FieldKind::Int),
                FieldDecl::new("owner", FieldKind::Ref),
            ],
            vec![FieldDecl::new("total", FieldKind::Long)],
        );
        let ci = table.class(cid);

        let mut reg = AbstractionRegistry::new(vec![FieldAbstractionSpec {
            field: FieldSpec::parse("Acct.balance").unwrap(),
            abstraction: Arc::new(Sign),
        }]);
        reg.on_class_loaded(ci);

        assert!(reg.instance_abstraction(cid, 0).is_some());
        assert!(reg.instance_abstraction(cid, 1).is_none());
        assert!(reg.static_abstraction(cid, 0).is_none());
    }

    #[test]
    fn test_inherited_fields_not_attached() {
        let mut table = ClassTable::new();
        let cid = table.add_class(
            "Sub",
            vec![
                FieldDecl::new("balance", FieldKind::Int).inherited(),
                FieldDecl::new("balance_local", FieldKind::Int),
            ],
            vec![],
        );
        let ci = table.class(cid);

        let mut reg = AbstractionRegistry::new(vec![FieldAbstractionSpec {
            field: FieldSpec::parse("*.balance*").unwrap(),
            abstraction: Arc::new(Sign),
        }]);
        reg.on_class_loaded(ci);

        assert!(reg.instance_abstraction(cid, 0).is_none());
        assert!(reg.instance_abstraction(cid, 1).is_some());
    }

    #[test]
    fn test_unloaded_class_lookup_is_none() {
        let reg = AbstractionRegistry::new(vec![]);
        assert!(reg.instance_abstraction(ClassId(5), 0).is_none());
    }
}
