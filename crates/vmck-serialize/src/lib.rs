//! State serialization and canonicalization for state-revisit detection.
//!
//! The search driver asks for a fingerprint of the current program state
//! once per transition; the state store compares fingerprints for exact
//! equality to decide whether the search has been here before. This crate
//! owns everything between those two points: walking the live object graph
//! exactly once per state, applying field/frame filter policies, optionally
//! substituting user abstractions for concrete values, and encoding object
//! references so the result is deterministic.

pub mod abstraction;
pub mod bitset;
pub mod buffer;
pub mod cache;
pub mod canon;
pub mod matcher;
pub mod policy;
pub mod serializer;
pub mod sparse;

use thiserror::Error;

pub use abstraction::{Abstraction, AbstractionRegistry, FieldAbstractionSpec, ScalarValue};
pub use bitset::{SlotMask, SlotMaskBuilder};
pub use buffer::IntBuffer;
pub use cache::PolicyCache;
pub use canon::{Canonicalizer, DirectCanonicalizer, InvMapCanonicalizer};
pub use matcher::{FieldSpec, NameSetMatcher};
pub use policy::{
    AmendableFilterPolicy, DefaultFilterPolicy, FieldAmendment, FilterPolicy, FrameAmendment,
    FramePolicy, IgnoreFields, IgnoreFinalScalarStatics, IgnoresFromAttributes,
    IncludesFromAttributes, UnfilterFields,
};
pub use serializer::{FilteringSerializer, InvMapSerializer, SerializerConfig, StateSerializer};
pub use sparse::SparseIntMap;

/// Serialization error.
///
/// A self-consistent snapshot never fails to serialize; the only failure
/// class is a configuration invariant violation, which indicates a bug in
/// policy wiring and aborts the whole run rather than skipping a state.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("filter configuration invariant violated for class '{class}': {detail}")]
    FilterConfig { class: String, detail: String },

    #[error("invalid name pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type SerializeResult<T> = Result<T, SerializeError>;
