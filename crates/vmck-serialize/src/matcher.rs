//! Glob matching for class, method, and field names.
//!
//! Filter configuration names things with `*` wildcards ("runtime.*",
//! "Point.y", "*.mod_count"). Patterns are compiled once into anchored
//! regexes when the configuration is built, never per lookup.

use crate::{SerializeError, SerializeResult};
use regex::Regex;

fn compile_glob(pattern: &str) -> SerializeResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|source| SerializeError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A set of glob patterns; a name matches if any pattern does.
#[derive(Debug, Clone)]
pub struct NameSetMatcher {
    regexes: Vec<Regex>,
}

impl NameSetMatcher {
    pub fn new(patterns: &[String]) -> SerializeResult<Self> {
        let regexes = patterns
            .iter()
            .map(|p| compile_glob(p))
            .collect::<SerializeResult<Vec<_>>>()?;
        Ok(Self { regexes })
    }

    /// `None` for an empty pattern list, so "no include list" and "no
    /// exclude list" stay distinguishable from "a list matching nothing".
    pub fn non_empty(patterns: &[String]) -> SerializeResult<Option<Self>> {
        if patterns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::new(patterns)?))
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regexes.iter().any(|r| r.is_match(name))
    }
}

/// Combined include/exclude decision: included unless an include list exists
/// and misses, or an exclude list exists and hits.
pub fn matches_set(
    name: &str,
    include: Option<&NameSetMatcher>,
    exclude: Option<&NameSetMatcher>,
) -> bool {
    if let Some(inc) = include {
        if !inc.matches(name) {
            return false;
        }
    }
    if let Some(exc) = exclude {
        if exc.matches(name) {
            return false;
        }
    }
    true
}

/// A "Class.field" glob pair, split at the last dot. Both halves may carry
/// wildcards; a spec with no dot matches the field name in any class.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    class: Option<Regex>,
    field: Regex,
}

impl FieldSpec {
    pub fn parse(spec: &str) -> SerializeResult<Self> {
        match spec.rsplit_once('.') {
            Some((class_pat, field_pat)) => Ok(Self {
                class: Some(compile_glob(class_pat)?),
                field: compile_glob(field_pat)?,
            }),
            None => Ok(Self {
                class: None,
                field: compile_glob(spec)?,
            }),
        }
    }

    pub fn matches(&self, class_name: &str, field_name: &str) -> bool {
        if let Some(class) = &self.class {
            if !class.is_match(class_name) {
                return false;
            }
        }
        self.field.is_match(field_name)
    }
}
