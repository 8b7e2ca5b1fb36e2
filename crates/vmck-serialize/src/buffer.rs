//! Accumulation buffer for fingerprint words.

/// Growable sequence of 32-bit words. One fingerprint computation appends
/// into a single buffer, which is cleared (capacity kept) at the start of
/// the next computation.
#[derive(Debug, Default)]
pub struct IntBuffer {
    data: Vec<i32>,
}

impl IntBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, v: i32) {
        self.data.push(v);
    }

    #[inline]
    pub fn extend_from_slice(&mut self, vs: &[i32]) {
        self.data.extend_from_slice(vs);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// Copy out the accumulated words.
    pub fn to_vec(&self) -> Vec<i32> {
        self.data.clone()
    }
}
