//! Track which fields of a record were written since a draft was opened.
//!
//! Drafts use this to skip UPDATE statements for records nobody touched and
//! to report which columns changed in logs.

/// A compact bitset representing "field is dirty" for indices `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldsSet {
    len: usize,
    bits: Box<[u64]>,
}

impl FieldsSet {
    /// Create an empty (all-clean) set for `len` fields.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        let words = len.div_ceil(64);
        Self {
            len,
            bits: vec![0u64; words].into_boxed_slice(),
        }
    }

    /// Create a full (all-dirty) set for `len` fields.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut s = Self::empty(len);
        for idx in 0..len {
            s.set(idx);
        }
        s
    }

    /// Number of fields represented by this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if `len == 0`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark a field index as dirty. Indices outside `0..len` are ignored.
    pub fn set(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Mark a field index as clean.
    pub fn unset(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w &= !(1u64 << (idx % 64));
        }
    }

    /// Check whether a field index is dirty.
    #[must_use]
    pub fn is_set(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.bits
            .get(idx / 64)
            .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// Whether any field is dirty.
    #[must_use]
    pub fn any(&self) -> bool {
        self.bits.iter().any(|w| *w != 0)
    }

    /// Number of dirty fields.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Mark every field clean.
    pub fn clear(&mut self) {
        for w in &mut self.bits {
            *w = 0;
        }
    }

    /// Iterate over dirty indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|idx| self.is_set(*idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut s = FieldsSet::empty(70);
        assert!(!s.any());
        s.set(0);
        s.set(65);
        s.set(200);
        assert!(s.is_set(65));
        assert!(!s.is_set(200));
        assert_eq!(s.count(), 2);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![0, 65]);

        s.unset(0);
        assert_eq!(s.count(), 1);
        s.clear();
        assert!(!s.any());
    }

    #[test]
    fn test_all() {
        let s = FieldsSet::all(3);
        assert_eq!(s.count(), 3);
        assert!(FieldsSet::all(0).is_empty());
    }
}
