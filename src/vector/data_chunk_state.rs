//! Component G (state half): selection vectors and flat/unflat state
//! (spec §4.G).

use std::ops::Range;

/// Which positions of a shared [`DataChunkState`] are currently live.
#[derive(Debug, Clone)]
pub enum SelVector {
    /// `0..size`, i.e. every slot selected.
    Range(Range<usize>),
    /// An explicit, possibly reordered, subset of slot indices.
    Indices(Vec<usize>),
}

impl SelVector {
    pub fn full(size: usize) -> Self {
        SelVector::Range(0..size)
    }

    pub fn len(&self) -> usize {
        match self {
            SelVector::Range(r) => r.len(),
            SelVector::Indices(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> usize {
        match self {
            SelVector::Range(r) => r.start + i,
            SelVector::Indices(v) => v[i],
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            SelVector::Range(r) => Box::new(r.clone()),
            SelVector::Indices(v) => Box::new(v.iter().copied()),
        }
    }
}

/// Shared by every [`crate::vector::value_vector::ValueVector`] in one data
/// chunk so they expose identical `selected_size` semantics (spec §4.G
/// invariant).
#[derive(Debug, Clone)]
pub struct DataChunkState {
    pub sel: SelVector,
    pub is_flat: bool,
    /// Cursor position when `is_flat`.
    pub current_idx: usize,
    /// Pre-selection size, needed so nested (list/struct) scans can find
    /// the full child range even after a selection vector narrows the
    /// visible rows.
    pub original_size: usize,
}

impl DataChunkState {
    pub fn new(size: usize) -> Self {
        Self {
            sel: SelVector::full(size),
            is_flat: false,
            current_idx: 0,
            original_size: size,
        }
    }

    pub fn set_flat(&mut self, idx: usize) {
        self.is_flat = true;
        self.current_idx = idx;
    }

    pub fn set_unflat(&mut self) {
        self.is_flat = false;
    }

    /// Number of rows currently visible: 1 when flat, else the selection's
    /// cardinality.
    pub fn selected_size(&self) -> usize {
        if self.is_flat {
            1
        } else {
            self.sel.len()
        }
    }

    /// Resolves the `i`-th visible logical row to its underlying storage
    /// slot, respecting flat/unflat state.
    pub fn resolve(&self, i: usize) -> usize {
        if self.is_flat {
            self.current_idx
        } else {
            self.sel.get(i)
        }
    }
}
