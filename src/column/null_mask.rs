//! Null bitmap for a column chunk (spec §3 invariant:
//! `null_mask.count_ones + count_zeros == num_values`).
//!
//! Uses `bit_vec`, the same crate used elsewhere in this crate for leaf-page
//! slot headers.

use bit_vec::BitVec;

#[derive(Debug, Clone)]
pub struct NullMask {
    bits: BitVec,
}

impl NullMask {
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: BitVec::from_elem(capacity, false),
        }
    }

    pub fn is_null(&self, pos: usize) -> bool {
        self.bits.get(pos).unwrap_or(false)
    }

    pub fn set_null(&mut self, pos: usize, is_null: bool) {
        if pos >= self.bits.len() {
            self.bits.grow(pos + 1 - self.bits.len(), false);
        }
        self.bits.set(pos, is_null);
    }

    pub fn null_count(&self) -> usize {
        self.bits.iter().filter(|b| *b).count()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        let mut bits = BitVec::from_bytes(bytes);
        bits.truncate(len);
        Self { bits }
    }
}
