//! Fixed-width coverage bit vectors.
//!
//! Bit positions are index-ordered: bit `i` corresponds to line index
//! `i` of whichever index space (full or reduced) the vector was built
//! in. The declared width always travels with the value; two vectors
//! from different spaces never combine.

use anyhow::{bail, Result};

const BLOCK_BITS: usize = 64;

/// An unsigned, fixed-width binary vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovBitVec {
    blocks: Vec<u64>,
    width: usize,
}

impl CovBitVec {
    /// All-zero vector of the given width.
    pub fn zeroed(width: usize) -> Self {
        Self {
            blocks: vec![0u64; width.div_ceil(BLOCK_BITS)],
            width,
        }
    }

    /// Declared width in bits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Set bit `i`.
    pub fn set(&mut self, i: usize) {
        assert!(i < self.width, "bit {} out of range for width {}", i, self.width);
        self.blocks[i / BLOCK_BITS] |= 1u64 << (i % BLOCK_BITS);
    }

    /// Read bit `i`.
    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.width, "bit {} out of range for width {}", i, self.width);
        self.blocks[i / BLOCK_BITS] >> (i % BLOCK_BITS) & 1 == 1
    }

    /// Bitwise OR of `other` into `self`. Widths must match.
    pub fn or_assign(&mut self, other: &CovBitVec) {
        assert_eq!(
            self.width, other.width,
            "cannot merge vectors from different index spaces"
        );
        for (a, b) in self.blocks.iter_mut().zip(&other.blocks) {
            *a |= b;
        }
    }

    /// True iff `self AND other` has at least one set bit.
    pub fn intersects(&self, other: &CovBitVec) -> bool {
        assert_eq!(
            self.width, other.width,
            "cannot intersect vectors from different index spaces"
        );
        self.blocks.iter().zip(&other.blocks).any(|(a, b)| a & b != 0)
    }

    /// True iff every set bit of `self` is also set in `other`.
    pub fn is_subset_of(&self, other: &CovBitVec) -> bool {
        assert_eq!(self.width, other.width);
        self.blocks.iter().zip(&other.blocks).all(|(a, b)| a & !b == 0)
    }

    /// Number of set bits.
    pub fn popcount(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// True iff no bit is set.
    pub fn is_zero(&self) -> bool {
        self.blocks.iter().all(|b| *b == 0)
    }

    /// Indices of set bits, ascending.
    pub fn ones(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.popcount());
        for (block_idx, block) in self.blocks.iter().enumerate() {
            let mut bits = *block;
            while bits != 0 {
                let tz = bits.trailing_zeros() as usize;
                out.push(block_idx * BLOCK_BITS + tz);
                bits &= bits - 1;
            }
        }
        out
    }

    /// Render as '0'/'1' text, char `i` = bit `i`. This is the stored
    /// form; the explicit length column is written alongside it.
    pub fn to_bit_string(&self) -> String {
        (0..self.width).map(|i| if self.get(i) { '1' } else { '0' }).collect()
    }

    /// Parse the stored '0'/'1' text against its declared width.
    pub fn from_bit_string(s: &str, declared_width: usize) -> Result<Self> {
        if s.len() != declared_width {
            bail!(
                "bit sequence length {} does not match declared width {}",
                s.len(),
                declared_width
            );
        }
        let mut v = Self::zeroed(declared_width);
        for (i, c) in s.chars().enumerate() {
            match c {
                '1' => v.set(i),
                '0' => {}
                other => bail!("invalid bit character {:?} at position {}", other, i),
            }
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_ones(width: usize, ones: &[usize]) -> CovBitVec {
        let mut v = CovBitVec::zeroed(width);
        for &i in ones {
            v.set(i);
        }
        v
    }

    #[test]
    fn set_get_popcount_across_block_boundary() {
        let v = from_ones(130, &[0, 63, 64, 129]);
        assert_eq!(v.popcount(), 4);
        assert_eq!(v.ones(), vec![0, 63, 64, 129]);
        assert!(v.get(63) && v.get(64));
        assert!(!v.get(1));
    }

    #[test]
    fn bit_string_round_trip_keeps_declared_width() {
        let v = from_ones(9, &[3, 7]);
        let s = v.to_bit_string();
        assert_eq!(s, "000100010");
        let back = CovBitVec::from_bit_string(&s, 9).unwrap();
        assert_eq!(back, v);
        // Width must be declared, never inferred.
        assert!(CovBitVec::from_bit_string(&s, 12).is_err());
        assert!(CovBitVec::from_bit_string("0102", 4).is_err());
    }

    #[test]
    fn intersects_and_subset() {
        let a = from_ones(10, &[3, 7, 9]);
        let b = from_ones(10, &[7, 9, 2]);
        let c = from_ones(10, &[1]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(from_ones(10, &[7]).is_subset_of(&a));
        assert!(!b.is_subset_of(&a));
    }
}
