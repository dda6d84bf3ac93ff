//! Variable-width bitset over a compile-time word capacity.
//!
//! A `BitSet<WORDS>` stores up to `WORDS * 32` bits, of which the first
//! `bit_count` are addressable. Bits at or past `bit_count` are always zero;
//! every mutating operation re-establishes that before returning.
//!
//! Two bitsets are only combinable when their `bit_count`s match. The word
//! capacity of the operands may differ, so a 255-bit mask held in a
//! 1024-bit container still combines with a plain `BitSet255`.

use crate::error::{PerfError, Result};

pub const BITS_PER_WORD: usize = 32;

/// Number of 32-bit words needed to hold `n` bits.
pub const fn words_for_bits(n: usize) -> usize {
    n.div_ceil(BITS_PER_WORD)
}

pub type BitSet32 = BitSet<{ words_for_bits(32) }>;
pub type BitSet255 = BitSet<{ words_for_bits(255) }>;
pub type BitSet1024 = BitSet<{ words_for_bits(1024) }>;
pub type BitSet2048 = BitSet<{ words_for_bits(2048) }>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitSet<const WORDS: usize> {
    bit_count: usize,
    words: [u32; WORDS],
}

#[inline]
const fn word_of(idx: usize) -> usize {
    idx / BITS_PER_WORD
}

#[inline]
const fn bit_of(idx: usize) -> u32 {
    1u32 << (idx % BITS_PER_WORD)
}

/// Bits of word `w` that fall inside `[first, last]`.
fn range_mask(w: usize, first: usize, last: usize) -> u32 {
    let lo = w * BITS_PER_WORD;
    let hi = lo + BITS_PER_WORD - 1;
    if last < lo || first > hi {
        return 0;
    }
    let start = first.max(lo) - lo;
    let end = last.min(hi) - lo;
    let width = end - start + 1;
    let ones = if width == BITS_PER_WORD { u32::MAX } else { (1u32 << width) - 1 };
    ones << start
}

impl<const WORDS: usize> BitSet<WORDS> {
    /// Highest `bit_count` this container can hold.
    pub const fn capacity() -> usize {
        WORDS * BITS_PER_WORD
    }

    /// All-zero bitset addressing `bit_count` bits.
    ///
    /// Panics if `bit_count` exceeds the container capacity.
    pub const fn new(bit_count: usize) -> Self {
        assert!(bit_count <= WORDS * BITS_PER_WORD, "bit count exceeds bitset capacity");
        Self {
            bit_count,
            words: [0; WORDS],
        }
    }

    /// Zero-fill and (re)establish the addressable width.
    pub fn init(&mut self, bit_count: usize) {
        assert!(bit_count <= Self::capacity(), "bit count exceeds bitset capacity");
        self.bit_count = bit_count;
        self.words = [0; WORDS];
    }

    #[inline]
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    #[inline]
    fn used_words(&self) -> usize {
        words_for_bits(self.bit_count)
    }

    #[inline]
    fn check_index(&self, idx: usize) {
        assert!(idx < self.bit_count, "bit index {idx} out of bounds ({})", self.bit_count);
    }

    /// Force every bit at or past `bit_count` to zero.
    fn normalize(&mut self) {
        let used = self.used_words();
        for w in &mut self.words[used..] {
            *w = 0;
        }
        let rem = self.bit_count % BITS_PER_WORD;
        if rem != 0 {
            self.words[used - 1] &= (1u32 << rem) - 1;
        }
    }

    pub fn get(&self, idx: usize) -> bool {
        self.check_index(idx);
        self.words[word_of(idx)] & bit_of(idx) != 0
    }

    pub fn set(&mut self, idx: usize) {
        self.check_index(idx);
        self.words[word_of(idx)] |= bit_of(idx);
    }

    pub fn clear(&mut self, idx: usize) {
        self.check_index(idx);
        self.words[word_of(idx)] &= !bit_of(idx);
    }

    pub fn invert(&mut self, idx: usize) {
        self.check_index(idx);
        self.words[word_of(idx)] ^= bit_of(idx);
    }

    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    pub fn set_all(&mut self) {
        let used = self.used_words();
        for w in &mut self.words[..used] {
            *w = u32::MAX;
        }
        self.normalize();
    }

    pub fn invert_all(&mut self) {
        let used = self.used_words();
        for w in &mut self.words[..used] {
            *w = !*w;
        }
        self.normalize();
    }

    fn check_range(&self, first: usize, last: usize) -> Result<()> {
        if first > last {
            return Err(PerfError::InvalidArgument("bit range start past end"));
        }
        if last >= self.bit_count {
            return Err(PerfError::InvalidArgument("bit range past bit count"));
        }
        Ok(())
    }

    /// Set every bit in `[first, last]`.
    pub fn set_range(&mut self, first: usize, last: usize) -> Result<()> {
        self.check_range(first, last)?;
        for w in word_of(first)..=word_of(last) {
            self.words[w] |= range_mask(w, first, last);
        }
        Ok(())
    }

    /// Clear every bit in `[first, last]`.
    pub fn clear_range(&mut self, first: usize, last: usize) -> Result<()> {
        self.check_range(first, last)?;
        for w in word_of(first)..=word_of(last) {
            self.words[w] &= !range_mask(w, first, last);
        }
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Index of the lowest set bit; `None` when the mask is empty.
    pub fn lowest_set_index(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * BITS_PER_WORD + w.trailing_zeros() as usize)
    }

    /// Index of the highest set bit; `None` when the mask is empty.
    pub fn highest_set_index(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * BITS_PER_WORD + (BITS_PER_WORD - 1 - w.leading_zeros() as usize))
    }

    /// Index of the lowest clear bit below `bit_count`; `None` when full.
    pub fn lowest_clear_index(&self) -> Option<usize> {
        for (i, w) in self.words[..self.used_words()].iter().enumerate() {
            let inverted = !*w;
            if inverted != 0 {
                let idx = i * BITS_PER_WORD + inverted.trailing_zeros() as usize;
                return (idx < self.bit_count).then_some(idx);
            }
        }
        None
    }

    fn combine<const A: usize, const B: usize>(
        &mut self,
        a: &BitSet<A>,
        b: &BitSet<B>,
        op: impl Fn(u32, u32) -> u32,
    ) -> Result<()> {
        if a.bit_count != self.bit_count || b.bit_count != self.bit_count {
            return Err(PerfError::InvalidArgument("bitset size mismatch"));
        }
        for i in 0..self.used_words() {
            self.words[i] = op(a.words[i], b.words[i]);
        }
        Ok(())
    }

    /// `self = a & b`.
    pub fn and<const A: usize, const B: usize>(&mut self, a: &BitSet<A>, b: &BitSet<B>) -> Result<()> {
        self.combine(a, b, |x, y| x & y)
    }

    /// `self = a | b`.
    pub fn or<const A: usize, const B: usize>(&mut self, a: &BitSet<A>, b: &BitSet<B>) -> Result<()> {
        self.combine(a, b, |x, y| x | y)
    }

    /// `self = a ^ b`.
    pub fn xor<const A: usize, const B: usize>(&mut self, a: &BitSet<A>, b: &BitSet<B>) -> Result<()> {
        self.combine(a, b, |x, y| x ^ y)
    }

    pub fn copy<const S: usize>(&mut self, src: &BitSet<S>) -> Result<()> {
        if !self.size_equal(src) {
            return Err(PerfError::InvalidArgument("bitset size mismatch"));
        }
        let used = self.used_words();
        self.words[..used].copy_from_slice(&src.words[..used]);
        Ok(())
    }

    /// Copy only the bits in `[first, last]` from `src`; the rest of `self`
    /// is left as it was.
    pub fn copy_range<const S: usize>(&mut self, src: &BitSet<S>, first: usize, last: usize) -> Result<()> {
        if !self.size_equal(src) {
            return Err(PerfError::InvalidArgument("bitset size mismatch"));
        }
        self.check_range(first, last)?;
        for w in word_of(first)..=word_of(last) {
            let mask = range_mask(w, first, last);
            self.words[w] = (self.words[w] & !mask) | (src.words[w] & mask);
        }
        Ok(())
    }

    pub fn size_equal<const O: usize>(&self, other: &BitSet<O>) -> bool {
        self.bit_count == other.bit_count
    }

    /// Every bit set in `self` is also set in `other`. Sizes that differ
    /// yield `false`.
    pub fn is_subset<const O: usize>(&self, other: &BitSet<O>) -> bool {
        if !self.size_equal(other) {
            return false;
        }
        (0..self.used_words()).all(|i| self.words[i] & !other.words[i] == 0)
    }

    pub fn is_equal<const O: usize>(&self, other: &BitSet<O>) -> bool {
        self.size_equal(other) && self.words[..self.used_words()] == other.words[..self.used_words()]
    }

    /// Load from a wire mask of 32-bit words. Trailing garbage past
    /// `bit_count` is discarded.
    pub fn import_from(&mut self, wire: &[u32], expected_bit_count: usize) -> Result<()> {
        if expected_bit_count != self.bit_count {
            return Err(PerfError::InvalidArgument("wire bit count does not match bitset"));
        }
        let used = self.used_words();
        if wire.len() < used {
            return Err(PerfError::InvalidArgument("wire mask too short"));
        }
        self.words[..used].copy_from_slice(&wire[..used]);
        self.normalize();
        Ok(())
    }

    /// Store into a wire mask; words of `wire` past the bitset are zeroed.
    pub fn export_to(&self, wire: &mut [u32], expected_bit_count: usize) -> Result<()> {
        if expected_bit_count != self.bit_count {
            return Err(PerfError::InvalidArgument("wire bit count does not match bitset"));
        }
        let used = self.used_words();
        if wire.len() < used {
            return Err(PerfError::InvalidArgument("wire mask too short"));
        }
        wire[..used].copy_from_slice(&self.words[..used]);
        for w in &mut wire[used..] {
            *w = 0;
        }
        Ok(())
    }

    /// Set-bit indices in ascending order. Calling `iter` again restarts
    /// from the lowest bit.
    pub fn iter(&self) -> SetBits<'_> {
        SetBits {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl<'a, const WORDS: usize> IntoIterator for &'a BitSet<WORDS> {
    type Item = usize;
    type IntoIter = SetBits<'a>;

    fn into_iter(self) -> SetBits<'a> {
        self.iter()
    }
}

/// Iterator over set bit indices, produced by [`BitSet::iter`].
#[derive(Clone, Debug)]
pub struct SetBits<'a> {
    words: &'a [u32],
    word_idx: usize,
    current: u32,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * BITS_PER_WORD + bit);
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}
