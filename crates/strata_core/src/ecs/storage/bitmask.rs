// bitmask.rs - Growable bit sets over u64 words
//
// Used for archetype signatures (which types are present) and for the
// per-column live flags. Bits past `len` are always zero so derived equality
// compares set contents.

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bitmask {
    words: Vec<u64>,
    len: usize,
}

impl Bitmask {
    /// All-clear mask of `len` bits.
    pub fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `additional` cleared bits.
    pub fn grow(&mut self, additional: usize) {
        self.len += additional;
        self.words.resize(self.len.div_ceil(WORD_BITS), 0);
    }

    #[inline]
    pub fn set(&mut self, bit: usize) {
        self.check(bit);
        self.words[bit / WORD_BITS] |= 1 << (bit % WORD_BITS);
    }

    #[inline]
    pub fn clear(&mut self, bit: usize) {
        self.check(bit);
        self.words[bit / WORD_BITS] &= !(1 << (bit % WORD_BITS));
    }

    #[inline]
    pub fn test(&self, bit: usize) -> bool {
        self.check(bit);
        self.words[bit / WORD_BITS] & (1 << (bit % WORD_BITS)) != 0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of set bits strictly below `bit`.
    pub fn count_ones_below(&self, bit: usize) -> usize {
        assert!(bit <= self.len, "bit {bit} out of range for mask of {} bits", self.len);
        let full = bit / WORD_BITS;
        let mut count: usize = self.words[..full].iter().map(|w| w.count_ones() as usize).sum();
        let rem = bit % WORD_BITS;
        if rem != 0 {
            count += (self.words[full] & ((1u64 << rem) - 1)).count_ones() as usize;
        }
        count
    }

    /// First clear bit at or after `start`, scanning a word at a time.
    pub fn first_clear_from(&self, start: usize) -> Option<usize> {
        self.scan_from(start, |w| !w)
    }

    /// First set bit at or after `start`.
    pub fn first_set_from(&self, start: usize) -> Option<usize> {
        self.scan_from(start, |w| w)
    }

    /// Whether every bit of `self` below `n_bits` is also set in `other`.
    /// Bits beyond `other`'s length count as clear.
    pub fn is_subset_of(&self, other: &Bitmask, n_bits: usize) -> bool {
        let n_bits = n_bits.min(self.len);
        let full = n_bits / WORD_BITS;
        let rem = n_bits % WORD_BITS;
        let other_word = |i: usize| other.words.get(i).copied().unwrap_or(0);

        let full_ok = self.words[..full]
            .iter()
            .enumerate()
            .all(|(i, &w)| w & !other_word(i) == 0);
        if !full_ok {
            return false;
        }
        if rem == 0 {
            return true;
        }
        let mine = self.words[full] & ((1u64 << rem) - 1);
        mine & !other_word(full) == 0
    }

    /// Set bits in ascending order.
    pub fn iter_ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn scan_from(&self, start: usize, view: impl Fn(u64) -> u64) -> Option<usize> {
        if start >= self.len {
            return None;
        }
        let mut index = start / WORD_BITS;
        let mut word = view(self.words[index]) & (!0u64 << (start % WORD_BITS));
        loop {
            if word != 0 {
                let bit = index * WORD_BITS + word.trailing_zeros() as usize;
                return (bit < self.len).then_some(bit);
            }
            index += 1;
            if index >= self.words.len() {
                return None;
            }
            word = view(self.words[index]);
        }
    }

    #[inline]
    fn check(&self, bit: usize) {
        assert!(bit < self.len, "bit {bit} out of range for mask of {} bits", self.len);
    }
}

/// Iterator over set bit positions.
pub struct Ones<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.index * WORD_BITS + bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(len: usize, bits: &[usize]) -> Bitmask {
        let mut m = Bitmask::with_len(len);
        for &b in bits {
            m.set(b);
        }
        m
    }

    #[test]
    fn test_count_ones_below() {
        let m = mask(130, &[0, 3, 64, 65, 129]);
        assert_eq!(m.count_ones_below(0), 0);
        assert_eq!(m.count_ones_below(3), 1);
        assert_eq!(m.count_ones_below(4), 2);
        assert_eq!(m.count_ones_below(64), 2);
        assert_eq!(m.count_ones_below(66), 4);
        assert_eq!(m.count_ones_below(130), 5);
    }

    #[test]
    fn test_first_clear_from_spans_words() {
        let mut m = Bitmask::with_len(70);
        for b in 0..66 {
            m.set(b);
        }
        assert_eq!(m.first_clear_from(0), Some(66));
        m.clear(5);
        assert_eq!(m.first_clear_from(0), Some(5));
        assert_eq!(m.first_clear_from(6), Some(66));

        for b in 66..70 {
            m.set(b);
        }
        m.set(5);
        // Bits past len are zero in storage but never reported.
        assert_eq!(m.first_clear_from(0), None);
        assert_eq!(m.first_clear_from(70), None);
    }

    #[test]
    fn test_subset() {
        let a = mask(8, &[1, 4]);
        let b = mask(8, &[1, 2, 4]);
        assert!(a.is_subset_of(&b, 8));
        assert!(!b.is_subset_of(&a, 8));
        // Only the first n bits take part.
        assert!(b.is_subset_of(&a, 2));
        assert!(Bitmask::with_len(8).is_subset_of(&a, 8));
    }

    #[test]
    fn test_grow_keeps_bits_and_clears_new_ones() {
        let mut m = mask(63, &[62]);
        m.grow(10);
        assert_eq!(m.len(), 73);
        assert!(m.test(62));
        assert_eq!(m.first_set_from(63), None);
        assert_eq!(m.iter_ones().collect::<Vec<_>>(), vec![62]);
    }

    #[test]
    fn test_iter_ones() {
        let m = mask(200, &[0, 63, 64, 150]);
        assert_eq!(m.iter_ones().collect::<Vec<_>>(), vec![0, 63, 64, 150]);
        assert_eq!(Bitmask::default().iter_ones().next(), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_out_of_range() {
        Bitmask::with_len(4).set(4);
    }
}
