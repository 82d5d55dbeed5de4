#![warn(clippy::pedantic)]

/// Fixed-capacity history of the most recent `2^n` values, used for the per-sweep drift and peak
/// count logs. Writes never allocate; once full, each push overwrites the oldest entry.
/// Unlike a zero-filled log it remembers how many entries have really been written, so iteration
/// only ever yields recorded values, oldest first.
/// NOTE:
/// the capacity is a power of two so that `i % capacity` is `i & (capacity - 1)`
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone)]
pub struct DyadicRingBuffer<T: Copy + Default> {
    exponent: usize,
    mask: usize,
    // index the next push writes to, before masking
    head: usize,
    filled: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> DyadicRingBuffer<T> {
    /// `None` for exponents above 20; a million entries is far more history than any log here needs.
    #[must_use]
    pub fn new(exponent: usize) -> Option<Self> {
        if exponent > 20 {
            return None;
        };
        Some(DyadicRingBuffer {
            exponent,
            mask: (1 << exponent) - 1,
            head: 0,
            filled: 0,
            data: vec![T::default(); 1 << exponent],
        })
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    #[must_use]
    pub fn exponent(&self) -> usize {
        self.exponent
    }

    /// Number of entries actually recorded, at most the capacity.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn push(&mut self, val: T) {
        self.data[self.head & self.mask] = val;
        self.head = self.head.wrapping_add(1);
        self.filled = (self.filled + 1).min(self.capacity());
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, new_vals: I) {
        for i in new_vals {
            self.push(i);
        }
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    #[must_use]
    pub fn latest(&self) -> Option<T> {
        (self.filled > 0).then(|| self.data[self.head.wrapping_sub(1) & self.mask])
    }

    /// All recorded entries, oldest first.
    #[must_use]
    pub fn iter(&self) -> Iter<T> {
        self.last_n(self.filled)
    }

    /// The newest `num` entries (or fewer, if fewer were recorded), oldest first.
    #[must_use]
    pub fn last_n(&self, num: usize) -> Iter<T> {
        let remaining = num.min(self.filled);
        Iter {
            parent: self,
            posn: self.head.wrapping_sub(remaining),
            remaining,
        }
    }
}

impl DyadicRingBuffer<f64> {
    /// Sum of the recorded entries.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.iter().sum()
    }

    /// Mean and (population) variance of the recorded entries.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_variance(&self) -> Option<(f64, f64)> {
        if self.filled == 0 {
            return None;
        }
        let n = self.filled as f64;
        let mean = self.sum() / n;
        let var = self.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        Some((mean, var))
    }
}

pub struct Iter<'a, T: Default + Copy> {
    parent: &'a DyadicRingBuffer<T>,
    posn: usize,
    remaining: usize,
}

impl<'a, T: Default + Copy> Iterator for Iter<'a, T> {
    type Item = T;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.parent.data[self.posn & self.parent.mask];
        self.posn = self.posn.wrapping_add(1);
        self.remaining -= 1;
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T: Default + Copy> ExactSizeIterator for Iter<'a, T> {}

impl<'a, T: Default + Copy> IntoIterator for &'a DyadicRingBuffer<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;
    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        let buff = DyadicRingBuffer::<f64>::new(8).expect("should allocate");
        assert_eq!(buff.capacity(), 256);
        assert_eq!(buff.exponent(), 8);
        assert!(buff.is_empty());

        let buff = DyadicRingBuffer::<f64>::new(0).expect("should allocate");
        assert_eq!(buff.capacity(), 1);

        assert!(DyadicRingBuffer::<f64>::new(24).is_none());
    }

    #[test]
    fn partially_filled() {
        let mut buff = DyadicRingBuffer::new(4).expect("should allocate");
        buff.extend([1.0, 2.0, 3.0]);
        assert_eq!(buff.len(), 3);
        assert_eq!(buff.iter().collect::<Vec<f64>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buff.latest(), Some(3.0));
        assert_eq!(buff.sum(), 6.0);
    }

    #[test]
    fn wraps_oldest_first() {
        let mut buff = DyadicRingBuffer::new(3).expect("should allocate");
        for i in 0..10 {
            buff.push(i);
        }
        assert_eq!(buff.len(), 8);
        let vec_ref: Vec<i32> = (2..10).collect();
        assert_eq!(buff.iter().collect::<Vec<i32>>(), vec_ref);
        assert_eq!(buff.last_n(3).collect::<Vec<i32>>(), vec![7, 8, 9]);
        assert_eq!(buff.last_n(100).len(), 8);
        assert_eq!(buff.latest(), Some(9));
    }

    #[test]
    fn statistics() {
        let mut buff = DyadicRingBuffer::new(2).expect("should allocate");
        assert!(buff.mean_variance().is_none());
        buff.extend([1.0, 3.0, 5.0, 7.0, 9.0]);
        let (mean, var) = buff.mean_variance().unwrap();
        assert!((mean - 6.0).abs() < 1.0e-12);
        assert!((var - 5.0).abs() < 1.0e-12);
        buff.clear();
        assert!(buff.latest().is_none());
    }
}
