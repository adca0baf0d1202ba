//! Utility structs and methods
use std::cmp::Ordering::Less;

/// Iterator of all one-way pairwise combinations of row indicies
///
/// Every unordered pair `(a, b)` with `a < b < n` is returned exactly once,
/// ordered by `a` and then by `b`.
///
/// # Examples
/// ```
/// use comutation::utils::GenePairs;
///
/// let mut c = GenePairs::new(3);
///
/// assert_eq!(c.next(), Some((0, 1)));
/// assert_eq!(c.next(), Some((0, 2)));
/// assert_eq!(c.next(), Some((1, 2)));
/// assert!(c.next().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct GenePairs {
    n: usize,
    last: usize,
    idx1: usize,
    idx2: usize,
}

impl GenePairs {
    /// Creates a new iterator of all pairs of `n` rows
    pub fn new(n: usize) -> Self {
        Self {
            n,
            last: n,
            idx1: 0,
            idx2: 1,
        }
    }

    /// Creates a new iterator of all pairs where `idx` is the first row
    ///
    /// ```
    /// use comutation::utils::GenePairs;
    ///
    /// let pairs: Vec<(usize, usize)> = GenePairs::row(4, 1).collect();
    /// assert_eq!(pairs, vec![(1, 2), (1, 3)]);
    /// ```
    pub fn row(n: usize, idx: usize) -> Self {
        Self {
            n,
            last: (idx + 1).min(n),
            idx1: idx,
            idx2: idx + 1,
        }
    }

    /// The total number of pairs of `n` rows
    pub fn count_pairs(n: usize) -> usize {
        n * n.saturating_sub(1) / 2
    }
}

impl Iterator for GenePairs {
    type Item = (usize, usize);
    fn next(&mut self) -> Option<Self::Item> {
        match (self.idx1 < self.last, self.idx2.cmp(&self.n)) {
            (true, Less) => {
                self.idx2 += 1;
                Some((self.idx1, self.idx2 - 1))
            }
            (true, _) => {
                self.idx1 += 1;
                self.idx2 = self.idx1 + 1;
                self.next()
            }
            _ => None,
        }
    }
}
