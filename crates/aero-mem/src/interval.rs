use std::collections::BTreeMap;

/// A segment-tree-style interval set over the 64-bit key space.
///
/// Stores disjoint, maximal `[start, end]` (inclusive) ranges as a
/// `BTreeMap<start, end>`. `set`/`reset` merge/split neighboring ranges so
/// that storage stays proportional to the number of touched regions rather
/// than to the number of `set`/`reset` calls, and `get` is a single
/// predecessor lookup.
#[derive(Debug, Clone, Default)]
pub struct IntervalArray {
    intervals: BTreeMap<u64, u64>,
}

impl IntervalArray {
    pub fn new() -> Self {
        Self {
            intervals: BTreeMap::new(),
        }
    }

    /// `true` iff `key` lies in some range inserted by `set` and not
    /// subsequently removed by `reset`.
    pub fn get(&self, key: u64) -> bool {
        match self.intervals.range(..=key).next_back() {
            Some((_, &end)) => end >= key,
            None => false,
        }
    }

    /// Marks `[lo, hi]` (inclusive) as present, merging any overlapping or
    /// directly-adjacent existing ranges.
    pub fn set(&mut self, lo: u64, hi: u64) {
        assert!(lo <= hi, "set: lo {lo:#x} > hi {hi:#x}");

        let mut new_lo = lo;
        let mut new_hi = hi;
        let mut to_remove = Vec::new();

        // Left neighbor: the range (if any) starting at or before `lo` that
        // overlaps it (`e >= lo`) or directly touches it (`e == lo - 1`).
        if let Some((&s, &e)) = self.intervals.range(..=lo).next_back() {
            if e >= lo || (lo > 0 && e == lo - 1) {
                new_lo = new_lo.min(s);
                new_hi = new_hi.max(e);
                to_remove.push(s);
            }
        }

        // Every range starting within `[lo, hi + 1]` overlaps or is
        // adjacent (touching from the right at `hi + 1`) to the new range
        // and must be folded in. Saturate at `u64::MAX` since no range can
        // start past it.
        let scan_end = hi.checked_add(1).unwrap_or(u64::MAX);
        for (&s, &e) in self.intervals.range(lo..=scan_end) {
            new_lo = new_lo.min(s);
            new_hi = new_hi.max(e);
            to_remove.push(s);
        }

        for s in to_remove {
            self.intervals.remove(&s);
        }
        self.intervals.insert(new_lo, new_hi);
    }

    /// Removes `[lo, hi]` (inclusive) from the set, splitting any range that
    /// partially overlaps it.
    pub fn reset(&mut self, lo: u64, hi: u64) {
        assert!(lo <= hi, "reset: lo {lo:#x} > hi {hi:#x}");

        let overlapping: Vec<(u64, u64)> = self
            .intervals
            .range(..=hi)
            .filter(|&(_, &e)| e >= lo)
            .map(|(&s, &e)| (s, e))
            .collect();

        for (s, e) in overlapping {
            self.intervals.remove(&s);
            if s < lo {
                self.intervals.insert(s, lo - 1);
            }
            if e > hi {
                self.intervals.insert(hi + 1, e);
            }
        }
    }

    /// Iterates the disjoint `[start, end]` ranges currently marked present,
    /// in ascending order. Exposed for diagnostics/tests only.
    pub fn ranges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.intervals.iter().map(|(&s, &e)| (s, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_array_has_nothing_set() {
        let a = IntervalArray::new();
        assert!(!a.get(0));
        assert!(!a.get(u64::MAX));
    }

    #[test]
    fn set_then_get_within_range() {
        let mut a = IntervalArray::new();
        a.set(10, 20);
        for k in 10..=20 {
            assert!(a.get(k), "{k} should be set");
        }
        assert!(!a.get(9));
        assert!(!a.get(21));
    }

    #[test]
    fn overlapping_sets_merge() {
        let mut a = IntervalArray::new();
        a.set(0, 10);
        a.set(5, 20);
        assert_eq!(a.ranges().collect::<Vec<_>>(), vec![(0, 20)]);
    }

    #[test]
    fn adjacent_sets_merge_into_one_range() {
        let mut a = IntervalArray::new();
        a.set(0, 9);
        a.set(10, 19);
        assert_eq!(a.ranges().collect::<Vec<_>>(), vec![(0, 19)]);
    }

    #[test]
    fn disjoint_sets_stay_separate() {
        let mut a = IntervalArray::new();
        a.set(0, 5);
        a.set(10, 15);
        assert_eq!(a.ranges().collect::<Vec<_>>(), vec![(0, 5), (10, 15)]);
        assert!(!a.get(7));
    }

    #[test]
    fn reset_splits_a_range() {
        let mut a = IntervalArray::new();
        a.set(0, 20);
        a.reset(5, 10);
        assert_eq!(a.ranges().collect::<Vec<_>>(), vec![(0, 4), (11, 20)]);
        for k in 5..=10 {
            assert!(!a.get(k));
        }
    }

    #[test]
    fn reset_removes_whole_range() {
        let mut a = IntervalArray::new();
        a.set(0, 20);
        a.reset(0, 20);
        assert_eq!(a.ranges().count(), 0);
    }

    #[test]
    fn set_then_reset_same_range_returns_to_prior_state() {
        let mut a = IntervalArray::new();
        a.set(0, 5);
        a.set(20, 25);
        let before: Vec<_> = a.ranges().collect();

        a.set(8, 12);
        a.reset(8, 12);

        assert_eq!(a.ranges().collect::<Vec<_>>(), before);
        for k in 0..=30u64 {
            let expected = (0..=5).contains(&k) || (20..=25).contains(&k);
            assert_eq!(a.get(k), expected, "mismatch at {k}");
        }
    }

    #[test]
    fn handles_extreme_boundaries_without_overflow() {
        let mut a = IntervalArray::new();
        a.set(u64::MAX - 1, u64::MAX);
        assert!(a.get(u64::MAX));
        a.reset(u64::MAX, u64::MAX);
        assert!(a.get(u64::MAX - 1));
        assert!(!a.get(u64::MAX));
    }
}
