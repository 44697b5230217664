//! LID occupancy tracking: the used-LIDs table and the free-range list.

use ibsm_types::{Guid, Lid, LidRange, Lmc};
use tracing::debug;

/// LID → reserving GUID, grown on demand. Slot 0 is the sentinel for the
/// invalid LID and is never reserved.
///
/// Lookups past the end of the table answer "free": the table only grows
/// as high as the highest reservation, and everything above it is
/// untouched space.
#[derive(Debug, Default)]
pub struct UsedLids {
    slots: Vec<Option<Guid>>,
}

impl UsedLids {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lid: Lid) -> Option<Guid> {
        self.slots.get(lid.as_usize()).copied().flatten()
    }

    pub fn mark(&mut self, lid: Lid, guid: Guid) {
        let index = lid.as_usize();
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(guid);
    }

    pub fn clear(&mut self, lid: Lid) {
        if let Some(slot) = self.slots.get_mut(lid.as_usize()) {
            *slot = None;
        }
    }

    /// Empties every slot without shrinking the table.
    pub fn clear_all(&mut self) {
        self.slots.fill(None);
    }

    /// Drops marks held by `guid` within `[min, min + count - 1]`,
    /// leaving other owners' reservations alone.
    pub fn clear_owned_range(&mut self, min: Lid, count: u16, guid: Guid) {
        for delta in 0..count {
            let lid = min.offset(delta);
            if self.get(lid) == Some(guid) {
                self.clear(lid);
            }
        }
    }

    /// True if none of `[min, min + count - 1]` is reserved.
    pub fn range_is_free(&self, min: Lid, count: u16) -> bool {
        (0..count).all(|delta| self.get(min.offset(delta)).is_none())
    }

    /// Highest LID the table has a slot for.
    pub fn max_lid(&self) -> u16 {
        self.slots.len().saturating_sub(1) as u16
    }
}

/// One free range of consecutive LIDs, both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub min: Lid,
    pub max: Lid,
}

/// Ordered list of disjoint free LID ranges.
///
/// The sweep initializer appends ranges in ascending order; allocation
/// consumes them front to back. Ranges are non-empty, strictly ascending
/// and never adjacent.
#[derive(Debug, Default)]
pub struct FreeRangeList {
    ranges: Vec<FreeRange>,
}

impl FreeRangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Appends a range; must sort strictly after everything present.
    pub fn push(&mut self, range: FreeRange) {
        debug_assert!(range.min <= range.max);
        debug_assert!(self
            .ranges
            .last()
            .map_or(true, |last| last.max.value() + 1 < range.min.value()));
        debug!("new free lid range [{}:{}]", range.min, range.max);
        self.ranges.push(range);
    }

    pub fn ranges(&self) -> &[FreeRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// First-fit search for `count` consecutive LIDs. Multi-LID requests
    /// are aligned per `lmc`; the skipped alignment gap at the head of a
    /// range is discarded along with the allocation.
    ///
    /// Returns `None` when no range can satisfy the request.
    pub fn find(&mut self, count: u16, lmc: Lmc) -> Option<LidRange> {
        for i in 0..self.ranges.len() {
            let range = self.ranges[i];
            let start = if count > 1 {
                lmc.align_up(range.min)
            } else {
                range.min
            };
            let end = start.value() + count - 1;
            if end <= range.max.value() {
                if end == range.max.value() {
                    self.ranges.remove(i);
                } else {
                    self.ranges[i].min = Lid::new(end + 1);
                }
                return Some(LidRange::new(start, Lid::new(end)));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn free(min: u16, max: u16) -> FreeRange {
        FreeRange {
            min: Lid::new(min),
            max: Lid::new(max),
        }
    }

    fn lmc(value: u8) -> Lmc {
        Lmc::new(value).unwrap()
    }

    #[test]
    fn test_used_lids_out_of_range_is_free() {
        let mut used = UsedLids::new();
        used.mark(Lid::new(4), Guid::new(0xA));

        assert_eq!(used.get(Lid::new(4)), Some(Guid::new(0xA)));
        assert_eq!(used.get(Lid::new(1000)), None);
        assert!(used.range_is_free(Lid::new(5), 200));
        assert!(!used.range_is_free(Lid::new(3), 2));
    }

    #[test]
    fn test_used_lids_clear_owned_range() {
        let mut used = UsedLids::new();
        used.mark(Lid::new(4), Guid::new(0xA));
        used.mark(Lid::new(5), Guid::new(0xB));

        used.clear_owned_range(Lid::new(4), 4, Guid::new(0xA));
        assert_eq!(used.get(Lid::new(4)), None);
        // Another owner's reservation survives.
        assert_eq!(used.get(Lid::new(5)), Some(Guid::new(0xB)));
    }

    #[test]
    fn test_used_lids_clear_all_keeps_capacity() {
        let mut used = UsedLids::new();
        used.mark(Lid::new(9), Guid::new(0xA));
        used.clear_all();
        assert_eq!(used.get(Lid::new(9)), None);
        assert_eq!(used.max_lid(), 9);
    }

    #[test]
    fn test_find_aligns_and_discards_gap() {
        let mut list = FreeRangeList::new();
        list.push(free(1, 100));

        let got = list.find(4, lmc(2)).unwrap();
        assert_eq!(got, LidRange::new(Lid::new(4), Lid::new(7)));
        // LIDs 1-3 were skipped for alignment and are gone from the list.
        assert_eq!(list.ranges(), &[free(8, 100)]);
    }

    #[test]
    fn test_find_single_lid_needs_no_alignment() {
        let mut list = FreeRangeList::new();
        list.push(free(3, 100));

        let got = list.find(1, lmc(2)).unwrap();
        assert_eq!(got, LidRange::single(Lid::new(3)));
        assert_eq!(list.ranges(), &[free(4, 100)]);
    }

    #[test]
    fn test_find_skips_too_small_range() {
        let mut list = FreeRangeList::new();
        list.push(free(1, 3));
        list.push(free(16, 19));

        let got = list.find(4, lmc(2)).unwrap();
        assert_eq!(got, LidRange::new(Lid::new(16), Lid::new(19)));
        // The consumed range is removed outright; the small one remains.
        assert_eq!(list.ranges(), &[free(1, 3)]);
    }

    #[test]
    fn test_find_exhaustion() {
        let mut list = FreeRangeList::new();
        list.push(free(1, 3));
        assert_eq!(list.find(4, lmc(2)), None);
        assert!(list.find(1, lmc(2)).is_some());
    }
}
