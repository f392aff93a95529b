//! File-index selection sets and their range compression.

use serde::{Deserialize, Serialize};

/// Highest file index a bootstrap can address.
pub const MAX_FILE_INDEX: u32 = i32::MAX as u32;

/// A closed interval of file indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub first: u32,
    pub last: u32,
}

impl IndexRange {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn point(index: u32) -> Self {
        Self::new(index, index)
    }

    pub fn count(&self) -> u64 {
        u64::from(self.last) - u64::from(self.first) + 1
    }

    /// Part of this range inside `[first, last]`, if they overlap at all.
    pub fn clip(&self, first: u32, last: u32) -> Option<IndexRange> {
        let inside = (self.first >= first && self.first <= last)
            || (self.last >= first && self.last <= last)
            || (self.first < first && self.last > last);
        if !inside {
            return None;
        }
        Some(IndexRange::new(self.first.max(first), self.last.min(last)))
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.first && index <= self.last
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// Which file indexes of one job are selected.
///
/// Index 0 is never stored: it marks directory placeholders that carry no
/// data on the media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileIndexSelector {
    All,
    Indexes { set: Vec<u32>, sorted: bool },
}

impl Default for FileIndexSelector {
    fn default() -> Self {
        FileIndexSelector::Indexes {
            set: Vec::new(),
            sorted: true,
        }
    }
}

impl FileIndexSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u32) {
        if index == 0 {
            return;
        }
        if let FileIndexSelector::Indexes { set, sorted } = self {
            if let Some(&last) = set.last() {
                if index == last {
                    return;
                }
                if index < last {
                    *sorted = false;
                }
            }
            set.push(index);
        }
    }

    pub fn select_all(&mut self) {
        *self = FileIndexSelector::All;
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FileIndexSelector::All)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FileIndexSelector::All => false,
            FileIndexSelector::Indexes { set, .. } => set.is_empty(),
        }
    }

    /// Sorts and deduplicates the explicit set if insertion left it unordered.
    pub fn sort(&mut self) {
        if let FileIndexSelector::Indexes { set, sorted } = self {
            if !*sorted {
                set.sort_unstable();
                set.dedup();
                *sorted = true;
            }
        }
    }

    /// Minimal list of closed intervals covering the selection.
    pub fn ranges(&mut self) -> Vec<IndexRange> {
        self.sort();
        match self {
            FileIndexSelector::All => vec![IndexRange::new(1, MAX_FILE_INDEX)],
            FileIndexSelector::Indexes { set, .. } => compress(set),
        }
    }
}

/// Merges runs of consecutive values of a sorted, deduplicated slice.
pub fn compress(sorted: &[u32]) -> Vec<IndexRange> {
    let mut ranges: Vec<IndexRange> = Vec::new();
    for &index in sorted {
        match ranges.last_mut() {
            Some(r) if r.last.checked_add(1) == Some(index) => r.last = index,
            _ => ranges.push(IndexRange::point(index)),
        }
    }
    ranges
}
