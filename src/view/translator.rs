//! Origin-based frame indexes <-> zero-based playback positions.
//!
//! Items expose sparse or offset frame numbers (e.g. `[100, 101, 105]`);
//! playback and UI controls work on positions `0..total_frames`. Both
//! conversions are total: inputs outside the current set clamp into it, and
//! an empty set passes values through unchanged.

use std::collections::HashMap;

use log::debug;

#[derive(Debug, Clone, Default)]
pub struct FrameIndexTranslator {
    /// Sorted, unique origin indexes
    indexes: Vec<i32>,
    positions: HashMap<i32, usize>,
}

impl FrameIndexTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active index set.
    pub fn set_frames_indexes(&mut self, keys: impl IntoIterator<Item = i32>) {
        let mut indexes: Vec<i32> = keys.into_iter().collect();
        indexes.sort_unstable();
        indexes.dedup();

        self.positions = indexes.iter().enumerate().map(|(pos, idx)| (*idx, pos)).collect();
        self.indexes = indexes;
        debug!(
            "Frame indexes set: {} frames ({:?}..={:?})",
            self.indexes.len(),
            self.first_frame_index(),
            self.last_frame_index()
        );
    }

    pub fn clear(&mut self) {
        self.indexes.clear();
        self.positions.clear();
    }

    pub fn to_zero_based(&self, origin: i32) -> usize {
        if let Some(pos) = self.positions.get(&origin) {
            return *pos;
        }
        if self.indexes.is_empty() {
            return usize::try_from(origin).unwrap_or(0);
        }
        // Not in the set: position of the nearest index at or below, clamped
        match self.indexes.binary_search(&origin) {
            Ok(pos) => pos,
            Err(0) => 0,
            Err(insert_at) => insert_at - 1,
        }
    }

    pub fn to_origin_based(&self, zero: usize) -> i32 {
        match self.indexes.last() {
            None => i32::try_from(zero).unwrap_or(i32::MAX),
            Some(last) => self.indexes.get(zero).copied().unwrap_or(*last),
        }
    }

    pub fn first_frame_index(&self) -> Option<i32> {
        self.indexes.first().copied()
    }

    pub fn last_frame_index(&self) -> Option<i32> {
        self.indexes.last().copied()
    }

    pub fn total_frames(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn contains(&self, origin: i32) -> bool {
        self.positions.contains_key(&origin)
    }

    pub fn indexes(&self) -> &[i32] {
        &self.indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator(keys: &[i32]) -> FrameIndexTranslator {
        let mut t = FrameIndexTranslator::new();
        t.set_frames_indexes(keys.iter().copied());
        t
    }

    #[test]
    fn test_round_trip_sparse_set() {
        let t = translator(&[105, 100, 101, 101, 250]);
        assert_eq!(t.indexes(), &[100, 101, 105, 250]);
        assert_eq!(t.total_frames(), 4);

        for (zero, origin) in t.indexes().iter().enumerate() {
            assert_eq!(t.to_zero_based(*origin), zero);
            assert_eq!(t.to_origin_based(zero), *origin);
            assert_eq!(t.to_zero_based(t.to_origin_based(zero)), zero);
        }
        assert_eq!((t.first_frame_index(), t.last_frame_index()), (Some(100), Some(250)));
    }

    #[test]
    fn test_out_of_set_clamps() {
        let t = translator(&[10, 20, 30]);
        assert_eq!(t.to_zero_based(5), 0);
        assert_eq!(t.to_zero_based(25), 1);
        assert_eq!(t.to_zero_based(99), 2);
        assert_eq!(t.to_origin_based(7), 30);
        assert!(!t.contains(25));
    }

    #[test]
    fn test_empty_set_passes_through() {
        let t = FrameIndexTranslator::new();
        assert_eq!(t.to_zero_based(4), 4);
        assert_eq!(t.to_zero_based(-4), 0);
        assert_eq!(t.to_origin_based(4), 4);
        assert_eq!(t.first_frame_index(), None);
        assert!(t.is_empty());
    }

    #[test]
    fn test_replacing_set_drops_old_mapping() {
        let mut t = translator(&[1, 2, 3]);
        t.set_frames_indexes([7, 8]);
        assert!(!t.contains(1));
        assert_eq!(t.to_zero_based(8), 1);
        assert_eq!(t.total_frames(), 2);
    }
}
