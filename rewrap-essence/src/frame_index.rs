//! Frame offset index for variable-size essence.
//!
//! Each entry is the byte offset of a frame start relative to the essence
//! start. The final entry marks the end of the last frame, so an index with
//! `n` entries describes `n - 1` frames.

use crate::error::{EssenceError, Result};

const RESERVE_STEP: usize = 8192;

/// Append-only table of frame offsets.
#[derive(Debug, Clone, Default)]
pub struct FrameOffsetIndex {
    offsets: Vec<i64>,
    /// Committed duration, overrides the inferred one when set.
    duration: Option<i64>,
    complete: bool,
}

impl FrameOffsetIndex {
    pub fn new() -> Self {
        FrameOffsetIndex::default()
    }

    /// Build an index from known offsets.
    pub fn from_offsets(offsets: impl IntoIterator<Item = i64>) -> Result<Self> {
        let mut index = FrameOffsetIndex::new();
        for offset in offsets {
            index.append_offset(offset)?;
        }
        Ok(index)
    }

    /// Append a frame offset. Offsets must be strictly increasing.
    pub fn append_offset(&mut self, offset: i64) -> Result<()> {
        if let Some(&last) = self.offsets.last() {
            if offset <= last {
                return Err(EssenceError::NonMonotonicOffset { offset, last });
            }
        }
        if self.offsets.len() == self.offsets.capacity() {
            self.offsets.reserve(RESERVE_STEP);
        }
        self.offsets.push(offset);
        Ok(())
    }

    pub fn have_offset(&self, position: i64) -> bool {
        position >= 0 && (position as usize) < self.offsets.len()
    }

    /// Offset of the frame at `position`.
    pub fn offset(&self, position: i64) -> Result<i64> {
        if !self.have_offset(position) {
            return Err(EssenceError::PositionOutOfRange {
                position,
                available: self.offsets.len(),
            });
        }
        Ok(self.offsets[position as usize])
    }

    /// Size of the frame at `position`, if both of its boundaries are known.
    pub fn frame_size(&self, position: i64) -> Option<i64> {
        if position < 0 {
            return None;
        }
        let pos = position as usize;
        match (self.offsets.get(pos), self.offsets.get(pos + 1)) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Committed duration, or the number of frames described so far.
    pub fn duration(&self) -> i64 {
        match self.duration {
            Some(d) => d,
            None => self.offsets.len() as i64 - 1,
        }
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.duration = Some(duration);
    }

    /// The most recent `(offset, position)` pair, the resume point for parsing.
    pub fn last_offset_and_position(&self) -> Option<(i64, i64)> {
        self.offsets
            .last()
            .map(|&offset| (offset, self.offsets.len() as i64 - 1))
    }

    /// True once end of stream has been reached.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_lookup() {
        let mut index = FrameOffsetIndex::new();
        index.append_offset(0).unwrap();
        index.append_offset(100).unwrap();
        index.append_offset(250).unwrap();

        assert!(index.have_offset(2));
        assert!(!index.have_offset(3));
        assert_eq!(index.offset(1).unwrap(), 100);
        assert_eq!(index.frame_size(1), Some(150));
        assert_eq!(index.frame_size(2), None);
        assert_eq!(index.duration(), 2);
        assert_eq!(index.last_offset_and_position(), Some((250, 2)));
    }

    #[test]
    fn test_rejects_non_increasing() {
        let mut index = FrameOffsetIndex::new();
        index.append_offset(10).unwrap();
        assert!(index.append_offset(10).is_err());
        assert!(index.append_offset(5).is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_offset_out_of_range() {
        let index = FrameOffsetIndex::from_offsets([0, 10]).unwrap();
        assert!(matches!(
            index.offset(2),
            Err(EssenceError::PositionOutOfRange { position: 2, available: 2 })
        ));
        assert!(index.offset(-1).is_err());
    }

    #[test]
    fn test_committed_duration() {
        let mut index = FrameOffsetIndex::from_offsets([0, 10, 20]).unwrap();
        assert_eq!(index.duration(), 2);
        index.set_duration(7);
        assert_eq!(index.duration(), 7);
    }

    #[test]
    fn test_empty_index() {
        let index = FrameOffsetIndex::new();
        assert_eq!(index.duration(), -1);
        assert!(index.last_offset_and_position().is_none());
        assert!(!index.is_complete());
    }
}
