//! Content packages assembled from per-track reads.

use crate::buffer::ByteBuffer;
use crate::error::{EssenceError, Result};

/// Essence for one track at one clip position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentElement {
    pub is_picture: bool,
    /// Material package track id.
    pub track_id: u32,
    /// Samples in `data`; 1 for picture, the audio sample count for sound.
    pub num_samples: u32,
    /// Byte offset of the element within the track's essence.
    pub essence_offset: i64,
    pub data: ByteBuffer,
}

impl ContentElement {
    pub fn new(track_id: u32, is_picture: bool) -> Self {
        ContentElement {
            is_picture,
            track_id,
            ..Default::default()
        }
    }

    fn reset(&mut self) {
        self.num_samples = 0;
        self.essence_offset = 0;
        self.data.reset();
    }
}

/// One row of a clip: an element per track, in the order tracks were added.
#[derive(Debug, Clone, Default)]
pub struct ClipPackage {
    elements: Vec<ContentElement>,
}

impl ClipPackage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the element for `track_id`, adding it if it does not exist.
    pub fn add_or_get_element(&mut self, track_id: u32, is_picture: bool) -> &mut ContentElement {
        let index = match self.elements.iter().position(|e| e.track_id == track_id) {
            Some(index) => index,
            None => {
                self.elements.push(ContentElement::new(track_id, is_picture));
                self.elements.len() - 1
            }
        };
        &mut self.elements[index]
    }

    /// Add an element for a new track.
    pub fn add_element(&mut self, track_id: u32, is_picture: bool) -> Result<&mut ContentElement> {
        if self.have_element(track_id) {
            return Err(EssenceError::DuplicateTrack(track_id));
        }
        Ok(self.add_or_get_element(track_id, is_picture))
    }

    pub fn have_element(&self, track_id: u32) -> bool {
        self.elements.iter().any(|e| e.track_id == track_id)
    }

    pub fn element(&self, track_id: u32) -> Option<&ContentElement> {
        self.elements.iter().find(|e| e.track_id == track_id)
    }

    pub fn element_mut(&mut self, track_id: u32) -> Option<&mut ContentElement> {
        self.elements.iter_mut().find(|e| e.track_id == track_id)
    }

    pub fn element_at(&self, index: usize) -> Option<&ContentElement> {
        self.elements.get(index)
    }

    pub fn elements(&self) -> &[ContentElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// True when every expected track has an element holding data.
    pub fn is_complete(&self, track_count: usize) -> bool {
        self.elements.len() == track_count && self.elements.iter().all(|e| !e.data.is_empty())
    }

    /// Clear element data while keeping the elements and their allocations.
    pub fn reset(&mut self) {
        for element in &mut self.elements {
            element.reset();
        }
    }
}
