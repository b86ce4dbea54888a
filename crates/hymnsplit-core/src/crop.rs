//! Crop bands over the stacked page view
//!
//! Every update is computed from the state captured when the gesture started
//! plus the total pointer delta, so replaying the same move event is a no-op.

use crate::error::HymnSplitError;
use serde::{Deserialize, Serialize};

pub type CropId = u64;

/// A vertical band over the stacked multi-page view, in rendered units
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CropBox {
    pub id: CropId,
    pub top: f64,
    pub height: f64,
}

impl CropBox {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Ordered crop bands, clamped to the container at all times
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CropBoxes {
    next_id: CropId,
    boxes: Vec<CropBox>,
    container_height: f64,
    min_height: f64,
    default_height: f64,
}

impl CropBoxes {
    pub fn new(container_height: f64, min_height: f64, default_height: f64) -> Self {
        Self {
            next_id: 0,
            boxes: Vec::new(),
            container_height: container_height.max(0.0),
            min_height,
            default_height,
        }
    }

    pub fn boxes(&self) -> &[CropBox] {
        &self.boxes
    }

    pub fn get(&self, id: CropId) -> Option<&CropBox> {
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn container_height(&self) -> f64 {
        self.container_height
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Add a band of the default height at `top`, pulled inside the container.
    pub fn add(&mut self, top: f64) -> Result<CropId, HymnSplitError> {
        self.insert(top, self.default_height.min(self.container_height))
    }

    /// Add a band of exactly `height` at `top`.
    ///
    /// `top` is only moved when the band would otherwise hang past the
    /// container bottom. Heights not above the minimum, or taller than the
    /// container, are rejected.
    pub fn insert(&mut self, top: f64, height: f64) -> Result<CropId, HymnSplitError> {
        if !(height.is_finite() && top.is_finite()) {
            return Err(HymnSplitError::InvalidCropBox(format!(
                "Band at {} with height {} is not finite",
                top, height
            )));
        }
        if height <= self.min_height {
            return Err(HymnSplitError::InvalidCropBox(format!(
                "Band height {} must exceed {}",
                height, self.min_height
            )));
        }
        if height > self.container_height {
            return Err(HymnSplitError::InvalidCropBox(format!(
                "Band height {} exceeds container height {}",
                height, self.container_height
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.boxes.push(CropBox {
            id,
            top: top.clamp(0.0, self.container_height - height),
            height,
        });
        Ok(id)
    }

    pub fn remove(&mut self, id: CropId) -> bool {
        if let Some(pos) = self.boxes.iter().position(|b| b.id == id) {
            self.boxes.remove(pos);
            true
        } else {
            false
        }
    }

    /// Move a band by `dy` from where the drag started; stops at the edges.
    pub fn drag(&mut self, id: CropId, start_top: f64, dy: f64) -> bool {
        let container = self.container_height;
        self.update(id, |b| {
            b.top = (start_top + dy).clamp(0.0, (container - b.height).max(0.0));
            true
        })
    }

    /// Move the top edge, keeping the bottom edge fixed.
    ///
    /// Rejected (returns `false`) when the band would get too short or leave
    /// the container.
    pub fn resize_top(&mut self, id: CropId, start_top: f64, start_height: f64, dy: f64) -> bool {
        let min = self.min_height;
        self.update(id, |b| {
            let top = start_top + dy;
            let height = start_height - dy;
            if height > min && top >= 0.0 {
                b.top = top;
                b.height = height;
                true
            } else {
                false
            }
        })
    }

    /// Move the bottom edge, keeping the top edge fixed.
    pub fn resize_bottom(&mut self, id: CropId, start_height: f64, dy: f64) -> bool {
        let min = self.min_height;
        let container = self.container_height;
        self.update(id, |b| {
            let height = start_height + dy;
            if height > min && b.top + height <= container {
                b.height = height;
                true
            } else {
                false
            }
        })
    }

    /// The stacked view was re-measured; pull every band back inside.
    pub fn set_container_height(&mut self, container_height: f64) {
        let container = container_height.max(0.0);
        self.container_height = container;
        for b in &mut self.boxes {
            b.height = b.height.min(container);
            b.top = b.top.clamp(0.0, container - b.height);
        }
    }

    fn update(&mut self, id: CropId, f: impl FnOnce(&mut CropBox) -> bool) -> bool {
        match self.boxes.iter_mut().find(|b| b.id == id) {
            Some(b) => f(b),
            None => false,
        }
    }
}
