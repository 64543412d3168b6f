//! Screen Collisions: a per-frame bounding-box index over placed
//! labels and icons. Cleared and rebuilt every frame before the
//! placement pass, so "occupied" never carries over from a stale frame.
//!
//! Candidate boxes are bucketed into a uniform grid the same way
//! `AtlasLayout` addresses fixed-size rectangular slots in a texture:
//! a cell coordinate is the box's screen position shifted right by
//! `cell_size_bits`, so overlap queries only need to scan the handful
//! of cells a box's footprint actually touches.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn intersects(&self, other: &ScreenRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    fn min_x(&self) -> f32 {
        self.x
    }
    fn min_y(&self) -> f32 {
        self.y
    }
    fn max_x(&self) -> f32 {
        self.x + self.width
    }
    fn max_y(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionGridConfig {
    /// Cell edge length as a power of two, e.g. 7 => 128px cells.
    pub cell_size_bits: u32,
}

impl Default for CollisionGridConfig {
    fn default() -> Self {
        Self { cell_size_bits: 7 }
    }
}

type CellCoord = (i32, i32);

#[derive(Debug, Clone, Copy)]
struct PlacedBox {
    id: u64,
    rect: ScreenRect,
}

/// Bucket-grid spatial index over the boxes placed so far this frame.
/// `may_overlap` boxes are reserved without ever blocking or being
/// blocked by other placements.
pub struct ScreenCollisionIndex {
    config: CollisionGridConfig,
    cells: HashMap<CellCoord, Vec<PlacedBox>>,
    next_id: u64,
}

impl ScreenCollisionIndex {
    pub fn new(config: CollisionGridConfig) -> Self {
        Self {
            config,
            cells: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards every placed box. Called once at the start of each
    /// placement pass.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.next_id = 0;
    }

    fn cell_range(&self, rect: &ScreenRect) -> (CellCoord, CellCoord) {
        let bits = self.config.cell_size_bits;
        let to_cell = |value: f32| -> i32 { (value as i64 >> bits) as i32 };
        (
            (to_cell(rect.min_x()), to_cell(rect.min_y())),
            (to_cell(rect.max_x()), to_cell(rect.max_y())),
        )
    }

    fn each_cell(&self, rect: &ScreenRect, mut visit: impl FnMut(CellCoord)) {
        let (min, max) = self.cell_range(rect);
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                visit((cx, cy));
            }
        }
    }

    /// Returns true if `rect` overlaps any box already placed this
    /// frame (excluding boxes placed with `may_overlap = true`).
    pub fn is_occupied(&self, rect: &ScreenRect) -> bool {
        let mut occupied = false;
        self.each_cell(rect, |cell| {
            if occupied {
                return;
            }
            if let Some(boxes) = self.cells.get(&cell) {
                if boxes.iter().any(|placed| placed.rect.intersects(rect)) {
                    occupied = true;
                }
            }
        });
        occupied
    }

    /// Attempts to reserve `rect`. If `may_overlap` is true the box is
    /// always placed and never tested against existing occupants. If
    /// false, placement fails (no mutation) when `rect` overlaps an
    /// existing reservation.
    pub fn try_place(&mut self, rect: ScreenRect, may_overlap: bool) -> Option<u64> {
        if !may_overlap && self.is_occupied(&rect) {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let placed = PlacedBox { id, rect };
        self.each_cell(&rect, |cell| {
            self.cells.entry(cell).or_default().push(placed);
        });
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, width: f32, height: f32) -> ScreenRect {
        ScreenRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn first_box_always_places() {
        let mut index = ScreenCollisionIndex::new(CollisionGridConfig::default());
        assert!(index.try_place(rect(0.0, 0.0, 50.0, 20.0), false).is_some());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn overlapping_box_is_rejected() {
        let mut index = ScreenCollisionIndex::new(CollisionGridConfig::default());
        index.try_place(rect(0.0, 0.0, 50.0, 20.0), false).unwrap();
        assert!(index.try_place(rect(10.0, 5.0, 50.0, 20.0), false).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn non_overlapping_box_is_accepted() {
        let mut index = ScreenCollisionIndex::new(CollisionGridConfig::default());
        index.try_place(rect(0.0, 0.0, 50.0, 20.0), false).unwrap();
        assert!(index.try_place(rect(1000.0, 1000.0, 50.0, 20.0), false).is_some());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn may_overlap_box_ignores_existing_occupants() {
        let mut index = ScreenCollisionIndex::new(CollisionGridConfig::default());
        index.try_place(rect(0.0, 0.0, 50.0, 20.0), false).unwrap();
        assert!(index.try_place(rect(10.0, 5.0, 50.0, 20.0), true).is_some());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn reset_clears_all_placed_boxes() {
        let mut index = ScreenCollisionIndex::new(CollisionGridConfig::default());
        index.try_place(rect(0.0, 0.0, 50.0, 20.0), false).unwrap();
        index.reset();
        assert!(index.is_empty());
        assert!(index.try_place(rect(0.0, 0.0, 50.0, 20.0), false).is_some());
    }

    #[test]
    fn box_spanning_many_cells_still_detects_overlap() {
        let config = CollisionGridConfig { cell_size_bits: 4 };
        let mut index = ScreenCollisionIndex::new(config);
        index.try_place(rect(0.0, 0.0, 500.0, 500.0), false).unwrap();
        assert!(index.try_place(rect(480.0, 480.0, 10.0, 10.0), false).is_none());
    }
}
