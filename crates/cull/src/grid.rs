use crate::CullError;
use glam::Vec3;
use lumen_common::{Aabb, Frustum};
use std::collections::HashMap;

/// A 3D cell coordinate in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Inclusive range of cells covered by one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRange {
    min: CellCoord,
    max: CellCoord,
}

impl CellRange {
    fn cell_count(&self) -> u64 {
        let extent = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo) + 1) as u64;
        extent(self.min.x, self.max.x)
            .saturating_mul(extent(self.min.y, self.max.y))
            .saturating_mul(extent(self.min.z, self.max.z))
    }

    fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (self.min.x..=self.max.x).flat_map(move |x| {
            (self.min.y..=self.max.y)
                .flat_map(move |y| (self.min.z..=self.max.z).map(move |z| CellCoord::new(x, y, z)))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Cells(CellRange),
    Oversized,
}

/// Coarse uniform grid over object bounds.
///
/// Objects are identified by their index in the bounds slice handed to
/// [`rebuild`](Self::rebuild) and [`refit`](Self::refit). An object lives in
/// every cell its box overlaps, unless it would span more than
/// `max_cells_per_object` cells or has no finite bounds, in which case it
/// goes to the oversized list that every query tests.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    max_cells_per_object: usize,
    cells: HashMap<CellCoord, Vec<u32>>,
    placements: Vec<Placement>,
    oversized: Vec<u32>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32, max_cells_per_object: usize) -> Result<Self, CullError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(CullError::InvalidParameter(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if max_cells_per_object == 0 {
            return Err(CullError::InvalidParameter(
                "max_cells_per_object must be at least 1".into(),
            ));
        }
        Ok(Self {
            cell_size,
            max_cells_per_object,
            cells: HashMap::new(),
            placements: Vec::new(),
            oversized: Vec::new(),
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        CellCoord {
            x: (pos.x / self.cell_size).floor() as i32,
            y: (pos.y / self.cell_size).floor() as i32,
            z: (pos.z / self.cell_size).floor() as i32,
        }
    }

    /// World-space box of a cell.
    pub fn cell_bounds(&self, coord: CellCoord) -> Aabb {
        let min = Vec3::new(coord.x as f32, coord.y as f32, coord.z as f32) * self.cell_size;
        Aabb::new(min, min + Vec3::splat(self.cell_size))
    }

    /// Drop everything and re-insert every object.
    pub fn rebuild(&mut self, aabbs: &[Aabb]) {
        self.cells.clear();
        self.oversized.clear();
        self.placements.clear();
        self.placements.reserve(aabbs.len());
        for (index, aabb) in aabbs.iter().enumerate() {
            let placement = self.placement_for(aabb);
            self.insert(index as u32, placement);
            self.placements.push(placement);
        }
        tracing::debug!(
            objects = aabbs.len(),
            cells = self.cells.len(),
            oversized = self.oversized.len(),
            "grid rebuilt"
        );
    }

    /// Move objects whose cell range changed. Rebuilds when the object count
    /// differs from the last call. Returns how many objects moved.
    pub fn refit(&mut self, aabbs: &[Aabb]) -> usize {
        if aabbs.len() != self.placements.len() {
            self.rebuild(aabbs);
            return aabbs.len();
        }
        let mut moved = 0;
        for (index, aabb) in aabbs.iter().enumerate() {
            let placement = self.placement_for(aabb);
            let previous = self.placements[index];
            if placement == previous {
                continue;
            }
            self.remove(index as u32, previous);
            self.insert(index as u32, placement);
            self.placements[index] = placement;
            moved += 1;
        }
        moved
    }

    /// Indices of objects whose box is not entirely outside `frustum`,
    /// sorted ascending.
    pub fn query(&self, frustum: &Frustum, aabbs: &[Aabb], out: &mut Vec<u32>) {
        out.clear();
        for (coord, objects) in &self.cells {
            if frustum.check_box_fast(&self.cell_bounds(*coord)) {
                out.extend_from_slice(objects);
            }
        }
        out.extend_from_slice(&self.oversized);
        out.sort_unstable();
        out.dedup();
        out.retain(|&index| {
            aabbs
                .get(index as usize)
                .is_some_and(|aabb| frustum.check_box_fast(aabb))
        });
    }

    pub fn object_count(&self) -> usize {
        self.placements.len()
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn oversized_count(&self) -> usize {
        self.oversized.len()
    }

    /// Total number of object placements across all cells.
    pub fn total_placements(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    fn placement_for(&self, aabb: &Aabb) -> Placement {
        if !aabb.is_valid() || aabb.is_infinite() || !aabb.min.is_finite() || !aabb.max.is_finite()
        {
            return Placement::Oversized;
        }
        let range = CellRange {
            min: self.position_to_cell(aabb.min),
            max: self.position_to_cell(aabb.max),
        };
        if range.cell_count() > self.max_cells_per_object as u64 {
            Placement::Oversized
        } else {
            Placement::Cells(range)
        }
    }

    fn insert(&mut self, index: u32, placement: Placement) {
        match placement {
            Placement::Oversized => self.oversized.push(index),
            Placement::Cells(range) => {
                for coord in range.cells() {
                    self.cells.entry(coord).or_default().push(index);
                }
            }
        }
    }

    fn remove(&mut self, index: u32, placement: Placement) {
        match placement {
            Placement::Oversized => self.oversized.retain(|&o| o != index),
            Placement::Cells(range) => {
                for coord in range.cells() {
                    if let Some(objects) = self.cells.get_mut(&coord) {
                        objects.retain(|&o| o != index);
                        if objects.is_empty() {
                            self.cells.remove(&coord);
                        }
                    }
                }
            }
        }
    }
}
