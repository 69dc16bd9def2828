//! Occupancy grid, coordinate mapping, and pathfinding for haulage units.
//!
//! The grid is a fixed-size 2D array of cells. Each cell holds at most one
//! occupant. World positions map onto cells by floor division with a fixed
//! cell edge length, and cells map back to their center point.
//!
//! Anything outside the grid counts as occupied, so pathfinding and movement
//! never leave the map.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A cell on the 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    pub fn manhattan_distance(&self, other: &GridPosition) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// True if `other` shares an edge with this cell.
    pub fn is_adjacent(&self, other: &GridPosition) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// The cell one step away in `dir`.
    pub fn step(&self, dir: Direction) -> GridPosition {
        let (dx, dy) = dir.offset();
        GridPosition::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A position in world units (pixels, meters, whatever the host uses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: i32,
    pub y: i32,
}

impl WorldPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four cardinal directions.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Offset for this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

/// Grid dimensions and the world size of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Edge length of one cell in world units.
    pub cell_size: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            cell_size: 32,
        }
    }
}

/// Errors from spatial operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpatialError {
    #[error("cell {0} is outside the grid")]
    OutOfBounds(GridPosition),
    #[error("cell {0} is occupied")]
    Occupied(GridPosition),
    #[error("cell {0} has no occupant")]
    Vacant(GridPosition),
    #[error("invalid grid dimensions {width}x{height} with cell size {cell_size}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        cell_size: u32,
    },
}

// ---------------------------------------------------------------------------
// OccupancyGrid
// ---------------------------------------------------------------------------

/// A fixed-size occupancy map. `K` is the occupant handle type.
///
/// Invariant: each cell holds at most one occupant. Moves vacate the old cell
/// before claiming the new one.
#[derive(Debug, Clone)]
pub struct OccupancyGrid<K> {
    config: GridConfig,
    cells: Vec<Option<K>>,
}

impl<K: Copy + Eq> OccupancyGrid<K> {
    pub fn new(config: GridConfig) -> Result<Self, SpatialError> {
        if config.width == 0
            || config.height == 0
            || config.cell_size == 0
            || config.width > i32::MAX as u32
            || config.height > i32::MAX as u32
        {
            return Err(SpatialError::InvalidDimensions {
                width: config.width,
                height: config.height,
                cell_size: config.cell_size,
            });
        }
        let len = config.width as usize * config.height as usize;
        Ok(Self {
            config,
            cells: vec![None; len],
        })
    }

    pub fn config(&self) -> GridConfig {
        self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    // -- Coordinate mapping --

    /// Map a world position to the cell containing it.
    pub fn to_cell(&self, world: WorldPosition) -> GridPosition {
        let size = self.config.cell_size as i32;
        GridPosition::new(world.x.div_euclid(size), world.y.div_euclid(size))
    }

    /// Map a cell to the world position of its center.
    pub fn to_world(&self, cell: GridPosition) -> WorldPosition {
        let size = self.config.cell_size as i32;
        WorldPosition::new(cell.x * size + size / 2, cell.y * size + size / 2)
    }

    /// Align a world position to the center of its cell.
    pub fn snap(&self, world: WorldPosition) -> WorldPosition {
        self.to_world(self.to_cell(world))
    }

    // -- Point queries --

    pub fn in_bounds(&self, cell: GridPosition) -> bool {
        self.index(cell).is_some()
    }

    /// Out-of-bounds cells always report occupied.
    pub fn is_occupied(&self, cell: GridPosition) -> bool {
        self.index(cell).is_none_or(|i| self.cells[i].is_some())
    }

    pub fn occupant(&self, cell: GridPosition) -> Option<K> {
        self.index(cell).and_then(|i| self.cells[i])
    }

    /// Number of occupied cells.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// All occupied cells in row-major order.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (GridPosition, K)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|k| (self.position_of(i), k)))
    }

    // -- Occupancy mutation --

    /// Put `occupant` on an empty in-bounds cell.
    pub fn claim(&mut self, cell: GridPosition, occupant: K) -> Result<(), SpatialError> {
        let i = self.index(cell).ok_or(SpatialError::OutOfBounds(cell))?;
        if self.cells[i].is_some() {
            return Err(SpatialError::Occupied(cell));
        }
        self.cells[i] = Some(occupant);
        Ok(())
    }

    /// Clear a cell, returning whoever was on it.
    pub fn vacate(&mut self, cell: GridPosition) -> Option<K> {
        let i = self.index(cell)?;
        self.cells[i].take()
    }

    /// Move the occupant of `from` onto `to`. The grid is unchanged on error.
    pub fn move_occupant(&mut self, from: GridPosition, to: GridPosition) -> Result<K, SpatialError> {
        let src = self.index(from).ok_or(SpatialError::OutOfBounds(from))?;
        let dst = self.index(to).ok_or(SpatialError::OutOfBounds(to))?;
        if self.cells[src].is_none() {
            return Err(SpatialError::Vacant(from));
        }
        if self.cells[dst].is_some() {
            return Err(SpatialError::Occupied(to));
        }
        let occupant = self.cells[src].take().ok_or(SpatialError::Vacant(from))?;
        self.cells[dst] = Some(occupant);
        Ok(occupant)
    }

    // -- Adjacency and paths --

    /// In-bounds orthogonal neighbors of a cell.
    pub fn neighbors(&self, cell: GridPosition) -> impl Iterator<Item = GridPosition> + '_ {
        Direction::all()
            .into_iter()
            .map(move |dir| cell.step(dir))
            .filter(|n| self.in_bounds(*n))
    }

    /// Shortest orthogonal path from `start` to `end`, both included.
    ///
    /// Breadth-first over unoccupied cells. The destination is accepted even
    /// when occupied since it is usually the unit being visited. Returns
    /// `None` when either end is off the grid or `end` cannot be reached.
    pub fn find_path(&self, start: GridPosition, end: GridPosition) -> Option<Vec<GridPosition>> {
        let start_idx = self.index(start)?;
        let end_idx = self.index(end)?;
        if start_idx == end_idx {
            return Some(vec![start]);
        }

        let mut parent: Vec<Option<usize>> = vec![None; self.cells.len()];
        let mut visited = vec![false; self.cells.len()];
        visited[start_idx] = true;

        let mut queue = VecDeque::from([start_idx]);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(self.position_of(current)) {
                let Some(next_idx) = self.index(next) else {
                    continue;
                };
                if visited[next_idx] {
                    continue;
                }
                if next_idx == end_idx {
                    parent[next_idx] = Some(current);
                    return Some(self.trace(&parent, start_idx, end_idx));
                }
                if self.cells[next_idx].is_some() {
                    continue;
                }
                visited[next_idx] = true;
                parent[next_idx] = Some(current);
                queue.push_back(next_idx);
            }
        }
        None
    }

    fn trace(&self, parent: &[Option<usize>], start: usize, end: usize) -> Vec<GridPosition> {
        let mut path = vec![self.position_of(end)];
        let mut at = end;
        while at != start {
            match parent[at] {
                Some(p) => {
                    path.push(self.position_of(p));
                    at = p;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    fn index(&self, cell: GridPosition) -> Option<usize> {
        if cell.x < 0
            || cell.y < 0
            || cell.x as u32 >= self.config.width
            || cell.y as u32 >= self.config.height
        {
            return None;
        }
        Some(cell.y as usize * self.config.width as usize + cell.x as usize)
    }

    fn position_of(&self, index: usize) -> GridPosition {
        let w = self.config.width as usize;
        GridPosition::new((index % w) as i32, (index / w) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: u32, height: u32) -> OccupancyGrid<u32> {
        OccupancyGrid::new(GridConfig {
            width,
            height,
            cell_size: 32,
        })
        .unwrap()
    }

    fn assert_valid_path(g: &OccupancyGrid<u32>, path: &[GridPosition], start: GridPosition, end: GridPosition) {
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&end));
        for pair in path.windows(2) {
            assert!(pair[0].is_adjacent(&pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
            assert!(g.in_bounds(pair[1]));
        }
    }

    // -----------------------------------------------------------------------
    // GridPosition
    // -----------------------------------------------------------------------

    #[test]
    fn grid_position_manhattan_distance() {
        let a = GridPosition::new(0, 0);
        let b = GridPosition::new(3, 4);
        assert_eq!(a.manhattan_distance(&b), 7);

        let c = GridPosition::new(-2, 5);
        let d = GridPosition::new(3, -1);
        assert_eq!(c.manhattan_distance(&d), 11);

        assert_eq!(a.manhattan_distance(&a), 0);
    }

    #[test]
    fn adjacency_excludes_diagonals_and_self() {
        let a = GridPosition::new(5, 5);
        assert!(a.is_adjacent(&GridPosition::new(5, 4)));
        assert!(a.is_adjacent(&GridPosition::new(6, 5)));
        assert!(!a.is_adjacent(&GridPosition::new(6, 6)));
        assert!(!a.is_adjacent(&a));
    }

    // -----------------------------------------------------------------------
    // Construction and coordinates
    // -----------------------------------------------------------------------

    #[test]
    fn zero_dimensions_rejected() {
        let err = OccupancyGrid::<u32>::new(GridConfig {
            width: 0,
            height: 4,
            cell_size: 32,
        })
        .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidDimensions { width: 0, .. }));

        assert!(
            OccupancyGrid::<u32>::new(GridConfig {
                width: 4,
                height: 4,
                cell_size: 0,
            })
            .is_err()
        );
    }

    #[test]
    fn world_to_cell_uses_floor_division() {
        let g = grid(32, 32);
        assert_eq!(g.to_cell(WorldPosition::new(0, 0)), GridPosition::new(0, 0));
        assert_eq!(g.to_cell(WorldPosition::new(31, 31)), GridPosition::new(0, 0));
        assert_eq!(g.to_cell(WorldPosition::new(32, 95)), GridPosition::new(1, 2));
        assert_eq!(g.to_cell(WorldPosition::new(-1, -33)), GridPosition::new(-1, -2));
    }

    #[test]
    fn cell_to_world_is_center() {
        let g = grid(32, 32);
        assert_eq!(g.to_world(GridPosition::new(0, 0)), WorldPosition::new(16, 16));
        assert_eq!(g.to_world(GridPosition::new(3, 1)), WorldPosition::new(112, 48));
        assert_eq!(g.snap(WorldPosition::new(100, 300)), WorldPosition::new(112, 304));
    }

    // -----------------------------------------------------------------------
    // Occupancy
    // -----------------------------------------------------------------------

    #[test]
    fn out_of_bounds_is_occupied() {
        let g = grid(4, 4);
        assert!(g.is_occupied(GridPosition::new(-1, 0)));
        assert!(g.is_occupied(GridPosition::new(4, 0)));
        assert!(g.is_occupied(GridPosition::new(0, 4)));
        assert!(!g.is_occupied(GridPosition::new(3, 3)));
    }

    #[test]
    fn claim_rejects_occupied_and_out_of_bounds() {
        let mut g = grid(4, 4);
        let cell = GridPosition::new(1, 1);
        g.claim(cell, 7).unwrap();
        assert_eq!(g.occupant(cell), Some(7));
        assert_eq!(g.claim(cell, 8), Err(SpatialError::Occupied(cell)));
        assert_eq!(g.occupant(cell), Some(7));

        let outside = GridPosition::new(9, 9);
        assert_eq!(g.claim(outside, 8), Err(SpatialError::OutOfBounds(outside)));
    }

    #[test]
    fn move_vacates_then_claims() {
        let mut g = grid(4, 4);
        let a = GridPosition::new(0, 0);
        let b = GridPosition::new(1, 0);
        g.claim(a, 1).unwrap();

        assert_eq!(g.move_occupant(a, b), Ok(1));
        assert_eq!(g.occupant(a), None);
        assert_eq!(g.occupant(b), Some(1));
        assert_eq!(g.occupied_count(), 1);
    }

    #[test]
    fn move_into_occupied_leaves_grid_unchanged() {
        let mut g = grid(4, 4);
        let a = GridPosition::new(0, 0);
        let b = GridPosition::new(1, 0);
        g.claim(a, 1).unwrap();
        g.claim(b, 2).unwrap();

        assert_eq!(g.move_occupant(a, b), Err(SpatialError::Occupied(b)));
        assert_eq!(g.occupant(a), Some(1));
        assert_eq!(g.occupant(b), Some(2));

        let empty = GridPosition::new(3, 3);
        assert_eq!(g.move_occupant(empty, GridPosition::new(2, 3)), Err(SpatialError::Vacant(empty)));
    }

    #[test]
    fn vacate_returns_previous_occupant() {
        let mut g = grid(2, 2);
        g.claim(GridPosition::new(1, 1), 3).unwrap();
        assert_eq!(g.vacate(GridPosition::new(1, 1)), Some(3));
        assert_eq!(g.vacate(GridPosition::new(1, 1)), None);
        assert_eq!(g.vacate(GridPosition::new(5, 5)), None);
    }

    // -----------------------------------------------------------------------
    // Neighbors
    // -----------------------------------------------------------------------

    #[test]
    fn neighbors_clip_to_bounds() {
        let g = grid(3, 3);
        assert_eq!(g.neighbors(GridPosition::new(0, 0)).count(), 2);
        assert_eq!(g.neighbors(GridPosition::new(1, 0)).count(), 3);
        let middle: Vec<_> = g.neighbors(GridPosition::new(1, 1)).collect();
        assert_eq!(middle.len(), 4);
        assert!(middle.iter().all(|n| n.is_adjacent(&GridPosition::new(1, 1))));
    }

    // -----------------------------------------------------------------------
    // Pathfinding
    // -----------------------------------------------------------------------

    #[test]
    fn path_to_self_is_single_cell() {
        let g = grid(4, 4);
        let a = GridPosition::new(2, 2);
        assert_eq!(g.find_path(a, a), Some(vec![a]));
    }

    #[test]
    fn straight_path_is_shortest() {
        let g = grid(8, 8);
        let start = GridPosition::new(0, 0);
        let end = GridPosition::new(5, 0);
        let path = g.find_path(start, end).unwrap();
        assert_eq!(path.len(), 6);
        assert_valid_path(&g, &path, start, end);
    }

    #[test]
    fn path_routes_around_wall() {
        let mut g = grid(5, 5);
        // Vertical wall at x = 2, open only at y = 4.
        for y in 0..4 {
            g.claim(GridPosition::new(2, y), 99).unwrap();
        }
        let start = GridPosition::new(0, 0);
        let end = GridPosition::new(4, 0);
        let path = g.find_path(start, end).unwrap();
        assert_valid_path(&g, &path, start, end);
        assert!(path.contains(&GridPosition::new(2, 4)));
        // Down 4, across 4, up 4.
        assert_eq!(path.len(), 13);
        for cell in &path[1..path.len() - 1] {
            assert!(!g.is_occupied(*cell));
        }
    }

    #[test]
    fn occupied_destination_is_accepted() {
        let mut g = grid(4, 4);
        let end = GridPosition::new(3, 3);
        g.claim(end, 5).unwrap();
        let start = GridPosition::new(0, 3);
        let path = g.find_path(start, end).unwrap();
        assert_valid_path(&g, &path, start, end);
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn occupied_start_does_not_block() {
        let mut g = grid(4, 1);
        let start = GridPosition::new(0, 0);
        g.claim(start, 1).unwrap();
        let path = g.find_path(start, GridPosition::new(3, 0)).unwrap();
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn enclosed_destination_is_unreachable() {
        let mut g = grid(5, 5);
        let end = GridPosition::new(2, 2);
        // Diamond of blockers two steps out: the destination's own
        // neighbours are free but cannot be reached.
        for x in 0..5 {
            for y in 0..5 {
                let cell = GridPosition::new(x, y);
                if cell.manhattan_distance(&end) == 2 {
                    g.claim(cell, 9).unwrap();
                }
            }
        }
        assert_eq!(g.find_path(GridPosition::new(0, 0), end), None);
    }

    #[test]
    fn off_grid_endpoints_have_no_path() {
        let g = grid(4, 4);
        assert_eq!(g.find_path(GridPosition::new(0, 0), GridPosition::new(4, 0)), None);
        assert_eq!(g.find_path(GridPosition::new(-1, 0), GridPosition::new(1, 0)), None);
    }
}
