use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{Grid, GridError},
};

/// Represents errors raised while constructing or mutating a world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("Map string is empty")]
    EmptyMap,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentRowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Cell cost at {position:?} must be at least 1")]
    ZeroCost { position: Position },
    #[error("Obstacle path length {positions} does not match schedule length {times}")]
    ScheduleLengthMismatch { positions: usize, times: usize },
    #[error("Obstacle claims two positions at time step {time}")]
    ConflictingScheduleEntry { time: u32 },
    #[error("Obstacle position {position:?} is outside the grid")]
    ObstacleOutOfBounds { position: Position },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// A single grid cell: a traversal cost and a permanent-blockage flag.
///
/// Costs are always at least 1; a blocked cell is never traversable
/// regardless of its cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub cost: u32,
    pub blocked: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            cost: 1,
            blocked: false,
        }
    }
}

/// An obstacle that occupies a sequence of positions at specific time steps
/// and is absent otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledObstacle {
    entries: Vec<(Position, u32)>,
}

impl ScheduledObstacle {
    /// Pairs up a position path with its occupation schedule.
    ///
    /// The sequences must have equal length and the obstacle may not claim
    /// two positions at the same time step. Times need not be sorted or
    /// contiguous, and the same position may recur at several times.
    pub fn new(path: Vec<Position>, schedule: Vec<u32>) -> Result<Self, WorldError> {
        if path.len() != schedule.len() {
            return Err(WorldError::ScheduleLengthMismatch {
                positions: path.len(),
                times: schedule.len(),
            });
        }
        let mut seen_times = HashSet::new();
        for &time in &schedule {
            if !seen_times.insert(time) {
                return Err(WorldError::ConflictingScheduleEntry { time });
            }
        }
        Ok(ScheduledObstacle {
            entries: path.into_iter().zip(schedule).collect(),
        })
    }

    /// The `(position, time)` pairs this obstacle occupies.
    pub fn entries(&self) -> &[(Position, u32)] {
        &self.entries
    }
}

/// The world model: a weighted grid with permanent blockages and
/// time-scheduled obstacles.
///
/// Dimensions are fixed at construction. Occupancy lookups go through an
/// index built as obstacles are registered, so queries are O(1) rather than
/// a scan over every schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    cells: Grid<Cell>,
    obstacles: Vec<ScheduledObstacle>,
    occupancy: HashSet<(Position, u32)>,
}

impl World {
    /// Creates a world of the given dimensions with unit-cost, unblocked cells.
    pub fn new(rows: usize, cols: usize) -> Self {
        World {
            cells: Grid::new(rows, cols),
            obstacles: Vec::new(),
            occupancy: HashSet::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.rows()
    }

    pub fn cols(&self) -> usize {
        self.cells.cols()
    }

    /// Marks a cell as permanently blocked.
    pub fn set_blocked(&mut self, position: Position) -> Result<(), WorldError> {
        let cell = self
            .cells
            .get(position.row, position.col)
            .copied()
            .unwrap_or_default();
        self.cells
            .set(position.row, position.col, Cell { blocked: true, ..cell })?;
        Ok(())
    }

    /// Sets the traversal cost of a cell. Costs below 1 are rejected.
    pub fn set_cost(&mut self, position: Position, cost: u32) -> Result<(), WorldError> {
        if cost == 0 {
            return Err(WorldError::ZeroCost { position });
        }
        let blocked = self
            .cells
            .get(position.row, position.col)
            .map(|c| c.blocked)
            .unwrap_or(false);
        self.cells.set(position.row, position.col, Cell { cost, blocked })?;
        Ok(())
    }

    /// Registers a scheduled obstacle and extends the occupancy index.
    ///
    /// Every entry must lie within the grid.
    pub fn add_obstacle(&mut self, obstacle: ScheduledObstacle) -> Result<(), WorldError> {
        for &(position, _) in obstacle.entries() {
            if !self.cells.in_bounds(position.row, position.col) {
                return Err(WorldError::ObstacleOutOfBounds { position });
            }
        }
        self.occupancy.extend(obstacle.entries().iter().copied());
        self.obstacles.push(obstacle);
        Ok(())
    }

    /// True if the cell is permanently blocked, or any scheduled obstacle
    /// occupies it at exactly the given time step.
    pub fn is_blocked_or_occupied(&self, position: Position, time: u32) -> bool {
        match self.cells.get(position.row, position.col) {
            Some(cell) if cell.blocked => true,
            Some(_) => self.occupancy.contains(&(position, time)),
            None => true,
        }
    }

    /// The traversal cost of a cell.
    pub fn cost_of(&self, position: Position) -> u32 {
        self.cells[position].cost
    }

    /// The up-to-four orthogonally adjacent in-bounds positions, in
    /// north, south, west, east order. No diagonal moves and no
    /// wait-in-place move.
    pub fn neighbors(&self, position: Position) -> Vec<Position> {
        let Position { row, col } = position;
        let mut result = Vec::with_capacity(4);
        if row > 0 {
            result.push(Position::new(row - 1, col));
        }
        if row + 1 < self.rows() {
            result.push(Position::new(row + 1, col));
        }
        if col > 0 {
            result.push(Position::new(row, col - 1));
        }
        if col + 1 < self.cols() {
            result.push(Position::new(row, col + 1));
        }
        result
    }

    /// Positions occupied by scheduled obstacles at the given time step.
    pub fn obstacle_positions_at(&self, time: u32) -> Vec<Position> {
        self.obstacles
            .iter()
            .flat_map(ScheduledObstacle::entries)
            .filter(|&&(_, t)| t == time)
            .map(|&(position, _)| position)
            .collect()
    }

    pub fn cells(&self) -> &Grid<Cell> {
        &self.cells
    }
}

/// Loads a world from a textual grid.
///
/// Rows are non-empty lines of whitespace-separated tokens: an all-digit
/// token is the cell's cost, `#` is a permanently blocked cell, and any
/// other token is cost 1. Rows of differing widths are a load error.
pub fn load_world_from_string(map_string: &str) -> Result<World, WorldError> {
    let rows_tokens: Vec<Vec<&str>> = map_string
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().collect())
        .collect();

    if rows_tokens.is_empty() {
        return Err(WorldError::EmptyMap);
    }

    let cols = rows_tokens[0].len();
    if cols == 0 {
        return Err(WorldError::EmptyMap);
    }
    for (row, tokens) in rows_tokens.iter().enumerate() {
        if tokens.len() != cols {
            return Err(WorldError::InconsistentRowWidth {
                row,
                expected: cols,
                found: tokens.len(),
            });
        }
    }

    let mut world = World::new(rows_tokens.len(), cols);
    for (row, tokens) in rows_tokens.iter().enumerate() {
        for (col, token) in tokens.iter().enumerate() {
            let position = Position::new(row, col);
            if *token == "#" {
                world.set_blocked(position)?;
            } else if token.chars().all(|c| c.is_ascii_digit()) {
                let cost: u32 = token.parse().map_err(|_| WorldError::ZeroCost { position })?;
                world.set_cost(position, cost)?;
            }
            // any other token keeps the default cost of 1
        }
    }
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_cells_are_occupied_at_every_time() {
        let mut world = World::new(3, 3);
        world.set_blocked(Position::new(1, 1)).unwrap();
        assert!(world.is_blocked_or_occupied(Position::new(1, 1), 0));
        assert!(world.is_blocked_or_occupied(Position::new(1, 1), 99));
        assert!(!world.is_blocked_or_occupied(Position::new(0, 0), 0));
    }

    #[test]
    fn scheduled_obstacles_match_exact_time_only() {
        let mut world = World::new(5, 5);
        let obstacle =
            ScheduledObstacle::new(vec![Position::new(3, 3)], vec![6]).unwrap();
        world.add_obstacle(obstacle).unwrap();
        assert!(world.is_blocked_or_occupied(Position::new(3, 3), 6));
        assert!(!world.is_blocked_or_occupied(Position::new(3, 3), 5));
        assert!(!world.is_blocked_or_occupied(Position::new(3, 3), 7));
    }

    #[test]
    fn obstacle_rejects_mismatched_lengths() {
        let err = ScheduledObstacle::new(
            vec![Position::new(0, 0), Position::new(0, 1)],
            vec![1],
        )
        .unwrap_err();
        assert_eq!(
            err,
            WorldError::ScheduleLengthMismatch {
                positions: 2,
                times: 1
            }
        );
    }

    #[test]
    fn obstacle_rejects_two_positions_at_one_time() {
        let err = ScheduledObstacle::new(
            vec![Position::new(0, 0), Position::new(0, 1)],
            vec![3, 3],
        )
        .unwrap_err();
        assert_eq!(err, WorldError::ConflictingScheduleEntry { time: 3 });
    }

    #[test]
    fn obstacle_allows_unsorted_times_and_revisited_positions() {
        let obstacle = ScheduledObstacle::new(
            vec![Position::new(2, 2), Position::new(2, 3), Position::new(2, 2)],
            vec![5, 1, 3],
        )
        .unwrap();
        let mut world = World::new(4, 4);
        world.add_obstacle(obstacle).unwrap();
        assert!(world.is_blocked_or_occupied(Position::new(2, 2), 5));
        assert!(world.is_blocked_or_occupied(Position::new(2, 2), 3));
        assert!(world.is_blocked_or_occupied(Position::new(2, 3), 1));
        assert!(!world.is_blocked_or_occupied(Position::new(2, 2), 1));
    }

    #[test]
    fn obstacle_outside_grid_is_rejected() {
        let mut world = World::new(2, 2);
        let obstacle =
            ScheduledObstacle::new(vec![Position::new(5, 5)], vec![0]).unwrap();
        let err = world.add_obstacle(obstacle).unwrap_err();
        assert_eq!(
            err,
            WorldError::ObstacleOutOfBounds {
                position: Position::new(5, 5)
            }
        );
    }

    #[test]
    fn neighbors_are_orthogonal_and_in_bounds() {
        let world = World::new(3, 3);
        assert_eq!(
            world.neighbors(Position::new(0, 0)),
            vec![Position::new(1, 0), Position::new(0, 1)]
        );
        assert_eq!(world.neighbors(Position::new(1, 1)).len(), 4);
        assert!(
            !world
                .neighbors(Position::new(1, 1))
                .contains(&Position::new(1, 1))
        );
    }

    #[test]
    fn loader_parses_costs_blocked_and_fallback_tokens() {
        let world = load_world_from_string("1 2 #\n. 5 1\n").unwrap();
        assert_eq!(world.rows(), 2);
        assert_eq!(world.cols(), 3);
        assert_eq!(world.cost_of(Position::new(0, 1)), 2);
        assert_eq!(world.cost_of(Position::new(1, 0)), 1);
        assert_eq!(world.cost_of(Position::new(1, 1)), 5);
        assert!(world.is_blocked_or_occupied(Position::new(0, 2), 0));
    }

    #[test]
    fn loader_rejects_ragged_rows() {
        let err = load_world_from_string("1 1 1\n1 1\n").unwrap_err();
        assert_eq!(
            err,
            WorldError::InconsistentRowWidth {
                row: 1,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn loader_rejects_zero_cost_cells() {
        let err = load_world_from_string("1 0\n1 1\n").unwrap_err();
        assert_eq!(
            err,
            WorldError::ZeroCost {
                position: Position::new(0, 1)
            }
        );
    }

    #[test]
    fn loader_rejects_empty_maps() {
        let err = load_world_from_string("  \n \n").unwrap_err();
        assert_eq!(err, WorldError::EmptyMap);
    }
}
