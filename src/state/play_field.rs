//! Grid logic of the langar hall: player movement, seated people and serving.

use indexmap::IndexSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::catalog::FoodItem;

/// Direction requested by a move input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Cell coordinate on the square grid, `(0, 0)` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct GridPos {
    pub x: usize,
    pub y: usize,
}

impl GridPos {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Raised when a coordinate supplied by a client falls outside the grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cell ({x}, {y}) is outside the {grid_size}x{grid_size} grid")]
pub struct OutOfBounds {
    pub x: usize,
    pub y: usize,
    pub grid_size: usize,
}

/// Result of a successful serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeOutcome {
    pub position: GridPos,
    pub food: FoodItem,
    pub points: u32,
}

/// Ephemeral play area owned by a game session while it is in the `playing` phase.
#[derive(Debug, Clone)]
pub struct PlayField {
    grid_size: usize,
    max_seated: usize,
    player: GridPos,
    seated: IndexSet<GridPos>,
    last_served: Option<GridPos>,
}

impl PlayField {
    /// Build an empty field with the player on its starting cell.
    ///
    /// A zero `grid_size` is bumped to one so the player always has a cell to stand on.
    pub fn new(grid_size: usize, max_seated: usize) -> Self {
        let grid_size = grid_size.max(1);
        Self {
            grid_size,
            max_seated,
            player: Self::starting_position(grid_size),
            seated: IndexSet::new(),
            last_served: None,
        }
    }

    /// Middle column of the bottom row, the entrance of the hall.
    pub fn starting_position(grid_size: usize) -> GridPos {
        GridPos::new(grid_size / 2, grid_size.saturating_sub(1))
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn max_seated(&self) -> usize {
        self.max_seated
    }

    pub fn player(&self) -> GridPos {
        self.player
    }

    /// Seated people in the order they sat down.
    pub fn seated(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.seated.iter().copied()
    }

    pub fn seated_count(&self) -> usize {
        self.seated.len()
    }

    pub fn is_seated(&self, pos: GridPos) -> bool {
        self.seated.contains(&pos)
    }

    /// Cell showing the transient "served" marker, if any.
    pub fn last_served(&self) -> Option<GridPos> {
        self.last_served
    }

    /// Move the player one cell, staying put when already against the wall.
    pub fn move_player(&mut self, direction: Direction) -> GridPos {
        let last = self.grid_size - 1;
        let GridPos { x, y } = self.player;
        self.player = match direction {
            Direction::Up => GridPos::new(x, y.saturating_sub(1)),
            Direction::Down => GridPos::new(x, (y + 1).min(last)),
            Direction::Left => GridPos::new(x.saturating_sub(1), y),
            Direction::Right => GridPos::new((x + 1).min(last), y),
        };
        self.player
    }

    /// Teleport the player onto a cell, as done when the grid is clicked.
    pub fn place_player(&mut self, pos: GridPos) -> Result<(), OutOfBounds> {
        if pos.x >= self.grid_size || pos.y >= self.grid_size {
            return Err(OutOfBounds {
                x: pos.x,
                y: pos.y,
                grid_size: self.grid_size,
            });
        }
        self.player = pos;
        Ok(())
    }

    /// Serve the person sitting under the player, if there is one and a food item is chosen.
    pub fn serve(&mut self, food: Option<FoodItem>) -> Option<ServeOutcome> {
        let food = food?;
        let position = self.player;
        if !self.seated.shift_remove(&position) {
            return None;
        }

        self.last_served = Some(position);
        Some(ServeOutcome {
            position,
            food,
            points: food.points(),
        })
    }

    /// Clear the served marker if it still points at `pos`.
    ///
    /// A newer serve elsewhere keeps its own marker.
    pub fn clear_marker(&mut self, pos: GridPos) -> bool {
        if self.last_served == Some(pos) {
            self.last_served = None;
            true
        } else {
            false
        }
    }

    /// Run one spawn tick: with `probability`, seat someone on a random free cell.
    ///
    /// An occupied pick skips the tick instead of retrying.
    pub fn try_spawn<R>(&mut self, rng: &mut R, probability: f64) -> Option<GridPos>
    where
        R: Rng + ?Sized,
    {
        if self.seated.len() >= self.max_seated {
            return None;
        }
        if !rng.random_bool(probability.clamp(0.0, 1.0)) {
            return None;
        }

        let pos = GridPos::new(
            rng.random_range(0..self.grid_size),
            rng.random_range(0..self.grid_size),
        );
        if self.seated.insert(pos) {
            Some(pos)
        } else {
            None
        }
    }

    /// Restore the field to its freshly built state.
    pub fn reset(&mut self) {
        self.player = Self::starting_position(self.grid_size);
        self.seated.clear();
        self.last_served = None;
    }

    #[cfg(test)]
    pub(crate) fn seat(&mut self, pos: GridPos) {
        self.seated.insert(pos);
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const ALL_DIRECTIONS: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    #[test]
    fn starts_at_bottom_middle() {
        let field = PlayField::new(3, 3);
        assert_eq!(field.player(), GridPos::new(1, 2));
    }

    #[test]
    fn moves_never_leave_the_grid() {
        let mut field = PlayField::new(3, 3);
        for start_x in 0..3 {
            for start_y in 0..3 {
                for direction in ALL_DIRECTIONS {
                    field.place_player(GridPos::new(start_x, start_y)).unwrap();
                    for _ in 0..5 {
                        let pos = field.move_player(direction);
                        assert!(pos.x < 3 && pos.y < 3, "{pos:?} escaped via {direction:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn move_at_boundary_is_noop() {
        let mut field = PlayField::new(3, 3);
        field.place_player(GridPos::new(0, 0)).unwrap();
        assert_eq!(field.move_player(Direction::Up), GridPos::new(0, 0));
        assert_eq!(field.move_player(Direction::Left), GridPos::new(0, 0));
        assert_eq!(field.move_player(Direction::Right), GridPos::new(1, 0));
    }

    #[test]
    fn place_player_rejects_outside_cells() {
        let mut field = PlayField::new(3, 3);
        let err = field.place_player(GridPos::new(3, 1)).unwrap_err();
        assert_eq!(err.grid_size, 3);
        assert_eq!(field.player(), GridPos::new(1, 2));
    }

    #[test]
    fn serve_on_empty_cell_is_noop() {
        let mut field = PlayField::new(3, 3);
        field.seat(GridPos::new(0, 0));
        assert_eq!(field.serve(Some(FoodItem::Roti)), None);
        assert_eq!(field.seated_count(), 1);
        assert_eq!(field.last_served(), None);
    }

    #[test]
    fn serve_without_food_is_noop() {
        let mut field = PlayField::new(3, 3);
        field.seat(field.player());
        assert_eq!(field.serve(None), None);
        assert_eq!(field.seated_count(), 1);
    }

    #[test]
    fn serve_removes_person_and_sets_marker() {
        let mut field = PlayField::new(3, 3);
        let here = field.player();
        field.seat(here);

        let outcome = field.serve(Some(FoodItem::Chai)).unwrap();
        assert_eq!(outcome.points, 3);
        assert_eq!(outcome.position, here);
        assert!(!field.is_seated(here));
        assert_eq!(field.last_served(), Some(here));

        assert!(!field.clear_marker(GridPos::new(0, 0)));
        assert!(field.clear_marker(here));
        assert_eq!(field.last_served(), None);
    }

    #[test]
    fn spawning_respects_capacity_and_uniqueness() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut field = PlayField::new(3, 3);
        for _ in 0..500 {
            field.try_spawn(&mut rng, 1.0);
            assert!(field.seated_count() <= 3);
            let unique: IndexSet<_> = field.seated().collect();
            assert_eq!(unique.len(), field.seated_count());
            if field.seated_count() == 3 {
                let pos = field.seated().next().unwrap();
                field.place_player(pos).unwrap();
                field.serve(Some(FoodItem::Water));
            }
        }
    }

    #[test]
    fn spawning_with_zero_probability_never_seats() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut field = PlayField::new(3, 3);
        for _ in 0..100 {
            assert_eq!(field.try_spawn(&mut rng, 0.0), None);
        }
        assert_eq!(field.seated_count(), 0);
    }

    #[test]
    fn full_grid_skips_occupied_picks() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut field = PlayField::new(1, 5);
        assert_eq!(field.try_spawn(&mut rng, 1.0), Some(GridPos::new(0, 0)));
        assert_eq!(field.try_spawn(&mut rng, 1.0), None);
        assert_eq!(field.seated_count(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut field = PlayField::new(3, 3);
        field.seat(GridPos::new(2, 2));
        field.move_player(Direction::Up);
        field.reset();
        assert_eq!(field.player(), GridPos::new(1, 2));
        assert_eq!(field.seated_count(), 0);
        assert_eq!(field.last_served(), None);
    }
}
