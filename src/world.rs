use std::collections::HashMap;

use crate::constants::{
    DOOR_OPENING_TILES, DOOR_POSITIONS, MAP_HEIGHT, MAP_WIDTH, PLAY_MARGIN, ROOM_COLS,
    ROOM_HEIGHT, ROOM_ROWS, ROOM_WIDTH, TILE_SIZE,
};
use crate::rng::RandomSource;
use crate::types::{DoorState, DoorView, Orientation};

/// Static wall grid plus the tiles each door keeps open.
///
/// Built once per session from the door list; door state is passed in at
/// query time so sealing never rebuilds the grid.
#[derive(Clone, Debug)]
pub struct NavigationIndex {
    cols: i32,
    rows: i32,
    walls: Vec<bool>,
    door_tiles: HashMap<(i32, i32), usize>,
}

impl NavigationIndex {
    pub fn new(doors: &[DoorView]) -> Self {
        let cols = (MAP_WIDTH / TILE_SIZE).ceil() as i32;
        let rows = (MAP_HEIGHT / TILE_SIZE).ceil() as i32;
        let boundary_cols: Vec<i32> = (1..ROOM_COLS)
            .map(|k| (k as f32 * ROOM_WIDTH / TILE_SIZE).floor() as i32)
            .collect();
        let boundary_rows: Vec<i32> = (1..ROOM_ROWS)
            .map(|k| (k as f32 * ROOM_HEIGHT / TILE_SIZE).floor() as i32)
            .collect();

        let mut walls = vec![false; (cols * rows) as usize];
        for ty in 0..rows {
            for tx in 0..cols {
                let border = tx == 0 || ty == 0 || tx == cols - 1 || ty == rows - 1;
                let internal = boundary_cols.contains(&tx) || boundary_rows.contains(&ty);
                walls[(ty * cols + tx) as usize] = border || internal;
            }
        }

        let mut door_tiles = HashMap::new();
        for door in doors {
            let (dx, dy) = tile_of(door.x, door.y);
            for ty in (dy - DOOR_OPENING_TILES)..=(dy + DOOR_OPENING_TILES) {
                for tx in (dx - DOOR_OPENING_TILES)..=(dx + DOOR_OPENING_TILES) {
                    if tx <= 0 || ty <= 0 || tx >= cols - 1 || ty >= rows - 1 {
                        continue;
                    }
                    let idx = (ty * cols + tx) as usize;
                    if walls[idx] {
                        walls[idx] = false;
                        door_tiles.insert((tx, ty), door.id);
                    }
                }
            }
        }

        Self {
            cols,
            rows,
            walls,
            door_tiles,
        }
    }

    pub fn door_at_tile(&self, tx: i32, ty: i32) -> Option<usize> {
        self.door_tiles.get(&(tx, ty)).copied()
    }

    pub fn is_tile_blocked(&self, tx: i32, ty: i32, doors: &[DoorView]) -> bool {
        if tx < 0 || ty < 0 || tx >= self.cols || ty >= self.rows {
            return true;
        }
        if self.walls[(ty * self.cols + tx) as usize] {
            return true;
        }
        match self.door_at_tile(tx, ty) {
            Some(door_id) => doors
                .iter()
                .any(|door| door.id == door_id && door.state == DoorState::Sealed),
            None => false,
        }
    }

    /// Tests the eight corner and edge points of a body of `radius`.
    pub fn is_blocked(&self, x: f32, y: f32, radius: f32, doors: &[DoorView]) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return true;
        }
        const BODY_SAMPLES: [(f32, f32); 8] = [
            (-1.0, -1.0),
            (0.0, -1.0),
            (1.0, -1.0),
            (-1.0, 0.0),
            (1.0, 0.0),
            (-1.0, 1.0),
            (0.0, 1.0),
            (1.0, 1.0),
        ];
        BODY_SAMPLES.iter().any(|(ox, oy)| {
            let px = x + ox * radius;
            let py = y + oy * radius;
            if px < 0.0 || py < 0.0 || px >= MAP_WIDTH || py >= MAP_HEIGHT {
                return true;
            }
            let (tx, ty) = tile_of(px, py);
            self.is_tile_blocked(tx, ty, doors)
        })
    }

    /// Full move, then horizontal slide, then vertical slide.
    pub fn try_move(
        &self,
        from: (f32, f32),
        to: (f32, f32),
        radius: f32,
        doors: &[DoorView],
    ) -> Option<(f32, f32)> {
        if !self.is_blocked(to.0, to.1, radius, doors) {
            return Some(to);
        }
        if to.0 != from.0 && !self.is_blocked(to.0, from.1, radius, doors) {
            return Some((to.0, from.1));
        }
        if to.1 != from.1 && !self.is_blocked(from.0, to.1, radius, doors) {
            return Some((from.0, to.1));
        }
        None
    }

    /// Walks `from -> to` in sub-steps of half the radius, sliding at each,
    /// so a long move cannot skip over a wall or sealed door. `None` when the
    /// body cannot advance at all.
    pub fn sweep_move(
        &self,
        from: (f32, f32),
        to: (f32, f32),
        radius: f32,
        doors: &[DoorView],
    ) -> Option<(f32, f32)> {
        let length = distance(from, to);
        if length <= f32::EPSILON {
            return (!self.is_blocked(to.0, to.1, radius, doors)).then_some(to);
        }
        let steps = (length / (radius * 0.5).max(1.0)).ceil() as usize;
        let delta = (
            (to.0 - from.0) / steps as f32,
            (to.1 - from.1) / steps as f32,
        );
        let mut pos = from;
        for _ in 0..steps {
            match self.try_move(pos, (pos.0 + delta.0, pos.1 + delta.1), radius, doors) {
                Some(next) => pos = next,
                None => break,
            }
        }
        if distance(pos, to) < 1e-3 {
            return Some(to);
        }
        (pos != from).then_some(pos)
    }

    pub fn random_open_point(
        &self,
        radius: f32,
        doors: &[DoorView],
        rng: &mut dyn RandomSource,
    ) -> (f32, f32) {
        for _ in 0..32 {
            let x = rng.range(PLAY_MARGIN, MAP_WIDTH - PLAY_MARGIN);
            let y = rng.range(PLAY_MARGIN, MAP_HEIGHT - PLAY_MARGIN);
            if !self.is_blocked(x, y, radius, doors) {
                return (x, y);
            }
        }
        let col = rng.int(0, ROOM_COLS - 1);
        let row = rng.int(0, ROOM_ROWS - 1);
        room_center(col, row)
    }
}

pub fn tile_of(x: f32, y: f32) -> (i32, i32) {
    (
        (x / TILE_SIZE).floor() as i32,
        (y / TILE_SIZE).floor() as i32,
    )
}

pub fn room_cell(x: f32, y: f32) -> (i32, i32) {
    (
        ((x / ROOM_WIDTH).floor() as i32).clamp(0, ROOM_COLS - 1),
        ((y / ROOM_HEIGHT).floor() as i32).clamp(0, ROOM_ROWS - 1),
    )
}

pub fn room_center(col: i32, row: i32) -> (f32, f32) {
    (
        col as f32 * ROOM_WIDTH + ROOM_WIDTH / 2.0,
        row as f32 * ROOM_HEIGHT + ROOM_HEIGHT / 2.0,
    )
}

pub fn clamp_to_play_bounds(x: f32, y: f32) -> (f32, f32) {
    (
        x.clamp(PLAY_MARGIN, MAP_WIDTH - PLAY_MARGIN),
        y.clamp(PLAY_MARGIN, MAP_HEIGHT - PLAY_MARGIN),
    )
}

pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Doors on x boundaries are vertical, doors on y boundaries horizontal.
pub fn build_doors() -> Vec<DoorView> {
    DOOR_POSITIONS
        .iter()
        .enumerate()
        .map(|(id, &(x, y))| {
            let on_x_boundary = (x / ROOM_WIDTH).fract() == 0.0;
            DoorView {
                id,
                x,
                y,
                orientation: if on_x_boundary {
                    Orientation::Vertical
                } else {
                    Orientation::Horizontal
                },
                state: DoorState::Open,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BODY_RADIUS;

    #[test]
    fn border_and_room_boundaries_are_walls() {
        let doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        assert!(nav.is_tile_blocked(0, 5, &doors));
        assert!(nav.is_tile_blocked(5, 0, &doors));
        // x = 800 away from any door
        assert!(nav.is_tile_blocked(25, 2, &doors));
        // y = 600 away from any door
        assert!(nav.is_tile_blocked(3, 18, &doors));
        assert!(!nav.is_tile_blocked(5, 5, &doors));
    }

    #[test]
    fn door_tiles_are_open_until_sealed() {
        let mut doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        let (tx, ty) = tile_of(800.0, 300.0);
        assert_eq!(nav.door_at_tile(tx, ty), Some(0));
        assert!(!nav.is_tile_blocked(tx, ty, &doors));
        assert!(!nav.is_blocked(800.0, 300.0, BODY_RADIUS, &doors));

        doors[0].state = DoorState::Sealed;
        assert!(nav.is_tile_blocked(tx, ty, &doors));
        assert!(nav.is_blocked(800.0, 300.0, BODY_RADIUS, &doors));
    }

    #[test]
    fn sweep_stops_at_a_sealed_door_instead_of_jumping_it() {
        let mut doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        let from = (780.0, 300.0);
        let far_side = (900.0, 300.0);
        // the endpoint alone is open ground
        assert!(!nav.is_blocked(far_side.0, far_side.1, BODY_RADIUS, &doors));
        assert_eq!(nav.sweep_move(from, far_side, BODY_RADIUS, &doors), Some(far_side));

        doors[0].state = DoorState::Sealed;
        let stopped = nav
            .sweep_move(from, far_side, BODY_RADIUS, &doors)
            .expect("some progress before the door");
        assert!(stopped.0 < 800.0 - BODY_RADIUS);
        assert_eq!(room_cell(stopped.0, stopped.1), (0, 0));
    }

    #[test]
    fn sweep_slides_along_a_wall() {
        let doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        let (x, y) = nav
            .sweep_move((780.0, 100.0), (790.0, 110.0), BODY_RADIUS, &doors)
            .expect("slides");
        assert!(x > 780.0 && x < 800.0 - BODY_RADIUS);
        assert!((y - 110.0).abs() < 1e-3);
        assert!(nav
            .sweep_move((780.0, 100.0), (800.0, 100.0), BODY_RADIUS, &doors)
            .is_some_and(|(x, _)| x < 800.0 - BODY_RADIUS));
    }

    #[test]
    fn orientation_follows_boundary_axis() {
        let doors = build_doors();
        assert_eq!(doors.len(), 12);
        assert!(doors[..6]
            .iter()
            .all(|door| door.orientation == Orientation::Vertical));
        assert!(doors[6..]
            .iter()
            .all(|door| door.orientation == Orientation::Horizontal));
    }

    #[test]
    fn blocked_diagonal_slides_along_the_wall() {
        let doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        let from = (780.0, 100.0);
        let to = (790.0, 110.0);
        assert_eq!(nav.try_move(from, to, BODY_RADIUS, &doors), Some((780.0, 110.0)));
    }

    #[test]
    fn move_into_a_corner_is_rejected() {
        let doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        let from = (50.0, 50.0);
        let to = (40.0, 40.0);
        assert_eq!(nav.try_move(from, to, BODY_RADIUS, &doors), None);
    }

    #[test]
    fn room_cell_clamps_to_grid() {
        assert_eq!(room_cell(0.0, 0.0), (0, 0));
        assert_eq!(room_cell(799.0, 601.0), (0, 1));
        assert_eq!(room_cell(2399.0, 1799.0), (2, 2));
        assert_eq!(room_cell(5000.0, -5.0), (2, 0));
    }
}
