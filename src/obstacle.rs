use std::collections::{HashMap, HashSet};

use crate::actor::ActorId;
use crate::hypergrid::HyperMap;
use crate::subcell::SubdivisionCell;

/// What a proposed move ran into. Conflicts are values, never panics;
/// the caller decides whether to revert, retry or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstacle {
    /// The move left the playzone.
    Boundary,
    /// The move touched an impassable tile.
    Wall,
    /// The move overlapped a subcell held by another actor.
    Actor(ActorId),
}

/// Key of one occupied subcell: owning cell plus subcell index.
pub type TouchedSubcell = ((i32, i32), (i32, i32));

/// Axis-aligned bounds of an actor footprint in world coordinates.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

/// Tracks which actor occupies which subcells of the world grid and
/// validates proposed moves against that occupancy.
///
/// Validation and commitment are deliberately separate calls:
/// `check_move` answers "could I stand there" without touching any
/// state, `confirm_move` records occupancy once the caller has
/// actually moved. Callers revert the position themselves when
/// `check_move` reports a conflict.
pub struct ObstacleTracker {
    size: (i32, i32),
    cell_size: f32,
    half_cell_size: f32,
    subdivisions: i32,
    map: HyperMap<SubdivisionCell<ActorId>>,
    touched: HashMap<ActorId, HashSet<TouchedSubcell>>,
}

impl ObstacleTracker {
    pub fn new(size: (i32, i32), subdivisions: i32, chunk_size: i32, cell_size: f32) -> Self {
        let mut map = HyperMap::new(chunk_size);
        map.pre_init_with(size.0, size.1, || SubdivisionCell::new(subdivisions));
        ObstacleTracker {
            size,
            cell_size,
            half_cell_size: cell_size / 2.0,
            subdivisions,
            map,
            touched: HashMap::new(),
        }
    }

    pub fn subdivisions(&self) -> i32 {
        self.subdivisions
    }

    /// Validate a proposed move of actor `id` (square footprint of
    /// `half_size` half-extent) to `position`. Returns the first
    /// conflict found, or `None` when the move is fully valid.
    ///
    /// Check order: playzone bounds, then occupied subcells, then
    /// impassable tiles reported by `is_wall`.
    pub fn check_move(
        &self,
        id: ActorId,
        half_size: f32,
        position: (f32, f32),
        is_wall: impl Fn(i32, i32) -> bool,
    ) -> Option<Obstacle> {
        if self.out_of_bounds_pos(position) {
            return Some(Obstacle::Boundary);
        }
        let bounds = Self::footprint(position, half_size);
        let cells = self.touched_cells(&bounds);
        for &(cx, cy) in &cells {
            if self.out_of_bounds_cell((cx, cy)) {
                return Some(Obstacle::Boundary);
            }
            let cell = self.map.get(cx, cy);
            if cell.is_subdivided() {
                for (sx, sy) in self.touched_subcells_of_cell((cx, cy), &bounds) {
                    match cell.get(sx, sy) {
                        Some(&occupant) if occupant != id => {
                            return Some(Obstacle::Actor(occupant));
                        }
                        _ => {}
                    }
                }
            }
        }
        for &(cx, cy) in &cells {
            if is_wall(cx, cy) {
                return Some(Obstacle::Wall);
            }
        }
        None
    }

    /// Commit occupancy after the actor's position has been mutated
    /// and validated. Clears the previously cached subcells, writes
    /// fresh occupancy for the new footprint and returns the new
    /// center cell.
    pub fn confirm_move(&mut self, id: ActorId, half_size: f32, position: (f32, f32)) -> (i32, i32) {
        self.clear_actor_subcells(id);
        let bounds = Self::footprint(position, half_size);
        let mut writes: Vec<TouchedSubcell> = Vec::new();
        for (cx, cy) in self.touched_cells(&bounds) {
            if self.out_of_bounds_cell((cx, cy)) {
                continue;
            }
            for sub in self.touched_subcells_of_cell((cx, cy), &bounds) {
                writes.push(((cx, cy), sub));
            }
        }
        let cache = self.touched.entry(id).or_default();
        for ((cx, cy), (sx, sy)) in writes {
            self.map.get_mut(cx, cy).set(sx, sy, Some(id));
            cache.insert(((cx, cy), (sx, sy)));
        }
        self.center_cell(position)
    }

    /// The cell containing an actor center at `position`.
    pub fn center_cell(&self, position: (f32, f32)) -> (i32, i32) {
        (
            (position.0 / self.cell_size).round() as i32,
            (position.1 / self.cell_size).round() as i32,
        )
    }

    /// Live cache of the subcells currently written with this actor.
    pub fn touched_subcells(&self, id: ActorId) -> impl Iterator<Item = TouchedSubcell> + '_ {
        self.touched.get(&id).into_iter().flatten().copied()
    }

    /// Remove the actor from every subcell it occupies and drop its
    /// cache entry.
    pub fn remove_actor(&mut self, id: ActorId) {
        self.clear_actor_subcells(id);
        self.touched.remove(&id);
    }

    fn clear_actor_subcells(&mut self, id: ActorId) {
        if let Some(cached) = self.touched.get_mut(&id) {
            for ((cx, cy), (sx, sy)) in cached.drain() {
                let cell = self.map.get_mut(cx, cy);
                if cell.get(sx, sy) == Some(&id) {
                    cell.set(sx, sy, None);
                }
            }
        }
    }

    fn footprint(position: (f32, f32), half_size: f32) -> Aabb {
        Aabb {
            min_x: position.0 - half_size,
            min_y: position.1 - half_size,
            max_x: position.0 + half_size,
            max_y: position.1 + half_size,
        }
    }

    fn touched_cells(&self, bounds: &Aabb) -> Vec<(i32, i32)> {
        let start_x = (bounds.min_x / self.cell_size).round() as i32;
        let end_x = (bounds.max_x / self.cell_size).round() as i32;
        let start_y = (bounds.min_y / self.cell_size).round() as i32;
        let end_y = (bounds.max_y / self.cell_size).round() as i32;
        let mut cells = Vec::new();
        for x in start_x..=end_x {
            for y in start_y..=end_y {
                cells.push((x, y));
            }
        }
        cells
    }

    /// Which subcells of one cell's subdivision grid the footprint
    /// overlaps, clamped to the cell.
    fn touched_subcells_of_cell(&self, cell: (i32, i32), bounds: &Aabb) -> Vec<(i32, i32)> {
        let sub_size = self.cell_size / self.subdivisions as f32;
        let cell_center_x = cell.0 as f32 * self.cell_size;
        let cell_center_y = cell.1 as f32 * self.cell_size;
        let clamp = |v: f32| (v.round() as i32).clamp(0, self.subdivisions - 1);
        let start_x = clamp((bounds.min_x - (cell_center_x - self.half_cell_size)) / sub_size);
        let end_x = clamp((bounds.max_x - (cell_center_x - self.half_cell_size)) / sub_size);
        let start_y = clamp((bounds.min_y - (cell_center_y - self.half_cell_size)) / sub_size);
        let end_y = clamp((bounds.max_y - (cell_center_y - self.half_cell_size)) / sub_size);
        let mut subcells = Vec::new();
        for sx in start_x..=end_x {
            for sy in start_y..=end_y {
                subcells.push((sx, sy));
            }
        }
        subcells
    }

    fn out_of_bounds_pos(&self, position: (f32, f32)) -> bool {
        position.0 < 0.0
            || position.0 >= self.size.0 as f32
            || position.1 < 0.0
            || position.1 >= self.size.1 as f32
    }

    fn out_of_bounds_cell(&self, cell: (i32, i32)) -> bool {
        cell.0 < 0 || cell.0 >= self.size.0 || cell.1 < 0 || cell.1 >= self.size.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ObstacleTracker {
        ObstacleTracker::new((10, 10), 4, 16, 1.0)
    }

    const HALF: f32 = 0.25;

    #[test]
    fn open_ground_move_is_valid() {
        let t = tracker();
        assert_eq!(t.check_move(0, HALF, (5.0, 5.0), |_, _| false), None);
    }

    #[test]
    fn leaving_playzone_is_a_boundary_conflict() {
        let t = tracker();
        assert_eq!(
            t.check_move(0, HALF, (-0.5, 5.0), |_, _| false),
            Some(Obstacle::Boundary)
        );
        assert_eq!(
            t.check_move(0, HALF, (5.0, 10.0), |_, _| false),
            Some(Obstacle::Boundary)
        );
    }

    #[test]
    fn wall_tiles_are_reported_after_occupancy() {
        let t = tracker();
        assert_eq!(
            t.check_move(0, HALF, (5.0, 5.0), |x, y| x == 5 && y == 5),
            Some(Obstacle::Wall)
        );
    }

    #[test]
    fn confirm_then_check_conflicts_for_other_actor() {
        let mut t = tracker();
        t.confirm_move(1, HALF, (5.0, 5.0));
        // another actor probing the same spot sees the occupant
        assert_eq!(
            t.check_move(2, HALF, (5.0, 5.0), |_, _| false),
            Some(Obstacle::Actor(1))
        );
        // the occupant itself does not collide with its own cells
        assert_eq!(t.check_move(1, HALF, (5.0, 5.0), |_, _| false), None);
    }

    #[test]
    fn check_move_does_not_mutate_occupancy() {
        let mut t = tracker();
        t.confirm_move(1, HALF, (5.0, 5.0));
        let before: HashSet<_> = t.touched_subcells(1).collect();
        let _ = t.check_move(2, HALF, (5.0, 5.0), |_, _| false);
        let after: HashSet<_> = t.touched_subcells(1).collect();
        assert_eq!(before, after);
        assert!(t.touched_subcells(2).next().is_none());
    }

    #[test]
    fn confirm_move_replaces_cached_subcells() {
        let mut t = tracker();
        t.confirm_move(1, HALF, (2.0, 2.0));
        let old: HashSet<_> = t.touched_subcells(1).collect();
        assert!(!old.is_empty());
        t.confirm_move(1, HALF, (7.0, 7.0));
        let new: HashSet<_> = t.touched_subcells(1).collect();
        assert!(!new.is_empty());
        assert!(old.is_disjoint(&new));
        // old cells are free again for everyone else
        assert_eq!(t.check_move(2, HALF, (2.0, 2.0), |_, _| false), None);
    }

    #[test]
    fn distant_actors_do_not_conflict() {
        let mut t = tracker();
        t.confirm_move(1, HALF, (2.0, 2.0));
        assert_eq!(t.check_move(2, HALF, (7.0, 7.0), |_, _| false), None);
    }

    #[test]
    fn center_cell_rounds_to_nearest() {
        let t = tracker();
        assert_eq!(t.center_cell((5.4, 4.6)), (5, 5));
        assert_eq!(t.center_cell((0.2, 0.2)), (0, 0));
    }

    #[test]
    fn remove_actor_frees_its_subcells() {
        let mut t = tracker();
        t.confirm_move(1, HALF, (5.0, 5.0));
        t.remove_actor(1);
        assert!(t.touched_subcells(1).next().is_none());
        assert_eq!(t.check_move(2, HALF, (5.0, 5.0), |_, _| false), None);
    }
}
