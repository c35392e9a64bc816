use std::collections::BTreeMap;
use std::fs;
use std::path::Path as FsPath;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::actor::{ActorBody, ActorId, MovingActor, UpdateFrequency};
use crate::error::{ActorError, LayoutError};
use crate::hypergrid::{DoubleBufferedHyperMap, HyperMap};
use crate::obstacle::{Obstacle, ObstacleTracker};
use crate::tile::{ChargingStation, TileType};

const CHUNK_SIZE: i32 = 16;
const SUBDIVISIONS: i32 = 4;
const CELL_SIZE: f32 = 1.0;

/// A rectangular map layout stored as JSON: blocked cells and
/// charging stations as flat cell ids (`x + y * width`), plus the
/// suggested spawn cells. A fixture format for tests and demos, not a
/// live-world save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayout {
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub walls: Vec<i32>,
    #[serde(default)]
    pub stations: Vec<i32>,
    #[serde(default)]
    pub spawn_points: Vec<i32>,
}

impl MapLayout {
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self, LayoutError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: impl AsRef<FsPath>) -> Result<(), LayoutError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn cell_of(&self, id: i32) -> Result<(i32, i32), LayoutError> {
        if id < 0 || id >= self.width * self.height {
            return Err(LayoutError::CellOutOfRange(id, self.width, self.height));
        }
        Ok((id % self.width, id / self.width))
    }
}

/// Everything that makes up the world apart from the agents
/// themselves: tiles, temperature field, occupancy, spawn points and
/// the clock.
pub struct WorldState {
    size: (i32, i32),
    pub tile_map: HyperMap<TileType>,
    pub temperature: DoubleBufferedHyperMap<f32>,
    pub obstacle_tracker: ObstacleTracker,
    pub spawn_positions: Vec<(i32, i32)>,
    in_game_time: f32,
}

impl WorldState {
    pub fn new(size_x: i32, size_y: i32) -> Self {
        Self::with_chunking(size_x, size_y, CHUNK_SIZE, SUBDIVISIONS)
    }

    pub fn with_chunking(size_x: i32, size_y: i32, chunk_size: i32, subdivisions: i32) -> Self {
        let mut tile_map = HyperMap::new(chunk_size);
        tile_map.pre_init(size_x, size_y);
        let mut temperature = DoubleBufferedHyperMap::new(chunk_size);
        temperature.pre_init(size_x, size_y);
        WorldState {
            size: (size_x, size_y),
            tile_map,
            temperature,
            obstacle_tracker: ObstacleTracker::new(
                (size_x, size_y),
                subdivisions,
                chunk_size,
                CELL_SIZE,
            ),
            spawn_positions: Vec::new(),
            in_game_time: 0.0,
        }
    }

    pub fn size(&self) -> (i32, i32) {
        self.size
    }

    pub fn in_game_time(&self) -> f32 {
        self.in_game_time
    }

    pub fn advance_time(&mut self, dt: f32) {
        self.in_game_time += dt;
    }

    pub fn in_bounds(&self, cell: (i32, i32)) -> bool {
        cell.0 >= 0 && cell.0 < self.size.0 && cell.1 >= 0 && cell.1 < self.size.1
    }

    pub fn tile(&self, x: i32, y: i32) -> TileType {
        *self.tile_map.get(x, y)
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: TileType) {
        self.tile_map.set(x, y, tile);
    }

    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        self.tile_map.get(x, y).is_wall()
    }

    /// Validate a proposed actor move against bounds, occupancy and
    /// walls.
    pub fn check_actor_move(
        &self,
        id: ActorId,
        half_size: f32,
        position: (f32, f32),
    ) -> Option<Obstacle> {
        let tile_map = &self.tile_map;
        self.obstacle_tracker
            .check_move(id, half_size, position, |x, y| tile_map.get(x, y).is_wall())
    }

    /// Commit a validated move; returns the actor's new center cell.
    pub fn confirm_actor_move(
        &mut self,
        id: ActorId,
        half_size: f32,
        position: (f32, f32),
    ) -> (i32, i32) {
        self.obstacle_tracker.confirm_move(id, half_size, position)
    }

    pub fn remove_actor(&mut self, id: ActorId) {
        self.obstacle_tracker.remove_actor(id);
    }

    /// Stamp a layout's walls, stations and spawn points onto the
    /// map. Cell ids are validated against the world size.
    pub fn apply_layout(&mut self, layout: &MapLayout) -> Result<(), LayoutError> {
        for &id in &layout.walls {
            let (x, y) = layout.cell_of(id)?;
            if !self.in_bounds((x, y)) {
                return Err(LayoutError::CellOutOfRange(id, self.size.0, self.size.1));
            }
            self.set_tile(x, y, TileType::Wall);
        }
        for &id in &layout.stations {
            let (x, y) = layout.cell_of(id)?;
            if !self.in_bounds((x, y)) {
                return Err(LayoutError::CellOutOfRange(id, self.size.0, self.size.1));
            }
            self.set_tile(x, y, TileType::ChargingStation(ChargingStation::new()));
        }
        for &id in &layout.spawn_points {
            let cell = layout.cell_of(id)?;
            self.spawn_positions.push(cell);
        }
        debug!(
            "applied layout: {} walls, {} stations, {} spawn points",
            layout.walls.len(),
            layout.stations.len(),
            layout.spawn_points.len()
        );
        Ok(())
    }

    /// One diffusion step over the temperature field: every cell
    /// drifts toward the average of its non-wall neighbors. Cells
    /// with no non-wall neighbors keep their value.
    pub fn step_temperature(&mut self, dt: f32, effect_power: f32) {
        let per_tick = dt * effect_power;
        let (width, height) = self.size;
        let tile_map = &self.tile_map;
        self.temperature
            .process_all_cells_in_parallel_with_map(move |x, y, map, temp| {
                if x >= width || y >= height {
                    // chunk padding outside the playzone
                    return *temp;
                }
                let mut sum = 0.0f32;
                let mut count = 0u32;
                for (nx, ny) in [(x, y - 1), (x + 1, y), (x, y + 1), (x - 1, y)] {
                    if nx < 0 || ny < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    if tile_map.get(nx, ny).is_wall() {
                        continue;
                    }
                    sum += *map.get(nx, ny);
                    count += 1;
                }
                if count == 0 {
                    return *temp;
                }
                let avg = sum / count as f32;
                temp + (avg - temp) * per_tick
            });
    }
}

const LOW_UPDATE_PERIOD: f32 = 1.0;
const HIGH_UPDATE_PERIOD: f32 = 0.1;
const TEMPERATURE_EFFECT_POWER: f32 = 0.2;

/// The driver: owns the world and the live agents and advances both
/// in fixed phases per tick. Actors are kept in a `BTreeMap` so every
/// phase walks them in a deterministic order.
pub struct Simulation {
    pub world: WorldState,
    actors: BTreeMap<ActorId, MovingActor>,
    next_actor_id: ActorId,
    low_time_acc: f32,
    high_time_acc: f32,
    pub low_update_period: f32,
    pub high_update_period: f32,
    pub temperature_effect_power: f32,
}

impl Simulation {
    pub fn new(world: WorldState) -> Self {
        Simulation {
            world,
            actors: BTreeMap::new(),
            next_actor_id: 0,
            low_time_acc: 0.0,
            high_time_acc: 0.0,
            low_update_period: LOW_UPDATE_PERIOD,
            high_update_period: HIGH_UPDATE_PERIOD,
            temperature_effect_power: TEMPERATURE_EFFECT_POWER,
        }
    }

    /// Build an actor with a fresh id. The actor exists outside the
    /// world until `spawn` instantiates it.
    pub fn create_actor(&mut self, name: impl Into<String>) -> MovingActor {
        let id = self.next_actor_id;
        self.next_actor_id += 1;
        MovingActor::new(ActorBody::new(id, name))
    }

    /// Register an actor into the world at a cell: marks it
    /// instantiated, places it and claims its subcells.
    pub fn spawn(&mut self, mut actor: MovingActor, cell: (i32, i32)) -> Result<ActorId, ActorError> {
        actor.body.mark_instantiated()?;
        let position = (cell.0 as f32, cell.1 as f32);
        actor.body.set_position(position);
        actor.body.main_position = cell;
        actor.body.prev_main_position = cell;
        self.world
            .confirm_actor_move(actor.body.id(), actor.body.half_size(), position);
        let id = actor.body.id();
        info!("actor {} ({}) spawned at {:?}", id, actor.body.name, cell);
        self.actors.insert(id, actor);
        Ok(id)
    }

    /// Remove an actor from the world, freeing its occupancy. The
    /// actor is handed back; respawning it is an error.
    pub fn despawn(&mut self, id: ActorId) -> Result<MovingActor, ActorError> {
        let mut actor = self
            .actors
            .remove(&id)
            .ok_or(ActorError::UnknownActor(id))?;
        actor.body.mark_removed()?;
        self.world.remove_actor(id);
        info!("actor {} ({}) removed", id, actor.body.name);
        Ok(actor)
    }

    pub fn actor(&self, id: ActorId) -> Option<&MovingActor> {
        self.actors.get(&id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut MovingActor> {
        self.actors.get_mut(&id)
    }

    pub fn actors(&self) -> impl Iterator<Item = &MovingActor> {
        self.actors.values()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Advance the simulation by `dt` seconds: component updates
    /// (every-frame plus the low/high accumulators), cognition,
    /// movement, then the temperature diffusion pass.
    pub fn tick(&mut self, dt: f32) {
        for actor in self.actors.values_mut() {
            actor
                .body
                .update_components(UpdateFrequency::EveryFrame, dt, &self.world);
        }
        if self.low_time_acc > self.low_update_period {
            for actor in self.actors.values_mut() {
                actor
                    .body
                    .update_components(UpdateFrequency::Low, self.low_time_acc, &self.world);
            }
            self.low_time_acc = 0.0;
        } else {
            self.low_time_acc += dt;
        }
        if self.high_time_acc > self.high_update_period {
            for actor in self.actors.values_mut() {
                actor
                    .body
                    .update_components(UpdateFrequency::High, self.high_time_acc, &self.world);
            }
            self.high_time_acc = 0.0;
        } else {
            self.high_time_acc += dt;
        }

        for actor in self.actors.values_mut() {
            actor.think(dt, &self.world);
        }
        for actor in self.actors.values_mut() {
            actor.move_position(dt, &mut self.world);
        }

        self.world.step_temperature(dt, self.temperature_effect_power);
        self.world.advance_time(dt);
    }
}
