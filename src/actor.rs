use log::trace;

use crate::bots::Battery;
use crate::error::ActorError;
use crate::intellect::Intellect;
use crate::obstacle::Obstacle;
use crate::pathfinding::{self, Path};
use crate::tasking::MovementStep;
use crate::world::WorldState;

pub type ActorId = usize;

/// A latch that reads true once per set.
#[derive(Debug, Default)]
pub struct Switch {
    state: bool,
}

impl Switch {
    pub fn set(&mut self) {
        self.state = true;
    }

    pub fn read_and_reset(&mut self) -> bool {
        std::mem::replace(&mut self.state, false)
    }
}

/// Continuous position of an agent, decoupled from the grid so other
/// position sources (interpolated render positions, physics) can be
/// swapped in.
pub trait RealPositionProvider {
    fn world_coordinates(&self) -> (f32, f32);
    fn set_world_coordinates(&mut self, position: (f32, f32));
    /// Advance `distance` along a normalized direction.
    fn step(&mut self, distance: f32, direction: (f32, f32));
}

/// Facing direction of an agent with smooth turning.
pub trait RealRotationProvider {
    fn rotation_direction(&self) -> (f32, f32);
    fn look_at_immediately(&mut self, direction: (f32, f32));
    /// Turn up to `turn_step` radians toward `target`, seen from
    /// `from`.
    fn look_at_smooth(&mut self, turn_step: f32, target: (f32, f32), from: (f32, f32));
    fn is_facing(&self, target: (f32, f32), from: (f32, f32)) -> bool;
}

/// Plain grid-space position.
#[derive(Debug, Default)]
pub struct GridPositionProvider {
    position: (f32, f32),
}

impl RealPositionProvider for GridPositionProvider {
    fn world_coordinates(&self) -> (f32, f32) {
        self.position
    }

    fn set_world_coordinates(&mut self, position: (f32, f32)) {
        self.position = position;
    }

    fn step(&mut self, distance: f32, direction: (f32, f32)) {
        self.position.0 += direction.0 * distance;
        self.position.1 += direction.1 * distance;
    }
}

const FACING_EPSILON: f32 = 0.05;

/// Angle-stepped facing in grid space.
#[derive(Debug)]
pub struct GridRotationProvider {
    direction: (f32, f32),
}

impl Default for GridRotationProvider {
    fn default() -> Self {
        GridRotationProvider {
            direction: (1.0, 0.0),
        }
    }
}

impl GridRotationProvider {
    fn angle_to(&self, target: (f32, f32), from: (f32, f32)) -> Option<f32> {
        let to = (target.0 - from.0, target.1 - from.1);
        if to == (0.0, 0.0) {
            return None;
        }
        let target_angle = to.1.atan2(to.0);
        let current_angle = self.direction.1.atan2(self.direction.0);
        let mut diff = target_angle - current_angle;
        while diff > std::f32::consts::PI {
            diff -= std::f32::consts::TAU;
        }
        while diff < -std::f32::consts::PI {
            diff += std::f32::consts::TAU;
        }
        Some(diff)
    }
}

impl RealRotationProvider for GridRotationProvider {
    fn rotation_direction(&self) -> (f32, f32) {
        self.direction
    }

    fn look_at_immediately(&mut self, direction: (f32, f32)) {
        let len = (direction.0 * direction.0 + direction.1 * direction.1).sqrt();
        if len > 0.0 {
            self.direction = (direction.0 / len, direction.1 / len);
        }
    }

    fn look_at_smooth(&mut self, turn_step: f32, target: (f32, f32), from: (f32, f32)) {
        let Some(diff) = self.angle_to(target, from) else {
            return;
        };
        let applied = diff.clamp(-turn_step, turn_step);
        let angle = self.direction.1.atan2(self.direction.0) + applied;
        self.direction = (angle.cos(), angle.sin());
    }

    fn is_facing(&self, target: (f32, f32), from: (f32, f32)) -> bool {
        match self.angle_to(target, from) {
            Some(diff) => diff.abs() < FACING_EPSILON,
            None => true,
        }
    }
}

/// How often a component's `update` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFrequency {
    EveryFrame,
    High,
    Low,
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Battery,
}

/// Data components attached to an actor. A closed set: matching is
/// exhaustive and lookups go by `ComponentKind`.
pub enum ActorComponent {
    Battery(Battery),
}

impl ActorComponent {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ActorComponent::Battery(_) => ComponentKind::Battery,
        }
    }

    pub fn frequency(&self) -> UpdateFrequency {
        match self {
            ActorComponent::Battery(_) => UpdateFrequency::EveryFrame,
        }
    }

    pub fn update(&mut self, dt: f32, main_position: (i32, i32), world: &WorldState) {
        match self {
            ActorComponent::Battery(battery) => battery.update(dt, main_position, world),
        }
    }

    pub fn on_main_cell_changed(
        &mut self,
        _prev: (i32, i32),
        _main: (i32, i32),
        _world: &WorldState,
    ) {
        match self {
            ActorComponent::Battery(_) => {}
        }
    }
}

const ACTOR_SIZE: f32 = 0.5;
const ARRIVAL_EPSILON_SQ: f32 = 0.01;

/// The physical half of an agent: position, facing, movement state,
/// lifecycle flags and attached components. The cognitive half lives
/// in `Intellect`; keeping them as separate fields lets the scheduler
/// borrow the body mutably while it runs.
pub struct ActorBody {
    id: ActorId,
    pub name: String,
    size: f32,
    half_size: f32,
    pub speed: f32,
    pub rotation_speed: f32,
    position: Box<dyn RealPositionProvider>,
    rotation: Box<dyn RealRotationProvider>,
    pub direction: (f32, f32),
    pub movement_step: Option<MovementStep>,
    pub failed_to_move: Option<Obstacle>,
    pub main_position: (i32, i32),
    pub prev_main_position: (i32, i32),
    center_changed: Switch,
    instantiated: bool,
    removed: bool,
    components: Vec<ActorComponent>,
}

impl ActorBody {
    pub fn new(id: ActorId, name: impl Into<String>) -> Self {
        ActorBody {
            id,
            name: name.into(),
            size: ACTOR_SIZE,
            half_size: ACTOR_SIZE / 2.0,
            speed: 1.0,
            rotation_speed: 4.0,
            position: Box::new(GridPositionProvider::default()),
            rotation: Box::new(GridRotationProvider::default()),
            direction: (0.0, 0.0),
            movement_step: None,
            failed_to_move: None,
            main_position: (0, 0),
            prev_main_position: (0, 0),
            center_changed: Switch::default(),
            instantiated: false,
            removed: false,
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn half_size(&self) -> f32 {
        self.half_size
    }

    pub fn position(&self) -> (f32, f32) {
        self.position.world_coordinates()
    }

    pub fn set_position(&mut self, position: (f32, f32)) {
        self.position.set_world_coordinates(position);
    }

    pub fn rotation_direction(&self) -> (f32, f32) {
        self.rotation.rotation_direction()
    }

    pub fn look_at_smooth(&mut self, turn_step: f32, target: (f32, f32)) {
        let from = self.position.world_coordinates();
        self.rotation.look_at_smooth(turn_step, target, from);
    }

    pub fn is_facing(&self, target: (f32, f32)) -> bool {
        self.rotation.is_facing(target, self.position.world_coordinates())
    }

    pub fn set_center_changed(&mut self) {
        self.center_changed.set();
    }

    pub fn take_center_changed(&mut self) -> bool {
        self.center_changed.read_and_reset()
    }

    pub fn mark_instantiated(&mut self) -> Result<(), ActorError> {
        if self.instantiated {
            return Err(ActorError::AlreadyInstantiated);
        }
        self.instantiated = true;
        Ok(())
    }

    pub fn mark_removed(&mut self) -> Result<(), ActorError> {
        if !self.instantiated {
            return Err(ActorError::NotInstantiated);
        }
        if self.removed {
            return Err(ActorError::AlreadyRemoved);
        }
        self.removed = true;
        Ok(())
    }

    pub fn add_component(&mut self, component: ActorComponent) -> Result<(), ActorError> {
        let kind = component.kind();
        if self.components.iter().any(|c| c.kind() == kind) {
            return Err(ActorError::DuplicateComponent(kind));
        }
        self.components.push(component);
        Ok(())
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&ActorComponent> {
        self.components.iter().find(|c| c.kind() == kind)
    }

    pub fn battery(&self) -> Option<&Battery> {
        self.components.iter().find_map(|c| match c {
            ActorComponent::Battery(battery) => Some(battery),
        })
    }

    pub fn battery_mut(&mut self) -> Option<&mut Battery> {
        self.components.iter_mut().find_map(|c| match c {
            ActorComponent::Battery(battery) => Some(battery),
        })
    }

    pub fn update_components(&mut self, frequency: UpdateFrequency, dt: f32, world: &WorldState) {
        let main = self.main_position;
        for component in self
            .components
            .iter_mut()
            .filter(|c| c.frequency() == frequency)
        {
            component.update(dt, main, world);
        }
    }

    pub fn notify_components_cell_changed(&mut self, world: &WorldState) {
        let prev = self.prev_main_position;
        let main = self.main_position;
        for component in self.components.iter_mut() {
            component.on_main_cell_changed(prev, main, world);
        }
    }

    pub fn reached_target(&self, target: (f32, f32)) -> bool {
        let pos = self.position.world_coordinates();
        let dx = pos.0 - target.0;
        let dy = pos.1 - target.1;
        dx * dx + dy * dy < ARRIVAL_EPSILON_SQ
    }

    pub fn is_passable(&self, world: &WorldState, cell: (i32, i32)) -> bool {
        world.in_bounds(cell) && !world.is_wall(cell.0, cell.1)
    }

    pub fn pass_cost(&self, world: &WorldState, cell: (i32, i32)) -> f32 {
        if self.is_passable(world, cell) {
            1.0
        } else {
            100.0
        }
    }

    /// A* from the agent's main cell, run through the path optimizer.
    pub fn plan_path(&self, world: &WorldState, target: (i32, i32)) -> Option<Path> {
        let (width, height) = world.size();
        let raw = pathfinding::astar4(
            self.main_position,
            target,
            width,
            height,
            |x, y| self.is_passable(world, (x, y)),
            |x, y| self.pass_cost(world, (x, y)),
        )?;
        Some(pathfinding::optimize_path(&raw, |x, y| {
            self.is_passable(world, (x, y))
        }))
    }

    /// Cheapest reachable cell matching the predicate, within a
    /// movement cost budget.
    pub fn find_closest_point_of(
        &self,
        world: &WorldState,
        predicate: impl Fn(&WorldState, (i32, i32)) -> bool,
        max_cost: f32,
    ) -> Option<(i32, i32)> {
        let (width, height) = world.size();
        pathfinding::find_closest_point(
            self.main_position,
            width,
            height,
            max_cost,
            |x, y| self.is_passable(world, (x, y)),
            |x, y| self.pass_cost(world, (x, y)),
            |p| predicate(world, p),
        )
    }
}

/// A complete agent: body plus intellect, split so the scheduler can
/// mutate the body while it iterates its own collections.
pub struct MovingActor {
    pub body: ActorBody,
    pub intellect: Intellect,
}

impl MovingActor {
    pub fn new(body: ActorBody) -> Self {
        MovingActor {
            body,
            intellect: Intellect::new(),
        }
    }

    /// One cognition step: behaviors, the current task, then steering
    /// toward the current movement step.
    pub fn think(&mut self, dt: f32, world: &WorldState) {
        {
            let MovingActor { body, intellect } = self;
            intellect.process_behaviors(dt, body, world);
            intellect.process_current_task(dt, body, world);
        }
        self.move_and_rotate_towards_target(dt, world);
    }

    fn move_and_rotate_towards_target(&mut self, dt: f32, world: &WorldState) {
        if self.body.take_center_changed() {
            self.center_changed(world);
        }
        let Some(step) = self.body.movement_step else {
            return;
        };
        let target = (step.target_cell.0 as f32, step.target_cell.1 as f32);
        if !step.rotate_only {
            if self.body.reached_target(target) {
                self.end_movement_step(world);
                return;
            }
            let pos = self.body.position();
            let to = (target.0 - pos.0, target.1 - pos.1);
            let len = (to.0 * to.0 + to.1 * to.1).sqrt();
            self.body.direction = if len > 0.0 {
                (to.0 / len, to.1 / len)
            } else {
                (0.0, 0.0)
            };
        } else {
            self.body.direction = (0.0, 0.0);
        }
        let turn_step = self.body.rotation_speed * dt;
        self.body.look_at_smooth(turn_step, target);
        if step.rotate_only && self.body.is_facing(target) {
            self.end_movement_step(world);
        }
    }

    /// Clear the movement step and tell the current task it is done.
    pub fn end_movement_step(&mut self, world: &WorldState) {
        self.body.direction = (0.0, 0.0);
        self.body.movement_step = None;
        let MovingActor { body, intellect } = self;
        intellect.consider_movement_step_completed(body, world);
    }

    fn center_changed(&mut self, world: &WorldState) {
        let MovingActor { body, intellect } = self;
        intellect.consider_center_changed(body, world);
        body.notify_components_cell_changed(world);
    }

    /// Attempt physical movement along the current direction. On a
    /// conflict the position stays put and the failure runs through
    /// the recovery chain; on success occupancy is committed and a
    /// center-cell change is latched for the next think.
    pub fn move_position(&mut self, dt: f32, world: &mut WorldState) {
        self.body.failed_to_move = None;
        if self.body.direction == (0.0, 0.0) {
            return;
        }
        let pos = self.body.position();
        let distance = self.body.speed * dt;
        let candidate = (
            pos.0 + self.body.direction.0 * distance,
            pos.1 + self.body.direction.1 * distance,
        );
        if let Some(obstacle) =
            world.check_actor_move(self.body.id(), self.body.half_size(), candidate)
        {
            trace!("actor {} blocked by {:?}", self.body.id(), obstacle);
            self.hit_obstacle(obstacle, world);
            return;
        }
        self.body.set_position(candidate);
        let center = world.confirm_actor_move(self.body.id(), self.body.half_size(), candidate);
        if center != self.body.main_position {
            self.body.prev_main_position = self.body.main_position;
            self.body.main_position = center;
            self.body.set_center_changed();
        }
    }

    /// Stop, drop the movement step and run the recovery chain.
    pub fn hit_obstacle(&mut self, obstacle: Obstacle, world: &WorldState) {
        self.body.failed_to_move = Some(obstacle);
        self.body.direction = (0.0, 0.0);
        self.body.movement_step = None;
        let MovingActor { body, intellect } = self;
        intellect.consider_movement_step_failed(body, world, obstacle);
    }
}
