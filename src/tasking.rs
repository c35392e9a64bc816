use std::collections::VecDeque;

use crate::actor::ActorBody;
use crate::intellect::BehaviorId;
use crate::obstacle::Obstacle;
use crate::pathfinding::Path;
use crate::world::WorldState;

/// Lifecycle of a logical task. `Finished` and `Cancelled` are
/// terminal; transitioning out of them is a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Interrupted,
    Finished,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Cancelled)
    }
}

/// Shared state machine every logical task embeds. All transitions go
/// through here so the legality checks live in one place.
#[derive(Debug, Clone)]
pub struct TaskCore {
    status: TaskStatus,
    pub priority: f32,
    pub created_by: Option<BehaviorId>,
    interruptable: bool,
    /// In-game time of the most recent interruption.
    pub interrupted_at: f32,
}

impl TaskCore {
    pub fn new(priority: f32, created_by: Option<BehaviorId>) -> Self {
        TaskCore {
            status: TaskStatus::NotStarted,
            priority,
            created_by,
            interruptable: true,
            interrupted_at: 0.0,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn ended(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_interruptable(&self) -> bool {
        self.interruptable
    }

    pub fn set_interruptable(&mut self, interruptable: bool) {
        self.interruptable = interruptable;
    }

    pub fn set_started(&mut self) {
        if self.status != TaskStatus::NotStarted {
            panic!("task started twice (status was {:?})", self.status);
        }
        self.status = TaskStatus::InProgress;
    }

    /// Legal from any non-terminal status; a task may finish before
    /// it was ever started (e.g. a queued sub-task drained by its
    /// parent).
    pub fn finish(&mut self) {
        if self.status.is_terminal() {
            panic!("finish on a terminal task (status was {:?})", self.status);
        }
        self.status = TaskStatus::Finished;
    }

    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            panic!("cancel on a terminal task (status was {:?})", self.status);
        }
        self.status = TaskStatus::Cancelled;
    }

    pub fn interrupt(&mut self, in_game_time: f32) {
        if self.status != TaskStatus::InProgress {
            panic!("interrupt on a task that was {:?}", self.status);
        }
        self.status = TaskStatus::Interrupted;
        self.interrupted_at = in_game_time;
    }

    pub fn resume(&mut self) {
        if self.status != TaskStatus::Interrupted {
            panic!("resume on a task that was {:?}", self.status);
        }
        self.status = TaskStatus::InProgress;
    }
}

/// One commanded motion: walk to the center of a cell, or only turn
/// to face it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementStep {
    pub target_cell: (i32, i32),
    pub rotate_only: bool,
}

impl MovementStep {
    pub fn new(target_cell: (i32, i32)) -> Self {
        MovementStep {
            target_cell,
            rotate_only: false,
        }
    }

    pub fn rotate_toward(target_cell: (i32, i32)) -> Self {
        MovementStep {
            target_cell,
            rotate_only: true,
        }
    }
}

/// Step-by-step executor owned by a logical task, e.g. a path
/// follower. Runs every tick alongside its owner.
pub trait LowLevelTask {
    fn is_completed(&self) -> bool;

    /// Drive the agent one tick. Returns false once there is nothing
    /// left to do.
    fn execute(&mut self, dt: f32, body: &mut ActorBody, world: &WorldState) -> bool;

    /// First stop of the movement-failure recovery chain. Return true
    /// to absorb the failure locally.
    fn recover_from_interruption(&mut self, _obstacle: Obstacle) -> bool {
        false
    }
}

/// An agent goal with a priority and a lifecycle. The scheduler keeps
/// at most one task in progress; the rest wait, interrupted or not
/// yet started.
pub trait LogicalTask {
    fn core(&self) -> &TaskCore;
    fn core_mut(&mut self) -> &mut TaskCore;

    fn active_low_level_task_mut(&mut self) -> Option<&mut dyn LowLevelTask>;

    fn on_start(&mut self, _body: &mut ActorBody, _world: &WorldState) {}
    fn on_completed(&mut self, _body: &mut ActorBody, _world: &WorldState) {}
    fn on_cancelled(&mut self, _body: &mut ActorBody, _world: &WorldState) {}
    fn on_interrupted(&mut self, _body: &mut ActorBody, _world: &WorldState) {}
    fn on_resumed(&mut self, _body: &mut ActorBody, _world: &WorldState) {}

    fn execute(&mut self, _dt: f32, _body: &mut ActorBody, _world: &WorldState) {}

    fn consider_center_changed(&mut self, _body: &mut ActorBody, _world: &WorldState) {}
    fn consider_movement_step_completed(&mut self, _body: &mut ActorBody, _world: &WorldState) {}

    /// Second stop of the recovery chain, after the low-level task
    /// declined.
    fn recover_from_interruption(
        &mut self,
        _body: &mut ActorBody,
        _world: &WorldState,
        _obstacle: Obstacle,
    ) -> bool {
        false
    }

    // Transition entry points. Compound tasks override these to keep
    // their children in step with the parent status.

    fn set_started(&mut self) {
        self.core_mut().set_started();
    }

    fn finish(&mut self) {
        self.core_mut().finish();
    }

    fn cancel(&mut self) {
        self.core_mut().cancel();
    }

    fn interrupt(&mut self, in_game_time: f32) {
        self.core_mut().interrupt(in_game_time);
    }

    fn resume(&mut self) {
        self.core_mut().resume();
    }

    fn is_interruptable(&self) -> bool {
        self.core().is_interruptable()
    }

    fn status(&self) -> TaskStatus {
        self.core().status()
    }

    fn ended(&self) -> bool {
        self.core().ended()
    }

    fn priority(&self) -> f32 {
        self.core().priority
    }
}

/// Low-level path follower. Feeds the agent one movement step at a
/// time from a precomputed path, then (if the path carries a trailing
/// facing) one rotate-only step, then reports completion.
pub struct FollowPathTask {
    path: Path,
    completed: bool,
    rotation_consumed: bool,
}

impl FollowPathTask {
    pub fn new(path: Path) -> Self {
        FollowPathTask {
            path,
            completed: false,
            rotation_consumed: false,
        }
    }
}

impl LowLevelTask for FollowPathTask {
    fn is_completed(&self) -> bool {
        self.completed
    }

    fn execute(&mut self, _dt: f32, body: &mut ActorBody, _world: &WorldState) -> bool {
        if body.movement_step.is_none() {
            if let Some(next) = self.path.consume_next_point() {
                body.movement_step = Some(MovementStep::new(next));
                return true;
            }
            match self.path.rotation_after() {
                Some(face) if !self.rotation_consumed => {
                    body.movement_step = Some(MovementStep::rotate_toward(face));
                    self.rotation_consumed = true;
                }
                _ => {
                    self.completed = true;
                    return false;
                }
            }
        }
        true
    }
}

/// Walk to a fixed cell. Plans once on start; finishes when the path
/// follower runs out of points. A movement failure replans from the
/// agent's current cell before the failure is allowed to escalate.
pub struct GoToPointTask {
    core: TaskCore,
    point: (i32, i32),
    follower: Option<FollowPathTask>,
}

impl GoToPointTask {
    pub fn new(point: (i32, i32), priority: f32, created_by: Option<BehaviorId>) -> Self {
        GoToPointTask {
            core: TaskCore::new(priority, created_by),
            point,
            follower: None,
        }
    }

    pub fn point(&self) -> (i32, i32) {
        self.point
    }

    pub(crate) fn set_point(&mut self, point: (i32, i32)) {
        self.point = point;
    }

    /// Plan toward `point` and install the follower. Cancels when no
    /// path exists and the agent is elsewhere; finishes when no path
    /// exists but the agent already stands on the target.
    fn plan(&mut self, body: &mut ActorBody, world: &WorldState) {
        match body.plan_path(world, self.point) {
            Some(path) => self.follower = Some(FollowPathTask::new(path)),
            None if body.main_position != self.point => self.cancel(),
            None => self.finish(),
        }
    }
}

impl LogicalTask for GoToPointTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn active_low_level_task_mut(&mut self) -> Option<&mut dyn LowLevelTask> {
        self.follower.as_mut().map(|f| f as &mut dyn LowLevelTask)
    }

    fn on_start(&mut self, body: &mut ActorBody, world: &WorldState) {
        self.plan(body, world);
    }

    /// The path planned before the interruption is stale; replan from
    /// wherever the agent stands now.
    fn on_resumed(&mut self, body: &mut ActorBody, world: &WorldState) {
        self.plan(body, world);
    }

    fn execute(&mut self, _dt: f32, _body: &mut ActorBody, _world: &WorldState) {
        let follower = self
            .follower
            .as_ref()
            .unwrap_or_else(|| panic!("go-to task executed before on_start planned a path"));
        if follower.is_completed() {
            self.finish();
        }
    }

    fn recover_from_interruption(
        &mut self,
        body: &mut ActorBody,
        world: &WorldState,
        _obstacle: Obstacle,
    ) -> bool {
        // replan from wherever the agent ended up
        match body.plan_path(world, self.point) {
            Some(path) => {
                self.follower = Some(FollowPathTask::new(path));
                true
            }
            None => false,
        }
    }
}

/// Supplies the current target cell for a dynamic go-to task.
pub trait PointProvider {
    fn point(&self) -> (i32, i32);
}

/// Walk to a moving target. Replans whenever the provider reports a
/// different cell than the one currently planned for.
pub struct GoToDynamicPointTask {
    core: TaskCore,
    provider: Box<dyn PointProvider>,
    point: (i32, i32),
    follower: Option<FollowPathTask>,
}

impl GoToDynamicPointTask {
    pub fn new(
        provider: Box<dyn PointProvider>,
        priority: f32,
        created_by: Option<BehaviorId>,
    ) -> Self {
        let point = provider.point();
        GoToDynamicPointTask {
            core: TaskCore::new(priority, created_by),
            provider,
            point,
            follower: None,
        }
    }

    fn plan(&mut self, body: &mut ActorBody, world: &WorldState) {
        match body.plan_path(world, self.point) {
            Some(path) => self.follower = Some(FollowPathTask::new(path)),
            None if body.main_position != self.point => self.cancel(),
            None => self.finish(),
        }
    }
}

impl LogicalTask for GoToDynamicPointTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn active_low_level_task_mut(&mut self) -> Option<&mut dyn LowLevelTask> {
        self.follower.as_mut().map(|f| f as &mut dyn LowLevelTask)
    }

    fn on_start(&mut self, body: &mut ActorBody, world: &WorldState) {
        self.point = self.provider.point();
        self.plan(body, world);
    }

    fn on_resumed(&mut self, body: &mut ActorBody, world: &WorldState) {
        self.point = self.provider.point();
        self.plan(body, world);
    }

    fn execute(&mut self, _dt: f32, body: &mut ActorBody, world: &WorldState) {
        let new_point = self.provider.point();
        if new_point != self.point {
            // target moved, abandon the old plan and clear the step
            // that aimed at it
            self.point = new_point;
            body.movement_step = None;
            self.plan(body, world);
            if self.ended() {
                return;
            }
        }
        let follower = self
            .follower
            .as_ref()
            .unwrap_or_else(|| panic!("dynamic go-to executed before on_start planned a path"));
        if follower.is_completed() {
            self.finish();
        }
    }

    fn recover_from_interruption(
        &mut self,
        body: &mut ActorBody,
        world: &WorldState,
        _obstacle: Obstacle,
    ) -> bool {
        match body.plan_path(world, self.point) {
            Some(path) => {
                self.follower = Some(FollowPathTask::new(path));
                true
            }
            None => false,
        }
    }
}

/// Predicate over world cells used to pick a destination.
pub type CellPredicate = Box<dyn Fn(&WorldState, (i32, i32)) -> bool>;

/// Search the reachable neighborhood for the cheapest cell matching a
/// predicate, then walk there. Cancels on start when nothing matches
/// within the cost budget.
pub struct FindAndGoToPointTask {
    inner: GoToPointTask,
    predicate: CellPredicate,
    max_cost: f32,
}

impl FindAndGoToPointTask {
    pub fn new(
        predicate: CellPredicate,
        max_cost: f32,
        priority: f32,
        created_by: Option<BehaviorId>,
    ) -> Self {
        FindAndGoToPointTask {
            inner: GoToPointTask::new((0, 0), priority, created_by),
            predicate,
            max_cost,
        }
    }
}

impl LogicalTask for FindAndGoToPointTask {
    fn core(&self) -> &TaskCore {
        self.inner.core()
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        self.inner.core_mut()
    }

    fn active_low_level_task_mut(&mut self) -> Option<&mut dyn LowLevelTask> {
        self.inner.active_low_level_task_mut()
    }

    fn on_start(&mut self, body: &mut ActorBody, world: &WorldState) {
        match body.find_closest_point_of(world, &self.predicate, self.max_cost) {
            Some(point) => {
                self.inner.set_point(point);
                self.inner.on_start(body, world);
            }
            None => self.cancel(),
        }
    }

    fn on_resumed(&mut self, body: &mut ActorBody, world: &WorldState) {
        self.inner.on_resumed(body, world);
    }

    fn execute(&mut self, dt: f32, body: &mut ActorBody, world: &WorldState) {
        self.inner.execute(dt, body, world);
    }

    fn recover_from_interruption(
        &mut self,
        body: &mut ActorBody,
        world: &WorldState,
        obstacle: Obstacle,
    ) -> bool {
        self.inner.recover_from_interruption(body, world, obstacle)
    }
}

/// A FIFO queue of sub-tasks run strictly in order, one active at a
/// time. Lifecycle calls are forwarded to the active child; finishing
/// or cancelling the composite drains whatever remains in the queue.
pub struct CompositeTask {
    core: TaskCore,
    queue: VecDeque<Box<dyn LogicalTask>>,
    current: Option<Box<dyn LogicalTask>>,
    completed: Vec<Box<dyn LogicalTask>>,
}

impl CompositeTask {
    pub fn new(priority: f32, created_by: Option<BehaviorId>) -> Self {
        CompositeTask {
            core: TaskCore::new(priority, created_by),
            queue: VecDeque::new(),
            current: None,
            completed: Vec::new(),
        }
    }

    pub fn add_task(&mut self, task: Box<dyn LogicalTask>) {
        self.queue.push_back(task);
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Sub-tasks that ran to completion, in the order they finished.
    pub fn completed_tasks(&self) -> &[Box<dyn LogicalTask>] {
        &self.completed
    }

    fn begin_next_task(&mut self, body: &mut ActorBody, world: &WorldState) {
        let mut task = self.queue.pop_front().expect("queue checked non-empty");
        task.set_started();
        task.on_start(body, world);
        self.current = Some(task);
    }
}

impl LogicalTask for CompositeTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn active_low_level_task_mut(&mut self) -> Option<&mut dyn LowLevelTask> {
        self.current
            .as_mut()
            .and_then(|t| t.active_low_level_task_mut())
    }

    fn is_interruptable(&self) -> bool {
        self.current
            .as_ref()
            .map(|t| t.is_interruptable())
            .unwrap_or(true)
    }

    fn on_start(&mut self, body: &mut ActorBody, world: &WorldState) {
        if self.current.is_some() {
            panic!("composite task started twice");
        }
        if self.queue.is_empty() {
            self.finish();
            return;
        }
        self.begin_next_task(body, world);
    }

    fn on_cancelled(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(task) = self.current.as_mut() {
            task.on_cancelled(body, world);
        }
    }

    fn on_interrupted(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(task) = self.current.as_mut() {
            task.on_interrupted(body, world);
        }
    }

    fn on_resumed(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(task) = self.current.as_mut() {
            task.on_resumed(body, world);
        }
    }

    fn consider_center_changed(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(task) = self.current.as_mut() {
            task.consider_center_changed(body, world);
        }
    }

    fn consider_movement_step_completed(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(task) = self.current.as_mut() {
            task.consider_movement_step_completed(body, world);
        }
    }

    fn interrupt(&mut self, in_game_time: f32) {
        if let Some(task) = self.current.as_mut() {
            task.interrupt(in_game_time);
        }
        self.core.interrupt(in_game_time);
    }

    fn resume(&mut self) {
        if let Some(task) = self.current.as_mut() {
            task.resume();
        }
        self.core.resume();
    }

    /// Drains the active child and the remaining queue, finishing
    /// each in turn.
    fn finish(&mut self) {
        self.core.finish();
        let mut draining = self.current.take().or_else(|| self.queue.pop_front());
        while let Some(mut task) = draining {
            if !task.ended() {
                task.finish();
            }
            self.completed.push(task);
            draining = self.queue.pop_front();
        }
    }

    /// Drains like `finish`, but cancelled children are dropped
    /// rather than kept for inspection.
    fn cancel(&mut self) {
        self.core.cancel();
        let mut draining = self.current.take().or_else(|| self.queue.pop_front());
        while let Some(mut task) = draining {
            if !task.ended() {
                task.cancel();
            }
            draining = self.queue.pop_front();
        }
    }

    fn execute(&mut self, dt: f32, body: &mut ActorBody, world: &WorldState) {
        {
            let task = self
                .current
                .as_mut()
                .unwrap_or_else(|| panic!("composite task executed before on_start"));
            task.execute(dt, body, world);
        }
        let child_status = self.current.as_ref().map(|t| t.status());
        match child_status {
            Some(TaskStatus::Finished) => {
                let mut task = self.current.take().expect("status read from current");
                task.on_completed(body, world);
                self.completed.push(task);
                if self.queue.is_empty() {
                    self.finish();
                } else {
                    self.begin_next_task(body, world);
                }
            }
            Some(TaskStatus::Cancelled) => {
                let mut task = self.current.take().expect("status read from current");
                task.on_cancelled(body, world);
                self.cancel();
            }
            _ => {}
        }
    }

    fn recover_from_interruption(
        &mut self,
        body: &mut ActorBody,
        world: &WorldState,
        obstacle: Obstacle,
    ) -> bool {
        self.current
            .as_mut()
            .map(|t| t.recover_from_interruption(body, world, obstacle))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorBody;
    use crate::world::WorldState;
    use std::cell::Cell;
    use std::rc::Rc;

    fn core() -> TaskCore {
        TaskCore::new(1.0, None)
    }

    #[test]
    fn normal_lifecycle() {
        let mut c = core();
        assert_eq!(c.status(), TaskStatus::NotStarted);
        c.set_started();
        assert_eq!(c.status(), TaskStatus::InProgress);
        c.finish();
        assert!(c.ended());
    }

    #[test]
    fn interrupt_and_resume() {
        let mut c = core();
        c.set_started();
        c.interrupt(3.5);
        assert_eq!(c.status(), TaskStatus::Interrupted);
        assert_eq!(c.interrupted_at, 3.5);
        c.resume();
        assert_eq!(c.status(), TaskStatus::InProgress);
    }

    #[test]
    fn finish_from_not_started_is_allowed() {
        let mut c = core();
        c.finish();
        assert_eq!(c.status(), TaskStatus::Finished);
    }

    #[test]
    fn cancel_from_not_started_is_allowed() {
        let mut c = core();
        c.cancel();
        assert_eq!(c.status(), TaskStatus::Cancelled);
    }

    #[test]
    #[should_panic(expected = "finish on a terminal task")]
    fn finish_after_cancel_panics() {
        let mut c = core();
        c.set_started();
        c.cancel();
        c.finish();
    }

    #[test]
    #[should_panic(expected = "cancel on a terminal task")]
    fn cancel_after_finish_panics() {
        let mut c = core();
        c.set_started();
        c.finish();
        c.cancel();
    }

    #[test]
    #[should_panic(expected = "started twice")]
    fn double_start_panics() {
        let mut c = core();
        c.set_started();
        c.set_started();
    }

    #[test]
    #[should_panic(expected = "resume on a task that was")]
    fn resume_without_interruption_panics() {
        let mut c = core();
        c.set_started();
        c.resume();
    }

    #[test]
    fn composite_drains_queue_on_finish() {
        let mut composite = CompositeTask::new(1.0, None);
        composite.add_task(Box::new(GoToPointTask::new((1, 1), 0.0, None)));
        composite.add_task(Box::new(GoToPointTask::new((2, 2), 0.0, None)));
        composite.core_mut().set_started();
        composite.finish();
        assert_eq!(composite.status(), TaskStatus::Finished);
        assert_eq!(composite.queued_count(), 0);
        assert_eq!(composite.completed_tasks().len(), 2);
        for task in composite.completed_tasks() {
            assert_eq!(task.status(), TaskStatus::Finished);
        }
    }

    #[test]
    fn composite_drains_queue_on_cancel() {
        let mut composite = CompositeTask::new(1.0, None);
        composite.add_task(Box::new(GoToPointTask::new((1, 1), 0.0, None)));
        composite.add_task(Box::new(GoToPointTask::new((2, 2), 0.0, None)));
        composite.core_mut().set_started();
        composite.cancel();
        assert_eq!(composite.status(), TaskStatus::Cancelled);
        assert_eq!(composite.queued_count(), 0);
        assert!(composite.completed_tasks().is_empty());
    }

    #[test]
    fn empty_composite_finish_does_not_panic() {
        let mut composite = CompositeTask::new(1.0, None);
        composite.core_mut().set_started();
        composite.finish();
        assert_eq!(composite.status(), TaskStatus::Finished);
    }

    #[test]
    fn dynamic_go_to_replans_when_the_target_moves() {
        struct Tracked(Rc<Cell<(i32, i32)>>);
        impl PointProvider for Tracked {
            fn point(&self) -> (i32, i32) {
                self.0.get()
            }
        }

        let target = Rc::new(Cell::new((3, 0)));
        let world = WorldState::new(10, 10);
        let mut body = ActorBody::new(0, "chaser");
        let mut task = GoToDynamicPointTask::new(Box::new(Tracked(target.clone())), 1.0, None);
        task.set_started();
        task.on_start(&mut body, &world);
        assert_eq!(task.point, (3, 0));

        target.set((0, 4));
        task.execute(0.1, &mut body, &world);
        assert_eq!(task.point, (0, 4));
        assert_eq!(body.movement_step, None);
        let follower = task.follower.as_ref().unwrap();
        assert_eq!(follower.path.points().last(), Some((0, 4)));
        assert!(!task.ended());
    }

    #[test]
    fn movement_step_kinds() {
        let walk = MovementStep::new((3, 4));
        assert!(!walk.rotate_only);
        let turn = MovementStep::rotate_toward((3, 4));
        assert!(turn.rotate_only);
        assert_eq!(turn.target_cell, (3, 4));
    }
}
