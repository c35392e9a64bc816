use std::collections::VecDeque;
use std::mem;

use log::{debug, trace};

use crate::actor::ActorBody;
use crate::obstacle::Obstacle;
use crate::tasking::{LogicalTask, TaskCore, TaskStatus};
use crate::world::WorldState;

pub type TaskId = usize;
pub type BehaviorId = usize;

/// A policy object attached to an agent. Behaviors inspect the world
/// each tick and contribute goals as logical tasks. They never mutate
/// the intellect's collections directly while the sweep iterates;
/// additions and removals go through the command buffer.
pub trait Behavior {
    fn update(
        &mut self,
        _dt: f32,
        _me: BehaviorId,
        _intellect: &mut Intellect,
        _body: &mut ActorBody,
        _world: &WorldState,
    ) {
    }

    fn on_add(
        &mut self,
        _me: BehaviorId,
        _intellect: &mut Intellect,
        _body: &mut ActorBody,
        _world: &WorldState,
    ) {
    }

    fn on_remove(
        &mut self,
        _me: BehaviorId,
        _intellect: &mut Intellect,
        _body: &mut ActorBody,
        _world: &WorldState,
    ) {
    }

    /// Third stop of the movement-failure recovery chain, consulted
    /// for the behavior that created the failing task.
    fn recover_from_interruption(
        &mut self,
        _body: &mut ActorBody,
        _world: &WorldState,
        _obstacle: Obstacle,
    ) -> bool {
        false
    }
}

/// Deferred mutation of the intellect's collections. Commands are
/// recorded during the sweep and applied in order once iteration is
/// done, so behaviors can add tasks and install other behaviors
/// without invalidating the list being walked.
enum IntellectCommand {
    AddTask(TaskId, Box<dyn LogicalTask>),
    AddBehavior(BehaviorId, Box<dyn Behavior>),
    RemoveBehavior(BehaviorId),
}

/// Per-agent scheduler: holds the behaviors supplying goals, the
/// competing tasks, and at most one task in progress at a time.
#[derive(Default)]
pub struct Intellect {
    behaviors: Vec<(BehaviorId, Box<dyn Behavior>)>,
    tasks: Vec<(TaskId, Box<dyn LogicalTask>)>,
    current: Option<TaskId>,
    commands: VecDeque<IntellectCommand>,
    next_task_id: TaskId,
    next_behavior_id: BehaviorId,
}

impl Intellect {
    pub fn new() -> Self {
        Intellect::default()
    }

    /// Queue a task for addition. The returned id is valid
    /// immediately for later status queries, even though the task
    /// only joins the list when commands are applied.
    pub fn push_task(&mut self, task: Box<dyn LogicalTask>) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        self.commands.push_back(IntellectCommand::AddTask(id, task));
        id
    }

    /// Queue a behavior for addition; its `on_add` hook runs when the
    /// command is applied.
    pub fn push_behavior(&mut self, behavior: Box<dyn Behavior>) -> BehaviorId {
        let id = self.next_behavior_id;
        self.next_behavior_id += 1;
        self.commands
            .push_back(IntellectCommand::AddBehavior(id, behavior));
        id
    }

    pub fn remove_behavior(&mut self, id: BehaviorId) {
        self.commands.push_back(IntellectCommand::RemoveBehavior(id));
    }

    pub fn current_task_id(&self) -> Option<TaskId> {
        self.current
    }

    /// Status of a task, or `None` once it has been purged from the
    /// list (which only happens to ended tasks).
    pub fn task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.task_index(id).map(|i| self.tasks[i].1.status())
    }

    pub fn task_core_mut(&mut self, id: TaskId) -> Option<&mut TaskCore> {
        self.task_index(id).map(|i| self.tasks[i].1.core_mut())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    fn task_index(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|(tid, _)| *tid == id)
    }

    /// The per-tick cognition sweep: run behaviors, apply their
    /// queued commands, purge ended tasks, re-sort by priority and
    /// select the top task, preempting the previous one if the
    /// selection changed.
    pub fn process_behaviors(&mut self, dt: f32, body: &mut ActorBody, world: &WorldState) {
        // behaviors are detached for the sweep so they can reach back
        // into the intellect through the command buffer
        let mut behaviors = mem::take(&mut self.behaviors);
        for (id, behavior) in behaviors.iter_mut() {
            behavior.update(dt, *id, self, body, world);
        }
        behaviors.extend(mem::take(&mut self.behaviors));
        self.behaviors = behaviors;

        self.apply_commands(body, world);
        self.reap_ended_tasks(body, world);

        self.tasks.sort_by(|(_, a), (_, b)| {
            a.priority()
                .partial_cmp(&b.priority())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let top = match self.tasks.last() {
            Some((id, _)) => *id,
            None => {
                self.current = None;
                return;
            }
        };
        if self.current == Some(top) {
            return;
        }

        if let Some(prev) = self.current.take() {
            if let Some(i) = self.task_index(prev) {
                let task = &mut self.tasks[i].1;
                if task.is_interruptable() {
                    trace!("task {} interrupted by task {}", prev, top);
                    task.interrupt(world.in_game_time());
                    task.on_interrupted(body, world);
                } else {
                    debug!("task {} not interruptable, cancelled by task {}", prev, top);
                    task.cancel();
                    task.on_cancelled(body, world);
                }
                // the winner must not inherit the loser's step
                body.movement_step = None;
                body.direction = (0.0, 0.0);
            }
        }

        let i = self.task_index(top).expect("top id taken from the list");
        let task = &mut self.tasks[i].1;
        if task.status() == TaskStatus::Interrupted {
            trace!("task {} resumed", top);
            task.resume();
            task.on_resumed(body, world);
        } else {
            trace!("task {} started", top);
            task.set_started();
            task.on_start(body, world);
        }
        self.current = Some(top);
    }

    /// Run the current task and its low-level executor, reaping it
    /// with the proper hook if it ended since the last call.
    pub fn process_current_task(&mut self, dt: f32, body: &mut ActorBody, world: &WorldState) {
        let Some(id) = self.current else { return };
        let Some(i) = self.task_index(id) else {
            self.current = None;
            return;
        };
        match self.tasks[i].1.status() {
            TaskStatus::Finished => {
                debug!("task {} finished", id);
                self.tasks[i].1.on_completed(body, world);
                self.current = None;
                return;
            }
            TaskStatus::Cancelled => {
                debug!("task {} cancelled", id);
                self.tasks[i].1.on_cancelled(body, world);
                self.current = None;
                return;
            }
            _ => {}
        }
        let task = &mut self.tasks[i].1;
        task.execute(dt, body, world);
        if let Some(low) = task.active_low_level_task_mut() {
            low.execute(dt, body, world);
        }
    }

    pub fn consider_center_changed(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(i) = self.current.and_then(|id| self.task_index(id)) {
            self.tasks[i].1.consider_center_changed(body, world);
        }
    }

    pub fn consider_movement_step_completed(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(i) = self.current.and_then(|id| self.task_index(id)) {
            self.tasks[i].1.consider_movement_step_completed(body, world);
        }
    }

    /// The graduated movement-failure recovery chain: low-level task,
    /// then logical task, then the behavior that created the task.
    /// When everyone declines, the current task is cancelled.
    pub fn consider_movement_step_failed(
        &mut self,
        body: &mut ActorBody,
        world: &WorldState,
        obstacle: Obstacle,
    ) {
        let Some(id) = self.current else { return };
        let Some(i) = self.task_index(id) else {
            self.current = None;
            return;
        };

        let task = &mut self.tasks[i].1;
        let mut recovered = task
            .active_low_level_task_mut()
            .map(|low| low.recover_from_interruption(obstacle))
            .unwrap_or(false);
        if !recovered {
            recovered = task.recover_from_interruption(body, world, obstacle);
        }
        if !recovered {
            let created_by = task.core().created_by;
            if let Some(behavior) = created_by
                .and_then(|bid| self.behaviors.iter_mut().find(|(id, _)| *id == bid))
                .map(|(_, b)| b)
            {
                recovered = behavior.recover_from_interruption(body, world, obstacle);
            }
        }
        if !recovered {
            debug!("task {} hit {:?} and nothing recovered, cancelling", id, obstacle);
            let task = &mut self.tasks[i].1;
            task.cancel();
            task.on_cancelled(body, world);
            self.current = None;
        } else {
            trace!("task {} recovered from {:?}", id, obstacle);
        }
    }

    fn apply_commands(&mut self, body: &mut ActorBody, world: &WorldState) {
        // applied until empty: a command may enqueue further commands
        // (a behavior's on_add installing another behavior)
        while let Some(command) = self.commands.pop_front() {
            match command {
                IntellectCommand::AddTask(id, task) => {
                    trace!("task {} added with priority {}", id, task.priority());
                    self.tasks.push((id, task));
                }
                IntellectCommand::AddBehavior(id, mut behavior) => {
                    behavior.on_add(id, self, body, world);
                    self.behaviors.push((id, behavior));
                }
                IntellectCommand::RemoveBehavior(id) => {
                    if let Some(i) = self.behaviors.iter().position(|(bid, _)| *bid == id) {
                        let (_, mut behavior) = self.behaviors.remove(i);
                        behavior.on_remove(id, self, body, world);
                    }
                }
            }
        }
    }

    /// Purge ended tasks. An ended current task gets its completion
    /// or cancellation hook before it goes.
    fn reap_ended_tasks(&mut self, body: &mut ActorBody, world: &WorldState) {
        if let Some(i) = self.current.and_then(|id| self.task_index(id)) {
            let task = &mut self.tasks[i].1;
            match task.status() {
                TaskStatus::Finished => {
                    task.on_completed(body, world);
                    self.current = None;
                }
                TaskStatus::Cancelled => {
                    task.on_cancelled(body, world);
                    self.current = None;
                }
                _ => {}
            }
        }
        self.tasks.retain(|(_, task)| !task.ended());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorBody;
    use crate::tasking::LowLevelTask;
    use crate::world::WorldState;
    use std::cell::Cell;
    use std::rc::Rc;

    /// A task that idles in progress until told otherwise, counting
    /// its lifecycle hook invocations.
    struct ProbeTask {
        core: TaskCore,
        resumed: Rc<Cell<u32>>,
        interrupted: Rc<Cell<u32>>,
        completed: Rc<Cell<u32>>,
        finish_after: Option<u32>,
        executions: u32,
    }

    impl ProbeTask {
        fn new(priority: f32) -> (Self, Rc<Cell<u32>>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
            let resumed = Rc::new(Cell::new(0));
            let interrupted = Rc::new(Cell::new(0));
            let completed = Rc::new(Cell::new(0));
            (
                ProbeTask {
                    core: TaskCore::new(priority, None),
                    resumed: resumed.clone(),
                    interrupted: interrupted.clone(),
                    completed: completed.clone(),
                    finish_after: None,
                    executions: 0,
                },
                resumed,
                interrupted,
                completed,
            )
        }

        fn finishing_after(mut self, executions: u32) -> Self {
            self.finish_after = Some(executions);
            self
        }
    }

    impl LogicalTask for ProbeTask {
        fn core(&self) -> &TaskCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut TaskCore {
            &mut self.core
        }

        fn active_low_level_task_mut(&mut self) -> Option<&mut dyn LowLevelTask> {
            None
        }

        fn on_interrupted(&mut self, _body: &mut ActorBody, _world: &WorldState) {
            self.interrupted.set(self.interrupted.get() + 1);
        }

        fn on_resumed(&mut self, _body: &mut ActorBody, _world: &WorldState) {
            self.resumed.set(self.resumed.get() + 1);
        }

        fn on_completed(&mut self, _body: &mut ActorBody, _world: &WorldState) {
            self.completed.set(self.completed.get() + 1);
        }

        fn execute(&mut self, _dt: f32, _body: &mut ActorBody, _world: &WorldState) {
            self.executions += 1;
            if let Some(n) = self.finish_after {
                if self.executions >= n {
                    self.finish();
                }
            }
        }
    }

    fn setup() -> (Intellect, ActorBody, WorldState) {
        (
            Intellect::new(),
            ActorBody::new(0, "probe"),
            WorldState::new(10, 10),
        )
    }

    fn sweep(intellect: &mut Intellect, body: &mut ActorBody, world: &WorldState) {
        intellect.process_behaviors(0.1, body, world);
        intellect.process_current_task(0.1, body, world);
    }

    #[test]
    fn highest_priority_task_is_selected() {
        let (mut intellect, mut body, world) = setup();
        let (low, ..) = ProbeTask::new(5.0);
        let (high, ..) = ProbeTask::new(10.0);
        let low_id = intellect.push_task(Box::new(low));
        let high_id = intellect.push_task(Box::new(high));
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.current_task_id(), Some(high_id));
        assert_eq!(intellect.task_status(high_id), Some(TaskStatus::InProgress));
        assert_eq!(intellect.task_status(low_id), Some(TaskStatus::NotStarted));
    }

    #[test]
    fn higher_priority_interrupts_and_later_resumes() {
        let (mut intellect, mut body, world) = setup();
        let (low, low_resumed, low_interrupted, _) = ProbeTask::new(5.0);
        let low_id = intellect.push_task(Box::new(low));
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.task_status(low_id), Some(TaskStatus::InProgress));

        let (high, ..) = ProbeTask::new(10.0);
        let high = high.finishing_after(1);
        let high_id = intellect.push_task(Box::new(high));
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.current_task_id(), Some(high_id));
        assert_eq!(intellect.task_status(low_id), Some(TaskStatus::Interrupted));
        assert_eq!(low_interrupted.get(), 1);

        // the high task finished during its first execution; next
        // sweep reaps it and resumes the interrupted one
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.current_task_id(), Some(low_id));
        assert_eq!(intellect.task_status(low_id), Some(TaskStatus::InProgress));
        assert_eq!(low_resumed.get(), 1);

        sweep(&mut intellect, &mut body, &world);
        assert_eq!(low_resumed.get(), 1, "resume hook must fire exactly once");
    }

    #[test]
    fn finished_task_gets_completion_hook_and_is_purged() {
        let (mut intellect, mut body, world) = setup();
        let (task, _, _, completed) = ProbeTask::new(1.0);
        let task = task.finishing_after(1);
        let id = intellect.push_task(Box::new(task));
        sweep(&mut intellect, &mut body, &world);
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(completed.get(), 1);
        assert_eq!(intellect.task_status(id), None);
        assert_eq!(intellect.current_task_id(), None);
        assert_eq!(intellect.task_count(), 0);
    }

    #[test]
    fn non_interruptable_task_is_cancelled_on_preemption() {
        let (mut intellect, mut body, world) = setup();
        let (mut stubborn, ..) = ProbeTask::new(5.0);
        stubborn.core_mut().set_interruptable(false);
        let stubborn_id = intellect.push_task(Box::new(stubborn));
        sweep(&mut intellect, &mut body, &world);

        let (high, ..) = ProbeTask::new(10.0);
        intellect.push_task(Box::new(high));
        sweep(&mut intellect, &mut body, &world);
        // cancelled on preemption and purged by the following sweep
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.task_status(stubborn_id), None);
    }

    struct InstallerBehavior;

    impl Behavior for InstallerBehavior {
        fn on_add(
            &mut self,
            _me: BehaviorId,
            intellect: &mut Intellect,
            _body: &mut ActorBody,
            _world: &WorldState,
        ) {
            intellect.push_behavior(Box::new(TaskIssuingBehavior { issued: false }));
        }
    }

    struct TaskIssuingBehavior {
        issued: bool,
    }

    impl Behavior for TaskIssuingBehavior {
        fn update(
            &mut self,
            _dt: f32,
            me: BehaviorId,
            intellect: &mut Intellect,
            _body: &mut ActorBody,
            _world: &WorldState,
        ) {
            if !self.issued {
                let (task, ..) = ProbeTask::new(1.0);
                let mut task = task;
                task.core_mut().created_by = Some(me);
                intellect.push_task(Box::new(task));
                self.issued = true;
            }
        }
    }

    #[test]
    fn behavior_on_add_can_install_another_behavior() {
        let (mut intellect, mut body, world) = setup();
        intellect.push_behavior(Box::new(InstallerBehavior));
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.behavior_count(), 2);
        // the installed behavior's task arrives one sweep later
        sweep(&mut intellect, &mut body, &world);
        assert_eq!(intellect.task_count(), 1);
        assert!(intellect.current_task_id().is_some());
    }

    #[test]
    fn failure_with_no_recovery_cancels_current_task() {
        let (mut intellect, mut body, world) = setup();
        let (task, ..) = ProbeTask::new(1.0);
        let id = intellect.push_task(Box::new(task));
        sweep(&mut intellect, &mut body, &world);
        intellect.consider_movement_step_failed(&mut body, &world, Obstacle::Wall);
        assert_eq!(intellect.current_task_id(), None);
        assert_eq!(intellect.task_status(id), Some(TaskStatus::Cancelled));
    }
}
