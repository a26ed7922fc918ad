//! Task Registry (spec §3, §4.5, §9): owns every [`Task`] — normal and
//! synthetic — behind stable, non-owning [`TaskId`] indices.

use std::collections::HashMap;

/// Non-owning index into [`TaskRegistry`]'s backing storage. Cheap to
/// copy and hold across the lifetime of a core's state machine; the
/// registry itself owns the actual `Task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Normal,
    Scheduler,
    Tick,
    Idle,
}

/// Phase tag on an execution interval. Only `Execute` is ever produced by
/// this reconstructor; `Read`/`Write` exist because the type is shared
/// with an AER (acquire/execute/release) model this core doesn't
/// implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Read,
    Execute,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionInterval {
    pub core: u32,
    pub start: i64,
    pub stop: i64,
    pub phase: ExecutionPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task: TaskId,
    pub id: u32,
    pub release_time: i64,
    pub deadline: Option<i64>,
    pub intervals: Vec<ExecutionInterval>,
    pub(crate) open_interval: Option<ExecutionInterval>,
    pub delay_until: bool,
    pub incomplete: bool,
}

impl Job {
    fn new(task: TaskId, id: u32, release_time: i64) -> Self {
        Job {
            task,
            id,
            release_time,
            deadline: None,
            intervals: Vec::new(),
            open_interval: None,
            delay_until: false,
            incomplete: false,
        }
    }

    pub fn finish_time(&self) -> Option<i64> {
        self.intervals.last().map(|i| i.stop)
    }

    pub fn start_time(&self) -> Option<i64> {
        self.intervals.first().map(|i| i.start)
    }

    /// `deadline - release_time`, if a deadline was recorded.
    pub fn relative_deadline(&self) -> Option<i64> {
        self.deadline.map(|d| d - self.release_time)
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: u32,
    pub name: String,
    pub priority: Option<u32>,
    pub kind: TaskKind,
    pub color: String,
    pub jobs: Vec<Job>,
    pub current_job: Option<Job>,
    /// Supplemental per-task policy (SPEC_FULL §4.5): names matching a
    /// configured set finish their job at every `TASK_STOP_EXEC`,
    /// decided once at task-create time rather than string-compared on
    /// every stop event.
    pub job_per_execution: bool,
    self_id: TaskId,
}

impl Task {
    fn new(
        id: u32,
        name: String,
        priority: Option<u32>,
        kind: TaskKind,
        color: String,
        self_id: TaskId,
    ) -> Self {
        Task {
            id,
            name,
            priority,
            kind,
            color,
            jobs: Vec::new(),
            current_job: None,
            job_per_execution: false,
            self_id,
        }
    }

    /// Maximum observed response time (`finish - release`) over all
    /// finished jobs. `None` if the task never ran to completion.
    pub fn max_response_time(&self) -> Option<i64> {
        self.jobs
            .iter()
            .filter_map(|j| j.finish_time().map(|f| f - j.release_time))
            .max()
    }

    pub(crate) fn open_new_job(&mut self, release_time: i64) {
        debug_assert!(self.current_job.is_none());
        let id = self.jobs.len() as u32;
        self.current_job = Some(Job::new(self.self_id, id, release_time));
    }

    pub(crate) fn start_interval(&mut self, core: u32, start: i64) {
        let job = self
            .current_job
            .as_mut()
            .expect("start_interval called without an open job");
        debug_assert!(job.open_interval.is_none());
        job.open_interval = Some(ExecutionInterval {
            core,
            start,
            stop: start,
            phase: ExecutionPhase::Execute,
        });
    }

    pub(crate) fn stop_interval(&mut self, stop: i64) {
        let job = self
            .current_job
            .as_mut()
            .expect("stop_interval called without an open job");
        let mut interval = job
            .open_interval
            .take()
            .expect("stop_interval called without an open interval");
        interval.stop = stop;
        job.intervals.push(interval);
    }

    pub(crate) fn finish_job(&mut self) {
        let job = self
            .current_job
            .take()
            .expect("finish_job called without an open job");
        self.jobs.push(job);
    }

    pub(crate) fn set_current_job_deadline(&mut self, deadline: i64) {
        let job = self
            .current_job
            .as_mut()
            .expect("set_current_job_deadline called without an open job");
        job.deadline = Some(deadline);
    }

    pub(crate) fn delay_until_flag_on_current_job(&mut self) {
        let job = self
            .current_job
            .as_mut()
            .expect("delay_until_flag_on_current_job called without an open job");
        job.delay_until = true;
    }
}

/// Cycles through a fixed palette for normal tasks and uses two static
/// colors for the scheduler/tick/idle task kinds, matching
/// `TraceParser.py`'s `getTaskColor`. Reset at the start of every
/// [`TaskRegistry::new`] call — this is the only process-wide state in
/// the crate, and it must never be a global/static to keep runs
/// deterministic and tests isolated.
struct ColorAssigner {
    next_normal: usize,
}

const NORMAL_TASK_PALETTE: [&str; 5] = ["#64ED9D", "#648FED", "#D4ED4C", "#ED7B64", "#8D64ED"];
const SYNTHETIC_SCHED_TICK_COLOR: &str = "#3D3D3D";
const SYNTHETIC_IDLE_COLOR: &str = "#CBFFA8";

impl ColorAssigner {
    fn new() -> Self {
        ColorAssigner { next_normal: 0 }
    }

    fn for_kind(&mut self, kind: TaskKind) -> String {
        match kind {
            TaskKind::Scheduler | TaskKind::Tick => SYNTHETIC_SCHED_TICK_COLOR.to_string(),
            TaskKind::Idle => SYNTHETIC_IDLE_COLOR.to_string(),
            TaskKind::Normal => {
                let color = NORMAL_TASK_PALETTE[self.next_normal % NORMAL_TASK_PALETTE.len()];
                self.next_normal += 1;
                color.to_string()
            }
        }
    }
}

/// Owns every task in a reconstruction run, synthetic and normal alike,
/// behind stable [`TaskId`] indices.
pub struct TaskRegistry {
    tasks: Vec<Task>,
    by_wire_id: HashMap<u32, TaskId>,
    colors: ColorAssigner,
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistry {
            tasks: Vec::new(),
            by_wire_id: HashMap::new(),
            colors: ColorAssigner::new(),
        }
    }

    pub fn get(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    pub fn get_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.0]
    }

    pub fn find_by_wire_id(&self, wire_id: u32) -> Option<TaskId> {
        self.by_wire_id.get(&wire_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn normal_task_ids(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TaskKind::Normal)
            .map(|(i, _)| TaskId(i))
            .collect()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    /// Registers a synthetic task (scheduler, tick, or idle) for one
    /// core. Synthetic tasks have no priority and are not addressable by
    /// wire id since the firmware never emits a `TASK_CREATE` for them.
    pub fn register_synthetic(&mut self, id: u32, name: String, kind: TaskKind) -> TaskId {
        let color = self.colors.for_kind(kind);
        let task_id = TaskId(self.tasks.len());
        self.tasks.push(Task::new(id, name, None, kind, color, task_id));
        task_id
    }

    /// Registers a normal task from a decoded `TASK_CREATE` event.
    /// Idempotent: a duplicate `TASK_CREATE` for an id already known is
    /// ignored, returning the existing `TaskId`.
    pub fn register_normal(&mut self, wire_id: u32, name: String, priority: u32) -> TaskId {
        if let Some(existing) = self.by_wire_id.get(&wire_id) {
            return *existing;
        }
        let color = self.colors.for_kind(TaskKind::Normal);
        let task_id = TaskId(self.tasks.len());
        self.tasks.push(Task::new(
            wire_id,
            name,
            Some(priority),
            TaskKind::Normal,
            color,
            task_id,
        ));
        self.by_wire_id.insert(wire_id, task_id);
        task_id
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_lifecycle_open_start_stop_finish() {
        let mut registry = TaskRegistry::new();
        let task_id = registry.register_normal(1, "T".to_string(), 3);
        let task = registry.get_mut(task_id);
        task.open_new_job(0);
        task.start_interval(0, 10);
        task.stop_interval(47);
        task.finish_job();

        let task = registry.get(task_id);
        assert_eq!(task.jobs.len(), 1);
        let job = &task.jobs[0];
        assert_eq!(job.task, task_id);
        assert_eq!(job.start_time(), Some(10));
        assert_eq!(job.finish_time(), Some(47));
    }

    #[test]
    fn max_response_time_tracks_longest_finished_job() {
        let mut registry = TaskRegistry::new();
        let task_id = registry.register_normal(1, "T".to_string(), 3);
        for (start, stop) in [(0, 10), (100, 140)] {
            let task = registry.get_mut(task_id);
            task.open_new_job(start);
            task.start_interval(0, start);
            task.stop_interval(stop);
            task.finish_job();
        }
        let task = registry.get(task_id);
        assert_eq!(task.max_response_time(), Some(40));
    }

    #[test]
    fn register_normal_is_idempotent_on_duplicate_create() {
        let mut registry = TaskRegistry::new();
        let first = registry.register_normal(1, "T".to_string(), 3);
        let second = registry.register_normal(1, "T".to_string(), 3);
        assert_eq!(first, second);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn normal_task_colors_cycle_through_palette() {
        let mut registry = TaskRegistry::new();
        let ids: Vec<TaskId> = (0..7)
            .map(|i| registry.register_normal(i, format!("T{i}"), 1))
            .collect();
        let colors: Vec<&str> = ids.iter().map(|id| registry.get(*id).color.as_str()).collect();
        assert_eq!(colors[0], colors[5]);
        assert_eq!(colors[1], colors[6]);
    }

    #[test]
    fn synthetic_tasks_have_no_priority() {
        let mut registry = TaskRegistry::new();
        let sched = registry.register_synthetic(100, "Scheduler".to_string(), TaskKind::Scheduler);
        assert_eq!(registry.get(sched).priority, None);
    }
}
