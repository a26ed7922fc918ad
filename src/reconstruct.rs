//! State Machine Reconstructor (spec §4.5): drives one 4-state machine
//! per core over the merged, patched, time-zero-aligned event stream,
//! synthesizing jobs and intervals onto the [`TaskRegistry`].

use tracing::{debug, warn};

use crate::codec::decode_core;
use crate::config::PlatformConfig;
use crate::error::{Diagnostic, Error};
use crate::event::{Event, EventKind};
use crate::merge::merge_cores;
use crate::patch::patch_missing_isr_enter;
use crate::registry::{Task, TaskId, TaskKind, TaskRegistry};
use crate::time_zero::find_time_zero;

/// Scheduler synthetic-task ids are `SCHEDULER_ID_BASE + core`, matching
/// the fixed `schedulerId = 100` constant in the original parser.
const SCHEDULER_ID_BASE: u32 = 100;
/// Idle synthetic-task ids live in their own namespace, disjoint from
/// any firmware-assigned `TASK_CREATE` id (spec models idle as fully
/// synthetic rather than relying on the firmware naming its idle task
/// "IDLE", unlike the original parser).
const IDLE_ID_BASE: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Task,
    Irq,
    Scheduler,
}

struct CoreState {
    state: RunState,
    running: Option<TaskId>,
    before_isr: Option<TaskId>,
    scheduler: TaskId,
    tick: TaskId,
    idle: TaskId,
    last_ts: i64,
}

pub struct ReconstructionResult {
    pub tasks: Vec<Task>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the full pipeline: decode every core's buffer, merge to the
/// common horizon, patch the one known dropout, align time-zero, then
/// drive the per-core state machines to build the task/job/interval
/// tree.
pub fn reconstruct(
    buffers: &[&[u8]],
    config: &PlatformConfig,
) -> Result<ReconstructionResult, Error> {
    let num_cores = config.num_cores();
    if num_cores == 0 {
        return Err(Error::MissingSyntheticTask {
            core: 0,
            task: "scheduler/tick/idle (no cores configured)",
        });
    }

    let mut per_core_events = Vec::with_capacity(buffers.len());
    for (core, buf) in buffers.iter().enumerate() {
        per_core_events.push(decode_core(buf, core as u32)?);
    }

    let merged = merge_cores(per_core_events);
    // Time-zero is picked on the merged stream, before the Recovery Patcher
    // runs (spec §4.3): a synthetic ISR_ENTER the patcher injects could
    // otherwise land between a real tick ISR_ENTER and TIME_ZERO and shift
    // t0 to a fabricated timestamp.
    let t0 = find_time_zero(&merged);
    let patched = patch_missing_isr_enter(merged, &config.tick_ids);

    let mut registry = TaskRegistry::new();
    let mut core_states = Vec::with_capacity(num_cores);
    for core in 0..num_cores {
        let (idle_name, sched_name, tick_name) = if num_cores == 1 {
            ("IDLE".to_string(), "Scheduler".to_string(), "Tick".to_string())
        } else {
            (
                format!("IDLE{core}"),
                format!("Scheduler Core {core}"),
                format!("Tick Core {core}"),
            )
        };

        let scheduler = registry.register_synthetic(
            SCHEDULER_ID_BASE + core as u32,
            sched_name,
            TaskKind::Scheduler,
        );
        let tick = registry.register_synthetic(config.tick_ids[core], tick_name, TaskKind::Tick);
        let idle =
            registry.register_synthetic(IDLE_ID_BASE + core as u32, idle_name, TaskKind::Idle);

        core_states.push(CoreState {
            state: RunState::Scheduler,
            running: None,
            before_isr: None,
            scheduler,
            tick,
            idle,
            last_ts: 0,
        });
    }

    // Pre-register every normal task from its TASK_CREATE event, mirroring
    // the original parser's two-pass approach: task identities are known
    // before the state machine needs to look any of them up.
    for evt in &patched {
        if let EventKind::TaskCreate {
            task_id,
            priority,
            name,
        } = &evt.kind
        {
            let registered = registry.register_normal(*task_id, name.clone(), *priority);
            let task = registry.get_mut(registered);
            task.job_per_execution = config.is_job_per_execution(&task.name);
        }
    }

    let mut diagnostics = Vec::new();

    for core in 0..num_cores {
        let cs = &mut core_states[core];
        registry.get_mut(cs.scheduler).open_new_job(0);
        registry.get_mut(cs.scheduler).start_interval(core as u32, 0);
    }

    for evt in &patched {
        let core = evt.core as usize;
        if core >= num_cores {
            continue;
        }
        let ts = evt.ts as i64 - t0 as i64;
        core_states[core].last_ts = ts;
        apply_event(&mut registry, &mut core_states, evt, ts, &mut diagnostics);
    }

    for core in 0..num_cores {
        let last_ts = core_states[core].last_ts;
        let cs_tasks = [
            core_states[core].scheduler,
            core_states[core].tick,
            core_states[core].idle,
        ];
        for tid in cs_tasks {
            close_open_job(&mut registry, tid, last_ts, core as u32, &mut diagnostics);
        }
    }
    for tid in registry.normal_task_ids() {
        let core = registry
            .get(tid)
            .current_job
            .as_ref()
            .and_then(|j| j.open_interval.as_ref().map(|i| i.core))
            .unwrap_or(0);
        let last_ts = core_states.get(core as usize).map(|c| c.last_ts).unwrap_or(0);
        close_open_job(&mut registry, tid, last_ts, core, &mut diagnostics);
    }

    Ok(ReconstructionResult {
        tasks: registry.into_tasks(),
        diagnostics,
    })
}

fn close_open_job(
    registry: &mut TaskRegistry,
    task_id: TaskId,
    last_ts: i64,
    core: u32,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let has_open_job = registry.get(task_id).current_job.is_some();
    if !has_open_job {
        return;
    }
    let is_normal = registry.get(task_id).kind == TaskKind::Normal;
    let has_open_interval = registry
        .get(task_id)
        .current_job
        .as_ref()
        .map(|j| j.open_interval.is_some())
        .unwrap_or(false);
    if has_open_interval {
        registry.get_mut(task_id).stop_interval(last_ts);
    }
    if is_normal {
        let task = registry.get_mut(task_id);
        let job = task.current_job.as_mut().expect("checked above");
        job.incomplete = true;
        let job_id = job.id;
        let wire_id = task.id;
        diagnostics.push(Diagnostic::TruncatedRun {
            core,
            task: wire_id,
            job: job_id,
        });
    }
    registry.get_mut(task_id).finish_job();
}

fn anomaly(
    diagnostics: &mut Vec<Diagnostic>,
    core: u32,
    ts: i64,
    kind: &'static str,
    state: &'static str,
) {
    warn!(core, ts, kind, state, "inconsistent transition");
    diagnostics.push(Diagnostic::InconsistentTransition {
        core,
        ts,
        kind,
        state,
    });
}

fn apply_event(
    registry: &mut TaskRegistry,
    core_states: &mut [CoreState],
    evt: &Event,
    ts: i64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let core = evt.core;
    let kind_name = evt.kind_name();

    // Uniform rows: no-op in every state, regardless of what else
    // happens. TASK_CREATE is listed here too: the registry already
    // materialized the task in the pre-scan above.
    if matches!(
        evt.kind,
        EventKind::TimeZero | EventKind::Start | EventKind::Stop | EventKind::TaskCreate { .. }
    ) {
        return;
    }
    // Listed as an anomaly in every state.
    if matches!(evt.kind, EventKind::TaskStopReady { .. }) {
        anomaly(diagnostics, core, ts, kind_name, state_name(core_states[core as usize].state));
        return;
    }

    let state = core_states[core as usize].state;
    debug!(core, ts, event = kind_name, ?state, "processing event");

    match state {
        RunState::Idle => apply_in_idle(registry, core_states, evt, ts, diagnostics),
        RunState::Task => apply_in_task(registry, core_states, evt, ts, diagnostics),
        RunState::Irq => apply_in_irq(registry, core_states, evt, ts, diagnostics),
        RunState::Scheduler => apply_in_scheduler(registry, core_states, evt, ts, diagnostics),
    }
}

fn state_name(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "IDLE",
        RunState::Task => "TASK",
        RunState::Irq => "IRQ",
        RunState::Scheduler => "SCHEDULER",
    }
}

fn apply_in_idle(
    registry: &mut TaskRegistry,
    core_states: &mut [CoreState],
    evt: &Event,
    ts: i64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let core = evt.core;
    let cs = &mut core_states[core as usize];
    match &evt.kind {
        EventKind::IsrEnter { .. } => {
            registry.get_mut(cs.idle).stop_interval(ts);
            registry.get_mut(cs.idle).finish_job();
            cs.before_isr = Some(cs.idle);
            registry.get_mut(cs.tick).open_new_job(ts);
            registry.get_mut(cs.tick).start_interval(core, ts);
            cs.state = RunState::Irq;
        }
        EventKind::TaskStartExec { task_id } => {
            registry.get_mut(cs.idle).stop_interval(ts);
            registry.get_mut(cs.idle).finish_job();
            if let Some(tid) = registry.find_by_wire_id(*task_id) {
                registry.get_mut(tid).start_interval(core, ts);
                cs.running = Some(tid);
                cs.state = RunState::Task;
            } else {
                anomaly(diagnostics, core, ts, evt.kind_name(), "IDLE");
            }
        }
        _ => anomaly(diagnostics, core, ts, evt.kind_name(), "IDLE"),
    }
}

fn apply_in_task(
    registry: &mut TaskRegistry,
    core_states: &mut [CoreState],
    evt: &Event,
    ts: i64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let core = evt.core;
    let cs = &mut core_states[core as usize];
    let running = match cs.running {
        Some(r) => r,
        None => {
            anomaly(diagnostics, core, ts, evt.kind_name(), "TASK");
            return;
        }
    };

    match &evt.kind {
        EventKind::DelayUntil { time_to_wake_ms } => {
            let task = registry.get_mut(running);
            let release = task
                .current_job
                .as_ref()
                .map(|j| j.release_time)
                .unwrap_or(ts);
            task.delay_until_flag_on_current_job();
            let deadline = release + (*time_to_wake_ms as i64) * 1000;
            task.set_current_job_deadline(deadline);
        }
        EventKind::Delay { .. } => {
            registry.get_mut(running).delay_until_flag_on_current_job();
        }
        EventKind::IsrEnter { .. } => {
            registry.get_mut(running).stop_interval(ts);
            cs.before_isr = Some(running);
            registry.get_mut(cs.tick).open_new_job(ts);
            registry.get_mut(cs.tick).start_interval(core, ts);
            cs.state = RunState::Irq;
        }
        EventKind::TaskStopExec { .. } => {
            let task = registry.get_mut(running);
            task.stop_interval(ts);
            let should_finish = task
                .current_job
                .as_ref()
                .map(|j| j.delay_until)
                .unwrap_or(false)
                || task.job_per_execution;
            if should_finish {
                task.finish_job();
            }
            cs.running = None;
            registry.get_mut(cs.scheduler).open_new_job(ts);
            registry.get_mut(cs.scheduler).start_interval(core, ts);
            cs.state = RunState::Scheduler;
        }
        EventKind::TaskStartReady { task_id } => {
            if let Some(tid) = registry.find_by_wire_id(*task_id) {
                registry.get_mut(tid).open_new_job(ts);
            } else {
                anomaly(diagnostics, core, ts, evt.kind_name(), "TASK");
            }
        }
        _ => anomaly(diagnostics, core, ts, evt.kind_name(), "TASK"),
    }
}

fn apply_in_irq(
    registry: &mut TaskRegistry,
    core_states: &mut [CoreState],
    evt: &Event,
    ts: i64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let core = evt.core;
    let cs = &mut core_states[core as usize];
    match &evt.kind {
        EventKind::TaskStartReady { task_id } => {
            if let Some(tid) = registry.find_by_wire_id(*task_id) {
                registry.get_mut(tid).open_new_job(ts);
            } else {
                anomaly(diagnostics, core, ts, evt.kind_name(), "IRQ");
            }
        }
        EventKind::IsrExitToScheduler => {
            registry.get_mut(cs.tick).stop_interval(ts);
            registry.get_mut(cs.tick).finish_job();
            registry.get_mut(cs.scheduler).open_new_job(ts);
            registry.get_mut(cs.scheduler).start_interval(core, ts);
            cs.state = RunState::Scheduler;
        }
        EventKind::IsrExit => {
            registry.get_mut(cs.tick).stop_interval(ts);
            registry.get_mut(cs.tick).finish_job();

            if cs.before_isr == cs.running && cs.running.is_some() {
                let running = cs.running.unwrap();
                registry.get_mut(running).start_interval(core, ts);
                cs.state = RunState::Task;
            } else if cs.before_isr == Some(cs.idle) {
                registry.get_mut(cs.idle).open_new_job(ts);
                registry.get_mut(cs.idle).start_interval(core, ts);
                cs.state = RunState::Idle;
            } else {
                anomaly(diagnostics, core, ts, evt.kind_name(), "IRQ");
            }
            cs.before_isr = None;
        }
        _ => anomaly(diagnostics, core, ts, evt.kind_name(), "IRQ"),
    }
}

fn apply_in_scheduler(
    registry: &mut TaskRegistry,
    core_states: &mut [CoreState],
    evt: &Event,
    ts: i64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let core = evt.core;
    let cs = &mut core_states[core as usize];
    match &evt.kind {
        EventKind::Idle => {
            registry.get_mut(cs.scheduler).stop_interval(ts);
            registry.get_mut(cs.scheduler).finish_job();
            registry.get_mut(cs.idle).open_new_job(ts);
            registry.get_mut(cs.idle).start_interval(core, ts);
            cs.state = RunState::Idle;
        }
        EventKind::TaskStopExec { .. } => {
            cs.running = None;
        }
        EventKind::TaskStartReady { task_id } => {
            if let Some(tid) = registry.find_by_wire_id(*task_id) {
                registry.get_mut(tid).open_new_job(ts);
            } else {
                anomaly(diagnostics, core, ts, evt.kind_name(), "SCHEDULER");
            }
        }
        EventKind::TaskStartExec { task_id } => {
            registry.get_mut(cs.scheduler).stop_interval(ts);
            registry.get_mut(cs.scheduler).finish_job();
            if let Some(tid) = registry.find_by_wire_id(*task_id) {
                registry.get_mut(tid).start_interval(core, ts);
                cs.running = Some(tid);
                cs.state = RunState::Task;
            } else {
                anomaly(diagnostics, core, ts, evt.kind_name(), "SCHEDULER");
            }
        }
        _ => anomaly(diagnostics, core, ts, evt.kind_name(), "SCHEDULER"),
    }
}
