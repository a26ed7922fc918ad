//! End-to-end scenarios S1-S6 and the cross-cutting testable properties.
//!
//! Byte buffers are built by hand from the wire table rather than loaded
//! from fixtures: each one is a handful of records, and writing them out
//! keeps the scenario's shape (the exact `dt`s from the spec) visible at
//! the call site.

use rtrace_core::codec::decode_core;
use rtrace_core::merge::merge_cores;
use rtrace_core::patch::patch_missing_isr_enter;
use rtrace_core::{reconstruct, Diagnostic, EventKind, PlatformConfig, Task, TaskKind};

/// Makes the `debug!`/`warn!` transition trace `reconstruct()` emits
/// observable under `RUST_LOG=rtrace_core=debug`. Safe to call from every
/// test: `try_init` is a no-op once a subscriber is already installed.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

mod wire {
    pub const IDLE: u16 = 1;
    pub const TASK_START_EXEC: u16 = 2;
    pub const TASK_STOP_EXEC: u16 = 3;
    pub const TASK_START_READY: u16 = 4;
    pub const TASK_CREATE: u16 = 6;
    pub const DELAY_UNTIL: u16 = 9;
    pub const ISR_ENTER: u16 = 10;
    pub const ISR_EXIT: u16 = 11;
}

fn record(dt: u16, id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&dt.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn task_id_payload(task_id: u32) -> Vec<u8> {
    task_id.to_le_bytes().to_vec()
}

fn task_create_payload(task_id: u32, priority: u32, name: &str) -> Vec<u8> {
    let mut name_bytes = name.as_bytes().to_vec();
    name_bytes.push(0);
    while name_bytes.len() % 4 != 0 {
        name_bytes.push(0);
    }
    let str_len = (name_bytes.len() / 4) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(&task_id.to_le_bytes());
    out.extend_from_slice(&str_len.to_le_bytes());
    out.extend_from_slice(&priority.to_le_bytes());
    out.extend_from_slice(&name_bytes);
    out
}

fn concat(chunks: Vec<Vec<u8>>) -> Vec<u8> {
    chunks.into_iter().flatten().collect()
}

/// Testable property 1: on a given core, intervals from every task are
/// pairwise non-overlapping and totally ordered by `start`.
fn assert_monotonic_intervals_per_core(tasks: &[Task], core: u32) {
    let mut intervals: Vec<(i64, i64)> = tasks
        .iter()
        .flat_map(|t| t.jobs.iter())
        .flat_map(|j| j.intervals.iter())
        .filter(|iv| iv.core == core)
        .map(|iv| (iv.start, iv.stop))
        .collect();
    intervals.sort_by_key(|iv| iv.0);
    for w in intervals.windows(2) {
        assert!(
            w[1].0 > w[0].0,
            "intervals on core {core} are not strictly ordered by start: {:?}",
            w
        );
        assert!(
            w[1].0 >= w[0].1,
            "intervals on core {core} overlap: {:?}",
            w
        );
    }
}

/// Testable property 2: every finished job closes with `start <= finish`
/// and `finish == intervals.last().stop`.
fn assert_job_closure(tasks: &[Task]) {
    for task in tasks {
        for job in &task.jobs {
            let finish = job.finish_time().expect("finished job must have a closed interval");
            let start = job.start_time().expect("finished job must have a closed interval");
            assert!(start <= finish, "job {}/{} closes before it starts", task.name, job.id);
            assert_eq!(finish, job.intervals.last().unwrap().stop);
        }
    }
}

fn find_task<'a>(tasks: &'a [Task], name: &str) -> &'a Task {
    tasks
        .iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("no task named {name}"))
}

#[test]
fn s1_single_job_on_one_core() {
    init_tracing();
    let buf = concat(vec![
        record(1, wire::TASK_CREATE, &task_create_payload(1, 1, "T")),
        record(0, wire::TASK_START_READY, &task_id_payload(1)),
        record(10, wire::TASK_START_EXEC, &task_id_payload(1)),
        record(32, wire::DELAY_UNTIL, &100u32.to_le_bytes()),
        record(5, wire::TASK_STOP_EXEC, &task_id_payload(1)),
    ]);

    let config = PlatformConfig::single_core(99);
    let result = reconstruct(&[buf.as_slice()], &config).expect("reconstruction must succeed");

    let t = find_task(&result.tasks, "T");
    assert_eq!(t.jobs.len(), 1);
    let job = &t.jobs[0];
    assert_eq!(job.release_time, 0);
    assert_eq!(job.deadline, Some(100_000));
    assert_eq!(job.intervals.len(), 1);
    assert_eq!(job.intervals[0].start, 10);
    assert_eq!(job.intervals[0].stop, 47);

    assert_monotonic_intervals_per_core(&result.tasks, 0);
    assert_job_closure(&result.tasks);
}

#[test]
fn s2_isr_preempts_running_task() {
    init_tracing();
    let buf = concat(vec![
        record(1, wire::TASK_CREATE, &task_create_payload(1, 1, "T")),
        record(0, wire::TASK_START_READY, &task_id_payload(1)),
        record(10, wire::TASK_START_EXEC, &task_id_payload(1)),
        record(2, wire::ISR_ENTER, &15u32.to_le_bytes()),
        record(1, wire::ISR_EXIT, &[]),
        record(32, wire::DELAY_UNTIL, &100u32.to_le_bytes()),
        record(5, wire::TASK_STOP_EXEC, &task_id_payload(1)),
    ]);

    let config = PlatformConfig::single_core(15);
    let result = reconstruct(&[buf.as_slice()], &config).expect("reconstruction must succeed");

    let t = find_task(&result.tasks, "T");
    assert_eq!(t.jobs.len(), 1);
    let job = &t.jobs[0];
    assert_eq!(job.deadline, Some(100_000));
    assert_eq!(
        job.intervals.len(),
        2,
        "the ISR must split the job into two intervals: {:?}",
        job.intervals
    );
    assert_eq!((job.intervals[0].start, job.intervals[0].stop), (10, 12));
    assert_eq!((job.intervals[1].start, job.intervals[1].stop), (13, 50));

    let tick = result
        .tasks
        .iter()
        .find(|t| t.kind == TaskKind::Tick)
        .expect("tick task must exist");
    assert_eq!(tick.jobs.len(), 1, "tick task covers exactly the inner ISR window");
    assert_eq!((tick.jobs[0].intervals[0].start, tick.jobs[0].intervals[0].stop), (12, 13));

    assert_monotonic_intervals_per_core(&result.tasks, 0);
    assert_job_closure(&result.tasks);
}

#[test]
fn s3_missing_isr_enter_is_patched_and_reconstruction_stays_consistent() {
    init_tracing();
    // Two consecutive ISR_EXITs (ts 14, 15 raw) with only the first ENTER
    // (ts 13) recorded. The patcher inserts a synthetic ENTER at
    // `last_task_start_ts - 1` == 10 (one before TASK_START_EXEC at 11),
    // per spec §4.4's literal rule — which places it chronologically
    // *before* the task even starts running, still in SCHEDULER state.
    // That means the synthetic ENTER itself can't pair with the second
    // EXIT: it surfaces as one SCHEDULER-state anomaly, the real
    // ENTER(13)/EXIT(14) pair closes the tick job cleanly on its own, and
    // the orphaned second EXIT(15) surfaces as a second anomaly (TASK
    // state has no rule for ISR_EXIT). The task's job is left open by the
    // trailing TASK_STOP_EXEC (no DELAY_UNTIL/DELAY and "T" isn't a
    // job-per-execution task) and is truncated at end-of-stream.
    let buf = concat(vec![
        record(1, wire::TASK_CREATE, &task_create_payload(1, 1, "T")),
        record(0, wire::TASK_START_READY, &task_id_payload(1)),
        record(10, wire::TASK_START_EXEC, &task_id_payload(1)),
        record(2, wire::ISR_ENTER, &15u32.to_le_bytes()),
        record(1, wire::ISR_EXIT, &[]),
        record(1, wire::ISR_EXIT, &[]), // second exit, no intervening enter
        record(5, wire::TASK_STOP_EXEC, &task_id_payload(1)),
    ]);

    let decoded = decode_core(&buf, 0).expect("buffer decodes cleanly");
    let patched = patch_missing_isr_enter(decoded, &[15]);
    let enter_count = patched
        .iter()
        .filter(|e| matches!(e.kind, EventKind::IsrEnter { .. }))
        .count();
    assert_eq!(enter_count, 2, "the dropped enter must be synthesized");

    let config = PlatformConfig::single_core(15);
    let result = reconstruct(&[buf.as_slice()], &config)
        .expect("a recoverable dropout must not abort reconstruction");

    assert_monotonic_intervals_per_core(&result.tasks, 0);
    assert_job_closure(&result.tasks);

    let tick = result
        .tasks
        .iter()
        .find(|t| t.kind == TaskKind::Tick)
        .expect("tick task must exist");
    assert_eq!(tick.jobs.len(), 1, "the real ENTER/EXIT pair closes exactly one tick job");
    assert_eq!((tick.jobs[0].intervals[0].start, tick.jobs[0].intervals[0].stop), (12, 13));

    let t = find_task(&result.tasks, "T");
    assert_eq!(t.jobs.len(), 1);
    let job = &t.jobs[0];
    assert!(job.incomplete, "the job is never finished by TASK_STOP_EXEC, only truncated");
    assert_eq!(
        job.intervals.iter().map(|iv| (iv.start, iv.stop)).collect::<Vec<_>>(),
        vec![(10, 12), (13, 19)]
    );

    let inconsistent = result
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::InconsistentTransition { .. }))
        .count();
    assert_eq!(
        inconsistent, 2,
        "the misplaced synthetic ENTER and the orphaned second EXIT both surface: {:?}",
        result.diagnostics
    );
    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::TruncatedRun { task: 1, job: 0, .. })));
}

#[test]
fn s4_multi_core_horizon_drops_events_past_the_minimum_last_timestamp() {
    init_tracing();
    let buf0 = concat(vec![
        record(5_000, wire::IDLE, &[]),
        record(5_000, wire::IDLE, &[]),
    ]);
    let buf1 = concat(vec![record(7_500, wire::IDLE, &[])]);

    let core0 = decode_core(&buf0, 0).unwrap();
    let core1 = decode_core(&buf1, 1).unwrap();
    assert_eq!(core0.last().unwrap().ts, 10_000);
    assert_eq!(core1.last().unwrap().ts, 7_500);

    let merged = merge_cores(vec![core0, core1]);
    assert!(merged.iter().all(|e| e.ts <= 7_500));
    assert!(merged.iter().any(|e| e.ts == 5_000));
    assert!(!merged.iter().any(|e| e.ts == 10_000));
}

#[test]
fn s5_anomaly_surfaces_as_a_single_diagnostic() {
    init_tracing();
    let buf = record(5, wire::DELAY_UNTIL, &10u32.to_le_bytes());

    let config = PlatformConfig::single_core(15);
    let result = reconstruct(&[buf.as_slice()], &config).expect("anomalies are not fatal");

    assert_eq!(result.diagnostics.len(), 1);
    match &result.diagnostics[0] {
        Diagnostic::InconsistentTransition { core, ts, kind, state } => {
            assert_eq!(*core, 0);
            assert_eq!(*ts, 5);
            assert_eq!(*kind, "DELAY_UNTIL");
            assert_eq!(*state, "SCHEDULER");
        }
        other => panic!("expected InconsistentTransition, got {:?}", other),
    }
}

#[test]
fn s6_truncated_tail_closes_the_open_job_as_incomplete() {
    init_tracing();
    let buf = concat(vec![
        record(1, wire::TASK_CREATE, &task_create_payload(1, 1, "T")),
        record(0, wire::TASK_START_READY, &task_id_payload(1)),
        record(10, wire::TASK_START_EXEC, &task_id_payload(1)),
    ]);

    let config = PlatformConfig::single_core(15);
    let result = reconstruct(&[buf.as_slice()], &config).expect("a truncated run is not fatal");

    let t = find_task(&result.tasks, "T");
    assert_eq!(t.jobs.len(), 1);
    let job = &t.jobs[0];
    assert!(job.incomplete);
    assert_eq!(job.intervals.len(), 1);
    assert_eq!(job.intervals[0].start, 10);
    assert_eq!(job.intervals[0].stop, 10);

    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::TruncatedRun { task: 1, job: 0, .. })));
}

/// Testable property 3: across two consecutive jobs of the same task that
/// both bear a deadline, deadlines and release times are both monotone
/// non-decreasing.
#[test]
fn deadline_and_release_time_monotonicity_across_consecutive_jobs() {
    init_tracing();
    let buf = concat(vec![
        record(1, wire::TASK_CREATE, &task_create_payload(1, 1, "T")),
        record(0, wire::TASK_START_READY, &task_id_payload(1)),
        record(10, wire::TASK_START_EXEC, &task_id_payload(1)),
        record(5, wire::DELAY_UNTIL, &50u32.to_le_bytes()),
        record(5, wire::TASK_STOP_EXEC, &task_id_payload(1)),
        record(5, wire::TASK_START_READY, &task_id_payload(1)),
        record(5, wire::TASK_START_EXEC, &task_id_payload(1)),
        record(5, wire::DELAY_UNTIL, &50u32.to_le_bytes()),
        record(5, wire::TASK_STOP_EXEC, &task_id_payload(1)),
    ]);

    let config = PlatformConfig::single_core(15);
    let result = reconstruct(&[buf.as_slice()], &config).expect("reconstruction must succeed");

    let t = find_task(&result.tasks, "T");
    assert_eq!(t.jobs.len(), 2);
    for w in t.jobs.windows(2) {
        assert!(w[1].release_time >= w[0].release_time);
        if let (Some(d0), Some(d1)) = (w[0].deadline, w[1].deadline) {
            assert!(d1 >= w[1].release_time);
            assert!(d0 >= w[0].release_time);
        }
    }

    assert_monotonic_intervals_per_core(&result.tasks, 0);
    assert_job_closure(&result.tasks);
}
