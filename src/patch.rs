//! Recovery Patcher (spec §4.4): repairs the one documented wire
//! anomaly — two consecutive ISR-exit events on a core with no
//! intervening `ISR_ENTER`.

use crate::event::EventKind;
use crate::event::Event;

#[derive(Clone, Copy, PartialEq, Eq)]
enum LastIrq {
    Enter,
    Exit,
}

/// Scans a merged, sorted event stream core by core and inserts a
/// synthetic `ISR_ENTER` one microsecond before the last task-start event
/// on that core whenever it finds a second consecutive ISR-exit kind
/// (`ISR_EXIT` or `ISR_EXIT_TO_SCHEDULER`) with no `ISR_ENTER` between it
/// and the previous one.
///
/// Only this one dropout is repaired; anything else surfaces later as an
/// `InconsistentTransition` diagnostic from the reconstructor.
pub fn patch_missing_isr_enter(events: Vec<Event>, tick_ids: &[u32]) -> Vec<Event> {
    let num_cores = tick_ids.len();
    let mut last_irq: Vec<Option<LastIrq>> = vec![None; num_cores];
    let mut last_task_start_ts: Vec<Option<u64>> = vec![None; num_cores];

    let mut patched = Vec::with_capacity(events.len());

    for evt in events {
        let core = evt.core as usize;
        if core >= num_cores {
            patched.push(evt);
            continue;
        }

        let is_isr_exit = matches!(
            evt.kind,
            EventKind::IsrExit | EventKind::IsrExitToScheduler
        );

        if is_isr_exit && last_irq[core] == Some(LastIrq::Exit) {
            if let Some(prev_task_ts) = last_task_start_ts[core] {
                patched.push(Event {
                    kind: EventKind::IsrEnter {
                        irq_id: tick_ids[core],
                    },
                    ts: prev_task_ts.saturating_sub(1),
                    core: evt.core,
                });
            }
        }

        match &evt.kind {
            EventKind::TaskStartExec { .. } | EventKind::TaskStartReady { .. } => {
                last_task_start_ts[core] = Some(evt.ts);
            }
            EventKind::IsrEnter { .. } => last_irq[core] = Some(LastIrq::Enter),
            EventKind::IsrExit | EventKind::IsrExitToScheduler => {
                last_irq[core] = Some(LastIrq::Exit)
            }
            _ => {}
        }

        patched.push(evt);
    }

    patched.sort_by_key(|e| (e.ts, e.core));
    patched
}
