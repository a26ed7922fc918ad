//! Time-Zero Alignment (spec §4.3): picks `t0`, the origin subtracted
//! from every event timestamp downstream.

use crate::event::{Event, EventKind, TICK_ZERO_IRQ_ID};

/// Chooses `t0` on an already-merged, time-sorted event stream.
///
/// 1. If a `TIME_ZERO` event exists, `t0` is the timestamp of the most
///    recent preceding `ISR_ENTER` with `irq_id == TICK_ZERO_IRQ_ID`.
/// 2. Otherwise `t0` is the timestamp of the first `TASK_START_READY`.
/// 3. Otherwise `t0 = 0`.
pub fn find_time_zero(events: &[Event]) -> u64 {
    if let Some(time_zero_index) = events.iter().position(|e| matches!(e.kind, EventKind::TimeZero)) {
        let preceding = &events[..time_zero_index];
        if let Some(tick_enter) = preceding.iter().rev().find(|e| {
            matches!(e.kind, EventKind::IsrEnter { irq_id } if irq_id == TICK_ZERO_IRQ_ID)
        }) {
            return tick_enter.ts;
        }
    }

    if let Some(first_ready) = events
        .iter()
        .find(|e| matches!(e.kind, EventKind::TaskStartReady { .. }))
    {
        return first_ready.ts;
    }

    0
}
