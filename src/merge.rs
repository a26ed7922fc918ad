//! Buffer Merger (spec §4.2): truncates per-core event streams to their
//! common time horizon and folds them into one time-sorted stream.

use crate::event::Event;

/// Merges decoded per-core event streams into one globally time-sorted
/// stream, truncated to `T_min = min_c T_c` where `T_c` is the timestamp
/// of the last event on core `c`.
///
/// A core with no events contributes a horizon of `0`; in practice this
/// means a silent core collapses the merged output to whatever other
/// cores logged at `ts == 0` (usually nothing), since no trace is
/// trustworthy past a core that never reported anything at all.
pub fn merge_cores(per_core: Vec<Vec<Event>>) -> Vec<Event> {
    let horizon = per_core
        .iter()
        .map(|events| events.last().map(|e| e.ts).unwrap_or(0))
        .min()
        .unwrap_or(0);

    let mut merged: Vec<Event> = per_core
        .into_iter()
        .flat_map(|events| events.into_iter().filter(|e| e.ts <= horizon))
        .collect();

    merged.sort_by_key(|e| (e.ts, e.core));
    merged
}
