//! Platform configuration (spec §6.2), accepted as a value — this crate
//! never reads a config file or parses CLI flags; that's the
//! collaborating layer's job.

use serde::Deserialize;

/// Per-target-platform configuration needed to reconstruct a trace.
///
/// `tick_ids[core]` is the IRQ id of core `core`'s systick ISR; its
/// length is also how many cores the reconstructor drives. The buffer-
/// to-core mapping is simply the order the caller passes buffers in.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub tick_ids: Vec<u32>,
    /// Task names that finish their job at every `TASK_STOP_EXEC`,
    /// regardless of `delayUntil`. Defaults to `Tmr Svc` and
    /// `LET Manager`, matching the two hardcoded checks in the original
    /// parser (SPEC_FULL §4.5).
    #[serde(default = "default_job_per_execution_tasks")]
    pub job_per_execution_tasks: Vec<String>,
}

fn default_job_per_execution_tasks() -> Vec<String> {
    vec!["Tmr Svc".to_string(), "LET Manager".to_string()]
}

impl PlatformConfig {
    pub fn single_core(tick_id: u32) -> Self {
        PlatformConfig {
            tick_ids: vec![tick_id],
            job_per_execution_tasks: default_job_per_execution_tasks(),
        }
    }

    pub fn num_cores(&self) -> usize {
        self.tick_ids.len()
    }

    pub fn is_job_per_execution(&self, task_name: &str) -> bool {
        self.job_per_execution_tasks
            .iter()
            .any(|n| n == task_name)
    }
}
