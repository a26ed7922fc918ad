//! Decodes per-core binary trace buffers from a real-time operating
//! system and reconstructs, for every task, the jobs it ran and the
//! execution intervals those jobs occupied across cores.
//!
//! The pipeline, leaf to root:
//!
//! 1. [`codec`] decodes one core's raw buffer into a time-ordered event
//!    stream.
//! 2. [`merge`] truncates every core's stream to the common horizon and
//!    folds them into one globally sorted stream.
//! 3. [`time_zero`] chooses the origin subtracted from every timestamp.
//! 4. [`patch`] repairs the one documented dropout (a missing
//!    `ISR_ENTER`).
//! 5. [`reconstruct`] drives a per-core state machine over that stream,
//!    writing jobs and intervals onto a [`registry::TaskRegistry`].
//!
//! [`reconstruct::reconstruct`] is the single entry point most callers
//! need; the individual stages are public so callers (and tests) can
//! exercise them independently.

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod merge;
pub mod patch;
pub mod reconstruct;
pub mod registry;
pub mod time_zero;

pub use config::PlatformConfig;
pub use error::{CodecError, Diagnostic, Error};
pub use event::{Event, EventKind};
pub use reconstruct::{reconstruct, ReconstructionResult};
pub use registry::{ExecutionInterval, ExecutionPhase, Job, Task, TaskId, TaskKind, TaskRegistry};
