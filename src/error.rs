use thiserror::Error;

/// Fatal decode failure: an opcode the codec does not recognize, or a
/// payload that the buffer doesn't have enough bytes left to hold.
///
/// Per spec, this ends the affected core's stream at the last fully
/// decoded event; it does not corrupt events already returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("core {core}: unknown event opcode {opcode} at byte offset {offset}")]
    UnknownOpcode {
        core: u32,
        offset: usize,
        opcode: u16,
    },
    #[error("core {core}: truncated payload for opcode {opcode} at byte offset {offset}")]
    TruncatedPayload {
        core: u32,
        offset: usize,
        opcode: u16,
    },
    #[error("core {core}: task name at byte offset {offset} is not valid UTF-8")]
    InvalidTaskName { core: u32, offset: usize },
}

/// Fatal reconstruction failure. Unlike [`CodecError`], these abort the
/// whole reconstruction run rather than just one core's stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("core {core}: required synthetic task {task} could not be located in the registry")]
    MissingSyntheticTask { core: u32, task: &'static str },
}

/// Non-fatal issue discovered while reconstructing. These are collected
/// rather than propagated; the state machine keeps its current state and
/// continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An event wasn't admitted by the transition table for the core's
    /// current state. The event is skipped and the state preserved.
    InconsistentTransition {
        core: u32,
        ts: i64,
        kind: &'static str,
        state: &'static str,
    },
    /// A normal task still had an open job at end-of-stream. The job was
    /// closed at the last seen timestamp and marked incomplete.
    TruncatedRun { core: u32, task: u32, job: u32 },
}
