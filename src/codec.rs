//! Event Codec (spec §4.1): turns one core's raw trace buffer into a
//! time-ordered sequence of [`Event`]s.

use crate::error::CodecError;
use crate::event::{opcode, Event, EventKind};

/// Decodes a single core's buffer into a `Vec<Event>`, stopping at the
/// first malformed record.
///
/// This is a thin `collect()` over [`EventDecoder`]; it exists because
/// the Buffer Merger needs each core's full event list (to find the
/// horizon timestamp) regardless of how lazily the codec itself reads.
pub fn decode_core(buf: &[u8], core: u32) -> Result<Vec<Event>, CodecError> {
    EventDecoder::new(buf, core).collect()
}

/// Lazily decodes records out of a byte buffer for one core.
///
/// Yields `Ok(Event)` for each fully-read record, `Err` once a record's
/// header or payload can't be read in full, and `None` once a record
/// boundary lines up exactly with the end of the buffer. The iterator is
/// fused: once it yields an `Err`, every subsequent call returns `None`.
pub struct EventDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    clock: u64,
    core: u32,
    done: bool,
}

impl<'a> EventDecoder<'a> {
    pub fn new(buf: &'a [u8], core: u32) -> Self {
        EventDecoder {
            buf,
            pos: 0,
            clock: 0,
            core,
            done: false,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u16(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        let bytes = [self.buf[self.pos], self.buf[self.pos + 1]];
        self.pos += 2;
        Some(u16::from_le_bytes(bytes))
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let bytes = [
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ];
        self.pos += 4;
        Some(u32::from_le_bytes(bytes))
    }

    fn read_name(&mut self, word_count: u32, offset: usize) -> Result<String, CodecError> {
        let len = word_count as usize * 4;
        if self.remaining() < len {
            return Err(CodecError::TruncatedPayload {
                core: self.core,
                offset,
                opcode: opcode::TASK_CREATE,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        let decoded = std::str::from_utf8(bytes)
            .map_err(|_| CodecError::InvalidTaskName {
                core: self.core,
                offset,
            })?;
        Ok(decoded.split('\0').next().unwrap_or("").to_string())
    }

    fn decode_one(&mut self) -> Option<Result<Event, CodecError>> {
        let record_start = self.pos;
        let dt = self.read_u16()?;
        let id = match self.read_u16() {
            Some(id) => id,
            None => {
                // A dt was read but the id half of the header is missing:
                // a genuinely truncated header, not a clean end-of-buffer.
                self.pos = record_start;
                return Some(Err(CodecError::TruncatedPayload {
                    core: self.core,
                    offset: record_start,
                    opcode: 0,
                }));
            }
        };

        self.clock += dt as u64;
        let ts = self.clock;
        let core = self.core;

        macro_rules! truncated {
            () => {
                return Some(Err(CodecError::TruncatedPayload {
                    core,
                    offset: record_start,
                    opcode: id,
                }))
            };
        }

        let kind = match id {
            opcode::IDLE => EventKind::Idle,
            opcode::TASK_START_EXEC => match self.read_u32() {
                Some(task_id) => EventKind::TaskStartExec { task_id },
                None => truncated!(),
            },
            opcode::TASK_STOP_EXEC => match self.read_u32() {
                Some(task_id) => EventKind::TaskStopExec { task_id },
                None => truncated!(),
            },
            opcode::TASK_START_READY => match self.read_u32() {
                Some(task_id) => EventKind::TaskStartReady { task_id },
                None => truncated!(),
            },
            opcode::TASK_STOP_READY => match self.read_u32() {
                Some(task_id) => EventKind::TaskStopReady { task_id },
                None => truncated!(),
            },
            opcode::TASK_CREATE => {
                let task_id = match self.read_u32() {
                    Some(v) => v,
                    None => truncated!(),
                };
                let str_len = match self.read_u32() {
                    Some(v) => v,
                    None => truncated!(),
                };
                let priority = match self.read_u32() {
                    Some(v) => v,
                    None => truncated!(),
                };
                let name = match self.read_name(str_len, record_start) {
                    Ok(n) => n,
                    Err(e) => return Some(Err(e)),
                };
                EventKind::TaskCreate {
                    task_id,
                    priority,
                    name,
                }
            }
            opcode::START => EventKind::Start,
            opcode::STOP => EventKind::Stop,
            opcode::DELAY_UNTIL => match self.read_u32() {
                Some(time_to_wake_ms) => EventKind::DelayUntil { time_to_wake_ms },
                None => truncated!(),
            },
            opcode::ISR_ENTER => match self.read_u32() {
                Some(irq_id) => EventKind::IsrEnter { irq_id },
                None => truncated!(),
            },
            opcode::ISR_EXIT => EventKind::IsrExit,
            opcode::ISR_EXIT_TO_SCHEDULER => EventKind::IsrExitToScheduler,
            opcode::DELAY => match self.read_u32() {
                Some(delay_time_ms) => EventKind::Delay { delay_time_ms },
                None => truncated!(),
            },
            opcode::TIME_ZERO => EventKind::TimeZero,
            other => {
                return Some(Err(CodecError::UnknownOpcode {
                    core,
                    offset: record_start,
                    opcode: other,
                }))
            }
        };

        Some(Ok(Event { kind, ts, core }))
    }
}

impl<'a> Iterator for EventDecoder<'a> {
    type Item = Result<Event, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining() == 0 {
            self.done = true;
            return None;
        }
        match self.decode_one() {
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            other => other,
        }
    }
}
