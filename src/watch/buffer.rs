// src/watch/buffer.rs

//! Per-repository event buffer.
//!
//! The buffer is driven purely by the timestamps carried on events and the
//! `now` passed to [`EventBuffer::poll`]; it never reads the clock itself.
//! The watcher loop owns one buffer per repository and sleeps until
//! [`EventBuffer::next_deadline`].

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::types::{ChangeEvent, ChangeGroup, GroupingMode};
use crate::watch::grouping::{single_event_group, GroupBuilder, TempFilePatterns};

/// Rejection of a malformed event. The buffer stays usable afterwards.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupingError {
    #[error("event #{seq} arrived after #{last}; sequence numbers must increase")]
    OutOfOrder { seq: u64, last: u64 },

    #[error("event #{seq} has an empty path")]
    EmptyPath { seq: u64 },
}

/// Tunables for an [`EventBuffer`].
#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub mode: GroupingMode,
    /// Sliding debounce window.
    pub window: Duration,
    /// Extra quiet time after an atomic rewrite is detected (smart mode).
    pub settle: Duration,
    /// Distinct plain paths in one window that turn into a batch group.
    pub batch_threshold: usize,
    pub temp_patterns: TempFilePatterns,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            mode: GroupingMode::Smart,
            window: Duration::from_millis(100),
            settle: Duration::from_millis(20),
            batch_threshold: 5,
            temp_patterns: TempFilePatterns::default(),
        }
    }
}

#[derive(Debug)]
pub struct EventBuffer {
    settings: BufferSettings,
    builder: GroupBuilder,
    last_seq: Option<u64>,
    deadline: Option<Instant>,
    settling: bool,
}

impl EventBuffer {
    pub fn new(settings: BufferSettings) -> Self {
        let builder = GroupBuilder::new(settings.mode == GroupingMode::Smart);
        Self {
            settings,
            builder,
            last_seq: None,
            deadline: None,
            settling: false,
        }
    }

    pub fn mode(&self) -> GroupingMode {
        self.settings.mode
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    /// When the buffered window should next be polled, if anything is buffered.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Feed one event. Returns any groups that became complete, which includes
    /// the previous window if this event arrives after its deadline.
    pub fn feed(&mut self, event: ChangeEvent) -> Result<Vec<ChangeGroup>, GroupingError> {
        if let Some(last) = self.last_seq {
            if event.seq <= last {
                return Err(GroupingError::OutOfOrder {
                    seq: event.seq,
                    last,
                });
            }
        }
        if event.path.as_os_str().is_empty() {
            return Err(GroupingError::EmptyPath { seq: event.seq });
        }
        self.last_seq = Some(event.seq);

        if self.settings.mode == GroupingMode::Off {
            return Ok(vec![single_event_group(event)]);
        }

        let mut ready = self.poll(event.at);
        let at = event.at;
        self.builder.push(event, &self.settings.temp_patterns);
        if !self.settling {
            self.deadline = Some(at + self.settings.window);
        }
        ready.extend(self.poll(at));
        Ok(ready)
    }

    /// Emit whatever is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<ChangeGroup> {
        let Some(deadline) = self.deadline else {
            return Vec::new();
        };
        if now < deadline {
            return Vec::new();
        }

        if self.needs_settle() {
            let settle_deadline = deadline + self.settings.settle;
            self.settling = true;
            self.deadline = Some(settle_deadline);
            if now < settle_deadline {
                return Vec::new();
            }
        }

        self.emit()
    }

    /// Emit everything buffered regardless of deadlines.
    pub fn flush(&mut self) -> Vec<ChangeGroup> {
        self.emit()
    }

    fn needs_settle(&self) -> bool {
        self.settings.mode == GroupingMode::Smart
            && !self.settling
            && !self.settings.settle.is_zero()
            && self.builder.has_atomic()
    }

    fn emit(&mut self) -> Vec<ChangeGroup> {
        self.deadline = None;
        self.settling = false;
        let batch = match self.settings.mode {
            GroupingMode::Smart => Some(self.settings.batch_threshold),
            _ => None,
        };
        self.builder.finish(batch)
    }
}
