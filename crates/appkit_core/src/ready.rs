//! Host readiness scheduling.
//!
//! # Responsibility
//! - Describe the one-shot "run once the host is ready" capability used by
//!   application auto-start.
//! - Provide an in-process signal hosts can drive explicitly.
//!
//! # Invariants
//! - Every scheduled callback runs exactly once.
//! - Callbacks never run synchronously inside `schedule_once_ready`.
//! - Scheduled callbacks cannot be withdrawn.

use log::debug;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};

pub type ReadyCallback = Box<dyn FnOnce()>;

/// One-shot readiness scheduler.
pub trait ReadyScheduler {
    fn schedule_once_ready(&self, callback: ReadyCallback);
}

/// Manually driven readiness signal.
///
/// Callbacks queue until [`ReadySignal::mark_ready`]. Callbacks scheduled
/// after that run on the next [`ReadySignal::flush`].
#[derive(Default)]
pub struct ReadySignal {
    ready: Cell<bool>,
    queue: RefCell<VecDeque<ReadyCallback>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Flips the signal to ready and runs everything queued so far.
    pub fn mark_ready(&self) -> usize {
        self.ready.set(true);
        self.flush()
    }

    /// Runs queued callbacks. Does nothing before the signal is ready.
    ///
    /// Returns how many callbacks ran.
    pub fn flush(&self) -> usize {
        if !self.is_ready() {
            return 0;
        }

        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(callback) = next else {
                break;
            };
            callback();
            ran += 1;
        }
        if ran > 0 {
            debug!("event=ready_flush module=ready status=ok callbacks={ran}");
        }
        ran
    }
}

impl ReadyScheduler for ReadySignal {
    fn schedule_once_ready(&self, callback: ReadyCallback) {
        self.queue.borrow_mut().push_back(callback);
    }
}

impl Debug for ReadySignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadySignal")
            .field("ready", &self.is_ready())
            .field("pending", &self.pending())
            .finish()
    }
}
