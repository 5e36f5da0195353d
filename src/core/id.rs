/*!
 * ID Generation
 * Type-safe id wrappers and the monotonic generator behind them
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of the thread that produced an event or record
///
/// Assigned lazily, one per OS thread, in first-use order starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

static TASK_IDS: AtomicGenerator = AtomicGenerator::starting_at(1);

thread_local! {
    static CURRENT_TASK: TaskId = TaskId(TASK_IDS.next());
}

impl TaskId {
    /// Id of the calling thread
    #[inline]
    pub fn current() -> Self {
        CURRENT_TASK.with(|id| *id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-thread id of a traced function call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    /// Returned by the tracer when tracing is off; ending it is a no-op
    pub const DISABLED: EventId = EventId(u64::MAX);

    #[inline]
    pub fn is_disabled(self) -> bool {
        self == Self::DISABLED
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            f.write_str("disabled")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Lock-free monotonic u64 generator
#[derive(Debug)]
pub struct AtomicGenerator {
    counter: AtomicU64,
}

impl AtomicGenerator {
    pub const fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Next id; never repeats for the lifetime of the generator
    #[inline]
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Value the next call will return
    pub fn peek(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for AtomicGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}
