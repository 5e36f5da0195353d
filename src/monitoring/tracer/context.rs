/*!
 * Per-Thread Call Context
 *
 * Call stack, in-flight records and completed history for one thread.
 * Lives in thread-local storage keyed by tracker instance, so no locking.
 * A context whose epoch differs from the tracker's is stale and replaced.
 *
 * Trackers announce their current epoch in a process-wide table and bump a
 * retirement generation on shutdown or drop. Each thread sweeps contexts
 * of retired trackers the next time it traces after the generation moved,
 * so worker threads that outlive a tracker do not keep its history.
 */

use crate::core::id::{EventId, TaskId};
use ahash::RandomState;
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// One traced call
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRecord {
    pub event_id: EventId,
    pub parent_event_id: Option<EventId>,
    pub function_name: String,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub args: String,
    pub result: Option<String>,
    pub depth: usize,
    pub start: Instant,
    pub end: Option<Instant>,
    pub task_id: TaskId,
}

impl FunctionCallRecord {
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// Elapsed so far for active calls
    pub fn duration(&self) -> Duration {
        self.end.unwrap_or_else(Instant::now).saturating_duration_since(self.start)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration().as_secs_f64() * 1000.0
    }
}

impl fmt::Display for FunctionCallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}ms] {:indent$}{}({}) [{}:{}]",
            self.duration_ms(),
            "",
            self.function_name,
            self.args,
            self.file,
            self.line,
            indent = self.depth * 2
        )?;
        if let Some(result) = &self.result {
            write!(f, " -> {}", result)?;
        }
        Ok(())
    }
}

pub(crate) struct ThreadContext {
    epoch: u64,
    capacity: usize,
    next_id: u64,
    stack: Vec<EventId>,
    active: HashMap<EventId, FunctionCallRecord>,
    completed: VecDeque<FunctionCallRecord>,
}

impl ThreadContext {
    fn new(epoch: u64, capacity: usize) -> Self {
        Self {
            epoch,
            capacity: capacity.max(1),
            next_id: 0,
            stack: Vec::new(),
            active: HashMap::new(),
            completed: VecDeque::new(),
        }
    }

    pub fn begin(
        &mut self,
        function_name: &str,
        module: &str,
        file: &str,
        line: u32,
        args: &str,
    ) -> EventId {
        let event_id = EventId(self.next_id);
        self.next_id += 1;

        let record = FunctionCallRecord {
            event_id,
            parent_event_id: self.stack.last().copied(),
            function_name: function_name.to_string(),
            module: module.to_string(),
            file: file.to_string(),
            line,
            args: args.to_string(),
            result: None,
            depth: self.stack.len(),
            start: Instant::now(),
            end: None,
            task_id: TaskId::current(),
        };
        self.stack.push(event_id);
        self.active.insert(event_id, record);
        event_id
    }

    /// Close an in-flight call; None when the id is unknown or already closed
    pub fn finish(&mut self, event_id: EventId, result: Option<&str>) -> Option<FunctionCallRecord> {
        let mut record = self.active.remove(&event_id)?;
        if let Some(pos) = self.stack.iter().rposition(|id| *id == event_id) {
            self.stack.remove(pos);
        }

        record.end = Some(Instant::now());
        record.result = result.map(str::to_string);

        while self.completed.len() >= self.capacity {
            self.completed.pop_front();
        }
        self.completed.push_back(record.clone());
        Some(record)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn completed(&self) -> Vec<FunctionCallRecord> {
        self.completed.iter().cloned().collect()
    }

    /// In-flight calls, outermost first
    pub fn active(&self) -> Vec<FunctionCallRecord> {
        self.stack
            .iter()
            .filter_map(|id| self.active.get(id).cloned())
            .collect()
    }

    pub fn clear_history(&mut self) {
        self.completed.clear();
    }

    /// Completed calls in start order, indented by depth
    pub fn render_tree(&self) -> String {
        let mut records: Vec<&FunctionCallRecord> = self.completed.iter().collect();
        records.sort_by_key(|r| (r.start, r.depth));

        let mut out = String::new();
        for record in records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }
}

/// Tracker id -> current epoch, for every tracker not yet dropped
static LIVE_TRACKERS: OnceLock<DashMap<u64, u64, RandomState>> = OnceLock::new();

/// Bumped after every shutdown or drop
static RETIRED: AtomicU64 = AtomicU64::new(0);

fn live_trackers() -> &'static DashMap<u64, u64, RandomState> {
    LIVE_TRACKERS.get_or_init(|| DashMap::with_hasher(RandomState::new()))
}

pub(crate) fn register_tracker(tracker: u64, epoch: u64) {
    live_trackers().insert(tracker, epoch);
}

/// Move `tracker` to `epoch`; every thread's older context becomes sweepable
pub(crate) fn retire_epoch(tracker: u64, epoch: u64) {
    live_trackers().insert(tracker, epoch);
    RETIRED.fetch_add(1, Ordering::Release);
    forget_context(tracker);
}

pub(crate) fn unregister_tracker(tracker: u64) {
    live_trackers().remove(&tracker);
    RETIRED.fetch_add(1, Ordering::Release);
    forget_context(tracker);
}

#[derive(Default)]
struct Contexts {
    swept_at: u64,
    map: HashMap<u64, ThreadContext>,
}

impl Contexts {
    fn sweep(&mut self) {
        let generation = RETIRED.load(Ordering::Acquire);
        if generation == self.swept_at {
            return;
        }
        self.swept_at = generation;
        let live = live_trackers();
        self.map
            .retain(|id, ctx| live.get(id).is_some_and(|epoch| *epoch == ctx.epoch));
    }
}

thread_local! {
    static CONTEXTS: RefCell<Contexts> = RefCell::new(Contexts::default());
}

/// Run `f` on this thread's context for `tracker`, creating or resetting it
///
/// Returns None during thread teardown. `f` must not re-enter the tracer.
pub(crate) fn with_context<R>(
    tracker: u64,
    epoch: u64,
    capacity: usize,
    f: impl FnOnce(&mut ThreadContext) -> R,
) -> Option<R> {
    CONTEXTS
        .try_with(|cell| {
            let mut contexts = cell.try_borrow_mut().ok()?;
            contexts.sweep();
            let ctx = contexts
                .map
                .entry(tracker)
                .or_insert_with(|| ThreadContext::new(epoch, capacity));
            if ctx.epoch != epoch {
                *ctx = ThreadContext::new(epoch, capacity);
            }
            Some(f(ctx))
        })
        .ok()
        .flatten()
}

/// Read this thread's context without creating one
pub(crate) fn peek_context<R>(
    tracker: u64,
    epoch: u64,
    f: impl FnOnce(&ThreadContext) -> R,
) -> Option<R> {
    CONTEXTS
        .try_with(|cell| {
            let contexts = cell.try_borrow().ok()?;
            contexts.map.get(&tracker).filter(|ctx| ctx.epoch == epoch).map(f)
        })
        .ok()
        .flatten()
}

/// Contexts held by the current thread, retired ones included until swept
pub(crate) fn thread_context_count() -> usize {
    CONTEXTS
        .try_with(|cell| cell.try_borrow().map(|c| c.map.len()).unwrap_or(0))
        .unwrap_or(0)
}

/// Drop this thread's context for `tracker`
fn forget_context(tracker: u64) {
    let _ = CONTEXTS.try_with(|cell| {
        if let Ok(mut contexts) = cell.try_borrow_mut() {
            contexts.map.remove(&tracker);
        }
    });
}
