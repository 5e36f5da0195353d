/*!
 * Call Tracer
 *
 * Records function entry/exit as per-thread call trees, folds durations
 * into per-function statistics and reports slow calls through the
 * dispatcher.
 *
 * Per-thread state is thread-local and never locked. Shared state:
 * - Function statistics in a sharded map
 * - Execution thresholds in a handle registry, invoked outside any lock
 */

mod context;
mod scope;
mod stats;

pub use context::FunctionCallRecord;
pub use scope::ScopedTrace;
pub use stats::FunctionStats;

use crate::core::id::{AtomicGenerator, EventId};
use crate::core::limits::{
    CALL_HISTORY_CAPACITY, FUNCTION_REPORT_THRESHOLD, REPORT_DETAIL_LIMIT, REPORT_MIN_CALL_COUNT,
    REPORT_SUMMARY_LIMIT,
};
use crate::core::registry::HandleRegistry;
use crate::core::types::{HandleId, SourceLocation};
use crate::monitoring::dispatcher::MonitoringSystem;
use crate::monitoring::events::{Event, EventKind, Severity};
use ahash::RandomState;
use dashmap::DashMap;
use stats::FunctionKey;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

static TRACKER_IDS: AtomicGenerator = AtomicGenerator::starting_at(1);

/// Callback for slow calls: (function name, duration in ms)
pub type ExecutionCallback = dyn Fn(&str, f64) + Send + Sync;

/// When an execution threshold fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdTrigger {
    /// Every call that exceeds the threshold
    #[default]
    EveryCall,
    /// First exceeding call only, until re-armed
    Once,
}

struct ExecutionThreshold {
    function_name: String,
    threshold_ms: f64,
    trigger: ThresholdTrigger,
    fired: AtomicBool,
    callback: Box<ExecutionCallback>,
}

/// Function call tracer
pub struct EventTracker {
    id: u64,
    epoch: AtomicU64,
    initialized: AtomicBool,
    enabled: AtomicBool,
    dispatcher: Arc<MonitoringSystem>,
    stats: DashMap<FunctionKey, FunctionStats, RandomState>,
    thresholds: HandleRegistry<ExecutionThreshold>,
    report_threshold_us: AtomicU64,
    history_capacity: usize,
}

impl EventTracker {
    pub fn new(dispatcher: Arc<MonitoringSystem>) -> Self {
        Self::with_history_capacity(dispatcher, CALL_HISTORY_CAPACITY)
    }

    /// Completed calls kept per thread
    pub fn with_history_capacity(dispatcher: Arc<MonitoringSystem>, capacity: usize) -> Self {
        let id = TRACKER_IDS.next();
        context::register_tracker(id, 0);
        Self {
            id,
            epoch: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            dispatcher,
            stats: DashMap::with_hasher(RandomState::new()),
            thresholds: HandleRegistry::new(),
            report_threshold_us: AtomicU64::new(FUNCTION_REPORT_THRESHOLD.as_micros() as u64),
            history_capacity: capacity,
        }
    }

    pub fn initialize(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(tracker = self.id, enabled, "Event tracker initialized");
        self.dispatcher.log(
            EventKind::System,
            Severity::Info,
            "EventTrackerInitialized",
            "Function call tracing initialized",
            None,
        );
    }

    /// Emit a final report, then drop all statistics and thread contexts
    pub fn shutdown(&self) {
        if !self.is_initialized() {
            return;
        }
        self.create_performance_report(true, 1);
        self.dispatcher.log_event(
            &Event::new(
                EventKind::System,
                Severity::Info,
                "EventTrackerShutdown",
                "Function call tracing shut down",
            )
            .with_number("tracked_functions", self.stats.len() as f64),
        );

        self.initialized.store(false, Ordering::Release);
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.clear();
        context::retire_epoch(self.id, epoch);
        debug!(tracker = self.id, "Event tracker shut down");
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Calls at or above this duration are emitted as `FunctionExecution`
    pub fn set_report_threshold(&self, threshold: Duration) {
        self.report_threshold_us
            .store(threshold.as_micros() as u64, Ordering::Release);
    }

    #[inline]
    fn active(&self) -> bool {
        self.is_initialized() && self.is_enabled()
    }

    #[inline]
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Open a call on the current thread
    ///
    /// Returns `EventId::DISABLED` without bookkeeping when tracing is off.
    pub fn begin_function(
        &self,
        name: &str,
        file: &str,
        line: u32,
        module: &str,
        args: &str,
    ) -> EventId {
        if !self.active() {
            return EventId::DISABLED;
        }
        context::with_context(self.id, self.epoch(), self.history_capacity, |ctx| {
            ctx.begin(name, module, file, line, args)
        })
        .unwrap_or(EventId::DISABLED)
    }

    /// Open a call using a captured source location
    pub fn begin_at(&self, location: &SourceLocation, module: &str, args: &str) -> EventId {
        self.begin_function(&location.function, &location.file, location.line, module, args)
    }

    /// Close a call opened on the current thread
    ///
    /// Unknown or already-closed ids produce a warning event and nothing else.
    pub fn end_function(&self, event_id: EventId, result: Option<&str>) {
        if event_id.is_disabled() || !self.is_initialized() {
            return;
        }

        let finished = context::with_context(self.id, self.epoch(), self.history_capacity, |ctx| {
            ctx.finish(event_id, result)
        });

        let record = match finished {
            Some(Some(record)) => record,
            Some(None) => {
                self.dispatcher.log_event(
                    &Event::new(
                        EventKind::Function,
                        Severity::Warning,
                        "TraceEventUnknown",
                        format!("No active traced call with id {}", event_id),
                    )
                    .with_number("event_id", event_id.0 as f64),
                );
                return;
            }
            None => return,
        };

        let duration = record.duration();
        let duration_us = duration.as_micros() as u64;
        self.stats
            .entry(FunctionKey::new(&record.function_name, &record.module))
            .or_insert_with(|| FunctionStats::new(&record.function_name, &record.module))
            .record(duration_us);

        if duration_us >= self.report_threshold_us.load(Ordering::Acquire) {
            self.emit_execution(&record);
        }
        self.check_thresholds(&record);
    }

    fn emit_execution(&self, record: &FunctionCallRecord) {
        if !self.dispatcher.accepts(Severity::Debug) {
            return;
        }
        let duration_ms = record.duration_ms();
        let event = Event::new(
            EventKind::Function,
            Severity::Debug,
            "FunctionExecution",
            format!("{} took {:.3}ms", record.function_name, duration_ms),
        )
        .with_location(SourceLocation::new(
            record.file.as_str(),
            record.line,
            record.function_name.as_str(),
        ))
        .with_number("duration_ms", duration_ms)
        .with_number("line", record.line as f64)
        .with_number("depth", record.depth as f64)
        .with_text("function", record.function_name.as_str())
        .with_text("module", record.module.as_str())
        .with_text("file", record.file.as_str())
        .with_text("args", record.args.as_str())
        .with_text("result", record.result.as_deref().unwrap_or(""));
        self.dispatcher.log_event(&event);
    }

    fn check_thresholds(&self, record: &FunctionCallRecord) {
        let duration_ms = record.duration_ms();
        for (id, threshold) in self.thresholds.snapshot() {
            if threshold.function_name != record.function_name || duration_ms <= threshold.threshold_ms {
                continue;
            }
            if threshold.trigger == ThresholdTrigger::Once && threshold.fired.swap(true, Ordering::AcqRel) {
                continue;
            }
            let callback = &threshold.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(&record.function_name, duration_ms))).is_err() {
                warn!(threshold = id, function = %record.function_name, "Execution threshold callback panicked");
            }
        }
    }

    /// Fire `callback` whenever `function_name` takes longer than `threshold_ms`
    pub fn set_execution_threshold<F>(&self, function_name: &str, threshold_ms: f64, callback: F) -> HandleId
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.set_execution_threshold_with(function_name, threshold_ms, ThresholdTrigger::EveryCall, callback)
    }

    pub fn set_execution_threshold_with<F>(
        &self,
        function_name: &str,
        threshold_ms: f64,
        trigger: ThresholdTrigger,
        callback: F,
    ) -> HandleId
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.thresholds.register(Arc::new(ExecutionThreshold {
            function_name: function_name.to_string(),
            threshold_ms,
            trigger,
            fired: AtomicBool::new(false),
            callback: Box::new(callback),
        }))
    }

    pub fn remove_execution_threshold(&self, id: HandleId) -> bool {
        self.thresholds.remove(id)
    }

    /// Let a `Once` threshold fire again; false for unknown handles
    pub fn rearm_execution_threshold(&self, id: HandleId) -> bool {
        match self.thresholds.get(id) {
            Some(threshold) => {
                threshold.fired.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Rank functions by total time and emit `FunctionPerformanceReport`
    ///
    /// Functions with fewer than `min_call_count` calls are skipped unless
    /// `include_all` is set. Returns the ranked list.
    pub fn create_performance_report(&self, include_all: bool, min_call_count: u64) -> Vec<FunctionStats> {
        let mut ranked: Vec<FunctionStats> = self
            .stats
            .iter()
            .filter(|entry| include_all || entry.call_count >= min_call_count)
            .map(|entry| entry.value().clone())
            .collect();
        ranked.sort_by(|a, b| {
            b.total_duration_us
                .cmp(&a.total_duration_us)
                .then_with(|| a.function_name.cmp(&b.function_name))
        });

        let mut summary = String::from("Top functions by total time:\n");
        for (i, stats) in ranked.iter().take(REPORT_SUMMARY_LIMIT).enumerate() {
            let _ = writeln!(
                summary,
                "{}. {} ({}): {} calls, {:.3}ms total, {:.3}ms avg",
                i + 1,
                stats.function_name,
                stats.module,
                stats.call_count,
                stats.total_ms(),
                stats.average_ms()
            );
        }

        let mut event = Event::new(
            EventKind::Function,
            Severity::Info,
            "FunctionPerformanceReport",
            format!("Function performance report ({} functions)", ranked.len()),
        )
        .with_number("function_count", ranked.len() as f64)
        .with_text("summary", summary);

        for (i, stats) in ranked.iter().take(REPORT_DETAIL_LIMIT).enumerate() {
            event = event
                .with_text(format!("func{}_name", i + 1), stats.function_name.as_str())
                .with_text(format!("func{}_module", i + 1), stats.module.as_str())
                .with_number(format!("func{}_calls", i + 1), stats.call_count as f64)
                .with_number(format!("func{}_total_ms", i + 1), stats.total_ms())
                .with_number(format!("func{}_avg_ms", i + 1), stats.average_ms());
        }

        self.dispatcher.log_event(&event);
        ranked
    }

    /// Report on functions called at least five times
    pub fn performance_report(&self) -> Vec<FunctionStats> {
        self.create_performance_report(false, REPORT_MIN_CALL_COUNT)
    }

    /// Snapshot of every function's statistics
    pub fn function_stats(&self) -> Vec<FunctionStats> {
        self.stats.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn function_stat(&self, name: &str, module: &str) -> Option<FunctionStats> {
        self.stats
            .get(&FunctionKey::new(name, module))
            .map(|entry| entry.value().clone())
    }

    /// Completed calls on the current thread, oldest first
    pub fn completed_calls(&self) -> Vec<FunctionCallRecord> {
        context::peek_context(self.id, self.epoch(), |ctx| ctx.completed()).unwrap_or_default()
    }

    /// In-flight calls on the current thread, outermost first
    pub fn active_calls(&self) -> Vec<FunctionCallRecord> {
        context::peek_context(self.id, self.epoch(), |ctx| ctx.active()).unwrap_or_default()
    }

    pub fn current_depth(&self) -> usize {
        context::peek_context(self.id, self.epoch(), |ctx| ctx.depth()).unwrap_or(0)
    }

    /// Indented rendering of the current thread's completed calls
    pub fn call_tree(&self) -> String {
        context::peek_context(self.id, self.epoch(), |ctx| ctx.render_tree()).unwrap_or_default()
    }

    /// Forget the current thread's completed calls
    pub fn clear_call_tree(&self) {
        let _ = context::with_context(self.id, self.epoch(), self.history_capacity, |ctx| {
            ctx.clear_history()
        });
    }

    pub fn threshold_count(&self) -> usize {
        self.thresholds.len()
    }
}

impl Drop for EventTracker {
    fn drop(&mut self) {
        context::unregister_tracker(self.id);
    }
}
