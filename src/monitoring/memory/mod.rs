/*!
 * Allocation Tracker
 *
 * Address-indexed ledger of live allocations with tag aggregation,
 * leak heuristics and usage alerts reported through the dispatcher.
 *
 * The ledger and its statistics share one lock. Events and threshold
 * callbacks always run after it is released.
 */

mod tracked;
mod types;

pub use tracked::TrackedBox;
pub use types::{AllocationRecord, MemoryReport, MemoryStats, SizeBreakdown, SizeCategory};

use crate::core::id::TaskId;
use crate::core::limits::{
    ALLOCATION_SPIKE_FRACTION, CALLSITE_MAX_FRAMES, DEFAULT_SYSTEM_MEMORY_BASELINE,
    DETAILED_ALLOCATION_LIMIT, HIGH_USAGE_FRACTION, LEAK_MIN_AGE, LEAK_MIN_SIZE,
};
use crate::core::registry::HandleRegistry;
use crate::core::types::{Address, HandleId};
use crate::monitoring::dispatcher::MonitoringSystem;
use crate::monitoring::events::{Event, EventKind, Severity};
use ahash::RandomState;
use backtrace::Backtrace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Callback for byte thresholds, given the current usage
pub type MemoryThresholdCallback = dyn Fn(usize) + Send + Sync;

struct MemoryThreshold {
    limit: usize,
    callback: Box<MemoryThresholdCallback>,
}

#[derive(Default)]
struct Ledger {
    live: HashMap<Address, AllocationRecord, RandomState>,
    stats: MemoryStats,
    last_sample: usize,
}

/// Allocation ledger service
pub struct MemoryTracker {
    initialized: AtomicBool,
    capture_callsites: AtomicBool,
    track_system_allocations: AtomicBool,
    system_memory_baseline: AtomicUsize,
    ledger: Mutex<Ledger>,
    thresholds: HandleRegistry<MemoryThreshold>,
    dispatcher: Arc<MonitoringSystem>,
}

#[inline]
fn hex(address: Address) -> String {
    format!("{:#x}", address)
}

impl MemoryTracker {
    pub fn new(dispatcher: Arc<MonitoringSystem>) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            capture_callsites: AtomicBool::new(false),
            track_system_allocations: AtomicBool::new(false),
            system_memory_baseline: AtomicUsize::new(DEFAULT_SYSTEM_MEMORY_BASELINE),
            ledger: Mutex::new(Ledger::default()),
            thresholds: HandleRegistry::new(),
            dispatcher,
        }
    }

    pub fn initialize(&self, capture_callsites: bool, track_system_allocations: bool) {
        self.capture_callsites.store(capture_callsites, Ordering::Release);
        self.track_system_allocations
            .store(track_system_allocations, Ordering::Release);
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(capture_callsites, track_system_allocations, "Memory tracker initialized");
        self.dispatcher.log_event(
            &Event::new(
                EventKind::System,
                Severity::Info,
                "MemoryTrackerInitialized",
                "Memory tracking initialized",
            )
            .with_text("capture_callsites", capture_callsites.to_string())
            .with_text("track_system_allocations", track_system_allocations.to_string()),
        );
    }

    /// Emit a final report and totals, then clear the ledger
    pub fn shutdown(&self) {
        if !self.is_initialized() {
            return;
        }
        let report = self.create_memory_report(false);
        self.dispatcher.log_event(
            &Event::new(
                EventKind::System,
                Severity::Info,
                "MemoryTrackerShutdown",
                "Memory tracking shut down",
            )
            .with_number("total_allocated", report.stats.total_allocated as f64)
            .with_number("total_deallocated", report.stats.total_deallocated as f64)
            .with_number("peak_usage", report.stats.peak_usage as f64)
            .with_number("active_allocations", report.stats.active_allocations as f64),
        );

        self.initialized.store(false, Ordering::Release);
        *self.ledger.lock() = Ledger::default();
        debug!("Memory tracker shut down");
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether callers route system allocator activity through this tracker
    pub fn tracks_system_allocations(&self) -> bool {
        self.track_system_allocations.load(Ordering::Acquire)
    }

    pub fn set_capture_callsites(&self, enabled: bool) {
        self.capture_callsites.store(enabled, Ordering::Release);
    }

    /// Total memory the high-usage alert measures against
    pub fn set_system_memory_baseline(&self, bytes: usize) {
        self.system_memory_baseline.store(bytes.max(1), Ordering::Release);
    }

    /// Record a live allocation
    ///
    /// A live record at the same address is released first, so the new
    /// record replaces it (last write wins).
    pub fn track_allocation(&self, address: Address, size: usize, tag: Option<&str>) {
        if !self.is_initialized() {
            return;
        }

        let callsite = self
            .capture_callsites
            .load(Ordering::Acquire)
            .then(capture_callsite);

        let record = AllocationRecord {
            address,
            size,
            tag: tag.map(str::to_string),
            callsite,
            allocated_at: Instant::now(),
            timestamp: SystemTime::now(),
            task_id: TaskId::current(),
        };

        let (current, previous, replaced) = {
            let mut ledger = self.ledger.lock();
            let replaced = ledger.live.remove(&address);
            if let Some(old) = &replaced {
                ledger.stats.record_release(old.size, old.tag.as_deref());
            }
            ledger.stats.record_allocation(size, tag);
            ledger.live.insert(address, record);
            let current = ledger.stats.current_usage;
            let previous = std::mem::replace(&mut ledger.last_sample, current);
            (current, previous, replaced.map(|r| r.size))
        };

        if let Some(old_size) = replaced {
            debug!(address = %hex(address), old_size, new_size = size, "Address reused while live");
        }

        if self.dispatcher.accepts(Severity::Debug) {
            self.dispatcher.log_event(
                &Event::new(
                    EventKind::Memory,
                    Severity::Debug,
                    "MemoryAllocation",
                    format!("Allocated {} bytes at {}", size, hex(address)),
                )
                .with_number("size", size as f64)
                .with_number("current_usage", current as f64)
                .with_text("address", hex(address))
                .with_text("tag", tag.unwrap_or("")),
            );
        }

        self.check_alerts(current, previous);
    }

    /// Release a live allocation; false (with a warning event) when unknown
    pub fn track_deallocation(&self, address: Address) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let released = {
            let mut ledger = self.ledger.lock();
            ledger.live.remove(&address).map(|record| {
                ledger.stats.record_release(record.size, record.tag.as_deref());
                (record, ledger.stats.current_usage)
            })
        };

        match released {
            Some((record, current)) => {
                if self.dispatcher.accepts(Severity::Debug) {
                    self.dispatcher.log_event(
                        &Event::new(
                            EventKind::Memory,
                            Severity::Debug,
                            "MemoryDeallocation",
                            format!("Freed {} bytes at {}", record.size, hex(address)),
                        )
                        .with_number("size", record.size as f64)
                        .with_number("current_usage", current as f64)
                        .with_text("address", hex(address))
                        .with_text("tag", record.tag.as_deref().unwrap_or("")),
                    );
                }
                true
            }
            None => {
                self.dispatcher.log_event(
                    &Event::new(
                        EventKind::Memory,
                        Severity::Warning,
                        "MemoryDeallocationUnknown",
                        format!("Deallocation of untracked address {}", hex(address)),
                    )
                    .with_text("address", hex(address)),
                );
                false
            }
        }
    }

    /// Move a live allocation to another tag; false for unknown addresses
    pub fn tag_allocation(&self, address: Address, tag: &str) -> bool {
        let mut ledger = self.ledger.lock();
        let Ledger { live, stats, .. } = &mut *ledger;
        match live.get_mut(&address) {
            Some(record) => {
                stats.retag(record.size, record.tag.as_deref(), tag);
                record.tag = Some(tag.to_string());
                true
            }
            None => false,
        }
    }

    /// Flag live allocations at least `min_size` bytes and `min_age` old
    ///
    /// Emits one `PotentialMemoryLeak` warning per match and returns the count.
    pub fn check_memory_leaks(&self, min_size: usize, min_age: Duration) -> usize {
        let suspects: Vec<AllocationRecord> = {
            let ledger = self.ledger.lock();
            ledger
                .live
                .values()
                .filter(|r| r.size >= min_size && r.age() >= min_age)
                .cloned()
                .collect()
        };

        for record in &suspects {
            self.dispatcher.log_event(
                &Event::new(
                    EventKind::Memory,
                    Severity::Warning,
                    "PotentialMemoryLeak",
                    format!(
                        "{} bytes at {} alive for {:.1}s",
                        record.size,
                        hex(record.address),
                        record.age().as_secs_f64()
                    ),
                )
                .with_number("size", record.size as f64)
                .with_number("age_seconds", record.age().as_secs_f64())
                .with_text("address", hex(record.address))
                .with_text("tag", record.tag.as_deref().unwrap_or(""))
                .with_text("callsite", record.callsite.as_deref().unwrap_or("")),
            );
        }

        if !suspects.is_empty() {
            warn!(count = suspects.len(), "Potential memory leaks detected");
        }
        suspects.len()
    }

    /// Leak scan with the default limits (1 KiB, 60 s)
    pub fn scan_for_leaks(&self) -> usize {
        self.check_memory_leaks(LEAK_MIN_SIZE, LEAK_MIN_AGE)
    }

    fn check_alerts(&self, current: usize, previous: usize) {
        for (id, threshold) in self.thresholds.snapshot() {
            if current <= threshold.limit {
                continue;
            }
            let callback = &threshold.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(current))).is_err() {
                warn!(threshold = id, "Memory threshold callback panicked");
            }
        }

        let baseline = self.system_memory_baseline.load(Ordering::Acquire);
        let high_mark = baseline as f64 * HIGH_USAGE_FRACTION;
        if current as f64 > high_mark {
            self.dispatcher.log_event(
                &Event::new(
                    EventKind::Memory,
                    Severity::Warning,
                    "MemoryAlert_HighUsage",
                    format!(
                        "Tracked usage {} bytes exceeds {:.0}% of {} bytes",
                        current,
                        HIGH_USAGE_FRACTION * 100.0,
                        baseline
                    ),
                )
                .with_number("current_usage", current as f64)
                .with_number("threshold", high_mark)
                .with_number("baseline", baseline as f64),
            );
        }

        if previous > 0 && current > previous {
            let growth = (current - previous) as f64 / previous as f64;
            if growth > ALLOCATION_SPIKE_FRACTION {
                self.dispatcher.log_event(
                    &Event::new(
                        EventKind::Memory,
                        Severity::Info,
                        "MemoryAlert_AllocationSpike",
                        format!("Tracked usage grew {:.1}% since last sample", growth * 100.0),
                    )
                    .with_number("previous_usage", previous as f64)
                    .with_number("current_usage", current as f64)
                    .with_number("growth_percent", growth * 100.0),
                );
            }
        }
    }

    /// Fire `callback(current_usage)` after any allocation that leaves usage above `limit`
    pub fn set_memory_threshold<F>(&self, limit: usize, callback: F) -> HandleId
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.thresholds.register(Arc::new(MemoryThreshold {
            limit,
            callback: Box::new(callback),
        }))
    }

    pub fn remove_memory_threshold(&self, id: HandleId) -> bool {
        self.thresholds.remove(id)
    }

    /// Emit totals and breakdowns; `detailed` adds the largest allocations
    pub fn create_memory_report(&self, detailed: bool) -> MemoryReport {
        let report = {
            let ledger = self.ledger.lock();
            let mut by_size: Vec<_> = SizeCategory::ALL
                .iter()
                .map(|&category| SizeBreakdown {
                    category,
                    count: 0,
                    bytes: 0,
                })
                .collect();
            for record in ledger.live.values() {
                let bucket = &mut by_size[record.category() as usize];
                bucket.count += 1;
                bucket.bytes += record.size;
            }

            let largest = if detailed {
                let mut records: Vec<AllocationRecord> = ledger.live.values().cloned().collect();
                records.sort_by(|a, b| b.size.cmp(&a.size).then(a.address.cmp(&b.address)));
                records.truncate(DETAILED_ALLOCATION_LIMIT);
                records
            } else {
                Vec::new()
            };

            MemoryReport {
                stats: ledger.stats.clone(),
                by_size,
                largest,
            }
        };

        let stats = &report.stats;
        self.dispatcher.log_event(
            &Event::new(
                EventKind::Memory,
                Severity::Info,
                "MemoryReport",
                format!(
                    "{} bytes in {} live allocations (peak {})",
                    stats.current_usage, stats.active_allocations, stats.peak_usage
                ),
            )
            .with_number("total_allocated", stats.total_allocated as f64)
            .with_number("total_deallocated", stats.total_deallocated as f64)
            .with_number("current_usage", stats.current_usage as f64)
            .with_number("peak_usage", stats.peak_usage as f64)
            .with_number("allocation_count", stats.allocation_count as f64)
            .with_number("deallocation_count", stats.deallocation_count as f64)
            .with_number("active_allocations", stats.active_allocations as f64)
            .with_text("tag_details", report.tag_details())
            .with_text("size_details", report.size_details()),
        );

        for record in &report.largest {
            self.dispatcher.log_event(
                &Event::new(
                    EventKind::Memory,
                    Severity::Info,
                    "MemoryReportDetail",
                    format!("{} bytes at {}", record.size, hex(record.address)),
                )
                .with_number("size", record.size as f64)
                .with_number("age_seconds", record.age().as_secs_f64())
                .with_text("address", hex(record.address))
                .with_text("tag", record.tag.as_deref().unwrap_or(""))
                .with_text("category", record.category().to_string()),
            );
        }

        report
    }

    pub fn stats(&self) -> MemoryStats {
        self.ledger.lock().stats.clone()
    }

    pub fn allocation(&self, address: Address) -> Option<AllocationRecord> {
        self.ledger.lock().live.get(&address).cloned()
    }

    /// Live allocations ordered by address
    pub fn live_allocations(&self) -> Vec<AllocationRecord> {
        let mut records: Vec<AllocationRecord> = self.ledger.lock().live.values().cloned().collect();
        records.sort_by_key(|r| r.address);
        records
    }
}

/// Symbolized frames of the current stack, skipping the capture itself
fn capture_callsite() -> String {
    let bt = Backtrace::new();
    bt.frames()
        .iter()
        .filter_map(|frame| {
            let symbol = frame.symbols().first()?;
            let name = symbol.name()?.to_string();
            if name.starts_with("backtrace::") || name.contains("capture_callsite") {
                return None;
            }
            let location = match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(line)) => format!(" ({}:{})", file.display(), line),
                (Some(file), None) => format!(" ({})", file.display()),
                _ => String::new(),
            };
            Some(format!("{}{}", name, location))
        })
        .take(CALLSITE_MAX_FRAMES)
        .collect::<Vec<_>>()
        .join("\n")
}
