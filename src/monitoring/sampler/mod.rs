/*!
 * Metrics Sampler
 *
 * Periodic resource sampling on one background thread.
 *
 * # Worker
 *
 * The worker waits for a start command, ticks once and then once per
 * interval. It is driven
 * by a `flume` command channel, so the interval can change without a
 * restart. `shutdown` sends a stop command and joins the thread; dropping
 * the monitor without calling it does the same.
 *
 * # Tick
 *
 * 1. Collect every enabled category from the `MetricSource`
 * 2. Replace the latest snapshot
 * 3. Emit `PerformanceUpdate`
 * 4. Fire CPU and memory thresholds whose limit is exceeded
 * 5. Notify subscribers with the snapshot
 */

mod snapshot;
mod source;

pub use snapshot::{
    CategoryFlags, CpuUsage, DiskStats, DiskUsage, GpuStats, GpuUsage, InterfaceStats,
    MemoryUsage, NetworkUsage, PerformanceSnapshot, SamplingInterval,
};
pub use source::{MetricSource, StaticSource, SystemSource};

use crate::core::errors::MonitoringResult;
use crate::core::limits::SAMPLER_THREAD_NAME;
use crate::core::registry::HandleRegistry;
use crate::core::types::HandleId;
use crate::monitoring::dispatcher::MonitoringSystem;
use crate::monitoring::events::{Event, EventKind, Severity};
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Subscriber notified with every snapshot
pub type PerformanceCallback = dyn Fn(&PerformanceSnapshot) + Send + Sync;

/// Threshold callback, given the measured percentage
pub type ThresholdCallback = dyn Fn(f64) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThresholdMetric {
    Cpu,
    Memory,
}

struct PerformanceThreshold {
    metric: ThresholdMetric,
    limit: f64,
    callback: Box<ThresholdCallback>,
}

/// Control messages for the sampler worker
#[derive(Debug, Clone, Copy)]
enum SamplerCommand {
    Start,
    SetInterval(Duration),
    Shutdown,
}

struct SamplerWorker {
    command_tx: Sender<SamplerCommand>,
    handle: JoinHandle<()>,
}

/// State shared between the monitor handle and its worker
struct Sampling {
    dispatcher: Arc<MonitoringSystem>,
    source: Arc<dyn MetricSource>,
    categories: RwLock<CategoryFlags>,
    tick: AtomicU64,
    tick_lock: Mutex<()>,
    latest: RwLock<Option<PerformanceSnapshot>>,
    thresholds: HandleRegistry<PerformanceThreshold>,
    subscribers: HandleRegistry<PerformanceCallback>,
}

/// Periodic resource sampler
pub struct PerformanceMonitor {
    initialized: AtomicBool,
    interval: Mutex<Duration>,
    worker: Mutex<Option<SamplerWorker>>,
    shared: Arc<Sampling>,
}

impl PerformanceMonitor {
    /// Sampler reading the host through procfs
    pub fn new(dispatcher: Arc<MonitoringSystem>) -> Self {
        Self::with_source(dispatcher, Arc::new(SystemSource::new()))
    }

    pub fn with_source(dispatcher: Arc<MonitoringSystem>, source: Arc<dyn MetricSource>) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            interval: Mutex::new(SamplingInterval::default().duration()),
            worker: Mutex::new(None),
            shared: Arc::new(Sampling {
                dispatcher,
                source,
                categories: RwLock::new(CategoryFlags::all()),
                tick: AtomicU64::new(0),
                tick_lock: Mutex::new(()),
                latest: RwLock::new(None),
                thresholds: HandleRegistry::new(),
                subscribers: HandleRegistry::new(),
            }),
        }
    }

    /// Start the worker; a no-op when already running
    pub fn initialize(
        &self,
        interval: SamplingInterval,
        categories: CategoryFlags,
    ) -> MonitoringResult<()> {
        let period = interval.duration();
        let command_tx = {
            let mut worker = self.worker.lock();
            if worker.is_some() {
                return Ok(());
            }

            *self.interval.lock() = period;
            *self.shared.categories.write() = categories;

            let (command_tx, command_rx) = flume::unbounded();
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(SAMPLER_THREAD_NAME.to_string())
                .spawn(move || run_sampler_loop(shared, command_rx, period))?;

            *worker = Some(SamplerWorker {
                command_tx: command_tx.clone(),
                handle,
            });
            self.initialized.store(true, Ordering::Release);
            command_tx
        };

        // Worker lock released: callbacks on this event may re-enter the monitor
        self.shared.dispatcher.log_event(
            &Event::new(
                EventKind::System,
                Severity::Info,
                "PerformanceMonitorInitialized",
                "Performance monitoring initialized",
            )
            .with_number("interval_ms", period.as_millis() as f64)
            .with_text("categories", categories.to_string()),
        );

        if command_tx.send(SamplerCommand::Start).is_err() {
            debug!("Sampler stopped before its first tick");
            return Ok(());
        }
        info!(interval_ms = period.as_millis() as u64, %categories, "Performance sampler started");
        Ok(())
    }

    /// Stop and join the worker, then emit the final event
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.initialized.store(false, Ordering::Release);
        stop_worker(worker);

        self.shared.dispatcher.log_event(
            &Event::new(
                EventKind::System,
                Severity::Info,
                "PerformanceMonitorShutdown",
                "Performance monitoring shut down",
            )
            .with_number("ticks", self.shared.tick.load(Ordering::Acquire) as f64),
        );
        info!("Performance sampler stopped");
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Retime the running loop; the next tick is one new interval from now
    pub fn set_interval(&self, interval: SamplingInterval) {
        let period = interval.duration();
        let previous = std::mem::replace(&mut *self.interval.lock(), period);

        let Some(command_tx) = self
            .worker
            .lock()
            .as_ref()
            .map(|worker| worker.command_tx.clone())
        else {
            return;
        };
        if command_tx.send(SamplerCommand::SetInterval(period)).is_err() {
            warn!("Sampler worker gone, interval change dropped");
            return;
        }

        self.shared.dispatcher.log_event(
            &Event::new(
                EventKind::System,
                Severity::Info,
                "PerformanceMonitorIntervalChanged",
                format!(
                    "Sampling interval changed from {}ms to {}ms",
                    previous.as_millis(),
                    period.as_millis()
                ),
            )
            .with_number("previous_interval_ms", previous.as_millis() as f64)
            .with_number("interval_ms", period.as_millis() as f64),
        );
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Applies from the next tick
    pub fn set_categories(&self, categories: CategoryFlags) {
        *self.shared.categories.write() = categories;
    }

    pub fn categories(&self) -> CategoryFlags {
        *self.shared.categories.read()
    }

    pub fn enable_cpu(&self, enabled: bool) {
        self.shared.categories.write().cpu = enabled;
    }

    pub fn enable_memory(&self, enabled: bool) {
        self.shared.categories.write().memory = enabled;
    }

    pub fn enable_disk(&self, enabled: bool) {
        self.shared.categories.write().disk = enabled;
    }

    pub fn enable_network(&self, enabled: bool) {
        self.shared.categories.write().network = enabled;
    }

    pub fn enable_gpu(&self, enabled: bool) {
        self.shared.categories.write().gpu = enabled;
    }

    /// Run one tick on the calling thread; None when not initialized
    pub fn sample_now(&self) -> Option<PerformanceSnapshot> {
        self.is_initialized().then(|| self.shared.tick())
    }

    pub fn current_performance(&self) -> Option<PerformanceSnapshot> {
        self.shared.latest.read().clone()
    }

    pub fn register_performance_callback<F>(&self, callback: F) -> HandleId
    where
        F: Fn(&PerformanceSnapshot) + Send + Sync + 'static,
    {
        self.shared.subscribers.register(Arc::new(callback))
    }

    pub fn unregister_performance_callback(&self, id: HandleId) -> bool {
        self.shared.subscribers.remove(id)
    }

    /// Fire when total CPU percent is above `limit`
    pub fn set_cpu_threshold<F>(&self, limit: f64, callback: F) -> HandleId
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.add_threshold(ThresholdMetric::Cpu, limit, Box::new(callback))
    }

    /// Fire when physical memory percent is above `limit`
    pub fn set_memory_threshold<F>(&self, limit: f64, callback: F) -> HandleId
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.add_threshold(ThresholdMetric::Memory, limit, Box::new(callback))
    }

    fn add_threshold(
        &self,
        metric: ThresholdMetric,
        limit: f64,
        callback: Box<ThresholdCallback>,
    ) -> HandleId {
        self.shared.thresholds.register(Arc::new(PerformanceThreshold {
            metric,
            limit,
            callback,
        }))
    }

    /// Remove a CPU or memory threshold
    pub fn remove_threshold(&self, id: HandleId) -> bool {
        self.shared.thresholds.remove(id)
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            warn!("PerformanceMonitor dropped without shutdown, stopping sampler");
            stop_worker(worker);
        }
    }
}

fn stop_worker(worker: SamplerWorker) {
    let _ = worker.command_tx.send(SamplerCommand::Shutdown);
    // A callback that shuts the monitor down runs on the worker itself
    if worker.handle.thread().id() == thread::current().id() {
        return;
    }
    if worker.handle.join().is_err() {
        warn!("Sampler worker panicked");
    }
}

fn run_sampler_loop(shared: Arc<Sampling>, commands: Receiver<SamplerCommand>, mut period: Duration) {
    loop {
        match commands.recv() {
            Ok(SamplerCommand::Start) => break,
            Ok(SamplerCommand::SetInterval(new_period)) => period = new_period,
            Ok(SamplerCommand::Shutdown) | Err(_) => return,
        }
    }

    let mut next_tick = Instant::now();
    loop {
        if Instant::now() >= next_tick {
            shared.tick();
            next_tick = Instant::now() + period;
        }

        match commands.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
            Ok(SamplerCommand::SetInterval(new_period)) => {
                debug!(interval_ms = new_period.as_millis() as u64, "Sampler retimed");
                period = new_period;
                next_tick = Instant::now() + period;
            }
            Ok(SamplerCommand::Start) => {}
            Ok(SamplerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

impl Sampling {
    fn tick(&self) -> PerformanceSnapshot {
        let snapshot = {
            let _guard = self.tick_lock.lock();
            let categories = *self.categories.read();
            let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;

            let snapshot = PerformanceSnapshot {
                tick,
                timestamp: SystemTime::now(),
                cpu: categories.cpu.then(|| self.source.cpu()).flatten(),
                memory: categories.memory.then(|| self.source.memory()).flatten(),
                disk: categories.disk.then(|| self.source.disk()).flatten(),
                network: categories.network.then(|| self.source.network()).flatten(),
                gpu: categories.gpu.then(|| self.source.gpu()).flatten(),
            };
            *self.latest.write() = Some(snapshot.clone());
            snapshot
        };

        self.emit_update(&snapshot);
        self.check_thresholds(&snapshot);
        self.notify_subscribers(&snapshot);
        snapshot
    }

    fn emit_update(&self, snapshot: &PerformanceSnapshot) {
        let mut event = Event::new(
            EventKind::Performance,
            Severity::Info,
            "PerformanceUpdate",
            "Performance information updated",
        )
        .with_number("tick", snapshot.tick as f64)
        .with_number("cpu_usage", snapshot.cpu_percent())
        .with_number("memory_usage", snapshot.memory_percent());

        if let Some(disk) = &snapshot.disk {
            event = event.with_number("disk_usage", disk.usage_percent());
        }
        if let Some(network) = &snapshot.network {
            event = event.with_number("network_rate", network.total_rate());
        }
        if let Some(gpu) = &snapshot.gpu {
            event = event
                .with_number("gpu_usage", gpu.usage_percent())
                .with_number("gpu_memory_usage", gpu.memory_percent());
        }
        self.dispatcher.log_event(&event);
    }

    fn check_thresholds(&self, snapshot: &PerformanceSnapshot) {
        let cpu = snapshot.cpu.as_ref().map(|c| c.total_percent);
        let memory = snapshot.memory.as_ref().map(MemoryUsage::physical_percent);

        for (id, threshold) in self.thresholds.snapshot() {
            let value = match threshold.metric {
                ThresholdMetric::Cpu => cpu,
                ThresholdMetric::Memory => memory,
            };
            let Some(value) = value.filter(|v| *v > threshold.limit) else {
                continue;
            };
            let callback = &threshold.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                warn!(threshold = id, metric = ?threshold.metric, "Threshold callback panicked");
            }
        }
    }

    fn notify_subscribers(&self, snapshot: &PerformanceSnapshot) {
        for (id, callback) in self.subscribers.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                warn!(subscriber = id, "Performance callback panicked");
            }
        }
    }
}
