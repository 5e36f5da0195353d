/*!
 * Monitoring Facade
 * One handle owning the dispatcher and every producer built on it
 */

use crate::core::config::MonitoringConfig;
use crate::core::errors::MonitoringResult;
use crate::monitoring::dispatcher::MonitoringSystem;
use crate::monitoring::memory::MemoryTracker;
use crate::monitoring::sampler::{PerformanceMonitor, SamplingInterval};
use crate::monitoring::tracer::EventTracker;
use std::sync::Arc;
use tracing::info;

/// Dispatcher plus allocation tracker, call tracer and optional sampler
pub struct Monitoring {
    pub dispatcher: Arc<MonitoringSystem>,
    pub memory: Arc<MemoryTracker>,
    pub tracker: Arc<EventTracker>,
    pub performance: Option<Arc<PerformanceMonitor>>,
}

impl Monitoring {
    /// Build and initialize every service from `config`
    ///
    /// The sampler is only started when `sampler_enabled` is set.
    pub fn start(config: &MonitoringConfig) -> MonitoringResult<Self> {
        let dispatcher = Arc::new(MonitoringSystem::new());
        dispatcher.initialize_with(config)?;

        let memory = Arc::new(MemoryTracker::new(Arc::clone(&dispatcher)));
        memory.set_system_memory_baseline(config.system_memory_baseline);
        memory.initialize(config.capture_callsites, config.track_system_allocations);

        let tracker = Arc::new(EventTracker::new(Arc::clone(&dispatcher)));
        tracker.set_report_threshold(config.function_report_threshold);
        tracker.initialize(config.tracing_enabled);

        let performance = if config.sampler_enabled {
            let monitor = Arc::new(PerformanceMonitor::new(Arc::clone(&dispatcher)));
            if let Err(e) = monitor.initialize(
                SamplingInterval::from_duration(config.sampling_interval),
                config.categories,
            ) {
                tracker.shutdown();
                memory.shutdown();
                dispatcher.shutdown();
                return Err(e);
            }
            Some(monitor)
        } else {
            None
        };

        info!(sampler = performance.is_some(), "Monitoring started");
        Ok(Self {
            dispatcher,
            memory,
            tracker,
            performance,
        })
    }

    /// Stop producers first and the dispatcher last
    pub fn shutdown(&self) {
        if let Some(performance) = &self.performance {
            performance.shutdown();
        }
        self.tracker.shutdown();
        self.memory.shutdown();
        self.dispatcher.shutdown();
        info!("Monitoring stopped");
    }
}
