/*!
 * Dispatcher
 * Central fan-out of events to channels and callbacks
 *
 * - Global minimum severity applied before any channel sees an event
 * - Channels receive events synchronously, in registration order
 * - Callbacks run after the channels, each isolated from the others
 * - Delivery failures are counted and logged, never returned to producers
 */

use crate::core::config::MonitoringConfig;
use crate::core::errors::{MonitoringError, MonitoringResult};
use crate::core::limits::{DEFAULT_MEMORY_CHANNEL_CAPACITY, SLOW_CHANNEL_SEND};
use crate::core::registry::HandleRegistry;
use crate::core::types::{HandleId, SourceLocation};
use crate::monitoring::channels::{Channel, FileChannel, MemoryChannel};
use crate::monitoring::events::{Event, EventKind, Severity};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Subscriber invoked for every accepted event
pub type EventCallback = dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync;

type ChannelList = Vec<Arc<dyn Channel>>;

#[derive(Debug, Default)]
struct DispatchCounters {
    accepted: AtomicU64,
    filtered: AtomicU64,
    channel_failures: AtomicU64,
    callback_failures: AtomicU64,
    slow_sends: AtomicU64,
}

/// Delivery counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub accepted: u64,
    pub filtered: u64,
    pub channel_failures: u64,
    pub callback_failures: u64,
    pub slow_sends: u64,
}

/// Registry of channels and event callbacks
///
/// Shared as `Arc<MonitoringSystem>` by every producer. Channel list
/// mutations are serialized; fan-out reads a snapshot under the shared side
/// of the delivery gate. A removed channel is shut down only after the
/// exclusive side has been taken once, so no producer still holds it.
/// Channels must not call back into the dispatcher's shutdown or
/// unregister paths from `send_event`.
pub struct MonitoringSystem {
    initialized: AtomicBool,
    min_severity: AtomicU8,
    channels: ArcSwap<ChannelList>,
    registry_lock: Mutex<()>,
    delivery: RwLock<()>,
    callbacks: HandleRegistry<EventCallback>,
    memory_channel: RwLock<Option<Arc<MemoryChannel>>>,
    counters: DispatchCounters,
    slow_send: Duration,
}

impl MonitoringSystem {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            min_severity: AtomicU8::new(Severity::Info as u8),
            channels: ArcSwap::from_pointee(Vec::new()),
            registry_lock: Mutex::new(()),
            delivery: RwLock::new(()),
            callbacks: HandleRegistry::new(),
            memory_channel: RwLock::new(None),
            counters: DispatchCounters::default(),
            slow_send: SLOW_CHANNEL_SEND,
        }
    }

    /// Sends slower than `threshold` are counted in `slow_sends` and logged
    pub fn with_slow_send_warning(mut self, threshold: Duration) -> Self {
        self.slow_send = threshold;
        self
    }

    /// Start with a default in-memory channel and an optional file channel
    ///
    /// Idempotent. If the file cannot be opened nothing is registered and
    /// the dispatcher stays uninitialized.
    pub fn initialize(
        &self,
        log_path: Option<&Path>,
        min_severity: Severity,
    ) -> MonitoringResult<()> {
        self.start(log_path, min_severity, DEFAULT_MEMORY_CHANNEL_CAPACITY)
    }

    pub fn initialize_with(&self, config: &MonitoringConfig) -> MonitoringResult<()> {
        config.validate()?;
        self.start(
            config.log_path.as_deref(),
            config.min_severity,
            config.memory_channel_capacity,
        )
    }

    fn start(
        &self,
        log_path: Option<&Path>,
        min_severity: Severity,
        capacity: usize,
    ) -> MonitoringResult<()> {
        {
            let _guard = self.registry_lock.lock();
            if self.initialized.load(Ordering::Acquire) {
                return Ok(());
            }

            let memory = Arc::new(MemoryChannel::new(capacity, min_severity));
            memory.initialize()?;
            let mut channels: ChannelList = Vec::new();
            channels.push(memory.clone());

            if let Some(path) = log_path {
                let file = Arc::new(FileChannel::with_min_severity(path, min_severity));
                if let Err(e) = file.initialize() {
                    let _ = memory.shutdown();
                    warn!(path = %path.display(), error = %e, "Monitoring file channel unavailable");
                    return Err(e);
                }
                channels.push(file);
            }

            self.min_severity.store(min_severity as u8, Ordering::Release);
            self.channels.store(Arc::new(channels));
            *self.memory_channel.write() = Some(memory);
            self.initialized.store(true, Ordering::Release);
        }

        info!(min_severity = %min_severity, "Monitoring system initialized");
        self.log(
            EventKind::System,
            Severity::Info,
            "MonitoringSystemInitialized",
            "Monitoring system initialized",
            None,
        );
        Ok(())
    }

    /// Close every channel in reverse registration order and drop callbacks
    pub fn shutdown(&self) {
        if !self.is_initialized() {
            return;
        }

        self.log(
            EventKind::System,
            Severity::Info,
            "MonitoringSystemShutdown",
            "Monitoring system shutting down",
            None,
        );

        let channels = {
            let _guard = self.registry_lock.lock();
            if !self.initialized.swap(false, Ordering::AcqRel) {
                return;
            }
            *self.memory_channel.write() = None;
            self.channels.swap(Arc::new(Vec::new()))
        };
        self.drain_deliveries();

        for channel in channels.iter().rev() {
            if let Err(e) = channel.shutdown() {
                warn!(channel = %channel.name(), error = %e, "Channel shutdown failed");
            }
        }
        self.callbacks.clear();
        info!("Monitoring system shut down");
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Initialize and append a channel
    ///
    /// Fails when the dispatcher is not running, the name is taken, or the
    /// channel's own initialization fails.
    pub fn register_channel(&self, channel: Arc<dyn Channel>) -> MonitoringResult<()> {
        let name = channel.name();
        let outcome = {
            let _guard = self.registry_lock.lock();
            if !self.is_initialized() {
                return Err(MonitoringError::NotInitialized("MonitoringSystem".into()));
            }

            let current = self.channels.load_full();
            if current.iter().any(|c| c.name() == name) {
                return Err(MonitoringError::DuplicateChannel(name));
            }

            channel.initialize().map(|()| {
                let mut next: ChannelList = current.as_ref().clone();
                next.push(channel);
                self.channels.store(Arc::new(next));
            })
        };

        match &outcome {
            Ok(()) => debug!(channel = %name, "Channel registered"),
            Err(e) => {
                warn!(channel = %name, error = %e, "Channel failed to initialize");
                self.log_event(
                    &Event::new(
                        EventKind::System,
                        Severity::Warning,
                        "ChannelRegistrationFailed",
                        e.to_string(),
                    )
                    .with_text("channel", name.as_str()),
                );
            }
        }
        outcome
    }

    /// Remove and shut down a channel by name; false when absent
    pub fn unregister_channel(&self, name: &str) -> bool {
        let removed = {
            let _guard = self.registry_lock.lock();
            let current = self.channels.load_full();
            let Some(pos) = current.iter().position(|c| c.name() == name) else {
                return false;
            };
            let mut next: ChannelList = current.as_ref().clone();
            let removed = next.remove(pos);
            self.channels.store(Arc::new(next));
            removed
        };
        self.drain_deliveries();

        {
            let mut memory = self.memory_channel.write();
            if memory.as_ref().is_some_and(|m| m.name() == name) {
                *memory = None;
            }
        }

        if let Err(e) = removed.shutdown() {
            warn!(channel = %name, error = %e, "Channel shutdown failed");
        }
        debug!(channel = %name, "Channel unregistered");
        true
    }

    /// Wait for every send that may still hold a replaced channel list
    fn drain_deliveries(&self) {
        drop(self.delivery.write());
    }

    /// Names in registration order
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.load().iter().map(|c| c.name()).collect()
    }

    /// Typed handle to the default in-memory channel
    pub fn memory_channel(&self) -> Option<Arc<MemoryChannel>> {
        self.memory_channel.read().clone()
    }

    /// Deliver an event; returns whether it passed the global filter
    pub fn log_event(&self, event: &Event) -> bool {
        if !self.is_initialized() {
            return false;
        }
        if event.severity() < self.min_severity() {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);

        // Recursive: a channel may log from send_event while a writer waits
        let gate = self.delivery.read_recursive();
        let channels = self.channels.load_full();
        for channel in channels.iter() {
            let started = Instant::now();
            if let Err(e) = channel.send_event(event) {
                self.counters.channel_failures.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %channel.name(), event = event.name(), error = %e, "Channel delivery failed");
            }
            let elapsed = started.elapsed();
            if elapsed > self.slow_send {
                self.counters.slow_sends.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = %channel.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow channel delivery"
                );
            }
        }
        drop(channels);
        drop(gate);

        for (id, callback) in self.callbacks.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.counters.callback_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(callback = id, error = %e, "Event callback failed");
                }
                Err(_) => {
                    self.counters.callback_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(callback = id, "Event callback panicked");
                }
            }
        }
        true
    }

    /// Build and deliver an event
    pub fn log(
        &self,
        kind: EventKind,
        severity: Severity,
        name: &str,
        description: &str,
        location: Option<SourceLocation>,
    ) -> bool {
        if !self.is_initialized() {
            return false;
        }
        if severity < self.min_severity() {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.log_event(&Event::new(kind, severity, name, description).with_optional_location(location))
    }

    /// Cheap pre-check for producers that build costly events
    #[inline]
    pub fn accepts(&self, severity: Severity) -> bool {
        self.is_initialized() && severity >= self.min_severity()
    }

    pub fn set_min_severity(&self, severity: Severity) {
        self.min_severity.store(severity as u8, Ordering::Release);
    }

    #[inline]
    pub fn min_severity(&self) -> Severity {
        Severity::from_u8(self.min_severity.load(Ordering::Acquire))
    }

    pub fn register_event_callback<F>(&self, callback: F) -> HandleId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register(Arc::new(callback))
    }

    pub fn unregister_event_callback(&self, id: HandleId) -> bool {
        self.callbacks.remove(id)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            channel_failures: self.counters.channel_failures.load(Ordering::Relaxed),
            callback_failures: self.counters.callback_failures.load(Ordering::Relaxed),
            slow_sends: self.counters.slow_sends.load(Ordering::Relaxed),
        }
    }
}

impl Default for MonitoringSystem {
    fn default() -> Self {
        Self::new()
    }
}
