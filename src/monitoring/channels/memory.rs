/*!
 * In-Memory Channel
 * Bounded FIFO of recent events with simple queries
 */

use super::{Channel, ChannelState};
use crate::core::errors::{MonitoringError, MonitoringResult};
use crate::core::limits::{DEFAULT_MEMORY_CHANNEL_CAPACITY, DEFAULT_MEMORY_CHANNEL_NAME};
use crate::monitoring::events::{Event, EventFilter, EventKind, Severity};
use parking_lot::Mutex;
use std::collections::VecDeque;

struct Buffer {
    state: ChannelState,
    events: VecDeque<Event>,
}

/// Ring of the most recent accepted events; oldest evicted past capacity
pub struct MemoryChannel {
    name: String,
    capacity: usize,
    min_severity: Severity,
    inner: Mutex<Buffer>,
}

impl MemoryChannel {
    pub fn new(capacity: usize, min_severity: Severity) -> Self {
        Self::named(DEFAULT_MEMORY_CHANNEL_NAME, capacity, min_severity)
    }

    /// A zero capacity is raised to one
    pub fn named(name: impl Into<String>, capacity: usize, min_severity: Severity) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            min_severity,
            inner: Mutex::new(Buffer {
                state: ChannelState::Uninitialized,
                events: VecDeque::with_capacity(capacity.min(DEFAULT_MEMORY_CHANNEL_CAPACITY)),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered events, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.iter().cloned().collect()
    }

    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.matches(filter))
            .cloned()
            .collect()
    }

    pub fn events_by_kind(&self, kind: EventKind) -> Vec<Event> {
        self.query(&EventFilter::new().kind(kind))
    }

    /// Events at or above `min`
    pub fn events_by_min_severity(&self, min: Severity) -> Vec<Event> {
        self.query(&EventFilter::new().severity(min))
    }

    pub fn events_by_name(&self, name: &str) -> Vec<Event> {
        self.query(&EventFilter::new().name(name))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CHANNEL_CAPACITY, Severity::Debug)
    }
}

impl Channel for MemoryChannel {
    fn initialize(&self) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == ChannelState::Closed {
            return Err(MonitoringError::ChannelClosed(self.name.clone()));
        }
        inner.state = ChannelState::Initialized;
        Ok(())
    }

    fn shutdown(&self) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        inner.state = ChannelState::Closed;
        inner.events.clear();
        Ok(())
    }

    fn send_event(&self, event: &Event) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        inner.state.ensure_open(&self.name)?;

        if event.severity() < self.min_severity {
            return Ok(());
        }

        while inner.events.len() >= self.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn state(&self) -> ChannelState {
        self.inner.lock().state
    }
}
