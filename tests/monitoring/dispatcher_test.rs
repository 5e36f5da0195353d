/*!
 * Dispatcher Tests
 */

use core_monitoring::{
    Channel, ChannelState, Event, EventKind, MemoryChannel, MonitoringConfig, MonitoringError,
    MonitoringResult, MonitoringSystem, Severity, SourceLocation,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn dispatcher(min: Severity) -> Arc<MonitoringSystem> {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, min).unwrap();
    dispatcher
}

#[test]
fn test_global_filter_runs_before_channels() {
    let dispatcher = dispatcher(Severity::Warning);
    let channel = Arc::new(MemoryChannel::named("scenario", 2, Severity::Info));
    dispatcher.register_channel(channel.clone()).unwrap();
    // The Info startup event was already dropped by the Warning minimum
    let filtered_at_start = dispatcher.stats().filtered;
    assert_eq!(filtered_at_start, 1);

    assert!(!dispatcher.log(EventKind::User, Severity::Info, "first", "info", None));
    assert!(dispatcher.log(EventKind::User, Severity::Warning, "second", "warning", None));
    assert!(dispatcher.log(EventKind::User, Severity::Error, "third", "error", None));

    let severities: Vec<Severity> = channel.events().iter().map(|e| e.severity()).collect();
    assert_eq!(severities, vec![Severity::Warning, Severity::Error]);
    assert_eq!(dispatcher.stats().filtered, filtered_at_start + 1);
}

#[test]
fn test_lowering_min_severity_at_runtime() {
    let dispatcher = dispatcher(Severity::Error);
    assert!(!dispatcher.accepts(Severity::Info));
    dispatcher.set_min_severity(Severity::Debug);
    assert!(dispatcher.accepts(Severity::Info));
    assert!(dispatcher.log(EventKind::Debug, Severity::Debug, "verbose", "", None));
}

#[test]
fn test_failing_callbacks_do_not_block_delivery() {
    let dispatcher = dispatcher(Severity::Info);
    let seen = Arc::new(Mutex::new(Vec::new()));

    dispatcher.register_event_callback(|_| Err(anyhow::anyhow!("rejected")));
    dispatcher.register_event_callback(|_| panic!("callback failure"));
    let s = seen.clone();
    dispatcher.register_event_callback(move |event| {
        s.lock().push(event.name().to_string());
        Ok(())
    });

    let location = SourceLocation::new("dispatcher_test.rs", 42, "deliver");
    assert!(dispatcher.log(EventKind::User, Severity::Info, "Delivered", "ok", Some(location)));

    assert_eq!(*seen.lock(), vec!["Delivered".to_string()]);
    let memory = dispatcher.memory_channel().unwrap();
    let stored = &memory.events_by_name("Delivered")[0];
    assert_eq!(stored.location().unwrap().line, 42);
    assert_eq!(dispatcher.stats().callback_failures, 2);
}

#[test]
fn test_unregistered_callback_stops_receiving() {
    let dispatcher = dispatcher(Severity::Info);
    let count = Arc::new(Mutex::new(0));
    let c = count.clone();
    let id = dispatcher.register_event_callback(move |_| {
        *c.lock() += 1;
        Ok(())
    });

    dispatcher.log(EventKind::User, Severity::Info, "a", "", None);
    assert!(dispatcher.unregister_event_callback(id));
    assert!(!dispatcher.unregister_event_callback(id));
    dispatcher.log(EventKind::User, Severity::Info, "b", "", None);
    assert_eq!(*count.lock(), 1);
}

#[test]
fn test_channel_registry() {
    let dispatcher = dispatcher(Severity::Info);
    let extra = Arc::new(MemoryChannel::named("extra", 8, Severity::Trace));
    dispatcher.register_channel(extra.clone()).unwrap();

    let duplicate = Arc::new(MemoryChannel::named("extra", 8, Severity::Trace));
    assert!(matches!(
        dispatcher.register_channel(duplicate),
        Err(MonitoringError::DuplicateChannel(_))
    ));
    assert_eq!(dispatcher.channel_names(), vec!["MemoryChannel", "extra"]);

    assert!(dispatcher.unregister_channel("extra"));
    assert!(!dispatcher.unregister_channel("extra"));
    assert!(extra.send_event(&core_monitoring::Event::new(
        EventKind::User,
        Severity::Info,
        "late",
        ""
    ))
    .is_err());
}

#[test]
fn test_register_requires_running_dispatcher() {
    let dispatcher = MonitoringSystem::new();
    let result = dispatcher.register_channel(Arc::new(MemoryChannel::default()));
    assert!(matches!(result, Err(MonitoringError::NotInitialized(_))));
    assert!(!dispatcher.log(EventKind::User, Severity::Critical, "ignored", "", None));
}

#[test]
fn test_initialize_with_file_channel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("monitor.log");
    let mut config = MonitoringConfig::minimal();
    config.min_severity = Severity::Info;
    config.log_path = Some(path.clone());

    let dispatcher = MonitoringSystem::new();
    dispatcher.initialize_with(&config).unwrap();
    assert_eq!(dispatcher.channel_names().len(), 2);
    dispatcher.log(EventKind::Network, Severity::Error, "Timeout", "peer slow", None);
    dispatcher.shutdown();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines.first().unwrap().starts_with("=== Monitoring Session Started at"));
    assert!(lines.iter().any(|l| l.contains("[ERROR] [NETWORK]") && l.contains("Timeout: peer slow")));
    assert!(lines.last().unwrap().starts_with("=== Monitoring Session Ended at"));
}

#[test]
fn test_invalid_config_leaves_dispatcher_stopped() {
    let mut config = MonitoringConfig::minimal();
    config.memory_channel_capacity = 0;
    let dispatcher = MonitoringSystem::new();
    assert!(matches!(
        dispatcher.initialize_with(&config),
        Err(MonitoringError::Configuration(_))
    ));
    assert!(!dispatcher.is_initialized());
}

/// Counts sends that arrive after shutdown
#[derive(Default)]
struct StrictChannel {
    name: String,
    closed: AtomicBool,
    sent: AtomicU64,
    late: AtomicU64,
}

impl StrictChannel {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Channel for StrictChannel {
    fn initialize(&self) -> MonitoringResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> MonitoringResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send_event(&self, _event: &Event) -> MonitoringResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            self.late.fetch_add(1, Ordering::SeqCst);
            return Err(MonitoringError::ChannelClosed(self.name.clone()));
        }
        // Widen the window between the snapshot load and the write
        thread::yield_now();
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn min_severity(&self) -> Severity {
        Severity::Trace
    }

    fn state(&self) -> ChannelState {
        if self.closed.load(Ordering::SeqCst) {
            ChannelState::Closed
        } else {
            ChannelState::Initialized
        }
    }
}

fn spawn_producers(dispatcher: &Arc<MonitoringSystem>, stop: &Arc<AtomicBool>) -> Vec<thread::JoinHandle<()>> {
    (0..4)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    dispatcher.log(EventKind::User, Severity::Info, "Load", &format!("producer {i}"), None);
                }
            })
        })
        .collect()
}

#[test]
fn test_no_send_after_shutdown_under_load() {
    for _ in 0..20 {
        let dispatcher = dispatcher(Severity::Info);
        let channel = Arc::new(StrictChannel::named("strict"));
        dispatcher.register_channel(channel.clone()).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let producers = spawn_producers(&dispatcher, &stop);
        thread::sleep(Duration::from_millis(2));
        dispatcher.shutdown();
        stop.store(true, Ordering::Relaxed);
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(channel.late.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().channel_failures, 0);
    }
}

#[test]
fn test_no_send_after_unregister_under_load() {
    for _ in 0..20 {
        let dispatcher = dispatcher(Severity::Info);
        let channel = Arc::new(StrictChannel::named("strict"));
        dispatcher.register_channel(channel.clone()).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let producers = spawn_producers(&dispatcher, &stop);
        thread::sleep(Duration::from_millis(2));
        assert!(dispatcher.unregister_channel("strict"));
        let sent_at_close = channel.sent.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        stop.store(true, Ordering::Relaxed);
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(channel.late.load(Ordering::SeqCst), 0);
        assert_eq!(channel.sent.load(Ordering::SeqCst), sent_at_close);
        dispatcher.shutdown();
    }
}
