/*!
 * Metrics Sampler Tests
 */

use core_monitoring::monitoring::sampler::{GpuStats, GpuUsage, NetworkUsage, InterfaceStats};
use core_monitoring::{
    CategoryFlags, MonitoringSystem, PerformanceMonitor, SamplingInterval, Severity, StaticSource,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_update_event_includes_optional_categories() {
    let source = Arc::new(
        StaticSource::new()
            .with_cpu(40.0)
            .with_memory(3, 4)
            .with_network(NetworkUsage {
                interfaces: vec![InterfaceStats {
                    name: "eth0".into(),
                    receive_rate: 1000.0,
                    send_rate: 500.0,
                    ..Default::default()
                }],
            })
            .with_gpu(GpuUsage {
                gpus: vec![GpuStats {
                    name: "gpu0".into(),
                    usage_percent: 30.0,
                    memory_total: 8,
                    memory_used: 2,
                }],
            }),
    );
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Info).unwrap();
    let monitor = PerformanceMonitor::with_source(dispatcher.clone(), source);
    monitor
        .initialize(SamplingInterval::VerySlow, CategoryFlags::all())
        .unwrap();
    assert!(wait_until(|| monitor.current_performance().is_some()));
    monitor.shutdown();

    let memory = dispatcher.memory_channel().unwrap();
    let update = &memory.events_by_name("PerformanceUpdate")[0];
    assert_eq!(update.number("cpu_usage"), Some(40.0));
    assert_eq!(update.number("memory_usage"), Some(75.0));
    assert_eq!(update.number("network_rate"), Some(1500.0));
    assert_eq!(update.number("gpu_usage"), Some(30.0));
    assert_eq!(update.number("gpu_memory_usage"), Some(25.0));
    assert!(update.number("disk_usage").is_none());
}

#[test]
fn test_threshold_tracks_changing_source() {
    let source = Arc::new(StaticSource::new().with_cpu(10.0));
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Info).unwrap();
    let monitor = PerformanceMonitor::with_source(dispatcher, source.clone());
    monitor
        .initialize(SamplingInterval::VerySlow, CategoryFlags::all())
        .unwrap();
    assert!(wait_until(|| monitor.current_performance().is_some()));

    let hits = Arc::new(Mutex::new(Vec::new()));
    let h = hits.clone();
    monitor.set_cpu_threshold(50.0, move |value| h.lock().push(value));

    monitor.sample_now();
    assert!(hits.lock().is_empty());

    source.set_cpu(95.0);
    let snapshot = monitor.sample_now().unwrap();
    assert_eq!(snapshot.cpu_percent(), 95.0);
    assert_eq!(*hits.lock(), vec![95.0]);
    assert_eq!(monitor.current_performance().unwrap().tick, snapshot.tick);
    monitor.shutdown();
}

#[test]
fn test_fast_interval_keeps_ticking() {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Info).unwrap();
    let monitor = PerformanceMonitor::with_source(
        dispatcher,
        Arc::new(StaticSource::new().with_cpu(1.0)),
    );

    let ticks = Arc::new(Mutex::new(Vec::new()));
    let t = ticks.clone();
    monitor.register_performance_callback(move |snapshot| t.lock().push(snapshot.tick));

    monitor
        .initialize(SamplingInterval::Custom(Duration::from_millis(10)), CategoryFlags::all())
        .unwrap();
    assert!(wait_until(|| ticks.lock().len() >= 3));
    monitor.shutdown();

    let after_shutdown = ticks.lock().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.lock().len(), after_shutdown);
    let ticks = ticks.lock();
    assert!(ticks.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_drop_without_shutdown_stops_worker() {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Info).unwrap();
    let count = Arc::new(Mutex::new(0u32));
    {
        let monitor = PerformanceMonitor::with_source(
            dispatcher.clone(),
            Arc::new(StaticSource::new()),
        );
        let c = count.clone();
        monitor.register_performance_callback(move |_| *c.lock() += 1);
        monitor
            .initialize(SamplingInterval::Custom(Duration::from_millis(5)), CategoryFlags::none())
            .unwrap();
        assert!(wait_until(|| *count.lock() >= 1));
    }
    let settled = *count.lock();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(*count.lock(), settled);
}
