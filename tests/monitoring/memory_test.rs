/*!
 * Allocation Tracker Tests
 */

use core_monitoring::{
    EventKind, MemoryTracker, Monitoring, MonitoringConfig, MonitoringSystem, Severity,
    SizeCategory, TrackedBox,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn tracker() -> (Arc<MonitoringSystem>, Arc<MemoryTracker>) {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Trace).unwrap();
    let tracker = Arc::new(MemoryTracker::new(dispatcher.clone()));
    tracker.initialize(false, false);
    (dispatcher, tracker)
}

#[test]
fn test_reused_address_replaces_record() {
    let (_d, tracker) = tracker();
    tracker.track_allocation(0x1000, 4096, Some("net"));
    tracker.track_allocation(0x1000, 8192, Some("net"));

    let stats = tracker.stats();
    assert_eq!(stats.active_allocations, 1);
    assert_eq!(stats.current_usage, 8192);
    assert_eq!(stats.peak_usage, 8192);
    assert_eq!(tracker.live_allocations().len(), 1);
}

#[test]
fn test_threshold_not_retriggered_by_release() {
    let (_d, tracker) = tracker();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();
    tracker.set_memory_threshold(1000, move |usage| c.lock().push(usage));

    tracker.track_allocation(0xA, 1500, None);
    tracker.track_deallocation(0xA);

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0] >= 1000);
}

#[test]
fn test_allocation_events_carry_fields() {
    let (dispatcher, tracker) = tracker();
    tracker.track_allocation(0xbeef, 300, Some("buffers"));
    assert!(tracker.track_deallocation(0xbeef));

    let memory = dispatcher.memory_channel().unwrap();
    let alloc = &memory.events_by_name("MemoryAllocation")[0];
    assert_eq!(alloc.kind(), EventKind::Memory);
    assert_eq!(alloc.number("size"), Some(300.0));
    assert_eq!(alloc.text("address"), Some("0xbeef"));
    assert_eq!(alloc.text("tag"), Some("buffers"));

    let free = &memory.events_by_name("MemoryDeallocation")[0];
    assert_eq!(free.number("current_usage"), Some(0.0));
}

#[test]
fn test_concurrent_tracking_balances() {
    let (_d, tracker) = tracker();
    let workers: Vec<_> = (0..4usize)
        .map(|t| {
            let tracker = tracker.clone();
            thread::spawn(move || {
                for i in 0..250usize {
                    let address = (t << 20) | (i << 4);
                    tracker.track_allocation(address, 64, Some("worker"));
                    if i % 2 == 0 {
                        tracker.track_deallocation(address);
                    }
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let stats = tracker.stats();
    assert_eq!(stats.allocation_count, 1000);
    assert_eq!(stats.deallocation_count, 500);
    assert_eq!(stats.current_usage, 500 * 64);
    assert_eq!(stats.count_by_tag.get("worker"), Some(&500));
    assert_eq!(stats.current_usage, stats.total_allocated - stats.total_deallocated);
}

#[test]
fn test_leak_scan_reports_old_large_blocks() {
    let (dispatcher, tracker) = tracker();
    tracker.track_allocation(0x1, 2048, Some("cache"));
    thread::sleep(Duration::from_millis(15));

    assert_eq!(tracker.check_memory_leaks(1024, Duration::from_millis(10)), 1);
    assert_eq!(tracker.check_memory_leaks(4096, Duration::ZERO), 0);

    let memory = dispatcher.memory_channel().unwrap();
    let leak = &memory.events_by_name("PotentialMemoryLeak")[0];
    assert_eq!(leak.severity(), Severity::Warning);
    assert_eq!(leak.text("tag"), Some("cache"));
}

#[test]
fn test_detailed_report_lists_largest_first() {
    let (dispatcher, tracker) = tracker();
    for (i, size) in [16usize, 4096, 512, 2 * 1024 * 1024].iter().enumerate() {
        tracker.track_allocation(0x100 + i, *size, None);
    }

    let report = tracker.create_memory_report(true);
    let sizes: Vec<usize> = report.largest.iter().map(|r| r.size).collect();
    assert_eq!(sizes, vec![2 * 1024 * 1024, 4096, 512, 16]);
    assert_eq!(report.by_size.len(), SizeCategory::ALL.len());
    assert!(report.size_details().contains("Huge (>1MB): 1 allocations"));

    let memory = dispatcher.memory_channel().unwrap();
    let summary = &memory.events_by_name("MemoryReport")[0];
    assert_eq!(summary.number("active_allocations"), Some(4.0));
}

#[test]
fn test_tracked_box_through_facade() {
    let monitoring = Monitoring::start(&MonitoringConfig::minimal()).unwrap();
    {
        let _a = TrackedBox::tagged(vec![1u8; 4], monitoring.memory.clone(), "vec");
        let _b = TrackedBox::tagged([0u64; 8], monitoring.memory.clone(), "array");
        let stats = monitoring.memory.stats();
        assert_eq!(stats.active_allocations, 2);
        assert_eq!(stats.usage_by_tag.get("array"), Some(&64));
    }
    assert_eq!(monitoring.memory.stats().current_usage, 0);
    monitoring.shutdown();
}
