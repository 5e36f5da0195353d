/*!
 * Property Tests
 * Filtering, ring buffer and ledger arithmetic over generated inputs
 */

use core_monitoring::{
    Event, EventKind, EventTracker, MemoryChannel, MemoryTracker, MonitoringSystem, Severity,
};
use proptest::prelude::*;
use std::sync::Arc;

fn severity() -> impl Strategy<Value = Severity> {
    (0u8..6).prop_map(Severity::from_u8)
}

fn running_dispatcher(min: Severity) -> Arc<MonitoringSystem> {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, min).unwrap();
    dispatcher
}

#[derive(Debug, Clone)]
enum LedgerOp {
    Alloc(usize, usize),
    Free(usize),
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0usize..32, 1usize..10_000).prop_map(|(slot, size)| LedgerOp::Alloc(slot, size)),
        (0usize..40).prop_map(LedgerOp::Free),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_nothing_below_global_minimum_reaches_channels(
        min in severity(),
        levels in prop::collection::vec(severity(), 1..40),
    ) {
        let dispatcher = running_dispatcher(min);
        let channel = Arc::new(MemoryChannel::named("filtered", 100, Severity::Trace));
        dispatcher.register_channel(channel.clone()).unwrap();

        for level in &levels {
            dispatcher.log(EventKind::User, *level, "generated", "", None);
        }

        let delivered = channel.events();
        prop_assert!(delivered.iter().all(|e| e.severity() >= min));
        let expected = levels.iter().filter(|l| **l >= min).count();
        prop_assert_eq!(delivered.len(), expected);
    }

    #[test]
    fn prop_memory_channel_holds_last_events_in_order(
        capacity in 1usize..16,
        count in 0usize..48,
    ) {
        let dispatcher = running_dispatcher(Severity::Info);
        let channel = Arc::new(MemoryChannel::named("ring", capacity, Severity::Info));
        dispatcher.register_channel(channel.clone()).unwrap();

        for i in 0..count {
            dispatcher.log_event(&Event::new(EventKind::User, Severity::Info, format!("e{i}"), ""));
        }

        let names: Vec<String> = channel.events().iter().map(|e| e.name().to_string()).collect();
        let kept = count.min(capacity);
        let expected: Vec<String> = (count - kept..count).map(|i| format!("e{i}")).collect();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn prop_usage_matches_replayed_ledger(ops in prop::collection::vec(ledger_op(), 1..120)) {
        let dispatcher = running_dispatcher(Severity::Critical);
        let tracker = MemoryTracker::new(dispatcher);
        tracker.initialize(false, false);

        let mut model: std::collections::HashMap<usize, usize> = Default::default();
        let mut last_peak = 0;
        for op in ops {
            match op {
                LedgerOp::Alloc(slot, size) => {
                    tracker.track_allocation(0x1000 + slot * 16, size, None);
                    model.insert(slot, size);
                }
                LedgerOp::Free(slot) => {
                    let known = tracker.track_deallocation(0x1000 + slot * 16);
                    prop_assert_eq!(known, model.remove(&slot).is_some());
                }
            }

            let stats = tracker.stats();
            prop_assert_eq!(stats.current_usage, model.values().sum::<usize>());
            prop_assert_eq!(stats.current_usage, stats.total_allocated - stats.total_deallocated);
            prop_assert_eq!(stats.active_allocations, model.len());
            prop_assert!(stats.peak_usage >= stats.current_usage);
            prop_assert!(stats.peak_usage >= last_peak);
            last_peak = stats.peak_usage;
        }
    }

    #[test]
    fn prop_each_call_counts_once(calls in 1usize..20) {
        let dispatcher = running_dispatcher(Severity::Critical);
        let tracker = EventTracker::new(dispatcher);
        tracker.initialize(true);

        for n in 1..=calls {
            let id = tracker.begin_function("work", "p.rs", 1, "prop", "");
            tracker.end_function(id, None);
            let stat = tracker.function_stat("work", "prop").unwrap();
            prop_assert_eq!(stat.call_count, n as u64);
            prop_assert!(stat.min_duration_us <= stat.last_duration_us);
            prop_assert!(stat.last_duration_us <= stat.max_duration_us);
        }
    }
}
