/*!
 * Call Tracer Tests
 */

use core_monitoring::{EventTracker, MonitoringSystem, Severity, SourceLocation, ThresholdTrigger};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn tracker() -> (Arc<MonitoringSystem>, Arc<EventTracker>) {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Trace).unwrap();
    let tracker = Arc::new(EventTracker::new(dispatcher.clone()));
    tracker.initialize(true);
    (dispatcher, tracker)
}

#[test]
fn test_nested_calls_link_to_parent() {
    let (_d, tracker) = tracker();
    let parse = tracker.begin_function("parse", "parser.rs", 10, "parser", "");
    let tokenize = tracker.begin_function("tokenize", "lexer.rs", 20, "lexer", "");
    tracker.end_function(tokenize, Some("12 tokens"));
    tracker.end_function(parse, None);

    let calls = tracker.completed_calls();
    let tokenize_rec = calls.iter().find(|r| r.function_name == "tokenize").unwrap();
    let parse_rec = calls.iter().find(|r| r.function_name == "parse").unwrap();
    assert_eq!(tokenize_rec.parent_event_id, Some(parse_rec.event_id));
    assert_eq!(tokenize_rec.depth, parse_rec.depth + 1);
    assert_eq!(tokenize_rec.result.as_deref(), Some("12 tokens"));

    let tree = tracker.call_tree();
    assert!(tree.contains("parse() [parser.rs:10]"));
    assert!(tree.contains("  tokenize() [lexer.rs:20] -> 12 tokens"));
}

#[test]
fn test_stats_accumulate_per_function() {
    let (_d, tracker) = tracker();
    for _ in 0..3 {
        let id = tracker.begin_function("step", "f.rs", 1, "pipeline", "");
        thread::sleep(Duration::from_millis(1));
        tracker.end_function(id, None);
    }

    let stat = tracker.function_stat("step", "pipeline").unwrap();
    assert_eq!(stat.call_count, 3);
    assert!(stat.min_duration_us <= stat.last_duration_us);
    assert!(stat.last_duration_us <= stat.max_duration_us);
    assert!(stat.total_duration_us >= 3_000);
    assert!(tracker.function_stat("step", "other").is_none());
}

#[test]
fn test_unknown_end_emits_warning() {
    let (dispatcher, tracker) = tracker();
    let id = tracker.begin_function("once", "f.rs", 1, "", "");
    tracker.end_function(id, None);
    tracker.end_function(id, None);

    let memory = dispatcher.memory_channel().unwrap();
    let warnings = memory.events_by_name("TraceEventUnknown");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity(), Severity::Warning);
    assert_eq!(tracker.function_stat("once", "").unwrap().call_count, 1);
}

#[test]
fn test_slow_calls_emit_execution_events() {
    let (dispatcher, tracker) = tracker();
    tracker.set_report_threshold(Duration::ZERO);
    let location = SourceLocation::new("codec.rs", 77, "decode");
    let id = tracker.begin_at(&location, "codec", "len=4");
    tracker.end_function(id, Some("ok"));

    let memory = dispatcher.memory_channel().unwrap();
    let event = &memory.events_by_name("FunctionExecution")[0];
    assert_eq!(event.text("function"), Some("decode"));
    assert_eq!(event.text("args"), Some("len=4"));
    assert_eq!(event.text("result"), Some("ok"));
    assert_eq!(event.number("line"), Some(77.0));
    assert!(event.number("duration_ms").is_some());
}

#[test]
fn test_threshold_every_call_and_once() {
    let (_d, tracker) = tracker();
    let every = Arc::new(Mutex::new(0));
    let once = Arc::new(Mutex::new(0));

    let e = every.clone();
    tracker.set_execution_threshold("slow", 0.0, move |_, _| *e.lock() += 1);
    let o = once.clone();
    let once_id = tracker.set_execution_threshold_with("slow", 0.0, ThresholdTrigger::Once, move |name, ms| {
        assert_eq!(name, "slow");
        assert!(ms > 0.0);
        *o.lock() += 1;
    });

    let run = |tracker: &EventTracker| {
        let id = tracker.begin_function("slow", "f.rs", 1, "", "");
        thread::sleep(Duration::from_millis(2));
        tracker.end_function(id, None);
    };

    run(&tracker);
    run(&tracker);
    assert_eq!(*every.lock(), 2);
    assert_eq!(*once.lock(), 1);

    assert!(tracker.rearm_execution_threshold(once_id));
    run(&tracker);
    assert_eq!(*once.lock(), 2);

    assert!(tracker.remove_execution_threshold(once_id));
    assert!(!tracker.rearm_execution_threshold(once_id));
    assert_eq!(tracker.threshold_count(), 1);
}

#[test]
fn test_threads_trace_independently() {
    let (_d, tracker) = tracker();
    let outer = tracker.begin_function("main_outer", "f.rs", 1, "", "");

    let worker = {
        let tracker = tracker.clone();
        thread::spawn(move || {
            assert_eq!(tracker.current_depth(), 0);
            let id = tracker.begin_function("worker", "f.rs", 2, "", "");
            let record = tracker.active_calls().pop().unwrap();
            tracker.end_function(id, None);
            record
        })
    };
    let record = worker.join().unwrap();
    assert_eq!(record.depth, 0);
    assert_eq!(record.parent_event_id, None);

    assert_eq!(tracker.current_depth(), 1);
    tracker.end_function(outer, None);
    assert_eq!(tracker.function_stat("worker", "").unwrap().call_count, 1);
}

#[test]
fn test_performance_report_ranks_by_total_time() {
    let (dispatcher, tracker) = tracker();
    for (name, sleep_ms, calls) in [("fast", 0, 5), ("slow", 3, 5), ("rare", 5, 1)] {
        for _ in 0..calls {
            let id = tracker.begin_function(name, "f.rs", 1, "m", "");
            thread::sleep(Duration::from_millis(sleep_ms));
            tracker.end_function(id, None);
        }
    }

    let ranked = tracker.create_performance_report(false, 5);
    let names: Vec<&str> = ranked.iter().map(|s| s.function_name.as_str()).collect();
    assert_eq!(names, vec!["slow", "fast"]);

    assert_eq!(tracker.performance_report().len(), 2);
    let all = tracker.create_performance_report(true, 5);
    assert_eq!(all.len(), 3);

    let memory = dispatcher.memory_channel().unwrap();
    let report = &memory.events_by_name("FunctionPerformanceReport")[0];
    assert_eq!(report.number("function_count"), Some(2.0));
    assert_eq!(report.text("func1_name"), Some("slow"));
    assert_eq!(report.text("func2_name"), Some("fast"));
    assert!(report.text("summary").unwrap().contains("1. slow (m): 5 calls"));
}

#[test]
fn test_disabled_and_shutdown_are_noops() {
    let (dispatcher, tracker) = tracker();
    tracker.set_enabled(false);
    assert!(tracker.begin_function("off", "f.rs", 1, "", "").is_disabled());
    tracker.set_enabled(true);

    let dangling = tracker.begin_function("dangling", "f.rs", 1, "", "");
    tracker.shutdown();
    assert!(tracker.function_stats().is_empty());
    assert_eq!(tracker.current_depth(), 0);

    tracker.end_function(dangling, None);
    assert!(tracker.begin_function("after", "f.rs", 1, "", "").is_disabled());

    let memory = dispatcher.memory_channel().unwrap();
    assert_eq!(memory.events_by_name("EventTrackerShutdown").len(), 1);
    assert!(memory.events_by_name("TraceEventUnknown").is_empty());
}
