/*!
 * Channel Tests
 */

use core_monitoring::{
    Channel, ChannelState, Event, EventFilter, EventKind, FileChannel, MemoryChannel,
    MonitoringError, MonitoringSystem, Severity, SocketChannel,
};
use pretty_assertions::assert_eq;
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn event(severity: Severity, name: &str) -> Event {
    Event::new(EventKind::User, severity, name, "test event")
}

#[test]
fn test_memory_channel_keeps_latest_in_order() {
    let dispatcher = Arc::new(MonitoringSystem::new());
    dispatcher.initialize(None, Severity::Trace).unwrap();
    let channel = Arc::new(MemoryChannel::named("ring", 3, Severity::Info));
    dispatcher.register_channel(channel.clone()).unwrap();

    for i in 0..5 {
        dispatcher.log_event(&event(Severity::Info, &format!("e{}", i)));
    }

    let names: Vec<String> = channel.events().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(names, vec!["e2", "e3", "e4"]);
    assert_eq!(channel.len(), 3);
}

#[test]
fn test_memory_channel_queries() {
    let channel = MemoryChannel::named("query", 16, Severity::Trace);
    channel.initialize().unwrap();
    channel.send_event(&event(Severity::Debug, "a")).unwrap();
    channel
        .send_event(&Event::new(EventKind::Network, Severity::Error, "b", ""))
        .unwrap();
    channel.send_event(&event(Severity::Warning, "b")).unwrap();

    assert_eq!(channel.events_by_kind(EventKind::Network).len(), 1);
    assert_eq!(channel.events_by_min_severity(Severity::Warning).len(), 2);
    assert_eq!(channel.events_by_name("b").len(), 2);

    let filter = EventFilter::new().name("b").kind(EventKind::User);
    let hits = channel.query(&filter);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].severity(), Severity::Warning);

    channel.clear();
    assert!(channel.is_empty());
}

#[test]
fn test_channel_lifecycle() {
    let channel = MemoryChannel::named("life", 4, Severity::Warning);
    assert!(matches!(
        channel.send_event(&event(Severity::Error, "early")),
        Err(MonitoringError::ChannelNotInitialized(_))
    ));

    channel.initialize().unwrap();
    assert_eq!(channel.state(), ChannelState::Initialized);
    assert!(channel.send_event(&event(Severity::Info, "quiet")).is_ok());
    assert!(channel.is_empty());

    channel.shutdown().unwrap();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(matches!(
        channel.send_event(&event(Severity::Error, "late")),
        Err(MonitoringError::ChannelClosed(_))
    ));
}

#[test]
fn test_file_channel_respects_min_severity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filtered.log");
    let channel = FileChannel::with_min_severity(&path, Severity::Warning);
    assert_eq!(channel.name(), format!("FileChannel:{}", path.display()));

    channel.initialize().unwrap();
    assert!(channel.session().is_some());
    channel.send_event(&event(Severity::Info, "skipped")).unwrap();
    channel.send_event(&event(Severity::Critical, "kept")).unwrap();
    channel.shutdown().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("skipped"));
    assert!(text.contains("[CRITICAL] [USER]"));
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn test_file_channel_appends_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("append.log");
    for _ in 0..2 {
        let channel = FileChannel::new(&path);
        channel.initialize().unwrap();
        channel.send_event(&event(Severity::Info, "entry")).unwrap();
        channel.shutdown().unwrap();
    }
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("Monitoring Session Started").count(), 2);
}

#[test]
fn test_socket_channel_streams_json_lines() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let reader = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        BufReader::new(stream)
            .lines()
            .take(2)
            .map(|line| serde_json::from_str::<Event>(&line.unwrap()).unwrap())
            .collect::<Vec<_>>()
    });

    let channel = SocketChannel::new("127.0.0.1", port);
    channel.initialize().unwrap();
    assert!(channel.is_connected());
    channel
        .send_event(&event(Severity::Info, "first").with_number("bytes", 512.0))
        .unwrap();
    channel.send_event(&event(Severity::Debug, "below-min")).unwrap();
    channel.send_event(&event(Severity::Error, "second")).unwrap();
    channel.shutdown().unwrap();

    let received = reader.join().unwrap();
    assert_eq!(received[0].name(), "first");
    assert_eq!(received[0].number("bytes"), Some(512.0));
    assert_eq!(received[1].name(), "second");
}

#[test]
fn test_socket_channel_unreachable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let channel =
        SocketChannel::new("127.0.0.1", port).with_connect_timeout(Duration::from_millis(200));
    assert!(matches!(
        channel.initialize(),
        Err(MonitoringError::Connection { .. })
    ));
    assert!(!channel.is_connected());
}
