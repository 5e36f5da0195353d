/*!
 * Event Model
 * Immutable observability events shared by every producer and channel
 */

use crate::core::errors::MonitoringError;
use crate::core::id::TaskId;
use crate::core::types::SourceLocation;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use time::macros::format_description;
use time::OffsetDateTime;

/// Event severity for filtering and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Inverse of `as u8`; out-of-range values saturate to Critical
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Severity::Trace,
            1 => Severity::Debug,
            2 => Severity::Info,
            3 => Severity::Warning,
            4 => Severity::Error,
            _ => Severity::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = MonitoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(MonitoringError::InvalidSeverity(s.to_string())),
        }
    }
}

/// What an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    System,
    Performance,
    Memory,
    Network,
    Function,
    Error,
    Debug,
    User,
    Custom,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::System => "SYSTEM",
            EventKind::Performance => "PERFORMANCE",
            EventKind::Memory => "MEMORY",
            EventKind::Network => "NETWORK",
            EventKind::Function => "FUNCTION",
            EventKind::Error => "ERROR",
            EventKind::Debug => "DEBUG",
            EventKind::User => "USER",
            EventKind::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured observability record
///
/// Built by value with the `with_*` methods, then only ever shared by
/// reference. Fields are read through accessors.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    kind: EventKind,
    severity: Severity,
    name: String,
    description: String,
    location: Option<SourceLocation>,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    timestamp: SystemTime,
    task_id: TaskId,
    numeric: BTreeMap<String, f64>,
    text: BTreeMap<String, String>,
}

impl Event {
    /// Stamped with the current time and the calling thread's task id
    pub fn new(
        kind: EventKind,
        severity: Severity,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            name: name.into(),
            description: description.into(),
            location: None,
            timestamp: SystemTime::now(),
            task_id: TaskId::current(),
            numeric: BTreeMap::new(),
            text: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[inline]
    pub fn with_optional_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    #[inline]
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.numeric.insert(key.into(), value);
        self
    }

    #[inline]
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.text.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn numeric_fields(&self) -> &BTreeMap<String, f64> {
        &self.numeric
    }

    pub fn string_fields(&self) -> &BTreeMap<String, String> {
        &self.text
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.numeric.get(key).copied()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.text.get(key).map(String::as_str)
    }

    #[inline]
    pub fn matches(&self, filter: &EventFilter) -> bool {
        if let Some(min_severity) = filter.min_severity {
            if self.severity < min_severity {
                return false;
            }
        }

        if let Some(kind) = filter.kind {
            if self.kind != kind {
                return false;
            }
        }

        if let Some(name) = &filter.name {
            if &self.name != name {
                return false;
            }
        }

        true
    }
}

/// Single-line text rendering for text sinks; not a serialization format
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] [{}] [{}] {}: {}",
            render_timestamp(self.timestamp),
            self.severity,
            self.kind,
            self.task_id,
            self.name,
            self.description
        )?;

        if let Some(loc) = &self.location {
            write!(f, " ({})", loc)?;
        }

        if !self.numeric.is_empty() {
            f.write_str(" | Numeric Data: ")?;
            for (key, value) in &self.numeric {
                write!(f, "{}={}; ", key, value)?;
            }
        }

        if !self.text.is_empty() {
            f.write_str(" | String Data: ")?;
            for (key, value) in &self.text {
                write!(f, "{}=\"{}\"; ", key, value)?;
            }
        }

        Ok(())
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC
pub(crate) fn render_timestamp(at: SystemTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from(at)
        .format(&format)
        .unwrap_or_else(|_| String::from("????-??-?? ??:??:??"))
}

/// Event filter for querying
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub min_severity: Option<Severity>,
    pub kind: Option<EventKind>,
    pub name: Option<String>,
}

impl EventFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    #[inline]
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
