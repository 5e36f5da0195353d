/*!
 * Scoped Tracing
 *
 * RAII guard that closes its traced call exactly once when dropped,
 * on normal return, early return, `?` propagation or unwinding.
 */

use super::EventTracker;
use crate::core::id::EventId;
use crate::core::types::SourceLocation;
use std::panic::Location;
use tracing::Span;

/// Guard returned by [`EventTracker::scope`]
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use core_monitoring::{EventTracker, MonitoringSystem, Severity};
///
/// let dispatcher = Arc::new(MonitoringSystem::new());
/// dispatcher.initialize(None, Severity::Info).unwrap();
/// let tracker = EventTracker::new(dispatcher);
/// tracker.initialize(true);
///
/// fn parse(tracker: &EventTracker, input: &str) -> Option<u32> {
///     let mut scope = tracker.scope("parse");
///     let value: u32 = input.parse().ok()?;
///     scope.set_result(value.to_string());
///     Some(value)
/// }
///
/// parse(&tracker, "12");
/// parse(&tracker, "nope");
/// assert_eq!(tracker.function_stat("parse", "").unwrap().call_count, 2);
/// ```
#[must_use = "the traced call ends as soon as the guard is dropped"]
pub struct ScopedTrace<'a> {
    tracker: &'a EventTracker,
    event_id: EventId,
    result: Option<String>,
    _span: Span,
}

impl<'a> ScopedTrace<'a> {
    pub(crate) fn open(
        tracker: &'a EventTracker,
        name: &str,
        module: &str,
        args: &str,
        location: &SourceLocation,
    ) -> Self {
        let event_id = tracker.begin_function(name, &location.file, location.line, module, args);
        let span = if event_id.is_disabled() {
            Span::none()
        } else {
            tracing::trace_span!("traced_call", function = name, module, event_id = event_id.0)
        };
        Self {
            tracker,
            event_id,
            result: None,
            _span: span,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Result string recorded when the scope closes
    pub fn set_result(&mut self, result: impl Into<String>) {
        self.result = Some(result.into());
    }
}

impl Drop for ScopedTrace<'_> {
    fn drop(&mut self) {
        self.tracker.end_function(self.event_id, self.result.as_deref());
    }
}

impl EventTracker {
    /// Trace the enclosing scope, taking file and line from the caller
    #[track_caller]
    pub fn scope(&self, name: &str) -> ScopedTrace<'_> {
        let caller = Location::caller();
        let location = SourceLocation::new(caller.file(), caller.line(), name);
        ScopedTrace::open(self, name, "", "", &location)
    }

    pub fn scope_with(
        &self,
        name: &str,
        module: &str,
        args: &str,
        location: &SourceLocation,
    ) -> ScopedTrace<'_> {
        ScopedTrace::open(self, name, module, args, location)
    }
}

/// Trace the enclosing scope with file, line and module path filled in
///
/// `trace_scope!(tracker, "name")` or `trace_scope!(tracker, "name", args)`.
#[macro_export]
macro_rules! trace_scope {
    ($tracker:expr, $name:expr) => {
        $tracker.scope_with(
            $name,
            module_path!(),
            "",
            &$crate::core::types::SourceLocation::new(file!(), line!(), $name),
        )
    };
    ($tracker:expr, $name:expr, $args:expr) => {
        $tracker.scope_with(
            $name,
            module_path!(),
            &$args,
            &$crate::core::types::SourceLocation::new(file!(), line!(), $name),
        )
    };
}
