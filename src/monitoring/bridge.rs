/*!
 * Bridge
 * Optional process-wide monitoring handle
 *
 * Code without access to an explicit `Monitoring` can reach the global one
 * here. Nothing else in the crate depends on it being set.
 */

use super::events::{Event, EventKind, Severity};
use super::facade::Monitoring;
use crate::core::config::MonitoringConfig;
use crate::core::errors::MonitoringResult;
use crate::core::types::SourceLocation;
use std::sync::OnceLock;

static GLOBAL_MONITORING: OnceLock<Monitoring> = OnceLock::new();

/// Start the global monitoring services once
///
/// Later calls return the already installed instance and ignore `config`.
pub fn init_global(config: &MonitoringConfig) -> MonitoringResult<&'static Monitoring> {
    if let Some(existing) = GLOBAL_MONITORING.get() {
        return Ok(existing);
    }
    let monitoring = Monitoring::start(config)?;
    match GLOBAL_MONITORING.set(monitoring) {
        Ok(()) => {}
        // Lost the race; stop ours and use the winner
        Err(ours) => ours.shutdown(),
    }
    GLOBAL_MONITORING
        .get()
        .ok_or_else(|| crate::core::errors::MonitoringError::NotInitialized("global monitoring".into()))
}

/// Global monitoring if installed
#[inline]
pub fn global() -> Option<&'static Monitoring> {
    GLOBAL_MONITORING.get()
}

/// Log through the global dispatcher; false when none is installed
#[track_caller]
pub fn emit(kind: EventKind, severity: Severity, name: &str, description: &str) -> bool {
    let location = SourceLocation::caller();
    match global() {
        Some(monitoring) => monitoring
            .dispatcher
            .log_event(&Event::new(kind, severity, name, description).with_location(location)),
        None => false,
    }
}
