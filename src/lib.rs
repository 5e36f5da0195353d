/*!
 * Core Monitoring Library
 * In-process events, channels, call tracing, allocation tracking and sampling
 */

pub mod core;
pub mod monitoring;

// Re-exports
pub use crate::core::config::MonitoringConfig;
pub use crate::core::errors::{MonitoringError, MonitoringResult};
pub use crate::core::types::SourceLocation;
pub use monitoring::*;
