/*!
 * Core Module
 * Errors, ids, limits, configuration and shared registries
 */

pub mod config;
pub mod errors;
pub mod id;
pub mod limits;
pub mod registry;
pub mod types;

pub use config::MonitoringConfig;
pub use errors::{MonitoringError, MonitoringResult};
pub use id::{AtomicGenerator, EventId, TaskId};
pub use registry::HandleRegistry;
pub use types::{Address, HandleId, SourceLocation};
