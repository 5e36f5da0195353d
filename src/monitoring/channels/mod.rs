/*!
 * Channels
 * Pluggable event sinks consumed by the dispatcher
 *
 * Every channel:
 * - Moves through Uninitialized -> Initialized -> Closed (terminal)
 * - Rejects sends outside the Initialized state with an error
 * - Accepts and silently drops events below its own minimum severity
 */

mod file;
mod memory;
mod socket;

pub use file::FileChannel;
pub use memory::MemoryChannel;
pub use socket::SocketChannel;

use crate::core::errors::{MonitoringError, MonitoringResult};
use crate::monitoring::events::{Event, Severity};

/// Channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Initialized,
    Closed,
}

impl ChannelState {
    /// Gate applied by every channel before writing
    pub(crate) fn ensure_open(self, name: &str) -> MonitoringResult<()> {
        match self {
            ChannelState::Initialized => Ok(()),
            ChannelState::Uninitialized => Err(MonitoringError::ChannelNotInitialized(name.to_string())),
            ChannelState::Closed => Err(MonitoringError::ChannelClosed(name.to_string())),
        }
    }
}

/// Event sink
///
/// Implementations serialize their own writes; the dispatcher may call
/// `send_event` from many threads at once.
#[cfg_attr(test, mockall::automock)]
pub trait Channel: Send + Sync {
    fn initialize(&self) -> MonitoringResult<()>;

    fn shutdown(&self) -> MonitoringResult<()>;

    fn send_event(&self, event: &Event) -> MonitoringResult<()>;

    /// Unique within a dispatcher
    fn name(&self) -> String;

    fn min_severity(&self) -> Severity;

    fn state(&self) -> ChannelState;
}
