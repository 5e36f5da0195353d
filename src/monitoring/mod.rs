/*!
 * Monitoring
 * Event pipeline, channels and the producers built on top of it
 */

pub mod bridge;
pub mod channels;
pub mod dispatcher;
pub mod events;
pub mod facade;
pub mod logging;
pub mod memory;
pub mod sampler;
pub mod tracer;

pub use channels::{Channel, ChannelState, FileChannel, MemoryChannel, SocketChannel};
pub use dispatcher::{DispatchStats, EventCallback, MonitoringSystem};
pub use events::{Event, EventFilter, EventKind, Severity};
pub use facade::Monitoring;
pub use logging::init_tracing;
pub use memory::{
    AllocationRecord, MemoryReport, MemoryStats, MemoryThresholdCallback, MemoryTracker,
    SizeBreakdown, SizeCategory, TrackedBox,
};
pub use sampler::{
    CategoryFlags, MetricSource, PerformanceCallback, PerformanceMonitor, PerformanceSnapshot,
    SamplingInterval, StaticSource, SystemSource, ThresholdCallback,
};
pub use tracer::{
    EventTracker, ExecutionCallback, FunctionCallRecord, FunctionStats, ScopedTrace,
    ThresholdTrigger,
};
