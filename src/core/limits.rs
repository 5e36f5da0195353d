/*!
 * Limits and Constants
 *
 * Centralized location for capacities, thresholds and default intervals
 * used across the monitoring services. Grouped by subsystem.
 */

use std::time::Duration;

// =============================================================================
// CHANNELS & DISPATCH
// =============================================================================

/// Default capacity of an in-memory channel (events)
pub const DEFAULT_MEMORY_CHANNEL_CAPACITY: usize = 1000;

/// Name given to in-memory channels constructed without an explicit name
pub const DEFAULT_MEMORY_CHANNEL_NAME: &str = "MemoryChannel";

/// Socket channel connect timeout
pub const SOCKET_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A single channel send slower than this is counted and logged
pub const SLOW_CHANNEL_SEND: Duration = Duration::from_millis(50);

// =============================================================================
// CALL TRACER
// =============================================================================

/// Completed calls kept per thread
pub const CALL_HISTORY_CAPACITY: usize = 1000;

/// Calls at or above this duration are reported as Function events
pub const FUNCTION_REPORT_THRESHOLD: Duration = Duration::from_millis(1);

/// Default minimum call count for a function to appear in a report
pub const REPORT_MIN_CALL_COUNT: u64 = 5;

/// Functions listed in a report summary
pub const REPORT_SUMMARY_LIMIT: usize = 20;

/// Functions given structured fields in a report
pub const REPORT_DETAIL_LIMIT: usize = 10;

// =============================================================================
// ALLOCATION TRACKER
// =============================================================================

/// Live allocations emitted individually by a detailed report
pub const DETAILED_ALLOCATION_LIMIT: usize = 100;

/// Default system memory baseline for the high-usage alert (16 GiB)
pub const DEFAULT_SYSTEM_MEMORY_BASELINE_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// The baseline as a byte count, clamped to the address space
pub const DEFAULT_SYSTEM_MEMORY_BASELINE: usize =
    if DEFAULT_SYSTEM_MEMORY_BASELINE_BYTES > usize::MAX as u64 {
        usize::MAX
    } else {
        DEFAULT_SYSTEM_MEMORY_BASELINE_BYTES as usize
    };

/// Fraction of the baseline above which the high-usage alert fires
pub const HIGH_USAGE_FRACTION: f64 = 0.8;

/// Growth since the previous sample above which the spike alert fires
pub const ALLOCATION_SPIKE_FRACTION: f64 = 0.1;

/// Default leak scan minimum size (bytes)
pub const LEAK_MIN_SIZE: usize = 1024;

/// Default leak scan minimum age
pub const LEAK_MIN_AGE: Duration = Duration::from_secs(60);

/// Frames kept from an allocation callsite backtrace
pub const CALLSITE_MAX_FRAMES: usize = 16;

/// Size category boundaries (bytes)
pub const SIZE_TINY_MAX: usize = 128;
pub const SIZE_SMALL_MAX: usize = 1024;
pub const SIZE_MEDIUM_MAX: usize = 16 * 1024;
pub const SIZE_LARGE_MAX: usize = 1024 * 1024;

// =============================================================================
// METRICS SAMPLER
// =============================================================================

pub const INTERVAL_REALTIME: Duration = Duration::from_millis(100);
pub const INTERVAL_FAST: Duration = Duration::from_millis(500);
pub const INTERVAL_NORMAL: Duration = Duration::from_secs(1);
pub const INTERVAL_SLOW: Duration = Duration::from_secs(5);
pub const INTERVAL_VERY_SLOW: Duration = Duration::from_secs(30);

/// Sampler worker thread name
pub const SAMPLER_THREAD_NAME: &str = "perf-sampler";
