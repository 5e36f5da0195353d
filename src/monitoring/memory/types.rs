/*!
 * Allocation Tracker Types
 * Ledger records, running statistics and report structures
 */

use crate::core::id::TaskId;
use crate::core::limits::{SIZE_LARGE_MAX, SIZE_MEDIUM_MAX, SIZE_SMALL_MAX, SIZE_TINY_MAX};
use crate::core::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

/// Size bucket of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeCategory {
    /// < 128 B
    Tiny,
    /// 128 B .. 1 KiB
    Small,
    /// 1 KiB .. 16 KiB
    Medium,
    /// 16 KiB .. 1 MiB
    Large,
    /// >= 1 MiB
    Huge,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 5] = [
        SizeCategory::Tiny,
        SizeCategory::Small,
        SizeCategory::Medium,
        SizeCategory::Large,
        SizeCategory::Huge,
    ];

    #[inline]
    pub const fn of(size: usize) -> Self {
        if size < SIZE_TINY_MAX {
            SizeCategory::Tiny
        } else if size < SIZE_SMALL_MAX {
            SizeCategory::Small
        } else if size < SIZE_MEDIUM_MAX {
            SizeCategory::Medium
        } else if size < SIZE_LARGE_MAX {
            SizeCategory::Large
        } else {
            SizeCategory::Huge
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SizeCategory::Tiny => "Tiny (<128B)",
            SizeCategory::Small => "Small (128B-1KB)",
            SizeCategory::Medium => "Medium (1KB-16KB)",
            SizeCategory::Large => "Large (16KB-1MB)",
            SizeCategory::Huge => "Huge (>1MB)",
        };
        f.write_str(label)
    }
}

/// One live allocation
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecord {
    pub address: Address,
    pub size: usize,
    pub tag: Option<String>,
    /// Symbolized backtrace, one frame per line
    pub callsite: Option<String>,
    pub allocated_at: Instant,
    pub timestamp: SystemTime,
    pub task_id: TaskId,
}

impl AllocationRecord {
    pub fn age(&self) -> Duration {
        self.allocated_at.elapsed()
    }

    pub fn category(&self) -> SizeCategory {
        SizeCategory::of(self.size)
    }
}

/// Running totals over the tracker's lifetime
///
/// `current_usage == total_allocated - total_deallocated` at all times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_allocated: usize,
    pub total_deallocated: usize,
    pub current_usage: usize,
    pub peak_usage: usize,
    pub allocation_count: usize,
    pub deallocation_count: usize,
    pub active_allocations: usize,
    pub usage_by_tag: BTreeMap<String, usize>,
    pub count_by_tag: BTreeMap<String, usize>,
}

impl MemoryStats {
    pub(crate) fn record_allocation(&mut self, size: usize, tag: Option<&str>) {
        self.total_allocated = self.total_allocated.saturating_add(size);
        self.current_usage = self.current_usage.saturating_add(size);
        self.peak_usage = self.peak_usage.max(self.current_usage);
        self.allocation_count += 1;
        self.active_allocations += 1;
        if let Some(tag) = tag {
            self.add_tag(tag, size);
        }
    }

    pub(crate) fn record_release(&mut self, size: usize, tag: Option<&str>) {
        self.total_deallocated = self.total_deallocated.saturating_add(size);
        self.current_usage = self.current_usage.saturating_sub(size);
        self.deallocation_count += 1;
        self.active_allocations = self.active_allocations.saturating_sub(1);
        if let Some(tag) = tag {
            self.remove_tag(tag, size);
        }
    }

    pub(crate) fn retag(&mut self, size: usize, from: Option<&str>, to: &str) {
        if let Some(from) = from {
            self.remove_tag(from, size);
        }
        self.add_tag(to, size);
    }

    fn add_tag(&mut self, tag: &str, size: usize) {
        *self.usage_by_tag.entry(tag.to_string()).or_insert(0) += size;
        *self.count_by_tag.entry(tag.to_string()).or_insert(0) += 1;
    }

    fn remove_tag(&mut self, tag: &str, size: usize) {
        if let Some(usage) = self.usage_by_tag.get_mut(tag) {
            *usage = usage.saturating_sub(size);
        }
        let now_empty = match self.count_by_tag.get_mut(tag) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if now_empty {
            self.count_by_tag.remove(tag);
            self.usage_by_tag.remove(tag);
        }
    }
}

/// Live allocations in one size bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBreakdown {
    pub category: SizeCategory,
    pub count: usize,
    pub bytes: usize,
}

/// Result of `create_memory_report`
#[derive(Debug, Clone)]
pub struct MemoryReport {
    pub stats: MemoryStats,
    pub by_size: Vec<SizeBreakdown>,
    /// Largest live allocations, only for detailed reports
    pub largest: Vec<AllocationRecord>,
}

impl MemoryReport {
    pub fn tag_details(&self) -> String {
        let mut out = String::new();
        for (tag, bytes) in &self.stats.usage_by_tag {
            let count = self.stats.count_by_tag.get(tag).copied().unwrap_or(0);
            out.push_str(&format!("{}: {} bytes ({} allocations); ", tag, bytes, count));
        }
        out
    }

    pub fn size_details(&self) -> String {
        let mut out = String::new();
        for b in &self.by_size {
            out.push_str(&format!("{}: {} allocations, {} bytes; ", b.category, b.count, b.bytes));
        }
        out
    }
}
