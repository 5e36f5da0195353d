/*!
 * Function Statistics
 * Per (function, module) aggregates folded from completed calls
 */

use serde::{Deserialize, Serialize};

/// Aggregation key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FunctionKey {
    pub name: String,
    pub module: String,
}

impl FunctionKey {
    pub fn new(name: &str, module: &str) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
        }
    }
}

/// Running totals for one traced function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionStats {
    pub function_name: String,
    pub module: String,
    pub call_count: u64,
    pub total_duration_us: u64,
    pub min_duration_us: u64,
    pub max_duration_us: u64,
    pub last_duration_us: u64,
}

impl FunctionStats {
    pub(crate) fn new(function_name: &str, module: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            module: module.to_string(),
            call_count: 0,
            total_duration_us: 0,
            min_duration_us: u64::MAX,
            max_duration_us: 0,
            last_duration_us: 0,
        }
    }

    pub(crate) fn record(&mut self, duration_us: u64) {
        self.call_count += 1;
        self.total_duration_us = self.total_duration_us.saturating_add(duration_us);
        self.min_duration_us = self.min_duration_us.min(duration_us);
        self.max_duration_us = self.max_duration_us.max(duration_us);
        self.last_duration_us = duration_us;
    }

    pub fn average_duration_us(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.total_duration_us as f64 / self.call_count as f64
        }
    }

    pub fn total_ms(&self) -> f64 {
        self.total_duration_us as f64 / 1000.0
    }

    pub fn average_ms(&self) -> f64 {
        self.average_duration_us() / 1000.0
    }
}
