/*!
 * Performance Snapshots
 * Per-category readings collected on each sampler tick
 */

use crate::core::errors::MonitoringError;
use crate::core::limits::{
    INTERVAL_FAST, INTERVAL_NORMAL, INTERVAL_REALTIME, INTERVAL_SLOW, INTERVAL_VERY_SLOW,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Sampler tick period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingInterval {
    RealTime,
    Fast,
    Normal,
    Slow,
    VerySlow,
    Custom(Duration),
}

impl SamplingInterval {
    pub const fn duration(self) -> Duration {
        match self {
            SamplingInterval::RealTime => INTERVAL_REALTIME,
            SamplingInterval::Fast => INTERVAL_FAST,
            SamplingInterval::Normal => INTERVAL_NORMAL,
            SamplingInterval::Slow => INTERVAL_SLOW,
            SamplingInterval::VerySlow => INTERVAL_VERY_SLOW,
            SamplingInterval::Custom(d) => d,
        }
    }

    /// Preset matching `d` exactly, otherwise `Custom`
    pub fn from_duration(d: Duration) -> Self {
        [
            SamplingInterval::RealTime,
            SamplingInterval::Fast,
            SamplingInterval::Normal,
            SamplingInterval::Slow,
            SamplingInterval::VerySlow,
        ]
        .into_iter()
        .find(|preset| preset.duration() == d)
        .unwrap_or(SamplingInterval::Custom(d))
    }
}

impl Default for SamplingInterval {
    fn default() -> Self {
        SamplingInterval::Normal
    }
}

/// Resource categories collected per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFlags {
    pub cpu: bool,
    pub memory: bool,
    pub disk: bool,
    pub network: bool,
    pub gpu: bool,
}

impl CategoryFlags {
    pub const fn all() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
            gpu: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            cpu: false,
            memory: false,
            disk: false,
            network: false,
            gpu: false,
        }
    }

    pub fn any(&self) -> bool {
        self.cpu || self.memory || self.disk || self.network || self.gpu
    }
}

impl Default for CategoryFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Comma separated names, `all` or `none`
impl FromStr for CategoryFlags {
    type Err = MonitoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = CategoryFlags::none();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "all" => flags = CategoryFlags::all(),
                "none" => {}
                "cpu" => flags.cpu = true,
                "memory" | "mem" => flags.memory = true,
                "disk" => flags.disk = true,
                "network" | "net" => flags.network = true,
                "gpu" => flags.gpu = true,
                other => {
                    return Err(MonitoringError::Configuration(format!(
                        "unknown sampler category '{}'",
                        other
                    )))
                }
            }
        }
        Ok(flags)
    }
}

impl fmt::Display for CategoryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.cpu, "cpu"),
            (self.memory, "memory"),
            (self.disk, "disk"),
            (self.network, "network"),
            (self.gpu, "gpu"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    /// 0-100
    pub total_percent: f64,
    pub per_core: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_physical: u64,
    pub used_physical: u64,
    pub available_physical: u64,
    pub total_swap: u64,
    pub used_swap: u64,
}

impl MemoryUsage {
    pub fn physical_percent(&self) -> f64 {
        percent(self.used_physical, self.total_physical)
    }

    pub fn swap_percent(&self) -> f64 {
        percent(self.used_swap, self.total_swap)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub name: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub read_rate: f64,
    pub write_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub disks: Vec<DiskStats>,
}

impl DiskUsage {
    /// Used space across all disks
    pub fn usage_percent(&self) -> f64 {
        let total = self.disks.iter().map(|d| d.total_bytes).sum();
        let used = self.disks.iter().map(|d| d.used_bytes).sum();
        percent(used, total)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub name: String,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// Bytes per second
    pub receive_rate: f64,
    pub send_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkUsage {
    pub interfaces: Vec<InterfaceStats>,
}

impl NetworkUsage {
    /// Receive plus send bytes per second over all interfaces
    pub fn total_rate(&self) -> f64 {
        self.interfaces
            .iter()
            .map(|i| i.receive_rate + i.send_rate)
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuStats {
    pub name: String,
    pub usage_percent: f64,
    pub memory_total: u64,
    pub memory_used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuUsage {
    pub gpus: Vec<GpuStats>,
}

impl GpuUsage {
    /// Mean utilization over all devices
    pub fn usage_percent(&self) -> f64 {
        if self.gpus.is_empty() {
            return 0.0;
        }
        self.gpus.iter().map(|g| g.usage_percent).sum::<f64>() / self.gpus.len() as f64
    }

    pub fn memory_percent(&self) -> f64 {
        let total = self.gpus.iter().map(|g| g.memory_total).sum();
        let used = self.gpus.iter().map(|g| g.memory_used).sum();
        percent(used, total)
    }
}

/// Latest readings; a category is None when disabled or unavailable
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub tick: u64,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub timestamp: SystemTime,
    pub cpu: Option<CpuUsage>,
    pub memory: Option<MemoryUsage>,
    pub disk: Option<DiskUsage>,
    pub network: Option<NetworkUsage>,
    pub gpu: Option<GpuUsage>,
}

impl PerformanceSnapshot {
    pub fn empty(tick: u64) -> Self {
        Self {
            tick,
            timestamp: SystemTime::now(),
            cpu: None,
            memory: None,
            disk: None,
            network: None,
            gpu: None,
        }
    }

    /// Total CPU percent, 0 when not collected
    pub fn cpu_percent(&self) -> f64 {
        self.cpu.as_ref().map_or(0.0, |c| c.total_percent)
    }

    /// Physical memory percent, 0 when not collected
    pub fn memory_percent(&self) -> f64 {
        self.memory.as_ref().map_or(0.0, MemoryUsage::physical_percent)
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}
