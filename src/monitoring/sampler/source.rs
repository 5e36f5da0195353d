/*!
 * Metric Sources
 * Replaceable collectors behind the sampler
 */

use super::snapshot::{CpuUsage, DiskUsage, GpuUsage, MemoryUsage, NetworkUsage};
use parking_lot::Mutex;

/// Data source for one sampler
///
/// Called from the sampler worker only, one category at a time. Returning
/// None marks the category as unavailable for this tick.
pub trait MetricSource: Send + Sync {
    fn cpu(&self) -> Option<CpuUsage>;
    fn memory(&self) -> Option<MemoryUsage>;

    fn disk(&self) -> Option<DiskUsage> {
        None
    }

    fn network(&self) -> Option<NetworkUsage> {
        None
    }

    fn gpu(&self) -> Option<GpuUsage> {
        None
    }
}

/// Fixed readings, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticSource {
    readings: Mutex<Readings>,
}

#[derive(Debug, Clone, Default)]
struct Readings {
    cpu: Option<CpuUsage>,
    memory: Option<MemoryUsage>,
    disk: Option<DiskUsage>,
    network: Option<NetworkUsage>,
    gpu: Option<GpuUsage>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cpu(self, total_percent: f64) -> Self {
        self.set_cpu(total_percent);
        self
    }

    /// Memory reading with `used` of `total` physical bytes
    pub fn with_memory(self, used: u64, total: u64) -> Self {
        self.set_memory(used, total);
        self
    }

    pub fn with_disk(self, disk: DiskUsage) -> Self {
        self.readings.lock().disk = Some(disk);
        self
    }

    pub fn with_network(self, network: NetworkUsage) -> Self {
        self.readings.lock().network = Some(network);
        self
    }

    pub fn with_gpu(self, gpu: GpuUsage) -> Self {
        self.readings.lock().gpu = Some(gpu);
        self
    }

    pub fn set_cpu(&self, total_percent: f64) {
        self.readings.lock().cpu = Some(CpuUsage {
            total_percent,
            per_core: Vec::new(),
        });
    }

    pub fn set_memory(&self, used: u64, total: u64) {
        self.readings.lock().memory = Some(MemoryUsage {
            total_physical: total,
            used_physical: used,
            available_physical: total.saturating_sub(used),
            ..Default::default()
        });
    }
}

impl MetricSource for StaticSource {
    fn cpu(&self) -> Option<CpuUsage> {
        self.readings.lock().cpu.clone()
    }

    fn memory(&self) -> Option<MemoryUsage> {
        self.readings.lock().memory
    }

    fn disk(&self) -> Option<DiskUsage> {
        self.readings.lock().disk.clone()
    }

    fn network(&self) -> Option<NetworkUsage> {
        self.readings.lock().network.clone()
    }

    fn gpu(&self) -> Option<GpuUsage> {
        self.readings.lock().gpu.clone()
    }
}

/// Host readings from procfs
///
/// CPU percentages are deltas between consecutive reads, so the first
/// read reports the average since boot. Other platforms report None.
#[derive(Debug, Default)]
pub struct SystemSource {
    last_cpu: Mutex<Vec<CpuTimes>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl SystemSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricSource for SystemSource {
    fn cpu(&self) -> Option<CpuUsage> {
        let stat = read_proc("/proc/stat")?;
        let current = parse_cpu_times(&stat);
        if current.is_empty() {
            return None;
        }

        let mut last = self.last_cpu.lock();
        let percents: Vec<f64> = current
            .iter()
            .enumerate()
            .map(|(i, now)| {
                let before = last.get(i).copied().unwrap_or_default();
                busy_percent(before, *now)
            })
            .collect();
        *last = current;

        Some(CpuUsage {
            total_percent: percents[0],
            per_core: percents[1..].to_vec(),
        })
    }

    fn memory(&self) -> Option<MemoryUsage> {
        read_proc("/proc/meminfo").and_then(|text| parse_meminfo(&text))
    }
}

#[cfg(target_os = "linux")]
fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[cfg(not(target_os = "linux"))]
fn read_proc(_path: &str) -> Option<String> {
    None
}

/// Aggregate line first, then one entry per core
fn parse_cpu_times(stat: &str) -> Vec<CpuTimes> {
    stat.lines()
        .filter(|line| line.starts_with("cpu"))
        .filter_map(|line| {
            let fields: Vec<u64> = line
                .split_whitespace()
                .skip(1)
                .filter_map(|f| f.parse().ok())
                .collect();
            if fields.len() < 4 {
                return None;
            }
            let total: u64 = fields.iter().sum();
            // idle + iowait
            let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
            Some(CpuTimes {
                busy: total.saturating_sub(idle),
                total,
            })
        })
        .collect()
}

fn busy_percent(before: CpuTimes, now: CpuTimes) -> f64 {
    let total = now.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let busy = now.busy.saturating_sub(before.busy);
    (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

fn parse_meminfo(text: &str) -> Option<MemoryUsage> {
    let field = |key: &str| -> Option<u64> {
        text.lines()
            .find(|line| line.starts_with(key) && line[key.len()..].starts_with(':'))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };

    let total = field("MemTotal")?;
    let available = field("MemAvailable").or_else(|| field("MemFree"))?;
    let swap_total = field("SwapTotal").unwrap_or(0);
    let swap_free = field("SwapFree").unwrap_or(0);

    Some(MemoryUsage {
        total_physical: total,
        used_physical: total.saturating_sub(available),
        available_physical: available,
        total_swap: swap_total,
        used_swap: swap_total.saturating_sub(swap_free),
    })
}
