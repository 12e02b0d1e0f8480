/// Platform capability for system-resource sampling.
///
/// The sampler only talks to [`MetricSource`]; which implementation backs it
/// is decided once by [`default_source`] at startup.
use crate::error::MetricError;
use std::time::Instant;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskRate {
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

pub trait MetricSource: Send {
    /// Global CPU utilisation since the previous call, 0–100.
    fn sample_cpu(&mut self) -> Result<f32, MetricError>;

    fn sample_memory(&mut self) -> Result<MemoryUsage, MetricError>;

    /// Disk throughput since the previous call.
    fn sample_disk_io(&mut self) -> Result<DiskRate, MetricError>;
}

/// `sysinfo`-backed source for macOS, Linux and the other platforms the
/// crate supports.
pub struct SysinfoSource {
    system: System,
    last_io_refresh: Instant,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the counters: CPU usage and per-process I/O are both deltas
        // against the previous refresh.
        system.refresh_cpu_usage();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );
        Self {
            system,
            last_io_refresh: Instant::now(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn sample_cpu(&mut self) -> Result<f32, MetricError> {
        self.system.refresh_cpu_usage();
        if self.system.cpus().is_empty() {
            return Err(MetricError::Failed("no CPUs reported".into()));
        }
        Ok(self.system.global_cpu_usage().clamp(0.0, 100.0))
    }

    fn sample_memory(&mut self) -> Result<MemoryUsage, MetricError> {
        self.system.refresh_memory();
        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return Err(MetricError::Failed("total memory reported as 0".into()));
        }
        Ok(MemoryUsage {
            used_bytes: self.system.used_memory(),
            total_bytes,
        })
    }

    fn sample_disk_io(&mut self) -> Result<DiskRate, MetricError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_io_refresh).as_secs_f64();
        self.last_io_refresh = now;
        if elapsed <= 0.0 {
            return Err(MetricError::Failed("zero sampling interval".into()));
        }
        let (read, written) = self
            .system
            .processes()
            .values()
            .map(|p| p.disk_usage())
            .fold((0u64, 0u64), |(r, w), u| {
                (r.saturating_add(u.read_bytes), w.saturating_add(u.written_bytes))
            });
        Ok(DiskRate {
            read_bytes_per_sec: read as f64 / elapsed,
            write_bytes_per_sec: written as f64 / elapsed,
        })
    }
}

/// Source for platforms `sysinfo` cannot read. Every metric reports
/// unavailable, which the dashboard shows as such.
pub struct UnsupportedSource;

impl MetricSource for UnsupportedSource {
    fn sample_cpu(&mut self) -> Result<f32, MetricError> {
        Err(MetricError::Unsupported)
    }

    fn sample_memory(&mut self) -> Result<MemoryUsage, MetricError> {
        Err(MetricError::Unsupported)
    }

    fn sample_disk_io(&mut self) -> Result<DiskRate, MetricError> {
        Err(MetricError::Unsupported)
    }
}

/// Pick the metric source for the running platform.
pub fn default_source() -> Box<dyn MetricSource> {
    if sysinfo::IS_SUPPORTED_SYSTEM {
        Box::new(SysinfoSource::new())
    } else {
        Box::new(UnsupportedSource)
    }
}
