/// Metrics sampler — a periodic producer of system-resource snapshots.
///
/// Runs on its own thread, entirely independent of scan activity, and pushes
/// one [`MetricSample`] per interval into a bounded channel. The dashboard
/// drains the channel into a [`MetricsHistory`] ring buffer for sparklines.
///
/// # Degradation
///
/// A failed reading falls back to the last known value (`Stale`). After
/// [`FAILURES_BEFORE_UNAVAILABLE`] consecutive failures the metric is reported
/// `Unavailable` so the UI never shows stale data indefinitely. Sampling
/// errors never leave this module.
///
/// # Cancellation
///
/// Call [`SamplerHandle::stop`]. The thread sleeps in short slices and exits
/// within one slice of the stop signal.
pub mod source;

pub use source::{default_source, DiskRate, MemoryUsage, MetricSource, SysinfoSource, UnsupportedSource};

use crate::error::{MetricError, ScanError};
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const FAILURES_BEFORE_UNAVAILABLE: u32 = 3;

/// Capacity of the sample channel. The dashboard drains every tick, so a
/// handful of slots is plenty; when full the newest sample is dropped.
pub const SAMPLE_CHANNEL_CAPACITY: usize = 16;

/// Longest uninterrupted sleep, bounding stop latency.
const STOP_POLL: Duration = Duration::from_millis(50);

/// One metric's value in a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    /// Sampled on this tick.
    Live(T),
    /// Sampling failed; this is the last known value.
    Stale(T),
    Unavailable,
}

impl<T: Copy> Reading<T> {
    /// The value to display, if any.
    pub fn value(&self) -> Option<T> {
        match *self {
            Reading::Live(v) | Reading::Stale(v) => Some(v),
            Reading::Unavailable => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Reading::Stale(_))
    }
}

/// Immutable snapshot of system resources at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub taken_at: DateTime<Local>,
    pub cpu_percent: Reading<f32>,
    pub memory: Reading<MemoryUsage>,
    pub disk_io: Reading<DiskRate>,
}

/// Last-known-value bookkeeping for one metric.
#[derive(Debug, Clone)]
pub struct ReadingTracker<T> {
    last: Option<T>,
    failures: u32,
}

impl<T> Default for ReadingTracker<T> {
    fn default() -> Self {
        Self {
            last: None,
            failures: 0,
        }
    }
}

impl<T: Copy> ReadingTracker<T> {
    pub fn observe(&mut self, result: Result<T, MetricError>) -> Reading<T> {
        match result {
            Ok(v) => {
                self.last = Some(v);
                self.failures = 0;
                Reading::Live(v)
            }
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                debug!("Metric sample failed ({} in a row): {err}", self.failures);
                match self.last {
                    Some(v) if self.failures < FAILURES_BEFORE_UNAVAILABLE => Reading::Stale(v),
                    _ => Reading::Unavailable,
                }
            }
        }
    }
}

/// Turns raw source readings into degraded-aware samples.
pub struct Sampler {
    source: Box<dyn MetricSource>,
    cpu: ReadingTracker<f32>,
    memory: ReadingTracker<MemoryUsage>,
    disk_io: ReadingTracker<DiskRate>,
}

impl Sampler {
    pub fn new(source: Box<dyn MetricSource>) -> Self {
        Self {
            source,
            cpu: ReadingTracker::default(),
            memory: ReadingTracker::default(),
            disk_io: ReadingTracker::default(),
        }
    }

    pub fn sample(&mut self) -> MetricSample {
        MetricSample {
            taken_at: Local::now(),
            cpu_percent: self.cpu.observe(self.source.sample_cpu()),
            memory: self.memory.observe(self.source.sample_memory()),
            disk_io: self.disk_io.observe(self.source.sample_disk_io()),
        }
    }
}

/// Bounded ring buffer of the most recent samples, oldest first.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// CPU series in whole percent for a sparkline; gaps read as 0.
    pub fn cpu_series(&self) -> Vec<u64> {
        self.samples
            .iter()
            .map(|s| s.cpu_percent.value().map(|v| v.round() as u64).unwrap_or(0))
            .collect()
    }

    /// Memory use in percent of total.
    pub fn memory_series(&self) -> Vec<u64> {
        self.samples
            .iter()
            .map(|s| {
                s.memory
                    .value()
                    .map(|m| crate::model::size::percent_of(m.used_bytes, m.total_bytes).round() as u64)
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Combined read+write throughput in bytes per second.
    pub fn disk_series(&self) -> Vec<u64> {
        self.samples
            .iter()
            .map(|s| {
                s.disk_io
                    .value()
                    .map(|d| (d.read_bytes_per_sec + d.write_bytes_per_sec).max(0.0) as u64)
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// Handle to a running sampler thread.
pub struct SamplerHandle {
    cancel: Arc<AtomicBool>,
    pub receiver: Receiver<MetricSample>,
}

impl SamplerHandle {
    /// Signal the sampler to stop. Non-blocking.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start sampling `source` every `interval` on a background thread.
///
/// The first sample is produced immediately.
pub fn start_sampler(
    source: Box<dyn MetricSource>,
    interval: Duration,
) -> Result<SamplerHandle, ScanError> {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    let (tx, rx) = bounded::<MetricSample>(SAMPLE_CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name("dirscope-metrics".to_owned())
        .spawn(move || run_sampler(Sampler::new(source), interval, cancel_clone, tx))
        .map_err(|source| ScanError::Spawn {
            name: "metrics",
            source,
        })?;

    Ok(SamplerHandle {
        cancel,
        receiver: rx,
    })
}

// ─── Background thread ──────────────────────────────────────────────────────

fn run_sampler(
    mut sampler: Sampler,
    interval: Duration,
    cancel: Arc<AtomicBool>,
    tx: Sender<MetricSample>,
) {
    debug!("Metrics sampler started, interval {:?}", interval);
    let mut unavailable_logged = false;
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let started = Instant::now();
        let sample = sampler.sample();
        let all_gone = sample.cpu_percent == Reading::Unavailable
            && sample.memory == Reading::Unavailable
            && sample.disk_io == Reading::Unavailable;
        if all_gone && !unavailable_logged {
            warn!("System metrics unavailable; showing placeholders");
            unavailable_logged = true;
        } else if !all_gone {
            unavailable_logged = false;
        }

        match tx.try_send(sample) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }

        // Sleep out the rest of the interval in short slices.
        let deadline = started + interval;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            if cancel.load(Ordering::Relaxed) || left.is_zero() {
                break;
            }
            std::thread::sleep(left.min(STOP_POLL));
        }
    }
    debug!("Metrics sampler stopped");
}
