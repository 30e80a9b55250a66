//! Process metrics read from `/proc/self`.

use std::fmt;
use std::path::{Path, PathBuf};

use prometheus_client::collector::Collector;
use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric};
use prometheus_client::metrics::gauge::ConstGauge;
use tracing::debug;

/// Kernel clock ticks per second for `/proc` time fields.
const USER_HZ: f64 = 100.0;

/// Snapshot of the process statistics the collector reports.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    /// Process start time since the epoch in seconds.
    pub start_time_seconds: Option<f64>,
    /// Resident set size in bytes.
    pub resident_memory_bytes: Option<f64>,
    /// Open file descriptors.
    pub open_fds: Option<f64>,
    /// OS threads.
    pub threads: Option<f64>,
}

/// Exposes the `process_*` metrics of the running process.
///
/// Values that cannot be read are left out of the scrape.
#[derive(Debug, Clone)]
pub struct ProcessCollector {
    proc_root: PathBuf,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector {
    /// Reads from `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Reads from a different procfs mount.
    #[must_use]
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Reads a fresh snapshot.
    #[must_use]
    pub fn stats(&self) -> ProcessStats {
        let this = self.proc_root.join("self");
        let read = |path: &Path| match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Process statistics unavailable");
                None
            }
        };

        let start_ticks = read(&this.join("stat")).and_then(|s| parse_start_ticks(&s));
        let boot_time = read(&self.proc_root.join("stat")).and_then(|s| parse_boot_time(&s));
        let status = read(&this.join("status")).unwrap_or_default();

        ProcessStats {
            start_time_seconds: start_ticks
                .zip(boot_time)
                .map(|(ticks, boot)| boot as f64 + ticks as f64 / USER_HZ),
            resident_memory_bytes: status_field(&status, "VmRSS").map(|kb| kb as f64 * 1024.0),
            open_fds: std::fs::read_dir(this.join("fd"))
                .ok()
                .map(|entries| entries.count() as f64),
            threads: status_field(&status, "Threads").map(|n| n as f64),
        }
    }
}

impl Collector for ProcessCollector {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        let stats = self.stats();
        let families = [
            (
                "process_start_time_seconds",
                "Start time of the process since unix epoch in seconds",
                stats.start_time_seconds,
            ),
            (
                "process_resident_memory_bytes",
                "Resident memory size in bytes",
                stats.resident_memory_bytes,
            ),
            ("process_open_fds", "Number of open file descriptors", stats.open_fds),
            ("process_threads", "Number of OS threads in the process", stats.threads),
        ];

        for (name, help, value) in families {
            let Some(value) = value else { continue };
            let gauge = ConstGauge::new(value);
            let metric = encoder.encode_descriptor(name, help, None, gauge.metric_type())?;
            gauge.encode(metric)?;
        }
        Ok(())
    }
}

/// Start time in clock ticks after boot, field 22 of `/proc/<pid>/stat`.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
pub fn parse_start_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    // `rest` starts at field 3 (state).
    rest.split_whitespace().nth(19)?.parse().ok()
}

/// Boot time in seconds since the epoch from `/proc/stat`.
pub fn parse_boot_time(stat: &str) -> Option<u64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

/// Numeric value of `key` in `/proc/<pid>/status`, units dropped.
pub fn status_field(status: &str, key: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name != key {
            return None;
        }
        value.split_whitespace().next()?.parse().ok()
    })
}
