//! Lightweight render-health monitor: counters over render outcomes plus
//! best-effort process memory, disk, and thread readings.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::render::RenderStats;

#[derive(Debug, Clone, PartialEq)]
pub struct SystemMetrics {
    /// Share of the latency budget consumed across recorded renders,
    /// as a percentage.
    pub cpu_usage: f64,
    /// Resident set size as a share of system memory, percent. Zero on
    /// platforms without procfs.
    pub memory_usage: f64,
    /// Used share of the root filesystem, percent. Zero where statvfs is
    /// unavailable.
    pub disk_usage: f64,
    /// Thread count of this process. At least 1.
    pub active_threads: u64,
    pub average_latency_ms: f64,
    pub total_renders: u64,
    pub successful_renders: u64,
    pub monitoring: bool,
}

pub struct SystemMonitor {
    active: AtomicBool,
    total: AtomicU64,
    successful: AtomicU64,
    latency_us: AtomicU64,
    budget_us: AtomicU64,
}

impl SystemMonitor {
    /// Monitoring starts enabled.
    pub fn new() -> Self {
        SystemMonitor {
            active: AtomicBool::new(true),
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
            budget_us: AtomicU64::new(0),
        }
    }

    /// (Re)start monitoring. Counters reset here and only here.
    pub fn start(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.latency_us.store(0, Ordering::Relaxed);
        self.budget_us.store(0, Ordering::Relaxed);
        self.active.store(true, Ordering::Relaxed);
    }

    /// Stop recording; accumulated counters stay readable.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn record(&self, stats: &RenderStats, budget_ms: f64) {
        if !self.is_active() {
            return;
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        if stats.realtime_success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_us
            .fetch_add((stats.render_time_ms * 1000.0) as u64, Ordering::Relaxed);
        self.budget_us
            .fetch_add((budget_ms.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> SystemMetrics {
        let total = self.total.load(Ordering::Relaxed);
        let latency_us = self.latency_us.load(Ordering::Relaxed);
        let budget_us = self.budget_us.load(Ordering::Relaxed);
        let cpu_usage = if budget_us > 0 {
            (latency_us as f64 / budget_us as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        let average_latency_ms = if total > 0 {
            latency_us as f64 / 1000.0 / total as f64
        } else {
            0.0
        };
        SystemMetrics {
            cpu_usage,
            memory_usage: memory_usage_percent(),
            disk_usage: disk_usage_percent(),
            active_threads: active_threads(),
            average_latency_ms,
            total_renders: total,
            successful_renders: self.successful.load(Ordering::Relaxed),
            monitoring: self.is_active(),
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        SystemMonitor::new()
    }
}

/// Resident set size over total system memory via procfs. Assumes 4 KiB
/// pages; returns 0.0 anywhere the files are missing.
#[cfg(target_os = "linux")]
fn memory_usage_percent() -> f64 {
    let resident_kb = std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| {
            s.split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map(|pages| pages * 4)
        .unwrap_or(0);
    let total_kb = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("MemTotal:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
        })
        .unwrap_or(0);
    if total_kb == 0 {
        return 0.0;
    }
    resident_kb as f64 / total_kb as f64 * 100.0
}

#[cfg(not(target_os = "linux"))]
fn memory_usage_percent() -> f64 {
    0.0
}

/// Used fraction of the root filesystem via statvfs.
#[cfg(target_os = "linux")]
fn disk_usage_percent() -> f64 {
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(b"/\0".as_ptr() as *const libc::c_char, &mut stat) };
    if rc != 0 || stat.f_blocks == 0 {
        return 0.0;
    }
    let used = stat.f_blocks.saturating_sub(stat.f_bfree);
    used as f64 / stat.f_blocks as f64 * 100.0
}

#[cfg(not(target_os = "linux"))]
fn disk_usage_percent() -> f64 {
    0.0
}

/// Thread count from /proc/self/status; the engine itself is
/// single-threaded, so 1 is the floor.
#[cfg(target_os = "linux")]
fn active_threads() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("Threads:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|n| n.parse().ok())
        })
        .unwrap_or(1)
}

#[cfg(not(target_os = "linux"))]
fn active_threads() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(ms: f64, ok: bool) -> RenderStats {
        RenderStats {
            render_time_ms: ms,
            blocks: 1,
            realtime_success: ok,
        }
    }

    #[test]
    fn records_averages_and_success_counts() {
        let m = SystemMonitor::new();
        m.record(&stats(4.0, true), 10.0);
        m.record(&stats(8.0, false), 10.0);
        let metrics = m.metrics();
        assert_eq!(metrics.total_renders, 2);
        assert_eq!(metrics.successful_renders, 1);
        assert!((metrics.average_latency_ms - 6.0).abs() < 0.01);
        assert!((metrics.cpu_usage - 60.0).abs() < 0.5, "{}", metrics.cpu_usage);
    }

    #[test]
    fn resource_readings_stay_in_range() {
        let metrics = SystemMonitor::new().metrics();
        assert!((0.0..=100.0).contains(&metrics.memory_usage), "{}", metrics.memory_usage);
        assert!((0.0..=100.0).contains(&metrics.disk_usage), "{}", metrics.disk_usage);
        assert!(metrics.active_threads >= 1);
    }

    #[test]
    fn stop_suspends_recording_but_keeps_counters() {
        let m = SystemMonitor::new();
        m.record(&stats(5.0, true), 10.0);
        m.stop();
        m.record(&stats(5.0, true), 10.0);
        let metrics = m.metrics();
        assert_eq!(metrics.total_renders, 1);
        assert!(!metrics.monitoring);
    }

    #[test]
    fn restart_resets_counters() {
        let m = SystemMonitor::new();
        m.record(&stats(5.0, true), 10.0);
        m.stop();
        m.start();
        assert_eq!(m.metrics().total_renders, 0);
        assert!(m.is_active());
    }

    #[test]
    fn cpu_usage_saturates_at_full_budget() {
        let m = SystemMonitor::new();
        m.record(&stats(50.0, false), 10.0);
        assert_eq!(m.metrics().cpu_usage, 100.0);
    }
}
