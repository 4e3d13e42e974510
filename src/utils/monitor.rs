use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
    pub requests: u64,
    pub uptime: Duration,
}

/// Process CPU/memory sampling for the dev server's `--monitor` flag.
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    peak_memory: AtomicU64,
    requests: AtomicU64,
    enabled: bool,
}

impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if enabled && pid.is_none() {
            tracing::warn!("Cannot determine current PID, process monitoring disabled");
        }

        Self {
            system: Mutex::new(System::new()),
            pid,
            started: Instant::now(),
            peak_memory: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            enabled: enabled && pid.is_some(),
        }
    }

    pub fn get_stats(&self) -> Option<SystemStats> {
        if !self.enabled {
            return None;
        }
        let pid = self.pid?;

        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = system.process(pid)?;

        let memory_mb = process.memory() / 1024 / 1024;
        // 更新峰值記憶體
        let peak = self.peak_memory.fetch_max(memory_mb, Ordering::Relaxed).max(memory_mb);

        Some(SystemStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: peak,
            requests: self.requests.load(Ordering::Relaxed),
            uptime: self.started.elapsed(),
        })
    }

    /// Count a finished request and log the process footprint after it.
    pub fn record_request(&self, function: &str, status: u16, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 {} ({}) in {:.3}s - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Requests: {}, Uptime: {:?}",
                function,
                status,
                elapsed.as_secs_f64(),
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb,
                stats.requests,
                stats.uptime
            );
        }
    }

    pub fn log_final_stats(&self) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 Final Stats - Requests: {}, Uptime: {:?}, Peak Memory: {}MB",
                stats.requests,
                stats.uptime,
                stats.peak_memory_mb
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_reports_nothing() {
        let monitor = SystemMonitor::new(false);
        assert!(!monitor.is_enabled());
        assert!(monitor.get_stats().is_none());
        monitor.record_request("explain", 200, Duration::from_millis(5));
    }

    #[test]
    fn test_enabled_monitor_counts_requests() {
        let monitor = SystemMonitor::new(true);
        if !monitor.is_enabled() {
            return;
        }
        monitor.record_request("explain", 200, Duration::from_millis(5));
        monitor.record_request("analyze", 401, Duration::from_millis(5));
        let stats = monitor.get_stats().unwrap();
        assert_eq!(stats.requests, 2);
    }
}
