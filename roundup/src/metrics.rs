//! Process metrics reported by `GET /performance`.

use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

use crate::savings::schema::PerformanceResponse;
use crate::util::thread_count;

/// Samples uptime, resident memory and thread count of the current process.
#[derive(Debug, Clone)]
pub struct ProcessMetrics {
    started_at: Instant,
}

impl ProcessMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Resident set size in bytes, if the platform exposes it.
    pub fn memory_bytes(&self) -> Option<u64> {
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_process(pid);
        sys.process(pid).map(|process| process.memory())
    }

    pub fn snapshot(&self) -> PerformanceResponse {
        let memory_mb = self.memory_bytes().unwrap_or(0) as f64 / (1024.0 * 1024.0);
        PerformanceResponse {
            time: format_uptime(self.uptime()),
            memory: format!("{memory_mb:.2} MB"),
            threads: thread_count(),
        }
    }
}

impl Default for ProcessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// `HH:MM:SS.000`: whole seconds only, the fraction is always zero.
/// Hours keep growing past 99.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02}.000")
}
