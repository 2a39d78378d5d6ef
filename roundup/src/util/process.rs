//! Process introspection helpers.

/// Number of OS threads in the current process.
///
/// Linux reads the `Threads:` line of `/proc/self/status`; other platforms
/// report the tokio worker threads plus the main thread when inside a
/// runtime, and 1 otherwise.
pub fn thread_count() -> usize {
    #[cfg(target_os = "linux")]
    {
        if let Some(count) = thread_count_linux() {
            return count;
        }
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.metrics().num_workers() + 1,
        Err(_) => 1,
    }
}

#[cfg(target_os = "linux")]
fn thread_count_linux() -> Option<usize> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_threads_line(&status)
}

#[cfg(any(target_os = "linux", test))]
fn parse_threads_line(status: &str) -> Option<usize> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Check whether a process with `pid` exists.
///
/// Used by the launcher to report whether a spawned service survived its
/// start-up window.
pub fn is_process_alive(pid: u32) -> bool {
    use sysinfo::{Pid, System};

    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}
