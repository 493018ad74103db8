//! Process signalling helpers.

/// Kill every process in the group led by `pgid` with SIGKILL.
///
/// The group must have been created with `process_group(0)` at spawn time,
/// which makes the child's PID its process-group ID.
///
/// # Returns
/// * `true` - Group was killed or no longer exists
/// * `false` - Failed to kill (permission denied)
#[cfg(unix)]
pub fn kill_process_group(pgid: u32) -> bool {
    unsafe { libc::killpg(pgid as i32, libc::SIGKILL) == 0 || !is_process_alive(pgid) }
}

#[cfg(not(unix))]
pub fn kill_process_group(_pgid: u32) -> bool {
    // No process groups; the runner falls back to killing the direct child
    false
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
///
/// # Returns
/// * `true` - Process exists
/// * `false` - Process does not exist or permission denied
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current() {
        // Current process should always be alive
        let current_pid = std::process::id();
        assert!(is_process_alive(current_pid));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        // Use very high PIDs unlikely to exist
        // Note: u32::MAX becomes -1 when cast to i32, which has special meaning in kill()
        assert!(!is_process_alive(999999999));
        assert!(!is_process_alive(888888888));
    }

    #[test]
    fn test_kill_process_group_of_missing_group() {
        // Nothing to kill counts as success
        assert!(kill_process_group(999999999));
    }

    #[test]
    fn test_kill_process_group_of_spawned_child() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        assert!(kill_process_group(child.id()));
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
