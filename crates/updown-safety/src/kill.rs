//! The kill switch.
//!
//! Graceful-then-forceful shutdown of the trading process with a hard
//! wall-clock ceiling: SIGTERM, wait up to `graceful_timeout_ms`,
//! then SIGKILL. The whole sequence completes within
//! `graceful_timeout_ms + forceful_ceiling_ms`.

use crate::error::{SafetyError, SafetyResult};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Kill switch configuration.
#[derive(Debug, Clone)]
pub struct KillSwitchConfig {
    pub pidfile: PathBuf,
    pub graceful_timeout_ms: u64,
    /// Hard ceiling on the forceful phase. Never above 5000.
    pub forceful_ceiling_ms: u64,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            pidfile: PathBuf::from("updown-bot.pid"),
            graceful_timeout_ms: 10_000,
            forceful_ceiling_ms: 5_000,
        }
    }
}

/// How the kill sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Process exited during the graceful phase.
    Graceful,
    /// SIGKILL was required.
    Forced,
    /// No process was running.
    NotRunning,
}

/// Write the current process id. Called once at startup.
pub fn write_pidfile(path: &Path) -> SafetyResult<()> {
    std::fs::write(path, std::process::id().to_string())?;
    Ok(())
}

/// Read a pid from a pidfile.
pub fn read_pidfile(path: &Path) -> SafetyResult<i32> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SafetyError::Pidfile(format!("cannot read {}: {e}", path.display())))?;
    text.trim()
        .parse()
        .map_err(|e| SafetyError::Pidfile(format!("bad pid in {}: {e}", path.display())))
}

/// Remove the pidfile on clean shutdown.
pub fn remove_pidfile(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), ?e, "Failed to remove pidfile");
    }
}

fn is_alive(pid: Pid) -> bool {
    // Signal 0: existence probe only.
    kill(pid, None).is_ok()
}

/// Run the kill sequence against the pid in the pidfile.
///
/// Errors never block termination: a failed SIGTERM still proceeds to
/// the forceful phase.
pub fn kill_process(config: &KillSwitchConfig) -> SafetyResult<KillOutcome> {
    let ceiling = config.forceful_ceiling_ms.min(5_000);
    let pid = Pid::from_raw(read_pidfile(&config.pidfile)?);

    if !is_alive(pid) {
        info!(%pid, "Process not running");
        return Ok(KillOutcome::NotRunning);
    }

    info!(%pid, "Sending SIGTERM");
    if let Err(e) = kill(pid, Signal::SIGTERM) {
        warn!(%pid, ?e, "SIGTERM failed, escalating");
    }

    let graceful_deadline = Instant::now() + Duration::from_millis(config.graceful_timeout_ms);
    while Instant::now() < graceful_deadline {
        if !is_alive(pid) {
            info!(%pid, "Process exited gracefully");
            return Ok(KillOutcome::Graceful);
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    warn!(%pid, "Graceful timeout expired, sending SIGKILL");
    if let Err(e) = kill(pid, Signal::SIGKILL) {
        // Either it just exited or we cannot touch it; re-probe below.
        warn!(%pid, ?e, "SIGKILL failed");
    }

    let forceful_deadline = Instant::now() + Duration::from_millis(ceiling);
    while Instant::now() < forceful_deadline {
        if !is_alive(pid) {
            info!(%pid, "Process killed");
            return Ok(KillOutcome::Forced);
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    Err(SafetyError::Signal(format!(
        "process {pid} survived SIGKILL past the {ceiling}ms ceiling"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_pidfile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.pid");
        write_pidfile(&path).unwrap();
        assert_eq!(read_pidfile(&path).unwrap(), std::process::id() as i32);
        remove_pidfile(&path);
        assert!(read_pidfile(&path).is_err());
    }

    #[test]
    fn test_bad_pidfile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.pid");
        std::fs::write(&path, "not-a-pid").unwrap();
        assert!(matches!(
            read_pidfile(&path),
            Err(SafetyError::Pidfile(_))
        ));
    }

    #[test]
    fn test_kill_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.pid");
        // A pid that cannot exist.
        std::fs::write(&path, "999999999").unwrap();
        let config = KillSwitchConfig {
            pidfile: path,
            graceful_timeout_ms: 100,
            forceful_ceiling_ms: 100,
        };
        // Either not running, or EINVAL-style pidfile issues; never a hang.
        let outcome = kill_process(&config);
        assert!(matches!(
            outcome,
            Ok(KillOutcome::NotRunning) | Err(SafetyError::Pidfile(_))
        ));
    }

    #[test]
    fn test_kill_terminates_child_within_ceiling() {
        // A child that ignores nothing: SIGTERM ends it in the
        // graceful phase.
        let mut child = Command::new("sleep").arg("60").spawn().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.pid");
        std::fs::write(&path, child.id().to_string()).unwrap();

        // Reap the child as soon as it exits, or the zombie keeps
        // answering the existence probe.
        let reaper = std::thread::spawn(move || {
            let _ = child.wait();
        });

        let config = KillSwitchConfig {
            pidfile: path,
            graceful_timeout_ms: 2_000,
            forceful_ceiling_ms: 2_000,
        };

        let started = Instant::now();
        let outcome = kill_process(&config).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome, KillOutcome::Graceful);
        // Hard bound: graceful + forceful ceiling.
        assert!(elapsed < Duration::from_millis(4_100), "took {elapsed:?}");
        reaper.join().unwrap();
    }

    #[test]
    fn test_forceful_ceiling_clamped() {
        let config = KillSwitchConfig {
            pidfile: PathBuf::from("/nonexistent/bot.pid"),
            graceful_timeout_ms: 10,
            forceful_ceiling_ms: 60_000,
        };
        // Missing pidfile errors fast; the clamp itself is exercised
        // in kill_process via min(5000).
        assert!(kill_process(&config).is_err());
    }
}
