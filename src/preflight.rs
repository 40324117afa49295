//! Pre-flight checks for flamelet
//!
//! Validates system requirements before attaching perf to anything.
//! Provides clear, actionable error messages when requirements aren't
//! met, instead of letting perf fail twenty seconds into a session.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSection};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::domain::{Pid, ProfilerError};

const PERF_EVENT_PARANOID: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Run all pre-flight checks before a live session
pub fn run_preflight_checks(binary_path: Option<&Path>, quiet: bool) -> Result<()> {
    check_perf_available()?;
    check_perf_event_paranoid(quiet)?;
    if let Some(path) = binary_path {
        check_binary_exists(path)?;
        check_debug_symbols(path, quiet)?;
    }
    Ok(())
}

/// Check that the perf binary is runnable at all
pub fn check_perf_available() -> Result<()> {
    let probe = Command::new("perf")
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    if probe.is_err() {
        return Err(ProfilerError::PerfNotFound.into());
    }
    Ok(())
}

/// Check the kernel's unprivileged-profiling policy
///
/// Root bypasses the sysctl entirely. Level 2 still allows profiling
/// your own processes without kernel frames, so it only warns. Level 3
/// and above blocks sampling outright for non-root users.
pub fn check_perf_event_paranoid(quiet: bool) -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    let Ok(raw) = std::fs::read_to_string(PERF_EVENT_PARANOID) else {
        // Missing sysctl, perf itself will complain if it matters
        return Ok(());
    };
    let Ok(level) = raw.trim().parse::<i32>() else {
        return Ok(());
    };

    if level >= 3 {
        return Err(ProfilerError::PermissionDenied(format!(
            "kernel.perf_event_paranoid is {level}\n\n\
             Allow profiling with:\n  \
             sudo sysctl kernel.perf_event_paranoid=1\n\
             or run flamelet as root"
        ))
        .into());
    }

    if level == 2 && !quiet {
        eprintln!("warning: kernel.perf_event_paranoid={level}, kernel frames will be missing");
    }
    Ok(())
}

/// Check if the target binary exists and is readable
pub fn check_binary_exists(binary_path: &Path) -> Result<()> {
    if !binary_path.exists() {
        bail!(
            "Binary not found: {}\n\n\
             Make sure the path is correct and the binary exists.",
            binary_path.display()
        );
    }
    if !binary_path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --binary must point to an executable file, not a directory.",
            binary_path.display()
        );
    }
    Ok(())
}

/// Check if the binary has the symbol information resolution relies on
pub fn check_debug_symbols(binary_path: &Path, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    let file_data = std::fs::read(binary_path)
        .with_context(|| format!("Failed to read binary: {}", binary_path.display()))?;

    let obj = match object::File::parse(&*file_data) {
        Ok(obj) => obj,
        Err(_) => {
            // Not a valid object file, let later stages handle it
            return Ok(());
        }
    };

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    if !has_debug_info && !has_symtab {
        eprintln!("warning: binary stripped, unresolved frames will show as <unknown>");
    } else if !has_debug_info {
        eprintln!("warning: no DWARF debug info, inlined functions will not be expanded");
    }

    Ok(())
}

/// Check if the target process exists
pub fn check_process_exists(pid: Pid) -> Result<()> {
    let proc_path = format!("/proc/{}", pid.as_raw());
    if !Path::new(&proc_path).exists() {
        return Err(ProfilerError::ProcessNotFound(pid).into());
    }
    Ok(())
}

/// Check if we can read the process's memory maps
pub fn check_proc_access(pid: Pid) -> Result<()> {
    let maps_path = format!("/proc/{}/maps", pid.as_raw());
    std::fs::read_to_string(&maps_path).with_context(|| {
        format!(
            "Cannot read {maps_path}\n\n\
             This usually means:\n\
             - The process doesn't exist (check: ps -p {})\n\
             - Permission denied (run with sudo)\n\
             - /proc is not mounted",
            pid.as_raw()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paranoid_check_does_not_panic() {
        // Level and privileges vary by machine, only exercise the path
        let _ = check_perf_event_paranoid(true);
    }

    #[test]
    fn test_binary_not_found() {
        let result = check_binary_exists(Path::new("/nonexistent/path/to/binary"));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Binary not found"));
    }

    #[test]
    fn test_binary_must_be_a_file() {
        let result = check_binary_exists(Path::new("/tmp"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Not a file"));
    }

    #[test]
    fn test_process_not_found() {
        let result = check_process_exists(Pid::new(999_999_999));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_own_process_passes_checks() {
        let me = Pid::from(std::process::id());
        assert!(check_process_exists(me).is_ok());
        assert!(check_proc_access(me).is_ok());
    }

    #[test]
    fn test_debug_symbols_quiet_skips_read() {
        assert!(check_debug_symbols(Path::new("/nonexistent"), true).is_ok());
    }
}
