//! Memory mapping utilities for process address space analysis
//!
//! Parses /proc/pid/maps to determine where the target binary is loaded,
//! which is essential for symbolizing addresses from position-independent
//! executables (PIE): perf reports runtime addresses, DWARF and symbol
//! tables speak file offsets, and the mapped range is the bridge between
//! the two.

use anyhow::{Context, Result};
use log::info;
use std::fs;

use crate::domain::Pid;

/// Memory range of a loaded binary in a process's address space
#[derive(Debug, Clone, Copy)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Translate a runtime address to a file offset for symbol lookup
    ///
    /// Callers must check `contains` first; subtraction underflows
    /// otherwise.
    #[must_use]
    pub fn rebase(&self, addr: u64) -> u64 {
        addr - self.start
    }
}

/// Parse /proc/pid/maps to find the memory range of a specific binary
///
/// Reads the process's memory maps while the target is still alive and
/// collects every mapping backed by the given binary, returning the
/// range from the minimum start address to the maximum end address.
///
/// # Errors
/// Returns an error if /proc/pid/maps cannot be read or if the binary
/// does not appear in any mapping.
pub fn parse_memory_maps(pid: Pid, binary_path: &str) -> Result<MemoryRange> {
    let maps_path = format!("/proc/{}/maps", pid.as_raw());
    let maps = fs::read_to_string(&maps_path).context(format!("Failed to read {maps_path}"))?;

    let mut start_addr = None;
    let mut end_addr = None;

    // Collect ALL mappings of the target binary to get the full range
    for line in maps.lines() {
        if !line.contains(binary_path) {
            continue;
        }
        // Line layout: "start-end perms offset dev inode pathname"
        let Some(range) = line.split_whitespace().next() else {
            continue;
        };
        let Some((lo, hi)) = range.split_once('-') else {
            continue;
        };
        let start = u64::from_str_radix(lo, 16).context("Failed to parse range start")?;
        let end = u64::from_str_radix(hi, 16).context("Failed to parse range end")?;

        // Track the minimum start and maximum end
        start_addr = Some(start_addr.map_or(start, |s: u64| s.min(start)));
        end_addr = Some(end_addr.map_or(end, |e: u64| e.max(end)));
    }

    match (start_addr, end_addr) {
        (Some(start), Some(end)) => {
            info!(
                "Target memory range: 0x{:x} - 0x{:x} (size: {} KB)",
                start,
                end,
                (end - start) / 1024
            );
            Ok(MemoryRange { start, end })
        }
        _ => Err(anyhow::anyhow!(
            "Could not find memory range for {binary_path} in /proc/{}/maps",
            pid.as_raw()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
        assert!(!range.contains(0x2001));
    }

    #[test]
    fn test_rebase_to_file_offset() {
        let range = MemoryRange { start: 0x5555_5555_0000, end: 0x5555_5556_0000 };
        assert_eq!(range.rebase(0x5555_5555_1234), 0x1234);
    }

    #[test]
    fn test_parse_memory_maps_self() {
        // Parse our own process's memory maps
        let pid = Pid::new(std::process::id() as i32);

        let exe = std::env::current_exe().expect("Failed to get current exe");
        let exe_path = exe.to_str().expect("Failed to convert exe path to string");

        // Success depends on the test environment, so only exercise the path
        let _result = parse_memory_maps(pid, exe_path);
    }
}
