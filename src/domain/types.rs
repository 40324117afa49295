//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a sampling
//! frequency where a PID is expected, and make function signatures more
//! expressive.

use std::fmt;

/// Process ID
///
/// Represents a process ID in the system. Always positive; PID 0 is the
/// kernel's idle task and never a valid profiling target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// Create a new PID (panics if not positive)
    pub fn new(raw: i32) -> Self {
        assert!(raw > 0, "PID must be positive, got {raw}");
        Self(raw)
    }

    /// Raw kernel PID for /proc paths and signal delivery
    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Pid(pid as i32)
    }
}

impl From<Pid> for i32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

/// Sampling frequency in Hertz
///
/// How many stack samples per second the sampler requests. 99 rather
/// than 100 is the usual choice so sampling does not run in lockstep
/// with the kernel's own 100 Hz timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFreq(pub u32);

impl SampleFreq {
    /// Create a new sampling frequency (panics if zero)
    pub fn new(hz: u32) -> Self {
        assert!(hz > 0, "Sampling frequency cannot be zero");
        Self(hz)
    }

    /// Frequency in Hz, for the perf command line
    pub fn as_hz(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SampleFreq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}
