//! Structured error types for flamelet
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only two failure families are fatal: failing to attach the sampler
//! before any data exists, and failing to write the finished artifact.
//! Everything in between degrades per-frame instead of erroring.

use super::types::Pid;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("perf not found in PATH (install linux-perf / perf for your distribution)")]
    PerfNotFound,

    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Failed to attach perf to {pid}: {detail}")]
    AttachFailed { pid: Pid, detail: String },

    #[error("Sampling permission denied: {0}")]
    PermissionDenied(String),

    #[error("perf record failed: {0}")]
    RecordFailed(String),

    #[error("Failed to read samples from perf script: {0}")]
    ScriptFailed(String),

    #[error("Failed to launch {command}: {error}")]
    LaunchFailed { command: String, error: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
