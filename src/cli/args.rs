//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flamelet",
    version,
    about = "Sampling profiler that renders flame graphs from perf data",
    after_help = "\
EXAMPLES:
    flamelet my-server                       Auto-detect PID and binary
    flamelet --pid 1234 -d 30                Profile PID 1234 for 30 seconds
    flamelet --pid 1234 --folded out.folded  Write the collapsed stacks too
    flamelet --input script.txt -o out.svg   Re-render a saved perf script dump
    flamelet -- ./my-bench --iterations 50   Launch a command and profile it"
)]
pub struct Args {
    /// Process name to profile (auto-detects PID and binary)
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to profile (binary path auto-detected from /proc)
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..))]
    pub pid: Option<i32>,

    /// Path to binary for symbol resolution (optional, auto-detected if omitted)
    #[arg(short, long)]
    pub binary: Option<PathBuf>,

    /// Sampling frequency in Hz
    #[arg(short = 'F', long, default_value = "99", value_parser = clap::value_parser!(u32).range(1..))]
    pub freq: u32,

    /// Stop after N seconds (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    pub duration: u64,

    /// Flame graph SVG output path
    #[arg(short, long, default_value = "flamegraph.svg")]
    pub output: PathBuf,

    /// Also write collapsed stacks in folded text format
    #[arg(long, value_name = "FILE")]
    pub folded: Option<PathBuf>,

    /// Re-render from a saved `perf script` dump instead of sampling
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Command to launch and profile (everything after --)
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}
