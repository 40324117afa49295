//! # flamelet - Main Entry Point
//!
//! Supports three operational modes:
//! - **Attach** (`--pid <PID>` or `flamelet <PROCESS>`): sample a running process
//! - **Launch** (`flamelet -- <cmd> [args]`): spawn a command and profile it
//! - **Replay** (`--input dump.txt`): re-render a saved `perf script` dump

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use flamelet::cli::Args;
use flamelet::domain::{Pid, ProfilerError, SampleFreq};
use flamelet::preflight::{
    check_binary_exists, check_debug_symbols, check_proc_access, check_process_exists,
    run_preflight_checks,
};
use flamelet::process_lookup::{find_process_by_name, resolve_command_path};
use flamelet::session::{run_session, SessionConfig, SessionOutcome, Target};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_ATTACH: i32 = 3;
const EXIT_EMPTY: i32 = 4;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(profiler_err) = err.downcast_ref::<ProfilerError>() {
        return match profiler_err {
            ProfilerError::PermissionDenied(_) => EXIT_NOPERM,
            ProfilerError::PerfNotFound
            | ProfilerError::ProcessNotFound(_)
            | ProfilerError::AttachFailed { .. }
            | ProfilerError::LaunchFailed { .. } => EXIT_ATTACH,
            _ => EXIT_ERROR,
        };
    }

    // Errors built from plain messages are classified by their text
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("operation not permitted") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") || msg.contains("cannot combine") {
        EXIT_USAGE
    } else if msg.contains("no process matching") {
        EXIT_ATTACH
    } else {
        EXIT_ERROR
    }
}

/// Resolve the profiling target and binary path from CLI arguments.
///
/// Supports four modes:
/// - `flamelet my-app` - find process by name, auto-detect binary
/// - `flamelet --pid 1234` - explicit PID, binary auto-detected later
/// - `flamelet -- ./app args` - launch the command and profile it
/// - `flamelet --input dump.txt` - replay a saved perf script dump
fn resolve_target(args: &Args) -> Result<(Target, Option<PathBuf>)> {
    let selected = usize::from(args.process.is_some())
        + usize::from(args.pid.is_some())
        + usize::from(args.input.is_some())
        + usize::from(!args.command.is_empty());
    if selected > 1 {
        bail!(
            "Cannot combine PROCESS, --pid, --input, and a command after --.\n\n\
             Use exactly one:\n  \
             flamelet my-app              (auto-detect PID)\n  \
             flamelet --pid 1234          (explicit PID)\n  \
             flamelet --input dump.txt    (replay a dump)\n  \
             flamelet -- ./app args      (launch and profile)"
        );
    }

    let binary_override = args
        .binary
        .as_ref()
        .map(|path| {
            std::fs::canonicalize(path)
                .with_context(|| format!("Failed to resolve path: {}", path.display()))
        })
        .transpose()?;

    // Mode A: Replay a saved dump
    if let Some(ref input) = args.input {
        return Ok((Target::Replay(input.clone()), binary_override));
    }

    // Mode B: Process name provided - auto-detect PID and binary
    if let Some(ref name) = args.process {
        let info = find_process_by_name(name)?;
        let binary = binary_override.or(Some(info.exe_path));
        return Ok((Target::Attach(info.pid), binary));
    }

    // Mode C: Explicit PID (binary auto-detected from /proc if not given)
    if let Some(pid) = args.pid {
        return Ok((Target::Attach(Pid::new(pid)), binary_override));
    }

    // Mode D: Launch a command
    if !args.command.is_empty() {
        let binary = match binary_override {
            Some(path) => path,
            None => resolve_command_path(&args.command[0])?,
        };
        return Ok((Target::Launch(args.command.clone()), Some(binary)));
    }

    bail!(
        "Missing required argument: PROCESS, --pid, --input, or a command after --\n\n\
         Usage:\n  \
         flamelet my-app              Auto-detect PID and binary\n  \
         flamelet --pid 1234          Explicit PID\n  \
         flamelet --input dump.txt    Replay a saved dump\n  \
         flamelet -- ./app args      Launch and profile\n\n\
         Run 'flamelet --help' for more options"
    )
}

#[tokio::main]
async fn run() -> Result<i32> {
    let args = Args::parse();
    let quiet = args.quiet;

    let (target, binary_path) = resolve_target(&args)?;

    // Pre-flight checks before anything attaches
    match &target {
        Target::Replay(_) => {
            // Re-rendering a dump needs no perf and no live process
            if let Some(path) = &binary_path {
                check_binary_exists(path)?;
                check_debug_symbols(path, quiet)?;
            }
        }
        Target::Attach(pid) => {
            // Complain about a bad target before complaining about perf
            check_process_exists(*pid)?;
            check_proc_access(*pid)?;
            run_preflight_checks(binary_path.as_deref(), quiet)?;
        }
        Target::Launch(_) => {
            run_preflight_checks(binary_path.as_deref(), quiet)?;
        }
    }

    if !quiet {
        println!("flamelet v{}", env!("CARGO_PKG_VERSION"));
        match &target {
            Target::Attach(pid) => println!("pid: {}", pid.as_raw()),
            Target::Launch(command) => println!("command: {}", command.join(" ")),
            Target::Replay(path) => println!("input: {}", path.display()),
        }
        if let Some(path) = &binary_path {
            println!("binary: {}", path.display());
        }
    }

    let config = SessionConfig {
        target,
        freq: SampleFreq::new(args.freq),
        duration: Duration::from_secs(args.duration),
        binary_path,
        output_path: args.output.clone(),
        folded_path: args.folded.clone(),
    };

    let (outcome, stats) = run_session(config).await?;

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} samples ({} unique stacks, {} frames, {} unresolved, {} skipped lines)",
            stats.exit_reason,
            stats.elapsed.as_secs_f64(),
            stats.samples,
            stats.unique_paths,
            stats.frames_seen,
            stats.unresolved_frames,
            stats.skipped_lines,
        );
        println!("saved: {}", args.output.display());
        if let Some(folded) = &args.folded {
            println!("saved: {}", folded.display());
        }
    }

    Ok(match outcome {
        SessionOutcome::Completed => EXIT_SUCCESS,
        SessionOutcome::Empty => {
            if !quiet {
                eprintln!("warning: no samples captured, wrote placeholder output");
            }
            EXIT_EMPTY
        }
    })
}
