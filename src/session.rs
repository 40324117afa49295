//! Profiling session orchestration
//!
//! Drives one pipeline from target selection to artifact: attach (or
//! launch, or replay), sample until a stop condition, stream the
//! recorded samples through resolution and folding on a worker thread,
//! then render. Resolution and folding are pipelined per sample; the
//! tree leaves the worker by value once the stream ends, so rendering
//! always sees the finished, no-longer-mutated tree.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::collapse::PathTree;
use crate::domain::{Pid, ProfilerError, SampleFreq};
use crate::process_lookup::resolve_exe_path;
use crate::render::{write_folded_file, write_svg_file};
use crate::sampling::{spawn_sample_reader, PerfSession, SampleStream};
use crate::symbolization::{parse_memory_maps, MemoryRange, StackResolver, Symbolizer};

/// What to profile
#[derive(Debug, Clone)]
pub enum Target {
    /// Attach to a running process
    Attach(Pid),
    /// Launch a command and profile it
    Launch(Vec<String>),
    /// Re-process a saved `perf script` dump
    Replay(PathBuf),
}

/// One profiling run, fully described
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub target: Target,
    pub freq: SampleFreq,
    /// Session ceiling; zero means no limit
    pub duration: Duration,
    /// Binary to symbolize against; autodetected from the pid when None
    pub binary_path: Option<PathBuf>,
    pub output_path: PathBuf,
    /// Also write collapsed stacks here
    pub folded_path: Option<PathBuf>,
}

/// Pipeline phase, advanced in one direction only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sampling,
    Resolving,
    Collapsing,
    Rendering,
    Done,
    Aborted,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Samples were captured and the artifact written
    Completed,
    /// Zero samples; a placeholder artifact was still written
    Empty,
}

/// Counters accumulated across one session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub samples: u64,
    pub unique_paths: usize,
    pub frames_seen: u64,
    pub unresolved_frames: u64,
    pub skipped_lines: u64,
    pub elapsed: Duration,
    pub exit_reason: &'static str,
}

fn advance(state: &mut SessionState, next: SessionState) {
    debug!("session state: {state:?} -> {next:?}");
    *state = next;
}

/// Drive one full profiling session from target to artifact
///
/// Fatal failures abort with no artifact. A session that captured zero
/// samples is not a failure: the placeholder artifact is written and
/// the outcome says `Empty`.
///
/// # Errors
/// Attach failures, perf failures with nothing captured, and artifact
/// write failures.
pub async fn run_session(config: SessionConfig) -> Result<(SessionOutcome, SessionStats)> {
    let mut state = SessionState::Idle;
    let started = Instant::now();

    let result = match &config.target {
        Target::Replay(dump) => replay_dump(&config, dump, &mut state),
        Target::Attach(pid) => live_session(&config, *pid, None, &mut state).await,
        Target::Launch(command) => {
            let child = launch_target(command)?;
            let pid = Pid::from(child.id());
            info!("launched {} as {pid}", command.join(" "));
            live_session(&config, pid, Some(child), &mut state).await
        }
    };

    match result {
        Ok((tree, mut stats)) => {
            advance(&mut state, SessionState::Rendering);
            write_svg_file(&tree, &config.output_path)?;
            if let Some(folded) = &config.folded_path {
                write_folded_file(&tree, folded)?;
            }

            stats.samples = tree.total();
            stats.unique_paths = tree.unique_paths();
            stats.elapsed = started.elapsed();
            advance(&mut state, SessionState::Done);

            let outcome = if tree.is_empty() {
                SessionOutcome::Empty
            } else {
                SessionOutcome::Completed
            };
            Ok((outcome, stats))
        }
        Err(e) => {
            advance(&mut state, SessionState::Aborted);
            Err(e)
        }
    }
}

async fn live_session(
    config: &SessionConfig,
    pid: Pid,
    mut launched: Option<Child>,
    state: &mut SessionState,
) -> Result<(PathTree, SessionStats)> {
    // Binary for symbolization: the explicit flag, else the executable
    // behind the pid
    let binary_path = match &config.binary_path {
        Some(path) => Some(path.clone()),
        None => match resolve_exe_path(pid) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("could not resolve executable for {pid}: {e:#}");
                None
            }
        },
    };

    let range = binary_path.as_deref().and_then(|path| {
        match parse_memory_maps(pid, &path.to_string_lossy()) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!("failed to get memory range: {e:#}, symbol resolution may not work");
                None
            }
        }
    });

    advance(state, SessionState::Sampling);
    let mut perf = match PerfSession::attach(pid, config.freq) {
        Ok(perf) => perf,
        Err(e) => {
            reap_launched(&mut launched);
            return Err(e.into());
        }
    };
    info!("profiling {pid} at {}", config.freq);

    let exit_reason = sampling_loop(&mut perf, pid, config.duration).await;
    debug!("sampling ended: {exit_reason}");

    advance(state, SessionState::Resolving);
    let (stream, reader) = match perf.read_samples() {
        Ok(pair) => pair,
        Err(e) => {
            reap_launched(&mut launched);
            return Err(e.into());
        }
    };

    let worker = spawn_collapse_worker(stream, binary_path, range);
    let (tree, frames_seen, unresolved_frames) = join_worker(worker)?;
    let skipped_lines = match reader.join() {
        Ok(skipped) => skipped,
        // With samples in hand a late perf script error is only noise
        Err(e) if !tree.is_empty() => {
            warn!("perf script reported an error after {} samples: {e}", tree.total());
            0
        }
        Err(e) => {
            reap_launched(&mut launched);
            return Err(e.into());
        }
    };
    advance(state, SessionState::Collapsing);

    // A target this session launched does not outlive it
    reap_launched(&mut launched);

    Ok((
        tree,
        SessionStats {
            frames_seen,
            unresolved_frames,
            skipped_lines,
            exit_reason,
            ..SessionStats::default()
        },
    ))
}

fn replay_dump(
    config: &SessionConfig,
    dump: &Path,
    state: &mut SessionState,
) -> Result<(PathTree, SessionStats)> {
    advance(state, SessionState::Sampling);
    let file =
        File::open(dump).with_context(|| format!("Failed to open dump {}", dump.display()))?;
    let (stream, parser_thread) = spawn_sample_reader(file);

    advance(state, SessionState::Resolving);
    let worker = spawn_collapse_worker(stream, config.binary_path.clone(), None);
    let (tree, frames_seen, unresolved_frames) = join_worker(worker)?;
    let skipped_lines =
        parser_thread.join().map_err(|_| anyhow!("sample parser thread panicked"))?;
    advance(state, SessionState::Collapsing);

    Ok((
        tree,
        SessionStats {
            frames_seen,
            unresolved_frames,
            skipped_lines,
            exit_reason: "dump exhausted",
            ..SessionStats::default()
        },
    ))
}

/// Wait for a stop condition while perf records
///
/// Returns why sampling ended: duration ceiling, target exit, perf
/// exit, or Ctrl-C. Ctrl-C from a terminal also reaches perf directly
/// through the foreground process group, which makes it flush and stop
/// on its own; the later explicit stop is then a no-op.
async fn sampling_loop(perf: &mut PerfSession, pid: Pid, duration: Duration) -> &'static str {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let sampling_start = Instant::now();
    let duration_limit = if duration.is_zero() { None } else { Some(duration) };

    // Pre-compute proc path for process liveness check
    let proc_path = format!("/proc/{}", pid.as_raw());

    loop {
        if let Some(limit) = duration_limit {
            if sampling_start.elapsed() >= limit {
                return "duration limit reached";
            }
        }

        if !Path::new(&proc_path).exists() {
            return "process exited";
        }

        if perf.finished() {
            return "perf exited";
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {
                // Continue loop
            }
            _ = &mut ctrl_c => {
                return "interrupted";
            }
        }
    }
}

/// Resolve and fold the stream on a dedicated thread
///
/// The symbolizer is constructed inside the worker so DWARF parsing
/// overlaps with `perf script` startup instead of delaying it.
fn spawn_collapse_worker(
    stream: SampleStream,
    binary_path: Option<PathBuf>,
    range: Option<MemoryRange>,
) -> JoinHandle<(PathTree, u64, u64)> {
    std::thread::spawn(move || {
        let symbolizer = binary_path.and_then(|path| match Symbolizer::new(&path) {
            Ok(symbolizer) => Some(symbolizer),
            Err(e) => {
                warn!("symbol resolution unavailable: {e:#}");
                None
            }
        });

        let mut resolver = StackResolver::new(symbolizer, range);
        let mut tree = PathTree::new();
        for sample in stream {
            let stack = resolver.resolve_stack(&sample);
            tree.fold(&stack);
        }
        (tree, resolver.frames_seen(), resolver.unresolved_frames())
    })
}

fn join_worker(worker: JoinHandle<(PathTree, u64, u64)>) -> Result<(PathTree, u64, u64)> {
    worker.join().map_err(|_| anyhow!("collapse worker thread panicked"))
}

/// Spawn the command to be profiled, stdio inherited
fn launch_target(command: &[String]) -> Result<Child, ProfilerError> {
    let (program, args) = command.split_first().ok_or_else(|| ProfilerError::LaunchFailed {
        command: String::new(),
        error: "empty command".to_string(),
    })?;

    Command::new(program).args(args).spawn().map_err(|e| ProfilerError::LaunchFailed {
        command: program.clone(),
        error: e.to_string(),
    })
}

/// Stop and reap a child this session spawned; attached targets are
/// never touched
fn reap_launched(launched: &mut Option<Child>) {
    if let Some(mut child) = launched.take() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REPLAY_FIXTURE: &str = "\
myapp 4242 [001] 100.000001: cycles:
\t5590 render (/usr/bin/myapp)
\t5560 main (/usr/bin/myapp)

myapp 4242 [000] 100.010002: cycles:
\t5590 render (/usr/bin/myapp)
\t5560 main (/usr/bin/myapp)

myapp 4242 [001] 100.020003: cycles:
\tdeadbeef [unknown] ([unknown])
\t5560 main (/usr/bin/myapp)
";

    fn fixture_config(dir: &Path, dump: PathBuf) -> SessionConfig {
        SessionConfig {
            target: Target::Replay(dump),
            freq: SampleFreq::new(99),
            duration: Duration::ZERO,
            binary_path: None,
            output_path: dir.join("flame.svg"),
            folded_path: Some(dir.join("stacks.folded")),
        }
    }

    fn write_dump(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("dump.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_replay_produces_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let dump = write_dump(dir.path(), REPLAY_FIXTURE);
        let config = fixture_config(dir.path(), dump);

        let (outcome, stats) = run_session(config.clone()).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Completed);
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.unique_paths, 2);
        assert_eq!(stats.frames_seen, 6);
        assert_eq!(stats.unresolved_frames, 1);

        let svg = std::fs::read_to_string(&config.output_path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("main"));
        assert!(svg.contains("&lt;unknown&gt;"));

        let folded = std::fs::read_to_string(config.folded_path.unwrap()).unwrap();
        assert!(folded.lines().any(|l| l == "main;render 2"));
        assert!(folded.lines().any(|l| l == "main;<unknown> 1"));
    }

    #[tokio::test]
    async fn test_replay_of_junk_is_empty_with_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let dump = write_dump(dir.path(), "nothing perf would print\nanother line\n");
        let config = fixture_config(dir.path(), dump);

        let (outcome, stats) = run_session(config.clone()).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Empty);
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.skipped_lines, 2);

        let svg = std::fs::read_to_string(&config.output_path).unwrap();
        assert!(svg.contains("no data"));
        let folded = std::fs::read_to_string(config.folded_path.unwrap()).unwrap();
        assert_eq!(folded, "# no samples recorded\n");
    }

    #[tokio::test]
    async fn test_replay_of_missing_dump_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path(), dir.path().join("absent.txt"));

        assert!(run_session(config.clone()).await.is_err());
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_launch_target_rejects_empty_command() {
        let err = launch_target(&[]).unwrap_err();
        assert!(matches!(err, ProfilerError::LaunchFailed { .. }));
    }

    #[test]
    fn test_launch_target_reports_missing_program() {
        let err = launch_target(&["definitely-not-a-real-binary-1234".to_string()]).unwrap_err();
        match err {
            ProfilerError::LaunchFailed { command, .. } => {
                assert_eq!(command, "definitely-not-a-real-binary-1234");
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_reap_launched_tolerates_exited_child() {
        let mut launched =
            Some(Command::new("true").spawn().expect("spawning true should work"));
        std::thread::sleep(Duration::from_millis(50));
        reap_launched(&mut launched);
        assert!(launched.is_none());
    }
}
