// SIGINT delivery to perf requires libc::kill
#![allow(unsafe_code)]

//! Sampling session driving `perf record` and `perf script`
//!
//! The kernel-side capture is delegated to perf: `perf record -g`
//! attached to the target pid writes a scratch data file, and after
//! recording stops `perf script` dumps it as text that the parser
//! thread normalizes into samples. flamelet owns everything downstream
//! of that text.

use crossbeam_channel::{bounded, Receiver};
use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::script_parser::{Sample, ScriptParser};
use crate::domain::{Pid, ProfilerError, SampleFreq};

/// Capacity of the producer-to-worker sample channel
const SAMPLE_CHANNEL_CAPACITY: usize = 1024;

/// How long to watch a freshly spawned perf for an immediate failure
const ATTACH_PROBE_WINDOW: Duration = Duration::from_millis(400);

/// A live `perf record` attachment to one target process
pub struct PerfSession {
    perf: Child,
    pid: Pid,
    data_path: PathBuf,
    stopped: bool,
}

impl PerfSession {
    /// Attach `perf record` to a running process
    ///
    /// perf's stderr is captured so an immediate failure (vanished pid,
    /// insufficient permission) surfaces as a structured error instead
    /// of an empty profile much later.
    ///
    /// # Errors
    /// `PerfNotFound` if the perf binary is missing, `PermissionDenied`
    /// or `AttachFailed` if perf exits within the probe window.
    pub fn attach(pid: Pid, freq: SampleFreq) -> Result<Self, ProfilerError> {
        let data_path =
            std::env::temp_dir().join(format!("flamelet-{}.perf.data", std::process::id()));

        // DWARF call graphs unwind reliably even without frame pointers,
        // which release builds usually omit
        let mut perf = Command::new("perf")
            .args(["record", "-q", "-g"])
            .args(["-F", &freq.as_hz().to_string()])
            .args(["--call-graph", "dwarf,16384"])
            .args(["-p", &pid.as_raw().to_string()])
            .arg("-o")
            .arg(&data_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProfilerError::PerfNotFound,
                _ => ProfilerError::Io(e),
            })?;

        // Give perf a moment to fail fast
        let probe_start = Instant::now();
        while probe_start.elapsed() < ATTACH_PROBE_WINDOW {
            if let Some(status) = perf.try_wait()? {
                let detail = read_stderr(&mut perf);
                return Err(classify_attach_failure(pid, status, &detail));
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        debug!("perf record attached to {pid} at {freq}");
        Ok(Self { perf, pid, data_path, stopped: false })
    }

    /// Whether perf has already exited on its own (target gone)
    pub fn finished(&mut self) -> bool {
        matches!(self.perf.try_wait(), Ok(Some(_)))
    }

    /// Stop recording
    ///
    /// SIGINT is perf's graceful-stop signal: it flushes the data file
    /// and exits cleanly. perf may already be gone when the target
    /// exited first, or when a terminal Ctrl-C reached the whole
    /// foreground process group; both are fine.
    ///
    /// # Errors
    /// `RecordFailed` if perf died with a real error rather than a stop
    /// signal.
    pub fn stop(&mut self) -> Result<(), ProfilerError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        unsafe {
            libc::kill(self.perf.id() as i32, libc::SIGINT);
        }

        // Drain stderr before reaping so perf can never block on a full
        // pipe while we wait on it
        let stderr_text = read_stderr(&mut self.perf);
        let status = self.perf.wait()?;
        if terminated_by_error(status) {
            let detail = if stderr_text.trim().is_empty() {
                format!("exit status {:?}", status.code())
            } else {
                stderr_text.trim().to_string()
            };
            return Err(ProfilerError::RecordFailed(detail));
        }

        debug!("perf record for {} stopped", self.pid);
        Ok(())
    }

    /// Turn the finished recording into a lazy sample stream
    ///
    /// Stops recording if still running, then spawns `perf script` over
    /// the data file plus a parser thread feeding normalized samples
    /// through a bounded channel. The stream ends when the dump is
    /// exhausted; call [`ScriptReader::join`] after draining it.
    ///
    /// # Errors
    /// Propagates stop failures and perf script spawn failures.
    pub fn read_samples(mut self) -> Result<(SampleStream, ScriptReader), ProfilerError> {
        self.stop()?;

        let mut script = Command::new("perf")
            .args(["script", "--force", "-i"])
            .arg(&self.data_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProfilerError::PerfNotFound,
                _ => ProfilerError::Io(e),
            })?;

        let stdout = script.stdout.take().ok_or_else(|| {
            ProfilerError::ScriptFailed("could not capture perf script stdout".to_string())
        })?;
        let (stream, parser_thread) = spawn_sample_reader(stdout);

        Ok((stream, ScriptReader { parser_thread, script, data_path: self.data_path }))
    }
}

/// Lazy, finite sequence of samples
///
/// The consumer half of the producer channel: iteration blocks until
/// the next sample arrives and ends when the producer disconnects.
pub struct SampleStream {
    rx: Receiver<Sample>,
}

impl Iterator for SampleStream {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        self.rx.recv().ok()
    }
}

/// Producer-side handle: parser thread plus the perf script child
pub struct ScriptReader {
    parser_thread: JoinHandle<u64>,
    script: Child,
    data_path: PathBuf,
}

impl ScriptReader {
    /// Join the producer after the stream is drained
    ///
    /// Returns the number of input lines the parser skipped. Fails when
    /// perf script itself reported an error; callers should treat that
    /// as fatal only if no samples arrived at all.
    pub fn join(mut self) -> Result<u64, ProfilerError> {
        // Drained here while the parser thread drains stdout, so perf
        // script can never block on a full pipe
        let stderr_text = read_stderr(&mut self.script);

        let skipped = self
            .parser_thread
            .join()
            .map_err(|_| ProfilerError::ScriptFailed("parser thread panicked".to_string()))?;

        let status = self.script.wait()?;

        if let Err(e) = std::fs::remove_file(&self.data_path) {
            debug!("could not remove {}: {e}", self.data_path.display());
        }

        if terminated_by_error(status) {
            let detail = if stderr_text.trim().is_empty() {
                format!("exit status {:?}", status.code())
            } else {
                stderr_text.trim().to_string()
            };
            return Err(ProfilerError::ScriptFailed(detail));
        }

        if skipped > 0 {
            warn!("{skipped} unparseable lines in perf script output");
        }
        Ok(skipped)
    }
}

/// Spawn the parser thread over any raw `perf script` text source
///
/// Shared by the live path (perf script stdout) and replay mode (a
/// saved dump file). The returned handle yields the skipped-line count.
pub fn spawn_sample_reader<R>(source: R) -> (SampleStream, JoinHandle<u64>)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(SAMPLE_CHANNEL_CAPACITY);

    let thread = std::thread::spawn(move || {
        let mut parser = ScriptParser::new();
        for line in BufReader::new(source).lines() {
            let Ok(line) = line else { break };
            if let Some(sample) = parser.push_line(&line) {
                if tx.send(sample).is_err() {
                    // Consumer is gone, stop producing
                    return parser.skipped_lines();
                }
            }
        }
        if let Some(sample) = parser.finish() {
            let _ = tx.send(sample);
        }
        parser.skipped_lines()
    });

    (SampleStream { rx }, thread)
}

fn read_stderr(child: &mut Child) -> String {
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf);
    }
    buf
}

fn classify_attach_failure(pid: Pid, status: ExitStatus, stderr: &str) -> ProfilerError {
    let lower = stderr.to_lowercase();
    let detail = if stderr.trim().is_empty() {
        format!("perf record exited immediately with status {:?}", status.code())
    } else {
        stderr.trim().to_string()
    };

    if lower.contains("permission") || lower.contains("not permitted") || lower.contains("paranoid")
    {
        ProfilerError::PermissionDenied(detail)
    } else {
        ProfilerError::AttachFailed { pid, detail }
    }
}

/// Whether an exit status is a real failure
///
/// Death by SIGINT or SIGTERM is the expected stop path, not an error.
fn terminated_by_error(status: ExitStatus) -> bool {
    status.signal().map_or(true, |sig| sig != libc::SIGINT && sig != libc::SIGTERM)
        && !status.success()
}
