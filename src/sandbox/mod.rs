//! Subprocess-isolated execution with resource limits.
//!
//! The sandbox spawns a fresh Python process running the embedded runtime
//! shim, hands it the job (generated code, serialized capability tokens, the
//! safe-attribute table, limits) over stdin and waits for a single report
//! document on stdout. A dedicated monitor thread watches wall time and
//! memory and terminates the child on breach: a graceful signal first, then
//! a force kill after the grace period. The parent never panics on child
//! failure; an unreachable child is reported as `killed`.

pub mod ipc;
pub mod limits;

pub use self::ipc::{ChildReport, RuntimeViolation, SandboxJob};
pub use self::limits::SandboxLimits;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use serde::Serialize;

const RUNTIME_SHIM: &str = include_str!("runtime.py");
const GRACE_PERIOD: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    Completed,
    Timeout,
    Memory,
}

/// Lifecycle of one sandbox execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Initialized,
    Spawning,
    Running,
    Terminating(TerminationCause),
    Terminated,
}

impl SandboxState {
    fn may_become(self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Initialized, Spawning)
                | (Spawning, Running)
                | (Spawning, Terminated)
                | (Running, Terminating(_))
                | (Terminating(_), Terminated)
        )
    }
}

#[derive(Debug)]
pub enum SandboxError {
    Spawn(String),
    Ipc(String),
}

impl Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::Spawn(message) => write!(f, "could not spawn sandbox: {message}"),
            SandboxError::Ipc(message) => write!(f, "sandbox IPC failure: {message}"),
        }
    }
}

impl std::error::Error for SandboxError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Ok,
    Error,
    Timeout,
    Memory,
    Killed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub cpu_ms: u64,
    pub wall_ms: u64,
    pub peak_memory_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxResult {
    pub status: SandboxStatus,
    pub exit_code: Option<i32>,
    pub return_value: Option<serde_json::Value>,
    pub globals: BTreeMap<String, serde_json::Value>,
    pub stdout: String,
    pub stderr: String,
    pub violations: Vec<RuntimeViolation>,
    pub usage: UsageStats,
}

pub struct Sandbox {
    limits: SandboxLimits,
    interpreter: String,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Sandbox {
            limits,
            interpreter: "python3".to_owned(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Whether the host interpreter can be spawned at all.
    pub fn interpreter_available(&self) -> bool {
        Command::new(&self.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    pub fn execute(&self, job: &SandboxJob) -> Result<SandboxResult, SandboxError> {
        let mut state = SandboxState::Initialized;
        transition(&mut state, SandboxState::Spawning);

        let started = Instant::now();
        let mut child = match Command::new(&self.interpreter)
            .arg("-I")
            .arg("-c")
            .arg(RUNTIME_SHIM)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                transition(&mut state, SandboxState::Terminated);
                return Err(SandboxError::Spawn(error.to_string()));
            }
        };
        let pid = child.id();

        // hand over the job; tokens only, never process-local handles
        let payload = match serde_json::to_string(job) {
            Ok(payload) => payload,
            Err(error) => {
                kill_and_reap(&mut child);
                transition(&mut state, SandboxState::Terminated);
                return Err(SandboxError::Ipc(format!("could not encode job: {error}")));
            }
        };
        {
            let Some(mut stdin) = child.stdin.take() else {
                kill_and_reap(&mut child);
                transition(&mut state, SandboxState::Terminated);
                return Err(SandboxError::Ipc("child stdin unavailable".to_owned()));
            };
            if let Err(error) = stdin.write_all(payload.as_bytes()) {
                kill_and_reap(&mut child);
                transition(&mut state, SandboxState::Terminated);
                return Err(SandboxError::Ipc(format!("could not send job: {error}")));
            }
            // dropping stdin closes the pipe, signalling end of job
        }
        transition(&mut state, SandboxState::Running);

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let done = Arc::new(AtomicBool::new(false));
        let breach: Arc<Mutex<Option<TerminationCause>>> = Arc::new(Mutex::new(None));
        let monitor = {
            let done = Arc::clone(&done);
            let breach = Arc::clone(&breach);
            let limits = self.limits.clone();
            thread::spawn(move || monitor_child(pid, limits, started, done, breach))
        };

        // blocks until the child exits on its own or the monitor kills it
        let exit_status = child.wait();
        done.store(true, Ordering::SeqCst);

        let monitored_peak = monitor.join().unwrap_or(0);
        let raw_stdout = stdout_reader.join().unwrap_or_default();
        let raw_stderr = stderr_reader.join().unwrap_or_default();

        let cause = breach
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or(TerminationCause::Completed);
        transition(&mut state, SandboxState::Terminating(cause));
        transition(&mut state, SandboxState::Terminated);

        let wall_ms = started.elapsed().as_millis() as u64;
        let exit_code = exit_status.ok().and_then(|status| status.code());
        let report: Option<ChildReport> = serde_json::from_str(raw_stdout.trim()).ok();

        let mut result = match report {
            Some(report) => {
                let status = match (cause, report.status.as_str()) {
                    (TerminationCause::Timeout, _) => SandboxStatus::Timeout,
                    (TerminationCause::Memory, _) => SandboxStatus::Memory,
                    (_, "ok") => SandboxStatus::Ok,
                    (_, "memory") => SandboxStatus::Memory,
                    _ => SandboxStatus::Error,
                };
                SandboxResult {
                    status,
                    exit_code,
                    return_value: report.return_value,
                    globals: report.globals,
                    stdout: report.stdout,
                    stderr: report.stderr,
                    violations: report.violations,
                    usage: UsageStats {
                        cpu_ms: report.cpu_ms,
                        wall_ms,
                        peak_memory_bytes: report.peak_memory_bytes.max(monitored_peak),
                    },
                }
            }
            None => {
                // no parseable report: breached, or the child died under us
                let status = match cause {
                    TerminationCause::Timeout => SandboxStatus::Timeout,
                    TerminationCause::Memory => SandboxStatus::Memory,
                    TerminationCause::Completed => SandboxStatus::Killed,
                };
                SandboxResult {
                    status,
                    exit_code,
                    return_value: None,
                    globals: BTreeMap::new(),
                    stdout: String::new(),
                    stderr: raw_stderr.clone(),
                    violations: vec![],
                    usage: UsageStats {
                        cpu_ms: 0,
                        wall_ms,
                        peak_memory_bytes: monitored_peak,
                    },
                }
            }
        };

        if !raw_stderr.is_empty() && result.stderr.is_empty() {
            result.stderr = raw_stderr;
        }

        debug!(
            "sandbox for pid {pid} finished: {:?} after {wall_ms}ms",
            result.status
        );
        Ok(result)
    }
}

fn transition(state: &mut SandboxState, next: SandboxState) {
    if !state.may_become(next) {
        warn!("unexpected sandbox state transition {state:?} -> {next:?}");
    }
    trace!("sandbox state {state:?} -> {next:?}");
    *state = next;
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut source) = source {
            let _ = source.read_to_string(&mut buffer);
        }
        buffer
    })
}

/// Watches wall time and resident memory until the child is done, returning
/// the peak resident size observed.
fn monitor_child(
    pid: u32,
    limits: SandboxLimits,
    started: Instant,
    done: Arc<AtomicBool>,
    breach: Arc<Mutex<Option<TerminationCause>>>,
) -> u64 {
    let mut peak = 0u64;

    while !done.load(Ordering::SeqCst) {
        if started.elapsed().as_millis() as u64 > limits.wall_ms {
            record_breach(&breach, TerminationCause::Timeout);
            terminate(pid);
            break;
        }

        if let Some(rss) = resident_bytes(pid) {
            peak = peak.max(rss);
            if let Some(limit) = limits.memory_bytes {
                if rss > limit {
                    record_breach(&breach, TerminationCause::Memory);
                    terminate(pid);
                    break;
                }
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    peak
}

fn record_breach(breach: &Mutex<Option<TerminationCause>>, cause: TerminationCause) {
    if let Ok(mut slot) = breach.lock() {
        slot.get_or_insert(cause);
    }
}

/// Graceful signal, grace period, then force kill. The child has not been
/// reaped yet, so the pid cannot be reused underneath us.
#[cfg(unix)]
fn terminate(pid: u32) {
    debug!("terminating sandbox child {pid}");
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
    thread::sleep(GRACE_PERIOD);
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

fn kill_and_reap(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(target_os = "linux")]
fn resident_bytes(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes(_pid: u32) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use SandboxState::*;
        assert!(Initialized.may_become(Spawning));
        assert!(Spawning.may_become(Running));
        assert!(Spawning.may_become(Terminated));
        assert!(Running.may_become(Terminating(TerminationCause::Timeout)));
        assert!(Terminating(TerminationCause::Completed).may_become(Terminated));
        assert!(!Initialized.may_become(Running));
        assert!(!Terminated.may_become(Running));
    }

    #[test]
    fn test_spawn_failure_is_structured() {
        let sandbox = Sandbox::new(SandboxLimits::default())
            .with_interpreter("definitely-not-a-real-interpreter");
        let job = SandboxJob {
            code: String::new(),
            modules: BTreeMap::new(),
            capabilities: vec![],
            safe_attributes: vec![],
            limits: SandboxLimits::default(),
        };
        assert!(matches!(
            sandbox.execute(&job),
            Err(SandboxError::Spawn(_))
        ));
    }
}
