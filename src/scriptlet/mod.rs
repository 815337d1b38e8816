// src/scriptlet/mod.rs

//! Package script execution
//!
//! Install, uninstall and verify scripts ship inside the package archive and
//! run from the unpacked working directory. The interpreter is chosen from
//! the script's extension. Scripts get a null stdin, their output is
//! forwarded to the log line by line, and they are killed on timeout or
//! cancellation.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::filesystem;
use crate::packages::{PkgSpec, Script};
use crate::version::Version;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// How often a running script is checked for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which package script is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Install,
    Uninstall,
    Verify,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Install => "install",
            Phase::Uninstall => "uninstall",
            Phase::Verify => "verify",
        }
    }
}

/// Program and leading arguments used to run a script
fn interpreter_for(script: &Path) -> (OsString, Vec<OsString>) {
    let ext = script
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let path = script.as_os_str().to_os_string();

    match ext.as_str() {
        "ps1" => (
            "powershell".into(),
            vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-File".into(),
                path,
            ],
        ),
        "cmd" | "bat" => ("cmd".into(), vec!["/c".into(), path]),
        "msi" => (
            "msiexec".into(),
            vec!["/i".into(), path, "/qn".into(), "/norestart".into()],
        ),
        "sh" => ("sh".into(), vec![path]),
        _ => (path, Vec::new()),
    }
}

/// Runs package scripts for one installation root
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    root: PathBuf,
    timeout: Duration,
    cancel: CancelToken,
}

impl ScriptRunner {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            root: root.into(),
            timeout,
            cancel,
        }
    }

    /// Run `script` from `work_dir` and return its exit code
    ///
    /// Exit codes other than 0 and the script's declared success codes fail
    /// with [`Error::ScriptError`], as do timeouts and cancellation.
    pub fn run(
        &self,
        phase: Phase,
        spec: &PkgSpec,
        script: &Script,
        work_dir: &Path,
        previous_version: Option<&Version>,
    ) -> Result<i32> {
        let script_path = resolve_script(work_dir, &script.path)?;
        let (program, mut args) = interpreter_for(&script_path);
        args.extend(script.args.iter().map(OsString::from));

        info!("Running {} script for {}", phase.as_str(), spec);
        debug!("Executing {:?} {:?} in {}", program, args, work_dir.display());

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(work_dir)
            .env("GOOGET_ROOT", &self.root)
            .env("GOOGET_WORKDIR", work_dir)
            .env("GOOGET_PACKAGE_NAME", &spec.name)
            .env("GOOGET_PACKAGE_VERSION", spec.version.as_str())
            .env("GOOGET_PHASE", phase.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        match previous_version {
            Some(v) => command.env("GOOGET_PREVIOUS_VERSION", v.as_str()),
            None => command.env_remove("GOOGET_PREVIOUS_VERSION"),
        };

        let mut child = command.spawn().map_err(|e| {
            Error::ScriptError(format!(
                "{}: failed to spawn {} script {}: {}",
                spec,
                phase.as_str(),
                script.path,
                e
            ))
        })?;

        let tag = format!("{} {}", spec.name, phase.as_str());
        let stdout = forward_lines(child.stdout.take(), tag.clone(), false);
        let stderr = forward_lines(child.stderr.take(), tag, true);

        let code = match self.wait(&mut child)? {
            WaitOutcome::Exited(code) => {
                for handle in [stdout, stderr].into_iter().flatten() {
                    let _ = handle.join();
                }
                code
            }
            // Grandchildren may still hold the pipes; the log threads are detached
            WaitOutcome::TimedOut => {
                return Err(Error::ScriptError(format!(
                    "{}: {} script timed out after {} seconds",
                    spec,
                    phase.as_str(),
                    self.timeout.as_secs()
                )));
            }
            WaitOutcome::Cancelled => {
                return Err(Error::ScriptError(format!(
                    "{}: {} script terminated by cancellation",
                    spec,
                    phase.as_str()
                )));
            }
        };

        if script.is_success(code) {
            info!("{} script for {} completed (exit code {})", phase.as_str(), spec, code);
            Ok(code)
        } else {
            Err(Error::ScriptError(format!(
                "{}: {} script failed with exit code {}",
                spec,
                phase.as_str(),
                code
            )))
        }
    }

    fn wait(&self, child: &mut Child) -> Result<WaitOutcome> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.cancel.is_cancelled() {
                kill(child);
                return Ok(WaitOutcome::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                kill(child);
                return Ok(WaitOutcome::TimedOut);
            }
            let slice = POLL_INTERVAL.min(deadline - now);
            if let Some(status) = child.wait_timeout(slice)? {
                // Killed by a signal reports no code
                return Ok(WaitOutcome::Exited(status.code().unwrap_or(-1)));
            }
        }
    }
}

enum WaitOutcome {
    Exited(i32),
    TimedOut,
    Cancelled,
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill script process: {}", e);
    }
    let _ = child.wait();
}

/// Log each line of a child stream from a background thread
fn forward_lines<R: Read + Send + 'static>(
    stream: Option<R>,
    tag: String,
    is_stderr: bool,
) -> Option<JoinHandle<()>> {
    let stream = stream?;
    Some(thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) if is_stderr => warn!("[{}] {}", tag, line),
                Ok(line) => info!("[{}] {}", tag, line),
                Err(_) => break,
            }
        }
    }))
}

/// Resolve an archive-relative script path inside `work_dir`
fn resolve_script(work_dir: &Path, relative: &str) -> Result<PathBuf> {
    let path = filesystem::safe_join(work_dir, relative)
        .map_err(|e| Error::ScriptError(format!("invalid script path: {}", e)))?;
    if !path.is_file() {
        return Err(Error::ScriptError(format!(
            "script {} not found in package",
            relative
        )));
    }
    Ok(path)
}
