//! Device log stream captured to a file for the lifetime of a recording session.

use crate::log_debug;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

pub const DEFAULT_DEVICE_ADDRESS: &str = "127.0.0.1:58526";

pub fn default_log_command() -> String {
    format!("adb -s {DEFAULT_DEVICE_ADDRESS} logcat")
}

pub fn default_connect_command() -> String {
    format!("adb connect {DEFAULT_DEVICE_ADDRESS}")
}

pub fn default_clear_command() -> String {
    format!("adb -s {DEFAULT_DEVICE_ADDRESS} logcat -c")
}

/// Program plus arguments, split with shell-word rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut words =
            shell_words::split(raw).with_context(|| format!("invalid command line: {raw}"))?;
        if words.is_empty() {
            bail!("command line is empty");
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    fn spawn_error(&self, err: io::Error) -> anyhow::Error {
        if err.kind() == io::ErrorKind::NotFound {
            anyhow!(
                "`{}` not found; install it or put it on PATH to capture device logs",
                self.program
            )
        } else {
            anyhow!("failed to start `{}`: {err}", self.program)
        }
    }
}

/// Result of the optional step that wipes the device's log backlog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Skipped,
    Cleared,
    /// The stream still started; the log may include earlier entries.
    Failed(String),
}

/// External log-streaming process whose stdout is appended to a file.
///
/// `start` runs connect, then clear, then the stream. `stop` kills the stream
/// and is safe to call repeatedly or without a prior `start`. Dropping the
/// session stops it.
pub struct LogCaptureSession {
    command: ToolCommand,
    connect: Option<ToolCommand>,
    clear: Option<ToolCommand>,
    connect_child: Option<Child>,
    child: Option<Child>,
    log_path: Option<PathBuf>,
}

impl LogCaptureSession {
    pub fn new(command: ToolCommand, connect: Option<ToolCommand>) -> Self {
        Self {
            command,
            connect,
            clear: None,
            connect_child: None,
            child: None,
            log_path: None,
        }
    }

    /// Run `clear` to completion before the stream starts.
    pub fn with_clear(mut self, clear: Option<ToolCommand>) -> Self {
        self.clear = clear;
        self
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Connect (best effort), clear the backlog, and start streaming into
    /// `log_path`. An error means the session should continue without device
    /// logs.
    pub fn start(&mut self, log_path: &Path) -> Result<ClearOutcome> {
        if self.child.is_some() {
            return Ok(ClearOutcome::Skipped);
        }
        self.spawn_connect();
        let cleared = self.clear_backlog();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?;
        let child = self
            .command
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| self.command.spawn_error(err))?;
        log_debug(&format!(
            "log capture started: pid={} file={}",
            child.id(),
            log_path.display()
        ));
        self.child = Some(child);
        self.log_path = Some(log_path.to_path_buf());
        Ok(cleared)
    }

    fn spawn_connect(&mut self) {
        let Some(connect) = &self.connect else {
            return;
        };
        match connect
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => self.connect_child = Some(child),
            Err(err) => log_debug(&format!(
                "device connect step skipped: {:#}",
                connect.spawn_error(err)
            )),
        }
    }

    fn clear_backlog(&mut self) -> ClearOutcome {
        let Some(clear) = &self.clear else {
            return ClearOutcome::Skipped;
        };
        // The clear needs the device attached, so let the connect step finish.
        if let Some(mut connect) = self.connect_child.take() {
            if let Err(err) = connect.wait() {
                log_debug(&format!("failed to wait for device connect step: {err}"));
            }
        }
        let status = clear
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let outcome = match status {
            Ok(status) if status.success() => ClearOutcome::Cleared,
            Ok(status) => ClearOutcome::Failed(format!("`{}` exited with {status}", clear.program)),
            Err(err) => ClearOutcome::Failed(format!("{:#}", clear.spawn_error(err))),
        };
        log_debug(&format!("device log clear: {outcome:?}"));
        outcome
    }

    pub fn stop(&mut self) {
        for child in [self.child.take(), self.connect_child.take()]
            .into_iter()
            .flatten()
        {
            reap(child);
        }
    }
}

impl Drop for LogCaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap(mut child: Child) {
    let pid = child.id();
    if let Err(err) = child.kill() {
        // InvalidInput means it already exited.
        if err.kind() != io::ErrorKind::InvalidInput {
            log_debug(&format!("failed to kill log process {pid}: {err}"));
        }
    }
    if let Err(err) = child.wait() {
        log_debug(&format!("failed to reap log process {pid}: {err}"));
    }
}
