//! Runs collaborator commands (validator, generators, auto-fixers) with a
//! wall-clock limit and bounded output capture.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes kept from one output stream, plus how many were drained and dropped
/// past the limit.
#[derive(Debug, Default)]
pub struct CapturedStream {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl CapturedStream {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        self.stdout.text()
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.text()
    }

    /// Stdout followed by stderr, for pattern matching over everything the tool said.
    pub fn combined_text(&self) -> String {
        let mut text = self.stdout.text();
        if !self.stderr.bytes.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr.text());
        }
        text
    }
}

/// Build a command from a configured argv, run in `workdir`.
pub fn command_from_argv(argv: &[String], workdir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must be a non-empty array"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workdir);
    Ok(cmd)
}

/// Run `cmd` to completion or until `timeout`, whichever comes first.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty
/// child cannot block on a full pipe. At most `output_limit_bytes` per stream
/// are kept. A timed-out child is killed and reported with `timed_out` set.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, "failed to spawn command");
        anyhow!(err).context(format!("spawn {:?}", cmd.get_program()))
    })?;

    if let Some(input) = stdin {
        let mut pipe = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        pipe.write_all(input).context("write stdin")?;
    }

    let stdout = capture(child.stdout.take(), "stdout", output_limit_bytes)?;
    let stderr = capture(child.stderr.take(), "stderr", output_limit_bytes)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!("command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("wait command after kill")?, true)
        }
    };

    let stdout = finish(stdout, "stdout")?;
    let stderr = finish(stderr, "stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn capture<R>(pipe: Option<R>, name: &str, limit: usize) -> Result<JoinHandle<Result<CapturedStream>>>
where
    R: Read + Send + 'static,
{
    let pipe = pipe.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || drain(pipe, limit)))
}

fn finish(handle: JoinHandle<Result<CapturedStream>>, name: &str) -> Result<CapturedStream> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} reader thread panicked"))?
        .with_context(|| format!("read {name}"))
}

fn drain<R: Read>(mut reader: R, limit: usize) -> Result<CapturedStream> {
    let mut captured = CapturedStream::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(captured);
        }
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }
}
