//! Subprocess execution with line-by-line output streaming

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Number of trailing stderr lines kept for error diagnostics
const STDERR_TAIL: usize = 20;

/// Result of a subprocess execution
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,

    /// Process exit code (None when killed by a signal)
    pub exit_code: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Last lines of standard error
    pub stderr_tail: Vec<String>,

    /// Execution duration
    pub duration: Duration,
}

impl CommandResult {
    /// Create a CommandResult from an exit status
    pub fn from_status(
        status: ExitStatus,
        stdout: String,
        stderr_tail: Vec<String>,
        duration: Duration,
    ) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout,
            stderr_tail,
            duration,
        }
    }
}

/// A line of process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// A command to run
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    pub program: &'a Path,
    pub args: &'a [String],
    pub envs: &'a [(String, String)],
    pub cwd: Option<&'a Path>,
}

impl CommandSpec<'_> {
    /// The command line as a single display string
    pub fn display(&self) -> String {
        let mut parts = vec![quote(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// Run a command, passing every output line to `on_line` as it arrives
///
/// stdout and stderr are drained on two reader threads so a chatty process
/// can not block on a full pipe.
pub fn run_streaming<F>(spec: &CommandSpec<'_>, mut on_line: F) -> Result<CommandResult>
where
    F: FnMut(OutputLine),
{
    let start = Instant::now();

    let mut cmd = Command::new(spec.program);
    cmd.args(spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = spec.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to execute {}", spec.program.display()))?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        readers.push(thread::spawn(move || forward_lines(stdout, tx, OutputLine::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        readers.push(thread::spawn(move || forward_lines(stderr, tx, OutputLine::Stderr)));
    }
    drop(tx);

    let mut stdout = String::new();
    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

    for line in rx {
        match &line {
            OutputLine::Stdout(text) => {
                stdout.push_str(text);
                stdout.push('\n');
            }
            OutputLine::Stderr(text) => {
                if stderr_tail.len() == STDERR_TAIL {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(text.clone());
            }
        }
        on_line(line);
    }

    for reader in readers {
        let _ = reader.join();
    }

    let status = child
        .wait()
        .with_context(|| format!("Failed to wait for {}", spec.program.display()))?;

    Ok(CommandResult::from_status(
        status,
        stdout,
        stderr_tail.into(),
        start.elapsed(),
    ))
}

fn forward_lines<R: Read>(
    source: R,
    tx: mpsc::Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(wrap(text)).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_streams_both_pipes() {
        let args = sh("echo one; echo two >&2; echo three");
        let spec = CommandSpec {
            program: Path::new("/bin/sh"),
            args: &args,
            envs: &[],
            cwd: None,
        };

        let mut lines = Vec::new();
        let result = run_streaming(&spec, |line| lines.push(line)).unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "one\nthree\n");
        assert_eq!(result.stderr_tail, vec!["two".to_string()]);
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&OutputLine::Stderr("two".to_string())));
    }

    #[test]
    fn test_failure_exit_code_and_env() {
        let args = sh("echo \"$RENPY_LOG_BASE\" >&2; exit 4");
        let envs = vec![("RENPY_LOG_BASE".to_string(), "/tmp/base".to_string())];
        let spec = CommandSpec {
            program: Path::new("/bin/sh"),
            args: &args,
            envs: &envs,
            cwd: None,
        };

        let result = run_streaming(&spec, |_| {}).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(4));
        assert_eq!(result.stderr_tail, vec!["/tmp/base".to_string()]);
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let args = sh("i=0; while [ $i -lt 50 ]; do echo line$i >&2; i=$((i+1)); done");
        let spec = CommandSpec {
            program: Path::new("/bin/sh"),
            args: &args,
            envs: &[],
            cwd: None,
        };

        let result = run_streaming(&spec, |_| {}).unwrap();
        assert_eq!(result.stderr_tail.len(), STDERR_TAIL);
        assert_eq!(result.stderr_tail.first().map(String::as_str), Some("line30"));
        assert_eq!(result.stderr_tail.last().map(String::as_str), Some("line49"));
    }

    #[test]
    fn test_missing_program() {
        let spec = CommandSpec {
            program: Path::new("/definitely/not/here"),
            args: &[],
            envs: &[],
            cwd: None,
        };
        assert!(run_streaming(&spec, |_| {}).is_err());
    }

    #[test]
    fn test_display_quotes_spaces() {
        let args = vec!["distribute".to_string(), "/my games/vn".to_string()];
        let spec = CommandSpec {
            program: Path::new("/sdk/python"),
            args: &args,
            envs: &[],
            cwd: None,
        };
        assert_eq!(spec.display(), "/sdk/python distribute \"/my games/vn\"");
    }
}
