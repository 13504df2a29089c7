//! Console and log-file output for a build run
//!
//! Console policy:
//! - `info`/`warn` lines are printed unless `--silent`
//! - `detail` lines are printed only with `--verbose` (and not `--silent`)
//! - errors and the final success/failure line are always printed
//!
//! The log file receives every line the console would receive without
//! `--silent`, so its content never depends on that flag.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{DistributorError, ReportLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Detail,
    Warn,
    Error,
    Success,
    Failure,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO ",
            Level::Detail => "DEBUG",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
            Level::Success => "DONE ",
            Level::Failure => "FAIL ",
        }
    }
}

/// Progress and status output for one build run
pub struct Reporter {
    verbose: bool,
    silent: bool,
    log_path: Option<PathBuf>,
    log: Mutex<Option<BufWriter<File>>>,
    progress: Mutex<Option<ProgressBar>>,
}

impl Reporter {
    /// Create a reporter, truncating (and creating) the log file if one is given
    pub fn new(verbose: bool, silent: bool, log_file: Option<&Path>) -> Result<Self, DistributorError> {
        let log = match log_file {
            Some(path) => Some(open_log(path)?),
            None => None,
        };

        Ok(Self {
            verbose,
            silent,
            log_path: log_file.map(Path::to_path_buf),
            log: Mutex::new(log),
            progress: Mutex::new(None),
        })
    }

    /// Reporter that only prints to the console
    pub fn console(verbose: bool, silent: bool) -> Self {
        Self {
            verbose,
            silent,
            log_path: None,
            log: Mutex::new(None),
            progress: Mutex::new(None),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Path of the log file, if any
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Print an informational progress line
    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(Level::Info, message.as_ref());
    }

    /// Print a line that only matters with `--verbose`
    pub fn detail(&self, message: impl AsRef<str>) {
        if self.verbose {
            self.emit(Level::Detail, message.as_ref());
        }
    }

    /// Print a warning
    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(Level::Warn, message.as_ref());
    }

    /// Print an error; never suppressed
    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(Level::Error, message.as_ref());
    }

    /// Print the final success line; never suppressed
    pub fn success(&self, message: impl AsRef<str>) {
        self.emit(Level::Success, message.as_ref());
    }

    /// Print the final failure line; never suppressed
    pub fn failure(&self, message: impl AsRef<str>) {
        self.emit(Level::Failure, message.as_ref());
    }

    /// Report an error together with its cause chain and hints
    pub fn report_error(&self, err: &anyhow::Error) {
        if let Some(distributor_err) = err.downcast_ref::<DistributorError>() {
            self.report_lines(&distributor_err.report_lines());
            return;
        }

        let mut lines = vec![ReportLine::Error(err.to_string())];
        for cause in err.chain().skip(1) {
            lines.push(ReportLine::Cause(cause.to_string()));
        }
        self.report_lines(&lines);
    }

    fn report_lines(&self, lines: &[ReportLine]) {
        for line in lines {
            match line {
                ReportLine::Error(message) => self.error(message),
                ReportLine::Cause(message) => self.error(format!("  caused by: {}", message)),
                ReportLine::Hint(message) => self.error(format!("  hint: {}", message)),
                ReportLine::Diagnostic(message) => self.error(format!("  | {}", message)),
            }
        }
    }

    /// Start a spinner for a step of unknown length
    pub fn start_spinner(&self, message: &str) -> ProgressBar {
        let pb = if self.silent {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        if let Ok(template) = ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.blue} {msg}")
        {
            pb.set_style(template);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut guard) = self.progress.lock() {
            *guard = Some(pb.clone());
        }
        pb
    }

    /// Finish and detach the active progress bar
    pub fn finish_progress(&self) {
        if let Ok(mut guard) = self.progress.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    /// Flush the log file
    pub fn flush(&self) {
        if let Ok(mut guard) = self.log.lock() {
            if let Some(log) = guard.as_mut() {
                let _ = log.flush();
            }
        }
    }

    fn emit(&self, level: Level, message: &str) {
        self.write_log(level, message);

        let forced = matches!(level, Level::Error | Level::Success | Level::Failure);
        if self.silent && !forced {
            return;
        }

        let rendered = render(level, message);
        let to_stderr = matches!(level, Level::Error | Level::Failure | Level::Warn);

        let print = || {
            let term = if to_stderr { Term::stderr() } else { Term::stdout() };
            let _ = term.write_line(&rendered);
        };

        match self.progress.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(pb) => pb.suspend(print),
                None => print(),
            },
            Err(_) => print(),
        }
    }

    fn write_log(&self, level: Level, message: &str) {
        let Ok(mut guard) = self.log.lock() else {
            return;
        };
        let Some(log) = guard.as_mut() else {
            return;
        };

        for line in message.lines() {
            let _ = writeln!(log, "{} {}", level.tag(), line);
        }
        if matches!(level, Level::Error | Level::Success | Level::Failure) {
            let _ = log.flush();
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.finish_progress();
        self.flush();
    }
}

fn render(level: Level, message: &str) -> String {
    match level {
        Level::Info => format!("{} {}", style("::").cyan().bold(), message),
        Level::Detail => style(message).dim().to_string(),
        Level::Warn => format!("{}: {}", style("warning").yellow().bold(), message),
        Level::Error => format!("{}: {}", style("error").red().bold(), message),
        Level::Success => format!("{} {}", style("✓").green().bold(), message),
        Level::Failure => format!("{} {}", style("✗").red().bold(), message),
    }
}

fn open_log(path: &Path) -> Result<BufWriter<File>, DistributorError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DistributorError::io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| DistributorError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let header = format!(
        "# renpy-distributor {} log, started {}",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    writeln!(writer, "{}", header).map_err(|e| DistributorError::io(path, e))?;

    Ok(writer)
}
