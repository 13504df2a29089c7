//! Error types and helpers for user-friendly error messages
//!
//! Every failure a build run can hit is one of these kinds, so the console and
//! the log file can always say *what* failed and *where*, plus a hint on how
//! to fix it.

use std::path::PathBuf;

use thiserror::Error;

/// Attributable build driver errors with hints
#[derive(Error, Debug)]
pub enum DistributorError {
    /// Bad paths, invalid options or invalid build info
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
        hint: Option<String>,
    },

    /// `buildinfo.toml` is absent and no legacy build was requested
    #[error("Missing build info: {} does not exist", path.display())]
    MissingBuildInfo { path: PathBuf, hint: String },

    /// A requested build package is not declared in the build info
    #[error("Unknown build package '{package}'")]
    UnknownPackage {
        package: String,
        available: Vec<String>,
    },

    /// The Ren'Py SDK process failed
    #[error("Ren'Py SDK failed while {action}: {message}")]
    SdkInvocation {
        action: String,
        message: String,
        exit_code: Option<i32>,
        diagnostics: Vec<String>,
        hint: Option<String>,
    },

    /// Filesystem errors on paths the driver owns (log file, tmp dir, output dir)
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more build packages failed
    #[error("{} of {total} build package(s) failed: {}", failed.len(), failed.join(", "))]
    PackagesFailed { failed: Vec<String>, total: usize },
}

impl DistributorError {
    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
            hint: None,
        }
    }

    /// Create a configuration error with source and hint
    pub fn config_error_with_hint(
        message: impl Into<String>,
        source: Option<anyhow::Error>,
        hint: impl Into<String>,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source,
            hint: Some(hint.into()),
        }
    }

    /// Create a missing build info error for the given file
    pub fn missing_build_info(path: impl Into<PathBuf>) -> Self {
        Self::MissingBuildInfo {
            path: path.into(),
            hint: hints::missing_build_info().to_string(),
        }
    }

    /// Create an unknown package error
    pub fn unknown_package(package: impl Into<String>, available: &[String]) -> Self {
        Self::UnknownPackage {
            package: package.into(),
            available: available.to_vec(),
        }
    }

    /// Create an SDK invocation error
    pub fn sdk_failure(
        action: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
        diagnostics: Vec<String>,
    ) -> Self {
        Self::SdkInvocation {
            action: action.into(),
            message: message.into(),
            exit_code,
            diagnostics,
            hint: None,
        }
    }

    /// Attach a hint to an SDK invocation error
    pub fn with_sdk_hint(self, new_hint: impl Into<String>) -> Self {
        match self {
            Self::SdkInvocation {
                action,
                message,
                exit_code,
                diagnostics,
                ..
            } => Self::SdkInvocation {
                action,
                message,
                exit_code,
                diagnostics,
                hint: Some(new_hint.into()),
            },
            other => other,
        }
    }

    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Render the error with its hints as plain lines
    ///
    /// The reporter decides where the lines go and how they are styled, so
    /// the same text ends up on the console and in the log file.
    pub fn report_lines(&self) -> Vec<ReportLine> {
        let mut lines = vec![ReportLine::Error(self.to_string())];

        if let DistributorError::Config {
            source: Some(source),
            ..
        } = self
        {
            for cause in source.chain() {
                lines.push(ReportLine::Cause(cause.to_string()));
            }
        }
        if let DistributorError::Io { source, .. } = self {
            lines.push(ReportLine::Cause(source.to_string()));
        }

        match self {
            DistributorError::Config { hint, .. } | DistributorError::SdkInvocation { hint, .. } => {
                if let Some(h) = hint {
                    lines.push(ReportLine::Hint(h.clone()));
                }
            }
            DistributorError::MissingBuildInfo { hint, .. } => {
                lines.push(ReportLine::Hint(hint.clone()));
            }
            DistributorError::UnknownPackage { available, .. } => {
                if available.is_empty() {
                    lines.push(ReportLine::Hint(
                        "buildinfo.toml declares no packages".to_string(),
                    ));
                } else {
                    lines.push(ReportLine::Hint(format!(
                        "Choose from: {}",
                        available.join(", ")
                    )));
                }
            }
            DistributorError::Io { .. } | DistributorError::PackagesFailed { .. } => {}
        }

        if let DistributorError::SdkInvocation {
            exit_code,
            diagnostics,
            ..
        } = self
        {
            if let Some(code) = exit_code {
                lines.push(ReportLine::Diagnostic(format!("exit code {}", code)));
            }
            for diag in diagnostics {
                lines.push(ReportLine::Diagnostic(diag.clone()));
            }
        }

        lines
    }
}

/// One line of a rendered error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Error(String),
    Cause(String),
    Hint(String),
    Diagnostic(String),
}

/// Common error hints
pub mod hints {
    /// Hint for a project without buildinfo.toml
    pub fn missing_build_info() -> &'static str {
        "Run again with --legacy-build to compile the project and generate buildinfo.toml,\n\
         or write buildinfo.toml into the project directory by hand."
    }

    /// Hint for an SDK directory without a usable interpreter
    pub fn sdk_layout() -> &'static str {
        "SDK-DIR must point at the root of an unpacked Ren'Py 8 SDK, the directory\n\
         that contains renpy.py, renpy/ and lib/py3-<platform>/."
    }

    /// Hint for a failed legacy compile
    pub fn legacy_compile() -> &'static str {
        "Could not get build data from the project. Make sure the project launches\n\
         from the Ren'Py launcher and see the log file for the SDK output."
    }

    /// Hint for a failed distribute run
    pub fn distribute() -> &'static str {
        "Re-run with --verbose to see the SDK output for this package."
    }

    /// Hint for invalid buildinfo.toml
    pub fn invalid_build_info() -> &'static str {
        "buildinfo.toml is invalid. Common issues:\n\
         • Missing directory_name, executable_name or version\n\
         • Invalid TOML syntax (check quotes, brackets, commas)\n\
         • A package listing an unknown format or platform\n\
         \n\
         Delete the file and run with --legacy-build to regenerate it."
    }
}
