//! Build command implementation

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use crate::build::tasks::register_all;
use crate::build::{BuildContext, BuildFlags, BuildRequest};
use crate::runner::Runner;
use crate::utils::reporter::Reporter;

/// Paths and switches shared by every command
#[derive(Debug, Clone)]
pub struct BuildEnvironment<'a> {
    pub project_dir: &'a Path,
    pub sdk_dir: &'a Path,
    pub tmp_dir: Option<&'a Path>,
    pub log_file: Option<&'a Path>,
    pub legacy_build: bool,
    pub silent: bool,
    pub verbose: bool,
}

/// Build distributions of a Ren'Py project
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Packages to build (default: default_packages from buildinfo.toml,
    /// or every package that is not hidden)
    #[arg(value_name = "BUILD_PACKAGES")]
    pub build_packages: Vec<String>,

    /// Where to put the distributions
    ///
    /// Defaults to `destination` from buildinfo.toml, relative to the
    /// project's parent directory.
    #[arg(long, value_name = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Empty the temporary directory before building (the log file is kept)
    #[arg(long)]
    pub fresh: bool,

    /// Recompile every script during a legacy build
    #[arg(long)]
    pub force_recompile: bool,

    /// Do not build update files
    #[arg(long)]
    pub no_update: bool,

    /// Open the output directory when the build is done
    #[arg(long)]
    pub open: bool,
}

impl BuildCommand {
    /// Execute the build command
    ///
    /// Returns whether every selected package was built. Errors are only
    /// returned when the run could not start at all, e.g. when the log file
    /// can not be created.
    pub fn execute(self, env: &BuildEnvironment<'_>) -> Result<bool> {
        let flags = BuildFlags {
            legacy_build: env.legacy_build,
            silent: env.silent,
            verbose: env.verbose,
            fresh: self.fresh,
            force_recompile: self.force_recompile,
            build_update: !self.no_update,
            open_output: self.open,
        };

        let request = BuildRequest::new(
            env.project_dir,
            env.sdk_dir,
            env.tmp_dir,
            env.log_file,
            self.output_dir.as_deref(),
            self.build_packages,
            flags,
        )?;

        let reporter = Reporter::new(flags.verbose, flags.silent, request.log_file.as_deref())?;
        tracing::debug!(?request, "build requested");
        if flags.force_recompile && !flags.legacy_build {
            reporter.warn("--force-recompile has no effect without --legacy-build");
        }

        let mut runner = Runner::new();
        register_all(&mut runner)?;

        let mut ctx = BuildContext::new(request);
        let summary = runner.run(&mut ctx, &reporter);

        tracing::debug!(
            success = summary.success,
            tasks = summary.executed.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "build finished"
        );
        Ok(summary.success)
    }
}
