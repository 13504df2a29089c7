//! CLI argument parsing using clap derive macros

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::commands::build::{BuildCommand, BuildEnvironment};
use crate::utils::reporter::Reporter;

/// renpy-distributor - build driver for Ren'Py games
///
/// Packages a Ren'Py project into distributions by driving the Ren'Py SDK.
#[derive(Parser, Debug)]
#[command(name = "renpy-distributor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted before or after the subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Ren'Py project to build (required)
    #[arg(long, global = true, value_name = "PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Root of the Ren'Py SDK (required)
    #[arg(long, global = true, env = "RENPY_SDK_DIR", value_name = "SDK_DIR")]
    pub sdk_dir: Option<PathBuf>,

    /// Directory for intermediate files [default: SDK_DIR/tmp]
    #[arg(long, global = true, value_name = "TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Also write the progress log to this file
    #[arg(long, global = true, value_name = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Regenerate buildinfo.toml by running the project through the SDK
    #[arg(long, global = true)]
    pub legacy_build: bool,

    /// Only print errors and the final result
    #[arg(long, global = true)]
    pub silent: bool,

    /// Print SDK output, command lines and archive contents
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build distributions of a Ren'Py project
    Build(BuildCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> ExitCode {
        if self.global.no_color {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }

        let project_dir = required(self.global.project_dir.as_ref(), "--project-dir <PROJECT_DIR>");
        let sdk_dir = required(self.global.sdk_dir.as_ref(), "--sdk-dir <SDK_DIR>");

        let env = BuildEnvironment {
            project_dir,
            sdk_dir,
            tmp_dir: self.global.tmp_dir.as_deref(),
            log_file: self.global.log_file.as_deref(),
            legacy_build: self.global.legacy_build,
            silent: self.global.silent,
            verbose: self.global.verbose,
        };

        let result = match self.command {
            Commands::Build(cmd) => cmd.execute(&env),
        };

        match result {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(err) => {
                Reporter::console(self.global.verbose, self.global.silent).report_error(&err);
                ExitCode::FAILURE
            }
        }
    }
}

/// Exit with a usage error when a required global option is missing
///
/// Global options can not be marked required in clap, so they are checked here.
fn required<'a>(value: Option<&'a PathBuf>, usage: &str) -> &'a std::path::Path {
    match value {
        Some(path) => path.as_path(),
        None => Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                format!("the following required arguments were not provided:\n  {}", usage),
            )
            .exit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "renpy-distributor",
            "build",
            "--project-dir",
            "/games/vn",
            "--sdk-dir",
            "/opt/sdk",
            "--silent",
            "pc",
            "mac",
        ])
        .unwrap();

        assert_eq!(cli.global.project_dir, Some(PathBuf::from("/games/vn")));
        assert!(cli.global.silent);
        let Commands::Build(cmd) = cli.command;
        assert_eq!(cmd.build_packages, vec!["pc", "mac"]);
    }

    #[test]
    fn test_global_options_before_subcommand() {
        let cli = Cli::try_parse_from([
            "renpy-distributor",
            "--project-dir",
            "/games/vn",
            "--sdk-dir",
            "/opt/sdk",
            "--legacy-build",
            "build",
            "--force-recompile",
            "--no-update",
        ])
        .unwrap();

        assert!(cli.global.legacy_build);
        assert_eq!(cli.global.sdk_dir, Some(PathBuf::from("/opt/sdk")));
        let Commands::Build(cmd) = cli.command;
        assert!(cmd.force_recompile);
        assert!(cmd.no_update);
        assert!(cmd.build_packages.is_empty());
    }
}
