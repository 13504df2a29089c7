//! Ren'Py SDK invocation
//!
//! The SDK ships its own Python 3 interpreter under `lib/py3-<platform>/`.
//! Everything the driver asks of the SDK goes through that interpreter and
//! `renpy.py`:
//!
//! ```text
//! <python> <sdk>/renpy.py <project> compile --keep-orphan-rpyc --json-dump <tmp>/dump.json
//! <python> <sdk>/renpy.py <sdk>/launcher distribute <project> --destination <out> --package <name> [--format <f>]...
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::subprocess::{run_streaming, CommandResult, CommandSpec, OutputLine};
use crate::config::buildinfo::PackageSpec;
use crate::error::{hints, DistributorError};
use crate::utils::reporter::Reporter;

/// Python library directory of the SDK for the host platform
pub fn host_python_lib() -> Option<(&'static str, &'static str)> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", _) => Some(("py3-windows-x86_64", "python.exe")),
        ("macos", _) => Some(("py3-mac-universal", "python")),
        ("linux", "x86_64") => Some(("py3-linux-x86_64", "python")),
        ("linux", "aarch64") => Some(("py3-linux-aarch64", "python")),
        ("linux", "arm") => Some(("py3-linux-armv7l", "python")),
        _ => None,
    }
}

/// A located Ren'Py SDK
#[derive(Debug, Clone)]
pub struct RenPySdk {
    /// SDK root directory
    sdk_dir: PathBuf,
    /// Bundled Python interpreter
    python: PathBuf,
    /// SDK entry script
    renpy_py: PathBuf,
}

impl RenPySdk {
    /// Locate the interpreter and entry script inside `sdk_dir`
    pub fn locate(sdk_dir: &Path) -> Result<Self, DistributorError> {
        let (lib, executable) = host_python_lib().ok_or_else(|| {
            DistributorError::config_error(format!(
                "The Ren'Py SDK has no interpreter for this host ({}-{})",
                std::env::consts::OS,
                std::env::consts::ARCH
            ))
        })?;

        let python = sdk_dir.join("lib").join(lib).join(executable);
        if !python.is_file() {
            return Err(DistributorError::config_error_with_hint(
                format!("Ren'Py interpreter does not exist: {}", python.display()),
                None,
                hints::sdk_layout(),
            ));
        }

        let renpy_py = sdk_dir.join("renpy.py");
        if !renpy_py.is_file() {
            return Err(DistributorError::config_error_with_hint(
                format!("renpy.py does not exist: {}", renpy_py.display()),
                None,
                hints::sdk_layout(),
            ));
        }

        Ok(Self {
            sdk_dir: sdk_dir.to_path_buf(),
            python,
            renpy_py,
        })
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Arguments that launch `basedir` through renpy.py
    pub fn launch_args(&self, basedir: &Path, args: &[String]) -> Vec<String> {
        let mut full_args = vec![
            self.renpy_py.to_string_lossy().into_owned(),
            basedir.to_string_lossy().into_owned(),
        ];
        full_args.extend(args.iter().cloned());
        full_args
    }

    /// Arguments for the legacy compile pass that dumps build data to `dump_file`
    pub fn compile_args(&self, project: &Path, dump_file: &Path, force_recompile: bool) -> Vec<String> {
        let mut args: Vec<String> = if force_recompile {
            vec!["compile".to_string(), "--keep-orphan-rpyc".to_string()]
        } else {
            vec!["quit".to_string()]
        };
        args.push("--json-dump".to_string());
        args.push(dump_file.to_string_lossy().into_owned());

        self.launch_args(project, &args)
    }

    /// Arguments for the launcher's `distribute` command for one package
    ///
    /// `build_update` is the combined decision of the command line and the
    /// build info; the package's formats and archive setting are forwarded.
    pub fn distribute_args(
        &self,
        project: &Path,
        destination: &Path,
        name: &str,
        package: &PackageSpec,
        build_update: bool,
    ) -> Vec<String> {
        let mut args = vec![
            "distribute".to_string(),
            project.to_string_lossy().into_owned(),
            "--destination".to_string(),
            destination.to_string_lossy().into_owned(),
            "--package".to_string(),
            name.to_string(),
        ];
        for format in &package.formats {
            args.push("--format".to_string());
            args.push(format.clone());
        }
        if package.ignore_archives {
            args.push("--no-archive".to_string());
        }
        if !build_update {
            args.push("--no-update".to_string());
        }

        self.launch_args(&self.sdk_dir.join("launcher"), &args)
    }

    /// Environment forwarding the tmp dir to the SDK
    pub fn environment(tmp_dir: &Path) -> Vec<(String, String)> {
        let tmp = tmp_dir.to_string_lossy().into_owned();
        ["RENPY_LOG_BASE", "TMPDIR", "TEMP", "TMP"]
            .iter()
            .map(|key| (key.to_string(), tmp.clone()))
            .collect()
    }

    /// Run the SDK interpreter, streaming its output to the reporter
    ///
    /// stdout lines are detail output; stderr lines are detail output too,
    /// but the tail is kept in the result for error reports.
    pub fn run(&self, args: &[String], tmp_dir: &Path, reporter: &Reporter) -> Result<CommandResult> {
        let envs = Self::environment(tmp_dir);
        let spec = CommandSpec {
            program: &self.python,
            args,
            envs: &envs,
            cwd: Some(&self.sdk_dir),
        };

        reporter.detail(format!("Executing: {}", spec.display()));
        tracing::debug!(command = %spec.display(), "spawning Ren'Py SDK");

        let result = run_streaming(&spec, |line| match line {
            OutputLine::Stdout(text) => reporter.detail(format!("  {}", text)),
            OutputLine::Stderr(text) => reporter.detail(format!("  ! {}", text)),
        })?;

        tracing::debug!(
            exit_code = ?result.exit_code,
            stdout_lines = result.stdout.lines().count(),
            elapsed_ms = result.duration.as_millis() as u64,
            "Ren'Py SDK exited"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sdk(root: &Path) -> PathBuf {
        let (lib, executable) = host_python_lib().unwrap();
        let python = root.join("lib").join(lib).join(executable);
        std::fs::create_dir_all(python.parent().unwrap()).unwrap();
        std::fs::write(&python, "").unwrap();
        std::fs::write(root.join("renpy.py"), "").unwrap();
        python
    }

    #[test]
    fn test_locate_finds_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let python = fake_sdk(dir.path());

        let sdk = RenPySdk::locate(dir.path()).unwrap();
        assert_eq!(sdk.python(), python.as_path());
    }

    #[test]
    fn test_locate_without_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("renpy.py"), "").unwrap();

        let err = RenPySdk::locate(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Ren'Py interpreter does not exist"));
    }

    #[test]
    fn test_compile_args() {
        let dir = tempfile::tempdir().unwrap();
        fake_sdk(dir.path());
        let sdk = RenPySdk::locate(dir.path()).unwrap();

        let args = sdk.compile_args(Path::new("/games/vn"), Path::new("/tmp/dump.json"), true);
        assert!(args[0].ends_with("renpy.py"));
        assert_eq!(
            &args[1..],
            &["/games/vn", "compile", "--keep-orphan-rpyc", "--json-dump", "/tmp/dump.json"]
        );

        let args = sdk.compile_args(Path::new("/games/vn"), Path::new("/tmp/dump.json"), false);
        assert_eq!(&args[2..], &["quit", "--json-dump", "/tmp/dump.json"]);
    }

    #[test]
    fn test_distribute_args() {
        let dir = tempfile::tempdir().unwrap();
        fake_sdk(dir.path());
        let sdk = RenPySdk::locate(dir.path()).unwrap();

        let package = PackageSpec {
            formats: vec!["zip".into(), "directory".into()],
            ..PackageSpec::default()
        };

        let args = sdk.distribute_args(Path::new("/games/vn"), Path::new("/out"), "pc", &package, true);
        assert!(args[1].ends_with("launcher"));
        assert_eq!(
            &args[2..],
            &[
                "distribute",
                "/games/vn",
                "--destination",
                "/out",
                "--package",
                "pc",
                "--format",
                "zip",
                "--format",
                "directory"
            ]
        );
    }

    #[test]
    fn test_distribute_args_without_archives_or_update() {
        let dir = tempfile::tempdir().unwrap();
        fake_sdk(dir.path());
        let sdk = RenPySdk::locate(dir.path()).unwrap();
        let package = PackageSpec {
            ignore_archives: true,
            ..PackageSpec::default()
        };

        let args = sdk.distribute_args(Path::new("/games/vn"), Path::new("/out"), "mac", &package, false);
        assert_eq!(&args[args.len() - 2..], &["--no-archive", "--no-update"]);
        assert!(!args.contains(&"--format".to_string()));
    }

    #[test]
    fn test_environment_forwards_tmp_dir() {
        let env = RenPySdk::environment(Path::new("/sdk/tmp"));
        assert!(env.contains(&("RENPY_LOG_BASE".to_string(), "/sdk/tmp".to_string())));
        assert!(env.contains(&("TMPDIR".to_string(), "/sdk/tmp".to_string())));
    }
}
