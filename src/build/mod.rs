//! Build run state
//!
//! ## Architecture
//!
//! ```text
//! CLI → BuildRequest → Runner<BuildContext> → build::tasks → Ren'Py SDK
//! ```
//!
//! - `tasks` - the steps of a build run
//! - `artifacts` - finding and listing what the SDK produced

pub mod artifacts;
pub mod tasks;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::BuildInfo;
use crate::exec::renpy::RenPySdk;
use crate::utils::paths::absolutize;

/// Boolean switches of a build run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    /// Regenerate buildinfo.toml by running the project through the SDK
    pub legacy_build: bool,
    /// Only errors and the final result on the console
    pub silent: bool,
    /// Command lines, SDK output and archive listings
    pub verbose: bool,
    /// Empty the tmp dir before building
    pub fresh: bool,
    /// Recompile all scripts during a legacy build
    pub force_recompile: bool,
    /// Build update files for packages that support them
    pub build_update: bool,
    /// Open the output directory when done
    pub open_output: bool,
}

/// Everything the user asked for, with paths made absolute
///
/// Built once from the command line and never changed afterwards.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_dir: PathBuf,
    pub sdk_dir: PathBuf,
    /// Intermediate files; `SDK_DIR/tmp` unless given
    pub tmp_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Requested package names, possibly empty
    pub build_packages: Vec<String>,
    pub flags: BuildFlags,
}

impl BuildRequest {
    pub fn new(
        project_dir: &Path,
        sdk_dir: &Path,
        tmp_dir: Option<&Path>,
        log_file: Option<&Path>,
        output_dir: Option<&Path>,
        build_packages: Vec<String>,
        flags: BuildFlags,
    ) -> Result<Self> {
        let sdk_dir = absolutize(sdk_dir)?;
        let tmp_dir = match tmp_dir {
            Some(dir) => absolutize(dir)?,
            None => Self::default_tmp_dir(&sdk_dir),
        };

        Ok(Self {
            project_dir: absolutize(project_dir)?,
            sdk_dir,
            tmp_dir,
            log_file: log_file.map(absolutize).transpose()?,
            output_dir: output_dir.map(absolutize).transpose()?,
            build_packages,
            flags,
        })
    }

    /// tmp dir used when none is given
    pub fn default_tmp_dir(sdk_dir: &Path) -> PathBuf {
        sdk_dir.join("tmp")
    }
}

/// Outcome of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// The SDK succeeded; paths of what it produced
    Built { artifacts: Vec<PathBuf> },
    /// The package was unknown or the SDK failed
    Failed { error: String },
}

/// Status of one requested package
#[derive(Debug, Clone)]
pub struct PackageStatus {
    pub name: String,
    pub outcome: PackageOutcome,
    pub duration: Duration,
}

impl PackageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PackageOutcome::Built { .. })
    }
}

/// Mutable state of one build run, passed from task to task
#[derive(Debug)]
pub struct BuildContext {
    pub request: BuildRequest,
    /// Validated project dir
    pub project_dir: PathBuf,
    /// Validated SDK dir
    pub sdk_dir: PathBuf,
    /// Validated, writable tmp dir
    pub tmp_dir: PathBuf,
    sdk: Option<RenPySdk>,
    build_info: Option<BuildInfo>,
    output_dir: Option<PathBuf>,
    /// Packages to build, in order
    pub selected_packages: Vec<String>,
    pub statuses: Vec<PackageStatus>,
}

impl BuildContext {
    pub fn new(request: BuildRequest) -> Self {
        Self {
            project_dir: request.project_dir.clone(),
            sdk_dir: request.sdk_dir.clone(),
            tmp_dir: request.tmp_dir.clone(),
            request,
            sdk: None,
            build_info: None,
            output_dir: None,
            selected_packages: Vec::new(),
            statuses: Vec::new(),
        }
    }

    pub fn flags(&self) -> BuildFlags {
        self.request.flags
    }

    /// Path inside the tmp dir
    pub fn tmp_path(&self, name: &str) -> PathBuf {
        self.tmp_dir.join(name)
    }

    pub fn sdk(&self) -> Result<&RenPySdk> {
        self.sdk.as_ref().context("The Ren'Py SDK has not been located yet")
    }

    pub fn set_sdk(&mut self, sdk: RenPySdk) {
        self.sdk = Some(sdk);
    }

    pub fn build_info(&self) -> Result<&BuildInfo> {
        self.build_info.as_ref().context("Build info has not been retrieved yet")
    }

    pub fn set_build_info(&mut self, info: BuildInfo) {
        self.build_info = Some(info);
    }

    pub fn output_dir(&self) -> Result<&Path> {
        self.output_dir
            .as_deref()
            .context("The output directory has not been prepared yet")
    }

    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.output_dir = Some(dir);
    }

    /// Names of the packages that failed
    pub fn failed_packages(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|s| !s.is_success())
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_tmp_dir_defaults_to_sdk_tmp() {
        let request = BuildRequest::new(
            Path::new("/games/vn"),
            Path::new("/opt/renpy-sdk"),
            None,
            None,
            None,
            Vec::new(),
            BuildFlags::default(),
        )
        .unwrap();

        assert_eq!(request.tmp_dir, PathBuf::from("/opt/renpy-sdk/tmp"));
    }

    #[test]
    fn test_relative_paths_are_made_absolute() {
        let request = BuildRequest::new(
            Path::new("game"),
            Path::new("sdk"),
            Some(Path::new("scratch")),
            Some(Path::new("build.log")),
            None,
            vec!["pc".to_string()],
            BuildFlags::default(),
        )
        .unwrap();

        assert!(request.project_dir.is_absolute());
        assert!(request.tmp_dir.is_absolute());
        assert!(request.tmp_dir.ends_with("scratch"));
        assert!(request.log_file.as_deref().is_some_and(Path::is_absolute));
    }

    #[test]
    #[cfg(unix)]
    fn test_context_accessors_before_tasks_ran() {
        let request = BuildRequest::new(
            Path::new("/games/vn"),
            Path::new("/opt/renpy-sdk"),
            None,
            None,
            None,
            Vec::new(),
            BuildFlags::default(),
        )
        .unwrap();
        let ctx = BuildContext::new(request);

        assert!(ctx.sdk().is_err());
        assert!(ctx.build_info().is_err());
        assert!(ctx.output_dir().is_err());
        assert_eq!(ctx.tmp_path("dump.json"), PathBuf::from("/opt/renpy-sdk/tmp/dump.json"));
    }
}
