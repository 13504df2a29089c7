//! The steps of a build run
//!
//! ```text
//! check_properties → locate_sdk → clean_tmp → retrieve_build_info
//!   → prepare_output_dir → select_packages → distribute_packages
//!   → report_artifacts → open_output_dir
//! ```

use std::fs;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result};

use super::artifacts::{describe, find_artifacts, zip_tree_lines};
use super::{BuildContext, PackageOutcome, PackageStatus};
use crate::config::{validate_build_info, BuildInfo, LegacyDump, BUILDINFO_FILE};
use crate::error::{hints, DistributorError};
use crate::exec::renpy::RenPySdk;
use crate::runner::{Runner, Task, TaskOutcome};
use crate::utils::paths::{check_dir, clear_dir_except, DirCheck};
use crate::utils::reporter::Reporter;

/// Name of the legacy dump inside the tmp dir
pub const DUMP_FILE: &str = "dump.json";

/// Register every build task on `runner`
pub fn register_all(runner: &mut Runner<BuildContext>) -> Result<()> {
    runner.register(
        Task::new("check_properties", check_properties).description("Checking build properties..."),
    )?;
    runner.register(
        Task::new("locate_sdk", locate_sdk)
            .description("Locating the Ren'Py SDK...")
            .requires(&["check_properties"]),
    )?;
    runner.register(Task::new("clean_tmp", clean_tmp).requires(&["check_properties"]))?;
    runner.register(
        Task::new("retrieve_build_info", retrieve_build_info)
            .description("Retrieving build info...")
            .requires(&["locate_sdk", "clean_tmp"]),
    )?;
    runner.register(
        Task::new("prepare_output_dir", prepare_output_dir)
            .description("Preparing the output directory...")
            .requires(&["retrieve_build_info"]),
    )?;
    runner.register(
        Task::new("select_packages", select_packages)
            .description("Checking chosen packages...")
            .requires(&["retrieve_build_info"]),
    )?;
    runner.register(
        Task::new("distribute_packages", distribute_packages)
            .requires(&["prepare_output_dir", "select_packages"]),
    )?;
    runner.register(
        Task::new("report_artifacts", report_artifacts).requires(&["distribute_packages"]),
    )?;
    runner.register(
        Task::new("open_output_dir", open_output_dir).requires(&["report_artifacts"]),
    )?;
    Ok(())
}

fn check_properties(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let must_exist = DirCheck {
        must_exist: true,
        ..Default::default()
    };
    let writable = DirCheck {
        must_be_writable: true,
        ..Default::default()
    };

    ctx.project_dir = check_dir(&ctx.request.project_dir, "project-dir", must_exist)?;
    ctx.sdk_dir = check_dir(&ctx.request.sdk_dir, "sdk-dir", must_exist)?;
    ctx.tmp_dir = check_dir(&ctx.request.tmp_dir, "tmp-dir", writable)?;

    reporter.detail(format!("project-dir: {}", ctx.project_dir.display()));
    reporter.detail(format!("sdk-dir: {}", ctx.sdk_dir.display()));
    reporter.detail(format!("tmp-dir: {}", ctx.tmp_dir.display()));
    Ok(TaskOutcome::Continue)
}

fn locate_sdk(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let sdk = RenPySdk::locate(&ctx.sdk_dir)?;
    reporter.detail(format!("Ren'Py interpreter: {}", sdk.python().display()));
    ctx.set_sdk(sdk);
    Ok(TaskOutcome::Continue)
}

fn clean_tmp(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    if !ctx.flags().fresh {
        return Ok(TaskOutcome::Skip);
    }

    reporter.info("Cleaning the temporary directory...");
    let removed = clear_dir_except(&ctx.tmp_dir, reporter.log_path())?;
    reporter.detail(format!("Removed {} item(s) from {}", removed, ctx.tmp_dir.display()));
    Ok(TaskOutcome::Continue)
}

fn retrieve_build_info(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let info = if ctx.flags().legacy_build {
        legacy_build_info(ctx, reporter)?
    } else {
        let path = ctx.project_dir.join(BUILDINFO_FILE);
        if !path.is_file() {
            return Err(DistributorError::missing_build_info(path).into());
        }
        BuildInfo::load_from_path(&path).map_err(|e| {
            DistributorError::config_error_with_hint(
                format!("Could not load {}", path.display()),
                Some(e),
                hints::invalid_build_info(),
            )
        })?
    };

    validate_build_info(&info)?;

    reporter.detail(format!(
        "{} {} ({}), {} package(s), {} archive(s)",
        info.display_name(),
        info.version,
        info.directory_name,
        info.packages.len(),
        info.archives.len()
    ));
    for (name, archive) in &info.archives {
        reporter.detail(format!(
            "  archive {}.rpa <- {}",
            archive.filename(name),
            archive.file_lists.join(", ")
        ));
    }
    ctx.set_build_info(info);
    Ok(TaskOutcome::Continue)
}

/// Run the project through the SDK and convert the dumped build data
fn legacy_build_info(ctx: &BuildContext, reporter: &Reporter) -> Result<BuildInfo> {
    let sdk = ctx.sdk()?;
    let dump_file = ctx.tmp_path(DUMP_FILE);
    if dump_file.exists() {
        fs::remove_file(&dump_file).map_err(|e| DistributorError::io(&dump_file, e))?;
    }

    let args = sdk.compile_args(&ctx.project_dir, &dump_file, ctx.flags().force_recompile);
    reporter.start_spinner("Launching the game to collect build data...");
    let result = sdk.run(&args, &ctx.tmp_dir, reporter);
    reporter.finish_progress();
    let result = result?;

    if !result.success || !dump_file.is_file() {
        let message = if result.success {
            format!("no build data was written to {}", dump_file.display())
        } else {
            "process exited unsuccessfully".to_string()
        };
        return Err(DistributorError::sdk_failure(
            "compiling the project",
            message,
            result.exit_code,
            result.stderr_tail,
        )
        .with_sdk_hint(hints::legacy_compile())
        .into());
    }

    let dump = LegacyDump::load(&dump_file).map_err(|e| {
        DistributorError::config_error_with_hint(
            "Could not read build data from the project",
            Some(e),
            hints::legacy_compile(),
        )
    })?;

    let (info, warnings) = BuildInfo::from_dump(dump);
    for warning in warnings {
        reporter.warn(warning);
    }

    info.save_to_project(&ctx.project_dir)?;
    reporter.info(format!(
        "Wrote {}",
        ctx.project_dir.join(BUILDINFO_FILE).display()
    ));
    Ok(info)
}

fn prepare_output_dir(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let requested = match &ctx.request.output_dir {
        Some(dir) => dir.clone(),
        None => match ctx.build_info()?.destination.as_deref() {
            Some(destination) if !destination.is_empty() => {
                ctx.project_dir.join("..").join(destination)
            }
            _ => {
                return Err(DistributorError::config_error_with_hint(
                    "Neither --output-dir nor destination is set, there is nowhere to write",
                    None,
                    format!("Pass --output-dir or set destination in {}", BUILDINFO_FILE),
                )
                .into())
            }
        },
    };

    let output_dir = check_dir(
        &requested,
        "output-dir",
        DirCheck {
            must_be_writable: true,
            ..Default::default()
        },
    )?;
    reporter.detail(format!("output-dir: {}", output_dir.display()));
    ctx.set_output_dir(output_dir);
    Ok(TaskOutcome::Continue)
}

fn select_packages(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let info = ctx.build_info()?;
    let candidates = if ctx.request.build_packages.is_empty() {
        info.default_package_names()
    } else {
        ctx.request.build_packages.clone()
    };

    let mut selected: Vec<String> = Vec::with_capacity(candidates.len());
    for name in candidates {
        if !selected.contains(&name) {
            selected.push(name);
        }
    }

    if selected.is_empty() {
        return Err(DistributorError::config_error_with_hint(
            "No packages are selected, so there's nothing to do",
            None,
            format!(
                "Pass package names on the command line or declare [packages.<name>] in {}",
                BUILDINFO_FILE
            ),
        )
        .into());
    }

    reporter.info(format!("Selected packages: {}", selected.join(", ")));
    ctx.selected_packages = selected;
    Ok(TaskOutcome::Continue)
}

fn distribute_packages(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let packages = ctx.selected_packages.clone();
    let total = packages.len();

    for (i, name) in packages.iter().enumerate() {
        reporter.info(format!("Distributing '{}' ({}/{})...", name, i + 1, total));

        let started = Instant::now();
        let outcome = match distribute_one(ctx, reporter, name) {
            Ok(artifacts) => {
                reporter.info(format!(
                    "Built '{}' in {:.2}s",
                    name,
                    started.elapsed().as_secs_f64()
                ));
                PackageOutcome::Built { artifacts }
            }
            Err(err) => {
                reporter.report_error(&err);
                PackageOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        ctx.statuses.push(PackageStatus {
            name: name.clone(),
            outcome,
            duration: started.elapsed(),
        });
    }

    // Failures are raised by report_artifacts, after the summary.
    Ok(TaskOutcome::Continue)
}

/// Build one package; unknown names and SDK failures are errors for this package only
fn distribute_one(
    ctx: &BuildContext,
    reporter: &Reporter,
    name: &str,
) -> Result<Vec<std::path::PathBuf>> {
    let info = ctx.build_info()?;
    let Some(package) = info.packages.get(name) else {
        return Err(DistributorError::unknown_package(name, &info.package_names()).into());
    };

    let sdk = ctx.sdk()?;
    let output_dir = ctx.output_dir()?;
    let since = SystemTime::now();

    let build_update = ctx.flags().build_update && info.builds_update(package);
    let args = sdk.distribute_args(&ctx.project_dir, output_dir, name, package, build_update);
    reporter.start_spinner(&format!("Building {}...", name));
    let result = sdk.run(&args, &ctx.tmp_dir, reporter);
    reporter.finish_progress();
    let result = result?;

    if !result.success {
        return Err(DistributorError::sdk_failure(
            format!("distributing '{}'", name),
            "process exited unsuccessfully",
            result.exit_code,
            result.stderr_tail,
        )
        .with_sdk_hint(hints::distribute())
        .into());
    }

    let artifacts = find_artifacts(output_dir, &info.directory_name, name, since)?;
    if artifacts.is_empty() {
        reporter.warn(format!(
            "The SDK reported success for '{}' but no distributions were found in {}",
            name,
            output_dir.display()
        ));
    }
    Ok(artifacts)
}

fn report_artifacts(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    let output_dir = ctx.output_dir()?;

    reporter.info(format!("Distributions are in {}", output_dir.display()));
    for status in &ctx.statuses {
        let PackageOutcome::Built { artifacts } = &status.outcome else {
            reporter.info(format!("  {}: failed", status.name));
            continue;
        };

        reporter.detail(format!(
            "  {} took {:.2}s",
            status.name,
            status.duration.as_secs_f64()
        ));
        for artifact in artifacts {
            reporter.info(format!("  {}: {}", status.name, describe(artifact)));

            let is_zip = artifact.extension().is_some_and(|ext| ext == "zip");
            if reporter.is_verbose() && is_zip {
                match zip_tree_lines(artifact) {
                    Ok(lines) => {
                        for line in lines {
                            reporter.detail(format!("      {}", line));
                        }
                    }
                    Err(e) => reporter.warn(format!("Failed to list archive contents: {:#}", e)),
                }
            }
        }
    }

    let failed = ctx.failed_packages();
    if !failed.is_empty() {
        let total = ctx.statuses.len();
        return Err(DistributorError::PackagesFailed { failed, total }.into());
    }
    Ok(TaskOutcome::Continue)
}

fn open_output_dir(ctx: &mut BuildContext, reporter: &Reporter) -> Result<TaskOutcome> {
    if !ctx.flags().open_output {
        return Ok(TaskOutcome::Skip);
    }

    let output_dir = ctx.output_dir()?;
    reporter.info(format!("Opening {}...", output_dir.display()));
    if let Err(e) = open::that(output_dir)
        .with_context(|| format!("Failed to open {}", output_dir.display()))
    {
        reporter.warn(format!("{:#}", e));
    }
    Ok(TaskOutcome::Continue)
}
