//! Build info validation with helpful error messages
//!
//! Parsing only checks the shape of buildinfo.toml; this module checks that
//! the values make sense before the SDK is asked to package anything.

use anyhow::{Context, Result};
use regex::Regex;

use super::buildinfo::{ArchiveSpec, BuildInfo, PackageSpec};
use crate::error::{hints, DistributorError};

/// Package formats the Ren'Py packager understands
pub const KNOWN_FORMATS: &[&str] = &[
    "zip",
    "app-zip",
    "bare-zip",
    "directory",
    "app-directory",
    "tar.bz2",
    "bare-tar.bz2",
    "dmg",
    "app-dmg",
];

/// Platforms a package can target
pub const KNOWN_PLATFORMS: &[&str] = &["win", "linux", "mac"];

/// Validate the entire build info
pub fn validate_build_info(info: &BuildInfo) -> Result<()> {
    validate_directory_name(&info.directory_name)?;
    validate_required("executable_name", &info.executable_name)?;
    validate_required("version", &info.version)?;

    for (name, package) in &info.packages {
        validate_package(name, package)?;
    }

    for (name, archive) in &info.archives {
        validate_archive(name, archive, info)?;
    }

    for name in &info.default_packages {
        if !info.packages.contains_key(name) {
            return Err(DistributorError::config_error_with_hint(
                format!("default_packages names an undeclared package '{}'", name),
                None,
                format!("Declare [packages.{}] or remove it from default_packages", name),
            )
            .into());
        }
    }

    Ok(())
}

/// directory_name ends up in file names on every platform
fn validate_directory_name(name: &str) -> Result<()> {
    validate_required("directory_name", name)?;

    let forbidden = Regex::new(r"[ :;]").context("Invalid directory name pattern")?;
    if forbidden.is_match(name) {
        return Err(DistributorError::config_error_with_hint(
            format!("directory_name '{}' contains a space, colon or semicolon", name),
            None,
            "Use something like 'mygame-1.0' for directory_name",
        )
        .into());
    }

    Ok(())
}

fn validate_required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DistributorError::config_error_with_hint(
            format!("{} can not be empty", field),
            None,
            hints::invalid_build_info(),
        )
        .into());
    }
    Ok(())
}

fn validate_package(name: &str, package: &PackageSpec) -> Result<()> {
    if package.file_lists.is_empty() {
        return Err(DistributorError::config_error_with_hint(
            format!("Package '{}' has no file lists", name),
            None,
            "Every package needs at least one file list, e.g. file_lists = [\"all\"]",
        )
        .into());
    }

    for format in &package.formats {
        if !KNOWN_FORMATS.contains(&format.as_str()) {
            return Err(DistributorError::config_error_with_hint(
                format!("Package '{}' has unknown format '{}'", name, format),
                None,
                format!("Valid formats: {}", KNOWN_FORMATS.join(", ")),
            )
            .into());
        }
    }

    for platform in &package.platforms {
        if !KNOWN_PLATFORMS.contains(&platform.as_str()) {
            return Err(DistributorError::config_error_with_hint(
                format!("Package '{}' has unknown platform '{}'", name, platform),
                None,
                format!("Valid platforms: {}", KNOWN_PLATFORMS.join(", ")),
            )
            .into());
        }
    }

    Ok(())
}

fn validate_archive(name: &str, archive: &ArchiveSpec, info: &BuildInfo) -> Result<()> {
    if archive.file_lists.is_empty() {
        return Err(DistributorError::config_error_with_hint(
            format!("Archive '{}' has no file lists", name),
            None,
            "List the file lists whose game files go into the archive, e.g. file_lists = [\"all\"]",
        )
        .into());
    }

    let used = archive.file_lists.iter().any(|list| {
        info.packages
            .values()
            .any(|package| package.file_lists.contains(list))
    });
    if !used {
        return Err(DistributorError::config_error_with_hint(
            format!(
                "Archive '{}' uses file lists no package includes: {}",
                name,
                archive.file_lists.join(", ")
            ),
            None,
            "Add one of the archive's file lists to a package, or remove the archive",
        )
        .into());
    }

    Ok(())
}
