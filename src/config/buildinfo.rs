//! buildinfo.toml parsing and generation
//!
//! `buildinfo.toml` lives in the project directory and describes how the
//! project is packaged: naming, the packages that can be built and the
//! archives the game files go into.
//!
//! ```toml
//! directory_name = "mygame-1.0"
//! executable_name = "mygame"
//! version = "1.0"
//! destination = "mygame-1.0-dists"
//! default_packages = ["pc", "mac"]
//!
//! [packages.pc]
//! description = "PC: Windows and Linux"
//! formats = ["zip"]
//! platforms = ["win", "linux"]
//! file_lists = ["windows", "linux", "renpy", "all"]
//!
//! [archives.archive]
//! file_lists = ["all"]
//! ```
//!
//! A legacy build generates the file from the `build` object Ren'Py writes
//! with `--json-dump`, see [`BuildInfo::from_dump`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File name of the build info inside the project directory
pub const BUILDINFO_FILE: &str = "buildinfo.toml";

/// Build info of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Name of the top-level directory inside the distributions
    pub directory_name: String,

    /// Name of the .exe, .sh and .app launchers
    pub executable_name: String,

    /// Human-readable name (defaults to executable_name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Version string of the game
    pub version: String,

    /// Where distributions go, relative to the project's parent directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Include update information in the distributions
    #[serde(default)]
    pub include_update: bool,

    /// Packages built when none are requested on the command line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_packages: Vec<String>,

    /// Buildable packages by name
    #[serde(default)]
    pub packages: BTreeMap<String, PackageSpec>,

    /// Archives by name
    #[serde(default)]
    pub archives: BTreeMap<String, ArchiveSpec>,
}

/// One buildable package from [packages.<name>]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Output formats (zip, directory, tar.bz2, ...)
    #[serde(default)]
    pub formats: Vec<String>,

    /// Target platforms (win, linux, mac)
    #[serde(default)]
    pub platforms: Vec<String>,

    /// File lists packed into this package
    #[serde(default)]
    pub file_lists: Vec<String>,

    /// Build an update for this package
    #[serde(default = "default_true")]
    pub update: bool,

    /// Build zip and tar.bz2 formats in standalone DLC mode
    #[serde(default)]
    pub dlc: bool,

    /// Hide from the default package selection
    #[serde(default)]
    pub hidden: bool,

    /// Add game files directly instead of through archives
    #[serde(default)]
    pub ignore_archives: bool,
}

/// One archive from [archives.<name>]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    /// Archive file name without extension (defaults to the table key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// File lists whose game files go into the archive
    #[serde(default)]
    pub file_lists: Vec<String>,

    /// Archive format
    #[serde(default)]
    pub kind: ArchiveKind,
}

/// Archive format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// Ren'Py RPA-3.0 archive
    #[default]
    Rpa,
}

fn default_true() -> bool {
    true
}

impl Default for PackageSpec {
    fn default() -> Self {
        Self {
            description: None,
            formats: Vec::new(),
            platforms: Vec::new(),
            file_lists: Vec::new(),
            update: true,
            dlc: false,
            hidden: false,
            ignore_archives: false,
        }
    }
}

impl BuildInfo {
    /// Load build info from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build info from {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse build info from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse buildinfo.toml")
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize build info")
    }

    /// Write to `<project_dir>/buildinfo.toml`, replacing any existing file
    pub fn save_to_project(&self, project_dir: &Path) -> Result<()> {
        let path = project_dir.join(BUILDINFO_FILE);
        let content = format!(
            "# Generated by renpy-distributor {} from the project's build configuration.\n\n{}",
            env!("CARGO_PKG_VERSION"),
            self.to_toml()?
        );
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Whether the build info asks for update files for `package`
    ///
    /// DLC packages are standalone and never carry an update directory.
    pub fn builds_update(&self, package: &PackageSpec) -> bool {
        self.include_update && package.update && !package.dlc
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.executable_name)
    }

    /// All declared package names, sorted
    pub fn package_names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    /// Package names built when none are requested
    ///
    /// `default_packages` if set, otherwise every package not marked hidden.
    pub fn default_package_names(&self) -> Vec<String> {
        if !self.default_packages.is_empty() {
            return self.default_packages.clone();
        }
        self.packages
            .iter()
            .filter(|(_, package)| !package.hidden)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Convert the `build` object of a Ren'Py JSON dump
    ///
    /// Returns the build info and a list of warnings about entries that were
    /// dropped or guessed.
    pub fn from_dump(dump: LegacyDump) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut packages = BTreeMap::new();

        for package in dump.packages {
            if UNSUPPORTED_PACKAGES.contains(&package.name.as_str()) {
                warnings.push(format!(
                    "Package '{}' is not supported and was skipped",
                    package.name
                ));
                continue;
            }
            if packages.contains_key(&package.name) {
                warnings.push(format!(
                    "Duplicate package '{}' in the dump, keeping the first",
                    package.name
                ));
                continue;
            }

            let platforms: &[&str] = match builtin_platforms(&package.name) {
                Some(platforms) => platforms,
                None => {
                    warnings.push(format!(
                        "Package '{}' is not a builtin package, assuming platforms win, linux and mac",
                        package.name
                    ));
                    &["win", "linux", "mac"]
                }
            };

            packages.insert(
                package.name,
                PackageSpec {
                    description: package.description,
                    formats: package.formats,
                    platforms: platforms.iter().map(|p| p.to_string()).collect(),
                    file_lists: package.file_lists,
                    update: package.update,
                    dlc: package.dlc,
                    hidden: package.hidden,
                    ignore_archives: false,
                },
            );
        }

        let mut archives = BTreeMap::new();
        for (name, file_lists) in dump.archives {
            if archives.contains_key(&name) {
                warnings.push(format!(
                    "Duplicate archive '{}' in the dump, keeping the first",
                    name
                ));
                continue;
            }
            archives.insert(
                name,
                ArchiveSpec {
                    filename: None,
                    file_lists,
                    kind: ArchiveKind::Rpa,
                },
            );
        }

        let info = Self {
            directory_name: dump.directory_name,
            executable_name: dump.executable_name,
            display_name: dump.display_name,
            version: dump.version,
            destination: dump.destination,
            include_update: dump.include_update,
            default_packages: Vec::new(),
            packages,
            archives,
        };
        (info, warnings)
    }
}

impl ArchiveSpec {
    /// Archive file name, falling back to the archive's key
    pub fn filename<'a>(&'a self, name: &'a str) -> &'a str {
        self.filename.as_deref().unwrap_or(name)
    }
}

/// Package names a legacy dump may carry that this tool does not build
const UNSUPPORTED_PACKAGES: &[&str] = &["android", "ios", "web"];

fn builtin_platforms(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "pc" => Some(&["win", "linux"]),
        "linux" => Some(&["linux"]),
        "mac" => Some(&["mac"]),
        "win" => Some(&["win"]),
        "market" | "steam" => Some(&["win", "linux", "mac"]),
        _ => None,
    }
}

/// The `build` object of `renpy.py <project> ... --json-dump <file>`
///
/// Fields the driver has no use for are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyDump {
    pub directory_name: String,
    pub executable_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub include_update: bool,
    #[serde(default)]
    pub packages: Vec<LegacyPackage>,
    /// `[name, file_lists]` pairs
    #[serde(default)]
    pub archives: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyPackage {
    pub name: String,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub file_lists: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default)]
    pub dlc: bool,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Deserialize)]
struct DumpFile {
    build: LegacyDump,
}

impl LegacyDump {
    /// Read the `build` object from a dump file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid dump file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: DumpFile =
            serde_json::from_str(content).context("Failed to parse the build section of the dump")?;
        Ok(file.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "build": {
            "directory_name": "mygame-1.0",
            "executable_name": "mygame",
            "display_name": "My Game",
            "version": "1.0",
            "destination": "mygame-1.0-dists",
            "include_update": false,
            "packages": [
                {"name": "pc", "formats": ["zip"], "file_lists": ["windows", "linux", "renpy", "all"],
                 "description": "PC: Windows and Linux", "update": true, "dlc": false, "hidden": false},
                {"name": "mac", "formats": ["app-zip", "app-dmg"], "file_lists": ["mac", "renpy", "all"],
                 "description": "Macintosh", "update": true, "dlc": false, "hidden": false},
                {"name": "android", "formats": ["directory"], "file_lists": ["android", "all"],
                 "description": "android", "update": false, "dlc": false, "hidden": true},
                {"name": "patch", "formats": ["zip"], "file_lists": ["patch"],
                 "description": "Patch", "update": false, "dlc": true, "hidden": true}
            ],
            "archives": [["archive", ["all"]]],
            "script_version": true,
            "xbit_patterns": ["**.sh"]
        },
        "screens": []
    }"#;

    #[test]
    fn test_parse_minimal_buildinfo() {
        let toml_str = r#"
            directory_name = "mygame-1.0"
            executable_name = "mygame"
            version = "1.0"
        "#;

        let info = BuildInfo::parse(toml_str).unwrap();
        assert_eq!(info.directory_name, "mygame-1.0");
        assert_eq!(info.display_name(), "mygame");
        assert!(info.destination.is_none());
        assert!(info.packages.is_empty());
        assert!(!info.include_update);
    }

    #[test]
    fn test_parse_full_buildinfo() {
        let toml_str = r#"
            directory_name = "mygame-1.0"
            executable_name = "mygame"
            display_name = "My Game"
            version = "1.0"
            destination = "mygame-1.0-dists"
            default_packages = ["pc"]

            [packages.pc]
            description = "PC: Windows and Linux"
            formats = ["zip"]
            platforms = ["win", "linux"]
            file_lists = ["windows", "linux", "renpy", "all"]

            [packages.mac]
            formats = ["app-zip"]
            platforms = ["mac"]
            file_lists = ["mac", "renpy", "all"]
            hidden = true

            [archives.archive]
            file_lists = ["all"]
            kind = "rpa"
        "#;

        let info = BuildInfo::parse(toml_str).unwrap();
        assert_eq!(info.display_name(), "My Game");
        assert_eq!(info.package_names(), vec!["mac", "pc"]);
        assert!(info.packages["pc"].update);
        assert!(info.packages["mac"].hidden);
        assert_eq!(info.archives["archive"].kind, ArchiveKind::Rpa);
        assert_eq!(info.archives["archive"].filename("archive"), "archive");
        assert_eq!(info.default_package_names(), vec!["pc"]);
    }

    #[test]
    fn test_default_packages_skip_hidden() {
        let toml_str = r#"
            directory_name = "g"
            executable_name = "g"
            version = "1"

            [packages.pc]
            file_lists = ["all"]

            [packages.patch]
            file_lists = ["patch"]
            hidden = true
        "#;

        let info = BuildInfo::parse(toml_str).unwrap();
        assert_eq!(info.default_package_names(), vec!["pc"]);
    }

    #[test]
    fn test_builds_update_needs_every_switch() {
        let toml_str = r#"
            directory_name = "g"
            executable_name = "g"
            version = "1"
            include_update = true

            [packages.pc]
            file_lists = ["all"]

            [packages.frozen]
            file_lists = ["all"]
            update = false

            [packages.extra]
            file_lists = ["extra"]
            dlc = true
        "#;

        let mut info = BuildInfo::parse(toml_str).unwrap();
        assert!(info.builds_update(&info.packages["pc"]));
        assert!(!info.builds_update(&info.packages["frozen"]));
        assert!(!info.builds_update(&info.packages["extra"]));

        info.include_update = false;
        assert!(!info.builds_update(&info.packages["pc"]));
    }

    #[test]
    fn test_parse_rejects_unknown_archive_kind() {
        let toml_str = r#"
            directory_name = "g"
            executable_name = "g"
            version = "1"

            [archives.archive]
            file_lists = ["all"]
            kind = "zip"
        "#;

        assert!(BuildInfo::parse(toml_str).is_err());
    }

    #[test]
    fn test_from_dump() {
        let dump = LegacyDump::parse(DUMP).unwrap();
        let (info, warnings) = BuildInfo::from_dump(dump);

        assert_eq!(info.directory_name, "mygame-1.0");
        assert_eq!(info.destination.as_deref(), Some("mygame-1.0-dists"));
        assert_eq!(info.package_names(), vec!["mac", "patch", "pc"]);
        assert_eq!(info.packages["pc"].platforms, vec!["win", "linux"]);
        assert_eq!(info.packages["patch"].platforms, vec!["win", "linux", "mac"]);
        assert!(info.packages["patch"].dlc);
        assert!(!info.packages.contains_key("android"));
        assert_eq!(info.archives["archive"].file_lists, vec!["all"]);

        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("android"));
        assert!(warnings[1].contains("patch"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (info, _) = BuildInfo::from_dump(LegacyDump::parse(DUMP).unwrap());

        info.save_to_project(dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join(BUILDINFO_FILE)).unwrap();
        assert!(content.starts_with("# Generated by renpy-distributor"));

        let reloaded = BuildInfo::load_from_path(dir.path().join(BUILDINFO_FILE)).unwrap();
        assert_eq!(reloaded, info);
    }

    #[test]
    fn test_dump_without_build_section() {
        assert!(LegacyDump::parse(r#"{"screens": []}"#).is_err());
    }
}
