//! Finding and listing the distributions the SDK produced

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Allowance for filesystems with coarse modification times
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Find what was produced for `package` in `output_dir` since `since`
///
/// Ren'Py names every distribution `<directory_name>-<package>` plus a
/// format suffix, e.g. `mygame-1.0-pc.zip` or `mygame-1.0-mac.dmg`.
pub fn find_artifacts(
    output_dir: &Path,
    directory_name: &str,
    package: &str,
    since: SystemTime,
) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}-{}", directory_name, package);
    let threshold = since.checked_sub(MTIME_SLACK).unwrap_or(since);

    let mut artifacts = Vec::new();
    for entry in WalkDir::new(output_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read {}", output_dir.display()))?;
        let name = entry.file_name().to_string_lossy();
        if !is_artifact_name(&name, &prefix) {
            continue;
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if modified >= threshold {
            artifacts.push(entry.into_path());
        }
    }

    Ok(artifacts)
}

/// `name` is `prefix` itself or `prefix` followed by an extension
///
/// Keeps `mygame-1.0-pc.zip` from matching package `p`.
fn is_artifact_name(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Human-readable file size
pub fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.2} MB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.2} KB", size as f64 / 1024.0)
    } else {
        format!("{} B", size)
    }
}

/// One-line description of an artifact: path and size
pub fn describe(path: &Path) -> String {
    if path.is_dir() {
        return format!("{}/", path.display());
    }
    match path.metadata() {
        Ok(meta) => format!("{} ({})", path.display(), format_size(meta.len())),
        Err(_) => path.display().to_string(),
    }
}

enum TreeNode {
    File { size: u64 },
    Dir(BTreeMap<String, TreeNode>),
}

/// Render the contents of a zip archive as tree lines
pub fn zip_tree_lines(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {}", archive_path.display()))?;

    let mut tree: BTreeMap<String, TreeNode> = BTreeMap::new();

    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let path = entry.name().trim_end_matches('/');
        if path.is_empty() {
            continue;
        }

        let parts: Vec<&str> = path.split('/').collect();
        let mut current = &mut tree;
        for (idx, part) in parts.iter().enumerate() {
            let is_last = idx == parts.len() - 1;
            if is_last && !entry.is_dir() {
                current.insert(part.to_string(), TreeNode::File { size: entry.size() });
                break;
            }

            let node = current
                .entry(part.to_string())
                .or_insert_with(|| TreeNode::Dir(BTreeMap::new()));
            current = match node {
                TreeNode::Dir(children) => children,
                // A file and a directory with the same name; keep the file.
                TreeNode::File { .. } => break,
            };
        }
    }

    let mut lines = Vec::new();
    tree_level_lines(&tree, "", &mut lines);
    Ok(lines)
}

fn tree_level_lines(tree: &BTreeMap<String, TreeNode>, prefix: &str, lines: &mut Vec<String>) {
    let len = tree.len();
    for (i, (name, node)) in tree.iter().enumerate() {
        let is_last = i + 1 == len;
        let connector = if is_last { "└── " } else { "├── " };

        match node {
            TreeNode::File { size } => {
                lines.push(format!("{}{}{} ({})", prefix, connector, name, format_size(*size)));
            }
            TreeNode::Dir(children) => {
                lines.push(format!("{}{}{}/", prefix, connector, name));
                let child_prefix = if is_last {
                    format!("{}    ", prefix)
                } else {
                    format!("{}│   ", prefix)
                };
                tree_level_lines(children, &child_prefix, lines);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_find_artifacts_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        std::fs::write(out.join("mygame-1.0-pc.zip"), "zip").unwrap();
        std::fs::write(out.join("mygame-1.0-pc.update.json"), "{}").unwrap();
        std::fs::write(out.join("mygame-1.0-mac.zip"), "zip").unwrap();
        std::fs::write(out.join("mygame-1.0-pcx.zip"), "zip").unwrap();
        std::fs::create_dir(out.join("mygame-1.0-pc")).unwrap();

        let since = SystemTime::now();
        let found = find_artifacts(out, "mygame-1.0", "pc", since).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec!["mygame-1.0-pc", "mygame-1.0-pc.update.json", "mygame-1.0-pc.zip"]
        );
    }

    #[test]
    fn test_find_artifacts_ignores_old_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mygame-1.0-pc.zip"), "zip").unwrap();

        let later = SystemTime::now() + Duration::from_secs(60);
        let found = find_artifacts(dir.path(), "mygame-1.0", "pc", later).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_zip_tree_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mygame-1.0-pc.zip");

        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.add_directory("mygame-1.0-pc/", options).unwrap();
        zip.start_file("mygame-1.0-pc/mygame.sh", options).unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file("mygame-1.0-pc/game/archive.rpa", options).unwrap();
        zip.write_all(&[0u8; 2048]).unwrap();
        zip.finish().unwrap();

        let lines = zip_tree_lines(&path).unwrap();
        assert_eq!(
            lines,
            vec![
                "└── mygame-1.0-pc/".to_string(),
                "    ├── game/".to_string(),
                "    │   └── archive.rpa (2.00 KB)".to_string(),
                "    └── mygame.sh (10 B)".to_string(),
            ]
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
