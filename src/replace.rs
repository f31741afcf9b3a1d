use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::package::PACKAGE_FILE_NAME;

/// What a replacement pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    pub replaced: usize,
    pub manifest_replaced: bool,
}

/// Replace files under `source_root` with their counterparts from `staging`.
///
/// Every staged file overwrites its local copy (delete, then copy). The root
/// manifest is only touched when `replace_manifest` is set. The staging
/// directory is removed afterwards. A failed walk leaves already replaced
/// files in place.
pub fn replace_local_files(staging: &Path, source_root: &Path, replace_manifest: bool) -> Result<ReplaceStats> {
    let mut stats = ReplaceStats::default();

    for entry in WalkDir::new(staging).min_depth(1) {
        let entry = entry
            .with_context(|| format!("Failed to walk staging directory: {}", staging.display()))?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(staging)
            .with_context(|| format!("Path escaped staging directory: {}", entry.path().display()))?;

        let is_manifest = relative == Path::new(PACKAGE_FILE_NAME);
        if is_manifest && !replace_manifest {
            continue;
        }

        let destination = source_root.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        if destination.exists() {
            fs::remove_file(&destination)
                .with_context(|| format!("Failed to remove local file: {}", destination.display()))?;
        }
        fs::copy(entry.path(), &destination).with_context(|| {
            format!("Failed to copy {} to {}", entry.path().display(), destination.display())
        })?;

        stats.replaced += 1;
        stats.manifest_replaced |= is_manifest;
    }

    fs::remove_dir_all(staging)
        .with_context(|| format!("Failed to remove staging directory: {}", staging.display()))?;

    debug!(replaced = stats.replaced, manifest = stats.manifest_replaced, "Local files replaced");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("staging").join("unpackaged");
        let source_root = temp_dir.path().join("project").join("src");

        fs::create_dir_all(staging.join("classes")).unwrap();
        fs::write(staging.join(PACKAGE_FILE_NAME), b"<Package>server</Package>").unwrap();
        fs::write(staging.join("classes/Foo.cls"), b"server Foo").unwrap();
        fs::write(staging.join("classes/New.cls"), b"server New").unwrap();

        fs::create_dir_all(source_root.join("classes")).unwrap();
        fs::write(source_root.join(PACKAGE_FILE_NAME), b"<Package>local</Package>").unwrap();
        fs::write(source_root.join("classes/Foo.cls"), b"local Foo with more bytes").unwrap();
        fs::write(source_root.join("classes/Other.cls"), b"untouched").unwrap();

        (temp_dir, staging, source_root)
    }

    #[test]
    fn test_replace_keeps_manifest() {
        let (_temp_dir, staging, source_root) = layout();

        let stats = replace_local_files(&staging, &source_root, false).unwrap();

        assert_eq!(stats, ReplaceStats { replaced: 2, manifest_replaced: false });
        assert_eq!(fs::read(source_root.join(PACKAGE_FILE_NAME)).unwrap(), b"<Package>local</Package>");
        assert_eq!(fs::read(source_root.join("classes/Foo.cls")).unwrap(), b"server Foo");
        assert_eq!(fs::read(source_root.join("classes/New.cls")).unwrap(), b"server New");
        assert_eq!(fs::read(source_root.join("classes/Other.cls")).unwrap(), b"untouched");
        assert!(!staging.exists());
    }

    #[test]
    fn test_replace_with_manifest() {
        let (_temp_dir, staging, source_root) = layout();

        let stats = replace_local_files(&staging, &source_root, true).unwrap();

        assert!(stats.manifest_replaced);
        assert_eq!(fs::read(source_root.join(PACKAGE_FILE_NAME)).unwrap(), b"<Package>server</Package>");
    }

    #[test]
    fn test_nested_manifest_name_is_not_the_manifest() {
        let (_temp_dir, staging, source_root) = layout();
        fs::create_dir_all(staging.join("documents")).unwrap();
        fs::write(staging.join("documents/package.xml"), b"doc").unwrap();

        replace_local_files(&staging, &source_root, false).unwrap();

        assert_eq!(fs::read(source_root.join("documents/package.xml")).unwrap(), b"doc");
    }

    #[test]
    fn test_missing_staging_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = replace_local_files(&temp_dir.path().join("nope"), temp_dir.path(), false);
        assert!(result.is_err());
    }
}
