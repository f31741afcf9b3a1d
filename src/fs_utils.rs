use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Atomically write data to a file using temp file + rename
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    let parent = path.parent().unwrap_or(Path::new("."));
    let temp_path = parent.join(format!(
        ".orgsync_tmp_{}_{}",
        std::process::id(),
        rand_suffix()
    ));

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    file.sync_all()
        .with_context(|| format!("Failed to sync temp file: {}", temp_path.display()))?;

    drop(file);

    fs::rename(&temp_path, path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Failed to rename temp file to: {}", path.display())
    })?;

    Ok(())
}

/// Generate a random suffix for temp files
fn rand_suffix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    duration.as_nanos() as u64
}

/// Serialize a value as pretty JSON and write it atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;

    atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Read and parse a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Absolute form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the missing components are appended
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    }
    else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(base) = fs::canonicalize(existing) {
            return Ok(missing.iter().rev().fold(base, |acc: PathBuf, name| acc.join(name)));
        }

        let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
            bail!("Cannot resolve path: {}", path.display());
        };
        missing.push(name.to_os_string());
        existing = parent;
    }
}

/// Whether `path` is `dir` itself or lies somewhere below it
pub fn is_within(path: &Path, dir: &Path) -> Result<bool> {
    Ok(resolve_path(path)?.starts_with(resolve_path(dir)?))
}

/// Recursively copy a directory tree; `dest` must not exist yet and must not lie inside `src`
pub fn copy_dir_all(src: &Path, dest: &Path) -> Result<()> {
    if is_within(dest, src)? {
        bail!(
            "Cannot copy {} into itself ({})",
            src.display(),
            dest.display()
        );
    }

    for entry in WalkDir::new(src) {
        let entry = entry
            .with_context(|| format!("Failed to walk directory: {}", src.display()))?;
        let relative = entry.path().strip_prefix(src)
            .with_context(|| format!("Path escaped copy root: {}", entry.path().display()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        }
        else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }

    Ok(())
}

/// Remove everything inside a directory, keeping the directory itself
pub fn empty_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return ensure_dir(dir);
    }

    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
        }
        else {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove file: {}", path.display()))?;
        }
    }

    Ok(())
}

/// Remove empty directories below `root`, deepest first; `root` itself is kept.
/// Returns the number of directories removed.
pub fn remove_empty_directories(root: &Path) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut removed = 0;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let is_empty = fs::read_dir(entry.path())
            .with_context(|| format!("Failed to read directory: {}", entry.path().display()))?
            .next()
            .is_none();

        if is_empty {
            fs::remove_dir(entry.path())
                .with_context(|| format!("Failed to remove directory: {}", entry.path().display()))?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_file.txt");
        let data = b"Hello, World!";

        atomic_write(&file_path, data).unwrap();

        assert!(file_path.exists());
        let content = fs::read(&file_path).unwrap();
        assert_eq!(content, data);
    }

    #[test]
    fn test_atomic_write_overwrites_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_file.txt");

        fs::write(&file_path, b"Old content").unwrap();

        atomic_write(&file_path, b"New content").unwrap();

        let content = fs::read(&file_path).unwrap();
        assert_eq!(content, b"New content");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("dirs").join("test_file.txt");

        atomic_write(&file_path, b"Test data").unwrap();

        assert!(file_path.exists());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        atomic_write(&temp_dir.path().join("a.json"), b"{}").unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json"]);
    }

    #[test]
    fn test_json_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join(".session");

        let mut value = BTreeMap::new();
        value.insert("accessToken".to_string(), "abc".to_string());
        write_json(&path, &value).unwrap();

        let loaded: BTreeMap<String, String> = read_json(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_read_json_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let result: Result<BTreeMap<String, String>> = read_json(&path);
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_ensure_dir_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir_path = temp_dir.path().join("nested").join("dir");

        ensure_dir(&dir_path).unwrap();
        ensure_dir(&dir_path).unwrap();

        assert!(dir_path.is_dir());
    }

    #[test]
    fn test_copy_dir_all() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("origin");
        fs::create_dir_all(src.join("src/classes")).unwrap();
        fs::write(src.join("src/package.xml"), b"<Package/>").unwrap();
        fs::write(src.join("src/classes/Foo.cls"), b"public class Foo {}").unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();

        let dest = temp_dir.path().join("copy");
        copy_dir_all(&src, &dest).unwrap();

        assert_eq!(fs::read(dest.join("src/package.xml")).unwrap(), b"<Package/>");
        assert_eq!(fs::read(dest.join("src/classes/Foo.cls")).unwrap(), b"public class Foo {}");
        assert!(dest.join("empty").is_dir());
    }

    #[test]
    fn test_copy_dir_all_rejects_nested_destination() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("origin");
        fs::create_dir_all(src.join("src/classes")).unwrap();
        fs::write(src.join("src/classes/Foo.cls"), b"public class Foo {}").unwrap();

        let err = copy_dir_all(&src, &src.join("ws").join("Imported")).unwrap_err();

        assert!(err.to_string().contains("into itself"));
        assert!(!src.join("ws").exists());
        assert_eq!(fs::read_dir(&src).unwrap().count(), 1);
    }

    #[test]
    fn test_resolve_path_missing_tail() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();

        let resolved = resolve_path(&temp_dir.path().join("a").join("b")).unwrap();

        assert_eq!(resolved, base.join("a").join("b"));
        assert!(is_within(&temp_dir.path().join("a"), temp_dir.path()).unwrap());
        assert!(!is_within(temp_dir.path(), &temp_dir.path().join("a")).unwrap());
    }

    #[test]
    fn test_empty_directory_keeps_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("classes")).unwrap();
        fs::write(root.join("classes/Foo.cls"), b"x").unwrap();
        fs::write(root.join("package.xml"), b"y").unwrap();

        empty_directory(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_directory_creates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("src");

        empty_directory(&root).unwrap();

        assert!(root.is_dir());
    }

    #[test]
    fn test_remove_empty_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("classes")).unwrap();
        fs::create_dir_all(root.join("pages/nested/deeper")).unwrap();
        fs::write(root.join("classes/Foo.cls"), b"x").unwrap();

        let removed = remove_empty_directories(&root).unwrap();

        assert_eq!(removed, 3);
        assert!(root.join("classes/Foo.cls").exists());
        assert!(!root.join("pages").exists());
        assert!(root.is_dir());
    }
}
