use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::config::Config;

/// Top-level folder every archive entry lives under
pub const ARCHIVE_ROOT: &str = "unpackaged";
pub const ARCHIVE_FILE_NAME: &str = "unpackaged.zip";

/// Zip the metadata root into `dest`, skipping ignored paths.
/// Returns the number of files written.
pub fn write_deploy_archive(source_root: &Path, dest: &Path, config: &Config) -> Result<usize> {
    let file = File::create(dest)
        .with_context(|| format!("Failed to create archive: {}", dest.display()))?;

    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0;

    for entry in WalkDir::new(source_root).min_depth(1).sort_by_file_name() {
        let entry = entry
            .with_context(|| format!("Failed to walk metadata root: {}", source_root.display()))?;

        let relative = entry.path().strip_prefix(source_root)
            .with_context(|| format!("Path escaped metadata root: {}", entry.path().display()))?;

        if config.should_ignore(relative) {
            continue;
        }

        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let name = format!("{}/{}", ARCHIVE_ROOT, name);

        if entry.file_type().is_dir() {
            writer.add_directory(name.as_str(), options)
                .with_context(|| format!("Failed to add directory to archive: {}", name))?;
            continue;
        }

        writer.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add file to archive: {}", name))?;

        let mut reader = BufReader::new(
            File::open(entry.path())
                .with_context(|| format!("Failed to open file: {}", entry.path().display()))?,
        );
        io::copy(&mut reader, &mut writer)
            .with_context(|| format!("Failed to write archive entry: {}", name))?;

        files += 1;
    }

    writer.finish()
        .with_context(|| format!("Failed to finish archive: {}", dest.display()))?;

    debug!(files, archive = %dest.display(), "Deploy archive written");
    Ok(files)
}
