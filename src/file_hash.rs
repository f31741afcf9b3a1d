use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for reading files during hashing (64KB)
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the blake3 hash of a file
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a file under the metadata root, or `None` when it is not on disk
pub fn hash_source_file(source_root: &Path, file_name: &str) -> Result<Option<String>> {
    let path = source_root.join(file_name);
    if !path.is_file() {
        return Ok(None);
    }

    hash_file(&path).map(Some)
}
