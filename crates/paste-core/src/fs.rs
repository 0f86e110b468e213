//! Atomic file writes for the file backend.
//!
//! Both writers stage bytes in a uniquely named sibling temp file first, so a
//! reader never observes a half-written document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Prefix marking staging files; directory scans skip these.
pub const TEMP_PREFIX: &str = ".tmp-";

/// A fresh staging path next to `destination`.
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let name = format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple());
    match destination.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn stage(destination: &Path, contents: &[u8]) -> io::Result<PathBuf> {
    let temp_path = temp_path_for(destination);
    let mut file = fs::File::create(&temp_path)?;
    if let Err(e) = file.write_all(contents).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(temp_path)
}

/// Write `contents` to `destination` only if nothing is there yet.
///
/// The staged file is hard-linked into place, which fails with
/// `AlreadyExists` when the destination is taken. Two concurrent writers to
/// the same path therefore cannot both succeed.
pub fn write_new(destination: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = stage(destination, contents)?;
    let linked = fs::hard_link(&temp_path, destination);
    let _ = fs::remove_file(&temp_path);
    linked
}

/// Write `contents` to `destination`, replacing whatever is there.
pub fn write_replace(destination: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = stage(destination, contents)?;
    rename_with_fallback(&temp_path, destination)
}

/// Rename `temp_path` over `destination`.
///
/// Where rename refuses an existing target, the target is removed and the
/// rename retried once. The temp file is removed if both attempts fail.
pub fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    let Err(first) = fs::rename(temp_path, destination) else {
        return Ok(());
    };
    let _ = fs::remove_file(destination);
    fs::rename(temp_path, destination).map_err(|second| {
        let _ = fs::remove_file(temp_path);
        io::Error::new(
            second.kind(),
            format!("Atomic rename failed (first: {}, retry: {})", first, second),
        )
    })
}
