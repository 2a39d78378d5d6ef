//! Directory tree hashing and copying.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use roundup_shared::{RoundupError, RoundupResult};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

pub const DIGEST_PREFIX: &str = "sha256:";

/// Digest of a directory tree as `sha256:<hex>`.
///
/// Covers every regular file's relative path, executable bit and content, in
/// sorted path order. Directories and timestamps are not part of the digest.
/// Top-level entries named in `exclude` are skipped.
pub fn tree_digest(root: &Path, exclude: &[&str]) -> RoundupResult<String> {
    let mut hasher = Sha256::new();

    for (relative, path) in files(root)? {
        if exclude.iter().any(|name| relative == *name) {
            continue;
        }
        let content = fs::read(&path)?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8, if is_executable(&path)? { b'x' } else { b'-' }]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }

    Ok(format!("{DIGEST_PREFIX}{}", hex::encode(hasher.finalize())))
}

/// Hex sha256 of a single file.
pub fn file_sha256(path: &Path) -> RoundupResult<String> {
    let content = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Regular files under `root` as `(relative path with '/' separators, path)`,
/// sorted by relative path.
pub fn files(root: &Path) -> RoundupResult<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| RoundupError::Internal(e.to_string()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push((relative, entry.into_path()));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Copy `src` into `dst` recursively, preserving file permissions.
///
/// Symlinks are followed and their targets copied as regular files.
pub fn copy_tree(src: &Path, dst: &Path) -> RoundupResult<u64> {
    let mut copied = 0;
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| RoundupError::Internal(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Mark a file executable for everyone who can read it.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> RoundupResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> RoundupResult<()> {
    Ok(())
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> RoundupResult<bool> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> RoundupResult<bool> {
    Ok(fs::metadata(path)?.is_file())
}

/// Remove a directory tree if it exists.
pub fn remove_if_exists(path: &Path) -> RoundupResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Sibling staging directory: `<path>.partial`.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn walk_error(e: walkdir::Error) -> RoundupError {
    match e.into_io_error() {
        Some(io) => RoundupError::Io(io),
        None => RoundupError::Storage("filesystem loop while walking tree".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_digest_is_stable_across_copies() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src, "a.txt", "alpha");
        write(&src, "nested/b.txt", "beta");

        let dst = tmp.path().join("dst");
        assert_eq!(copy_tree(&src, &dst).unwrap(), 2);
        assert_eq!(tree_digest(&src, &[]).unwrap(), tree_digest(&dst, &[]).unwrap());
        assert!(tree_digest(&src, &[]).unwrap().starts_with(DIGEST_PREFIX));
    }

    #[test]
    fn test_digest_changes_with_content_and_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "a.txt", "alpha");
        let before = tree_digest(root, &[]).unwrap();

        write(root, "a.txt", "alphA");
        let edited = tree_digest(root, &[]).unwrap();
        assert_ne!(before, edited);

        fs::rename(root.join("a.txt"), root.join("b.txt")).unwrap();
        assert_ne!(edited, tree_digest(root, &[]).unwrap());
    }

    #[test]
    fn test_digest_exclude() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "a.txt", "alpha");
        let before = tree_digest(root, &[]).unwrap();

        write(root, "record.json", "{}");
        assert_eq!(before, tree_digest(root, &["record.json"]).unwrap());
        assert_ne!(before, tree_digest(root, &[]).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_digest_tracks_executable_bit() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "tool", "#!/bin/sh\n");
        let before = tree_digest(root, &[]).unwrap();

        set_executable(&root.join("tool")).unwrap();
        assert!(is_executable(&root.join("tool")).unwrap());
        assert_ne!(before, tree_digest(root, &[]).unwrap());
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/tmp/build/env")),
            PathBuf::from("/tmp/build/env.partial")
        );
    }

    #[test]
    fn test_remove_if_exists() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("gone");
        remove_if_exists(&dir).unwrap();
        fs::create_dir(&dir).unwrap();
        remove_if_exists(&dir).unwrap();
        assert!(!dir.exists());
    }
}
