use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Read a text file, `Ok(None)` when it does not exist
pub fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Create the parent directory chain of `path`
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Atomic write with robust temp file strategy
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    // Prefer same-dir tempfile; fall back to OS temp on EPERM/ENOENT
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Preserve original permissions
    #[cfg(unix)]
    let perms = fs::metadata(path)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| std::os::unix::fs::PermissionsExt::from_mode(0o644));
    #[cfg(not(unix))]
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = match tempfile::NamedTempFile::new_in(dir) {
        Ok(t) => t,
        Err(_) => tempfile::NamedTempFile::new()?,
    };

    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    #[cfg(unix)]
    fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    #[cfg(not(unix))]
    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    // Atomically replace the destination
    if let Err(e) = tmp.persist(path) {
        // Different filesystem? Try copy fallback
        fs::copy(e.file.path(), path)
            .with_context(|| format!("copy temp file onto {}", path.display()))?;
    }

    Ok(())
}

/// Create parents, then write atomically
pub fn write_with_parents(path: &Path, data: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    write_atomic(path, data)
}

/// Copy a file or a whole directory tree; `dest` must not exist.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    if src.is_file() {
        ensure_parent(dest)?;
        fs::copy(src, dest)
            .with_context(|| format!("copy {} -> {}", src.display(), dest.display()))?;
        return Ok(());
    }

    // Walk everything: hidden files and ignored files are still content
    let walker = ignore::WalkBuilder::new(src)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("strip prefix {}", src.display()))?;
        let target = dest.join(rel);

        match entry.file_type() {
            Some(ft) if ft.is_dir() => {
                fs::create_dir_all(&target)
                    .with_context(|| format!("create dir {}", target.display()))?;
            }
            _ => {
                ensure_parent(&target)?;
                fs::copy(entry.path(), &target).with_context(|| {
                    format!("copy {} -> {}", entry.path().display(), target.display())
                })?;
            }
        }
    }

    Ok(())
}

/// Move a file or directory; falls back to copy + remove when rename fails
/// (typically EXDEV across mount points).
pub fn move_path(src: &Path, dest: &Path) -> Result<()> {
    ensure_parent(dest)?;
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, "rename failed, falling back to copy + remove");
            copy_tree(src, dest)?;
            remove_path(src)
        }
    }
}

/// Remove a file or a directory recursively
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("stat {}", path.display()))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("remove dir {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("remove file {}", path.display()))
    }
}
