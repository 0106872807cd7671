use std::{fs, path::{Path, PathBuf}};

use anyhow::{anyhow, bail, Context, Result};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Error unless a regular file exists at `path`.
pub(crate) fn require_file_exists(path: &Path) -> Result<()> {
    if !path.exists() { bail!("File does not exist: {}", path.display()); }
    if !path.is_file() { bail!("Path exists but is not a file: {}", path.display()); }
    Ok(())
}

/// Extracts the given `.zip` file into `dest_dir`.
pub(crate) fn extract_zip(zip_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)
        .with_context(|| format!("failed to open {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| anyhow!("failed to read zip archive {}: {e}", zip_path.display()))?;

    archive.extract(dest_dir)
        .map_err(|e| anyhow!("failed to extract {} to {}: {e}", zip_path.display(), dest_dir.display()))?;

    Ok(())
}

/// Find the first file under `dir` (recursively, in sorted order) with the given extension.
pub(crate) fn find_with_extension(dir: &Path, extension: &str) -> Result<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .find(|path| path.is_file() && has_extension(path, extension))
        .ok_or_else(|| anyhow!("no .{extension} file found under {}", dir.display()))
}

/// Whether a source identifier names a remote resource rather than a local path.
pub(crate) fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Case-insensitive extension check.
pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
