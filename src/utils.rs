use std::fs;
use std::io;
use std::path::Path;

/// Replace every backslash with a forward slash
pub fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Normalize a folder path to forward slashes with exactly one trailing separator
/// appended when missing
pub fn normalize_folder(path: &str) -> String {
    let mut folder = to_forward_slashes(path);
    if !folder.ends_with('/') {
        folder.push('/');
    }
    folder
}

/// Normalize a source path to forward slashes, dropping a single trailing separator
pub fn normalize_source(path: &str) -> String {
    let mut source = to_forward_slashes(path);
    if source.ends_with('/') {
        source.pop();
    }
    source
}

/// Last segment of a forward-slash path (the whole path when it has no separator)
pub fn leaf_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Check whether a regular file exists at the path
pub fn file_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Check whether a directory exists at the path
pub fn folder_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Remove a regular file if one exists. Returns whether a file was removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    if !file_exists(path) {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}
