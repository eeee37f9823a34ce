//! File system tools.

#![allow(clippy::needless_pass_by_value)]

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tool_registry::{LocalTool, tool};
use tracing::debug;

/// Default ceiling for [`read_file`].
pub const DEFAULT_MAX_READ_BYTES: u64 = 1_048_576;

/// Errors reported by the file tools.
#[derive(Debug, Error)]
pub enum FileToolError {
    /// Nothing exists at the path.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// Absolute path.
        path: PathBuf,
    },

    /// The path exists but is not a regular file.
    #[error("path is not a file: {}", path.display())]
    NotAFile {
        /// Absolute path.
        path: PathBuf,
    },

    /// The path exists but is not a directory.
    #[error("path is not a directory: {}", path.display())]
    NotADirectory {
        /// Absolute path.
        path: PathBuf,
    },

    /// The file exceeds the read limit.
    #[error("file too large: {size} bytes (max {max} bytes)")]
    TooLarge {
        /// Actual size.
        size: u64,
        /// Allowed size.
        max: u64,
    },

    /// Any other I/O failure.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        /// Operation being attempted.
        action: &'static str,
        /// Absolute path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

impl FileToolError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                action,
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Result alias for file tools.
pub type FileResult<T> = Result<T, FileToolError>;

/// Directory listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryEntry {
    /// File name.
    pub name: String,
    /// `directory` or `file`.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes for files, when details were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Modification time in seconds since the epoch, when details were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<f64>,
    /// Octal permission bits, when details were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

/// Kind of file system entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// Anything else.
    File,
}

/// Metadata returned by [`get_file_info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    /// File name.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub modified: Option<f64>,
    /// Octal permission bits.
    pub permissions: Option<String>,
    /// Extension including the dot, for files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Whether the first KiB looks like printable ASCII, for files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_text: Option<bool>,
}

/// Bindings of this module.
///
/// # Errors
///
/// Returns an error if a derived descriptor is invalid.
pub fn tools() -> tool_primitives::Result<Vec<LocalTool>> {
    Ok(vec![
        read_file_tool()?,
        write_file_tool()?,
        list_directory_tool()?,
        get_file_info_tool()?,
        delete_file_tool()?,
    ])
}

/// Reads the contents of a text file.
///
/// # Arguments
/// * `file_path` - Path to the file to read
/// * `max_size` - Maximum file size to read in bytes
///
/// # Errors
///
/// Fails unless the path is a regular file no larger than `max_size`.
#[tool(permission = "safe", category = "file_system", tags = "file, read, io")]
pub async fn read_file(
    file_path: String,
    #[tool(default = 1_048_576_u64)] max_size: u64,
) -> FileResult<String> {
    let path = absolute(&file_path);
    let metadata = fs::metadata(&path)
        .await
        .map_err(|err| FileToolError::io("inspect", &path, err))?;
    if !metadata.is_file() {
        return Err(FileToolError::NotAFile { path });
    }
    if metadata.len() > max_size {
        return Err(FileToolError::TooLarge {
            size: metadata.len(),
            max: max_size,
        });
    }

    let bytes = fs::read(&path)
        .await
        .map_err(|err| FileToolError::io("read", &path, err))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => format!(
            "Binary file ({} bytes) - content not displayable as text",
            err.as_bytes().len()
        ),
    })
}

/// Writes content to a file, replacing any existing content.
///
/// # Arguments
/// * `file_path` - Path where to write the file
/// * `content` - Content to write
/// * `create_dirs` - Create missing parent directories
///
/// # Errors
///
/// Fails when the parent directory is missing and `create_dirs` is false, or
/// when the write itself fails.
#[tool(permission = "elevated", category = "file_system", tags = "file, write, io")]
pub async fn write_file(
    file_path: String,
    content: String,
    #[tool(default = false)] create_dirs: bool,
) -> FileResult<String> {
    let path = absolute(&file_path);
    if let Some(parent) = path.parent() {
        if create_dirs {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| FileToolError::io("create", parent, err))?;
        } else if !fs::try_exists(parent).await.unwrap_or(false) {
            return Err(FileToolError::NotFound {
                path: parent.to_path_buf(),
            });
        }
    }

    fs::write(&path, content.as_bytes())
        .await
        .map_err(|err| FileToolError::io("write", &path, err))?;
    debug!(path = %path.display(), bytes = content.len(), "file written");
    Ok(format!(
        "Successfully wrote {} characters to {}",
        content.chars().count(),
        path.display()
    ))
}

/// Lists the contents of a directory, directories first.
///
/// # Arguments
/// * `directory_path` - Path to the directory to list
/// * `include_hidden` - Include entries whose name starts with a dot
/// * `show_details` - Include size, modification time and permissions
///
/// # Errors
///
/// Fails when the path is missing or is not a directory.
#[tool(permission = "safe", category = "file_system", tags = "directory, list, files")]
pub async fn list_directory(
    directory_path: String,
    #[tool(default = false)] include_hidden: bool,
    #[tool(default = false)] show_details: bool,
) -> FileResult<Vec<DirectoryEntry>> {
    let path = absolute(&directory_path);
    let metadata = fs::metadata(&path)
        .await
        .map_err(|err| FileToolError::io("inspect", &path, err))?;
    if !metadata.is_dir() {
        return Err(FileToolError::NotADirectory { path });
    }

    let mut reader = fs::read_dir(&path)
        .await
        .map_err(|err| FileToolError::io("list", &path, err))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|err| FileToolError::io("list", &path, err))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !include_hidden && name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().await.ok();
        let kind = match &metadata {
            Some(metadata) if metadata.is_dir() => EntryKind::Directory,
            _ => EntryKind::File,
        };
        let (size, modified, permissions) = match (&metadata, show_details) {
            (Some(metadata), true) => (
                (kind == EntryKind::File).then(|| metadata.len()),
                modified_secs(metadata),
                permission_bits(metadata),
            ),
            _ => (None, None, None),
        };
        entries.push(DirectoryEntry {
            name,
            kind,
            path: entry.path(),
            size,
            modified,
            permissions,
        });
    }

    entries.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(entries)
}

/// Returns detailed information about a file or directory.
///
/// # Arguments
/// * `file_path` - Path to the file or directory
///
/// # Errors
///
/// Fails when the path is missing or cannot be inspected.
#[tool(permission = "safe", category = "file_system", tags = "file, info, metadata")]
pub async fn get_file_info(file_path: String) -> FileResult<FileInfo> {
    let path = absolute(&file_path);
    let metadata = fs::metadata(&path)
        .await
        .map_err(|err| FileToolError::io("inspect", &path, err))?;

    let is_file = metadata.is_file();
    let (extension, is_text) = if is_file {
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        (Some(extension), Some(looks_like_text(&path).await))
    } else {
        (None, None)
    };

    Ok(FileInfo {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        kind: if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: metadata.len(),
        modified: modified_secs(&metadata),
        permissions: permission_bits(&metadata),
        extension,
        is_text,
        path,
    })
}

/// Deletes a single file.
///
/// # Arguments
/// * `file_path` - Path to the file to delete
///
/// # Errors
///
/// Fails when the path is missing or is a directory.
#[tool(permission = "dangerous", category = "file_system", tags = "file, delete, io")]
pub async fn delete_file(file_path: String) -> FileResult<String> {
    let path = absolute(&file_path);
    let metadata = fs::symlink_metadata(&path)
        .await
        .map_err(|err| FileToolError::io("inspect", &path, err))?;
    if metadata.is_dir() {
        return Err(FileToolError::NotAFile { path });
    }
    fs::remove_file(&path)
        .await
        .map_err(|err| FileToolError::io("delete", &path, err))?;
    debug!(path = %path.display(), "file deleted");
    Ok(format!("Deleted {}", path.display()))
}

fn absolute(raw: &str) -> PathBuf {
    let path = Path::new(raw);
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn modified_secs(metadata: &std::fs::Metadata) -> Option<f64> {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_secs_f64())
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;

    Some(format!("{:o}", metadata.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &std::fs::Metadata) -> Option<String> {
    None
}

async fn looks_like_text(path: &Path) -> bool {
    use tokio::io::AsyncReadExt;

    let Ok(file) = fs::File::open(path).await else {
        return false;
    };
    let mut sample = Vec::with_capacity(1024);
    if file.take(1024).read_to_end(&mut sample).await.is_err() {
        return false;
    }
    sample
        .iter()
        .all(|byte| (32..127).contains(byte) || matches!(byte, b'\n' | b'\r' | b'\t'))
}
