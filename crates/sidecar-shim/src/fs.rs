//! Local-filesystem façade with the host editor's typed error taxonomy.

use crate::types::Uri;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Filesystem error carrying a stable `code` discriminator and the
/// affected resource.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("file not found: {resource}")]
    FileNotFound { resource: String },
    #[error("file exists: {resource}")]
    FileExists { resource: String },
    #[error("not a directory: {resource}")]
    FileNotADirectory { resource: String },
    #[error("is a directory: {resource}")]
    FileIsADirectory { resource: String },
    #[error("no permissions: {resource}")]
    NoPermissions { resource: String },
    #[error("unavailable: {resource}")]
    Unavailable { resource: String },
    #[error("{message}: {resource}")]
    Unknown { resource: String, message: String },
}

impl FsError {
    pub fn file_not_found(uri: &Uri) -> Self {
        Self::FileNotFound {
            resource: uri.to_string(),
        }
    }

    /// Stable code string for logs and wire payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "FileNotFound",
            Self::FileExists { .. } => "FileExists",
            Self::FileNotADirectory { .. } => "FileNotADirectory",
            Self::FileIsADirectory { .. } => "FileIsADirectory",
            Self::NoPermissions { .. } => "NoPermissions",
            Self::Unavailable { .. } => "Unavailable",
            Self::Unknown { .. } => "Unknown",
        }
    }

    fn from_io(err: io::Error, uri: &Uri) -> Self {
        let resource = uri.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound { resource },
            io::ErrorKind::AlreadyExists => Self::FileExists { resource },
            io::ErrorKind::PermissionDenied => Self::NoPermissions { resource },
            _ => Self::Unknown {
                resource,
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    SymbolicLink,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub file_type: FileType,
    pub size: u64,
    pub mtime_ms: u64,
    pub ctime_ms: u64,
}

/// Thin delegate over local filesystem calls, addressed by Uri.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemApi;

impl FileSystemApi {
    pub fn new() -> Self {
        Self
    }

    pub fn stat(&self, uri: &Uri) -> Result<FileStat, FsError> {
        let metadata = fs::symlink_metadata(path_of(uri)).map_err(|e| FsError::from_io(e, uri))?;
        let file_type = if metadata.file_type().is_symlink() {
            FileType::SymbolicLink
        } else if metadata.is_dir() {
            FileType::Directory
        } else if metadata.is_file() {
            FileType::File
        } else {
            FileType::Unknown
        };
        Ok(FileStat {
            file_type,
            size: metadata.len(),
            mtime_ms: system_time_ms(metadata.modified().ok()),
            ctime_ms: system_time_ms(metadata.created().ok()),
        })
    }

    pub fn read_file(&self, uri: &Uri) -> Result<Vec<u8>, FsError> {
        fs::read(path_of(uri)).map_err(|e| FsError::from_io(e, uri))
    }

    pub fn read_file_to_string(&self, uri: &Uri) -> Result<String, FsError> {
        fs::read_to_string(path_of(uri)).map_err(|e| FsError::from_io(e, uri))
    }

    /// Write, creating missing parent directories — a deliberate leniency
    /// over the stricter real host.
    pub fn write_file(&self, uri: &Uri, contents: &[u8]) -> Result<(), FsError> {
        let path = path_of(uri);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::from_io(e, uri))?;
        }
        fs::write(&path, contents).map_err(|e| FsError::from_io(e, uri))
    }

    /// Delete a file, or a directory recursively.
    pub fn delete(&self, uri: &Uri) -> Result<(), FsError> {
        let path = path_of(uri);
        let metadata = fs::symlink_metadata(&path).map_err(|e| FsError::from_io(e, uri))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| FsError::from_io(e, uri))
        } else {
            fs::remove_file(&path).map_err(|e| FsError::from_io(e, uri))
        }
    }

    pub fn create_directory(&self, uri: &Uri) -> Result<(), FsError> {
        fs::create_dir_all(path_of(uri)).map_err(|e| FsError::from_io(e, uri))
    }

    /// Directory entries as `(name, file_type)`, sorted by name.
    pub fn read_directory(&self, uri: &Uri) -> Result<Vec<(String, FileType)>, FsError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path_of(uri)).map_err(|e| FsError::from_io(e, uri))? {
            let entry = entry.map_err(|e| FsError::from_io(e, uri))?;
            let file_type = entry
                .file_type()
                .map(|t| {
                    if t.is_symlink() {
                        FileType::SymbolicLink
                    } else if t.is_dir() {
                        FileType::Directory
                    } else if t.is_file() {
                        FileType::File
                    } else {
                        FileType::Unknown
                    }
                })
                .unwrap_or(FileType::Unknown);
            entries.push((entry.file_name().to_string_lossy().to_string(), file_type));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    pub fn rename(&self, source: &Uri, target: &Uri) -> Result<(), FsError> {
        let to = path_of(target);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::from_io(e, target))?;
        }
        fs::rename(path_of(source), &to).map_err(|e| FsError::from_io(e, source))
    }

    pub fn copy(&self, source: &Uri, target: &Uri) -> Result<(), FsError> {
        let to = path_of(target);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::from_io(e, target))?;
        }
        fs::copy(path_of(source), &to)
            .map(|_| ())
            .map_err(|e| FsError::from_io(e, source))
    }
}

fn path_of(uri: &Uri) -> PathBuf {
    Path::new(uri.fs_path()).to_path_buf()
}

fn system_time_ms(time: Option<std::time::SystemTime>) -> u64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
