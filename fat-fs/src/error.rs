use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
  IoError,
  PathNotFound,
  NotFound,
  AlreadyExists,
  NameTooLong,
  DirectoryFull,
  OutOfSpace,
  PermissionDenied,
  IsDirectory,
  NotDirectory,
  DirectoryNotEmpty,
  InvalidMode,
}

pub type Result<T> = core::result::Result<T, FsError>;

impl fmt::Display for FsError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let msg = match self {
      FsError::IoError => "block device I/O error",
      FsError::PathNotFound => "no such directory in path",
      FsError::NotFound => "no such file or directory",
      FsError::AlreadyExists => "name already exists",
      FsError::NameTooLong => "name too long",
      FsError::DirectoryFull => "directory has no free entry",
      FsError::OutOfSpace => "no free block on device",
      FsError::PermissionDenied => "permission denied",
      FsError::IsDirectory => "is a directory",
      FsError::NotDirectory => "not a directory",
      FsError::DirectoryNotEmpty => "directory not empty",
      FsError::InvalidMode => "invalid access mode",
    };
    write!(f, "{}", msg)
  }
}
