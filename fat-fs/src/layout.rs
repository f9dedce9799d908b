//! On-disk record layout
use core::slice;

use bitflags::bitflags;

use crate::error::{FsError, Result};

/// entry names keep one byte of their field for the terminator
pub const MAX_NAME_LEN: usize = 55;
/// size of an on-disk directory entry
pub const DIRENT_SZ: usize = 64;

const NAME_FIELD: usize = MAX_NAME_LEN + 1;

const TYPE_FILE: u8 = 0;
const TYPE_DIR: u8 = 1;

bitflags! {
  /// per-entry access rights, stored in the low three bits of one byte
  pub struct AccessMode: u8 {
    const READ = 0x4;
    const WRITE = 0x2;
    const EXECUTE = 0x1;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  File,
  Directory,
}

/// 64-byte directory record: `name[56] | size u32 | first_blk u16 | type u8 | access u8`.
/// Field order leaves no padding, so the struct can be moved to and from
/// disk as raw bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirEntry {
  name: [u8; NAME_FIELD],
  size: u32,
  first_blk: u16,
  kind: u8,
  access: u8,
}

/// Reject names the 56-byte field cannot hold.
pub(crate) fn check_name(name: &[u8]) -> Result<()> {
  if name.len() > MAX_NAME_LEN {
    return Err(FsError::NameTooLong);
  }
  Ok(())
}

impl DirEntry {
  pub fn empty() -> Self {
    Self {
      name: [0; NAME_FIELD],
      size: 0,
      first_blk: 0,
      kind: TYPE_FILE,
      access: 0,
    }
  }

  pub fn new(
    name: &[u8],
    kind: EntryKind,
    first_blk: u16,
    size: u32,
    access: AccessMode,
  ) -> Result<Self> {
    check_name(name)?;
    let mut field = [0u8; NAME_FIELD];
    field[..name.len()].copy_from_slice(name);
    Ok(Self {
      name: field,
      size,
      first_blk,
      kind: match kind {
        EntryKind::File => TYPE_FILE,
        EntryKind::Directory => TYPE_DIR,
      },
      access: access.bits(),
    })
  }

  /// A slot is free when the first name byte is zero.
  pub fn is_free(&self) -> bool {
    self.name[0] == 0
  }

  pub fn name_bytes(&self) -> &[u8] {
    let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD);
    &self.name[..len]
  }

  /// Entry name for display; names enter through `&str` paths so this is
  /// lossless in practice.
  pub fn name(&self) -> &str {
    core::str::from_utf8(self.name_bytes()).unwrap_or("")
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn first_blk(&self) -> u16 {
    self.first_blk
  }

  pub fn kind(&self) -> EntryKind {
    if self.kind == TYPE_DIR {
      EntryKind::Directory
    } else {
      EntryKind::File
    }
  }

  pub fn is_dir(&self) -> bool {
    self.kind == TYPE_DIR
  }

  pub fn is_file(&self) -> bool {
    self.kind == TYPE_FILE
  }

  pub fn access(&self) -> AccessMode {
    AccessMode::from_bits_truncate(self.access)
  }

  pub fn set_access(&mut self, access: AccessMode) {
    self.access = access.bits();
  }

  pub fn set_size(&mut self, size: u32) {
    self.size = size;
  }

  pub fn set_first_blk(&mut self, first_blk: u16) {
    self.first_blk = first_blk;
  }

  pub fn rename(&mut self, name: &[u8]) -> Result<()> {
    check_name(name)?;
    self.name = [0; NAME_FIELD];
    self.name[..name.len()].copy_from_slice(name);
    Ok(())
  }

  pub fn clear(&mut self) {
    *self = Self::empty();
  }

  pub fn as_bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self as *const _ as *const u8, DIRENT_SZ) }
  }

  pub fn as_bytes_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self as *mut _ as *mut u8, DIRENT_SZ) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_is_64_bytes() {
    assert_eq!(core::mem::size_of::<DirEntry>(), DIRENT_SZ);
  }

  #[test]
  fn name_length_is_enforced() {
    let long = [b'a'; MAX_NAME_LEN + 1];
    assert_eq!(
      DirEntry::new(&long, EntryKind::File, 2, 0, AccessMode::READ).err(),
      Some(FsError::NameTooLong)
    );
    let ok = [b'a'; MAX_NAME_LEN];
    let entry = DirEntry::new(&ok, EntryKind::File, 2, 0, AccessMode::READ).unwrap();
    assert_eq!(entry.name_bytes(), &ok[..]);
  }
}
