use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::min;

use log::{debug, warn};

use crate::{
  block_dev::BlockDevice,
  dir::DirBlock,
  error::{FsError, Result},
  fat::Fat,
  layout::{self, AccessMode, DirEntry, EntryKind},
  path, BLOCK_COUNT, BLOCK_SZ, DataBlock, ROOT_BLOCK,
};

/// The filesystem proper: the device handle, the in-memory FAT and the
/// current working directory. Operations run to completion on the caller's
/// stack; any one that touches allocation or linkage persists the FAT
/// before reporting success.
pub struct FatFileSystem {
  block_dev: Arc<dyn BlockDevice>,
  fat: Fat,
  current_dir: u16,
}

impl FatFileSystem {
  /// Open the filesystem on `block_dev`. A device that does not carry one
  /// (fresh image, failed FAT read) is formatted first.
  pub fn open(block_dev: Arc<dyn BlockDevice>) -> Result<Self> {
    let mut fs = Self {
      block_dev,
      fat: Fat::formatted(),
      current_dir: ROOT_BLOCK,
    };
    match Fat::load(&*fs.block_dev) {
      Ok(fat) if fat.is_initialized() => fs.fat = fat,
      _ => {
        warn!("no filesystem on device, formatting");
        fs.format()?;
      }
    }
    Ok(fs)
  }

  /// Reinitialize the volume: fresh FAT, zeroed root block, cwd back at `/`.
  pub fn format(&mut self) -> Result<()> {
    self.fat = Fat::formatted();
    DirBlock::empty().store(&*self.block_dev, ROOT_BLOCK)?;
    self.fat.persist(&*self.block_dev)?;
    self.current_dir = ROOT_BLOCK;
    Ok(())
  }

  /// Create the file named by `path` holding `data`.
  pub fn create(&mut self, path: &str, data: &[u8]) -> Result<()> {
    let (dir, name) = self.resolve(path)?;
    if name.is_empty() {
      return Err(FsError::NotFound);
    }
    layout::check_name(name.as_bytes())?;
    let mut blk = DirBlock::load(&*self.block_dev, dir)?;
    if blk.find(name.as_bytes()).is_some() {
      return Err(FsError::AlreadyExists);
    }
    if !blk.has_free_slot() {
      return Err(FsError::DirectoryFull);
    }
    let first = self.write_fresh_chain(data)?;
    let entry = DirEntry::new(
      name.as_bytes(),
      EntryKind::File,
      first,
      data.len() as u32,
      AccessMode::READ | AccessMode::WRITE,
    )?;
    blk.insert(entry)?;
    self.fat.persist(&*self.block_dev)?;
    blk.store(&*self.block_dev, dir)?;
    debug!("create {} ({} bytes, first block {})", path, data.len(), first);
    Ok(())
  }

  /// The exact `size` bytes of the file named by `path`.
  pub fn read(&self, path: &str) -> Result<Vec<u8>> {
    let (_, _, entry) = self.lookup(path)?;
    if entry.is_dir() {
      return Err(FsError::IsDirectory);
    }
    if !entry.access().contains(AccessMode::READ) {
      return Err(FsError::PermissionDenied);
    }
    self.read_chain(entry.first_blk(), entry.size() as usize)
  }

  /// Occupied entries of the current directory, sorted by name.
  pub fn list(&self) -> Result<Vec<DirEntry>> {
    let blk = DirBlock::load(&*self.block_dev, self.current_dir)?;
    let mut entries: Vec<DirEntry> = blk.occupied().map(|(_, e)| *e).collect();
    entries.sort_by(|a, b| a.name_bytes().cmp(b.name_bytes()));
    Ok(entries)
  }

  /// Copy the file `src` to `dst`. A `dst` naming an existing directory
  /// receives the copy under `src`'s final name.
  pub fn copy(&mut self, src: &str, dst: &str) -> Result<()> {
    let (_, _, entry) = self.lookup(src)?;
    if entry.is_dir() {
      return Err(FsError::IsDirectory);
    }
    let (dst_dir, dst_name) = self.dest_of(dst, entry.name_bytes())?;
    layout::check_name(&dst_name)?;
    let mut blk = DirBlock::load(&*self.block_dev, dst_dir)?;
    if blk.find(&dst_name).is_some() {
      return Err(FsError::AlreadyExists);
    }
    if !blk.has_free_slot() {
      return Err(FsError::DirectoryFull);
    }
    let data = self.read_chain(entry.first_blk(), entry.size() as usize)?;
    let first = self.write_fresh_chain(&data)?;
    let copy = DirEntry::new(&dst_name, entry.kind(), first, entry.size(), entry.access())?;
    blk.insert(copy)?;
    self.fat.persist(&*self.block_dev)?;
    blk.store(&*self.block_dev, dst_dir)?;
    Ok(())
  }

  /// Move or rename `src`. A `dst` naming an existing directory relocates
  /// the entry into it; anything else renames in place. Data blocks never
  /// move.
  pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
    let (src_dir, src_slot, entry) = self.lookup(src)?;
    let (dst_dir, dst_name) = self.resolve(dst)?;
    let target_dir = if dst_name.is_empty() {
      Some(dst_dir)
    } else {
      let blk = DirBlock::load(&*self.block_dev, dst_dir)?;
      match blk.find(dst_name.as_bytes()) {
        Some(slot) if blk.entry(slot).is_dir() => Some(blk.entry(slot).first_blk()),
        _ => None,
      }
    };
    match target_dir {
      Some(new_dir) => self.relocate(src_dir, src_slot, entry, new_dir),
      None => self.rename_in_place(src_dir, src_slot, dst_name),
    }
  }

  /// Remove the entry named by `path`. Directories must hold nothing beyond
  /// their `.`/`..` slots.
  pub fn remove(&mut self, path: &str) -> Result<()> {
    let (dir, slot, entry) = self.lookup(path)?;
    if entry.is_dir() {
      let child = DirBlock::load(&*self.block_dev, entry.first_blk())?;
      if !child.is_empty_dir() {
        return Err(FsError::DirectoryNotEmpty);
      }
    }
    self.fat.free_chain(entry.first_blk());
    let mut blk = DirBlock::load(&*self.block_dev, dir)?;
    blk.entry_mut(slot).clear();
    self.fat.persist(&*self.block_dev)?;
    blk.store(&*self.block_dev, dir)?;
    debug!("remove {} (first block {})", path, entry.first_blk());
    Ok(())
  }

  /// Append the content of file `src` to file `dst`. `src` is unchanged.
  pub fn append(&mut self, src: &str, dst: &str) -> Result<()> {
    let (_, _, src_entry) = self.lookup(src)?;
    let (dst_dir, dst_slot, dst_entry) = self.lookup(dst)?;
    if src_entry.is_dir() || dst_entry.is_dir() {
      return Err(FsError::IsDirectory);
    }
    if !src_entry.access().contains(AccessMode::READ)
      || !dst_entry.access().contains(AccessMode::WRITE)
    {
      return Err(FsError::PermissionDenied);
    }
    let data = self.read_chain(src_entry.first_blk(), src_entry.size() as usize)?;
    if data.is_empty() {
      return Ok(());
    }

    let size = dst_entry.size() as usize;
    let used = if size == 0 { 0 } else { (size - 1) % BLOCK_SZ + 1 };
    let free_in_last = BLOCK_SZ - used;
    let needed = (data.len().saturating_sub(free_in_last) + BLOCK_SZ - 1) / BLOCK_SZ;
    let new_blocks = self.fat.alloc_chain(needed)?;

    let chain = self.fat.chain(dst_entry.first_blk());
    let last = chain[chain.len() - 1];
    let mut written = 0;
    if free_in_last > 0 {
      let mut buf: DataBlock = [0; BLOCK_SZ];
      self.block_dev.read_block(last as usize, &mut buf)?;
      written = min(free_in_last, data.len());
      buf[used..used + written].copy_from_slice(&data[..written]);
      self.block_dev.write_block(last as usize, &buf)?;
    }
    if let Some(&first_new) = new_blocks.first() {
      self.fat.set(last, first_new as i16);
      for &b in &new_blocks {
        let mut buf: DataBlock = [0; BLOCK_SZ];
        let end = min(data.len(), written + BLOCK_SZ);
        buf[..end - written].copy_from_slice(&data[written..end]);
        self.block_dev.write_block(b as usize, &buf)?;
        written = end;
      }
    }

    let mut blk = DirBlock::load(&*self.block_dev, dst_dir)?;
    blk
      .entry_mut(dst_slot)
      .set_size(dst_entry.size() + data.len() as u32);
    self.fat.persist(&*self.block_dev)?;
    blk.store(&*self.block_dev, dst_dir)?;
    Ok(())
  }

  /// Create the directory named by `path`.
  pub fn mkdir(&mut self, path: &str) -> Result<()> {
    let (parent, name) = self.resolve(path)?;
    if name.is_empty() {
      return Err(FsError::NotFound);
    }
    layout::check_name(name.as_bytes())?;
    let mut parent_blk = DirBlock::load(&*self.block_dev, parent)?;
    if parent_blk.find(name.as_bytes()).is_some() {
      return Err(FsError::AlreadyExists);
    }
    if !parent_blk.has_free_slot() {
      return Err(FsError::DirectoryFull);
    }
    let new_blk = self.fat.alloc_chain(1)?[0];
    DirBlock::init(new_blk, parent).store(&*self.block_dev, new_blk)?;
    let rwx = AccessMode::READ | AccessMode::WRITE | AccessMode::EXECUTE;
    let entry = DirEntry::new(name.as_bytes(), EntryKind::Directory, new_blk, 0, rwx)?;
    parent_blk.insert(entry)?;
    self.fat.persist(&*self.block_dev)?;
    parent_blk.store(&*self.block_dev, parent)?;
    debug!("mkdir {} (block {})", path, new_blk);
    Ok(())
  }

  /// Change the current working directory.
  pub fn change_dir(&mut self, path: &str) -> Result<()> {
    let (dir, name) = self.resolve(path)?;
    if name.is_empty() {
      self.current_dir = dir;
      return Ok(());
    }
    let blk = DirBlock::load(&*self.block_dev, dir)?;
    let slot = blk.find(name.as_bytes()).ok_or(FsError::PathNotFound)?;
    let entry = blk.entry(slot);
    if !entry.is_dir() {
      return Err(FsError::NotDirectory);
    }
    self.current_dir = entry.first_blk();
    Ok(())
  }

  /// Absolute path of the current directory, `/`-separated with a leading
  /// and trailing slash.
  pub fn working_dir(&self) -> Result<String> {
    let mut names: Vec<String> = Vec::new();
    let mut cur = self.current_dir;
    while cur != ROOT_BLOCK && names.len() < BLOCK_COUNT {
      let parent = self.parent_of(cur)?;
      let name = DirBlock::load(&*self.block_dev, parent)?
        .occupied()
        .find(|(slot, e)| {
          (parent == ROOT_BLOCK || *slot >= 2) && e.is_dir() && e.first_blk() == cur
        })
        .map(|(_, e)| String::from(e.name()))
        .ok_or(FsError::NotFound)?;
      names.push(name);
      cur = parent;
    }
    let mut out = String::from("/");
    for name in names.iter().rev() {
      out.push_str(name);
      out.push('/');
    }
    Ok(out)
  }

  /// Replace the access rights of the entry named by `path`. `mode` is one
  /// octal digit whose low three bits are read/write/execute.
  pub fn chmod(&mut self, mode: &str, path: &str) -> Result<()> {
    let bits = u8::from_str_radix(mode, 8).map_err(|_| FsError::InvalidMode)?;
    if bits > 7 {
      return Err(FsError::InvalidMode);
    }
    let (dir, slot, _) = self.lookup(path)?;
    let mut blk = DirBlock::load(&*self.block_dev, dir)?;
    blk
      .entry_mut(slot)
      .set_access(AccessMode::from_bits_truncate(bits));
    blk.store(&*self.block_dev, dir)
  }

  /// Metadata copy of the entry named by `path`.
  pub fn stat(&self, path: &str) -> Result<DirEntry> {
    self.lookup(path).map(|(_, _, entry)| entry)
  }

  /// The in-memory FAT, for callers that want to inspect allocation state.
  pub fn fat(&self) -> &Fat {
    &self.fat
  }
}

impl FatFileSystem {
  /// Resolve `path` to the block of its deepest directory and the final
  /// component. An empty final name means the path names that directory
  /// itself. Interior components must exist and be directories.
  fn resolve<'a>(&self, path: &'a str) -> Result<(u16, &'a str)> {
    let (absolute, interior, last) = path::split(path);
    let mut dir = if absolute { ROOT_BLOCK } else { self.current_dir };
    for comp in interior {
      if comp == ".." {
        dir = self.parent_of(dir)?;
        continue;
      }
      let blk = DirBlock::load(&*self.block_dev, dir)?;
      let slot = blk.find(comp.as_bytes()).ok_or(FsError::PathNotFound)?;
      let entry = blk.entry(slot);
      if !entry.is_dir() {
        return Err(FsError::PathNotFound);
      }
      dir = entry.first_blk();
    }
    Ok((dir, last))
  }

  /// Resolve `path` all the way to an existing entry.
  fn lookup(&self, path: &str) -> Result<(u16, usize, DirEntry)> {
    let (dir, name) = self.resolve(path)?;
    if name.is_empty() {
      return Err(FsError::NotFound);
    }
    let blk = DirBlock::load(&*self.block_dev, dir)?;
    let slot = blk.find(name.as_bytes()).ok_or(FsError::NotFound)?;
    Ok((dir, slot, *blk.entry(slot)))
  }

  /// Parent block of `dir`, read from its `..` slot. The root is its own
  /// parent.
  fn parent_of(&self, dir: u16) -> Result<u16> {
    if dir == ROOT_BLOCK {
      return Ok(ROOT_BLOCK);
    }
    let blk = DirBlock::load(&*self.block_dev, dir)?;
    Ok(blk.entry(1).first_blk())
  }

  /// Where a copy/move lands: `(directory block, entry name)`. A `dst` that
  /// resolves to an existing directory keeps the source's final name.
  fn dest_of(&self, dst: &str, src_name: &[u8]) -> Result<(u16, Vec<u8>)> {
    let (dir, name) = self.resolve(dst)?;
    if name.is_empty() {
      return Ok((dir, src_name.to_vec()));
    }
    let blk = DirBlock::load(&*self.block_dev, dir)?;
    match blk.find(name.as_bytes()) {
      Some(slot) if blk.entry(slot).is_dir() => {
        Ok((blk.entry(slot).first_blk(), src_name.to_vec()))
      }
      _ => Ok((dir, name.as_bytes().to_vec())),
    }
  }

  /// Allocate a chain sized for `data` (at least one block), write the
  /// payload into it zero-padding the tail, and return the first block.
  fn write_fresh_chain(&mut self, data: &[u8]) -> Result<u16> {
    let count = core::cmp::max(1, (data.len() + BLOCK_SZ - 1) / BLOCK_SZ);
    let blocks = self.fat.alloc_chain(count)?;
    for (i, &b) in blocks.iter().enumerate() {
      let mut buf: DataBlock = [0; BLOCK_SZ];
      let start = i * BLOCK_SZ;
      let end = min(data.len(), start + BLOCK_SZ);
      if start < end {
        buf[..end - start].copy_from_slice(&data[start..end]);
      }
      self.block_dev.write_block(b as usize, &buf)?;
    }
    Ok(blocks[0])
  }

  /// The first `size` bytes stored along the chain from `first`.
  fn read_chain(&self, first: u16, size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(size);
    let mut remaining = size;
    for b in self.fat.chain(first) {
      if remaining == 0 {
        break;
      }
      let mut buf: DataBlock = [0; BLOCK_SZ];
      self.block_dev.read_block(b as usize, &mut buf)?;
      let take = min(remaining, BLOCK_SZ);
      data.extend_from_slice(&buf[..take]);
      remaining -= take;
    }
    Ok(data)
  }

  fn relocate(
    &mut self,
    src_dir: u16,
    src_slot: usize,
    entry: DirEntry,
    dst_dir: u16,
  ) -> Result<()> {
    if dst_dir == src_dir {
      // already where it should be
      return Ok(());
    }
    let mut dst_blk = DirBlock::load(&*self.block_dev, dst_dir)?;
    dst_blk.insert(entry)?;
    let mut src_blk = DirBlock::load(&*self.block_dev, src_dir)?;
    src_blk.entry_mut(src_slot).clear();
    if entry.is_dir() {
      // the moved directory's `..` must name its new parent
      let mut child = DirBlock::load(&*self.block_dev, entry.first_blk())?;
      child.entry_mut(1).set_first_blk(dst_dir);
      child.store(&*self.block_dev, entry.first_blk())?;
    }
    dst_blk.store(&*self.block_dev, dst_dir)?;
    src_blk.store(&*self.block_dev, src_dir)?;
    Ok(())
  }

  fn rename_in_place(&mut self, dir: u16, slot: usize, new_name: &str) -> Result<()> {
    let mut blk = DirBlock::load(&*self.block_dev, dir)?;
    match blk.find(new_name.as_bytes()) {
      Some(s) if s == slot => return Ok(()),
      Some(_) => return Err(FsError::AlreadyExists),
      None => {}
    }
    blk.entry_mut(slot).rename(new_name.as_bytes())?;
    blk.store(&*self.block_dev, dir)
  }
}
