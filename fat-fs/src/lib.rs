#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod block_dev;
mod error;
mod fat;
mod layout;
mod dir;
mod path;
mod fs;

pub use block_dev::BlockDevice;
pub use error::{FsError, Result};
pub use fat::{Fat, FAT_EOF, FAT_FREE};
pub use layout::{AccessMode, DirEntry, EntryKind, DIRENT_SZ, MAX_NAME_LEN};
pub use dir::{DirBlock, DIR_ENTRIES};
pub use fs::FatFileSystem;

pub const BLOCK_SZ: usize = 4096;
/// The FAT is one block of i16 entries, which also bounds the volume size.
pub const BLOCK_COUNT: usize = BLOCK_SZ / 2;
/// block holding the root directory
pub const ROOT_BLOCK: u16 = 0;
/// block holding the serialized FAT
pub const FAT_BLOCK: u16 = 1;

type DataBlock = [u8; BLOCK_SZ];
