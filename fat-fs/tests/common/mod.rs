use std::sync::{Arc, Mutex};

use fat_fs::{BlockDevice, FsError, BLOCK_COUNT, BLOCK_SZ};

/// Memory-backed block device for tests.
pub struct RamDisk {
  blocks: Mutex<Vec<u8>>,
}

impl RamDisk {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      blocks: Mutex::new(vec![0u8; BLOCK_COUNT * BLOCK_SZ]),
    })
  }
}

impl BlockDevice for RamDisk {
  fn read_block(&self, block_id: usize, buf: &mut [u8]) -> fat_fs::Result<()> {
    if block_id >= BLOCK_COUNT {
      return Err(FsError::IoError);
    }
    let data = self.blocks.lock().map_err(|_| FsError::IoError)?;
    let start = block_id * BLOCK_SZ;
    buf.copy_from_slice(&data[start..start + BLOCK_SZ]);
    Ok(())
  }

  fn write_block(&self, block_id: usize, buf: &[u8]) -> fat_fs::Result<()> {
    if block_id >= BLOCK_COUNT {
      return Err(FsError::IoError);
    }
    let mut data = self.blocks.lock().map_err(|_| FsError::IoError)?;
    let start = block_id * BLOCK_SZ;
    data[start..start + BLOCK_SZ].copy_from_slice(buf);
    Ok(())
  }
}
