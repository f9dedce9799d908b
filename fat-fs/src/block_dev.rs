use core::any::Any;

use crate::error::Result;

/// API provided for the filesystem core.
/// Implementations transfer exactly one block per call and hold no cache.
pub trait BlockDevice: Send + Sync + Any {
  /// read block `block_id` into `buf`
  fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()>;

  /// write `buf` back to block `block_id`
  fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()>;
}
