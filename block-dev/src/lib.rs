//! 块设备的抽象
//!
//! 文件系统只通过[`BlockDevice`]按块读写磁盘映像，
//! 块大小与块数在挂载时确定，此后不再改变。

mod memory;

use core::fmt::Debug;
use std::io;

pub use self::memory::MemoryDisk;

pub trait BlockDevice: Debug + Send + Sync {
    /// 每块的字节数
    fn block_size(&self) -> usize;

    /// 设备的总块数
    fn block_count(&self) -> usize;

    /// `buf`的长度必须等于[`BlockDevice::block_size`]
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error>;

    /// `buf`的长度必须等于[`BlockDevice::block_size`]
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error>;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("block {block_id} out of range (device has {block_count} blocks)")]
    OutOfRange { block_id: usize, block_count: usize },

    #[error("buffer of {len} bytes does not match block size {block_size}")]
    BadBuffer { len: usize, block_size: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// 检查块号与缓冲区，供各实现共用
pub fn check_access(dev: &dyn BlockDevice, block_id: usize, len: usize) -> Result<(), Error> {
    if block_id >= dev.block_count() {
        return Err(Error::OutOfRange {
            block_id,
            block_count: dev.block_count(),
        });
    }
    if len != dev.block_size() {
        return Err(Error::BadBuffer {
            len,
            block_size: dev.block_size(),
        });
    }
    Ok(())
}
