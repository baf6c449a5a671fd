use std::sync::{Mutex, PoisonError};

use crate::{check_access, BlockDevice, Error};

/// 内存中的磁盘映像
#[derive(Debug)]
pub struct MemoryDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl MemoryDisk {
    /// 全零的映像
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * block_count]),
        }
    }

    /// 由已有的映像构造，末尾不足一块的字节被丢弃
    pub fn from_image(block_size: usize, mut image: Vec<u8>) -> Self {
        image.truncate(image.len() / block_size * block_size);
        Self {
            block_size,
            data: Mutex::new(image),
        }
    }

    /// 整个映像的拷贝
    pub fn image(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BlockDevice for MemoryDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len() / self.block_size
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        check_access(self, block_id, buf.len())?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let start = block_id * self.block_size;
        buf.copy_from_slice(&data[start..start + self.block_size]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        check_access(self, block_id, buf.len())?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let start = block_id * self.block_size;
        data[start..start + self.block_size].copy_from_slice(buf);
        Ok(())
    }
}
