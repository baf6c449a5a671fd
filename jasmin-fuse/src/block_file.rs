use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Mutex, PoisonError};

use block_dev::{check_access, BlockDevice, Error};

/// 以宿主文件为后端的块设备。块数在打开时按文件长度确定。
#[derive(Debug)]
pub struct BlockFile {
    inner: Mutex<File>,
    block_size: usize,
    block_count: usize,
}

impl BlockFile {
    pub fn new(fd: File, block_size: usize) -> std::io::Result<Self> {
        let len = fd.metadata()?.len() as usize;
        Ok(Self {
            inner: Mutex::new(fd),
            block_size,
            block_count: len / block_size,
        })
    }
}

impl BlockDevice for BlockFile {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        check_access(self, block_id, buf.len())?;
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        check_access(self, block_id, buf.len())?;
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))?;
        file.write_all(buf)?;
        Ok(())
    }
}
