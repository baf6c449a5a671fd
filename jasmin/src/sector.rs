//! 扇区的抽象
//!
//! 内存中的一块扇区数据，附带格式里常用的多字节读写。
//! 修改后须显式[`Sector::sync`]写回设备。

use block_dev::BlockDevice;

use crate::{BlockId, Result, SECTOR_SIZE};

/// 内存中的扇区
#[derive(Debug)]
pub struct Sector {
    /// 缓存的数据
    data: Box<[u8]>,
    /// 对应的块ID
    id: BlockId,
    /// 是否为脏块
    modified: bool,
}

impl Sector {
    pub fn load(dev: &dyn BlockDevice, id: BlockId) -> Result<Self> {
        let mut data = vec![0; SECTOR_SIZE];
        dev.read_block(id.index(), &mut data)?;
        log::trace!("read block {id}");

        Ok(Self {
            data: data.into(),
            id,
            modified: false,
        })
    }

    /// 不读设备，直接以`byte`填满的新扇区，视为脏块
    pub fn filled(id: BlockId, byte: u8) -> Self {
        Self {
            data: vec![byte; SECTOR_SIZE].into(),
            id,
            modified: true,
        }
    }

    pub fn sync(&mut self, dev: &dyn BlockDevice) -> Result<()> {
        if self.modified {
            dev.write_block(self.id.index(), &self.data)?;
            log::trace!("wrote block {}", self.id);
            self.modified = false;
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.modified = true;
        &mut self.data
    }

    #[inline]
    pub fn map<V>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> V) -> V {
        f(&self.data[offset..offset + len])
    }

    #[inline]
    pub fn map_mut<V>(&mut self, offset: usize, len: usize, f: impl FnOnce(&mut [u8]) -> V) -> V {
        self.modified = true;
        f(&mut self.data[offset..offset + len])
    }

    pub fn r8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn w8(&mut self, offset: usize, value: u8) {
        self.modified = true;
        self.data[offset] = value;
    }

    pub fn r16b(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    pub fn w16b(&mut self, offset: usize, value: u16) {
        self.map_mut(offset, 2, |bytes| bytes.copy_from_slice(&value.to_be_bytes()));
    }

    pub fn r24b(&self, offset: usize) -> u32 {
        self.map(offset, 3, |bytes| {
            (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
        })
    }

    pub fn w24b(&mut self, offset: usize, value: u32) {
        self.map_mut(offset, 3, |bytes| {
            bytes.copy_from_slice(&value.to_be_bytes()[1..]);
        });
    }

    /// 读出定长字符串，去掉尾部空格
    pub fn rstr(&self, offset: usize, len: usize) -> String {
        self.map(offset, len, |bytes| {
            String::from_utf8_lossy(bytes).trim_end_matches(' ').to_owned()
        })
    }

    /// 写入定长字符串，不足处以空格补齐，超出部分截断
    pub fn wstr(&mut self, offset: usize, len: usize, s: &str) {
        self.map_mut(offset, len, |bytes| {
            bytes.fill(b' ');
            for (b, sb) in bytes.iter_mut().zip(s.bytes()) {
                *b = sb;
            }
        });
    }
}
