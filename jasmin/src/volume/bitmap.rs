//! 位图区域，记录每个扇区的分配情况
//!
//! 每磁道占3字节（大端24位）。位`0x10000 >> s`置1表示
//! 该磁道的第`s + 1`号扇区空闲；`0x800000`表示介质上没有这个磁道。

use std::collections::BTreeSet;

use block_dev::BlockDevice;

use crate::sector::Sector;
use crate::{
    BlockId, Error, Geometry, Result, BITMAP_BLOCK, DIRECTORY_BLOCK, MAX_TRACKS, TRACK_SECTORS,
};

/// 首个扇区对应的位
const FIRST_SECTOR_BIT: u32 = 0x10000;

/// 整条磁道空闲
const TRACK_FREE: u32 = 0x1FFFF;

/// 磁道不存在
pub const TRACK_ABSENT: u32 = 0x800000;

#[derive(Debug, Clone, Copy)]
pub struct Bitmap {
    geometry: Geometry,
}

impl Bitmap {
    pub const fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    /// 写入空卷的位图：除保留块外全部空闲
    pub fn init(&self, sector: &mut Sector) {
        for track in 0..MAX_TRACKS {
            let map = if track >= self.geometry.tracks() {
                TRACK_ABSENT
            } else {
                (0..TRACK_SECTORS)
                    .filter(|&s| BlockId::new(track * TRACK_SECTORS + s).is_reserved())
                    .fold(TRACK_FREE, |map, s| map & !(FIRST_SECTOR_BIT >> s))
            };
            sector.w24b(Self::offset(track), map);
        }
    }

    /// 检查位图是否与几何相符，返回不符之处
    pub fn verify(&self, sector: &Sector) -> core::result::Result<(), String> {
        for track in 0..MAX_TRACKS {
            let map = sector.r24b(Self::offset(track));
            if track >= self.geometry.tracks() {
                if map != TRACK_ABSENT {
                    return Err(format!("track {track} should be absent, map={map:#08x}"));
                }
            } else if map & !TRACK_FREE != 0 {
                return Err(format!("track {track} has stray bits, map={map:#08x}"));
            }
        }
        for block in [BITMAP_BLOCK, DIRECTORY_BLOCK] {
            if self.is_free_in(sector, block) {
                return Err(format!("system block {block} marked free"));
            }
        }
        Ok(())
    }

    /// 分配`count`个空闲块，编号小者优先。
    /// 空闲块不足时报错，且不改动位图。
    pub fn alloc(&self, dev: &dyn BlockDevice, count: usize) -> Result<Vec<BlockId>> {
        let mut sector = Sector::load(dev, BITMAP_BLOCK)?;

        let free = self.count_free(&sector);
        if free < count {
            return Err(Error::OutOfSpace {
                needed: count,
                free,
            });
        }

        let mut blocks = Vec::with_capacity(count);
        for track in 0..self.geometry.tracks() {
            if blocks.len() == count {
                break;
            }

            let mut map = sector.r24b(Self::offset(track));
            for s in 0..TRACK_SECTORS {
                if blocks.len() == count {
                    break;
                }
                let block = BlockId::new(track * TRACK_SECTORS + s);
                let bit = FIRST_SECTOR_BIT >> s;
                if map & bit != 0 && !block.is_reserved() {
                    map &= !bit;
                    blocks.push(block);
                }
            }
            sector.w24b(Self::offset(track), map);
        }
        sector.sync(dev)?;

        log::debug!("allocated {blocks:?}");
        Ok(blocks)
    }

    /// 释放`blocks`。任一块越界、属于系统、已经空闲或重复出现，
    /// 都报[`Error::InvalidBlock`]，且不改动位图。
    pub fn dealloc(&self, dev: &dyn BlockDevice, blocks: &[BlockId]) -> Result<()> {
        let mut sector = Sector::load(dev, BITMAP_BLOCK)?;

        let mut seen = BTreeSet::new();
        for &block in blocks {
            if !self.geometry.is_data_block(block)
                || self.is_free_in(&sector, block)
                || !seen.insert(block)
            {
                return Err(Error::InvalidBlock(block));
            }
        }

        for &block in blocks {
            let (track, bit) = Self::locate(block);
            let offset = Self::offset(track);
            let map = sector.r24b(offset);
            sector.w24b(offset, map | bit);
        }
        sector.sync(dev)?;

        log::debug!("freed {blocks:?}");
        Ok(())
    }

    pub fn free_count(&self, dev: &dyn BlockDevice) -> Result<usize> {
        Ok(self.count_free(&Sector::load(dev, BITMAP_BLOCK)?))
    }

    /// 卷内所有空闲的数据块
    pub fn free_set(&self, dev: &dyn BlockDevice) -> Result<BTreeSet<BlockId>> {
        let sector = Sector::load(dev, BITMAP_BLOCK)?;
        Ok(self.data_blocks()
            .filter(|&block| self.is_free_in(&sector, block))
            .collect())
    }

    /// 卷内所有可分配的块
    pub fn data_blocks(&self) -> impl Iterator<Item = BlockId> {
        (0..self.geometry.block_count() as u32)
            .map(BlockId::new)
            .filter(|block| !block.is_reserved())
    }
}

impl Bitmap {
    fn count_free(&self, sector: &Sector) -> usize {
        self.data_blocks()
            .filter(|&block| self.is_free_in(sector, block))
            .count()
    }

    fn is_free_in(&self, sector: &Sector, block: BlockId) -> bool {
        let (track, bit) = Self::locate(block);
        let map = sector.r24b(Self::offset(track));
        map & TRACK_ABSENT == 0 && map & bit != 0
    }

    /// 块所在磁道及其对应的位
    fn locate(block: BlockId) -> (u32, u32) {
        let raw = u32::from(block);
        (raw / TRACK_SECTORS, FIRST_SECTOR_BIT >> (raw % TRACK_SECTORS))
    }

    const fn offset(track: u32) -> usize {
        track as usize * 3
    }
}
