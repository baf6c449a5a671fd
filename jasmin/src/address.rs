//! 磁道/扇区引用与线性块号之间的转换
//!
//! 盘上的地址是16位的引用：高字节为磁道号，低字节为扇区号（1起）。
//! 第二面的磁道紧接在第一面之后编号，所以线性块号即
//! `track * 17 + sector - 1`。

use derive_more::{Display, From, Into};

/// 扇区（块）的字节量
pub const SECTOR_SIZE: usize = 256;

/// 每磁道的扇区数
pub const TRACK_SECTORS: u32 = 17;

/// 每面的磁道数
pub const SIDE_TRACKS: u32 = 41;

/// 位图所能描述的磁道数（双面）
pub const MAX_TRACKS: u32 = 2 * SIDE_TRACKS;

/// 20号磁道1号扇区：位图与卷信息
pub const BITMAP_BLOCK: BlockId = BlockId::new(20 * TRACK_SECTORS);

/// 20号磁道2号扇区：根目录
pub const DIRECTORY_BLOCK: BlockId = BlockId::new(20 * TRACK_SECTORS + 1);

pub const RESERVED_BLOCKS: [BlockId; 2] = [BITMAP_BLOCK, DIRECTORY_BLOCK];

/// 盘上的磁道/扇区引用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into)]
#[repr(transparent)]
pub struct SectorRef(u16);

/// 线性块号，即块设备上的索引
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl SectorRef {
    /// 空引用，盘上用来表示“没有下一块”
    pub const NONE: Self = Self(0);

    pub const fn new(track: u8, sector: u8) -> Self {
        Self((track as u16) << 8 | sector as u16)
    }

    pub const fn track(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn sector(self) -> u8 {
        self.0 as u8
    }

    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    /// 解码为块号。对任何引用都有结果，但结果未必落在卷内，
    /// 使用前须经[`Geometry::is_valid`]检查。
    pub const fn to_block(self) -> BlockId {
        BlockId((self.track() as u32 * TRACK_SECTORS + self.sector() as u32).wrapping_sub(1))
    }
}

impl BlockId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// 编码为磁道/扇区引用，是[`SectorRef::to_block`]的逆
    pub const fn to_native(self) -> SectorRef {
        let track = (self.0 / TRACK_SECTORS) as u8;
        let sector = (self.0 % TRACK_SECTORS) as u8 + 1;
        SectorRef::new(track, sector)
    }

    pub const fn is_reserved(self) -> bool {
        self.0 == BITMAP_BLOCK.0 || self.0 == DIRECTORY_BLOCK.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 卷的几何：单面或双面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    sides: u8,
}

impl Geometry {
    pub const SINGLE_SIDED: Self = Self { sides: 1 };
    pub const DOUBLE_SIDED: Self = Self { sides: 2 };

    pub fn from_sides(sides: u8) -> Option<Self> {
        match sides {
            1 => Some(Self::SINGLE_SIDED),
            2 => Some(Self::DOUBLE_SIDED),
            _ => None,
        }
    }

    pub fn from_block_count(count: usize) -> Option<Self> {
        [Self::SINGLE_SIDED, Self::DOUBLE_SIDED]
            .into_iter()
            .find(|geometry| geometry.block_count() == count)
    }

    pub const fn sides(self) -> u8 {
        self.sides
    }

    /// 卷上实际存在的磁道数
    pub const fn tracks(self) -> u32 {
        self.sides as u32 * SIDE_TRACKS
    }

    pub const fn block_count(self) -> usize {
        (self.tracks() * TRACK_SECTORS) as usize
    }

    /// 系统保留的块数
    pub const fn reserved_blocks(self) -> usize {
        RESERVED_BLOCKS.len()
    }

    /// 引用能否用于文件I/O：扇区号合法、落在卷内且不是保留块
    pub fn is_valid(self, r: SectorRef) -> bool {
        if !(1..=TRACK_SECTORS).contains(&(r.sector() as u32)) {
            return false;
        }
        let block = r.to_block();
        block.index() < self.block_count() && !block.is_reserved()
    }

    /// 块号是否可以被分配给文件
    pub fn is_data_block(self, block: BlockId) -> bool {
        block.index() < self.block_count() && !block.is_reserved()
    }
}
