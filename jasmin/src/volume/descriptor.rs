//! 文件描述块
//!
//! 目录项的起始引用指向文件的首个描述块。描述块记录文件种类、
//! 地址与长度，并按顺序列出数据块的引用；引用放不下时，
//! 通过`next`串起后续的描述块。

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};

use crate::{FileKind, Result, SectorRef, SECTOR_SIZE};

/// 一个描述块可容纳的数据块引用数
pub const DESCRIPTOR_REFS: usize = 122;

const HEAD_MARKER: u8 = 0xFF;
const CONTINUATION_MARKER: u8 = 0x00;

const KIND_DATA: u8 = 0x00;
const KIND_SYSTEM: u8 = 0x40;

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// 下一个描述块，0表示没有
    #[brw(big)]
    next: u16,

    /// 首个描述块为0xFF，后续为0x00
    marker: u8,

    /// 仅首个描述块有效
    kind: u8,

    load: u16,

    run: u16,

    /// 文件的字节数
    length: u32,

    /// 数据块引用，0表示未使用
    #[brw(big)]
    refs: [u16; DESCRIPTOR_REFS],
}

impl Descriptor {
    pub fn head(kind: &FileKind, length: usize) -> Self {
        let (kind, load, run) = match *kind {
            FileKind::Data => (KIND_DATA, 0, 0),
            FileKind::System { load, run } => (KIND_SYSTEM, load, run),
        };
        Self {
            next: SectorRef::NONE.into(),
            marker: HEAD_MARKER,
            kind,
            load,
            run,
            length: length as u32,
            refs: [0; DESCRIPTOR_REFS],
        }
    }

    pub fn continuation() -> Self {
        Self {
            marker: CONTINUATION_MARKER,
            ..Self::head(&FileKind::Data, 0)
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    /// `out`须为一整个扇区
    pub fn encode(&self, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(SECTOR_SIZE, out.len());
        self.write(&mut Cursor::new(out))?;
        Ok(())
    }

    pub fn is_head(&self) -> bool {
        self.marker == HEAD_MARKER
    }

    pub fn is_continuation(&self) -> bool {
        self.marker == CONTINUATION_MARKER
    }

    pub fn kind(&self) -> FileKind {
        if self.kind & KIND_SYSTEM != 0 {
            FileKind::System {
                load: self.load,
                run: self.run,
            }
        } else {
            FileKind::Data
        }
    }

    /// 改写系统文件的地址，种类不变
    pub fn set_addresses(&mut self, load: u16, run: u16) {
        self.load = load;
        self.run = run;
    }

    pub fn length(&self) -> usize {
        self.length as usize
    }

    pub fn next(&self) -> Option<SectorRef> {
        let next = SectorRef::from(self.next);
        (!next.is_none()).then_some(next)
    }

    pub fn set_next(&mut self, next: Option<SectorRef>) {
        self.next = next.unwrap_or(SectorRef::NONE).into();
    }

    /// 已使用的数据块引用
    pub fn refs(&self) -> impl Iterator<Item = SectorRef> + '_ {
        self.refs
            .iter()
            .map(|&r| SectorRef::from(r))
            .filter(|r| !r.is_none())
    }

    /// 至多[`DESCRIPTOR_REFS`]个
    pub fn set_refs(&mut self, refs: impl IntoIterator<Item = SectorRef>) {
        self.refs = [0; DESCRIPTOR_REFS];
        for (slot, r) in self.refs.iter_mut().zip(refs) {
            *slot = r.into();
        }
    }
}
