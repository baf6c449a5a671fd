//! 目录项与文件名
//!
//! 目录块开头是4字节的头（下一目录块的引用 + 2字节保留），
//! 随后是14个18字节的目录项：
//!
//! | 偏移 | 长度 | 内容                                   |
//! |------|------|----------------------------------------|
//! | 0x00 | 2    | 首个描述块的引用（大端），首字节0xFF为空槽 |
//! | 0x02 | 1    | `'L'`锁定 / `'U'`未锁定                 |
//! | 0x03 | 12   | 8字节主名 + 4字节`.EXT`，空格补齐         |
//! | 0x0F | 1    | `'S'`系统文件 / `'D'`数据文件            |
//! | 0x10 | 2    | 占用块数（小端）                         |

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};

use crate::{Error, FileType, Result, SectorRef};

pub const DIR_ENTRY_SIZE: usize = 18;

/// 目录块头的字节数
pub const DIR_HEADER_SIZE: usize = 4;

/// 目录的槽位数
pub const DIR_SLOTS: usize = 14;

pub const NAME_LEN: usize = 12;
const BASE_LEN: usize = 8;
const EXT_LEN: usize = 3;

const FREE_MARK: u8 = 0xFF;
const LOCKED: u8 = b'L';
const UNLOCKED: u8 = b'U';
const SYSTEM: u8 = b'S';
const DATA: u8 = b'D';

/// 主名与扩展名中允许的非字母数字字符
const NAME_SYMBOLS: &str = "-_$#!";

pub static FREE: DirEntry = DirEntry {
    start: (FREE_MARK as u16) << 8,
    lock: 0,
    name: [0; NAME_LEN],
    kind: 0,
    blocks: 0,
};

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// 首个描述块
    #[brw(big)]
    start: u16,

    lock: u8,

    /// 主名8字节 + 扩展名4字节（含`.`）
    name: [u8; NAME_LEN],

    kind: u8,

    /// 文件链的块数，含描述块
    blocks: u16,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DirEntryStatus {
    /// start[0] == 0xFF
    Free,
    /// 已被使用
    Occupied,
}

impl DirEntry {
    /// 未锁定的新目录项
    pub fn new(name: [u8; NAME_LEN], ty: FileType, start: SectorRef, blocks: usize) -> Self {
        Self {
            start: start.into(),
            lock: UNLOCKED,
            name,
            kind: match ty {
                FileType::Data => DATA,
                FileType::System => SYSTEM,
            },
            blocks: blocks as u16,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<()> {
        self.write(&mut Cursor::new(out))?;
        Ok(())
    }

    pub fn status(&self) -> DirEntryStatus {
        match self.start.to_be_bytes()[0] {
            FREE_MARK => DirEntryStatus::Free,
            _ => DirEntryStatus::Occupied,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.status() == DirEntryStatus::Occupied
    }

    pub fn start(&self) -> SectorRef {
        self.start.into()
    }

    pub fn set_start(&mut self, start: SectorRef) {
        self.start = start.into();
    }

    pub const fn blocks(&self) -> usize {
        self.blocks as usize
    }

    pub fn set_blocks(&mut self, blocks: usize) {
        self.blocks = blocks as u16;
    }

    pub fn is_locked(&self) -> bool {
        self.lock == LOCKED
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.lock = if locked { LOCKED } else { UNLOCKED };
    }

    /// 非`'S'`一律视为数据文件
    pub fn file_type(&self) -> FileType {
        match self.kind {
            SYSTEM => FileType::System,
            _ => FileType::Data,
        }
    }

    pub fn raw_name(&self) -> &[u8; NAME_LEN] {
        &self.name
    }

    pub fn name(&self) -> String {
        read_file_name(&self.name)
    }

    pub fn rename(&mut self, name: [u8; NAME_LEN]) {
        self.name = name;
    }

    /// 名称是否相同，不区分大小写
    pub fn same_name(&self, name: &[u8; NAME_LEN]) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// 目录项在目录块内的偏移
pub const fn slot_offset(key: usize) -> usize {
    DIR_HEADER_SIZE + key * DIR_ENTRY_SIZE
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || NAME_SYMBOLS.contains(c)
}

/// 名称是否可以存入目录项：主名1~8个字符，可选`.`加至多3个字符的扩展名
pub fn validate_filename(name: &str) -> bool {
    let (base, ext) = name.split_once('.').unwrap_or((name, ""));
    (1..=BASE_LEN).contains(&base.len())
        && ext.len() <= EXT_LEN
        && base.chars().chain(ext.chars()).all(is_name_char)
}

/// 规范化为目录项中的12字节名称：转为大写，主名与扩展名各自以空格补齐
pub fn file_name_prepare(name: &str) -> Result<[u8; NAME_LEN]> {
    if !validate_filename(name) {
        return Err(Error::InvalidName(name.to_owned()));
    }

    let upper = name.to_ascii_uppercase();
    let (base, ext) = upper.split_once('.').unwrap_or((upper.as_str(), ""));

    let mut raw = [b' '; NAME_LEN];
    raw[..base.len()].copy_from_slice(base.as_bytes());
    if !ext.is_empty() {
        raw[BASE_LEN] = b'.';
        raw[BASE_LEN + 1..BASE_LEN + 1 + ext.len()].copy_from_slice(ext.as_bytes());
    }
    Ok(raw)
}

/// [`file_name_prepare`]的逆：去掉主名与扩展名的补齐
pub fn read_file_name(raw: &[u8; NAME_LEN]) -> String {
    let (base, ext) = raw.split_at(BASE_LEN);
    let trim = |part: &[u8]| {
        String::from_utf8_lossy(part)
            .trim_end_matches(' ')
            .to_owned()
    };
    trim(base) + &trim(ext)
}
