//! Jasmin软盘文件系统
//!
//! 在256字节扇区的块设备上读写Jasmin卷：格式化、挂载、
//! 列目录，以及文件的创建、读取、替换与删除。

mod address;
mod check;
mod control;
mod dir;
mod error;
mod file;
mod meta;
mod sector;
pub mod volume;

pub use self::{
    address::{
        BlockId, Geometry, SectorRef, BITMAP_BLOCK, DIRECTORY_BLOCK, MAX_TRACKS, RESERVED_BLOCKS,
        SECTOR_SIZE, SIDE_TRACKS, TRACK_SECTORS,
    },
    check::CheckReport,
    control::{prepare_label, JasminFileSystem},
    dir::{RootDir, ROOT_KEY},
    error::{Error, Result},
    file::{blocks_needed, check_address, File},
    meta::{FileKind, FileMeta, FileType, Listing, VolumeMeta},
    volume::dir_entry::{file_name_prepare, read_file_name, validate_filename, DirEntry},
};
