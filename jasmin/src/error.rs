//! 文件系统的错误类型

use crate::BlockId;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No such file")]
    NotFound,

    #[error("Entry is of another kind")]
    WrongKind,

    #[error("Directory full")]
    DirectoryFull,

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Out of space: {needed} blocks needed, {free} free")]
    OutOfSpace { needed: usize, free: usize },

    #[error("Invalid block: {0}")]
    InvalidBlock(BlockId),

    #[error("Corrupt block chain: {0}")]
    CorruptChain(String),

    #[error("Address range {load:#06x}+{len} exceeds the 64 KiB address space")]
    InvalidAddress { load: u16, len: usize },

    #[error("Block {block_id} out of range ({block_count} blocks)")]
    OutOfRange { block_id: usize, block_count: usize },

    #[error("Read-only")]
    ReadOnly,

    #[error("Not a Jasmin volume: {0}")]
    NotJasmin(String),

    #[error("Device error: {0}")]
    Device(block_dev::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] binrw::Error),
}

impl From<block_dev::Error> for Error {
    fn from(err: block_dev::Error) -> Self {
        match err {
            block_dev::Error::OutOfRange {
                block_id,
                block_count,
            } => Self::OutOfRange {
                block_id,
                block_count,
            },
            err => Self::Device(err),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
