//! 文件句柄
//!
//! 句柄只记住槽位号与目录项的副本，每次操作前都与盘上的槽位比对，
//! 槽位已被删除或改写时报[`Error::NotFound`]。

use std::collections::BTreeSet;

use crate::sector::Sector;
use crate::volume::descriptor::{Descriptor, DESCRIPTOR_REFS};
use crate::volume::dir_entry::{file_name_prepare, DirEntry};
use crate::{
    BlockId, Error, FileKind, FileMeta, FileType, JasminFileSystem, Result, SectorRef,
    SECTOR_SIZE,
};

/// 系统文件可装载的地址空间
const ADDRESS_SPACE: usize = 0x10000;

/// 系统文件装载后不能越过64 KiB
pub fn check_address(load: u16, len: usize) -> Result<()> {
    if load as usize + len > ADDRESS_SPACE {
        return Err(Error::InvalidAddress { load, len });
    }
    Ok(())
}

/// 存放`len`字节的文件链所需的块数，含描述块
pub const fn blocks_needed(len: usize) -> usize {
    let data_blocks = len.div_ceil(SECTOR_SIZE);
    data_blocks + descriptors_needed(data_blocks)
}

const fn descriptors_needed(data_blocks: usize) -> usize {
    match data_blocks.div_ceil(DESCRIPTOR_REFS) {
        0 => 1,
        n => n,
    }
}

#[derive(Debug, Clone)]
pub struct File<'a> {
    fs: &'a JasminFileSystem,
    key: u16,
    entry: DirEntry,
}

/// 沿文件链走过的全部块
#[derive(Debug)]
struct Chain {
    head: Descriptor,
    descriptors: Vec<BlockId>,
    data: Vec<BlockId>,
}

impl Chain {
    fn blocks(&self) -> Vec<BlockId> {
        self.descriptors
            .iter()
            .chain(&self.data)
            .copied()
            .collect()
    }
}

impl<'a> File<'a> {
    pub(crate) fn new(fs: &'a JasminFileSystem, key: u16, entry: DirEntry) -> Self {
        Self { fs, key, entry }
    }

    /// 所在的目录槽位
    pub fn key(&self) -> u16 {
        self.key
    }

    /// 缓存的目录项
    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }

    pub fn file_type(&self) -> FileType {
        self.entry.file_type()
    }

    pub fn metadata(&self) -> Result<FileMeta> {
        self.revalidate()?;
        let head = self.head()?;
        Ok(FileMeta {
            name: self.entry.name(),
            kind: head.kind(),
            size: head.length(),
            blocks: self.entry.blocks(),
            locked: self.entry.is_locked(),
        })
    }

    /// 改名、锁定，以及改写系统文件的地址。不触及文件内容。
    pub fn metadata_change(&mut self, meta: &FileMeta) -> Result<()> {
        self.revalidate()?;
        if meta.kind.file_type() != self.entry.file_type() {
            return Err(Error::WrongKind);
        }

        let mut entry = self.entry;
        let name = file_name_prepare(&meta.name)?;
        if !entry.same_name(&name) && self.fs.root().name_taken(&name, self.key)? {
            return Err(Error::ReadOnly);
        }
        entry.rename(name);
        entry.set_locked(meta.locked);

        if let FileKind::System { load, run } = meta.kind {
            let mut sector = self.fs.read_sector(self.head_block()?)?;
            let mut head = Descriptor::decode(sector.as_slice())?;
            if head.kind() != meta.kind {
                check_address(load, head.length())?;
                head.set_addresses(load, run);
                head.encode(sector.as_mut_slice())?;
                sector.sync(self.fs.device())?;
            }
        }

        self.fs.root().write_entry(self.key, &entry)?;
        self.entry = entry;
        Ok(())
    }

    /// 读出整个文件
    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.revalidate()?;
        let chain = self.walk()?;
        let length = chain.head.length();

        let mut data = Vec::with_capacity(length);
        for &block in &chain.data[..length.div_ceil(SECTOR_SIZE)] {
            let sector = self.fs.read_sector(block)?;
            let take = (length - data.len()).min(SECTOR_SIZE);
            data.extend_from_slice(&sector.as_slice()[..take]);
        }

        Ok(data)
    }

    /// 以`data`替换文件内容，种类与地址不变。
    pub fn replace(&mut self, data: &[u8]) -> Result<()> {
        self.revalidate()?;
        let kind = self.head()?.kind();
        self.replace_as(kind, data)
    }

    /// 以`data`替换文件内容，同时改写系统文件的地址。
    /// `kind`须与文件原有的种类相同，否则报[`Error::WrongKind`]。
    ///
    /// 锁定、地址越界与空间不足都在改动任何块之前报错，此时旧链与目录项保持原样。
    /// 此后旧链先被释放，新链通常落在同样的块上；若设备中途出错，
    /// 目录项可能指向已释放且被部分改写的块，卷上没有恢复手段。
    pub fn replace_as(&mut self, kind: FileKind, data: &[u8]) -> Result<()> {
        self.revalidate()?;
        if self.entry.is_locked() {
            return Err(Error::ReadOnly);
        }
        if kind.file_type() != self.entry.file_type() {
            return Err(Error::WrongKind);
        }
        if let FileKind::System { load, .. } = kind {
            check_address(load, data.len())?;
        }

        let old = self.walk()?;
        let data_blocks = data.len().div_ceil(SECTOR_SIZE);
        let descriptor_blocks = descriptors_needed(data_blocks);
        let needed = blocks_needed(data.len());

        let old_blocks = old.blocks();
        let free = self.fs.free_block_count()? + old_blocks.len();
        if free < needed {
            return Err(Error::OutOfSpace { needed, free });
        }

        self.fs.free_blocks(&old_blocks)?;
        let blocks = self.fs.allocate_blocks(needed)?;
        let (descriptors, data_refs) = blocks.split_at(descriptor_blocks);

        for (&block, chunk) in data_refs.iter().zip(data.chunks(SECTOR_SIZE)) {
            let mut sector = Sector::filled(block, 0);
            sector.as_mut_slice()[..chunk.len()].copy_from_slice(chunk);
            sector.sync(self.fs.device())?;
        }

        let mut groups = data_refs.chunks(DESCRIPTOR_REFS);
        for (i, &block) in descriptors.iter().enumerate() {
            let mut desc = if i == 0 {
                Descriptor::head(&kind, data.len())
            } else {
                Descriptor::continuation()
            };
            desc.set_refs(groups.next().unwrap_or_default().iter().map(|b| b.to_native()));
            desc.set_next(descriptors.get(i + 1).map(|b| b.to_native()));

            let mut sector = Sector::filled(block, 0);
            desc.encode(sector.as_mut_slice())?;
            sector.sync(self.fs.device())?;
        }

        let mut entry = self.entry;
        entry.set_start(descriptors[0].to_native());
        entry.set_blocks(needed);
        self.fs.root().write_entry(self.key, &entry)?;
        self.entry = entry;

        log::debug!(
            "replaced {:?}: {} bytes in {needed} blocks",
            self.entry.name(),
            data.len()
        );
        Ok(())
    }

    /// 文件链上的全部块：描述块在前，数据块在后
    pub fn chain(&self) -> Result<Vec<BlockId>> {
        self.revalidate()?;
        Ok(self.walk()?.blocks())
    }
}

impl File<'_> {
    /// 缓存的目录项须与盘上一致
    fn revalidate(&self) -> Result<()> {
        let current = self.fs.root().entry(self.key)?;
        if !current.is_occupied() || current != self.entry {
            log::debug!("stale handle for slot {}", self.key);
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn head_block(&self) -> Result<BlockId> {
        let start = self.entry.start();
        if !self.fs.geometry().is_valid(start) {
            return Err(self.corrupt(format!("invalid start reference {:#06x}", u16::from(start))));
        }
        Ok(start.to_block())
    }

    fn head(&self) -> Result<Descriptor> {
        let head = Descriptor::decode(self.fs.read_sector(self.head_block()?)?.as_slice())?;
        if !head.is_head() {
            return Err(self.corrupt("start block is not a file descriptor".into()));
        }
        Ok(head)
    }

    /// 沿描述块走完整条链。引用非法、块被重复访问、
    /// 或链短于记录的长度，都报[`Error::CorruptChain`]。
    fn walk(&self) -> Result<Chain> {
        let geometry = self.fs.geometry();
        let mut visited = BTreeSet::new();
        let mut visit = |r: SectorRef| -> Result<BlockId> {
            if !geometry.is_valid(r) {
                return Err(self.corrupt(format!("invalid reference {:#06x}", u16::from(r))));
            }
            let block = r.to_block();
            if !visited.insert(block) {
                return Err(self.corrupt(format!("block {block} visited twice")));
            }
            Ok(block)
        };

        let head_block = visit(self.entry.start())?;
        let head = self.head()?;
        let mut descriptors = vec![head_block];
        let mut data = Vec::new();

        let mut desc = head.clone();
        loop {
            for r in desc.refs() {
                data.push(visit(r)?);
            }
            let Some(next) = desc.next() else {
                break;
            };
            let block = visit(next)?;
            desc = Descriptor::decode(self.fs.read_sector(block)?.as_slice())?;
            if !desc.is_continuation() {
                return Err(self.corrupt(format!("block {block} is not a continuation")));
            }
            descriptors.push(block);
        }

        if data.len() < head.length().div_ceil(SECTOR_SIZE) {
            return Err(self.corrupt(format!(
                "{} data blocks for {} bytes",
                data.len(),
                head.length()
            )));
        }

        Ok(Chain {
            head,
            descriptors,
            data,
        })
    }

    fn corrupt(&self, reason: String) -> Error {
        log::warn!("{:?}: {reason}", self.entry.name());
        Error::CorruptChain(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::MemoryDisk;

    use super::*;
    use crate::VolumeMeta;

    fn blank() -> JasminFileSystem {
        let dev = Arc::new(MemoryDisk::new(SECTOR_SIZE, 697));
        JasminFileSystem::format(dev, &VolumeMeta::default()).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
    }

    #[test]
    fn empty_file_owns_its_descriptor() {
        let fs = blank();
        let file = fs.root().file_create(&FileMeta::data("EMPTY")).unwrap();

        assert_eq!(Vec::<u8>::new(), file.read_all().unwrap());
        assert_eq!(1, file.chain().unwrap().len());
        let meta = file.metadata().unwrap();
        assert_eq!(0, meta.size);
        assert_eq!(1, meta.blocks);
    }

    #[test]
    fn chained_descriptors() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("BIG")).unwrap();

        // 130个数据块需要两个描述块
        let data = pattern(130 * SECTOR_SIZE - 10);
        file.replace(&data).unwrap();
        assert_eq!(132, file.entry().blocks());
        assert_eq!(132, file.chain().unwrap().len());
        assert_eq!(data, file.read_all().unwrap());
    }

    #[test]
    fn shrinking_returns_blocks() {
        let fs = blank();
        let free = fs.free_block_count().unwrap();
        let mut file = fs.root().file_create(&FileMeta::data("F")).unwrap();

        file.replace(&pattern(10 * SECTOR_SIZE)).unwrap();
        assert_eq!(free - 11, fs.free_block_count().unwrap());

        file.replace(b"tiny").unwrap();
        assert_eq!(free - 2, fs.free_block_count().unwrap());
        assert_eq!(b"tiny".to_vec(), file.read_all().unwrap());
    }

    #[test]
    fn out_of_space_keeps_old_contents() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("F")).unwrap();
        file.replace(b"keep me").unwrap();
        let before = fs.free_block_count().unwrap();

        let too_big = vec![0; 800 * SECTOR_SIZE];
        assert!(matches!(
            file.replace(&too_big),
            Err(Error::OutOfSpace { .. })
        ));
        assert_eq!(before, fs.free_block_count().unwrap());
        assert_eq!(b"keep me".to_vec(), file.read_all().unwrap());
    }

    #[test]
    fn replace_can_reuse_its_own_blocks() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("F")).unwrap();

        // 占满整个卷后再改写同样大小的内容，旧链的描述块也算在内
        let free = fs.free_block_count().unwrap() + 1;
        let data_blocks = free - free.div_ceil(DESCRIPTOR_REFS + 1);
        let data = pattern(data_blocks * SECTOR_SIZE);
        file.replace(&data).unwrap();
        assert_eq!(0, fs.free_block_count().unwrap());

        let reversed: Vec<u8> = data.iter().rev().copied().collect();
        file.replace(&reversed).unwrap();
        assert_eq!(reversed, file.read_all().unwrap());
    }

    #[test]
    fn system_addresses() {
        let fs = blank();
        let mut file = fs
            .root()
            .file_create(&FileMeta::system("PROG", 0xF000, 0xF000))
            .unwrap();

        file.replace(&vec![0; 0x1000]).unwrap();
        assert!(matches!(
            file.replace(&vec![0; 0x1001]),
            Err(Error::InvalidAddress {
                load: 0xF000,
                len: 0x1001
            })
        ));

        let mut meta = file.metadata().unwrap();
        meta.kind = FileKind::System {
            load: 0xF800,
            run: 0xF800,
        };
        assert!(matches!(
            file.metadata_change(&meta),
            Err(Error::InvalidAddress { .. })
        ));

        meta.kind = FileKind::System {
            load: 0x0400,
            run: 0x0410,
        };
        file.metadata_change(&meta).unwrap();
        let meta = file.metadata().unwrap();
        assert_eq!(Some(0x0400), meta.load_address());
        assert_eq!(Some(0x0410), meta.run_address());
        assert_eq!(0x1000, meta.size);
    }

    #[test]
    fn kind_cannot_change() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("DATA")).unwrap();

        let meta = FileMeta::system("DATA", 0x0500, 0x0500);
        assert!(matches!(file.metadata_change(&meta), Err(Error::WrongKind)));
    }

    #[test]
    fn rename() {
        let fs = blank();
        let root = fs.root();
        root.file_create(&FileMeta::data("OTHER")).unwrap();
        let mut file = root.file_create(&FileMeta::data("MINE")).unwrap();
        file.replace(b"contents").unwrap();

        let mut meta = file.metadata().unwrap();
        meta.name = "other".into();
        assert!(matches!(file.metadata_change(&meta), Err(Error::ReadOnly)));

        meta.name = "bad name".into();
        assert!(matches!(
            file.metadata_change(&meta),
            Err(Error::InvalidName(_))
        ));

        meta.name = "mine.txt".into();
        file.metadata_change(&meta).unwrap();
        assert_eq!("MINE.TXT", file.metadata().unwrap().name);
        assert_eq!(b"contents".to_vec(), file.read_all().unwrap());
        assert!(root.find("MINE.TXT").unwrap().is_some());

        // 仅大小写不同，视为同名
        meta.name = "Mine.Txt".into();
        file.metadata_change(&meta).unwrap();
    }

    #[test]
    fn lock() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("F")).unwrap();

        let mut meta = file.metadata().unwrap();
        meta.locked = true;
        file.metadata_change(&meta).unwrap();
        assert!(matches!(file.replace(b"x"), Err(Error::ReadOnly)));

        meta.locked = false;
        file.metadata_change(&meta).unwrap();
        file.replace(b"x").unwrap();
    }

    #[test]
    fn stale_handle() {
        let fs = blank();
        let root = fs.root();
        let mut file = root.file_create(&FileMeta::data("F")).unwrap();
        let mut other = root.file_get(file.key()).unwrap();

        file.replace(b"new").unwrap();
        assert!(matches!(other.read_all(), Err(Error::NotFound)));
        assert!(matches!(other.replace(b"x"), Err(Error::NotFound)));

        root.file_delete(file.key()).unwrap();
        assert!(matches!(file.metadata(), Err(Error::NotFound)));
        assert!(matches!(root.file_delete(file.key()), Err(Error::NotFound)));
    }

    #[test]
    fn cycle_is_detected() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("LOOP")).unwrap();
        file.replace(&pattern(3 * SECTOR_SIZE)).unwrap();

        // 让最后一个数据引用指回描述块
        let head = file.entry().start().to_block();
        let mut sector = fs.read_sector(head).unwrap();
        let mut desc = Descriptor::decode(sector.as_slice()).unwrap();
        let mut refs: Vec<_> = desc.refs().collect();
        refs[2] = head.to_native();
        desc.set_refs(refs);
        desc.encode(sector.as_mut_slice()).unwrap();
        sector.sync(fs.device()).unwrap();

        assert!(matches!(file.read_all(), Err(Error::CorruptChain(_))));
        assert!(matches!(
            fs.root().file_delete(file.key()),
            Err(Error::CorruptChain(_))
        ));
    }

    #[test]
    fn short_chain_is_detected() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("SHORT")).unwrap();
        file.replace(&pattern(2 * SECTOR_SIZE)).unwrap();

        let head = file.entry().start().to_block();
        let mut sector = fs.read_sector(head).unwrap();
        let mut desc = Descriptor::decode(sector.as_slice()).unwrap();
        let first = desc.refs().next().unwrap();
        desc.set_refs([first]);
        desc.encode(sector.as_mut_slice()).unwrap();
        sector.sync(fs.device()).unwrap();

        assert!(matches!(file.read_all(), Err(Error::CorruptChain(_))));
    }

    #[test]
    fn replace_moves_system_file() {
        let fs = blank();
        let mut file = fs
            .root()
            .file_create(&FileMeta::system("PROG", 0xF000, 0xF000))
            .unwrap();
        file.replace(&pattern(0x100)).unwrap();

        // 数据放不进旧地址，但放得进新地址
        let data = pattern(0x2000);
        assert!(matches!(
            file.replace(&data),
            Err(Error::InvalidAddress { load: 0xF000, .. })
        ));
        let moved = FileKind::System {
            load: 0x0500,
            run: 0x0510,
        };
        file.replace_as(moved, &data).unwrap();

        let meta = file.metadata().unwrap();
        assert_eq!(moved, meta.kind);
        assert_eq!(0x2000, meta.size);
        assert_eq!(data, file.read_all().unwrap());
    }

    #[test]
    fn replace_as_rejects_before_writing() {
        let fs = blank();
        let mut file = fs
            .root()
            .file_create(&FileMeta::system("PROG", 0x0500, 0x0500))
            .unwrap();
        file.replace(b"old code").unwrap();
        let free = fs.free_block_count().unwrap();

        let high = FileKind::System {
            load: 0xFF00,
            run: 0xFF00,
        };
        assert!(matches!(
            file.replace_as(high, &pattern(0x200)),
            Err(Error::InvalidAddress { load: 0xFF00, len: 0x200 })
        ));
        assert!(matches!(
            file.replace_as(FileKind::Data, b"data"),
            Err(Error::WrongKind)
        ));

        assert_eq!(free, fs.free_block_count().unwrap());
        let meta = file.metadata().unwrap();
        assert_eq!(Some(0x0500), meta.load_address());
        assert_eq!(b"old code".to_vec(), file.read_all().unwrap());
    }

    #[test]
    fn chain_sizes() {
        assert_eq!(1, blocks_needed(0));
        assert_eq!(2, blocks_needed(1));
        assert_eq!(2, blocks_needed(SECTOR_SIZE));
        assert_eq!(3, blocks_needed(SECTOR_SIZE + 1));
        assert_eq!(123, blocks_needed(DESCRIPTOR_REFS * SECTOR_SIZE));
        assert_eq!(125, blocks_needed(DESCRIPTOR_REFS * SECTOR_SIZE + 1));
    }
}
