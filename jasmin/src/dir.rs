//! 根目录，也是卷上唯一的目录

use crate::file::File;
use crate::sector::Sector;
use crate::volume::descriptor::Descriptor;
use crate::volume::dir_entry::{
    file_name_prepare, slot_offset, DirEntry, DIR_ENTRY_SIZE, DIR_SLOTS, FREE, NAME_LEN,
};
use crate::{
    Error, FileMeta, JasminFileSystem, Listing, Result, DIRECTORY_BLOCK, SECTOR_SIZE,
};

/// 根目录自身的键，不与任何槽位号冲突
pub const ROOT_KEY: u16 = u16::MAX;

/// 根目录的视图。键即槽位号，按盘上顺序排列。
#[derive(Debug, Clone, Copy)]
pub struct RootDir<'a> {
    fs: &'a JasminFileSystem,
}

impl<'a> RootDir<'a> {
    pub(crate) fn new(fs: &'a JasminFileSystem) -> Self {
        Self { fs }
    }

    pub fn key(&self) -> u16 {
        ROOT_KEY
    }

    /// 按槽位顺序列出所有已使用的目录项
    pub fn contents(&self) -> Result<Vec<Listing>> {
        Ok(self
            .slots()?
            .into_iter()
            .filter(|(_, entry)| entry.is_occupied())
            .map(|(key, entry)| Listing {
                key,
                ty: entry.file_type(),
                name: entry.name(),
                blocks: entry.blocks(),
                locked: entry.is_locked(),
            })
            .collect())
    }

    pub fn file_get(&self, key: u16) -> Result<File<'a>> {
        let entry = self.entry(key)?;
        if !entry.is_occupied() {
            return Err(Error::NotFound);
        }
        Ok(File::new(self.fs, key, entry))
    }

    /// 格式只有一层目录，所以只有[`ROOT_KEY`]能取到目录
    pub fn dir_get(&self, key: u16) -> Result<RootDir<'a>> {
        if key == ROOT_KEY {
            return Ok(*self);
        }
        match self.entry(key) {
            Ok(entry) if entry.is_occupied() => Err(Error::WrongKind),
            Ok(_) | Err(Error::NotFound) => Err(Error::NotFound),
            Err(err) => Err(err),
        }
    }

    /// 按名称查找，名称先经规范化
    pub fn find(&self, name: &str) -> Result<Option<File<'a>>> {
        let name = file_name_prepare(name)?;
        Ok(self
            .slots()?
            .into_iter()
            .find(|(_, entry)| entry.is_occupied() && entry.same_name(&name))
            .map(|(key, entry)| File::new(self.fs, key, entry)))
    }

    /// 在首个空槽创建空文件，并为其分配首个描述块
    pub fn file_create(&self, meta: &FileMeta) -> Result<File<'a>> {
        let name = file_name_prepare(&meta.name)?;

        let slots = self.slots()?;
        if slots
            .iter()
            .any(|(_, entry)| entry.is_occupied() && entry.same_name(&name))
        {
            return Err(Error::InvalidName(meta.name.clone()));
        }
        let key = slots
            .iter()
            .find_map(|(key, entry)| (!entry.is_occupied()).then_some(*key))
            .ok_or(Error::DirectoryFull)?;

        let head = self.fs.allocate_blocks(1)?[0];
        let mut sector = Sector::filled(head, 0);
        Descriptor::head(&meta.kind, 0).encode(sector.as_mut_slice())?;
        sector.sync(self.fs.device())?;

        let mut entry = DirEntry::new(name, meta.kind.file_type(), head.to_native(), 1);
        entry.set_locked(meta.locked);
        self.write_entry(key, &entry)?;

        log::debug!("created {:?} in slot {key}", entry.name());
        Ok(File::new(self.fs, key, entry))
    }

    /// 释放文件的整条链，再把槽位标为空闲
    pub fn file_delete(&self, key: u16) -> Result<()> {
        let file = self.file_get(key)?;
        if file.entry().is_locked() {
            return Err(Error::ReadOnly);
        }

        let blocks = file.chain()?;
        self.fs.free_blocks(&blocks)?;
        self.write_entry(key, &FREE)?;

        log::debug!("deleted {:?} from slot {key}", file.entry().name());
        Ok(())
    }

    /// 原地改写已使用的槽位。不能借此改名，改名须经
    /// [`File::metadata_change`]。
    pub fn update_file(&self, key: u16, entry: &DirEntry) -> Result<()> {
        let current = self.entry(key)?;
        if !current.is_occupied() || !entry.is_occupied() {
            return Err(Error::NotFound);
        }
        if !current.same_name(entry.raw_name()) {
            return Err(Error::ReadOnly);
        }
        self.write_entry(key, entry)
    }
}

impl RootDir<'_> {
    /// 读出槽位内容，槽位号越界报[`Error::NotFound`]
    pub(crate) fn entry(&self, key: u16) -> Result<DirEntry> {
        let key = usize::from(key);
        if key >= DIR_SLOTS {
            return Err(Error::NotFound);
        }
        let offset = slot_offset(key);
        self.fs
            .read_sector(DIRECTORY_BLOCK)?
            .map(offset, DIR_ENTRY_SIZE, DirEntry::decode)
    }

    pub(crate) fn write_entry(&self, key: u16, entry: &DirEntry) -> Result<()> {
        let key = usize::from(key);
        if key >= DIR_SLOTS {
            return Err(Error::NotFound);
        }
        let offset = slot_offset(key);
        let mut cdir = self.fs.read_sector(DIRECTORY_BLOCK)?;
        cdir.map_mut(offset, DIR_ENTRY_SIZE, |raw| entry.encode(raw))?;
        cdir.sync(self.fs.device())
    }

    /// 除`except`外，是否已有同名的文件
    pub(crate) fn name_taken(&self, name: &[u8; NAME_LEN], except: u16) -> Result<bool> {
        Ok(self
            .slots()?
            .iter()
            .any(|(key, entry)| *key != except && entry.is_occupied() && entry.same_name(name)))
    }

    /// 全部槽位
    fn slots(&self) -> Result<Vec<(u16, DirEntry)>> {
        let cdir = self.fs.read_sector(DIRECTORY_BLOCK)?;
        debug_assert!(slot_offset(DIR_SLOTS) <= SECTOR_SIZE);
        (0..DIR_SLOTS)
            .map(|key| {
                cdir.map(slot_offset(key), DIR_ENTRY_SIZE, DirEntry::decode)
                    .map(|entry| (key as u16, entry))
            })
            .collect()
    }
}
