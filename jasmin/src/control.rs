use std::sync::Arc;

use block_dev::BlockDevice;

use crate::dir::RootDir;
use crate::sector::Sector;
use crate::volume::bitmap::Bitmap;
use crate::volume::dir_entry::{slot_offset, DIR_ENTRY_SIZE, DIR_SLOTS, FREE};
use crate::volume::{info, FORMAT_FILL};
use crate::{
    BlockId, Error, Geometry, Result, VolumeMeta, BITMAP_BLOCK, DIRECTORY_BLOCK, SECTOR_SIZE,
};

#[derive(Debug)]
pub struct JasminFileSystem {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    geometry: Geometry,
    bitmap: Bitmap,
}

impl JasminFileSystem {
    /// 仅凭几何与卷签名判断设备上是否为Jasmin卷
    pub fn identify(dev: &dyn BlockDevice) -> Option<Geometry> {
        Self::probe(dev).ok()
    }

    /// 挂载已有的卷。几何或签名不符时整体失败。
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let geometry = Self::probe(dev.as_ref()).map_err(|err| {
            log::warn!("mount rejected: {err}");
            err
        })?;
        log::debug!("mounted {} sided volume", geometry.sides());

        Ok(Self {
            dev,
            geometry,
            bitmap: Bitmap::new(geometry),
        })
    }

    /// 格式化整个设备：填满映像，写入空位图、卷信息与空目录。
    /// 不可撤销，也没有崩溃恢复。
    pub fn format(dev: Arc<dyn BlockDevice>, meta: &VolumeMeta) -> Result<Self> {
        let geometry = Self::geometry_of(dev.as_ref())?;
        let label = prepare_label(&meta.label)?;

        for raw in 0..geometry.block_count() as u32 {
            Sector::filled(BlockId::new(raw), FORMAT_FILL).sync(dev.as_ref())?;
        }

        let bitmap = Bitmap::new(geometry);
        let mut fmap = Sector::filled(BITMAP_BLOCK, 0);
        bitmap.init(&mut fmap);
        fmap.w8(info::SYSTEM_DISK, 0);
        fmap.w8(info::DOUBLE_SIDED, geometry.sides() - 1);
        fmap.wstr(info::LABEL, info::LABEL_LEN, &label);
        fmap.sync(dev.as_ref())?;

        let mut cdir = Sector::filled(DIRECTORY_BLOCK, 0);
        for key in 0..DIR_SLOTS {
            let offset = slot_offset(key);
            FREE.encode(&mut cdir.as_mut_slice()[offset..offset + DIR_ENTRY_SIZE])?;
        }
        cdir.sync(dev.as_ref())?;

        log::debug!(
            "formatted {} blocks, label={label:?}",
            geometry.block_count()
        );
        Ok(Self {
            dev,
            geometry,
            bitmap,
        })
    }

    pub fn metadata(&self) -> Result<VolumeMeta> {
        let fmap = self.read_sector(BITMAP_BLOCK)?;
        Ok(VolumeMeta {
            label: fmap.rstr(info::LABEL, info::LABEL_LEN),
            free_blocks: self.free_block_count()?,
            total_blocks: self.geometry.block_count(),
            sides: self.geometry.sides(),
        })
    }

    /// 只有卷标可改，其余字段忽略
    pub fn metadata_change(&self, meta: &VolumeMeta) -> Result<()> {
        let label = prepare_label(&meta.label)?;
        let mut fmap = self.read_sector(BITMAP_BLOCK)?;
        fmap.wstr(info::LABEL, info::LABEL_LEN, &label);
        fmap.sync(self.device())
    }

    pub fn root(&self) -> RootDir<'_> {
        RootDir::new(self)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// 分配`count`个块，编号小者优先，全有或全无
    pub fn allocate_blocks(&self, count: usize) -> Result<Vec<BlockId>> {
        self.bitmap.alloc(self.device(), count)
    }

    pub fn free_blocks(&self, blocks: &[BlockId]) -> Result<()> {
        self.bitmap.dealloc(self.device(), blocks)
    }

    pub fn free_block_count(&self) -> Result<usize> {
        self.bitmap.free_count(self.device())
    }
}

impl JasminFileSystem {
    pub(crate) fn device(&self) -> &dyn BlockDevice {
        self.dev.as_ref()
    }

    pub(crate) fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub(crate) fn read_sector(&self, id: BlockId) -> Result<Sector> {
        Sector::load(self.device(), id)
    }

    fn geometry_of(dev: &dyn BlockDevice) -> Result<Geometry> {
        if dev.block_size() != SECTOR_SIZE {
            return Err(Error::NotJasmin(format!(
                "block size {} instead of {SECTOR_SIZE}",
                dev.block_size()
            )));
        }
        Geometry::from_block_count(dev.block_count()).ok_or_else(|| {
            Error::NotJasmin(format!("unsupported block count {}", dev.block_count()))
        })
    }

    /// 检查几何、位图、卷信息与目录头
    fn probe(dev: &dyn BlockDevice) -> Result<Geometry> {
        let geometry = Self::geometry_of(dev)?;

        let fmap = Sector::load(dev, BITMAP_BLOCK)?;
        if fmap.r8(info::DOUBLE_SIDED) != geometry.sides() - 1 {
            return Err(Error::NotJasmin(format!(
                "sides flag {:#04x} does not match {} blocks",
                fmap.r8(info::DOUBLE_SIDED),
                geometry.block_count()
            )));
        }
        Bitmap::new(geometry)
            .verify(&fmap)
            .map_err(Error::NotJasmin)?;
        if !fmap.map(info::LABEL, info::LABEL_LEN, |label| {
            label.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
        }) {
            return Err(Error::NotJasmin("unprintable volume label".into()));
        }

        let cdir = Sector::load(dev, DIRECTORY_BLOCK)?;
        if cdir.r16b(0) != 0 {
            return Err(Error::NotJasmin(format!(
                "chained directory ({:#06x}) is not supported",
                cdir.r16b(0)
            )));
        }

        Ok(geometry)
    }
}

/// 卷标：至多8个字符，字母数字、空格、`-`或`_`，转为大写；空卷标取默认值
pub fn prepare_label(label: &str) -> Result<String> {
    if label.is_empty() {
        return Ok(VolumeMeta::DEFAULT_LABEL.to_owned());
    }
    if label.len() > info::LABEL_LEN
        || !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || " -_".contains(c))
    {
        return Err(Error::InvalidName(label.to_owned()));
    }
    Ok(label.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDisk;

    use super::*;

    fn disk(blocks: usize) -> Arc<MemoryDisk> {
        Arc::new(MemoryDisk::new(SECTOR_SIZE, blocks))
    }

    #[test]
    fn format_then_mount() {
        let dev = disk(1394);
        let fs = JasminFileSystem::format(dev.clone(), &VolumeMeta::labelled("test")).unwrap();
        assert_eq!(Geometry::DOUBLE_SIDED, fs.geometry());

        let fs = JasminFileSystem::mount(dev.clone()).unwrap();
        let meta = fs.metadata().unwrap();
        assert_eq!("TEST", meta.label);
        assert_eq!(1394 - 2, meta.free_blocks);
        assert_eq!(1394, meta.total_blocks);
        assert_eq!(2, meta.sides);

        let image = dev.image();
        assert_eq!(FORMAT_FILL, image[0]);
        assert_eq!(1, image[340 * SECTOR_SIZE + info::DOUBLE_SIDED]);
        assert_eq!(b"TEST    ", &image[340 * SECTOR_SIZE + 0xF8..341 * SECTOR_SIZE]);
        assert_eq!(&[0, 0, 0, 0, 0xFF, 0x00], &image[341 * SECTOR_SIZE..341 * SECTOR_SIZE + 6]);
    }

    #[test]
    fn default_label() {
        let fs = JasminFileSystem::format(disk(697), &VolumeMeta::default()).unwrap();
        assert_eq!("UNTITLED", fs.metadata().unwrap().label);

        let fs = JasminFileSystem::format(disk(697), &VolumeMeta::labelled("")).unwrap();
        assert_eq!("UNTITLED", fs.metadata().unwrap().label);
    }

    #[test]
    fn relabel() {
        let fs = JasminFileSystem::format(disk(697), &VolumeMeta::default()).unwrap();
        fs.metadata_change(&VolumeMeta::labelled("games 2")).unwrap();
        assert_eq!("GAMES 2", fs.metadata().unwrap().label);

        assert!(matches!(
            fs.metadata_change(&VolumeMeta::labelled("TOOLONGLABEL")),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            fs.metadata_change(&VolumeMeta::labelled("A/B")),
            Err(Error::InvalidName(_))
        ));
        assert_eq!("GAMES 2", fs.metadata().unwrap().label);
    }

    #[test]
    fn bad_label_leaves_device_untouched() {
        let dev = disk(697);
        assert!(matches!(
            JasminFileSystem::format(dev.clone(), &VolumeMeta::labelled("WAY TOO LONG")),
            Err(Error::InvalidName(_))
        ));
        assert!(dev.image().iter().all(|&b| b == 0));
    }

    #[test]
    fn mount_rejects_blank_and_odd_devices() {
        assert!(matches!(
            JasminFileSystem::mount(disk(697)),
            Err(Error::NotJasmin(_))
        ));
        assert!(matches!(
            JasminFileSystem::mount(disk(700)),
            Err(Error::NotJasmin(_))
        ));
        assert!(matches!(
            JasminFileSystem::mount(Arc::new(MemoryDisk::new(512, 697))),
            Err(Error::NotJasmin(_))
        ));
        assert_eq!(None, JasminFileSystem::identify(&*disk(1394)));
    }

    #[test]
    fn mount_rejects_sides_mismatch() {
        let dev = disk(697);
        JasminFileSystem::format(dev.clone(), &VolumeMeta::default()).unwrap();
        assert_eq!(
            Some(Geometry::SINGLE_SIDED),
            JasminFileSystem::identify(&*dev)
        );

        let mut fmap = Sector::load(&*dev, BITMAP_BLOCK).unwrap();
        fmap.w8(info::DOUBLE_SIDED, 1);
        fmap.sync(&*dev).unwrap();
        assert!(matches!(
            JasminFileSystem::mount(dev),
            Err(Error::NotJasmin(_))
        ));
    }

    #[test]
    fn mount_rejects_chained_directory() {
        let dev = disk(697);
        JasminFileSystem::format(dev.clone(), &VolumeMeta::default()).unwrap();

        let mut cdir = Sector::load(&*dev, DIRECTORY_BLOCK).unwrap();
        cdir.w16b(0, 0x1403);
        cdir.sync(&*dev).unwrap();
        assert!(matches!(
            JasminFileSystem::mount(dev),
            Err(Error::NotJasmin(_))
        ));
    }
}
