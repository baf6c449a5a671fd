//! 卷的一致性检查
//!
//! 只读。将位图与各文件链互相对照。

use std::collections::BTreeMap;

use crate::{BlockId, Error, JasminFileSystem, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// 已分配却不属于任何文件的块
    pub leaked: Vec<BlockId>,
    /// 同时出现在多个文件链中的块
    pub shared: Vec<BlockId>,
    /// 属于某个文件却在位图中标为空闲的块
    pub marked_free: Vec<BlockId>,
    /// 链损坏的文件：槽位号与原因
    pub broken: Vec<(u16, String)>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
            && self.shared.is_empty()
            && self.marked_free.is_empty()
            && self.broken.is_empty()
    }
}

impl JasminFileSystem {
    pub fn check(&self) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let free = self.bitmap().free_set(self.device())?;
        let root = self.root();

        let mut owners: BTreeMap<BlockId, u16> = BTreeMap::new();
        for listing in root.contents()? {
            let file = root.file_get(listing.key)?;
            let chain = match file.chain() {
                Ok(chain) => chain,
                Err(Error::CorruptChain(reason)) => {
                    report.broken.push((listing.key, reason));
                    continue;
                }
                Err(err) => return Err(err),
            };

            if chain.len() != listing.blocks {
                report.broken.push((
                    listing.key,
                    format!(
                        "entry records {} blocks, chain has {}",
                        listing.blocks,
                        chain.len()
                    ),
                ));
            }

            for block in chain {
                if owners.insert(block, listing.key).is_some() {
                    report.shared.push(block);
                }
                if free.contains(&block) {
                    report.marked_free.push(block);
                }
            }
        }

        // 链损坏的文件无法确定归属，不报告泄漏
        if report.broken.is_empty() {
            report.leaked = self
                .bitmap()
                .data_blocks()
                .filter(|block| !free.contains(block) && !owners.contains_key(block))
                .collect();
        }

        if !report.is_clean() {
            log::warn!("check found problems: {report:?}");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::MemoryDisk;

    use super::*;
    use crate::{FileMeta, VolumeMeta, SECTOR_SIZE};

    fn blank() -> JasminFileSystem {
        let dev = Arc::new(MemoryDisk::new(SECTOR_SIZE, 697));
        JasminFileSystem::format(dev, &VolumeMeta::default()).unwrap()
    }

    #[test]
    fn fresh_volume_is_clean() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("A")).unwrap();
        file.replace(&[1; 1000]).unwrap();
        fs.root().file_create(&FileMeta::data("B")).unwrap();

        assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn leaked_blocks() {
        let fs = blank();
        let leaked = fs.allocate_blocks(2).unwrap();

        let report = fs.check().unwrap();
        assert_eq!(leaked, report.leaked);
        assert!(report.shared.is_empty());
    }

    #[test]
    fn blocks_marked_free() {
        let fs = blank();
        let mut file = fs.root().file_create(&FileMeta::data("A")).unwrap();
        file.replace(b"data").unwrap();
        let chain = file.chain().unwrap();
        fs.free_blocks(&chain[1..]).unwrap();

        let report = fs.check().unwrap();
        assert_eq!(chain[1..].to_vec(), report.marked_free);
        assert!(report.leaked.is_empty());
    }

    #[test]
    fn broken_and_miscounted_files() {
        let fs = blank();
        let root = fs.root();
        let file = root.file_create(&FileMeta::data("A")).unwrap();

        let mut entry = *file.entry();
        entry.set_blocks(5);
        root.update_file(file.key(), &entry).unwrap();
        let report = fs.check().unwrap();
        assert_eq!(1, report.broken.len());
        assert_eq!(0, report.broken[0].0);

        entry.set_blocks(1);
        entry.set_start(crate::BITMAP_BLOCK.to_native());
        root.update_file(file.key(), &entry).unwrap();
        let report = fs.check().unwrap();
        assert_eq!(1, report.broken.len());
        assert!(report.leaked.is_empty());
    }
}
