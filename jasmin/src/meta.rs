//! 卷与文件的元数据

/// 文件的种类。系统文件额外带有装载与运行地址。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Data,
    System { load: u16, run: u16 },
}

impl FileKind {
    pub fn file_type(&self) -> FileType {
        match self {
            Self::Data => FileType::Data,
            Self::System { .. } => FileType::System,
        }
    }

    pub fn load_address(&self) -> Option<u16> {
        match *self {
            Self::System { load, .. } => Some(load),
            Self::Data => None,
        }
    }

    pub fn run_address(&self) -> Option<u16> {
        match *self {
            Self::System { run, .. } => Some(run),
            Self::Data => None,
        }
    }
}

/// 目录项中记录的种类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Data,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub kind: FileKind,
    /// 文件字节数，只读
    pub size: usize,
    /// 占用块数（含描述块），只读
    pub blocks: usize,
    pub locked: bool,
}

impl FileMeta {
    pub fn data(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: FileKind::Data,
            size: 0,
            blocks: 0,
            locked: false,
        }
    }

    pub fn system(name: &str, load: u16, run: u16) -> Self {
        Self {
            kind: FileKind::System { load, run },
            ..Self::data(name)
        }
    }

    pub fn load_address(&self) -> Option<u16> {
        self.kind.load_address()
    }

    pub fn run_address(&self) -> Option<u16> {
        self.kind.run_address()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMeta {
    pub label: String,
    /// 只读
    pub free_blocks: usize,
    /// 只读
    pub total_blocks: usize,
    /// 只读
    pub sides: u8,
}

impl VolumeMeta {
    pub const DEFAULT_LABEL: &'static str = "UNTITLED";

    pub fn labelled(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            free_blocks: 0,
            total_blocks: 0,
            sides: 0,
        }
    }
}

impl Default for VolumeMeta {
    fn default() -> Self {
        Self::labelled(Self::DEFAULT_LABEL)
    }
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// 目录槽位号
    pub key: u16,
    pub ty: FileType,
    pub name: String,
    pub blocks: usize,
    pub locked: bool,
}
