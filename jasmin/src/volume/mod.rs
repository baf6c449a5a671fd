//! 卷的布局
//!
//! 扇区256字节，每磁道17扇区，每面41磁道，单面或双面。
//!
//! 20号磁道1号扇区（块340） | 位图与卷信息
//! 20号磁道2号扇区（块341） | 根目录，14个18字节的目录项
//! 其余扇区                 | 文件的描述块与数据块

pub mod bitmap;
pub mod descriptor;
pub mod dir_entry;

/// 卷信息在位图块内的偏移
pub mod info {
    /// 非0表示系统盘
    pub const SYSTEM_DISK: usize = 0xF6;
    /// 0为单面，1为双面
    pub const DOUBLE_SIDED: usize = 0xF7;
    pub const LABEL: usize = 0xF8;
    pub const LABEL_LEN: usize = 8;
}

/// 格式化时填满整个映像的字节
pub const FORMAT_FILL: u8 = 0x6C;
