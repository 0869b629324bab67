use alloc::string::{String, ToString};

/// 不指定根文件系统类型, 依次尝试所有注册的文件系统
pub const ROOT_FSTYPE_ANY: &str = "?";

/// vflush 在没有进展之前最多扫描的轮数
pub const VFLUSH_RETRIES: usize = 2;

/// 文件系统名的最大长度
pub const MFSNAMELEN: usize = 32;

pub struct VfsConfig {
    /// 根文件系统类型, `ROOT_FSTYPE_ANY` 表示自动探测
    pub rootfstype: String,
    pub flush_retries: usize,
    /// vflush 两轮扫描之间的让出点
    pub flush_yield: fn(),
    /// 等待挂载点更新锁时的让出点, 持有者可能正在等待文件系统I/O
    pub lock_wait: fn(),
    /// unmountall 时打印每个挂载点
    pub verbose_unmount: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            rootfstype: ROOT_FSTYPE_ANY.to_string(),
            flush_retries: VFLUSH_RETRIES,
            flush_yield: core::hint::spin_loop,
            lock_wait: core::hint::spin_loop,
            verbose_unmount: false,
        }
    }
}

impl VfsConfig {
    pub fn with_rootfstype(mut self, name: &str) -> Self {
        self.rootfstype = name.to_string();
        self
    }
    pub fn rootfstype_any(&self) -> bool {
        self.rootfstype == ROOT_FSTYPE_ANY
    }
}
