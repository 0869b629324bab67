//! 文件系统类型表
//!
//! 每种文件系统注册一张操作表 `VfsOps`, 同类型的所有挂载点共享. 操作表有自己的引用计数,
//! 挂载点持有一个 `FsTypeRef` 直到销毁, 被引用的类型不能注销.

use core::{
    fmt,
    ops::Deref,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloc::{
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use ftl_util::{
    error::{SysError, SysR},
    sync::{spin_mutex::SpinMutex, Spin},
};

use crate::{
    config::MFSNAMELEN,
    cred::Cred,
    manager::VfsManager,
    mount::{MntFlags, Mount},
    vnode::VnodeRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtAttrCmd {
    Start,
    Stop,
}

/// 文件系统统计信息, 挂载点缓存一份
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatVfs {
    pub bsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub files: u64,
    pub ffree: u64,
    /// 挂载标志, 由挂载点填写
    pub flag: u32,
    pub owner: u32,
    pub fstypename: String,
    pub mntonname: String,
    pub mntfromname: String,
}

/// 文件系统操作表, 由具体文件系统实现
pub trait VfsOps: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn mount(&self, mp: &Arc<Mount>, path: &str, data: &[u8]) -> SysR<()>;
    fn start(&self, _mp: &Arc<Mount>, _flags: u32) -> SysR<()> {
        Ok(())
    }
    fn unmount(&self, mp: &Arc<Mount>, flags: MntFlags) -> SysR<()>;
    fn root(&self, mp: &Arc<Mount>) -> SysR<VnodeRef>;
    fn sync(&self, mp: &Arc<Mount>, wait: bool, cred: &Cred) -> SysR<()>;
    fn statvfs(&self, mp: &Arc<Mount>) -> SysR<StatVfs>;
    /// 是否提供 mountroot
    fn has_mountroot(&self) -> bool {
        false
    }
    /// 挂载根文件系统, 成功时必须已经把挂载点加入注册表
    fn mountroot(&self, _vfs: &VfsManager) -> SysR<()> {
        Err(SysError::ENODEV)
    }
    fn extattrctl(&self, _mp: &Arc<Mount>, _cmd: ExtAttrCmd) -> SysR<()> {
        Err(SysError::EOPNOTSUPP)
    }
}

/// 按需加载文件系统模块, 加载成功后模块自行调用 `VfsManager::attach`
pub trait FsModuleLoader: Send + Sync + 'static {
    fn load(&self, vfs: &VfsManager, name: &str) -> SysR<()>;
}

struct FsTypeEntry {
    ops: Arc<dyn VfsOps>,
    refcount: AtomicUsize,
}

/// 持有一个文件系统类型的引用
pub struct FsTypeRef(Arc<FsTypeEntry>);

impl FsTypeRef {
    fn new(entry: &Arc<FsTypeEntry>) -> Self {
        entry.refcount.fetch_add(1, Ordering::Relaxed);
        Self(entry.clone())
    }
    pub fn ops(&self) -> &Arc<dyn VfsOps> {
        &self.0.ops
    }
    pub fn refcount(&self) -> usize {
        self.0.refcount.load(Ordering::Relaxed)
    }
}

impl Clone for FsTypeRef {
    fn clone(&self) -> Self {
        Self::new(&self.0)
    }
}

impl Drop for FsTypeRef {
    fn drop(&mut self) {
        let v = self.0.refcount.fetch_sub(1, Ordering::Release);
        debug_assert!(v != 0);
    }
}

impl Deref for FsTypeRef {
    type Target = dyn VfsOps;
    fn deref(&self) -> &Self::Target {
        &*self.0.ops
    }
}

impl fmt::Debug for FsTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FsType({}, rc={})", self.name(), self.refcount())
    }
}

/// 按注册顺序保存所有文件系统类型
pub(crate) struct FsTypeTable {
    list: SpinMutex<Vec<Arc<FsTypeEntry>>, Spin>,
}

impl FsTypeTable {
    pub const fn new() -> Self {
        Self {
            list: SpinMutex::new(Vec::new()),
        }
    }
    pub fn attach(&self, ops: Arc<dyn VfsOps>) -> SysR<()> {
        let name = ops.name();
        if name.is_empty() || name.len() >= MFSNAMELEN {
            return Err(SysError::EINVAL);
        }
        let mut list = self.list.lock();
        if list.iter().any(|e| e.ops.name() == name) {
            return Err(SysError::EEXIST);
        }
        list.push(Arc::new(FsTypeEntry {
            ops,
            refcount: AtomicUsize::new(0),
        }));
        Ok(())
    }
    pub fn detach(&self, name: &str) -> SysR<()> {
        let mut list = self.list.lock();
        let i = list
            .iter()
            .position(|e| e.ops.name() == name)
            .ok_or(SysError::ENOENT)?;
        if list[i].refcount.load(Ordering::Acquire) != 0 {
            return Err(SysError::EBUSY);
        }
        list.remove(i);
        Ok(())
    }
    pub fn get(&self, name: &str) -> Option<FsTypeRef> {
        let list = self.list.lock();
        list.iter()
            .find(|e| e.ops.name() == name)
            .map(FsTypeRef::new)
    }
    /// 按注册顺序取得所有类型的引用
    pub fn snapshot(&self) -> Vec<FsTypeRef> {
        self.list.lock().iter().map(FsTypeRef::new).collect()
    }
    pub fn names(&self) -> Vec<String> {
        self.list
            .lock()
            .iter()
            .map(|e| e.ops.name().to_string())
            .collect()
    }
}
