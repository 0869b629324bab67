//! 进程的当前目录和根目录
//!
//! 挂载新文件系统时需要把指向被覆盖目录的绑定改为新文件系统的根, 这里只保存这部分信息.
//! 进程表和 `CwdInfo` 的锁不会同时持有

use alloc::{sync::Arc, vec, vec::Vec};
use ftl_util::{
    error::{SysError, SysR},
    sync::{rw_spin_mutex::RwSpinMutex, spin_mutex::SpinMutex, Spin},
};

use crate::vnode::{Vnode, VnodeRef};

#[derive(Default)]
struct CwdDirs {
    cdir: Option<VnodeRef>,
    rdir: Option<VnodeRef>,
}

/// 可以被多个进程共享
pub struct CwdInfo {
    dirs: RwSpinMutex<CwdDirs, Spin>,
}

impl CwdInfo {
    pub fn new(cdir: Option<VnodeRef>, rdir: Option<VnodeRef>) -> Arc<Self> {
        Arc::new(Self {
            dirs: RwSpinMutex::new(CwdDirs { cdir, rdir }),
        })
    }
    pub fn cdir(&self) -> Option<VnodeRef> {
        self.dirs.shared_lock().cdir.clone()
    }
    pub fn rdir(&self) -> Option<VnodeRef> {
        self.dirs.shared_lock().rdir.clone()
    }
    /// 返回旧值
    pub fn set_cdir(&self, vp: Option<VnodeRef>) -> Option<VnodeRef> {
        core::mem::replace(&mut self.dirs.unique_lock().cdir, vp)
    }
    pub fn set_rdir(&self, vp: Option<VnodeRef>) -> Option<VnodeRef> {
        core::mem::replace(&mut self.dirs.unique_lock().rdir, vp)
    }
    pub fn refers_to(&self, vp: &Vnode) -> bool {
        let dirs = self.dirs.shared_lock();
        let eq = |d: &Option<VnodeRef>| d.as_ref().map_or(false, |d| d.same(vp));
        eq(&dirs.cdir) || eq(&dirs.rdir)
    }
    /// 把指向 old 的绑定换成 new, 返回被替换下来的引用, 由调用者在锁外释放
    pub(crate) fn rebind(&self, old: &Vnode, new: &VnodeRef) -> [Option<VnodeRef>; 2] {
        let mut dirs = self.dirs.unique_lock();
        let swap = |d: &mut Option<VnodeRef>| {
            if d.as_ref().map_or(false, |v| v.same(old)) {
                d.replace(new.clone())
            } else {
                None
            }
        };
        let c = swap(&mut dirs.cdir);
        let r = swap(&mut dirs.rdir);
        [c, r]
    }
}

struct ProcEntry {
    pid: usize,
    cwdi: Arc<CwdInfo>,
}

pub struct ProcTable {
    procs: SpinMutex<Vec<ProcEntry>, Spin>,
}

impl ProcTable {
    pub const fn new() -> Self {
        Self {
            procs: SpinMutex::new(Vec::new()),
        }
    }
    /// 包含0号进程的进程表
    pub(crate) fn with_proc0(cwdi0: Arc<CwdInfo>) -> Self {
        Self {
            procs: SpinMutex::new(vec![ProcEntry {
                pid: 0,
                cwdi: cwdi0,
            }]),
        }
    }
    pub fn insert(&self, pid: usize, cwdi: Arc<CwdInfo>) -> SysR<()> {
        let mut procs = self.procs.lock();
        if procs.iter().any(|p| p.pid == pid) {
            return Err(SysError::EEXIST);
        }
        procs.push(ProcEntry { pid, cwdi });
        Ok(())
    }
    /// 子进程共享父进程的 `CwdInfo`
    pub fn fork(&self, parent: usize, child: usize) -> SysR<()> {
        let mut procs = self.procs.lock();
        if procs.iter().any(|p| p.pid == child) {
            return Err(SysError::EEXIST);
        }
        let cwdi = procs
            .iter()
            .find(|p| p.pid == parent)
            .ok_or(SysError::ESRCH)?
            .cwdi
            .clone();
        procs.push(ProcEntry { pid: child, cwdi });
        Ok(())
    }
    pub fn exit(&self, pid: usize) -> SysR<()> {
        let entry = {
            let mut procs = self.procs.lock();
            let i = procs
                .iter()
                .position(|p| p.pid == pid)
                .ok_or(SysError::ESRCH)?;
            procs.swap_remove(i)
        };
        drop(entry);
        Ok(())
    }
    pub fn cwdi(&self, pid: usize) -> Option<Arc<CwdInfo>> {
        let procs = self.procs.lock();
        procs.iter().find(|p| p.pid == pid).map(|p| p.cwdi.clone())
    }
    pub fn len(&self) -> usize {
        self.procs.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// 所有不同的 `CwdInfo`, 被多个进程共享的只出现一次
    ///
    /// 返回时进程表已经解锁, 调用者不能在持有进程表时获取 `CwdInfo` 的锁
    pub(crate) fn cwdi_snapshot(&self) -> Vec<Arc<CwdInfo>> {
        let procs = self.procs.lock();
        let mut v: Vec<Arc<CwdInfo>> = Vec::with_capacity(procs.len());
        for p in procs.iter() {
            if !v.iter().any(|c| Arc::ptr_eq(c, &p.cwdi)) {
                v.push(p.cwdi.clone());
            }
        }
        v
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}
