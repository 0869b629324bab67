use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::{
    string::String,
    sync::{Barrier, Mutex},
    thread,
    time::Duration,
};

use alloc::sync::Arc;
use ftl_util::error::{SysError, SysR};

use crate::{
    Cred, ExtAttrCmd, FlushFlags, MntFlags, Mount, StatVfs, VType, VfsManager, VfsOps, Vnode,
    VnodeAttr, VnodeFlags, VnodeOps, VnodeRef,
};

/// 测试用vnode, 记录被调用的次数
pub struct TestNode {
    pub nlink: AtomicU32,
    pub fsyncs: AtomicUsize,
    pub reclaims: AtomicUsize,
}

impl TestNode {
    pub fn new(nlink: u32) -> Arc<Self> {
        Arc::new(Self {
            nlink: AtomicU32::new(nlink),
            fsyncs: AtomicUsize::new(0),
            reclaims: AtomicUsize::new(0),
        })
    }
}

impl VnodeOps for TestNode {
    fn fsync(&self, _vp: &Vnode) -> SysR<()> {
        self.fsyncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn getattr(&self, _vp: &Vnode) -> SysR<VnodeAttr> {
        Ok(VnodeAttr {
            nlink: self.nlink.load(Ordering::SeqCst),
            size: 0,
        })
    }
    fn reclaim(&self, _vp: &Vnode) -> SysR<()> {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 新建一个vnode并加入挂载点
pub fn add_vnode(mp: &Arc<Mount>, vtype: VType) -> VnodeRef {
    let vp = Vnode::new(vtype, TestNode::new(1));
    vp.insmntque(Some(mp));
    vp
}

/// 每个挂载点的私有数据
struct TestMount {
    root: Mutex<Option<VnodeRef>>,
}

pub struct TestFs {
    name: String,
    rootable: bool,
    root_fails: bool,
    pub mount_err: Mutex<Option<SysError>>,
    pub sync_err: Mutex<Option<SysError>>,
    pub unmount_err: Mutex<Option<SysError>>,
    pub start_err: Mutex<Option<SysError>>,
    /// mount 钩子返回前在此等待
    pub mount_barrier: Mutex<Option<Arc<Barrier>>>,
    /// sync 钩子模拟的I/O时间
    pub sync_delay: Mutex<Option<Duration>>,
    pub mounts: AtomicUsize,
    pub syncs: AtomicUsize,
    pub unmounts: AtomicUsize,
    pub mountroots: AtomicUsize,
    pub extattr_starts: AtomicUsize,
}

impl TestFs {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            rootable: true,
            root_fails: false,
            mount_err: Mutex::new(None),
            sync_err: Mutex::new(None),
            unmount_err: Mutex::new(None),
            start_err: Mutex::new(None),
            mount_barrier: Mutex::new(None),
            sync_delay: Mutex::new(None),
            mounts: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
            unmounts: AtomicUsize::new(0),
            mountroots: AtomicUsize::new(0),
            extattr_starts: AtomicUsize::new(0),
        }
    }
    pub fn rootable(mut self, rootable: bool) -> Self {
        self.rootable = rootable;
        self
    }
    /// 提供 mountroot 但总是失败
    pub fn root_fails(mut self) -> Self {
        self.root_fails = true;
        self
    }
}

impl VfsOps for TestFs {
    fn name(&self) -> &str {
        &self.name
    }
    fn mount(&self, mp: &Arc<Mount>, _path: &str, _data: &[u8]) -> SysR<()> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = *self.mount_err.lock().unwrap() {
            return Err(e);
        }
        let root = Vnode::new(VType::Dir, TestNode::new(2));
        root.set_flags(VnodeFlags::ROOT);
        root.insmntque(Some(mp));
        mp.set_data(Some(Arc::new(TestMount {
            root: Mutex::new(Some(root)),
        })));
        let barrier = self.mount_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait();
        }
        Ok(())
    }
    fn start(&self, _mp: &Arc<Mount>, _flags: u32) -> SysR<()> {
        match *self.start_err.lock().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
    fn unmount(&self, mp: &Arc<Mount>, flags: MntFlags) -> SysR<()> {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = *self.unmount_err.lock().unwrap() {
            return Err(e);
        }
        let force = flags.contains(MntFlags::FORCE);
        let fl = if force {
            FlushFlags::FORCECLOSE
        } else {
            FlushFlags::empty()
        };
        let tm = mp.data_as::<TestMount>();
        let root = tm.as_ref().and_then(|tm| tm.root.lock().unwrap().clone());
        if let Some(root) = &root {
            // 私有数据和这里各持有一个引用
            if root.usecount() > 2 && !force {
                return Err(SysError::EBUSY);
            }
        }
        mp.vflush(root.as_deref(), fl)?;
        drop(root);
        if let Some(tm) = tm {
            let root = tm.root.lock().unwrap().take();
            if let Some(root) = root {
                root.vgone();
            }
        }
        Ok(())
    }
    fn root(&self, mp: &Arc<Mount>) -> SysR<VnodeRef> {
        let tm = mp.data_as::<TestMount>().ok_or(SysError::ENOENT)?;
        let root = tm.root.lock().unwrap().clone();
        root.ok_or(SysError::ENOENT)
    }
    fn sync(&self, _mp: &Arc<Mount>, _wait: bool, _cred: &Cred) -> SysR<()> {
        let delay = *self.sync_delay.lock().unwrap();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.syncs.fetch_add(1, Ordering::SeqCst);
        match *self.sync_err.lock().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
    fn statvfs(&self, mp: &Arc<Mount>) -> SysR<StatVfs> {
        Ok(StatVfs {
            bsize: 4096,
            blocks: 1024,
            bfree: 512,
            files: mp.vnode_count() as u64,
            ..StatVfs::default()
        })
    }
    fn has_mountroot(&self) -> bool {
        self.rootable
    }
    fn mountroot(&self, vfs: &VfsManager) -> SysR<()> {
        self.mountroots.fetch_add(1, Ordering::SeqCst);
        if self.root_fails {
            return Err(SysError::EINVAL);
        }
        let busy = vfs.rootmountalloc(&self.name, "rootdev")?;
        self.mount(busy.mount(), "/", &[])?;
        vfs.mounts().append(busy.mount());
        Ok(())
    }
    fn extattrctl(&self, _mp: &Arc<Mount>, cmd: ExtAttrCmd) -> SysR<()> {
        if cmd == ExtAttrCmd::Start {
            self.extattr_starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
