//! 挂载核心的全局状态
//!
//! `VfsManager` 持有文件系统类型表, 挂载点注册表, 同步线程工作链表和进程表,
//! 挂载和卸载的各个步骤都作为它的方法实现.

use core::sync::atomic::{AtomicBool, Ordering};

use alloc::{sync::Arc, vec::Vec};
use ftl_util::{
    error::{SysError, SysR},
    sync::{spin_mutex::SpinMutex, Spin},
};

use crate::{
    config::VfsConfig,
    cred::Cred,
    fssp::{ExtAttrCmd, FsModuleLoader, FsTypeRef, FsTypeTable, VfsOps},
    fstrans::TransactionGate,
    mount::{
        manager::MountManager,
        specific::{SpecificDomain, SpecificDtor, SpecificKey},
        MntFlags, Mount, MountBusy,
    },
    proc::{CwdInfo, ProcTable},
    syncer::SyncerList,
    vnode::{Vnode, VnodeRef},
};

/// 名字缓存, 挂载和卸载时需要清除相关的项
pub trait NameCache: Send + Sync + 'static {
    /// 清除属于这个挂载点的所有项
    fn purge_vfs(&self, mp: &Mount);
    /// 清除以这个vnode为父目录或目标的项
    fn purge(&self, vp: &Vnode);
}

pub struct NoNameCache;

impl NameCache for NoNameCache {
    fn purge_vfs(&self, _mp: &Mount) {}
    fn purge(&self, _vp: &Vnode) {}
}

pub trait Authorizer: Send + Sync + 'static {
    fn authorize_mount(&self, cred: &Cred, vp: &Vnode, flags: MntFlags) -> SysR<()>;
}

/// 允许所有操作
pub struct PermitAll;

impl Authorizer for PermitAll {
    fn authorize_mount(&self, _cred: &Cred, _vp: &Vnode, _flags: MntFlags) -> SysR<()> {
        Ok(())
    }
}

pub struct VfsManager {
    config: VfsConfig,
    pub(crate) gate: Arc<dyn TransactionGate>,
    fstypes: FsTypeTable,
    pub(crate) mounts: MountManager,
    specific: Arc<SpecificDomain>,
    pub(crate) syncer: SyncerList,
    pub(crate) procs: ProcTable,
    pub(crate) namecache: Arc<dyn NameCache>,
    pub(crate) auth: Arc<dyn Authorizer>,
    loader: Option<Arc<dyn FsModuleLoader>>,
    pub(crate) rootvnode: SpinMutex<Option<VnodeRef>, Spin>,
    /// 0号进程
    cwdi0: Arc<CwdInfo>,
    module_load: AtomicBool,
}

impl VfsManager {
    pub fn new(gate: Arc<dyn TransactionGate>, config: VfsConfig) -> Self {
        let cwdi0 = CwdInfo::new(None, None);
        Self {
            config,
            gate,
            fstypes: FsTypeTable::new(),
            mounts: MountManager::new(),
            specific: Arc::new(SpecificDomain::new()),
            syncer: SyncerList::new(),
            procs: ProcTable::with_proc0(cwdi0.clone()),
            namecache: Arc::new(NoNameCache),
            auth: Arc::new(PermitAll),
            loader: None,
            rootvnode: SpinMutex::new(None),
            cwdi0,
            module_load: AtomicBool::new(false),
        }
    }
    pub fn with_namecache(mut self, namecache: Arc<dyn NameCache>) -> Self {
        self.namecache = namecache;
        self
    }
    pub fn with_authorizer(mut self, auth: Arc<dyn Authorizer>) -> Self {
        self.auth = auth;
        self
    }
    pub fn with_loader(mut self, loader: Arc<dyn FsModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }
    pub fn mounts(&self) -> &MountManager {
        &self.mounts
    }
    pub fn procs(&self) -> &ProcTable {
        &self.procs
    }
    pub fn cwdi0(&self) -> &Arc<CwdInfo> {
        &self.cwdi0
    }
    pub fn rootvnode(&self) -> Option<VnodeRef> {
        self.rootvnode.lock().clone()
    }
    pub fn module_load_enabled(&self) -> bool {
        self.module_load.load(Ordering::Acquire)
    }
    pub fn on_syncer_list(&self, mp: &Mount) -> bool {
        self.syncer.contains(mp)
    }
    pub fn attach(&self, ops: Arc<dyn VfsOps>) -> SysR<()> {
        let name = ops.name();
        let r = self.fstypes.attach(ops.clone());
        match r {
            Ok(()) => info!("vfs: attach {}", name),
            Err(e) => warn!("vfs: attach {} failed {:?}", name, e),
        }
        r
    }
    /// 仍有挂载点使用时返回EBUSY
    pub fn detach(&self, name: &str) -> SysR<()> {
        self.fstypes.detach(name)?;
        info!("vfs: detach {}", name);
        Ok(())
    }
    /// 模块加载开启后, 找不到的类型会尝试加载一次
    pub fn lookup_fstype(&self, name: &str) -> SysR<FsTypeRef> {
        if let Some(op) = self.fstypes.get(name) {
            return Ok(op);
        }
        if !self.module_load_enabled() {
            return Err(SysError::ENODEV);
        }
        let loader = self.loader.as_ref().ok_or(SysError::ENODEV)?;
        if let Err(e) = loader.load(self, name) {
            debug!("vfs: load module {} failed {:?}", name, e);
            return Err(SysError::ENODEV);
        }
        self.fstypes.get(name).ok_or(SysError::ENODEV)
    }
    pub fn specific_key_create(&self, dtor: Option<SpecificDtor>) -> SysR<SpecificKey> {
        self.specific.key_create(dtor)
    }
    pub fn specific_key_delete(&self, key: SpecificKey) -> SysR<()> {
        self.specific.key_delete(key)
    }
    /// 分配一个新的挂载点, 返回的引用是唯一的
    pub fn mount_alloc(&self, op: FsTypeRef, covered: Option<VnodeRef>) -> SysR<Arc<Mount>> {
        let gen = self.mounts.alloc_gen();
        Mount::new(
            gen,
            op,
            covered,
            self.gate.clone(),
            self.specific.clone(),
            &self.config,
        )
    }
    /// 为根文件系统分配一个只读挂载点, 返回时已经 busy
    pub fn rootmountalloc(&self, fstype: &str, devname: &str) -> SysR<MountBusy> {
        let op = self.fstypes.get(fstype).ok_or(SysError::ENODEV)?;
        let mp = self.mount_alloc(op, None)?;
        mp.set_flags(MntFlags::RDONLY);
        mp.set_names("/", devname);
        mp.busy()
    }
    /// 挂载根文件系统并设置 `rootvnode` 和0号进程的目录
    pub fn mountroot(&self) -> SysR<()> {
        if self.config.rootfstype_any() {
            self.mountroot_any()?;
        } else {
            let name = self.config.rootfstype.as_str();
            let op = match self.fstypes.get(name) {
                Some(op) if op.has_mountroot() => op,
                _ => {
                    warn!("mountroot: {} not configured", name);
                    return Err(SysError::ENODEV);
                }
            };
            if let Err(e) = op.mountroot(self) {
                warn!("mountroot: {} failed {:?}", name, e);
                return Err(e);
            }
        }
        let mp = self.mounts.first().ok_or(SysError::ENODEV)?;
        mp.set_flags(MntFlags::ROOTFS);
        let root = match mp.op().root(&mp) {
            Ok(vp) => vp,
            Err(e) => panic!("cannot find root vnode, error={:?}", e),
        };
        let old = [
            self.cwdi0.set_cdir(Some(root.clone())),
            self.cwdi0.set_rdir(Some(root.clone())),
            self.rootvnode.lock().replace(root),
        ];
        drop(old);
        self.module_load.store(true, Ordering::Release);
        info!("root file system type: {}", mp.op().name());
        Ok(())
    }
    fn mountroot_any(&self) -> SysR<()> {
        for op in self.fstypes.snapshot() {
            if !op.has_mountroot() {
                continue;
            }
            debug!("mountroot: trying {}", op.name());
            match op.mountroot(self) {
                Ok(()) => return Ok(()),
                Err(e) => debug!("mountroot: {} failed {:?}", op.name(), e),
            }
        }
        warn!(
            "no file system for root, supported file systems: {:?}",
            self.fstypes.names()
        );
        Err(SysError::ENODEV)
    }
    /// 从最新的挂载点开始依次卸载, 有挂载点被卸载时返回true
    pub fn unmountall(&self, force: bool) -> bool {
        let verbose = self.config.verbose_unmount;
        let flags = if force {
            MntFlags::FORCE
        } else {
            MntFlags::empty()
        };
        let mut gen = self.mounts.current_gen();
        let mut progress = false;
        let mut any_error = false;
        while let Some(mp) = self.mounts.next_below(gen) {
            gen = mp.gen();
            let stat = mp.stat();
            if verbose {
                info!("unmounting {} ({})...", stat.mntonname, stat.mntfromname);
            }
            match self.dounmount(&mp, flags, &Cred::KERNEL) {
                Ok(()) => progress = true,
                Err(e) => {
                    if verbose {
                        warn!("unmount of {} failed with error {:?}", stat.mntonname, e);
                    }
                    any_error = true;
                }
            }
        }
        if verbose {
            info!("unmounting done");
        }
        if any_error && verbose {
            warn!("some file systems would not unmount");
        }
        progress
    }
    /// 强制卸载最新的一个挂载点
    pub fn unmount_forceone(&self) -> bool {
        let mp = match self.mounts.next_below(self.mounts.current_gen()) {
            Some(mp) => mp,
            None => return false,
        };
        let stat = mp.stat();
        info!(
            "forcefully unmounting {} ({})...",
            stat.mntonname, stat.mntfromname
        );
        match self.dounmount(&mp, MntFlags::FORCE, &Cred::KERNEL) {
            Ok(()) => {
                info!("forcefully unmounted {}", stat.mntonname);
                true
            }
            Err(e) => {
                warn!(
                    "forceful unmount of {} failed with error {:?}",
                    stat.mntonname, e
                );
                false
            }
        }
    }
    /// sync(2): 同步所有可写的挂载点
    pub fn sync_all(&self, cred: &Cred) {
        let mut iter = self.mounts.iter();
        while let Some(mp) = iter.next_mount(true) {
            let _updating = mp.lock_updating();
            if mp.is_rdonly() {
                continue;
            }
            let async_flag = mp.flags() & MntFlags::ASYNC;
            mp.clear_flags(MntFlags::ASYNC);
            if let Err(e) = mp.op().sync(&mp, false, cred) {
                debug!("sync: gen {} {:?}", mp.gen(), e);
            }
            mp.set_flags(async_flag);
        }
    }
    /// 同步线程的一轮: 同步工作链表上所有能立即 busy 的挂载点
    pub fn sync_pass(&self) -> usize {
        let list: Vec<Arc<Mount>> = self.syncer.snapshot();
        let mut n = 0;
        for mp in list.iter() {
            let busy = match mp.trybusy() {
                Ok(b) => b,
                Err(_) => continue,
            };
            if busy.is_rdonly() {
                continue;
            }
            match busy.op().sync(&busy, false, &Cred::KERNEL) {
                Ok(()) => n += 1,
                Err(e) => debug!("syncer: gen {} {:?}", busy.gen(), e),
            }
        }
        n
    }
    /// 启动扩展属性, 失败时清除 `EXTATTR`
    pub(crate) fn start_extattr(&self, mp: &Arc<Mount>) {
        match mp.op().extattrctl(mp, ExtAttrCmd::Start) {
            Ok(()) => mp.set_flags(MntFlags::EXTATTR),
            Err(e) => {
                warn!("mount: failed to start extattr on gen {}: {:?}", mp.gen(), e);
                mp.clear_flags(MntFlags::EXTATTR);
            }
        }
    }
}
