//! 挂载点
//!
//! 挂载点由 `Arc<Mount>` 管理引用计数, 注册表在挂载期间持有其中一个引用.
//! 引用计数归零时在 `Drop` 中销毁附加数据, 释放文件系统类型并注销事务准入,
//! 这只会发生在挂载点离开注册表之后.
//!
//! 除引用计数和标志位外, 每个字段都由对应的锁保护:
//!
//! - `vnodes`: 此挂载点的vnode链表
//! - `updating`: 串行化 mount/unmount/sync, 标志位只在持有它时修改
//! - `renamelock`: 串行化跨目录rename
//!
//! 后两者是睡眠锁, 持有期间会进入文件系统.

pub mod domount;
pub mod iter;
pub mod manager;
pub mod specific;
pub mod unmount;

use core::{
    any::Any,
    fmt,
    ops::Deref,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use alloc::{string::ToString, sync::Arc};
use ftl_util::{
    error::{SysError, SysR},
    list::ArenaList,
    sync::{
        sleep_mutex::{SleepMutex, SleepMutexGuard},
        spin_mutex::SpinMutex,
        Spin,
    },
};

use crate::{
    config::VfsConfig,
    fssp::{FsTypeRef, StatVfs},
    fstrans::TransactionGate,
    vnode::{VnodeEntry, VnodeRef},
};

use self::specific::{SpecificDomain, SpecificKey, SpecificTable, SpecificValue};

bitflags! {
    /// 挂载标志, 数值与BSD保持一致
    pub struct MntFlags: u32 {
        const RDONLY = 0x0000_0001;
        const SYNCHRONOUS = 0x0000_0002;
        const NOEXEC = 0x0000_0004;
        const NOSUID = 0x0000_0008;
        const NODEV = 0x0000_0010;
        const UNION = 0x0000_0020;
        const ASYNC = 0x0000_0040;
        const EXPORTED = 0x0000_0100;
        const LOCAL = 0x0000_1000;
        const ROOTFS = 0x0000_4000;
        const NOCOREDUMP = 0x0000_8000;
        const UPDATE = 0x0001_0000;
        const RELOAD = 0x0004_0000;
        const FORCE = 0x0008_0000;
        const IGNORE = 0x0010_0000;
        const GETARGS = 0x0040_0000;
        const EXTATTR = 0x0100_0000;
    }
}

impl MntFlags {
    /// 用户可以在挂载时设置的标志
    pub const BASIC: MntFlags = MntFlags::from_bits_truncate(
        MntFlags::RDONLY.bits()
            | MntFlags::SYNCHRONOUS.bits()
            | MntFlags::NOEXEC.bits()
            | MntFlags::NOSUID.bits()
            | MntFlags::NODEV.bits()
            | MntFlags::UNION.bits()
            | MntFlags::ASYNC.bits()
            | MntFlags::NOCOREDUMP.bits()
            | MntFlags::EXTATTR.bits(),
    );
    /// 只在一次操作期间有效, 操作结束后清除
    pub const OP: MntFlags = MntFlags::from_bits_truncate(
        MntFlags::UPDATE.bits()
            | MntFlags::RELOAD.bits()
            | MntFlags::FORCE.bits()
            | MntFlags::GETARGS.bits(),
    );
}

bitflags! {
    /// 挂载点内部状态
    pub struct IMntFlags: u32 {
        /// 已经卸载, 此后 busy 永远失败, 不会再清除
        const GONE = 0x1;
        /// 卸载进行中
        const UNMOUNT = 0x2;
        /// 位于同步线程的工作链表
        const ONWORKLIST = 0x8;
    }
}

pub struct Mount {
    /// 创建时分配, 单调递增
    gen: u64,
    op: FsTypeRef,
    gate: Arc<dyn TransactionGate>,
    /// 是否已经向事务准入注册
    fstrans: AtomicBool,
    flag: AtomicU32,
    iflag: AtomicU32,
    /// 被覆盖的目录, 根文件系统为None
    covered: SpinMutex<Option<VnodeRef>, Spin>,
    pub(crate) vnodes: SpinMutex<ArenaList<VnodeEntry>, Spin>,
    renamelock: SleepMutex<()>,
    updating: SleepMutex<()>,
    specific: SpecificTable,
    stat: SpinMutex<StatVfs, Spin>,
    /// 文件系统私有数据
    data: SpinMutex<Option<Arc<dyn Any + Send + Sync>>, Spin>,
    pub(crate) flush_retries: usize,
    pub(crate) flush_yield: fn(),
}

impl Drop for Mount {
    fn drop(&mut self) {
        // vnode持有挂载点引用, 走到这里链表一定为空
        debug_assert_eq!(self.vnodes.get_mut().count_unmarked(), 0);
        self.specific.fini();
        if *self.fstrans.get_mut() {
            self.gate.unmount(self);
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("gen", &self.gen)
            .field("type", &self.op.name())
            .field("flag", &self.flags())
            .field("iflag", &self.iflags())
            .finish()
    }
}

impl Mount {
    pub(crate) fn new(
        gen: u64,
        op: FsTypeRef,
        covered: Option<VnodeRef>,
        gate: Arc<dyn TransactionGate>,
        domain: Arc<SpecificDomain>,
        config: &VfsConfig,
    ) -> SysR<Arc<Self>> {
        let stat = StatVfs {
            fstypename: op.name().to_string(),
            ..StatVfs::default()
        };
        let mp = Arc::new(Self {
            gen,
            op,
            gate,
            fstrans: AtomicBool::new(false),
            flag: AtomicU32::new(0),
            iflag: AtomicU32::new(0),
            covered: SpinMutex::new(covered),
            vnodes: SpinMutex::new(ArenaList::new()),
            renamelock: SleepMutex::new((), config.lock_wait),
            updating: SleepMutex::new((), config.lock_wait),
            specific: SpecificTable::new(domain),
            stat: SpinMutex::new(stat),
            data: SpinMutex::new(None),
            flush_retries: config.flush_retries,
            flush_yield: config.flush_yield,
        });
        mp.gate.mount(&mp)?;
        mp.fstrans.store(true, Ordering::Release);
        Ok(mp)
    }
    pub fn gen(&self) -> u64 {
        self.gen
    }
    /// 文件系统类型
    pub fn op(&self) -> &FsTypeRef {
        &self.op
    }
    pub fn flags(&self) -> MntFlags {
        MntFlags::from_bits_truncate(self.flag.load(Ordering::Acquire))
    }
    pub fn set_flags(&self, f: MntFlags) {
        self.flag.fetch_or(f.bits(), Ordering::AcqRel);
    }
    pub fn clear_flags(&self, f: MntFlags) {
        self.flag.fetch_and(!f.bits(), Ordering::AcqRel);
    }
    pub fn iflags(&self) -> IMntFlags {
        IMntFlags::from_bits_truncate(self.iflag.load(Ordering::Acquire))
    }
    pub(crate) fn set_iflags(&self, f: IMntFlags) {
        self.iflag.fetch_or(f.bits(), Ordering::AcqRel);
    }
    pub(crate) fn clear_iflags(&self, f: IMntFlags) {
        debug_assert!(!f.contains(IMntFlags::GONE));
        self.iflag.fetch_and(!f.bits(), Ordering::AcqRel);
    }
    pub fn is_gone(&self) -> bool {
        self.iflags().contains(IMntFlags::GONE)
    }
    pub fn is_unmounting(&self) -> bool {
        self.iflags().contains(IMntFlags::UNMOUNT)
    }
    pub fn is_rdonly(&self) -> bool {
        self.flags().contains(MntFlags::RDONLY)
    }
    pub fn covered(&self) -> Option<VnodeRef> {
        self.covered.lock().clone()
    }
    pub(crate) fn take_covered(&self) -> Option<VnodeRef> {
        self.covered.lock().take()
    }
    /// 持有期间会调用文件系统的 mount/sync/unmount
    pub fn lock_updating(&self) -> SleepMutexGuard<'_, ()> {
        self.updating.lock()
    }
    pub fn lock_rename(&self) -> SleepMutexGuard<'_, ()> {
        self.renamelock.lock()
    }
    /// 链表中vnode的数量, 不包括迭代器标记
    pub fn vnode_count(&self) -> usize {
        self.vnodes.lock().count_unmarked()
    }
    pub fn get_specific(&self, key: SpecificKey) -> Option<SpecificValue> {
        self.specific.get(key)
    }
    /// 返回旧的值
    pub fn set_specific(
        &self,
        key: SpecificKey,
        value: Option<SpecificValue>,
    ) -> SysR<Option<SpecificValue>> {
        self.specific.set(key, value)
    }
    pub fn set_data(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.data.lock() = data;
    }
    pub fn data_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.data.lock().clone()?;
        data.downcast::<T>().ok()
    }
    pub fn stat(&self) -> StatVfs {
        self.stat.lock().clone()
    }
    pub(crate) fn set_names(&self, on: &str, from: &str) {
        let mut stat = self.stat.lock();
        stat.mntonname = on.to_string();
        stat.mntfromname = from.to_string();
    }
    pub(crate) fn set_owner(&self, uid: u32) {
        self.stat.lock().owner = uid;
    }
    /// 从文件系统重新读取统计信息, 名字和所有者保持不变
    pub fn refresh_stat(self: &Arc<Self>) -> SysR<()> {
        let mut new = self.op.statvfs(self)?;
        let mut stat = self.stat.lock();
        new.flag = self.flags().bits();
        new.owner = stat.owner;
        new.fstypename = core::mem::take(&mut stat.fstypename);
        new.mntonname = core::mem::take(&mut stat.mntonname);
        new.mntfromname = core::mem::take(&mut stat.mntfromname);
        *stat = new;
        Ok(())
    }
    /// 阻塞直到事务准入, 挂载点已卸载时返回ENOENT
    ///
    /// 成功后在 `MountBusy` 释放之前挂载点不会完成卸载
    pub fn busy(self: &Arc<Self>) -> SysR<MountBusy> {
        self.busy_impl(true)
    }
    /// 不能立即准入时返回EBUSY, 挂载点已卸载时返回ENOENT
    pub fn trybusy(self: &Arc<Self>) -> SysR<MountBusy> {
        self.busy_impl(false)
    }
    fn busy_impl(self: &Arc<Self>, wait: bool) -> SysR<MountBusy> {
        if wait {
            self.gate.enter(self);
        } else if !self.gate.try_enter(self) {
            return Err(SysError::EBUSY);
        }
        if self.is_gone() {
            self.gate.leave(self);
            return Err(SysError::ENOENT);
        }
        Ok(MountBusy { mp: self.clone() })
    }
}

/// 一次成功的 busy, 释放时结束事务并释放引用
pub struct MountBusy {
    mp: Arc<Mount>,
}

impl MountBusy {
    pub fn mount(&self) -> &Arc<Mount> {
        &self.mp
    }
    pub fn unbusy(self) {}
}

impl Deref for MountBusy {
    type Target = Arc<Mount>;
    fn deref(&self) -> &Self::Target {
        &self.mp
    }
}

impl Drop for MountBusy {
    fn drop(&mut self) {
        self.mp.gate.leave(&self.mp);
    }
}
