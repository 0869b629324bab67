//! vnode
//!
//! 这里只实现挂载核心需要的部分: 引用计数, 生命周期状态, 所属挂载点的链表成员关系和回收.
//!
//! 锁顺序: `Vnode::mnt` -> `Mount::vnodes` -> `Vnode::interlock`

pub mod flush;
pub mod iter;

use core::{
    any::Any,
    fmt,
    ops::Deref,
    ptr,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};

use alloc::sync::Arc;
use ftl_util::{
    error::{SysError, SysR},
    list::{ListIndex, Marked},
    sync::{spin_mutex::SpinMutex, Spin},
};

use crate::mount::Mount;

bitflags! {
    pub struct VnodeFlags: u32 {
        /// 文件系统的根
        const ROOT = 0x1;
        /// 文件系统内部使用, vflush 可以跳过
        const SYSTEM = 0x2;
        /// 被强制卸载后转为匿名设备
        const ANONDEV = 0x4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VType {
    Non,
    Reg,
    Dir,
    Blk,
    Chr,
    Lnk,
    Sock,
    Fifo,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VState {
    Loading,
    Active,
    Reclaiming,
    Reclaimed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VnodeAttr {
    pub nlink: u32,
    pub size: u64,
}

/// vnode操作, 由文件系统实现
pub trait VnodeOps: Send + Sync + 'static {
    fn fsync(&self, _vp: &Vnode) -> SysR<()> {
        Ok(())
    }
    fn getattr(&self, vp: &Vnode) -> SysR<VnodeAttr>;
    /// 释放文件系统私有状态, 之后vnode不再属于这个文件系统
    fn reclaim(&self, _vp: &Vnode) -> SysR<()> {
        Ok(())
    }
}

/// 设备vnode被强制卸载后使用的操作
struct AnonDevOps;

impl VnodeOps for AnonDevOps {
    fn getattr(&self, _vp: &Vnode) -> SysR<VnodeAttr> {
        Ok(VnodeAttr { nlink: 1, size: 0 })
    }
}

pub(crate) enum VnodeEntry {
    Vnode(Arc<Vnode>),
    Marker,
}

impl Marked for VnodeEntry {
    fn is_marker(&self) -> bool {
        matches!(self, VnodeEntry::Marker)
    }
}

struct VnodeInner {
    state: VState,
    /// 挂载在此目录上的文件系统
    mountedhere: Option<Arc<Mount>>,
    ops: Arc<dyn VnodeOps>,
    data: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
struct VnodeMnt {
    mount: Option<Arc<Mount>>,
    slot: Option<ListIndex>,
}

pub struct Vnode {
    vtype: VType,
    vflag: AtomicU32,
    usecount: AtomicUsize,
    writecount: AtomicUsize,
    interlock: SpinMutex<VnodeInner, Spin>,
    mnt: SpinMutex<VnodeMnt, Spin>,
}

impl fmt::Debug for Vnode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vnode")
            .field("type", &self.vtype)
            .field("flag", &self.flags())
            .field("usecount", &self.usecount())
            .finish()
    }
}

impl Vnode {
    /// 新建一个已经可以使用的vnode
    pub fn new(vtype: VType, ops: Arc<dyn VnodeOps>) -> VnodeRef {
        Self::with_state(vtype, ops, VState::Active)
    }
    /// 新建一个正在加载的vnode, 加载完成后调用 `finish_load`
    pub fn new_loading(vtype: VType, ops: Arc<dyn VnodeOps>) -> VnodeRef {
        Self::with_state(vtype, ops, VState::Loading)
    }
    fn with_state(vtype: VType, ops: Arc<dyn VnodeOps>, state: VState) -> VnodeRef {
        VnodeRef(Arc::new(Self {
            vtype,
            vflag: AtomicU32::new(0),
            usecount: AtomicUsize::new(1),
            writecount: AtomicUsize::new(0),
            interlock: SpinMutex::new(VnodeInner {
                state,
                mountedhere: None,
                ops,
                data: None,
            }),
            mnt: SpinMutex::new(VnodeMnt::default()),
        }))
    }
    pub fn finish_load(&self) {
        let mut inner = self.interlock.lock();
        debug_assert_eq!(inner.state, VState::Loading);
        inner.state = VState::Active;
    }
    pub fn vtype(&self) -> VType {
        self.vtype
    }
    pub fn flags(&self) -> VnodeFlags {
        VnodeFlags::from_bits_truncate(self.vflag.load(Ordering::Acquire))
    }
    pub fn set_flags(&self, f: VnodeFlags) {
        self.vflag.fetch_or(f.bits(), Ordering::AcqRel);
    }
    pub fn usecount(&self) -> usize {
        self.usecount.load(Ordering::Acquire)
    }
    pub fn writecount(&self) -> usize {
        self.writecount.load(Ordering::Acquire)
    }
    pub fn open_write(&self) {
        self.writecount.fetch_add(1, Ordering::AcqRel);
    }
    pub fn close_write(&self) {
        let v = self.writecount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(v != 0);
    }
    pub fn state(&self) -> VState {
        self.interlock.lock().state
    }
    pub fn is_dead(&self) -> bool {
        self.state() == VState::Reclaimed
    }
    pub fn same(&self, other: &Vnode) -> bool {
        ptr::eq(self, other)
    }
    pub fn ops(&self) -> Arc<dyn VnodeOps> {
        self.interlock.lock().ops.clone()
    }
    pub fn data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.interlock.lock().data.clone()
    }
    pub fn set_data(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        self.interlock.lock().data = data;
    }
    /// 所属的挂载点
    pub fn mount(&self) -> Option<Arc<Mount>> {
        self.mnt.lock().mount.clone()
    }
    pub fn mountedhere(&self) -> Option<Arc<Mount>> {
        self.interlock.lock().mountedhere.clone()
    }
    /// 返回旧值
    pub fn set_mountedhere(&self, mp: Option<Arc<Mount>>) -> Option<Arc<Mount>> {
        core::mem::replace(&mut self.interlock.lock().mountedhere, mp)
    }
    /// 目录上已经有挂载点时返回EBUSY
    pub fn try_set_mountedhere(&self, mp: &Arc<Mount>) -> SysR<()> {
        let mut inner = self.interlock.lock();
        if inner.mountedhere.is_some() {
            return Err(SysError::EBUSY);
        }
        inner.mountedhere = Some(mp.clone());
        Ok(())
    }
    /// 只在覆盖者是 mp 时清除, 返回旧值
    pub fn clear_mountedhere(&self, mp: &Mount) -> Option<Arc<Mount>> {
        let mut inner = self.interlock.lock();
        let hit = inner
            .mountedhere
            .as_ref()
            .map_or(false, |m| core::ptr::eq(&**m, mp));
        if hit {
            inner.mountedhere.take()
        } else {
            None
        }
    }
    /// 对挂载点链表中的vnode取得一个引用
    ///
    /// 正在加载或回收时返回EAGAIN, 已经回收时返回ENOENT
    pub(crate) fn try_get(this: &Arc<Self>) -> SysR<VnodeRef> {
        let inner = this.interlock.lock();
        match inner.state {
            VState::Active => {
                this.usecount.fetch_add(1, Ordering::AcqRel);
                Ok(VnodeRef(this.clone()))
            }
            VState::Loading | VState::Reclaiming => Err(SysError::EAGAIN),
            VState::Reclaimed => Err(SysError::ENOENT),
        }
    }
}

/// 持有一个vnode使用计数
pub struct VnodeRef(Arc<Vnode>);

impl VnodeRef {
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
    /// 把vnode移动到另一个挂载点的链表, None表示只从原链表移除
    pub fn insmntque(&self, mp: Option<&Arc<Mount>>) {
        let old = {
            let mut mnt = self.0.mnt.lock();
            let old = mnt.mount.take();
            if let (Some(omp), Some(slot)) = (&old, mnt.slot.take()) {
                omp.vnodes.lock().remove(slot);
            }
            if let Some(mp) = mp {
                let slot = mp.vnodes.lock().push_back(VnodeEntry::Vnode(self.0.clone()));
                mnt.slot = Some(slot);
                mnt.mount = Some(mp.clone());
            }
            old
        };
        // 可能是挂载点的最后一个引用, 在锁外释放
        drop(old);
    }
    /// 只有调用者持有唯一的引用时才回收, 否则原样返回
    pub fn vrecycle(self) -> Result<(), VnodeRef> {
        let doit = {
            let mut inner = self.0.interlock.lock();
            if inner.state == VState::Active && self.usecount() == 1 {
                inner.state = VState::Reclaiming;
                true
            } else {
                false
            }
        };
        if !doit {
            return Err(self);
        }
        self.reclaim();
        Ok(())
    }
    /// 不管是否还有其他引用都回收
    pub fn vgone(self) {
        let doit = {
            let mut inner = self.0.interlock.lock();
            match inner.state {
                VState::Active | VState::Loading => {
                    inner.state = VState::Reclaiming;
                    true
                }
                VState::Reclaiming | VState::Reclaimed => false,
            }
        };
        if doit {
            self.reclaim();
        }
    }
    fn reclaim(&self) {
        let ops = self.ops();
        if let Err(e) = ops.reclaim(self) {
            warn!("vnode reclaim failed: {:?}", e);
        }
        {
            let mut inner = self.0.interlock.lock();
            inner.state = VState::Reclaimed;
            inner.data = None;
        }
        self.insmntque(None);
    }
    /// 设备vnode离开文件系统, 继续作为匿名设备存在
    pub fn revoke_to_anon(self) {
        debug_assert!(matches!(self.vtype(), VType::Blk | VType::Chr));
        let ops = self.ops();
        if let Err(e) = ops.reclaim(&self) {
            warn!("device vnode reclaim failed: {:?}", e);
        }
        {
            let mut inner = self.0.interlock.lock();
            inner.ops = Arc::new(AnonDevOps);
            inner.data = None;
        }
        self.set_flags(VnodeFlags::ANONDEV);
        self.insmntque(None);
    }
}

impl Clone for VnodeRef {
    fn clone(&self) -> Self {
        self.0.usecount.fetch_add(1, Ordering::AcqRel);
        Self(self.0.clone())
    }
}

impl Drop for VnodeRef {
    fn drop(&mut self) {
        let v = self.0.usecount.fetch_sub(1, Ordering::Release);
        debug_assert!(v != 0);
    }
}

impl Deref for VnodeRef {
    type Target = Vnode;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for VnodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
