use core::ptr;

use alloc::{sync::Arc, vec::Vec};
use ftl_util::{
    list::{ArenaList, Marked},
    sync::{spin_mutex::SpinMutex, Spin},
};

use super::{iter::MountIter, Mount};

pub(crate) enum MountEntry {
    Mount(Arc<Mount>),
    /// 迭代器位置
    Marker,
}

impl Marked for MountEntry {
    fn is_marker(&self) -> bool {
        matches!(self, MountEntry::Marker)
    }
}

/// 全局挂载点注册表, 按挂载顺序排列
///
/// 每个表项持有挂载点的一个引用, 直到 `remove` 把它交还给调用者
pub struct MountManager {
    pub(crate) mounts: SpinMutex<ArenaList<MountEntry>, Spin>,
    gen: SpinMutex<u64, Spin>,
}

impl MountManager {
    pub const fn new() -> Self {
        Self {
            mounts: SpinMutex::new(ArenaList::new()),
            gen: SpinMutex::new(0),
        }
    }
    pub(crate) fn alloc_gen(&self) -> u64 {
        let mut gen = self.gen.lock();
        let v = *gen;
        *gen += 1;
        v
    }
    /// 下一个分配的代数, 比所有已存在的挂载点都大
    pub fn current_gen(&self) -> u64 {
        *self.gen.lock()
    }
    pub fn append(&self, mp: &Arc<Mount>) {
        trace!("mountlist: append gen {}", mp.gen());
        self.mounts.lock().push_back(MountEntry::Mount(mp.clone()));
    }
    /// 返回注册表持有的引用, 挂载点不在表中是调用者的错误
    pub fn remove(&self, mp: &Mount) -> Arc<Mount> {
        let removed = {
            let mut list = self.mounts.lock();
            list.position(|e| matches!(e, MountEntry::Mount(m) if ptr::eq(&**m, mp)))
                .and_then(|i| list.remove(i))
        };
        match removed {
            Some(MountEntry::Mount(m)) => {
                trace!("mountlist: remove gen {}", m.gen());
                m
            }
            _ => panic!("mountlist_remove: gen {} not found", mp.gen()),
        }
    }
    pub fn contains(&self, mp: &Mount) -> bool {
        self.mounts
            .lock()
            .position(|e| matches!(e, MountEntry::Mount(m) if ptr::eq(&**m, mp)))
            .is_some()
    }
    pub fn count(&self) -> usize {
        self.mounts.lock().count_unmarked()
    }
    pub fn first(&self) -> Option<Arc<Mount>> {
        let list = self.mounts.lock();
        list.iter().find_map(|(_, e)| match e {
            MountEntry::Mount(m) => Some(m.clone()),
            MountEntry::Marker => None,
        })
    }
    /// 代数小于 gen 的挂载点中最新的一个
    pub fn next_below(&self, gen: u64) -> Option<Arc<Mount>> {
        let list = self.mounts.lock();
        let mut best: Option<&Arc<Mount>> = None;
        for (_, e) in list.iter() {
            if let MountEntry::Mount(m) = e {
                if m.gen() < gen && best.map_or(true, |b| b.gen() < m.gen()) {
                    best = Some(m);
                }
            }
        }
        best.cloned()
    }
    /// 当前注册的所有挂载点
    pub fn snapshot(&self) -> Vec<Arc<Mount>> {
        let list = self.mounts.lock();
        list.iter()
            .filter_map(|(_, e)| match e {
                MountEntry::Mount(m) => Some(m.clone()),
                MountEntry::Marker => None,
            })
            .collect()
    }
    pub fn iter(&self) -> MountIter<'_> {
        MountIter::new(self)
    }
}

impl Default for MountManager {
    fn default() -> Self {
        Self::new()
    }
}
