//! 同步线程的工作链表

use core::ptr;

use alloc::{sync::Arc, vec::Vec};
use ftl_util::sync::{spin_mutex::SpinMutex, Spin};

use crate::mount::{IMntFlags, Mount};

/// `IMntFlags::ONWORKLIST` 只在持有链表锁时修改
pub(crate) struct SyncerList {
    list: SpinMutex<Vec<Arc<Mount>>, Spin>,
}

impl SyncerList {
    pub const fn new() -> Self {
        Self {
            list: SpinMutex::new(Vec::new()),
        }
    }
    pub fn add(&self, mp: &Arc<Mount>) {
        let mut list = self.list.lock();
        if mp.iflags().contains(IMntFlags::ONWORKLIST) {
            return;
        }
        mp.set_iflags(IMntFlags::ONWORKLIST);
        list.push(mp.clone());
    }
    pub fn remove(&self, mp: &Mount) {
        let old = {
            let mut list = self.list.lock();
            if !mp.iflags().contains(IMntFlags::ONWORKLIST) {
                return;
            }
            mp.clear_iflags(IMntFlags::ONWORKLIST);
            let i = list.iter().position(|m| ptr::eq(&**m, mp));
            i.map(|i| list.swap_remove(i))
        };
        drop(old);
    }
    pub fn contains(&self, mp: &Mount) -> bool {
        self.list.lock().iter().any(|m| ptr::eq(&**m, mp))
    }
    pub fn snapshot(&self) -> Vec<Arc<Mount>> {
        self.list.lock().clone()
    }
}
