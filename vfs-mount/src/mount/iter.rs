//! 注册表迭代器
//!
//! 迭代器在注册表中放置一个标记, 每次前进时把标记移动到返回的挂载点之后.
//! 其他线程可以在迭代期间任意插入删除挂载点, 迭代器只会返回在它到达时仍然注册的挂载点.

use alloc::sync::Arc;
use ftl_util::list::ListIndex;

use super::{
    manager::{MountEntry, MountManager},
    Mount, MountBusy,
};

pub struct MountIter<'a> {
    manager: &'a MountManager,
    marker: ListIndex,
    /// 上一次返回的挂载点, 下一次前进或者迭代器释放时 unbusy
    current: Option<MountBusy>,
}

impl<'a> MountIter<'a> {
    pub(super) fn new(manager: &'a MountManager) -> Self {
        let marker = manager.mounts.lock().push_front(MountEntry::Marker);
        Self {
            manager,
            marker,
            current: None,
        }
    }
    /// 上一次返回的挂载点
    pub fn current(&self) -> Option<&Arc<Mount>> {
        self.current.as_ref().map(|b| b.mount())
    }
    /// 返回下一个成功 busy 的挂载点, busy 失败的挂载点被跳过
    pub fn next_mount(&mut self, wait: bool) -> Option<Arc<Mount>> {
        if let Some(prev) = self.current.take() {
            prev.unbusy();
        }
        loop {
            let mp = {
                let mut list = self.manager.mounts.lock();
                match list.next_unmarked(self.marker) {
                    None => {
                        list.move_to_back(self.marker);
                        return None;
                    }
                    Some(i) => {
                        list.move_after(self.marker, i);
                        match list.get(i) {
                            Some(MountEntry::Mount(mp)) => mp.clone(),
                            _ => unreachable!(),
                        }
                    }
                }
            };
            let busy = if wait { mp.busy() } else { mp.trybusy() };
            match busy {
                Ok(b) => {
                    self.current = Some(b);
                    return Some(mp);
                }
                Err(e) => trace!("mountlist iterator: skip gen {} {:?}", mp.gen(), e),
            }
        }
    }
    pub fn next_nowait(&mut self) -> Option<Arc<Mount>> {
        self.next_mount(false)
    }
    /// 等价于释放迭代器
    pub fn destroy(self) {}
}

impl Iterator for MountIter<'_> {
    type Item = Arc<Mount>;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_mount(true)
    }
}

impl Drop for MountIter<'_> {
    fn drop(&mut self) {
        self.current.take();
        self.manager.mounts.lock().remove(self.marker);
    }
}
