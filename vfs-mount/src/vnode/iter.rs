//! 挂载点vnode链表的迭代器
//!
//! 和注册表迭代器一样使用标记节点记录位置. 迭代结束时标记立即移出链表,
//! 之后 `next` 只返回None.

use ftl_util::{error::SysError, list::ListIndex};

use crate::mount::Mount;

use super::{VState, Vnode, VnodeEntry, VnodeRef};

pub struct VnodeIter<'a> {
    mp: &'a Mount,
    marker: Option<ListIndex>,
}

impl<'a> VnodeIter<'a> {
    pub(crate) fn new(mp: &'a Mount) -> Self {
        let marker = mp.vnodes.lock().push_front(VnodeEntry::Marker);
        Self {
            mp,
            marker: Some(marker),
        }
    }
    /// 跳过正在加载或回收的vnode
    ///
    /// `filter` 在持有vnode interlock时调用, 只能访问原子字段
    pub fn next(&mut self, filter: impl FnMut(&Vnode) -> bool) -> Option<VnodeRef> {
        self.next_impl(filter, false)
    }
    /// 遇到正在加载或回收的vnode时等待它完成
    pub fn next_wait(&mut self, filter: impl FnMut(&Vnode) -> bool) -> Option<VnodeRef> {
        self.next_impl(filter, true)
    }
    fn next_impl(
        &mut self,
        mut filter: impl FnMut(&Vnode) -> bool,
        wait: bool,
    ) -> Option<VnodeRef> {
        let marker = self.marker?;
        loop {
            let (slot, vp) = {
                let mut list = self.mp.vnodes.lock();
                let mut cur = list.next_unmarked(marker);
                let found = loop {
                    let i = match cur {
                        Some(i) => i,
                        None => break None,
                    };
                    let vp = match list.get(i) {
                        Some(VnodeEntry::Vnode(vp)) => vp.clone(),
                        _ => unreachable!(),
                    };
                    let skip = {
                        let inner = vp.interlock.lock();
                        match inner.state {
                            VState::Reclaimed => true,
                            VState::Loading | VState::Reclaiming if !wait => true,
                            _ => !filter(&*vp),
                        }
                    };
                    if !skip {
                        list.move_after(marker, i);
                        break Some((i, vp));
                    }
                    cur = list.next_unmarked(i);
                };
                match found {
                    Some(x) => x,
                    None => {
                        list.remove(marker);
                        self.marker = None;
                        return None;
                    }
                }
            };
            match Vnode::try_get(&vp) {
                Ok(vp) => return Some(vp),
                Err(SysError::EAGAIN) => {
                    // 正在加载或回收, 回到它之前等待
                    let mut list = self.mp.vnodes.lock();
                    if list.contains(slot) {
                        list.move_before(marker, slot);
                    }
                    drop(list);
                    core::hint::spin_loop();
                }
                Err(_) => (),
            }
        }
    }
}

impl Drop for VnodeIter<'_> {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            self.mp.vnodes.lock().remove(marker);
        }
    }
}

impl Mount {
    pub fn vnode_iter(&self) -> VnodeIter<'_> {
        VnodeIter::new(self)
    }
}
