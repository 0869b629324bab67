//! 数组实现的双向链表
//!
//! 节点存放在arena中, 通过带世代号的 `ListIndex` 访问. 节点删除后槽位的世代号递增,
//! 旧索引全部失效, 因此持有索引的一方永远不会访问到被复用的槽位.
//!
//! 链表本身不加锁, 由使用者放在 `SpinMutex` 中保护.

use alloc::vec::Vec;

/// 节点索引, 删除后失效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListIndex {
    slot: u32,
    gen: u32,
}

/// 遍历时需要跳过的标记节点
///
/// 标记节点用来记录迭代器的位置, 其他线程在链表任意位置插入删除都不会使它失效
pub trait Marked {
    fn is_marker(&self) -> bool;
}

struct Node<T> {
    prev: Option<u32>,
    next: Option<u32>,
    data: T,
}

struct Slot<T> {
    gen: u32,
    node: Option<Node<T>>,
}

pub struct ArenaList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> Default for ArenaList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ArenaList<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }
    /// 包括标记节点
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    #[inline(always)]
    fn node(&self, i: u32) -> &Node<T> {
        match &self.slots[i as usize].node {
            Some(n) => n,
            None => panic!("ArenaList: dangling link {}", i),
        }
    }
    #[inline(always)]
    fn node_mut(&mut self, i: u32) -> &mut Node<T> {
        match &mut self.slots[i as usize].node {
            Some(n) => n,
            None => panic!("ArenaList: dangling link {}", i),
        }
    }
    fn resolve(&self, idx: ListIndex) -> Option<u32> {
        let slot = self.slots.get(idx.slot as usize)?;
        (slot.gen == idx.gen && slot.node.is_some()).then(|| idx.slot)
    }
    fn index_of(&self, i: u32) -> ListIndex {
        ListIndex {
            slot: i,
            gen: self.slots[i as usize].gen,
        }
    }
    fn alloc(&mut self, data: T) -> u32 {
        let node = Node {
            prev: None,
            next: None,
            data,
        };
        match self.free.pop() {
            Some(i) => {
                debug_assert!(self.slots[i as usize].node.is_none());
                self.slots[i as usize].node = Some(node);
                i
            }
            None => {
                self.slots.push(Slot {
                    gen: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        }
    }
    fn link_alone(&mut self, i: u32) {
        debug_assert!(self.head.is_none() && self.tail.is_none());
        let n = self.node_mut(i);
        n.prev = None;
        n.next = None;
        self.head = Some(i);
        self.tail = Some(i);
        self.len += 1;
    }
    fn link_after(&mut self, i: u32, at: u32) {
        debug_assert_ne!(i, at);
        let next = self.node(at).next;
        let n = self.node_mut(i);
        n.prev = Some(at);
        n.next = next;
        self.node_mut(at).next = Some(i);
        match next {
            Some(nx) => self.node_mut(nx).prev = Some(i),
            None => self.tail = Some(i),
        }
        self.len += 1;
    }
    fn link_before(&mut self, i: u32, at: u32) {
        debug_assert_ne!(i, at);
        let prev = self.node(at).prev;
        let n = self.node_mut(i);
        n.prev = prev;
        n.next = Some(at);
        self.node_mut(at).prev = Some(i);
        match prev {
            Some(pv) => self.node_mut(pv).next = Some(i),
            None => self.head = Some(i),
        }
        self.len += 1;
    }
    fn link_back(&mut self, i: u32) {
        match self.tail {
            Some(t) => self.link_after(i, t),
            None => self.link_alone(i),
        }
    }
    fn link_front(&mut self, i: u32) {
        match self.head {
            Some(h) => self.link_before(i, h),
            None => self.link_alone(i),
        }
    }
    fn unlink(&mut self, i: u32) {
        let (prev, next) = {
            let n = self.node(i);
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let n = self.node_mut(i);
        n.prev = None;
        n.next = None;
        self.len -= 1;
    }
    pub fn push_back(&mut self, data: T) -> ListIndex {
        let i = self.alloc(data);
        self.link_back(i);
        self.index_of(i)
    }
    pub fn push_front(&mut self, data: T) -> ListIndex {
        let i = self.alloc(data);
        self.link_front(i);
        self.index_of(i)
    }
    /// 索引失效时返回None
    pub fn remove(&mut self, idx: ListIndex) -> Option<T> {
        let i = self.resolve(idx)?;
        self.unlink(i);
        let slot = &mut self.slots[i as usize];
        let node = slot.node.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(i);
        Some(node.data)
    }
    pub fn contains(&self, idx: ListIndex) -> bool {
        self.resolve(idx).is_some()
    }
    pub fn get(&self, idx: ListIndex) -> Option<&T> {
        let i = self.resolve(idx)?;
        Some(&self.node(i).data)
    }
    pub fn get_mut(&mut self, idx: ListIndex) -> Option<&mut T> {
        let i = self.resolve(idx)?;
        Some(&mut self.node_mut(i).data)
    }
    pub fn first(&self) -> Option<ListIndex> {
        self.head.map(|i| self.index_of(i))
    }
    pub fn last(&self) -> Option<ListIndex> {
        self.tail.map(|i| self.index_of(i))
    }
    pub fn next(&self, idx: ListIndex) -> Option<ListIndex> {
        let i = self.resolve(idx)?;
        self.node(i).next.map(|n| self.index_of(n))
    }
    pub fn prev(&self, idx: ListIndex) -> Option<ListIndex> {
        let i = self.resolve(idx)?;
        self.node(i).prev.map(|n| self.index_of(n))
    }
    /// 把 idx 移动到 at 之后, 任意一个索引失效时返回false
    pub fn move_after(&mut self, idx: ListIndex, at: ListIndex) -> bool {
        match (self.resolve(idx), self.resolve(at)) {
            (Some(i), Some(a)) if i != a => {
                self.unlink(i);
                self.link_after(i, a);
                true
            }
            (Some(i), Some(a)) => i == a,
            _ => false,
        }
    }
    /// 把 idx 移动到 at 之前, 任意一个索引失效时返回false
    pub fn move_before(&mut self, idx: ListIndex, at: ListIndex) -> bool {
        match (self.resolve(idx), self.resolve(at)) {
            (Some(i), Some(a)) if i != a => {
                self.unlink(i);
                self.link_before(i, a);
                true
            }
            (Some(i), Some(a)) => i == a,
            _ => false,
        }
    }
    pub fn move_to_back(&mut self, idx: ListIndex) -> bool {
        match self.resolve(idx) {
            Some(i) => {
                self.unlink(i);
                self.link_back(i);
                true
            }
            None => false,
        }
    }
    pub fn move_to_front(&mut self, idx: ListIndex) -> bool {
        match self.resolve(idx) {
            Some(i) => {
                self.unlink(i);
                self.link_front(i);
                true
            }
            None => false,
        }
    }
    /// 按next序查找第一个满足条件的节点
    pub fn position(&self, mut f: impl FnMut(&T) -> bool) -> Option<ListIndex> {
        self.iter().find(|(_, v)| f(v)).map(|(i, _)| i)
    }
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cur: self.head,
        }
    }
}

impl<T: Marked> ArenaList<T> {
    /// idx 之后第一个非标记节点
    pub fn next_unmarked(&self, idx: ListIndex) -> Option<ListIndex> {
        let mut cur = self.next(idx);
        while let Some(c) = cur {
            if !self.get(c)?.is_marker() {
                return Some(c);
            }
            cur = self.next(c);
        }
        None
    }
    pub fn count_unmarked(&self) -> usize {
        self.iter().filter(|(_, v)| !v.is_marker()).count()
    }
}

pub struct Iter<'a, T> {
    list: &'a ArenaList<T>,
    cur: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (ListIndex, &'a T);
    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cur?;
        let node = self.list.node(i);
        self.cur = node.next;
        Some((self.list.index_of(i), &node.data))
    }
}
