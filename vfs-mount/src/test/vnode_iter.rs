use std::{thread, time::Duration, vec::Vec};

use crate::{VType, Vnode, VnodeRef};

use super::{
    fs::{add_vnode, TestNode},
    Env,
};

fn collect(mp: &crate::Mount, filter: impl Fn(&Vnode) -> bool) -> Vec<VnodeRef> {
    let mut iter = mp.vnode_iter();
    let mut v = Vec::new();
    while let Some(vp) = iter.next(&filter) {
        v.push(vp);
    }
    v
}

#[test]
fn filter_and_dead() {
    let env = Env::new();
    let mp = env.bare_mount();
    let a = add_vnode(&mp, VType::Reg);
    let b = add_vnode(&mp, VType::Dir);
    let c = add_vnode(&mp, VType::Reg);
    let regs = collect(&mp, |vp| vp.vtype() == VType::Reg);
    assert_eq!(regs.len(), 2);
    assert!(VnodeRef::ptr_eq(&regs[0], &a));
    assert!(VnodeRef::ptr_eq(&regs[1], &c));
    drop(regs);

    c.clone().vgone();
    let all = collect(&mp, |_| true);
    assert_eq!(all.len(), 2);
    assert!(VnodeRef::ptr_eq(&all[1], &b));
    assert_eq!(mp.vnode_count(), 2);
}

#[test]
fn removal_next_to_marker() {
    let env = Env::new();
    let mp = env.bare_mount();
    let a = add_vnode(&mp, VType::Reg);
    let b = add_vnode(&mp, VType::Reg);
    let c = add_vnode(&mp, VType::Reg);
    let mut iter = mp.vnode_iter();
    assert!(VnodeRef::ptr_eq(&iter.next(|_| true).unwrap(), &a));
    a.insmntque(None);
    b.clone().vgone();
    assert!(VnodeRef::ptr_eq(&iter.next(|_| true).unwrap(), &c));
    assert!(iter.next(|_| true).is_none());
    // 标记已经移出链表
    assert!(iter.next(|_| true).is_none());
    assert_eq!(mp.vnode_count(), 1);
}

#[test]
fn nested_iterators() {
    let env = Env::new();
    let mp = env.bare_mount();
    let vps: Vec<_> = (0..4).map(|_| add_vnode(&mp, VType::Reg)).collect();
    let mut outer = mp.vnode_iter();
    let mut n = 0;
    while outer.next(|_| true).is_some() {
        let inner = collect(&mp, |_| true);
        assert_eq!(inner.len(), vps.len());
        n += 1;
    }
    assert_eq!(n, 4);
}

#[test]
fn loading_vnode() {
    let env = Env::new();
    let mp = env.bare_mount();
    let loading = Vnode::new_loading(VType::Reg, TestNode::new(1));
    loading.insmntque(Some(&mp));
    let ready = add_vnode(&mp, VType::Reg);

    // 不等待时跳过
    let got = collect(&mp, |_| true);
    assert_eq!(got.len(), 1);
    assert!(VnodeRef::ptr_eq(&got[0], &ready));
    drop(got);

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            loading.finish_load();
        });
        let mut iter = mp.vnode_iter();
        let first = iter.next_wait(|_| true).unwrap();
        assert!(VnodeRef::ptr_eq(&first, &loading));
    });
}
