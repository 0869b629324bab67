use std::{
    collections::HashMap,
    sync::{mpsc, Condvar, Mutex},
    thread::{self, ThreadId},
    vec::Vec,
};

use ftl_util::error::SysR;

use crate::{Mount, TransactionGate};

#[derive(Default)]
struct GateState {
    active: usize,
    owner: Option<ThreadId>,
}

/// 以挂载点代数区分的事务准入, 挂起者自己仍然可以进入
#[derive(Default)]
pub struct TestGate {
    state: Mutex<HashMap<u64, GateState>>,
    cv: Condvar,
    unregistered: Mutex<Vec<u64>>,
}

impl TestGate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_suspended(&self, gen: u64) -> bool {
        let st = self.state.lock().unwrap();
        st.get(&gen).map_or(false, |s| s.owner.is_some())
    }
    pub fn active(&self, gen: u64) -> usize {
        let st = self.state.lock().unwrap();
        st.get(&gen).map_or(0, |s| s.active)
    }
    pub fn is_registered(&self, gen: u64) -> bool {
        self.state.lock().unwrap().contains_key(&gen)
    }
    pub fn unregister_count(&self, gen: u64) -> usize {
        let list = self.unregistered.lock().unwrap();
        list.iter().filter(|&&g| g == gen).count()
    }
    /// 另一个线程挂起 mp 期间执行 f
    pub fn suspend_on_other_thread<R>(&self, mp: &Mount, f: impl FnOnce() -> R) -> R {
        thread::scope(|s| {
            let (tx_s, rx_s) = mpsc::channel();
            let (tx_r, rx_r) = mpsc::channel::<()>();
            s.spawn(move || {
                self.suspend(mp).unwrap();
                tx_s.send(()).unwrap();
                let _ = rx_r.recv();
                self.resume(mp);
            });
            rx_s.recv().unwrap();
            let r = f();
            tx_r.send(()).unwrap();
            r
        })
    }
}

impl TransactionGate for TestGate {
    fn mount(&self, mp: &Mount) -> SysR<()> {
        let old = self
            .state
            .lock()
            .unwrap()
            .insert(mp.gen(), GateState::default());
        assert!(old.is_none(), "gate: gen {} registered twice", mp.gen());
        Ok(())
    }
    fn unmount(&self, mp: &Mount) {
        let old = self.state.lock().unwrap().remove(&mp.gen());
        let old = old.expect("gate: unregister unknown mount");
        assert_eq!(old.active, 0);
        self.unregistered.lock().unwrap().push(mp.gen());
    }
    fn enter(&self, mp: &Mount) {
        let me = thread::current().id();
        let mut st = self.state.lock().unwrap();
        loop {
            let s = st.get_mut(&mp.gen()).expect("gate: enter unknown mount");
            if s.owner.map_or(true, |o| o == me) {
                s.active += 1;
                return;
            }
            st = self.cv.wait(st).unwrap();
        }
    }
    fn try_enter(&self, mp: &Mount) -> bool {
        let me = thread::current().id();
        let mut st = self.state.lock().unwrap();
        let s = st.get_mut(&mp.gen()).expect("gate: enter unknown mount");
        if s.owner.map_or(true, |o| o == me) {
            s.active += 1;
            true
        } else {
            false
        }
    }
    fn leave(&self, mp: &Mount) {
        let mut st = self.state.lock().unwrap();
        let s = st.get_mut(&mp.gen()).expect("gate: leave unknown mount");
        assert!(s.active != 0);
        s.active -= 1;
        drop(st);
        self.cv.notify_all();
    }
    fn suspend(&self, mp: &Mount) -> SysR<()> {
        let me = thread::current().id();
        let mut st = self.state.lock().unwrap();
        loop {
            let s = st.get_mut(&mp.gen()).expect("gate: suspend unknown mount");
            assert_ne!(s.owner, Some(me), "gate: recursive suspend");
            if s.owner.is_none() {
                s.owner = Some(me);
                break;
            }
            st = self.cv.wait(st).unwrap();
        }
        while st[&mp.gen()].active != 0 {
            st = self.cv.wait(st).unwrap();
        }
        Ok(())
    }
    fn resume(&self, mp: &Mount) {
        let me = thread::current().id();
        let mut st = self.state.lock().unwrap();
        let s = st.get_mut(&mp.gen()).expect("gate: resume unknown mount");
        assert_eq!(s.owner, Some(me), "gate: resume by non-owner");
        s.owner = None;
        drop(st);
        self.cv.notify_all();
    }
    fn is_suspended_by_current(&self, mp: &Mount) -> bool {
        let me = thread::current().id();
        let st = self.state.lock().unwrap();
        st.get(&mp.gen()).map_or(false, |s| s.owner == Some(me))
    }
}
