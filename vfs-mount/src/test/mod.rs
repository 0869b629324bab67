use alloc::sync::Arc;

use crate::{Cred, MntFlags, Mount, VType, VfsConfig, VfsManager, VnodeRef};

use self::{
    fs::{add_vnode, TestFs},
    gate::TestGate,
};

mod fs;
mod gate;
mod mountroot;
mod vnode_iter;

pub struct Env {
    pub vfs: VfsManager,
    pub gate: Arc<TestGate>,
    pub fs: Arc<TestFs>,
}

impl Env {
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }
    pub fn with_config(config: VfsConfig) -> Self {
        Self::build(config, |vfs| vfs)
    }
    /// f 可以在注册文件系统之前替换钩子
    pub fn build(config: VfsConfig, f: impl FnOnce(VfsManager) -> VfsManager) -> Self {
        let gate = Arc::new(TestGate::new());
        let vfs = f(VfsManager::new(gate.clone(), config));
        let fs = Arc::new(TestFs::new("testfs"));
        vfs.attach(fs.clone()).unwrap();
        Self { vfs, gate, fs }
    }
    /// 加入注册表的空挂载点, 没有根vnode
    pub fn bare_mount(&self) -> Arc<Mount> {
        let op = self.vfs.lookup_fstype("testfs").unwrap();
        let mp = self.vfs.mount_alloc(op, None).unwrap();
        self.vfs.mounts().append(&mp);
        mp
    }
    /// 挂载根文件系统
    pub fn root(&self) -> Arc<Mount> {
        self.vfs.mountroot().unwrap();
        self.vfs.mounts().first().unwrap()
    }
    /// 在 parent 中新建一个目录并在上面挂载
    pub fn mount_on_new_dir(&self, parent: &Arc<Mount>, path: &str) -> (Arc<Mount>, VnodeRef) {
        let dir = add_vnode(parent, VType::Dir);
        let mp = self
            .vfs
            .mount_domount(
                &Cred::KERNEL,
                dir.clone(),
                "testfs",
                path,
                MntFlags::empty(),
                &[],
            )
            .unwrap();
        (mp, dir)
    }
}
