use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::sync::Arc;
use ftl_util::error::{SysError, SysR};

use crate::{FsModuleLoader, MntFlags, VfsConfig, VfsManager, VnodeRef};

use super::{fs::TestFs, gate::TestGate, Env};

fn manager(config: VfsConfig) -> VfsManager {
    VfsManager::new(Arc::new(TestGate::new()), config)
}

#[test]
fn probe_in_registration_order() {
    let vfs = manager(VfsConfig::default());
    let plain = Arc::new(TestFs::new("plain").rootable(false));
    let broken = Arc::new(TestFs::new("broken").root_fails());
    let good = Arc::new(TestFs::new("good"));
    let later = Arc::new(TestFs::new("later"));
    vfs.attach(plain.clone()).unwrap();
    vfs.attach(broken.clone()).unwrap();
    vfs.attach(good.clone()).unwrap();
    vfs.attach(later.clone()).unwrap();
    assert!(!vfs.module_load_enabled());

    vfs.mountroot().unwrap();
    assert_eq!(plain.mountroots.load(Ordering::SeqCst), 0);
    assert_eq!(broken.mountroots.load(Ordering::SeqCst), 1);
    assert_eq!(good.mountroots.load(Ordering::SeqCst), 1);
    assert_eq!(later.mountroots.load(Ordering::SeqCst), 0);

    let mp = vfs.mounts().first().unwrap();
    assert_eq!(mp.op().name(), "good");
    assert!(mp.flags().contains(MntFlags::ROOTFS | MntFlags::RDONLY));
    assert_eq!(mp.stat().mntonname, "/");
    assert_eq!(mp.stat().mntfromname, "rootdev");
    let root = vfs.rootvnode().unwrap();
    assert!(VnodeRef::ptr_eq(&root, &mp.op().root(&mp).unwrap()));
    assert!(VnodeRef::ptr_eq(&vfs.cwdi0().cdir().unwrap(), &root));
    assert!(VnodeRef::ptr_eq(&vfs.cwdi0().rdir().unwrap(), &root));
    assert!(vfs.module_load_enabled());
    // 挂载点没有残留的 busy
    assert!(mp.trybusy().is_ok());
}

#[test]
fn no_root_fs() {
    let vfs = manager(VfsConfig::default());
    vfs.attach(Arc::new(TestFs::new("broken").root_fails()))
        .unwrap();
    assert_eq!(vfs.mountroot(), Err(SysError::ENODEV));
    assert!(vfs.rootvnode().is_none());
    assert!(!vfs.module_load_enabled());
    assert_eq!(vfs.mounts().count(), 0);
}

#[test]
fn explicit_type() {
    let vfs = manager(VfsConfig::default().with_rootfstype("second"));
    let first = Arc::new(TestFs::new("first"));
    let second = Arc::new(TestFs::new("second"));
    vfs.attach(first.clone()).unwrap();
    vfs.attach(second.clone()).unwrap();
    vfs.mountroot().unwrap();
    assert_eq!(first.mountroots.load(Ordering::SeqCst), 0);
    assert_eq!(vfs.mounts().first().unwrap().op().name(), "second");

    let vfs = manager(VfsConfig::default().with_rootfstype("missing"));
    vfs.attach(Arc::new(TestFs::new("first"))).unwrap();
    assert_eq!(vfs.mountroot(), Err(SysError::ENODEV));

    let vfs = manager(VfsConfig::default().with_rootfstype("plain"));
    vfs.attach(Arc::new(TestFs::new("plain").rootable(false)))
        .unwrap();
    assert_eq!(vfs.mountroot(), Err(SysError::ENODEV));
}

struct Loader {
    loads: AtomicUsize,
}

impl FsModuleLoader for Loader {
    fn load(&self, vfs: &VfsManager, name: &str) -> SysR<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if name != "lazyfs" {
            return Err(SysError::ENOENT);
        }
        vfs.attach(Arc::new(TestFs::new("lazyfs").rootable(false)))
    }
}

#[test]
fn module_autoload_after_mountroot() {
    let loader = Arc::new(Loader {
        loads: AtomicUsize::new(0),
    });
    let vfs = manager(VfsConfig::default()).with_loader(loader.clone());
    vfs.attach(Arc::new(TestFs::new("testfs"))).unwrap();
    assert_eq!(vfs.lookup_fstype("lazyfs").err(), Some(SysError::ENODEV));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);

    vfs.mountroot().unwrap();
    assert_eq!(vfs.lookup_fstype("lazyfs").unwrap().name(), "lazyfs");
    assert_eq!(vfs.lookup_fstype("nosuch").err(), Some(SysError::ENODEV));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn root_helper() {
    let env = Env::new();
    let root = env.root();
    assert!(root.is_rdonly());
    assert_eq!(root.vnode_count(), 1);
    assert!(!env.vfs.on_syncer_list(&root));
}
