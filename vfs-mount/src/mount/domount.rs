use alloc::sync::Arc;
use ftl_util::error::{SysError, SysR};

use crate::{
    cred::Cred,
    manager::VfsManager,
    vnode::{VType, VnodeRef},
};

use super::{MntFlags, Mount};

impl VfsManager {
    /// 把 fstype 类型的新文件系统挂载到目录 vp 上
    ///
    /// `start` 失败时返回错误, 但文件系统保持挂载, 由调用者决定是否卸载
    pub fn mount_domount(
        &self,
        cred: &Cred,
        vp: VnodeRef,
        fstype: &str,
        path: &str,
        flags: MntFlags,
        data: &[u8],
    ) -> SysR<Arc<Mount>> {
        let op = self.lookup_fstype(fstype)?;
        self.auth.authorize_mount(cred, &vp, flags)?;
        if vp.vtype() != VType::Dir {
            return Err(SysError::ENOTDIR);
        }
        if flags.contains(MntFlags::EXPORTED) {
            return Err(SysError::EINVAL);
        }

        let mp = self.mount_alloc(op, Some(vp.clone()))?;
        mp.set_owner(cred.uid);
        mp.set_flags(flags & (MntFlags::BASIC | MntFlags::FORCE | MntFlags::IGNORE));
        mp.set_names(path, fstype);

        {
            let _updating = mp.lock_updating();
            let r = mp.op().mount(&mp, path, data);
            mp.clear_flags(MntFlags::OP);
            r?;
            if let Err(e) = vp.try_set_mountedhere(&mp) {
                // 目录上已经有其他文件系统
                if let Err(e) = mp.op().unmount(&mp, MntFlags::FORCE) {
                    panic!("unmounting the fresh file system failed: {:?}", e);
                }
                return Err(e);
            }
            self.namecache.purge(&vp);
            self.mounts.append(&mp);
            if !mp
                .flags()
                .intersects(MntFlags::RDONLY | MntFlags::ASYNC)
            {
                self.syncer.add(&mp);
            }
            self.mount_checkdirs(&vp);
        }
        debug!("mount: {} on {} gen {}", fstype, path, mp.gen());

        if let Err(e) = mp.refresh_stat() {
            debug!("mount: statvfs gen {} {:?}", mp.gen(), e);
        }
        if let Err(e) = mp.op().start(&mp, 0) {
            warn!("mount: start {} on {} failed {:?}", fstype, path, e);
            return Err(e);
        }
        if flags.contains(MntFlags::EXTATTR) {
            self.start_extattr(&mp);
        }
        Ok(mp)
    }

    /// 把引用被覆盖目录的进程目录和根vnode改为新文件系统的根
    pub fn mount_checkdirs(&self, olddp: &VnodeRef) {
        let mp = match olddp.mountedhere() {
            Some(mp) => mp,
            None => panic!("mount: lost mount"),
        };
        let newdp = match mp.op().root(&mp) {
            Ok(vp) => vp,
            Err(e) => panic!("mount: lost mount root {:?}", e),
        };
        let mut n = 0;
        // 扫描期间新建的进程可能复制了还没有换掉的绑定, 只有这一轮换过才需要再扫一轮
        loop {
            let mut changed = false;
            for cwdi in self.procs.cwdi_snapshot() {
                let old = cwdi.rebind(olddp, &newdp);
                let k = old.iter().flatten().count();
                if k != 0 {
                    changed = true;
                    n += k;
                }
                drop(old);
            }
            if !changed {
                break;
            }
        }
        let old = {
            let mut root = self.rootvnode.lock();
            let hit = root.as_ref().map_or(false, |r| VnodeRef::ptr_eq(r, olddp));
            if hit {
                root.replace(newdp.clone())
            } else {
                None
            }
        };
        if old.is_some() {
            n += 1;
        }
        drop(old);
        trace!("mount_checkdirs: rebind {}", n);
    }
}
