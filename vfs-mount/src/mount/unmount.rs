use alloc::sync::Arc;
use ftl_util::error::{SysError, SysR};

use crate::{cred::Cred, manager::VfsManager};

use super::{IMntFlags, MntFlags, Mount};

impl VfsManager {
    /// 卸载一个挂载点
    ///
    /// 调用者可以事先挂起事务准入, 此时由调用者负责恢复. 失败时挂载点恢复到调用前的状态,
    /// 文件系统返回的错误原样返回.
    pub fn dounmount(&self, mp: &Arc<Mount>, flags: MntFlags, cred: &Cred) -> SysR<()> {
        let was_suspended = self.gate.is_suspended_by_current(mp);
        if !was_suspended {
            self.gate.suspend(mp)?;
        }
        if mp.is_gone() {
            if !was_suspended {
                self.gate.resume(mp);
            }
            return Err(SysError::ENOENT);
        }

        let used_syncer = mp.iflags().contains(IMntFlags::ONWORKLIST);
        let used_extattr = mp.flags().contains(MntFlags::EXTATTR);

        mp.set_iflags(IMntFlags::UNMOUNT);
        let updating = mp.lock_updating();
        let async_flag = mp.flags() & MntFlags::ASYNC;
        mp.clear_flags(MntFlags::ASYNC);
        self.namecache.purge_vfs(mp);
        if used_syncer {
            self.syncer.remove(mp);
        }

        let force = flags.contains(MntFlags::FORCE);
        let mut r = Ok(());
        if !mp.is_rdonly() && !force {
            r = mp.op().sync(mp, true, cred);
        }
        if r.is_ok() || force {
            r = mp.op().unmount(mp, flags);
        }
        if let Err(e) = r {
            debug!("dounmount: gen {} failed {:?}, rollback", mp.gen(), e);
            mp.clear_iflags(IMntFlags::UNMOUNT);
            if used_syncer {
                self.syncer.add(mp);
            }
            mp.set_flags(async_flag);
            drop(updating);
            if !was_suspended {
                self.gate.resume(mp);
            }
            if used_extattr {
                self.start_extattr(mp);
            }
            return Err(e);
        }

        drop(updating);
        mp.set_iflags(IMntFlags::GONE);
        if !was_suspended {
            self.gate.resume(mp);
        }
        let covered = mp.take_covered();
        let here = covered.as_ref().and_then(|vp| vp.clear_mountedhere(mp));
        let owned = self.mounts.remove(mp);
        if mp.vnode_count() != 0 {
            panic!("unmount: dangling vnode");
        }
        debug!("dounmount: gen {} {}", mp.gen(), mp.stat().mntonname);
        drop(here);
        drop(owned);
        drop(covered);
        Ok(())
    }
}
