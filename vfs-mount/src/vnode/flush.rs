//! vflush: 卸载前清空挂载点的vnode

use core::ptr;

use ftl_util::error::{SysError, SysR};

use crate::mount::Mount;

use super::{VType, Vnode, VnodeFlags, VnodeRef};

bitflags! {
    pub struct FlushFlags: u32 {
        /// 跳过 SYSTEM vnode
        const SKIPSYSTEM = 0x1;
        /// 仍被引用的vnode也强制回收
        const FORCECLOSE = 0x2;
        /// 只处理以写方式打开或已经删除的普通文件
        const WRITECLOSE = 0x4;
    }
}

struct FlushPass {
    busy: usize,
    progress: bool,
    error: Option<SysError>,
}

impl Mount {
    /// 回收挂载点上的vnode, `skip` 不会被处理
    ///
    /// 没有vnode残留时成功, 否则返回最后一个错误或EBUSY
    pub fn vflush(&self, skip: Option<&Vnode>, flags: FlushFlags) -> SysR<()> {
        let mut error = None;
        for pass in 0..self.flush_retries.max(1) {
            if pass != 0 {
                (self.flush_yield)();
            }
            let r = self.vflush_pass(skip, flags);
            if r.error.is_some() {
                error = r.error;
            }
            if r.busy == 0 {
                return Ok(());
            }
            debug!(
                "vflush: gen {} pass {} busy {} progress {}",
                self.gen(),
                pass,
                r.busy,
                r.progress
            );
            if !r.progress {
                break;
            }
        }
        Err(error.unwrap_or(SysError::EBUSY))
    }
    fn vflush_pass(&self, skip: Option<&Vnode>, flags: FlushFlags) -> FlushPass {
        let mut r = FlushPass {
            busy: 0,
            progress: false,
            error: None,
        };
        let mut iter = self.vnode_iter();
        while let Some(vp) = iter.next_wait(|vp| flush_selector(vp, skip, flags)) {
            if flags.contains(FlushFlags::WRITECLOSE) && vp.writecount() == 0 {
                // 没有写者, 只需要关闭已经删除的文件
                match unlinked(&vp) {
                    Ok(false) => continue,
                    Ok(true) => (),
                    Err(e) => {
                        r.error = Some(e);
                        r.busy += 1;
                        continue;
                    }
                }
            }
            let vp = match vp.vrecycle() {
                Ok(()) => {
                    r.progress = true;
                    continue;
                }
                Err(vp) => vp,
            };
            if flags.contains(FlushFlags::FORCECLOSE) {
                match vp.vtype() {
                    VType::Blk | VType::Chr => vp.revoke_to_anon(),
                    _ => vp.vgone(),
                }
                r.progress = true;
                continue;
            }
            r.busy += 1;
        }
        r
    }
}

fn flush_selector(vp: &Vnode, skip: Option<&Vnode>, flags: FlushFlags) -> bool {
    if let Some(skip) = skip {
        if ptr::eq(vp, skip) {
            return false;
        }
    }
    if flags.contains(FlushFlags::SKIPSYSTEM) && vp.flags().contains(VnodeFlags::SYSTEM) {
        return false;
    }
    if flags.contains(FlushFlags::WRITECLOSE) && vp.vtype() != VType::Reg {
        return false;
    }
    true
}

fn unlinked(vp: &VnodeRef) -> SysR<bool> {
    let ops = vp.ops();
    ops.fsync(vp)?;
    Ok(ops.getattr(vp)?.nlink == 0)
}
