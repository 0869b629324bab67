//! 文件系统事务准入
//!
//! 准入机制由外部实现, 这里只定义挂载核心依赖的接口. 每个挂载点在分配时注册,
//! 在引用计数归零时注销, 同一个挂载点以 `Mount::gen` 区分.

use ftl_util::error::SysR;

use crate::mount::Mount;

pub trait TransactionGate: Send + Sync + 'static {
    /// 挂载点分配时注册
    fn mount(&self, mp: &Mount) -> SysR<()>;
    /// 挂载点销毁时注销, 此后不会再有任何调用
    fn unmount(&self, mp: &Mount);
    /// 开始一个事务, 挂起期间阻塞
    fn enter(&self, mp: &Mount);
    /// 开始一个事务, 不能立即准入时返回false
    fn try_enter(&self, mp: &Mount) -> bool;
    fn leave(&self, mp: &Mount);
    /// 阻止新的事务并等待已有事务全部结束
    fn suspend(&self, mp: &Mount) -> SysR<()>;
    fn resume(&self, mp: &Mount);
    /// 当前线程是否是挂起者
    fn is_suspended_by_current(&self, mp: &Mount) -> bool;
}
