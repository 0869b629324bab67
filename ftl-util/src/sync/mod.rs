pub mod rw_spin_mutex;
pub mod sleep_mutex;
pub mod spin_mutex;

/// Low-level support for mutex
pub trait MutexSupport {
    type GuardData;
    /// Called before lock() & try_lock()
    fn before_lock() -> Self::GuardData;
    /// Called when MutexGuard dropping
    fn after_unlock(_: &mut Self::GuardData);
}

/// Spin lock
#[derive(Debug)]
pub struct Spin;

impl MutexSupport for Spin {
    type GuardData = ();
    #[inline(always)]
    fn before_lock() -> Self::GuardData {}
    #[inline(always)]
    fn after_unlock(_: &mut Self::GuardData) {}
}

/// 自旋次数超过此值视为死锁
pub(crate) const DEADLOCK_SPIN: usize = 0x10000000;

pub fn seq_fence() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
