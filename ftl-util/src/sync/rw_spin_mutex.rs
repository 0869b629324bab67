use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{self, AtomicIsize, Ordering},
};

use super::{MutexSupport, DEADLOCK_SPIN};

/// 读优先自旋锁
///
/// 锁状态: 0 -> unlock >0 -> shared lock <0 -> unique lock
///
/// 读者在未获取锁时已经递增了计数, 写者释放锁后读者直接进入
pub struct RwSpinMutex<T: ?Sized, S: MutexSupport> {
    lock: AtomicIsize,
    _marker: PhantomData<S>,
    data: UnsafeCell<T>, // actual data
}

unsafe impl<T: ?Sized + Send, S: MutexSupport> Send for RwSpinMutex<T, S> {}
unsafe impl<T: ?Sized + Send + Sync, S: MutexSupport> Sync for RwSpinMutex<T, S> {}

pub struct UniqueRwMutexGuard<'a, T: ?Sized, S: MutexSupport> {
    mutex: &'a RwSpinMutex<T, S>,
    guard: S::GuardData,
    _not_send: PhantomData<*mut ()>,
}

pub struct SharedRwMutexGuard<'a, T: ?Sized, S: MutexSupport> {
    mutex: &'a RwSpinMutex<T, S>,
    guard: S::GuardData,
    _not_send: PhantomData<*mut ()>,
}

impl<T, S: MutexSupport> RwSpinMutex<T, S> {
    pub const fn new(user_data: T) -> Self {
        RwSpinMutex {
            lock: AtomicIsize::new(0),
            data: UnsafeCell::new(user_data),
            _marker: PhantomData,
        }
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        let RwSpinMutex { data, .. } = self;
        data.into_inner()
    }
}

impl<T: ?Sized, S: MutexSupport> RwSpinMutex<T, S> {
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
    pub fn try_unique_lock(&self) -> Option<UniqueRwMutexGuard<'_, T, S>> {
        let mut guard = S::before_lock();
        if self.lock.load(Ordering::Relaxed) != 0 {
            S::after_unlock(&mut guard);
            return None;
        }
        match self
            .lock
            .compare_exchange(0, -isize::MAX, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Some(UniqueRwMutexGuard {
                mutex: self,
                guard,
                _not_send: PhantomData,
            }),
            Err(_) => {
                S::after_unlock(&mut guard);
                None
            }
        }
    }
    #[inline(always)]
    pub fn unique_lock(&self) -> UniqueRwMutexGuard<'_, T, S> {
        let guard = S::before_lock();
        let mut cnt = 0;
        loop {
            let cur = self.lock.load(Ordering::Relaxed);
            if cur != 0 {
                cnt += 1;
                core::hint::spin_loop();
                if cnt == DEADLOCK_SPIN {
                    panic!("RwSpinMutex: dead lock");
                }
                continue;
            }
            if self
                .lock
                .compare_exchange(0, -isize::MAX, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            return UniqueRwMutexGuard {
                mutex: self,
                guard,
                _not_send: PhantomData,
            };
        }
    }
    pub fn try_shared_lock(&self) -> Option<SharedRwMutexGuard<'_, T, S>> {
        let mut guard = S::before_lock();
        let mut cur = self.lock.load(Ordering::Relaxed);
        while cur >= 0 {
            match self
                .lock
                .compare_exchange(cur, cur + 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => {
                    return Some(SharedRwMutexGuard {
                        mutex: self,
                        guard,
                        _not_send: PhantomData,
                    })
                }
                Err(v) => cur = v,
            };
        }
        S::after_unlock(&mut guard);
        None
    }
    #[inline(always)]
    pub fn shared_lock(&self) -> SharedRwMutexGuard<'_, T, S> {
        let guard = S::before_lock();
        if self.lock.fetch_add(1, Ordering::Relaxed) >= 0 {
            atomic::fence(Ordering::Acquire);
            return SharedRwMutexGuard {
                mutex: self,
                guard,
                _not_send: PhantomData,
            };
        }
        let mut cnt = 0;
        while self.lock.load(Ordering::Relaxed) <= 0 {
            if cnt == DEADLOCK_SPIN {
                panic!("RwSpinMutex: dead lock");
            }
            cnt += 1;
            core::hint::spin_loop();
        }
        atomic::fence(Ordering::Acquire);
        SharedRwMutexGuard {
            mutex: self,
            guard,
            _not_send: PhantomData,
        }
    }
}

impl<T: Default, S: MutexSupport> Default for RwSpinMutex<T, S> {
    fn default() -> RwSpinMutex<T, S> {
        RwSpinMutex::new(Default::default())
    }
}

impl<'a, T: ?Sized, S: MutexSupport> Deref for SharedRwMutexGuard<'a, T, S> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}
impl<'a, T: ?Sized, S: MutexSupport> Deref for UniqueRwMutexGuard<'a, T, S> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized, S: MutexSupport> DerefMut for UniqueRwMutexGuard<'a, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized, S: MutexSupport> Drop for SharedRwMutexGuard<'a, T, S> {
    fn drop(&mut self) {
        debug_assert!(self.mutex.lock.load(Ordering::Relaxed) > 0);
        self.mutex.lock.fetch_sub(1, Ordering::Release);
        S::after_unlock(&mut self.guard);
    }
}
impl<'a, T: ?Sized, S: MutexSupport> Drop for UniqueRwMutexGuard<'a, T, S> {
    fn drop(&mut self) {
        debug_assert!(self.mutex.lock.load(Ordering::Relaxed) < 0);
        self.mutex.lock.fetch_add(isize::MAX, Ordering::Release);
        S::after_unlock(&mut self.guard);
    }
}
