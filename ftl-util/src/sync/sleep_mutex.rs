use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// 睡眠锁
///
/// 持有者可以长时间持有(例如等待文件系统I/O), 因此等待者不做死锁检测,
/// 每次获取失败都调用构造时给定的 `wait` 让出处理器.
pub struct SleepMutex<T: ?Sized> {
    lock: AtomicBool,
    wait: fn(),
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SleepMutex<T> {}
unsafe impl<T: ?Sized + Send> Send for SleepMutex<T> {}

pub struct SleepMutexGuard<'a, T: ?Sized> {
    mutex: &'a SleepMutex<T>,
    _not_send: PhantomData<*mut ()>,
}

impl<T> SleepMutex<T> {
    pub const fn new(user_data: T, wait: fn()) -> Self {
        Self {
            lock: AtomicBool::new(false),
            wait,
            data: UnsafeCell::new(user_data),
        }
    }
    pub fn into_inner(self) -> T {
        let Self { data, .. } = self;
        data.into_inner()
    }
}

impl<T: ?Sized> SleepMutex<T> {
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
    pub fn lock(&self) -> SleepMutexGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            (self.wait)();
        }
    }
    pub fn try_lock(&self) -> Option<SleepMutexGuard<'_, T>> {
        if self.lock.load(Ordering::Relaxed) {
            return None;
        }
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        Some(SleepMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SleepMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => write!(f, "SleepMutex {{ data: {:?} }}", &*guard),
            None => write!(f, "SleepMutex {{ <locked> }}"),
        }
    }
}

impl<'a, T: ?Sized> Deref for SleepMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for SleepMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for SleepMutexGuard<'a, T> {
    fn drop(&mut self) {
        debug_assert!(self.mutex.lock.load(Ordering::Relaxed));
        self.mutex.lock.store(false, Ordering::Release);
    }
}
