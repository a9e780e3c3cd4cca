//! The lock guarding every registry and pool access.
//!
//! [`BootstrapMutex`] behaves like a spin lock once
//! [`initialize`](BootstrapMutex::initialize) has been called. Before that,
//! and again after [`destroy`](BootstrapMutex::destroy), locking is a no-op:
//! the process is still (or again) single threaded, so the lock does not have
//! to be race free while the program boots.

use core::{
    cell::UnsafeCell,
    fmt,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

pub struct BootstrapMutex<T> {
    initialized: AtomicBool,
    lock: spin::Mutex<()>,
    data: UnsafeCell<T>,
}

unsafe impl<T> Sync for BootstrapMutex<T> where T: Send {}

impl<T> fmt::Debug for BootstrapMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapMutex")
            .field("initialized", &self.is_initialized())
            .field("locked", &self.lock.is_locked())
            .finish_non_exhaustive()
    }
}

impl<T> BootstrapMutex<T> {
    /// Creates a mutex in the bootstrap state.
    ///
    /// # Safety
    ///
    /// Until [`initialize`](Self::initialize) returns, the mutex must only be
    /// used by one thread at a time. Locking does not exclude anybody yet.
    pub const unsafe fn new(data: T) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            lock: spin::Mutex::new(()),
            data: UnsafeCell::new(data),
        }
    }

    /// Leaves the bootstrap state. From now on [`lock`](Self::lock) excludes
    /// other threads.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, before any second thread uses the mutex.
    pub unsafe fn initialize(&self) {
        let was_initialized = self.initialized.swap(true, Ordering::AcqRel);
        debug_assert!(!was_initialized, "lock initialized twice");
    }

    /// Returns to the bootstrap state.
    ///
    /// # Safety
    ///
    /// Must only be called after every other thread stopped using the mutex,
    /// and while no guard is alive.
    pub unsafe fn destroy(&self) {
        debug_assert!(!self.lock.is_locked(), "lock destroyed while held");
        self.initialized.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Acquires exclusive access, spinning while another thread holds it.
    ///
    /// The access is released when the returned guard is dropped.
    pub fn lock(&self) -> BootstrapGuard<'_, T> {
        let lock = self.is_initialized().then(|| self.lock.lock());
        BootstrapGuard {
            _lock: lock,
            data: &self.data,
        }
    }
}

pub struct BootstrapGuard<'a, T> {
    _lock: Option<spin::MutexGuard<'a, ()>>,
    data: &'a UnsafeCell<T>,
}

impl<T> Deref for BootstrapGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.data.get() }
    }
}

impl<T> DerefMut for BootstrapGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.data.get() }
    }
}
