//! The process-wide allocator and its C-style free functions.
//!
//! The deployment mode is chosen at build time: pools are created on demand
//! unless the `static-pools` feature selects
//! [`StaticPools::DEFAULT_TABLE`].

use core::{
    ptr::{self, NonNull},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{Usage, XAllocator};

cfg_if::cfg_if! {
    if #[cfg(feature = "static-pools")] {
        use crate::StaticPools;

        pub type DefaultStrategy = StaticPools;
        const DEFAULT_STRATEGY: DefaultStrategy = StaticPools::new(StaticPools::DEFAULT_TABLE);
    } else {
        use crate::DynamicPools;

        pub type DefaultStrategy = DynamicPools;
        const DEFAULT_STRATEGY: DefaultStrategy = DynamicPools::new();
    }
}

static XALLOCATOR: XAllocator<DefaultStrategy> = unsafe { XAllocator::new(DEFAULT_STRATEGY) };

/// Number of live [`InitDestroy`] handles.
static INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

#[must_use]
pub fn allocator() -> &'static XAllocator<DefaultStrategy> {
    &XALLOCATOR
}

/// Initializes the process-wide allocator.
///
/// # Safety
///
/// Must be called once, before any second thread allocates.
pub unsafe fn xalloc_init() {
    unsafe { XALLOCATOR.init() };
}

/// Tears the process-wide allocator down.
///
/// # Safety
///
/// Must be called once, after every other thread stopped allocating. In
/// dynamic mode every outstanding pointer becomes dangling.
pub unsafe fn xalloc_destroy() {
    unsafe { XALLOCATOR.destroy() };
}

/// Allocates `size` bytes, returning null on failure.
#[must_use]
pub fn xmalloc(size: usize) -> *mut u8 {
    XALLOCATOR
        .allocate(size)
        .map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Frees a pointer returned by [`xmalloc`] or [`xrealloc`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
pub unsafe fn xfree(ptr: *mut u8) {
    unsafe { XALLOCATOR.deallocate(NonNull::new(ptr)) };
}

/// Resizes a block, returning null on failure or when `size` is `0`.
///
/// On failure `ptr` is left untouched.
///
/// # Safety
///
/// Same as [`xfree`].
#[must_use]
pub unsafe fn xrealloc(ptr: *mut u8, size: usize) -> *mut u8 {
    match unsafe { XALLOCATOR.resize(NonNull::new(ptr), size) } {
        Ok(Some(new)) => new.as_ptr(),
        Ok(None) | Err(_) => ptr::null_mut(),
    }
}

/// Logs the usage of every pool at info level.
pub fn xalloc_stats() {
    XALLOCATOR.log_usage();
}

#[must_use]
pub fn xalloc_usage() -> Usage {
    XALLOCATOR.report_usage()
}

/// Keeps the process-wide allocator initialized while alive.
///
/// The first live handle initializes the allocator, and dropping the last one
/// destroys it.
#[derive(Debug)]
pub struct InitDestroy {
    _private: (),
}

impl InitDestroy {
    /// # Safety
    ///
    /// Creating the first handle has the obligations of [`xalloc_init`], and
    /// dropping the last one those of [`xalloc_destroy`].
    #[must_use]
    pub unsafe fn new() -> Self {
        if INIT_COUNT.fetch_add(1, Ordering::AcqRel) == 0 {
            unsafe { xalloc_init() };
        }
        Self { _private: () }
    }
}

impl Drop for InitDestroy {
    fn drop(&mut self) {
        if INIT_COUNT.fetch_sub(1, Ordering::AcqRel) == 1 {
            unsafe { xalloc_destroy() };
        }
    }
}
