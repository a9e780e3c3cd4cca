//! Intrusive free list of equally sized blocks.
//!
//! A free block stores the pointer to the next free block in its own first
//! word, so the list needs no storage besides the blocks themselves.

use core::ptr::{self, NonNull};

/// A node written at the beginning of every free block.
#[repr(C)]
struct FreeBlock {
    next: *mut Self,
}

/// A LIFO list of free blocks.
#[derive(Debug)]
pub(crate) struct FreeList {
    head: *mut FreeBlock,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Pushes a free block onto the list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `block` is aligned to `usize` and points to at least
    ///   `size_of::<usize>()` writable bytes
    /// - `block` is not already in the list and is not used by anyone else
    ///   until it is popped again
    pub(crate) unsafe fn push(&mut self, block: NonNull<u8>) {
        let node = block.cast::<FreeBlock>();
        debug_assert!(node.is_aligned(), "free block must be word aligned");
        unsafe {
            node.write(FreeBlock { next: self.head });
        }
        self.head = node.as_ptr();
        self.len += 1;
    }

    /// Pops the most recently pushed block.
    pub(crate) fn pop(&mut self) -> Option<NonNull<u8>> {
        let node = NonNull::new(self.head)?;
        unsafe {
            self.head = node.as_ref().next;
        }
        self.len -= 1;
        Some(node.cast())
    }
}
