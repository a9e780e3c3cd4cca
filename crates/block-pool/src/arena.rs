//! Arenas backing a pool.
//!
//! Every arena is a single heap allocation that starts with an
//! [`ArenaHeader`]. The headers form a singly linked list so the pool can
//! return every arena to the heap when it is dropped.

use core::{
    alloc::Layout,
    ptr::{self, NonNull},
};

/// Header stored at the beginning of every arena.
#[repr(C, align(16))]
#[derive(Debug)]
struct ArenaHeader {
    /// Next arena in the list, or null for the oldest one.
    next: *mut Self,
    /// Size in bytes of the block area following this header.
    size: usize,
}
const _: () = assert!(size_of::<ArenaHeader>() == align_of::<ArenaHeader>());

impl ArenaHeader {
    const SIZE: usize = size_of::<Self>();

    fn layout(size: usize) -> Option<Layout> {
        let total = Self::SIZE.checked_add(size)?;
        Layout::from_size_align(total, align_of::<Self>()).ok()
    }

    /// Returns the first byte of the block area behind `header`.
    ///
    /// # Safety
    ///
    /// `header` must point to a live arena.
    unsafe fn blocks(header: NonNull<Self>) -> NonNull<u8> {
        unsafe { header.add(1).cast() }
    }
}

/// The list of arenas owned by one pool, newest first.
#[derive(Debug)]
pub(crate) struct ArenaList {
    head: *mut ArenaHeader,
    count: usize,
}

impl ArenaList {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            count: 0,
        }
    }

    pub(crate) const fn count(&self) -> usize {
        self.count
    }

    /// Requests a new arena with `size` bytes of block area from the heap.
    ///
    /// Returns a pointer to the start of the block area, aligned to 16 bytes,
    /// or `None` if the heap cannot satisfy the request.
    pub(crate) fn push_new(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = ArenaHeader::layout(size)?;
        let header = NonNull::new(unsafe { alloc::alloc::alloc(layout) })?.cast::<ArenaHeader>();
        unsafe {
            header.write(ArenaHeader {
                next: self.head,
                size,
            });
        }
        self.head = header.as_ptr();
        self.count += 1;
        Some(unsafe { ArenaHeader::blocks(header) })
    }

    /// Returns `true` if `ptr` is the start of a block carved with `stride`
    /// from one of the arenas.
    pub(crate) fn contains_block(&self, ptr: NonNull<u8>, stride: usize) -> bool {
        let addr = ptr.addr().get();
        let mut current = self.head;
        while let Some(header) = NonNull::new(current) {
            unsafe {
                let start = ArenaHeader::blocks(header).addr().get();
                let size = header.as_ref().size;
                if (start..start + size).contains(&addr) {
                    return (addr - start).is_multiple_of(stride);
                }
                current = header.as_ref().next;
            }
        }
        false
    }
}

impl Drop for ArenaList {
    fn drop(&mut self) {
        let mut current = self.head;
        while let Some(header) = NonNull::new(current) {
            unsafe {
                let ArenaHeader { next, size } = header.read();
                if let Some(layout) = ArenaHeader::layout(size) {
                    alloc::alloc::dealloc(header.as_ptr().cast(), layout);
                }
                current = next;
            }
        }
        self.head = ptr::null_mut();
        self.count = 0;
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list() {
        let list = ArenaList::new();
        assert_eq!(list.count(), 0);
        let mut word = 0_usize;
        assert!(!list.contains_block(NonNull::from(&mut word).cast(), 8));
    }

    #[test]
    fn test_zero_sized_arena() {
        let mut list = ArenaList::new();
        assert!(list.push_new(0).is_none());
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn test_arena_alignment() {
        let mut list = ArenaList::new();
        let blocks = list.push_new(64).unwrap();
        assert_eq!(blocks.addr().get() % 16, 0);
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn test_contains_block() {
        let mut list = ArenaList::new();
        let first = list.push_new(4 * 24).unwrap();
        let second = list.push_new(2 * 24).unwrap();
        assert_eq!(list.count(), 2);

        unsafe {
            assert!(list.contains_block(first, 24));
            assert!(list.contains_block(first.add(3 * 24), 24));
            assert!(!list.contains_block(first.add(4 * 24), 24));
            assert!(!list.contains_block(first.add(12), 24));
            assert!(list.contains_block(second.add(24), 24));
        }
    }

    #[test]
    fn test_blocks_are_writable() {
        let mut list = ArenaList::new();
        let blocks = list.push_new(256).unwrap();
        unsafe {
            blocks.write_bytes(0x33, 256);
            for i in 0..256 {
                assert_eq!(blocks.add(i).read(), 0x33);
            }
        }
    }
}
