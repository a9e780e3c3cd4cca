//! In-block header recording the pool that owns a block.
//!
//! Every raw block handed out by a pool starts with one machine word naming
//! its owner. The client only ever sees the address right after that word.
//!
//! ```text
//! raw block pointer ──► ┌──────────────────────┐
//!                       │ BlockHeader (usize)  │
//! client pointer ─────► ├──────────────────────┤
//!                       │ payload              │
//!                       │ ...                  │
//!                       └──────────────────────┘
//! ```
//!
//! There is no magic number or checksum: passing a pointer that did not come
//! from [`wrap`] to [`owner_of`] or [`raw_of`] is undefined behavior.

use core::ptr::NonNull;

use crate::registry::PoolId;

/// Number of bytes reserved in front of every client pointer.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

#[repr(C)]
struct BlockHeader {
    owner: usize,
}
const _: () = assert!(size_of::<BlockHeader>() == size_of::<usize>());

/// Writes `owner` into the header of `raw` and returns the client pointer.
///
/// # Safety
///
/// `raw` must be aligned to `usize` and point to a block of at least
/// [`HEADER_SIZE`] writable bytes.
pub unsafe fn wrap(raw: NonNull<u8>, owner: PoolId) -> NonNull<u8> {
    unsafe {
        raw.cast::<BlockHeader>().write(BlockHeader {
            owner: owner.index(),
        });
        raw.add(HEADER_SIZE)
    }
}

/// Reads the owner recorded in front of `client`.
///
/// # Safety
///
/// `client` must have been returned by [`wrap`] and its block must still be
/// allocated.
pub unsafe fn owner_of(client: NonNull<u8>) -> PoolId {
    unsafe {
        let header = raw_of(client).cast::<BlockHeader>().read();
        PoolId::new(header.owner)
    }
}

/// Returns the raw block pointer behind `client`.
///
/// # Safety
///
/// `client` must have been returned by [`wrap`].
pub unsafe fn raw_of(client: NonNull<u8>) -> NonNull<u8> {
    unsafe { client.sub(HEADER_SIZE) }
}
