//! Allocation strategies for the managed arena
//!
//! The arena is the byte range of a segment that follows the segment
//! header. An [`AllocationAlgorithm`] carves it into used and free blocks.
//! All bookkeeping lives *inside* the arena so that every process mapping
//! the segment observes the same allocator state; the strategy type itself
//! is a zero-sized compile-time marker and is never instantiated.
//!
//! Offsets handed out and accepted by the trait are relative to the arena
//! base. Callers serialize access externally (the segment manager holds the
//! segment lock around every mutating call).

pub mod best_fit;

pub use best_fit::BestFit;

use std::ptr::NonNull;

use crate::error::Result;

/// Maximum alignment an arena allocation may request.
///
/// Block payloads are laid out on 16-byte boundaries; larger alignments
/// would require padding blocks and are rejected as invalid parameters.
pub const MAX_ALLOC_ALIGN: usize = 16;

/// Compile-time allocation strategy over a shared memory arena.
///
/// Implementations place [`STATE_SIZE`](Self::STATE_SIZE) bytes of their
/// own bookkeeping at the start of the arena and manage the rest as blocks.
///
/// # Safety
///
/// Every method dereferences raw arena memory. Callers must guarantee that
/// `arena` points at a live mapping of at least the arena length in bytes,
/// 16-byte aligned, initialized by [`initialize`](Self::initialize) (except
/// for `initialize` itself), and that mutating calls are externally
/// serialized against each other.
pub trait AllocationAlgorithm {
    /// Bytes of in-arena bookkeeping placed at the start of the arena
    const STATE_SIZE: usize;

    /// Smallest arena this algorithm can be initialized over
    const MIN_ARENA_LEN: usize;

    /// Lay out fresh allocator state over an arena of `arena_len` bytes.
    ///
    /// # Safety
    /// See the trait-level contract; the arena must be writable.
    unsafe fn initialize(arena: NonNull<u8>, arena_len: usize);

    /// Allocate `size` bytes aligned to `align`.
    ///
    /// Returns the arena-relative offset of the payload. Fails with
    /// `InsufficientSpace` when no free block fits and `InvalidParameter`
    /// for a bad alignment.
    ///
    /// # Safety
    /// See the trait-level contract; the arena must be writable.
    unsafe fn allocate(arena: NonNull<u8>, size: usize, align: usize) -> Result<u64>;

    /// Return a payload previously produced by [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// See the trait-level contract; `offset` must come from `allocate` on
    /// this arena and must not have been deallocated already.
    unsafe fn deallocate(arena: NonNull<u8>, offset: u64);

    /// Extend the arena after the backing store grew.
    ///
    /// `old_len` is the previously tracked arena length, `new_len` the new
    /// mapping's arena length. Returns the arena length actually adopted
    /// (a tail too small to describe a block is left untracked).
    ///
    /// # Safety
    /// See the trait-level contract; the arena must be writable and the
    /// mapping at least `new_len` bytes long.
    unsafe fn grow(arena: NonNull<u8>, old_len: usize, new_len: usize) -> usize;

    /// Drop trailing free space.
    ///
    /// Returns the minimum arena length that still covers every live
    /// block (the high-water mark of current occupancy).
    ///
    /// # Safety
    /// See the trait-level contract; the arena must be writable.
    unsafe fn shrink_to_fit(arena: NonNull<u8>) -> usize;

    /// Payload bytes currently free
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn free_bytes(arena: NonNull<u8>) -> usize;

    /// Payload bytes currently allocated
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn used_bytes(arena: NonNull<u8>) -> usize;
}
