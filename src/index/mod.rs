//! Name index strategies for named objects in a segment
//!
//! The index maps object names to their locations inside the arena. Like
//! the allocator, its nodes live in the shared arena itself (allocated
//! through the segment's [`AllocationAlgorithm`]) so every process mapping
//! the segment sees the same table; the strategy type is a zero-sized
//! compile-time marker. The root offset is a single word owned by the
//! segment header and handed in by the caller.
//!
//! Mutating calls are serialized externally by the segment lock; `find`
//! has no such requirement and is what the non-locking lookup path uses.

pub mod list_index;

pub use list_index::ListIndex;

use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;

use crate::alloc::AllocationAlgorithm;
use crate::error::Result;

/// Location record for one named object: its offset, element count, and
/// element size, everything the table stores besides the name itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Arena-relative offset of the object payload
    pub payload: u64,
    /// Number of elements in the object array
    pub count: u64,
    /// Size in bytes of one element (the type tag)
    pub type_size: u64,
}

/// Compile-time name index strategy over a shared memory arena.
///
/// # Safety
///
/// Every method dereferences raw arena memory. Callers must guarantee that
/// `arena` points at a live, initialized mapping, that `root` is the
/// index-root word of the same segment, and that mutating calls (`insert`,
/// `remove`) are externally serialized against each other and against
/// concurrent `find`/`for_each` calls on writable mappings.
pub trait IndexPolicy {
    /// Reset the index to empty
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn initialize(root: &AtomicU64);

    /// Insert a name → entry binding. The name must not already be present.
    ///
    /// # Safety
    /// See the trait-level contract; the arena must be writable.
    unsafe fn insert<A: AllocationAlgorithm>(
        root: &AtomicU64,
        arena: NonNull<u8>,
        name: &str,
        entry: IndexEntry,
    ) -> Result<()>;

    /// Look up a name. Absence is a normal `None`, never an error.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn find(root: &AtomicU64, arena: NonNull<u8>, name: &str) -> Option<IndexEntry>;

    /// Remove a binding, returning it so the caller can free the payload.
    ///
    /// # Safety
    /// See the trait-level contract; the arena must be writable.
    unsafe fn remove<A: AllocationAlgorithm>(
        root: &AtomicU64,
        arena: NonNull<u8>,
        name: &str,
    ) -> Option<IndexEntry>;

    /// Visit every binding in index order
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn for_each(
        root: &AtomicU64,
        arena: NonNull<u8>,
        visit: &mut dyn FnMut(&str, &IndexEntry),
    );
}
