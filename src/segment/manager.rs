//! Segment manager: placement layer and named-object operations
//!
//! The manager is a process-local, copyable handle around the base pointer
//! of a mapped segment. It is obtained exactly two ways: `place` constructs
//! fresh bookkeeping on first creation, `locate` finds the existing
//! bookkeeping on reopen. Everything it manages (header, allocator state,
//! index nodes, object payloads) lives in the shared mapping; the handle
//! itself holds no state worth moving.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::alloc::AllocationAlgorithm;
use crate::error::{Result, SeuratError};
use crate::index::{IndexEntry, IndexPolicy};

use super::header::{SegmentHeader, HEADER_SIZE};

/// Non-owning handle to the segment bookkeeping inside a mapped region.
///
/// Valid only while the mapping that produced it is alive; the facade
/// guarantees this by carrying manager and mapping in one structure.
pub struct SegmentManager<A: AllocationAlgorithm, I: IndexPolicy> {
    base: NonNull<u8>,
    _strategies: PhantomData<fn() -> (A, I)>,
}

impl<A: AllocationAlgorithm, I: IndexPolicy> Clone for SegmentManager<A, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: AllocationAlgorithm, I: IndexPolicy> Copy for SegmentManager<A, I> {}

impl<A: AllocationAlgorithm, I: IndexPolicy> std::fmt::Debug for SegmentManager<A, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentManager")
            .field("base", &self.base)
            .finish()
    }
}

impl<A: AllocationAlgorithm, I: IndexPolicy> SegmentManager<A, I> {
    /// Smallest segment that can hold the header plus the allocator's
    /// minimum arena
    pub fn min_segment_size() -> usize {
        HEADER_SIZE + A::MIN_ARENA_LEN
    }

    /// Construct fresh segment bookkeeping over a new mapping.
    ///
    /// Runs once per segment lifetime, on the creating side only. The
    /// segment becomes visible to concurrent openers at the final publish.
    ///
    /// # Safety
    /// `base` must point at a writable mapping of exactly `total_size`
    /// bytes backed by a store no other process has opened yet, and the
    /// mapping must outlive the returned manager and all its copies.
    pub unsafe fn place(base: NonNull<u8>, total_size: usize) -> Result<Self> {
        if total_size < Self::min_segment_size() {
            return Err(SeuratError::insufficient_space(
                Self::min_segment_size(),
                total_size,
            ));
        }
        SegmentHeader::initialize(base, total_size);
        A::initialize(arena_base(base), total_size - HEADER_SIZE);
        I::initialize(&SegmentHeader::from_base(base).index_root);
        SegmentHeader::publish(base);
        Ok(Self::at(base))
    }

    /// Locate existing segment bookkeeping in a reopened mapping.
    ///
    /// # Safety
    /// `base` must point at a live mapping of `mapped_len` bytes, and the
    /// mapping must outlive the returned manager and all its copies.
    pub unsafe fn locate(base: NonNull<u8>, mapped_len: usize) -> Result<Self> {
        SegmentHeader::validate(base, mapped_len)?;
        Ok(Self::at(base))
    }

    fn at(base: NonNull<u8>) -> Self {
        Self {
            base,
            _strategies: PhantomData,
        }
    }

    fn header(&self) -> &SegmentHeader {
        unsafe { SegmentHeader::from_base(self.base) }
    }

    fn arena(&self) -> NonNull<u8> {
        arena_base(self.base)
    }

    /// Allocate and zero a named array of `count` elements of `elem_size`
    /// bytes each; returns the arena-relative payload offset.
    pub fn construct_raw(
        &self,
        name: &str,
        elem_size: usize,
        align: usize,
        count: usize,
    ) -> Result<u64> {
        let bytes = elem_size.checked_mul(count).ok_or_else(|| {
            SeuratError::invalid_parameter("count", "object byte size overflows")
        })?;
        let header = self.header();
        let _guard = header.lock.lock();
        let payload = unsafe {
            if I::find(&header.index_root, self.arena(), name).is_some() {
                return Err(SeuratError::object_exists(name));
            }
            let payload = A::allocate(self.arena(), bytes, align)?;
            std::ptr::write_bytes(self.arena().as_ptr().add(payload as usize), 0, bytes);
            let entry = IndexEntry {
                payload,
                count: count as u64,
                type_size: elem_size as u64,
            };
            if let Err(e) = I::insert::<A>(&header.index_root, self.arena(), name, entry) {
                A::deallocate(self.arena(), payload);
                return Err(e);
            }
            payload
        };
        header.num_named.fetch_add(1, Ordering::Relaxed);
        Ok(payload)
    }

    /// Look up a named object under the segment lock
    pub fn find_named(&self, name: &str) -> Option<IndexEntry> {
        let header = self.header();
        let _guard = header.lock.lock();
        unsafe { I::find(&header.index_root, self.arena(), name) }
    }

    /// Look up a named object without taking the segment lock.
    ///
    /// The read-only lookup path: a read-only mapping cannot write the lock
    /// word, and has no mutation to guard against through itself.
    pub fn find_named_no_lock(&self, name: &str) -> Option<IndexEntry> {
        let header = self.header();
        unsafe { I::find(&header.index_root, self.arena(), name) }
    }

    /// Remove a named object and free its storage; false when absent
    pub fn destroy_named(&self, name: &str) -> bool {
        let header = self.header();
        let _guard = header.lock.lock();
        match unsafe { I::remove::<A>(&header.index_root, self.arena(), name) } {
            Some(entry) => {
                unsafe { A::deallocate(self.arena(), entry.payload) };
                header.num_named.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Turn an arena-relative payload offset into a typed pointer
    pub fn resolve<T>(&self, arena_offset: u64) -> NonNull<T> {
        unsafe {
            NonNull::new_unchecked(self.arena().as_ptr().add(arena_offset as usize) as *mut T)
        }
    }

    /// Visit every named object under the segment lock
    pub fn for_each_named(&self, visit: &mut dyn FnMut(&str, &IndexEntry)) {
        let header = self.header();
        let _guard = header.lock.lock();
        unsafe { I::for_each(&header.index_root, self.arena(), visit) }
    }

    /// Total segment size in bytes, header included
    pub fn total_size(&self) -> usize {
        self.header().total_size()
    }

    /// Payload bytes currently free in the arena
    pub fn free_bytes(&self) -> usize {
        unsafe { A::free_bytes(self.arena()) }
    }

    /// Payload bytes currently allocated in the arena
    pub fn used_bytes(&self) -> usize {
        unsafe { A::used_bytes(self.arena()) }
    }

    /// Number of named objects currently in the segment
    pub fn num_named(&self) -> usize {
        self.header().num_named.load(Ordering::Relaxed) as usize
    }

    /// Hand the grown backing store's new bytes to the allocator.
    ///
    /// `old_total`/`new_total` are whole-segment sizes. Returns the total
    /// size actually adopted (the allocator may refuse an undersized tail).
    pub fn grow_arena(&self, old_total: usize, new_total: usize) -> usize {
        let adopted = unsafe {
            A::grow(
                self.arena(),
                old_total - HEADER_SIZE,
                new_total - HEADER_SIZE,
            )
        };
        let total = HEADER_SIZE + adopted;
        self.header().set_total_size(total);
        total
    }

    /// Drop the arena's trailing free space; returns the new minimum
    /// whole-segment size.
    pub fn shrink_arena(&self) -> usize {
        let arena_len = unsafe { A::shrink_to_fit(self.arena()) };
        let total = HEADER_SIZE + arena_len;
        self.header().set_total_size(total);
        total
    }
}

fn arena_base(base: NonNull<u8>) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(base.as_ptr().add(HEADER_SIZE)) }
}
