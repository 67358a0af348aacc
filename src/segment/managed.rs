//! Managed shared memory facade
//!
//! The user-facing handle over a named segment: one constructor per
//! open/create mode, move-only ownership of the process-local mapping,
//! typed named-object lookup, and whole-segment resize operations bound to
//! a name instead of a live handle.

use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::alloc::{AllocationAlgorithm, BestFit};
use crate::device::{AccessMode, MappedRegion, SharedMemoryObject};
use crate::error::{Result, SeuratError};
use crate::index::{IndexPolicy, ListIndex};

use super::manager::SegmentManager;

/// A managed named-object shared memory segment.
///
/// The handle exclusively owns its process-local device and mapping; the
/// segment contents (allocator state, name index, objects) are shared,
/// persistent state that outlives every handle. Dropping a handle releases
/// only local resources. The type is move-only; [`swap`](Self::swap) and
/// [`take`](Self::take) transfer the resource explicitly.
///
/// `ManagedSegment` is generic over the allocation algorithm and name
/// index; [`ManagedSharedMemory`] fixes both to the crate defaults.
pub struct ManagedSegment<A, I>
where
    A: AllocationAlgorithm,
    I: IndexPolicy,
{
    inner: Option<Inner<A, I>>,
}

/// The crate-default managed segment: best-fit allocation, list index.
pub type ManagedSharedMemory = ManagedSegment<BestFit, ListIndex>;

struct Inner<A: AllocationAlgorithm, I: IndexPolicy> {
    device: SharedMemoryObject,
    region: MappedRegion,
    manager: SegmentManager<A, I>,
}

/// Snapshot of a segment's occupancy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentStats {
    pub name: String,
    pub mode: AccessMode,
    /// Total segment size in bytes, header included
    pub size: usize,
    /// Payload bytes currently free
    pub free_bytes: usize,
    /// Payload bytes currently allocated
    pub used_bytes: usize,
    /// Number of named objects
    pub named_objects: usize,
}

/// One entry of the named-object listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedObjectInfo {
    pub name: String,
    /// Number of elements in the object array
    pub count: usize,
    /// Size in bytes of one element
    pub type_size: usize,
}

impl<A: AllocationAlgorithm, I: IndexPolicy> ManagedSegment<A, I> {
    /// Create the segment; the store must not already exist.
    ///
    /// Creates a backing store of `size` bytes, maps it read-write, and
    /// places fresh segment bookkeeping in it. On any failure after the
    /// store was created the store is removed again, so a failed creation
    /// leaves nothing behind.
    pub fn create_only(name: &str, size: usize) -> Result<Self> {
        if size < SegmentManager::<A, I>::min_segment_size() {
            return Err(SeuratError::insufficient_space(
                SegmentManager::<A, I>::min_segment_size(),
                size,
            ));
        }
        let device = SharedMemoryObject::create(name, size as u64)?;
        match Self::place_new(device) {
            Ok(segment) => {
                debug!(name, size, "created managed segment");
                Ok(segment)
            }
            Err(e) => {
                let _ = SharedMemoryObject::remove(name);
                Err(e)
            }
        }
    }

    /// Open the segment if the store exists, otherwise create it.
    ///
    /// Segment bookkeeping is placed only on the create branch; the open
    /// branch locates the bookkeeping placed by the original creator.
    pub fn open_or_create(name: &str, size: usize) -> Result<Self> {
        // `size` only matters on the create branch; an existing segment
        // opens regardless of it, so the placement check runs after the
        // branch is known
        let (device, created) = SharedMemoryObject::open_or_create(name, size as u64)?;
        if created {
            match Self::place_new(device) {
                Ok(segment) => {
                    debug!(name, size, "created managed segment");
                    Ok(segment)
                }
                Err(e) => {
                    let _ = SharedMemoryObject::remove(name);
                    Err(e)
                }
            }
        } else {
            let segment = Self::open_existing(device)?;
            debug!(name, "opened managed segment");
            Ok(segment)
        }
    }

    /// Open an existing segment with a read-write mapping.
    pub fn open_only(name: &str) -> Result<Self> {
        Self::open_mode(name, AccessMode::ReadWrite)
    }

    /// Open an existing segment with a read-only mapping.
    ///
    /// Lookups through this handle use the non-locking path; mutation is
    /// impossible.
    pub fn open_read_only(name: &str) -> Result<Self> {
        Self::open_mode(name, AccessMode::ReadOnly)
    }

    /// Open an existing segment with a copy-on-write mapping.
    ///
    /// Writes through this handle land in process-private page copies and
    /// are never visible to other handles.
    pub fn open_copy_on_write(name: &str) -> Result<Self> {
        Self::open_mode(name, AccessMode::CopyOnWrite)
    }

    fn open_mode(name: &str, mode: AccessMode) -> Result<Self> {
        let device = SharedMemoryObject::open(name, mode)?;
        let segment = Self::open_existing(device)?;
        debug!(name, mode = mode.name(), "opened managed segment");
        Ok(segment)
    }

    fn place_new(device: SharedMemoryObject) -> Result<Self> {
        let region = device.map()?;
        let manager = unsafe { SegmentManager::place(region.base(), region.len())? };
        Ok(Self {
            inner: Some(Inner {
                device,
                region,
                manager,
            }),
        })
    }

    fn open_existing(device: SharedMemoryObject) -> Result<Self> {
        let region = device.map()?;
        let manager = unsafe { SegmentManager::locate(region.base(), region.len())? };
        Ok(Self {
            inner: Some(Inner {
                device,
                region,
                manager,
            }),
        })
    }

    /// Exchange the resources of two handles.
    ///
    /// Never fails; self-swap is a no-op.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.inner, &mut other.inner);
    }

    /// Move the resource out, leaving this handle empty.
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Whether this handle currently holds an open segment
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Find a previously constructed named array of `T`.
    ///
    /// Returns the payload pointer and element count, or `None` when the
    /// name is absent or was constructed with a different element size.
    /// Read-only handles use the segment manager's non-locking lookup;
    /// all other modes take the segment lock.
    ///
    /// The returned pointer is valid while this handle stays open;
    /// dereferencing it is subject to the usual shared-memory caveats
    /// (cross-process writers, `T` must be valid for any bit pattern the
    /// other side writes).
    ///
    /// # Panics
    /// Panics when called on an empty handle.
    pub fn find<T>(&self, name: &str) -> Option<(NonNull<T>, usize)> {
        let inner = self.expect_inner("find");
        let entry = if inner.device.mode() == AccessMode::ReadOnly {
            inner.manager.find_named_no_lock(name)
        } else {
            inner.manager.find_named(name)
        }?;
        if entry.type_size != std::mem::size_of::<T>() as u64 {
            return None;
        }
        Some((inner.manager.resolve::<T>(entry.payload), entry.count as usize))
    }

    /// Construct a named array of `count` copies of `init`.
    ///
    /// Fails with `ObjectExists` when the name is taken, `ReadOnly` through
    /// a read-only mapping, and `InsufficientSpace` when the arena cannot
    /// fit the array. Through a copy-on-write mapping the object lands in
    /// this process's private copy only.
    ///
    /// # Panics
    /// Panics when called on an empty handle.
    pub fn construct<T: Copy>(&self, name: &str, count: usize, init: T) -> Result<NonNull<T>> {
        let inner = self.expect_inner("construct");
        if !inner.device.mode().is_writable() {
            return Err(SeuratError::ReadOnly);
        }
        if count == 0 {
            return Err(SeuratError::invalid_parameter(
                "count",
                "Object must have at least one element",
            ));
        }
        let offset = inner.manager.construct_raw(
            name,
            std::mem::size_of::<T>(),
            std::mem::align_of::<T>(),
            count,
        )?;
        let ptr = inner.manager.resolve::<T>(offset);
        unsafe {
            for i in 0..count {
                ptr.as_ptr().add(i).write(init);
            }
        }
        trace!(name, count, "constructed named object");
        Ok(ptr)
    }

    /// Destroy a named object, freeing its storage.
    ///
    /// Returns false when the name is absent or the mapping is read-only.
    ///
    /// # Panics
    /// Panics when called on an empty handle.
    pub fn destroy(&self, name: &str) -> bool {
        let inner = self.expect_inner("destroy");
        if !inner.device.mode().is_writable() {
            return false;
        }
        let destroyed = inner.manager.destroy_named(name);
        if destroyed {
            trace!(name, "destroyed named object");
        }
        destroyed
    }

    /// Name of the underlying store
    pub fn name(&self) -> &str {
        self.expect_inner("name").device.name()
    }

    /// The mapping mode fixed at construction
    pub fn mode(&self) -> AccessMode {
        self.expect_inner("mode").device.mode()
    }

    /// Total segment size in bytes, header included
    pub fn size(&self) -> usize {
        self.expect_inner("size").manager.total_size()
    }

    /// Payload bytes currently free in the arena
    pub fn free_bytes(&self) -> usize {
        self.expect_inner("free_bytes").manager.free_bytes()
    }

    /// Number of named objects currently in the segment
    pub fn num_named_objects(&self) -> usize {
        self.expect_inner("num_named_objects").manager.num_named()
    }

    /// Snapshot the segment's occupancy
    pub fn stats(&self) -> SegmentStats {
        let inner = self.expect_inner("stats");
        SegmentStats {
            name: inner.device.name().to_string(),
            mode: inner.device.mode(),
            size: inner.manager.total_size(),
            free_bytes: inner.manager.free_bytes(),
            used_bytes: inner.manager.used_bytes(),
            named_objects: inner.manager.num_named(),
        }
    }

    /// List the named objects currently in the segment.
    ///
    /// The listing is a snapshot taken under the segment lock; it can be
    /// stale by the time it is inspected.
    pub fn named_objects(&self) -> Vec<NamedObjectInfo> {
        let inner = self.expect_inner("named_objects");
        let mut out = Vec::with_capacity(inner.manager.num_named());
        inner.manager.for_each_named(&mut |name, entry| {
            out.push(NamedObjectInfo {
                name: name.to_string(),
                count: entry.count as usize,
                type_size: entry.type_size as usize,
            });
        });
        out
    }

    /// Flush shared-mapping changes back to the store
    pub fn flush(&self) -> Result<()> {
        self.expect_inner("flush").region.flush()
    }

    /// Extend the named segment's backing store by `extra_bytes`.
    ///
    /// Operates on the store directly, without a live handle; the caller
    /// must guarantee no process has the segment open or mapped while this
    /// runs. Existing objects keep their offsets. Returns success; failures
    /// (missing store, resize rejection) are reported as `false` and
    /// logged.
    pub fn grow(name: &str, extra_bytes: usize) -> bool {
        match Self::try_grow(name, extra_bytes) {
            Ok(new_total) => {
                debug!(name, extra_bytes, new_total, "grew managed segment");
                true
            }
            Err(e) => {
                debug!(name, extra_bytes, error = %e, "grow failed");
                false
            }
        }
    }

    /// Shrink the named segment's backing store to the smallest size that
    /// still holds its live objects.
    ///
    /// Same no-concurrent-mapping contract as [`grow`](Self::grow).
    pub fn shrink_to_fit(name: &str) -> bool {
        match Self::try_shrink(name) {
            Ok(new_total) => {
                debug!(name, new_total, "shrank managed segment");
                true
            }
            Err(e) => {
                debug!(name, error = %e, "shrink_to_fit failed");
                false
            }
        }
    }

    fn try_grow(name: &str, extra_bytes: usize) -> Result<usize> {
        let device = SharedMemoryObject::open(name, AccessMode::ReadWrite)?;
        let old_len = device.len()?;
        device.resize(old_len + extra_bytes as u64)?;
        let region = device.map()?;
        let manager = unsafe { SegmentManager::<A, I>::locate(region.base(), region.len())? };
        let stored_total = manager.total_size();
        Ok(manager.grow_arena(stored_total, region.len()))
    }

    fn try_shrink(name: &str) -> Result<usize> {
        let device = SharedMemoryObject::open(name, AccessMode::ReadWrite)?;
        let region = device.map()?;
        let manager = unsafe { SegmentManager::<A, I>::locate(region.base(), region.len())? };
        let new_total = manager.shrink_arena();
        let mapped_len = region.len();
        drop(region);
        if new_total < mapped_len {
            device.resize(new_total as u64)?;
        }
        Ok(new_total)
    }

    fn expect_inner(&self, op: &str) -> &Inner<A, I> {
        self.inner
            .as_ref()
            .unwrap_or_else(|| panic!("{} called on an empty ManagedSegment handle", op))
    }
}

impl<A: AllocationAlgorithm, I: IndexPolicy> Default for ManagedSegment<A, I> {
    /// An empty handle holding no resource; useful with move semantics
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<A: AllocationAlgorithm, I: IndexPolicy> std::fmt::Debug for ManagedSegment<A, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("ManagedSegment")
                .field("name", &inner.device.name())
                .field("mode", &inner.device.mode())
                .field("size", &inner.manager.total_size())
                .finish(),
            None => f.debug_struct("ManagedSegment").field("empty", &true).finish(),
        }
    }
}

// The handle's local fields are exclusively owned; every touch of the
// shared segment state goes through in-segment atomics or the segment
// lock, which is exactly the cross-process discipline other mappings of
// the same store already rely on.
unsafe impl<A: AllocationAlgorithm, I: IndexPolicy> Send for ManagedSegment<A, I> {}
unsafe impl<A: AllocationAlgorithm, I: IndexPolicy> Sync for ManagedSegment<A, I> {}
