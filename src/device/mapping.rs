//! Mapping modes and mapped regions

use std::ptr::NonNull;

use memmap2::{Mmap, MmapMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeuratError};

/// How a shared memory store is mapped into this process.
///
/// Fixed when the store is opened; immutable for the handle's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Shared mapping; writes are visible to every process
    ReadWrite,
    /// Shared mapping; writes are impossible
    ReadOnly,
    /// Private mapping; writes go to process-local copies of the pages
    CopyOnWrite,
}

impl AccessMode {
    /// Whether writes through this mapping are possible at all
    pub fn is_writable(&self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    /// Get a human-readable name for the mode
    pub fn name(&self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "read-write",
            AccessMode::ReadOnly => "read-only",
            AccessMode::CopyOnWrite => "copy-on-write",
        }
    }
}

#[derive(Debug)]
enum RawMapping {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
    CopyOnWrite(MmapMut),
}

/// A store mapped into the process's address space.
///
/// Owns the mapping; unmapped on drop. The base pointer and length are
/// captured at creation time and stay valid for the lifetime of the value
/// (the pages do not move when the struct does).
#[derive(Debug)]
pub struct MappedRegion {
    raw: RawMapping,
    base: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    pub(crate) fn read_write(mut map: MmapMut) -> Self {
        let base = NonNull::new(map.as_mut_ptr()).expect("mmap returned null");
        let len = map.len();
        Self {
            raw: RawMapping::ReadWrite(map),
            base,
            len,
        }
    }

    pub(crate) fn copy_on_write(mut map: MmapMut) -> Self {
        let base = NonNull::new(map.as_mut_ptr()).expect("mmap returned null");
        let len = map.len();
        Self {
            raw: RawMapping::CopyOnWrite(map),
            base,
            len,
        }
    }

    pub(crate) fn read_only(map: Mmap) -> Self {
        // Never written through; the cast only unifies the pointer type.
        let base = NonNull::new(map.as_ptr() as *mut u8).expect("mmap returned null");
        let len = map.len();
        Self {
            raw: RawMapping::ReadOnly(map),
            base,
            len,
        }
    }

    /// Base address of the mapping
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Length of the mapping in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is zero-sized
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The mode this region was mapped under
    pub fn mode(&self) -> AccessMode {
        match self.raw {
            RawMapping::ReadWrite(_) => AccessMode::ReadWrite,
            RawMapping::ReadOnly(_) => AccessMode::ReadOnly,
            RawMapping::CopyOnWrite(_) => AccessMode::CopyOnWrite,
        }
    }

    /// Flush shared-mapping changes back to the store.
    ///
    /// A no-op for read-only and copy-on-write mappings, which have nothing
    /// to write back.
    pub fn flush(&self) -> Result<()> {
        match &self.raw {
            RawMapping::ReadWrite(map) => map
                .flush()
                .map_err(|e| SeuratError::from_io(e, "Failed to flush mapping")),
            RawMapping::ReadOnly(_) | RawMapping::CopyOnWrite(_) => Ok(()),
        }
    }
}

// The mapping is plain memory; cross-process consistency of its contents is
// governed by the segment-level synchronization built on top of it.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}
