//! POSIX shared memory objects
//!
//! The backing store for a managed segment: a kernel object addressable by
//! name from any process, created/opened via `shm_open`, sized via
//! `ftruncate`, removed via `shm_unlink`. The object persists until it is
//! unlinked, independent of any process's open handles or mappings.

use std::fs::File;
use std::os::fd::OwnedFd;

use memmap2::MmapOptions;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use crate::error::{Result, SeuratError};

use super::mapping::{AccessMode, MappedRegion};

/// Longest accepted store name (portable NAME_MAX minus the leading slash)
pub const MAX_NAME_LEN: usize = 254;

/// Bounded wait iterations for a store a racing creator is still sizing
const SIZE_WAIT_ITERATIONS: u32 = 10_000;

/// An open named shared memory store.
///
/// Exclusively owns the process-local descriptor; dropping it never affects
/// the store itself or other processes' handles.
#[derive(Debug)]
pub struct SharedMemoryObject {
    name: String,
    file: File,
    mode: AccessMode,
}

impl SharedMemoryObject {
    /// Create a new store of `size` bytes; the name must not be in use.
    pub fn create(name: &str, size: u64) -> Result<Self> {
        validate_name(name)?;
        let path = shm_path(name);
        let fd = shm_open(
            path.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o600),
        )
        .map_err(|e| match e {
            Errno::EEXIST => SeuratError::already_exists(name),
            other => SeuratError::platform(format!("shm_open({}) failed: {}", path, other)),
        })?;
        let object = Self::from_fd(name, fd, AccessMode::ReadWrite);
        if let Err(e) = object.resize(size) {
            // never leave a half-created store behind
            let _ = Self::remove(name);
            return Err(e);
        }
        Ok(object)
    }

    /// Open the store if it exists, otherwise create it.
    ///
    /// Returns the open store and whether this call created it; the create
    /// branch is what triggers segment-manager placement upstream.
    pub fn open_or_create(name: &str, size: u64) -> Result<(Self, bool)> {
        validate_name(name)?;
        // Retried because both arms can lose a race: create against a
        // concurrent creator, open against a concurrent remover.
        for _ in 0..16 {
            match Self::create(name, size) {
                Ok(object) => return Ok((object, true)),
                Err(SeuratError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
            match Self::open(name, AccessMode::ReadWrite) {
                Ok(object) => return Ok((object, false)),
                Err(SeuratError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SeuratError::platform(format!(
            "open_or_create({}) kept racing against create/remove cycles",
            name
        )))
    }

    /// Open an existing store under the given mapping mode.
    pub fn open(name: &str, mode: AccessMode) -> Result<Self> {
        validate_name(name)?;
        let path = shm_path(name);
        let flags = match mode {
            AccessMode::ReadWrite => OFlag::O_RDWR,
            // a private (COW) mapping never writes back, read access suffices
            AccessMode::ReadOnly | AccessMode::CopyOnWrite => OFlag::O_RDONLY,
        };
        let fd = shm_open(path.as_str(), flags, Mode::empty()).map_err(|e| match e {
            Errno::ENOENT => SeuratError::not_found(name),
            other => SeuratError::platform(format!("shm_open({}) failed: {}", path, other)),
        })?;
        let object = Self::from_fd(name, fd, mode);
        object.wait_for_size()?;
        Ok(object)
    }

    /// Remove the store from the system.
    ///
    /// Existing mappings and open handles stay valid; the name becomes
    /// available for re-creation immediately.
    pub fn remove(name: &str) -> Result<()> {
        validate_name(name)?;
        let path = shm_path(name);
        shm_unlink(path.as_str()).map_err(|e| match e {
            Errno::ENOENT => SeuratError::not_found(name),
            other => SeuratError::platform(format!("shm_unlink({}) failed: {}", path, other)),
        })
    }

    /// Current size of the store in bytes
    pub fn len(&self) -> Result<u64> {
        let metadata = self
            .file
            .metadata()
            .map_err(|e| SeuratError::from_io(e, "Failed to stat shared memory object"))?;
        Ok(metadata.len())
    }

    /// Resize the backing store.
    ///
    /// Not safe concurrently with any live mapping of the store; callers
    /// uphold the whole-segment resize contract.
    pub fn resize(&self, new_size: u64) -> Result<()> {
        ftruncate(&self.file, new_size as libc::off_t).map_err(|e| {
            SeuratError::platform(format!("ftruncate({}) failed: {}", self.name, e))
        })
    }

    /// Map the whole store under this handle's access mode.
    pub fn map(&self) -> Result<MappedRegion> {
        let len = self.len()? as usize;
        if len == 0 {
            return Err(SeuratError::invalid_segment(format!(
                "store {} has zero size",
                self.name
            )));
        }
        let region = match self.mode {
            AccessMode::ReadWrite => {
                let map = unsafe { MmapOptions::new().len(len).map_mut(&self.file) }
                    .map_err(|e| SeuratError::from_io(e, "Failed to map store read-write"))?;
                MappedRegion::read_write(map)
            }
            AccessMode::ReadOnly => {
                let map = unsafe { MmapOptions::new().len(len).map(&self.file) }
                    .map_err(|e| SeuratError::from_io(e, "Failed to map store read-only"))?;
                MappedRegion::read_only(map)
            }
            AccessMode::CopyOnWrite => {
                let map = unsafe { MmapOptions::new().len(len).map_copy(&self.file) }
                    .map_err(|e| SeuratError::from_io(e, "Failed to map store copy-on-write"))?;
                MappedRegion::copy_on_write(map)
            }
        };
        Ok(region)
    }

    /// Name the store was opened under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The access mode fixed at open time
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    fn from_fd(name: &str, fd: OwnedFd, mode: AccessMode) -> Self {
        Self {
            name: name.to_string(),
            file: File::from(fd),
            mode,
        }
    }

    /// A freshly created store is zero-sized until its creator truncates
    /// it; wait that window out instead of failing the open.
    fn wait_for_size(&self) -> Result<()> {
        for i in 0..SIZE_WAIT_ITERATIONS {
            if self.len()? > 0 {
                return Ok(());
            }
            if i % 64 == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
        Err(SeuratError::invalid_segment(format!(
            "store {} stayed zero-sized; creator gone?",
            self.name
        )))
    }
}

fn shm_path(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() {
        return Err(SeuratError::invalid_parameter(
            "name",
            "Store name cannot be empty",
        ));
    }
    if bare.len() > MAX_NAME_LEN {
        return Err(SeuratError::invalid_parameter(
            "name",
            format!("Store name exceeds {} bytes", MAX_NAME_LEN),
        ));
    }
    if bare.contains('/') || bare.contains('\0') {
        return Err(SeuratError::invalid_parameter(
            "name",
            "Store name cannot contain '/' or NUL",
        ));
    }
    Ok(())
}
