//! Intrusive singly-linked list index
//!
//! Each binding is one arena allocation: a fixed node header followed by
//! the name bytes. Nodes are threaded through arena-relative offsets, new
//! bindings are pushed at the head. Lookup compares a 64-bit FNV-1a hash
//! before the name bytes, so misses usually cost one word per node.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{IndexEntry, IndexPolicy};
use crate::alloc::AllocationAlgorithm;
use crate::error::Result;

/// End-of-list marker; offset 0 is allocator state, never a node
const NIL: u64 = 0;

#[repr(C)]
struct NodeHeader {
    /// Arena offset of the next node, NIL at the tail
    next: u64,
    name_hash: u64,
    payload: u64,
    count: u64,
    type_size: u64,
    name_len: u32,
    _pad: u32,
}

const NODE_HEADER_SIZE: usize = std::mem::size_of::<NodeHeader>();

/// Linked-list name index; the crate default.
///
/// Never instantiated; all operations are static over the arena memory.
#[derive(Debug)]
pub enum ListIndex {}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

unsafe fn node(arena: NonNull<u8>, offset: u64) -> *mut NodeHeader {
    arena.as_ptr().add(offset as usize) as *mut NodeHeader
}

unsafe fn node_name<'a>(arena: NonNull<u8>, offset: u64, len: u32) -> &'a [u8] {
    std::slice::from_raw_parts(
        arena.as_ptr().add(offset as usize + NODE_HEADER_SIZE),
        len as usize,
    )
}

unsafe fn entry_of(header: &NodeHeader) -> IndexEntry {
    IndexEntry {
        payload: header.payload,
        count: header.count,
        type_size: header.type_size,
    }
}

impl IndexPolicy for ListIndex {
    unsafe fn initialize(root: &AtomicU64) {
        root.store(NIL, Ordering::Release);
    }

    unsafe fn insert<A: AllocationAlgorithm>(
        root: &AtomicU64,
        arena: NonNull<u8>,
        name: &str,
        entry: IndexEntry,
    ) -> Result<()> {
        let bytes = name.as_bytes();
        let off = A::allocate(arena, NODE_HEADER_SIZE + bytes.len(), 8)?;
        node(arena, off).write(NodeHeader {
            next: root.load(Ordering::Acquire),
            name_hash: fnv1a(bytes),
            payload: entry.payload,
            count: entry.count,
            type_size: entry.type_size,
            name_len: bytes.len() as u32,
            _pad: 0,
        });
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            arena.as_ptr().add(off as usize + NODE_HEADER_SIZE),
            bytes.len(),
        );
        root.store(off, Ordering::Release);
        Ok(())
    }

    unsafe fn find(root: &AtomicU64, arena: NonNull<u8>, name: &str) -> Option<IndexEntry> {
        let bytes = name.as_bytes();
        let hash = fnv1a(bytes);
        let mut cur = root.load(Ordering::Acquire);
        while cur != NIL {
            let header = &*node(arena, cur);
            if header.name_hash == hash && node_name(arena, cur, header.name_len) == bytes {
                return Some(entry_of(header));
            }
            cur = header.next;
        }
        None
    }

    unsafe fn remove<A: AllocationAlgorithm>(
        root: &AtomicU64,
        arena: NonNull<u8>,
        name: &str,
    ) -> Option<IndexEntry> {
        let bytes = name.as_bytes();
        let hash = fnv1a(bytes);
        let mut prev = NIL;
        let mut cur = root.load(Ordering::Acquire);
        while cur != NIL {
            let header = &*node(arena, cur);
            if header.name_hash == hash && node_name(arena, cur, header.name_len) == bytes {
                let entry = entry_of(header);
                let next = header.next;
                if prev == NIL {
                    root.store(next, Ordering::Release);
                } else {
                    (*node(arena, prev)).next = next;
                }
                A::deallocate(arena, cur);
                return Some(entry);
            }
            prev = cur;
            cur = header.next;
        }
        None
    }

    unsafe fn for_each(
        root: &AtomicU64,
        arena: NonNull<u8>,
        visit: &mut dyn FnMut(&str, &IndexEntry),
    ) {
        let mut cur = root.load(Ordering::Acquire);
        while cur != NIL {
            let header = &*node(arena, cur);
            if let Ok(name) = std::str::from_utf8(node_name(arena, cur, header.name_len)) {
                visit(name, &entry_of(header));
            }
            cur = header.next;
        }
    }
}
