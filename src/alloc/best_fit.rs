//! Best-fit free-list allocator embedded in the arena
//!
//! Layout: a 32-byte state record at the arena base, then a sequence of
//! blocks tiling the rest of the (16-byte trimmed) arena. Each block is a
//! 16-byte header followed by its payload. Free blocks are linked into an
//! address-ordered list threaded through their headers; allocation scans
//! the list for the smallest fitting block, deallocation coalesces with
//! physically adjacent free neighbors.
//!
//! Block header words:
//!   word 0: payload size in bytes, low bit set while the block is in use
//!   word 1: arena offset of the next free block (free blocks only)

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{AllocationAlgorithm, MAX_ALLOC_ALIGN};
use crate::error::{Result, SeuratError};

/// Allocation granularity; payload sizes and block offsets are multiples of this
const GRANULARITY: usize = 16;

/// Bytes of header in front of every block payload
const BLOCK_HEADER: u64 = 16;

/// Low bit of the size word, set while the block is allocated
const USED_BIT: u64 = 1;

/// Null offset in the free list (offset 0 is state, never a block)
const NIL: u64 = 0;

/// Arena offset of the first block header
const FIRST_BLOCK: u64 = 32;

#[repr(C)]
struct BestFitState {
    /// Tracked arena length; multiple of the granularity
    arena_len: AtomicU64,
    /// Offset of the first free block, NIL when full
    free_head: AtomicU64,
    /// Payload bytes currently allocated
    used_bytes: AtomicU64,
    /// Payload bytes currently free
    free_bytes: AtomicU64,
}

/// Address-ordered best-fit free-list strategy; the crate default.
///
/// Never instantiated; all operations are static over the arena memory.
#[derive(Debug)]
pub enum BestFit {}

unsafe fn state<'a>(arena: NonNull<u8>) -> &'a BestFitState {
    &*(arena.as_ptr() as *const BestFitState)
}

unsafe fn read_word(arena: NonNull<u8>, offset: u64) -> u64 {
    (arena.as_ptr().add(offset as usize) as *const u64).read()
}

unsafe fn write_word(arena: NonNull<u8>, offset: u64, value: u64) {
    (arena.as_ptr().add(offset as usize) as *mut u64).write(value);
}

/// Point `prev`'s next-free slot (or the list head for NIL) at `value`
unsafe fn set_next(arena: NonNull<u8>, prev: u64, value: u64) {
    if prev == NIL {
        state(arena).free_head.store(value, Ordering::Relaxed);
    } else {
        write_word(arena, prev + 8, value);
    }
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

fn trim(len: usize) -> u64 {
    (len & !(GRANULARITY - 1)) as u64
}

impl AllocationAlgorithm for BestFit {
    const STATE_SIZE: usize = std::mem::size_of::<BestFitState>();

    const MIN_ARENA_LEN: usize = FIRST_BLOCK as usize + BLOCK_HEADER as usize + GRANULARITY;

    unsafe fn initialize(arena: NonNull<u8>, arena_len: usize) {
        let usable = trim(arena_len);
        debug_assert!(usable >= Self::MIN_ARENA_LEN as u64);

        let payload = usable - FIRST_BLOCK - BLOCK_HEADER;
        (arena.as_ptr() as *mut BestFitState).write(BestFitState {
            arena_len: AtomicU64::new(usable),
            free_head: AtomicU64::new(FIRST_BLOCK),
            used_bytes: AtomicU64::new(0),
            free_bytes: AtomicU64::new(payload),
        });
        write_word(arena, FIRST_BLOCK, payload);
        write_word(arena, FIRST_BLOCK + 8, NIL);
    }

    unsafe fn allocate(arena: NonNull<u8>, size: usize, align: usize) -> Result<u64> {
        if !align.is_power_of_two() || align > MAX_ALLOC_ALIGN {
            return Err(SeuratError::invalid_parameter(
                "align",
                format!(
                    "alignment must be a power of two no larger than {}",
                    MAX_ALLOC_ALIGN
                ),
            ));
        }
        let need = round_up(size.max(1), GRANULARITY) as u64;
        let st = state(arena);

        let mut prev = NIL;
        let mut cur = st.free_head.load(Ordering::Relaxed);
        let mut best_prev = NIL;
        let mut best = NIL;
        let mut best_size = u64::MAX;
        while cur != NIL {
            let sz = read_word(arena, cur);
            if sz >= need && sz < best_size {
                best_prev = prev;
                best = cur;
                best_size = sz;
                if sz == need {
                    break;
                }
            }
            prev = cur;
            cur = read_word(arena, cur + 8);
        }
        if best == NIL {
            return Err(SeuratError::insufficient_space(
                need as usize,
                st.free_bytes.load(Ordering::Relaxed) as usize,
            ));
        }

        let next = read_word(arena, best + 8);
        let granted;
        if best_size - need >= BLOCK_HEADER + GRANULARITY as u64 {
            // split; the remainder keeps the free-list position of `best`
            let rem = best + BLOCK_HEADER + need;
            write_word(arena, rem, best_size - need - BLOCK_HEADER);
            write_word(arena, rem + 8, next);
            set_next(arena, best_prev, rem);
            st.free_bytes.fetch_sub(need + BLOCK_HEADER, Ordering::Relaxed);
            granted = need;
        } else {
            set_next(arena, best_prev, next);
            st.free_bytes.fetch_sub(best_size, Ordering::Relaxed);
            granted = best_size;
        }
        write_word(arena, best, granted | USED_BIT);
        st.used_bytes.fetch_add(granted, Ordering::Relaxed);
        Ok(best + BLOCK_HEADER)
    }

    unsafe fn deallocate(arena: NonNull<u8>, offset: u64) {
        let blk = offset - BLOCK_HEADER;
        let word = read_word(arena, blk);
        debug_assert!(word & USED_BIT != 0, "deallocate of a block not in use");
        let mut size = word & !USED_BIT;

        let st = state(arena);
        st.used_bytes.fetch_sub(size, Ordering::Relaxed);
        st.free_bytes.fetch_add(size, Ordering::Relaxed);

        let mut prev = NIL;
        let mut next = st.free_head.load(Ordering::Relaxed);
        while next != NIL && next < blk {
            prev = next;
            next = read_word(arena, next + 8);
        }

        // absorb a physically adjacent successor
        if next != NIL && blk + BLOCK_HEADER + size == next {
            size += BLOCK_HEADER + read_word(arena, next);
            st.free_bytes.fetch_add(BLOCK_HEADER, Ordering::Relaxed);
            next = read_word(arena, next + 8);
        }
        write_word(arena, blk, size);
        write_word(arena, blk + 8, next);
        set_next(arena, prev, blk);

        // fold into a physically adjacent predecessor
        if prev != NIL {
            let prev_size = read_word(arena, prev);
            if prev + BLOCK_HEADER + prev_size == blk {
                write_word(arena, prev, prev_size + BLOCK_HEADER + size);
                write_word(arena, prev + 8, next);
                st.free_bytes.fetch_add(BLOCK_HEADER, Ordering::Relaxed);
            }
        }
    }

    unsafe fn grow(arena: NonNull<u8>, old_len: usize, new_len: usize) -> usize {
        let old = old_len as u64;
        let new = trim(new_len);
        if new <= old {
            return old_len;
        }
        let st = state(arena);
        let extra = new - old;

        // the list is address ordered, so the last entry is the highest block
        let mut last = NIL;
        let mut cur = st.free_head.load(Ordering::Relaxed);
        while cur != NIL {
            last = cur;
            cur = read_word(arena, cur + 8);
        }

        if last != NIL && last + BLOCK_HEADER + read_word(arena, last) == old {
            // the arena ends in a free block; stretch it over the new tail
            write_word(arena, last, read_word(arena, last) + extra);
            st.free_bytes.fetch_add(extra, Ordering::Relaxed);
        } else if extra >= BLOCK_HEADER + GRANULARITY as u64 {
            write_word(arena, old, extra - BLOCK_HEADER);
            write_word(arena, old + 8, NIL);
            set_next(arena, last, old);
            st.free_bytes.fetch_add(extra - BLOCK_HEADER, Ordering::Relaxed);
        } else {
            // tail too small to carry a block header; leave it untracked
            return old_len;
        }
        st.arena_len.store(new, Ordering::Relaxed);
        new as usize
    }

    unsafe fn shrink_to_fit(arena: NonNull<u8>) -> usize {
        let st = state(arena);
        let len = st.arena_len.load(Ordering::Relaxed);

        let mut cursor = FIRST_BLOCK;
        let mut last_used_end = FIRST_BLOCK;
        while cursor < len {
            let word = read_word(arena, cursor);
            let end = cursor + BLOCK_HEADER + (word & !USED_BIT);
            if word & USED_BIT != 0 {
                last_used_end = end;
            }
            cursor = end;
        }

        let mut prev = NIL;
        let mut cur = st.free_head.load(Ordering::Relaxed);
        while cur != NIL {
            let next = read_word(arena, cur + 8);
            if cur >= last_used_end {
                st.free_bytes
                    .fetch_sub(read_word(arena, cur), Ordering::Relaxed);
                set_next(arena, prev, next);
            } else {
                prev = cur;
            }
            cur = next;
        }
        st.arena_len.store(last_used_end, Ordering::Relaxed);
        last_used_end as usize
    }

    unsafe fn free_bytes(arena: NonNull<u8>) -> usize {
        state(arena).free_bytes.load(Ordering::Relaxed) as usize
    }

    unsafe fn used_bytes(arena: NonNull<u8>) -> usize {
        state(arena).used_bytes.load(Ordering::Relaxed) as usize
    }
}
