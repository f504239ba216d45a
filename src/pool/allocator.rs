//! Main memory pool implementation
//!
//! # Safety
//!
//! This module implements a block-based sub-allocator over one contiguous
//! backing region:
//! - The backing region is allocated once at initialization and released
//!   once when the pool is dropped; all vended pointers point into it
//! - Block descriptors are separate heap records; each is owned by exactly
//!   one of the two lists, or is momentarily detached while migrating
//! - The free list and the allocated list each have their own mutex,
//!   engaged only for pools created with thread safety required, and the
//!   two mutexes are never held simultaneously
//! - A pool whose mode skips the mutexes is confined to one thread: the
//!   handle is not `Sync` and [`SharedPool`] refuses to wrap it
//! - Vended regions are disjoint; the caller holding a vended pointer has
//!   exclusive access to its bytes until the pointer is freed
//!
//! ## Invariants
//!
//! - The vending base and every block boundary are 8-byte aligned
//! - The free list is in strictly ascending address order at all times
//! - Every descriptor size is a positive multiple of the block size
//! - With no allocations outstanding, the free list covers the usable
//!   region exactly, one descriptor per block

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};
use std::alloc::{self, Layout};

use parking_lot::Mutex;

use super::block::{BlockDesc, BlockList};
use super::config::{BLOCK_ALIGN, PoolConfig, ThreadSafety};
use super::shared::SharedPool;
use super::stats::PoolStats;
use crate::error::{PoolError, PoolResult, report, reported};
use crate::utils::{align_up, format_bytes};

/// The one host allocation backing a pool.
///
/// The original pointer is retained for release; the aligned pointer is the
/// start of block zero and the base of every vended address.
struct BackingRegion {
    original: NonNull<u8>,
    aligned: NonNull<u8>,
    layout: Layout,
}

impl BackingRegion {
    /// Obtains `size` zeroed bytes from the host allocator and computes the
    /// 8-byte-aligned vending base inside them.
    fn allocate(size: u32) -> PoolResult<Self> {
        let Ok(layout) = Layout::from_size_align(size as usize, 1) else {
            return Err(reported(PoolError::InvalidPoolSize));
        };

        // SAFETY: layout has non-zero size; the caller validated size > 0.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(original) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        let addr = original.as_ptr() as usize;
        let offset = align_up(addr, BLOCK_ALIGN) - addr;
        if offset >= size as usize {
            // Too small to hold even the vending base. Hand the bytes back
            // before failing.
            // SAFETY: allocated above with this exact layout.
            unsafe { alloc::dealloc(original.as_ptr(), layout) };
            return Err(reported(PoolError::InvalidBlockSize));
        }

        // SAFETY: offset < size, so the aligned pointer stays inside the
        // allocation.
        let aligned = unsafe { NonNull::new_unchecked(original.as_ptr().add(offset)) };

        Ok(Self {
            original,
            aligned,
            layout,
        })
    }

    fn aligned(&self) -> *mut u8 {
        self.aligned.as_ptr()
    }

    /// Bytes lost to aligning the vending base.
    fn alignment_offset(&self) -> u32 {
        (self.aligned.as_ptr() as usize - self.original.as_ptr() as usize) as u32
    }
}

impl Drop for BackingRegion {
    fn drop(&mut self) {
        // SAFETY: `original` and `layout` are exactly what `allocate`
        // obtained from the host allocator, released exactly once here.
        unsafe { alloc::dealloc(self.original.as_ptr(), self.layout) };
    }
}

/// Block-based memory pool
///
/// One contiguous backing region is carved into fixed-size blocks at
/// initialization. [`alloc`](Self::alloc) serves requests up to one block
/// from the head of the address-ordered free list; larger requests coalesce
/// the first address-contiguous run of free blocks long enough to cover
/// them. [`free`](Self::free) migrates regions back, splitting coalesced
/// regions into per-block descriptors first so the free list returns to
/// block-size granularity.
///
/// # Memory Layout
/// ```text
/// [Block0][Block1][Block2][Block3]...[BlockN]
///    free list:  0 -> 1 -> 3 -> ...   (ascending addresses)
///    allocated:  2 -> ...             (unordered)
/// ```
///
/// # Concurrency
///
/// The two lists have two independent mutexes, engaged only when the pool
/// was created with [`ThreadSafety::Required`] and never held
/// simultaneously: an operation locks the free list, mutates, unlocks,
/// then locks the allocated list (or the reverse). The hand-off precludes
/// deadlock between the pair but makes migration non-atomic to an outside
/// observer: a concurrent reader may see a block on the allocated list
/// before its free-list entry is gone. What is guaranteed: a pointer vended
/// to one thread is never vended to another while outstanding, and a
/// pointer freed before another thread's `alloc` begins is eligible for
/// re-vending. Sharing across threads goes through
/// [`into_shared`](Self::into_shared).
///
/// A pool created with [`ThreadSafety::NotRequired`] runs every operation
/// unsynchronised. The handle is not `Sync`, so such a pool cannot be
/// handed to another thread by reference in the first place.
pub struct MemoryPool {
    /// Total pool size in bytes.
    pool_size: u32,

    /// Block size in bytes after rounding up to a multiple of 8.
    block_size: u32,

    /// Number of blocks carved at initialization.
    block_count: u32,

    /// Free descriptors in ascending address order. The mutex is engaged
    /// only in [`ThreadSafety::Required`] mode.
    free: Mutex<BlockList>,

    /// Descriptors currently held by callers. Same engagement rule.
    allocated: Mutex<BlockList>,

    /// Coalescing allocations served so far. Monotonic.
    num_coalesced: AtomicU32,

    /// Mode the pool was created with.
    thread_safety: ThreadSafety,

    /// The backing allocation; dropped last-ish, after both lists.
    region: BackingRegion,
}

// SAFETY: MemoryPool is Send because:
// - Both descriptor lists are owned by their cells; nodes hold raw
//   pointers but no thread affinity
// - The backing region is a plain heap allocation released exactly once
// - Remaining fields are primitives and atomics
unsafe impl Send for MemoryPool {}

// MemoryPool is NOT Sync: a ThreadSafety::NotRequired pool skips the list
// mutexes, so `&MemoryPool` must never cross threads in safe code.
// Cross-thread sharing goes through [`SharedPool`], which accepts only
// ThreadSafety::Required pools.

impl MemoryPool {
    /// Creates a pool from a full configuration.
    ///
    /// The requested block size is rounded up to the next multiple of 8 and
    /// the region is carved into `pool_size / block_size` blocks, linked
    /// into the free list in ascending address order.
    ///
    /// # Errors
    /// Rejects a zero pool size, a zero block size, and a block size not
    /// strictly less than the pool size. Each rejection emits a
    /// `MEMPOOL_ERROR:` diagnostic and no state persists.
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        if let Err(error) = config.validate() {
            return Err(reported(error));
        }

        let block_size = config.rounded_block_size();
        let region = BackingRegion::allocate(config.pool_size)?;

        let usable = config.pool_size - region.alignment_offset();
        let block_count = usable / block_size;
        if block_count == 0 {
            return Err(reported(PoolError::InvalidBlockSize));
        }

        let mut free = BlockList::new();

        // Link the blocks in reverse so iteration from the head walks
        // ascending addresses.
        for i in (0..block_count).rev() {
            // SAFETY: i < block_count, so the offset stays inside the
            // usable span computed above; the result is never null.
            let ptr = unsafe {
                NonNull::new_unchecked(region.aligned().add((i * block_size) as usize))
            };
            let desc = BlockDesc::create(ptr, block_size);
            // SAFETY: freshly created descriptor, exclusively owned.
            unsafe { free.push_front(desc) };
        }

        tracing::debug!(
            size = %format_bytes(config.pool_size as usize),
            block_size,
            block_count,
            thread_safety = ?config.thread_safety,
            "memory pool initialized"
        );

        Ok(Self {
            pool_size: config.pool_size,
            block_size,
            block_count,
            free: Mutex::new(free),
            allocated: Mutex::new(BlockList::new()),
            num_coalesced: AtomicU32::new(0),
            thread_safety: config.thread_safety,
            region,
        })
    }

    /// Creates a pool of `pool_size` bytes carved into blocks of
    /// `block_size` bytes.
    ///
    /// # Errors
    /// See [`with_config`](Self::with_config).
    pub fn init(
        pool_size: u32,
        block_size: u32,
        thread_safety: ThreadSafety,
    ) -> PoolResult<Self> {
        Self::with_config(PoolConfig::new(pool_size, block_size).with_thread_safety(thread_safety))
    }

    /// Creates a pool intended to be shared across threads. Every list
    /// access engages the owning mutex; convert with
    /// [`into_shared`](Self::into_shared) to hand clones to other threads.
    pub fn thread_safe(pool_size: u32, block_size: u32) -> PoolResult<Self> {
        Self::init(pool_size, block_size, ThreadSafety::Required)
    }

    /// Creates a pool for single-threaded use. Every operation on it runs
    /// unsynchronised; the handle cannot be shared across threads.
    pub fn single_threaded(pool_size: u32, block_size: u32) -> PoolResult<Self> {
        Self::init(pool_size, block_size, ThreadSafety::NotRequired)
    }

    /// Converts the pool into a cloneable [`SharedPool`] handle for
    /// cross-thread use.
    ///
    /// # Errors
    /// Refused for pools created with [`ThreadSafety::NotRequired`]; their
    /// operations skip the list mutexes.
    pub fn into_shared(self) -> PoolResult<SharedPool> {
        SharedPool::new(self)
    }

    /// Runs `f` with exclusive access to the free list, engaging the mutex
    /// only when the pool was created with [`ThreadSafety::Required`].
    fn with_free<R>(&self, f: impl FnOnce(&mut BlockList) -> R) -> R {
        match self.thread_safety {
            ThreadSafety::Required => f(&mut self.free.lock()),
            // SAFETY: a NotRequired pool is confined to one thread —
            // MemoryPool is not Sync and SharedPool refuses the mode — and
            // operations never nest these closures, so this is the only
            // live reference to the list.
            ThreadSafety::NotRequired => unsafe { f(&mut *self.free.data_ptr()) },
        }
    }

    /// Runs `f` with exclusive access to the allocated list, under the
    /// same engagement rule as [`with_free`](Self::with_free).
    fn with_allocated<R>(&self, f: impl FnOnce(&mut BlockList) -> R) -> R {
        match self.thread_safety {
            ThreadSafety::Required => f(&mut self.allocated.lock()),
            // SAFETY: as in with_free.
            ThreadSafety::NotRequired => unsafe { f(&mut *self.allocated.data_ptr()) },
        }
    }

    /// Returns the total pool size in bytes.
    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    /// Returns the block size in bytes, after rounding.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Returns the number of blocks carved at initialization.
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Returns the number of descriptors on the free list. O(blocks).
    pub fn free_blocks(&self) -> u32 {
        self.with_free(|free| free.len())
    }

    /// Returns the number of descriptors on the allocated list. O(blocks).
    pub fn allocated_blocks(&self) -> u32 {
        self.with_allocated(|allocated| allocated.len())
    }

    /// Returns how many coalescing allocations this pool has served. The
    /// counter is monotonic; splitting a coalesced region on release does
    /// not decrement it.
    pub fn coalesced_blocks(&self) -> u32 {
        self.num_coalesced.load(Ordering::Relaxed)
    }

    /// Checks if the pool is full (no free blocks).
    pub fn is_full(&self) -> bool {
        self.with_free(|free| free.is_empty())
    }

    /// Checks if the pool is empty (nothing allocated).
    pub fn is_empty(&self) -> bool {
        self.with_allocated(|allocated| allocated.is_empty())
    }

    /// Returns the thread-safety mode the pool was created with.
    pub fn thread_safety(&self) -> ThreadSafety {
        self.thread_safety
    }

    /// Checks if a pointer points into this pool's vendable region.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let start = self.region.aligned() as usize;
        let end = start + (self.block_count * self.block_size) as usize;
        addr >= start && addr < end
    }

    /// Takes a point-in-time statistics snapshot.
    ///
    /// The two lists are counted one after the other, never under both
    /// locks at once, so the counts may straddle a concurrent operation.
    pub fn stats(&self) -> PoolStats {
        let free_blocks = self.with_free(|free| free.len());
        let allocated_blocks = self.with_allocated(|allocated| allocated.len());
        PoolStats {
            pool_size: self.pool_size,
            block_size: self.block_size,
            block_count: self.block_count,
            free_blocks,
            allocated_blocks,
            coalesced_blocks: self.coalesced_blocks(),
            thread_safety: self.thread_safety,
        }
    }

    /// Allocates `num_bytes` bytes from the pool.
    ///
    /// Requests up to one block take the free-list head, which by the
    /// ordering invariant is always the lowest-addressed free block.
    /// Larger requests coalesce the first address-contiguous run of
    /// `ceil(num_bytes / block_size)` free blocks into a single region.
    ///
    /// The returned pointer is 8-byte aligned, addresses at least
    /// `num_bytes` writable bytes, and overlaps no other outstanding
    /// region. The bytes may hold junk from earlier use; see
    /// [`calloc`](Self::calloc) for a zeroed variant.
    ///
    /// # Errors
    /// Fails when the request exceeds the pool size, when the free list is
    /// empty, or when no contiguous run is long enough (fragmentation).
    /// Each failure emits a `MEMPOOL_ERROR:` diagnostic.
    pub fn alloc(&self, num_bytes: u32) -> PoolResult<NonNull<u8>> {
        if num_bytes > self.pool_size {
            return Err(reported(PoolError::RequestTooLarge {
                requested: num_bytes,
                pool_size: self.pool_size,
            }));
        }

        if num_bytes <= self.block_size {
            self.alloc_single()
        } else {
            self.alloc_coalesced(num_bytes)
        }
    }

    /// Fast path: hand out the lowest-addressed free block.
    fn alloc_single(&self) -> PoolResult<NonNull<u8>> {
        let Some(desc) = self.with_free(|free| free.pop_front()) else {
            return Err(reported(PoolError::Exhausted));
        };

        // SAFETY: desc was just detached from the free list and is
        // exclusively owned until pushed below.
        let user_ptr = unsafe { (*desc.as_ptr()).ptr };
        self.with_allocated(|allocated| {
            // SAFETY: detached descriptor, ownership transfers to the list.
            unsafe { allocated.push_front(desc) };
        });
        Ok(user_ptr)
    }

    /// Coalescing path: splice out the first contiguous run long enough,
    /// merge it into its head descriptor, and discard the companions.
    fn alloc_coalesced(&self, num_bytes: u32) -> PoolResult<NonNull<u8>> {
        let blocks_needed = num_bytes.div_ceil(self.block_size);

        let run = self.with_free(|free| {
            if free.is_empty() {
                return Err(PoolError::Exhausted);
            }
            Ok(free.detach_run(blocks_needed, self.block_size))
        });
        let head = match run {
            Err(error) => return Err(reported(error)),
            Ok(None) => {
                return Err(reported(PoolError::Fragmented {
                    requested: num_bytes,
                }));
            }
            Ok(Some(head)) => head,
        };

        // SAFETY: the run chain was detached above and is exclusively owned
        // here; it holds exactly `blocks_needed` nodes whose regions are
        // contiguous, so the head may absorb all of their bytes. The
        // multiplication cannot overflow: the run fit inside the region.
        let user_ptr = unsafe {
            let node = head.as_ptr();
            (*node).size = blocks_needed * self.block_size;

            let mut doomed = (*node).next;
            (*node).next = ptr::null_mut();
            while !doomed.is_null() {
                let next = (*doomed).next;
                BlockDesc::release(NonNull::new_unchecked(doomed));
                doomed = next;
            }

            (*node).ptr
        };

        self.num_coalesced.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(num_bytes, blocks_needed, "coalesced contiguous run");

        self.with_allocated(|allocated| {
            // SAFETY: head is detached and exclusively owned.
            unsafe { allocated.push_front(head) };
        });
        Ok(user_ptr)
    }

    /// Allocates `num_members` members of `member_size` bytes each, all
    /// zeroed.
    ///
    /// # Errors
    /// Fails on a zero-byte request or a size overflow, and inherits every
    /// failure mode of [`alloc`](Self::alloc).
    pub fn calloc(&self, num_members: u32, member_size: u32) -> PoolResult<NonNull<u8>> {
        let Some(total) = num_members.checked_mul(member_size) else {
            return Err(reported(PoolError::SizeOverflow {
                members: num_members,
                member_size,
            }));
        };
        if total == 0 {
            return Err(reported(PoolError::ZeroAlloc));
        }

        let user_ptr = self.alloc(total)?;
        // SAFETY: the freshly vended region spans at least `total` writable
        // bytes and nothing else aliases it.
        unsafe { ptr::write_bytes(user_ptr.as_ptr(), 0, total as usize) };
        Ok(user_ptr)
    }

    /// Resizes the allocation behind `ptr` to at least `num_bytes` bytes.
    ///
    /// When the region's recorded size already covers the request, `ptr` is
    /// returned unchanged and the recorded size is deliberately not
    /// reduced, so shrinking is a no-op. Otherwise a fresh region is
    /// allocated, the old region's recorded size worth of bytes is copied
    /// over, and the old region is freed.
    ///
    /// # Errors
    /// Fails on a null pointer, a zero-byte request, a pointer not on the
    /// allocated list, or an empty allocated list, and the growing path
    /// inherits every failure mode of [`alloc`](Self::alloc). On failure
    /// `ptr` remains valid and allocated.
    ///
    /// # Safety
    ///
    /// Caller must ensure:
    /// - `ptr` came from this pool's `alloc`/`calloc`/`realloc` and has not
    ///   been freed
    /// - No other copy of `ptr` is used to access the region once a grown
    ///   replacement is returned
    pub unsafe fn realloc(&self, ptr: *mut u8, num_bytes: u32) -> PoolResult<NonNull<u8>> {
        if ptr.is_null() {
            return Err(reported(PoolError::ReallocNull));
        }
        if num_bytes == 0 {
            return Err(reported(PoolError::ReallocZero));
        }

        let lookup = self.with_allocated(|allocated| {
            if allocated.is_empty() {
                return Err(PoolError::NothingAllocated);
            }
            Ok(allocated.find_size(ptr))
        });
        let old_size = match lookup {
            Err(error) => return Err(reported(error)),
            Ok(None) => return Err(reported(PoolError::ReallocUnknown)),
            Ok(Some(size)) => size,
        };

        if old_size >= num_bytes {
            // SAFETY: ptr was found on the allocated list, so it is
            // non-null.
            return Ok(unsafe { NonNull::new_unchecked(ptr) });
        }

        let new_ptr = self.alloc(num_bytes)?;
        // SAFETY: the caller guarantees `ptr` is valid for its vended
        // region of `old_size` bytes; `new_ptr` spans at least
        // `num_bytes > old_size` bytes; the regions are disjoint while the
        // old one is still outstanding.
        unsafe {
            ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), old_size as usize);
            self.free(ptr);
        }
        Ok(new_ptr)
    }

    /// Returns the allocation behind `ptr` to the free list.
    ///
    /// A single-block region re-enters the free list as-is. A coalesced
    /// region is first split back into block-size descriptors: the region's
    /// own descriptor shrinks to one block and fresh descriptors are
    /// manufactured for the rest, then the whole chain is spliced in at the
    /// position that preserves ascending address order.
    ///
    /// A null pointer or a pointer not on the allocated list is reported
    /// with a `MEMPOOL_ERROR:` diagnostic and tolerated; the pool state is
    /// left untouched.
    ///
    /// # Safety
    ///
    /// Caller must ensure `ptr` is either null, or a pointer obtained from
    /// this pool that is no longer accessed after this call.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            report(&PoolError::FreeNull);
            return;
        }

        let removed = self.with_allocated(|allocated| {
            if allocated.is_empty() {
                None
            } else {
                allocated.remove(ptr)
            }
        });
        let Some(desc) = removed else {
            report(&PoolError::FreeUnknown);
            return;
        };

        // SAFETY: desc was just unlinked and is exclusively owned here.
        let size = unsafe { (*desc.as_ptr()).size };
        let (chain_head, chain_tail) = if size == self.block_size {
            (desc, desc)
        } else {
            self.uncoalesce(desc)
        };

        self.with_free(|free| {
            // SAFETY: the chain is detached, internally in ascending
            // address order, and its addresses left the free list when the
            // region was allocated, so the splice cannot create overlap.
            unsafe { free.insert_chain_ordered(chain_head, chain_tail) };
        });
    }

    /// Splits a coalesced descriptor back into block-size descriptors.
    ///
    /// The descriptor itself shrinks to one block; fresh descriptors are
    /// manufactured for the remaining blocks and chained after it. Returns
    /// the chain's head and tail.
    fn uncoalesce(
        &self,
        desc: NonNull<BlockDesc>,
    ) -> (NonNull<BlockDesc>, NonNull<BlockDesc>) {
        // SAFETY: desc is detached and exclusively owned; its usable region
        // spans `size` bytes inside the backing region, so every derived
        // block pointer stays in bounds.
        unsafe {
            let node = desc.as_ptr();
            let blocks = (*node).size / self.block_size;
            (*node).size = self.block_size;

            let base = (*node).ptr;
            let mut tail = desc;
            for i in 1..blocks {
                let ptr = NonNull::new_unchecked(
                    base.as_ptr().add((i * self.block_size) as usize),
                );
                let fresh = BlockDesc::create(ptr, self.block_size);
                (*tail.as_ptr()).next = fresh.as_ptr();
                tail = fresh;
            }

            (desc, tail)
        }
    }

    /// Tears the pool down: every descriptor record on either list is
    /// released, then the backing region is returned to the host allocator.
    ///
    /// Consuming the handle makes a second destroy unrepresentable. Any
    /// previously vended pointer is dangling after this call. Returns
    /// `true`; the same teardown also runs when the pool is simply dropped.
    pub fn destroy(self) -> bool {
        let outstanding = self.with_allocated(|allocated| allocated.len());
        if outstanding > 0 {
            tracing::warn!(outstanding, "destroying pool with outstanding allocations");
        }
        tracing::debug!("memory pool destroyed");
        true
    }

    /// Free-list entries as (address, size) pairs, for invariant checks.
    #[cfg(test)]
    fn free_entries(&self) -> Vec<(usize, u32)> {
        self.with_free(|free| free.entries())
    }

    /// Allocated-list entries as (address, size) pairs.
    #[cfg(test)]
    fn allocated_entries(&self) -> Vec<(usize, u32)> {
        self.with_allocated(|allocated| allocated.entries())
    }

    #[cfg(test)]
    fn vending_base(&self) -> usize {
        self.region.aligned() as usize
    }
}
