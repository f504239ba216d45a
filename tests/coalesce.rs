//! Integration tests for coalescing and uncoalescing

use mempool::{KILOBYTE, MemoryPool, PoolError, ThreadSafety};
use rand::seq::SliceRandom;

#[test]
fn coalesce_takes_contiguous_blocks() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    // 200 bytes need four 64-byte blocks.
    let p = pool.alloc(200).expect("coalescing allocation failed");
    assert_eq!(pool.free_blocks(), 12);
    assert_eq!(pool.coalesced_blocks(), 1);

    // The whole 200-byte span is writable.
    unsafe {
        std::ptr::write_bytes(p.as_ptr(), 0xAB, 200);
        assert_eq!(p.as_ptr().add(199).read(), 0xAB);
        pool.free(p.as_ptr());
    }

    // All four blocks re-entered the free list.
    assert_eq!(pool.free_blocks(), 16);
}

#[test]
fn free_after_coalesce_restores_ordering() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    let p = pool.alloc(200).unwrap();
    unsafe { pool.free(p.as_ptr()) };

    // If the split blocks re-entered at the right addresses and in order,
    // a full-pool coalesce is possible again.
    let whole = pool.alloc(KILOBYTE).expect("full-region coalesce failed");
    assert_eq!(pool.free_blocks(), 0);
    unsafe { pool.free(whole.as_ptr()) };
    assert_eq!(pool.free_blocks(), 16);
}

#[test]
fn singles_after_coalesce_cycle_walk_the_region() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    let p = pool.alloc(200).unwrap();
    unsafe { pool.free(p.as_ptr()) };

    // Sixteen single-block takes walk ascending addresses in 64-byte
    // steps, proving the split re-entered every block where it belongs.
    let addrs: Vec<usize> = (0..16)
        .map(|_| pool.alloc(64).unwrap().as_ptr() as usize)
        .collect();
    for pair in addrs.windows(2) {
        assert_eq!(pair[1] - pair[0], 64);
    }
}

#[test]
fn fragmentation_fails_even_with_enough_total_bytes() {
    let pool = MemoryPool::init(256, 64, ThreadSafety::NotRequired).unwrap();

    let ptrs: Vec<*mut u8> = (0..4)
        .map(|_| pool.alloc(32).unwrap().as_ptr())
        .collect();

    // Free blocks 1 and 3: two blocks free, but never adjacent.
    unsafe {
        pool.free(ptrs[1]);
        pool.free(ptrs[3]);
    }
    assert_eq!(pool.free_blocks(), 2);

    assert_eq!(
        pool.alloc(100).err(),
        Some(PoolError::Fragmented { requested: 100 })
    );
    // The failed search took nothing off the free list.
    assert_eq!(pool.free_blocks(), 2);
}

#[test]
fn coalesce_skips_over_a_gap() {
    let pool = MemoryPool::init(512, 64, ThreadSafety::NotRequired).unwrap();

    let ptrs: Vec<*mut u8> = (0..8)
        .map(|_| pool.alloc(64).unwrap().as_ptr())
        .collect();

    // Free blocks 0, 2, 3, 4: the first two-block run starts at block 2.
    unsafe {
        pool.free(ptrs[0]);
        pool.free(ptrs[2]);
        pool.free(ptrs[3]);
        pool.free(ptrs[4]);
    }

    let p = pool.alloc(128).expect("two-block coalesce failed");
    assert_eq!(p.as_ptr(), ptrs[2]);
}

#[test]
fn exhausted_pool_reports_no_memory_for_large_requests() {
    let pool = MemoryPool::init(256, 64, ThreadSafety::NotRequired).unwrap();

    let _whole = pool.alloc(256).unwrap();
    assert!(pool.is_full());

    assert_eq!(pool.alloc(128).err(), Some(PoolError::Exhausted));
}

#[test]
fn realloc_growing_copies_prefix_and_frees_old() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    let p = pool.alloc(32).unwrap();
    unsafe {
        for i in 0..32 {
            p.as_ptr().add(i).write(i as u8);
        }

        let q = pool.realloc(p.as_ptr(), 100).unwrap();
        assert_ne!(q.as_ptr(), p.as_ptr());
        assert_eq!(pool.coalesced_blocks(), 1);

        for i in 0..32 {
            assert_eq!(q.as_ptr().add(i).read(), i as u8, "byte {i} lost");
        }

        // The old block went back to the free list: it is the lowest
        // free address again, so the next single take returns it.
        let r = pool.alloc(32).unwrap();
        assert_eq!(r.as_ptr(), p.as_ptr());
    }
}

#[test]
fn realloc_of_coalesced_region_within_size_is_in_place() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    // 200 bytes round up to a 256-byte region.
    let p = pool.alloc(200).unwrap();
    unsafe {
        let q = pool.realloc(p.as_ptr(), 256).unwrap();
        assert_eq!(q.as_ptr(), p.as_ptr());
    }
    assert_eq!(pool.coalesced_blocks(), 1);
}

#[test]
fn free_of_interior_pointer_is_not_found() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    let p = pool.alloc(200).unwrap();
    assert_eq!(pool.free_blocks(), 12);

    // Mid-region pointers do not start any vended region.
    unsafe { pool.free(p.as_ptr().add(64)) };
    assert_eq!(pool.free_blocks(), 12);
    assert_eq!(pool.allocated_blocks(), 1);

    unsafe { pool.free(p.as_ptr()) };
    assert_eq!(pool.free_blocks(), 16);
}

#[test]
fn random_free_order_restores_full_coalesce() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();
    let mut rng = rand::rng();

    for _ in 0..16 {
        let mut ptrs: Vec<*mut u8> = (0..16)
            .map(|_| pool.alloc(64).unwrap().as_ptr())
            .collect();
        ptrs.shuffle(&mut rng);
        for p in ptrs {
            unsafe { pool.free(p) };
        }

        // Whatever the release order, address order is restored and the
        // whole region coalesces again.
        let whole = pool.alloc(KILOBYTE).expect("full-region coalesce failed");
        unsafe { pool.free(whole.as_ptr()) };
    }
}

#[test]
fn interleaved_coalesced_and_single_regions() {
    let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();

    let a = pool.alloc(128).unwrap(); // blocks 0-1
    let b = pool.alloc(64).unwrap(); // block 2
    let c = pool.alloc(192).unwrap(); // blocks 3-5

    unsafe {
        std::ptr::write_bytes(a.as_ptr(), 0x11, 128);
        std::ptr::write_bytes(b.as_ptr(), 0x22, 64);
        std::ptr::write_bytes(c.as_ptr(), 0x33, 192);

        // Neighbouring regions kept their own bytes.
        assert_eq!(a.as_ptr().add(127).read(), 0x11);
        assert_eq!(b.as_ptr().read(), 0x22);
        assert_eq!(b.as_ptr().add(63).read(), 0x22);
        assert_eq!(c.as_ptr().read(), 0x33);

        pool.free(b.as_ptr());
        pool.free(a.as_ptr());
        pool.free(c.as_ptr());
    }

    assert_eq!(pool.free_blocks(), 16);
    assert_eq!(pool.allocated_blocks(), 0);
}
