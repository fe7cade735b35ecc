#![cfg(feature = "alloc")]

use crate::Arena;

unsafe fn read_bytes(ptr: core::ptr::NonNull<u8>, len: usize) -> &'static [u8] {
    core::slice::from_raw_parts(ptr.as_ptr(), len)
}

#[test]
fn finish_returns_stable_address_for_grown_bytes() {
    let arena = Arena::new();
    let a = arena.copy(b"hello");
    unsafe { assert_eq!(read_bytes(a, 5), b"hello") };
}

#[test]
fn consecutive_finishes_are_contiguous_up_to_alignment() {
    let arena = Arena::new();
    let a = arena.copy(b"hi");
    let b = arena.copy(b"world");
    assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 8);
    unsafe {
        assert_eq!(read_bytes(a, 2), b"hi");
        assert_eq!(read_bytes(b, 5), b"world");
    }
}

#[test]
fn empty_finish_is_idempotent() {
    let arena = Arena::new();
    let a = arena.alloc(0);
    let b = arena.alloc(0);
    assert!(b.as_ptr() as usize - a.as_ptr() as usize <= 8);
}

#[test]
fn free_to_mark_rewinds_and_preserves_earlier_objects() {
    let arena = Arena::new();
    let one = arena.copy(b"one");
    let two = arena.copy(b"two");
    let _three = arena.copy(b"three");

    arena.free(Some(two));
    assert_eq!(arena.base(), two);

    let rewritten = arena.copy(b"TWO");
    assert_eq!(rewritten, two);
    unsafe { assert_eq!(read_bytes(one, 3), b"one") };
}

#[test]
fn free_to_null_destroys_and_rebootstraps() {
    let arena = Arena::new();
    arena.copy(b"anything");
    arena.free(None);
    assert!(arena.empty());

    // A further grow must not panic -- the arena re-bootstraps lazily.
    let a = arena.copy(b"fresh");
    unsafe { assert_eq!(read_bytes(a, 5), b"fresh") };
}

#[test]
fn promotion_preserves_partial_pending_object() {
    let arena = Arena::with_capacity_in(
        16,
        0,
        crate::ChunkAllocator::system(),
        crate::PrintAndExit::default(),
    );
    let payload = [0xAAu8; 30];
    let a = arena.copy(&payload);
    unsafe { assert_eq!(read_bytes(a, 30), &payload[..]) };
    assert!(arena.memory_used() >= 30);
}

#[test]
fn maybe_empty_object_survives_a_zero_length_finish_then_grow() {
    let arena = Arena::new();
    let empty = arena.alloc(0);
    let next = arena.copy(b"x");
    assert!(next.as_ptr() as usize >= empty.as_ptr() as usize);
    unsafe { assert_eq!(read_bytes(next, 1), b"x") };
}

#[test]
fn size_and_room_track_the_pending_object() {
    let arena = Arena::new();
    assert_eq!(arena.size(), 0);
    arena.grow(b"abc");
    assert_eq!(arena.size(), 3);
    let room_before = arena.room();
    arena.finish();
    assert_eq!(arena.size(), 0);
    assert!(arena.room() <= room_before);
}

#[test]
fn reservation_writes_stay_within_the_reserved_budget() {
    let arena = Arena::new();
    let reservation = arena.reserve(4);
    unsafe {
        reservation.grow1_unchecked(b'a');
        reservation.grow1_unchecked(b'b');
        reservation.grow_unchecked(b"cd");
    }
    let a = arena.finish();
    unsafe { assert_eq!(read_bytes(a, 4), b"abcd") };
}

#[test]
fn ten_then_one_byte_objects_in_one_chunk_are_sixteen_apart() {
    let arena = Arena::with_capacity_in(
        64,
        0,
        crate::ChunkAllocator::system(),
        crate::PrintAndExit::default(),
    );
    arena.grow(b"abcdefghij");
    let a = arena.finish();
    arena.grow(b"x");
    let b = arena.finish();

    unsafe { assert_eq!(read_bytes(a, 10), b"abcdefghij") };
    assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 16);
}

#[test]
fn freeing_to_the_first_of_two_empty_objects_keeps_the_chunk_alive() {
    let arena = Arena::new();
    let a = arena.alloc(0);
    let _b = arena.alloc(0);

    arena.free(Some(a));
    assert_eq!(arena.base(), a);
    assert!(arena.memory_used() > 0);
}

#[test]
fn many_single_byte_objects_get_distinct_aligned_addresses() {
    let arena = Arena::new();
    let mut addrs = alloc::vec::Vec::with_capacity(1000);
    for _ in 0..1000u32 {
        arena.grow1(b'x');
        addrs.push(arena.finish());
    }
    for w in addrs.windows(2) {
        assert_ne!(w[0], w[1]);
    }
    for &a in &addrs {
        assert_eq!(a.as_ptr() as usize % 8, 0);
    }
}
