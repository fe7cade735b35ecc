//! The arena control block: init, observers, grow family, finish,
//! free-to-mark and newchunk promotion.

use core::cell::Cell;
use core::fmt;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::align::{align_up, is_aligned_to};
use crate::allocator::ChunkAllocator;
use crate::chunk::ChunkHeader;
use crate::oom::{AllocFailPolicy, PrintAndExit};

/// 4 KiB minus a conservative allowance for the chunk header and whatever
/// bookkeeping the underlying allocator itself keeps.
const DEFAULT_CHUNK_SIZE: usize = 4096 - 32;

/// A union whose alignment is at least that of any integer, pointer or
/// float the platform has, used as the default alignment when none is
/// requested.
#[repr(C)]
union MaxAlign {
    _int: u64,
    _ptr: *const (),
    _float: f64,
}

const DEFAULT_ALIGN: usize = core::mem::align_of::<MaxAlign>();

/// A region-based incremental object allocator.
///
/// Grow a pending object with [`grow`](Arena::grow) and friends, freeze it
/// with [`finish`](Arena::finish) to get a stable address, and reclaim
/// everything after a given finished address with [`free`](Arena::free).
///
/// `C` is the context type threaded through a [`ChunkAllocator::WithContext`]
/// allocator (use `()` for the common case of a context-free allocator).
/// `F` is the policy invoked when the chunk allocator fails; it defaults to
/// [`PrintAndExit`].
pub struct Arena<C = (), F: AllocFailPolicy = PrintAndExit> {
    chunk_size: usize,
    alignment_mask: usize,
    current: Cell<Option<NonNull<ChunkHeader>>>,
    object_base: Cell<*mut u8>,
    next_free: Cell<*mut u8>,
    chunk_limit: Cell<*mut u8>,
    maybe_empty_object: Cell<bool>,
    allocator: ChunkAllocator<C>,
    fail_policy: F,
}

// Safety: an `Arena` owns its chunks exclusively and never shares its
// `Cell`s across threads by reference (all access goes through `&self`
// methods that are only safe to call from the owning thread, as documented
// on the type). `Send` is sound because handing the whole arena, with its
// unique ownership of the chunk chain, to another thread is fine as long
// as only one thread touches it at a time -- which is exactly what `!Sync`
// enforces.
unsafe impl<C: Send, F: AllocFailPolicy + Send> Send for Arena<C, F> {}

impl<C, F: AllocFailPolicy> Arena<C, F> {
    /// Creates an arena with explicit chunk size, alignment, allocator and
    /// failure policy.
    ///
    /// `chunk_size == 0` picks a default near 4 KiB; `alignment == 0` picks
    /// the platform's maximum natural alignment. `alignment` must be a
    /// power of two.
    ///
    /// Eagerly requests one initial chunk; if the allocator returns `None`,
    /// invokes `fail_policy` (which never returns).
    pub fn with_capacity_in(
        chunk_size: usize,
        alignment: usize,
        allocator: ChunkAllocator<C>,
        fail_policy: F,
    ) -> Self {
        let alignment = if alignment == 0 {
            DEFAULT_ALIGN
        } else {
            alignment
        };
        assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        let alignment_mask = alignment - 1;

        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };

        let (chunk, base) =
            Self::request_chunk(&allocator, &fail_policy, chunk_size, alignment, None);

        Arena {
            chunk_size,
            alignment_mask,
            current: Cell::new(Some(chunk)),
            object_base: Cell::new(base),
            next_free: Cell::new(base),
            // Safety: `chunk` was just initialized by `request_chunk`.
            chunk_limit: Cell::new(unsafe { chunk.as_ref().end }),
            maybe_empty_object: Cell::new(false),
            allocator,
            fail_policy,
        }
    }

    fn request_chunk(
        allocator: &ChunkAllocator<C>,
        fail_policy: &F,
        payload_size: usize,
        alignment: usize,
        prev: Option<NonNull<ChunkHeader>>,
    ) -> (NonNull<ChunkHeader>, *mut u8) {
        let alloc_size = payload_size
            .checked_add(size_of::<ChunkHeader>())
            .unwrap_or_else(|| crate::oom::size_overflow());

        let chunk = ChunkHeader::alloc_chunk(allocator, alloc_size, prev)
            .unwrap_or_else(|| fail_policy.handle(alloc_size));

        let base_addr = align_up(ChunkHeader::raw_payload_start(chunk) as usize, alignment)
            .unwrap_or_else(|| crate::oom::size_overflow());

        (chunk, base_addr as *mut u8)
    }

    /// The provisional address of the pending object. It may still move if
    /// a subsequent grow forces a chunk switch -- do not retain this
    /// address across a growing call.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        // Safety: `object_base` is set to a chunk payload address at
        // construction and after every `finish`/`free`, and to
        // `NonNull::dangling()`'s address after a free-to-null; never null.
        unsafe { NonNull::new_unchecked(self.object_base.get()) }
    }

    /// Size in bytes of the pending (not yet finished) object.
    #[inline]
    pub fn size(&self) -> usize {
        self.next_free.get() as usize - self.object_base.get() as usize
    }

    /// Bytes of room left in the current chunk before a grow would
    /// promote to a new one.
    #[inline]
    pub fn room(&self) -> usize {
        self.chunk_limit.get() as usize - self.next_free.get() as usize
    }

    /// True if the arena holds a single, otherwise-untouched chunk and the
    /// pending object has not grown past its aligned payload start.
    pub fn empty(&self) -> bool {
        match self.current.get() {
            None => true,
            Some(chunk) => {
                // Safety: `chunk` is the live current chunk.
                let has_prev = unsafe { chunk.as_ref().prev.is_some() };
                let payload_start =
                    align_up(ChunkHeader::raw_payload_start(chunk) as usize, self.alignment())
                        .expect("chunk was sized to fit its own aligned payload start");
                !has_prev && self.next_free.get() as usize == payload_start
            }
        }
    }

    /// Sum of `end - start` over every live chunk.
    pub fn memory_used(&self) -> usize {
        let mut total = 0;
        let mut cur = self.current.get();
        while let Some(chunk) = cur {
            total += ChunkHeader::alloc_size(chunk);
            // Safety: `chunk` is a live chunk in this arena's chain.
            cur = unsafe { chunk.as_ref().prev };
        }
        total
    }

    /// Number of live chunks, for diagnostics.
    pub fn chunk_count(&self) -> usize {
        let mut count = 0;
        let mut cur = self.current.get();
        while let Some(chunk) = cur {
            count += 1;
            // Safety: `chunk` is a live chunk in this arena's chain.
            cur = unsafe { chunk.as_ref().prev };
        }
        count
    }

    #[inline(always)]
    fn alignment(&self) -> usize {
        self.alignment_mask + 1
    }

    /// Ensures at least `n` bytes of room without advancing the write
    /// cursor, promoting to a new chunk first if needed.
    pub fn make_room(&self, n: usize) {
        if self.room() < n {
            crate::cold();
            self.grow_to_fit(n);
        }
    }

    /// Advances the write cursor by `n` bytes, leaving them uninitialized.
    pub fn blank(&self, n: usize) {
        self.make_room(n);
        // Safety: `make_room` just ensured `room() >= n`.
        unsafe { self.blank_unchecked(n) }
    }

    /// Appends `src` to the pending object.
    pub fn grow(&self, src: &[u8]) {
        self.make_room(src.len());
        // Safety: `make_room` just ensured enough room for `src`.
        unsafe { self.append_unchecked(src.as_ptr(), src.len()) }
    }

    /// Appends `src` followed by a single zero byte.
    pub fn grow0(&self, src: &[u8]) {
        self.grow(src);
        self.grow1(0);
    }

    /// Appends a single byte.
    pub fn grow1(&self, byte: u8) {
        self.make_room(1);
        // Safety: `make_room` just ensured at least one byte of room.
        unsafe { self.append_unchecked(&byte, 1) }
    }

    /// Appends the bytes of a `Copy` value. Used by [`grow_ptr`](Arena::grow_ptr)
    /// and [`grow_int`](Arena::grow_int).
    ///
    /// The caller is responsible for having grown only values of matching
    /// width since the last `finish` if `T`'s alignment isn't already
    /// covered by the arena's alignment -- no implicit mid-object padding
    /// is inserted.
    pub fn grow_pod<T: Copy>(&self, value: T) {
        let n = size_of::<T>();
        self.make_room(n);
        // Safety: `make_room` just ensured enough room for `T`'s bytes,
        // and `value` is `Copy` so reading its representation is sound.
        unsafe { self.append_unchecked((&value) as *const T as *const u8, n) }
    }

    /// Appends a pointer-sized value.
    #[inline]
    pub fn grow_ptr<T>(&self, ptr: *const T) {
        self.grow_pod(ptr);
    }

    /// Appends an `isize`-sized value.
    #[inline]
    pub fn grow_int(&self, value: isize) {
        self.grow_pod(value);
    }

    /// Reserves `n` bytes of guaranteed room and returns a handle whose
    /// methods append without re-checking room, for hot loops that already
    /// know how much they're about to write.
    pub fn reserve(&self, n: usize) -> crate::reserve::Reservation<'_, C, F> {
        self.make_room(n);
        crate::reserve::Reservation::new(self)
    }

    /// # Safety
    /// Caller must have ensured `room() >= n` (via `make_room` or a prior
    /// `room()` query) before calling this.
    #[inline]
    pub(crate) unsafe fn blank_unchecked(&self, n: usize) {
        let next = self.next_free.get().add(n);
        self.next_free.set(next);
    }

    /// # Safety
    /// Caller must have ensured `room() >= n` before calling this; `src`
    /// must be valid for `n` bytes.
    #[inline]
    pub(crate) unsafe fn append_unchecked(&self, src: *const u8, n: usize) {
        let dst = self.next_free.get();
        ptr::copy_nonoverlapping(src, dst, n);
        self.next_free.set(dst.add(n));
    }

    /// Freezes the pending object and returns its stable address. Starts a
    /// new pending object at the (possibly alignment-rounded) cursor.
    pub fn finish(&self) -> NonNull<u8> {
        let object_base = self.object_base.get();
        let next_free = self.next_free.get();

        if next_free == object_base {
            self.maybe_empty_object.set(true);
        }

        let pending_len = next_free as usize - object_base as usize;
        let rounded = align_up(pending_len, self.alignment()).unwrap_or(usize::MAX);
        let new_base_addr = (object_base as usize).saturating_add(rounded);

        let chunk_limit_addr = self.chunk_limit.get() as usize;
        let new_free_addr = new_base_addr.min(chunk_limit_addr);

        debug_assert!(
            new_free_addr == chunk_limit_addr || is_aligned_to(new_free_addr, self.alignment()),
            "finish() must leave the next object's base aligned"
        );

        self.next_free.set(new_free_addr as *mut u8);
        self.object_base.set(new_free_addr as *mut u8);

        // Safety: `object_base` is never null for an initialized arena.
        unsafe { NonNull::new_unchecked(object_base) }
    }

    /// `blank(n)` followed by `finish()`.
    pub fn alloc(&self, n: usize) -> NonNull<u8> {
        self.blank(n);
        self.finish()
    }

    /// `grow(src)` followed by `finish()`.
    pub fn copy(&self, src: &[u8]) -> NonNull<u8> {
        self.grow(src);
        self.finish()
    }

    /// `grow0(src)` followed by `finish()`.
    pub fn copy0(&self, src: &[u8]) -> NonNull<u8> {
        self.grow0(src);
        self.finish()
    }

    /// Releases every finished object at or after `mark`'s address and
    /// resets the pending object to start exactly at `mark`.
    ///
    /// `None` releases every chunk, leaving the arena in a destroyed
    /// state. A further grow re-bootstraps it with a fresh chunk, just as
    /// the first grow after construction would.
    ///
    /// # Panics
    /// Panics if `mark` is `Some` and does not fall within any live
    /// chunk -- this is an API violation that must abort rather than
    /// silently continue.
    pub fn free(&self, mark: Option<NonNull<u8>>) {
        match mark {
            None => self.free_to_null(),
            Some(mark) => self.free_to_mark(mark.as_ptr()),
        }
    }

    fn free_to_null(&self) {
        let mut cur = self.current.take();
        while let Some(chunk) = cur {
            // Safety: `chunk` is a live chunk; read `prev` before freeing it.
            let prev = unsafe { chunk.as_ref().prev };
            // Safety: `chunk` was allocated by `self.allocator` and not yet freed.
            unsafe { ChunkHeader::dealloc_chunk(chunk, &self.allocator) };
            cur = prev;
        }

        let dangling = NonNull::<u8>::dangling().as_ptr();
        self.object_base.set(dangling);
        self.next_free.set(dangling);
        self.chunk_limit.set(dangling);
        self.maybe_empty_object.set(false);
    }

    fn free_to_mark(&self, mark: *mut u8) {
        let mut cur = self.current.get();
        loop {
            let chunk = cur.unwrap_or_else(|| {
                panic!("stack-arena: free() called with an address not in any live chunk")
            });

            if ChunkHeader::contains_mark(chunk, mark) {
                self.current.set(Some(chunk));
                self.object_base.set(mark);
                self.next_free.set(mark);
                // Safety: `chunk` is a live chunk.
                self.chunk_limit.set(unsafe { chunk.as_ref().end });
                return;
            }

            // Safety: `chunk` is a live chunk; read `prev` before freeing it.
            let prev = unsafe { chunk.as_ref().prev };
            // Safety: `chunk` was allocated by `self.allocator` and not yet freed.
            unsafe { ChunkHeader::dealloc_chunk(chunk, &self.allocator) };
            self.maybe_empty_object.set(true);
            cur = prev;
        }
    }

    /// Allocates a larger chunk, copies the partial pending object into
    /// it, links it in, and recycles the vacated chunk when it held
    /// nothing else.
    #[cold]
    fn grow_to_fit(&self, length: usize) {
        let pending_size = self.size();
        let old_object_base = self.object_base.get();
        let old_chunk = self.current.get();

        let configured = self.chunk_size;
        let needed = length
            .checked_add(self.alignment_mask)
            .and_then(|v| v.checked_add(pending_size))
            .and_then(|v| v.checked_add(pending_size / 8))
            .and_then(|v| v.checked_add(100));
        let Some(needed) = needed else {
            crate::oom::size_overflow();
        };
        let payload_size = configured.max(needed);

        let alloc_size = payload_size
            .checked_add(size_of::<ChunkHeader>())
            .unwrap_or_else(|| crate::oom::size_overflow());

        let new_chunk = ChunkHeader::alloc_chunk(&self.allocator, alloc_size, old_chunk)
            .unwrap_or_else(|| self.fail_policy.handle(alloc_size));

        let new_base_addr =
            align_up(ChunkHeader::raw_payload_start(new_chunk) as usize, self.alignment())
                .unwrap_or_else(|| crate::oom::size_overflow());
        let new_base = new_base_addr as *mut u8;

        if pending_size > 0 {
            // Safety: `old_object_base` is valid for `pending_size` bytes
            // (it's the pending object we're relocating); `new_base` is
            // valid for at least `payload_size >= pending_size` bytes in
            // the freshly allocated chunk. The two allocations cannot
            // overlap.
            unsafe { ptr::copy_nonoverlapping(old_object_base, new_base, pending_size) };
        }

        self.object_base.set(new_base);
        // Safety: `new_base` plus `pending_size` stays within the new
        // chunk, since `payload_size >= pending_size`.
        self.next_free.set(unsafe { new_base.add(pending_size) });
        // Safety: `new_chunk` was just initialized by `alloc_chunk`.
        self.chunk_limit.set(unsafe { new_chunk.as_ref().end });

        let recycle = match old_chunk {
            Some(old) if !self.maybe_empty_object.get() => {
                // Safety: `old` is still a live chunk at this point.
                let old_payload_start = align_up(
                    ChunkHeader::raw_payload_start(old) as usize,
                    self.alignment(),
                )
                .expect("old chunk was sized to fit its own aligned payload start");
                old_object_base as usize == old_payload_start
            }
            _ => false,
        };

        if recycle {
            let old = old_chunk.expect("recycle implies old_chunk is Some");
            // Safety: `old` is still live; read `prev` before freeing it
            // and splice it into the new chunk's header.
            let old_prev = unsafe { old.as_ref().prev };
            // Safety: `new_chunk` is exclusively owned by this arena and
            // was just allocated; no other reference to it exists yet.
            unsafe { (*new_chunk.as_ptr()).prev = old_prev };
            self.current.set(Some(new_chunk));
            // Safety: `old` held nothing but the object we just relocated
            // and is otherwise unreferenced.
            unsafe { ChunkHeader::dealloc_chunk(old, &self.allocator) };
        } else {
            self.current.set(Some(new_chunk));
        }

        self.maybe_empty_object.set(false);
    }
}

#[cfg(feature = "alloc")]
impl Arena<(), PrintAndExit> {
    /// Creates an arena backed by the global allocator, default alignment,
    /// default chunk size, and the default print-and-exit failure policy.
    pub fn new() -> Self {
        Self::with_capacity_in(0, 0, ChunkAllocator::system(), PrintAndExit::default())
    }
}

#[cfg(feature = "alloc")]
impl Default for Arena<(), PrintAndExit> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<C, F: AllocFailPolicy> Drop for Arena<C, F> {
    fn drop(&mut self) {
        self.free_to_null();
    }
}

impl<C, F: AllocFailPolicy> fmt::Debug for Arena<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("chunks", &self.chunk_count())
            .field("memory_used", &self.memory_used())
            .field("pending_size", &self.size())
            .field("room", &self.room())
            .finish()
    }
}
