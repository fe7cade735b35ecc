//! Chunk allocator dispatch: where an arena's chunks come from.

use core::ptr::NonNull;

/// Where an [`Arena`](crate::Arena) gets its chunks from.
///
/// The `Plain` variant matches callers that just want a function pointer
/// pair; `WithContext` threads an extra value (a heap handle, an arena
/// pool index, ...) through both calls without forcing it into every
/// public call site.
pub enum ChunkAllocator<C = ()> {
    Plain {
        alloc: fn(usize) -> Option<NonNull<u8>>,
        dealloc: fn(NonNull<u8>, usize),
    },
    WithContext {
        alloc: fn(&C, usize) -> Option<NonNull<u8>>,
        dealloc: fn(&C, NonNull<u8>, usize),
        ctx: C,
    },
}

impl<C> ChunkAllocator<C> {
    #[inline]
    pub(crate) fn alloc_chunk(&self, size: usize) -> Option<NonNull<u8>> {
        match self {
            ChunkAllocator::Plain { alloc, .. } => alloc(size),
            ChunkAllocator::WithContext { alloc, ctx, .. } => alloc(ctx, size),
        }
    }

    #[inline]
    pub(crate) fn dealloc_chunk(&self, ptr: NonNull<u8>, size: usize) {
        match self {
            ChunkAllocator::Plain { dealloc, .. } => dealloc(ptr, size),
            ChunkAllocator::WithContext { dealloc, ctx, .. } => dealloc(ctx, ptr, size),
        }
    }
}

impl ChunkAllocator<()> {
    /// Builds a `Plain` allocator backed by the process's global
    /// allocator.
    #[cfg(feature = "alloc")]
    #[inline]
    pub fn system() -> Self {
        ChunkAllocator::Plain {
            alloc: system_alloc,
            dealloc: system_dealloc,
        }
    }
}

/// Alignment the system allocator guarantees every chunk, generous enough
/// to cover the chunk header and any arena alignment request up to 16
/// bytes without the runtime `align_up` in `finish` ever having to look
/// past the chunk's declared payload start.
#[cfg(feature = "alloc")]
const SYSTEM_CHUNK_ALIGN: usize = 16;

#[cfg(feature = "alloc")]
fn system_alloc(size: usize) -> Option<NonNull<u8>> {
    use core::alloc::Layout;
    let layout = Layout::from_size_align(size, SYSTEM_CHUNK_ALIGN).ok()?;
    // Safety: `size` is nonzero by construction at every call site in `chunk.rs`.
    let ptr = unsafe { alloc::alloc::alloc(layout) };
    NonNull::new(ptr)
}

#[cfg(feature = "alloc")]
fn system_dealloc(ptr: NonNull<u8>, size: usize) {
    use core::alloc::Layout;
    // Safety: `size` matches the layout `system_alloc` used for `ptr`.
    let layout = Layout::from_size_align(size, SYSTEM_CHUNK_ALIGN)
        .expect("layout reconstructed from a size previously accepted by system_alloc");
    unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
}
