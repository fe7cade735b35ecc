//! A region-based incremental object allocator -- a "stack of objects"
//! arena.
//!
//! Grow a pending object of unknown final size by appending bytes,
//! pointers or integers, `finish` it to freeze its address for the rest
//! of the arena's life, then later `free` back to any previously finished
//! object's address to reclaim everything allocated after it. The classic
//! use case is building a symbol table entry byte by byte as you scan an
//! identifier whose length you don't know up front.
//!
//! ```
//! use stack_arena::Arena;
//!
//! let arena = Arena::new();
//! arena.grow(b"hello");
//! arena.grow(b" world");
//! let hello_world = arena.finish();
//!
//! let snapshot = arena.finish(); // zero-length object right after it
//!
//! unsafe {
//!     let bytes = core::slice::from_raw_parts(hello_world.as_ptr(), 11);
//!     assert_eq!(bytes, b"hello world");
//! }
//!
//! arena.free(Some(snapshot));
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod align;
mod allocator;
mod arena;
mod chunk;
mod oom;
mod reserve;

#[cfg(test)]
mod tests;

pub use self::allocator::ChunkAllocator;
pub use self::arena::Arena;
pub use self::oom::{AllocFailPolicy, PanicOnFail, PrintAndExit};
pub use self::reserve::Reservation;

#[cold]
pub(crate) fn cold() {}
