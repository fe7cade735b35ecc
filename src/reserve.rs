//! An explicit reservation handle for appending without a per-call room
//! check.
//!
//! [`Arena::reserve`](crate::Arena::reserve) does the one room check up
//! front and hands back a [`Reservation`] whose methods assume it, so a
//! hot loop that already knows how much it's about to write doesn't pay
//! for re-deriving the same bound on every append.

use crate::arena::Arena;
use crate::oom::AllocFailPolicy;

/// A promise that at least `n` bytes of room are available in the arena
/// that produced it, where `n` is the amount passed to
/// [`Arena::reserve`](crate::Arena::reserve).
///
/// Obtained only through `Arena::reserve`; its methods are `unsafe`
/// because nothing stops a caller from writing past the reserved amount
/// -- the handle narrows the precondition to one checked call instead of
/// one per byte, it does not eliminate it.
pub struct Reservation<'a, C = (), F: AllocFailPolicy = crate::oom::PrintAndExit> {
    arena: &'a Arena<C, F>,
}

impl<'a, C, F: AllocFailPolicy> Reservation<'a, C, F> {
    #[inline]
    pub(crate) fn new(arena: &'a Arena<C, F>) -> Self {
        Reservation { arena }
    }

    /// Appends one byte without checking room.
    ///
    /// # Safety
    /// The sum of bytes appended through this handle (across all of its
    /// calls) must not exceed the `n` passed to `Arena::reserve`.
    #[inline]
    pub unsafe fn grow1_unchecked(&self, byte: u8) {
        debug_assert!(self.arena.room() >= 1, "reservation exhausted");
        unsafe { self.arena.append_unchecked(&byte, 1) }
    }

    /// Appends `src` without checking room.
    ///
    /// # Safety
    /// See [`grow1_unchecked`](Self::grow1_unchecked); the same budget
    /// applies across all calls made through this handle.
    #[inline]
    pub unsafe fn grow_unchecked(&self, src: &[u8]) {
        debug_assert!(self.arena.room() >= src.len(), "reservation exhausted");
        unsafe { self.arena.append_unchecked(src.as_ptr(), src.len()) }
    }

    /// Advances the write cursor by `n` uninitialized bytes without
    /// checking room.
    ///
    /// # Safety
    /// See [`grow1_unchecked`](Self::grow1_unchecked).
    #[inline]
    pub unsafe fn blank_unchecked(&self, n: usize) {
        debug_assert!(self.arena.room() >= n, "reservation exhausted");
        unsafe { self.arena.blank_unchecked(n) }
    }
}
