//! Process-wide one-slot pools for DFA compiler scratch.
//!
//! The compiler is a struct of growing buffers worth reusing between
//! recompilations. One instance per element width is parked in an atomic
//! pointer slot: `retrieve` swaps it out if free, otherwise allocates a
//! fresh one, and `release` parks it back unless the slot was refilled in
//! the meantime. Contended callers just allocate; only allocation is
//! saved, never correctness.

use core::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::rewrite::dfa::DfaCompiler;

static GLYPH_COMPILER_SLOT: AtomicPtr<DfaCompiler<u16>> = AtomicPtr::new(ptr::null_mut());
static UTF8_COMPILER_SLOT: AtomicPtr<DfaCompiler<u32>> = AtomicPtr::new(ptr::null_mut());

macro_rules! impl_pool {
    ($retrieve:ident, $release:ident, $slot:ident, $elem:ty) => {
        pub(crate) fn $retrieve() -> Box<DfaCompiler<$elem>> {
            let parked = $slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if parked.is_null() {
                Box::new(DfaCompiler::new())
            } else {
                // SAFETY: non-null slot values always come from
                // Box::into_raw in the matching release below
                unsafe { Box::from_raw(parked) }
            }
        }

        pub(crate) fn $release(compiler: Box<DfaCompiler<$elem>>) {
            let raw = Box::into_raw(compiler);
            if $slot
                .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // slot already occupied: drop this instance
                // SAFETY: raw was just produced by Box::into_raw and
                // never shared
                drop(unsafe { Box::from_raw(raw) });
            }
        }
    };
}

impl_pool!(retrieve_glyph_compiler, release_glyph_compiler, GLYPH_COMPILER_SLOT, u16);
impl_pool!(retrieve_utf8_compiler, release_utf8_compiler, UTF8_COMPILER_SLOT, u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_release_cycle() {
        let first = retrieve_glyph_compiler();
        let second = retrieve_glyph_compiler(); // slot empty: freshly allocated
        release_glyph_compiler(first);
        release_glyph_compiler(second); // slot occupied: dropped
        let _reused = retrieve_glyph_compiler();
    }
}
