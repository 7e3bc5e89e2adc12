use crate::Backend;
use core::arch::asm;

pub const BACKEND: Backend = Backend::Aarch64VirtualCounter;

#[inline(always)]
pub fn read_raw_counter() -> u64 {
    let counter: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on every OS we target, the barriers have no
    // side effect beyond ordering.
    unsafe {
        asm!(
            "dsb sy",
            "isb",
            "mrs {}, cntvct_el0",
            "isb",
            "dsb sy",
            out(reg) counter,
            options(nostack, preserves_flags),
        );
    }
    counter
}
