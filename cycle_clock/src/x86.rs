use crate::{join_halves, Backend};
use core::arch::asm;

pub const BACKEND: Backend = Backend::X86Tsc;

// MFENCE needs SSE2, the module is only selected when the target has it.
#[inline(always)]
pub fn read_raw_counter() -> u64 {
    let low: u32;
    let high: u32;
    // SAFETY: MFENCE and RDTSC are unprivileged and only write EAX/EDX.
    unsafe {
        asm!(
            "mfence",
            "rdtsc",
            "mfence",
            out("eax") low,
            out("edx") high,
            options(nostack, preserves_flags),
        );
    }
    join_halves(high, low)
}
