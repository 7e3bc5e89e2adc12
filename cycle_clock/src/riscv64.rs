use crate::Backend;
use core::arch::asm;

pub const BACKEND: Backend = Backend::Riscv64Time;

#[inline(always)]
pub fn read_raw_counter() -> u64 {
    let counter: u64;
    // rdcycle traps in user mode on recent Linux kernels, rdtime does not.
    // SAFETY: reading the time CSR is a side-effect-free instruction.
    unsafe {
        asm!(
            "fence iorw, iorw",
            "rdtime {}",
            "fence iorw, iorw",
            out(reg) counter,
            options(nostack, preserves_flags),
        );
    }
    counter
}
