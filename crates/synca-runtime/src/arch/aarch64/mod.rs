//! aarch64 context switching (AAPCS64)

use super::EntryFn;
use std::arch::naked_asm;

/// Callee-saved state of a suspended context
///
/// Layout (offsets are used by the asm below):
/// ```text
/// 0x00 sp    0x08 pc (x30)   0x10..0x58 x19-x28
/// 0x60 x29   0x68..0xA0 d8-d15
/// ```
#[repr(C)]
#[derive(Debug, Default)]
pub struct Registers {
    pub sp: u64,
    pub pc: u64,
    pub x19_x28: [u64; 10],
    pub fp: u64,
    pub d8_d15: [u64; 8],
}

/// Initialize a fresh context
///
/// # Safety
///
/// `stack_top` must be the 16-byte aligned top of a live, writable stack
/// that outlives every switch into `regs`.
#[inline]
pub unsafe fn init_context(regs: &mut Registers, stack_top: *mut u8, entry: EntryFn, arg: usize) {
    let mut saved = [0u64; 10];
    saved[0] = entry as usize as u64; // x19
    saved[1] = arg as u64; // x20

    *regs = Registers {
        sp: (stack_top as usize & !0xF) as u64,
        pc: entry_trampoline as usize as u64,
        x19_x28: saved,
        fp: 0,
        d8_d15: [0; 8],
    };
}

#[unsafe(naked)]
unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov x0, x20",
        "blr x19",
        // entry never returns
        "brk #0x1",
    );
}

/// Save callee-saved registers to `old` and load them from `new`
///
/// # Safety
///
/// Both pointers must be valid; `new` must hold either a context saved by
/// this function or one prepared by `init_context`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut Registers, _new: *const Registers) {
    naked_asm!(
        // Save into old (x0)
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "str x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "str x29, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // Load from new (x1)
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x30, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldr x29, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ret",
    );
}
