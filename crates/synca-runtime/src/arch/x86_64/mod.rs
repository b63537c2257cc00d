//! x86_64 context switching (System V AMD64 ABI)

use super::EntryFn;
use std::arch::naked_asm;

/// Default MXCSR (all exceptions masked, round-to-nearest)
const MXCSR_DEFAULT: u64 = 0x1F80;

/// Default x87 control word
const X87_CW_DEFAULT: u64 = 0x037F;

/// Callee-saved state of a suspended context
///
/// Layout (offsets are used by the asm below):
/// ```text
/// 0x00 rsp   0x08 rip   0x10 rbx   0x18 rbp
/// 0x20 r12   0x28 r13   0x30 r14   0x38 r15
/// 0x40 mxcsr (u32) + x87 control word (u16)
/// ```
#[repr(C)]
#[derive(Debug, Default)]
pub struct Registers {
    pub rsp: u64,
    pub rip: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub fpcw: u64,
}

/// Initialize a fresh context
///
/// The first switch into `regs` lands in the trampoline, which calls
/// `entry(arg)` on the new stack.
///
/// # Safety
///
/// `stack_top` must be the 16-byte aligned top of a live, writable stack
/// that outlives every switch into `regs`.
#[inline]
pub unsafe fn init_context(regs: &mut Registers, stack_top: *mut u8, entry: EntryFn, arg: usize) {
    // Trampoline is entered by jmp with rsp 16-aligned; its `call` then
    // leaves rsp = 8 (mod 16) at entry, as the ABI expects.
    let sp = (stack_top as usize) & !0xF;

    *regs = Registers {
        rsp: sp as u64,
        rip: entry_trampoline as usize as u64,
        rbx: 0,
        rbp: 0,
        r12: entry as usize as u64,
        r13: arg as u64,
        r14: 0,
        r15: 0,
        fpcw: MXCSR_DEFAULT | (X87_CW_DEFAULT << 32),
    };
}

/// Trampoline that calls the entry function with its argument
#[unsafe(naked)]
unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        // entry never returns
        "ud2",
    );
}

/// Save callee-saved registers to `old` and load them from `new`
///
/// Returns when some other context switches back into `old`.
///
/// # Safety
///
/// Both pointers must be valid; `new` must hold either a context saved by
/// this function or one prepared by `init_context`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut Registers, _new: *const Registers) {
    naked_asm!(
        // Save into old (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "stmxcsr [rdi + 0x40]",
        "fnstcw [rdi + 0x44]",
        // Load from new (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "ldmxcsr [rsi + 0x40]",
        "fldcw [rsi + 0x44]",
        "jmp rax",
        // Resume point of a saved context
        "1:",
        "ret",
    );
}
