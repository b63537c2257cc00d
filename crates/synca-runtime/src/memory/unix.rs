//! Unix stack mapping using mmap

use std::sync::OnceLock;

use nix::unistd::{sysconf, SysconfVar};
use synca_core::error::{MemoryError, SyncaResult};

const FALLBACK_PAGE_SIZE: usize = 4096;

/// System page size (queried once)
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(n)) if n > 0 => n as usize,
        _ => FALLBACK_PAGE_SIZE,
    })
}

#[cfg(target_os = "linux")]
const STACK_FLAGS: libc::c_int =
    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_STACK;

#[cfg(not(target_os = "linux"))]
const STACK_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

/// Map `len` bytes read/write and turn the lowest `guard` bytes into
/// an inaccessible guard region.
pub(super) fn map_stack(len: usize, guard: usize) -> SyncaResult<*mut u8> {
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            STACK_FLAGS,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(MemoryError::AllocationFailed.into());
    }

    // Guard page stays PROT_NONE, overflow faults here
    let ret = unsafe { libc::mprotect(base, guard, libc::PROT_NONE) };
    if ret != 0 {
        unsafe {
            libc::munmap(base, len);
        }
        return Err(MemoryError::ProtectionFailed.into());
    }

    Ok(base as *mut u8)
}

pub(super) fn unmap_stack(base: *mut u8, len: usize) -> SyncaResult<()> {
    let ret = unsafe { libc::munmap(base as *mut libc::c_void, len) };
    if ret != 0 {
        return Err(MemoryError::ReleaseFailed.into());
    }
    Ok(())
}
