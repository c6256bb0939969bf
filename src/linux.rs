//! Kernel I/O hints
//!
//! On Linux the archive is read with `fadvise`/`madvise` sequential hints and
//! extracted files are preallocated with `fallocate`, then dropped from the
//! page cache once written. Every hint is advisory: failures are ignored and
//! other platforms get no-ops.

use std::fs::File;

pub use imp::{fadvise_dontneed, fadvise_sequential, madvise_sequential, preallocate_file};

#[cfg(target_os = "linux")]
mod imp {
    use rustix::fs::{Advice, FallocateFlags, fadvise, fallocate};
    use std::fs::File;
    use std::num::NonZeroU64;

    /// Hint that a mapped archive will be read front to back.
    pub fn madvise_sequential(addr: *const u8, len: usize) {
        use rustix::mm::{Advice as MmAdvice, madvise};

        if len == 0 {
            return;
        }
        // SAFETY: addr and len describe a live mapping owned by the caller
        unsafe {
            let ptr = addr as *mut std::ffi::c_void;
            let _ = madvise(ptr, len, MmAdvice::Sequential);
            let _ = madvise(ptr, len, MmAdvice::WillNeed);
        }
    }

    /// Hint that an opened archive will be read front to back.
    pub fn fadvise_sequential(file: &File, len: u64) {
        let _ = fadvise(file, 0, NonZeroU64::new(len), Advice::Sequential);
        let _ = fadvise(file, 0, NonZeroU64::new(len), Advice::WillNeed);
    }

    /// Reserve `size` bytes for a file about to be written.
    pub fn preallocate_file(file: &File, size: u64) -> std::io::Result<()> {
        if size > 0 {
            fallocate(file, FallocateFlags::empty(), 0, size)?;
        }
        Ok(())
    }

    /// Let the kernel evict a finished file's pages.
    pub fn fadvise_dontneed(file: &File, offset: u64, len: u64) {
        let _ = fadvise(file, offset, NonZeroU64::new(len), Advice::DontNeed);
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::fs::File;

    pub fn madvise_sequential(_addr: *const u8, _len: usize) {}

    pub fn fadvise_sequential(_file: &File, _len: u64) {}

    pub fn preallocate_file(_file: &File, _size: u64) -> std::io::Result<()> {
        Ok(())
    }

    pub fn fadvise_dontneed(_file: &File, _offset: u64, _len: u64) {}
}

/// Apply the read-side hints to a freshly opened archive.
pub fn advise_archive(file: &File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    fadvise_sequential(file, len);
    Ok(len)
}
