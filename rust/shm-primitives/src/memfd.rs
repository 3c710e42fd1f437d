//! Anonymous memory regions backed by `memfd_create`.
//!
//! A `MemfdRegion` has no filesystem path: the only way to reach its memory
//! is through the descriptor. Whoever holds a duplicate of that descriptor
//! (a supervisor's fd store, a later incarnation of this process) can map the
//! same pages again.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use crate::{Region, RegionError};

/// Shared, read-write mapping of a memfd.
pub struct MemfdRegion {
    /// Pointer to the mapped memory
    ptr: *mut u8,
    /// Length of the mapping in bytes
    len: usize,
    /// The memfd (kept open for as long as the mapping is in use)
    file: File,
}

impl MemfdRegion {
    /// Create a new anonymous region of `size` bytes.
    ///
    /// The memfd is created close-on-exec, truncated to `size` (so it reads as
    /// zeroes) and mapped with `MAP_SHARED`. `name` only shows up in
    /// `/proc/<pid>/fd` and carries no meaning otherwise.
    pub fn create(name: &str, size: usize) -> Result<Self, RegionError> {
        if size == 0 {
            return Err(RegionError::ZeroSize);
        }

        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "memfd name contains NUL"))?;

        let raw = unsafe { libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }

        // SAFETY: memfd_create just returned this descriptor and nothing else owns it.
        let file = unsafe { File::from_raw_fd(raw) };
        file.set_len(size as u64)?;

        let ptr = map_shared(&file, size)?;
        tracing::debug!(fd = raw, size, "created memfd region");

        Ok(Self {
            ptr,
            len: size,
            file,
        })
    }

    /// Map an existing memfd that is expected to be exactly `expected_size` bytes.
    ///
    /// The current contents are left untouched. A descriptor of any other size
    /// is refused rather than resized.
    pub fn from_fd(fd: OwnedFd, expected_size: usize) -> Result<Self, RegionError> {
        if expected_size == 0 {
            return Err(RegionError::ZeroSize);
        }

        let file = File::from(fd);
        let actual = file.metadata()?.len();
        if actual != expected_size as u64 {
            return Err(RegionError::SizeMismatch {
                expected: expected_size,
                actual,
            });
        }

        let ptr = map_shared(&file, expected_size)?;
        tracing::debug!(fd = file.as_raw_fd(), size = expected_size, "attached memfd region");

        Ok(Self {
            ptr,
            len: expected_size,
            file,
        })
    }

    /// Get a `Region` view of this mapping.
    #[inline]
    pub fn region(&self) -> Region {
        // SAFETY: The mapping is valid for the lifetime of MemfdRegion
        unsafe { Region::from_raw(self.ptr, self.len) }
    }

    /// Get the size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region is empty (zero bytes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsFd for MemfdRegion {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl Drop for MemfdRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

fn map_shared(file: &File, size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

// SAFETY: The mapping is valid for the lifetime of MemfdRegion; the memory is
// shared by construction.
unsafe impl Send for MemfdRegion {}
unsafe impl Sync for MemfdRegion {}
