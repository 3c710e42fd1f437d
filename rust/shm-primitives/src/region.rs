use std::ptr::NonNull;

/// A contiguous, byte-addressable region of (possibly shared) memory.
///
/// Accesses go through volatile loads and stores: the memory behind a
/// `Region` may outlive this process and be observed by the next one.
///
/// # Safety
///
/// The caller must ensure:
/// - `base` is valid for `len` bytes
/// - the memory remains valid for the lifetime of this Region
#[derive(Clone, Copy)]
pub struct Region {
    base: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Create a region from a raw pointer and length.
    ///
    /// # Safety
    ///
    /// - `base` must be valid for reads and writes of `len` bytes
    /// - the memory must remain valid for the lifetime of this Region
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        let base = NonNull::new(base).expect("region base must be non-null");
        Self { base, len }
    }

    /// Returns the base pointer of the region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Returns the size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a pointer to offset `off` within the region.
    #[inline]
    pub fn offset(&self, off: usize) -> *mut u8 {
        assert!(
            off < self.len,
            "offset {off} out of bounds (len={})",
            self.len
        );
        unsafe { self.as_ptr().add(off) }
    }

    /// Read the byte at `off`.
    #[inline]
    pub fn load(&self, off: usize) -> u8 {
        unsafe { self.offset(off).read_volatile() }
    }

    /// Write `value` at `off`.
    #[inline]
    pub fn store(&self, off: usize, value: u8) {
        unsafe { self.offset(off).write_volatile(value) }
    }

    /// Add one to the byte at `off`, wrapping 255 to 0. Returns the new value.
    #[inline]
    pub fn wrapping_increment(&self, off: usize) -> u8 {
        let next = self.load(off).wrapping_add(1);
        self.store(off, next);
        next
    }

    /// Copy the whole region out into an owned buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        (0..self.len).map(|off| self.load(off)).collect()
    }
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

mod heap {
    use super::Region;
    use std::alloc::{Layout, alloc_zeroed, dealloc};
    use std::ptr::NonNull;

    /// Heap-backed region for tests or process-local usage.
    pub struct HeapRegion {
        base: NonNull<u8>,
        len: usize,
        layout: Layout,
    }

    impl HeapRegion {
        /// Allocate a zeroed heap region.
        pub fn new_zeroed(size: usize) -> Self {
            let layout =
                Layout::from_size_align(size.max(1), 64).expect("invalid heap region layout");
            let ptr = unsafe { alloc_zeroed(layout) };
            let base = NonNull::new(ptr).expect("heap region allocation failed");
            Self {
                base,
                len: size,
                layout,
            }
        }

        /// Returns a Region view of this allocation.
        #[inline]
        pub fn region(&self) -> Region {
            unsafe { Region::from_raw(self.base.as_ptr(), self.len) }
        }

        /// Returns the allocation size.
        #[inline]
        pub fn len(&self) -> usize {
            self.len
        }

        /// Returns true if the allocation is zero-length.
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.len == 0
        }
    }

    impl Drop for HeapRegion {
        fn drop(&mut self) {
            unsafe { dealloc(self.base.as_ptr(), self.layout) };
        }
    }

    unsafe impl Send for HeapRegion {}
    unsafe impl Sync for HeapRegion {}
}

pub use heap::HeapRegion;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_region_starts_zeroed() {
        let heap = HeapRegion::new_zeroed(16);
        assert_eq!(heap.region().to_vec(), vec![0u8; 16]);
    }

    #[test]
    fn increment_wraps_at_255() {
        let heap = HeapRegion::new_zeroed(4);
        let region = heap.region();
        region.store(2, 255);
        assert_eq!(region.wrapping_increment(2), 0);
        assert_eq!(region.wrapping_increment(2), 1);
        assert_eq!(region.to_vec(), vec![0, 0, 1, 0]);
    }

    #[test]
    fn copies_share_memory() {
        let heap = HeapRegion::new_zeroed(8);
        let a = heap.region();
        let b = a;
        a.store(7, 0x42);
        assert_eq!(b.load(7), 0x42);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_offset_panics() {
        let heap = HeapRegion::new_zeroed(16);
        heap.region().load(16);
    }
}
