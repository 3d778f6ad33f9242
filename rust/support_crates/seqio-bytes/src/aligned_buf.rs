use std::{alloc::Layout, ptr::NonNull};

/// An owned, fixed-capacity byte region whose start address is aligned to a
/// caller-specified power of two.
///
/// The memory is zero-initialized on allocation and released exactly once, when
/// the `AlignedBuf` is dropped. Unlike a growable vector, the buffer never
/// reallocates, so raw pointers obtained from it stay valid for its whole lifetime.
/// This is what makes it usable as the target of asynchronous I/O requests.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: `AlignedBuf` exclusively owns its allocation; shared access only hands
// out `&[u8]` and mutation requires `&mut self`.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Allocates a zeroed buffer of `capacity` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` if `capacity` is zero or `alignment` is not a power of two.
    /// * `OutOfMemory` if the allocator cannot satisfy the request.
    pub fn zeroed(capacity: usize, alignment: usize) -> std::io::Result<AlignedBuf> {
        if capacity == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "aligned buffer capacity must be non-zero",
            ));
        }
        let layout = Layout::from_size_align(capacity, alignment).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid alignment {alignment} for capacity {capacity}"),
            )
        })?;

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "failed to allocate aligned buffer",
            )
        })?;
        Ok(AlignedBuf { ptr, layout })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns the whole region, `capacity()` bytes long.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the allocation is `capacity()` bytes and always initialized.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: see `as_slice`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity()) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with this exact layout.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("capacity", &self.capacity())
            .field("alignment", &self.alignment())
            .finish()
    }
}
