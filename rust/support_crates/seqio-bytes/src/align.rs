/// Aligns a number up to the next multiple of the specified alignment.
///
/// If the input is already aligned, it is returned unchanged.
///
/// # Examples
///
/// ```
/// use seqio_bytes::align::align_up_u64;
///
/// assert_eq!(align_up_u64(0, 512), 0);
/// assert_eq!(align_up_u64(1, 512), 512);
/// assert_eq!(align_up_u64(512, 512), 512);
/// assert_eq!(align_up_u64(1500, 512), 1536);
/// ```
///
/// # Panics
///
/// Panics in debug builds if `alignment` is zero or not a power of two.
#[inline]
pub fn align_up_u64(n: u64, alignment: u64) -> u64 {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    (n + alignment - 1) & !(alignment - 1)
}

/// Aligns a number down to the previous multiple of the specified alignment.
///
/// # Examples
///
/// ```
/// use seqio_bytes::align::align_down_u64;
///
/// assert_eq!(align_down_u64(0, 512), 0);
/// assert_eq!(align_down_u64(511, 512), 0);
/// assert_eq!(align_down_u64(1500, 512), 1024);
/// ```
#[inline]
pub fn align_down_u64(n: u64, alignment: u64) -> u64 {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    n & !(alignment - 1)
}

/// Checks whether `n` lies exactly on an alignment boundary.
///
/// # Examples
///
/// ```
/// use seqio_bytes::align::is_aligned_u64;
///
/// assert!(is_aligned_u64(0, 512));
/// assert!(is_aligned_u64(4096, 512));
/// assert!(!is_aligned_u64(476, 512));
/// ```
#[inline]
pub fn is_aligned_u64(n: u64, alignment: u64) -> bool {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    (n & (alignment - 1)) == 0
}

#[inline]
pub fn align_up_usize(n: usize, alignment: usize) -> usize {
    align_up_u64(n as u64, alignment as u64) as usize
}

#[inline]
pub fn is_aligned_usize(n: usize, alignment: usize) -> bool {
    is_aligned_u64(n as u64, alignment as u64)
}

/// Checks whether a pointer's address is a multiple of `alignment`.
#[inline]
pub fn is_aligned_ptr(ptr: *const u8, alignment: usize) -> bool {
    is_aligned_usize(ptr as usize, alignment)
}
