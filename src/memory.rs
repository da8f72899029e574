//! Page-aligned scratch memory.

use std::{fmt, io, ptr::NonNull, slice};

use crate::{Error, Result};

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Size of a virtual memory page.
#[cfg(unix)]
pub fn page_size() -> usize {
   use std::sync::OnceLock;

   static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
   *PAGE_SIZE.get_or_init(|| {
      // SAFETY: sysconf has no preconditions.
      let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
      usize::try_from(size)
         .ok()
         .filter(|&s| s > 0)
         .unwrap_or(FALLBACK_PAGE_SIZE)
   })
}

#[cfg(not(unix))]
pub const fn page_size() -> usize {
   FALLBACK_PAGE_SIZE
}

/// An owned, zeroed memory region whose start is aligned to at least the
/// requested alignment. Released on drop.
///
/// On unix the region comes from an anonymous private mapping, which is page
/// aligned; alignments larger than a page are therefore rejected everywhere.
pub struct AlignedBuffer {
   ptr:        NonNull<u8>,
   size:       usize,
   mapped_len: usize,
   #[cfg(not(unix))]
   layout:     std::alloc::Layout,
}

// SAFETY: the buffer exclusively owns its region; shared access only hands out
// `&[u8]`.
unsafe impl Send for AlignedBuffer {}
// SAFETY: see above.
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
   /// Allocates `size` bytes aligned to `alignment`, which must be a power of
   /// two no larger than [`page_size`].
   pub fn new(size: usize, alignment: usize) -> Result<Self> {
      let page_size = page_size();
      if !alignment.is_power_of_two() || alignment > page_size {
         return Err(Error::InvalidAlignment { alignment, page_size });
      }

      // Zero-length mappings are invalid; back empty buffers with one byte.
      let mapped_len = size.max(1);
      Self::allocate(size, mapped_len, alignment)
   }

   #[cfg(unix)]
   fn allocate(size: usize, mapped_len: usize, _alignment: usize) -> Result<Self> {
      // SAFETY: anonymous mapping with no fixed address; the result is checked
      // against MAP_FAILED before use.
      let raw = unsafe {
         libc::mmap(
            std::ptr::null_mut(),
            mapped_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
         )
      };
      if raw == libc::MAP_FAILED {
         return Err(Error::Alloc { size, source: io::Error::last_os_error() });
      }
      let ptr = NonNull::new(raw.cast::<u8>())
         .ok_or_else(|| Error::Alloc { size, source: io::Error::other("mmap returned null") })?;
      Ok(Self { ptr, size, mapped_len })
   }

   #[cfg(not(unix))]
   fn allocate(size: usize, mapped_len: usize, alignment: usize) -> Result<Self> {
      let layout = std::alloc::Layout::from_size_align(mapped_len, alignment)
         .map_err(|_| Error::InvalidAlignment { alignment, page_size: page_size() })?;
      // SAFETY: layout has non-zero size.
      let raw = unsafe { std::alloc::alloc_zeroed(layout) };
      let ptr = NonNull::new(raw)
         .ok_or_else(|| Error::Alloc { size, source: io::ErrorKind::OutOfMemory.into() })?;
      Ok(Self { ptr, size, mapped_len, layout })
   }

   /// Requested size in bytes.
   pub const fn len(&self) -> usize {
      self.size
   }

   pub const fn is_empty(&self) -> bool {
      self.size == 0
   }

   pub const fn as_ptr(&self) -> *const u8 {
      self.ptr.as_ptr()
   }

   pub fn as_slice(&self) -> &[u8] {
      // SAFETY: ptr is valid for `mapped_len >= size` initialized bytes for the
      // lifetime of self.
      unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
   }

   pub fn as_mut_slice(&mut self) -> &mut [u8] {
      // SAFETY: as above, and `&mut self` guarantees exclusive access.
      unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
   }
}

impl Drop for AlignedBuffer {
   #[cfg(unix)]
   fn drop(&mut self) {
      // SAFETY: ptr/mapped_len describe the mapping created in `allocate`.
      let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.mapped_len) };
      if rc != 0 {
         tracing::warn!("munmap of {} bytes failed: {}", self.mapped_len, io::Error::last_os_error());
      }
   }

   #[cfg(not(unix))]
   fn drop(&mut self) {
      // SAFETY: ptr was allocated with this layout in `allocate`.
      unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
   }
}

impl fmt::Debug for AlignedBuffer {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("AlignedBuffer")
         .field("ptr", &self.ptr)
         .field("size", &self.size)
         .finish()
   }
}
