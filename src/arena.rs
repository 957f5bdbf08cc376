//! Memory provider and bump allocator for one counting run.
//!
//! # Scope
//! One contiguous virtual reservation backs everything a run touches: the
//! input file mapped copy-on-write at offset 0, its space padding, and a
//! fixed scratch arena carved behind it. Working buffers are bump-allocated
//! from the arena up front and live for the whole call; nothing is freed
//! until the reservation is dropped.
//!
//! # Invariants
//! - The file region is padded with `0x20` up to the next 128-byte
//!   multiple, and the reservation extends at least two pages past the
//!   file, so 64-byte window reads never leave the mapping.
//! - The bump cursor is monotonic and 8-byte aligned; handed-out slices
//!   never overlap.
//! - Arena pages are demand-zero: fresh allocations read as zeroes.
//!
//! # Failure modes
//! - Reservation or overlay failure is surfaced as an error; a failed
//!   hugepage attempt falls back to base pages and is recorded so the
//!   caller can report it once.
//! - Arena exhaustion is a sizing bug, not an input condition, and panics.

use std::cell::Cell;
use std::fs::File;
use std::io;
use std::mem::{align_of, size_of};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;

use crate::config::{ARENA_BYTES, MAX_FILE_BYTES, USE_HUGEPAGES};
use crate::errors::WordCountError;

const BASE_PAGE: usize = 4096;
const HUGE_PAGE: usize = 2 * 1024 * 1024;
const PAD_ALIGN: usize = 128;

#[inline]
fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// The reservation: padded file region plus scratch arena.
#[derive(Debug)]
pub struct FileArena {
    base: NonNull<u8>,
    reserved: usize,
    file_len: usize,
    padded_len: usize,
    cursor: Cell<usize>,
    hugepage_fallback: bool,
}

// SAFETY: the arena exclusively owns its mapping; nothing in it is tied to
// the creating thread.
unsafe impl Send for FileArena {}

impl FileArena {
    /// Opens `path`, reserves the combined region and overlays the file.
    pub fn map_file(path: &Path) -> Result<Self, WordCountError> {
        let file = File::open(path).map_err(WordCountError::Open)?;
        let meta = file.metadata().map_err(WordCountError::Open)?;
        if !meta.is_file() {
            return Err(WordCountError::Open(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let size = meta.len();
        if size >= MAX_FILE_BYTES {
            return Err(WordCountError::TooLarge { size });
        }
        let file_len = size as usize;

        if USE_HUGEPAGES {
            if let Ok(arena) = Self::map_region(&file, file_len, true) {
                return Ok(arena);
            }
        }
        let mut arena = Self::map_region(&file, file_len, false).map_err(WordCountError::Map)?;
        arena.hugepage_fallback = USE_HUGEPAGES;
        Ok(arena)
    }

    fn map_region(file: &File, file_len: usize, huge: bool) -> io::Result<FileArena> {
        #[cfg(not(target_os = "linux"))]
        if huge {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "hugepages unavailable",
            ));
        }

        let page = if huge { HUGE_PAGE } else { BASE_PAGE };
        let file_region = round_up(file_len + 2 * page, page);
        let reserved = file_region + ARENA_BYTES;
        let padded_len = round_up(file_len + 1, PAD_ALIGN);

        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        if !huge {
            // Table pages are touched sparsely; don't charge the whole
            // reservation against the commit limit.
            flags |= libc::MAP_NORESERVE;
        }
        #[cfg(target_os = "linux")]
        if huge {
            flags |= libc::MAP_HUGETLB;
        }

        // SAFETY: fresh anonymous mapping at a kernel-chosen address.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                reserved,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = base as *mut u8;

        let unmap = |err: io::Error| {
            // SAFETY: unmaps exactly the reservation created above.
            unsafe { libc::munmap(base as *mut libc::c_void, reserved) };
            err
        };

        // Overlay the whole-page span of the file copy-on-write at offset
        // 0. The partial tail page and everything after it stay anonymous
        // and writable; tail bytes are copied in below.
        let file_pages = file_len & !(BASE_PAGE - 1);
        if file_pages > 0 {
            // SAFETY: MAP_FIXED entirely inside the reservation above.
            let overlay = unsafe {
                libc::mmap(
                    base as *mut libc::c_void,
                    file_pages,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_FIXED,
                    file.as_raw_fd(),
                    0,
                )
            };
            if overlay == libc::MAP_FAILED {
                return Err(unmap(io::Error::last_os_error()));
            }
        }

        let tail = file_len - file_pages;
        if tail > 0 {
            // SAFETY: [file_pages, file_len) is anonymous writable memory
            // inside the reservation.
            let dst = unsafe { std::slice::from_raw_parts_mut(base.add(file_pages), tail) };
            if let Err(err) = file.read_exact_at(dst, file_pages as u64) {
                return Err(unmap(err));
            }
        }

        // SAFETY: [file_len, padded_len) lies past the overlay and inside
        // the reservation (padded_len <= file_len + 2 pages <= file_region).
        unsafe {
            std::ptr::write_bytes(base.add(file_len), b' ', padded_len - file_len);
        }

        #[cfg(target_os = "linux")]
        {
            // SAFETY: advisory calls on the mapping and fd we own.
            unsafe {
                let _ = libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
                let _ = libc::madvise(
                    base as *mut libc::c_void,
                    file_region,
                    libc::MADV_SEQUENTIAL,
                );
            }
        }

        Ok(FileArena {
            // SAFETY: mmap succeeded, so `base` is non-null.
            base: unsafe { NonNull::new_unchecked(base) },
            reserved,
            file_len,
            padded_len,
            cursor: Cell::new(file_region),
            hugepage_fallback: false,
        })
    }

    /// Hands out a zeroed, 8-byte-aligned slice from the scratch arena.
    ///
    /// All returned slices are disjoint: the cursor only moves forward.
    /// The shared receiver allows several live allocations at once.
    ///
    /// # Panics
    /// Panics if the arena is exhausted (a sizing bug, not an input
    /// condition).
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice<T>(&self, len: usize) -> &mut [T] {
        assert!(align_of::<T>() <= 8, "arena alignment exceeded");
        let bytes = size_of::<T>()
            .checked_mul(len)
            .expect("arena allocation overflow");
        let start = self.cursor.get();
        let end = start
            .checked_add(round_up(bytes, 8))
            .expect("arena allocation overflow");
        assert!(end <= self.reserved, "scratch arena exhausted");
        self.cursor.set(end);
        // SAFETY: [start, end) is fresh demand-zero memory inside the
        // reservation, 8-byte aligned, and never handed out twice.
        unsafe {
            std::slice::from_raw_parts_mut(self.base.as_ptr().add(start) as *mut T, len)
        }
    }

    /// Base of the reservation; all 40-bit offsets are relative to this.
    #[inline]
    pub fn bytes_base(&self) -> *const u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn file_len(&self) -> usize {
        self.file_len
    }

    /// File length rounded up to the padding boundary; the scanner walks
    /// exactly this many bytes.
    #[inline]
    pub fn padded_len(&self) -> usize {
        self.padded_len
    }

    /// The original bytes plus their space padding.
    #[inline]
    pub fn padded_file(&self) -> &[u8] {
        // SAFETY: [0, padded_len) is initialized (file overlay + tail copy
        // + padding) and lives as long as the arena.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.padded_len) }
    }

    /// Byte offset of `p` from the reservation base.
    ///
    /// # Panics
    /// Debug-asserts that `p` points into the reservation.
    #[inline]
    pub fn offset_of(&self, p: *const u8) -> u64 {
        let off = (p as usize).wrapping_sub(self.base.as_ptr() as usize);
        debug_assert!(off < self.reserved, "pointer outside the reservation");
        off as u64
    }

    /// True when a hugepage reservation was attempted and fell back to
    /// base pages.
    #[inline]
    pub fn hugepage_fallback(&self) -> bool {
        self.hugepage_fallback
    }
}

impl Drop for FileArena {
    fn drop(&mut self) {
        // SAFETY: unmaps exactly the reservation this arena owns.
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.reserved);
        }
    }
}

/// Fixed-capacity push view over an arena slice: a `Vec` that never
/// reallocates. Exceeding capacity is a logic error (debug assert plus a
/// release-mode bounds check).
pub struct ArenaVec<'a, T: Copy> {
    buf: &'a mut [T],
    len: usize,
}

impl<'a, T: Copy> ArenaVec<'a, T> {
    pub fn new(buf: &'a mut [T]) -> Self {
        Self { buf, len: 0 }
    }

    #[inline(always)]
    pub fn push(&mut self, value: T) {
        debug_assert!(self.len < self.buf.len(), "arena vec capacity exceeded");
        self.buf[self.len] = value;
        self.len += 1;
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.buf[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.buf[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file_with(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn maps_and_pads_small_file() {
        let f = temp_file_with(b"hello world");
        let arena = FileArena::map_file(f.path()).unwrap();
        assert_eq!(arena.file_len(), 11);
        assert_eq!(arena.padded_len(), 128);
        let bytes = arena.padded_file();
        assert_eq!(&bytes[..11], b"hello world");
        assert!(bytes[11..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn empty_file_still_gets_padding() {
        let f = temp_file_with(b"");
        let arena = FileArena::map_file(f.path()).unwrap();
        assert_eq!(arena.file_len(), 0);
        assert_eq!(arena.padded_len(), 128);
        assert!(arena.padded_file().iter().all(|&b| b == b' '));
    }

    #[test]
    fn pads_past_an_exact_boundary() {
        let f = temp_file_with(&[b'x'; 128]);
        let arena = FileArena::map_file(f.path()).unwrap();
        assert_eq!(arena.padded_len(), 256);
        assert!(arena.padded_file()[128..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn maps_multi_page_files() {
        let data = vec![b'a'; 3 * 4096 + 77];
        let f = temp_file_with(&data);
        let arena = FileArena::map_file(f.path()).unwrap();
        assert_eq!(&arena.padded_file()[..data.len()], &data[..]);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = FileArena::map_file(Path::new("/no/such/file")).unwrap_err();
        assert!(matches!(err, WordCountError::Open(_)));
    }

    #[test]
    fn allocations_are_zeroed_and_disjoint() {
        let f = temp_file_with(b"x");
        let arena = FileArena::map_file(f.path()).unwrap();
        let a: &mut [u64] = arena.alloc_slice(16);
        let b: &mut [u32] = arena.alloc_slice(7);
        assert!(a.iter().all(|&x| x == 0));
        assert!(b.iter().all(|&x| x == 0));
        a[15] = 1;
        b[6] = 2;
        let a_end = a.as_ptr() as usize + 16 * 8;
        assert!(a_end <= b.as_ptr() as usize);
        assert_eq!(arena.offset_of(b.as_ptr() as *const u8) % 8, 0);
    }

    #[test]
    fn arena_vec_pushes_and_clears() {
        let f = temp_file_with(b"x");
        let arena = FileArena::map_file(f.path()).unwrap();
        let buf: &mut [u16] = arena.alloc_slice(8);
        let mut v = ArenaVec::new(buf);
        assert!(v.is_empty());
        v.push(3);
        v.push(9);
        assert_eq!(v.as_slice(), &[3, 9]);
        assert_eq!(v.capacity(), 8);
        v.clear();
        assert!(v.is_empty());
    }
}
