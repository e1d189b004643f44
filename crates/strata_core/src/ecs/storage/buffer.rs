// buffer.rs - Raw, exactly-sized element buffers
//
// An `ErasedBuffer` owns memory for `capacity` elements of one layout and
// nothing else: it never constructs or drops values. Owners track which
// slots are live.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

pub(crate) struct ErasedBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
    item: Layout,
}

// Safety: the buffer is plain memory. Only `Send + Sync` types are stored in it.
unsafe impl Send for ErasedBuffer {}
unsafe impl Sync for ErasedBuffer {}

impl ErasedBuffer {
    /// Empty buffer; no allocation until the first resize.
    pub(crate) fn new(item: Layout) -> Self {
        Self {
            ptr: dangling(item.align()),
            capacity: 0,
            item,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address of slot `index`. Does not check liveness.
    #[inline]
    pub(crate) fn at(&self, index: usize) -> *mut u8 {
        debug_assert!(index <= self.capacity);
        // Safety: index is within (or one past) the allocation.
        unsafe { self.ptr.as_ptr().add(index * self.item.size()) }
    }

    /// Reallocate to hold exactly `capacity` elements. Slots below the smaller
    /// of the old and new capacity keep their bytes; the pointer may move.
    pub(crate) fn resize(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        if self.item.size() == 0 {
            self.capacity = capacity;
            return;
        }

        if capacity == 0 {
            // Safety: capacity != 0 here, so the buffer was allocated with this layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), self.array_layout(self.capacity)) };
            self.ptr = dangling(self.item.align());
            self.capacity = 0;
            return;
        }

        let new_layout = self.array_layout(capacity);
        let raw = if self.capacity == 0 {
            // Safety: new_layout has non-zero size.
            unsafe { alloc::alloc(new_layout) }
        } else {
            // Safety: ptr was allocated with the old layout; new size is non-zero.
            unsafe {
                alloc::realloc(
                    self.ptr.as_ptr(),
                    self.array_layout(self.capacity),
                    new_layout.size(),
                )
            }
        };

        self.ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.capacity = capacity;
    }

    /// Move `count` elements starting at `from` so they start at `to`.
    /// Ranges may overlap.
    ///
    /// # Safety
    /// Both ranges must lie within the capacity.
    pub(crate) unsafe fn shift(&mut self, from: usize, to: usize, count: usize) {
        debug_assert!(from + count <= self.capacity && to + count <= self.capacity);
        ptr::copy(self.at(from), self.at(to), count * self.item.size());
    }

    fn array_layout(&self, capacity: usize) -> Layout {
        let size = self
            .item
            .size()
            .checked_mul(capacity)
            .unwrap_or_else(|| panic!("buffer of {capacity} elements overflows usize"));
        match Layout::from_size_align(size, self.item.align()) {
            Ok(layout) => layout,
            Err(_) => panic!("buffer of {capacity} elements exceeds the maximum allocation size"),
        }
    }
}

impl Drop for ErasedBuffer {
    fn drop(&mut self) {
        if self.item.size() != 0 && self.capacity != 0 {
            // Safety: allocated with exactly this layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), self.array_layout(self.capacity)) };
        }
    }
}

/// Well-aligned, non-null pointer used for empty buffers and zero-sized types.
fn dangling(align: usize) -> NonNull<u8> {
    // Safety: Layout guarantees a non-zero power-of-two alignment.
    unsafe { NonNull::new_unchecked(align as *mut u8) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(32))]
    struct Wide([u8; 48]);

    #[test]
    fn test_resize_preserves_prefix() {
        let mut buffer = ErasedBuffer::new(Layout::new::<u64>());
        buffer.resize(3);
        unsafe {
            for i in 0..3 {
                buffer.at(i).cast::<u64>().write(i as u64 * 10);
            }
        }
        buffer.resize(5);
        buffer.resize(2);
        unsafe {
            assert_eq!(*buffer.at(0).cast::<u64>(), 0);
            assert_eq!(*buffer.at(1).cast::<u64>(), 10);
        }
        buffer.resize(0);
        assert_eq!(buffer.capacity(), 0);
    }

    #[test]
    fn test_alignment_is_respected() {
        let mut buffer = ErasedBuffer::new(Layout::new::<Wide>());
        assert_eq!(buffer.as_ptr() as usize % 32, 0);
        for capacity in [1, 4, 2, 7] {
            buffer.resize(capacity);
            assert_eq!(buffer.as_ptr() as usize % 32, 0);
            assert_eq!(buffer.at(1) as usize - buffer.at(0) as usize, 64);
        }
    }

    #[test]
    fn test_zero_sized_items_never_allocate() {
        let mut buffer = ErasedBuffer::new(Layout::new::<()>());
        buffer.resize(1000);
        assert_eq!(buffer.capacity(), 1000);
        assert_eq!(buffer.at(0), buffer.at(999));
    }

    #[test]
    fn test_shift_overlapping() {
        let mut buffer = ErasedBuffer::new(Layout::new::<u32>());
        buffer.resize(4);
        unsafe {
            for i in 0..3 {
                buffer.at(i).cast::<u32>().write(i as u32 + 1);
            }
            buffer.shift(0, 1, 3);
            assert_eq!(*buffer.at(1).cast::<u32>(), 1);
            assert_eq!(*buffer.at(3).cast::<u32>(), 3);
        }
    }
}
