//! Contiguous array of one runtime-chosen type.
//!
//! The element type is fixed by the first typed write. Every structural
//! change reallocates to the exact new length, so pointers into the array are
//! invalidated by any insert or remove. An empty array owns no memory.

use crate::ecs::storage::ErasedBuffer;
use crate::ecs::{descriptor_of, ReferenceCollector, Reflect, TypeDescriptor};
use std::alloc::Layout;
use std::fmt;

pub struct DynamicValueArray {
    descriptor: Option<&'static TypeDescriptor>,
    buffer: ErasedBuffer,
    len: usize,
}

impl DynamicValueArray {
    /// Untyped, empty array.
    pub fn new() -> Self {
        Self {
            descriptor: None,
            buffer: ErasedBuffer::new(Layout::new::<()>()),
            len: 0,
        }
    }

    /// Empty array already bound to a type.
    pub fn with_type(descriptor: &'static TypeDescriptor) -> Self {
        let mut this = Self::new();
        this.bind(descriptor);
        this
    }

    /// Array of `count` copies read from `src`.
    ///
    /// # Safety
    /// `src` must point at `count` contiguous live values of the described type.
    pub unsafe fn from_raw(descriptor: &'static TypeDescriptor, src: *const u8, count: usize) -> Self {
        let mut this = Self::with_type(descriptor);
        this.append_from_raw(src, count);
        this
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
    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.len
    }

    #[inline]
    pub fn descriptor(&self) -> Option<&'static TypeDescriptor> {
        self.descriptor
    }

    #[inline]
    pub fn is_a<T: 'static>(&self) -> bool {
        self.descriptor.is_some_and(|d| d.is::<T>())
    }

    /// Append `value`, returning its index.
    pub fn emplace<T: Reflect>(&mut self, value: T) -> usize {
        self.bind(descriptor_of::<T>());
        let index = self.len;
        self.buffer.resize(index + 1);
        // Safety: slot `index` was just allocated and is uninitialized.
        unsafe { self.buffer.at(index).cast::<T>().write(value) };
        self.len += 1;
        index
    }

    /// Append a default-constructed element.
    pub fn push_default(&mut self) -> usize {
        let descriptor = self.bound("push_default");
        let index = self.len;
        self.buffer.resize(index + 1);
        // Safety: slot `index` was just allocated and is uninitialized.
        unsafe { descriptor.construct(self.buffer.at(index)) };
        self.len += 1;
        index
    }

    /// Append a copy of the value at `src`.
    ///
    /// # Safety
    /// `src` must point at a live value of the bound type outside this array.
    pub unsafe fn push_from_raw(&mut self, src: *const u8) -> usize {
        let index = self.len;
        self.append_from_raw(src, 1);
        index
    }

    /// Append copies of `count` contiguous values starting at `src`.
    ///
    /// # Safety
    /// `src` must point at `count` live values of the bound type outside this array.
    pub unsafe fn append_from_raw(&mut self, src: *const u8, count: usize) {
        let descriptor = self.bound("append_from_raw");
        let start = self.len;
        self.buffer.resize(start + count);
        let dst = self.buffer.at(start);
        descriptor.construct_n(dst, count);
        descriptor.copy_n(dst, src, count);
        self.len += count;
    }

    /// Insert `value` at `index`, shifting later elements up by one.
    pub fn insert_at<T: Reflect>(&mut self, value: T, index: usize) {
        self.bind(descriptor_of::<T>());
        self.open_gap(index);
        // Safety: open_gap left slot `index` uninitialized.
        unsafe { self.buffer.at(index).cast::<T>().write(value) };
        self.len += 1;
    }

    /// Insert a copy of the value at `src` at `index`.
    ///
    /// # Safety
    /// `src` must point at a live value of the bound type outside this array.
    pub unsafe fn insert_from_raw(&mut self, src: *const u8, index: usize) {
        let descriptor = self.bound("insert_from_raw");
        self.open_gap(index);
        let dst = self.buffer.at(index);
        descriptor.construct(dst);
        descriptor.copy(dst, src);
        self.len += 1;
    }

    /// Destroy up to `count` elements starting at `index` and close the gap.
    /// The count is clamped to the end of the array.
    pub fn remove_at(&mut self, index: usize, count: usize) {
        assert!(
            index < self.len,
            "remove index {index} out of bounds (len {})",
            self.len
        );
        let Some(descriptor) = self.descriptor else {
            return;
        };
        let count = count.min(self.len - index);
        let tail = self.len - index - count;
        // Shrink first so a panicking destructor leaks the tail instead of
        // dropping it twice.
        self.len = index;
        // Safety: [index, index + count) are live; the tail is moved down bitwise.
        unsafe {
            descriptor.destroy_n(self.buffer.at(index), count);
            self.buffer.shift(index + count, index, tail);
        }
        self.len = index + tail;
        self.buffer.resize(self.len);
    }

    /// Grow with default-constructed elements or truncate, destroying the
    /// removed tail.
    pub fn set_count(&mut self, count: usize) {
        if count > self.len {
            let descriptor = self.bound("set_count");
            self.buffer.resize(count);
            // Safety: the new tail is freshly allocated.
            unsafe { descriptor.construct_n(self.buffer.at(self.len), count - self.len) };
            self.len = count;
        } else {
            self.truncate(count);
        }
    }

    /// Resize without constructing new elements.
    ///
    /// # Safety
    /// When growing, the caller must initialize every slot in `[len, count)`
    /// through [`get_raw_mut`](Self::get_raw_mut) before any other use.
    pub unsafe fn set_count_uninitialized(&mut self, count: usize) {
        if count > self.len {
            self.bound("set_count_uninitialized");
            self.buffer.resize(count);
            self.len = count;
        } else {
            self.truncate(count);
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn get<T: 'static>(&self, index: usize) -> &T {
        self.check_type::<T>();
        self.check_index(index);
        // Safety: index and type checked.
        unsafe { &*self.buffer.at(index).cast::<T>() }
    }

    pub fn get_mut<T: 'static>(&mut self, index: usize) -> &mut T {
        self.check_type::<T>();
        self.check_index(index);
        // Safety: index and type checked.
        unsafe { &mut *self.buffer.at(index).cast::<T>() }
    }

    /// Address of element `index`. Valid until the next structural change.
    pub fn get_raw(&self, index: usize) -> *const u8 {
        self.check_index(index);
        self.buffer.at(index).cast_const()
    }

    pub fn get_raw_mut(&mut self, index: usize) -> *mut u8 {
        self.check_index(index);
        self.buffer.at(index)
    }

    pub fn last<T: 'static>(&self) -> Option<&T> {
        self.len.checked_sub(1).map(|index| self.get::<T>(index))
    }

    pub fn as_slice<T: 'static>(&self) -> &[T] {
        if self.descriptor.is_none() {
            return &[];
        }
        self.check_type::<T>();
        // Safety: len live, contiguous, aligned elements of type T.
        unsafe { std::slice::from_raw_parts(self.buffer.as_ptr().cast::<T>(), self.len) }
    }

    pub fn as_mut_slice<T: 'static>(&mut self) -> &mut [T] {
        if self.descriptor.is_none() {
            return &mut [];
        }
        self.check_type::<T>();
        // Safety: len live, contiguous, aligned elements of type T.
        unsafe { std::slice::from_raw_parts_mut(self.buffer.as_ptr().cast::<T>(), self.len) }
    }

    pub fn iter<T: 'static>(&self) -> std::slice::Iter<'_, T> {
        self.as_slice::<T>().iter()
    }

    /// Report the element type once, then each element's references.
    pub fn collect_references(&self, collector: &mut dyn ReferenceCollector) {
        let Some(descriptor) = self.descriptor else {
            return;
        };
        collector.add_type(descriptor);
        for index in 0..self.len {
            // Safety: every index below len is live.
            unsafe { descriptor.report_references(self.buffer.at(index), collector) };
        }
    }

    fn bind(&mut self, descriptor: &'static TypeDescriptor) {
        match self.descriptor {
            Some(bound) => assert!(
                bound.same_type(descriptor),
                "DynamicValueArray holds {} but received {}",
                bound.name(),
                descriptor.name()
            ),
            None => {
                self.descriptor = Some(descriptor);
                self.buffer = ErasedBuffer::new(descriptor.layout());
            }
        }
    }

    fn bound(&self, operation: &str) -> &'static TypeDescriptor {
        match self.descriptor {
            Some(descriptor) => descriptor,
            None => panic!("{operation} on an untyped DynamicValueArray"),
        }
    }

    /// Grow by one and move `[index, len)` up a slot, leaving `index` uninitialized.
    fn open_gap(&mut self, index: usize) {
        assert!(
            index <= self.len,
            "insert index {index} out of bounds (len {})",
            self.len
        );
        self.buffer.resize(self.len + 1);
        // Safety: both ranges fit in the new capacity.
        unsafe { self.buffer.shift(index, index + 1, self.len - index) };
    }

    fn truncate(&mut self, count: usize) {
        if count >= self.len {
            return;
        }
        let removed = self.len - count;
        self.len = count;
        if let Some(descriptor) = self.descriptor {
            // Safety: [count, count + removed) are still live.
            unsafe { descriptor.destroy_n(self.buffer.at(count), removed) };
        }
        self.buffer.resize(count);
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.len,
            "index {index} out of bounds (len {})",
            self.len
        );
    }

    fn check_type<T: 'static>(&self) {
        let descriptor = self.bound("typed access");
        assert!(
            descriptor.is::<T>(),
            "DynamicValueArray holds {}, not {}",
            descriptor.name(),
            std::any::type_name::<T>()
        );
    }
}

impl Default for DynamicValueArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DynamicValueArray {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Clone for DynamicValueArray {
    fn clone(&self) -> Self {
        match self.descriptor {
            // Safety: the source holds len live values in its own buffer.
            Some(descriptor) => unsafe {
                Self::from_raw(descriptor, self.buffer.as_ptr(), self.len)
            },
            None => Self::new(),
        }
    }
}

impl PartialEq for DynamicValueArray {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        if self.len == 0 {
            return true;
        }
        match (self.descriptor, other.descriptor) {
            (Some(a), Some(b)) if a.same_type(b) => (0..self.len).all(|i| {
                // Safety: both arrays hold len live values of the same type.
                unsafe { a.equals(self.buffer.at(i), other.buffer.at(i)) }
            }),
            _ => false,
        }
    }
}

impl fmt::Debug for DynamicValueArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicValueArray")
            .field("type", &self.descriptor.map(TypeDescriptor::name))
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::cell::{Cell, RefCell};
    use std::panic::{self, AssertUnwindSafe};

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Word(String);
    define_component!(Word, 10, "Word");

    #[derive(Clone, Copy, Default, PartialEq, Debug)]
    struct Num(i64);
    define_component!(Num, 11, "Num");

    #[derive(Clone, Copy, Default, PartialEq, Debug)]
    struct Unit;
    define_component!(Unit, 12, "Unit");

    thread_local! {
        static DROPPED: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
        static ARMED: Cell<Option<u32>> = const { Cell::new(None) };
    }

    /// Logs its id when dropped and panics if that id is armed.
    #[derive(Clone, Default, PartialEq, Debug)]
    struct Fragile(u32);
    define_component!(Fragile, 13, "Fragile");

    impl Drop for Fragile {
        fn drop(&mut self) {
            DROPPED.with(|d| d.borrow_mut().push(self.0));
            if ARMED.with(|a| a.get()) == Some(self.0) {
                panic!("fragile {} dropped", self.0);
            }
        }
    }

    fn fragile_array(count: u32) -> DynamicValueArray {
        DROPPED.with(|d| d.borrow_mut().clear());
        let mut array = DynamicValueArray::new();
        for id in 0..count {
            array.emplace(Fragile(id));
        }
        array
    }

    fn dropped_once() -> Vec<u32> {
        let mut dropped = DROPPED.with(|d| d.borrow().clone());
        let total = dropped.len();
        dropped.sort_unstable();
        dropped.dedup();
        assert_eq!(dropped.len(), total, "an element was dropped twice");
        dropped
    }

    fn words(array: &DynamicValueArray) -> Vec<&str> {
        array.iter::<Word>().map(|w| w.0.as_str()).collect()
    }

    #[test]
    fn test_emplace_insert_remove_order() {
        let mut array = DynamicValueArray::new();
        for w in ["a", "b", "c", "d"] {
            array.emplace(Word(w.into()));
        }
        array.insert_at(Word("x".into()), 1);
        array.insert_at(Word("end".into()), 5);
        assert_eq!(words(&array), ["a", "x", "b", "c", "d", "end"]);

        array.remove_at(2, 2);
        assert_eq!(words(&array), ["a", "x", "d", "end"]);
        assert_eq!(array.len(), 6 - 2);

        // Count is clamped to the end.
        array.remove_at(1, 100);
        assert_eq!(words(&array), ["a"]);
        assert_eq!(array.last::<Word>(), Some(&Word("a".into())));
    }

    #[test]
    fn test_random_sequences_match_vec() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let mut array = DynamicValueArray::with_type(descriptor_of::<Num>());
        let mut model: Vec<Num> = Vec::new();

        for step in 0..3000 {
            let value = Num(step);
            match rng.gen_range(0..4) {
                0 => {
                    array.emplace(value);
                    model.push(value);
                }
                1 => {
                    let index = rng.gen_range(0..=model.len());
                    array.insert_at(value, index);
                    model.insert(index, value);
                }
                2 if !model.is_empty() => {
                    let index = rng.gen_range(0..model.len());
                    let count = rng.gen_range(1..5);
                    array.remove_at(index, count);
                    model.drain(index..(index + count).min(model.len()));
                }
                _ => {
                    let count = rng.gen_range(0..model.len() + 3);
                    array.set_count(count);
                    model.resize(count, Num::default());
                }
            }
            assert_eq!(array.len(), model.len(), "step {step}");
            assert_eq!(array.as_slice::<Num>(), model.as_slice(), "step {step}");
        }
    }

    #[test]
    fn test_panicking_drop_in_remove_is_not_repeated() {
        let mut array = fragile_array(5);
        ARMED.with(|a| a.set(Some(2)));
        let result = panic::catch_unwind(AssertUnwindSafe(|| array.remove_at(1, 2)));
        ARMED.with(|a| a.set(None));
        assert!(result.is_err());
        assert_eq!(array.len(), 1);

        drop(array);
        // The rest of the removed span and the tail leak.
        assert_eq!(dropped_once(), [0, 1, 2]);
    }

    #[test]
    fn test_panicking_drop_in_truncate_is_not_repeated() {
        let mut array = fragile_array(4);
        ARMED.with(|a| a.set(Some(1)));
        let result = panic::catch_unwind(AssertUnwindSafe(|| array.set_count(1)));
        ARMED.with(|a| a.set(None));
        assert!(result.is_err());
        assert_eq!(array.len(), 1);

        drop(array);
        assert_eq!(dropped_once(), [0, 1]);
    }

    #[test]
    fn test_remove_everything_frees() {
        let mut array = DynamicValueArray::new();
        array.emplace(Num(1));
        array.emplace(Num(2));
        array.remove_at(0, 2);
        assert!(array.is_empty());
        assert_eq!(array.buffer.capacity(), 0);
        assert_eq!(array.last::<Num>(), None);
        // Type stays bound.
        assert!(array.is_a::<Num>());
    }

    #[test]
    fn test_set_count() {
        let mut array = DynamicValueArray::with_type(descriptor_of::<Word>());
        array.set_count(3);
        assert_eq!(words(&array), ["", "", ""]);
        array.get_mut::<Word>(1).0.push_str("mid");
        array.set_count(2);
        assert_eq!(words(&array), ["", "mid"]);
        array.set_count(0);
        assert!(array.is_empty());
    }

    #[test]
    fn test_raw_paths_copy() {
        let source = Word("copied".into());
        let mut array = DynamicValueArray::with_type(descriptor_of::<Word>());
        unsafe {
            array.push_from_raw((&source as *const Word).cast());
            array.insert_from_raw((&source as *const Word).cast(), 0);
        }
        array.push_default();
        assert_eq!(words(&array), ["copied", "copied", ""]);
        assert_eq!(source.0, "copied");
    }

    #[test]
    fn test_set_count_uninitialized() {
        let mut array = DynamicValueArray::with_type(descriptor_of::<Num>());
        unsafe {
            array.set_count_uninitialized(2);
            array.get_raw_mut(0).cast::<Num>().write(Num(4));
            array.get_raw_mut(1).cast::<Num>().write(Num(9));
        }
        assert_eq!(array.as_slice::<Num>(), &[Num(4), Num(9)]);
    }

    #[test]
    fn test_clone_and_equality() {
        let mut a = DynamicValueArray::new();
        a.emplace(Num(1));
        a.emplace(Num(2));
        let mut b = a.clone();
        assert_eq!(a, b);
        b.get_mut::<Num>(0).0 = 7;
        assert_ne!(a, b);

        let mut c = DynamicValueArray::new();
        c.emplace(Word::default());
        c.emplace(Word::default());
        assert_ne!(a, c);
        assert_eq!(DynamicValueArray::new(), DynamicValueArray::with_type(descriptor_of::<Num>()));
    }

    #[test]
    fn test_zero_sized_elements() {
        let mut array = DynamicValueArray::new();
        array.emplace(Unit);
        array.emplace(Unit);
        array.remove_at(0, 1);
        assert_eq!(array.len(), 1);
        assert_eq!(array.as_slice::<Unit>().len(), 1);
    }

    #[test]
    #[should_panic(expected = "DynamicValueArray holds Num but received Word")]
    fn test_mixed_types_fault() {
        let mut array = DynamicValueArray::new();
        array.emplace(Num(1));
        array.emplace(Word::default());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_range_fault() {
        let mut array = DynamicValueArray::new();
        array.emplace(Num(1));
        array.get::<Num>(1);
    }
}
