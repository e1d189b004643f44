//! Single type-erased value with its own heap slot.
//!
//! A [`DynamicValue`] is either empty or holds exactly one live value of the
//! type named by its descriptor. Cloning deep-copies through the descriptor.

use crate::ecs::storage::ErasedBuffer;
use crate::ecs::{descriptor_of, ReferenceCollector, Reflect, TypeDescriptor};
use std::fmt;

struct Slot {
    descriptor: &'static TypeDescriptor,
    buffer: ErasedBuffer,
}

#[derive(Default)]
pub struct DynamicValue {
    slot: Option<Slot>,
}

impl DynamicValue {
    /// Empty value.
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn make<T: Reflect>(value: T) -> Self {
        let mut this = Self::new();
        this.set(value);
        this
    }

    /// Default-constructed value of the described type.
    pub fn from_descriptor(descriptor: &'static TypeDescriptor) -> Self {
        let mut this = Self::new();
        this.set_default(descriptor);
        this
    }

    /// Copy of the value at `src`.
    ///
    /// # Safety
    /// `src` must point at a live value of the described type.
    pub unsafe fn from_raw(descriptor: &'static TypeDescriptor, src: *const u8) -> Self {
        let mut this = Self::new();
        this.set_from_raw(descriptor, src);
        this
    }

    /// Replace the held value with `value`.
    pub fn set<T: Reflect>(&mut self, value: T) -> &mut T {
        let descriptor = descriptor_of::<T>();
        let buffer = self.release_for(descriptor);
        // Safety: buffer holds one uninitialized slot laid out for T.
        unsafe { buffer.as_ptr().cast::<T>().write(value) };
        let slot = self.slot.insert(Slot { descriptor, buffer });
        // Safety: just written.
        unsafe { &mut *slot.buffer.as_ptr().cast::<T>() }
    }

    /// Replace the held value with a default-constructed one.
    pub fn set_default(&mut self, descriptor: &'static TypeDescriptor) {
        let buffer = self.release_for(descriptor);
        // Safety: buffer holds one uninitialized slot for this descriptor.
        unsafe { descriptor.construct(buffer.as_ptr()) };
        self.slot = Some(Slot { descriptor, buffer });
    }

    /// Replace the held value with a copy of `src`: default-construct, then
    /// assign.
    ///
    /// # Safety
    /// `src` must point at a live value of the described type that does not
    /// live inside this value.
    pub unsafe fn set_from_raw(&mut self, descriptor: &'static TypeDescriptor, src: *const u8) {
        self.set_default(descriptor);
        if let Some(slot) = &self.slot {
            descriptor.copy(slot.buffer.as_ptr(), src);
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    #[inline]
    pub fn is_a<T: 'static>(&self) -> bool {
        self.slot.as_ref().is_some_and(|s| s.descriptor.is::<T>())
    }

    #[inline]
    pub fn descriptor(&self) -> Option<&'static TypeDescriptor> {
        self.slot.as_ref().map(|s| s.descriptor)
    }

    /// Raw address of the held value.
    pub fn as_ptr(&self) -> Option<*const u8> {
        self.slot.as_ref().map(|s| s.buffer.as_ptr().cast_const())
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        let slot = self.slot.as_ref().filter(|s| s.descriptor.is::<T>())?;
        // Safety: type checked above.
        Some(unsafe { &*slot.buffer.as_ptr().cast::<T>() })
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let slot = self.slot.as_mut().filter(|s| s.descriptor.is::<T>())?;
        // Safety: type checked above.
        Some(unsafe { &mut *slot.buffer.as_ptr().cast::<T>() })
    }

    /// Like [`get`](Self::get) but panics when empty or holding another type.
    pub fn get_checked<T: 'static>(&self) -> &T {
        let held = self.held_name();
        self.get::<T>().unwrap_or_else(|| {
            panic!(
                "DynamicValue holds {held}, not {}",
                std::any::type_name::<T>()
            )
        })
    }

    pub fn get_checked_mut<T: 'static>(&mut self) -> &mut T {
        let held = self.held_name();
        self.get_mut::<T>().unwrap_or_else(|| {
            panic!(
                "DynamicValue holds {held}, not {}",
                std::any::type_name::<T>()
            )
        })
    }

    /// Whether the held value equals `other`.
    pub fn eq_value<T: Reflect>(&self, other: &T) -> bool {
        self.get::<T>().is_some_and(|v| v == other)
    }

    /// Destroy the held value and free its slot.
    pub fn reset(&mut self) {
        if let Some(slot) = self.slot.take() {
            // Safety: the slot holds one live value of its descriptor.
            unsafe { slot.descriptor.destroy(slot.buffer.as_ptr()) };
        }
    }

    /// Move the held value out, leaving `self` empty.
    pub fn take(&mut self) -> DynamicValue {
        std::mem::take(self)
    }

    /// Bitwise-move the held value into `dst` and free the slot without
    /// running the destructor. Returns the moved type, or `None` when empty.
    ///
    /// # Safety
    /// `dst` must be valid for writes of the held type and hold no live value.
    pub unsafe fn move_into(mut self, dst: *mut u8) -> Option<&'static TypeDescriptor> {
        let slot = self.slot.take()?;
        std::ptr::copy_nonoverlapping(slot.buffer.as_ptr(), dst, slot.descriptor.size());
        Some(slot.descriptor)
    }

    /// Report the held type and whatever the value references.
    pub fn collect_references(&self, collector: &mut dyn ReferenceCollector) {
        if let Some(slot) = &self.slot {
            collector.add_type(slot.descriptor);
            // Safety: the slot holds one live value.
            unsafe { slot.descriptor.report_references(slot.buffer.as_ptr(), collector) };
        }
    }

    /// Drop any held value and hand back a one-element buffer for `descriptor`,
    /// reusing the old allocation when the layout matches.
    fn release_for(&mut self, descriptor: &'static TypeDescriptor) -> ErasedBuffer {
        match self.slot.take() {
            Some(slot) => {
                // Safety: the slot holds one live value of its descriptor.
                unsafe { slot.descriptor.destroy(slot.buffer.as_ptr()) };
                if slot.descriptor.layout() == descriptor.layout() {
                    slot.buffer
                } else {
                    Self::fresh_buffer(descriptor)
                }
            }
            None => Self::fresh_buffer(descriptor),
        }
    }

    fn fresh_buffer(descriptor: &TypeDescriptor) -> ErasedBuffer {
        let mut buffer = ErasedBuffer::new(descriptor.layout());
        buffer.resize(1);
        buffer
    }

    fn held_name(&self) -> &'static str {
        self.descriptor().map_or("nothing", TypeDescriptor::name)
    }
}

impl Drop for DynamicValue {
    fn drop(&mut self) {
        self.reset();
    }
}

impl Clone for DynamicValue {
    fn clone(&self) -> Self {
        match &self.slot {
            // Safety: the slot holds one live value and the copy gets its own buffer.
            Some(slot) => unsafe { Self::from_raw(slot.descriptor, slot.buffer.as_ptr()) },
            None => Self::new(),
        }
    }
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.slot, &other.slot) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.descriptor.same_type(b.descriptor)
                    // Safety: both slots hold live values of the same type.
                    && unsafe { a.descriptor.equals(a.buffer.as_ptr(), b.buffer.as_ptr()) }
            }
            _ => false,
        }
    }
}

impl fmt::Debug for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicValue")
            .field("type", &self.held_name())
            .finish()
    }
}
