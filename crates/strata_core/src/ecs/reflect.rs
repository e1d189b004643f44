// reflect.rs - Runtime type descriptors
//
// Storage never sees concrete component types. Everything it needs (layout,
// construction, destruction, copy, equality, reference reporting) goes through
// a `TypeDescriptor` interned once per Rust type.

use once_cell::sync::Lazy;
use std::alloc::Layout;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::sync::{PoisonError, RwLock};

/// Stable identity of a registered type. Gives the total order used for
/// canonical archetype layouts.
pub type TypeKey = u32;

/// Whether a type occupies storage (component) or only a signature bit (tag).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Component,
    Tag,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Component => f.write_str("component"),
            TypeKind::Tag => f.write_str("tag"),
        }
    }
}

/// Handle to an object owned outside the world that a stored value keeps
/// alive. The host decides what the number means.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

/// Receives the types and external references found while walking storage.
pub trait ReferenceCollector {
    fn add_type(&mut self, descriptor: &'static TypeDescriptor);
    fn add_reference(&mut self, handle: ObjectHandle);
}

/// Types that can be stored in a world.
///
/// Use [`define_component!`](crate::define_component) or
/// [`define_tag!`](crate::define_tag) instead of implementing this by hand
/// unless the type holds [`ObjectHandle`]s that must be reported.
pub trait Reflect: 'static + Default + Clone + PartialEq + Send + Sync {
    /// Unique key within the type's kind.
    const KEY: TypeKey;

    /// Human-readable name for logs and errors.
    const NAME: &'static str;

    const KIND: TypeKind;

    /// Report every external object this value refers to.
    fn report_references(&self, _collector: &mut dyn ReferenceCollector) {}

    /// Interned descriptor for this type.
    fn descriptor() -> &'static TypeDescriptor
    where
        Self: Sized,
    {
        descriptor_of::<Self>()
    }
}

/// Marker for types stored in archetype rows.
pub trait Component: Reflect {}

/// Marker for types that only contribute a signature bit.
pub trait Tag: Reflect {}

/// Type-erased description of a stored type.
///
/// All pointer arguments must be non-null and aligned to [`align`](Self::align).
pub struct TypeDescriptor {
    key: TypeKey,
    name: &'static str,
    kind: TypeKind,
    layout: Layout,
    type_id: TypeId,
    construct: unsafe fn(*mut u8),
    destroy: unsafe fn(*mut u8),
    copy: unsafe fn(*mut u8, *const u8),
    equals: unsafe fn(*const u8, *const u8) -> bool,
    report_references: unsafe fn(*const u8, &mut dyn ReferenceCollector),
}

impl TypeDescriptor {
    /// Build a descriptor for `T`. Prefer [`descriptor_of`], which interns it.
    pub fn of<T: Reflect>() -> Self {
        unsafe fn construct<T: Reflect>(dst: *mut u8) {
            dst.cast::<T>().write(T::default());
        }
        unsafe fn destroy<T: Reflect>(dst: *mut u8) {
            ptr::drop_in_place(dst.cast::<T>());
        }
        unsafe fn copy<T: Reflect>(dst: *mut u8, src: *const u8) {
            (*dst.cast::<T>()).clone_from(&*src.cast::<T>());
        }
        unsafe fn equals<T: Reflect>(a: *const u8, b: *const u8) -> bool {
            *a.cast::<T>() == *b.cast::<T>()
        }
        unsafe fn report_references<T: Reflect>(
            src: *const u8,
            collector: &mut dyn ReferenceCollector,
        ) {
            (*src.cast::<T>()).report_references(collector);
        }

        Self {
            key: T::KEY,
            name: T::NAME,
            kind: T::KIND,
            layout: Layout::new::<T>(),
            type_id: TypeId::of::<T>(),
            construct: construct::<T>,
            destroy: destroy::<T>,
            copy: copy::<T>,
            equals: equals::<T>,
            report_references: report_references::<T>,
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Same Rust type behind both descriptors.
    #[inline]
    pub fn same_type(&self, other: &TypeDescriptor) -> bool {
        self.type_id == other.type_id
    }

    /// Default-construct one value into uninitialized memory.
    ///
    /// # Safety
    /// `dst` must be valid for writes of one value and hold no live value.
    #[inline]
    pub unsafe fn construct(&self, dst: *mut u8) {
        (self.construct)(dst);
    }

    /// # Safety
    /// `dst` must be valid for writes of `count` contiguous values.
    pub unsafe fn construct_n(&self, dst: *mut u8, count: usize) {
        for i in 0..count {
            (self.construct)(dst.add(i * self.size()));
        }
    }

    /// Drop one value in place, leaving the memory uninitialized.
    ///
    /// # Safety
    /// `dst` must hold a live value of this type.
    #[inline]
    pub unsafe fn destroy(&self, dst: *mut u8) {
        (self.destroy)(dst);
    }

    /// # Safety
    /// `dst` must hold `count` contiguous live values of this type.
    pub unsafe fn destroy_n(&self, dst: *mut u8, count: usize) {
        for i in 0..count {
            (self.destroy)(dst.add(i * self.size()));
        }
    }

    /// Assign `src` into the live value at `dst`.
    ///
    /// # Safety
    /// Both pointers must hold live values of this type and must not overlap.
    #[inline]
    pub unsafe fn copy(&self, dst: *mut u8, src: *const u8) {
        (self.copy)(dst, src);
    }

    /// # Safety
    /// Both ranges must hold `count` live values and must not overlap.
    pub unsafe fn copy_n(&self, dst: *mut u8, src: *const u8, count: usize) {
        for i in 0..count {
            let offset = i * self.size();
            (self.copy)(dst.add(offset), src.add(offset));
        }
    }

    /// # Safety
    /// Both pointers must hold live values of this type.
    #[inline]
    pub unsafe fn equals(&self, a: *const u8, b: *const u8) -> bool {
        (self.equals)(a, b)
    }

    /// # Safety
    /// `src` must hold a live value of this type.
    #[inline]
    pub unsafe fn report_references(&self, src: *const u8, collector: &mut dyn ReferenceCollector) {
        (self.report_references)(src, collector);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size())
            .field("align", &self.align())
            .finish()
    }
}

/// Interned descriptors, one per Rust type, alive for the whole process.
static DESCRIPTORS: Lazy<RwLock<HashMap<TypeId, &'static TypeDescriptor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Look up (or create) the descriptor for `T`.
pub fn descriptor_of<T: Reflect>() -> &'static TypeDescriptor {
    let type_id = TypeId::of::<T>();
    if let Some(descriptor) = DESCRIPTORS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
    {
        return *descriptor;
    }

    let mut map = DESCRIPTORS.write().unwrap_or_else(PoisonError::into_inner);
    *map.entry(type_id)
        .or_insert_with(|| &*Box::leak(Box::new(TypeDescriptor::of::<T>())))
}

/// Implement [`Component`] for a type.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Default, PartialEq)]
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, 1, "Position");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $key:expr, $name:expr) => {
        impl $crate::ecs::Reflect for $ty {
            const KEY: $crate::ecs::TypeKey = $key;
            const NAME: &'static str = $name;
            const KIND: $crate::ecs::TypeKind = $crate::ecs::TypeKind::Component;
        }

        impl $crate::ecs::Component for $ty {}
    };
}

/// Implement [`Tag`] for a type.
#[macro_export]
macro_rules! define_tag {
    ($ty:ty, $key:expr, $name:expr) => {
        impl $crate::ecs::Reflect for $ty {
            const KEY: $crate::ecs::TypeKey = $key;
            const NAME: &'static str = $name;
            const KIND: $crate::ecs::TypeKind = $crate::ecs::TypeKind::Tag;
        }

        impl $crate::ecs::Tag for $ty {}
    };
}
