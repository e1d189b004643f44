//! Archetype-based entity/component storage.
//!
//! Values of registered types live in per-type rows inside archetypes, one
//! archetype per distinct combination of components and tags. Storage is
//! type-erased: every operation on a stored value goes through the type's
//! [`TypeDescriptor`]. The [`World`] is the entry point; the lower layers
//! ([`DynamicValue`], [`DynamicValueArray`], [`storage::Archetype`]) are
//! public for hosts that need raw access.

mod archetypes;
mod builder;
mod entity;
mod error;
mod ids;
mod query;
mod reflect;
mod registry;
pub mod storage;
mod value;
mod value_array;
mod world;

pub use archetypes::ArchetypeRegistry;
pub use builder::EntityBuilder;
pub use entity::{EntityIndex, EntityRecord};
pub use error::{QueryError, WorldError};
pub use ids::{ArchetypeId, CompTypeId, EntityId, TagTypeId};
pub use query::{Query, QueryRow, MAX_QUERY_WRITES};
pub use reflect::{
    descriptor_of, Component, ObjectHandle, ReferenceCollector, Reflect, Tag, TypeDescriptor,
    TypeKey, TypeKind,
};
pub use registry::{
    ArchetypeRecord, CompDescription, TagDescription, TypeDescription, TypeProvider,
    TypeRegistry, TypeSet,
};
pub use value::DynamicValue;
pub use value_array::DynamicValueArray;
pub use world::World;

/// Spawn an entity into the world using builder-style component construction.
#[macro_export]
macro_rules! spawn {
    ($world:expr $(, $component:expr)+ $(,)?) => {{
        let builder = {
            let mut builder = $crate::ecs::EntityBuilder::new();
            $(
                builder = builder.with($component);
            )+
            builder
        };
        $world
            .spawn(builder)
            .expect("failed to spawn entity")
    }};
}
