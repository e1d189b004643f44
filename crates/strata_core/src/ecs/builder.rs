use crate::ecs::{Component, DynamicValue, Tag, TypeDescriptor};

/// Component values and tags for a single spawn.
///
/// Values are moved into archetype storage when the entity is spawned.
#[derive(Debug, Default)]
pub struct EntityBuilder {
    components: Vec<DynamicValue>,
    tags: Vec<&'static TypeDescriptor>,
}

impl EntityBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Rust-typed component by value.
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.components.push(DynamicValue::make(value));
        self
    }

    /// Add a component that starts at its default value.
    pub fn with_default<T: Component>(mut self) -> Self {
        self.components.push(DynamicValue::from_descriptor(T::descriptor()));
        self
    }

    /// Add an already type-erased component value. Empty values are ignored.
    pub fn with_value(mut self, value: DynamicValue) -> Self {
        if value.is_valid() {
            self.components.push(value);
        }
        self
    }

    pub fn tag<T: Tag>(mut self) -> Self {
        self.tags.push(T::descriptor());
        self
    }

    pub fn components(&self) -> &[DynamicValue] {
        &self.components
    }

    pub fn tags(&self) -> &[&'static TypeDescriptor] {
        &self.tags
    }

    pub(crate) fn into_parts(self) -> (Vec<DynamicValue>, Vec<&'static TypeDescriptor>) {
        (self.components, self.tags)
    }
}
