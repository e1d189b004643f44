use crate::config::SettingsError;
use crate::ecs::{CompTypeId, EntityId, TagTypeId, TypeKey, TypeKind};
use thiserror::Error;

/// Errors returned by the world's public API.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("{0} is not alive")]
    InvalidEntity(EntityId),

    #[error("component '{name}' is not registered")]
    UnregisteredComponent { name: &'static str },

    #[error("tag '{name}' is not registered")]
    UnregisteredTag { name: &'static str },

    #[error("{0} is out of range for the registry")]
    UnknownComponentId(CompTypeId),

    #[error("{0} is out of range for the registry")]
    UnknownTagId(TagTypeId),

    #[error("no component or tag types were registered")]
    NoTypesRegistered,

    #[error("{kind} key {key} is used by both '{first}' and '{second}'")]
    DuplicateTypeKey {
        kind: TypeKind,
        key: TypeKey,
        first: &'static str,
        second: &'static str,
    },

    #[error("'{name}' is a {actual} but was registered as a {expected}")]
    KindMismatch {
        name: &'static str,
        expected: TypeKind,
        actual: TypeKind,
    },

    #[error("component '{name}' was supplied more than once")]
    DuplicateComponent { name: &'static str },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Errors raised while resolving a query against the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("query does not read or write any components")]
    Empty,

    #[error("component '{name}' is both read and written")]
    Overlap { name: &'static str },

    #[error("query writes {count} components; at most {max} are supported")]
    TooManyWrites { count: usize, max: usize },
}
