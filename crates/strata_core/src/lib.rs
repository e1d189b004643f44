//! Strata Core
//!
//! Archetype-based storage engine for heterogeneous, dynamically-typed
//! entity records:
//! - Type-erased values and arrays
//! - Columnar archetype storage with canonical layouts
//! - Entity index with stable ids
//! - Read/write component queries

pub mod config;
pub mod ecs;

pub use config::{SettingsError, WorldSettings};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
