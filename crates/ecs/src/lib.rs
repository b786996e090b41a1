//! Dense component storage keyed by entity handles.
//!
//! Each component type lives in its own `ComponentManager<T>`: a contiguous
//! array of components, a parallel array of owning entities and a hash
//! lookup from entity to index.
//!
//! # Invariants
//! - Every entity appears at most once per manager.
//! - `entities[i]` owns `components[i]`, and `lookup[entities[i]] == i`.
//! - Swap-removal keeps the arrays dense; iteration order is creation order
//!   only until the first `remove`.

mod manager;
mod remap;

pub use manager::ComponentManager;
pub use remap::{EntityMap, RemapEntities};

use lumen_common::Entity;

/// Errors from component storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("entity {0} already has this component")]
    AlreadyExists(Entity),
    #[error("invalid entity handle")]
    InvalidEntity,
    #[error("component array is corrupt: {entities} entities but {components} components")]
    LengthMismatch { entities: usize, components: usize },
    #[error("entity {0} appears more than once in a component array")]
    Duplicate(Entity),
}

pub fn crate_info() -> &'static str {
    "lumen-ecs v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("ecs"));
    }
}
