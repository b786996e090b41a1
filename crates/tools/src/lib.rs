//! Developer tooling: read-only scene inspection for debugging and the
//! command line.
//!
//! # Invariants
//! - Inspection never mutates the scene.
//! - Output is deterministic: entities are listed in handle order.

mod inspector;

pub use inspector::{EntityInfo, SceneInspector, SceneSummary};

pub fn crate_info() -> &'static str {
    "lumen-tools v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("tools"));
    }
}
