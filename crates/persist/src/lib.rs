//! Scene persistence.
//!
//! [`archive`] reads and writes single scene files; [`store`] keeps a
//! numbered history of them with a sha256 hash chain.
//!
//! # Invariants
//! - A loaded scene never shares entity handles with the file it came from
//!   or with any live scene; every handle is remapped on load.
//! - Every section and every revision is hash-checked before it is decoded.
//! - Derived state (world matrices, bounds, hierarchy order) is recomputed
//!   by the first update after a load.

pub mod archive;
pub mod store;

pub use archive::{
    ArchiveError, FORMAT_VERSION, LoadReport, MAGIC, SECTION_VERSION, SceneFile, Section,
    decode_scene, encode_scene, load_scene, load_scene_into, save_scene,
};
pub use store::{IntegrityManifest, ManifestEntry, SceneStore, StoreError, StoreMeta};

pub fn crate_info() -> &'static str {
    "lumen-persist v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("persist"));
    }
}
