//! Directory of scene revisions guarded by a hash chain.
//!
//! Layout inside the store directory:
//! ```text
//! scene.meta.json          - schema version and revision count
//! revisions/
//!   000001.lscene          - scene files, see [`crate::archive`]
//! integrity/
//!   manifest.json          - sha256 of every revision, chained
//! ```

use crate::archive::{self, ArchiveError, LoadReport};
use lumen_scene::Scene;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STORE_SCHEMA_VERSION: u32 = 1;
const META_FILE: &str = "scene.meta.json";
const REVISIONS_DIR: &str = "revisions";
const INTEGRITY_DIR: &str = "integrity";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("integrity check failed for {filename}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
    #[error("schema version mismatch: store has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store has no revisions")]
    NoRevisions,
    #[error("revision {0} does not exist")]
    UnknownRevision(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
    pub revision_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Append-only history of a scene. Revisions are numbered from 1.
#[derive(Debug)]
pub struct SceneStore {
    root: PathBuf,
    meta: StoreMeta,
    manifest: IntegrityManifest,
}

impl SceneStore {
    /// Open the store at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(REVISIONS_DIR))?;
        std::fs::create_dir_all(root.join(INTEGRITY_DIR))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = root.join(INTEGRITY_DIR).join(MANIFEST_FILE);

        let store = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            let manifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            Self { root, meta, manifest }
        } else {
            let store = Self {
                root,
                meta: StoreMeta {
                    schema_version: STORE_SCHEMA_VERSION,
                    revision_count: 0,
                },
                manifest: IntegrityManifest::default(),
            };
            store.save_meta()?;
            store.save_manifest()?;
            store
        };
        tracing::debug!(
            root = %store.root.display(),
            revisions = store.meta.revision_count,
            "scene store opened"
        );
        Ok(store)
    }

    /// Write `scene` as the next revision and return its number.
    pub fn commit(&mut self, scene: &Scene) -> Result<u32, StoreError> {
        let bytes = archive::encode_scene(scene)?;
        let revision = self.meta.revision_count + 1;
        let filename = revision_filename(revision);
        std::fs::write(self.root.join(REVISIONS_DIR).join(&filename), &bytes)?;

        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());
        self.manifest.entries.push(ManifestEntry {
            filename,
            sha256: archive::sha256_hex(&bytes),
            prev_hash,
        });
        self.meta.revision_count = revision;
        self.save_meta()?;
        self.save_manifest()?;
        tracing::info!(revision, bytes = bytes.len(), "scene revision committed");
        Ok(revision)
    }

    pub fn load_latest(&self) -> Result<(Scene, LoadReport), StoreError> {
        if self.meta.revision_count == 0 {
            return Err(StoreError::NoRevisions);
        }
        self.load_revision(self.meta.revision_count)
    }

    pub fn load_revision(&self, revision: u32) -> Result<(Scene, LoadReport), StoreError> {
        if revision == 0 || revision > self.meta.revision_count {
            return Err(StoreError::UnknownRevision(revision));
        }
        let filename = revision_filename(revision);
        let bytes = std::fs::read(self.root.join(REVISIONS_DIR).join(&filename))?;
        self.verify_file_hash(&filename, &bytes)?;
        Ok(archive::decode_scene(&bytes)?)
    }

    /// Check the manifest chain and every revision file against it.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let mut prev_hash: Option<String> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    filename: entry.filename.clone(),
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            let data = std::fs::read(self.root.join(REVISIONS_DIR).join(&entry.filename))?;
            let actual = archive::sha256_hex(&data);
            if actual != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    filename: entry.filename.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    pub fn manifest(&self) -> &IntegrityManifest {
        &self.manifest
    }

    fn verify_file_hash(&self, filename: &str, data: &[u8]) -> Result<(), StoreError> {
        let actual = archive::sha256_hex(data);
        match self.manifest.entries.iter().find(|e| e.filename == filename) {
            Some(entry) if entry.sha256 != actual => Err(StoreError::IntegrityMismatch {
                filename: filename.to_owned(),
                expected: entry.sha256.clone(),
                actual,
            }),
            Some(_) => Ok(()),
            None => Err(StoreError::IntegrityMismatch {
                filename: filename.to_owned(),
                expected: "manifest entry".into(),
                actual,
            }),
        }
    }

    fn save_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        let path = self.root.join(INTEGRITY_DIR).join(MANIFEST_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

fn revision_filename(revision: u32) -> String {
    format!("{revision:06}.lscene")
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn scene_with(names: &[&str]) -> Scene {
        let mut scene = Scene::new();
        for (i, name) in names.iter().enumerate() {
            let e = scene.entity_create_object(name);
            scene
                .transforms
                .get_mut(e)
                .unwrap()
                .translate(Vec3::new(i as f32, 0.0, 0.0));
        }
        scene
    }

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SceneStore::open(tmp.path().join("level")).unwrap();
        assert_eq!(store.meta().revision_count, 0);
        assert!(store.root().join(REVISIONS_DIR).is_dir());
        assert!(store.root().join(INTEGRITY_DIR).join(MANIFEST_FILE).is_file());
        assert!(matches!(store.load_latest(), Err(StoreError::NoRevisions)));
    }

    #[test]
    fn commits_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("level");
        {
            let mut store = SceneStore::open(&path).unwrap();
            assert_eq!(store.commit(&scene_with(&["a"])).unwrap(), 1);
            assert_eq!(store.commit(&scene_with(&["a", "b"])).unwrap(), 2);
        }
        let store = SceneStore::open(&path).unwrap();
        assert_eq!(store.meta().revision_count, 2);
        store.verify_integrity().unwrap();

        let (latest, _) = store.load_latest().unwrap();
        assert!(latest.find_by_name("b").is_some());
        let (first, report) = store.load_revision(1).unwrap();
        assert!(first.find_by_name("b").is_none());
        assert_eq!(report.entities, 1);
        assert!(matches!(store.load_revision(3), Err(StoreError::UnknownRevision(3))));
        assert!(matches!(store.load_revision(0), Err(StoreError::UnknownRevision(0))));
    }

    #[test]
    fn manifest_is_chained() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = SceneStore::open(tmp.path()).unwrap();
        store.commit(&scene_with(&["a"])).unwrap();
        store.commit(&scene_with(&["b"])).unwrap();
        let entries = &store.manifest().entries;
        assert_eq!(entries[0].prev_hash, None);
        assert_eq!(entries[1].prev_hash.as_deref(), Some(entries[0].sha256.as_str()));
    }

    #[test]
    fn corrupted_revision_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = SceneStore::open(tmp.path()).unwrap();
        store.commit(&scene_with(&["a", "b", "c"])).unwrap();

        let file = tmp.path().join(REVISIONS_DIR).join(revision_filename(1));
        let mut bytes = std::fs::read(&file).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&file, bytes).unwrap();

        assert!(matches!(
            store.verify_integrity(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
        assert!(matches!(
            store.load_latest(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        SceneStore::open(tmp.path()).unwrap();
        let meta = StoreMeta {
            schema_version: STORE_SCHEMA_VERSION + 1,
            revision_count: 0,
        };
        serde_json::to_writer(std::fs::File::create(tmp.path().join(META_FILE)).unwrap(), &meta)
            .unwrap();
        assert!(matches!(
            SceneStore::open(tmp.path()),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }
}
