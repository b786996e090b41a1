//! Binary scene files.
//!
//! ```text
//! b"LSCN" | u32 LE format version | zstd( CBOR SceneFile )
//! ```
//!
//! A `SceneFile` is a list of named sections, one per component array.
//! Each section carries its own version and the sha256 of its CBOR body.

use ciborium::Value;
use lumen_ecs::{ComponentManager, EntityMap};
use lumen_scene::Scene;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"LSCN";
pub const FORMAT_VERSION: u32 = 1;
/// Highest section version this build can decode.
pub const SECTION_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("not a scene file")]
    BadMagic,
    #[error("scene file format v{found} is newer than supported v{supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("section {section} has version v{found}, newer than supported v{supported}")]
    UnsupportedSection {
        section: String,
        found: u32,
        supported: u32,
    },
    #[error("section {section} failed its integrity check: expected {expected}, got {actual}")]
    IntegrityMismatch {
        section: String,
        expected: String,
        actual: String,
    },
}

/// One component array, stored as a CBOR value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub version: u32,
    pub sha256: String,
    pub data: Value,
}

impl Section {
    pub fn encode<T: Serialize>(name: &str, manager: &ComponentManager<T>) -> Result<Self, ArchiveError> {
        let data = Value::serialized(manager).map_err(|e| ArchiveError::CborEncode(e.to_string()))?;
        Ok(Self {
            name: name.to_owned(),
            version: SECTION_VERSION,
            sha256: sha256_hex(&cbor_serialize(&data)?),
            data,
        })
    }

    pub fn verify(&self) -> Result<(), ArchiveError> {
        let actual = sha256_hex(&cbor_serialize(&self.data)?);
        if actual != self.sha256 {
            return Err(ArchiveError::IntegrityMismatch {
                section: self.name.clone(),
                expected: self.sha256.clone(),
                actual,
            });
        }
        if self.version > SECTION_VERSION {
            return Err(ArchiveError::UnsupportedSection {
                section: self.name.clone(),
                found: self.version,
                supported: SECTION_VERSION,
            });
        }
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<ComponentManager<T>, ArchiveError> {
        self.data
            .deserialized()
            .map_err(|e| ArchiveError::CborDecode(format!("section {}: {e}", self.name)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    pub sections: Vec<Section>,
}

/// What a load did besides producing the scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub sections: usize,
    /// Section names this build does not know.
    pub skipped_sections: Vec<String>,
    /// Distinct entities in the loaded content.
    pub entities: usize,
}

/// Every persistent component array of `scene` as a section list.
pub fn scene_to_file(scene: &Scene) -> Result<SceneFile, ArchiveError> {
    let mut sections = Vec::with_capacity(16);
    macro_rules! encode {
        ($($field:ident),* $(,)?) => {
            $( sections.push(Section::encode(stringify!($field), &scene.$field)?); )*
        };
    }
    encode!(
        names,
        layers,
        transforms,
        prev_transforms,
        hierarchy,
        materials,
        meshes,
        objects,
        aabb_objects,
        rigidbodies,
        armatures,
        lights,
        aabb_lights,
        cameras,
        animations,
        animation_datas,
    );
    Ok(SceneFile { sections })
}

/// Rebuild a scene from `file`. Entities are remapped to fresh handles and
/// derived state is invalidated.
pub fn file_to_scene(file: &SceneFile) -> Result<(Scene, LoadReport), ArchiveError> {
    let mut scene = Scene::new();
    let mut report = LoadReport::default();
    for section in &file.sections {
        // Unknown sections are skipped before their version is looked at.
        macro_rules! decode {
            ($($field:ident),* $(,)?) => {
                match section.name.as_str() {
                    $( stringify!($field) => {
                        section.verify()?;
                        scene.$field = section.decode()?;
                    } )*
                    other => {
                        tracing::warn!(section = other, "unknown scene section skipped");
                        report.skipped_sections.push(other.to_owned());
                        continue;
                    }
                }
            };
        }
        decode!(
            names,
            layers,
            transforms,
            prev_transforms,
            hierarchy,
            materials,
            meshes,
            objects,
            aabb_objects,
            rigidbodies,
            armatures,
            lights,
            aabb_lights,
            cameras,
            animations,
            animation_datas,
        );
        report.sections += 1;
    }
    scene.remap(&mut EntityMap::new());
    scene.invalidate();
    report.entities = scene.entity_count();
    Ok((scene, report))
}

pub fn encode_scene(scene: &Scene) -> Result<Vec<u8>, ArchiveError> {
    let _span = tracing::debug_span!("encode_scene").entered();
    let cbor = cbor_serialize(&scene_to_file(scene)?)?;
    let compressed = zstd_compress(&cbor)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&compressed);
    Ok(bytes)
}

pub fn decode_scene(bytes: &[u8]) -> Result<(Scene, LoadReport), ArchiveError> {
    let _span = tracing::debug_span!("decode_scene", bytes = bytes.len()).entered();
    if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
        return Err(ArchiveError::BadMagic);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version > FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    let cbor = zstd_decompress(&bytes[HEADER_LEN..])?;
    let file: SceneFile = cbor_deserialize(&cbor)?;
    file_to_scene(&file)
}

pub fn save_scene(scene: &Scene, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
    let path = path.as_ref();
    let bytes = encode_scene(scene)?;
    std::fs::write(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "scene saved");
    Ok(())
}

pub fn load_scene(path: impl AsRef<Path>) -> Result<Scene, ArchiveError> {
    let path = path.as_ref();
    let (scene, report) = decode_scene(&std::fs::read(path)?)?;
    tracing::info!(
        path = %path.display(),
        entities = report.entities,
        skipped = report.skipped_sections.len(),
        "scene loaded"
    );
    Ok(scene)
}

/// Load `path` and merge its content into `scene`.
pub fn load_scene_into(path: impl AsRef<Path>, scene: &mut Scene) -> Result<LoadReport, ArchiveError> {
    let (mut loaded, report) = decode_scene(&std::fs::read(path.as_ref())?)?;
    scene.merge(&mut loaded);
    scene.invalidate();
    Ok(report)
}

pub(crate) fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ArchiveError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ArchiveError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, ArchiveError> {
    ciborium::from_reader(data).map_err(|e| ArchiveError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_scene::{LightType, primitives};
    use std::f32::consts::FRAC_PI_3;

    fn sample_scene() -> Scene {
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);
        let material = scene.entity_create_material("paint");
        scene.meshes.get_mut(mesh).unwrap().subsets[0].material_id = material;

        let parent = scene.entity_create_object("parent");
        scene.objects.get_mut(parent).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(parent).unwrap().translate(Vec3::new(0.0, 2.0, 0.0));
        let child = scene.entity_create_object("child");
        scene.objects.get_mut(child).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(child).unwrap().translate(Vec3::new(0.0, 0.0, 3.0));
        scene.component_attach(child, parent, true).unwrap();

        let sun = scene.entity_create_light("sun", Vec3::new(0.0, 10.0, 0.0), Vec3::ONE, 3.0, 50.0);
        scene.lights.get_mut(sun).unwrap().light_type = LightType::Directional;
        scene
            .entity_create_camera("camera", 640.0, 360.0, 0.1, 100.0, FRAC_PI_3)
            .unwrap();
        scene
    }

    #[test]
    fn round_trip_preserves_content_and_references() {
        let scene = sample_scene();
        let (loaded, report) = decode_scene(&encode_scene(&scene).unwrap()).unwrap();
        assert_eq!(report.sections, 16);
        assert!(report.skipped_sections.is_empty());
        assert_eq!(report.entities, scene.entity_count());

        let parent = loaded.find_by_name("parent").unwrap();
        let child = loaded.find_by_name("child").unwrap();
        let mesh = loaded.find_by_name("cube").unwrap();
        let material = loaded.find_by_name("paint").unwrap();
        // Handles are fresh but references follow them.
        assert_ne!(parent, scene.find_by_name("parent").unwrap());
        assert_eq!(loaded.parent_of(child), Some(parent));
        assert_eq!(loaded.objects.get(child).unwrap().mesh_id, mesh);
        assert_eq!(loaded.meshes.get(mesh).unwrap().subsets[0].material_id, material);
        assert_eq!(loaded.meshes.get(mesh).unwrap().indices.len(), 36);
        assert_eq!(
            loaded.transforms.get(child).unwrap().translation_local,
            Vec3::new(0.0, 0.0, 3.0)
        );
        let sun = loaded.find_by_name("sun").unwrap();
        assert_eq!(loaded.lights.get(sun).unwrap().light_type, LightType::Directional);
        assert_eq!(loaded.cameras.len(), 1);
    }

    #[test]
    fn loaded_scene_updates_like_the_original() {
        let jobs = lumen_jobs::JobSystem::inline();
        let mut scene = sample_scene();
        let (mut loaded, _) = decode_scene(&encode_scene(&scene).unwrap()).unwrap();
        scene.update(0.0, &jobs).unwrap();
        loaded.update(0.0, &jobs).unwrap();
        let child = loaded.find_by_name("child").unwrap();
        let world = loaded.transforms.get(child).unwrap().position();
        assert!(world.abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5), "{world}");
        assert_eq!(loaded.bounds(), scene.bounds());
    }

    #[test]
    fn save_load_and_merge_through_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("level.lscene");
        let scene = sample_scene();
        save_scene(&scene, &path).unwrap();

        let loaded = load_scene(&path).unwrap();
        assert_eq!(loaded.entity_count(), scene.entity_count());

        let mut target = sample_scene();
        let report = load_scene_into(&path, &mut target).unwrap();
        assert_eq!(target.entity_count(), 2 * scene.entity_count());
        assert_eq!(report.entities, scene.entity_count());
    }

    #[test]
    fn rejects_foreign_and_newer_files() {
        assert!(matches!(decode_scene(b"NOPE\x01\0\0\0"), Err(ArchiveError::BadMagic)));
        assert!(matches!(decode_scene(b"LS"), Err(ArchiveError::BadMagic)));

        let mut bytes = encode_scene(&sample_scene()).unwrap();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            decode_scene(&bytes),
            Err(ArchiveError::UnsupportedVersion { found, .. }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn tampered_section_fails_integrity() {
        let mut file = scene_to_file(&sample_scene()).unwrap();
        let names = file.sections.iter_mut().find(|s| s.name == "names").unwrap();
        names.data = Value::serialized(&ComponentManager::<lumen_scene::NameComponent>::new()).unwrap();
        assert!(matches!(
            file_to_scene(&file),
            Err(ArchiveError::IntegrityMismatch { section, .. }) if section == "names"
        ));
    }

    #[test]
    fn newer_section_is_rejected() {
        let mut file = scene_to_file(&sample_scene()).unwrap();
        file.sections[0].version = SECTION_VERSION + 1;
        assert!(matches!(
            file_to_scene(&file),
            Err(ArchiveError::UnsupportedSection { .. })
        ));
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let mut file = scene_to_file(&sample_scene()).unwrap();
        let extra = ComponentManager::<lumen_scene::NameComponent>::new();
        file.sections.push(Section::encode("terrain_chunks", &extra).unwrap());
        let (scene, report) = file_to_scene(&file).unwrap();
        assert_eq!(report.skipped_sections, vec!["terrain_chunks".to_string()]);
        assert!(scene.find_by_name("child").is_some());
    }

    #[test]
    fn unknown_section_from_a_newer_writer_is_skipped() {
        let mut file = scene_to_file(&sample_scene()).unwrap();
        let extra = ComponentManager::<lumen_scene::NameComponent>::new();
        let mut section = Section::encode("terrain_chunks", &extra).unwrap();
        section.version = SECTION_VERSION + 1;
        file.sections.push(section);
        let (scene, report) = file_to_scene(&file).unwrap();
        assert_eq!(report.skipped_sections, vec!["terrain_chunks".to_string()]);
        assert!(scene.find_by_name("child").is_some());
    }

    #[test]
    fn truncated_payload_is_a_decode_error() {
        let bytes = encode_scene(&sample_scene()).unwrap();
        let cut = &bytes[..bytes.len() / 2];
        assert!(decode_scene(cut).is_err());
    }
}
