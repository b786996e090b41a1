use crate::GraphicsError;
use crate::descriptors::{ShaderFormat, ShaderStage};
use crate::device::GraphicsDevice;
use crate::resources::Shader;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Provider of precompiled shader bytecode.
pub trait ShaderSource: Send + Sync {
    fn load(
        &self,
        name: &str,
        stage: ShaderStage,
        format: ShaderFormat,
    ) -> Result<Arc<[u8]>, GraphicsError>;
}

#[derive(Debug, Clone)]
struct CachedShader {
    hash: String,
    bytes: Arc<[u8]>,
}

/// Directory-backed shader store laid out as `<root>/<format>/<name>.<ext>`.
///
/// Loaded bytecode is cached together with its SHA-256 so that
/// [`ShaderLibrary::reload_changed`] can pick up rebuilt files.
#[derive(Debug)]
pub struct ShaderLibrary {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, CachedShader>>,
}

impl ShaderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str, format: ShaderFormat) -> PathBuf {
        self.root
            .join(format.dir_name())
            .join(format!("{name}.{}", format.extension()))
    }

    /// SHA-256 of the cached bytecode, if `name` has been loaded.
    pub fn content_hash(&self, name: &str, format: ShaderFormat) -> Option<String> {
        let path = self.path_for(name, format);
        self.cache.lock().get(&path).map(|c| c.hash.clone())
    }

    /// Re-read every cached file and return the paths whose contents changed.
    pub fn reload_changed(&self) -> Result<Vec<PathBuf>, GraphicsError> {
        let mut cache = self.cache.lock();
        let mut changed = Vec::new();
        for (path, cached) in cache.iter_mut() {
            let bytes = std::fs::read(path)?;
            let hash = sha256_hex(&bytes);
            if hash != cached.hash {
                tracing::info!(path = %path.display(), "shader changed on disk");
                *cached = CachedShader {
                    hash,
                    bytes: bytes.into(),
                };
                changed.push(path.clone());
            }
        }
        changed.sort();
        Ok(changed)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

impl ShaderSource for ShaderLibrary {
    fn load(
        &self,
        name: &str,
        _stage: ShaderStage,
        format: ShaderFormat,
    ) -> Result<Arc<[u8]>, GraphicsError> {
        let path = self.path_for(name, format);
        if let Some(cached) = self.cache.lock().get(&path) {
            return Ok(Arc::clone(&cached.bytes));
        }
        let bytes = std::fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                GraphicsError::ShaderNotFound {
                    name: name.to_string(),
                    path: path.clone(),
                }
            } else {
                GraphicsError::Io(err)
            }
        })?;
        let cached = CachedShader {
            hash: sha256_hex(&bytes),
            bytes: bytes.into(),
        };
        let out = Arc::clone(&cached.bytes);
        tracing::debug!(%name, hash = %cached.hash, "shader loaded");
        self.cache.lock().insert(path, cached);
        Ok(out)
    }
}

/// In-memory shader store, keyed by name and format.
#[derive(Debug, Default)]
pub struct EmbeddedShaders {
    entries: HashMap<(String, ShaderFormat), Arc<[u8]>>,
}

impl EmbeddedShaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, format: ShaderFormat, bytecode: impl Into<Arc<[u8]>>) {
        self.entries.insert((name.into(), format), bytecode.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ShaderSource for EmbeddedShaders {
    fn load(
        &self,
        name: &str,
        _stage: ShaderStage,
        format: ShaderFormat,
    ) -> Result<Arc<[u8]>, GraphicsError> {
        self.entries
            .get(&(name.to_string(), format))
            .cloned()
            .ok_or_else(|| GraphicsError::ShaderNotFound {
                name: name.to_string(),
                path: PathBuf::from(format!("<embedded>/{}/{name}", format.dir_name())),
            })
    }
}

/// Load `name` in the device's shader format and create it.
pub fn load_shader(
    device: &dyn GraphicsDevice,
    source: &dyn ShaderSource,
    name: &str,
    stage: ShaderStage,
) -> Result<Shader, GraphicsError> {
    let bytecode = source.load(name, stage, device.shader_format())?;
    let shader = device.create_shader(stage, &bytecode)?;
    device.set_name(&shader, name);
    Ok(shader)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
