//! # Meshbake Assets
//!
//! Asset persistence for the meshbake level tools.
//!
//! ## Features
//! - Content-addressed asset IDs (hash-based)
//! - Dependency graph tracking between prefabs and cooked meshes
//! - Prefab documents for combined meshes and collider groups
//! - JSON scene documents loaded into a scene graph

pub mod prefab;
pub mod scene_doc;

pub use prefab::{CookedMesh, PrefabDocument, PrefabNode, PrefabStore};
pub use scene_doc::{LoadedScene, MaterialTable, SceneDocument};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Content-addressed asset ID (hash-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl AssetId {
    /// Create an asset ID from content bytes
    pub fn from_content(content: &[u8]) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Create an asset ID from a path
    pub fn from_path(path: &Path) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Get the raw ID value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Asset type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Cooked mesh payload
    Mesh,
    /// Exported model file such as FBX
    Model,
    Prefab,
    Scene,
}

impl AssetType {
    /// Get file extensions for this asset type
    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::Mesh => &["mesh"],
            Self::Model => &["fbx", "obj", "gltf", "glb"],
            Self::Prefab => &["prefab"],
            Self::Scene => &["json"],
        }
    }

    /// Guess the asset type from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [Self::Mesh, Self::Model, Self::Prefab, Self::Scene]
            .into_iter()
            .find(|t| t.extensions().contains(&ext.as_str()))
    }
}

/// Asset metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMeta {
    /// Asset ID
    pub id: AssetId,
    /// Asset name
    pub name: String,
    /// Asset type
    pub asset_type: AssetType,
    /// Source file path (relative to project)
    pub source_path: PathBuf,
    /// Dependencies (other asset IDs)
    pub dependencies: Vec<AssetId>,
    /// Last modification time
    pub modified_time: u64,
}

/// Asset database for tracking all assets
pub struct AssetDatabase {
    /// All registered assets
    assets: RwLock<AHashMap<AssetId, AssetMeta>>,
    /// Path to ID mapping
    path_to_id: RwLock<AHashMap<PathBuf, AssetId>>,
    /// Dependency graph (asset -> dependents)
    dependents: RwLock<AHashMap<AssetId, HashSet<AssetId>>>,
    /// Project root path
    project_root: PathBuf,
}

impl AssetDatabase {
    /// Create a new asset database
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            assets: RwLock::new(AHashMap::new()),
            path_to_id: RwLock::new(AHashMap::new()),
            dependents: RwLock::new(AHashMap::new()),
            project_root,
        }
    }

    /// Get the project root
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Register an asset, replacing any earlier entry with the same ID
    pub fn register(&self, meta: AssetMeta) {
        let id = meta.id;
        let path = meta.source_path.clone();
        let deps = meta.dependencies.clone();

        log::debug!("Registering {:?} {} ({})", meta.asset_type, meta.name, id);
        self.assets.write().insert(id, meta);
        self.path_to_id.write().insert(path, id);

        // Update dependency graph
        let mut dependents = self.dependents.write();
        for dep_id in deps {
            dependents.entry(dep_id).or_default().insert(id);
        }
    }

    /// Register the file at `relative_path` under the project root, stamping
    /// its modification time
    pub fn import(
        &self,
        relative_path: &Path,
        asset_type: AssetType,
        dependencies: Vec<AssetId>,
    ) -> AssetResult<AssetId> {
        self.import_as(
            AssetId::from_path(relative_path),
            relative_path,
            asset_type,
            dependencies,
        )
    }

    /// Like [`AssetDatabase::import`], under a caller-chosen ID
    pub fn import_as(
        &self,
        id: AssetId,
        relative_path: &Path,
        asset_type: AssetType,
        dependencies: Vec<AssetId>,
    ) -> AssetResult<AssetId> {
        let full_path = self.project_root.join(relative_path);
        let file_meta = std::fs::metadata(&full_path)
            .map_err(|_| AssetError::NotFound(full_path.display().to_string()))?;
        let modified_time = file_meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let name = relative_path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("Unnamed")
            .to_string();

        self.register(AssetMeta {
            id,
            name,
            asset_type,
            source_path: relative_path.to_path_buf(),
            dependencies,
            modified_time,
        });
        Ok(id)
    }

    /// Get asset metadata by ID
    pub fn get(&self, id: AssetId) -> Option<AssetMeta> {
        self.assets.read().get(&id).cloned()
    }

    /// Get asset ID by path
    pub fn get_id_by_path(&self, path: &Path) -> Option<AssetId> {
        self.path_to_id.read().get(path).copied()
    }

    /// Get all assets of a type
    pub fn get_by_type(&self, asset_type: AssetType) -> Vec<AssetMeta> {
        self.assets
            .read()
            .values()
            .filter(|m| m.asset_type == asset_type)
            .cloned()
            .collect()
    }

    /// Get assets that depend on the given asset
    pub fn get_dependents(&self, id: AssetId) -> Vec<AssetId> {
        self.dependents
            .read()
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get total asset count
    pub fn asset_count(&self) -> usize {
        self.assets.read().len()
    }

    /// Clear the database
    pub fn clear(&self) {
        self.assets.write().clear();
        self.path_to_id.write().clear();
        self.dependents.write().clear();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    /// Fresh empty directory under the system temp dir
    pub fn temp_project(tag: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "meshbake-assets-{}-{}-{}",
            tag,
            std::process::id(),
            n
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: u64, path: &str, asset_type: AssetType, dependencies: Vec<AssetId>) -> AssetMeta {
        AssetMeta {
            id: AssetId(id),
            name: String::from("Test"),
            asset_type,
            source_path: PathBuf::from(path),
            dependencies,
            modified_time: 0,
        }
    }

    #[test]
    fn test_asset_id() {
        let id1 = AssetId::from_content(b"test content");
        let id2 = AssetId::from_content(b"test content");
        let id3 = AssetId::from_content(b"different content");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(format!("{}", AssetId(255)), "00000000000000ff");
    }

    #[test]
    fn test_asset_database() {
        let db = AssetDatabase::new(PathBuf::from("."));

        db.register(meta(12345, "Assets/Resources/Test.prefab", AssetType::Prefab, Vec::new()));

        assert_eq!(db.asset_count(), 1);
        let retrieved = db.get(AssetId(12345)).unwrap();
        assert_eq!(retrieved.name, "Test");
        assert_eq!(
            db.get_id_by_path(Path::new("Assets/Resources/Test.prefab")),
            Some(AssetId(12345))
        );
    }

    #[test]
    fn test_dependents() {
        let db = AssetDatabase::new(PathBuf::from("."));
        db.register(meta(1, "a.mesh", AssetType::Mesh, Vec::new()));
        db.register(meta(2, "a.prefab", AssetType::Prefab, vec![AssetId(1)]));

        assert_eq!(db.get_dependents(AssetId(1)), vec![AssetId(2)]);
        assert!(db.get_dependents(AssetId(2)).is_empty());
        assert_eq!(db.get_by_type(AssetType::Mesh).len(), 1);

        db.clear();
        assert_eq!(db.asset_count(), 0);
    }

    #[test]
    fn test_asset_type_from_path() {
        assert_eq!(AssetType::from_path(Path::new("x/Tower.FBX")), Some(AssetType::Model));
        assert_eq!(AssetType::from_path(Path::new("Tower.prefab")), Some(AssetType::Prefab));
        assert_eq!(AssetType::from_path(Path::new("Tower")), None);
    }

    #[test]
    fn test_import_missing_file() {
        let db = AssetDatabase::new(test_support::temp_project("import"));
        let result = db.import(Path::new("missing.fbx"), AssetType::Model, Vec::new());
        assert!(matches!(result, Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_import_registers_file() {
        let root = test_support::temp_project("import-ok");
        std::fs::write(root.join("model.fbx"), b"fbx").unwrap();
        let db = AssetDatabase::new(root);

        let id = db.import(Path::new("model.fbx"), AssetType::Model, Vec::new()).unwrap();
        let meta = db.get(id).unwrap();
        assert_eq!(meta.name, "model");
        assert_eq!(meta.asset_type, AssetType::Model);
    }
}
