use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use snafu::{Snafu, ensure};

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub))]
pub enum AssetError {
    #[snafu(display("Model {resource} not found at {}", path.display()))]
    MissingModel { resource: String, path: PathBuf },
}

/// A renderable mesh the server hands out to clients by resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRef {
    resource: String,
    path: PathBuf,
}

impl MeshRef {
    /// Path relative to the models directory, e.g. `obj/wheelLeftSide.obj`.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resolves model resource paths against the configured models directory.
pub struct ModelLibrary {
    root: PathBuf,
    verify: bool,
    loaded: HashMap<String, MeshRef>,
}

impl ModelLibrary {
    /// With `verify` off, nothing is read from disk. Used by headless
    /// servers that ship without art assets.
    pub fn new(root: impl Into<PathBuf>, verify: bool) -> Self {
        Self {
            root: root.into(),
            verify,
            loaded: HashMap::new(),
        }
    }

    pub fn load(&mut self, resource: &str) -> Result<MeshRef, AssetError> {
        if let Some(mesh) = self.loaded.get(resource) {
            return Ok(mesh.clone());
        }

        let path = self.root.join(resource);
        if self.verify {
            ensure!(
                path.is_file(),
                MissingModelErr {
                    resource,
                    path: path.clone(),
                }
            );
        }

        debug!("Loaded model {resource} from {}", path.display());
        let mesh = MeshRef {
            resource: resource.to_string(),
            path,
        };
        self.loaded.insert(resource.to_string(), mesh.clone());
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_against_root_without_verification() {
        let mut models = ModelLibrary::new("data/models", false);
        let mesh = models.load("obj/wheelLeftSide.obj").unwrap();
        assert_eq!(mesh.resource(), "obj/wheelLeftSide.obj");
        assert_eq!(mesh.path(), Path::new("data/models/obj/wheelLeftSide.obj"));
    }

    #[test]
    fn missing_model_is_rejected_when_verifying() {
        let dir = std::env::temp_dir().join(format!("racing-models-{}", uuid::Uuid::new_v4()));
        let mut models = ModelLibrary::new(&dir, true);
        let err = models.load("obj/wheelRightSide.obj").unwrap_err();
        assert!(matches!(err, AssetError::MissingModel { .. }));
    }

    #[test]
    fn existing_model_is_cached() {
        let dir = std::env::temp_dir().join(format!("racing-models-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("obj")).unwrap();
        std::fs::write(dir.join("obj/wheelLeftSide.obj"), "o wheel\n").unwrap();

        let mut models = ModelLibrary::new(&dir, true);
        let first = models.load("obj/wheelLeftSide.obj").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        let second = models.load("obj/wheelLeftSide.obj").unwrap();
        assert_eq!(first, second);
    }
}
