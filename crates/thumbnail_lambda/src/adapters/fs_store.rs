use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::adapters::object_store::{StorageError, StorageGateway};

/// Gateway over a local directory tree: `<root>/<container>/<key>`.
///
/// Content types are not persisted. Keys that would escape the container
/// directory are reported as missing.
pub struct LocalStorageGateway {
    root: PathBuf,
}

impl LocalStorageGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, container: &str, key: &str) -> Result<PathBuf, StorageError> {
        let not_found = || StorageError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        };

        let mut path = self.root.clone();
        for segment in [container, key] {
            let relative = Path::new(segment);
            if relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
            {
                return Err(not_found());
            }
            path.push(relative);
        }

        if container.is_empty() || key.is_empty() {
            return Err(not_found());
        }
        Ok(path)
    }
}

impl StorageGateway for LocalStorageGateway {
    fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(container, key)?;
        fs::read(&path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            },
            _ => StorageError::TransientIo(format!(
                "failed to read '{}': {error}",
                path.display()
            )),
        })
    }

    fn put_object(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.resolve(container, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                StorageError::TransientIo(format!(
                    "failed to create '{}': {error}",
                    parent.display()
                ))
            })?;
        }
        fs::write(&path, body).map_err(|error| {
            StorageError::TransientIo(format!("failed to write '{}': {error}", path.display()))
        })
    }
}
