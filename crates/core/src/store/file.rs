use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::{PersistenceBackend, validate_key};
use crate::error::StoreError;

/// A store that keeps one pretty-printed JSON file per key under a root
/// directory, e.g. `alice/archive` is `<root>/alice/archive.json`.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        let mut path = self.root.clone();
        let (dirs, name) = key.rsplit_once('/').unwrap_or(("", key));
        path.extend(dirs.split('/').filter(|dir| !dir.is_empty()));
        path.push(format!("{name}.json"));
        Ok(path)
    }
}

#[inline]
fn io_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_owned(),
        source,
    }
}

#[async_trait]
impl PersistenceBackend for FileStore {
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error(parent, err))?;
        }

        let contents = serde_json::to_vec_pretty(value).map_err(|source| {
            StoreError::Serialization {
                key: key.to_owned(),
                source,
            }
        })?;

        // Write aside and rename, so readers never see a partial file.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .await
            .map_err(|err| io_error(&tmp_path, err))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|err| io_error(&path, err))?;

        debug!("saved {key} to {}", path.display());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_slice(&contents).map(Some).map_err(|source| {
            StoreError::Serialization {
                key: key.to_owned(),
                source,
            }
        })
    }
}
