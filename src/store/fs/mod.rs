
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ObjectPage, ObjectStore, StoredObject};
use crate::{MeetsearchError, Result};

/// Object store backed by a local directory. Keys map to relative paths
/// under the root.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(MeetsearchError::MetadataIndex(format!(
                "Invalid object key: {key}"
            )));
        }
        Ok(self.root.join(key))
    }

    fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.collect_keys(&path, keys)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    #[inline]
    fn put(&self, key: &str, body: &str) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        debug!("Stored object: {}", key);
        Ok(())
    }

    #[inline]
    fn get(&self, key: &str) -> Result<String> {
        let path = self.object_path(key)?;
        fs::read_to_string(&path).map_err(|e| {
            MeetsearchError::MetadataIndex(format!("Failed to read object {key}: {e}"))
        })
    }

    #[inline]
    fn list_page(
        &self,
        prefix: &str,
        page_size: usize,
        cursor: Option<String>,
    ) -> Result<ObjectPage> {
        let mut keys = Vec::new();
        if self.root.exists() {
            self.collect_keys(&self.root.clone(), &mut keys)?;
        }
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();

        // Cursor is the last key of the previous page.
        let start = match cursor {
            Some(ref after) => keys.partition_point(|k| k <= after),
            None => 0,
        };

        let mut objects = Vec::new();
        for key in keys.iter().skip(start).take(page_size) {
            let metadata = fs::metadata(self.root.join(key))?;
            let last_modified: DateTime<Utc> = metadata.modified()?.into();
            objects.push(StoredObject {
                key: key.clone(),
                last_modified,
                size: metadata.len(),
            });
        }

        let has_more = start + objects.len() < keys.len();
        let next_cursor = (has_more && !objects.is_empty())
            .then(|| objects.last().map(|o| o.key.clone()))
            .flatten();

        Ok(ObjectPage {
            objects,
            next_cursor,
        })
    }

    #[inline]
    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted object: {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
