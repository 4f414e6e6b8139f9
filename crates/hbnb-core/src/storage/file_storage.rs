//! FileStorage: the object registry persisted as one JSON document
//!
//! The in-memory table is the only source of truth while the process runs.
//! `save()` writes the whole table to a temp file next to the target and
//! renames it over the target, so the file on disk is always either the old
//! snapshot or the new one.

use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{CascadePolicy, FileConfig};
use crate::error::{StorageError, StorageResult};
use crate::models::{relations, Model, ModelKind};

use super::{ObjectMap, Storage};

const ENGINE: &str = "file";

/// File-backed engine
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cascade: CascadePolicy,
    /// `None` until the first `reload()`
    objects: Option<ObjectMap>,
}

impl FileStorage {
    /// Engine over `path`; Uninitialized until `reload()`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cascade: CascadePolicy::None,
            objects: None,
        }
    }

    pub fn with_config(config: &FileConfig) -> Self {
        Self::open(config.path.clone()).with_cascade(config.cascade)
    }

    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialized form of the current table, exactly as `save()` writes it
    pub fn snapshot(&self) -> StorageResult<String> {
        Ok(serde_json::to_string(self.table()?)?)
    }

    fn table(&self) -> StorageResult<&ObjectMap> {
        self.objects
            .as_ref()
            .ok_or_else(|| StorageError::not_initialized(ENGINE))
    }

    fn table_mut(&mut self) -> StorageResult<&mut ObjectMap> {
        self.objects
            .as_mut()
            .ok_or_else(|| StorageError::not_initialized(ENGINE))
    }

    /// Read the backing file. Absent or unreadable means an empty table.
    fn read_table(&self) -> ObjectMap {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no storage file yet, starting empty");
                return ObjectMap::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "storage file unreadable, starting empty");
                return ObjectMap::new();
            }
        };

        match serde_json::from_str::<ObjectMap>(&content) {
            Ok(objects) => self.rekey(objects),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "storage file malformed, starting empty");
                ObjectMap::new()
            }
        }
    }

    /// Registry keys always derive from the object, never from the file.
    fn rekey(&self, stored: ObjectMap) -> ObjectMap {
        stored
            .into_iter()
            .map(|(stored_key, obj)| {
                let key = obj.key();
                if stored_key != key {
                    tracing::warn!(
                        path = %self.path.display(),
                        stored_key = %stored_key,
                        key = %key,
                        "stored key does not match object, re-keyed"
                    );
                }
                (key, obj)
            })
            .collect()
    }

    fn write_table(&self, content: &str) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::file_io(parent, e))?;
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "storage".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, content).map_err(|e| StorageError::file_io(&tmp_path, e))?;

        // Atomic rename
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StorageError::file_io(&self.path, e));
        }
        Ok(())
    }

    /// Keys removed when `root` is deleted: `root` itself and, under
    /// `CascadePolicy::Cascade`, every transitive dependent.
    fn doomed_keys(table: &ObjectMap, root: &Model) -> Vec<String> {
        let mut doomed = vec![root.key()];
        let mut queue = VecDeque::from([(root.kind(), root.id().to_string())]);

        while let Some((kind, id)) = queue.pop_front() {
            for relation in relations::children_of(kind) {
                for child in table.values() {
                    if child.kind() != relation.child
                        || child.foreign_key(relation.foreign_key) != Some(id.as_str())
                    {
                        continue;
                    }
                    let key = child.key();
                    if !doomed.contains(&key) {
                        doomed.push(key);
                        queue.push_back((child.kind(), child.id().to_string()));
                    }
                }
            }
        }
        doomed
    }
}

impl Storage for FileStorage {
    fn all(&self, kind: Option<ModelKind>) -> StorageResult<ObjectMap> {
        let table = self.table()?;
        Ok(match kind {
            None => table.clone(),
            Some(kind) => table
                .iter()
                .filter(|(_, obj)| obj.kind() == kind)
                .map(|(key, obj)| (key.clone(), obj.clone()))
                .collect(),
        })
    }

    fn new(&mut self, obj: &Model) -> StorageResult<()> {
        let key = obj.key();
        self.table_mut()?.insert(key.clone(), obj.clone());
        tracing::debug!(%key, "registered object");
        Ok(())
    }

    fn save(&mut self) -> StorageResult<()> {
        let content = self.snapshot()?;
        self.write_table(&content).map_err(StorageError::commit)?;
        tracing::debug!(
            path = %self.path.display(),
            objects = self.table()?.len(),
            "saved storage file"
        );
        Ok(())
    }

    fn delete(&mut self, obj: Option<&Model>) -> StorageResult<()> {
        let cascade = self.cascade;
        let table = self.table_mut()?;
        let Some(obj) = obj else {
            return Ok(());
        };

        if cascade == CascadePolicy::None {
            table.remove(&obj.key());
            return Ok(());
        }

        let doomed = Self::doomed_keys(table, obj);
        for key in &doomed {
            table.remove(key);
        }
        if obj.kind() == relations::PLACE_AMENITY.target {
            for other in table.values_mut() {
                if let Model::Place(place) = other {
                    place.remove_amenity(obj.id());
                }
            }
        }
        tracing::debug!(key = %obj.key(), removed = doomed.len(), "cascaded delete");
        Ok(())
    }

    fn reload(&mut self) -> StorageResult<()> {
        let objects = self.read_table();
        tracing::info!(path = %self.path.display(), objects = objects.len(), "reloaded storage file");
        self.objects = Some(objects);
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.reload()
    }

    fn get(&self, kind: ModelKind, id: &str) -> StorageResult<Option<Model>> {
        Ok(self.table()?.get(&kind.key(id)).cloned())
    }

    fn count(&self, kind: Option<ModelKind>) -> StorageResult<usize> {
        let table = self.table()?;
        Ok(match kind {
            None => table.len(),
            Some(kind) => table.values().filter(|obj| obj.kind() == kind).count(),
        })
    }
}
