//! Persistence of per-file statistics indexes
//!
//! Each data file `<parent>/<name>` gets its index at
//! `<parent>/<index_dir>/<name>.json`, wrapped in a versioned envelope
//! that also records which version of the data object was indexed.

use chrono::{DateTime, Utc};
use futures_util::stream::TryStreamExt;
use object_store::path::{Path, PathPart};
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use rgindex::FileIndex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Version written into every saved envelope
pub const FORMAT_VERSION: u32 = 1;

const INDEX_SUFFIX: &str = ".json";

/// Where indexes live relative to their data files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    pub index_dir: String,
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self {
            index_dir: "metadata".to_string(),
        }
    }
}

impl IndexLayout {
    pub fn new(index_dir: impl Into<String>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    /// Whether `location` lies inside an index directory
    pub fn is_index_path(&self, location: &Path) -> bool {
        location.parts().any(|p| p.as_ref() == self.index_dir)
    }
}

/// Identity of the data object an index was extracted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVersion {
    pub size: u64,
    pub e_tag: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl SourceVersion {
    /// Same size, and same e_tag when both sides have one, else same modification time
    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        if self.size != meta.size {
            return false;
        }
        match (&self.e_tag, &meta.e_tag) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => self.last_modified == meta.last_modified,
        }
    }
}

impl From<&ObjectMeta> for SourceVersion {
    fn from(meta: &ObjectMeta) -> Self {
        Self {
            size: meta.size,
            e_tag: meta.e_tag.clone(),
            last_modified: meta.last_modified,
        }
    }
}

/// A loaded index together with the data version it describes
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIndex {
    pub index: FileIndex,
    pub source: Option<SourceVersion>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a SourceVersion>,
    index: &'a FileIndex,
}

#[derive(Deserialize)]
struct VersionHeader {
    format_version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    #[allow(dead_code)]
    format_version: u32,
    #[serde(default)]
    source: Option<SourceVersion>,
    index: FileIndex,
}

/// Saves and loads [`FileIndex`] values in an object store
#[derive(Debug, Clone)]
pub struct IndexStore {
    store: Arc<dyn ObjectStore>,
    layout: IndexLayout,
}

impl IndexStore {
    pub fn new(store: Arc<dyn ObjectStore>, layout: IndexLayout) -> Self {
        Self { store, layout }
    }

    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// Object path of the index for `file_id`
    pub fn index_location(&self, file_id: &str) -> StoreResult<Path> {
        let path = Path::from(file_id);
        let parts: Vec<PathPart<'_>> = path.parts().collect();
        let (file_name, parent) = parts
            .split_last()
            .ok_or_else(|| StoreError::InvalidFileId(file_id.to_string()))?;

        let index_name = format!("{}{}", file_name.as_ref(), INDEX_SUFFIX);
        Ok(Path::from_iter(parent.iter().cloned())
            .child(self.layout.index_dir.as_str())
            .child(index_name.as_str()))
    }

    /// Writes the index, replacing any previous one for the same file.
    ///
    /// No source version is recorded, so [`load_fresh`](Self::load_fresh)
    /// cannot detect later changes to the data file.
    pub async fn save(&self, file_id: &str, index: &FileIndex) -> StoreResult<()> {
        self.write(file_id, index, None).await
    }

    /// Writes the index along with the version of the data object it describes
    pub async fn save_with_source(
        &self,
        file_id: &str,
        index: &FileIndex,
        source: &SourceVersion,
    ) -> StoreResult<()> {
        self.write(file_id, index, Some(source)).await
    }

    async fn write(
        &self,
        file_id: &str,
        index: &FileIndex,
        source: Option<&SourceVersion>,
    ) -> StoreResult<()> {
        if index.file_id != file_id {
            return Err(StoreError::corrupt(
                file_id,
                format!("index belongs to {}", index.file_id),
            ));
        }
        index
            .validate()
            .map_err(|e| StoreError::corrupt(file_id, e.to_string()))?;

        let location = self.index_location(file_id)?;
        let body = serde_json::to_vec_pretty(&EnvelopeRef {
            format_version: FORMAT_VERSION,
            source,
            index,
        })?;

        self.store.put(&location, PutPayload::from(body)).await?;

        debug!(file_id = file_id, location = %location, "Saved index");
        Ok(())
    }

    /// Reads the index for `file_id` from the store
    pub async fn load(&self, file_id: &str) -> StoreResult<FileIndex> {
        Ok(self.load_entry(file_id).await?.index)
    }

    /// Reads the index and its recorded source version
    pub async fn load_entry(&self, file_id: &str) -> StoreResult<StoredIndex> {
        let location = self.index_location(file_id)?;

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::NotFound {
                    file_id: file_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;

        let header: VersionHeader = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupt(file_id, e.to_string()))?;
        if header.format_version != FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                file_id: file_id.to_string(),
                found: header.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupt(file_id, e.to_string()))?;
        let index = envelope.index;

        index
            .validate()
            .map_err(|e| StoreError::corrupt(file_id, e.to_string()))?;
        if index.file_id != file_id {
            return Err(StoreError::corrupt(
                file_id,
                format!("stored index belongs to {}", index.file_id),
            ));
        }

        debug!(
            file_id = file_id,
            row_groups = index.row_group_count,
            "Loaded index"
        );
        Ok(StoredIndex {
            index,
            source: envelope.source,
        })
    }

    /// Loads the index and checks it still describes the data file.
    ///
    /// Fails with [`StoreError::Stale`] when the data file is gone or its
    /// size, e_tag or modification time differ from the recorded version.
    pub async fn load_fresh(&self, file_id: &str) -> StoreResult<FileIndex> {
        let stored = self.load_entry(file_id).await?;
        let Some(source) = stored.source else {
            warn!(file_id = file_id, "Index has no source version, freshness not checked");
            return Ok(stored.index);
        };

        let meta = match self.store.head(&Path::from(file_id)).await {
            Ok(meta) => meta,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::Stale {
                    file_id: file_id.to_string(),
                    reason: "data file no longer exists".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !source.matches(&meta) {
            return Err(StoreError::Stale {
                file_id: file_id.to_string(),
                reason: format!(
                    "data file changed since indexing (size {} -> {})",
                    source.size, meta.size
                ),
            });
        }
        Ok(stored.index)
    }

    /// File ids with a saved index under `prefix`, sorted
    pub async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));
        let objects: Vec<_> = self.store.list(prefix.as_ref()).try_collect().await?;

        let mut file_ids: Vec<String> = objects
            .iter()
            .filter_map(|meta| self.file_id_of(&meta.location))
            .collect();
        file_ids.sort();
        file_ids.dedup();

        debug!(count = file_ids.len(), "Listed indexed files");
        Ok(file_ids)
    }

    /// Inverse of [`index_location`](Self::index_location)
    fn file_id_of(&self, location: &Path) -> Option<String> {
        let parts: Vec<PathPart<'_>> = location.parts().collect();
        let (index_name, rest) = parts.split_last()?;
        let (dir, parent) = rest.split_last()?;
        if dir.as_ref() != self.layout.index_dir {
            return None;
        }

        let file_name = index_name.as_ref().strip_suffix(INDEX_SUFFIX)?;
        if file_name.is_empty() {
            return None;
        }

        Some(
            Path::from_iter(parent.iter().cloned())
                .child(file_name)
                .to_string(),
        )
    }
}
