use futures_util::stream::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::index_store::IndexLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub location: Path,
    pub size: u64,
}

impl DataFile {
    /// Stable identity used as the index key
    pub fn file_id(&self) -> String {
        self.location.to_string()
    }
}

/// Finds data files under a prefix, skipping the index namespace
#[derive(Debug, Clone)]
pub struct DataFileDiscovery {
    store: Arc<dyn ObjectStore>,
    data_suffix: String,
    layout: IndexLayout,
}

impl DataFileDiscovery {
    pub fn new(store: Arc<dyn ObjectStore>, data_suffix: impl Into<String>, layout: IndexLayout) -> Self {
        Self {
            store,
            data_suffix: data_suffix.into(),
            layout,
        }
    }

    /// Lists data files under `prefix`, sorted by location
    pub async fn discover(&self, prefix: &str) -> StoreResult<Vec<DataFile>> {
        let prefix_path = (!prefix.is_empty()).then(|| Path::from(prefix));
        let all_objects: Vec<_> = self
            .store
            .list(prefix_path.as_ref())
            .try_collect()
            .await?;

        debug!(
            "Found {} total objects under prefix '{}'",
            all_objects.len(),
            prefix
        );

        let mut files: Vec<DataFile> = all_objects
            .into_iter()
            .filter(|obj| obj.location.as_ref().ends_with(&self.data_suffix))
            .filter(|obj| !self.layout.is_index_path(&obj.location))
            .map(|obj| DataFile {
                location: obj.location,
                size: obj.size,
            })
            .collect();
        files.sort_by(|a, b| a.location.cmp(&b.location));

        info!("Found {} data files", files.len());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    #[tokio::test]
    async fn test_discover_filters_suffix_and_index_dir() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        for path in [
            "sales/2024/b.parquet",
            "sales/2023/a.parquet",
            "sales/2023/metadata/a.parquet.json",
            "sales/metadata/old.parquet",
            "sales/README.md",
            "other/c.parquet",
        ] {
            store
                .put(&Path::from(path), PutPayload::from_static(b"x"))
                .await
                .unwrap();
        }

        let discovery = DataFileDiscovery::new(store, ".parquet", IndexLayout::default());
        let ids: Vec<String> = discovery
            .discover("sales")
            .await
            .unwrap()
            .iter()
            .map(DataFile::file_id)
            .collect();
        assert_eq!(ids, vec!["sales/2023/a.parquet", "sales/2024/b.parquet"]);

        let all = discovery.discover("").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].size, 1);
    }
}
