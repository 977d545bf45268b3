//! Footer statistics extraction
//!
//! Builds a [`FileIndex`] from the metadata section of a Parquet file. Only the
//! footer is read; column data is never touched.

mod column_kind;

use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;
use parquet::file::metadata::{ParquetMetaData, ParquetMetaDataReader};
use parquet::file::reader::ChunkReader;
use tracing::debug;

use crate::error::{ExtractError, ExtractResult};
use crate::model::{ColumnStats, FileIndex, RowGroupStats};
use column_kind::ColumnKind;

/// Length of the fixed footer tail: 4-byte metadata length + 4-byte magic
const FOOTER_TAIL_LEN: u64 = 8;
const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Options for [`MetadataExtractor`]
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Record columns without an orderable type as bound-less instead of failing the file
    pub skip_unsupported_columns: bool,
}

/// Reads Parquet footers and turns them into [`FileIndex`] values
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor {
    options: ExtractOptions,
}

impl MetadataExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Parses the footer from any chunk reader (a local `File`, or `Bytes`
    /// holding the file or just its footer tail).
    pub fn extract<R: ChunkReader>(&self, file_id: &str, reader: &R) -> ExtractResult<FileIndex> {
        let metadata = ParquetMetaDataReader::new()
            .parse_and_finish(reader)
            .map_err(|e| ExtractError::corrupt(file_id, e.to_string()))?;

        self.index_from_metadata(file_id, &metadata)
    }

    /// Fetches the footer of `location` with two ranged reads and parses it
    pub async fn extract_from_store(
        &self,
        store: &dyn ObjectStore,
        location: &Path,
    ) -> ExtractResult<FileIndex> {
        let footer = read_footer(store, location).await?;
        self.extract(location.as_ref(), &footer)
    }

    /// Builds the index from already decoded metadata
    pub fn index_from_metadata(
        &self,
        file_id: &str,
        metadata: &ParquetMetaData,
    ) -> ExtractResult<FileIndex> {
        let schema = metadata.file_metadata().schema_descr();

        let mut kinds = Vec::with_capacity(schema.num_columns());
        for descr in schema.columns() {
            let kind = ColumnKind::classify(descr);
            if kind == ColumnKind::Unorderable && !self.options.skip_unsupported_columns {
                return Err(ExtractError::Unsupported {
                    file_id: file_id.to_string(),
                    column: descr.path().string(),
                    physical_type: describe_type(descr),
                });
            }
            kinds.push((descr.path().string(), kind));
        }

        if u32::try_from(metadata.num_row_groups()).is_err() {
            return Err(ExtractError::corrupt(
                file_id,
                format!("{} row groups exceeds the supported count", metadata.num_row_groups()),
            ));
        }

        let mut groups = Vec::with_capacity(metadata.num_row_groups());
        for (rg_idx, rg) in metadata.row_groups().iter().enumerate() {
            let mut group = RowGroupStats::new(rg_idx as u32, rg.num_rows().max(0) as u64);

            for (col_idx, (name, kind)) in kinds.iter().enumerate() {
                let mut stats = ColumnStats::unknown(name.clone());

                if let Some(chunk_stats) = rg.columns().get(col_idx).and_then(|c| c.statistics()) {
                    let (min, max) = kind.bounds(chunk_stats);
                    stats.min = min;
                    stats.max = max;
                    stats.null_count = chunk_stats.null_count_opt();
                    stats.distinct_count = chunk_stats.distinct_count_opt();
                }

                group.insert(stats);
            }

            groups.push(group);
        }

        debug!(
            file_id = file_id,
            row_groups = groups.len(),
            columns = kinds.len(),
            "Extracted row group statistics"
        );

        Ok(FileIndex::new(file_id, groups))
    }
}

fn describe_type(descr: &parquet::schema::types::ColumnDescriptor) -> String {
    match descr.logical_type() {
        Some(logical) => format!("{:?} ({:?})", descr.physical_type(), logical),
        None => format!("{:?}", descr.physical_type()),
    }
}

/// Reads the metadata block and tail of a Parquet object.
///
/// The returned bytes end with the 8-byte tail, so they can be handed to
/// [`ParquetMetaDataReader`] as if they were the whole file.
pub async fn read_footer(store: &dyn ObjectStore, location: &Path) -> ExtractResult<Bytes> {
    let file_id = location.as_ref();
    let io_err = |source| ExtractError::Io {
        file_id: file_id.to_string(),
        source,
    };

    let size = store.head(location).await.map_err(io_err)?.size;
    if size < FOOTER_TAIL_LEN + PARQUET_MAGIC.len() as u64 {
        return Err(ExtractError::corrupt(
            file_id,
            format!("file is {} bytes, too small to hold a footer", size),
        ));
    }

    let tail = store
        .get_range(location, size - FOOTER_TAIL_LEN..size)
        .await
        .map_err(io_err)?;
    if &tail[4..8] != PARQUET_MAGIC {
        return Err(ExtractError::corrupt(file_id, "missing PAR1 magic"));
    }

    let metadata_len = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as u64;
    let footer_len = metadata_len + FOOTER_TAIL_LEN;
    if footer_len > size {
        return Err(ExtractError::corrupt(
            file_id,
            format!("metadata length {} exceeds file size {}", metadata_len, size),
        ));
    }

    store
        .get_range(location, size - footer_len..size)
        .await
        .map_err(io_err)
}
