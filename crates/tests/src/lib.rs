//! Fixtures shared by the end-to-end tests: small Parquet datasets
//! written into an object store.

use arrow::array::{ArrayRef, Int32Array, RecordBatch, StringArray};
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use scan::{ScanContext, ScanOptions};
use std::sync::Arc;

/// Encode `columns` as one Parquet file cut into row groups of `rows_per_group`
pub fn write_parquet(columns: Vec<(&str, ArrayRef)>, rows_per_group: usize) -> anyhow::Result<Bytes> {
    let batch = RecordBatch::try_from_iter(columns)?;
    let props = WriterProperties::builder()
        .set_max_row_group_size(rows_per_group)
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(Bytes::from(buf))
}

/// Year/Month/City rows, two per row group
pub fn sales_file(years: &[i32], months: &[Option<i32>]) -> anyhow::Result<Bytes> {
    let cities: Vec<String> = (0..years.len()).map(|i| format!("city-{i}")).collect();
    write_parquet(
        vec![
            ("Year", Arc::new(Int32Array::from(years.to_vec())) as ArrayRef),
            ("Month", Arc::new(Int32Array::from(months.to_vec()))),
            ("City", Arc::new(StringArray::from(cities))),
        ],
        2,
    )
}

/// Row groups with Year ranges [2020,2021], [2022,2023], [2023,2024]
pub fn year_file() -> anyhow::Result<Bytes> {
    sales_file(
        &[2020, 2021, 2022, 2023, 2023, 2024],
        &[Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)],
    )
}

/// A file with a Year column only
pub fn year_only_file() -> anyhow::Result<Bytes> {
    write_parquet(
        vec![(
            "Year",
            Arc::new(Int32Array::from(vec![2020, 2021, 2022, 2023, 2023, 2024])) as ArrayRef,
        )],
        2,
    )
}

pub async fn put_file(store: &dyn ObjectStore, location: &str, bytes: Bytes) -> anyhow::Result<()> {
    store
        .put(&Path::from(location), PutPayload::from(bytes))
        .await?;
    Ok(())
}

/// Five sales files under `sales/`; `part-3` is not Parquet
pub async fn five_file_dataset() -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    for part in 1..=5 {
        let location = format!("sales/part-{part}.parquet");
        let bytes = if part == 3 {
            Bytes::from_static(b"this is not a parquet file")
        } else {
            let base = 2018 + part;
            sales_file(
                &[base, base, base + 1, base + 1],
                &[Some(1), Some(6), Some(7), Some(12)],
            )?
        };
        put_file(store.as_ref(), &location, bytes).await?;
    }

    Ok(store)
}

/// Context over `store` with default layout and `parallelism` workers
pub fn context(store: Arc<dyn ObjectStore>, parallelism: usize) -> ScanContext {
    ScanContext::new(store, ScanOptions::default().with_parallelism(parallelism))
}
