use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{Array, Int32Array, RecordBatch};
use futures::StreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use rgindex::{ExtractError, Predicate};
use scan::{
    index_dataset, prune_dataset, query_dataset, stream_dataset, OrchestratorError, ScanContext,
    ScanError,
};
use storage::StoreError;
use tests::{context, five_file_dataset, put_file, sales_file, year_file, year_only_file};

fn predicate(raw: &str) -> Predicate {
    raw.parse()
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", raw, e))
}

fn groups(ids: &[u32]) -> BTreeSet<u32> {
    ids.iter().copied().collect()
}

async fn indexed_year_dataset() -> ScanContext {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    put_file(store.as_ref(), "data/A.parquet", year_file().unwrap())
        .await
        .unwrap();
    put_file(store.as_ref(), "data/B.parquet", year_only_file().unwrap())
        .await
        .unwrap();

    let ctx = context(store, 2);
    let report = index_dataset(&ctx, "data").await.expect("index");
    assert_eq!(report.outcome(), Ok(()));
    ctx
}

#[tokio::test]
async fn test_year_ranges_keep_overlapping_groups() {
    let ctx = indexed_year_dataset().await;

    let report = prune_dataset(&ctx, "data", &predicate("Year=2023"))
        .await
        .unwrap();
    let outcome = report
        .get("data/A.parquet")
        .expect("file A present")
        .as_ref()
        .expect("file A pruned");

    assert_eq!(outcome.row_group_count, 3);
    assert_eq!(outcome.surviving_groups, groups(&[1, 2]));
    assert_eq!(outcome.skipped(), 1);
}

#[tokio::test]
async fn test_missing_column_stats_keep_groups() {
    let ctx = indexed_year_dataset().await;

    // B has no Month column at all, so Month never rules a group out there
    let report = prune_dataset(&ctx, "data", &predicate("Year=2023;Month=7"))
        .await
        .unwrap();

    let b = report.get("data/B.parquet").unwrap().as_ref().unwrap();
    assert_eq!(b.surviving_groups, groups(&[1, 2]));

    // A has Month bounds [3,4] and [5,6] in the Year-matching groups
    let a = report.get("data/A.parquet").unwrap().as_ref().unwrap();
    assert!(a.surviving_groups.is_empty());

    let report = prune_dataset(&ctx, "data", &predicate("Month=7"))
        .await
        .unwrap();
    let b = report.get("data/B.parquet").unwrap().as_ref().unwrap();
    assert_eq!(b.surviving_groups, groups(&[0, 1, 2]));
}

#[tokio::test]
async fn test_corrupt_file_is_isolated() {
    let store = five_file_dataset().await.unwrap();
    let ctx = context(store, 3);

    let report = index_dataset(&ctx, "sales").await.unwrap();
    assert_eq!(report.len(), 5);

    let ids: Vec<&str> = report.iter().map(|e| e.file_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "sales/part-1.parquet",
            "sales/part-2.parquet",
            "sales/part-3.parquet",
            "sales/part-4.parquet",
            "sales/part-5.parquet",
        ]
    );

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "sales/part-3.parquet");
    assert!(matches!(
        failures[0].1,
        ScanError::Extract(ExtractError::Corrupt { .. })
    ));

    assert_eq!(report.successes().count(), 4);
    assert_eq!(
        report.outcome(),
        Err(OrchestratorError::PartialFailure {
            failed: 1,
            total: 5
        })
    );

    // Only the four good files were indexed
    let indexed = ctx.index_store().list("sales").await.unwrap();
    assert_eq!(indexed.len(), 4);
    assert!(!indexed.contains(&"sales/part-3.parquet".to_string()));
}

#[tokio::test]
async fn test_query_returns_matching_rows_only() {
    let store = five_file_dataset().await.unwrap();
    let ctx = context(store, 4);
    index_dataset(&ctx, "sales").await.unwrap();

    // part-1 covers 2019/2020, part-2 covers 2020/2021
    let output = query_dataset(&ctx, "sales", &predicate("Year=2020;Month>=7"))
        .await
        .unwrap();

    assert_eq!(output.summary().failed, 0);
    assert_eq!(output.outcome(), Ok(()));
    assert_eq!(output.num_rows(), 2);

    for batch in output.batches() {
        let years = batch
            .column_by_name("Year")
            .expect("Year column")
            .as_any()
            .downcast_ref::<Int32Array>()
            .expect("Int32 years");
        let months = batch
            .column_by_name("Month")
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        for row in 0..batch.num_rows() {
            assert_eq!(years.value(row), 2020);
            assert!(months.value(row) >= 7);
        }
    }

    let fetched: Vec<&str> = output.fetched.successes().map(|(id, _)| id).collect();
    assert_eq!(fetched, vec!["sales/part-1.parquet"]);
}

#[tokio::test]
async fn test_query_without_survivors_fetches_nothing() {
    let ctx = indexed_year_dataset().await;

    let output = query_dataset(&ctx, "data", &predicate("Year>=2030"))
        .await
        .unwrap();

    assert_eq!(output.pruned.successes().count(), 2);
    assert!(output.fetched.is_empty());
    assert_eq!(output.num_rows(), 0);
    assert_eq!(output.outcome(), Ok(()));
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let ctx = indexed_year_dataset().await;
    let location = ctx.index_store().index_location("data/A.parquet").unwrap();

    let first = ctx.store().get(&location).await.unwrap().bytes().await.unwrap();
    let loaded = ctx.index_store().load("data/A.parquet").await.unwrap();

    let report = index_dataset(&ctx, "data").await.unwrap();
    assert_eq!(report.summary().succeeded, 2);

    let second = ctx.store().get(&location).await.unwrap().bytes().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.index_store().load("data/A.parquet").await.unwrap(), loaded);

    // Index objects are never picked up as data files
    assert_eq!(report.len(), 2);
}

#[tokio::test]
async fn test_damaged_index_fails_only_its_file() {
    let ctx = indexed_year_dataset().await;
    let location = ctx.index_store().index_location("data/B.parquet").unwrap();
    ctx.store()
        .put(&location, PutPayload::from_static(b"{\"format_version\": 1, \"index\": 7}"))
        .await
        .unwrap();

    let report = prune_dataset(&ctx, "data", &predicate("Year=2023"))
        .await
        .unwrap();

    assert!(report.get("data/A.parquet").unwrap().is_ok());
    assert!(matches!(
        report.get("data/B.parquet").unwrap(),
        Err(ScanError::Store(StoreError::Corrupt { .. }))
    ));
}

#[tokio::test]
async fn test_local_store_from_config() {
    let dir = tempfile::tempdir().unwrap();

    let store = LocalFileSystem::new_with_prefix(dir.path()).unwrap();
    put_file(&store, "warehouse/2023/a.parquet", year_file().unwrap())
        .await
        .unwrap();
    put_file(&store, "warehouse/notes.txt", bytes::Bytes::from_static(b"ignored"))
        .await
        .unwrap();

    let mut config = config::Config::default();
    config.storage.root = dir.path().to_string_lossy().to_string();
    config.storage.prefix = "warehouse".to_string();
    config.scan.parallelism = 2;
    config.validate().unwrap();

    let ctx = ScanContext::from_config(&config).unwrap();
    let report = index_dataset(&ctx, &config.storage.prefix).await.unwrap();
    assert_eq!(report.summary().succeeded, 1);

    let on_disk = dir
        .path()
        .join("warehouse/2023/metadata/a.parquet.json");
    assert!(on_disk.exists(), "index not written at {:?}", on_disk);

    let report = prune_dataset(&ctx, "warehouse", &predicate("Year=2020..2021"))
        .await
        .unwrap();
    let outcome = report
        .get("warehouse/2023/a.parquet")
        .unwrap()
        .as_ref()
        .unwrap();
    assert_eq!(outcome.surviving_groups, groups(&[0]));

    // The data file itself is untouched
    let meta = ctx
        .store()
        .head(&Path::from("warehouse/2023/a.parquet"))
        .await
        .unwrap();
    assert!(meta.size > 0);
}

fn years_of(batches: &[RecordBatch]) -> Vec<i32> {
    batches
        .iter()
        .flat_map(|b| {
            b.column_by_name("Year")
                .unwrap()
                .as_any()
                .downcast_ref::<Int32Array>()
                .unwrap()
                .values()
                .to_vec()
        })
        .collect()
}

#[tokio::test]
async fn test_overwritten_file_is_not_pruned_on_old_stats() {
    let ctx = indexed_year_dataset().await;

    // Group 0 used to hold 2020..2021, now it holds 2023
    let rewritten = sales_file(
        &[2023, 2023, 2022, 2022, 2024, 2024],
        &[Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)],
    )
    .unwrap();
    put_file(ctx.store().as_ref(), "data/A.parquet", rewritten)
        .await
        .unwrap();

    let report = prune_dataset(&ctx, "data", &predicate("Year=2023"))
        .await
        .unwrap();
    assert!(matches!(
        report.get("data/A.parquet").unwrap(),
        Err(ScanError::Store(StoreError::Stale { .. }))
    ));
    assert!(report.get("data/B.parquet").unwrap().is_ok());

    let output = query_dataset(&ctx, "data", &predicate("Year=2023"))
        .await
        .unwrap();
    assert_eq!(output.summary().failed, 1);

    // Re-indexing picks up the new statistics
    index_dataset(&ctx, "data").await.unwrap();
    let report = prune_dataset(&ctx, "data", &predicate("Year=2023"))
        .await
        .unwrap();
    let a = report.get("data/A.parquet").unwrap().as_ref().unwrap();
    assert_eq!(a.surviving_groups, groups(&[0]));
}

#[tokio::test]
async fn test_stream_matches_buffered_query() {
    let store = five_file_dataset().await.unwrap();
    let ctx = context(store, 2);
    index_dataset(&ctx, "sales").await.unwrap();

    // Only the first group of part-4 and part-5 can match
    let where_clause = predicate("Year>=2021;Month<=6");
    let buffered = query_dataset(&ctx, "sales", &where_clause).await.unwrap();
    let buffered: Vec<RecordBatch> = buffered.batches().cloned().collect();

    let streamed = stream_dataset(&ctx, "sales", &where_clause).await.unwrap();
    assert_eq!(streamed.pruned.successes().count(), 4);

    let items: Vec<(String, Result<RecordBatch, ScanError>)> = streamed.batches.collect().await;
    let mut file_order: Vec<&str> = items.iter().map(|(id, _)| id.as_str()).collect();
    file_order.dedup();
    assert_eq!(
        file_order,
        vec!["sales/part-4.parquet", "sales/part-5.parquet"]
    );

    let streamed: Vec<RecordBatch> = items
        .into_iter()
        .map(|(_, batch)| batch.unwrap())
        .collect();
    assert_eq!(years_of(&streamed), years_of(&buffered));
    assert_eq!(years_of(&streamed), vec![2022, 2022, 2023, 2023]);
}
