//! Integration tests for footer statistics extraction

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array,
    RecordBatch, StringArray, StructArray, TimestampMillisecondArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rgindex::{
    evaluate, ExtractError, ExtractOptions, MetadataExtractor, Predicate, PruneDecision, Value,
};

/// Writes `columns` as one batch, cut into row groups of `rows_per_group`
fn write_parquet(columns: Vec<(&str, ArrayRef)>, rows_per_group: usize) -> Bytes {
    let batch = RecordBatch::try_from_iter(columns).unwrap();
    let props = WriterProperties::builder()
        .set_max_row_group_size(rows_per_group)
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    Bytes::from(buf)
}

fn year_file() -> Bytes {
    write_parquet(
        vec![
            (
                "Year",
                Arc::new(Int32Array::from(vec![2020, 2021, 2022, 2023, 2023, 2024])) as ArrayRef,
            ),
            (
                "Month",
                Arc::new(Int32Array::from(vec![
                    Some(1),
                    Some(12),
                    None,
                    None,
                    Some(3),
                    Some(4),
                ])),
            ),
        ],
        2,
    )
}

#[test]
fn test_extract_year_file() {
    let index = MetadataExtractor::default()
        .extract("data/A.parquet", &year_file())
        .expect("extract");

    assert_eq!(index.file_id, "data/A.parquet");
    assert_eq!(index.row_group_count, 3);
    assert!(index.validate().is_ok());
    assert_eq!(index.total_rows(), 6);

    let expected = [(2020, 2021), (2022, 2023), (2023, 2024)];
    for (group, (lo, hi)) in index.groups.iter().zip(expected) {
        let year = group.column("Year").expect("Year stats");
        assert_eq!(year.min, Some(Value::Int(lo)));
        assert_eq!(year.max, Some(Value::Int(hi)));
        assert_eq!(year.null_count, Some(0));
    }

    // All-null chunk has no bounds but a full null count
    let month = index.groups[1].column("Month").unwrap();
    assert_eq!(month.min, None);
    assert_eq!(month.max, None);
    assert_eq!(month.null_count, Some(2));

    let predicate: Predicate = "Year=2023".parse().unwrap();
    let evaluation = evaluate(&index, &predicate);
    assert_eq!(
        evaluation.decisions,
        vec![PruneDecision::Skip, PruneDecision::Keep, PruneDecision::Keep]
    );

    // The all-null group has no Month bounds, so it cannot be excluded by Month
    let predicate: Predicate = "Month=7".parse().unwrap();
    assert_eq!(
        evaluate(&index, &predicate).surviving_groups().into_iter().collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[test]
fn test_extract_typed_columns() {
    let bytes = write_parquet(
        vec![
            (
                "ts",
                Arc::new(TimestampMillisecondArray::from(vec![1_000, 5_000]).with_timezone("UTC"))
                    as ArrayRef,
            ),
            ("day", Arc::new(Date32Array::from(vec![19_000, 19_001]))),
            ("price", Arc::new(Float64Array::from(vec![9.5, 20.25]))),
            ("city", Arc::new(StringArray::from(vec!["Paris", "Berlin"]))),
            ("active", Arc::new(BooleanArray::from(vec![true, true]))),
            ("count", Arc::new(UInt32Array::from(vec![7, u32::MAX]))),
            ("big", Arc::new(Int64Array::from(vec![-5, 5]))),
        ],
        1024,
    );

    let index = MetadataExtractor::default().extract("typed", &bytes).unwrap();
    let group = &index.groups[0];

    let bounds = |name: &str| {
        let stats = group.column(name).unwrap();
        (stats.min.clone(), stats.max.clone())
    };

    assert_eq!(
        bounds("ts"),
        (Some(Value::Timestamp(1_000_000_000)), Some(Value::Timestamp(5_000_000_000)))
    );
    assert_eq!(
        bounds("day"),
        (Some(Value::from_days(19_000)), Some(Value::from_days(19_001)))
    );
    assert_eq!(bounds("price"), (Some(Value::Float(9.5)), Some(Value::Float(20.25))));
    assert_eq!(
        bounds("city"),
        (Some(Value::Str("Berlin".into())), Some(Value::Str("Paris".into())))
    );
    assert_eq!(bounds("active"), (Some(Value::Bool(true)), Some(Value::Bool(true))));
    assert_eq!(
        bounds("count"),
        (Some(Value::Int(7)), Some(Value::Int(u32::MAX as i64)))
    );
    assert_eq!(bounds("big"), (Some(Value::Int(-5)), Some(Value::Int(5))));
}

#[test]
fn test_nested_columns_use_dotted_paths() {
    let inner = StructArray::from(vec![(
        Arc::new(Field::new("id", DataType::Int64, false)),
        Arc::new(Int64Array::from(vec![3, 9])) as ArrayRef,
    )]);
    let bytes = write_parquet(vec![("payload", Arc::new(inner) as ArrayRef)], 1024);

    let index = MetadataExtractor::default().extract("nested", &bytes).unwrap();
    let stats = index.groups[0].column("payload.id").expect("dotted path");
    assert_eq!(stats.min, Some(Value::Int(3)));
    assert_eq!(stats.max, Some(Value::Int(9)));
}

#[test]
fn test_unsupported_column_policy() {
    let bytes = write_parquet(
        vec![
            ("id", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
            (
                "blob",
                Arc::new(BinaryArray::from(vec![b"a".as_ref(), b"b".as_ref()])),
            ),
        ],
        1024,
    );

    let err = MetadataExtractor::default().extract("blob", &bytes).unwrap_err();
    match err {
        ExtractError::Unsupported { column, .. } => assert_eq!(column, "blob"),
        other => panic!("expected Unsupported, got {other}"),
    }

    let extractor = MetadataExtractor::new(ExtractOptions {
        skip_unsupported_columns: true,
    });
    let index = extractor.extract("blob", &bytes).unwrap();
    let blob = index.groups[0].column("blob").unwrap();
    assert!(!blob.has_bounds());
    assert_eq!(blob.null_count, Some(0));
    assert!(index.groups[0].column("id").unwrap().has_bounds());
}

#[test]
fn test_timestamp_schema_is_preserved_in_index() {
    let schema = Schema::new(vec![Field::new(
        "ts",
        DataType::Timestamp(TimeUnit::Microsecond, None),
        true,
    )]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(arrow::array::TimestampMicrosecondArray::from(vec![
            Some(2),
            None,
        ]))],
    )
    .unwrap();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let index = MetadataExtractor::default()
        .extract("micros", &Bytes::from(buf))
        .unwrap();
    let ts = index.groups[0].column("ts").unwrap();
    assert_eq!(ts.min, Some(Value::Timestamp(2_000)));
    assert_eq!(ts.null_count, Some(1));
}

#[tokio::test]
async fn test_extract_from_store_matches_local() {
    let bytes = year_file();
    let store = InMemory::new();
    let path = Path::from("warehouse/year=2023/A.parquet");
    store
        .put(&path, PutPayload::from(bytes.clone()))
        .await
        .unwrap();

    let extractor = MetadataExtractor::default();
    let remote = extractor.extract_from_store(&store, &path).await.unwrap();
    let local = extractor.extract(path.as_ref(), &bytes).unwrap();

    assert_eq!(remote, local);
    assert_eq!(remote.file_id, "warehouse/year=2023/A.parquet");
}

#[tokio::test]
async fn test_truncated_file_is_corrupt() {
    let bytes = year_file();
    let store = InMemory::new();
    let path = Path::from("truncated.parquet");
    store
        .put(&path, PutPayload::from(bytes.slice(..bytes.len() - 3)))
        .await
        .unwrap();

    let err = MetadataExtractor::default()
        .extract_from_store(&store, &path)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Corrupt { .. }), "{err}");
}
