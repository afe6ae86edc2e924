use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, ListArray, StringArray};
use arrow::datatypes::Int64Type;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use slithercat::data::hub::{read_parquet, shard_belongs};
use slithercat::data::{read_jsonl, write_jsonl, Record, Split};

#[test]
fn test_shard_layouts_are_recognised() {
    assert!(shard_belongs("big-multilabel/train/0000.parquet", "big-multilabel", Split::Train));
    assert!(shard_belongs("big-multilabel/test/0001.parquet", "big-multilabel", Split::Test));
    assert!(shard_belongs(
        "big-multilabel/slither-audited-smart-contracts-validation.parquet",
        "big-multilabel",
        Split::Validation
    ));
    assert!(shard_belongs(
        "big-multilabel/slither-audited-smart-contracts-train-00000-of-00003.parquet",
        "big-multilabel",
        Split::Train
    ));

    assert!(!shard_belongs("big-multilabel/test/0000.parquet", "big-multilabel", Split::Train));
    assert!(!shard_belongs("small-multilabel/train/0000.parquet", "big-multilabel", Split::Train));
    assert!(!shard_belongs("big-multilabel/train/README.md", "big-multilabel", Split::Train));
    assert!(!shard_belongs(
        "big-multilabel/contracts-trainval.parquet",
        "big-multilabel",
        Split::Train
    ));
}

#[test]
fn test_read_parquet_extracts_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("0000.parquet");

    let bytecode: ArrayRef = Arc::new(StringArray::from(vec![Some("0x6080604052"), None, Some("0x60")]));
    let slither: ArrayRef = Arc::new(ListArray::from_iter_primitive::<Int64Type, _, _>(vec![
        Some(vec![Some(1), Some(5)]),
        Some(vec![]),
        None,
    ]));
    let address: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
    let batch = RecordBatch::try_from_iter(vec![
        ("address", address),
        ("bytecode", bytecode),
        ("slither", slither),
    ])
    .unwrap();

    let file = std::fs::File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let records = read_parquet(&path).unwrap();

    assert_eq!(
        records,
        vec![
            Record::new("0x6080604052", vec![1, 5]),
            Record::new("", vec![]),
            Record::new("0x60", vec![]),
        ]
    );
}

#[test]
fn test_read_parquet_requires_label_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("0000.parquet");

    let bytecode: ArrayRef = Arc::new(StringArray::from(vec!["0x6080604052"]));
    let batch = RecordBatch::try_from_iter(vec![("bytecode", bytecode)]).unwrap();
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let err = read_parquet(&path).unwrap_err();
    assert!(err.to_string().contains("slither"));
}

#[test]
fn test_jsonl_roundtrip_and_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.jsonl");
    let records = vec![Record::new("0x6080604052", vec![0, 2]), Record::new("0x6080", vec![])];

    write_jsonl(&path, &records).unwrap();
    assert_eq!(read_jsonl(&path).unwrap(), records);

    std::fs::write(&path, "{\"bytecode\": \"0x6080604052\", \"slither\": [1]}\nnot json\n").unwrap();
    let err = read_jsonl(&path).unwrap_err();
    assert!(err.to_string().contains(":2:"));
}
