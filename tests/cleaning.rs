use slithercat::data::clean::{clean_split, remap_label};
use slithercat::data::Record;

#[test]
fn test_remap_label_rule() {
    assert_eq!(remap_label(0), Some(0));
    assert_eq!(remap_label(3), Some(3));
    assert_eq!(remap_label(4), None);
    assert_eq!(remap_label(5), Some(4));
    assert_eq!(remap_label(9), Some(8));
}

#[test]
fn test_short_bytecode_is_dropped() {
    let records = vec![
        Record::new("", vec![0]),
        Record::new("0x", vec![1]),
        Record::new("0x60", vec![2]),
        Record::new("0x608", vec![3]),
    ];

    let cleaned = clean_split("train", &records);

    assert_eq!(cleaned.records.len(), 1);
    assert_eq!(cleaned.records[0].bytecode, "0x608");
    assert_eq!(cleaned.stats.input, 4);
    assert_eq!(cleaned.stats.dropped_short, 3);
    assert_eq!(cleaned.stats.kept, 1);
}

#[test]
fn test_length_filter_counts_characters() {
    let records = vec![
        Record::new("ééé", vec![0]),
        Record::new("éééé", vec![1]),
        Record::new("ééééé", vec![2]),
    ];

    let cleaned = clean_split("train", &records);

    assert_eq!(cleaned.stats.dropped_short, 2);
    assert_eq!(cleaned.stats.kept, 1);
    assert_eq!(cleaned.records[0].bytecode, "ééééé");
}

#[test]
fn test_labels_are_remapped_and_counted() {
    let records = vec![
        Record::new("0x6080604052", vec![0, 4, 5]),
        Record::new("0x6080604053", vec![4]),
        Record::new("0x6080604054", vec![3, 7]),
    ];

    let cleaned = clean_split("validation", &records);

    assert_eq!(cleaned.records[0].slither, vec![0, 4]);
    assert!(cleaned.records[1].slither.is_empty());
    assert_eq!(cleaned.records[2].slither, vec![3, 6]);
    assert_eq!(cleaned.stats.dropped_labels, 2);
}

#[test]
fn test_order_preserved_and_duplicates_collapsed() {
    let records = vec![
        Record::new("0xaaaaaa", vec![2, 2, 0]),
        Record::new("abc", vec![1]),
        Record::new("0xbbbbbb", vec![6, 5]),
    ];

    let cleaned = clean_split("test", &records);

    let codes: Vec<&str> = cleaned.records.iter().map(|r| r.bytecode.as_str()).collect();
    assert_eq!(codes, vec!["0xaaaaaa", "0xbbbbbb"]);
    assert_eq!(cleaned.records[0].slither, vec![2, 0]);
    assert_eq!(cleaned.records[1].slither, vec![5, 4]);
}
