use slithercat::error::LabelError;
use slithercat::labels::{count_classes, labels_to_binary, transform_labels_to_dict, ClassTable};

#[test]
fn test_labels_to_binary_examples() {
    let matrix = labels_to_binary(&[vec![1u32, 4]], 5).unwrap();
    assert_eq!(matrix.row(0), &[0.0, 1.0, 0.0, 0.0, 1.0]);

    let matrix = labels_to_binary(&[vec![0u32]], 3).unwrap();
    assert_eq!(matrix.row(0), &[1.0, 0.0, 0.0]);
}

#[test]
fn test_empty_label_list_is_all_zero() {
    let matrix = labels_to_binary(&[Vec::<u32>::new()], 4).unwrap();
    assert_eq!(matrix.row(0), &[0.0; 4]);
}

#[test]
fn test_out_of_range_label_is_rejected() {
    let err = labels_to_binary(&[vec![0u32], vec![1, 3]], 3).unwrap_err();
    assert_eq!(
        err,
        LabelError::OutOfRange {
            record: 1,
            index: 3,
            num_labels: 3
        }
    );
}

#[test]
fn test_count_classes_counts_distinct_indices() {
    let labels: Vec<Vec<u32>> = vec![vec![0], vec![1, 2], vec![0, 2], vec![]];
    assert_eq!(count_classes(labels.iter().map(Vec::as_slice)), 3);
}

#[test]
fn test_three_record_scenario() {
    let slither: Vec<Vec<u32>> = vec![vec![0], vec![1, 2], vec![0, 2]];
    let num_classes = count_classes(slither.iter().map(Vec::as_slice));
    assert_eq!(num_classes, 3);

    let matrix = labels_to_binary(&slither, num_classes).unwrap();
    assert_eq!(
        matrix.to_rows(),
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 1.0],
            vec![1.0, 0.0, 1.0]
        ]
    );

    let streams = transform_labels_to_dict(&matrix);
    assert_eq!(streams.num_classes(), 3);
    assert_eq!(streams.class(0), &[1.0, 0.0, 1.0]);
    assert_eq!(streams.class(1), &[0.0, 1.0, 0.0]);
    assert_eq!(streams.class(2), &[0.0, 1.0, 1.0]);
}

#[test]
fn test_streams_rebuild_original_matrix() {
    let slither: Vec<Vec<u32>> = vec![vec![3], vec![], vec![0, 1, 2, 3], vec![2]];
    let matrix = labels_to_binary(&slither, 4).unwrap();

    let rebuilt = transform_labels_to_dict(&matrix).to_matrix();

    assert_eq!(rebuilt, matrix);
}

#[test]
fn test_class_table_falls_back_to_id() {
    let names = vec!["access-control".to_string(), "arithmetic".to_string()];
    let table = ClassTable::new(3, &names);

    assert_eq!(table.len(), 3);
    assert_eq!(table.name(0), "access-control");
    assert_eq!(table.name(1), "arithmetic");
    assert_eq!(table.name(2), "2");
}
