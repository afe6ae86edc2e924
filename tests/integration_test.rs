use std::path::Path;

use slithercat::{
    data::{load_split, load_splits, write_jsonl, DataSource, Record, Split},
    inference::Detector,
    model::ModelConfig,
    preprocessing::PreprocessingConfig,
    Config,
};

fn write_dataset(dir: &Path) {
    let train = vec![
        Record::new("0x6080604052348015600f57600080fd5b50", vec![0, 5]),
        Record::new("0x6080604052600436106100415760003560", vec![1, 4]),
        Record::new("0x60806040523480156100105760", vec![2]),
        Record::new("0x6060604052361561008d5763ffffffff", vec![3]),
        Record::new("0x6080604052348015610010576000", vec![0, 1]),
        Record::new("0x", vec![2]),
    ];
    let validation = vec![
        Record::new("0x6080604052348015600f57600080fd", vec![0]),
        Record::new("0x60606040526004361061004c57", vec![5, 1]),
    ];
    let test = vec![
        Record::new("0x608060405234801561001057600080fd", vec![0, 2]),
        Record::new("0x6060604052600436106100", vec![3]),
        Record::new("0x6080604052", vec![4]),
    ];

    write_jsonl(dir.join("train.jsonl"), &train).unwrap();
    write_jsonl(dir.join("validation.jsonl"), &validation).unwrap();
    write_jsonl(dir.join("test.jsonl"), &test).unwrap();
}

fn tiny_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data.source = DataSource::Local {
        dir: dir.to_path_buf(),
    };
    config.data.batch_size = 2;
    config.model = ModelConfig {
        embedding_dim: 8,
        gru_units: 6,
        gru_final_units: 4,
        dense_units: 4,
        dropout: 0.2,
    };
    config.preprocessing = PreprocessingConfig {
        sequence_length: 16,
        ..PreprocessingConfig::default()
    };
    config.training.epochs = 2;
    config.training.checkpoint_path = dir.join("model_experiments").join("model_2.safetensors");
    config.artifacts.model_path = dir.join("vulnerability_detection_model.safetensors");
    config.artifacts.vectorizer_path = dir.join("text_vectorizer.json");
    config
}

#[test]
fn test_default_config_matches_reference_run() {
    let config = Config::default();

    assert_eq!(config.data.batch_size, 32);
    assert!(!config.data.shuffle);
    assert_eq!(config.preprocessing.max_tokens, 10_000);
    assert_eq!(config.preprocessing.sequence_length, 250);
    assert_eq!(config.model.embedding_dim, 128);
    assert_eq!(config.model.gru_units, 64);
    assert_eq!(config.model.gru_final_units, 32);
    assert_eq!(config.training.epochs, 20);
    assert_eq!(config.training.lr_patience, 5);
    assert!((config.training.learning_rate - 1e-3).abs() < f64::EPSILON);
}

#[test]
fn test_config_sections_default_when_omitted() {
    let config: Config = serde_json::from_str(r#"{"training": {"epochs": 3}, "data": {"source": {"kind": "local", "dir": "data"}}}"#).unwrap();

    assert_eq!(config.training.epochs, 3);
    assert_eq!(config.training.lr_patience, 5);
    assert_eq!(config.data.source, DataSource::Local { dir: "data".into() });
    assert_eq!(config.data.batch_size, 32);
    assert_eq!(config.preprocessing.chunk_width, 2);
}

#[test]
fn test_prepare_sizes_heads_from_training_labels() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let config = tiny_config(dir.path());

    let splits = load_splits(&config.data.source).unwrap();
    let prepared = slithercat::prepare(&splits, &config).unwrap();

    assert_eq!(prepared.classes.len(), 5);
    assert_eq!(prepared.train.len(), 5);
    assert_eq!(prepared.validation.len(), 2);
    assert_eq!(prepared.test.len(), 3);
    assert_eq!(prepared.train.sequence_length(), 16);
    assert_eq!(prepared.train.labels().row(0), &[1.0, 0.0, 0.0, 0.0, 1.0]);
    assert_eq!(prepared.train.labels().row(1), &[0.0, 1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_full_pipeline_persists_usable_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let config = tiny_config(dir.path());

    let splits = load_splits(&config.data.source).unwrap();
    let output = slithercat::run_pipeline(&splits, &config).unwrap();

    assert_eq!(output.stats.epochs, vec![1, 2]);
    assert_eq!(output.stats.checkpoints.first(), Some(&1));
    assert_eq!(output.report.rows.len(), 5);
    for row in &output.report.rows {
        assert!((0.0..=100.0).contains(&row.metrics.accuracy));
    }

    assert!(config.training.checkpoint_path.exists());
    assert!(config.artifacts.model_path.exists());
    assert!(config.artifacts.vectorizer_path.exists());

    let detector = Detector::from_files(
        &config.artifacts.model_path,
        &config.artifacts.vectorizer_path,
        &[],
        0.5,
    )
    .unwrap();
    let scores = detector.detect("0x6080604052348015600f57600080fd").unwrap();
    assert_eq!(scores.len(), 5);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.probability)));

    let report = slithercat::evaluate_saved(&splits.test, &config).unwrap();
    assert_eq!(report.rows.len(), 5);
}

#[test]
fn test_validation_label_outside_training_classes_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    write_jsonl(
        dir.path().join("validation.jsonl"),
        &[Record::new("0x6080604052348015", vec![9])],
    )
    .unwrap();
    let config = tiny_config(dir.path());

    let splits = load_splits(&config.data.source).unwrap();
    assert!(slithercat::prepare(&splits, &config).is_err());
}

#[test]
fn test_load_split_reads_only_requested_split() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    std::fs::remove_file(dir.path().join("train.jsonl")).unwrap();
    let config = tiny_config(dir.path());

    let test = load_split(&config.data.source, Split::Test).unwrap();
    assert_eq!(test.len(), 3);
    assert!(load_splits(&config.data.source).is_err());
}
