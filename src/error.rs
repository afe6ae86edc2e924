use std::path::PathBuf;

use thiserror::Error;

/// Failures while fetching or decoding a dataset split. Always fatal.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset registry unavailable: {0}")]
    Registry(String),

    #[error("no shards found for split '{split}' in {repo} ({config})")]
    MissingSplit {
        repo: String,
        config: String,
        split: String,
    },

    #[error("column '{column}' missing from {path}")]
    MissingColumn { column: &'static str, path: PathBuf },

    #[error("column '{column}' in {path} has unexpected type {found}")]
    ColumnType {
        column: &'static str,
        path: PathBuf,
        found: String,
    },

    #[error("{path}:{line}: malformed record: {source}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("negative label {label} in {path}")]
    NegativeLabel { label: i64, path: PathBuf },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("record {record}: label index {index} is outside 0..{num_labels}")]
    OutOfRange {
        record: usize,
        index: u32,
        num_labels: usize,
    },

    #[error("training split has no labels, cannot size the output heads")]
    NoClasses,
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("loss diverged at epoch {epoch}: {loss}")]
    Diverged { epoch: usize, loss: f64 },

    #[error("split '{0}' is empty")]
    EmptySplit(&'static str),
}
