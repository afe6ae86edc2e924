pub mod clean;
pub mod hub;

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::DatasetError;
use crate::labels::{labels_to_binary, LabelMatrix};
use crate::preprocessing::Vectorizer;

pub const DEFAULT_REPO: &str = "mwritescode/slither-audited-smart-contracts";
pub const DEFAULT_CONFIG: &str = "big-multilabel";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: DataSource,
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
    /// Display names for the cleaned class ids. Missing entries fall back to the id.
    pub class_names: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSource::default(),
            batch_size: 32,
            shuffle: false,
            seed: 42,
            class_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// Parquet export of a Hugging Face dataset.
    Hub {
        repo: String,
        config: String,
        revision: String,
    },
    /// A directory holding `train.jsonl`, `validation.jsonl` and `test.jsonl`.
    Local { dir: PathBuf },
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Hub {
            repo: DEFAULT_REPO.to_string(),
            config: DEFAULT_CONFIG.to_string(),
            revision: hub::PARQUET_REVISION.to_string(),
        }
    }
}

/// One labeled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub bytecode: String,
    /// Vulnerability class indices reported by slither.
    #[serde(default)]
    pub slither: Vec<u32>,
}

impl Record {
    pub fn new(bytecode: impl Into<String>, slither: Vec<u32>) -> Self {
        Self {
            bytecode: bytecode.into(),
            slither,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    pub train: Vec<Record>,
    pub validation: Vec<Record>,
    pub test: Vec<Record>,
}

impl DatasetSplits {
    fn slot(&mut self, split: Split) -> &mut Vec<Record> {
        match split {
            Split::Train => &mut self.train,
            Split::Validation => &mut self.validation,
            Split::Test => &mut self.test,
        }
    }
}

/// A split after vectorization and label encoding, ready for batching.
pub struct EncodedSplit {
    ids: Vec<u32>,
    labels: LabelMatrix,
    sequence_length: usize,
}

impl EncodedSplit {
    pub fn new(ids: Vec<u32>, labels: LabelMatrix, sequence_length: usize) -> Result<Self> {
        anyhow::ensure!(
            ids.len() == labels.rows() * sequence_length,
            "{} token ids do not fill {} rows of length {}",
            ids.len(),
            labels.rows(),
            sequence_length
        );
        Ok(Self {
            ids,
            labels,
            sequence_length,
        })
    }

    pub fn encode(records: &[Record], vectorizer: &Vectorizer, num_classes: usize) -> Result<Self> {
        let bytecodes: Vec<&str> = records.iter().map(|r| r.bytecode.as_str()).collect();
        let ids = vectorizer.vectorize_all(&bytecodes)?;
        let slither: Vec<&[u32]> = records.iter().map(|r| r.slither.as_slice()).collect();
        let labels = labels_to_binary(&slither, num_classes)?;
        Self::new(ids, labels, vectorizer.sequence_length())
    }

    pub fn len(&self) -> usize {
        self.labels.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.rows() == 0
    }

    pub fn labels(&self) -> &LabelMatrix {
        &self.labels
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn row_ids(&self, idx: usize) -> &[u32] {
        &self.ids[idx * self.sequence_length..(idx + 1) * self.sequence_length]
    }

    /// Token ids `(n, seq)` and targets `(n, classes)` for the given rows.
    pub fn batch_tensors(&self, rows: &[usize], device: &Device) -> Result<(Tensor, Tensor)> {
        let mut ids = Vec::with_capacity(rows.len() * self.sequence_length);
        let mut targets = Vec::with_capacity(rows.len() * self.labels.num_labels());
        for &row in rows {
            ids.extend_from_slice(self.row_ids(row));
            targets.extend_from_slice(self.labels.row(row));
        }

        let ids = Tensor::from_vec(ids, (rows.len(), self.sequence_length), device)?;
        let targets = Tensor::from_vec(targets, (rows.len(), self.labels.num_labels()), device)?;
        Ok((ids, targets))
    }
}

/// Fetches all three splits. Any failure is fatal to the caller; there is no retry.
pub fn load_splits(source: &DataSource) -> Result<DatasetSplits> {
    let mut splits = DatasetSplits::default();
    for split in Split::ALL {
        *splits.slot(split) = load_split(source, split)?;
    }
    Ok(splits)
}

/// Fetches one split.
pub fn load_split(source: &DataSource, split: Split) -> Result<Vec<Record>> {
    let records = match source {
        DataSource::Hub {
            repo,
            config,
            revision,
        } => hub::fetch_split(repo, config, revision, split)?,
        DataSource::Local { dir } => read_jsonl(dir.join(format!("{}.jsonl", split.name())))?,
    };

    tracing::info!(split = split.name(), records = records.len(), "loaded split");
    Ok(records)
}

pub fn read_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record =
            serde_json::from_str(&line).map_err(|source| DatasetError::MalformedLine {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
        records.push(record);
    }

    Ok(records)
}

pub fn write_jsonl<P: AsRef<Path>>(path: P, records: &[Record]) -> Result<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}
