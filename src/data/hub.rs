use anyhow::Result;
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Int64Type};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Record, Split};
use crate::error::DatasetError;

/// Branch where the Hub keeps the parquet export of script-based datasets.
pub const PARQUET_REVISION: &str = "refs/convert/parquet";

pub fn fetch_split(repo_id: &str, config: &str, revision: &str, split: Split) -> Result<Vec<Record>> {
    tracing::info!(repo = repo_id, config, split = split.name(), "fetching split from hub");

    let api = Api::new().map_err(|e| DatasetError::Registry(e.to_string()))?;
    let repo = api.repo(Repo::with_revision(
        repo_id.to_string(),
        RepoType::Dataset,
        revision.to_string(),
    ));

    let info = repo
        .info()
        .map_err(|e| DatasetError::Registry(e.to_string()))?;
    let mut shards: Vec<String> = info
        .siblings
        .into_iter()
        .map(|s| s.rfilename)
        .filter(|name| shard_belongs(name, config, split))
        .collect();
    shards.sort();

    if shards.is_empty() {
        return Err(DatasetError::MissingSplit {
            repo: repo_id.to_string(),
            config: config.to_string(),
            split: split.name().to_string(),
        }
        .into());
    }

    let mut records = Vec::new();
    for shard in &shards {
        tracing::debug!(shard = shard.as_str(), "downloading shard");
        let path = repo
            .get(shard)
            .map_err(|e| DatasetError::Registry(e.to_string()))?;
        records.extend(read_parquet(&path)?);
    }

    Ok(records)
}

/// Matches both export layouts: `<config>/<split>/0000.parquet` and
/// `<config>/<name>-<split>[-00000-of-00001].parquet`.
pub fn shard_belongs(filename: &str, config: &str, split: Split) -> bool {
    let Some(rest) = filename.strip_prefix(config).and_then(|r| r.strip_prefix('/')) else {
        return false;
    };
    let Some(stem) = rest.strip_suffix(".parquet") else {
        return false;
    };

    if let Some((dir, _)) = stem.split_once('/') {
        return dir == split.name();
    }

    let marker = format!("-{}", split.name());
    match stem.find(&marker) {
        Some(pos) => {
            let tail = &stem[pos + marker.len()..];
            tail.is_empty() || tail.starts_with('-')
        }
        None => false,
    }
}

pub fn read_parquet(path: &Path) -> Result<Vec<Record>> {
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let list_of_i64 = DataType::List(Arc::new(Field::new("item", DataType::Int64, true)));

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;

        let bytecode = batch
            .column_by_name("bytecode")
            .ok_or_else(|| missing("bytecode", path))?;
        let bytecode = cast(bytecode, &DataType::Utf8)
            .map_err(|_| wrong_type("bytecode", path, bytecode.data_type()))?;
        let bytecode = bytecode
            .as_string_opt::<i32>()
            .ok_or_else(|| wrong_type("bytecode", path, bytecode.data_type()))?;

        let slither = batch
            .column_by_name("slither")
            .ok_or_else(|| missing("slither", path))?;
        let slither = cast(slither, &list_of_i64)
            .map_err(|_| wrong_type("slither", path, slither.data_type()))?;
        let slither = slither
            .as_list_opt::<i32>()
            .ok_or_else(|| wrong_type("slither", path, slither.data_type()))?;

        for row in 0..batch.num_rows() {
            let code = if bytecode.is_null(row) {
                ""
            } else {
                bytecode.value(row)
            };

            let mut labels = Vec::new();
            if !slither.is_null(row) {
                let values = slither.value(row);
                for label in values.as_primitive::<Int64Type>().iter().flatten() {
                    let label = u32::try_from(label).map_err(|_| DatasetError::NegativeLabel {
                        label,
                        path: path.to_path_buf(),
                    })?;
                    labels.push(label);
                }
            }

            records.push(Record::new(code, labels));
        }
    }

    Ok(records)
}

fn missing(column: &'static str, path: &Path) -> DatasetError {
    DatasetError::MissingColumn {
        column,
        path: PathBuf::from(path),
    }
}

fn wrong_type(column: &'static str, path: &Path, found: &DataType) -> DatasetError {
    DatasetError::ColumnType {
        column,
        path: PathBuf::from(path),
        found: found.to_string(),
    }
}
