//! Multi-label vulnerability classifier for smart-contract bytecode.
//!
//! Logging goes through [`tracing`]; set `RUST_LOG` to adjust verbosity
//! (e.g. `RUST_LOG=slithercat=debug`).

pub mod data;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod labels;
pub mod model;
pub mod preprocessing;
pub mod training;

use anyhow::Result;
use std::path::PathBuf;

use crate::data::clean::clean_split;
use crate::data::{DatasetSplits, EncodedSplit, Record};
use crate::error::LabelError;
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::labels::{count_classes, ClassTable};
use crate::model::{ModelDims, VulnModel};
use crate::preprocessing::Vectorizer;
use crate::training::TrainingStats;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: model::ModelConfig,
    #[serde(default)]
    pub training: training::TrainingConfig,
    #[serde(default)]
    pub data: data::DataConfig,
    #[serde(default)]
    pub preprocessing: preprocessing::PreprocessingConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub model_path: PathBuf,
    pub vectorizer_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("vulnerability_detection_model.safetensors"),
            vectorizer_path: PathBuf::from("text_vectorizer.json"),
            report_path: None,
        }
    }
}

/// Cleaned splits plus everything fitted on the training split.
pub struct Prepared {
    pub vectorizer: Vectorizer,
    pub classes: ClassTable,
    pub train: EncodedSplit,
    pub validation: EncodedSplit,
    pub test: EncodedSplit,
}

pub struct PipelineOutput {
    pub stats: TrainingStats,
    pub report: EvaluationReport,
}

/// Cleans the splits, fits the vectorizer on train and encodes all three.
pub fn prepare(raw: &DatasetSplits, config: &Config) -> Result<Prepared> {
    let train = clean_split("train", &raw.train).records;
    let validation = clean_split("validation", &raw.validation).records;
    let test = clean_split("test", &raw.test).records;

    let num_classes = count_classes(train.iter().map(|r| r.slither.as_slice()));
    if num_classes == 0 {
        return Err(LabelError::NoClasses.into());
    }
    tracing::info!(num_classes, "sized output heads");

    let vectorizer = Vectorizer::adapt(&config.preprocessing, &bytecodes(&train))?;

    Ok(Prepared {
        train: EncodedSplit::encode(&train, &vectorizer, num_classes)?,
        validation: EncodedSplit::encode(&validation, &vectorizer, num_classes)?,
        test: EncodedSplit::encode(&test, &vectorizer, num_classes)?,
        classes: ClassTable::new(num_classes, &config.data.class_names),
        vectorizer,
    })
}

/// Train, reload the best checkpoint, evaluate on test, persist model and vectorizer.
pub fn run_pipeline(raw: &DatasetSplits, config: &Config) -> Result<PipelineOutput> {
    let prepared = prepare(raw, config)?;

    let dims = ModelDims {
        vocab_size: prepared.vectorizer.vocab_size(),
        num_classes: prepared.classes.len(),
    };
    let model = VulnModel::new(&config.model, dims)?;

    let shuffle_seed = config.data.shuffle.then_some(config.data.seed);
    let stats = training::train(
        &model,
        &prepared.train,
        &prepared.validation,
        &config.training,
        config.data.batch_size,
        shuffle_seed,
    )?;

    let best = if stats.checkpoints.is_empty() {
        tracing::warn!("no checkpoint was written, evaluating final weights");
        model
    } else {
        VulnModel::load(
            &config.training.checkpoint_path,
            config.model.dropout,
            model.device().clone(),
        )?
    };

    let evaluator = Evaluator::new(
        &best,
        &prepared.classes,
        config.data.batch_size,
        inference::DEFAULT_THRESHOLD,
    );
    let report = evaluator.evaluate(&prepared.test)?;

    best.save(&config.artifacts.model_path)?;
    prepared.vectorizer.save(&config.artifacts.vectorizer_path)?;
    tracing::info!(
        model = %config.artifacts.model_path.display(),
        vectorizer = %config.artifacts.vectorizer_path.display(),
        "saved artifacts"
    );

    Ok(PipelineOutput { stats, report })
}

/// Scores persisted artifacts against a raw test split.
pub fn evaluate_saved(test: &[Record], config: &Config) -> Result<EvaluationReport> {
    let device = candle_core::Device::cuda_if_available(0)?;
    let model = VulnModel::load(&config.artifacts.model_path, config.model.dropout, device)?;
    let vectorizer = Vectorizer::from_file(&config.artifacts.vectorizer_path)?;

    let num_classes = model.dims().num_classes;
    let test = clean_split("test", test).records;
    let encoded = EncodedSplit::encode(&test, &vectorizer, num_classes)?;
    let classes = ClassTable::new(num_classes, &config.data.class_names);

    Evaluator::new(
        &model,
        &classes,
        config.data.batch_size,
        inference::DEFAULT_THRESHOLD,
    )
    .evaluate(&encoded)
}

fn bytecodes(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.bytecode.as_str()).collect()
}
