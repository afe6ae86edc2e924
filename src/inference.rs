use anyhow::Result;
use candle_core::{Device, Tensor};
use std::path::Path;

use crate::{
    data::EncodedSplit,
    labels::ClassTable,
    model::VulnModel,
    preprocessing::Vectorizer,
};

pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Sigmoid outputs for every row of `data`, batched.
pub fn predict_probabilities(
    model: &VulnModel,
    data: &EncodedSplit,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let rows: Vec<usize> = (0..data.len()).collect();
    let mut probabilities = Vec::with_capacity(data.len());

    for chunk in rows.chunks(batch_size.max(1)) {
        let (ids, _) = data.batch_tensors(chunk, model.device())?;
        probabilities.extend(model.predict_proba(&ids)?.to_vec2::<f32>()?);
    }

    Ok(probabilities)
}

/// 1 where the probability reaches `threshold`, else 0.
pub fn to_predictions(probabilities: &[f32], threshold: f32) -> Vec<u8> {
    probabilities
        .iter()
        .map(|&p| u8::from(p >= threshold))
        .collect()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassScore {
    pub class_id: usize,
    pub name: String,
    pub probability: f32,
    pub detected: bool,
}

/// Scores raw bytecode with a persisted model and vectorizer.
pub struct Detector {
    model: VulnModel,
    vectorizer: Vectorizer,
    classes: ClassTable,
    threshold: f32,
}

impl Detector {
    pub fn new(model: VulnModel, vectorizer: Vectorizer, classes: ClassTable, threshold: f32) -> Self {
        Self {
            model,
            vectorizer,
            classes,
            threshold,
        }
    }

    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        vectorizer_path: Q,
        class_names: &[String],
        threshold: f32,
    ) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        let model = VulnModel::load(model_path, 0.0, device)?;
        let vectorizer = Vectorizer::from_file(vectorizer_path)?;
        let classes = ClassTable::new(model.dims().num_classes, class_names);
        Ok(Self::new(model, vectorizer, classes, threshold))
    }

    pub fn detect(&self, bytecode: &str) -> Result<Vec<ClassScore>> {
        let ids = self.vectorizer.vectorize(bytecode)?;
        let len = ids.len();
        let input = Tensor::from_vec(ids, (1, len), self.model.device())?;
        let probabilities = self.model.predict_proba(&input)?.squeeze(0)?.to_vec1::<f32>()?;

        Ok(probabilities
            .into_iter()
            .enumerate()
            .map(|(class_id, probability)| ClassScore {
                class_id,
                name: self.classes.name(class_id).to_string(),
                probability,
                detected: probability >= self.threshold,
            })
            .collect())
    }
}
