use anyhow::Result;
use std::path::Path;

use crate::{
    data::EncodedSplit,
    inference::{predict_probabilities, to_predictions},
    labels::{transform_labels_to_dict, ClassTable},
    model::VulnModel,
};

/// Binary classification scores for one output head.
///
/// `accuracy` is a percentage. Precision, recall and F1 are averaged over
/// the labels {0, 1} that occur in either truth or prediction, weighted by
/// their support in the truth. Undefined ratios count as 0.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl EvaluationMetrics {
    pub fn new(y_true: &[u8], y_pred: &[u8]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self {
                accuracy: 0.0,
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
                support: 0,
            };
        }

        let correct = y_true
            .iter()
            .zip(y_pred)
            .filter(|(t, p)| t == p)
            .count();

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;

        for label in [0u8, 1u8] {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut false_negatives = 0usize;
            for (&t, &p) in y_true.iter().zip(y_pred) {
                match (t == label, p == label) {
                    (true, true) => tp += 1,
                    (false, true) => fp += 1,
                    (true, false) => false_negatives += 1,
                    (false, false) => {}
                }
            }

            let support = tp + false_negatives;
            if support == 0 {
                continue;
            }

            let p = ratio(tp, tp + fp);
            let r = ratio(tp, support);
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            let weight = support as f64 / n as f64;
            precision += weight * p;
            recall += weight * r;
            f1 += weight * f;
        }

        Self {
            accuracy: correct as f64 / n as f64 * 100.0,
            precision,
            recall,
            f1,
            support: y_true.iter().take(n).filter(|&&t| t == 1).count(),
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassResult {
    pub class_id: usize,
    pub name: String,
    #[serde(flatten)]
    pub metrics: EvaluationMetrics,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationReport {
    pub threshold: f32,
    pub rows: Vec<ClassResult>,
}

impl EvaluationReport {
    /// One row per class from per-class truth and per-record probabilities.
    pub fn from_predictions(
        truth: &[Vec<u8>],
        probabilities: &[Vec<f32>],
        classes: &ClassTable,
        threshold: f32,
    ) -> Self {
        let rows = truth
            .iter()
            .enumerate()
            .map(|(class_id, y_true)| {
                let column: Vec<f32> = probabilities.iter().map(|row| row[class_id]).collect();
                let y_pred = to_predictions(&column, threshold);
                ClassResult {
                    class_id,
                    name: classes.name(class_id).to_string(),
                    metrics: EvaluationMetrics::new(y_true, &y_pred),
                }
            })
            .collect();

        Self { threshold, rows }
    }

    pub fn print_table(&self) {
        println!("\n===== EVALUATION REPORT (threshold {:.2}) =====", self.threshold);
        println!(
            "{:<24} {:>9} {:>9} {:>9} {:>9} {:>8}",
            "class", "accuracy", "precision", "recall", "f1", "support"
        );
        for row in &self.rows {
            println!(
                "{:<24} {:>9.2} {:>9.4} {:>9.4} {:>9.4} {:>8}",
                row.name,
                row.metrics.accuracy,
                row.metrics.precision,
                row.metrics.recall,
                row.metrics.f1,
                row.metrics.support
            );
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json_string = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_string)?;
        tracing::info!(path = %path.display(), "evaluation report saved");
        Ok(())
    }
}

pub struct Evaluator<'a> {
    model: &'a VulnModel,
    classes: &'a ClassTable,
    batch_size: usize,
    threshold: f32,
}

impl<'a> Evaluator<'a> {
    pub fn new(model: &'a VulnModel, classes: &'a ClassTable, batch_size: usize, threshold: f32) -> Self {
        Self {
            model,
            classes,
            batch_size,
            threshold,
        }
    }

    pub fn evaluate(&self, data: &EncodedSplit) -> Result<EvaluationReport> {
        let probabilities = predict_probabilities(self.model, data, self.batch_size)?;
        let truth: Vec<Vec<u8>> = transform_labels_to_dict(data.labels())
            .iter()
            .map(|stream| stream.iter().map(|&v| u8::from(v >= 0.5)).collect())
            .collect();

        Ok(EvaluationReport::from_predictions(
            &truth,
            &probabilities,
            self.classes,
            self.threshold,
        ))
    }
}
