//! Multi-hot label encoding for the per-class output heads.

use std::collections::BTreeSet;

use crate::error::LabelError;

/// Number of distinct label indices seen in the given label lists.
pub fn count_classes<'a, I>(labels: I) -> usize
where
    I: IntoIterator<Item = &'a [u32]>,
{
    labels
        .into_iter()
        .flat_map(|row| row.iter().copied())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Row-major `records × num_labels` matrix of 0.0 / 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatrix {
    rows: usize,
    num_labels: usize,
    data: Vec<f32>,
}

impl LabelMatrix {
    pub fn zeros(rows: usize, num_labels: usize) -> Self {
        Self {
            rows,
            num_labels,
            data: vec![0.0; rows * num_labels],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn row(&self, idx: usize) -> &[f32] {
        &self.data[idx * self.num_labels..(idx + 1) * self.num_labels]
    }

    pub fn get(&self, row: usize, label: usize) -> f32 {
        self.data[row * self.num_labels + label]
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }
}

/// Converts label index lists to multi-hot rows.
///
/// `labels_to_binary(&[vec![1, 4]], 5)` yields `[[0, 1, 0, 0, 1]]`.
pub fn labels_to_binary<R: AsRef<[u32]>>(y: &[R], num_labels: usize) -> Result<LabelMatrix, LabelError> {
    let mut matrix = LabelMatrix::zeros(y.len(), num_labels);

    for (record, indices) in y.iter().enumerate() {
        for &index in indices.as_ref() {
            if index as usize >= num_labels {
                return Err(LabelError::OutOfRange {
                    record,
                    index,
                    num_labels,
                });
            }
            matrix.data[record * num_labels + index as usize] = 1.0;
        }
    }

    Ok(matrix)
}

/// One label stream per output head, indexed by class id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStreams {
    streams: Vec<Vec<f32>>,
}

impl ClassStreams {
    pub fn num_classes(&self) -> usize {
        self.streams.len()
    }

    pub fn class(&self, id: usize) -> &[f32] {
        &self.streams[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.streams.iter().map(Vec::as_slice)
    }

    /// Rebuilds the multi-hot matrix the streams were taken from.
    pub fn to_matrix(&self) -> LabelMatrix {
        let num_labels = self.streams.len();
        let rows = self.streams.first().map_or(0, Vec::len);
        let mut matrix = LabelMatrix::zeros(rows, num_labels);
        for (label, stream) in self.streams.iter().enumerate() {
            for (row, &value) in stream.iter().enumerate() {
                matrix.data[row * num_labels + label] = value;
            }
        }
        matrix
    }
}

/// Transposes a multi-hot matrix into per-class streams.
pub fn transform_labels_to_dict(labels: &LabelMatrix) -> ClassStreams {
    let streams = (0..labels.num_labels)
        .map(|label| (0..labels.rows).map(|row| labels.get(row, label)).collect())
        .collect();
    ClassStreams { streams }
}

/// Display names for class ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    /// Uses `names` where given and the class id otherwise.
    pub fn new(num_classes: usize, names: &[String]) -> Self {
        let names = (0..num_classes)
            .map(|id| names.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, id: usize) -> &str {
        &self.names[id]
    }
}
