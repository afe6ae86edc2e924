use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::rnn::{gru, GRUConfig, GRUState, GRU, RNN};
use candle_nn::{Dropout, Module, ModuleT, VarBuilder, VarMap};
use std::path::Path;

use crate::preprocessing::PAD_ID;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub embedding_dim: usize,
    pub gru_units: usize,
    pub gru_final_units: usize,
    pub dense_units: usize,
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 128,
            gru_units: 64,
            gru_final_units: 32,
            dense_units: 32,
            dropout: 0.2,
        }
    }
}

/// Sizes fixed by the data rather than by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    pub vocab_size: usize,
    pub num_classes: usize,
}

/// Embedding → GRU → GRU → dropout → dense → one sigmoid head per class.
///
/// Padding tokens are masked: on a padded timestep both recurrent states
/// carry over unchanged.
pub struct VulnModel {
    embedding: candle_nn::Embedding,
    gru: GRU,
    gru_final: GRU,
    dropout: Dropout,
    dense: candle_nn::Linear,
    heads: Vec<candle_nn::Linear>,
    varmap: VarMap,
    config: ModelConfig,
    dims: ModelDims,
    device: Device,
}

impl VulnModel {
    pub fn new(config: &ModelConfig, dims: ModelDims) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        Self::on_device(config, dims, device)
    }

    pub fn on_device(config: &ModelConfig, dims: ModelDims, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let embedding = candle_nn::embedding(dims.vocab_size, config.embedding_dim, vb.pp("embedding"))?;
        let gru_layer = gru(config.embedding_dim, config.gru_units, GRUConfig::default(), vb.pp("gru_1"))?;
        let gru_final = gru(config.gru_units, config.gru_final_units, GRUConfig::default(), vb.pp("gru_2"))?;
        let dense = candle_nn::linear(config.gru_final_units, config.dense_units, vb.pp("dense"))?;

        let mut heads = Vec::with_capacity(dims.num_classes);
        for class in 0..dims.num_classes {
            heads.push(candle_nn::linear(config.dense_units, 1, vb.pp(format!("head_{class}")))?);
        }

        Ok(Self {
            embedding,
            gru: gru_layer,
            gru_final,
            dropout: Dropout::new(config.dropout),
            dense,
            heads,
            varmap,
            config: config.clone(),
            dims,
            device,
        })
    }

    /// Token ids `(batch, seq)` → head logits `(batch, num_classes)`.
    pub fn forward_t(&self, ids: &Tensor, train: bool) -> Result<Tensor> {
        let (batch, seq_len) = ids.dims2()?;
        let embedded = self.embedding.forward(ids)?;
        let mask = ids.ne(PAD_ID)?.to_dtype(DType::F32)?;

        // The two recurrent layers are advanced together, one timestep at a time.
        let mut state = self.gru.zero_state(batch)?;
        let mut final_state = self.gru_final.zero_state(batch)?;
        for t in 0..seq_len {
            let x_t = embedded.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
            let m_t = mask.narrow(1, t, 1)?;
            state = masked_step(&self.gru, &x_t, &state, &m_t)?;
            final_state = masked_step(&self.gru_final, &state.h, &final_state, &m_t)?;
        }

        let x = self.dropout.forward_t(&final_state.h, train)?;
        let x = self.dense.forward(&x)?.relu()?;
        let logits = self
            .heads
            .iter()
            .map(|head| head.forward(&x))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Tensor::cat(&logits, 1)?)
    }

    /// Per-class presence probabilities `(batch, num_classes)`.
    pub fn predict_proba(&self, ids: &Tensor) -> Result<Tensor> {
        let logits = self.forward_t(ids, false)?;
        Ok(candle_nn::ops::sigmoid(&logits)?)
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.varmap
            .save(path)
            .with_context(|| format!("failed to save model to {}", path.display()))?;
        tracing::debug!(path = %path.display(), "saved model weights");
        Ok(())
    }

    /// Rebuilds a model from saved weights. Layer sizes are read from the
    /// stored tensors; only the dropout rate comes from `dropout`.
    pub fn load<P: AsRef<Path>>(path: P, dropout: f32, device: Device) -> Result<Self> {
        let path = path.as_ref();
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)
            .with_context(|| format!("failed to read model {}", path.display()))?;

        let dim = |name: &str, axis: usize| -> Result<usize> {
            let tensor = tensors
                .get(name)
                .with_context(|| format!("{} has no tensor '{}'", path.display(), name))?;
            Ok(tensor.dims()[axis])
        };

        let config = ModelConfig {
            embedding_dim: dim("embedding.weight", 1)?,
            gru_units: dim("gru_1.weight_hh_l0", 1)?,
            gru_final_units: dim("gru_2.weight_hh_l0", 1)?,
            dense_units: dim("dense.weight", 0)?,
            dropout,
        };
        let dims = ModelDims {
            vocab_size: dim("embedding.weight", 0)?,
            num_classes: tensors
                .keys()
                .filter(|k| k.starts_with("head_") && k.ends_with(".weight"))
                .count(),
        };

        let mut model = Self::on_device(&config, dims, device)?;
        model
            .varmap
            .load(path)
            .with_context(|| format!("failed to load weights from {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            vocab_size = dims.vocab_size,
            num_classes = dims.num_classes,
            "loaded model"
        );
        Ok(model)
    }
}

fn masked_step(layer: &GRU, input: &Tensor, state: &GRUState, mask: &Tensor) -> candle_core::Result<GRUState> {
    let next = layer.step(input, state)?;
    let delta = next.h.sub(&state.h)?;
    let h = state.h.add(&delta.broadcast_mul(mask)?)?;
    Ok(GRUState { h })
}
