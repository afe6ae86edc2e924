use anyhow::Result;
use candle_core::Tensor;
use candle_nn::optim::{AdamW, ParamsAdamW};
use candle_nn::Optimizer;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

use crate::{data::EncodedSplit, error::TrainingError, model::VulnModel};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
    pub lr_factor: f64,
    pub lr_patience: usize,
    pub lr_min_delta: f64,
    pub min_learning_rate: f64,
    pub checkpoint_path: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: 1e-3,
            epsilon: 1e-7,
            weight_decay: 0.0,
            lr_factor: 0.1,
            lr_patience: 5,
            lr_min_delta: 1e-4,
            min_learning_rate: 0.0,
            checkpoint_path: PathBuf::from("model_experiments/model_2.safetensors"),
        }
    }
}

/// One epoch's worth of work over some model, independent of the framework.
pub trait Trainer {
    type Data;

    /// Runs one pass over `data`, updating weights. Returns the mean loss.
    fn train_epoch(&mut self, data: &Self::Data) -> Result<f64>;

    fn validation_loss(&self, data: &Self::Data) -> Result<f64>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    fn save_checkpoint(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochLogs {
    /// 1-based.
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    SaveCheckpoint(PathBuf),
    SetLearningRate(f64),
}

pub trait Callback {
    fn on_epoch_end(&mut self, logs: &EpochLogs) -> Option<CallbackAction>;
}

/// Saves only when validation loss strictly improves on the best seen so far.
pub struct ModelCheckpoint {
    path: PathBuf,
    best: f64,
}

impl ModelCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best: f64::INFINITY,
        }
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(&mut self, logs: &EpochLogs) -> Option<CallbackAction> {
        if logs.val_loss < self.best {
            self.best = logs.val_loss;
            Some(CallbackAction::SaveCheckpoint(self.path.clone()))
        } else {
            None
        }
    }
}

/// Scales the learning rate by `factor` once validation loss has gone
/// `patience` epochs without improving by more than `min_delta`.
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_delta: f64,
    min_lr: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_delta: f64, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_delta,
            min_lr,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(
            config.lr_factor,
            config.lr_patience,
            config.lr_min_delta,
            config.min_learning_rate,
        )
    }
}

impl Callback for ReduceLrOnPlateau {
    fn on_epoch_end(&mut self, logs: &EpochLogs) -> Option<CallbackAction> {
        if logs.val_loss < self.best - self.min_delta {
            self.best = logs.val_loss;
            self.wait = 0;
            return None;
        }

        self.wait += 1;
        if self.wait >= self.patience && logs.learning_rate > self.min_lr {
            self.wait = 0;
            let lr = (logs.learning_rate * self.factor).max(self.min_lr);
            return Some(CallbackAction::SetLearningRate(lr));
        }
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingStats {
    pub epochs: Vec<usize>,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub learning_rates: Vec<f64>,
    /// Epochs after which a checkpoint was written.
    pub checkpoints: Vec<usize>,
}

impl TrainingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_epoch(&mut self, logs: &EpochLogs) {
        self.epochs.push(logs.epoch);
        self.train_losses.push(logs.train_loss);
        self.val_losses.push(logs.val_loss);
        self.learning_rates.push(logs.learning_rate);
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.val_losses.iter().copied().reduce(f64::min)
    }
}

/// Runs `epochs` epochs and applies whatever the callbacks ask for after
/// each one, in callback order. A non-finite loss aborts the run.
pub fn fit<T: Trainer>(
    trainer: &mut T,
    train: &T::Data,
    validation: &T::Data,
    epochs: usize,
    callbacks: &mut [Box<dyn Callback>],
) -> Result<TrainingStats> {
    let mut stats = TrainingStats::new();

    for epoch in 1..=epochs {
        let train_loss = trainer.train_epoch(train)?;
        let val_loss = trainer.validation_loss(validation)?;

        for loss in [train_loss, val_loss] {
            if !loss.is_finite() {
                return Err(TrainingError::Diverged { epoch, loss }.into());
            }
        }

        let logs = EpochLogs {
            epoch,
            train_loss,
            val_loss,
            learning_rate: trainer.learning_rate(),
        };
        stats.add_epoch(&logs);

        tracing::info!(
            "Epoch {}/{}: Train Loss = {:.4}, Val Loss = {:.4}, LR = {:.2e}",
            epoch,
            epochs,
            train_loss,
            val_loss,
            logs.learning_rate
        );

        for callback in callbacks.iter_mut() {
            match callback.on_epoch_end(&logs) {
                Some(CallbackAction::SaveCheckpoint(path)) => {
                    trainer.save_checkpoint(&path)?;
                    stats.checkpoints.push(epoch);
                    tracing::info!(epoch, path = %path.display(), "val_loss improved, checkpoint saved");
                }
                Some(CallbackAction::SetLearningRate(lr)) => {
                    tracing::info!(epoch, lr, "reducing learning rate");
                    trainer.set_learning_rate(lr);
                }
                None => {}
            }
        }
    }

    Ok(stats)
}

/// Binary cross-entropy per head, averaged over the batch and summed over
/// heads. Computed from logits as `max(x, 0) - x*t + ln(1 + e^-|x|)`.
pub fn multi_head_bce(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let per_element = logits
        .relu()?
        .sub(&logits.mul(targets)?)?
        .add(&softplus)?;
    per_element.mean(0)?.sum_all()
}

/// Candle-backed trainer for [`VulnModel`].
pub struct GruTrainer<'a> {
    model: &'a VulnModel,
    optimizer: AdamW,
    batch_size: usize,
    rng: Option<StdRng>,
}

impl<'a> GruTrainer<'a> {
    pub fn new(
        model: &'a VulnModel,
        config: &TrainingConfig,
        batch_size: usize,
        shuffle_seed: Option<u64>,
    ) -> Result<Self> {
        let params = ParamsAdamW {
            lr: config.learning_rate,
            eps: config.epsilon,
            weight_decay: config.weight_decay,
            ..Default::default()
        };
        let optimizer = AdamW::new(model.varmap().all_vars(), params)?;

        Ok(Self {
            model,
            optimizer,
            batch_size: batch_size.max(1),
            rng: shuffle_seed.map(StdRng::seed_from_u64),
        })
    }

    fn batch_loss(&self, data: &EncodedSplit, rows: &[usize], train: bool) -> Result<Tensor> {
        let (ids, targets) = data.batch_tensors(rows, self.model.device())?;
        let logits = self.model.forward_t(&ids, train)?;
        Ok(multi_head_bce(&logits, &targets)?)
    }
}

impl Trainer for GruTrainer<'_> {
    type Data = EncodedSplit;

    fn train_epoch(&mut self, data: &EncodedSplit) -> Result<f64> {
        if data.is_empty() {
            return Err(TrainingError::EmptySplit("train").into());
        }

        let mut order: Vec<usize> = (0..data.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }

        let mut total = 0.0;
        for rows in order.chunks(self.batch_size) {
            let loss = self.batch_loss(data, rows, true)?;
            self.optimizer.backward_step(&loss)?;
            total += loss.to_scalar::<f32>()? as f64 * rows.len() as f64;
        }

        Ok(total / data.len() as f64)
    }

    fn validation_loss(&self, data: &EncodedSplit) -> Result<f64> {
        if data.is_empty() {
            return Err(TrainingError::EmptySplit("validation").into());
        }

        let rows: Vec<usize> = (0..data.len()).collect();
        let mut total = 0.0;
        for chunk in rows.chunks(self.batch_size) {
            let loss = self.batch_loss(data, chunk, false)?;
            total += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
        }

        Ok(total / data.len() as f64)
    }

    fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.optimizer.set_learning_rate(lr);
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        self.model.save(path)
    }
}

pub fn train(
    model: &VulnModel,
    train_data: &EncodedSplit,
    validation_data: &EncodedSplit,
    config: &TrainingConfig,
    batch_size: usize,
    shuffle_seed: Option<u64>,
) -> Result<TrainingStats> {
    let mut trainer = GruTrainer::new(model, config, batch_size, shuffle_seed)?;
    let mut callbacks: Vec<Box<dyn Callback>> = vec![
        Box::new(ReduceLrOnPlateau::from_config(config)),
        Box::new(ModelCheckpoint::new(&config.checkpoint_path)),
    ];
    fit(
        &mut trainer,
        train_data,
        validation_data,
        config.epochs,
        &mut callbacks,
    )
}
