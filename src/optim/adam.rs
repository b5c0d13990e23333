use super::{Objective, PhaseOptimizer, StepOutcome, scalar};
use crate::error::Result;
use crate::model::Model;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;

/// フェーズA: ミニバッチごとに1回だけ更新する一次の確率的最適化。
///
/// モーメントなどの内部状態は `optim` が持ち、このフェーズが終わると一緒に破棄されます。
pub struct AdamPhase<O> {
    optim: O,
    learning_rate: f64,
}

impl<O> AdamPhase<O> {
    /// `optim` には通常 `AdamConfig::new().init()` を渡します。
    pub fn new(optim: O, learning_rate: f64) -> Self {
        Self {
            optim,
            learning_rate,
        }
    }
}

impl<B, O> PhaseOptimizer<B> for AdamPhase<O>
where
    B: AutodiffBackend,
    O: Optimizer<Model<B>, B>,
{
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn step(&mut self, model: Model<B>, objective: &Objective<'_, B>) -> Result<StepOutcome<B>> {
        let loss = objective.loss(&model);
        let loss_value = scalar(loss.clone());
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        let next = self.optim.step(self.learning_rate, model.clone(), grads);
        Ok(StepOutcome {
            model: next,
            evaluated: model,
            loss: loss_value,
        })
    }
}
