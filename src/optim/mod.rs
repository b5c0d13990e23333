//! # 最適化
//!
//! 学習ループはどちらのフェーズでも [`PhaseOptimizer::step`] を呼ぶだけで、
//! 中身が Adam か L-BFGS かは知りません。

pub mod adam;
pub mod lbfgs;

pub use adam::AdamPhase;
pub use lbfgs::{LbfgsOptions, LbfgsPhase, LbfgsResult, minimize};

use crate::error::Result;
use crate::jet::Field;
use crate::model::Model;
use crate::pinn::{BatchTensors, PhysicsLoss};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

/// 1エポック分の目的関数。同じ [`PhysicsLoss`] を固定したバッチ上で評価します。
pub struct Objective<'a, B: Backend> {
    loss: &'a PhysicsLoss<B>,
    batch: &'a BatchTensors<B>,
}

impl<'a, B: Backend> Objective<'a, B> {
    /// 損失とバッチを束ねます。
    pub fn new(loss: &'a PhysicsLoss<B>, batch: &'a BatchTensors<B>) -> Self {
        Self { loss, batch }
    }

    /// `field` での損失を計算します。
    pub fn loss<F: Field<B>>(&self, field: &F) -> Tensor<B, 1> {
        self.loss.total(field, self.batch)
    }

    /// バッチが載っているデバイス。
    pub fn device(&self) -> B::Device {
        self.batch.x.device()
    }
}

/// 1ステップの結果。
///
/// `loss` は `evaluated` のパラメータで測った値です。Adam では更新前、L-BFGS では
/// 精緻化後のパラメータになります。
#[derive(Debug, Clone)]
pub struct StepOutcome<B: Backend> {
    /// 次のエポックで使うモデル
    pub model: Model<B>,
    pub evaluated: Model<B>,
    pub loss: f64,
}

/// 共通の最適化インターフェース。
pub trait PhaseOptimizer<B: AutodiffBackend> {
    fn name(&self) -> &'static str;

    fn step(&mut self, model: Model<B>, objective: &Objective<'_, B>) -> Result<StepOutcome<B>>;
}

pub(crate) fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
