//! # 残差と損失
//!
//! 移流拡散方程式 `∂C/∂t = D · (−∂C/∂x + ∂²C/∂x²)` の残差、初期条件の残差、
//! および時間方向に重み付けした物理損失を計算します。

use crate::config::{Domain, PhysicsConfig, TrainingConfig};
use crate::error::{PinnError, Result};
use crate::jet::{Field, Jet};
use crate::sampling::{Batch, Coordinate, column};
use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// 初期の急峻な変化に勾配を集中させる時間重み `λ(t)`。
///
/// ```text
/// λ(t) = early · (1 − t/b)² + 1                          (t ≤ b)
/// λ(t) = late  · (1 − (t − t_min)/(t_max − t_min))² + 1  (t > b)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWeighting {
    pub breakpoint: f64,
    pub early_weight: f64,
    pub late_weight: f64,
    pub t_min: f64,
    pub t_max: f64,
}

impl TimeWeighting {
    /// 設定から重みの係数を取り出します。
    pub fn new(physics: &PhysicsConfig, domain: &Domain) -> Self {
        Self {
            breakpoint: physics.weight_breakpoint,
            early_weight: physics.early_weight,
            late_weight: physics.late_weight,
            t_min: domain.t_min,
            t_max: domain.t_max,
        }
    }

    /// 時刻 `t` での重み。
    pub fn weight(&self, t: f64) -> f64 {
        if t <= self.breakpoint {
            self.early_weight * (1.0 - t / self.breakpoint).powi(2) + 1.0
        } else {
            let s = (t - self.t_min) / (self.t_max - self.t_min);
            self.late_weight * (1.0 - s).powi(2) + 1.0
        }
    }

    /// 各時刻の重みをまとめて計算します。
    pub fn weights(&self, t: &[f64]) -> Vec<f64> {
        t.iter().map(|&t| self.weight(t)).collect()
    }
}

/// PDE 残差 `u_t − D · (−u_x + u_xx)`。
pub fn pde_residual<B: Backend>(jet: &Jet<B>, diffusion: f64) -> Tensor<B, 2> {
    let spatial = jet.d_xx.clone() - jet.d_x.clone();
    jet.d_t.clone() - spatial.mul_scalar(diffusion)
}

/// バッチに対する2種類の残差。どちらも `[N, 1]`。
#[derive(Debug, Clone)]
pub struct Residuals<B: Backend> {
    pub pde: Tensor<B, 2>,
    pub ic: Tensor<B, 2>,
}

/// 損失の内訳。
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub pde: Tensor<B, 1>,
    pub ic: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

/// デバイス上に載せたミニバッチと、その時間重み。
#[derive(Debug, Clone)]
pub struct BatchTensors<B: Backend> {
    pub x: Tensor<B, 2>,
    pub t: Tensor<B, 2>,
    pub weights: Tensor<B, 2>,
}

/// 物理損失 `mean(λ(t) · r_pde²) + w_ic · mean(r_ic²)`。
///
/// 初期条件点は生成時に一度だけデバイスへ転送し、以後は変更しません。
/// 境界の損失項はありません（左境界はモデルの形で満たされ、右境界は課さない）。
#[derive(Debug, Clone)]
pub struct PhysicsLoss<B: Backend> {
    weighting: TimeWeighting,
    diffusion: f64,
    ic_weight: f64,
    ic_x: Tensor<B, 2>,
    ic_t: Tensor<B, 2>,
}

impl<B: Backend> PhysicsLoss<B> {
    /// 初期条件点をデバイスへ転送して損失を組み立てます。
    pub fn new(config: &TrainingConfig, initial: &[Coordinate], device: &B::Device) -> Result<Self> {
        if initial.is_empty() {
            return Err(PinnError::DegenerateInput("初期条件点が空です".to_string()));
        }
        let ic = Batch::from_coordinates(initial);
        let (ic_x, ic_t) = ic.columns::<B>(device);
        Ok(Self {
            weighting: TimeWeighting::new(&config.physics, &config.domain),
            diffusion: config.physics.diffusion,
            ic_weight: config.physics.ic_weight,
            ic_x,
            ic_t,
        })
    }

    /// 時間重み。
    pub fn weighting(&self) -> &TimeWeighting {
        &self.weighting
    }

    /// バッチをデバイスへ転送し、各点の時間重みを付けます。
    pub fn prepare(&self, batch: &Batch, device: &B::Device) -> Result<BatchTensors<B>> {
        if batch.is_empty() {
            return Err(PinnError::DegenerateInput("空のバッチです".to_string()));
        }
        let (x, t) = batch.columns::<B>(device);
        let weights = column(&self.weighting.weights(&batch.t), device);
        Ok(BatchTensors { x, t, weights })
    }

    /// PDE 残差と初期条件の残差を計算します。
    pub fn residuals<F: Field<B>>(&self, field: &F, batch: &BatchTensors<B>) -> Residuals<B> {
        let jet = field.jet(batch.x.clone(), batch.t.clone());
        Residuals {
            pde: pde_residual(&jet, self.diffusion),
            ic: field.value(self.ic_x.clone(), self.ic_t.clone()),
        }
    }

    /// 損失の各項を計算します。
    pub fn terms<F: Field<B>>(&self, field: &F, batch: &BatchTensors<B>) -> LossTerms<B> {
        let residuals = self.residuals(field, batch);
        let pde = (batch.weights.clone() * residuals.pde.clone() * residuals.pde).mean();
        let target = Tensor::zeros_like(&residuals.ic);
        let ic = MseLoss::new()
            .forward(residuals.ic, target, Reduction::Mean)
            .mul_scalar(self.ic_weight);
        LossTerms {
            total: pde.clone() + ic.clone(),
            pde,
            ic,
        }
    }

    /// 損失の合計。
    pub fn total<F: Field<B>>(&self, field: &F, batch: &BatchTensors<B>) -> Tensor<B, 1> {
        self.terms(field, batch).total
    }
}
