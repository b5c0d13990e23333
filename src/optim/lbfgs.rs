use super::{Objective, PhaseOptimizer, StepOutcome, scalar};
use crate::config::LbfgsConfig;
use crate::error::Result;
use crate::model::Model;
use burn::tensor::backend::AutodiffBackend;
use std::collections::VecDeque;

/// 直線探索（Armijo 条件）の定数
const ARMIJO_C: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
const MAX_LINE_SEARCH: usize = 30;
/// 曲率条件 `sᵀy > CURVATURE_EPS` を満たさない組は履歴に入れない
const CURVATURE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbfgsOptions {
    pub max_iter: usize,
    pub tolerance: f64,
    pub history: usize,
}

impl From<&LbfgsConfig> for LbfgsOptions {
    fn from(config: &LbfgsConfig) -> Self {
        Self {
            max_iter: config.max_iter,
            tolerance: config.tolerance,
            history: config.history,
        }
    }
}

/// 最適化の結果。`x` はこれまでに評価した中で損失が最小の点です。
#[derive(Debug, Clone, PartialEq)]
pub struct LbfgsResult {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// 反復上限までに許容誤差を満たしたかどうか
    pub converged: bool,
}

/// 記憶制限付き BFGS で `f` を最小化します。
///
/// `f` は点 `x` における値と勾配を返します。反復上限に達しても失敗にはせず、
/// `converged = false` のまま最良点を返します。初期点で値が有限でない場合は
/// 何もせずに初期点を返します。
pub fn minimize<F>(mut f: F, x0: Vec<f64>, options: &LbfgsOptions) -> Result<LbfgsResult>
where
    F: FnMut(&[f64]) -> Result<(f64, Vec<f64>)>,
{
    let mut x = x0;
    let (mut fx, mut grad) = f(&x)?;
    let mut evaluations = 1;
    if !fx.is_finite() || !all_finite(&grad) {
        return Ok(LbfgsResult {
            x,
            fun: fx,
            iterations: 0,
            evaluations,
            converged: false,
        });
    }

    let mut history = History::new(options.history);
    let mut best = (x.clone(), fx);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < options.max_iter {
        if norm(&grad) <= options.tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        let mut direction = history.direction(&grad);
        let mut slope = dot(&grad, &direction);
        if slope >= 0.0 || slope.is_nan() {
            // 下降方向でなければ履歴を捨てて最急降下からやり直す
            history.clear();
            direction = grad.iter().map(|g| -g).collect();
            slope = -dot(&grad, &grad);
        }

        // 履歴がないうちは最初の一歩を勾配の大きさで抑える
        let mut alpha = if history.is_empty() {
            (1.0 / norm(&grad)).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_LINE_SEARCH {
            let candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| xi + alpha * di)
                .collect();
            let (f_new, g_new) = f(&candidate)?;
            evaluations += 1;
            if f_new.is_finite() && all_finite(&g_new) && f_new <= fx + ARMIJO_C * alpha * slope {
                accepted = Some((candidate, f_new, g_new));
                break;
            }
            alpha *= BACKTRACK;
        }
        let Some((x_new, f_new, g_new)) = accepted else {
            break;
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&grad).map(|(a, b)| a - b).collect();
        history.push(s, y);

        let decrease = fx - f_new;
        x = x_new;
        fx = f_new;
        grad = g_new;
        if fx < best.1 {
            best = (x.clone(), fx);
        }
        if decrease.abs() <= options.tolerance * fx.abs().max(1.0) {
            converged = true;
            break;
        }
    }

    let (x, fun) = best;
    Ok(LbfgsResult {
        x,
        fun,
        iterations,
        evaluations,
        converged,
    })
}

/// 直近 `m` 組の `(s, y)` を保持する曲率履歴。
struct History {
    capacity: usize,
    pairs: VecDeque<(Vec<f64>, Vec<f64>, f64)>,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pairs: VecDeque::with_capacity(capacity),
        }
    }

    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn clear(&mut self) {
        self.pairs.clear();
    }

    fn push(&mut self, s: Vec<f64>, y: Vec<f64>) {
        let sy = dot(&s, &y);
        if sy <= CURVATURE_EPS {
            return;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((s, y, 1.0 / sy));
    }

    /// 2ループ再帰で `−H·g` を計算します。
    fn direction(&self, grad: &[f64]) -> Vec<f64> {
        let mut q = grad.to_vec();
        let mut alphas = vec![0.0; self.pairs.len()];

        for (i, (s, y, rho)) in self.pairs.iter().enumerate().rev() {
            alphas[i] = rho * dot(s, &q);
            axpy(-alphas[i], y, &mut q);
        }

        // H0 = (sᵀy / yᵀy) I
        if let Some((s, y, _)) = self.pairs.back() {
            let gamma = dot(s, y) / dot(y, y);
            q.iter_mut().for_each(|v| *v *= gamma);
        }

        for (i, (s, y, rho)) in self.pairs.iter().enumerate() {
            let beta = rho * dot(y, &q);
            axpy(alphas[i] - beta, s, &mut q);
        }

        q.iter().map(|v| -v).collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.iter_mut().zip(x).for_each(|(yi, xi)| *yi += alpha * xi);
}

fn all_finite(a: &[f64]) -> bool {
    a.iter().all(|v| v.is_finite())
}

/// フェーズB: エポックごとに L-BFGS の内部反復で局所的に最小化する準ニュートン法。
///
/// Adam と同じ [`Objective`] を、パラメータを1本のベクトルに平らにして最小化します。
#[derive(Debug, Clone)]
pub struct LbfgsPhase {
    options: LbfgsOptions,
}

impl LbfgsPhase {
    /// 反復の設定を受け取ります。
    pub fn new(options: LbfgsOptions) -> Self {
        Self { options }
    }
}

impl<B: AutodiffBackend> PhaseOptimizer<B> for LbfgsPhase {
    fn name(&self) -> &'static str {
        "L-BFGS"
    }

    fn step(&mut self, model: Model<B>, objective: &Objective<'_, B>) -> Result<StepOutcome<B>> {
        let device = objective.device();
        let template = model.to_values()?;

        let result = minimize(
            |flat| {
                let candidate = Model::<B>::from_values(&template.with_flat(flat)?, &device);
                let loss = objective.loss(&candidate);
                let value = scalar(loss.clone());
                let grads = loss.backward();
                Ok((value, candidate.gradient_values(&grads)?))
            },
            template.flatten(),
            &self.options,
        )?;

        if !result.converged {
            tracing::debug!(
                iterations = result.iterations,
                evaluations = result.evaluations,
                loss = result.fun,
                "L-BFGS が許容誤差を満たさずに終了しました"
            );
        }

        let refined = Model::from_values(&template.with_flat(&result.x)?, &device);
        Ok(StepOutcome {
            model: refined.clone(),
            evaluated: refined,
            loss: result.fun,
        })
    }
}
