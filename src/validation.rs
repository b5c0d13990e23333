//! 学習済みモデルを解析解と比較する検証レポート。

use crate::analytical;
use crate::config::Domain;
use crate::error::{PinnError, Result};
use crate::model::{Model, host_values};
use crate::sampling::{Coordinate, column};
use burn::tensor::backend::Backend;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationReport {
    /// 格子全体での解析解との平均二乗誤差
    pub mse: f64,
    /// 決定係数 R²
    pub r2: f64,
    /// `t = t_min` 上での `mean(u²)`
    pub ic_mean_square: f64,
    /// 左境界での `max |u − 1|`
    pub left_boundary_deviation: f64,
    pub grid_points: usize,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MSE: {:.3e}, R²: {:.4}, 初期条件 mean(u²): {:.3e}, 左境界の最大偏差: {:.3e}（格子点 {}）",
            self.mse, self.r2, self.ic_mean_square, self.left_boundary_deviation, self.grid_points
        )
    }
}

/// `[a, b]` を `n` 点で等分割します。
pub fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        _ => (0..n)
            .map(|i| a + (b - a) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// `n × n` の格子と左境界の点でモデルを評価します。`n` は 2 以上が必要です。
pub fn evaluate<B: Backend>(
    model: &Model<B>,
    domain: &Domain,
    diffusion: f64,
    n: usize,
    left_boundary: &[Coordinate],
    device: &B::Device,
) -> Result<ValidationReport> {
    if n < 2 {
        return Err(PinnError::DegenerateInput(format!(
            "検証格子の点数は 2 以上でなければなりません: {n}"
        )));
    }
    let xs = linspace(domain.x_min, domain.x_max, n);
    let ts = linspace(domain.t_min, domain.t_max, n);
    let mut grid_x = Vec::with_capacity(n * n);
    let mut grid_t = Vec::with_capacity(n * n);
    for t in &ts {
        for x in &xs {
            grid_x.push(*x);
            grid_t.push(*t);
        }
    }

    let predicted = predict(model, &grid_x, &grid_t, device)?;
    let exact: Vec<f64> = grid_x
        .iter()
        .zip(&grid_t)
        .map(|(&x, &t)| analytical::solution(x, t, diffusion))
        .collect();
    let (mse, r2) = mse_and_r2(&predicted, &exact);

    let dense_x = linspace(domain.x_min, domain.x_max, 10 * n.max(1));
    let dense_t = vec![domain.t_min; dense_x.len()];
    let ic = predict(model, &dense_x, &dense_t, device)?;
    let ic_mean_square = ic.iter().map(|u| u * u).sum::<f64>() / ic.len().max(1) as f64;

    let left_boundary_deviation = if left_boundary.is_empty() {
        0.0
    } else {
        let bx: Vec<f64> = left_boundary.iter().map(|p| p.x).collect();
        let bt: Vec<f64> = left_boundary.iter().map(|p| p.t).collect();
        predict(model, &bx, &bt, device)?
            .iter()
            .map(|u| (u - 1.0).abs())
            .fold(0.0, f64::max)
    };

    Ok(ValidationReport {
        mse,
        r2,
        ic_mean_square,
        left_boundary_deviation,
        grid_points: grid_x.len(),
    })
}

/// ホストの座標列に対してモデル出力を計算します。
pub fn predict<B: Backend>(model: &Model<B>, x: &[f64], t: &[f64], device: &B::Device) -> Result<Vec<f64>> {
    let u = model.forward(column(x, device), column(t, device));
    host_values(u)
}

/// 平均二乗誤差と決定係数。参照値の分散がゼロのとき R² は残差がなければ 1、あれば −∞ とします。
pub fn mse_and_r2(predicted: &[f64], exact: &[f64]) -> (f64, f64) {
    let n = exact.len().max(1) as f64;
    let ss_res: f64 = predicted
        .iter()
        .zip(exact)
        .map(|(p, e)| (p - e).powi(2))
        .sum();
    let mean = exact.iter().sum::<f64>() / n;
    let ss_tot: f64 = exact.iter().map(|e| (e - mean).powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        f64::NEG_INFINITY
    };
    (ss_res / n, r2)
}
