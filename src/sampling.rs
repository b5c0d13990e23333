//! 学習に使う点集合の生成とミニバッチの抽出。

use crate::config::{Domain, SamplingConfig};
use crate::error::{PinnError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;

/// 時空間上の1点 `(x, t)`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub t: f64,
}

impl Coordinate {
    /// 座標を作ります。
    pub fn new(x: f64, t: f64) -> Self {
        Self { x, t }
    }
}

/// サンプラが生成する点集合。学習中は変更されません。
#[derive(Debug, Clone)]
pub struct PointSets {
    /// 残差を評価するための内部点
    pub collocation: Vec<Coordinate>,
    /// `t = t_min` 上の初期条件点
    pub initial: Vec<Coordinate>,
    pub left_boundary: Vec<Coordinate>,
    pub right_boundary: Vec<Coordinate>,
}

impl PointSets {
    /// 領域内に一様乱数で点を配置します。
    pub fn sample<R: Rng>(domain: &Domain, counts: &SamplingConfig, rng: &mut R) -> Self {
        let collocation = (0..counts.collocation)
            .map(|_| {
                Coordinate::new(
                    rng.random_range(domain.x_min..=domain.x_max),
                    rng.random_range(domain.t_min..=domain.t_max),
                )
            })
            .collect();
        let initial = (0..counts.initial)
            .map(|_| Coordinate::new(rng.random_range(domain.x_min..=domain.x_max), domain.t_min))
            .collect();
        let left_boundary = (0..counts.boundary)
            .map(|_| Coordinate::new(domain.x_min, rng.random_range(domain.t_min..=domain.t_max)))
            .collect();
        let right_boundary = (0..counts.boundary)
            .map(|_| Coordinate::new(domain.x_max, rng.random_range(domain.t_min..=domain.t_max)))
            .collect();

        Self {
            collocation,
            initial,
            left_boundary,
            right_boundary,
        }
    }
}

/// ホスト側のミニバッチ（x 列と t 列）。
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Vec<f64>,
    pub t: Vec<f64>,
}

impl Batch {
    /// 座標の列を x 列と t 列に分けます。
    pub fn from_coordinates(points: &[Coordinate]) -> Self {
        Self {
            x: points.iter().map(|p| p.x).collect(),
            t: points.iter().map(|p| p.t).collect(),
        }
    }

    /// バッチの点数。
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// 点が1つもないかどうか。
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// `[N, 1]` の x 列と t 列をデバイス上に作成します。
    pub fn columns<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (column(&self.x, device), column(&self.t, device))
    }
}

/// 点集合から復元抽出で `size` 点のバッチを作ります。
pub fn draw_batch<R: Rng>(points: &[Coordinate], size: usize, rng: &mut R) -> Result<Batch> {
    if points.is_empty() || size == 0 {
        return Err(PinnError::DegenerateInput(format!(
            "空のバッチは作れません（点数 {}, バッチサイズ {}）",
            points.len(),
            size
        )));
    }
    let drawn: Vec<Coordinate> = (0..size)
        .map(|_| points[rng.random_range(0..points.len())])
        .collect();
    Ok(Batch::from_coordinates(&drawn))
}

/// ホストの値の列を `[N, 1]` のテンソルにします。
pub fn column<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(values.to_vec(), [values.len(), 1]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn sampled_points_respect_the_domain() {
        let domain = Domain {
            x_min: -1.0,
            x_max: 2.0,
            t_min: 0.5,
            t_max: 1.5,
        };
        let counts = SamplingConfig {
            collocation: 500,
            initial: 50,
            boundary: 20,
        };
        let points = PointSets::sample(&domain, &counts, &mut StdRng::seed_from_u64(3));

        assert_eq!(points.collocation.len(), 500);
        assert!(points.collocation.iter().all(|p| {
            (domain.x_min..=domain.x_max).contains(&p.x) && (domain.t_min..=domain.t_max).contains(&p.t)
        }));
        assert!(points.initial.iter().all(|p| p.t == domain.t_min));
        assert!(points.left_boundary.iter().all(|p| p.x == domain.x_min));
        assert!(points.right_boundary.iter().all(|p| p.x == domain.x_max));
    }

    #[test]
    fn batches_draw_with_replacement_and_are_reproducible() {
        let points = vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)];
        let a = draw_batch(&points, 16, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = draw_batch(&points, 16, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert!(a.x.iter().zip(&a.t).all(|(x, t)| x == t));
    }

    #[test]
    fn empty_batches_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(draw_batch(&[], 4, &mut rng), Err(PinnError::DegenerateInput(_))));
        let points = [Coordinate::new(0.5, 0.5)];
        assert!(matches!(draw_batch(&points, 0, &mut rng), Err(PinnError::DegenerateInput(_))));
    }
}
