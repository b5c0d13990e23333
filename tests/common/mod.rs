//! 結合テスト共通のヘルパー

#![allow(dead_code)]

use advection_pinn::config::{NetworkShape, TrainingConfig};
use advection_pinn::model::{LayerValues, Model, ParameterValues};
use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub type TestBackend = Autodiff<NdArray<f64>>;
pub type Device = <TestBackend as burn::tensor::backend::Backend>::Device;

pub fn device() -> Device {
    Default::default()
}

/// 乱数で初期化した小さなモデル `[2, width × depth, 1]`。
pub fn small_model(seed: u64, width: usize, depth: usize) -> Model<TestBackend> {
    let shape = NetworkShape {
        input_width: 2,
        hidden_width: width,
        hidden_depth: depth,
        output_width: 1,
    };
    Model::init(&shape, &mut StdRng::seed_from_u64(seed), &device()).unwrap()
}

/// 隠れ層なし、`base = a·x + b·t + c` となる1層のモデル。
pub fn affine_model(a: f64, b: f64, c: f64) -> Model<TestBackend> {
    let values = ParameterValues::new(vec![LayerValues {
        inputs: 2,
        outputs: 1,
        weight: vec![a, b],
        bias: vec![c],
    }])
    .unwrap();
    Model::from_values(&values, &device())
}

/// 数秒で終わる学習設定。
pub fn quick_config() -> TrainingConfig {
    let mut config = TrainingConfig::default();
    config.network.hidden_width = 8;
    config.network.hidden_depth = 2;
    config.sampling.collocation = 400;
    config.sampling.initial = 32;
    config.sampling.boundary = 16;
    config.batch_size = 64;
    config.epochs_phase_a = 40;
    config.epochs_phase_b = 3;
    config.lbfgs.max_iter = 10;
    config.log_every = 0;
    config
}

pub fn column(values: &[f64]) -> Tensor<TestBackend, 2> {
    advection_pinn::sampling::column(values, &device())
}

pub fn to_vec(tensor: Tensor<TestBackend, 2>) -> Vec<f64> {
    tensor.into_data().convert::<f64>().to_vec::<f64>().unwrap()
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64, message: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance * (1.0 + expected.abs()),
        "{message}: {actual} と {expected} の差 {diff} が許容誤差 {tolerance} を超えています"
    );
}
