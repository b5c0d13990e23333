//! # 物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークを使用して、1次元の移流拡散方程式
//! `∂C/∂t = 0.1 · (−∂C/∂x + ∂²C/∂x²)` を解く物理情報ニューラルネットワーク（PINN）の
//! 主要なコンポーネントを提供します。
//!
//! 学習は Adam による確率的な一次最適化のあと、L-BFGS による準ニュートン法の
//! 精緻化を行い、全エポックを通して損失が最小だったパラメータを結果とします。

pub mod analytical;
pub mod cli;
pub mod config;
pub mod error;
pub mod jet;
pub mod model;
pub mod optim;
pub mod pinn;
pub mod plot;
pub mod sampling;
pub mod training;
pub mod validation;

pub use config::TrainingConfig;
pub use error::{PinnError, Result};
pub use jet::{Field, Jet};
pub use model::{LayerValues, Model, ParameterValues};
pub use training::{TrainBackend, Trainer, TrainingReport, TrainingSnapshot};
