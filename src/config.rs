//! # 学習設定
//!
//! すべての項目に既定値があり、TOML ファイルでは変更したい項目だけを書けば十分です。
//!
//! ```toml
//! seed = 42
//! epochs_phase_a = 5000
//!
//! [network]
//! hidden_width = 20
//! ```

use crate::error::{PinnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 時空間の計算領域 `[x_min, x_max] × [t_min, t_max]`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Domain {
    pub x_min: f64,
    pub x_max: f64,
    pub t_min: f64,
    pub t_max: f64,
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 1.0,
            t_min: 0.0,
            t_max: 1.0,
        }
    }
}

/// ネットワークの層構成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkShape {
    pub input_width: usize,
    pub hidden_width: usize,
    /// 隠れ層の数
    pub hidden_depth: usize,
    pub output_width: usize,
}

impl Default for NetworkShape {
    fn default() -> Self {
        Self {
            input_width: 2,
            hidden_width: 40,
            hidden_depth: 5,
            output_width: 1,
        }
    }
}

impl NetworkShape {
    /// 入力から出力までの各層の幅を返します（例: `[2, 40, 40, 1]`）。
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.hidden_depth + 2);
        widths.push(self.input_width);
        widths.extend(std::iter::repeat_n(self.hidden_width, self.hidden_depth));
        widths.push(self.output_width);
        widths
    }
}

/// 支配方程式と損失の重みに関する定数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub diffusion: f64,
    pub weight_breakpoint: f64,
    pub early_weight: f64,
    pub late_weight: f64,
    pub ic_weight: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            diffusion: 0.1,
            weight_breakpoint: 0.1,
            early_weight: 200.0,
            late_weight: 20.0,
            ic_weight: 100.0,
        }
    }
}

/// 外部サンプラが生成する点の数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub collocation: usize,
    pub initial: usize,
    pub boundary: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            collocation: 10_000,
            initial: 256,
            boundary: 256,
        }
    }
}

/// L-BFGS（フェーズB）の内部反復の設定。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbfgsConfig {
    pub max_iter: usize,
    pub tolerance: f64,
    pub history: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tolerance: 1e-7,
            history: 10,
        }
    }
}

/// 学習全体の設定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub learning_rate: f64,
    pub epochs_phase_a: usize,
    pub epochs_phase_b: usize,
    pub batch_size: usize,
    /// 何エポックごとに進捗をログ出力するか
    pub log_every: usize,
    /// この回数だけ連続で非有限値が出たら学習を失敗として打ち切る
    pub max_consecutive_nonfinite: usize,
    pub domain: Domain,
    pub network: NetworkShape,
    pub physics: PhysicsConfig,
    pub sampling: SamplingConfig,
    pub lbfgs: LbfgsConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            learning_rate: 1e-3,
            epochs_phase_a: 20_000,
            epochs_phase_b: 250,
            batch_size: 512,
            log_every: 200,
            max_consecutive_nonfinite: 10,
            domain: Domain::default(),
            network: NetworkShape::default(),
            physics: PhysicsConfig::default(),
            sampling: SamplingConfig::default(),
            lbfgs: LbfgsConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// TOML ファイルから設定を読み込み、検証します。
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| PinnError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), "設定ファイルを読み込みました");
        Ok(config)
    }

    /// TOML 文字列から設定を読み込みます。
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 設定を TOML 文字列に変換します。
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 学習を始める前に退化した設定を検出します。
    pub fn validate(&self) -> Result<()> {
        let d = &self.domain;
        let bounds = [d.x_min, d.x_max, d.t_min, d.t_max];
        if bounds.iter().any(|v| !v.is_finite()) {
            return degenerate(format!("領域の端点が有限ではありません: {d:?}"));
        }
        if d.x_max <= d.x_min {
            return degenerate(format!("空間幅がゼロ以下です: [{}, {}]", d.x_min, d.x_max));
        }
        if d.t_max <= d.t_min {
            return degenerate(format!("時間幅がゼロ以下です: [{}, {}]", d.t_min, d.t_max));
        }

        let n = &self.network;
        if n.input_width != 2 {
            return degenerate(format!("入力幅は 2 (x, t) でなければなりません: {}", n.input_width));
        }
        if n.output_width != 1 {
            return degenerate(format!("出力幅は 1 でなければなりません: {}", n.output_width));
        }
        if n.hidden_depth > 0 && n.hidden_width == 0 {
            return degenerate("隠れ層の幅がゼロです".to_string());
        }

        if self.batch_size == 0 {
            return degenerate("バッチサイズがゼロです".to_string());
        }
        if self.sampling.collocation == 0 || self.sampling.initial == 0 {
            return degenerate(format!(
                "コロケーション点または初期条件点が空です: {:?}",
                self.sampling
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return degenerate(format!("学習率が不正です: {}", self.learning_rate));
        }
        if self.epochs_phase_a + self.epochs_phase_b == 0 {
            return degenerate("エポック数の合計がゼロです".to_string());
        }
        if self.max_consecutive_nonfinite == 0 {
            return degenerate("max_consecutive_nonfinite はゼロにできません".to_string());
        }
        if self.lbfgs.history == 0 {
            return degenerate("L-BFGS の履歴長がゼロです".to_string());
        }
        if !(self.lbfgs.tolerance.is_finite() && self.lbfgs.tolerance >= 0.0) {
            return degenerate(format!("L-BFGS の許容誤差が不正です: {}", self.lbfgs.tolerance));
        }

        let p = &self.physics;
        if !(p.diffusion.is_finite() && p.weight_breakpoint.is_finite() && p.weight_breakpoint > 0.0)
        {
            return degenerate(format!("物理定数が不正です: {p:?}"));
        }
        let weights = [p.early_weight, p.late_weight, p.ic_weight];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return degenerate(format!("損失の重みは有限な非負の値でなければなりません: {p:?}"));
        }
        Ok(())
    }
}

fn degenerate(message: String) -> Result<()> {
    Err(PinnError::DegenerateInput(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrainingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.network.widths(), vec![2, 40, 40, 40, 40, 40, 1]);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TrainingConfig::from_toml_str(
            r#"
            seed = 7
            batch_size = 64

            [network]
            hidden_width = 8
            hidden_depth = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.network.widths(), vec![2, 8, 8, 1]);
        assert_eq!(config.physics, PhysicsConfig::default());
        assert_eq!(config.epochs_phase_a, 20_000);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let mut zero_width = TrainingConfig::default();
        zero_width.domain.x_max = zero_width.domain.x_min;
        assert!(matches!(zero_width.validate(), Err(PinnError::DegenerateInput(_))));

        let mut zero_duration = TrainingConfig::default();
        zero_duration.domain.t_max = 0.0;
        assert!(matches!(zero_duration.validate(), Err(PinnError::DegenerateInput(_))));

        let mut no_batch = TrainingConfig::default();
        no_batch.batch_size = 0;
        assert!(matches!(no_batch.validate(), Err(PinnError::DegenerateInput(_))));

        let mut no_points = TrainingConfig::default();
        no_points.sampling.collocation = 0;
        assert!(matches!(no_points.validate(), Err(PinnError::DegenerateInput(_))));

        let mut wrong_input = TrainingConfig::default();
        wrong_input.network.input_width = 3;
        assert!(matches!(wrong_input.validate(), Err(PinnError::DegenerateInput(_))));
    }

    #[test]
    fn loss_weights_must_be_finite_and_non_negative() {
        let mut nan_early = TrainingConfig::default();
        nan_early.physics.early_weight = f64::NAN;
        assert!(matches!(nan_early.validate(), Err(PinnError::DegenerateInput(_))));

        let mut negative_late = TrainingConfig::default();
        negative_late.physics.late_weight = -1.0;
        assert!(matches!(negative_late.validate(), Err(PinnError::DegenerateInput(_))));

        let mut infinite_ic = TrainingConfig::default();
        infinite_ic.physics.ic_weight = f64::INFINITY;
        assert!(matches!(infinite_ic.validate(), Err(PinnError::DegenerateInput(_))));

        let mut no_ic = TrainingConfig::default();
        no_ic.physics.ic_weight = 0.0;
        no_ic.validate().unwrap();
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = TrainingConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(TrainingConfig::from_toml_str(&text).unwrap(), config);
    }
}
