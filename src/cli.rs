use crate::config::TrainingConfig;
use crate::error::{PinnError, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "A physics-informed neural network for 1-D advection-diffusion with Burn", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（train または config）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PINNモデルを学習し、解析解との誤差と損失グラフを出力します
    Train(TrainArgs),
    /// 有効な設定を TOML 形式で表示します
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// 設定ファイル（TOML）
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// 設定ファイル（TOML）
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub epochs_phase_a: Option<usize>,
    #[arg(long)]
    pub epochs_phase_b: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub learning_rate: Option<f64>,
    /// 検証に使う格子の一辺の点数
    #[arg(long, default_value_t = 100)]
    pub grid: usize,
    /// 損失グラフの出力先
    #[arg(long, default_value = "loss_graph.png")]
    pub plot: PathBuf,
    /// 損失グラフを出力しない
    #[arg(long)]
    pub no_plot: bool,
}

/// 設定ファイル（なければ既定値）を読み込みます。
pub fn load_config(path: Option<&PathBuf>) -> Result<TrainingConfig> {
    match path {
        Some(path) => TrainingConfig::load_from_file(path),
        None => Ok(TrainingConfig::default()),
    }
}

impl TrainArgs {
    /// 設定ファイルにコマンドラインの指定を上書きし、検証した設定を返します。
    pub fn resolve(&self) -> Result<TrainingConfig> {
        if self.grid < 2 {
            return Err(PinnError::DegenerateInput(format!(
                "検証格子の点数は 2 以上でなければなりません: {}",
                self.grid
            )));
        }
        let mut config = load_config(self.config.as_ref())?;
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(epochs) = self.epochs_phase_a {
            config.epochs_phase_a = epochs;
        }
        if let Some(epochs) = self.epochs_phase_b {
            config.epochs_phase_b = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        config.validate()?;
        Ok(config)
    }
}
