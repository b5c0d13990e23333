//! # 物理情報ニューラルネットワーク (PINN) プログラム
//!
//! 1次元の移流拡散方程式を PINN で解き、解析解と比較します。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train
//! cargo run --release -- train --config pinn.toml --epochs-phase-a 5000
//! ```
//!
//! ### 設定の確認
//! ```bash
//! cargo run --release -- config --config pinn.toml
//! ```
//!
//! ログの詳細度は `RUST_LOG` で変更できます（既定は `info`）。

use advection_pinn::TrainBackend;
use advection_pinn::cli::{Cli, Commands, TrainArgs, load_config};
use advection_pinn::plot::plot_loss_history;
use advection_pinn::{training, validation};
use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

/// `train`サブコマンドを実行します。
///
/// 学習、解析解による検証、損失グラフの描画を行います。
fn run_training(args: &TrainArgs) -> Result<()> {
    let config = args.resolve().context("設定の読み込みに失敗しました")?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let (points, report) = training::run(&config, &mut rng).context("学習に失敗しました")?;
    if report.improved {
        info!("{report}");
    } else {
        warn!("{report}");
    }
    if report.nonfinite_epochs > 0 {
        warn!(epochs = report.nonfinite_epochs, "非有限値のため破棄したエポックがあります");
    }

    let device = Default::default();
    let model = report.model::<TrainBackend>(&device)?.valid();
    let validation = validation::evaluate(
        &model,
        &config.domain,
        config.physics.diffusion,
        args.grid,
        &points.left_boundary,
        &device,
    )?;
    info!("=> 検証結果: {validation}");

    if !args.no_plot {
        match plot_loss_history(&report.loss_record, report.phase_b_start, &args.plot) {
            Ok(()) => info!(path = %args.plot.display(), "=> 損失グラフを保存しました"),
            Err(e) => warn!("グラフの描画に失敗しました: {e}"),
        }
    }
    Ok(())
}

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`train`または`config`の処理に振り分けます。
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Train(args) => run_training(args),
        Commands::Config(args) => {
            let config = load_config(args.config.as_ref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
