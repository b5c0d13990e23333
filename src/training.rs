use crate::config::TrainingConfig;
use crate::error::{PinnError, Result};
use crate::model::{Model, ParameterValues};
use crate::optim::{AdamPhase, LbfgsOptions, LbfgsPhase, Objective, PhaseOptimizer};
use crate::pinn::PhysicsLoss;
use crate::sampling::{PointSets, draw_batch};
use burn::backend::{Autodiff, NdArray};
use burn::optim::AdamConfig;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// 学習に使うバックエンド。L-BFGS の直線探索の精度のため f64 を使います。
pub type TrainBackend = Autodiff<NdArray<f64>>;

/// 学習の状態。`Init → FirstOrder → QuasiNewton → Done` の順にだけ進みます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    FirstOrder,
    QuasiNewton,
    Done,
}

/// これまでで最も損失が小さかった時点の記録。
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSnapshot {
    pub epoch: usize,
    pub loss: f64,
    pub params: ParameterValues,
}

/// 両フェーズを通した `(epoch, loss)` の追記専用の記録。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossRecord {
    entries: Vec<(usize, f64)>,
}

impl LossRecord {
    /// 1エポック分の損失を追記します。
    pub fn push(&mut self, epoch: usize, loss: f64) {
        self.entries.push((epoch, loss));
    }

    /// 記録した `(epoch, loss)` の列。
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// 記録したエポック数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// まだ1エポックも記録していないかどうか。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 最良モデルの追跡。
///
/// [`BestModelTracker::observe`] だけがスナップショットを書き換えます。損失が
/// 厳密に小さくなったときにだけ、パラメータの値のコピーを保持します。
#[derive(Debug, Clone, Default)]
pub struct BestModelTracker {
    best: Option<TrainingSnapshot>,
    first_epoch: Option<usize>,
    trajectory: Vec<(usize, f64)>,
}

impl BestModelTracker {
    /// 空の追跡器を作ります。
    pub fn new() -> Self {
        Self::default()
    }

    /// 損失を記録し、改善していれば `params` を呼んでスナップショットを更新します。
    ///
    /// 更新した場合は `true` を返します。
    pub fn observe<F>(&mut self, epoch: usize, loss: f64, params: F) -> Result<bool>
    where
        F: FnOnce() -> Result<ParameterValues>,
    {
        self.first_epoch.get_or_insert(epoch);
        let improved = self.best.as_ref().is_none_or(|best| loss < best.loss);
        if improved {
            self.best = Some(TrainingSnapshot {
                epoch,
                loss,
                params: params()?,
            });
        }
        if let Some(best) = &self.best {
            self.trajectory.push((epoch, best.loss));
        }
        Ok(improved)
    }

    /// 現在の最良スナップショット。
    pub fn best(&self) -> Option<&TrainingSnapshot> {
        self.best.as_ref()
    }

    /// 各エポック終了時点での最良損失。
    pub fn trajectory(&self) -> &[(usize, f64)] {
        &self.trajectory
    }

    /// 最初のエポックより後に一度でも改善したかどうか。
    pub fn improved_after_first(&self) -> bool {
        match (&self.best, self.first_epoch) {
            (Some(best), Some(first)) => best.epoch > first,
            _ => false,
        }
    }
}

/// 学習の最終結果。
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub snapshot: Option<TrainingSnapshot>,
    pub loss_record: LossRecord,
    pub best_trajectory: Vec<(usize, f64)>,
    pub improved: bool,
    /// フェーズBの最初のエポック番号
    pub phase_b_start: usize,
    pub nonfinite_epochs: usize,
    /// 学習を終えた時点の状態
    pub phase: Phase,
    /// 状態遷移の履歴 `(遷移先, その時点のエポック番号)`
    pub transitions: Vec<(Phase, usize)>,
}

impl TrainingReport {
    /// 最良スナップショットからモデルを復元します。
    pub fn model<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Model<B>> {
        let snapshot = self.snapshot.as_ref().ok_or(PinnError::NoFiniteSnapshot)?;
        Ok(Model::from_values(&snapshot.params, device))
    }
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.snapshot {
            None => write!(f, "学習失敗: 有効なスナップショットが記録されませんでした"),
            Some(best) if !self.improved => write!(
                f,
                "学習失敗: 最初のエポック {} の損失 {:.6e} を一度も下回りませんでした",
                best.epoch, best.loss
            ),
            Some(best) => write!(
                f,
                "最良エポック: {}, 最良損失: {:.6e}（記録 {} エポック）",
                best.epoch,
                best.loss,
                self.loss_record.len()
            ),
        }
    }
}

/// 2フェーズの学習ループ。
///
/// 乱数源は呼び出し側から受け取り、バッチの抽出にだけ使います。同じシードと
/// 設定からは同じパラメータの軌跡が得られます。
pub struct Trainer<'p, B: AutodiffBackend, R: Rng> {
    config: TrainingConfig,
    points: &'p PointSets,
    loss: PhysicsLoss<B>,
    device: B::Device,
    rng: R,
    phase: Phase,
    epoch: usize,
    record: LossRecord,
    tracker: BestModelTracker,
    nonfinite_streak: usize,
    nonfinite_epochs: usize,
    phase_b_start: usize,
    transitions: Vec<(Phase, usize)>,
}

impl<'p, B: AutodiffBackend, R: Rng> Trainer<'p, B, R> {
    /// 設定を検証し、初期条件点をデバイスへ載せた学習器を作ります。
    pub fn new(config: &TrainingConfig, points: &'p PointSets, rng: R, device: &B::Device) -> Result<Self> {
        config.validate()?;
        if points.collocation.is_empty() {
            return Err(PinnError::DegenerateInput("コロケーション点が空です".to_string()));
        }
        Ok(Self {
            config: config.clone(),
            points,
            loss: PhysicsLoss::new(config, &points.initial, device)?,
            device: device.clone(),
            rng,
            phase: Phase::Init,
            epoch: 0,
            record: LossRecord::default(),
            tracker: BestModelTracker::new(),
            nonfinite_streak: 0,
            nonfinite_epochs: 0,
            phase_b_start: 0,
            transitions: Vec::new(),
        })
    }

    /// 現在の状態。
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 次の状態へ進みます。前の状態へ戻ることはありません。
    fn enter(&mut self, phase: Phase) {
        debug_assert!(phase > self.phase);
        info!(from = ?self.phase, to = ?phase, epoch = self.epoch, "状態を遷移します");
        self.phase = phase;
        self.transitions.push((phase, self.epoch));
    }

    /// フェーズA（Adam）とフェーズB（L-BFGS）を順に実行します。
    pub fn fit(mut self, model: Model<B>) -> Result<TrainingReport> {
        let training_start = Instant::now();

        self.enter(Phase::FirstOrder);
        let mut adam = AdamPhase::new(AdamConfig::new().init::<B, Model<B>>(), self.config.learning_rate);
        let model = self.run_phase(model, &mut adam, self.config.epochs_phase_a)?;
        drop(adam);

        self.phase_b_start = self.epoch;
        self.enter(Phase::QuasiNewton);
        let mut lbfgs = LbfgsPhase::new(LbfgsOptions::from(&self.config.lbfgs));
        self.run_phase(model, &mut lbfgs, self.config.epochs_phase_b)?;

        self.enter(Phase::Done);
        info!(elapsed = ?training_start.elapsed(), "学習が完了しました");
        Ok(self.into_report())
    }

    /// 現在までの記録をまとめます。
    pub fn into_report(self) -> TrainingReport {
        TrainingReport {
            improved: self.tracker.improved_after_first(),
            best_trajectory: self.tracker.trajectory().to_vec(),
            snapshot: self.tracker.best().cloned(),
            loss_record: self.record,
            phase_b_start: self.phase_b_start,
            nonfinite_epochs: self.nonfinite_epochs,
            phase: self.phase,
            transitions: self.transitions,
        }
    }

    /// 1つのフェーズを `epochs` エポック実行します。エポック番号はフェーズをまたいで通しです。
    ///
    /// 非有限値が出たエポックは更新を破棄して直前のモデルを使い続けます。
    /// `max_consecutive_nonfinite` 回連続した場合は [`PinnError::NumericInstability`] を返します。
    pub fn run_phase<O: PhaseOptimizer<B>>(
        &mut self,
        mut model: Model<B>,
        optimizer: &mut O,
        epochs: usize,
    ) -> Result<Model<B>> {
        info!(optimizer = optimizer.name(), epochs, start = self.epoch, "フェーズを開始します");
        for _ in 0..epochs {
            let epoch = self.epoch;
            self.epoch += 1;

            let batch = draw_batch(&self.points.collocation, self.config.batch_size, &mut self.rng)?;
            let tensors = self.loss.prepare(&batch, &self.device)?;
            let objective = Objective::new(&self.loss, &tensors);
            let outcome = optimizer.step(model.clone(), &objective)?;
            self.record.push(epoch, outcome.loss);

            let next_values = outcome.model.to_values()?;
            if !outcome.loss.is_finite() || !next_values.is_finite() {
                self.nonfinite_streak += 1;
                self.nonfinite_epochs += 1;
                warn!(
                    epoch,
                    loss = outcome.loss,
                    consecutive = self.nonfinite_streak,
                    "非有限値を検出したため、このエポックの更新を破棄します"
                );
                if self.nonfinite_streak >= self.config.max_consecutive_nonfinite {
                    return Err(PinnError::NumericInstability {
                        epoch,
                        consecutive: self.nonfinite_streak,
                    });
                }
                continue;
            }
            self.nonfinite_streak = 0;

            let evaluated = outcome.evaluated;
            self.tracker
                .observe(epoch, outcome.loss, || evaluated.to_values())?;
            model = outcome.model;

            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                let best = self.tracker.best().map_or(f64::NAN, |b| b.loss);
                info!(epoch, loss = outcome.loss, best, "[{}] 学習中", optimizer.name());
            }
        }
        Ok(model)
    }
}

/// 設定から点集合を生成し、モデルを初期化して学習します。
///
/// 乱数は点のサンプリング、パラメータの初期化、バッチの抽出の順に同じ `rng` から取ります。
pub fn run<R: Rng>(config: &TrainingConfig, rng: &mut R) -> Result<(PointSets, TrainingReport)> {
    config.validate()?;
    let device = Default::default();
    let points = PointSets::sample(&config.domain, &config.sampling, rng);
    let model = Model::<TrainBackend>::init(&config.network, rng, &device)?;
    info!(
        widths = ?model.widths(),
        collocation = points.collocation.len(),
        initial = points.initial.len(),
        "学習を開始します (移流拡散方程式) - バックエンド: NdArray<f64> (CPU)"
    );
    let report = Trainer::<TrainBackend, _>::new(config, &points, &mut *rng, &device)?.fit(model)?;
    Ok((points, report))
}
