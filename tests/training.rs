mod common;

use advection_pinn::config::TrainingConfig;
use advection_pinn::error::{PinnError, Result};
use advection_pinn::model::Model;
use advection_pinn::optim::{AdamPhase, Objective, PhaseOptimizer, StepOutcome};
use advection_pinn::pinn::PhysicsLoss;
use advection_pinn::sampling::{Batch, PointSets};
use advection_pinn::training::{
    self, BestModelTracker, LossRecord, Phase, TrainBackend, Trainer, TrainingReport, TrainingSnapshot,
};
use advection_pinn::validation;
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use common::{TestBackend, affine_model, device, quick_config, small_model};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn quick_run(seed: u64) -> (PointSets, advection_pinn::TrainingReport) {
    let mut config = quick_config();
    config.seed = seed;
    training::run(&config, &mut StdRng::seed_from_u64(config.seed)).unwrap()
}

#[test]
fn both_phases_share_one_epoch_numbering() {
    let config = quick_config();
    let (_, report) = quick_run(0);

    let epochs: Vec<usize> = report.loss_record.entries().iter().map(|e| e.0).collect();
    let expected: Vec<usize> = (0..config.epochs_phase_a + config.epochs_phase_b).collect();
    assert_eq!(epochs, expected);
    assert_eq!(report.phase_b_start, config.epochs_phase_a);
    assert_eq!(report.nonfinite_epochs, 0);
}

#[test]
fn finished_run_walks_every_phase_in_order() {
    let config = quick_config();
    let (_, report) = quick_run(0);

    assert_eq!(report.phase, Phase::Done);
    let total = config.epochs_phase_a + config.epochs_phase_b;
    assert_eq!(
        report.transitions,
        vec![
            (Phase::FirstOrder, 0),
            (Phase::QuasiNewton, config.epochs_phase_a),
            (Phase::Done, total),
        ]
    );
}

#[test]
fn best_loss_never_increases() {
    let (_, report) = quick_run(1);
    assert_eq!(report.best_trajectory.len(), report.loss_record.len());
    for pair in report.best_trajectory.windows(2) {
        assert!(pair[1].1 <= pair[0].1, "{pair:?}");
    }

    let snapshot = report.snapshot.as_ref().unwrap();
    let min = report
        .loss_record
        .entries()
        .iter()
        .map(|e| e.1)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(snapshot.loss, min);
    assert_eq!(report.loss_record.entries()[snapshot.epoch].1, snapshot.loss);
    assert!(snapshot.params.is_finite());
    assert!(report.improved);
    assert!(report.to_string().starts_with("最良エポック"));
}

#[test]
fn same_seed_reproduces_the_trajectory() {
    let (_, a) = quick_run(5);
    let (_, b) = quick_run(5);
    let (_, c) = quick_run(6);
    assert_eq!(a.loss_record, b.loss_record);
    assert_eq!(a.snapshot, b.snapshot);
    assert_ne!(a.loss_record, c.loss_record);
}

#[test]
fn training_reduces_the_loss() {
    let (_, report) = quick_run(2);
    let first = report.loss_record.entries()[0].1;
    let best = report.snapshot.as_ref().unwrap().loss;
    assert!(best < first, "best {best} >= first {first}");
}

#[test]
fn restored_model_keeps_the_left_boundary() {
    let (points, report) = quick_run(3);
    let model = report.model::<TrainBackend>(&device()).unwrap().valid();
    let config = quick_config();
    let result = validation::evaluate(
        &model,
        &config.domain,
        config.physics.diffusion,
        10,
        &points.left_boundary,
        &device(),
    )
    .unwrap();
    assert!(result.left_boundary_deviation < 1e-12);
    assert_eq!(result.grid_points, 100);
    assert!(result.mse.is_finite() && result.r2.is_finite());

    let single = validation::evaluate(
        &model,
        &config.domain,
        config.physics.diffusion,
        1,
        &points.left_boundary,
        &device(),
    );
    assert!(matches!(single, Err(PinnError::DegenerateInput(_))));
}

#[test]
fn degenerate_config_fails_before_training() {
    let mut config = quick_config();
    config.batch_size = 0;
    let result = training::run(&config, &mut StdRng::seed_from_u64(0));
    assert!(matches!(result, Err(PinnError::DegenerateInput(_))));

    let mut config = quick_config();
    config.domain.t_max = config.domain.t_min;
    let result = training::run(&config, &mut StdRng::seed_from_u64(0));
    assert!(matches!(result, Err(PinnError::DegenerateInput(_))));
}

#[test]
fn tracker_replaces_only_on_strict_improvement() {
    let values = small_model(0, 4, 1).to_values().unwrap();
    let mut tracker = BestModelTracker::new();
    let losses = [3.0, 2.0, 2.0, 5.0, 1.0];
    let improved: Vec<bool> = losses
        .iter()
        .enumerate()
        .map(|(epoch, &loss)| tracker.observe(epoch, loss, || Ok(values.clone())).unwrap())
        .collect();

    assert_eq!(improved, vec![true, true, false, false, true]);
    assert_eq!(tracker.best().unwrap().epoch, 4);
    let trajectory: Vec<f64> = tracker.trajectory().iter().map(|e| e.1).collect();
    assert_eq!(trajectory, vec![3.0, 2.0, 2.0, 2.0, 1.0]);
    assert!(tracker.improved_after_first());
}

#[test]
fn tracker_flags_a_run_that_never_beats_its_first_epoch() {
    let values = small_model(0, 4, 1).to_values().unwrap();
    let mut tracker = BestModelTracker::new();
    for (epoch, loss) in [1.0, 1.0, 4.0].into_iter().enumerate() {
        tracker.observe(epoch, loss, || Ok(values.clone())).unwrap();
    }
    assert_eq!(tracker.best().unwrap().epoch, 0);
    assert!(!tracker.improved_after_first());
}

#[test]
fn report_states_when_the_first_epoch_was_never_beaten() {
    let params = small_model(0, 4, 1).to_values().unwrap();
    let mut report = TrainingReport {
        snapshot: Some(TrainingSnapshot {
            epoch: 0,
            loss: 1.5,
            params,
        }),
        loss_record: LossRecord::default(),
        best_trajectory: vec![(0, 1.5), (1, 1.5)],
        improved: false,
        phase_b_start: 1,
        nonfinite_epochs: 0,
        phase: Phase::Done,
        transitions: Vec::new(),
    };
    assert!(report.to_string().starts_with("学習失敗: 最初のエポック 0 "), "{report}");

    report.improved = true;
    assert!(report.to_string().starts_with("最良エポック: 0"), "{report}");
    assert!(report.model::<TestBackend>(&device()).is_ok());
}

#[test]
fn report_without_snapshot_has_no_model() {
    let report = TrainingReport {
        snapshot: None,
        loss_record: LossRecord::default(),
        best_trajectory: Vec::new(),
        improved: false,
        phase_b_start: 0,
        nonfinite_epochs: 3,
        phase: Phase::FirstOrder,
        transitions: vec![(Phase::FirstOrder, 0)],
    };
    assert!(report.to_string().starts_with("学習失敗: 有効なスナップショット"), "{report}");
    assert!(matches!(
        report.model::<TestBackend>(&device()),
        Err(PinnError::NoFiniteSnapshot)
    ));
}

#[test]
fn adam_leaves_parameters_alone_when_the_gradient_vanishes() {
    let (mut config, points) = trainer_inputs();
    config.physics.ic_weight = 0.0;
    let loss = PhysicsLoss::<TestBackend>::new(&config, &points.initial, &device()).unwrap();
    let batch = Batch::from_coordinates(&points.collocation[..32]);
    let tensors = loss.prepare(&batch, &device()).unwrap();
    let objective = Objective::new(&loss, &tensors);

    // u ≡ 1 なので残差も勾配も厳密にゼロ
    let model = affine_model(0.0, 0.0, 1.0);
    let before = model.to_values().unwrap();
    let mut adam = AdamPhase::new(
        AdamConfig::new().init::<TestBackend, Model<TestBackend>>(),
        config.learning_rate,
    );
    let outcome = adam.step(model, &objective).unwrap();

    assert_eq!(outcome.loss, 0.0);
    assert_eq!(outcome.model.to_values().unwrap(), before);
    assert_eq!(outcome.evaluated.to_values().unwrap(), before);
}

/// 指定したエポックでだけ NaN を返す最適化器。
struct Flaky {
    nan_steps: Vec<usize>,
    calls: usize,
}

impl PhaseOptimizer<TestBackend> for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn step(
        &mut self,
        model: Model<TestBackend>,
        _objective: &Objective<'_, TestBackend>,
    ) -> Result<StepOutcome<TestBackend>> {
        let call = self.calls;
        self.calls += 1;
        let loss = if self.nan_steps.contains(&call) {
            f64::NAN
        } else {
            10.0 - call as f64
        };
        Ok(StepOutcome {
            model: model.clone(),
            evaluated: model,
            loss,
        })
    }
}

fn trainer_inputs() -> (TrainingConfig, PointSets) {
    let config = quick_config();
    let points = PointSets::sample(&config.domain, &config.sampling, &mut StdRng::seed_from_u64(0));
    (config, points)
}

#[test]
fn isolated_non_finite_epochs_are_skipped() {
    let (config, points) = trainer_inputs();
    let mut trainer =
        Trainer::<TestBackend, _>::new(&config, &points, StdRng::seed_from_u64(1), &device()).unwrap();
    assert_eq!(trainer.phase(), Phase::Init);

    let mut optimizer = Flaky {
        nan_steps: vec![2, 3],
        calls: 0,
    };
    trainer.run_phase(small_model(0, 4, 1), &mut optimizer, 6).unwrap();
    let report = trainer.into_report();

    assert_eq!(report.loss_record.len(), 6);
    assert_eq!(report.nonfinite_epochs, 2);
    assert_eq!(report.best_trajectory.len(), 4);
    let snapshot = report.snapshot.unwrap();
    assert_eq!((snapshot.epoch, snapshot.loss), (5, 5.0));
}

#[test]
fn persistent_non_finite_epochs_stop_the_run() {
    let (mut config, points) = trainer_inputs();
    config.max_consecutive_nonfinite = 3;
    let mut trainer =
        Trainer::<TestBackend, _>::new(&config, &points, StdRng::seed_from_u64(1), &device()).unwrap();
    let mut optimizer = Flaky {
        nan_steps: vec![1, 2, 3, 4, 5],
        calls: 0,
    };
    let result = trainer.run_phase(small_model(0, 4, 1), &mut optimizer, 10);
    assert!(matches!(
        result,
        Err(PinnError::NumericInstability {
            epoch: 3,
            consecutive: 3
        })
    ));
}

/// 論文設定どおりの長時間の学習。`cargo test --release -- --ignored` で実行します。
#[test]
#[ignore]
fn full_scenario_matches_the_analytical_solution() {
    let config = TrainingConfig::default();
    let (points, report) = training::run(&config, &mut StdRng::seed_from_u64(config.seed)).unwrap();
    assert!(report.improved);

    let model = report.model::<TrainBackend>(&device()).unwrap().valid();
    let result = validation::evaluate(
        &model,
        &config.domain,
        config.physics.diffusion,
        100,
        &points.left_boundary,
        &device(),
    )
    .unwrap();
    assert!(result.mse < 1e-2, "{result}");
    assert!(result.r2 > 0.9, "{result}");
    assert!(result.ic_mean_square < 1e-3, "{result}");
}
