//! コマンドラインからの実行 (乱数の初期化、モデルの構築、学習・テストの振り分け)。

use crate::checkpoint::{self, CheckpointManager};
use crate::cli::Cli;
use crate::config::RunConfig;
use crate::dataset::KfDataset;
use crate::error::Result;
use crate::evaluation::evaluate;
use crate::loader::LoaderConfig;
use crate::losses::LpLossConfig;
use crate::metrics::{JsonlTracker, LogRecord, MetricTracker, NullTracker, plot_loss_history};
use crate::model::Fno3d;
use crate::scheduler::MultiStepLrConfig;
use crate::training::Trainer;
use burn::backend::{Autodiff, NdArray};
use burn::data::dataset::Dataset;
use burn::module::Module;
use burn::optim::AdamConfig;
use burn::prelude::Backend;
use rand::Rng;
use std::path::Path;
use tracing::{info, warn};

pub type TrainBackend = Autodiff<NdArray<f32>>;
pub type EvalBackend = NdArray<f32>;

/// バックエンドの乱数 (パラメータ初期化) を初期化します。
///
/// データのシャッフルは同じシードを `LoaderConfig::shuffle` に渡して再現します。
pub fn seed_everything<B: Backend>(seed: u64) {
    B::seed(seed);
}

/// CLI 引数に従って学習またはテストを実行します。
pub fn run(cli: &Cli) -> Result<()> {
    let mut config = RunConfig::load(&cli.config)?;
    let seed = cli
        .seed
        .unwrap_or_else(|| rand::rng().random_range(0..100_000));
    config.seed = Some(seed);
    info!("乱数シード: {seed}");

    if cli.test {
        run_test(&mut config, cli.ckpt.as_deref())?;
    } else {
        run_train(
            &mut config,
            cli.ckpt.as_deref(),
            cli.log,
            Path::new(crate::EXP_DIR),
        )?;
    }
    info!("完了しました。");
    Ok(())
}

/// 設定から FNO3d を構築し、パラメータ数を設定に書き込みます。
fn build_model<B: Backend>(
    config: &mut RunConfig,
    ckpt: Option<&Path>,
    device: &B::Device,
) -> Result<Fno3d<B>> {
    let mut model = config.model.fno3d().init::<B>(device);
    let num_params = model.num_params();
    config.num_params = Some(num_params);
    info!("パラメータ数: {num_params}");

    if let Some(path) = ckpt {
        model = checkpoint::load_model(model, path, device)?;
        info!("=> 重みを '{}' から読み込みました。", path.display());
    }
    Ok(model)
}

fn seed_of(config: &RunConfig) -> u64 {
    config.seed.unwrap_or_default()
}

/// テストデータでの平均相対 L2 誤差を計算します。
pub fn run_test(config: &mut RunConfig, ckpt: Option<&Path>) -> Result<f64> {
    let device = Default::default();
    seed_everything::<EvalBackend>(seed_of(config));
    let model = build_model::<EvalBackend>(config, ckpt, &device)?;

    let dataset = KfDataset::load(&config.test_dataset())?;
    info!("テストサンプル数: {}", dataset.len());
    let loader = LoaderConfig::new(config.test.batchsize)
        .with_num_workers(config.data.num_workers)
        .init::<EvalBackend>(dataset, &device);

    let criterion = LpLossConfig::new().init();
    let error = evaluate(&model, &loader, &criterion);
    info!("=> テストデータの平均相対L2誤差: {error:.5}");
    Ok(error)
}

/// モデルを学習し、`exp_dir/<logdir>` にチェックポイントと損失グラフを書き出します。
pub fn run_train(
    config: &mut RunConfig,
    ckpt: Option<&Path>,
    log: bool,
    exp_dir: &Path,
) -> Result<Vec<LogRecord>> {
    let device = Default::default();
    let seed = seed_of(config);
    seed_everything::<TrainBackend>(seed);
    let model = build_model::<TrainBackend>(config, ckpt, &device)?;
    let config = &*config;

    let train_set = KfDataset::load(&config.train_dataset())?;
    let val_set = KfDataset::load(&config.test_dataset())?;
    info!(
        "学習サンプル数: {}, 検証サンプル数: {}",
        train_set.len(),
        val_set.len()
    );
    let train_loader = LoaderConfig::new(config.train.batchsize)
        .with_num_workers(config.data.num_workers)
        .with_shuffle(config.data.shuffle.then_some(seed))
        .init::<TrainBackend>(train_set, &device);
    let val_loader = LoaderConfig::new(config.test.batchsize)
        .with_num_workers(config.data.num_workers)
        .init::<EvalBackend>(val_set, &device);

    let mut optim = AdamConfig::new().init::<TrainBackend, Fno3d<TrainBackend>>();
    if let Some(path) = ckpt.and_then(checkpoint::optimizer_path_for) {
        if path.exists() {
            optim = checkpoint::load_optimizer::<TrainBackend, Fno3d<TrainBackend>, _>(
                optim, &path, &device,
            )?;
            info!("=> オプティマイザの状態を '{}' から読み込みました。", path.display());
        }
    }
    let scheduler = MultiStepLrConfig::new(config.train.base_lr, config.train.milestones.clone())
        .with_gamma(config.train.scheduler_gamma)
        .init();

    let run_dir = exp_dir.join(&config.log.logdir);
    let tracker: Box<dyn MetricTracker> = if log {
        match JsonlTracker::create(&run_dir, config) {
            Ok(tracker) => Box::new(tracker),
            Err(err) => {
                warn!("メトリクスの記録を開始できません: {err}");
                Box::new(NullTracker)
            }
        }
    } else {
        Box::new(NullTracker)
    };
    let checkpoints = CheckpointManager::new(run_dir.join("ckpts"))?;

    let mut trainer = Trainer::<TrainBackend>::new(config, device, checkpoints, tracker);
    let outcome = trainer.fit(model, &train_loader, &val_loader, optim, scheduler)?;

    let graph_path = run_dir.join("loss_graph.png");
    match plot_loss_history(&outcome.history, &graph_path) {
        Ok(()) => info!("=> 損失グラフを '{}' に保存しました。", graph_path.display()),
        Err(err) => warn!("グラフの描画に失敗しました: {err}"),
    }
    Ok(outcome.history)
}
