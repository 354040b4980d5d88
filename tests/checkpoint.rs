mod common;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use pino::checkpoint::{self, CheckpointManager};
use pino::dataset::{DatasetSpec, KfDataset};
use burn::data::dataloader::batcher::Batcher;
use pino::loader::{Batch, KfBatcher};
use pino::losses::LpLossConfig;
use pino::model::{Fno3d, Fno3dConfig};
use pino::run::TrainBackend;

fn toy_model(device: &<TrainBackend as Backend>::Device) -> Fno3d<TrainBackend> {
    Fno3dConfig::new(vec![2, 2], vec![2, 2], vec![2, 2], vec![8, 8, 8])
        .with_fc_dim(16)
        .init(device)
}

fn batch(device: &<TrainBackend as Backend>::Device) -> Batch<TrainBackend> {
    let raw = common::raw_trajectories(1);
    let spec = DatasetSpec {
        paths: Vec::new(),
        raw_res: [8, 8, 9],
        data_res: [8, 8, 9],
        pde_res: [8, 8, 9],
        n_samples: 1,
        offset: 0,
        t_duration: 0.125,
    };
    let dataset = KfDataset::from_trajectories(raw.view(), &spec).unwrap();
    let sample = dataset.sample(0).unwrap().clone();
    Batcher::<TrainBackend, _, _>::batch(&KfBatcher::for_dataset(&dataset), vec![sample], device)
}

fn train_step<O: Optimizer<Fno3d<TrainBackend>, TrainBackend>>(
    model: Fno3d<TrainBackend>,
    optim: &mut O,
    batch: &Batch<TrainBackend>,
) -> Fno3d<TrainBackend> {
    let loss = LpLossConfig::new()
        .init()
        .forward(model.forward(batch.a.clone()), batch.u.clone());
    let grads = GradientsParams::from_grads(loss.backward(), &model);
    optim.step(1e-3, model, grads)
}

fn output(model: &Fno3d<TrainBackend>, batch: &Batch<TrainBackend>) -> Vec<f32> {
    model
        .valid()
        .forward(batch.a.clone().inner())
        .to_data()
        .to_vec::<f32>()
        .unwrap()
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

#[test]
fn restored_model_and_optimizer_continue_identically() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let batch = batch(&device);

    let mut optim = AdamConfig::new().init::<TrainBackend, Fno3d<TrainBackend>>();
    let model = train_step(toy_model(&device), &mut optim, &batch);

    let manager = CheckpointManager::new(dir.path().join("ckpts")).unwrap();
    let path = manager.save::<TrainBackend, _, _>(&model, &optim, 1).unwrap();

    let restored = checkpoint::load_model(toy_model(&device), &path, &device).unwrap();
    let optim_path = checkpoint::optimizer_path_for(&path).unwrap();
    let mut restored_optim = checkpoint::load_optimizer::<TrainBackend, Fno3d<TrainBackend>, _>(
        AdamConfig::new().init(),
        &optim_path,
        &device,
    )
    .unwrap();

    assert_eq!(output(&model, &batch), output(&restored, &batch));

    let model = train_step(model, &mut optim, &batch);
    let restored = train_step(restored, &mut restored_optim, &batch);

    let diff = max_abs_diff(&output(&model, &batch), &output(&restored, &batch));
    assert!(diff < 1e-6, "max abs diff: {diff}");
}

#[test]
fn loading_a_missing_optimizer_fails() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();

    let result = checkpoint::load_optimizer::<TrainBackend, Fno3d<TrainBackend>, _>(
        AdamConfig::new().init(),
        &dir.path().join("optim-3.mpk"),
        &device,
    );

    assert!(matches!(result, Err(pino::PinoError::MissingCheckpoint(_))));
}
