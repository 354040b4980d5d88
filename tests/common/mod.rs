#![allow(dead_code)]

use ndarray::Array4;
use pino::config::RunConfig;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// 8x8 格子・9 時刻の滑らかな渦度軌道を `n` 本作ります。
pub fn raw_trajectories(n: usize) -> Array4<f32> {
    raw_trajectories_on(n, [8, 8])
}

/// `nx x ny` 格子・9 時刻の滑らかな渦度軌道を `n` 本作ります。
pub fn raw_trajectories_on(n: usize, [nx, ny]: [usize; 2]) -> Array4<f32> {
    Array4::from_shape_fn((n, 9, nx, ny), |(n, t, x, y)| {
        let (x, y) = (
            2.0 * PI * x as f32 / nx as f32,
            2.0 * PI * y as f32 / ny as f32,
        );
        1.0 + 0.5 * (x + n as f32).sin() * y.cos() * (1.0 - 0.05 * t as f32)
    })
}

/// 軌道を `dir/kf.npy` に書き出してそのパスを返します。
pub fn write_trajectories(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join("kf.npy");
    ndarray_npy::write_npy(&path, &raw_trajectories(n)).unwrap();
    path
}

/// 3層 (スペクトル層2つ) の小さな FNO と 8x8x9 の格子で学習する設定。
pub fn toy_yaml(data_path: &Path) -> String {
    format!(
        r#"
data:
  paths: ["{}"]
  Re: 500
  t_duration: 0.125
  raw_res: [8, 8, 9]
  data_res: [4, 4, 5]
  pde_res: [8, 8, 9]
  n_data_samples: 2
  n_test_samples: 1
  testoffset: 2
  num_workers: 1
model:
  layers: [8, 8, 8]
  modes1: [2, 2]
  modes2: [2, 2]
  modes3: [2, 2]
  fc_dim: 16
train:
  batchsize: 1
  num_iter: 3
  milestones: [2]
  base_lr: 0.001
  ic_loss: 1.0
  f_loss: 1.0
  xy_loss: 5.0
  save_step: 2
  eval_step: 2
test:
  batchsize: 1
  data_res: [8, 8, 9]
log:
  logdir: toy
  project: pino-test
"#,
        data_path.display()
    )
}

/// `dir` にデータを用意し、それを参照する設定を返します。
pub fn toy_config(dir: &Path) -> RunConfig {
    let data_path = write_trajectories(dir, 3);
    RunConfig::from_yaml(&toy_yaml(&data_path)).unwrap()
}
