//! Kolmogorov 流れの軌道データセット。
//!
//! 生データは `[N, T_raw, S, S]` の float32 `.npy` 配列です。各軌道を `raw_res[2]` 時刻ずつの
//! 窓に分割し、教師データ `u` は `data_res`、入力 `a` の初期渦度は `pde_res` に間引きます。

use crate::error::{PinoError, Result};
use burn::data::dataset::Dataset;
use ndarray::{Array2, Array3, Array4, ArrayView4, Axis, concatenate, s};
use std::path::PathBuf;

/// 入力場 `a` のチャネル数 (grid_x, grid_y, grid_t, u0)
pub const INPUT_CHANNELS: usize = 4;

/// 細かい格子から粗い格子へ間引くときの刻み幅。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strides {
    pub space: usize,
    pub time: usize,
}

/// `fine` 格子を `coarse` 格子に揃えるための刻み幅を求めます。
///
/// 空間方向は `fine / coarse`、時間方向は端点を共有するため `(fine - 1) / (coarse - 1)` です。
/// いずれかが整数にならない場合はエラーを返します。
pub fn strides(fine: [usize; 3], coarse: [usize; 3]) -> Result<Strides> {
    let mismatch = || PinoError::Resolution(format!("{fine:?} を {coarse:?} に間引けません"));

    if coarse[0] == 0 || coarse[1] == 0 || coarse[2] < 2 || fine[2] < 2 {
        return Err(mismatch());
    }
    if fine[0] % coarse[0] != 0 || fine[1] % coarse[1] != 0 {
        return Err(mismatch());
    }
    let space = fine[0] / coarse[0];
    if fine[1] / coarse[1] != space {
        return Err(mismatch());
    }
    if (fine[2] - 1) % (coarse[2] - 1) != 0 {
        return Err(mismatch());
    }
    Ok(Strides {
        space,
        time: (fine[2] - 1) / (coarse[2] - 1),
    })
}

/// データセット構築に必要な解像度とサンプル範囲。
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub paths: Vec<PathBuf>,
    pub raw_res: [usize; 3],
    pub data_res: [usize; 3],
    pub pde_res: [usize; 3],
    pub n_samples: usize,
    pub offset: usize,
    pub t_duration: f64,
}

/// 1つの時間窓。
#[derive(Debug, Clone)]
pub struct KfSample {
    /// 教師データ `[x, y, t]` (`data_res`)
    pub u: Array3<f32>,
    /// 初期渦度 `[x, y]` (`pde_res` の空間解像度)
    pub u0: Array2<f32>,
}

/// メモリ上に展開した Kolmogorov 流れのデータセット。
#[derive(Debug, Clone)]
pub struct KfDataset {
    samples: Vec<KfSample>,
    pde_res: [usize; 3],
    t_duration: f64,
}

impl KfDataset {
    /// `spec.paths` の `.npy` ファイルを読み込み、サンプル数の軸で連結してデータセットを構築します。
    pub fn load(spec: &DatasetSpec) -> Result<Self> {
        let mut arrays = Vec::with_capacity(spec.paths.len());
        for path in &spec.paths {
            let raw: Array4<f32> =
                ndarray_npy::read_npy(path).map_err(|source| PinoError::DataRead {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!("'{}' を読み込みました: {:?}", path.display(), raw.dim());
            arrays.push(raw);
        }
        if arrays.is_empty() {
            return Err(PinoError::Dataset("データファイルが指定されていません".into()));
        }

        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        let raw = concatenate(Axis(0), &views)
            .map_err(|e| PinoError::Dataset(format!("データファイルの形状が一致しません: {e}")))?;
        Self::from_trajectories(raw.view(), spec)
    }

    /// `[N, T_raw, S, S]` の生データからデータセットを構築します。
    pub fn from_trajectories(raw: ArrayView4<f32>, spec: &DatasetSpec) -> Result<Self> {
        let (n_traj, t_raw, sx, sy) = raw.dim();
        let [raw_x, raw_y, raw_t] = spec.raw_res;
        if sx != raw_x || sy != raw_y {
            return Err(PinoError::Dataset(format!(
                "空間解像度 {sx}x{sy} が raw_res {:?} と一致しません",
                spec.raw_res
            )));
        }
        if raw_t < 2 || t_raw < raw_t || (t_raw - 1) % (raw_t - 1) != 0 {
            return Err(PinoError::Dataset(format!(
                "時間方向の長さ {t_raw} を {raw_t} 時刻の窓に分割できません"
            )));
        }

        let data_step = strides(spec.raw_res, spec.data_res)?;
        let pde_step = strides(spec.raw_res, spec.pde_res)?;

        let windows = (t_raw - 1) / (raw_t - 1);
        let total = n_traj * windows;
        if spec.offset + spec.n_samples > total {
            return Err(PinoError::Dataset(format!(
                "サンプル範囲 {}..{} が総数 {total} を超えています",
                spec.offset,
                spec.offset + spec.n_samples
            )));
        }

        let samples = (spec.offset..spec.offset + spec.n_samples)
            .map(|index| {
                let (traj, window) = (index / windows, index % windows);
                let start = window * (raw_t - 1);
                let clip = raw.slice(s![traj, start..start + raw_t, .., ..]);

                let u = clip
                    .slice(s![..;data_step.time, ..;data_step.space, ..;data_step.space])
                    .permuted_axes([1, 2, 0])
                    .to_owned();
                let u0 = clip
                    .slice(s![0, ..;pde_step.space, ..;pde_step.space])
                    .to_owned();
                KfSample { u, u0 }
            })
            .collect();

        Ok(Self {
            samples,
            pde_res: spec.pde_res,
            t_duration: spec.t_duration,
        })
    }

    /// 入力場 `a` の格子解像度。
    pub fn pde_res(&self) -> [usize; 3] {
        self.pde_res
    }

    pub fn t_duration(&self) -> f64 {
        self.t_duration
    }

    pub fn sample(&self, index: usize) -> Option<&KfSample> {
        self.samples.get(index)
    }
}

impl Dataset<KfSample> for KfDataset {
    fn get(&self, index: usize) -> Option<KfSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
