//! 実行設定 (YAML)。
//!
//! ```yaml
//! data:
//!   paths: [data/NS-Re500_T300_id0.npy]
//!   Re: 500
//!   t_duration: 0.125
//!   raw_res: [256, 256, 513]
//!   data_res: [64, 64, 257]
//!   pde_res: [128, 128, 257]
//!   n_data_samples: 100
//!   n_test_samples: 20
//!   testoffset: 250
//! model:
//!   layers: [64, 64, 64, 64, 64]
//!   modes1: [8, 8, 8, 8]
//!   modes2: [8, 8, 8, 8]
//!   modes3: [8, 8, 8, 8]
//!   fc_dim: 128
//!   act: gelu
//! train: ...
//! ```

use crate::dataset::{self, DatasetSpec, Strides};
use crate::error::{PinoError, Result};
use crate::model::{ActivationKind, Fno3dConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// 実行時に決定した乱数シード
    #[serde(default)]
    pub seed: Option<u64>,
    /// 実行時に計算したモデルのパラメータ数
    #[serde(default)]
    pub num_params: Option<usize>,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub train: TrainConfig,
    pub test: TestConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub paths: Vec<PathBuf>,
    /// レイノルズ数。動粘性係数は `1 / Re`
    #[serde(rename = "Re")]
    pub re: f64,
    /// 1サンプルが表す時間幅
    pub t_duration: f64,
    pub raw_res: [usize; 3],
    pub data_res: [usize; 3],
    pub pde_res: [usize; 3],
    pub n_data_samples: usize,
    pub n_test_samples: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub testoffset: usize,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    /// データローダーのワーカースレッド数。1 以下なら呼び出し側のスレッドで読み込みます
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub modes1: Vec<usize>,
    pub modes2: Vec<usize>,
    pub modes3: Vec<usize>,
    #[serde(default)]
    pub layers: Option<Vec<usize>>,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_fc_dim")]
    pub fc_dim: usize,
    #[serde(default = "default_in_dim")]
    pub in_dim: usize,
    #[serde(default)]
    pub act: ActivationKind,
    #[serde(default)]
    pub pad_ratio: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub batchsize: usize,
    pub num_iter: usize,
    #[serde(default)]
    pub milestones: Vec<usize>,
    pub base_lr: f64,
    #[serde(default = "default_gamma")]
    pub scheduler_gamma: f64,
    /// 初期条件損失の重み
    pub ic_loss: f64,
    /// PDE 残差損失の重み。0 の場合は物理損失を計算しない
    pub f_loss: f64,
    /// データ損失の重み
    pub xy_loss: f64,
    pub save_step: usize,
    pub eval_step: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub batchsize: usize,
    /// 検証・テストに使う解像度 (教師データと入力場で共通)
    pub data_res: [usize; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `exp/<logdir>` に結果を書き出します
    pub logdir: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

fn default_shuffle() -> bool {
    true
}

fn default_num_workers() -> usize {
    4
}

fn default_width() -> usize {
    16
}

fn default_fc_dim() -> usize {
    128
}

fn default_in_dim() -> usize {
    crate::dataset::INPUT_CHANNELS
}

fn default_gamma() -> f64 {
    0.5
}

impl RunConfig {
    /// YAML ファイルから設定を読み込み、検証します。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PinoError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PinoError::InvalidConfig(msg));

        let layers = self.model.layer_widths();
        if layers.len() < 2 {
            return invalid(format!("model.layers は2層以上必要です: {layers:?}"));
        }
        let depth = layers.len() - 1;
        for (name, modes) in [
            ("modes1", &self.model.modes1),
            ("modes2", &self.model.modes2),
            ("modes3", &self.model.modes3),
        ] {
            if modes.len() != depth {
                return invalid(format!(
                    "model.{name} の長さ {} がスペクトル層の数 {depth} と一致しません",
                    modes.len()
                ));
            }
            if modes.contains(&0) {
                return invalid(format!("model.{name} に 0 が含まれています"));
            }
        }
        if self.train.batchsize == 0 || self.test.batchsize == 0 {
            return invalid("batchsize は 1 以上が必要です".into());
        }
        if self.train.eval_step == 0 || self.train.save_step == 0 {
            return invalid("eval_step と save_step は 1 以上が必要です".into());
        }
        if self.data.re <= 0.0 {
            return invalid(format!("Re は正の値が必要です: {}", self.data.re));
        }
        if self.train.f_loss != 0.0 && self.data.pde_res[2] < 3 {
            return invalid("PDE 損失には時間方向に 3 点以上の格子が必要です".into());
        }
        self.data.strides()?;
        Ok(())
    }

    /// 学習用データセットの指定。
    pub fn train_dataset(&self) -> DatasetSpec {
        DatasetSpec {
            paths: self.data.paths.clone(),
            raw_res: self.data.raw_res,
            data_res: self.data.data_res,
            pde_res: self.data.pde_res,
            n_samples: self.data.n_data_samples,
            offset: self.data.offset,
            t_duration: self.data.t_duration,
        }
    }

    /// 検証・テスト用データセットの指定。教師データと入力場を同じ解像度で作ります。
    pub fn test_dataset(&self) -> DatasetSpec {
        DatasetSpec {
            paths: self.data.paths.clone(),
            raw_res: self.data.raw_res,
            data_res: self.test.data_res,
            pde_res: self.test.data_res,
            n_samples: self.data.n_test_samples,
            offset: self.data.testoffset,
            t_duration: self.data.t_duration,
        }
    }
}

impl DataConfig {
    /// モデル出力 (`pde_res`) を教師データ (`data_res`) に揃えるための刻み幅。
    pub fn strides(&self) -> Result<Strides> {
        dataset::strides(self.pde_res, self.data_res)
    }
}

impl ModelConfig {
    /// 各層のチャネル幅。`layers` が無い場合は `width` をスペクトル層の数 + 1 個並べます。
    pub fn layer_widths(&self) -> Vec<usize> {
        self.layers
            .clone()
            .unwrap_or_else(|| vec![self.width; self.modes1.len() + 1])
    }

    pub fn fno3d(&self) -> Fno3dConfig {
        Fno3dConfig::new(
            self.modes1.clone(),
            self.modes2.clone(),
            self.modes3.clone(),
            self.layer_widths(),
        )
        .with_fc_dim(self.fc_dim)
        .with_in_dim(self.in_dim)
        .with_act(self.act)
        .with_pad_ratio(self.pad_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
data:
  paths: [data/NS-Re500.npy]
  Re: 500
  t_duration: 0.125
  raw_res: [8, 8, 9]
  data_res: [4, 4, 5]
  pde_res: [8, 8, 9]
  n_data_samples: 4
  n_test_samples: 2
  testoffset: 4
model:
  modes1: [2, 2]
  modes2: [2, 2]
  modes3: [2, 2]
  width: 8
  act: tanh
  pad_ratio: [0.0, 0.125]
train:
  batchsize: 2
  num_iter: 10
  milestones: [5]
  base_lr: 0.001
  ic_loss: 1.0
  f_loss: 1.0
  xy_loss: 5.0
  save_step: 5
  eval_step: 5
test:
  batchsize: 1
  data_res: [8, 8, 9]
log:
  logdir: toy
  project: pino
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let config = RunConfig::from_yaml(YAML).unwrap();

        assert_eq!(config.data.re, 500.0);
        assert_eq!(config.data.offset, 0);
        assert!(config.data.shuffle);
        assert_eq!(config.data.num_workers, 4);
        assert_eq!(config.model.layer_widths(), vec![8, 8, 8]);
        assert_eq!(config.model.fc_dim, 128);
        assert_eq!(config.model.act, ActivationKind::Tanh);
        assert_eq!(config.train.scheduler_gamma, 0.5);
        assert_eq!(config.log.entity, None);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn computes_strides_from_resolutions() {
        let config = RunConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.data.strides().unwrap(), Strides { space: 2, time: 2 });
    }

    #[test]
    fn test_dataset_uses_test_resolution_for_both_fields() {
        let config = RunConfig::from_yaml(YAML).unwrap();
        let spec = config.test_dataset();

        assert_eq!(spec.data_res, [8, 8, 9]);
        assert_eq!(spec.pde_res, [8, 8, 9]);
        assert_eq!(spec.offset, 4);
        assert_eq!(spec.n_samples, 2);
    }

    #[test]
    fn model_config_carries_hyperparameters() {
        let config = RunConfig::from_yaml(YAML).unwrap();
        let fno = config.model.fno3d();

        assert_eq!(fno.layers, vec![8, 8, 8]);
        assert_eq!(fno.pad_ratio, [0.0, 0.125]);
        assert_eq!(fno.act, ActivationKind::Tanh);
    }

    #[test]
    fn misaligned_resolutions_are_rejected() {
        let yaml = YAML.replace("data_res: [4, 4, 5]", "data_res: [3, 3, 5]");
        let err = RunConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, PinoError::Resolution(_)));
    }

    #[test]
    fn rectangular_grids_are_accepted() {
        let yaml = YAML
            .replace("raw_res: [8, 8, 9]", "raw_res: [8, 16, 9]")
            .replace("data_res: [4, 4, 5]", "data_res: [4, 8, 5]")
            .replace("pde_res: [8, 8, 9]", "pde_res: [8, 16, 9]");

        let config = RunConfig::from_yaml(&yaml).unwrap();

        assert_eq!(config.data.strides().unwrap(), Strides { space: 2, time: 2 });
        assert_eq!(config.train_dataset().pde_res, [8, 16, 9]);
    }

    #[test]
    fn zero_eval_step_is_rejected() {
        let yaml = YAML.replace("eval_step: 5", "eval_step: 0");
        let err = RunConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, PinoError::InvalidConfig(_)));
    }

    #[test]
    fn mode_lists_must_match_depth() {
        let yaml = YAML.replace("modes3: [2, 2]", "modes3: [2]");
        let err = RunConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, PinoError::InvalidConfig(_)));
    }

    #[test]
    fn missing_key_is_a_parse_error() {
        let yaml = YAML.replace("  num_iter: 10\n", "");
        let err = RunConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, PinoError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = RunConfig::load("no/such/config.yaml").unwrap_err();
        assert!(matches!(err, PinoError::ConfigRead { .. }));
    }
}
