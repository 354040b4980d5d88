use crate::error::{PinoError, Result};
use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use std::fs;
use std::path::{Path, PathBuf};

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

const EXTENSION: &str = "mpk";

/// 学習中のモデルとオプティマイザの状態を `model-<iteration>.mpk` /
/// `optim-<iteration>.mpk` としてディレクトリに保存します。
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// ディレクトリが無ければ作成します。
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, iteration: usize) -> PathBuf {
        self.dir
            .join(format!("model-{iteration}"))
            .with_extension(EXTENSION)
    }

    pub fn optimizer_path(&self, iteration: usize) -> PathBuf {
        self.dir
            .join(format!("optim-{iteration}"))
            .with_extension(EXTENSION)
    }

    /// モデルとオプティマイザを保存し、モデルのファイルパスを返します。
    pub fn save<B, M, O>(&self, model: &M, optim: &O, iteration: usize) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let recorder = CheckpointRecorder::new();
        let model_path = self.model_path(iteration);
        model.clone().save_file(model_path.clone(), &recorder)?;
        <CheckpointRecorder as Recorder<B>>::record(
            &recorder,
            optim.to_record(),
            self.optimizer_path(iteration),
        )?;
        tracing::debug!("チェックポイントを '{}' に保存しました", model_path.display());
        Ok(model_path)
    }
}

/// 保存済みの重みをモデルに読み込みます。
pub fn load_model<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    let path = path.with_extension(EXTENSION);
    if !path.exists() {
        return Err(PinoError::MissingCheckpoint(path));
    }
    Ok(model.load_file(path, &CheckpointRecorder::new(), device)?)
}

/// 保存済みのオプティマイザの状態 (Adam のモーメントなど) を読み込みます。
pub fn load_optimizer<B, M, O>(optim: O, path: &Path, device: &B::Device) -> Result<O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let path = path.with_extension(EXTENSION);
    if !path.exists() {
        return Err(PinoError::MissingCheckpoint(path));
    }
    let record: O::Record =
        <CheckpointRecorder as Recorder<B>>::load(&CheckpointRecorder::new(), path, device)?;
    Ok(optim.load_record(record))
}

/// `model-<n>.mpk` と同じディレクトリにある `optim-<n>.mpk` のパスを返します。
pub fn optimizer_path_for(model_path: &Path) -> Option<PathBuf> {
    let stem = model_path.file_stem()?.to_str()?;
    let iteration = stem.strip_prefix("model-")?;
    let dir = model_path.parent().unwrap_or_else(|| Path::new(""));
    Some(
        dir.join(format!("optim-{iteration}"))
            .with_extension(EXTENSION),
    )
}
