use burn::record::RecorderError;
use ndarray_npy::ReadNpyError;
use std::path::PathBuf;
use thiserror::Error;

/// クレート全体で使用するエラー型。
#[derive(Debug, Error)]
pub enum PinoError {
    #[error("設定ファイル '{path}' を読み込めません: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルの解析に失敗しました: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("設定が不正です: {0}")]
    InvalidConfig(String),

    /// `pde_res` と `data_res` のように、細かい格子が粗い格子の整数倍になっていない場合。
    #[error("解像度が整合しません: {0}")]
    Resolution(String),

    #[error("データファイル '{path}' を読み込めません: {source}")]
    DataRead {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },

    #[error("データセットが不正です: {0}")]
    Dataset(String),

    #[error("{0}データセットからバッチを取得できません")]
    EmptyDataset(&'static str),

    #[error("チェックポイント '{0}' が見つかりません")]
    MissingCheckpoint(PathBuf),

    #[error("チェックポイントの読み書きに失敗しました: {0}")]
    Recorder(#[from] RecorderError),

    #[error("メトリクスの書き出しに失敗しました: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PinoError>;
