//! # PINO (Physics-Informed Neural Operator) ライブラリ
//!
//! `burn` フレームワークを使用して、3次元の Fourier Neural Operator (FNO3d) を
//! Kolmogorov 流れ (2次元 Navier–Stokes 方程式) のデータと物理法則の両方で学習するための
//! 主要なコンポーネントを提供します。

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod loader;
pub mod losses;
pub mod metrics;
pub mod model;
pub mod run;
pub mod scheduler;
pub mod spectral;
pub mod training;

pub use error::{PinoError, Result};

/// 実験結果 (チェックポイント・メトリクス・損失グラフ) を書き出すディレクトリ
pub const EXP_DIR: &str = "exp";
