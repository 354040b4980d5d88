//! # PINO 学習プログラム
//!
//! YAML の設定ファイルに従って FNO3d を Kolmogorov 流れのデータで学習します。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- --config configs/kolmogorov-re500.yaml --log
//! ```
//!
//! ### テスト
//! ```bash
//! cargo run --release -- --config configs/kolmogorov-re500.yaml --test \
//!     --ckpt exp/kolmogorov-re500/ckpts/model-500.mpk
//! ```
//!
//! ログの詳細度は `RUST_LOG` で変更できます (例: `RUST_LOG=pino=debug`)。

use clap::Parser;
use pino::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pino=info")),
        )
        .init();

    let cli = Cli::parse();
    pino::run::run(&cli)?;
    Ok(())
}
