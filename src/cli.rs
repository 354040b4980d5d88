use clap::Parser;
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "PINO (FNO3d) training for Kolmogorov flow with Burn", long_about = None)]
pub struct Cli {
    /// 設定ファイル (YAML) のパス
    #[arg(long)]
    pub config: PathBuf,
    /// メトリクスを `exp/<logdir>/metrics.jsonl` に記録します
    #[arg(long)]
    pub log: bool,
    /// 乱数シード。省略時は [0, 100000) から選びます
    #[arg(long)]
    pub seed: Option<u64>,
    /// 学習済みモデル (`model-<n>.mpk`) から再開します
    #[arg(long)]
    pub ckpt: Option<PathBuf>,
    /// 学習せずにテストデータで評価します
    #[arg(long)]
    pub test: bool,
}
