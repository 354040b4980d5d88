use burn::LearningRate;
use burn::config::Config;
use burn::lr_scheduler::LrScheduler;
use burn::tensor::backend::Backend;

/// マイルストーン方式の学習率スケジューラの設定。
#[derive(Config, Debug)]
pub struct MultiStepLrConfig {
    /// 初期学習率
    pub initial_lr: LearningRate,
    /// 学習率を減衰させるステップ
    pub milestones: Vec<usize>,
    /// 減衰率
    #[config(default = 0.1)]
    pub gamma: f64,
}

impl MultiStepLrConfig {
    pub fn init(&self) -> MultiStepLr {
        MultiStepLr {
            initial_lr: self.initial_lr,
            milestones: self.milestones.clone(),
            gamma: self.gamma,
            step: 0,
        }
    }
}

/// ステップ数がマイルストーンに達するたびに学習率を `gamma` 倍します。
///
/// `step` は現在のステップの学習率を返してからステップを1つ進めます。
#[derive(Clone, Debug)]
pub struct MultiStepLr {
    initial_lr: LearningRate,
    milestones: Vec<usize>,
    gamma: f64,
    step: usize,
}

impl MultiStepLr {
    /// `step` 番目のステップで使う学習率。
    pub fn lr_at(&self, step: usize) -> LearningRate {
        let decays = self.milestones.iter().filter(|&&m| m <= step).count();
        self.initial_lr * self.gamma.powi(decays as i32)
    }
}

impl LrScheduler for MultiStepLr {
    type Record<B: Backend> = usize;

    fn step(&mut self) -> LearningRate {
        let lr = self.lr_at(self.step);
        self.step += 1;
        lr
    }

    fn to_record<B: Backend>(&self) -> Self::Record<B> {
        self.step
    }

    fn load_record<B: Backend>(mut self, record: Self::Record<B>) -> Self {
        self.step = record;
        self
    }
}
