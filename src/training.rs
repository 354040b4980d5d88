use crate::checkpoint::CheckpointManager;
use crate::config::RunConfig;
use crate::dataset::Strides;
use crate::error::{PinoError, Result};
use crate::evaluation::evaluate;
use crate::loader::{CyclicBatches, KfDataLoader};
use crate::losses::{LpLossConfig, kolmogorov_forcing, pino_loss_3d};
use crate::metrics::{LogRecord, MetricTracker};
use crate::model::NeuralOperator;
use burn::lr_scheduler::LrScheduler;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::time::Instant;
use tracing::{debug, info, warn};

/// `out[:, ::space, ::space, ::time]` に相当する間引きを行います。
pub fn subsample<B: Backend>(out: Tensor<B, 4>, strides: Strides) -> Tensor<B, 4> {
    let [_, nx, ny, nt] = out.dims();
    let device = out.device();
    let pick = |x: Tensor<B, 4>, dim: usize, len: usize, step: usize| {
        if step == 1 {
            return x;
        }
        let indices = Tensor::<B, 1, Int>::arange_step(0..len as i64, step, &device);
        x.select(dim, indices)
    };

    let out = pick(out, 1, nx, strides.space);
    let out = pick(out, 2, ny, strides.space);
    pick(out, 3, nt, strides.time)
}

/// 入力場 `a` (`[batch, x, y, t, c]`) から初期渦度 `a[:, :, :, 0, -1]` を取り出します。
pub fn initial_condition<B: Backend>(a: Tensor<B, 5>) -> Tensor<B, 3> {
    let [batch, nx, ny, _, channels] = a.dims();
    a.narrow(3, 0, 1)
        .narrow(4, channels - 1, 1)
        .reshape([batch, nx, ny])
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
    t.clone().into_scalar().elem::<f64>()
}

/// 学習の結果。
pub struct TrainOutcome<M> {
    pub model: M,
    pub history: Vec<LogRecord>,
}

/// データ損失と物理損失を組み合わせて FNO を学習するループ。
pub struct Trainer<'a, B: AutodiffBackend> {
    config: &'a RunConfig,
    device: B::Device,
    checkpoints: CheckpointManager,
    tracker: Box<dyn MetricTracker>,
}

impl<'a, B: AutodiffBackend> Trainer<'a, B> {
    pub fn new(
        config: &'a RunConfig,
        device: B::Device,
        checkpoints: CheckpointManager,
        tracker: Box<dyn MetricTracker>,
    ) -> Self {
        Self {
            config,
            device,
            checkpoints,
            tracker,
        }
    }

    /// `train.num_iter` 回の更新を行います。
    ///
    /// 学習データは使い切るたびに先頭へ戻り、`eval_step` ごとに検証誤差を、
    /// `save_step` ごとにチェックポイントを記録します。
    pub fn fit<M, O, S>(
        &mut self,
        mut model: M,
        train_loader: &KfDataLoader<B>,
        val_loader: &KfDataLoader<B::InnerBackend>,
        mut optim: O,
        mut scheduler: S,
    ) -> Result<TrainOutcome<M>>
    where
        M: AutodiffModule<B> + NeuralOperator<B>,
        M::InnerModule: NeuralOperator<B::InnerBackend>,
        O: Optimizer<M, B>,
        S: LrScheduler,
    {
        let config = self.config;
        let (train, data) = (&config.train, &config.data);
        let strides = data.strides()?;
        let visc = 1.0 / data.re;
        let criterion = LpLossConfig::new().init();
        let forcing = kolmogorov_forcing::<B>(data.pde_res[0], data.pde_res[1], &self.device);

        let mut batches = CyclicBatches::new(train_loader);
        let mut history = Vec::with_capacity(train.num_iter);
        let training_start = Instant::now();

        info!(
            "学習を開始します - イテレーション数: {}, 学習サンプル数: {}, 検証サンプル数: {}",
            train.num_iter,
            train_loader.num_items(),
            val_loader.num_items()
        );

        for e in 0..train.num_iter {
            let batch = batches.next().ok_or(PinoError::EmptyDataset("学習"))?;

            let out = model.forward(batch.a.clone());
            let u_pred = subsample(out.clone(), strides);
            let data_loss = criterion.forward(u_pred, batch.u);

            let mut record = LogRecord::new(e, 0.0, scalar(&data_loss));
            let total = if train.f_loss != 0.0 {
                let u0 = initial_condition(batch.a);
                let (loss_ic, loss_f) =
                    pino_loss_3d(out, u0, forcing.clone(), visc, data.t_duration);
                record.ic = Some(scalar(&loss_ic));
                record.pde = Some(scalar(&loss_f));
                data_loss.mul_scalar(train.xy_loss)
                    + loss_f.mul_scalar(train.f_loss)
                    + loss_ic.mul_scalar(train.ic_loss)
            } else {
                data_loss.mul_scalar(train.xy_loss)
            };
            record.train_loss = scalar(&total);

            let lr = scheduler.step();
            record.lr = lr;
            let grads = GradientsParams::from_grads(total.backward(), &model);
            model = optim.step(lr, model, grads);

            if e % train.eval_step == 0 {
                let valid = model.valid();
                record.val_error = Some(evaluate(&valid, val_loader, &criterion));
            }
            if e % train.save_step == 0 {
                self.checkpoints.save::<B, _, _>(&model, &optim, e)?;
            }

            if record.val_error.is_some() {
                info!("[Iter {e}] {record}");
            } else {
                debug!("[Iter {e}] {record}");
            }
            if let Err(err) = self.tracker.log(&record) {
                warn!("メトリクスの記録に失敗しました: {err}");
            }
            history.push(record);
        }

        if let Err(err) = self.tracker.finish() {
            warn!("メトリクスの書き出しに失敗しました: {err}");
        }
        info!("学習が完了しました。");
        info!("=> 学習時間: {:.2?}", training_start.elapsed());

        Ok(TrainOutcome { model, history })
    }
}
