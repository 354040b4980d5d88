use crate::loader::KfDataLoader;
use crate::losses::LpLoss;
use crate::model::NeuralOperator;
use burn::prelude::*;

/// ローダーの順にバッチごとの誤差を計算します。
pub fn batch_errors<B, M>(
    model: &M,
    loader: &KfDataLoader<B>,
    criterion: &LpLoss,
) -> Vec<f64>
where
    B: Backend,
    M: NeuralOperator<B>,
{
    loader
        .iter()
        .map(|batch| {
            let out = model.forward(batch.a);
            criterion
                .forward(out, batch.u)
                .into_scalar()
                .elem::<f64>()
        })
        .collect()
}

/// データセット全体でのバッチ平均誤差。バッチが1つも無い場合は NaN を返します。
pub fn evaluate<B, M>(model: &M, loader: &KfDataLoader<B>, criterion: &LpLoss) -> f64
where
    B: Backend,
    M: NeuralOperator<B>,
{
    let errors = batch_errors(model, loader, criterion);
    if errors.is_empty() {
        return f64::NAN;
    }
    errors.iter().sum::<f64>() / errors.len() as f64
}
