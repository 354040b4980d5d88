use crate::dataset::{INPUT_CHANNELS, KfDataset, KfSample};
use burn::config::Config;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder, DataLoaderIterator};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use std::sync::Arc;

/// 教師データ `u` (`[batch, x, y, t]`) と入力場 `a` (`[batch, x, y, t, 4]`) の組。
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    pub u: Tensor<B, 4>,
    pub a: Tensor<B, 5>,
}

/// `Batch` を返す burn のデータローダー。
pub type KfDataLoader<B> = Arc<dyn DataLoader<B, Batch<B>>>;

/// サンプルを束ね、入力場 `a` を組み立てるバッチャー。
#[derive(Debug, Clone, Copy)]
pub struct KfBatcher {
    pde_res: [usize; 3],
    t_duration: f64,
}

impl KfBatcher {
    pub fn new(pde_res: [usize; 3], t_duration: f64) -> Self {
        Self {
            pde_res,
            t_duration,
        }
    }

    pub fn for_dataset(dataset: &KfDataset) -> Self {
        Self::new(dataset.pde_res(), dataset.t_duration())
    }

    /// サンプルの入力場 `a` (`[x, y, t, 4]`) を行優先で `out` に追記します。
    ///
    /// チャネルは `(x, y, t, u0)` で、x・y は `[0, 1)` の等間隔格子、
    /// t は `[0, t_duration]` の端点を含む等間隔格子です。
    pub fn extend_input(&self, sample: &KfSample, out: &mut Vec<f32>) {
        let [nx, ny, nt] = self.pde_res;
        let dt = if nt > 1 {
            self.t_duration / (nt - 1) as f64
        } else {
            0.0
        };
        for i in 0..nx {
            for j in 0..ny {
                let u0 = sample.u0[[i, j]];
                for k in 0..nt {
                    out.extend_from_slice(&[
                        i as f32 / nx as f32,
                        j as f32 / ny as f32,
                        (k as f64 * dt) as f32,
                        u0,
                    ]);
                }
            }
        }
    }
}

impl<B: Backend> Batcher<B, KfSample, Batch<B>> for KfBatcher {
    fn batch(&self, items: Vec<KfSample>, device: &B::Device) -> Batch<B> {
        let [nx, ny, nt] = self.pde_res;
        let (ux, uy, ut) = items.first().map_or((0, 0, 0), |s| s.u.dim());
        let batch = items.len();

        let mut u = Vec::with_capacity(batch * ux * uy * ut);
        let mut a = Vec::with_capacity(batch * nx * ny * nt * INPUT_CHANNELS);
        for sample in &items {
            u.extend(sample.u.iter().copied());
            self.extend_input(sample, &mut a);
        }

        Batch {
            u: Tensor::from_data(TensorData::new(u, [batch, ux, uy, ut]), device),
            a: Tensor::from_data(
                TensorData::new(a, [batch, nx, ny, nt, INPUT_CHANNELS]),
                device,
            ),
        }
    }
}

/// データローダーの設定。
#[derive(Config, Debug)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// 2 以上でワーカースレッドを使って先読みします
    #[config(default = 1)]
    pub num_workers: usize,
    /// シャッフル用のシード。`None` ならデータセット順
    pub shuffle: Option<u64>,
}

impl LoaderConfig {
    /// データセットから burn のデータローダーを構築します。
    ///
    /// シャッフルが有効な場合は `iter()` を呼ぶたびに並べ直されます。
    pub fn init<B: Backend>(&self, dataset: KfDataset, device: &B::Device) -> KfDataLoader<B> {
        let batcher = KfBatcher::for_dataset(&dataset);
        let mut builder = DataLoaderBuilder::<B, KfSample, Batch<B>>::new(batcher)
            .batch_size(self.batch_size.max(1))
            .set_device(device.clone());
        if let Some(seed) = self.shuffle {
            builder = builder.shuffle(seed);
        }
        if self.num_workers > 1 {
            builder = builder.num_workers(self.num_workers);
        }
        builder.build(dataset)
    }
}

/// 使い切るたびに `iter()` を呼び直す、終わりのないバッチ列。
pub struct CyclicBatches<'a, B: Backend> {
    loader: &'a KfDataLoader<B>,
    current: Box<dyn DataLoaderIterator<Batch<B>> + 'a>,
}

impl<'a, B: Backend> CyclicBatches<'a, B> {
    pub fn new(loader: &'a KfDataLoader<B>) -> Self {
        Self {
            loader,
            current: loader.iter(),
        }
    }
}

impl<B: Backend> Iterator for CyclicBatches<'_, B> {
    type Item = Batch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(batch) = self.current.next() {
            return Some(batch);
        }
        if self.loader.num_items() == 0 {
            return None;
        }
        self.current = self.loader.iter();
        self.current.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSpec;
    use burn::backend::NdArray;
    use ndarray::Array4;

    type TestBackend = NdArray<f32>;

    fn dataset(n: usize) -> KfDataset {
        let raw = Array4::from_shape_fn((n, 5, 4, 4), |(n, t, x, y)| {
            (n * 1000 + t * 100 + x * 10 + y) as f32
        });
        let spec = DatasetSpec {
            paths: Vec::new(),
            raw_res: [4, 4, 5],
            data_res: [2, 2, 3],
            pde_res: [4, 4, 5],
            n_samples: n,
            offset: 0,
            t_duration: 1.0,
        };
        KfDataset::from_trajectories(raw.view(), &spec).unwrap()
    }

    fn loader(n: usize, config: LoaderConfig) -> KfDataLoader<TestBackend> {
        config.init(dataset(n), &Default::default())
    }

    /// バッチ内の各サンプルの初期渦度 a[:, 0, 0, 0, 3] からサンプル番号を復元します
    fn sample_ids(batch: &Batch<TestBackend>) -> Vec<usize> {
        let [b, ..] = batch.a.dims();
        let u0 = batch
            .a
            .clone()
            .narrow(1, 0, 1)
            .narrow(2, 0, 1)
            .narrow(3, 0, 1)
            .narrow(4, 3, 1)
            .reshape([b]);
        u0.to_data()
            .to_vec::<f32>()
            .unwrap()
            .into_iter()
            .map(|v| (v / 1000.0) as usize)
            .collect()
    }

    #[test]
    fn input_field_carries_grid_and_initial_condition() {
        let dataset = dataset(2);
        let batcher = KfBatcher::for_dataset(&dataset);

        let mut a = Vec::new();
        batcher.extend_input(dataset.sample(1).unwrap(), &mut a);

        assert_eq!(a.len(), 4 * 4 * 5 * INPUT_CHANNELS);
        // a[x=1, y=2, t=4]
        let offset = ((4 + 2) * 5 + 4) * INPUT_CHANNELS;
        assert_eq!(&a[offset..offset + 4], &[0.25, 0.5, 1.0, 1012.0]);
    }

    #[test]
    fn batches_have_expected_shapes() {
        let loader = loader(5, LoaderConfig::new(2));

        let batches: Vec<Batch<TestBackend>> = loader.iter().collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].u.dims(), [2, 2, 2, 3]);
        assert_eq!(batches[0].a.dims(), [2, 4, 4, 5, 4]);
        assert_eq!(batches[2].u.dims(), [1, 2, 2, 3]);
        assert_eq!(loader.num_items(), 5);
    }

    #[test]
    fn cycle_restarts_after_exhaustion() {
        let loader = loader(3, LoaderConfig::new(2));

        let ids: Vec<Vec<usize>> = CyclicBatches::new(&loader)
            .take(4)
            .map(|b| sample_ids(&b))
            .collect();

        assert_eq!(ids, vec![vec![0, 1], vec![2], vec![0, 1], vec![2]]);
    }

    #[test]
    fn shuffled_cycle_visits_every_sample_each_pass() {
        let loader = loader(4, LoaderConfig::new(1).with_shuffle(Some(7)));

        let ids: Vec<usize> = CyclicBatches::new(&loader)
            .take(8)
            .flat_map(|b| sample_ids(&b))
            .collect();

        for pass in ids.chunks(4) {
            let mut sorted = pass.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn worker_threads_deliver_every_sample() {
        let loader = loader(6, LoaderConfig::new(1).with_num_workers(3));

        let mut ids: Vec<usize> = loader.iter().flat_map(|b| sample_ids(&b)).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_dataset_yields_nothing() {
        let loader = loader(0, LoaderConfig::new(2));

        assert!(CyclicBatches::new(&loader).next().is_none());
    }
}
