//! 行列積による離散フーリエ変換。
//!
//! FFT を持たないバックエンドでも自動微分できるように、必要な波数だけを取り出した
//! DFT 基底行列を用意し、任意の軸に沿って行列積で適用します。
//! 複素数は (実部, 虚部) の実テンソルの組として扱います。

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use std::f64::consts::PI;

/// `numpy.fft.fftfreq(n) * n` と同じ並びの整数波数を返します。
pub fn fft_frequencies(n: usize) -> Vec<i64> {
    let n = n as i64;
    let positive = (n + 1) / 2;
    (0..positive).chain(positive - n..0).collect()
}

/// 低周波側の正負 `modes` 個ずつの波数 `[0, .., m-1, -m, .., -1]` を返します。
pub fn truncated_frequencies(modes: usize) -> Vec<i64> {
    let m = modes as i64;
    (0..m).chain(-m..0).collect()
}

/// テンソルの `axis` 軸に行列 `m` (`[n, k]`) を右から掛けます。
///
/// 出力の `axis` 軸の長さは `k` になります。
pub fn matmul_axis<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    axis: usize,
    m: Tensor<B, 2>,
) -> Tensor<B, D> {
    let x = x.swap_dims(axis, D - 1);
    let mut dims = x.dims();
    let n = dims[D - 1];
    let rows = x.shape().num_elements() / n;
    let out = x.reshape([rows, n]).matmul(m);
    dims[D - 1] = out.dims()[1];
    out.reshape(dims).swap_dims(axis, D - 1)
}

/// 1軸分の DFT 基底。
///
/// 順変換は `cos`/`sin` (`[n, K]`)、逆変換は `inv_cos`/`inv_sin` (`[K, n]`) を使います。
/// 逆変換側には `1/n` の正規化と、片側スペクトルの場合のエルミート対称の重みが含まれます。
#[derive(Debug, Clone)]
pub struct FourierBasis<B: Backend> {
    cos: Tensor<B, 2>,
    sin: Tensor<B, 2>,
    inv_cos: Tensor<B, 2>,
    inv_sin: Tensor<B, 2>,
}

impl<B: Backend> FourierBasis<B> {
    /// 複素フーリエ変換 (`fft` / `ifft`) の基底を、指定した波数だけで構築します。
    pub fn complex(n: usize, freqs: &[i64], device: &B::Device) -> Self {
        Self::build(n, freqs, |_| 1.0, device)
    }

    /// 実数入力の片側スペクトル (`rfft` / `irfft`) の基底を、波数 `0..modes` で構築します。
    pub fn real(n: usize, modes: usize, device: &B::Device) -> Self {
        let freqs: Vec<i64> = (0..modes as i64).collect();
        let nyquist = n as i64;
        Self::build(
            n,
            &freqs,
            |k| if k == 0 || 2 * k == nyquist { 1.0 } else { 2.0 },
            device,
        )
    }

    fn build(n: usize, freqs: &[i64], weight: impl Fn(i64) -> f64, device: &B::Device) -> Self {
        let k = freqs.len();
        let angle = |j: usize, f: i64| 2.0 * PI * (j as f64) * (f as f64) / n as f64;

        let mut cos = Vec::with_capacity(n * k);
        let mut sin = Vec::with_capacity(n * k);
        for j in 0..n {
            for &f in freqs {
                cos.push(angle(j, f).cos() as f32);
                sin.push(angle(j, f).sin() as f32);
            }
        }

        let mut inv_cos = Vec::with_capacity(k * n);
        let mut inv_sin = Vec::with_capacity(k * n);
        for &f in freqs {
            let scale = weight(f) / n as f64;
            for j in 0..n {
                inv_cos.push((scale * angle(j, f).cos()) as f32);
                inv_sin.push((-scale * angle(j, f).sin()) as f32);
            }
        }

        Self {
            cos: Tensor::from_data(TensorData::new(cos, [n, k]), device),
            sin: Tensor::from_data(TensorData::new(sin, [n, k]), device),
            inv_cos: Tensor::from_data(TensorData::new(inv_cos, [k, n]), device),
            inv_sin: Tensor::from_data(TensorData::new(inv_sin, [k, n]), device),
        }
    }

    /// 実数テンソルを `axis` 軸に沿って変換し、(実部, 虚部) を返します。
    pub fn forward_real<const D: usize>(
        &self,
        x: Tensor<B, D>,
        axis: usize,
    ) -> (Tensor<B, D>, Tensor<B, D>) {
        let re = matmul_axis(x.clone(), axis, self.cos.clone());
        let im = matmul_axis(x, axis, self.sin.clone()).neg();
        (re, im)
    }

    /// 複素テンソルを `axis` 軸に沿って順変換します。
    pub fn forward<const D: usize>(
        &self,
        re: Tensor<B, D>,
        im: Tensor<B, D>,
        axis: usize,
    ) -> (Tensor<B, D>, Tensor<B, D>) {
        // (a + ib)(cos - i sin)
        complex_product(re, im, axis, &self.cos, &self.sin)
    }

    /// 複素テンソルを `axis` 軸に沿って逆変換します。
    pub fn inverse<const D: usize>(
        &self,
        re: Tensor<B, D>,
        im: Tensor<B, D>,
        axis: usize,
    ) -> (Tensor<B, D>, Tensor<B, D>) {
        complex_product(re, im, axis, &self.inv_cos, &self.inv_sin)
    }

    /// 逆変換の実部だけを返します。片側スペクトルの基底では `irfft` に相当します。
    pub fn inverse_real<const D: usize>(
        &self,
        re: Tensor<B, D>,
        im: Tensor<B, D>,
        axis: usize,
    ) -> Tensor<B, D> {
        matmul_axis(re, axis, self.inv_cos.clone()) + matmul_axis(im, axis, self.inv_sin.clone())
    }
}

fn complex_product<B: Backend, const D: usize>(
    re: Tensor<B, D>,
    im: Tensor<B, D>,
    axis: usize,
    cos: &Tensor<B, 2>,
    sin: &Tensor<B, 2>,
) -> (Tensor<B, D>, Tensor<B, D>) {
    let re_cos = matmul_axis(re.clone(), axis, cos.clone());
    let re_sin = matmul_axis(re, axis, sin.clone());
    let im_cos = matmul_axis(im.clone(), axis, cos.clone());
    let im_sin = matmul_axis(im, axis, sin.clone());
    (re_cos + im_sin, im_cos - re_sin)
}
