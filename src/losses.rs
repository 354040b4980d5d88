use crate::spectral::{FourierBasis, fft_frequencies};
use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use std::f64::consts::PI;

/// 相対 Lp 損失の設定。
#[derive(Config, Debug)]
pub struct LpLossConfig {
    /// ノルムの次数
    #[config(default = 2.0)]
    pub p: f64,
    /// バッチ平均を取るか (false の場合は総和)
    #[config(default = true)]
    pub size_average: bool,
}

impl LpLossConfig {
    pub fn init(&self) -> LpLoss {
        LpLoss {
            p: self.p,
            size_average: self.size_average,
        }
    }
}

/// 相対 Lp 損失 `||pred - target||_p / ||target||_p`。
///
/// 先頭の軸をバッチとみなし、サンプルごとに計算した値をバッチ方向に集約します。
#[derive(Debug, Clone, Copy)]
pub struct LpLoss {
    p: f64,
    size_average: bool,
}

impl LpLoss {
    pub fn forward<B: Backend, const D: usize>(
        &self,
        pred: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        let batch = target.dims()[0];
        let n = target.shape().num_elements() / batch;
        let diff = (pred - target.clone()).reshape([batch, n]);
        let relative = self.norm(diff) / self.norm(target.reshape([batch, n]));
        if self.size_average {
            relative.mean()
        } else {
            relative.sum()
        }
    }

    fn norm<B: Backend>(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        x.abs()
            .powf_scalar(self.p)
            .sum_dim(1)
            .powf_scalar(1.0 / self.p)
    }
}

/// Kolmogorov 流れの外力場 `-4 cos(4y)` を `[nx, ny]` の周期格子上で返します。
pub fn kolmogorov_forcing<B: Backend>(nx: usize, ny: usize, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..nx)
        .flat_map(|_| {
            (0..ny).map(move |j| {
                let y = 2.0 * PI * j as f64 / ny as f64;
                (-4.0 * (4.0 * y).cos()) as f32
            })
        })
        .collect();
    Tensor::from_data(TensorData::new(values, [nx, ny]), device)
}

/// 2次元周期格子上の波数。形状はすべて `[1, nx, ny, 1]` です。
struct Wavenumbers<B: Backend> {
    /// 1階微分用 (ナイキスト成分は 0)
    kx: Tensor<B, 4>,
    ky: Tensor<B, 4>,
    /// `kx^2 + ky^2`
    lap: Tensor<B, 4>,
    /// 直流成分を 1 に置き換えたもの (除算用)
    lap_safe: Tensor<B, 4>,
}

impl<B: Backend> Wavenumbers<B> {
    fn new(nx: usize, ny: usize, device: &B::Device) -> Self {
        let fx = fft_frequencies(nx);
        let fy = fft_frequencies(ny);
        let derivative = |k: i64, n: usize| if 2 * k.unsigned_abs() as usize == n { 0.0 } else { k as f32 };

        let mut kx = Vec::with_capacity(nx * ny);
        let mut ky = Vec::with_capacity(nx * ny);
        let mut lap = Vec::with_capacity(nx * ny);
        let mut lap_safe = Vec::with_capacity(nx * ny);
        for &i in &fx {
            for &j in &fy {
                let l = (i * i + j * j) as f32;
                kx.push(derivative(i, nx));
                ky.push(derivative(j, ny));
                lap.push(l);
                lap_safe.push(if i == 0 && j == 0 { 1.0 } else { l });
            }
        }

        let grid = |v: Vec<f32>| Tensor::from_data(TensorData::new(v, [1, nx, ny, 1]), device);
        Self {
            kx: grid(kx),
            ky: grid(ky),
            lap: grid(lap),
            lap_safe: grid(lap_safe),
        }
    }
}

/// 渦度形式の Navier–Stokes 方程式の残差 `w_t + u·∇w - ν Δw` を計算します。
///
/// `w` は `[batch, nx, ny, nt]` の渦度場で、空間微分はスペクトル法、時間微分は中心差分です。
/// 戻り値は時間方向の両端を除いた `[batch, nx, ny, nt - 2]` です。
pub fn navier_stokes_residual<B: Backend>(
    w: Tensor<B, 4>,
    visc: f64,
    t_interval: f64,
) -> Tensor<B, 4> {
    let [_, nx, ny, nt] = w.dims();
    let device = w.device();
    let basis_x = FourierBasis::<B>::complex(nx, &fft_frequencies(nx), &device);
    let basis_y = FourierBasis::<B>::complex(ny, &fft_frequencies(ny), &device);
    let k = Wavenumbers::<B>::new(nx, ny, &device);

    let (re, im) = basis_y.forward_real(w.clone(), 2);
    let (w_re, w_im) = basis_x.forward(re, im, 1);

    let to_physical = |re: Tensor<B, 4>, im: Tensor<B, 4>| {
        let (re, im) = basis_x.inverse(re, im, 1);
        basis_y.inverse_real(re, im, 2)
    };

    // 流れ関数: -Δψ = w
    let psi_re = w_re.clone() / k.lap_safe.clone();
    let psi_im = w_im.clone() / k.lap_safe;

    // (re + i im) * (i k) = -k im + i k re
    let ux = to_physical(
        k.ky.clone().neg() * psi_im.clone(),
        k.ky.clone() * psi_re.clone(),
    );
    let uy = to_physical(k.kx.clone() * psi_im, k.kx.clone().neg() * psi_re);
    let wx = to_physical(
        k.kx.clone().neg() * w_im.clone(),
        k.kx * w_re.clone(),
    );
    let wy = to_physical(
        k.ky.clone().neg() * w_im.clone(),
        k.ky * w_re.clone(),
    );
    let wlap = to_physical(
        k.lap.clone().neg() * w_re,
        k.lap.neg() * w_im,
    );

    let dt = t_interval / (nt - 1) as f64;
    let wt = (w.clone().narrow(3, 2, nt - 2) - w.narrow(3, 0, nt - 2)).div_scalar(2.0 * dt);
    let advection = ux * wx + uy * wy - wlap.mul_scalar(visc);
    wt + advection.narrow(3, 1, nt - 2)
}

/// PINO の物理損失を (初期条件損失, PDE 残差損失) の組で返します。
///
/// `u`: `[batch, nx, ny, nt]` の予測渦度、`u0`: `[batch, nx, ny]` の初期渦度、
/// `forcing`: `[nx, ny]` の外力場。
pub fn pino_loss_3d<B: Backend>(
    u: Tensor<B, 4>,
    u0: Tensor<B, 3>,
    forcing: Tensor<B, 2>,
    visc: f64,
    t_interval: f64,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let [batch, nx, ny, nt] = u.dims();
    let lploss = LpLossConfig::new().init();

    let u_in = u.clone().narrow(3, 0, 1).reshape([batch, nx, ny]);
    let loss_ic = lploss.forward(u_in, u0);

    let du = navier_stokes_residual(u, visc, t_interval);
    let f = forcing
        .reshape([1, nx, ny, 1])
        .repeat_dim(0, batch)
        .repeat_dim(3, nt - 2);
    let loss_f = lploss.forward(du, f);

    (loss_ic, loss_f)
}
