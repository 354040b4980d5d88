use crate::spectral::{FourierBasis, truncated_frequencies};
use burn::config::Config;
use burn::module::{Ignored, Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::{Tensor, activation};
use serde::{Deserialize, Serialize};

/// 初期条件から時空間の解を予測するニューラルオペレータ。
///
/// 入力は `[batch, x, y, t, channels]`、出力は `[batch, x, y, t]` です。
pub trait NeuralOperator<B: Backend> {
    fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 4>;
}

/// 隠れ層で使用する活性化関数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    #[default]
    Gelu,
    Relu,
    Tanh,
    LeakyRelu,
}

impl ActivationKind {
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            ActivationKind::Gelu => activation::gelu(x),
            ActivationKind::Relu => activation::relu(x),
            ActivationKind::Tanh => activation::tanh(x),
            ActivationKind::LeakyRelu => activation::leaky_relu(x, 0.01),
        }
    }
}

/// 3次元スペクトル畳み込み層の設定。
#[derive(Config, Debug)]
pub struct SpectralConv3dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub modes1: usize,
    pub modes2: usize,
    pub modes3: usize,
}

/// 3次元スペクトル畳み込み層。
///
/// 入力を (x, y, t) 方向にフーリエ変換し、低周波の `modes` 成分だけに複素重みを掛けて
/// 逆変換します。t 方向は実数の片側スペクトル、x・y 方向は正負両側の波数を保持します。
#[derive(Module, Debug)]
pub struct SpectralConv3d<B: Backend> {
    /// 複素重みの実部 `[2*modes1, 2*modes2, modes3, in, out]`
    weights_re: Param<Tensor<B, 5>>,
    /// 複素重みの虚部
    weights_im: Param<Tensor<B, 5>>,
    modes1: usize,
    modes2: usize,
    modes3: usize,
}

impl SpectralConv3dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpectralConv3d<B> {
        let scale = 1.0 / (self.in_channels * self.out_channels) as f64;
        let shape = [
            2 * self.modes1,
            2 * self.modes2,
            self.modes3,
            self.in_channels,
            self.out_channels,
        ];
        let init = Initializer::Uniform {
            min: 0.0,
            max: scale,
        };
        SpectralConv3d {
            weights_re: init.init(shape, device),
            weights_im: init.init(shape, device),
            modes1: self.modes1,
            modes2: self.modes2,
            modes3: self.modes3,
        }
    }
}

impl<B: Backend> SpectralConv3d<B> {
    /// `x`: `[batch, x, y, t, in]` -> `[batch, x, y, t, out]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let [_, nx, ny, nt, _] = x.dims();
        let device = x.device();

        // 格子が粗い場合は表現できる波数までに切り詰める
        let m1 = self.modes1.min(nx / 2).max(1);
        let m2 = self.modes2.min(ny / 2).max(1);
        let m3 = self.modes3.min(nt / 2 + 1);

        let basis_x = FourierBasis::<B>::complex(nx, &truncated_frequencies(m1), &device);
        let basis_y = FourierBasis::<B>::complex(ny, &truncated_frequencies(m2), &device);
        let basis_t = FourierBasis::<B>::real(nt, m3, &device);

        let (re, im) = basis_t.forward_real(x, 3);
        let (re, im) = basis_y.forward(re, im, 2);
        let (re, im) = basis_x.forward(re, im, 1);

        let (w_re, w_im) = self.weights(m1, m2, m3);
        let (re, im) = mix_channels(re, im, w_re, w_im);

        let (re, im) = basis_x.inverse(re, im, 1);
        let (re, im) = basis_y.inverse(re, im, 2);
        basis_t.inverse_real(re, im, 3)
    }

    fn weights(&self, m1: usize, m2: usize, m3: usize) -> (Tensor<B, 5>, Tensor<B, 5>) {
        let pick = |w: Tensor<B, 5>| {
            let w = keep_modes(w, 0, self.modes1, m1);
            let w = keep_modes(w, 1, self.modes2, m2);
            w.narrow(2, 0, m3)
        };
        (pick(self.weights_re.val()), pick(self.weights_im.val()))
    }
}

/// 正負 `full` 個ずつ並んだ波数軸から、正負 `keep` 個ずつを取り出します。
fn keep_modes<B: Backend>(w: Tensor<B, 5>, axis: usize, full: usize, keep: usize) -> Tensor<B, 5> {
    if keep == full {
        return w;
    }
    let positive = w.clone().narrow(axis, 0, keep);
    let negative = w.narrow(axis, 2 * full - keep, keep);
    Tensor::cat(vec![positive, negative], axis)
}

/// 各波数ごとにチャネル方向の複素行列積を行います (`bxyzi,xyzio->bxyzo`)。
fn mix_channels<B: Backend>(
    re: Tensor<B, 5>,
    im: Tensor<B, 5>,
    w_re: Tensor<B, 5>,
    w_im: Tensor<B, 5>,
) -> (Tensor<B, 5>, Tensor<B, 5>) {
    let [batch, kx, ky, kt, c_in] = re.dims();
    let c_out = w_re.dims()[4];
    let modes = kx * ky * kt;

    let flatten = |t: Tensor<B, 5>| t.reshape([batch, modes, c_in]).swap_dims(0, 1);
    let (x_re, x_im) = (flatten(re), flatten(im));
    let w_re = w_re.reshape([modes, c_in, c_out]);
    let w_im = w_im.reshape([modes, c_in, c_out]);

    let out_re = x_re.clone().matmul(w_re.clone()) - x_im.clone().matmul(w_im.clone());
    let out_im = x_re.matmul(w_im) + x_im.matmul(w_re);

    let unflatten = |t: Tensor<B, 3>| t.swap_dims(0, 1).reshape([batch, kx, ky, kt, c_out]);
    (unflatten(out_re), unflatten(out_im))
}

/// FNO3d の設定。
///
/// `layers` は各層のチャネル幅で、スペクトル層の数は `layers.len() - 1` です。
/// `modes1`〜`modes3` にはスペクトル層ごとの保持波数を指定します。
#[derive(Config, Debug)]
pub struct Fno3dConfig {
    pub modes1: Vec<usize>,
    pub modes2: Vec<usize>,
    pub modes3: Vec<usize>,
    pub layers: Vec<usize>,
    #[config(default = 128)]
    pub fc_dim: usize,
    #[config(default = 4)]
    pub in_dim: usize,
    #[config(default = "ActivationKind::Gelu")]
    pub act: ActivationKind,
    /// 時間方向の (左, 右) パディング幅を、時間方向の格子数に対する比で指定します
    #[config(default = "[0.0, 0.0]")]
    pub pad_ratio: [f64; 2],
}

/// Fourier Neural Operator (3次元)。
///
/// 入力 `a` (格子座標と初期渦度) を持ち上げ層で `layers[0]` チャネルに写し、
/// スペクトル畳み込みと点ごとの線形変換の和を積み重ねたあと、2層の MLP で
/// スカラー場 (渦度) に射影します。
#[derive(Module, Debug)]
pub struct Fno3d<B: Backend> {
    fc0: Linear<B>,
    spectral: Vec<SpectralConv3d<B>>,
    pointwise: Vec<Linear<B>>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    act: Ignored<ActivationKind>,
    pad_ratio: Ignored<[f64; 2]>,
}

impl Fno3dConfig {
    /// 新しいモデルを初期化します。
    pub fn init<B: Backend>(&self, device: &B::Device) -> Fno3d<B> {
        let modes = self.modes1.iter().zip(&self.modes2).zip(&self.modes3);
        let mut spectral = Vec::new();
        let mut pointwise = Vec::new();
        for (widths, ((&m1, &m2), &m3)) in self.layers.windows(2).zip(modes) {
            spectral.push(SpectralConv3dConfig::new(widths[0], widths[1], m1, m2, m3).init(device));
            pointwise.push(LinearConfig::new(widths[0], widths[1]).init(device));
        }

        let first = self.layers.first().copied().unwrap_or(self.in_dim);
        let last = self.layers.last().copied().unwrap_or(first);
        Fno3d {
            fc0: LinearConfig::new(self.in_dim, first).init(device),
            spectral,
            pointwise,
            fc1: LinearConfig::new(last, self.fc_dim).init(device),
            fc2: LinearConfig::new(self.fc_dim, 1).init(device),
            act: Ignored(self.act),
            pad_ratio: Ignored(self.pad_ratio),
        }
    }
}

impl<B: Backend> Fno3d<B> {
    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 4> {
        let [batch, nx, ny, nt, _] = input.dims();
        let (pad_left, pad_right) = self.time_padding(nt);
        let act = *self.act;

        let mut x = pad_time(self.fc0.forward(input), pad_left, pad_right);
        let depth = self.spectral.len();
        for (i, (conv, w)) in self.spectral.iter().zip(&self.pointwise).enumerate() {
            let x1 = conv.forward(x.clone());
            let x2 = w.forward(x);
            x = x1 + x2;
            if i + 1 != depth {
                x = act.apply(x);
            }
        }
        let x = x.narrow(3, pad_left, nt);

        let x = act.apply(self.fc1.forward(x));
        self.fc2.forward(x).reshape([batch, nx, ny, nt])
    }

    fn time_padding(&self, nt: usize) -> (usize, usize) {
        let [left, right] = *self.pad_ratio;
        let pad = |ratio: f64| (nt as f64 * ratio).round().max(0.0) as usize;
        (pad(left), pad(right))
    }
}

impl<B: Backend> NeuralOperator<B> for Fno3d<B> {
    fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 4> {
        Fno3d::forward(self, input)
    }
}

/// 時間軸 (3番目の軸) の前後をゼロで埋めます。
fn pad_time<B: Backend>(x: Tensor<B, 5>, left: usize, right: usize) -> Tensor<B, 5> {
    if left == 0 && right == 0 {
        return x;
    }
    let [batch, nx, ny, _, channels] = x.dims();
    let device = x.device();
    let zeros = |len: usize| Tensor::<B, 5>::zeros([batch, nx, ny, len, channels], &device);

    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        parts.push(zeros(left));
    }
    parts.push(x);
    if right > 0 {
        parts.push(zeros(right));
    }
    Tensor::cat(parts, 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn toy_config() -> Fno3dConfig {
        Fno3dConfig::new(vec![2, 2], vec![2, 2], vec![2, 2], vec![8, 8, 8]).with_fc_dim(16)
    }

    #[test]
    fn forward_keeps_grid_shape() {
        let device = Default::default();
        let model = toy_config().init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 5>::ones([2, 8, 8, 9, 4], &device);

        let out = model.forward(input);

        assert_eq!(out.dims(), [2, 8, 8, 9]);
    }

    #[test]
    fn time_padding_is_removed_from_output() {
        let device = Default::default();
        let model = toy_config()
            .with_pad_ratio([0.0, 0.25])
            .with_act(ActivationKind::Tanh)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 5>::ones([1, 4, 4, 8, 4], &device);

        assert_eq!(model.time_padding(8), (0, 2));
        assert_eq!(model.forward(input).dims(), [1, 4, 4, 8]);
    }

    #[test]
    fn modes_are_clamped_on_coarse_grids() {
        let device = Default::default();
        let conv = SpectralConv3dConfig::new(3, 5, 4, 4, 4).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 5>::ones([1, 4, 4, 3, 3], &device);

        let out = conv.forward(input);

        assert_eq!(out.dims(), [1, 4, 4, 3, 5]);
    }

    #[test]
    fn parameter_count_matches_layer_shapes() {
        let device = Default::default();
        let model = toy_config().init::<TestBackend>(&device);

        let lifting = 4 * 8 + 8;
        let spectral = 2 * (4 * 4 * 2 * 8 * 8);
        let pointwise = 8 * 8 + 8;
        let projection = (8 * 16 + 16) + (16 + 1);
        assert_eq!(
            model.num_params(),
            lifting + 2 * (spectral + pointwise) + projection
        );
    }

    #[test]
    fn activation_names_parse_from_yaml() {
        let act: ActivationKind = serde_yaml::from_str("leaky_relu").unwrap();
        assert_eq!(act, ActivationKind::LeakyRelu);
    }
}
