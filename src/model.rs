use crate::config::NetworkShape;
use crate::error::{PinnError, Result};
use crate::jet::{Field, Jet};
use burn::module::{Module, Param};
use burn::nn::Tanh;
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;

/// 重み `[inputs, outputs]` とバイアス `[outputs]` の組。
#[derive(Module, Debug)]
pub struct Layer<B: Backend> {
    weight: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> Layer<B> {
    fn from_values(values: &LayerValues, device: &B::Device) -> Self {
        let weight = TensorData::new(values.weight.clone(), [values.inputs, values.outputs])
            .convert::<B::FloatElem>();
        let bias = TensorData::new(values.bias.clone(), [values.outputs]).convert::<B::FloatElem>();
        Self {
            weight: Param::from_tensor(Tensor::from_data(weight, device).require_grad()),
            bias: Param::from_tensor(Tensor::from_data(bias, device).require_grad()),
        }
    }

    fn to_values(&self) -> Result<LayerValues> {
        let [inputs, outputs] = self.weight.dims();
        Ok(LayerValues {
            inputs,
            outputs,
            weight: host_values(self.weight.val())?,
            bias: host_values(self.bias.val())?,
        })
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input.matmul(self.weight.val()) + self.bias.val().unsqueeze()
    }
}

/// PINNの本体となるニューラルネットワークモデル。
///
/// 座標 `(x, t)` を入力とする多層パーセプトロン（MLP）の出力 `base` を
/// `u = base · x + (1 − x)` に変換して返します。この形により `u(0, t) = 1` が
/// パラメータによらず厳密に成り立つため、左境界の損失項は必要ありません。
/// 右境界には何も課しません。
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    layers: Vec<Layer<B>>,
    activation: Tanh,
}

impl<B: Backend> Model<B> {
    /// Xavier 一様分布 `U(−1/√inputs, 1/√inputs)` で初期化します。
    pub fn init<R: Rng>(shape: &NetworkShape, rng: &mut R, device: &B::Device) -> Result<Self> {
        let widths = shape.widths();
        let layers = widths
            .windows(2)
            .map(|pair| {
                let (inputs, outputs) = (pair[0], pair[1]);
                let bound = 1.0 / (inputs as f64).sqrt();
                LayerValues {
                    inputs,
                    outputs,
                    weight: (0..inputs * outputs)
                        .map(|_| rng.random_range(-bound..bound))
                        .collect(),
                    bias: (0..outputs).map(|_| rng.random_range(-bound..bound)).collect(),
                }
            })
            .collect();
        Ok(Self::from_values(&ParameterValues::new(layers)?, device))
    }

    /// ホスト側のパラメータ値からモデルを組み立てます。
    pub fn from_values(values: &ParameterValues, device: &B::Device) -> Self {
        Self {
            layers: values
                .layers()
                .iter()
                .map(|layer| Layer::from_values(layer, device))
                .collect(),
            activation: Tanh::new(),
        }
    }

    /// 現在のパラメータの値をコピーして取り出します。
    pub fn to_values(&self) -> Result<ParameterValues> {
        let layers = self
            .layers
            .iter()
            .map(Layer::to_values)
            .collect::<Result<Vec<_>>>()?;
        ParameterValues::new(layers)
    }

    /// 各層の幅（入力幅から出力幅まで）。
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.layers.len() + 1);
        if let Some(first) = self.layers.first() {
            widths.push(first.weight.dims()[0]);
        }
        widths.extend(self.layers.iter().map(|layer| layer.weight.dims()[1]));
        widths
    }

    /// 制約をかける前のネットワーク出力 `base`。入力は `[N, 2]`（x, t の順）。
    pub fn forward_base(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut h = input;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(h);
            if i < last {
                h = self.activation.forward(h);
            }
        }
        h
    }

    /// モデルの順伝播を実行します。`x`, `t` は `[N, 1]`。
    pub fn forward(&self, x: Tensor<B, 2>, t: Tensor<B, 2>) -> Tensor<B, 2> {
        let base = self.forward_base(Tensor::cat(vec![x.clone(), t], 1));
        (base * x.clone() - x).add_scalar(1.0)
    }
}

impl<B: AutodiffBackend> Model<B> {
    /// `backward` の結果から、[`ParameterValues::flatten`] と同じ順序で勾配を取り出します。
    ///
    /// 損失に寄与しなかったパラメータの勾配はゼロとして扱います。
    pub fn gradient_values(&self, grads: &B::Gradients) -> Result<Vec<f64>> {
        let mut flat = Vec::new();
        for layer in &self.layers {
            let [inputs, outputs] = layer.weight.dims();
            match layer.weight.val().grad(grads) {
                Some(grad) => flat.extend(host_values(grad)?),
                None => flat.extend(std::iter::repeat_n(0.0, inputs * outputs)),
            }
            match layer.bias.val().grad(grads) {
                Some(grad) => flat.extend(host_values(grad)?),
                None => flat.extend(std::iter::repeat_n(0.0, outputs)),
            }
        }
        Ok(flat)
    }
}

impl<B: Backend> Field<B> for Model<B> {
    fn jet(&self, x: Tensor<B, 2>, t: Tensor<B, 2>) -> Jet<B> {
        let x = Jet::variable_x(x);
        let last = self.layers.len().saturating_sub(1);
        let mut h = Jet::concat(vec![x.clone(), Jet::variable_t(t)]);
        for (i, layer) in self.layers.iter().enumerate() {
            h = h.affine(layer.weight.val(), layer.bias.val());
            if i < last {
                h = h.tanh();
            }
        }
        h.mul(x.clone()).sub(x).add_scalar(1.0)
    }

    fn value(&self, x: Tensor<B, 2>, t: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(x, t)
    }
}

/// 1層分のパラメータ値。`weight` は行優先の `inputs × outputs`。
#[derive(Debug, Clone, PartialEq)]
pub struct LayerValues {
    pub inputs: usize,
    pub outputs: usize,
    pub weight: Vec<f64>,
    pub bias: Vec<f64>,
}

/// デバイスから切り離したパラメータ集合。
///
/// 生成時に層の幅がつながっていること（入力幅 2、出力幅 1）を検査します。
/// 学習中のモデルとはデータを共有しないので、スナップショットとして安全に保持できます。
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValues {
    layers: Vec<LayerValues>,
}

impl ParameterValues {
    /// 層の列を検査して集合を作ります。
    pub fn new(layers: Vec<LayerValues>) -> Result<Self> {
        let (Some(first), Some(last)) = (layers.first(), layers.last()) else {
            return Err(PinnError::ShapeMismatch("層がありません".to_string()));
        };
        if first.inputs != 2 {
            return Err(PinnError::ShapeMismatch(format!(
                "最初の層の入力幅は 2 でなければなりません: {}",
                first.inputs
            )));
        }
        if last.outputs != 1 {
            return Err(PinnError::ShapeMismatch(format!(
                "最後の層の出力幅は 1 でなければなりません: {}",
                last.outputs
            )));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.weight.len() != layer.inputs * layer.outputs || layer.bias.len() != layer.outputs
            {
                return Err(PinnError::ShapeMismatch(format!(
                    "層 {i} の要素数が {}×{} と一致しません",
                    layer.inputs, layer.outputs
                )));
            }
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].outputs != pair[1].inputs {
                return Err(PinnError::ShapeMismatch(format!(
                    "層 {i} の出力幅 {} と層 {} の入力幅 {} がつながりません",
                    pair[0].outputs,
                    i + 1,
                    pair[1].inputs
                )));
            }
        }
        Ok(Self { layers })
    }

    /// 層ごとの値。
    pub fn layers(&self) -> &[LayerValues] {
        &self.layers
    }

    /// パラメータの総数。
    pub fn num_params(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.weight.len() + layer.bias.len())
            .sum()
    }

    /// 層ごとに weight、bias の順で1本のベクトルに並べます。
    pub fn flatten(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.num_params());
        for layer in &self.layers {
            flat.extend_from_slice(&layer.weight);
            flat.extend_from_slice(&layer.bias);
        }
        flat
    }

    /// 同じ形状で、値だけを `flat` に置き換えた集合を返します。
    pub fn with_flat(&self, flat: &[f64]) -> Result<Self> {
        if flat.len() != self.num_params() {
            return Err(PinnError::ShapeMismatch(format!(
                "パラメータ数 {} に対して {} 個の値が渡されました",
                self.num_params(),
                flat.len()
            )));
        }
        let mut offset = 0;
        let mut take = |n: usize| {
            let chunk = flat[offset..offset + n].to_vec();
            offset += n;
            chunk
        };
        let layers = self
            .layers
            .iter()
            .map(|layer| LayerValues {
                inputs: layer.inputs,
                outputs: layer.outputs,
                weight: take(layer.weight.len()),
                bias: take(layer.bias.len()),
            })
            .collect();
        Ok(Self { layers })
    }

    /// すべての値が有限かどうか。
    pub fn is_finite(&self) -> bool {
        self.layers
            .iter()
            .all(|layer| layer.weight.iter().chain(&layer.bias).all(|v| v.is_finite()))
    }
}

/// テンソルの値をホストの `Vec<f64>` にコピーします。
pub(crate) fn host_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| PinnError::Data(format!("{e:?}")))
}
