//! # 微分演算子
//!
//! 場 `u(x, t)` の値と偏微分 `u_x`, `u_xx`, `u_t` をまとめて運ぶ [`Jet`] と、
//! それを返せる関数を表す [`Field`] トレイトを提供します。
//!
//! 各演算は連鎖律・積の法則をそのまま適用するので、得られる微分は差分近似ではなく
//! 厳密な値です。2階微分は1階の規則を合成するだけで得られます。すべて burn の
//! テンソル演算で組み立てているため、`Autodiff` バックエンド上ではパラメータに対する
//! 勾配もこのグラフを通して逆伝播できます。

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use std::f64::consts::PI;

/// `(x, t)` について2階までの Taylor 係数を持つ列テンソルの組。
///
/// 4つのテンソルはすべて同じ形状 `[N, K]` です。
#[derive(Debug, Clone)]
pub struct Jet<B: Backend> {
    pub value: Tensor<B, 2>,
    pub d_x: Tensor<B, 2>,
    pub d_xx: Tensor<B, 2>,
    pub d_t: Tensor<B, 2>,
}

impl<B: Backend> Jet<B> {
    /// 微分がすべてゼロの定数。
    pub fn constant(value: Tensor<B, 2>) -> Self {
        let zeros = Tensor::zeros_like(&value);
        Self {
            d_x: zeros.clone(),
            d_xx: zeros.clone(),
            d_t: zeros,
            value,
        }
    }

    /// 独立変数 x（`∂x/∂x = 1`）。
    pub fn variable_x(x: Tensor<B, 2>) -> Self {
        let zeros = Tensor::zeros_like(&x);
        Self {
            d_x: Tensor::ones_like(&x),
            d_xx: zeros.clone(),
            d_t: zeros,
            value: x,
        }
    }

    /// 独立変数 t（`∂t/∂t = 1`）。
    pub fn variable_t(t: Tensor<B, 2>) -> Self {
        let zeros = Tensor::zeros_like(&t);
        Self {
            d_x: zeros.clone(),
            d_xx: zeros,
            d_t: Tensor::ones_like(&t),
            value: t,
        }
    }

    /// 列方向に連結します。
    pub fn concat(jets: Vec<Self>) -> Self {
        let mut value = Vec::with_capacity(jets.len());
        let mut d_x = Vec::with_capacity(jets.len());
        let mut d_xx = Vec::with_capacity(jets.len());
        let mut d_t = Vec::with_capacity(jets.len());
        for jet in jets {
            value.push(jet.value);
            d_x.push(jet.d_x);
            d_xx.push(jet.d_xx);
            d_t.push(jet.d_t);
        }
        Self {
            value: Tensor::cat(value, 1),
            d_x: Tensor::cat(d_x, 1),
            d_xx: Tensor::cat(d_xx, 1),
            d_t: Tensor::cat(d_t, 1),
        }
    }

    /// アフィン写像 `self · W + b`。微分には線形部分だけが効きます。
    pub fn affine(self, weight: Tensor<B, 2>, bias: Tensor<B, 1>) -> Self {
        Self {
            value: self.value.matmul(weight.clone()) + bias.unsqueeze(),
            d_x: self.d_x.matmul(weight.clone()),
            d_xx: self.d_xx.matmul(weight.clone()),
            d_t: self.d_t.matmul(weight),
        }
    }

    /// 1変数関数 `f` を適用します。`f`, `f'`, `f''` は `self.value` で評価済みの値です。
    pub fn compose(self, f: Tensor<B, 2>, df: Tensor<B, 2>, d2f: Tensor<B, 2>) -> Self {
        let d_xx = d2f * self.d_x.clone() * self.d_x.clone() + df.clone() * self.d_xx;
        Self {
            value: f,
            d_x: df.clone() * self.d_x,
            d_xx,
            d_t: df * self.d_t,
        }
    }

    /// 双曲線正接 `tanh(v)`。
    pub fn tanh(self) -> Self {
        let a = self.value.clone().tanh();
        let da = (a.clone() * a.clone()).neg().add_scalar(1.0);
        let d2a = (a.clone() * da.clone()).mul_scalar(-2.0);
        self.compose(a, da, d2a)
    }

    /// 指数関数 `exp(v)`。
    pub fn exp(self) -> Self {
        let e = self.value.clone().exp();
        self.compose(e.clone(), e.clone(), e)
    }

    /// `√v`。`v > 0` の範囲でのみ微分が有限になります。
    pub fn sqrt(self) -> Self {
        let s = self.value.clone().sqrt();
        let ds = s.clone().recip().mul_scalar(0.5);
        let d2s = (ds.clone() / self.value.clone()).mul_scalar(-0.5);
        self.compose(s, ds, d2s)
    }

    /// 逆数 `1/v`。
    pub fn recip(self) -> Self {
        let r = self.value.clone().recip();
        let dr = (r.clone() * r.clone()).neg();
        let d2r = (dr.clone() * r.clone()).mul_scalar(-2.0);
        self.compose(r, dr, d2r)
    }

    /// 相補誤差関数 `erfc(v) = 1 - erf(v)`。
    pub fn erfc(self) -> Self {
        let v = self.value.clone();
        let f = v.clone().erf().neg().add_scalar(1.0);
        let gauss = (v.clone() * v.clone()).neg().exp();
        let df = gauss.mul_scalar(-2.0 / PI.sqrt());
        let d2f = (df.clone() * v).mul_scalar(-2.0);
        self.compose(f, df, d2f)
    }

    /// 積の法則: `(uv)'' = u''v + 2u'v' + uv''`。
    pub fn mul(self, rhs: Self) -> Self {
        let d_x = self.d_x.clone() * rhs.value.clone() + self.value.clone() * rhs.d_x.clone();
        let d_xx = self.d_xx * rhs.value.clone()
            + (self.d_x * rhs.d_x).mul_scalar(2.0)
            + self.value.clone() * rhs.d_xx;
        let d_t = self.d_t * rhs.value.clone() + self.value.clone() * rhs.d_t;
        Self {
            value: self.value * rhs.value,
            d_x,
            d_xx,
            d_t,
        }
    }

    /// 和の法則で加算します。
    pub fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            d_x: self.d_x + rhs.d_x,
            d_xx: self.d_xx + rhs.d_xx,
            d_t: self.d_t + rhs.d_t,
        }
    }

    /// 減算します。
    pub fn sub(self, rhs: Self) -> Self {
        self.add(rhs.neg())
    }

    /// 符号を反転します。
    pub fn neg(self) -> Self {
        self.mul_scalar(-1.0)
    }

    /// 定数倍します。
    pub fn mul_scalar(self, scalar: f64) -> Self {
        Self {
            value: self.value.mul_scalar(scalar),
            d_x: self.d_x.mul_scalar(scalar),
            d_xx: self.d_xx.mul_scalar(scalar),
            d_t: self.d_t.mul_scalar(scalar),
        }
    }

    /// 定数を加えます。微分は変わりません。
    pub fn add_scalar(self, scalar: f64) -> Self {
        Self {
            value: self.value.add_scalar(scalar),
            ..self
        }
    }
}

/// バッチ上で評価できるスカラー場 `u(x, t)`。
///
/// 実装は [`Field::jet`] で値と偏微分を返すだけでよく、微分演算子として
/// ニューラルネットワークにも解析解にも同じように使えます。
pub trait Field<B: Backend> {
    /// `x`, `t` は `[N, 1]` の列。返す [`Jet`] も `[N, 1]` です。
    fn jet(&self, x: Tensor<B, 2>, t: Tensor<B, 2>) -> Jet<B>;

    /// 値だけが必要な場合の評価。微分が不要な実装は上書きして軽量化できます。
    fn value(&self, x: Tensor<B, 2>, t: Tensor<B, 2>) -> Tensor<B, 2> {
        self.jet(x, t).value
    }
}
