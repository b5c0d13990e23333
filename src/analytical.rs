//! 検証用の解析解（Ogata–Banks）。
//!
//! `∂C/∂t = D · (−∂C/∂x + ∂²C/∂x²)`、`C(0, t) = 1`、`C(x, 0) = 0` の半無限領域の解
//!
//! ```text
//! C(x, t) = ½ [erfc((x − Dt) / (2√(Dt))) + eˣ · erfc((x + Dt) / (2√(Dt)))]
//! ```
//!
//! 移流速度と拡散係数がどちらも `D` なので指数部は `e^{(D/D)x} = eˣ` になります。

use crate::jet::{Field, Jet};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use statrs::function::erf::erfc;

/// 解析解の値。`t ≤ 0` では初期条件どおり 0 を返します。
///
/// `t → 0` で分母の `√t` が 0 になる特異点は、この分岐で明示的に避けています。
pub fn solution(x: f64, t: f64, diffusion: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    let spread = 2.0 * (diffusion * t).sqrt();
    let drift = diffusion * t;
    0.5 * (erfc((x - drift) / spread) + x.exp() * erfc((x + drift) / spread))
}

/// 解析解を [`Jet`] の演算で組み立てた場。残差の検証に使います。
///
/// `t > 0` の点でのみ評価してください。
#[derive(Debug, Clone, Copy)]
pub struct AnalyticalField {
    pub diffusion: f64,
}

impl<B: Backend> Field<B> for AnalyticalField {
    fn jet(&self, x: Tensor<B, 2>, t: Tensor<B, 2>) -> Jet<B> {
        let d = self.diffusion;
        let x = Jet::variable_x(x);
        let t = Jet::variable_t(t);
        let inv_spread = t.clone().sqrt().mul_scalar(2.0 * d.sqrt()).recip();
        let drift = t.mul_scalar(d);
        let xi_minus = x.clone().sub(drift.clone()).mul(inv_spread.clone());
        let xi_plus = x.clone().add(drift).mul(inv_spread);
        xi_minus
            .erfc()
            .add(x.exp().mul(xi_plus.erfc()))
            .mul_scalar(0.5)
    }
}
