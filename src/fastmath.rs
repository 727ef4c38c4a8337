//! Approximate math used by the parallel CPU strategy.
//!
//! Bounds, checked by the tests below:
//! - table `sin`/`cos`: absolute error below `TAU / TABLE_SIZE` (< 8e-4).
//! - [`fast_pow`]: relative error below 1e-3 for the sRGB transfer exponents
//!   over `[1e-4, 16]`, well inside the 1% budget for internal use.
//!
//! Neither is exact, so anything compared bit-for-bit against the scalar
//! reference must run with [`FastMath::Exact`].

use std::sync::Arc;

use super::*;

pub const TABLE_SIZE: usize = 8192;
const TABLE_SCALE: f32 = TABLE_SIZE as f32 / TAU;

/// Precomputed `sin`/`cos` over one turn.
#[derive(Debug, Clone)]
pub struct SinCosTable {
    sin: Box<[f32]>,
    cos: Box<[f32]>,
}

impl SinCosTable {
    pub fn new() -> Self {
        let angle = |i: usize| TAU * i as f32 / TABLE_SIZE as f32;
        Self {
            sin: (0..TABLE_SIZE).map(|i| angle(i).sin()).collect(),
            cos: (0..TABLE_SIZE).map(|i| angle(i).cos()).collect(),
        }
    }
    fn index(angle: f32) -> usize {
        // Non-negative angles only; the mask wraps whole turns.
        (angle * TABLE_SCALE) as usize & (TABLE_SIZE - 1)
    }
    pub fn sin_cos(&self, angle: f32) -> (f32, f32) {
        let index = Self::index(angle);
        (self.sin[index], self.cos[index])
    }
}

impl Default for SinCosTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `log2` from the float's exponent bits plus a rational fit of the mantissa.
pub fn fast_log2(x: f32) -> f32 {
    let bits = x.to_bits();
    let mantissa = f32::from_bits((bits & 0x007F_FFFF) | 0x3F00_0000);
    let y = bits as f32 * 1.192_092_9e-7;
    y - 124.225_52 - 1.498_030_3 * mantissa - 1.725_88 / (0.352_088_7 + mantissa)
}

/// `2^p` assembled directly into float bits.
pub fn fast_exp2(p: f32) -> f32 {
    let offset = if p < 0.0 { 1.0 } else { 0.0 };
    let clipped = p.max(-126.0);
    let z = clipped - clipped.trunc() + offset;
    let bits = (1 << 23) as f32
        * (clipped + 121.274_055 + 27.728_024 / (4.842_525_5 - z) - 1.490_129_1 * z);
    f32::from_bits(bits as u32)
}

/// `x^p` for positive `x`.
pub fn fast_pow(x: f32, p: f32) -> f32 {
    fast_exp2(p * fast_log2(x))
}

/// Which trigonometry and power functions a strategy uses.
#[derive(Debug, Clone, Default)]
pub enum FastMath {
    #[default]
    Exact,
    Approx(Arc<SinCosTable>),
}

impl FastMath {
    pub fn approx() -> Self {
        Self::Approx(Arc::new(SinCosTable::new()))
    }
    pub fn new(enabled: bool) -> Self {
        if enabled {
            Self::approx()
        } else {
            Self::Exact
        }
    }

    /// Unit vector at `angle` radians, for angles in `[0, TAU)`.
    pub fn direction(&self, angle: f32) -> Vec2 {
        match self {
            Self::Exact => Vec2::new(angle.cos(), angle.sin()),
            Self::Approx(table) => {
                let (sin, cos) = table.sin_cos(angle);
                Vec2::new(cos, sin)
            }
        }
    }

    pub fn powf(&self, x: f32, p: f32) -> f32 {
        match self {
            Self::Exact => x.powf(p),
            Self::Approx(_) => fast_pow(x, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_directions_are_close() {
        let fast = FastMath::approx();
        for i in 0..10_000 {
            let angle = TAU * (i as f32 + 0.5) / 10_000.0;
            let error = (fast.direction(angle) - FastMath::Exact.direction(angle)).abs();
            assert!(error.max_element() < TAU / TABLE_SIZE as f32 + 1e-6, "{angle}");
        }
    }

    #[test]
    fn log2_and_exp2_are_close() {
        for x in [0.001_f32, 0.01, 0.25, 0.5, 1.0, 1.5, 2.0, 3.7, 100.0] {
            assert!((fast_log2(x) - x.log2()).abs() < 1e-3, "log2({x})");
        }
        for p in [-20.0_f32, -5.5, -1.0, -0.5, 0.0, 0.3, 1.0, 4.25] {
            let relative = (fast_exp2(p) - p.exp2()).abs() / p.exp2();
            assert!(relative < 1e-3, "exp2({p})");
        }
    }

    #[test]
    fn pow_stays_within_bound_for_transfer_exponents() {
        for p in [1.0 / 2.4, 2.4] {
            let mut x = 1e-4_f32;
            while x < 16.0 {
                let relative = (fast_pow(x, p) - x.powf(p)).abs() / x.powf(p);
                assert!(relative < 1e-3, "{x}^{p}: {relative}");
                x *= 1.07;
            }
        }
    }

    #[test]
    fn srgb_with_fast_pow_is_within_one_percent() {
        let fast = FastMath::approx();
        for i in 1..=200 {
            let c = i as f32 / 200.0;
            let exact = color::srgb_oetf(c, &FastMath::Exact);
            let approx = color::srgb_oetf(c, &fast);
            assert!((approx - exact).abs() / exact < 0.01);
            let exact = color::srgb_eotf(c, &FastMath::Exact);
            let approx = color::srgb_eotf(c, &fast);
            assert!((approx - exact).abs() / exact < 0.01);
        }
    }
}
