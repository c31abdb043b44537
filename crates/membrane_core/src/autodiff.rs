//! Forward-mode dual numbers.
//!
//! The shape equations and boundary residuals are written once over
//! [`Scalar`](crate::traits::Scalar); evaluating them with [`Dual`] seeds one
//! state component at a time and yields exact Jacobian columns.

use crate::traits::ArcLengthSystem;
use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// `val + eps * ε` with `ε² = 0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    /// Applies the chain rule for a unary function with value `value` and
    /// derivative `slope` at `self.val`.
    #[inline]
    fn chain(self, value: f64, slope: f64) -> Self {
        Self::new(value, slope * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let inv = 1.0 / rhs.val;
        Self::new(
            self.val * inv,
            (self.eps - self.val * inv * rhs.eps) * inv,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // d(a mod b) = da - trunc(a / b) db away from the jumps.
        let q = (self.val / rhs.val).trunc();
        Self::new(self.val % rhs.val, self.eps - q * rhs.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl RemAssign for Dual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for Dual {
    type FromStrRadixErr = <f64 as Num>::FromStrRadixErr;
    fn from_str_radix(s: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(s, radix).map(Self::constant)
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for Dual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::constant(-0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.val.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.val.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.val.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.val.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.val.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.eps)
    }
    fn abs(self) -> Self {
        if self.val < 0.0 {
            -self
        } else {
            self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.val.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        let inv = 1.0 / self.val;
        self.chain(inv, -inv * inv)
    }
    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        self.chain(self.val.powi(n), n as f64 * self.val.powi(n - 1))
    }
    fn powf(self, n: Self) -> Self {
        let value = self.val.powf(n.val);
        let mut eps = n.val * self.val.powf(n.val - 1.0) * self.eps;
        if n.eps != 0.0 {
            eps += value * self.val.ln() * n.eps;
        }
        Self::new(value, eps)
    }
    fn sqrt(self) -> Self {
        let root = self.val.sqrt();
        self.chain(root, 0.5 / root)
    }
    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }
    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * std::f64::consts::LN_2)
    }
    fn ln(self) -> Self {
        self.chain(self.val.ln(), 1.0 / self.val)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.chain(self.val.log2(), 1.0 / (self.val * std::f64::consts::LN_2))
    }
    fn log10(self) -> Self {
        self.chain(self.val.log10(), 1.0 / (self.val * std::f64::consts::LN_10))
    }
    fn max(self, other: Self) -> Self {
        if other.val > self.val || self.val.is_nan() {
            other
        } else {
            self
        }
    }
    fn min(self, other: Self) -> Self {
        if other.val < self.val || self.val.is_nan() {
            other
        } else {
            self
        }
    }
    fn abs_sub(self, other: Self) -> Self {
        if self.val <= other.val {
            Self::zero()
        } else {
            self - other
        }
    }
    fn cbrt(self) -> Self {
        let root = self.val.cbrt();
        self.chain(root, 1.0 / (3.0 * root * root))
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }
    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }
    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        self.chain(t, 1.0 + t * t)
    }
    fn asin(self) -> Self {
        self.chain(self.val.asin(), 1.0 / (1.0 - self.val * self.val).sqrt())
    }
    fn acos(self) -> Self {
        self.chain(self.val.acos(), -1.0 / (1.0 - self.val * self.val).sqrt())
    }
    fn atan(self) -> Self {
        self.chain(self.val.atan(), 1.0 / (1.0 + self.val * self.val))
    }
    fn atan2(self, other: Self) -> Self {
        let denom = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / denom,
        )
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }
    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }
    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), 1.0 / (1.0 + self.val))
    }
    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, 1.0 - t * t)
    }
    fn asinh(self) -> Self {
        self.chain(self.val.asinh(), 1.0 / (self.val * self.val + 1.0).sqrt())
    }
    fn acosh(self) -> Self {
        self.chain(self.val.acosh(), 1.0 / (self.val * self.val - 1.0).sqrt())
    }
    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), 1.0 / (1.0 - self.val * self.val))
    }
    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

/// Jacobian of `system` with respect to the state at `(alpha, state)`,
/// written into `out` (`dim x dim`, row = equation, column = component).
pub fn system_jacobian<S>(system: &S, alpha: f64, state: &[f64], out: &mut DMatrix<f64>)
where
    S: ArcLengthSystem<Dual>,
{
    let dim = state.len();
    let mut dual_state: Vec<Dual> = state.iter().map(|&v| Dual::constant(v)).collect();
    let mut dual_out = vec![Dual::zero(); dim];
    for col in 0..dim {
        dual_state[col].eps = 1.0;
        system.apply(alpha, &dual_state, &mut dual_out);
        for row in 0..dim {
            out[(row, col)] = dual_out[row].eps;
        }
        dual_state[col].eps = 0.0;
    }
}

/// Jacobian of a vector function `f: R^n -> R^m` at `x` via `n` dual passes.
pub fn vector_jacobian<F>(x: &[f64], outputs: usize, f: F) -> DMatrix<f64>
where
    F: Fn(&[Dual], &mut [Dual]),
{
    let mut jac = DMatrix::zeros(outputs, x.len());
    let mut dual_x: Vec<Dual> = x.iter().map(|&v| Dual::constant(v)).collect();
    let mut dual_out = vec![Dual::zero(); outputs];
    for col in 0..x.len() {
        dual_x[col].eps = 1.0;
        f(&dual_x, &mut dual_out);
        for row in 0..outputs {
            jac[(row, col)] = dual_out[row].eps;
        }
        dual_x[col].eps = 0.0;
    }
    jac
}
