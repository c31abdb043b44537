use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric types the shape equations can be evaluated with.
/// `f64` for plain evaluation, [`crate::autodiff::Dual`] for exact Jacobians.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Lifts an `f64` constant into the scalar type.
#[inline]
pub fn lift<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// A first-order system of ODEs in a (nondimensional) arc-length coordinate.
///
/// The independent variable stays `f64` on purpose: material profiles only
/// depend on position, so only the state is ever differentiated.
pub trait ArcLengthSystem<T: Scalar> {
    /// Number of state components.
    fn dimension(&self) -> usize;

    /// Writes d(state)/d(alpha) into `out`.
    fn apply(&self, alpha: f64, state: &[T], out: &mut [T]);
}
