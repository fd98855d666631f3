//! Seams between model right-hand sides and the solvers that step them.

use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point type the solvers run in. Only `f64` is used by the
/// dashboard, but the steppers stay generic.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// `dx/dt = f(t, x)` with every model parameter already bound.
pub trait OdeSystem<T: Scalar> {
    /// Number of state variables.
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`. `out.len() == x.len() == dimension()`.
    fn rhs(&self, t: T, x: &[T], out: &mut [T]);
}

/// Advances a state by exactly `dt`, reusing internal buffers between calls.
pub trait FixedStepper<T: Scalar> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// Solver coefficients are written as f64 literals; NaN only for scalars
/// that cannot hold them.
pub(crate) fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}
