use nalgebra::ComplexField;
use num_traits::One;

use crate::encap::{Encapsulation, VectorEncap};
use crate::sweeper::{imex::ImexProblem, SolveOutcome};
use crate::Scalar;

/// Linear test equation `u' = lambda_expl * u + lambda_impl * u` with the
/// stiffness split between the explicit and the implicit term. The implicit
/// solve is exact.
#[derive(Clone, Copy, Debug)]
pub struct Dahlquist<T> {
    pub lambda_expl: T,
    pub lambda_impl: T,
}

impl<T: Scalar> Dahlquist<T> {
    pub fn new(lambda_expl: f64, lambda_impl: f64) -> Self {
        Self {
            lambda_expl: <T as Scalar>::from_f64(lambda_expl),
            lambda_impl: <T as Scalar>::from_f64(lambda_impl),
        }
    }

    /// `u(t) = exp(lambda * t) * u0` for the combined rate.
    pub fn exact(&self, t: T, u0: T) -> T {
        ((self.lambda_expl + self.lambda_impl) * t).exp() * u0
    }
}

impl<T: Scalar> ImexProblem<T> for Dahlquist<T> {
    type Encap = VectorEncap<T>;

    fn eval_expl(&mut self, u: &VectorEncap<T>, _t: T, f: &mut VectorEncap<T>) {
        f.copy_from(u);
        f.0 *= self.lambda_expl;
    }

    fn eval_impl(&mut self, u: &VectorEncap<T>, _t: T, f: &mut VectorEncap<T>) {
        f.copy_from(u);
        f.0 *= self.lambda_impl;
    }

    fn solve_impl(
        &mut self,
        u: &mut VectorEncap<T>,
        _t: T,
        dt: T,
        rhs: &VectorEncap<T>,
        f: &mut VectorEncap<T>,
    ) -> SolveOutcome {
        // (1 - dt * lambda) u = rhs has a closed-form solution
        u.copy_from(rhs);
        u.0 /= T::one() - dt * self.lambda_impl;
        f.copy_from(u);
        f.0 *= self.lambda_impl;
        SolveOutcome::Converged { iterations: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_solve() {
        let mut problem = Dahlquist::<f64>::new(0.0, -2.0);
        let rhs = VectorEncap::from_vec(vec![1.0]);
        let mut u = VectorEncap::zeros(1);
        let mut f = VectorEncap::zeros(1);
        let dt = 0.25;
        problem.solve_impl(&mut u, 0.0, dt, &rhs, &mut f);

        // u - dt * f(u) = rhs
        assert!((u.0[0] - dt * f.0[0] - rhs.0[0]).abs() < 1e-15);
        assert!((f.0[0] + 2.0 * u.0[0]).abs() < 1e-15);
    }
}
