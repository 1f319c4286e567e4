use nalgebra::{ComplexField, RealField};
use num_traits::One;

use crate::encap::VectorEncap;
use crate::sweeper::{implicit::ImplicitProblem, SolveOutcome};
use crate::Scalar;

/// Van der Pol oscillator
///
/// ```text
/// x' = y
/// y' = nu * (1 - x^2) * y - x
/// ```
///
/// The backward Euler solve runs a Newton iteration with the analytically
/// inverted two-by-two Jacobian. For `nu = 0` the system reduces to the
/// linear oscillator with a known rotation solution.
pub struct VanDerPol<T: Scalar> {
    nu: T,
    newton_maxit: usize,
    newton_tol: T,
    num_rhs_evals: usize,
    num_solves: usize,
    num_newton_iters: usize,
}

impl<T: Scalar> VanDerPol<T> {
    pub fn new(nu: f64) -> Self {
        Self {
            nu: <T as Scalar>::from_f64(nu),
            newton_maxit: 50,
            newton_tol: <T as Scalar>::from_f64(1e-12),
            num_rhs_evals: 0,
            num_solves: 0,
            num_newton_iters: 0,
        }
    }

    pub fn num_rhs_evals(&self) -> usize {
        self.num_rhs_evals
    }

    pub fn num_solves(&self) -> usize {
        self.num_solves
    }

    pub fn num_newton_iters(&self) -> usize {
        self.num_newton_iters
    }

    /// Solution of the `nu = 0` oscillator.
    pub fn exact(t: f64, x0: f64, y0: f64) -> (f64, f64) {
        (
            y0 * t.sin() + x0 * t.cos(),
            -x0 * t.sin() + y0 * t.cos(),
        )
    }

    fn rhs(&self, x: T, y: T) -> (T, T) {
        (y, self.nu * (T::one() - x * x) * y - x)
    }
}

impl<T: Scalar> ImplicitProblem<T> for VanDerPol<T> {
    type Encap = VectorEncap<T>;

    fn eval_rhs(&mut self, u: &VectorEncap<T>, _t: T, f: &mut VectorEncap<T>) {
        let (fx, fy) = self.rhs(u.0[0], u.0[1]);
        f.0[0] = fx;
        f.0[1] = fy;
        self.num_rhs_evals += 1;
    }

    fn solve(
        &mut self,
        u: &mut VectorEncap<T>,
        _t: T,
        dt: T,
        rhs: &VectorEncap<T>,
        f: &mut VectorEncap<T>,
    ) -> SolveOutcome {
        let nu = self.nu;
        let one = T::one();
        let two = <T as Scalar>::from_f64(2.0);

        // for small dt the system is close to the identity, so the right
        // hand side is a good starting point
        let mut x = rhs.0[0];
        let mut y = rhs.0[1];
        let mut residual = self.newton_tol + one;
        let mut iters = 0;

        while iters < self.newton_maxit && residual > self.newton_tol {
            // -P(q) with P(q) = q - dt * f(q) - rhs
            let p0 = -(x - dt * y - rhs.0[0]);
            let p1 = -(y - dt * (nu * (one - x * x) * y - x) - rhs.0[1]);

            // inverse of J = I - dt * f'(q), computed symbolically
            let a = dt * x * x - dt + one;
            let b = -two * dt * nu * x * y - dt;
            let c = two * nu * x * y * dt * dt + dt * dt + dt * x * x - dt + one;

            let dx = (a * p0 + dt * p1) / c;
            let dy = (b * p0 + p1) / c;
            x += dx;
            y += dy;

            residual = dx.abs().max(dy.abs()) / x.abs().max(y.abs());
            iters += 1;
            self.num_newton_iters += 1;
        }

        u.0[0] = x;
        u.0[1] = y;
        let (fx, fy) = self.rhs(x, y);
        f.0[0] = fx;
        f.0[1] = fy;
        self.num_solves += 1;

        if residual > self.newton_tol {
            SolveOutcome::MaxIterations {
                residual: residual.to_f64(),
            }
        } else {
            SolveOutcome::Converged { iterations: iters }
        }
    }
}
