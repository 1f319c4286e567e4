use nalgebra::{ComplexField, RealField};
use num_traits::{One, Zero};

use crate::encap::{Encapsulation, VectorEncap};
use crate::sweeper::{imex::ImexProblem, SolveOutcome};
use crate::Scalar;

/// Advection-diffusion `u_t + v u_x = nu u_xx` on the periodic unit interval,
/// discretized in Fourier space where both operators are diagonal. The state
/// holds the interleaved real and imaginary parts of the mode coefficients;
/// advection is the explicit part, diffusion the implicit one with an exact
/// per-mode solve.
pub struct AdvecDiff<T: Scalar> {
    pub v: T,
    pub nu: T,
    pub t0: T,
    num_modes: usize,
    ddx: Vec<T>,
    lap: Vec<T>,
}

impl<T: Scalar> AdvecDiff<T> {
    pub fn new(num_modes: usize, nu: f64) -> Self {
        let mut ddx = Vec::with_capacity(num_modes);
        let mut lap = Vec::with_capacity(num_modes);
        let two_pi = T::two_pi();
        for i in 0..num_modes {
            let k = if i <= num_modes / 2 {
                i as i64
            } else {
                i as i64 - num_modes as i64
            };
            let kx = two_pi * <T as Scalar>::from_f64(k as f64);
            ddx.push(kx);
            lap.push(if (kx * kx).to_f64() < 1e-13 {
                T::zero()
            } else {
                -kx * kx
            });
        }
        Self {
            v: T::one(),
            nu: <T as Scalar>::from_f64(nu),
            t0: T::one(),
            num_modes,
            ddx,
            lap,
        }
    }

    pub fn num_modes(&self) -> usize {
        self.num_modes
    }

    /// Periodic Gaussian packet solution sampled on the physical grid.
    pub fn exact_physical(&self, t: T) -> Vec<T> {
        let n = self.num_modes;
        let four = <T as Scalar>::from_f64(4.0);
        let width = four * self.nu * (t + self.t0);
        let amp = T::one() / (T::pi() * width).sqrt();

        let mut q = vec![T::zero(); n];
        for image in -2i64..3 {
            for (i, qi) in q.iter_mut().enumerate() {
                let x = <T as Scalar>::from_f64(i as f64) / <T as Scalar>::from_usize(n) - <T as Scalar>::from_f64(0.5)
                    + <T as Scalar>::from_f64(image as f64)
                    - t * self.v;
                *qi += amp * (-x * x / width).exp();
            }
        }
        q
    }
}

impl<T: Scalar> ImexProblem<T> for AdvecDiff<T> {
    type Encap = VectorEncap<T>;

    fn eval_expl(&mut self, u: &VectorEncap<T>, _t: T, f: &mut VectorEncap<T>) {
        for i in 0..self.num_modes {
            let re = u.0[2 * i];
            let im = u.0[2 * i + 1];
            // -v * d/dx is the diagonal factor -v * i * kx
            f.0[2 * i] = self.v * self.ddx[i] * im;
            f.0[2 * i + 1] = -self.v * self.ddx[i] * re;
        }
    }

    fn eval_impl(&mut self, u: &VectorEncap<T>, _t: T, f: &mut VectorEncap<T>) {
        for i in 0..self.num_modes {
            let w = self.nu * self.lap[i];
            f.0[2 * i] = w * u.0[2 * i];
            f.0[2 * i + 1] = w * u.0[2 * i + 1];
        }
    }

    fn solve_impl(
        &mut self,
        u: &mut VectorEncap<T>,
        _t: T,
        dt: T,
        rhs: &VectorEncap<T>,
        f: &mut VectorEncap<T>,
    ) -> SolveOutcome {
        for i in 0..self.num_modes {
            let denom = T::one() - dt * self.nu * self.lap[i];
            for c in [2 * i, 2 * i + 1] {
                u.0[c] = rhs.0[c] / denom;
                f.0[c] = (u.0[c] - rhs.0[c]) / dt;
            }
        }
        SolveOutcome::Converged { iterations: 1 }
    }
}

/// Forward discrete Fourier transform of real samples into the interleaved
/// mode layout. Quadratic, table-driven; good enough for test setups.
pub fn dft<T: Scalar>(samples: &[T]) -> VectorEncap<T> {
    let n = samples.len();
    let (cos_table, sin_table) = twiddles::<T>(n);
    let mut out = VectorEncap::zeros(2 * n);
    for k in 0..n {
        let mut re = T::zero();
        let mut im = T::zero();
        for (j, s) in samples.iter().enumerate() {
            let idx = (j * k) % n;
            re += *s * cos_table[idx];
            im -= *s * sin_table[idx];
        }
        out.0[2 * k] = re;
        out.0[2 * k + 1] = im;
    }
    out
}

/// Inverse transform back to real physical samples.
pub fn idft<T: Scalar>(spectrum: &VectorEncap<T>) -> Vec<T> {
    let n = spectrum.0.len() / 2;
    let (cos_table, sin_table) = twiddles::<T>(n);
    let scale = T::one() / <T as Scalar>::from_usize(n);
    let mut out = vec![T::zero(); n];
    for (j, o) in out.iter_mut().enumerate() {
        let mut acc = T::zero();
        for k in 0..n {
            let idx = (j * k) % n;
            acc += spectrum.0[2 * k] * cos_table[idx] - spectrum.0[2 * k + 1] * sin_table[idx];
        }
        *o = acc * scale;
    }
    out
}

fn twiddles<T: Scalar>(n: usize) -> (Vec<T>, Vec<T>) {
    let mut cos_table = Vec::with_capacity(n);
    let mut sin_table = Vec::with_capacity(n);
    for m in 0..n {
        let angle = T::two_pi() * <T as Scalar>::from_usize(m) / <T as Scalar>::from_usize(n);
        cos_table.push(angle.cos());
        sin_table.push(angle.sin());
    }
    (cos_table, sin_table)
}
