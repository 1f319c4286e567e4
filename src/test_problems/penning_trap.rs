use nalgebra::{Complex, Vector3};
use num_traits::Zero;

use crate::sweeper::boris::{CloudState, FieldProblem};
use crate::Scalar;

/// Idealized Penning trap: a quadrupole electric field with strength
/// `epsilon * omega_e^2` confining along z, superimposed on a uniform
/// magnetic field `omega_b` along z. Fields are pre-scaled by the
/// charge-to-mass ratio, so the accelerations are
///
/// ```text
/// a_E = epsilon * omega_e^2 * (-x, -y, 2 z)
/// a_B = v x (0, 0, omega_b)
/// ```
///
/// For a single particle the motion separates into an axial oscillation and
/// the rotation of two transverse eigenmodes, which gives the analytic
/// solution used by the accuracy tests.
#[derive(Clone, Copy, Debug)]
pub struct PenningTrap<T> {
    pub omega_e: T,
    pub omega_b: T,
    pub epsilon: T,
}

impl<T: Scalar> PenningTrap<T> {
    pub fn new(omega_e: f64, omega_b: f64, epsilon: f64) -> Self {
        Self {
            omega_e: <T as Scalar>::from_f64(omega_e),
            omega_b: <T as Scalar>::from_f64(omega_b),
            epsilon: <T as Scalar>::from_f64(epsilon),
        }
    }
}

impl PenningTrap<f64> {
    /// Analytic position and velocity of a single particle after time `t`.
    pub fn exact(&self, t: f64, start: &CloudState<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let pos = start.positions[0];
        let vel = start.velocities[0];
        let i = Complex::new(0.0, 1.0);

        // axial oscillation
        let omega_tilde = Complex::new(-2.0 * self.epsilon, 0.0).sqrt() * self.omega_e;
        let z = (omega_tilde * t).cos() * pos[2]
            + (omega_tilde * t).sin() * Complex::new(vel[2], 0.0) / omega_tilde;
        let w = -(omega_tilde * t).sin() * omega_tilde * pos[2] + (omega_tilde * t).cos() * vel[2];

        // transverse eigenmodes
        let root = Complex::new(
            self.omega_b * self.omega_b + 4.0 * self.epsilon * self.omega_e * self.omega_e,
            0.0,
        )
        .sqrt();
        let omega_plus = (Complex::new(self.omega_b, 0.0) + root) * 0.5;
        let omega_minus = (Complex::new(self.omega_b, 0.0) - root) * 0.5;

        let r_minus = (omega_plus * pos[0] + vel[1]) / (omega_plus - omega_minus);
        let r_plus = Complex::new(pos[0], 0.0) - r_minus;
        let i_minus = (omega_plus * pos[1] - vel[0]) / (omega_plus - omega_minus);
        let i_plus = Complex::new(pos[1], 0.0) - i_minus;

        let xy = (r_plus + i * i_plus) * (-i * omega_plus * t).exp()
            + (r_minus + i * i_minus) * (-i * omega_minus * t).exp();
        let uv = (-i * omega_plus * (r_plus + i * i_plus)) * (-i * omega_plus * t).exp()
            + (-i * omega_minus * (r_minus + i * i_minus)) * (-i * omega_minus * t).exp();

        (
            Vector3::new(xy.re, xy.im, z.re),
            Vector3::new(uv.re, uv.im, w.re),
        )
    }
}

impl<T: Scalar> FieldProblem<T> for PenningTrap<T> {
    fn e_field(&mut self, cloud: &CloudState<T>, _t: T, out: &mut [Vector3<T>]) {
        let k = self.epsilon * self.omega_e * self.omega_e;
        let two = <T as Scalar>::from_f64(2.0);
        for (e, x) in out.iter_mut().zip(cloud.positions.iter()) {
            *e = Vector3::new(-k * x[0], -k * x[1], two * k * x[2]);
        }
    }

    fn b_field(&mut self, _cloud: &CloudState<T>, _t: T, out: &mut [Vector3<T>]) {
        for b in out.iter_mut() {
            *b = Vector3::new(T::zero(), T::zero(), self.omega_b);
        }
    }

    fn energy(&mut self, cloud: &CloudState<T>, _t: T) -> T {
        // kinetic plus trap potential
        let half = <T as Scalar>::from_f64(0.5);
        let k = self.epsilon * self.omega_e * self.omega_e;
        let mut total = T::zero();
        for (x, v) in cloud.positions.iter().zip(cloud.velocities.iter()) {
            total += half * v.norm_squared();
            total += k * (half * (x[0] * x[0] + x[1] * x[1]) - x[2] * x[2]);
        }
        total
    }
}
