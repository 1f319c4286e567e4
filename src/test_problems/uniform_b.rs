use nalgebra::Vector3;
use num_traits::Zero;

use crate::sweeper::boris::{CloudState, FieldProblem};
use crate::Scalar;

/// Charged particle cloud in a uniform magnetic field along z with no
/// electric field: velocities rotate in the plane with angular frequency
/// `omega` and the motion is an analytic helix.
#[derive(Clone, Copy, Debug)]
pub struct UniformB<T> {
    pub omega: T,
}

impl<T: Scalar> UniformB<T> {
    pub fn new(omega: f64) -> Self {
        Self {
            omega: <T as Scalar>::from_f64(omega),
        }
    }
}

impl UniformB<f64> {
    /// Analytic position and velocity of the first particle after time `t`.
    pub fn exact(&self, t: f64, start: &CloudState<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let omega = self.omega;
        let pos = start.positions[0];
        let vel = start.velocities[0];
        let (s, c) = (omega * t).sin_cos();

        let vx = vel[0] * c + vel[1] * s;
        let vy = -vel[0] * s + vel[1] * c;
        let x = pos[0] + (vel[0] * s - vel[1] * c + vel[1]) / omega;
        let y = pos[1] + (vel[0] * c - vel[0] + vel[1] * s) / omega;
        (
            Vector3::new(x, y, pos[2] + vel[2] * t),
            Vector3::new(vx, vy, vel[2]),
        )
    }
}

impl<T: Scalar> FieldProblem<T> for UniformB<T> {
    fn e_field(&mut self, _cloud: &CloudState<T>, _t: T, out: &mut [Vector3<T>]) {
        for e in out.iter_mut() {
            e.fill(T::zero());
        }
    }

    fn b_field(&mut self, _cloud: &CloudState<T>, _t: T, out: &mut [Vector3<T>]) {
        for b in out.iter_mut() {
            *b = Vector3::new(T::zero(), T::zero(), self.omega);
        }
    }

    fn energy(&mut self, cloud: &CloudState<T>, _t: T) -> T {
        let mut total = T::zero();
        for v in cloud.velocities.iter() {
            total += v.norm_squared();
        }
        total * <T as Scalar>::from_f64(0.5)
    }
}
