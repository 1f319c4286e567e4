use nalgebra::{ComplexField, DMatrix};
use num_traits::{One, Zero};

use crate::{
    encap::Encapsulation,
    errors::SdcError,
    quadrature::Quadrature,
    sweeper::Sweeper,
    Scalar,
};

/// Space-only interpolation and restriction between the encapsulations of a
/// fine and a coarse level. Supplied by the concrete discretization; the
/// framework only composes it with the temporal transfer.
pub trait SpatialTransfer<T: Scalar, E: Encapsulation<T>> {
    /// Overwrite `fine` with the spatial interpolation of `coarse`.
    fn interpolate(&self, coarse: &E, fine: &mut E);

    /// Overwrite `coarse` with the spatial restriction of `fine`.
    fn restrict(&self, fine: &E, coarse: &mut E);
}

/// Identity spatial transfer for level pairs sharing one discretization.
#[derive(Clone, Copy, Debug, Default)]
pub struct Injection;

impl<T: Scalar, E: Encapsulation<T>> SpatialTransfer<T, E> for Injection {
    fn interpolate(&self, coarse: &E, fine: &mut E) {
        fine.copy_from(coarse);
    }

    fn restrict(&self, fine: &E, coarse: &mut E) {
        coarse.copy_from(fine);
    }
}

/// Couples one coarse/fine sweeper pair: state interpolation and restriction
/// in time and space, plus the correction that makes the coarse collocation
/// problem consistent with the fine one.
pub trait Transfer<T: Scalar, S: Sweeper<T>> {
    /// Add the coarse correction to every fine node state, re-evaluating and
    /// saving the fine level. With `initial` the start state is corrected
    /// first.
    fn interpolate(&self, fine: &mut S, coarse: &S, initial: bool);

    /// Correct only the fine start state.
    fn interpolate_initial(&self, fine: &mut S, coarse: &S);

    /// Overwrite the coarse node states from the fine level, re-evaluating
    /// and saving the coarse level. With `initial` the start state is
    /// restricted too.
    fn restrict(&self, coarse: &mut S, fine: &S, initial: bool);

    /// Restrict only the fine start state.
    fn restrict_initial(&self, coarse: &mut S, fine: &S);

    /// Compute the coarse-level correction from the mismatch of the two
    /// 0-to-node integrals and store it on the coarse sweeper.
    fn fas(&self, dt: T, coarse: &mut S, fine: &S);
}

/// Transfer built from a Lagrange reconstruction in time and a supplied
/// spatial transfer. With matching node sets the time matrix is the identity
/// and the transfer is purely injective.
pub struct TimeMatTransfer<T: Scalar, SP> {
    interp: DMatrix<T>,
    t_rat: usize,
    spatial: SP,
}

impl<T: Scalar, SP> TimeMatTransfer<T, SP> {
    pub fn new(
        coarse: &Quadrature<T>,
        fine: &Quadrature<T>,
        spatial: SP,
    ) -> Result<Self, SdcError> {
        let nc = coarse.num_nodes();
        let nf = fine.num_nodes();
        if nf < nc {
            return Err(SdcError::InconsistentHierarchy(
                "fine level has fewer nodes than coarse level".to_string(),
            ));
        }

        let t_rat = if nc == nf {
            1
        } else {
            if nc < 2 || (nf - 1) % (nc - 1) != 0 {
                return Err(SdcError::InconsistentHierarchy(format!(
                    "node counts {} and {} do not nest",
                    nc, nf
                )));
            }
            (nf - 1) / (nc - 1)
        };

        // time injection requires the coarse nodes to be a subset of the
        // fine ones
        let tol = <T as Scalar>::from_f64(1e-10);
        for m in 0..nc {
            let diff = coarse.node(m) - fine.node(m * t_rat);
            if diff.abs() > tol {
                return Err(SdcError::InconsistentHierarchy(format!(
                    "coarse node {} does not coincide with fine node {}",
                    m,
                    m * t_rat
                )));
            }
        }

        // Lagrange basis of the coarse nodes evaluated at the fine nodes
        let mut interp = DMatrix::<T>::zeros(nf, nc);
        for mf in 0..nf {
            let x = fine.node(mf);
            for jc in 0..nc {
                let mut w = T::one();
                for lc in 0..nc {
                    if lc == jc {
                        continue;
                    }
                    w *= (x - coarse.node(lc)) / (coarse.node(jc) - coarse.node(lc));
                }
                interp[(mf, jc)] = w;
            }
        }

        Ok(Self {
            interp,
            t_rat,
            spatial,
        })
    }

    pub fn t_rat(&self) -> usize {
        self.t_rat
    }

    pub fn interp_matrix(&self) -> &DMatrix<T> {
        &self.interp
    }
}

impl<T, S, SP> Transfer<T, S> for TimeMatTransfer<T, SP>
where
    T: Scalar,
    S: Sweeper<T>,
    SP: SpatialTransfer<T, S::Encap>,
{
    fn interpolate_initial(&self, fine: &mut S, coarse: &S) {
        let mut restricted = coarse.new_encap();
        self.spatial.restrict(fine.start_state(), &mut restricted);

        let mut delta = coarse.new_encap();
        delta.copy_from(coarse.start_state());
        delta.axpy(-T::one(), &restricted);

        let mut fine_delta = fine.new_encap();
        self.spatial.interpolate(&delta, &mut fine_delta);
        fine.start_state_mut().axpy(T::one(), &fine_delta);
    }

    fn interpolate(&self, fine: &mut S, coarse: &S, initial: bool) {
        if initial {
            self.interpolate_initial(fine, coarse);
        }
        tracing::debug!(t_rat = self.t_rat, "interpolating coarse correction");

        let nc = coarse.num_nodes();
        let nf = fine.num_nodes();

        // coarse-space deltas at the coarse nodes
        let mut deltas = Vec::with_capacity(nc);
        for j in 0..nc {
            let mut restricted = coarse.new_encap();
            self.spatial.restrict(fine.state(j * self.t_rat), &mut restricted);
            let mut delta = coarse.new_encap();
            delta.copy_from(coarse.state(j));
            delta.axpy(-T::one(), &restricted);
            deltas.push(delta);
        }

        for m in 0..nf {
            let mut combined = coarse.new_encap();
            for (j, delta) in deltas.iter().enumerate() {
                let w = self.interp[(m, j)];
                if !w.is_zero() {
                    combined.axpy(w, delta);
                }
            }
            let mut fine_delta = fine.new_encap();
            self.spatial.interpolate(&combined, &mut fine_delta);
            fine.states_mut().u[m].axpy(T::one(), &fine_delta);
        }

        fine.evaluate_all();
        fine.save();
    }

    fn restrict_initial(&self, coarse: &mut S, fine: &S) {
        let mut restricted = coarse.new_encap();
        self.spatial.restrict(fine.start_state(), &mut restricted);
        coarse.set_start_state(&restricted);
    }

    fn restrict(&self, coarse: &mut S, fine: &S, initial: bool) {
        if initial {
            self.restrict_initial(coarse, fine);
        }
        tracing::debug!(t_rat = self.t_rat, "restricting fine state");

        let nc = coarse.num_nodes();
        let mut tmp = coarse.new_encap();
        for j in 0..nc {
            self.spatial.restrict(fine.state(j * self.t_rat), &mut tmp);
            coarse.set_state(j, &tmp);
        }
        coarse.evaluate_all();
        coarse.save();
        coarse.mark_provisional();
    }

    fn fas(&self, dt: T, coarse: &mut S, fine: &S) {
        tracing::debug!("computing coarse-level correction");
        let fine_int = fine.integrate(dt);
        let coarse_int = coarse.integrate(dt);

        let nc = coarse.num_nodes();
        for m in 0..nc {
            let mut tau = coarse.new_encap();
            self.spatial.restrict(&fine_int[m * self.t_rat], &mut tau);
            tau.axpy(-T::one(), &coarse_int[m]);
            coarse.set_tau(m, &tau);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encap::{VectorEncap, VectorFactory};
    use crate::quadrature::QuadratureType;
    use crate::sweeper::imex::ImexSweeper;
    use crate::test_problems::dahlquist::Dahlquist;

    type Swp = ImexSweeper<f64, Dahlquist<f64>, VectorFactory<f64>>;

    fn level(nnodes: usize) -> Swp {
        let quad = Quadrature::new(QuadratureType::GaussLobatto, nnodes).unwrap();
        ImexSweeper::new(Dahlquist::new(0.0, -1.0), quad, VectorFactory::new(1))
    }

    #[test]
    fn test_interp_matrix_is_identity_for_matching_nodes() {
        let q = Quadrature::<f64>::new(QuadratureType::GaussLobatto, 5).unwrap();
        let tr = TimeMatTransfer::new(&q, &q, Injection).unwrap();
        assert_eq!(tr.t_rat(), 1);
        for m in 0..5 {
            for j in 0..5 {
                let expected = if m == j { 1.0 } else { 0.0 };
                assert!((tr.interp_matrix()[(m, j)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_nested_lobatto_nodes() {
        let coarse = Quadrature::<f64>::new(QuadratureType::GaussLobatto, 3).unwrap();
        let fine = Quadrature::<f64>::new(QuadratureType::GaussLobatto, 5).unwrap();
        let tr = TimeMatTransfer::new(&coarse, &fine, Injection).unwrap();
        assert_eq!(tr.t_rat(), 2);
        // each row of the reconstruction matrix is a partition of unity
        for m in 0..5 {
            let sum: f64 = (0..3).map(|j| tr.interp_matrix()[(m, j)]).sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rejects_non_nested_hierarchy() {
        let coarse = Quadrature::<f64>::new(QuadratureType::GaussLobatto, 3).unwrap();
        let fine = Quadrature::<f64>::new(QuadratureType::GaussLegendre, 5).unwrap();
        assert!(matches!(
            TimeMatTransfer::new(&coarse, &fine, Injection),
            Err(SdcError::InconsistentHierarchy(_))
        ));
    }

    #[test]
    fn test_restrict_and_interpolate_roundtrip() {
        let mut fine = level(5);
        let mut coarse = level(3);
        fine.setup(false).unwrap();
        coarse.setup(true).unwrap();
        let dt = 0.1;
        fine.set_step(0.0, dt);
        coarse.set_step(0.0, dt);

        // constant-in-time state: both levels resolve it exactly, so the
        // correction must vanish
        fine.set_start_state(&VectorEncap::from_vec(vec![1.0]));
        fine.spread();
        fine.evaluate_all();
        fine.save();
        fine.mark_provisional();

        let tr = TimeMatTransfer::new(
            coarse.quadrature(),
            fine.quadrature(),
            Injection,
        )
        .unwrap();

        tr.restrict(&mut coarse, &fine, true);
        for j in 0..3 {
            coarse
                .state(j)
                .assert_close(fine.state(2 * j), 1e-14);
        }

        // with identical content the correction vanishes
        tr.fas(dt, &mut coarse, &fine);
        for m in 0..3 {
            assert!(coarse.tau(m).unwrap().norm_inf() < 1e-13);
        }

        // interpolating straight back must not change the fine level
        let before: Vec<f64> = (0..5).map(|m| fine.state(m).0[0]).collect();
        tr.interpolate(&mut fine, &coarse, false);
        for m in 0..5 {
            assert!((fine.state(m).0[0] - before[m]).abs() < 1e-12);
        }
    }
}
