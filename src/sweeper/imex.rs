use num_traits::{One, Zero};

use super::{warn_on_failure, NodeStates, SolveOutcome, Sweeper, SweeperStatus};
use crate::{
    encap::{EncapFactory, Encapsulation},
    errors::SdcError,
    quadrature::Quadrature,
    Scalar,
};

/// Right hand side split into a non-stiff explicit part and a stiff implicit
/// part, `u' = f_expl(u, t) + f_impl(u, t)`, with a caller-supplied backward
/// Euler solve for the implicit part.
pub trait ImexProblem<T: Scalar> {
    type Encap: Encapsulation<T>;

    fn eval_expl(&mut self, u: &Self::Encap, t: T, f: &mut Self::Encap);

    fn eval_impl(&mut self, u: &Self::Encap, t: T, f: &mut Self::Encap);

    /// Solve `u - dt * f_impl(u, t) = rhs` for `u` and store `f_impl(u, t)`
    /// in `f`. The returned state is kept even on non-convergence.
    fn solve_impl(
        &mut self,
        u: &mut Self::Encap,
        t: T,
        dt: T,
        rhs: &Self::Encap,
        f: &mut Self::Encap,
    ) -> SolveOutcome;
}

/// Implicit-explicit sweeper: an Euler-like substep per node pair with the
/// deferred-correction terms of the previous iterate.
pub struct ImexSweeper<T, P, F>
where
    T: Scalar,
    P: ImexProblem<T>,
    F: EncapFactory<T, Encap = P::Encap>,
{
    problem: P,
    factory: F,
    quad: Quadrature<T>,
    states: NodeStates<T, P::Encap>,
    f_expl: Vec<P::Encap>,
    f_impl: Vec<P::Encap>,
    f_expl_saved: Vec<P::Encap>,
    f_impl_saved: Vec<P::Encap>,
    num_f_evals: usize,
    num_solves: usize,
}

impl<T, P, F> ImexSweeper<T, P, F>
where
    T: Scalar,
    P: ImexProblem<T>,
    F: EncapFactory<T, Encap = P::Encap>,
{
    pub fn new(problem: P, quad: Quadrature<T>, factory: F) -> Self {
        let n = quad.num_nodes();
        let states = NodeStates::new(&factory, n);
        let alloc = |_: usize| factory.create();
        Self {
            f_expl: (0..n).map(alloc).collect(),
            f_impl: (0..n).map(alloc).collect(),
            f_expl_saved: (0..n).map(alloc).collect(),
            f_impl_saved: (0..n).map(alloc).collect(),
            problem,
            factory,
            quad,
            states,
            num_f_evals: 0,
            num_solves: 0,
        }
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn problem_mut(&mut self) -> &mut P {
        &mut self.problem
    }

    pub fn num_f_evals(&self) -> usize {
        self.num_f_evals
    }

    pub fn num_solves(&self) -> usize {
        self.num_solves
    }

    /// Node-to-node integrals of the saved right hand side, including the
    /// node-to-node difference of the coarse-level correction. Entry 0 covers
    /// the segment from the interval start to the first node.
    fn substep_integrals(&self) -> Vec<P::Encap> {
        let n = self.quad.num_nodes();
        let dt = self.states.dt;
        let mut out = Vec::with_capacity(n);
        for m in 0..n {
            let mut acc = self.factory.create();
            for j in 0..n {
                let w = if m == 0 {
                    if self.quad.left_is_node() {
                        T::zero()
                    } else {
                        dt * self.quad.q()[(0, j)]
                    }
                } else {
                    dt * self.quad.s()[(m, j)]
                };
                if !w.is_zero() {
                    acc.axpy(w, &self.f_expl_saved[j]);
                    acc.axpy(w, &self.f_impl_saved[j]);
                }
            }
            if let Some(tau) = self.states.tau.as_ref() {
                acc.axpy(T::one(), &tau[m]);
                if m > 0 {
                    acc.axpy(-T::one(), &tau[m - 1]);
                }
            }
            out.push(acc);
        }
        out
    }

    /// Implicit-explicit substep targeting node `m`, from `rhs` assembled by
    /// the caller.
    fn solve_node(&mut self, m: usize, ds: T, rhs: &P::Encap) {
        let tm = self.states.t + self.states.dt * self.quad.node(m);
        let outcome = self
            .problem
            .solve_impl(&mut self.states.u[m], tm, ds, rhs, &mut self.f_impl[m]);
        warn_on_failure(&outcome);
        self.problem
            .eval_expl(&self.states.u[m], tm, &mut self.f_expl[m]);
        self.num_solves += 1;
        self.num_f_evals += 1;
    }
}

impl<T, P, F> Sweeper<T> for ImexSweeper<T, P, F>
where
    T: Scalar,
    P: ImexProblem<T>,
    F: EncapFactory<T, Encap = P::Encap>,
{
    type Encap = P::Encap;

    fn states(&self) -> &NodeStates<T, P::Encap> {
        &self.states
    }

    fn states_mut(&mut self) -> &mut NodeStates<T, P::Encap> {
        &mut self.states
    }

    fn quadrature(&self) -> &Quadrature<T> {
        &self.quad
    }

    fn new_encap(&self) -> P::Encap {
        self.factory.create()
    }

    fn add_f(&self, m: usize, a: T, dst: &mut P::Encap) {
        dst.axpy(a, &self.f_expl[m]);
        dst.axpy(a, &self.f_impl[m]);
    }

    fn setup(&mut self, coarse: bool) -> Result<(), SdcError> {
        if coarse {
            self.states.allocate_tau(&self.factory);
        }
        Ok(())
    }

    fn evaluate(&mut self, m: usize) {
        let tm = self.states.t + self.states.dt * self.quad.node(m);
        self.problem
            .eval_expl(&self.states.u[m], tm, &mut self.f_expl[m]);
        self.problem
            .eval_impl(&self.states.u[m], tm, &mut self.f_impl[m]);
        self.num_f_evals += 1;
    }

    fn save(&mut self) {
        self.states.save_u();
        for (saved, current) in self.f_expl_saved.iter_mut().zip(self.f_expl.iter()) {
            saved.copy_from(current);
        }
        for (saved, current) in self.f_impl_saved.iter_mut().zip(self.f_impl.iter()) {
            saved.copy_from(current);
        }
    }

    fn shift_f(&mut self) {
        let last = self.quad.num_nodes() - 1;
        if last == 0 {
            return;
        }
        let (head, tail) = self.f_expl.split_at_mut(last);
        head[0].copy_from(&tail[0]);
        let (head, tail) = self.f_impl.split_at_mut(last);
        head[0].copy_from(&tail[0]);
    }

    /// Provisional solution by implicit-explicit Euler substeps node to node.
    fn predict(&mut self, _first_step: bool) {
        let n = self.quad.num_nodes();
        let t = self.states.t;
        let dt = self.states.dt;
        tracing::debug!(t = t.to_f64(), dt = dt.to_f64(), "predicting");

        if self.quad.left_is_node() {
            let NodeStates { u, u_start, .. } = &mut self.states;
            u[0].copy_from(u_start);
            self.evaluate(0);
        } else {
            let ds = dt * self.quad.node_spacing(0);
            let mut f0 = self.factory.create();
            self.problem.eval_expl(&self.states.u_start, t, &mut f0);
            let mut rhs = self.states.u_start.clone();
            rhs.axpy(ds, &f0);
            self.solve_node(0, ds, &rhs);
        }

        for m in 0..n - 1 {
            let ds = dt * (self.quad.node(m + 1) - self.quad.node(m));
            let mut rhs = self.states.u[m].clone();
            rhs.axpy(ds, &self.f_expl[m]);
            self.solve_node(m + 1, ds, &rhs);
        }

        self.compute_end_state();
        self.save();
        self.states.status = SweeperStatus::Provisional;
    }

    fn sweep(&mut self) {
        debug_assert!(
            self.states.status != SweeperStatus::New,
            "sweep called before predict"
        );
        let n = self.quad.num_nodes();
        let t = self.states.t;
        let dt = self.states.dt;
        tracing::debug!(t = t.to_f64(), dt = dt.to_f64(), "sweeping");

        let integrals = self.substep_integrals();

        if self.quad.left_is_node() {
            let NodeStates { u, u_start, .. } = &mut self.states;
            u[0].copy_from(u_start);
            self.evaluate(0);
        } else {
            // explicit terms at the fixed start state cancel between iterates
            let ds = dt * self.quad.node_spacing(0);
            let mut rhs = self.states.u_start.clone();
            rhs.axpy(-ds, &self.f_impl_saved[0]);
            rhs.axpy(T::one(), &integrals[0]);
            self.solve_node(0, ds, &rhs);
        }

        for m in 0..n - 1 {
            let ds = dt * (self.quad.node(m + 1) - self.quad.node(m));
            let mut rhs = self.states.u[m].clone();
            rhs.axpy(ds, &self.f_expl[m]);
            rhs.axpy(-ds, &self.f_expl_saved[m]);
            rhs.axpy(-ds, &self.f_impl_saved[m + 1]);
            rhs.axpy(T::one(), &integrals[m + 1]);
            self.solve_node(m + 1, ds, &rhs);
        }

        self.compute_end_state();
        self.save();
        self.states.iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encap::{VectorEncap, VectorFactory};
    use crate::quadrature::QuadratureType;
    use crate::test_problems::dahlquist::Dahlquist;
    use nalgebra::{DMatrix, DVector};

    type Swp = ImexSweeper<f64, Dahlquist<f64>, VectorFactory<f64>>;

    fn make_sweeper(qtype: QuadratureType, nnodes: usize) -> Swp {
        let quad = Quadrature::new(qtype, nnodes).unwrap();
        ImexSweeper::new(Dahlquist::new(-0.4, -0.6), quad, VectorFactory::new(1))
    }

    #[test]
    fn test_spread_and_predict_state() {
        let mut s = make_sweeper(QuadratureType::GaussLobatto, 5);
        s.setup(false).unwrap();
        s.set_step(0.0, 0.1);
        s.set_start_state(&VectorEncap::from_vec(vec![1.0]));

        s.spread();
        for m in 0..5 {
            assert_eq!(s.state(m).0[0], 1.0);
        }

        s.spread();
        s.evaluate_all();
        // f = (lambda_e + lambda_i) * u = -1.0 at every node after a spread
        for m in 0..5 {
            let mut f = s.new_encap();
            s.add_f(m, 1.0, &mut f);
            assert!((f.0[0] + 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn test_sweep_keeps_collocation_fixed_point() {
        let mut s = make_sweeper(QuadratureType::GaussLobatto, 5);
        s.setup(false).unwrap();
        let dt = 0.1;
        s.set_step(0.0, dt);
        s.set_start_state(&VectorEncap::from_vec(vec![1.0]));

        // collocation solution of u' = lambda * u on one step:
        // (I - lambda * dt * Q) U = u0
        let lambda = -1.0;
        let n = 5;
        let mut mat = DMatrix::<f64>::identity(n, n);
        for m in 0..n {
            for j in 0..n {
                mat[(m, j)] -= lambda * dt * s.quadrature().q()[(m, j)];
            }
        }
        let rhs = DVector::from_element(n, 1.0);
        let colloc = mat.lu().solve(&rhs).unwrap();

        for m in 0..n {
            s.set_state(m, &VectorEncap::from_vec(vec![colloc[m]]));
        }
        s.evaluate_all();
        s.save();
        s.mark_provisional();

        let res = s.residual_norm(dt);
        assert!(res < 1e-12, "collocation residual {}", res);

        s.sweep();
        for m in 0..n {
            assert!(
                (s.state(m).0[0] - colloc[m]).abs() < 1e-12,
                "node {} moved away from the fixed point",
                m
            );
        }
    }

    #[test]
    fn test_advance_shifts_state() {
        let mut s = make_sweeper(QuadratureType::GaussLobatto, 3);
        s.setup(false).unwrap();
        s.set_step(0.0, 0.1);
        s.set_start_state(&VectorEncap::from_vec(vec![1.0]));
        s.predict(true);
        s.sweep();

        let end = s.end_state().clone();
        s.advance();
        assert_eq!(s.start_state().0[0], end.0[0]);
        assert_eq!(s.status(), SweeperStatus::New);
        assert_eq!(s.states().step, 1);
    }

    #[test]
    fn test_gauss_legendre_end_state_integration() {
        // left and right endpoints are not nodes; the end state comes from
        // the closing integration row
        let mut s = make_sweeper(QuadratureType::GaussLegendre, 3);
        s.setup(false).unwrap();
        let dt = 0.05;
        s.set_step(0.0, dt);
        s.set_start_state(&VectorEncap::from_vec(vec![1.0]));
        s.predict(true);
        for _ in 0..6 {
            s.sweep();
        }
        let exact = (-1.0f64 * dt).exp();
        assert!((s.end_state().0[0] - exact).abs() < 1e-10);
    }
}
