use num_traits::{One, Zero};

use super::{warn_on_failure, NodeStates, SolveOutcome, Sweeper, SweeperStatus};
use crate::{
    encap::{EncapFactory, Encapsulation},
    errors::SdcError,
    quadrature::Quadrature,
    Scalar,
};

/// Fully implicit right hand side `u' = f(u, t)` with a caller-supplied
/// backward Euler solve.
pub trait ImplicitProblem<T: Scalar> {
    type Encap: Encapsulation<T>;

    fn eval_rhs(&mut self, u: &Self::Encap, t: T, f: &mut Self::Encap);

    /// Solve `u - dt * f(u, t) = rhs` for `u` and store `f(u, t)` in `f`.
    fn solve(
        &mut self,
        u: &mut Self::Encap,
        t: T,
        dt: T,
        rhs: &Self::Encap,
        f: &mut Self::Encap,
    ) -> SolveOutcome;
}

/// Implicit-only specialization of the node-to-node sweep: the explicit term
/// is absent and every substep is a corrected backward Euler solve.
pub struct ImplicitSweeper<T, P, F>
where
    T: Scalar,
    P: ImplicitProblem<T>,
    F: EncapFactory<T, Encap = P::Encap>,
{
    problem: P,
    factory: F,
    quad: Quadrature<T>,
    states: NodeStates<T, P::Encap>,
    f: Vec<P::Encap>,
    f_saved: Vec<P::Encap>,
    num_f_evals: usize,
    num_solves: usize,
}

impl<T, P, F> ImplicitSweeper<T, P, F>
where
    T: Scalar,
    P: ImplicitProblem<T>,
    F: EncapFactory<T, Encap = P::Encap>,
{
    pub fn new(problem: P, quad: Quadrature<T>, factory: F) -> Self {
        let n = quad.num_nodes();
        let states = NodeStates::new(&factory, n);
        Self {
            f: (0..n).map(|_| factory.create()).collect(),
            f_saved: (0..n).map(|_| factory.create()).collect(),
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
                    acc.axpy(w, &self.f_saved[j]);
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

    fn solve_node(&mut self, m: usize, ds: T, rhs: &P::Encap) {
        let tm = self.states.t + self.states.dt * self.quad.node(m);
        let outcome = self
            .problem
            .solve(&mut self.states.u[m], tm, ds, rhs, &mut self.f[m]);
        warn_on_failure(&outcome);
        self.num_solves += 1;
    }
}

impl<T, P, F> Sweeper<T> for ImplicitSweeper<T, P, F>
where
    T: Scalar,
    P: ImplicitProblem<T>,
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
        dst.axpy(a, &self.f[m]);
    }

    fn setup(&mut self, coarse: bool) -> Result<(), SdcError> {
        if coarse {
            self.states.allocate_tau(&self.factory);
        }
        Ok(())
    }

    fn evaluate(&mut self, m: usize) {
        let tm = self.states.t + self.states.dt * self.quad.node(m);
        self.problem.eval_rhs(&self.states.u[m], tm, &mut self.f[m]);
        self.num_f_evals += 1;
    }

    fn save(&mut self) {
        self.states.save_u();
        for (saved, current) in self.f_saved.iter_mut().zip(self.f.iter()) {
            saved.copy_from(current);
        }
    }

    fn shift_f(&mut self) {
        let last = self.quad.num_nodes() - 1;
        if last == 0 {
            return;
        }
        let (head, tail) = self.f.split_at_mut(last);
        head[0].copy_from(&tail[0]);
    }

    /// Provisional solution by backward Euler substeps node to node.
    fn predict(&mut self, _first_step: bool) {
        let n = self.quad.num_nodes();
        let dt = self.states.dt;

        if self.quad.left_is_node() {
            let NodeStates { u, u_start, .. } = &mut self.states;
            u[0].copy_from(u_start);
            self.evaluate(0);
        } else {
            let ds = dt * self.quad.node_spacing(0);
            let rhs = self.states.u_start.clone();
            self.solve_node(0, ds, &rhs);
        }

        for m in 0..n - 1 {
            let ds = dt * (self.quad.node(m + 1) - self.quad.node(m));
            let rhs = self.states.u[m].clone();
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
        let dt = self.states.dt;

        let integrals = self.substep_integrals();

        if self.quad.left_is_node() {
            let NodeStates { u, u_start, .. } = &mut self.states;
            u[0].copy_from(u_start);
            self.evaluate(0);
        } else {
            let ds = dt * self.quad.node_spacing(0);
            let mut rhs = self.states.u_start.clone();
            rhs.axpy(-ds, &self.f_saved[0]);
            rhs.axpy(T::one(), &integrals[0]);
            self.solve_node(0, ds, &rhs);
        }

        for m in 0..n - 1 {
            let ds = dt * (self.quad.node(m + 1) - self.quad.node(m));
            let mut rhs = self.states.u[m].clone();
            rhs.axpy(-ds, &self.f_saved[m + 1]);
            rhs.axpy(T::one(), &integrals[m + 1]);
            self.solve_node(m + 1, ds, &rhs);
        }

        self.compute_end_state();
        self.save();
        self.states.iteration += 1;
    }
}
