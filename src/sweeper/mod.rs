use num_traits::{One, Zero};

use crate::{
    encap::{EncapFactory, Encapsulation},
    errors::SdcError,
    quadrature::Quadrature,
    Scalar,
};

pub mod boris;
pub mod explicit;
pub mod imex;
pub mod implicit;

pub use boris::{BorisSweeper, CloudComponent, CloudFactory, CloudLog, CloudState, FieldProblem};
pub use explicit::{ExplicitProblem, ExplicitSweeper};
pub use imex::{ImexProblem, ImexSweeper};
pub use implicit::{ImplicitProblem, ImplicitSweeper};

/// Per-step life cycle of a sweeper. `predict` moves `New` to `Provisional`,
/// `advance` returns to `New` for the next step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweeperStatus {
    New,
    Provisional,
    Converged,
}

/// Outcome of a caller-supplied implicit solve. Non-convergence is best
/// effort, not an error: the sweeper logs it and keeps the returned state.
#[derive(Clone, Copy, Debug)]
pub enum SolveOutcome {
    Converged { iterations: usize },
    MaxIterations { residual: f64 },
}

pub(crate) fn warn_on_failure(outcome: &SolveOutcome) {
    if let SolveOutcome::MaxIterations { residual } = outcome {
        tracing::warn!(residual, "implicit solve did not converge, continuing with best estimate");
    }
}

/// Node-indexed solution storage shared by all sweepers: the state at every
/// quadrature node, the saved copy from the previous iteration, start and end
/// states, and the coarse-level correction when one is allocated.
#[derive(Clone, Debug)]
pub struct NodeStates<T: Scalar, E> {
    pub u: Vec<E>,
    pub u_saved: Vec<E>,
    pub u_start: E,
    pub u_end: E,
    pub tau: Option<Vec<E>>,
    pub t: T,
    pub dt: T,
    pub abs_res_tol: T,
    pub rel_res_tol: T,
    pub status: SweeperStatus,
    pub step: usize,
    pub iteration: usize,
}

impl<T: Scalar, E: Encapsulation<T>> NodeStates<T, E> {
    pub fn new<F>(factory: &F, num_nodes: usize) -> Self
    where
        F: EncapFactory<T, Encap = E>,
    {
        Self {
            u: (0..num_nodes).map(|_| factory.create()).collect(),
            u_saved: (0..num_nodes).map(|_| factory.create()).collect(),
            u_start: factory.create(),
            u_end: factory.create(),
            tau: None,
            t: T::zero(),
            dt: T::zero(),
            abs_res_tol: T::zero(),
            rel_res_tol: T::zero(),
            status: SweeperStatus::New,
            step: 0,
            iteration: 0,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.u.len()
    }

    pub fn allocate_tau<F>(&mut self, factory: &F)
    where
        F: EncapFactory<T, Encap = E>,
    {
        if self.tau.is_none() {
            self.tau = Some((0..self.u.len()).map(|_| factory.create()).collect());
        }
    }

    pub fn save_u(&mut self) {
        for (saved, current) in self.u_saved.iter_mut().zip(self.u.iter()) {
            saved.copy_from(current);
        }
    }
}

/// One level of the hierarchy: the state machine that performs a single
/// deferred-correction iteration on its quadrature nodes.
///
/// Concrete sweepers implement storage access, right-hand-side evaluation and
/// the inner sweep equation; node-to-node bookkeeping (integrals, residuals,
/// state shifting) is provided on top of those.
pub trait Sweeper<T: Scalar> {
    type Encap: Encapsulation<T>;

    fn states(&self) -> &NodeStates<T, Self::Encap>;

    fn states_mut(&mut self) -> &mut NodeStates<T, Self::Encap>;

    fn quadrature(&self) -> &Quadrature<T>;

    /// A freshly zeroed encapsulation of this level's shape.
    fn new_encap(&self) -> Self::Encap;

    /// `dst <- dst + a * F_m` with all right-hand-side parts combined.
    fn add_f(&self, m: usize, a: T, dst: &mut Self::Encap);

    /// Allocate derived storage; `coarse` levels get correction storage.
    fn setup(&mut self, coarse: bool) -> Result<(), SdcError>;

    /// Recompute the right hand side at node `m` from the current state.
    fn evaluate(&mut self, m: usize);

    /// Snapshot states and right hand sides for the next iteration.
    fn save(&mut self);

    /// Perform one deferred-correction iteration over all nodes.
    fn sweep(&mut self);

    /// Move the last node's right-hand-side data to node 0 after a step.
    fn shift_f(&mut self);

    // ---- provided operations ----

    fn num_nodes(&self) -> usize {
        self.quadrature().num_nodes()
    }

    fn set_step(&mut self, t: T, dt: T) {
        let s = self.states_mut();
        s.t = t;
        s.dt = dt;
    }

    fn time(&self) -> T {
        self.states().t
    }

    fn dt(&self) -> T {
        self.states().dt
    }

    fn node_time(&self, m: usize) -> T {
        self.states().t + self.states().dt * self.quadrature().node(m)
    }

    fn set_tolerances(&mut self, abs_res_tol: T, rel_res_tol: T) {
        let s = self.states_mut();
        s.abs_res_tol = abs_res_tol;
        s.rel_res_tol = rel_res_tol;
    }

    fn set_start_state(&mut self, u0: &Self::Encap) {
        self.states_mut().u_start.copy_from(u0);
    }

    fn start_state(&self) -> &Self::Encap {
        &self.states().u_start
    }

    fn start_state_mut(&mut self) -> &mut Self::Encap {
        &mut self.states_mut().u_start
    }

    fn end_state(&self) -> &Self::Encap {
        &self.states().u_end
    }

    fn state(&self, m: usize) -> &Self::Encap {
        &self.states().u[m]
    }

    fn set_state(&mut self, m: usize, value: &Self::Encap) {
        self.states_mut().u[m].copy_from(value);
    }

    fn saved_state(&self, m: usize) -> &Self::Encap {
        &self.states().u_saved[m]
    }

    fn tau(&self, m: usize) -> Option<&Self::Encap> {
        self.states().tau.as_ref().map(|tau| &tau[m])
    }

    fn set_tau(&mut self, m: usize, value: &Self::Encap) {
        let s = self.states_mut();
        debug_assert!(s.tau.is_some(), "correction storage missing, setup(true) not called");
        if let Some(tau) = s.tau.as_mut() {
            tau[m].copy_from(value);
        }
    }

    /// Reset the coarse-level correction, e.g. when a new step begins before
    /// it has been recomputed.
    fn clear_tau(&mut self) {
        if let Some(tau) = self.states_mut().tau.as_mut() {
            for value in tau.iter_mut() {
                value.zero();
            }
        }
    }

    fn status(&self) -> SweeperStatus {
        self.states().status
    }

    fn mark_provisional(&mut self) {
        self.states_mut().status = SweeperStatus::Provisional;
    }

    fn mark_converged(&mut self) {
        self.states_mut().status = SweeperStatus::Converged;
    }

    /// Initialize every node state with the start state.
    fn spread(&mut self) {
        let s = self.states_mut();
        for um in s.u.iter_mut() {
            um.copy_from(&s.u_start);
        }
    }

    fn evaluate_all(&mut self) {
        for m in 0..self.num_nodes() {
            self.evaluate(m);
        }
    }

    /// Produce a first provisional solution: spread the start state and
    /// evaluate the right hand side everywhere.
    fn predict(&mut self, _first_step: bool) {
        self.spread();
        self.evaluate_all();
        self.compute_end_state();
        self.save();
        self.states_mut().status = SweeperStatus::Provisional;
    }

    /// Update the end state from the node states, integrating the last
    /// sub-interval when the right endpoint is not a node.
    fn compute_end_state(&mut self) {
        if self.quadrature().right_is_node() {
            let s = self.states_mut();
            let last = s.u.len() - 1;
            let NodeStates { u, u_end, .. } = s;
            u_end.copy_from(&u[last]);
        } else {
            let dt = self.states().dt;
            let q_end = self.quadrature().q_end().clone();
            let mut end = self.new_encap();
            end.copy_from(&self.states().u_start);
            for j in 0..self.num_nodes() {
                let w = dt * q_end[j];
                if !w.is_zero() {
                    self.add_f(j, w, &mut end);
                }
            }
            self.states_mut().u_end.copy_from(&end);
        }
    }

    /// `U_start <- U_end`, shift node-0 evaluations, reset for the next step.
    fn advance(&mut self) {
        debug_assert!(
            self.states().status != SweeperStatus::New,
            "advance called before predict"
        );
        let s = self.states_mut();
        let NodeStates {
            u_start,
            u_end,
            status,
            step,
            iteration,
            ..
        } = s;
        u_start.copy_from(u_end);
        *status = SweeperStatus::New;
        *step += 1;
        *iteration = 0;
        self.shift_f();
    }

    /// 0-to-node integrals `I_m = dt * sum_j Q[m, j] F_j`.
    fn integrate(&self, dt: T) -> Vec<Self::Encap> {
        let num_nodes = self.num_nodes();
        let mut out = Vec::with_capacity(num_nodes);
        for m in 0..num_nodes {
            let mut acc = self.new_encap();
            for j in 0..num_nodes {
                let w = dt * self.quadrature().q()[(m, j)];
                if !w.is_zero() {
                    self.add_f(j, w, &mut acc);
                }
            }
            out.push(acc);
        }
        out
    }

    /// `r_m = U_start + dt * sum_j Q[m, j] F_j + tau_m - U_m`.
    fn residual(&self, dt: T) -> Vec<Self::Encap> {
        let mut out = self.integrate(dt);
        let s = self.states();
        for (m, r) in out.iter_mut().enumerate() {
            r.axpy(T::one(), &s.u_start);
            r.axpy(-T::one(), &s.u[m]);
            if let Some(tau) = s.tau.as_ref() {
                r.axpy(T::one(), &tau[m]);
            }
        }
        out
    }

    fn residual_norm(&self, dt: T) -> T {
        let mut max = T::zero();
        for r in self.residual(dt) {
            let norm = r.norm_inf();
            if norm > max {
                max = norm;
            }
        }
        max
    }

    /// Residual convergence check against the configured tolerances. With
    /// both tolerances at zero the sweeper never reports convergence and the
    /// controller runs its full iteration budget.
    fn converged(&self) -> bool {
        let s = self.states();
        if s.abs_res_tol <= T::zero() && s.rel_res_tol <= T::zero() {
            return false;
        }
        let res = self.residual_norm(s.dt);
        if s.abs_res_tol > T::zero() && res < s.abs_res_tol {
            return true;
        }
        s.rel_res_tol > T::zero() && res < s.rel_res_tol * s.u_start.norm_inf()
    }
}
