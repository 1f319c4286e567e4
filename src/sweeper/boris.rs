use std::path::Path;

use nalgebra::{ComplexField, DMatrix, Vector3};
use num_traits::{One, Zero};

use super::{NodeStates, Sweeper, SweeperStatus};
use crate::{
    encap::{EncapFactory, Encapsulation},
    errors::SdcError,
    quadrature::Quadrature,
    Scalar,
};

/// Per-particle vector quantity (force, field, velocity) of a cloud.
pub type CloudComponent<T> = Vec<Vector3<T>>;

/// Phase-space state of an N-particle cloud: positions and velocities.
#[derive(Clone, Debug, PartialEq)]
pub struct CloudState<T: Scalar> {
    pub positions: Vec<Vector3<T>>,
    pub velocities: Vec<Vector3<T>>,
}

impl<T: Scalar> CloudState<T> {
    pub fn zeros(num_particles: usize) -> Self {
        Self {
            positions: vec![Vector3::zeros(); num_particles],
            velocities: vec![Vector3::zeros(); num_particles],
        }
    }

    pub fn num_particles(&self) -> usize {
        self.positions.len()
    }

    pub fn center_of_mass(&self) -> Vector3<T> {
        let mut center = Vector3::zeros();
        for p in &self.positions {
            center += *p;
        }
        center / <T as Scalar>::from_usize(self.positions.len().max(1))
    }
}

impl<T: Scalar> Encapsulation<T> for CloudState<T> {
    fn zero(&mut self) {
        for p in self.positions.iter_mut() {
            p.fill(T::zero());
        }
        for v in self.velocities.iter_mut() {
            v.fill(T::zero());
        }
    }

    fn copy_from(&mut self, other: &Self) {
        self.positions.copy_from_slice(&other.positions);
        self.velocities.copy_from_slice(&other.velocities);
    }

    fn axpy(&mut self, a: T, x: &Self) {
        for (mine, theirs) in self.positions.iter_mut().zip(x.positions.iter()) {
            *mine += *theirs * a;
        }
        for (mine, theirs) in self.velocities.iter_mut().zip(x.velocities.iter()) {
            *mine += *theirs * a;
        }
    }

    fn norm_inf(&self) -> T {
        let mut max = T::zero();
        for v in self.positions.iter().chain(self.velocities.iter()) {
            for i in 0..3 {
                let abs = v[i].abs();
                if abs > max {
                    max = abs;
                }
            }
        }
        max
    }

    fn len(&self) -> usize {
        6 * self.positions.len()
    }

    fn pack(&self, buf: &mut Vec<T>) {
        for v in self.positions.iter().chain(self.velocities.iter()) {
            buf.extend_from_slice(&[v[0], v[1], v[2]]);
        }
    }

    fn unpack(&mut self, buf: &[T]) {
        debug_assert_eq!(buf.len(), self.len());
        let n = self.positions.len();
        for (p, chunk) in self.positions.iter_mut().zip(buf[..3 * n].chunks_exact(3)) {
            *p = Vector3::new(chunk[0], chunk[1], chunk[2]);
        }
        for (v, chunk) in self.velocities.iter_mut().zip(buf[3 * n..].chunks_exact(3)) {
            *v = Vector3::new(chunk[0], chunk[1], chunk[2]);
        }
    }
}

/// Factory for zeroed particle clouds of a fixed particle count.
#[derive(Clone, Debug)]
pub struct CloudFactory<T: Scalar> {
    num_particles: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> CloudFactory<T> {
    pub fn new(num_particles: usize) -> Self {
        Self {
            num_particles,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }
}

impl<T: Scalar> EncapFactory<T> for CloudFactory<T> {
    type Encap = CloudState<T>;

    fn create(&self) -> CloudState<T> {
        CloudState::zeros(self.num_particles)
    }

    fn dofs(&self) -> usize {
        6 * self.num_particles
    }
}

/// Electromagnetic field seen by the cloud, pre-scaled by the charge-to-mass
/// ratio: `e_field` yields the electric acceleration per particle,
/// `b_field` the scaled magnetic vector entering the rotation.
pub trait FieldProblem<T: Scalar> {
    fn e_field(&mut self, cloud: &CloudState<T>, t: T, out: &mut [Vector3<T>]);

    fn b_field(&mut self, cloud: &CloudState<T>, t: T, out: &mut [Vector3<T>]);

    /// Total energy of the cloud, used for drift diagnostics.
    fn energy(&mut self, cloud: &CloudState<T>, t: T) -> T;
}

/// CSV sink for per-sweep particle data, one line per particle plus a
/// centre-of-mass line with particle index -1.
pub struct CloudLog {
    writer: csv::Writer<std::fs::File>,
}

impl CloudLog {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SdcError> {
        let mut writer =
            csv::Writer::from_path(path).map_err(|err| SdcError::Output(err.to_string()))?;
        writer
            .write_record([
                "step", "iter", "particle", "x", "y", "z", "u", "v", "w", "energy", "drift",
                "residual",
            ])
            .map_err(|err| SdcError::Output(err.to_string()))?;
        Ok(Self { writer })
    }

    fn write_row(
        &mut self,
        step: usize,
        iter: usize,
        particle: i64,
        pos: [f64; 3],
        vel: [f64; 3],
        energy: f64,
        drift: f64,
        residual: f64,
    ) -> Result<(), SdcError> {
        self.writer
            .write_record([
                step.to_string(),
                iter.to_string(),
                particle.to_string(),
                format!("{:.16}", pos[0]),
                format!("{:.16}", pos[1]),
                format!("{:.16}", pos[2]),
                format!("{:.16}", vel[0]),
                format!("{:.16}", vel[1]),
                format!("{:.16}", vel[2]),
                format!("{:.16}", energy),
                format!("{:.16}", drift),
                format!("{:.16}", residual),
            ])
            .map_err(|err| SdcError::Output(err.to_string()))
    }

    pub fn log_cloud<T: Scalar>(
        &mut self,
        step: usize,
        iter: usize,
        cloud: &CloudState<T>,
        energy: T,
        drift: T,
        residual: T,
    ) -> Result<(), SdcError> {
        for (p, (pos, vel)) in cloud
            .positions
            .iter()
            .zip(cloud.velocities.iter())
            .enumerate()
        {
            self.write_row(
                step,
                iter,
                p as i64,
                [pos[0].to_f64(), pos[1].to_f64(), pos[2].to_f64()],
                [vel[0].to_f64(), vel[1].to_f64(), vel[2].to_f64()],
                energy.to_f64(),
                drift.to_f64(),
                residual.to_f64(),
            )?;
        }
        let center = cloud.center_of_mass();
        self.write_row(
            step,
            iter,
            -1,
            [center[0].to_f64(), center[1].to_f64(), center[2].to_f64()],
            [0.0, 0.0, 0.0],
            energy.to_f64(),
            drift.to_f64(),
            residual.to_f64(),
        )?;
        self.writer
            .flush()
            .map_err(|err| SdcError::Output(err.to_string()))
    }
}

/// Second-order sweeper for `x'' = a_E(x, t) + v x b(x, t)`: position update
/// from the iterated integration matrices first, force re-evaluation at the
/// new position, then the velocity rotation update.
pub struct BorisSweeper<T, P>
where
    T: Scalar,
    P: FieldProblem<T>,
{
    problem: P,
    factory: CloudFactory<T>,
    quad: Quadrature<T>,
    states: NodeStates<T, CloudState<T>>,
    e_forces: Vec<CloudComponent<T>>,
    saved_e_forces: Vec<CloudComponent<T>>,
    b_vecs: Vec<CloudComponent<T>>,
    saved_b_vecs: Vec<CloudComponent<T>>,
    s_int: Vec<CloudComponent<T>>,
    ss_int: Vec<CloudComponent<T>>,
    sx: DMatrix<T>,
    initial_energy: T,
    num_f_evals: usize,
    log: Option<CloudLog>,
}

impl<T, P> BorisSweeper<T, P>
where
    T: Scalar,
    P: FieldProblem<T>,
{
    pub fn new(problem: P, quad: Quadrature<T>, factory: CloudFactory<T>) -> Self {
        let n = quad.num_nodes();
        let np = factory.num_particles();
        let states = NodeStates::new(&factory, n);
        let comp = |_: usize| vec![Vector3::zeros(); np];
        Self {
            e_forces: (0..n).map(comp).collect(),
            saved_e_forces: (0..n).map(comp).collect(),
            b_vecs: (0..n).map(comp).collect(),
            saved_b_vecs: (0..n).map(comp).collect(),
            s_int: (0..n).map(comp).collect(),
            ss_int: (0..n).map(comp).collect(),
            sx: DMatrix::zeros(n, n),
            problem,
            factory,
            quad,
            states,
            initial_energy: T::zero(),
            num_f_evals: 0,
            log: None,
        }
    }

    pub fn with_log(mut self, log: CloudLog) -> Self {
        self.log = Some(log);
        self
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

    pub fn sx(&self) -> &DMatrix<T> {
        &self.sx
    }

    /// Record the start-of-run energy for drift diagnostics.
    pub fn set_initial_energy(&mut self) {
        let t = self.states.t;
        self.initial_energy = self.problem.energy(&self.states.u_start, t);
        tracing::info!(energy = self.initial_energy.to_f64(), "initial total energy");
        if let Some(log) = self.log.as_mut() {
            let result = log.log_cloud(
                self.states.step,
                0,
                &self.states.u_start,
                self.initial_energy,
                T::zero(),
                T::zero(),
            );
            if let Err(err) = result {
                tracing::warn!(%err, "failed to write initial particle data");
            }
        }
    }

    /// Acceleration at node `m` from the stored fields, for the current or
    /// the saved iterate.
    fn build_rhs(&self, m: usize, saved: bool) -> CloudComponent<T> {
        let (cloud, forces, b_vecs) = if saved {
            (
                &self.states.u_saved[m],
                &self.saved_e_forces[m],
                &self.saved_b_vecs[m],
            )
        } else {
            (&self.states.u[m], &self.e_forces[m], &self.b_vecs[m])
        };
        cloud
            .velocities
            .iter()
            .zip(forces.iter())
            .zip(b_vecs.iter())
            .map(|((v, f), b)| *f + v.cross(b))
            .collect()
    }

    /// Drift-kick-drift velocity rotation for the substep to node `m + 1`.
    fn boris_solve(&mut self, m: usize, ds: T, c_k: &CloudComponent<T>) {
        let half = <T as Scalar>::from_f64(0.5);
        let two = <T as Scalar>::from_f64(2.0);
        for p in 0..self.factory.num_particles() {
            let e_mean = (self.e_forces[m][p] + self.e_forces[m + 1][p]) * half;
            let c_half = c_k[p] * half;

            // first drift
            let v_minus = self.states.u[m].velocities[p] + e_mean * (ds * half) + c_half;
            // kick
            let t_vec = self.b_vecs[m + 1][p] * (ds * half);
            let v_prime = v_minus + v_minus.cross(&t_vec);
            let s_vec = t_vec * (two / (T::one() + t_vec.norm_squared()));
            let v_plus = v_minus + v_prime.cross(&s_vec);
            // final drift
            self.states.u[m + 1].velocities[p] = v_plus + e_mean * (ds * half) + c_half;
        }
    }

    fn record(&mut self) {
        if self.log.is_none() {
            return;
        }
        let dt = self.states.dt;
        let t_end = self.states.t + dt;
        let residual = self.residual_norm(dt);
        let energy = self.problem.energy(&self.states.u_end, t_end);
        let drift = (self.initial_energy - energy).abs();
        if let Some(log) = self.log.as_mut() {
            let result = log.log_cloud(
                self.states.step,
                self.states.iteration,
                &self.states.u_end,
                energy,
                drift,
                residual,
            );
            if let Err(err) = result {
                tracing::warn!(%err, "failed to write sweep data");
            }
        }
    }
}

impl<T, P> Sweeper<T> for BorisSweeper<T, P>
where
    T: Scalar,
    P: FieldProblem<T>,
{
    type Encap = CloudState<T>;

    fn states(&self) -> &NodeStates<T, CloudState<T>> {
        &self.states
    }

    fn states_mut(&mut self) -> &mut NodeStates<T, CloudState<T>> {
        &mut self.states
    }

    fn quadrature(&self) -> &Quadrature<T> {
        &self.quad
    }

    fn new_encap(&self) -> CloudState<T> {
        self.factory.create()
    }

    fn add_f(&self, m: usize, a: T, dst: &mut CloudState<T>) {
        let rhs = self.build_rhs(m, false);
        for p in 0..self.factory.num_particles() {
            dst.positions[p] += self.states.u[m].velocities[p] * a;
            dst.velocities[p] += rhs[p] * a;
        }
    }

    fn setup(&mut self, coarse: bool) -> Result<(), SdcError> {
        if !self.quad.left_is_node() || !self.quad.right_is_node() {
            return Err(SdcError::EndpointNotNode(self.quad.qtype().to_string()));
        }
        if coarse {
            self.states.allocate_tau(&self.factory);
        }

        // QE strictly lower with the spacing of the column after it, QI lower
        // with first row and column zero
        let n = self.quad.num_nodes();
        let mut qe = DMatrix::<T>::zeros(n, n);
        let mut qi = DMatrix::<T>::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                if j < i {
                    qe[(i, j)] = self.quad.node_spacing(j + 1);
                }
                if j > 0 && j <= i {
                    qi[(i, j)] = self.quad.node_spacing(j);
                }
            }
        }
        let qt = (&qe + &qi) * <T as Scalar>::from_f64(0.5);
        let mut qx = &qe * &qt;
        let half = <T as Scalar>::from_f64(0.5);
        for i in 0..n {
            for j in 0..n {
                qx[(i, j)] += half * qe[(i, j)] * qe[(i, j)];
            }
        }
        self.sx = DMatrix::zeros(n, n);
        for i in 1..n {
            for j in 0..n {
                self.sx[(i, j)] = qx[(i, j)] - qx[(i - 1, j)];
            }
        }
        Ok(())
    }

    fn evaluate(&mut self, m: usize) {
        let tm = self.states.t + self.states.dt * self.quad.node(m);
        self.problem
            .e_field(&self.states.u[m], tm, &mut self.e_forces[m]);
        self.problem
            .b_field(&self.states.u[m], tm, &mut self.b_vecs[m]);
        self.num_f_evals += 1;
    }

    fn save(&mut self) {
        self.states.save_u();
        for (saved, current) in self.saved_e_forces.iter_mut().zip(self.e_forces.iter()) {
            saved.copy_from_slice(current);
        }
        for (saved, current) in self.saved_b_vecs.iter_mut().zip(self.b_vecs.iter()) {
            saved.copy_from_slice(current);
        }
    }

    fn shift_f(&mut self) {
        let last = self.quad.num_nodes() - 1;
        if last == 0 {
            return;
        }
        let (head, tail) = self.e_forces.split_at_mut(last);
        head[0].copy_from_slice(&tail[0]);
        let (head, tail) = self.b_vecs.split_at_mut(last);
        head[0].copy_from_slice(&tail[0]);
    }

    fn predict(&mut self, _first_step: bool) {
        self.spread();
        self.evaluate_all();
        self.compute_end_state();
        self.save();
        self.states.status = SweeperStatus::Provisional;
        self.record();
    }

    fn sweep(&mut self) {
        debug_assert!(
            self.states.status != SweeperStatus::New,
            "sweep called before predict"
        );
        let n = self.quad.num_nodes();
        let np = self.factory.num_particles();
        let t = self.states.t;
        let dt = self.states.dt;
        let half = <T as Scalar>::from_f64(0.5);
        tracing::debug!(t = t.to_f64(), dt = dt.to_f64(), "sweeping particle cloud");

        // integrals of the previous iterate
        let rhs_old: Vec<CloudComponent<T>> = (0..n).map(|l| self.build_rhs(l, true)).collect();
        for m in 0..n {
            for p in 0..np {
                self.s_int[m][p].fill(T::zero());
                self.ss_int[m][p].fill(T::zero());
            }
        }
        for m in 1..n {
            for l in 0..n {
                let ws = dt * self.quad.s()[(m, l)];
                let wss = dt * dt * self.quad.ss()[(m, l)];
                for p in 0..np {
                    self.s_int[m][p] += rhs_old[l][p] * ws;
                    self.ss_int[m][p] += rhs_old[l][p] * wss;
                }
            }
            if let Some(tau) = self.states.tau.as_ref() {
                for p in 0..np {
                    self.s_int[m][p] += tau[m].velocities[p] - tau[m - 1].velocities[p];
                    self.ss_int[m][p] += tau[m].positions[p] - tau[m - 1].positions[p];
                }
            }
        }

        {
            let NodeStates { u, u_start, .. } = &mut self.states;
            u[0].copy_from(u_start);
        }
        self.evaluate(0);

        for m in 0..n - 1 {
            let ds = dt * (self.quad.node(m + 1) - self.quad.node(m));

            // position update: start velocity drift, correction from the
            // force difference, iterated integral of the previous iterate
            let mut new_pos = self.states.u[m].positions.clone();
            for p in 0..np {
                new_pos[p] += self.states.u_start.velocities[p] * ds;
                new_pos[p] += self.ss_int[m + 1][p];
            }
            for l in 0..=m {
                let w = dt * dt * self.sx[(m + 1, l)];
                if w.is_zero() {
                    continue;
                }
                let rhs_new = self.build_rhs(l, false);
                for p in 0..np {
                    new_pos[p] += (rhs_new[p] - rhs_old[l][p]) * w;
                }
            }
            self.states.u[m + 1].positions.copy_from_slice(&new_pos);

            // fields at the new position
            self.evaluate(m + 1);

            // velocity update
            let mut c_k = vec![Vector3::zeros(); np];
            for p in 0..np {
                c_k[p] = self.s_int[m + 1][p] - (rhs_old[m + 1][p] + rhs_old[m][p]) * (ds * half);
            }
            self.boris_solve(m, ds, &c_k);
        }

        self.compute_end_state();
        self.save();
        self.states.iteration += 1;
        self.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrature::QuadratureType;
    use crate::test_problems::uniform_b::UniformB;

    fn make_sweeper(nnodes: usize) -> BorisSweeper<f64, UniformB<f64>> {
        let quad = Quadrature::new(QuadratureType::GaussLobatto, nnodes).unwrap();
        BorisSweeper::new(UniformB::new(1.0), quad, CloudFactory::new(1))
    }

    #[test]
    fn test_setup_rejects_open_node_sets() {
        let quad = Quadrature::<f64>::new(QuadratureType::GaussLegendre, 3).unwrap();
        let mut s = BorisSweeper::new(UniformB::new(1.0), quad, CloudFactory::new(1));
        assert!(matches!(s.setup(false), Err(SdcError::EndpointNotNode(_))));
    }

    #[test]
    fn test_sx_matrix_three_lobatto_nodes() {
        let mut s = make_sweeper(3);
        s.setup(false).unwrap();
        let sx = s.sx();
        assert_eq!(sx[(0, 0)], 0.0);
        assert!((sx[(1, 0)] - 0.125).abs() < 1e-14);
        assert!((sx[(1, 1)] - 0.0).abs() < 1e-14);
        assert!((sx[(2, 0)] - 0.125).abs() < 1e-14);
        assert!((sx[(2, 1)] - 0.25).abs() < 1e-14);
        assert_eq!(sx[(2, 2)], 0.0);
    }

    #[test]
    fn test_cloud_pack_roundtrip() {
        let mut cloud = CloudState::<f64>::zeros(2);
        cloud.positions[0] = Vector3::new(1.0, 2.0, 3.0);
        cloud.positions[1] = Vector3::new(-1.0, 0.0, 0.5);
        cloud.velocities[0] = Vector3::new(4.0, 5.0, 6.0);
        cloud.velocities[1] = Vector3::new(0.0, -2.0, 1.0);

        let mut buf = Vec::new();
        cloud.pack(&mut buf);
        assert_eq!(buf.len(), cloud.len());

        let mut back = CloudState::zeros(2);
        back.unpack(&buf);
        assert_eq!(back, cloud);
    }

    #[test]
    fn test_uniform_field_rotation() {
        // in a uniform magnetic field along z the velocity rotates with unit
        // angular frequency and the position follows the analytic circle
        let mut s = make_sweeper(5);
        s.setup(false).unwrap();
        let dt = 0.05;
        let steps = 10;

        let mut start = CloudState::zeros(1);
        start.positions[0] = Vector3::new(1.0, 0.0, 0.0);
        start.velocities[0] = Vector3::new(0.0, 1.0, 0.2);
        s.set_start_state(&start);

        for n in 0..steps {
            s.set_step(n as f64 * dt, dt);
            s.predict(n == 0);
            for _ in 0..6 {
                s.sweep();
            }
            s.advance();
        }

        let t_end = steps as f64 * dt;
        let (pos, vel) = UniformB::<f64>::new(1.0).exact(t_end, &start);
        let end = s.start_state();
        for i in 0..3 {
            assert!(
                (end.positions[0][i] - pos[i]).abs() < 2e-5,
                "position component {}: {} vs {}",
                i,
                end.positions[0][i],
                pos[i]
            );
            assert!(
                (end.velocities[0][i] - vel[i]).abs() < 2e-5,
                "velocity component {}: {} vs {}",
                i,
                end.velocities[0][i],
                vel[i]
            );
        }

        // speed in the plane is conserved by the rotation
        let v = &end.velocities[0];
        let speed = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((speed - 1.0).abs() < 2e-5);
    }

    #[test]
    fn test_cloud_log_writes_csv() {
        let path = std::env::temp_dir().join("pfasst_cloud_log_test.csv");
        {
            let mut log = CloudLog::create(&path).unwrap();
            let mut cloud = CloudState::<f64>::zeros(2);
            cloud.positions[0] = Vector3::new(1.0, 0.0, 0.0);
            log.log_cloud(0, 1, &cloud, 0.5, 0.0, 1e-9).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "step,iter,particle,x,y,z,u,v,w,energy,drift,residual"
        );
        // two particles and the centre-of-mass line
        assert_eq!(lines.count(), 3);
        std::fs::remove_file(&path).ok();
    }
}
