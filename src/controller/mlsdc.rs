use super::{split_pair, ControllerConfig, RunStats};
use crate::{encap::Encapsulation, errors::SdcError, sweeper::Sweeper, transfer::Transfer, Scalar};

/// Multilevel controller: one V-cycle per iteration over a hierarchy of
/// sweepers ordered coarsest first, with the coarse-level correction
/// recomputed on every down leg.
pub struct Mlsdc<T, S, Tr>
where
    T: Scalar,
    S: Sweeper<T>,
    Tr: Transfer<T, S>,
{
    levels: Vec<S>,
    transfers: Vec<Tr>,
    nsweeps: Vec<usize>,
    config: ControllerConfig,
    stats: RunStats,
    _marker: std::marker::PhantomData<T>,
}

impl<T, S, Tr> Mlsdc<T, S, Tr>
where
    T: Scalar,
    S: Sweeper<T>,
    Tr: Transfer<T, S>,
{
    /// Build from levels ordered coarsest to finest and the transfers
    /// coupling each adjacent pair.
    pub fn new(levels: Vec<S>, transfers: Vec<Tr>, config: ControllerConfig) -> Result<Self, SdcError> {
        if levels.is_empty() {
            return Err(SdcError::EmptyHierarchy);
        }
        if transfers.len() + 1 != levels.len() {
            return Err(SdcError::InconsistentHierarchy(format!(
                "{} levels need {} transfers, got {}",
                levels.len(),
                levels.len() - 1,
                transfers.len()
            )));
        }
        let nsweeps = vec![1; levels.len()];
        Ok(Self {
            levels,
            transfers,
            nsweeps,
            config,
            stats: RunStats::default(),
            _marker: std::marker::PhantomData,
        })
    }

    /// Number of sweeps per level and V-cycle visit, coarsest first.
    pub fn set_nsweeps(&mut self, nsweeps: Vec<usize>) -> Result<(), SdcError> {
        if nsweeps.len() != self.levels.len() {
            return Err(SdcError::InconsistentHierarchy(
                "one sweep count per level required".to_string(),
            ));
        }
        self.nsweeps = nsweeps;
        Ok(())
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> &S {
        &self.levels[index]
    }

    pub fn level_mut(&mut self, index: usize) -> &mut S {
        &mut self.levels[index]
    }

    pub fn finest(&self) -> &S {
        self.levels.last().expect("hierarchy is never empty")
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn sweep_level(&mut self, level: usize) {
        for _ in 0..self.nsweeps[level] {
            self.levels[level].sweep();
        }
    }

    /// Run all steps and return the finest-level end state.
    pub fn run(&mut self, u0: &S::Encap) -> Result<S::Encap, SdcError> {
        self.config.validate()?;
        let num_levels = self.levels.len();
        for (index, level) in self.levels.iter_mut().enumerate() {
            level.setup(index + 1 != num_levels)?;
        }

        if u0.len() != self.levels[num_levels - 1].start_state().len() {
            return Err(SdcError::EncapSizeMismatch {
                expected: self.levels[num_levels - 1].start_state().len(),
                got: u0.len(),
            });
        }

        let dt = self.config.dt::<T>();
        self.levels[num_levels - 1].set_start_state(u0);
        self.stats = RunStats::default();

        for step in 0..self.config.num_steps {
            let t = self.config.step_time::<T>(step);
            for level in self.levels.iter_mut() {
                level.set_step(t, dt);
            }

            // provisional solution on the finest level, spread down by
            // restriction
            self.levels[num_levels - 1].predict(step == 0);
            for fine_index in (1..num_levels).rev() {
                let (coarse, fine) = split_pair(&mut self.levels, fine_index);
                self.transfers[fine_index - 1].restrict(coarse, fine, true);
            }

            for iteration in 1..=self.config.num_iter {
                let mut converged = false;

                // down leg
                for fine_index in (1..num_levels).rev() {
                    self.sweep_level(fine_index);
                    if fine_index == num_levels - 1 {
                        self.stats.total_iterations += 1;
                        let residual = self.levels[fine_index].residual_norm(dt);
                        self.stats.final_residual = residual.to_f64();
                        tracing::info!(
                            step,
                            iteration,
                            residual = residual.to_f64(),
                            "finished V-cycle down sweep"
                        );
                        if self.levels[fine_index].converged() {
                            converged = true;
                            break;
                        }
                    }
                    let (coarse, fine) = split_pair(&mut self.levels, fine_index);
                    self.transfers[fine_index - 1].restrict(coarse, fine, false);
                    self.transfers[fine_index - 1].fas(dt, coarse, fine);
                }

                if converged {
                    self.levels[num_levels - 1].mark_converged();
                    break;
                }

                // bottom
                self.sweep_level(0);
                if num_levels == 1 {
                    self.stats.total_iterations += 1;
                    let residual = self.levels[0].residual_norm(dt);
                    self.stats.final_residual = residual.to_f64();
                    if self.levels[0].converged() {
                        self.levels[0].mark_converged();
                        break;
                    }
                    continue;
                }

                // up leg
                for fine_index in 1..num_levels {
                    let (coarse, fine) = split_pair(&mut self.levels, fine_index);
                    self.transfers[fine_index - 1].interpolate(fine, coarse, false);
                    if fine_index != num_levels - 1 {
                        self.sweep_level(fine_index);
                    }
                }
            }

            for level in self.levels.iter_mut() {
                level.advance();
            }
            self.stats.num_steps += 1;
        }

        Ok(self.levels[num_levels - 1].start_state().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{LevelOptions, Sdc};
    use crate::encap::{VectorEncap, VectorFactory};
    use crate::quadrature::QuadratureType;
    use crate::sweeper::imex::ImexSweeper;
    use crate::test_problems::dahlquist::Dahlquist;
    use crate::transfer::{Injection, TimeMatTransfer};

    type Swp = ImexSweeper<f64, Dahlquist<f64>, VectorFactory<f64>>;

    fn level(nnodes: usize, abs_tol: f64) -> Swp {
        let opts = LevelOptions {
            num_nodes: nnodes,
            quad_type: QuadratureType::GaussLobatto,
            abs_res_tol: abs_tol,
            ..Default::default()
        };
        let mut sweeper = ImexSweeper::new(
            Dahlquist::new(-0.4, -0.6),
            opts.quadrature().unwrap(),
            VectorFactory::new(1),
        );
        opts.apply_tolerances(&mut sweeper);
        sweeper
    }

    #[test]
    fn test_two_level_accuracy() {
        let coarse = level(3, 0.0);
        let fine = level(5, 0.0);
        let transfer =
            TimeMatTransfer::new(coarse.quadrature(), fine.quadrature(), Injection).unwrap();
        let config = ControllerConfig {
            num_steps: 10,
            delta_step: 0.1,
            num_iter: 6,
            t_start: 0.0,
        };
        let mut controller = Mlsdc::new(vec![coarse, fine], vec![transfer], config).unwrap();

        let end = controller.run(&VectorEncap::from_vec(vec![1.0])).unwrap();
        assert!((end.0[0] - (-1.0f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn test_v_cycle_beats_single_level_iteration_count() {
        // with a coarse level helping, the finest level reaches the residual
        // target in fewer fine sweeps than single-level iteration
        let tol = 1e-8;
        let config = ControllerConfig {
            num_steps: 4,
            delta_step: 0.5,
            num_iter: 30,
            t_start: 0.0,
        };

        let coarse = level(3, tol);
        let fine = level(5, tol);
        let transfer =
            TimeMatTransfer::new(coarse.quadrature(), fine.quadrature(), Injection).unwrap();
        let mut mlsdc = Mlsdc::new(vec![coarse, fine], vec![transfer], config.clone()).unwrap();
        mlsdc.set_nsweeps(vec![1, 1]).unwrap();
        let ml_end = mlsdc.run(&VectorEncap::from_vec(vec![1.0])).unwrap();

        let mut sdc = Sdc::new(level(5, tol), config);
        let sdc_end = sdc.run(&VectorEncap::from_vec(vec![1.0])).unwrap();

        assert!(mlsdc.stats().final_residual < tol);
        assert!(sdc.stats().final_residual < tol);
        assert!(
            mlsdc.stats().total_iterations < sdc.stats().total_iterations,
            "V-cycles: {}, single level: {}",
            mlsdc.stats().total_iterations,
            sdc.stats().total_iterations
        );
        assert!((ml_end.0[0] - sdc_end.0[0]).abs() < 1e-7);
    }

    #[test]
    fn test_rejects_mismatched_transfers() {
        let coarse = level(3, 0.0);
        let fine = level(5, 0.0);
        let result = Mlsdc::new(vec![coarse, fine], Vec::<
            TimeMatTransfer<f64, Injection>,
        >::new(), ControllerConfig::default());
        assert!(matches!(result, Err(SdcError::InconsistentHierarchy(_))));
    }
}
