use super::{ControllerConfig, RunStats};
use crate::{encap::Encapsulation, errors::SdcError, sweeper::Sweeper, Scalar};

/// Single-level controller: predict once per step, then iterate sweeps until
/// the residual tolerance or the iteration budget is reached.
pub struct Sdc<T, S>
where
    T: Scalar,
    S: Sweeper<T>,
{
    sweeper: S,
    config: ControllerConfig,
    stats: RunStats,
    _marker: std::marker::PhantomData<T>,
}

impl<T, S> Sdc<T, S>
where
    T: Scalar,
    S: Sweeper<T>,
{
    pub fn new(sweeper: S, config: ControllerConfig) -> Self {
        Self {
            sweeper,
            config,
            stats: RunStats::default(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn sweeper(&self) -> &S {
        &self.sweeper
    }

    pub fn sweeper_mut(&mut self) -> &mut S {
        &mut self.sweeper
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Step the problem from the given initial state to the final time and
    /// return the end state.
    pub fn run(&mut self, u0: &S::Encap) -> Result<S::Encap, SdcError> {
        self.config.validate()?;
        self.sweeper.setup(false)?;
        if u0.len() != self.sweeper.start_state().len() {
            return Err(SdcError::EncapSizeMismatch {
                expected: self.sweeper.start_state().len(),
                got: u0.len(),
            });
        }

        let dt = self.config.dt::<T>();
        self.sweeper.set_start_state(u0);
        self.stats = RunStats::default();

        for step in 0..self.config.num_steps {
            let t = self.config.step_time::<T>(step);
            self.sweeper.set_step(t, dt);
            self.sweeper.predict(step == 0);

            for iteration in 1..=self.config.num_iter {
                self.sweeper.sweep();
                self.stats.total_iterations += 1;
                let residual = self.sweeper.residual_norm(dt);
                tracing::info!(
                    step,
                    iteration,
                    residual = residual.to_f64(),
                    "finished sweep"
                );
                self.stats.final_residual = residual.to_f64();
                if self.sweeper.converged() {
                    self.sweeper.mark_converged();
                    break;
                }
            }

            self.sweeper.advance();
            self.stats.num_steps += 1;
        }

        Ok(self.sweeper.start_state().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::LevelOptions;
    use crate::encap::{VectorEncap, VectorFactory};
    use crate::quadrature::QuadratureType;
    use crate::sweeper::imex::ImexSweeper;
    use crate::test_problems::dahlquist::Dahlquist;

    #[test]
    fn test_linear_decay_to_machine_accuracy() {
        // u' = -u, 10 steps of dt = 0.1 with 5 Gauss-Lobatto nodes and 8
        // iterations reproduces exp(-1) to ten digits
        let opts = LevelOptions {
            num_nodes: 5,
            quad_type: QuadratureType::GaussLobatto,
            ..Default::default()
        };
        let sweeper = ImexSweeper::new(
            Dahlquist::new(-0.4, -0.6),
            opts.quadrature().unwrap(),
            VectorFactory::new(1),
        );
        let config = ControllerConfig {
            num_steps: 10,
            delta_step: 0.1,
            num_iter: 8,
            t_start: 0.0,
        };
        let mut controller = Sdc::new(sweeper, config);

        let end = controller.run(&VectorEncap::from_vec(vec![1.0])).unwrap();
        let exact = (-1.0f64).exp();
        assert!(
            (end.0[0] - exact).abs() < 1e-10,
            "got {}, want {}",
            end.0[0],
            exact
        );
        assert_eq!(controller.stats().total_iterations, 80);
    }

    #[test]
    fn test_early_exit_on_residual_tolerance() {
        let opts = LevelOptions {
            num_nodes: 5,
            quad_type: QuadratureType::GaussLobatto,
            abs_res_tol: 1e-11,
            ..Default::default()
        };
        let mut sweeper = ImexSweeper::new(
            Dahlquist::new(0.0, -1.0),
            opts.quadrature().unwrap(),
            VectorFactory::new(1),
        );
        opts.apply_tolerances(&mut sweeper);
        let config = ControllerConfig {
            num_steps: 2,
            delta_step: 0.1,
            num_iter: 50,
            t_start: 0.0,
        };
        let mut controller = Sdc::new(sweeper, config);
        let end = controller.run(&VectorEncap::from_vec(vec![1.0])).unwrap();

        assert!(controller.stats().total_iterations < 100);
        assert!(controller.stats().final_residual < 1e-11);
        assert!((end.0[0] - (-0.2f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn test_rejects_bad_config() {
        let opts = LevelOptions::default();
        let sweeper = ImexSweeper::new(
            Dahlquist::new(0.0, -1.0),
            opts.quadrature().unwrap(),
            VectorFactory::new(1),
        );
        let config = ControllerConfig {
            num_steps: 0,
            ..Default::default()
        };
        let mut controller = Sdc::new(sweeper, config);
        assert!(matches!(
            controller.run(&VectorEncap::from_vec(vec![1.0])),
            Err(SdcError::NoSteps)
        ));
    }
}
