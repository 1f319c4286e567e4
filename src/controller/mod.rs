use serde::{Deserialize, Serialize};

use crate::{
    errors::SdcError,
    quadrature::{Quadrature, QuadratureType},
    sweeper::Sweeper,
    Scalar,
};

pub mod mlsdc;
pub mod pfasst;
pub mod sdc;

pub use mlsdc::Mlsdc;
pub use pfasst::Pfasst;
pub use sdc::Sdc;

/// Controller-level run parameters. All fields are optional in serialized
/// form and fall back to the documented defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Number of time steps per run.
    pub num_steps: usize,
    /// Step size.
    pub delta_step: f64,
    /// Maximum number of iterations per step or block.
    pub num_iter: usize,
    /// Physical time of the first step.
    pub t_start: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            num_steps: 1,
            delta_step: 0.015625,
            num_iter: 2,
            t_start: 0.0,
        }
    }
}

impl ControllerConfig {
    pub(crate) fn validate(&self) -> Result<(), SdcError> {
        if self.num_steps == 0 {
            return Err(SdcError::NoSteps);
        }
        if !(self.delta_step > 0.0) {
            return Err(SdcError::InvalidStepSize(self.delta_step));
        }
        Ok(())
    }

    pub(crate) fn dt<T: Scalar>(&self) -> T {
        <T as Scalar>::from_f64(self.delta_step)
    }

    pub(crate) fn step_time<T: Scalar>(&self, step: usize) -> T {
        <T as Scalar>::from_f64(self.t_start) + <T as Scalar>::from_usize(step) * self.dt::<T>()
    }
}

/// Per-level discretization choices.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelOptions {
    pub num_nodes: usize,
    pub quad_type: QuadratureType,
    pub abs_res_tol: f64,
    pub rel_res_tol: f64,
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            num_nodes: 5,
            quad_type: QuadratureType::GaussLobatto,
            abs_res_tol: 0.0,
            rel_res_tol: 0.0,
        }
    }
}

impl LevelOptions {
    pub fn quadrature<T: Scalar>(&self) -> Result<Quadrature<T>, SdcError> {
        Quadrature::new(self.quad_type, self.num_nodes)
    }

    pub fn apply_tolerances<T: Scalar, S: Sweeper<T>>(&self, sweeper: &mut S) {
        sweeper.set_tolerances(<T as Scalar>::from_f64(self.abs_res_tol), <T as Scalar>::from_f64(self.rel_res_tol));
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunStats {
    pub num_steps: usize,
    pub total_iterations: usize,
    pub final_residual: f64,
}

pub(crate) fn split_pair<S>(levels: &mut [S], fine_index: usize) -> (&mut S, &mut S) {
    debug_assert!(fine_index >= 1);
    let (lower, upper) = levels.split_at_mut(fine_index);
    (&mut lower[fine_index - 1], &mut upper[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_parsing() {
        let config: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.num_steps, 1);
        assert_eq!(config.delta_step, 0.015625);
        assert_eq!(config.num_iter, 2);

        let config: ControllerConfig =
            serde_json::from_str(r#"{"num_steps": 10, "delta_step": 0.1, "num_iter": 8}"#).unwrap();
        assert_eq!(config.num_steps, 10);
        assert_eq!(config.delta_step, 0.1);
        assert!(config.validate().is_ok());

        let bad = ControllerConfig {
            delta_step: -1.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(SdcError::InvalidStepSize(_))));
    }

    #[test]
    fn test_level_options_parsing() {
        let opts: LevelOptions =
            serde_json::from_str(r#"{"num_nodes": 3, "quad_type": "gauss-legendre"}"#).unwrap();
        assert_eq!(opts.num_nodes, 3);
        assert_eq!(opts.quad_type, QuadratureType::GaussLegendre);
        assert!(opts.quadrature::<f64>().is_ok());
    }
}
