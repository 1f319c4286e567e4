//! Parallel-in-time integration of initial value problems
//!
//! ```text
//! u'(t) = f(t, u),    u(0) = u0,    t in [0, T]
//! ```
//!
//! with spectral deferred corrections: a low-order provisional solution is
//! iterated toward the collocation solution on a set of quadrature nodes per
//! time step. Iterations can run on a single level ([`Sdc`]), on a hierarchy
//! of coarsened levels with a full approximation scheme correction
//! ([`Mlsdc`]), or pipelined across time steps on several ranks ([`Pfasst`]).
//!
//! The building blocks are composable: a [`Sweeper`] owns the per-level node
//! states and performs one correction iteration, [`Encapsulation`] hides the
//! problem state behind a small capability set, [`Transfer`] moves data
//! between levels, and [`Communicator`] moves it between ranks.

pub mod comm;
pub mod controller;
pub mod encap;
pub mod errors;
pub mod quadrature;
pub mod scalar;
pub mod sweeper;
pub mod test_problems;
pub mod transfer;

pub use crate::comm::{ChannelComm, Communicator, SerialComm};
pub use crate::controller::{ControllerConfig, LevelOptions, Mlsdc, Pfasst, RunStats, Sdc};
pub use crate::encap::{EncapFactory, Encapsulation, VectorEncap, VectorFactory};
pub use crate::errors::SdcError;
pub use crate::quadrature::{compute_nodes, polynomial::Polynomial, Quadrature, QuadratureType};
pub use crate::scalar::{IndexType, Scalar};
pub use crate::sweeper::{
    BorisSweeper, CloudFactory, CloudLog, CloudState, ExplicitProblem, ExplicitSweeper,
    FieldProblem, ImexProblem, ImexSweeper, ImplicitProblem, ImplicitSweeper, NodeStates,
    SolveOutcome, Sweeper, SweeperStatus,
};
pub use crate::transfer::{Injection, SpatialTransfer, TimeMatTransfer, Transfer};
