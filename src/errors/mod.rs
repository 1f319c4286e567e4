use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdcError {
    #[error("Invalid number of quadrature nodes ({num_nodes}) for {quad_type}")]
    InvalidNodeCount { quad_type: String, num_nodes: usize },
    #[error("Unknown quadrature type: {0}")]
    UnknownQuadratureType(String),
    #[error("Quadrature nodes are not strictly increasing")]
    NonIncreasingNodes,
    #[error("Level hierarchy is empty")]
    EmptyHierarchy,
    #[error("Level hierarchy is inconsistent: {0}")]
    InconsistentHierarchy(String),
    #[error("Step size must be positive, got {0}")]
    InvalidStepSize(f64),
    #[error("Number of time steps must be positive")]
    NoSteps,
    #[error("Number of steps ({num_steps}) is not divisible by the number of ranks ({num_ranks})")]
    StepsNotDivisible { num_steps: usize, num_ranks: usize },
    #[error("Quadrature must include both interval endpoints as nodes, got {0}")]
    EndpointNotNode(String),
    #[error("Encapsulation has {got} degrees of freedom, expected {expected}")]
    EncapSizeMismatch { expected: usize, got: usize },
    #[error("Communication with rank {rank} failed: {reason}")]
    Communication { rank: usize, reason: String },
    #[error("Failed to write sweep data: {0}")]
    Output(String),
}
