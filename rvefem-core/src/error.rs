//! Error types for rvefem operations.

use thiserror::Error;

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, assembling, solving or homogenizing a model.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration detected before any numerical work
    /// (unsupported element dimension, unknown model name, malformed input shapes).
    #[error("configuration error: {0}")]
    Config(String),

    /// Mesh-related errors (connectivity, point indices, periodic matching).
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Non-physical element mapping found during kernel evaluation.
    #[error(
        "geometry error in block '{block}', element {element}, point {point}: \
         Jacobian determinant {det_j:e} is not positive"
    )]
    Geometry {
        block: String,
        element: usize,
        point: usize,
        det_j: f64,
    },

    /// Invalid material properties or constitutive matrix.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// An error raised while processing a specific element block.
    #[error("block '{block}': {source}")]
    Block {
        block: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the name of the originating block, unless the error already carries it.
    pub fn in_block(self, block: &str) -> Self {
        match self {
            err @ (Error::Block { .. } | Error::Geometry { .. }) => err,
            other => Error::Block {
                block: block.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// True for failures caused by the numerical model rather than by bad input.
    pub fn is_numerical(&self) -> bool {
        match self {
            Error::SingularMatrix(_) => true,
            Error::Block { source, .. } => source.is_numerical(),
            _ => false,
        }
    }
}
