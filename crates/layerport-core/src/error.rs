use crate::backend::BackendId;
use crate::layer::LayerKind;

/// Every failure the core can raise.
///
/// Capability rejections are normally returned as [`crate::Capability`] data;
/// [`Error::BackendCapability`] only surfaces when a caller has exhausted every
/// backend for a layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The parameter record of a layer is internally inconsistent.
    #[error("{layer}: invalid configuration: {reason}")]
    Configuration { layer: String, reason: String },

    /// A layer does not have the number of connected slots it requires.
    #[error("{layer}: expected {expected} connected input(s), found {connected}")]
    Connection {
        layer: String,
        expected: usize,
        connected: usize,
    },

    /// A declared output shape conflicts with the shape inferred from the inputs.
    #[error("{layer}: shape validation failed: {reason}")]
    ShapeValidation { layer: String, reason: String },

    /// A layer id or slot index does not exist in the graph.
    #[error("invalid layer reference: {0}")]
    InvalidLayer(String),

    /// Topological ordering found a dependency cycle.
    #[error("graph contains a cycle through layer {0}")]
    Cycle(String),

    /// No backend accepted the layer.
    #[error("{layer}: no backend can execute this layer: {reason}")]
    BackendCapability { layer: String, reason: String },

    /// Nothing is registered for this (kind, backend) pair.
    #[error("no workload registered for {kind:?} on backend {backend}")]
    UnknownDispatch { kind: LayerKind, backend: BackendId },

    /// Workload construction or execution failed on a backend.
    #[error("backend {backend} failed: {source:#}")]
    BackendFatal {
        backend: BackendId,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub fn configuration(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_validation(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ShapeValidation {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    pub fn backend_fatal(backend: BackendId, source: impl Into<anyhow::Error>) -> Self {
        Error::BackendFatal {
            backend,
            source: source.into(),
        }
    }

    /// Whether the error must abort the whole execution plan.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::BackendFatal { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
