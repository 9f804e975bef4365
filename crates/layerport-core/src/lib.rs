//! Backend-agnostic core of the layerport inference engine: the layer graph,
//! its shape inference and validation, and the protocol through which
//! backends plug capability checks and workloads into it.

pub mod backend;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod graph;
pub mod layer;
pub mod layers;
pub mod layout;
pub mod registry;
pub mod tensor;

pub use backend::*;
pub use config::*;
pub use descriptors::*;
pub use error::{Error, Result};
pub use graph::*;
pub use layer::*;
pub use layers::resolve_axis;
pub use layout::*;
pub use registry::*;
pub use tensor::*;
