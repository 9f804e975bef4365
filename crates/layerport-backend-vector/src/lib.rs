//! Data-parallel CPU backend.
//!
//! Covers the elementwise kinds and innermost-axis softmax on `f32` tensors
//! of identical shape, splitting each kernel across the rayon thread pool.
//! Everything else (broadcasting, quantized data, resize, reshape) is left to
//! other backends.

mod support;
pub mod workloads;

use layerport_core::{
    Backend, BackendCapabilities, BackendId, DeviceKind, DispatchEntry, DispatchRegistry,
    LayerKind,
};

pub use support::is_layer_supported;

pub const VECTOR_BACKEND_ID: BackendId = BackendId::from_static("vector");

const KINDS: [LayerKind; 4] = [
    LayerKind::Activation,
    LayerKind::ElementwiseUnary,
    LayerKind::ElementwiseBinary,
    LayerKind::Softmax,
];

pub struct VectorBackend;

impl VectorBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VectorBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for VectorBackend {
    fn id(&self) -> BackendId {
        VECTOR_BACKEND_ID
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            device: DeviceKind::Cpu,
            supports_quantized: false,
            supports_broadcast: false,
            data_parallel: true,
        }
    }

    fn register(&self, registry: &mut DispatchRegistry) {
        for kind in KINDS {
            registry.insert(
                kind,
                VECTOR_BACKEND_ID,
                DispatchEntry::new(is_layer_supported, workloads::create),
            );
        }
    }
}
