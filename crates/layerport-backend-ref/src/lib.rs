//! Reference CPU backend: straightforward scalar kernels for every layer kind.
//! Quantized tensors are decoded to `f32`, computed, and encoded back. `i32`
//! tensors take an exact integer path wherever values are computed.

pub mod decoder;
pub mod math;
mod support;
pub mod workloads;

use layerport_core::{
    Backend, BackendCapabilities, BackendId, DeviceKind, DispatchEntry, DispatchRegistry,
    LayerKind,
};

pub use support::is_layer_supported;

pub const REF_BACKEND_ID: BackendId = BackendId::REFERENCE;

pub struct RefBackend;

impl RefBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RefBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for RefBackend {
    fn id(&self) -> BackendId {
        REF_BACKEND_ID
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            device: DeviceKind::Cpu,
            supports_quantized: true,
            supports_broadcast: true,
            data_parallel: false,
        }
    }

    fn register(&self, registry: &mut DispatchRegistry) {
        for kind in LayerKind::ALL.into_iter().filter(|kind| !kind.is_boundary()) {
            registry.insert(
                kind,
                REF_BACKEND_ID,
                DispatchEntry::new(is_layer_supported, workloads::create),
            );
        }
    }
}
