use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{
    Backend, BackendCapabilities, BackendId, Capability, QueueDescriptor, Workload,
    WorkloadFactory, WorkloadInfo,
};
use crate::error::{Error, Result};
use crate::layer::{LayerKind, LayerParams};
use crate::tensor::TensorInfo;

pub type CapabilityFn =
    Arc<dyn Fn(&[TensorInfo], &[TensorInfo], &LayerParams) -> Capability + Send + Sync>;

pub type ConstructorFn = Arc<
    dyn Fn(QueueDescriptor, &WorkloadInfo) -> anyhow::Result<Box<dyn Workload>> + Send + Sync,
>;

/// Capability check and constructor for one (kind, backend) pair.
#[derive(Clone)]
pub struct DispatchEntry {
    check: CapabilityFn,
    create: ConstructorFn,
}

impl DispatchEntry {
    pub fn new<C, F>(check: C, create: F) -> Self
    where
        C: Fn(&[TensorInfo], &[TensorInfo], &LayerParams) -> Capability + Send + Sync + 'static,
        F: Fn(QueueDescriptor, &WorkloadInfo) -> anyhow::Result<Box<dyn Workload>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            check: Arc::new(check),
            create: Arc::new(create),
        }
    }
}

/// Mapping from `(LayerKind, BackendId)` to dispatch entries.
#[derive(Default, Clone)]
pub struct DispatchRegistry {
    entries: HashMap<(LayerKind, BackendId), DispatchEntry>,
    backends: Vec<(BackendId, BackendCapabilities)>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the backend and lets it register its entries.
    pub fn register_backend(&mut self, backend: &dyn Backend) {
        let id = backend.id();
        self.backends.retain(|(known, _)| *known != id);
        self.backends.push((id.clone(), backend.capabilities()));
        backend.register(self);
        debug!(backend = %id, "registered backend");
    }

    pub fn insert(&mut self, kind: LayerKind, backend: BackendId, entry: DispatchEntry) {
        self.entries.insert((kind, backend), entry);
    }

    pub fn backends(&self) -> impl Iterator<Item = &BackendId> {
        self.backends.iter().map(|(id, _)| id)
    }

    pub fn capabilities(&self, backend: &BackendId) -> Option<BackendCapabilities> {
        self.backends
            .iter()
            .find(|(id, _)| id == backend)
            .map(|(_, caps)| *caps)
    }

    pub fn supports_kind(&self, kind: LayerKind, backend: &BackendId) -> bool {
        self.entries.contains_key(&(kind, backend.clone()))
    }

    pub fn check(
        &self,
        backend: &BackendId,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
        params: &LayerParams,
    ) -> Capability {
        let kind = params.kind();
        match self.entries.get(&(kind, backend.clone())) {
            Some(entry) => (entry.check)(inputs, outputs, params),
            None => Capability::unsupported(format!("{backend} has no {kind:?} workload")),
        }
    }

    pub fn factory(&self, backend: &BackendId) -> RegistryFactory<'_> {
        RegistryFactory {
            registry: self,
            backend: backend.clone(),
        }
    }
}

/// [`WorkloadFactory`] backed by the registry entries of a single backend.
pub struct RegistryFactory<'a> {
    registry: &'a DispatchRegistry,
    backend: BackendId,
}

impl WorkloadFactory for RegistryFactory<'_> {
    fn backend_id(&self) -> &BackendId {
        &self.backend
    }

    fn is_layer_supported(
        &self,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
        params: &LayerParams,
    ) -> Capability {
        self.registry.check(&self.backend, inputs, outputs, params)
    }

    fn create_workload(
        &self,
        descriptor: QueueDescriptor,
        info: &WorkloadInfo,
    ) -> Result<Box<dyn Workload>> {
        let kind = descriptor.params.kind();
        let entry = self
            .registry
            .entries
            .get(&(kind, self.backend.clone()))
            .ok_or_else(|| Error::UnknownDispatch {
                kind,
                backend: self.backend.clone(),
            })?;

        // A passing check must never be followed by a shape or type failure,
        // so construction is gated on the very same check.
        if let Capability::Unsupported(reason) =
            (entry.check)(
                info.input_infos.as_slice(),
                info.output_infos.as_slice(),
                &descriptor.params,
            )
        {
            return Err(Error::backend_fatal(
                self.backend.clone(),
                anyhow::anyhow!("{}: rejected at construction: {reason}", descriptor.layer_name),
            ));
        }

        let layer = descriptor.layer_name.clone();
        (entry.create)(descriptor, info).map_err(|source| {
            Error::backend_fatal(
                self.backend.clone(),
                source.context(format!("creating workload for {layer}")),
            )
        })
    }
}
